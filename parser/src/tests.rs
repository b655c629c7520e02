//! FILENAME: parser/src/tests.rs
//! PURPOSE: Consolidated unit tests for the parser crate.

use crate::ast::{BinaryOperator, CellRef, ErrorKind, Expression, FunctionId, Literal, UnaryOperator};
use crate::lexer::Lexer;
use crate::parser::parse;
use crate::token::Token;
use pretty_assertions::assert_eq;
use rust_decimal::Decimal;

fn num(n: i64) -> Decimal {
    Decimal::from(n)
}

// ========================================
// LEXER TESTS
// ========================================

#[test]
fn test_exclamation_token() {
    let mut lexer = Lexer::new("Sheet1!A1");
    assert_eq!(lexer.next_token(), Token::Identifier("SHEET1".to_string()));
    assert_eq!(lexer.next_token(), Token::Exclamation);
    assert_eq!(lexer.next_token(), Token::Identifier("A1".to_string()));
}

#[test]
fn test_quoted_identifier() {
    let mut lexer = Lexer::new("'My Sheet'!A1");
    assert_eq!(
        lexer.next_token(),
        Token::QuotedIdentifier("My Sheet".to_string())
    );
    assert_eq!(lexer.next_token(), Token::Exclamation);
    assert_eq!(lexer.next_token(), Token::Identifier("A1".to_string()));
}

#[test]
fn test_quoted_identifier_with_escaped_quote() {
    let mut lexer = Lexer::new("'John''s Sheet'!A1");
    assert_eq!(
        lexer.next_token(),
        Token::QuotedIdentifier("John's Sheet".to_string())
    );
    assert_eq!(lexer.next_token(), Token::Exclamation);
}

#[test]
fn lexer_tokenizes_simple_math() {
    let mut lexer = Lexer::new("=1 + 2");

    assert_eq!(lexer.next_token(), Token::Equals);
    assert_eq!(lexer.next_token(), Token::Number(num(1)));
    assert_eq!(lexer.next_token(), Token::Plus);
    assert_eq!(lexer.next_token(), Token::Number(num(2)));
    assert_eq!(lexer.next_token(), Token::EOF);
}

#[test]
fn lexer_tokenizes_functions() {
    let mut lexer = Lexer::new("SUM(A1, 10)");

    assert_eq!(lexer.next_token(), Token::Identifier("SUM".to_string()));
    assert_eq!(lexer.next_token(), Token::LParen);
    assert_eq!(lexer.next_token(), Token::Identifier("A1".to_string()));
    assert_eq!(lexer.next_token(), Token::Comma);
    assert_eq!(lexer.next_token(), Token::Number(num(10)));
    assert_eq!(lexer.next_token(), Token::RParen);
}

#[test]
fn lexer_handles_strings_and_bools() {
    let mut lexer = Lexer::new("\"Hello\" TRUE false");

    assert_eq!(lexer.next_token(), Token::String("Hello".to_string()));
    assert_eq!(lexer.next_token(), Token::Boolean(true));
    assert_eq!(lexer.next_token(), Token::Boolean(false));
}

#[test]
fn lexer_tokenizes_comparison_operators() {
    let mut lexer = Lexer::new("< > <= >= <> =");

    assert_eq!(lexer.next_token(), Token::LessThan);
    assert_eq!(lexer.next_token(), Token::GreaterThan);
    assert_eq!(lexer.next_token(), Token::LessEqual);
    assert_eq!(lexer.next_token(), Token::GreaterEqual);
    assert_eq!(lexer.next_token(), Token::NotEqual);
    assert_eq!(lexer.next_token(), Token::Equals);
}

#[test]
fn lexer_tokenizes_bang_equals_spelling_of_not_equal() {
    let mut lexer = Lexer::new("A1!=B1");
    assert_eq!(lexer.next_token(), Token::Identifier("A1".to_string()));
    assert_eq!(lexer.next_token(), Token::NotEqual);
    assert_eq!(lexer.next_token(), Token::Identifier("B1".to_string()));
}

#[test]
fn parses_bang_equals_as_not_equal_comparison() {
    let ast = parse("=A1!=B1").unwrap();
    match ast {
        Expression::BinaryOp { op: BinaryOperator::NotEqual, .. } => {}
        other => panic!("expected NotEqual comparison, got {:?}", other),
    }
}

#[test]
fn lexer_reads_error_literals() {
    let mut lexer = Lexer::new("#REF! #VALUE! #DIV/0! #NAME? #CIRCREF! #ERROR!");

    assert_eq!(lexer.next_token(), Token::ErrorLiteral(ErrorKind::BadReference));
    assert_eq!(lexer.next_token(), Token::ErrorLiteral(ErrorKind::TypeError));
    assert_eq!(lexer.next_token(), Token::ErrorLiteral(ErrorKind::DivideByZero));
    assert_eq!(lexer.next_token(), Token::ErrorLiteral(ErrorKind::BadName));
    assert_eq!(
        lexer.next_token(),
        Token::ErrorLiteral(ErrorKind::CircularReference)
    );
    assert_eq!(lexer.next_token(), Token::ErrorLiteral(ErrorKind::ParseError));
}

#[test]
fn lexer_rejects_unknown_error_literal() {
    let mut lexer = Lexer::new("#BOGUS!");
    assert_eq!(lexer.next_token(), Token::Illegal('#'));
}

#[test]
fn lexer_has_no_caret_or_bracket_tokens() {
    // '^' is not part of this grammar; it lexes as Illegal.
    let mut lexer = Lexer::new("^");
    assert_eq!(lexer.next_token(), Token::Illegal('^'));
}

// ========================================
// PARSER TESTS
// ========================================

#[test]
fn parses_simple_addition() {
    let expr = parse("=1+2").unwrap();
    assert_eq!(
        expr,
        Expression::BinaryOp {
            left: Box::new(Expression::Literal(Literal::Number(num(1)))),
            op: BinaryOperator::Add,
            right: Box::new(Expression::Literal(Literal::Number(num(2)))),
        }
    );
}

#[test]
fn respects_precedence_of_multiplication_over_addition() {
    // 1 + 2 * 3 => 1 + (2 * 3)
    let expr = parse("=1+2*3").unwrap();
    match expr {
        Expression::BinaryOp { op: BinaryOperator::Add, right, .. } => match *right {
            Expression::BinaryOp { op: BinaryOperator::Multiply, .. } => {}
            other => panic!("expected nested multiply, got {:?}", other),
        },
        other => panic!("expected top-level add, got {:?}", other),
    }
}

#[test]
fn unary_minus_binds_tighter_than_multiplication() {
    let expr = parse("=-2*3").unwrap();
    match expr {
        Expression::BinaryOp { left, op: BinaryOperator::Multiply, .. } => match *left {
            Expression::UnaryOp { op: UnaryOperator::Negate, .. } => {}
            other => panic!("expected negated left operand, got {:?}", other),
        },
        other => panic!("expected top-level multiply, got {:?}", other),
    }
}

#[test]
fn unary_plus_is_supported() {
    let expr = parse("=+5").unwrap();
    assert_eq!(
        expr,
        Expression::UnaryOp {
            op: UnaryOperator::Plus,
            operand: Box::new(Expression::Literal(Literal::Number(num(5)))),
        }
    );
}

#[test]
fn parses_simple_cell_reference() {
    let expr = parse("=A1").unwrap();
    assert_eq!(
        expr,
        Expression::Cell(CellRef {
            sheet: None,
            col: "A".to_string(),
            row: 1,
            col_absolute: false,
            row_absolute: false,
        })
    );
}

#[test]
fn parses_fully_absolute_reference() {
    let expr = parse("=$A$1").unwrap();
    assert_eq!(
        expr,
        Expression::Cell(CellRef {
            sheet: None,
            col: "A".to_string(),
            row: 1,
            col_absolute: true,
            row_absolute: true,
        })
    );
}

#[test]
fn parses_mixed_absolute_reference() {
    // column absolute, row relative
    let expr = parse("=$A1").unwrap();
    assert_eq!(
        expr,
        Expression::Cell(CellRef {
            sheet: None,
            col: "A".to_string(),
            row: 1,
            col_absolute: true,
            row_absolute: false,
        })
    );

    // column relative, row absolute
    let expr = parse("=A$1").unwrap();
    assert_eq!(
        expr,
        Expression::Cell(CellRef {
            sheet: None,
            col: "A".to_string(),
            row: 1,
            col_absolute: false,
            row_absolute: true,
        })
    );
}

#[test]
fn parses_sheet_qualified_reference() {
    let expr = parse("=Sheet1!A1").unwrap();
    assert_eq!(
        expr,
        Expression::Cell(CellRef {
            sheet: Some("SHEET1".to_string()),
            col: "A".to_string(),
            row: 1,
            col_absolute: false,
            row_absolute: false,
        })
    );
}

#[test]
fn parses_quoted_sheet_qualified_reference() {
    let expr = parse("='My Sheet'!B2").unwrap();
    assert_eq!(
        expr,
        Expression::Cell(CellRef {
            sheet: Some("My Sheet".to_string()),
            col: "B".to_string(),
            row: 2,
            col_absolute: false,
            row_absolute: false,
        })
    );
}

#[test]
fn parses_range_reference() {
    let expr = parse("=A1:B10").unwrap();
    assert_eq!(
        expr,
        Expression::Range {
            sheet: None,
            start: Box::new(CellRef {
                sheet: None,
                col: "A".to_string(),
                row: 1,
                col_absolute: false,
                row_absolute: false,
            }),
            end: Box::new(CellRef {
                sheet: None,
                col: "B".to_string(),
                row: 10,
                col_absolute: false,
                row_absolute: false,
            }),
        }
    );
}

#[test]
fn parses_sheet_qualified_range_with_mixed_absolute_ends() {
    let expr = parse("=Sheet1!$A$1:B10").unwrap();
    assert_eq!(
        expr,
        Expression::Range {
            sheet: Some("SHEET1".to_string()),
            start: Box::new(CellRef {
                sheet: None,
                col: "A".to_string(),
                row: 1,
                col_absolute: true,
                row_absolute: true,
            }),
            end: Box::new(CellRef {
                sheet: None,
                col: "B".to_string(),
                row: 10,
                col_absolute: false,
                row_absolute: false,
            }),
        }
    );
}

#[test]
fn parses_string_and_boolean_literals() {
    assert_eq!(
        parse("=\"hello\"").unwrap(),
        Expression::Literal(Literal::Text("hello".to_string()))
    );
    assert_eq!(
        parse("=TRUE").unwrap(),
        Expression::Literal(Literal::Boolean(true))
    );
    assert_eq!(
        parse("=FALSE").unwrap(),
        Expression::Literal(Literal::Boolean(false))
    );
}

#[test]
fn parses_error_literal() {
    assert_eq!(
        parse("=#DIV/0!").unwrap(),
        Expression::Literal(Literal::Error(ErrorKind::DivideByZero))
    );
}

#[test]
fn parses_function_call_with_range_argument() {
    let expr = parse("=SUM(A1:A10)").unwrap();
    match expr {
        Expression::FunctionCall { func: FunctionId::Sum, args } => {
            assert_eq!(args.len(), 1);
            assert!(matches!(args[0], Expression::Range { .. }));
        }
        other => panic!("expected SUM call, got {:?}", other),
    }
}

#[test]
fn parses_nested_function_calls() {
    let expr = parse("=IF(A1>0, \"yes\", \"no\")").unwrap();
    match expr {
        Expression::FunctionCall { func: FunctionId::If, args } => assert_eq!(args.len(), 3),
        other => panic!("expected IF call, got {:?}", other),
    }
}

#[test]
fn unknown_function_name_resolves_to_custom() {
    let expr = parse("=FROBNICATE(1)").unwrap();
    match expr {
        Expression::FunctionCall { func: FunctionId::Custom(name), .. } => {
            assert_eq!(name, "FROBNICATE")
        }
        other => panic!("expected custom function, got {:?}", other),
    }
}

#[test]
fn parenthesized_expression_overrides_precedence() {
    let expr = parse("=(1+2)*3").unwrap();
    match expr {
        Expression::BinaryOp { left, op: BinaryOperator::Multiply, .. } => match *left {
            Expression::BinaryOp { op: BinaryOperator::Add, .. } => {}
            other => panic!("expected parenthesized add, got {:?}", other),
        },
        other => panic!("expected top-level multiply, got {:?}", other),
    }
}

#[test]
fn comparison_has_lowest_precedence() {
    let expr = parse("=A1>0&\"x\"").unwrap();
    // A1 > (0 & "x")
    match expr {
        Expression::BinaryOp { op: BinaryOperator::GreaterThan, right, .. } => {
            assert!(matches!(*right, Expression::BinaryOp { op: BinaryOperator::Concat, .. }));
        }
        other => panic!("expected top-level comparison, got {:?}", other),
    }
}

#[test]
fn rejects_trailing_garbage() {
    assert!(parse("=1 2").is_err());
}

#[test]
fn rejects_empty_formula() {
    assert!(parse("=").is_err());
}

#[test]
fn rejects_malformed_reference() {
    // column-only identifier with no row and no trailing $ is not a valid atom.
    assert!(parse("=A").is_err());
}
