//! FILENAME: parser/src/parser.rs
//! PURPOSE: Recursive descent parser that converts a stream of Tokens into an AST.
//! CONTEXT: This is the second stage of the parsing pipeline. It takes tokens
//! from the Lexer and builds an Expression tree that can be evaluated.
//!
//! GRAMMAR:
//!   formula        --> "=" expression
//!   expression     --> comparison
//!   comparison     --> concatenation ( ("=" | "<>" | "<" | ">" | "<=" | ">=") concatenation )*
//!   concatenation  --> additive ( "&" additive )*
//!   additive       --> multiplicative ( ("+" | "-") multiplicative )*
//!   multiplicative --> unary ( ("*" | "/") unary )*
//!   unary          --> ("+" | "-") unary | atom
//!   atom           --> NUMBER | STRING | BOOLEAN | ERROR_LITERAL
//!                      | reference | function_call | "(" expression ")"
//!   reference      --> [sheet_prefix] cell_ref (":" cell_ref)?
//!   sheet_prefix   --> (IDENTIFIER | QUOTED_IDENTIFIER) "!"
//!   cell_ref       --> "$"? COLUMN "$"? ROW
//!   function_call  --> IDENTIFIER "(" arguments? ")"
//!   arguments      --> expression ("," expression)*

use crate::ast::{BinaryOperator, CellRef, Expression, FunctionId, Literal, UnaryOperator};
use crate::lexer::Lexer;
use crate::token::Token;
use rust_decimal::Decimal;

/// Parser errors with descriptive messages.
#[derive(Debug, PartialEq, Clone)]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    pub fn new(message: impl Into<String>) -> Self {
        ParseError {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Parse error: {}", self.message)
    }
}

impl std::error::Error for ParseError {}

pub type ParseResult<T> = Result<T, ParseError>;

/// The Parser struct holds the lexer and current token state.
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current_token: Token,
}

impl<'a> Parser<'a> {
    /// Creates a new parser from an input string.
    /// Automatically advances to the first token.
    pub fn new(input: &'a str) -> Self {
        let mut lexer = Lexer::new(input);
        let current_token = lexer.next_token();
        Parser {
            lexer,
            current_token,
        }
    }

    /// Parses the entire input and returns the AST.
    /// Handles the leading '=' that indicates a formula.
    pub fn parse(&mut self) -> ParseResult<Expression> {
        if self.current_token == Token::Equals {
            self.advance();
        }

        if self.current_token == Token::EOF {
            return Err(ParseError::new("Empty expression"));
        }

        let expr = self.parse_expression()?;

        if self.current_token != Token::EOF {
            return Err(ParseError::new(format!(
                "Unexpected token after expression: {:?}",
                self.current_token
            )));
        }

        Ok(expr)
    }

    /// Advances to the next token.
    fn advance(&mut self) {
        self.current_token = self.lexer.next_token();
    }

    /// Checks if the current token matches the expected token.
    /// If it matches, advances and returns Ok. Otherwise returns an error.
    fn expect(&mut self, expected: Token) -> ParseResult<()> {
        if self.current_token == expected {
            self.advance();
            Ok(())
        } else {
            Err(ParseError::new(format!(
                "Expected {:?}, found {:?}",
                expected, self.current_token
            )))
        }
    }

    /// Consumes the current token as an identifier, or errors.
    fn expect_identifier(&mut self) -> ParseResult<String> {
        match self.current_token.clone() {
            Token::Identifier(s) => {
                self.advance();
                Ok(s)
            }
            other => Err(ParseError::new(format!(
                "Expected a reference, found {:?}",
                other
            ))),
        }
    }

    /// Entry point for expression parsing.
    fn parse_expression(&mut self) -> ParseResult<Expression> {
        self.parse_comparison()
    }

    /// Parses comparison expressions (=, <>, <, >, <=, >=).
    fn parse_comparison(&mut self) -> ParseResult<Expression> {
        let mut left = self.parse_concatenation()?;

        loop {
            let op = match &self.current_token {
                Token::Equals => BinaryOperator::Equal,
                Token::NotEqual => BinaryOperator::NotEqual,
                Token::LessThan => BinaryOperator::LessThan,
                Token::GreaterThan => BinaryOperator::GreaterThan,
                Token::LessEqual => BinaryOperator::LessEqual,
                Token::GreaterEqual => BinaryOperator::GreaterEqual,
                _ => break,
            };

            self.advance();
            let right = self.parse_concatenation()?;

            left = Expression::BinaryOp {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    /// Parses concatenation expressions (&).
    fn parse_concatenation(&mut self) -> ParseResult<Expression> {
        let mut left = self.parse_additive()?;

        while self.current_token == Token::Ampersand {
            self.advance();
            let right = self.parse_additive()?;

            left = Expression::BinaryOp {
                left: Box::new(left),
                op: BinaryOperator::Concat,
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    /// Parses additive expressions (+ and -).
    fn parse_additive(&mut self) -> ParseResult<Expression> {
        let mut left = self.parse_multiplicative()?;

        loop {
            let op = match &self.current_token {
                Token::Plus => BinaryOperator::Add,
                Token::Minus => BinaryOperator::Subtract,
                _ => break,
            };

            self.advance();
            let right = self.parse_multiplicative()?;

            left = Expression::BinaryOp {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    /// Parses multiplicative expressions (* and /).
    fn parse_multiplicative(&mut self) -> ParseResult<Expression> {
        let mut left = self.parse_unary()?;

        loop {
            let op = match &self.current_token {
                Token::Asterisk => BinaryOperator::Multiply,
                Token::Slash => BinaryOperator::Divide,
                _ => break,
            };

            self.advance();
            let right = self.parse_unary()?;

            left = Expression::BinaryOp {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    /// Parses unary expressions (+x, -x), recursing to allow stacking (e.g. --5).
    fn parse_unary(&mut self) -> ParseResult<Expression> {
        let op = match self.current_token {
            Token::Minus => UnaryOperator::Negate,
            Token::Plus => UnaryOperator::Plus,
            _ => return self.parse_primary(),
        };
        self.advance();
        let operand = self.parse_unary()?;
        Ok(Expression::UnaryOp {
            op,
            operand: Box::new(operand),
        })
    }

    /// Parses primary expressions (literals, references, function calls, parentheses).
    fn parse_primary(&mut self) -> ParseResult<Expression> {
        match self.current_token.clone() {
            // Dollar sign - start of an absolute column reference like $A1
            Token::Dollar => {
                self.advance();
                let text = self.expect_identifier()?;
                self.finish_reference(None, text, true)
            }

            Token::Number(n) => {
                self.advance();
                Ok(Expression::Literal(Literal::Number(n)))
            }

            Token::String(s) => {
                self.advance();
                Ok(Expression::Literal(Literal::Text(s)))
            }

            Token::Boolean(b) => {
                self.advance();
                Ok(Expression::Literal(Literal::Boolean(b)))
            }

            Token::ErrorLiteral(kind) => {
                self.advance();
                Ok(Expression::Literal(Literal::Error(kind)))
            }

            // Quoted identifier - must be a sheet-qualifier: 'Sheet Name'!A1
            Token::QuotedIdentifier(sheet_name) => {
                self.advance();
                self.expect(Token::Exclamation)?;
                self.parse_after_sheet(sheet_name)
            }

            // Identifier: sheet-qualifier, function call, or bare cell reference.
            Token::Identifier(name) => {
                self.advance();

                if self.current_token == Token::Exclamation {
                    self.advance();
                    return self.parse_after_sheet(name);
                }

                if self.current_token == Token::LParen {
                    return self.parse_function_call(name);
                }

                self.finish_reference(None, name, false)
            }

            // Parenthesized expression
            Token::LParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(Token::RParen)?;
                Ok(expr)
            }

            Token::EOF => Err(ParseError::new("Unexpected end of expression")),

            Token::Illegal(ch) => Err(ParseError::new(format!("Illegal character: {}", ch))),

            token => Err(ParseError::new(format!("Unexpected token: {:?}", token))),
        }
    }

    /// Parses whatever follows a sheet qualifier's '!' — always a reference.
    fn parse_after_sheet(&mut self, sheet: String) -> ParseResult<Expression> {
        let col_absolute = if self.current_token == Token::Dollar {
            self.advance();
            true
        } else {
            false
        };
        let text = self.expect_identifier()?;
        self.finish_reference(Some(sheet), text, col_absolute)
    }

    /// Finishes parsing a reference given its first cell-ref token text, building
    /// either a single `Cell` or, if a `:` follows, a `Range`.
    fn finish_reference(
        &mut self,
        sheet: Option<String>,
        text: String,
        col_absolute: bool,
    ) -> ParseResult<Expression> {
        let start = self.parse_cell_ref_tail(text, col_absolute)?;

        if self.current_token == Token::Colon {
            self.advance();
            let end_col_absolute = if self.current_token == Token::Dollar {
                self.advance();
                true
            } else {
                false
            };
            let end_text = self.expect_identifier()?;
            let end = self.parse_cell_ref_tail(end_text, end_col_absolute)?;
            Ok(Expression::Range {
                sheet,
                start: Box::new(start),
                end: Box::new(end),
            })
        } else {
            let mut cell = start;
            cell.sheet = sheet;
            Ok(Expression::Cell(cell))
        }
    }

    /// Completes a single cell reference from the identifier text already
    /// consumed. Handles both the merged "A1" form (letters then digits, one
    /// token from the lexer) and the "A$1" form, where the row arrives as a
    /// separate `$` + `Number` after a column-only identifier.
    fn parse_cell_ref_tail(&mut self, text: String, col_absolute: bool) -> ParseResult<CellRef> {
        if text.chars().all(|c| c.is_ascii_alphabetic()) {
            self.expect(Token::Dollar)?;
            let row = self.expect_row_number()?;
            Ok(CellRef {
                sheet: None,
                col: text.to_uppercase(),
                row,
                col_absolute,
                row_absolute: true,
            })
        } else {
            let (col, row) = self.split_cell_reference(&text)?;
            Ok(CellRef {
                sheet: None,
                col,
                row,
                col_absolute,
                row_absolute: false,
            })
        }
    }

    /// Consumes a `Number` token and interprets it as a 1-based row number.
    fn expect_row_number(&mut self) -> ParseResult<u32> {
        match self.current_token.clone() {
            Token::Number(n) => {
                self.advance();
                let row = decimal_to_row(n)?;
                if row == 0 {
                    return Err(ParseError::new("Row number must be >= 1"));
                }
                Ok(row)
            }
            other => Err(ParseError::new(format!(
                "Expected row number, found {:?}",
                other
            ))),
        }
    }

    /// Parses a function call like SUM(A1, A2, 10).
    /// Resolves the function name to a `FunctionId` enum at parse time (not
    /// every evaluation).
    fn parse_function_call(&mut self, name: String) -> ParseResult<Expression> {
        let func = FunctionId::from_name(&name);

        self.advance(); // consume '('

        let mut args = Vec::new();

        if self.current_token == Token::RParen {
            self.advance();
            return Ok(Expression::FunctionCall { func, args });
        }

        args.push(self.parse_expression()?);

        while self.current_token == Token::Comma {
            self.advance();
            args.push(self.parse_expression()?);
        }

        self.expect(Token::RParen)?;

        Ok(Expression::FunctionCall { func, args })
    }

    /// Splits a cell reference string like "A1" or "AA100" into column and row parts.
    fn split_cell_reference(&self, identifier: &str) -> ParseResult<(String, u32)> {
        let mut col = String::new();
        let mut row_str = String::new();

        for ch in identifier.chars() {
            if ch.is_ascii_alphabetic() {
                if !row_str.is_empty() {
                    return Err(ParseError::new(format!(
                        "Invalid cell reference: {}",
                        identifier
                    )));
                }
                col.push(ch);
            } else if ch.is_ascii_digit() {
                row_str.push(ch);
            } else {
                return Err(ParseError::new(format!(
                    "Invalid character in cell reference: {}",
                    ch
                )));
            }
        }

        if col.is_empty() {
            return Err(ParseError::new(format!(
                "Cell reference missing column: {}",
                identifier
            )));
        }

        if row_str.is_empty() {
            return Err(ParseError::new(format!(
                "Cell reference missing row: {}",
                identifier
            )));
        }

        let row: u32 = row_str.parse().map_err(|_| {
            ParseError::new(format!(
                "Invalid row number in cell reference: {}",
                identifier
            ))
        })?;

        if row == 0 {
            return Err(ParseError::new(format!(
                "Row number must be >= 1: {}",
                identifier
            )));
        }

        Ok((col.to_uppercase(), row))
    }
}

/// Truncates a decimal literal to an integer row number. Formula text never
/// contains fractional row numbers in practice, but a literal like `1.5:A1`
/// is rejected upstream by the grammar (a row number only ever arrives via
/// `expect_row_number`, immediately after `$`).
fn decimal_to_row(n: Decimal) -> ParseResult<u32> {
    let truncated = n.trunc();
    truncated
        .to_string()
        .parse::<u32>()
        .map_err(|_| ParseError::new(format!("Invalid row number: {}", n)))
}

/// Convenience function to parse a formula string directly.
pub fn parse(input: &str) -> ParseResult<Expression> {
    let mut parser = Parser::new(input);
    parser.parse()
}
