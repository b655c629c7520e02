//! FILENAME: engine/src/error.rs
//! PURPOSE: Caller-visible errors (spec.md §7 channel 1): invalid
//! arguments raised synchronously before any workbook mutation.
//! CONTEXT: Distinct from `CellValue::Error` (channel 2), which is never
//! raised as a Rust error and is only ever observed via a cell's value.

use thiserror::Error;

/// Errors raised by a public `Workbook`/`Sheet` mutation before any state
/// changes. None of these variants can ever be produced mid-mutation —
/// every public method validates its arguments up front.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallerError {
    #[error("invalid sheet name: {0}")]
    InvalidSheetName(String),

    #[error("a sheet named {0:?} already exists")]
    DuplicateSheetName(String),

    #[error("unknown sheet: {0:?}")]
    UnknownSheet(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("index out of range: {0}")]
    IndexOutOfRange(usize),

    #[error("malformed region: {0}")]
    MalformedRegion(String),

    #[error("invalid sort spec: {0}")]
    InvalidSortSpec(String),
}

pub type CallerResult<T> = Result<T, CallerError>;
