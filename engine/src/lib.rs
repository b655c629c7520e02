//! FILENAME: engine/src/lib.rs
//! PURPOSE: Main library entry point for the spreadsheet calculation engine.
//! Re-exports the public surface: the value model, addressing, sheets, the
//! workbook (the single entry point for every mutation), and the errors a
//! caller can observe.

pub mod address;
pub mod cell;
pub mod error;
pub mod evaluator;
pub mod functions;
pub mod graph;
pub mod recompute;
pub mod region;
pub mod rewrite;
pub mod sheet;
pub mod value;
pub mod workbook;

pub use address::{Address, AddressError, Region};
pub use cell::Cell;
pub use error::{CallerError, CallerResult};
pub use recompute::CellChange;
pub use sheet::Sheet;
pub use value::{CellErrorKind, CellValue};
pub use workbook::{ChangeCallback, Workbook};
