//! FILENAME: engine/src/address.rs
//! PURPOSE: A1-notation parsing/rendering and column<->index arithmetic.
//! CONTEXT: `Address` is the 0-based internal coordinate used everywhere a
//! cell location is needed (cell storage keys, dependency graph vertices,
//! region operations). Column letters and row numbers are converted here;
//! the `$` absolute markers live on the parser's `CellRef`/`Expression`
//! nodes, not on `Address` itself, since absoluteness is a property of a
//! formula's text, not of a storage location.

use std::fmt;

/// Highest addressable 0-based column index, corresponding to `ZZZZ`.
pub const MAX_COL: u32 = 475_253;
/// Highest addressable 0-based row index, corresponding to row `9999`.
pub const MAX_ROW: u32 = 9_998;

/// Converts column letters ("A", "AA", ...) to a 0-based column index.
/// The bijection is base-26 with 1-origin digits (A=1..Z=26): this twist
/// (rather than the usual 0-origin base-26) is what makes the mapping a
/// true bijection — no short name is a prefix collision of a longer one.
pub fn col_to_index(col_str: &str) -> Option<u32> {
    if col_str.is_empty() || !col_str.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let mut result: u64 = 0;
    for c in col_str.chars() {
        let digit = (c.to_ascii_uppercase() as u64) - ('A' as u64) + 1;
        result = result * 26 + digit;
        if result > MAX_COL as u64 + 1 {
            return None;
        }
    }
    Some((result - 1) as u32)
}

/// Converts a 0-based column index back to its letter representation.
pub fn index_to_col(mut col_index: u32) -> String {
    let mut result = String::new();
    loop {
        let remainder = col_index % 26;
        result.insert(0, (b'A' + remainder as u8) as char);
        if col_index < 26 {
            break;
        }
        col_index = col_index / 26 - 1;
    }
    result
}

/// A malformed or out-of-bounds address string, raised as a caller error
/// (never stored as a `CellValue::Error` — see `engine::error`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressError(pub String);

impl fmt::Display for AddressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid address: {}", self.0)
    }
}

impl std::error::Error for AddressError {}

/// A 0-based cell coordinate within a sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address {
    pub col: u32,
    pub row: u32,
}

impl Address {
    pub fn new(col: u32, row: u32) -> Self {
        Address { col, row }
    }

    /// Builds an address from the 1-based letters/row pair the parser hands
    /// back in a `CellRef` (column letters, 1-based row).
    pub fn from_a1_parts(col_letters: &str, row_1based: u32) -> Result<Self, AddressError> {
        if col_letters.is_empty() || col_letters.len() > 4 {
            return Err(AddressError(format!(
                "column out of range: {}",
                col_letters
            )));
        }
        let col = col_to_index(col_letters)
            .ok_or_else(|| AddressError(format!("invalid column: {}", col_letters)))?;
        if row_1based == 0 || row_1based > MAX_ROW + 1 {
            return Err(AddressError(format!("row out of range: {}", row_1based)));
        }
        Ok(Address {
            col,
            row: row_1based - 1,
        })
    }

    /// Parses a bare `A1`-style address: no `$`, no sheet qualifier. Used
    /// where a plain location string is expected (e.g. `INDIRECT` targets,
    /// region operation bounds).
    pub fn parse(s: &str) -> Result<Self, AddressError> {
        let col_part: String = s.chars().take_while(|c| c.is_ascii_alphabetic()).collect();
        let row_part = &s[col_part.len()..];
        if col_part.is_empty() || row_part.is_empty() || !row_part.chars().all(|c| c.is_ascii_digit()) {
            return Err(AddressError(format!("malformed address: {}", s)));
        }
        if row_part.starts_with('0') {
            return Err(AddressError(format!("malformed address: {}", s)));
        }
        let row: u32 = row_part
            .parse()
            .map_err(|_| AddressError(format!("malformed address: {}", s)))?;
        Self::from_a1_parts(&col_part, row)
    }

    pub fn col_letters(&self) -> String {
        index_to_col(self.col)
    }

    pub fn row_1based(&self) -> u32 {
        self.row + 1
    }

    pub fn to_a1(&self) -> String {
        format!("{}{}", self.col_letters(), self.row_1based())
    }

    /// Shifts this address by `(dx, dy)`, returning `None` if the result
    /// would fall outside `[A1, ZZZZ9999]`. Used by `rewrite::shift`.
    pub fn shift(&self, dx: i64, dy: i64) -> Option<Address> {
        let col = self.col as i64 + dx;
        let row = self.row as i64 + dy;
        if col < 0 || row < 0 || col > MAX_COL as i64 || row > MAX_ROW as i64 {
            return None;
        }
        Some(Address {
            col: col as u32,
            row: row as u32,
        })
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_a1())
    }
}

/// An axis-aligned rectangular region, normalized so `top_left <=
/// bottom_right` componentwise regardless of the order the two corners
/// were supplied in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub top_left: Address,
    pub bottom_right: Address,
}

impl Region {
    pub fn new(a: Address, b: Address) -> Self {
        Region {
            top_left: Address::new(a.col.min(b.col), a.row.min(b.row)),
            bottom_right: Address::new(a.col.max(b.col), a.row.max(b.row)),
        }
    }

    pub fn cols(&self) -> std::ops::RangeInclusive<u32> {
        self.top_left.col..=self.bottom_right.col
    }

    pub fn rows(&self) -> std::ops::RangeInclusive<u32> {
        self.top_left.row..=self.bottom_right.row
    }

    pub fn contains(&self, addr: &Address) -> bool {
        addr.col >= self.top_left.col
            && addr.col <= self.bottom_right.col
            && addr.row >= self.top_left.row
            && addr.row <= self.bottom_right.row
    }

    pub fn width(&self) -> u32 {
        self.bottom_right.col - self.top_left.col + 1
    }

    pub fn height(&self) -> u32 {
        self.bottom_right.row - self.top_left.row + 1
    }

    /// Every address in the region, row-major.
    pub fn addresses(&self) -> impl Iterator<Item = Address> + '_ {
        self.rows()
            .flat_map(move |row| self.cols().map(move |col| Address::new(col, row)))
    }
}
