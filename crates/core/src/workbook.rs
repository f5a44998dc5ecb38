//! Embedded spreadsheet data sources and the cell-reference formulas charts use
//! to point into them.

use crate::error::{Error, Result};
use crate::value::Value;
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{LazyLock, OnceLock};

static RANGE_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:'((?:[^']|'')+)'|([^!'\s]+))!\$?([A-Za-z]{1,3})\$?(\d+)(?::\$?([A-Za-z]{1,3})\$?(\d+))?$",
    )
    .unwrap()
});

static CELL_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\$?([A-Za-z]{1,3})\$?(\d+)$").unwrap());

/// A 1-based cell position. Orders row-major.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellRef {
    pub row: u32,
    pub column: u32,
}

impl CellRef {
    pub fn new(row: u32, column: u32) -> Self {
        Self { row, column }
    }

    /// Parse an A1-style reference, with or without `$` anchors.
    pub fn parse(reference: &str) -> Option<Self> {
        let caps = CELL_REF.captures(reference.trim())?;
        Self::from_parts(&caps[1], &caps[2])
    }

    fn from_parts(column: &str, row: &str) -> Option<Self> {
        let column = column
            .bytes()
            .try_fold(0u32, |acc, b| {
                let digit = (b.to_ascii_uppercase() as u32).checked_sub(b'A' as u32)? + 1;
                acc.checked_mul(26)?.checked_add(digit)
            })?;
        let row: u32 = row.parse().ok()?;
        if row == 0 || column == 0 {
            return None;
        }
        Some(Self { row, column })
    }

    fn column_name(&self) -> String {
        let mut n = self.column;
        let mut name = Vec::new();
        while n > 0 {
            let rem = ((n - 1) % 26) as u8;
            name.push(b'A' + rem);
            n = (n - 1) / 26;
        }
        name.reverse();
        String::from_utf8_lossy(&name).into_owned()
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.column_name(), self.row)
    }
}

/// A rectangular range on one sheet, e.g. `'Sales 2024'!$B$2:$B$5`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetRange {
    pub sheet: String,
    pub start: CellRef,
    pub end: CellRef,
}

impl SheetRange {
    pub fn parse(reference: &str) -> Option<Self> {
        let caps = RANGE_REF.captures(reference.trim())?;
        let sheet = match caps.get(1) {
            Some(quoted) => quoted.as_str().replace("''", "'"),
            None => caps.get(2)?.as_str().to_string(),
        };
        let start = CellRef::from_parts(&caps[3], &caps[4])?;
        let end = match (caps.get(5), caps.get(6)) {
            (Some(column), Some(row)) => CellRef::from_parts(column.as_str(), row.as_str())?,
            _ => start,
        };
        Some(Self {
            sheet,
            start: CellRef::new(start.row.min(end.row), start.column.min(end.column)),
            end: CellRef::new(start.row.max(end.row), start.column.max(end.column)),
        })
    }

    pub fn is_single_cell(&self) -> bool {
        self.start == self.end
    }

    /// Cells of the range in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = CellRef> + '_ {
        (self.start.row..=self.end.row).flat_map(move |row| {
            (self.start.column..=self.end.column).map(move |column| CellRef::new(row, column))
        })
    }
}

/// Split a chart formula into its ranges.
///
/// Accepts a single range, or a comma separated list optionally wrapped in
/// parentheses, as charts write for non-contiguous selections.
pub fn parse_formula(formula: &str) -> Result<Vec<SheetRange>> {
    let mut body = formula.trim().trim_start_matches('=');
    if body.starts_with('(') && body.ends_with(')') {
        body = &body[1..body.len() - 1];
    }

    let mut ranges = Vec::new();
    for piece in split_outside_quotes(body) {
        let range = SheetRange::parse(piece)
            .ok_or_else(|| Error::unresolvable(formula, format!("cannot parse '{}'", piece)))?;
        ranges.push(range);
    }
    if ranges.is_empty() {
        return Err(Error::unresolvable(formula, "empty formula"));
    }
    Ok(ranges)
}

fn split_outside_quotes(body: &str) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (i, c) in body.char_indices() {
        match c {
            '\'' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                pieces.push(body[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    let last = body[start..].trim();
    if !last.is_empty() {
        pieces.push(last);
    }
    pieces
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Worksheet {
    pub name: String,
    pub cells: BTreeMap<CellRef, Value>,
}

impl Worksheet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cells: BTreeMap::new(),
        }
    }

    pub fn set(&mut self, cell: CellRef, value: Value) {
        self.cells.insert(cell, value);
    }

    pub fn get(&self, cell: CellRef) -> Option<&Value> {
        self.cells.get(&cell)
    }
}

/// Cell values of a spreadsheet, as far as charts need them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Workbook {
    pub sheets: Vec<Worksheet>,
}

impl Workbook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_sheet(&mut self, name: impl Into<String>) -> &mut Worksheet {
        self.sheets.push(Worksheet::new(name));
        let last = self.sheets.len() - 1;
        &mut self.sheets[last]
    }

    /// Sheet lookup; names compare case-insensitively like the spreadsheet does.
    pub fn sheet(&self, name: &str) -> Option<&Worksheet> {
        self.sheets
            .iter()
            .find(|sheet| sheet.name.eq_ignore_ascii_case(name))
    }

    /// Evaluate a chart formula to the values of its cells, in order.
    ///
    /// Gaps inside a range read as [`Value::Empty`]; a single-cell reference to
    /// a cell that does not exist cannot be resolved.
    pub fn evaluate(&self, formula: &str) -> Result<Vec<Value>> {
        let mut values = Vec::new();
        for range in parse_formula(formula)? {
            let sheet = self.sheet(&range.sheet).ok_or_else(|| {
                Error::unresolvable(formula, format!("sheet '{}' not found", range.sheet))
            })?;
            if range.is_single_cell() && sheet.get(range.start).is_none() {
                return Err(Error::unresolvable(
                    formula,
                    format!("cell {} not found on '{}'", range.start, sheet.name),
                ));
            }
            values.extend(
                range
                    .cells()
                    .map(|cell| sheet.get(cell).cloned().unwrap_or(Value::Empty)),
            );
        }
        Ok(values)
    }
}

/// Decodes the bytes of an embedded data source into a [`Workbook`].
pub trait DataSourceReader {
    fn read_workbook(&self, bytes: &[u8]) -> Result<Workbook>;
}

/// Content of an embedded data-source part: the raw package bytes plus the
/// workbook parsed from them on first use.
#[derive(Clone, Default)]
pub struct EmbeddedWorkbook {
    bytes: Vec<u8>,
    parsed: OnceLock<Workbook>,
}

impl EmbeddedWorkbook {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            parsed: OnceLock::new(),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn is_parsed(&self) -> bool {
        self.parsed.get().is_some()
    }

    /// The parsed workbook, reading it with `reader` the first time.
    pub fn workbook(&self, reader: &dyn DataSourceReader) -> Result<&Workbook> {
        if let Some(workbook) = self.parsed.get() {
            return Ok(workbook);
        }
        let workbook = reader.read_workbook(&self.bytes)?;
        Ok(self.parsed.get_or_init(|| workbook))
    }
}

impl fmt::Debug for EmbeddedWorkbook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddedWorkbook")
            .field("len", &self.bytes.len())
            .field("parsed", &self.is_parsed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn sales() -> Workbook {
        let mut workbook = Workbook::new();
        let sheet = workbook.add_sheet("Sheet1");
        sheet.set(CellRef::new(1, 2), Value::Text("Revenue".to_string()));
        sheet.set(CellRef::new(2, 2), Value::Number(10.0));
        sheet.set(CellRef::new(4, 2), Value::Number(30.0));
        let other = workbook.add_sheet("Q1 Data");
        other.set(CellRef::new(1, 1), Value::Text("It's".to_string()));
        workbook
    }

    #[test]
    fn test_cell_ref_parse() {
        assert_eq!(CellRef::parse("$B$1"), Some(CellRef::new(1, 2)));
        assert_eq!(CellRef::parse("aa10"), Some(CellRef::new(10, 27)));
        assert_eq!(CellRef::parse("A0"), None);
        assert_eq!(CellRef::new(3, 28).to_string(), "AB3");
    }

    #[test]
    fn test_sheet_range_parse() {
        let range = SheetRange::parse("'Q1 Data'!$A$1:$A$3").unwrap();
        assert_eq!(range.sheet, "Q1 Data");
        assert_eq!(range.start, CellRef::new(1, 1));
        assert_eq!(range.end, CellRef::new(3, 1));

        let range = SheetRange::parse("'It''s'!C2").unwrap();
        assert_eq!(range.sheet, "It's");
        assert!(range.is_single_cell());

        assert!(SheetRange::parse("B1").is_none());
    }

    #[test]
    fn test_evaluate_single_cell() {
        let values = sales().evaluate("Sheet1!$B$1").unwrap();
        assert_eq!(values, vec![Value::Text("Revenue".to_string())]);
    }

    #[test]
    fn test_evaluate_range_with_gap() {
        let values = sales().evaluate("Sheet1!$B$2:$B$4").unwrap();
        assert_eq!(values, vec![Value::Number(10.0), Value::Empty, Value::Number(30.0)]);
    }

    #[test]
    fn test_evaluate_list() {
        let values = sales().evaluate("(Sheet1!$B$2,'Q1 Data'!A1)").unwrap();
        assert_eq!(values.len(), 2);
        assert_eq!(values[1], Value::Text("It's".to_string()));
    }

    #[test]
    fn test_evaluate_sheet_name_is_case_insensitive() {
        assert!(sales().evaluate("sheet1!B1").is_ok());
    }

    #[test]
    fn test_evaluate_unresolvable() {
        let workbook = sales();
        assert!(matches!(
            workbook.evaluate("Missing!A1"),
            Err(Error::UnresolvableFormula { .. })
        ));
        assert!(matches!(
            workbook.evaluate("Sheet1!Z99"),
            Err(Error::UnresolvableFormula { .. })
        ));
        assert!(matches!(
            workbook.evaluate("not a formula"),
            Err(Error::UnresolvableFormula { .. })
        ));
    }

    struct CountingReader {
        calls: Cell<usize>,
    }

    impl DataSourceReader for CountingReader {
        fn read_workbook(&self, _bytes: &[u8]) -> Result<Workbook> {
            self.calls.set(self.calls.get() + 1);
            Ok(sales())
        }
    }

    #[test]
    fn test_embedded_workbook_parses_once() {
        let reader = CountingReader { calls: Cell::new(0) };
        let embedded = EmbeddedWorkbook::new(vec![1, 2, 3]);
        assert!(!embedded.is_parsed());

        embedded.workbook(&reader).unwrap();
        embedded.workbook(&reader).unwrap();
        assert_eq!(reader.calls.get(), 1);
        assert!(embedded.is_parsed());
    }
}
