//! Read embedded spreadsheet packages into plain cell grids.
//!
//! Only what chart formulas need is read: sheet names, shared strings and
//! cell values. Styles, formulas and defined names are ignored.

use crate::reader::attr_string;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use slidekit_core::workbook::CellRef;
use slidekit_core::{DataSourceReader, Error, PartName, Result, Value, Workbook};
use std::collections::HashMap;
use std::io::{Cursor, Read, Seek};
use zip::ZipArchive;

const WORKBOOK_MEMBER: &str = "xl/workbook.xml";
const WORKBOOK_RELS_MEMBER: &str = "xl/_rels/workbook.xml.rels";
const SHARED_STRINGS_MEMBER: &str = "xl/sharedStrings.xml";

#[derive(Debug, Default, Clone, Copy)]
pub struct XlsxReader;

impl XlsxReader {
    pub fn new() -> Self {
        Self
    }
}

impl DataSourceReader for XlsxReader {
    fn read_workbook(&self, bytes: &[u8]) -> Result<Workbook> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| Error::ZipError(format!("Failed to open workbook: {}", e)))?;

        let sheets = parse_sheet_list(&read_member(&mut archive, WORKBOOK_MEMBER)?)?;
        let targets = parse_workbook_rels(&read_member(&mut archive, WORKBOOK_RELS_MEMBER)?)?;
        let shared = if archive.by_name(SHARED_STRINGS_MEMBER).is_ok() {
            parse_shared_strings(&read_member(&mut archive, SHARED_STRINGS_MEMBER)?)?
        } else {
            Vec::new()
        };

        let mut workbook = Workbook::new();
        for (name, rel_id) in sheets {
            let Some(target) = targets.get(&rel_id) else {
                log::warn!("Sheet '{}' has no target for {}", name, rel_id);
                continue;
            };
            let member = PartName::resolve("/xl", target)?.member_name().to_string();
            let content = read_member(&mut archive, &member)?;
            let sheet = workbook.add_sheet(name.as_str());
            for (cell, value) in parse_cells(&content, &shared)? {
                sheet.set(cell, value);
            }
        }
        log::debug!("Read workbook with {} sheets", workbook.sheets.len());
        Ok(workbook)
    }
}

fn read_member<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> Result<String> {
    let mut file = archive
        .by_name(name)
        .map_err(|e| Error::ZipError(format!("Failed to read {}: {}", name, e)))?;
    let mut content = String::new();
    file.read_to_string(&mut content)?;
    Ok(content)
}

fn xml_error(member: &str, e: quick_xml::Error) -> Error {
    Error::XmlError(format!("Error parsing {}: {}", member, e))
}

fn attribute(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|attr| attr.key.as_ref() == key)
        .map(|attr| attr_string(&attr))
}

/// `(sheet name, relationship id)` in workbook order.
fn parse_sheet_list(xml: &str) -> Result<Vec<(String, String)>> {
    let mut sheets = Vec::new();
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    loop {
        match reader.read_event() {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e))
                if e.name().local_name().as_ref() == b"sheet" =>
            {
                let name = attribute(e, b"name").unwrap_or_default();
                if let Some(rel_id) = attribute(e, b"r:id") {
                    sheets.push((name, rel_id));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(WORKBOOK_MEMBER, e)),
            _ => {}
        }
    }
    Ok(sheets)
}

fn parse_workbook_rels(xml: &str) -> Result<HashMap<String, String>> {
    let mut targets = HashMap::new();
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    loop {
        match reader.read_event() {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e))
                if e.name().local_name().as_ref() == b"Relationship" =>
            {
                if let (Some(id), Some(target)) = (attribute(e, b"Id"), attribute(e, b"Target")) {
                    targets.insert(id, target);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(WORKBOOK_RELS_MEMBER, e)),
            _ => {}
        }
    }
    Ok(targets)
}

/// Shared strings in index order; rich-text runs are concatenated.
fn parse_shared_strings(xml: &str) -> Result<Vec<String>> {
    let mut strings = Vec::new();
    let mut reader = Reader::from_str(xml);
    let mut current: Option<String> = None;
    let mut in_text = false;
    let mut in_phonetic = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => match e.name().local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"rPh" => in_phonetic = true,
                b"t" => in_text = !in_phonetic,
                _ => {}
            },
            Ok(Event::Empty(ref e)) if e.name().local_name().as_ref() == b"si" => {
                strings.push(String::new());
            }
            Ok(Event::Text(e)) if in_text => {
                let text = e.unescape().map_err(|e| xml_error(SHARED_STRINGS_MEMBER, e))?;
                if let Some(current) = current.as_mut() {
                    current.push_str(&text);
                }
            }
            Ok(Event::End(ref e)) => match e.name().local_name().as_ref() {
                b"si" => strings.push(current.take().unwrap_or_default()),
                b"rPh" => in_phonetic = false,
                b"t" => in_text = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(SHARED_STRINGS_MEMBER, e)),
            _ => {}
        }
    }
    Ok(strings)
}

#[derive(Default)]
struct PendingCell {
    cell: Option<CellRef>,
    cell_type: String,
    raw: String,
}

impl PendingCell {
    fn value(self, shared: &[String]) -> Value {
        match self.cell_type.as_str() {
            "s" => self
                .raw
                .trim()
                .parse::<usize>()
                .ok()
                .and_then(|index| shared.get(index))
                .map(|s| Value::Text(s.clone()))
                .unwrap_or(Value::Empty),
            "str" | "inlineStr" | "e" => Value::Text(self.raw),
            "b" => Value::Bool(self.raw.trim() == "1"),
            _ if self.raw.is_empty() => Value::Empty,
            _ => Value::parse_number(self.raw.trim()),
        }
    }
}

fn parse_cells(xml: &str, shared: &[String]) -> Result<Vec<(CellRef, Value)>> {
    let mut cells = Vec::new();
    let mut reader = Reader::from_str(xml);
    let mut row: u32 = 0;
    let mut column: u32 = 0;
    let mut pending: Option<PendingCell> = None;
    let mut collecting = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => match e.name().local_name().as_ref() {
                b"row" => {
                    row = attribute(e, b"r")
                        .and_then(|r| r.parse().ok())
                        .unwrap_or(row + 1);
                    column = 0;
                }
                b"c" => {
                    let cell = attribute(e, b"r")
                        .and_then(|r| CellRef::parse(&r))
                        .unwrap_or(CellRef::new(row, column + 1));
                    column = cell.column;
                    pending = Some(PendingCell {
                        cell: Some(cell),
                        cell_type: attribute(e, b"t").unwrap_or_default(),
                        raw: String::new(),
                    });
                }
                b"v" | b"t" => collecting = pending.is_some(),
                _ => {}
            },
            Ok(Event::Empty(ref e)) if e.name().local_name().as_ref() == b"c" => {
                column = attribute(e, b"r")
                    .and_then(|r| CellRef::parse(&r))
                    .map(|cell| cell.column)
                    .unwrap_or(column + 1);
            }
            Ok(Event::Text(e)) if collecting => {
                let text = e.unescape().map_err(|e| xml_error("worksheet", e))?;
                if let Some(cell) = pending.as_mut() {
                    cell.raw.push_str(&text);
                }
            }
            Ok(Event::End(ref e)) => match e.name().local_name().as_ref() {
                b"v" | b"t" => collecting = false,
                b"c" => {
                    if let Some(mut cell) = pending.take() {
                        if let Some(at) = cell.cell.take() {
                            cells.push((at, cell.value(shared)));
                        }
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error("worksheet", e)),
            _ => {}
        }
    }
    Ok(cells)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::reader::tests::zip_of;

    /// A workbook with one sheet: A1 "Series", B1 "Revenue", A2..A3 labels,
    /// B2..B3 numbers.
    pub(crate) fn sample_workbook() -> Vec<u8> {
        zip_of(&[
            (
                "xl/workbook.xml",
                r#"<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="Sheet1" sheetId="1" r:id="rId1"/></sheets></workbook>"#,
            ),
            (
                "xl/_rels/workbook.xml.rels",
                r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/></Relationships>"#,
            ),
            (
                "xl/sharedStrings.xml",
                r#"<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="4" uniqueCount="4"><si><t>Series</t></si><si><t>Revenue</t></si><si><r><t>Q</t></r><r><t xml:space="preserve">1 </t></r></si><si><t>Q2</t></si></sst>"#,
            ),
            (
                "xl/worksheets/sheet1.xml",
                r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData><row r="1"><c r="A1" t="s"><v>0</v></c><c r="B1" t="s"><v>1</v></c></row><row r="2"><c r="A2" t="s"><v>2</v></c><c r="B2"><v>10.5</v></c><c r="C2" t="b"><v>1</v></c></row><row r="3"><c r="A3" t="s"><v>3</v></c><c r="B3"><v>20</v></c><c r="C3" t="inlineStr"><is><t>note</t></is></c></row></sheetData></worksheet>"#,
            ),
        ])
    }

    #[test]
    fn test_read_sample_workbook() {
        let workbook = XlsxReader::new().read_workbook(&sample_workbook()).unwrap();
        let sheet = workbook.sheet("Sheet1").unwrap();
        assert_eq!(sheet.get(CellRef::new(1, 2)), Some(&Value::Text("Revenue".to_string())));
        assert_eq!(sheet.get(CellRef::new(2, 1)), Some(&Value::Text("Q1 ".to_string())));
        assert_eq!(sheet.get(CellRef::new(2, 2)), Some(&Value::Number(10.5)));
        assert_eq!(sheet.get(CellRef::new(2, 3)), Some(&Value::Bool(true)));
        assert_eq!(sheet.get(CellRef::new(3, 3)), Some(&Value::Text("note".to_string())));
    }

    #[test]
    fn test_evaluate_range() {
        let workbook = XlsxReader::new().read_workbook(&sample_workbook()).unwrap();
        let values = workbook.evaluate("Sheet1!$B$2:$B$3").unwrap();
        assert_eq!(values, vec![Value::Number(10.5), Value::Number(20.0)]);
    }

    #[test]
    fn test_cells_without_reference() {
        let xml = r#"<worksheet><sheetData><row r="4"><c><v>1</v></c><c t="str"><v>x</v></c></row></sheetData></worksheet>"#;
        let cells = parse_cells(xml, &[]).unwrap();
        assert_eq!(cells[0], (CellRef::new(4, 1), Value::Number(1.0)));
        assert_eq!(cells[1], (CellRef::new(4, 2), Value::Text("x".to_string())));
    }

    #[test]
    fn test_not_a_workbook() {
        let result = XlsxReader::new().read_workbook(b"garbage");
        assert!(matches!(result, Err(Error::ZipError(_))));
    }
}
