//! Dual-source values of chart series: a literal cache stored in the chart, or a
//! formula into the embedded workbook.
//!
//! Reads prefer the cache and only touch the workbook when no cache holds the
//! value. Writes always land in the cache and detach the formula, turning the
//! value into a self-contained literal.

use crate::chart::{
    self, categories_element, series_element_mut, series_elements, value_record, values_element,
    MAX_CACHE_POINTS,
};
use crate::constants::relationship_type as rt;
use crate::error::{Error, Result};
use crate::graph::{PartContent, PartGraph, PartRef};
use crate::types::PartKind;
use crate::workbook::DataSourceReader;
use crate::xml::XmlElement;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A cell or cache value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Text(String),
    Number(f64),
    Bool(bool),
    Empty,
}

impl Value {
    /// Parse a numeric cache entry, keeping non-numeric text as text.
    pub fn parse_number(text: &str) -> Self {
        match text.trim().parse::<f64>() {
            Ok(n) => Value::Number(n),
            Err(_) if text.is_empty() => Value::Empty,
            Err(_) => Value::Text(text.to_string()),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Value::Empty)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(text) => f.write_str(text),
            Value::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            Value::Number(n) => write!(f, "{}", n),
            Value::Bool(true) => f.write_str("TRUE"),
            Value::Bool(false) => f.write_str("FALSE"),
            Value::Empty => Ok(()),
        }
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Value::Text(text.to_string())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CachePoint {
    pub index: u32,
    pub value: Value,
}

/// Literal values stored in the chart part (`c:strCache`, `c:numCache`, literals).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueCache {
    pub format_code: Option<String>,
    pub count: u32,
    pub points: Vec<CachePoint>,
}

impl ValueCache {
    pub fn point(&self, index: usize) -> Option<&Value> {
        self.points
            .iter()
            .find(|p| p.index as usize == index)
            .map(|p| &p.value)
    }

    /// All values up to the point count, gaps as [`Value::Empty`].
    ///
    /// Points at or beyond [`MAX_CACHE_POINTS`] are dropped.
    pub fn expand(&self) -> Vec<Value> {
        let len = self
            .points
            .iter()
            .map(|p| p.index.saturating_add(1))
            .max()
            .unwrap_or(0)
            .max(self.count)
            .min(MAX_CACHE_POINTS) as usize;
        let mut values = vec![Value::Empty; len];
        for point in &self.points {
            if let Some(slot) = values.get_mut(point.index as usize) {
                *slot = point.value.clone();
            }
        }
        values
    }
}

/// What a chart stores for one name or value list: a formula, a cache, or both.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueRecord {
    pub formula: Option<String>,
    pub cache: Option<ValueCache>,
}

/// Addresses a value inside a chart. Series and points are 0-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueTarget {
    SeriesName { series: usize },
    SeriesPoint { series: usize, point: usize },
    Category { series: usize, point: usize },
}

impl ValueTarget {
    pub fn series(&self) -> usize {
        match *self {
            ValueTarget::SeriesName { series }
            | ValueTarget::SeriesPoint { series, .. }
            | ValueTarget::Category { series, .. } => series,
        }
    }

    pub fn point(&self) -> Option<usize> {
        match *self {
            ValueTarget::SeriesName { .. } => None,
            ValueTarget::SeriesPoint { point, .. } | ValueTarget::Category { point, .. } => {
                Some(point)
            }
        }
    }
}

impl fmt::Display for ValueTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueTarget::SeriesName { series } => write!(f, "name of series {}", series),
            ValueTarget::SeriesPoint { series, point } => {
                write!(f, "point {} of series {}", point, series)
            }
            ValueTarget::Category { series, point } => {
                write!(f, "category {} of series {}", point, series)
            }
        }
    }
}

/// Whether a series has a name, and where it comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NameState {
    /// No name at all.
    Absent,
    /// Only a formula; the name is not materialized in the chart yet.
    FormulaOnly,
    /// A cached literal is present.
    Cached,
}

fn record_for(series: &XmlElement, target: ValueTarget) -> Result<Option<ValueRecord>> {
    let container = match target {
        ValueTarget::SeriesName { .. } => series.child("tx"),
        ValueTarget::SeriesPoint { .. } => values_element(series),
        ValueTarget::Category { .. } => categories_element(series),
    };
    match container {
        Some(container) => value_record(container),
        None => Ok(None),
    }
}

fn series_at(chart_space: &XmlElement, index: usize) -> Result<&XmlElement> {
    let all = series_elements(chart_space);
    let len = all.len();
    all.into_iter()
        .nth(index)
        .ok_or_else(|| Error::index_range(index, 0, len.saturating_sub(1)))
}

/// Resolves and writes chart values, reading embedded workbooks through `reader`.
pub struct ValueResolver<'r> {
    reader: &'r dyn DataSourceReader,
}

impl<'r> ValueResolver<'r> {
    pub fn new(reader: &'r dyn DataSourceReader) -> Self {
        Self { reader }
    }

    pub fn series_count(&self, graph: &PartGraph, chart: PartRef) -> Result<usize> {
        Ok(series_elements(&graph.xml(chart)?.root).len())
    }

    /// Resolve one value, from the cache when present, else through the formula.
    pub fn get_value(&self, graph: &PartGraph, chart: PartRef, target: ValueTarget) -> Result<Value> {
        let series = series_at(&graph.xml(chart)?.root, target.series())?;
        let record = record_for(series, target)?.ok_or_else(|| {
            Error::MissingValue(format!("{} in {}", target, graph.get(chart).map_or("?", |p| p.name.as_str())))
        })?;
        let index = target.point().unwrap_or(0);

        if let Some(cache) = &record.cache {
            if let Some(value) = cache.point(index) {
                return Ok(value.clone());
            }
            if index < cache.count as usize {
                return Ok(Value::Empty);
            }
        }

        match (&record.formula, &record.cache) {
            (Some(formula), _) => {
                let values = self.evaluate(graph, chart, formula)?;
                let len = values.len();
                values
                    .into_iter()
                    .nth(index)
                    .ok_or_else(|| Error::index_range(index, 0, len.saturating_sub(1)))
            }
            (None, Some(cache)) if target.point().is_some() && cache.count > 0 => {
                Err(Error::index_range(index, 0, cache.count as usize - 1))
            }
            (None, _) => Err(Error::MissingValue(target.to_string())),
        }
    }

    /// Every value of a series' value list.
    pub fn values(&self, graph: &PartGraph, chart: PartRef, series: usize) -> Result<Vec<Value>> {
        self.resolve_all(graph, chart, ValueTarget::SeriesPoint { series, point: 0 })
    }

    /// Every category label of a series.
    pub fn categories(&self, graph: &PartGraph, chart: PartRef, series: usize) -> Result<Vec<Value>> {
        self.resolve_all(graph, chart, ValueTarget::Category { series, point: 0 })
    }

    fn resolve_all(&self, graph: &PartGraph, chart: PartRef, target: ValueTarget) -> Result<Vec<Value>> {
        let series = series_at(&graph.xml(chart)?.root, target.series())?;
        match record_for(series, target)? {
            Some(ValueRecord { cache: Some(cache), .. }) => Ok(cache.expand()),
            Some(ValueRecord { formula: Some(formula), .. }) => self.evaluate(graph, chart, &formula),
            _ => Ok(Vec::new()),
        }
    }

    pub fn name_state(&self, graph: &PartGraph, chart: PartRef, series: usize) -> Result<NameState> {
        let element = series_at(&graph.xml(chart)?.root, series)?;
        Ok(match record_for(element, ValueTarget::SeriesName { series })? {
            Some(ValueRecord { cache: Some(_), .. }) => NameState::Cached,
            Some(ValueRecord { formula: Some(_), .. }) => NameState::FormulaOnly,
            _ => NameState::Absent,
        })
    }

    /// True only when the name is materialized in a cache.
    pub fn has_name(&self, graph: &PartGraph, chart: PartRef, series: usize) -> Result<bool> {
        Ok(self.name_state(graph, chart, series)? == NameState::Cached)
    }

    /// Write a literal value and detach any formula from the written record.
    pub fn set_value(
        &self,
        graph: &mut PartGraph,
        chart: PartRef,
        target: ValueTarget,
        value: Value,
    ) -> Result<()> {
        match target {
            ValueTarget::SeriesName { series } => {
                let root = &mut graph.xml_mut(chart)?.root;
                let len = series_elements(root).len();
                let element = series_element_mut(root, series)
                    .ok_or_else(|| Error::index_range(series, 0, len.saturating_sub(1)))?;
                write_name(element, &value.to_string());
            }
            ValueTarget::SeriesPoint { series, point } | ValueTarget::Category { series, point } => {
                // Materialize the whole list first so detaching the formula loses nothing.
                let mut values = self.resolve_all(graph, chart, target)?;
                if point >= values.len() {
                    return Err(Error::index_range(point, 0, values.len().saturating_sub(1)));
                }
                values[point] = value;

                let root = &mut graph.xml_mut(chart)?.root;
                let len = series_elements(root).len();
                let element = series_element_mut(root, series)
                    .ok_or_else(|| Error::index_range(series, 0, len.saturating_sub(1)))?;
                let container = match target {
                    ValueTarget::Category { .. } => list_container(element, "cat", "xVal", chart::BEFORE_CATEGORIES),
                    _ => list_container(element, "val", "yVal", chart::BEFORE_VALUES),
                };
                let numeric = matches!(target, ValueTarget::SeriesPoint { .. });
                write_points(container, &values, numeric);
            }
        }
        log::debug!("wrote literal {} in {}", target, chart);
        Ok(())
    }

    fn evaluate(&self, graph: &PartGraph, chart: PartRef, formula: &str) -> Result<Vec<Value>> {
        let source = self.data_source(graph, chart).ok_or_else(|| {
            Error::unresolvable(formula, "chart has no embedded data source")
        })?;
        let PartContent::DataSource(embedded) = &graph.get(source)?.content else {
            return Err(Error::unresolvable(formula, "data source part is not a workbook"));
        };
        let workbook = embedded
            .workbook(self.reader)
            .map_err(|e| Error::unresolvable(formula, e.to_string()))?;
        workbook.evaluate(formula)
    }

    /// The embedded workbook named by `c:externalData`, else the first package relationship.
    fn data_source(&self, graph: &PartGraph, chart: PartRef) -> Option<PartRef> {
        let root = &graph.xml(chart).ok()?.root;
        let source = match chart::external_data_rel(root) {
            Some(id) => graph.resolve(chart, &id).ok()?,
            None => graph.first_related(chart, rt::PACKAGE)?,
        };
        (graph.part(source)?.kind == PartKind::EmbeddedDataSource).then_some(source)
    }
}

/// Write a series name into `c:tx/c:strRef/c:strCache`, dropping the formula.
fn write_name(series: &mut XmlElement, name: &str) {
    let tx = series.ensure_child("tx", &["idx", "order"]);
    tx.remove_children("v");
    let str_ref = tx.ensure_child("strRef", &[]);
    str_ref.remove_children("f");
    let cache = str_ref.ensure_child("strCache", &["f"]);
    if cache.child("ptCount").is_none() {
        cache.ensure_child("ptCount", &[]).set_attr("val", "1");
    }
    let pt = cache.ensure_child("pt", &["ptCount"]);
    if pt.attr("idx").is_none() {
        pt.set_attr("idx", "0");
    }
    pt.ensure_child("v", &[]).set_text(name);
}

fn list_container<'a>(
    series: &'a mut XmlElement,
    name: &str,
    alternate: &str,
    after: &[&str],
) -> &'a mut XmlElement {
    let local = if series.child(name).is_none() && series.child(alternate).is_some() {
        alternate
    } else {
        name
    };
    series.ensure_child(local, after)
}

/// Replace the cached points of a value list and detach its formula.
fn write_points(container: &mut XmlElement, values: &[Value], numeric: bool) {
    let literal = ["numLit", "strLit"]
        .into_iter()
        .find(|name| container.child(name).is_some());
    let reference = ["numRef", "strRef"]
        .into_iter()
        .find(|name| container.child(name).is_some());

    let cache = match (literal, reference) {
        (Some(literal), None) => container.ensure_child(literal, &[]),
        (_, reference) => {
            // Multi-level categories collapse into a flat string cache.
            container.remove_children("multiLvlStrRef");
            let reference = reference.unwrap_or(if numeric { "numRef" } else { "strRef" });
            let cache_name = if reference == "numRef" { "numCache" } else { "strCache" };
            let r = container.ensure_child(reference, &[]);
            r.remove_children("f");
            r.ensure_child(cache_name, &["f"])
        }
    };

    cache.remove_children("pt");
    cache
        .ensure_child("ptCount", &["formatCode"])
        .set_attr("val", values.len().to_string());

    let mut at = cache
        .elements()
        .position(|e| e.local_name() == "extLst")
        .unwrap_or_else(|| cache.elements().count());
    for (index, value) in values.iter().enumerate() {
        if value.is_empty() {
            continue;
        }
        let pt = XmlElement::new(cache.qualify("pt"))
            .with_attr("idx", index.to_string())
            .with_child(XmlElement::new(cache.qualify("v")).with_text(value.to_string()));
        cache.insert_element(at, pt);
        at += 1;
    }
}
