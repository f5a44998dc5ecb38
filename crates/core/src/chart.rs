//! Navigation helpers over chart part XML (`c:chartSpace`).

use crate::error::{Error, Result};
use crate::value::{CachePoint, Value, ValueCache, ValueRecord};
use crate::xml::XmlElement;
use crate::types::RelId;
use serde::{Deserialize, Serialize};

/// Upper bound on cached points per list, the row count of a worksheet.
pub const MAX_CACHE_POINTS: u32 = 1_048_576;

/// Plot group elements that hold `c:ser` children.
const PLOT_GROUPS: &[&str] = &[
    "areaChart",
    "area3DChart",
    "lineChart",
    "line3DChart",
    "stockChart",
    "radarChart",
    "scatterChart",
    "pieChart",
    "pie3DChart",
    "doughnutChart",
    "barChart",
    "bar3DChart",
    "ofPieChart",
    "surfaceChart",
    "surface3DChart",
    "bubbleChart",
];

/// Children of `c:ser` that may precede the values element.
pub(crate) const BEFORE_VALUES: &[&str] = &[
    "idx",
    "order",
    "tx",
    "spPr",
    "invertIfNegative",
    "pictureOptions",
    "marker",
    "explosion",
    "dPt",
    "dLbls",
    "trendline",
    "errBars",
    "cat",
    "xVal",
];

/// Children of `c:ser` that may precede the categories element.
pub(crate) const BEFORE_CATEGORIES: &[&str] = &[
    "idx",
    "order",
    "tx",
    "spPr",
    "invertIfNegative",
    "pictureOptions",
    "marker",
    "explosion",
    "dPt",
    "dLbls",
    "trendline",
    "errBars",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChartType {
    Area,
    Bar,
    Bubble,
    Doughnut,
    Line,
    Pie,
    Radar,
    Scatter,
    Stock,
    Surface,
}

impl ChartType {
    fn from_plot_group(local: &str) -> Option<Self> {
        Some(match local {
            "areaChart" | "area3DChart" => Self::Area,
            "barChart" | "bar3DChart" => Self::Bar,
            "bubbleChart" => Self::Bubble,
            "doughnutChart" => Self::Doughnut,
            "lineChart" | "line3DChart" => Self::Line,
            "pieChart" | "pie3DChart" | "ofPieChart" => Self::Pie,
            "radarChart" => Self::Radar,
            "scatterChart" => Self::Scatter,
            "stockChart" => Self::Stock,
            "surfaceChart" | "surface3DChart" => Self::Surface,
            _ => return None,
        })
    }
}

fn plot_groups(chart_space: &XmlElement) -> impl Iterator<Item = &XmlElement> {
    chart_space
        .path(&["chart", "plotArea"])
        .into_iter()
        .flat_map(|plot_area| plot_area.elements())
        .filter(|group| PLOT_GROUPS.contains(&group.local_name()))
}

/// Chart type of the first plot group.
pub fn chart_type(chart_space: &XmlElement) -> Option<ChartType> {
    plot_groups(chart_space).find_map(|group| ChartType::from_plot_group(group.local_name()))
}

/// Every `c:ser` of the chart, across plot groups, in document order.
pub fn series_elements(chart_space: &XmlElement) -> Vec<&XmlElement> {
    plot_groups(chart_space)
        .flat_map(|group| group.children_named("ser"))
        .collect()
}

pub fn series_element_mut(chart_space: &mut XmlElement, index: usize) -> Option<&mut XmlElement> {
    chart_space
        .path_mut(&["chart", "plotArea"])?
        .elements_mut()
        .filter(|group| PLOT_GROUPS.contains(&group.local_name()))
        .flat_map(|group| group.elements_mut().filter(|e| e.local_name() == "ser"))
        .nth(index)
}

/// The `c:val` (or `c:yVal` for scatter and bubble charts) element of a series.
pub fn values_element(series: &XmlElement) -> Option<&XmlElement> {
    series.child("val").or_else(|| series.child("yVal"))
}

/// The `c:cat` (or `c:xVal`) element of a series.
pub fn categories_element(series: &XmlElement) -> Option<&XmlElement> {
    series.child("cat").or_else(|| series.child("xVal"))
}

/// Relationship id of `c:externalData`, which names the embedded workbook.
pub fn external_data_rel(chart_space: &XmlElement) -> Option<RelId> {
    let external = chart_space.child("externalData")?;
    external
        .attributes
        .iter()
        .find(|(key, _)| key.ends_with(":id"))
        .map(|(_, value)| RelId::new(value.as_str()))
        .filter(|id| !id.as_str().is_empty())
}

/// Read the value record held by a `c:tx`, `c:cat`, `c:val` or similar element.
///
/// Fails with [`Error::CorruptedPackage`] when a cache has an unreadable point
/// index or more points than [`MAX_CACHE_POINTS`].
pub fn value_record(container: &XmlElement) -> Result<Option<ValueRecord>> {
    for reference in ["strRef", "numRef", "multiLvlStrRef"] {
        if let Some(r) = container.child(reference) {
            let formula = r.child("f").map(|f| f.text()).filter(|f| !f.trim().is_empty());
            let cache = ["strCache", "numCache", "multiLvlStrCache"]
                .iter()
                .find_map(|name| r.child(name))
                .map(read_cache)
                .transpose()?;
            return Ok(Some(ValueRecord { formula, cache }));
        }
    }

    if let Some(literal) = container.child("strLit").or_else(|| container.child("numLit")) {
        return Ok(Some(ValueRecord {
            formula: None,
            cache: Some(read_cache(literal)?),
        }));
    }

    // `c:tx` may carry the name directly as `c:v`.
    Ok(container.child("v").map(|v| ValueRecord {
        formula: None,
        cache: Some(ValueCache {
            format_code: None,
            count: 1,
            points: vec![CachePoint {
                index: 0,
                value: Value::Text(v.text()),
            }],
        }),
    }))
}

fn read_cache(cache: &XmlElement) -> Result<ValueCache> {
    let mut values = if cache.local_name() == "multiLvlStrCache" {
        // Multi-level category caches keep the innermost level first.
        match cache.child("lvl") {
            Some(level) => read_points(level, false)?,
            None => ValueCache::default(),
        }
    } else {
        read_points(cache, matches!(cache.local_name(), "numCache" | "numLit"))?
    };
    if values.format_code.is_none() {
        values.format_code = cache.child("formatCode").map(|f| f.text());
    }
    values.count = values.count.max(count_of(cache)?);
    Ok(values)
}

fn count_of(cache: &XmlElement) -> Result<u32> {
    let Some(val) = cache.child("ptCount").and_then(|c| c.attr("val")) else {
        return Ok(0);
    };
    match val.trim().parse::<u32>() {
        Ok(count) if count <= MAX_CACHE_POINTS => Ok(count),
        _ => Err(Error::CorruptedPackage(format!(
            "invalid chart cache point count '{}'",
            val
        ))),
    }
}

fn read_points(container: &XmlElement, numeric: bool) -> Result<ValueCache> {
    let mut points = Vec::new();
    let mut count = 0u32;
    for pt in container.children_named("pt") {
        let raw = pt.attr("idx").unwrap_or_default();
        let index = raw
            .trim()
            .parse::<u32>()
            .ok()
            .filter(|index| *index < MAX_CACHE_POINTS)
            .ok_or_else(|| {
                Error::CorruptedPackage(format!("invalid chart cache point index '{}'", raw))
            })?;
        let text = pt.child("v").map(|v| v.text()).unwrap_or_default();
        let value = if numeric {
            Value::parse_number(&text)
        } else {
            Value::Text(text)
        };
        count = count.max(index + 1);
        points.push(CachePoint { index, value });
    }
    Ok(ValueCache {
        format_code: container.child("formatCode").map(|f| f.text()),
        count,
        points,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::XmlDocument;

    const CHART: &str = r#"<c:chartSpace xmlns:c="http://schemas.openxmlformats.org/drawingml/2006/chart" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
<c:chart><c:plotArea><c:layout/>
<c:barChart><c:barDir val="col"/>
<c:ser><c:idx val="0"/><c:order val="0"/>
<c:tx><c:strRef><c:f>Sheet1!$B$1</c:f><c:strCache><c:ptCount val="1"/><c:pt idx="0"><c:v>Revenue</c:v></c:pt></c:strCache></c:strRef></c:tx>
<c:cat><c:multiLvlStrRef><c:f>Sheet1!$A$2:$A$3</c:f><c:multiLvlStrCache><c:ptCount val="2"/><c:lvl><c:pt idx="0"><c:v>North</c:v></c:pt><c:pt idx="1"><c:v>South</c:v></c:pt></c:lvl><c:lvl><c:pt idx="0"><c:v>2024</c:v></c:pt></c:lvl></c:multiLvlStrCache></c:multiLvlStrRef></c:cat>
<c:val><c:numRef><c:f>Sheet1!$B$2:$B$3</c:f><c:numCache><c:formatCode>General</c:formatCode><c:ptCount val="3"/><c:pt idx="0"><c:v>1.5</c:v></c:pt><c:pt idx="2"><c:v>4</c:v></c:pt></c:numCache></c:numRef></c:val>
</c:ser>
<c:ser><c:idx val="1"/><c:order val="1"/><c:tx><c:v>Literal</c:v></c:tx></c:ser>
</c:barChart>
</c:plotArea></c:chart>
<c:externalData r:id="rId2"><c:autoUpdate val="0"/></c:externalData>
</c:chartSpace>"#;

    fn chart() -> XmlDocument {
        XmlDocument::parse(CHART.as_bytes()).unwrap()
    }

    #[test]
    fn test_series_and_type() {
        let doc = chart();
        assert_eq!(series_elements(&doc.root).len(), 2);
        assert_eq!(chart_type(&doc.root), Some(ChartType::Bar));
        assert_eq!(external_data_rel(&doc.root), Some(RelId::new("rId2")));
    }

    #[test]
    fn test_name_record_with_formula_and_cache() {
        let doc = chart();
        let series = series_elements(&doc.root)[0];
        let record = value_record(series.child("tx").unwrap()).unwrap().unwrap();
        assert_eq!(record.formula.as_deref(), Some("Sheet1!$B$1"));
        let cache = record.cache.unwrap();
        assert_eq!(cache.points[0].value, Value::Text("Revenue".to_string()));
    }

    #[test]
    fn test_literal_name() {
        let doc = chart();
        let series = series_elements(&doc.root)[1];
        let record = value_record(series.child("tx").unwrap()).unwrap().unwrap();
        assert!(record.formula.is_none());
        assert_eq!(
            record.cache.unwrap().point(0),
            Some(&Value::Text("Literal".to_string()))
        );
    }

    #[test]
    fn test_values_cache_with_gap() {
        let doc = chart();
        let series = series_elements(&doc.root)[0];
        let record = value_record(values_element(series).unwrap()).unwrap().unwrap();
        let cache = record.cache.unwrap();
        assert_eq!(cache.count, 3);
        assert_eq!(cache.format_code.as_deref(), Some("General"));
        assert_eq!(cache.point(0), Some(&Value::Number(1.5)));
        assert_eq!(cache.point(1), None);
        assert_eq!(cache.point(2), Some(&Value::Number(4.0)));
    }

    #[test]
    fn test_multi_level_categories_use_first_level() {
        let doc = chart();
        let series = series_elements(&doc.root)[0];
        let record = value_record(categories_element(series).unwrap()).unwrap().unwrap();
        let cache = record.cache.unwrap();
        assert_eq!(cache.count, 2);
        assert_eq!(cache.point(1), Some(&Value::Text("South".to_string())));
    }

    fn single_series(values: &str) -> XmlDocument {
        XmlDocument::parse(
            format!(
                r#"<c:chartSpace xmlns:c="http://schemas.openxmlformats.org/drawingml/2006/chart"><c:chart><c:plotArea><c:barChart><c:ser><c:idx val="0"/><c:val>{}</c:val></c:ser></c:barChart></c:plotArea></c:chart></c:chartSpace>"#,
                values
            )
            .as_bytes(),
        )
        .unwrap()
    }

    #[test]
    fn test_out_of_range_point_index_is_corrupt() {
        for values in [
            r#"<c:numLit><c:ptCount val="1"/><c:pt idx="4294967295"><c:v>1</c:v></c:pt></c:numLit>"#,
            r#"<c:numLit><c:ptCount val="1"/><c:pt idx="100000000"><c:v>1</c:v></c:pt></c:numLit>"#,
            r#"<c:numLit><c:ptCount val="1"/><c:pt idx="-1"><c:v>1</c:v></c:pt></c:numLit>"#,
            r#"<c:numLit><c:ptCount val="4294967295"/></c:numLit>"#,
        ] {
            let doc = single_series(values);
            let series = series_elements(&doc.root)[0];
            assert!(
                matches!(
                    value_record(values_element(series).unwrap()),
                    Err(Error::CorruptedPackage(_))
                ),
                "accepted {}",
                values
            );
        }
    }

    #[test]
    fn test_last_valid_point_index() {
        let doc = single_series(
            r#"<c:numLit><c:pt idx="1048575"><c:v>7</c:v></c:pt></c:numLit>"#,
        );
        let series = series_elements(&doc.root)[0];
        let cache = value_record(values_element(series).unwrap())
            .unwrap()
            .unwrap()
            .cache
            .unwrap();
        assert_eq!(cache.count, MAX_CACHE_POINTS);
        assert_eq!(cache.point(1_048_575), Some(&Value::Number(7.0)));
    }
}
