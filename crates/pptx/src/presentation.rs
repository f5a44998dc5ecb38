//! High-level handle on one presentation file.

use crate::reader::PackageReader;
use crate::template;
use crate::writer::PackageWriter;
use crate::xlsx::XlsxReader;
use slidekit_core::{
    Error, NameState, Package, PackageSummary, PartRef, Result, SeriesSummary, Settings,
    SlideCollection, SlideRef, SlideSource, ValidationIssue, Validator, Value, ValueResolver, ValueTarget,
};
use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek, Write};
use std::path::Path;

/// A loaded or newly created presentation together with the settings used
/// when it is saved.
#[derive(Debug)]
pub struct Presentation {
    package: Package,
    settings: Settings,
    data_sources: XlsxReader,
}

impl Presentation {
    /// A blank presentation with no slides.
    pub fn new() -> Result<Self> {
        Self::with_settings(Settings::default())
    }

    pub fn with_settings(settings: Settings) -> Result<Self> {
        let package = template::blank(&settings)?;
        Ok(Self::from_package(package, settings))
    }

    pub fn from_package(package: Package, settings: Settings) -> Self {
        Self {
            package,
            settings,
            data_sources: XlsxReader::new(),
        }
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_settings(path, Settings::default())
    }

    pub fn open_with_settings<P: AsRef<Path>>(path: P, settings: Settings) -> Result<Self> {
        let path = path.as_ref();
        log::info!("Opening {}", path.display());
        let file = File::open(path)?;
        let package = PackageReader::new().read(BufReader::new(file))?;
        Ok(Self::from_package(package, settings))
    }

    pub fn from_reader<R: Read + Seek>(reader: R) -> Result<Self> {
        let package = PackageReader::new().read(reader)?;
        Ok(Self::from_package(package, Settings::default()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::from_reader(Cursor::new(bytes))
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn package(&self) -> &Package {
        &self.package
    }

    pub fn package_mut(&mut self) -> &mut Package {
        &mut self.package
    }

    pub fn into_package(self) -> Package {
        self.package
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.writer().save(&self.package, path)
    }

    pub fn save_to<W: Write + Seek>(&self, writer: W) -> Result<()> {
        self.writer().write(&self.package, writer)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.writer().to_bytes(&self.package)
    }

    fn writer(&self) -> PackageWriter {
        PackageWriter::new(self.settings.clone())
    }

    pub fn slide_count(&self) -> usize {
        self.package.slide_count()
    }

    pub fn slides(&self) -> Vec<SlideRef> {
        self.package.slide_refs()
    }

    /// Slide by 1-based number.
    pub fn slide(&self, number: usize) -> Result<SlideRef> {
        self.package.slide(number)
    }

    pub fn slides_mut(&mut self) -> SlideCollection<'_> {
        self.package.slides_mut()
    }

    pub fn masters(&self) -> Vec<PartRef> {
        self.package.masters()
    }

    pub fn layouts(&self) -> Vec<PartRef> {
        self.package.all_layouts()
    }

    /// First layout whose display name matches, ignoring case.
    pub fn layout_by_name(&self, name: &str) -> Option<PartRef> {
        self.layouts().into_iter().find(|&layout| {
            self.package
                .display_name(layout)
                .is_some_and(|n| n.eq_ignore_ascii_case(name))
        })
    }

    /// Append or insert an empty slide using the named layout.
    pub fn add_slide(&mut self, layout_name: &str, position: Option<usize>) -> Result<SlideRef> {
        let layout = self
            .layout_by_name(layout_name)
            .ok_or_else(|| Error::DanglingReference(format!("no layout named '{}'", layout_name)))?;
        self.slides_mut().add_with_layout(layout, position)
    }

    /// Place a slide at `position`: slides of this presentation move, slides
    /// of another package (passed as `(package, slide)`) are copied in.
    pub fn insert_slide<'s>(
        &mut self,
        slide: impl Into<SlideSource<'s>>,
        position: Option<usize>,
    ) -> Result<SlideRef> {
        self.slides_mut().add(slide, position)
    }

    /// Copy slide `number` of `source` into this presentation.
    pub fn copy_slide_from(
        &mut self,
        source: &Presentation,
        number: usize,
        position: Option<usize>,
    ) -> Result<SlideRef> {
        let slide = source.slide(number)?;
        self.insert_slide((&source.package, slide), position)
    }

    pub fn move_slide(&mut self, number: usize, position: usize) -> Result<SlideRef> {
        let slide = self.slide(number)?;
        self.insert_slide(slide, Some(position))
    }

    pub fn remove_slide(&mut self, number: usize) -> Result<()> {
        self.slides_mut().remove_at(number)
    }

    /// Chart `index` (0-based) on slide `number`.
    pub fn chart(&self, number: usize, index: usize) -> Result<PartRef> {
        let slide = self.slide(number)?;
        let charts = self.package.charts_of(slide.part);
        charts
            .get(index)
            .copied()
            .ok_or_else(|| Error::index_range(index, 0, charts.len().saturating_sub(1)))
    }

    pub fn charts(&self) -> Vec<PartRef> {
        self.package.charts()
    }

    fn resolver(&self) -> ValueResolver<'_> {
        ValueResolver::new(&self.data_sources)
    }

    pub fn get_value(&self, chart: PartRef, target: ValueTarget) -> Result<Value> {
        self.resolver().get_value(self.package.graph(), chart, target)
    }

    pub fn set_value(&mut self, chart: PartRef, target: ValueTarget, value: Value) -> Result<()> {
        let resolver = ValueResolver::new(&self.data_sources);
        resolver.set_value(self.package.graph_mut(), chart, target, value)
    }

    pub fn series_name(&self, chart: PartRef, series: usize) -> Result<String> {
        self.get_value(chart, ValueTarget::SeriesName { series })
            .map(|value| value.to_string())
    }

    pub fn set_series_name(&mut self, chart: PartRef, series: usize, name: &str) -> Result<()> {
        self.set_value(chart, ValueTarget::SeriesName { series }, Value::from(name))
    }

    pub fn has_series_name(&self, chart: PartRef, series: usize) -> Result<bool> {
        self.resolver().has_name(self.package.graph(), chart, series)
    }

    pub fn point_value(&self, chart: PartRef, series: usize, point: usize) -> Result<Value> {
        self.get_value(chart, ValueTarget::SeriesPoint { series, point })
    }

    pub fn set_point_value(
        &mut self,
        chart: PartRef,
        series: usize,
        point: usize,
        value: Value,
    ) -> Result<()> {
        self.set_value(chart, ValueTarget::SeriesPoint { series, point }, value)
    }

    /// Name and values of every series of a chart.
    pub fn series(&self, chart: PartRef) -> Result<Vec<SeriesSummary>> {
        let resolver = self.resolver();
        let graph = self.package.graph();
        let chart_name = self
            .package
            .part_name(chart)
            .map(|n| n.to_string())
            .unwrap_or_default();

        (0..resolver.series_count(graph, chart)?)
            .map(|index| {
                let name_state = resolver.name_state(graph, chart, index)?;
                let name = match name_state {
                    NameState::Absent => None,
                    _ => Some(
                        resolver
                            .get_value(graph, chart, ValueTarget::SeriesName { series: index })?
                            .to_string(),
                    ),
                };
                Ok(SeriesSummary {
                    chart: chart_name.clone(),
                    index,
                    name,
                    name_state,
                    values: resolver.values(graph, chart, index)?,
                })
            })
            .collect()
    }

    pub fn summary(&self) -> PackageSummary {
        self.package.summary()
    }

    pub fn validate(&self) -> Vec<ValidationIssue> {
        Validator::new().validate(&self.package)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xlsx::tests::sample_workbook;
    use chrono::{TimeZone, Utc};
    use slidekit_core::constants::{content_type as ct, namespace as ns, relationship_type as rt};
    use slidekit_core::{
        EmbeddedWorkbook, FixedClock, Part, PartContent, PartKind, PartName, Role, XmlDocument,
    };
    use std::io::Read;
    use tempfile::tempdir;
    use zip::ZipArchive;

    fn chart_xml() -> String {
        format!(
            concat!(
                r#"<c:chartSpace xmlns:c="{}" xmlns:a="{}" xmlns:r="{}"><c:chart><c:plotArea><c:barChart>"#,
                r#"<c:ser><c:idx val="0"/><c:order val="0"/>"#,
                r#"<c:tx><c:strRef><c:f>Sheet1!$B$1</c:f></c:strRef></c:tx>"#,
                r#"<c:cat><c:strRef><c:f>Sheet1!$A$2:$A$3</c:f><c:strCache><c:ptCount val="2"/><c:pt idx="0"><c:v>Q1</c:v></c:pt><c:pt idx="1"><c:v>Q2</c:v></c:pt></c:strCache></c:strRef></c:cat>"#,
                r#"<c:val><c:numRef><c:f>Sheet1!$B$2:$B$3</c:f><c:numCache><c:formatCode>General</c:formatCode><c:ptCount val="2"/><c:pt idx="0"><c:v>10.5</c:v></c:pt><c:pt idx="1"><c:v>20</c:v></c:pt></c:numCache></c:numRef></c:val>"#,
                r#"</c:ser></c:barChart></c:plotArea></c:chart><c:externalData r:id="rId1"/></c:chartSpace>"#
            ),
            ns::DML_CHART,
            ns::DML,
            ns::OFC_RELATIONSHIPS
        )
    }

    /// A blank presentation with one slide holding one bar chart backed by
    /// an embedded workbook.
    fn with_chart() -> Presentation {
        let mut pres = Presentation::new().unwrap();
        let slide = pres.add_slide("Title Only", None).unwrap();
        let graph = pres.package_mut().graph_mut();
        let chart = graph.add_part(Part::xml(
            PartKind::Chart,
            PartName::new("/ppt/charts/chart1.xml").unwrap(),
            XmlDocument::parse(chart_xml().as_bytes()).unwrap(),
        ));
        let workbook = graph.add_part(Part::new(
            PartKind::EmbeddedDataSource,
            PartName::new("/ppt/embeddings/Microsoft_Excel_Worksheet1.xlsx").unwrap(),
            ct::SML_SHEET,
            PartContent::DataSource(EmbeddedWorkbook::new(sample_workbook())),
        ));
        graph.link(slide.part, chart, Role::Owns, rt::CHART).unwrap();
        graph.link(chart, workbook, Role::Owns, rt::PACKAGE).unwrap();
        pres
    }

    fn reopen(pres: &Presentation) -> Presentation {
        Presentation::from_bytes(&pres.to_bytes().unwrap()).unwrap()
    }

    fn member(bytes: &[u8], name: &str) -> String {
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut content = String::new();
        archive.by_name(name).unwrap().read_to_string(&mut content).unwrap();
        content
    }

    #[test]
    fn test_new_is_empty_and_valid() {
        let pres = Presentation::new().unwrap();
        assert_eq!(pres.slide_count(), 0);
        assert_eq!(pres.layouts().len(), 3);
        assert!(pres.validate().is_empty());
    }

    #[test]
    fn test_blank_layout_slide_has_no_shapes() {
        let mut pres = Presentation::new().unwrap();
        let slide = pres.add_slide("blank", None).unwrap();
        let doc = pres.package().graph().xml(slide.part).unwrap();
        let tree = doc.root.path(&["cSld", "spTree"]).unwrap();
        assert_eq!(tree.children_named("sp").count(), 0);
    }

    #[test]
    fn test_unknown_layout() {
        let mut pres = Presentation::new().unwrap();
        let result = pres.add_slide("Two Content", None);
        assert!(matches!(result, Err(Error::DanglingReference(_))));
    }

    #[test]
    fn test_round_trip_keeps_order_and_ids() {
        let mut pres = Presentation::new().unwrap();
        pres.add_slide("Title Slide", None).unwrap();
        pres.add_slide("Blank", None).unwrap();
        pres.add_slide("Title Only", Some(1)).unwrap();
        let before = pres.summary();

        let reopened = reopen(&pres);
        let after = reopened.summary();
        assert_eq!(after.slides.len(), 3);
        let layouts: Vec<_> = after.slides.iter().map(|s| s.layout.clone()).collect();
        assert_eq!(
            layouts,
            vec![
                Some("Title Only".to_string()),
                Some("Title Slide".to_string()),
                Some("Blank".to_string())
            ]
        );
        let ids = |s: &PackageSummary| s.slides.iter().map(|s| s.id).collect::<Vec<_>>();
        assert_eq!(ids(&before), ids(&after));
        assert!(reopened.validate().is_empty());
    }

    #[test]
    fn test_save_and_open_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("deck.pptx");

        let mut pres = Presentation::new().unwrap();
        pres.add_slide("Title Slide", None).unwrap();
        pres.save(&path).unwrap();

        let reopened = Presentation::open(&path).unwrap();
        assert_eq!(reopened.slide_count(), 1);
    }

    #[test]
    fn test_save_stamps_modified() {
        let created = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let saved = Utc.with_ymd_and_hms(2024, 2, 29, 16, 45, 10).unwrap();

        let pres = Presentation::with_settings(Settings::with_clock(FixedClock(created))).unwrap();
        let bytes = pres.to_bytes().unwrap();
        let mut later = Presentation::from_bytes(&bytes).unwrap();
        later.settings = Settings::with_clock(FixedClock(saved));

        let core = member(&later.to_bytes().unwrap(), "docProps/core.xml");
        assert!(core.contains("2024-02-29T16:45:10Z"));
        assert!(core.contains("2020-01-01T00:00:00Z"));
        assert!(!core.contains("2020-01-01T00:00:00Z</dcterms:modified>"));
    }

    #[test]
    fn test_content_types_and_relationships_written() {
        let mut pres = Presentation::new().unwrap();
        pres.add_slide("Blank", None).unwrap();
        let bytes = pres.to_bytes().unwrap();

        let types = member(&bytes, "[Content_Types].xml");
        assert!(types.contains(r#"<Default Extension="rels""#));
        assert!(types.contains(r#"PartName="/ppt/slides/slide1.xml""#));

        let rels = member(&bytes, "ppt/slides/_rels/slide1.xml.rels");
        assert!(rels.contains(r#"Target="../slideLayouts/slideLayout3.xml""#));
    }

    #[test]
    fn test_series_name_from_workbook() {
        let pres = with_chart();
        let chart = pres.chart(1, 0).unwrap();
        assert!(!pres.has_series_name(chart, 0).unwrap());
        assert_eq!(pres.series_name(chart, 0).unwrap(), "Revenue");
        assert_eq!(pres.point_value(chart, 0, 1).unwrap(), Value::Number(20.0));
    }

    #[test]
    fn test_set_series_name_survives_save() {
        let mut pres = with_chart();
        let chart = pres.chart(1, 0).unwrap();
        pres.set_series_name(chart, 0, "Sales").unwrap();

        let reopened = reopen(&pres);
        let chart = reopened.chart(1, 0).unwrap();
        assert!(reopened.has_series_name(chart, 0).unwrap());
        assert_eq!(reopened.series_name(chart, 0).unwrap(), "Sales");
    }

    #[test]
    fn test_series_summary() {
        let pres = with_chart();
        let chart = pres.chart(1, 0).unwrap();
        let series = pres.series(chart).unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].name.as_deref(), Some("Revenue"));
        assert_eq!(series[0].name_state, NameState::FormulaOnly);
        assert_eq!(series[0].values, vec![Value::Number(10.5), Value::Number(20.0)]);
    }

    #[test]
    fn test_copy_chart_slide_between_files() {
        let source = reopen(&with_chart());
        let mut dest = Presentation::new().unwrap();
        dest.add_slide("Blank", None).unwrap();

        dest.copy_slide_from(&source, 1, Some(1)).unwrap();
        let dest = reopen(&dest);
        assert_eq!(dest.slide_count(), 2);

        let chart = dest.chart(1, 0).unwrap();
        assert_eq!(dest.series_name(chart, 0).unwrap(), "Revenue");
        assert!(dest.validate().is_empty());
    }

    #[test]
    fn test_insert_slide_moves_own_and_copies_foreign() {
        let mut source = Presentation::new().unwrap();
        source.add_slide("Title Only", None).unwrap();
        let mut dest = Presentation::new().unwrap();
        let blank = dest.add_slide("Blank", None).unwrap();

        let foreign = source.slide(1).unwrap();
        let copied = dest.insert_slide((source.package(), foreign), Some(1)).unwrap();
        assert_eq!(dest.slide_count(), 2);
        assert_eq!(dest.slide(1).unwrap(), copied);
        assert_eq!(source.slide_count(), 1);

        dest.insert_slide(blank, Some(1)).unwrap();
        let layouts: Vec<_> = dest
            .summary()
            .slides
            .into_iter()
            .map(|s| s.layout)
            .collect();
        assert_eq!(
            layouts,
            vec![Some("Blank".to_string()), Some("Title Only".to_string())]
        );
        assert_eq!(dest.layouts().len(), 3);
        assert!(dest.validate().is_empty());
    }

    #[test]
    fn test_move_and_remove() {
        let mut pres = Presentation::new().unwrap();
        for layout in ["Title Slide", "Title Only", "Blank"] {
            pres.add_slide(layout, None).unwrap();
        }
        pres.move_slide(3, 1).unwrap();
        pres.remove_slide(2).unwrap();

        let layouts: Vec<_> = pres
            .summary()
            .slides
            .into_iter()
            .map(|s| s.layout.unwrap_or_default())
            .collect();
        assert_eq!(layouts, vec!["Blank", "Title Only"]);
        assert!(matches!(pres.remove_slide(3), Err(Error::IndexRange { .. })));
    }

    #[test]
    fn test_remove_chart_slide_collects_its_parts() {
        let mut pres = with_chart();
        let layouts_before = pres.layouts();
        pres.remove_slide(1).unwrap();

        let graph = pres.package().graph();
        assert_eq!(graph.parts_of_kind(PartKind::Chart).count(), 0);
        assert_eq!(graph.parts_of_kind(PartKind::EmbeddedDataSource).count(), 0);
        assert_eq!(pres.layouts(), layouts_before);

        let reopened = reopen(&pres);
        assert_eq!(reopened.slide_count(), 0);
        assert!(reopened.validate().is_empty());
    }

    #[test]
    fn test_remove_then_add_keeps_ids_unique_after_reopen() {
        let mut pres = Presentation::new().unwrap();
        pres.add_slide("Blank", None).unwrap();
        pres.add_slide("Blank", None).unwrap();
        pres.remove_slide(2).unwrap();
        pres.add_slide("Blank", None).unwrap();

        let reopened = reopen(&pres);
        let ids: Vec<u32> = reopened.summary().slides.iter().map(|s| s.id).collect();
        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);
        assert!(reopened.validate().is_empty());
    }
}
