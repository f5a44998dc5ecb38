//! The blank presentation new documents start from.

use crate::writer::stamp_property;
use slidekit_core::constants::{content_type as ct, namespace as ns, relationship_type as rt};
use slidekit_core::{
    Package, Part, PartContent, PartGraph, PartKind, PartName, Result, Role, Settings, XmlDocument,
};

const PRES_PROPS_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.presProps+xml";
const PRES_PROPS_REL: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/presProps";

/// Layouts of the blank master: display name and layout type.
pub const LAYOUTS: [(&str, &str); 3] = [
    ("Title Slide", "title"),
    ("Title Only", "titleOnly"),
    ("Blank", "blank"),
];

fn presentation_xml() -> String {
    format!(
        r#"<p:presentation xmlns:a="{}" xmlns:r="{}" xmlns:p="{}" saveSubsetFonts="1"><p:sldSz cx="12192000" cy="6858000"/><p:notesSz cx="6858000" cy="9144000"/></p:presentation>"#,
        ns::DML,
        ns::OFC_RELATIONSHIPS,
        ns::PML
    )
}

fn pres_props_xml() -> String {
    format!(
        r#"<p:presentationPr xmlns:a="{}" xmlns:r="{}" xmlns:p="{}"/>"#,
        ns::DML,
        ns::OFC_RELATIONSHIPS,
        ns::PML
    )
}

fn core_properties_xml() -> String {
    format!(
        r#"<cp:coreProperties xmlns:cp="{}" xmlns:dc="{}" xmlns:dcterms="{}" xmlns:xsi="{}"><dc:title>Presentation</dc:title><cp:revision>1</cp:revision></cp:coreProperties>"#,
        ns::CORE_PROPERTIES,
        ns::DC,
        ns::DCTERMS,
        ns::XSI
    )
}

fn theme_xml() -> String {
    let colors = [
        ("dk1", r#"<a:sysClr val="windowText" lastClr="000000"/>"#),
        ("lt1", r#"<a:sysClr val="window" lastClr="FFFFFF"/>"#),
        ("dk2", r#"<a:srgbClr val="0E2841"/>"#),
        ("lt2", r#"<a:srgbClr val="E8E8E8"/>"#),
        ("accent1", r#"<a:srgbClr val="156082"/>"#),
        ("accent2", r#"<a:srgbClr val="E97132"/>"#),
        ("accent3", r#"<a:srgbClr val="196B24"/>"#),
        ("accent4", r#"<a:srgbClr val="0F9ED5"/>"#),
        ("accent5", r#"<a:srgbClr val="A02B93"/>"#),
        ("accent6", r#"<a:srgbClr val="4EA72E"/>"#),
        ("hlink", r#"<a:srgbClr val="467886"/>"#),
        ("folHlink", r#"<a:srgbClr val="96607D"/>"#),
    ];
    let scheme: String = colors
        .iter()
        .map(|(name, color)| format!("<a:{0}>{1}</a:{0}>", name, color))
        .collect();
    let fill = r#"<a:solidFill><a:schemeClr val="phClr"/></a:solidFill>"#;
    let line = r#"<a:ln w="12700"><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:ln>"#;
    format!(
        concat!(
            r#"<a:theme xmlns:a="{ns}" name="Office Theme"><a:themeElements>"#,
            r#"<a:clrScheme name="Office">{scheme}</a:clrScheme>"#,
            r#"<a:fontScheme name="Office">"#,
            r#"<a:majorFont><a:latin typeface="Calibri Light"/><a:ea typeface=""/><a:cs typeface=""/></a:majorFont>"#,
            r#"<a:minorFont><a:latin typeface="Calibri"/><a:ea typeface=""/><a:cs typeface=""/></a:minorFont>"#,
            r#"</a:fontScheme>"#,
            r#"<a:fmtScheme name="Office">"#,
            r#"<a:fillStyleLst>{fill}{fill}{fill}</a:fillStyleLst>"#,
            r#"<a:lnStyleLst>{line}{line}{line}</a:lnStyleLst>"#,
            r#"<a:effectStyleLst><a:effectStyle><a:effectLst/></a:effectStyle><a:effectStyle><a:effectLst/></a:effectStyle><a:effectStyle><a:effectLst/></a:effectStyle></a:effectStyleLst>"#,
            r#"<a:bgFillStyleLst>{fill}{fill}{fill}</a:bgFillStyleLst>"#,
            r#"</a:fmtScheme></a:themeElements></a:theme>"#
        ),
        ns = ns::DML,
        scheme = scheme,
        fill = fill,
        line = line
    )
}

fn group_properties() -> &'static str {
    r#"<p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr/>"#
}

fn placeholder(id: u32, name: &str, ph: &str) -> String {
    format!(
        r#"<p:sp><p:nvSpPr><p:cNvPr id="{}" name="{}"/><p:cNvSpPr><a:spLocks noGrp="1"/></p:cNvSpPr><p:nvPr>{}</p:nvPr></p:nvSpPr><p:spPr/><p:txBody><a:bodyPr/><a:lstStyle/><a:p><a:endParaRPr lang="en-US"/></a:p></p:txBody></p:sp>"#,
        id, name, ph
    )
}

fn master_xml() -> String {
    format!(
        concat!(
            r#"<p:sldMaster xmlns:a="{}" xmlns:r="{}" xmlns:p="{}"><p:cSld><p:spTree>{}{}{}</p:spTree></p:cSld>"#,
            r#"<p:clrMap bg1="lt1" tx1="dk1" bg2="lt2" tx2="dk2" accent1="accent1" accent2="accent2" accent3="accent3" accent4="accent4" accent5="accent5" accent6="accent6" hlink="hlink" folHlink="folHlink"/>"#,
            r#"<p:txStyles><p:titleStyle/><p:bodyStyle/><p:otherStyle/></p:txStyles></p:sldMaster>"#
        ),
        ns::DML,
        ns::OFC_RELATIONSHIPS,
        ns::PML,
        group_properties(),
        placeholder(2, "Title Placeholder 1", r#"<p:ph type="title"/>"#),
        placeholder(3, "Text Placeholder 2", r#"<p:ph type="body" idx="1"/>"#)
    )
}

fn layout_xml(name: &str, layout_type: &str) -> String {
    let shapes = match layout_type {
        "title" => format!(
            "{}{}",
            placeholder(2, "Title 1", r#"<p:ph type="ctrTitle"/>"#),
            placeholder(3, "Subtitle 2", r#"<p:ph type="subTitle" idx="1"/>"#)
        ),
        "titleOnly" => placeholder(2, "Title 1", r#"<p:ph type="title"/>"#),
        _ => String::new(),
    };
    format!(
        r#"<p:sldLayout xmlns:a="{}" xmlns:r="{}" xmlns:p="{}" type="{}" preserve="1"><p:cSld name="{}"><p:spTree>{}{}</p:spTree></p:cSld><p:clrMapOvr><a:masterClrMapping/></p:clrMapOvr></p:sldLayout>"#,
        ns::DML,
        ns::OFC_RELATIONSHIPS,
        ns::PML,
        layout_type,
        name,
        group_properties(),
        shapes
    )
}

fn xml_part(kind: PartKind, name: &str, xml: &str) -> Result<Part> {
    Ok(Part::xml(kind, PartName::new(name)?, XmlDocument::parse(xml.as_bytes())?))
}

/// A presentation with no slides, one master with a theme and the three
/// [`LAYOUTS`]. Creation and modification dates come from `settings`.
pub fn blank(settings: &Settings) -> Result<Package> {
    let mut graph = PartGraph::new();
    let root = graph.add_part(Part::new(
        PartKind::PackageRoot,
        PartName::root(),
        "",
        PartContent::Binary(Vec::new()),
    ));

    let presentation = graph.add_part(xml_part(
        PartKind::Presentation,
        "/ppt/presentation.xml",
        &presentation_xml(),
    )?);
    graph.link(root, presentation, Role::Owns, rt::OFFICE_DOCUMENT)?;

    let mut core = XmlDocument::parse(core_properties_xml().as_bytes())?;
    let timestamp = settings.timestamp();
    stamp_property(&mut core.root, "created", &timestamp);
    stamp_property(&mut core.root, "modified", &timestamp);
    let core = graph.add_part(Part::new(
        PartKind::CoreProperties,
        PartName::new("/docProps/core.xml")?,
        ct::OPC_CORE_PROPERTIES,
        PartContent::Xml(core),
    ));
    graph.link(root, core, Role::Owns, rt::CORE_PROPERTIES)?;

    let pres_props = graph.add_part(Part::new(
        PartKind::Other,
        PartName::new("/ppt/presProps.xml")?,
        PRES_PROPS_CONTENT_TYPE,
        PartContent::Xml(XmlDocument::parse(pres_props_xml().as_bytes())?),
    ));
    graph.link(presentation, pres_props, Role::Owns, PRES_PROPS_REL)?;

    let master = graph.add_part(xml_part(
        PartKind::SlideMaster,
        "/ppt/slideMasters/slideMaster1.xml",
        &master_xml(),
    )?);
    let theme = graph.add_part(xml_part(PartKind::Theme, "/ppt/theme/theme1.xml", &theme_xml())?);
    graph.link(master, theme, Role::References, rt::THEME)?;
    graph.link(presentation, theme, Role::References, rt::THEME)?;

    let mut package = Package::from_graph(graph, root)?;
    package.register_master(master)?;

    for (i, (name, layout_type)) in LAYOUTS.iter().enumerate() {
        let layout = package.graph_mut().add_part(xml_part(
            PartKind::SlideLayout,
            &format!("/ppt/slideLayouts/slideLayout{}.xml", i + 1),
            &layout_xml(name, layout_type),
        )?);
        package
            .graph_mut()
            .link(layout, master, Role::References, rt::SLIDE_MASTER)?;
        package.append_layout(master, layout)?;
    }

    log::debug!("Created blank presentation {}", package.id());
    Ok(package)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use slidekit_core::{FixedClock, Validator};

    fn settings() -> Settings {
        Settings::with_clock(FixedClock(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()))
    }

    #[test]
    fn test_blank_structure() {
        let package = blank(&settings()).unwrap();
        assert_eq!(package.slide_count(), 0);
        assert_eq!(package.masters().len(), 1);

        let names: Vec<String> = package
            .all_layouts()
            .into_iter()
            .filter_map(|layout| package.display_name(layout))
            .collect();
        assert_eq!(names, vec!["Title Slide", "Title Only", "Blank"]);
        assert!(Validator::new().validate(&package).is_empty());
    }

    #[test]
    fn test_blank_core_properties_dates() {
        let package = blank(&settings()).unwrap();
        let core = package
            .graph()
            .parts_of_kind(PartKind::CoreProperties)
            .next()
            .unwrap();
        let root = &package.graph().xml(core).unwrap().root;
        assert_eq!(root.child("created").unwrap().text(), "2024-06-01T12:00:00Z");
        assert_eq!(root.child("modified").unwrap().text(), "2024-06-01T12:00:00Z");
    }
}
