//! A loaded presentation package: the part graph plus the presentation-level
//! lists (slides, masters, layouts, sections) kept inside its XML.

use crate::chart;
use crate::constants::relationship_type as rt;
use crate::error::{Error, Result};
use crate::graph::{PartGraph, PartRef};
use crate::types::{PackageId, PartKind, PartName, RelId, Role};
use crate::xml::{ensure_relationship_prefix, XmlElement};
use serde::{Deserialize, Serialize};

/// Children of `p:presentation` that precede `p:sldIdLst`.
const BEFORE_SLIDE_LIST: &[&str] = &["sldMasterIdLst", "notesMasterIdLst", "handoutMasterIdLst"];

/// Children of `p:sldMaster` that precede `p:sldLayoutIdLst`.
const BEFORE_LAYOUT_LIST: &[&str] = &["cSld", "clrMap"];

/// A slide of a specific package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlideRef {
    pub package: PackageId,
    pub part: PartRef,
}

/// One `p:sldId` entry of the slide list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlideEntry {
    pub id: u32,
    pub rel: RelId,
}

/// A named group of slides (`p14:section`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub name: String,
    pub slide_ids: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlideSummary {
    pub number: usize,
    pub id: u32,
    pub part_name: String,
    pub layout: Option<String>,
    pub has_notes: bool,
    pub charts: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesSummary {
    pub chart: String,
    pub index: usize,
    pub name: Option<String>,
    pub name_state: crate::value::NameState,
    pub values: Vec<crate::value::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageSummary {
    pub slides: Vec<SlideSummary>,
    pub masters: usize,
    pub layouts: usize,
    pub sections: Vec<Section>,
}

/// Relationship id held by a list entry such as `<p:sldId id="256" r:id="rId2"/>`.
pub(crate) fn entry_rel(entry: &XmlElement) -> Option<RelId> {
    entry
        .attributes
        .iter()
        .find(|(key, value)| key.contains(':') && key.ends_with(":id") && !value.is_empty())
        .map(|(_, value)| RelId::new(value.as_str()))
}

/// List position for slide number `index` (0-based): before the entry that
/// currently holds that number, or after the last listed slide.
fn slot_for(listed: &[usize], count: usize, index: usize) -> usize {
    match listed.get(index) {
        Some(&slot) => slot,
        None => listed.last().map_or(count, |last| last + 1),
    }
}

fn entry_id(entry: &XmlElement) -> Option<u32> {
    entry.attr("id").and_then(|id| id.parse().ok())
}

#[derive(Debug)]
pub struct Package {
    id: PackageId,
    graph: PartGraph,
    root: PartRef,
    presentation: PartRef,
}

impl Package {
    /// Wrap a fully linked graph. `root` is the package pseudo-part whose
    /// office-document relationship names the presentation part.
    pub fn from_graph(mut graph: PartGraph, root: PartRef) -> Result<Self> {
        let presentation = graph
            .first_related(root, rt::OFFICE_DOCUMENT)
            .filter(|p| graph.part(*p).map(|p| p.kind) == Some(PartKind::Presentation))
            .ok_or_else(|| {
                Error::CorruptedPackage("package has no presentation part".to_string())
            })?;
        graph.xml(presentation)?;

        let mut package = Self {
            id: PackageId::next(),
            graph,
            root,
            presentation,
        };
        package.observe_ids()?;
        log::debug!(
            "{}: {} parts, {} slides, {} masters",
            package.id,
            package.graph.part_count(),
            package.slide_count(),
            package.masters().len()
        );
        Ok(package)
    }

    fn observe_ids(&mut self) -> Result<()> {
        let slide_ids: Vec<u32> = self.slide_entries()?.iter().map(|e| e.id).collect();
        let mut layout_ids: Vec<u32> = self
            .list_entries(self.presentation, "sldMasterIdLst")
            .iter()
            .filter_map(|e| entry_id(e))
            .collect();
        for master in self.masters() {
            layout_ids.extend(
                self.list_entries(master, "sldLayoutIdLst")
                    .iter()
                    .filter_map(|e| entry_id(e)),
            );
        }

        let ids = self.graph.ids_mut();
        for id in slide_ids {
            ids.observe_slide_id(id);
        }
        for id in layout_ids {
            ids.observe_layout_id(id);
        }
        Ok(())
    }

    pub fn id(&self) -> PackageId {
        self.id
    }

    pub fn graph(&self) -> &PartGraph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut PartGraph {
        &mut self.graph
    }

    pub fn root(&self) -> PartRef {
        self.root
    }

    pub fn presentation(&self) -> PartRef {
        self.presentation
    }

    fn list_entries(&self, part: PartRef, list: &str) -> Vec<XmlElement> {
        self.graph
            .xml(part)
            .ok()
            .and_then(|doc| doc.root.child(list))
            .map(|list| list.elements().cloned().collect())
            .unwrap_or_default()
    }

    /// The `p:sldIdLst` entries in slide order.
    pub fn slide_entries(&self) -> Result<Vec<SlideEntry>> {
        let doc = self.graph.xml(self.presentation)?;
        let Some(list) = doc.root.child("sldIdLst") else {
            return Ok(Vec::new());
        };
        list.children_named("sldId")
            .map(|entry| {
                let id = entry_id(entry).ok_or_else(|| {
                    Error::CorruptedPackage("slide list entry without numeric id".to_string())
                })?;
                let rel = entry_rel(entry).ok_or_else(|| {
                    Error::CorruptedPackage(format!("slide {} has no relationship id", id))
                })?;
                Ok(SlideEntry { id, rel })
            })
            .collect()
    }

    /// Slide parts in presentation order. Entries that do not resolve are skipped.
    pub fn slide_parts(&self) -> Vec<PartRef> {
        self.slide_entries()
            .unwrap_or_default()
            .iter()
            .filter_map(|entry| self.graph.resolve(self.presentation, &entry.rel).ok())
            .filter(|part| self.graph.part(*part).map(|p| p.kind) == Some(PartKind::Slide))
            .collect()
    }

    pub fn slide_refs(&self) -> Vec<SlideRef> {
        self.slide_parts()
            .into_iter()
            .map(|part| SlideRef {
                package: self.id,
                part,
            })
            .collect()
    }

    pub fn slide_count(&self) -> usize {
        self.slide_parts().len()
    }

    /// Slide by 1-based number.
    pub fn slide(&self, number: usize) -> Result<SlideRef> {
        let slides = self.slide_refs();
        if number == 0 || number > slides.len() {
            return Err(Error::index_range(number, 1, slides.len()));
        }
        Ok(slides[number - 1])
    }

    /// Position (0-based) of a slide part in the slide list.
    pub fn slide_index(&self, part: PartRef) -> Option<usize> {
        self.slide_parts().iter().position(|p| *p == part)
    }

    pub fn slide_id(&self, part: PartRef) -> Option<u32> {
        self.slide_entries()
            .ok()?
            .into_iter()
            .find(|entry| self.graph.resolve(self.presentation, &entry.rel).ok() == Some(part))
            .map(|entry| entry.id)
    }

    /// Slide masters in `p:sldMasterIdLst` order.
    pub fn masters(&self) -> Vec<PartRef> {
        self.list_entries(self.presentation, "sldMasterIdLst")
            .iter()
            .filter_map(entry_rel)
            .filter_map(|rel| self.graph.resolve(self.presentation, &rel).ok())
            .collect()
    }

    /// Layouts of a master in `p:sldLayoutIdLst` order.
    pub fn layouts(&self, master: PartRef) -> Vec<PartRef> {
        self.list_entries(master, "sldLayoutIdLst")
            .iter()
            .filter_map(entry_rel)
            .filter_map(|rel| self.graph.resolve(master, &rel).ok())
            .collect()
    }

    pub fn all_layouts(&self) -> Vec<PartRef> {
        self.masters()
            .into_iter()
            .flat_map(|master| self.layouts(master))
            .collect()
    }

    pub fn layout_of(&self, slide: PartRef) -> Option<PartRef> {
        self.graph.first_related(slide, rt::SLIDE_LAYOUT)
    }

    pub fn master_of(&self, layout: PartRef) -> Option<PartRef> {
        self.graph.first_related(layout, rt::SLIDE_MASTER)
    }

    pub fn notes_of(&self, slide: PartRef) -> Option<PartRef> {
        self.graph.first_related(slide, rt::NOTES_SLIDE)
    }

    pub fn notes_master(&self) -> Option<PartRef> {
        self.graph.first_related(self.presentation, rt::NOTES_MASTER)
    }

    pub fn charts_of(&self, part: PartRef) -> Vec<PartRef> {
        self.graph.related_by_type(part, rt::CHART)
    }

    /// Every chart part reachable from a slide, in slide order.
    pub fn charts(&self) -> Vec<PartRef> {
        self.slide_parts()
            .into_iter()
            .flat_map(|slide| self.charts_of(slide))
            .collect()
    }

    /// `p:cSld/@name` of a slide, layout or master.
    pub fn display_name(&self, part: PartRef) -> Option<String> {
        let doc = self.graph.xml(part).ok()?;
        doc.root
            .child("cSld")
            .and_then(|c| c.attr("name"))
            .map(str::to_string)
    }

    /// `@type` of a layout root, e.g. `title` or `blank`.
    pub fn layout_type(&self, layout: PartRef) -> Option<String> {
        let doc = self.graph.xml(layout).ok()?;
        doc.root.attr("type").map(str::to_string)
    }

    pub fn part_name(&self, part: PartRef) -> Option<&PartName> {
        self.graph.part(part).map(|p| &p.name)
    }

    /// Make `slide` the owned child of the presentation and list it at
    /// `index` (0-based, clamped to the end) under a fresh slide id.
    pub(crate) fn insert_slide_entry(&mut self, slide: PartRef, index: usize) -> Result<u32> {
        let id = self.graph.ids_mut().next_slide_id()?;
        let rel = self
            .graph
            .link(self.presentation, slide, Role::Owns, rt::SLIDE)?;

        let (count, listed) = self.listed_slide_slots()?;
        let slot = slot_for(&listed, count, index);

        let root = &mut self.graph.xml_mut(self.presentation)?.root;
        let prefix = ensure_relationship_prefix(root);
        let list = root.ensure_child("sldIdLst", BEFORE_SLIDE_LIST);
        let entry = XmlElement::new(list.qualify("sldId"))
            .with_attr("id", id.to_string())
            .with_attr(format!("{}:id", prefix), rel.as_str());
        list.insert_element(slot, entry);
        log::debug!("listed slide {} as {} at position {}", id, rel, index + 1);
        Ok(id)
    }

    /// Number of `p:sldId` entries, and the entry positions that resolve to a
    /// slide. Slide numbers index into the second list.
    fn listed_slide_slots(&self) -> Result<(usize, Vec<usize>)> {
        let doc = self.graph.xml(self.presentation)?;
        let Some(list) = doc.root.child("sldIdLst") else {
            return Ok((0, Vec::new()));
        };
        let mut count = 0;
        let mut listed = Vec::new();
        for (slot, entry) in list.children_named("sldId").enumerate() {
            count += 1;
            let resolves = entry_rel(entry)
                .and_then(|rel| self.graph.resolve(self.presentation, &rel).ok())
                .and_then(|part| self.graph.part(part))
                .is_some_and(|part| part.kind == PartKind::Slide);
            if resolves {
                listed.push(slot);
            }
        }
        Ok((count, listed))
    }

    /// Move slide `from` to position `to` (both 0-based slide numbers).
    ///
    /// Entries that do not resolve to a slide keep their place in the list.
    pub(crate) fn move_slide_entry(&mut self, from: usize, to: usize) -> Result<()> {
        let (_, listed) = self.listed_slide_slots()?;
        let Some(&source) = listed.get(from) else {
            return Err(Error::index_range(from + 1, 1, listed.len()));
        };

        let root = &mut self.graph.xml_mut(self.presentation)?.root;
        let list = root
            .child_mut("sldIdLst")
            .ok_or_else(|| Error::CorruptedPackage("presentation has no slide list".to_string()))?;
        let mut entries: Vec<XmlElement> = list.children_named("sldId").cloned().collect();
        let entry = entries.remove(source);
        let remaining: Vec<usize> = listed
            .iter()
            .filter(|slot| **slot != source)
            .map(|&slot| if slot > source { slot - 1 } else { slot })
            .collect();
        entries.insert(slot_for(&remaining, entries.len(), to), entry);

        list.remove_children("sldId");
        for (i, entry) in entries.into_iter().enumerate() {
            list.insert_element(i, entry);
        }
        Ok(())
    }

    /// List a master on the presentation under a fresh master id.
    pub fn register_master(&mut self, master: PartRef) -> Result<()> {
        let id = self.graph.ids_mut().next_layout_id()?;
        let rel = self
            .graph
            .link(self.presentation, master, Role::References, rt::SLIDE_MASTER)?;

        let root = &mut self.graph.xml_mut(self.presentation)?.root;
        let prefix = ensure_relationship_prefix(root);
        let list = root.ensure_child("sldMasterIdLst", &[]);
        let entry = XmlElement::new(list.qualify("sldMasterId"))
            .with_attr("id", id.to_string())
            .with_attr(format!("{}:id", prefix), rel.as_str());
        list.push(entry);
        Ok(())
    }

    /// Link the notes master from the presentation.
    pub fn register_notes_master(&mut self, notes_master: PartRef) -> Result<()> {
        let rel = self.graph.link(
            self.presentation,
            notes_master,
            Role::References,
            rt::NOTES_MASTER,
        )?;
        let root = &mut self.graph.xml_mut(self.presentation)?.root;
        let prefix = ensure_relationship_prefix(root);
        let list = root.ensure_child("notesMasterIdLst", &["sldMasterIdLst"]);
        list.remove_children("notesMasterId");
        let entry =
            XmlElement::new(list.qualify("notesMasterId")).with_attr(format!("{}:id", prefix), rel.as_str());
        list.push(entry);
        Ok(())
    }

    /// Append a layout to a master's layout list under a fresh layout id.
    pub fn append_layout(&mut self, master: PartRef, layout: PartRef) -> Result<()> {
        let id = self.graph.ids_mut().next_layout_id()?;
        let rel = self
            .graph
            .link(master, layout, Role::References, rt::SLIDE_LAYOUT)?;

        let root = &mut self.graph.xml_mut(master)?.root;
        let prefix = ensure_relationship_prefix(root);
        let list = root.ensure_child("sldLayoutIdLst", BEFORE_LAYOUT_LIST);
        let entry = XmlElement::new(list.qualify("sldLayoutId"))
            .with_attr("id", id.to_string())
            .with_attr(format!("{}:id", prefix), rel.as_str());
        list.push(entry);
        Ok(())
    }

    /// Give every entry of a master's layout list a fresh id.
    pub(crate) fn renumber_layouts(&mut self, master: PartRef) -> Result<()> {
        let count = self.list_entries(master, "sldLayoutIdLst").len();
        let ids: Vec<u32> = (0..count)
            .map(|_| self.graph.ids_mut().next_layout_id())
            .collect::<Result<_>>()?;
        let root = &mut self.graph.xml_mut(master)?.root;
        if let Some(list) = root.child_mut("sldLayoutIdLst") {
            for (entry, id) in list.elements_mut().zip(ids) {
                entry.set_attr("id", id.to_string());
            }
        }
        Ok(())
    }

    /// Sections in document order (`p14:sectionLst`).
    pub fn sections(&self) -> Vec<Section> {
        let Ok(doc) = self.graph.xml(self.presentation) else {
            return Vec::new();
        };
        let mut sections = Vec::new();
        doc.root.walk(&mut |element| {
            if element.local_name() == "section" {
                sections.push(Section {
                    name: element.attr("name").unwrap_or_default().to_string(),
                    slide_ids: element
                        .child("sldIdLst")
                        .map(|list| list.elements().filter_map(entry_id).collect())
                        .unwrap_or_default(),
                });
            }
        });
        sections
    }

    /// Drop a section; its slides stay in the presentation.
    pub fn remove_section(&mut self, name: &str) -> Result<bool> {
        let root = &mut self.graph.xml_mut(self.presentation)?.root;
        let mut removed = false;
        root.walk_mut(&mut |element| {
            if element.local_name() == "sectionLst" {
                let before = element.elements().count();
                element.retain_elements(|s| s.attr("name") != Some(name));
                removed |= element.elements().count() != before;
            }
        });
        Ok(removed)
    }

    /// Drop a slide id from every section list.
    pub(crate) fn remove_from_sections(&mut self, slide_id: u32) -> Result<()> {
        let root = &mut self.graph.xml_mut(self.presentation)?.root;
        root.walk_mut(&mut |element| {
            if element.local_name() == "section" {
                if let Some(list) = element.child_mut("sldIdLst") {
                    list.retain_elements(|entry| entry_id(entry) != Some(slide_id));
                }
            }
        });
        Ok(())
    }

    pub fn summary(&self) -> PackageSummary {
        let entries = self.slide_entries().unwrap_or_default();
        let slides = self
            .slide_parts()
            .into_iter()
            .enumerate()
            .map(|(i, part)| SlideSummary {
                number: i + 1,
                id: entries
                    .iter()
                    .find(|e| self.graph.resolve(self.presentation, &e.rel).ok() == Some(part))
                    .map(|e| e.id)
                    .unwrap_or_default(),
                part_name: self
                    .part_name(part)
                    .map(|n| n.to_string())
                    .unwrap_or_default(),
                layout: self.layout_of(part).and_then(|l| self.display_name(l)),
                has_notes: self.notes_of(part).is_some(),
                charts: self.charts_of(part).len(),
            })
            .collect();
        PackageSummary {
            slides,
            masters: self.masters().len(),
            layouts: self.all_layouts().len(),
            sections: self.sections(),
        }
    }

    /// Chart type of a chart part.
    pub fn chart_type(&self, chart_part: PartRef) -> Option<chart::ChartType> {
        self.graph
            .xml(chart_part)
            .ok()
            .and_then(|doc| chart::chart_type(&doc.root))
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Small in-memory packages shared by the core tests.

    use super::*;
    use crate::constants::namespace as ns;
    use crate::graph::{Part, PartContent};
    use crate::xml::XmlDocument;

    pub fn name(s: &str) -> PartName {
        PartName::new(s).unwrap()
    }

    fn doc(xml: &str) -> XmlDocument {
        XmlDocument::parse(xml.as_bytes()).unwrap()
    }

    pub fn master_xml(background: &str) -> String {
        format!(
            r#"<p:sldMaster xmlns:a="{}" xmlns:r="{}" xmlns:p="{}"><p:cSld><p:bg><p:bgPr><a:solidFill><a:srgbClr val="{}"/></a:solidFill></p:bgPr></p:bg><p:spTree/></p:cSld><p:clrMap bg1="lt1"/><p:sldLayoutIdLst/></p:sldMaster>"#,
            ns::DML,
            ns::OFC_RELATIONSHIPS,
            ns::PML,
            background
        )
    }

    pub fn layout_xml(layout_name: &str, layout_type: &str) -> String {
        format!(
            r#"<p:sldLayout xmlns:r="{}" xmlns:p="{}" type="{}"><p:cSld name="{}"><p:spTree/></p:cSld></p:sldLayout>"#,
            ns::OFC_RELATIONSHIPS,
            ns::PML,
            layout_type,
            layout_name
        )
    }

    pub fn slide_xml(text: &str) -> String {
        format!(
            r#"<p:sld xmlns:a="{}" xmlns:r="{}" xmlns:p="{}"><p:cSld><p:spTree><p:sp><p:txBody><a:p><a:r><a:t>{}</a:t></a:r></a:p></p:txBody></p:sp></p:spTree></p:cSld></p:sld>"#,
            ns::DML,
            ns::OFC_RELATIONSHIPS,
            ns::PML,
            text
        )
    }

    /// A package with one master (background `color`), the given layouts and
    /// `slides` slides bound to the first layout.
    pub fn package(color: &str, layouts: &[(&str, &str)], slides: usize) -> Package {
        let mut graph = PartGraph::new();
        let root = graph.add_part(Part::new(
            PartKind::PackageRoot,
            PartName::root(),
            "",
            PartContent::Binary(Vec::new()),
        ));
        let pres_xml = format!(
            r#"<p:presentation xmlns:r="{}" xmlns:p="{}"><p:sldSz cx="9144000" cy="6858000"/></p:presentation>"#,
            ns::OFC_RELATIONSHIPS,
            ns::PML
        );
        let presentation = graph.add_part(Part::xml(
            PartKind::Presentation,
            name("/ppt/presentation.xml"),
            doc(&pres_xml),
        ));
        graph
            .link(root, presentation, Role::Owns, rt::OFFICE_DOCUMENT)
            .unwrap();
        let theme = graph.add_part(Part::xml(
            PartKind::Theme,
            name("/ppt/theme/theme1.xml"),
            doc(r#"<a:theme xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" name="Office"/>"#),
        ));
        let master = graph.add_part(Part::xml(
            PartKind::SlideMaster,
            name("/ppt/slideMasters/slideMaster1.xml"),
            doc(&master_xml(color)),
        ));
        graph.link(master, theme, Role::References, rt::THEME).unwrap();

        let mut package = Package::from_graph(graph, root).unwrap();
        package.register_master(master).unwrap();

        let mut layout_parts = Vec::new();
        for (i, (layout_name, layout_type)) in layouts.iter().enumerate() {
            let layout = package.graph_mut().add_part(Part::xml(
                PartKind::SlideLayout,
                name(&format!("/ppt/slideLayouts/slideLayout{}.xml", i + 1)),
                doc(&layout_xml(layout_name, layout_type)),
            ));
            package
                .graph_mut()
                .link(layout, master, Role::References, rt::SLIDE_MASTER)
                .unwrap();
            package.append_layout(master, layout).unwrap();
            layout_parts.push(layout);
        }

        for i in 0..slides {
            let slide = package.graph_mut().add_part(Part::xml(
                PartKind::Slide,
                name(&format!("/ppt/slides/slide{}.xml", i + 1)),
                doc(&slide_xml(&format!("Slide {}", i + 1))),
            ));
            package
                .graph_mut()
                .link(slide, layout_parts[0], Role::References, rt::SLIDE_LAYOUT)
                .unwrap();
            package.insert_slide_entry(slide, i).unwrap();
        }
        package
    }

    /// Slide text of every slide, in order.
    pub fn slide_texts(package: &Package) -> Vec<String> {
        package
            .slide_parts()
            .into_iter()
            .map(|slide| {
                package
                    .graph()
                    .xml(slide)
                    .ok()
                    .and_then(|doc| doc.root.descendant("t").map(|t| t.text()))
                    .unwrap_or_default()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_slide_lookup_and_bounds() {
        let package = package("FFFFFF", &[("Title Slide", "title")], 3);
        assert_eq!(package.slide_count(), 3);
        assert!(package.slide(1).is_ok());
        assert!(package.slide(3).is_ok());
        assert!(matches!(package.slide(0), Err(Error::IndexRange { .. })));
        assert!(matches!(
            package.slide(4),
            Err(Error::IndexRange { index: 4, min: 1, max: 3 })
        ));
    }

    #[test]
    fn test_slide_ids_are_allocated_from_256() {
        let package = package("FFFFFF", &[("Title Slide", "title")], 2);
        let ids: Vec<u32> = package.slide_entries().unwrap().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![256, 257]);
    }

    #[test]
    fn test_masters_and_layouts_in_list_order() {
        let package = package("FFFFFF", &[("Title Slide", "title"), ("Blank", "blank")], 1);
        let masters = package.masters();
        assert_eq!(masters.len(), 1);
        let layouts = package.layouts(masters[0]);
        let names: Vec<String> = layouts
            .iter()
            .filter_map(|l| package.display_name(*l))
            .collect();
        assert_eq!(names, vec!["Title Slide", "Blank"]);
        assert_eq!(package.layout_type(layouts[1]).as_deref(), Some("blank"));
        assert_eq!(package.master_of(layouts[0]), Some(masters[0]));
    }

    #[test]
    fn test_from_graph_observes_existing_ids() {
        let package = package("FFFFFF", &[("Title Slide", "title")], 2);
        let Package { graph, root, .. } = package;
        let mut reopened = Package::from_graph(graph, root).unwrap();
        let slide = reopened.slide_parts()[0];
        assert_eq!(reopened.graph_mut().ids_mut().next_slide_id().unwrap(), 258);
        assert!(reopened.slide_id(slide).is_some());
    }

    #[test]
    fn test_move_slide_entry() {
        let mut package = package("FFFFFF", &[("Title Slide", "title")], 3);
        package.move_slide_entry(0, 2).unwrap();
        assert_eq!(slide_texts(&package), vec!["Slide 2", "Slide 3", "Slide 1"]);
    }

    #[test]
    fn test_slide_numbers_skip_unresolved_entries() {
        let mut package = package("FFFFFF", &[("Title Slide", "title")], 3);
        let presentation = package.presentation();
        let list = package
            .graph_mut()
            .xml_mut(presentation)
            .unwrap()
            .root
            .child_mut("sldIdLst")
            .unwrap();
        list.insert_element(
            0,
            XmlElement::new("p:sldId")
                .with_attr("id", "900")
                .with_attr("r:id", "rId99"),
        );
        assert_eq!(package.slide_count(), 3);

        package.move_slide_entry(2, 0).unwrap();
        assert_eq!(slide_texts(&package), vec!["Slide 3", "Slide 1", "Slide 2"]);

        let layout = package.all_layouts()[0];
        let first = package.slides_mut().add_with_layout(layout, Some(1)).unwrap();
        assert_eq!(package.slide(1).unwrap(), first);

        let ids: Vec<u32> = package.slide_entries().unwrap().iter().map(|e| e.id).collect();
        // The unresolved entry keeps its place at the head of the list.
        assert_eq!(ids, vec![900, 259, 258, 256, 257]);
        assert!(matches!(
            package.move_slide_entry(4, 0),
            Err(Error::IndexRange { index: 5, min: 1, max: 4 })
        ));
    }

    #[test]
    fn test_summary() {
        let package = package("FFFFFF", &[("Title Slide", "title")], 2);
        let summary = package.summary();
        assert_eq!(summary.slides.len(), 2);
        assert_eq!(summary.slides[1].number, 2);
        assert_eq!(summary.slides[0].layout.as_deref(), Some("Title Slide"));
        assert_eq!(summary.masters, 1);
        assert_eq!(summary.layouts, 1);
    }
}
