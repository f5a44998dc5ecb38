//! Structural validation of a package, run on demand.

use crate::chart;
use crate::constants::relationship_type as rt;
use crate::graph::{PartRef, RelTarget};
use crate::ids::{MAX_SLIDE_ID, MIN_LAYOUT_ID, MIN_SLIDE_ID};
use crate::package::{entry_rel, Package};
use crate::types::{PartKind, RelId};
use crate::xml::relationship_refs;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Part name the issue was found in, if it is tied to one part.
    pub part: Option<String>,
    pub message: String,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.part {
            Some(part) => write!(f, "{}: {}", part, self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Collects every structural problem of a package instead of stopping at the first.
#[derive(Debug, Default)]
pub struct Validator {
    issues: Vec<ValidationIssue>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn validate(mut self, package: &Package) -> Vec<ValidationIssue> {
        self.check_slide_list(package);
        self.check_slides(package);
        self.check_layouts(package);
        self.check_layout_ids(package);
        self.check_edges(package);
        self.check_charts(package);
        self.issues
    }

    fn report(&mut self, package: &Package, part: Option<PartRef>, message: String) {
        let part = part
            .and_then(|p| package.part_name(p))
            .map(|name| name.to_string());
        self.issues.push(ValidationIssue { part, message });
    }

    fn check_slide_list(&mut self, package: &Package) {
        let presentation = Some(package.presentation());
        let entries = match package.slide_entries() {
            Ok(entries) => entries,
            Err(e) => {
                self.report(package, presentation, e.to_string());
                return;
            }
        };

        let mut ids = HashSet::new();
        let mut rels = HashSet::new();
        for entry in &entries {
            if !(MIN_SLIDE_ID..=MAX_SLIDE_ID).contains(&entry.id) {
                self.report(package, presentation, format!("slide id {} is out of range", entry.id));
            }
            if !ids.insert(entry.id) {
                self.report(package, presentation, format!("slide id {} is used twice", entry.id));
            }
            if !rels.insert(entry.rel.clone()) {
                self.report(
                    package,
                    presentation,
                    format!("relationship {} is listed twice in the slide list", entry.rel),
                );
            }
            match package.graph().resolve(package.presentation(), &entry.rel) {
                Ok(target) if package.graph().part(target).map(|p| p.kind) == Some(PartKind::Slide) => {}
                Ok(_) => self.report(
                    package,
                    presentation,
                    format!("slide list entry {} does not point at a slide", entry.rel),
                ),
                Err(e) => self.report(package, presentation, e.to_string()),
            }
        }
    }

    fn check_slides(&mut self, package: &Package) {
        for slide in package.slide_parts() {
            let layouts = package.graph().related_by_type(slide, rt::SLIDE_LAYOUT).len();
            if layouts != 1 {
                self.report(package, Some(slide), format!("slide has {} layouts", layouts));
            }
        }
    }

    fn check_layouts(&mut self, package: &Package) {
        let layouts: Vec<PartRef> = package
            .graph()
            .parts_of_kind(PartKind::SlideLayout)
            .collect();
        for layout in layouts {
            if package.master_of(layout).is_none() {
                self.report(package, Some(layout), "layout has no master".to_string());
            }
        }

        for master in package.masters() {
            let Ok(doc) = package.graph().xml(master) else {
                continue;
            };
            let Some(list) = doc.root.child("sldLayoutIdLst") else {
                continue;
            };
            for entry in list.elements() {
                let resolved = entry_rel(entry)
                    .and_then(|rel| package.graph().resolve(master, &rel).ok())
                    .and_then(|target| package.graph().part(target))
                    .is_some_and(|part| part.kind == PartKind::SlideLayout);
                if !resolved {
                    self.report(
                        package,
                        Some(master),
                        format!(
                            "layout list entry {} does not resolve to a layout",
                            entry.attr("id").unwrap_or("?")
                        ),
                    );
                }
            }
        }
    }

    fn check_layout_ids(&mut self, package: &Package) {
        let mut seen = HashSet::new();
        let mut lists = vec![(package.presentation(), "sldMasterIdLst")];
        lists.extend(package.masters().into_iter().map(|m| (m, "sldLayoutIdLst")));

        for (part, list_name) in lists {
            let ids: Vec<String> = package
                .graph()
                .xml(part)
                .ok()
                .and_then(|doc| doc.root.child(list_name))
                .map(|list| {
                    list.elements()
                        .filter_map(|e| e.attr("id").map(str::to_string))
                        .collect()
                })
                .unwrap_or_default();
            for id in ids {
                match id.parse::<u32>() {
                    Ok(n) if n >= MIN_LAYOUT_ID => {
                        if !seen.insert(n) {
                            self.report(package, Some(part), format!("master or layout id {} is used twice", n));
                        }
                    }
                    _ => self.report(package, Some(part), format!("invalid master or layout id {}", id)),
                }
            }
        }
    }

    fn check_edges(&mut self, package: &Package) {
        let graph = package.graph();
        let mut found = Vec::new();
        for (handle, part) in graph.parts() {
            for rel in part.relationships() {
                if let RelTarget::Part(target) = rel.target {
                    if !graph.contains(target) {
                        found.push((handle, format!("relationship {} targets a removed part", rel.id)));
                    }
                }
            }
            if let Some(doc) = part.xml_doc() {
                let known: HashSet<&RelId> = part.rels.keys().collect();
                for id in relationship_refs(&doc.root) {
                    if !known.contains(&id) {
                        found.push((handle, format!("XML refers to unknown relationship {}", id)));
                    }
                }
            }
        }
        for (handle, message) in found {
            self.report(package, Some(handle), message);
        }
    }

    fn check_charts(&mut self, package: &Package) {
        let graph = package.graph();
        let charts: Vec<PartRef> = graph.parts_of_kind(PartKind::Chart).collect();
        for chart_part in charts {
            let Ok(doc) = graph.xml(chart_part) else {
                continue;
            };
            let Some(id) = chart::external_data_rel(&doc.root) else {
                continue;
            };
            let ok = graph
                .resolve(chart_part, &id)
                .ok()
                .and_then(|target| graph.part(target))
                .is_some_and(|part| part.kind == PartKind::EmbeddedDataSource);
            // Linked external workbooks are legal, they just cannot be resolved here.
            let external = matches!(
                graph.get(chart_part).ok().and_then(|p| p.relationship(&id)).map(|r| &r.target),
                Some(RelTarget::External(_))
            );
            if !ok && !external {
                self.report(
                    package,
                    Some(chart_part),
                    format!("external data {} does not resolve to an embedded workbook", id),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Part, PartContent};
    use crate::package::fixtures::{name, package};
    use crate::types::Role;
    use crate::xml::{XmlDocument, XmlElement};

    fn layouts() -> Vec<(&'static str, &'static str)> {
        vec![("Title Slide", "title"), ("Blank", "blank")]
    }

    #[test]
    fn test_clean_package_has_no_issues() {
        let pres = package("FFFFFF", &layouts(), 3);
        assert!(Validator::new().validate(&pres).is_empty());
    }

    #[test]
    fn test_duplicate_slide_id() {
        let mut pres = package("FFFFFF", &layouts(), 2);
        let presentation = pres.presentation();
        let root = &mut pres.graph_mut().xml_mut(presentation).unwrap().root;
        for entry in root.child_mut("sldIdLst").unwrap().elements_mut() {
            entry.set_attr("id", "300");
        }

        let issues = Validator::new().validate(&pres);
        assert_eq!(issues.len(), 1);
        assert!(issues[0].message.contains("used twice"));
        assert_eq!(issues[0].part.as_deref(), Some("/ppt/presentation.xml"));
    }

    #[test]
    fn test_unknown_relationship_in_xml() {
        let mut pres = package("FFFFFF", &layouts(), 1);
        let slide = pres.slide(1).unwrap().part;
        pres.graph_mut()
            .xml_mut(slide)
            .unwrap()
            .root
            .push(XmlElement::new("a:hlinkClick").with_attr("r:id", "rId42"));

        let issues = Validator::new().validate(&pres);
        assert_eq!(issues.len(), 1);
        assert!(issues[0].to_string().contains("rId42"));
    }

    #[test]
    fn test_slide_without_layout() {
        let mut pres = package("FFFFFF", &layouts(), 1);
        let slide = pres.slide(1).unwrap().part;
        let layout = pres.layout_of(slide).unwrap();
        // Drop only the edge; the master still lists the layout.
        pres.graph_mut().get_mut(slide).unwrap().rels.clear();
        assert!(pres.graph().contains(layout));

        let issues = Validator::new().validate(&pres);
        assert!(issues.iter().any(|i| i.message == "slide has 0 layouts"));
    }

    #[test]
    fn test_chart_without_workbook() {
        let mut pres = package("FFFFFF", &layouts(), 1);
        let slide = pres.slide(1).unwrap().part;
        let graph = pres.graph_mut();
        let chart = graph.add_part(Part::new(
            PartKind::Chart,
            name("/ppt/charts/chart1.xml"),
            crate::constants::content_type::DML_CHART,
            PartContent::Xml(XmlDocument::new(
                XmlElement::new("c:chartSpace")
                    .with_attr("xmlns:c", crate::constants::namespace::DML_CHART)
                    .with_child(XmlElement::new("c:externalData").with_attr("r:id", "rId1")),
            )),
        ));
        graph.link(slide, chart, Role::Owns, rt::CHART).unwrap();

        let issues = Validator::new().validate(&pres);
        assert_eq!(issues.len(), 1);
        assert!(issues[0].message.contains("embedded workbook"));
    }
}
