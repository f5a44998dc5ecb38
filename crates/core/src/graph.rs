//! The part graph: an arena of typed parts connected by relationship edges.
//!
//! Parts are addressed by generational handles. Edges live in a per-source map
//! keyed by relationship id, there are no back pointers. Inbound edges are
//! found by scanning, which is cheap at presentation scale.

use crate::error::{Error, Result};
use crate::ids::IdAllocator;
use crate::types::{PartKind, PartName, RelId, Role};
use crate::workbook::EmbeddedWorkbook;
use crate::xml::{rewrite_relationship_refs, XmlDocument};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

/// Opaque handle to a part. A handle to a removed part never resolves again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartRef {
    index: u32,
    generation: u32,
}

impl PartRef {
    pub(crate) fn new(index: usize, generation: u32) -> Self {
        Self {
            index: index as u32,
            generation,
        }
    }
}

impl fmt::Display for PartRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "part#{}.{}", self.index, self.generation)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelTarget {
    Part(PartRef),
    /// An external URI, e.g. a web hyperlink.
    External(String),
}

#[derive(Debug, Clone)]
pub struct Relationship {
    pub id: RelId,
    pub rel_type: String,
    pub target: RelTarget,
    pub role: Role,
}

impl Relationship {
    pub fn target_part(&self) -> Option<PartRef> {
        match self.target {
            RelTarget::Part(target) => Some(target),
            RelTarget::External(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum PartContent {
    Xml(XmlDocument),
    Binary(Vec<u8>),
    DataSource(EmbeddedWorkbook),
}

#[derive(Debug, Clone)]
pub struct Part {
    pub kind: PartKind,
    pub name: PartName,
    pub content_type: String,
    pub content: PartContent,
    pub rels: BTreeMap<RelId, Relationship>,
}

impl Part {
    pub fn new(
        kind: PartKind,
        name: PartName,
        content_type: impl Into<String>,
        content: PartContent,
    ) -> Self {
        Self {
            kind,
            name,
            content_type: content_type.into(),
            content,
            rels: BTreeMap::new(),
        }
    }

    /// An XML part with the default content type of its kind.
    pub fn xml(kind: PartKind, name: PartName, doc: XmlDocument) -> Self {
        let content_type = kind.default_content_type().unwrap_or_default();
        Self::new(kind, name, content_type, PartContent::Xml(doc))
    }

    pub fn xml_doc(&self) -> Option<&XmlDocument> {
        match &self.content {
            PartContent::Xml(doc) => Some(doc),
            _ => None,
        }
    }

    pub fn xml_doc_mut(&mut self) -> Option<&mut XmlDocument> {
        match &mut self.content {
            PartContent::Xml(doc) => Some(doc),
            _ => None,
        }
    }

    /// Raw bytes of binary and data-source parts.
    pub fn bytes(&self) -> Option<&[u8]> {
        match &self.content {
            PartContent::Binary(bytes) => Some(bytes),
            PartContent::DataSource(workbook) => Some(workbook.bytes()),
            PartContent::Xml(_) => None,
        }
    }

    pub fn relationship(&self, id: &RelId) -> Option<&Relationship> {
        self.rels.get(id)
    }

    pub fn relationships(&self) -> impl Iterator<Item = &Relationship> {
        self.rels.values()
    }
}

#[derive(Debug, Clone)]
struct Slot {
    generation: u32,
    part: Option<Part>,
}

/// Arena of parts plus the id allocator that keeps relationship ids unique.
#[derive(Debug, Clone, Default)]
pub struct PartGraph {
    slots: Vec<Slot>,
    free: Vec<usize>,
    ids: IdAllocator,
}

fn lookup(slots: &[Slot], handle: PartRef) -> Option<&Part> {
    slots
        .get(handle.index as usize)
        .filter(|slot| slot.generation == handle.generation)
        .and_then(|slot| slot.part.as_ref())
}

fn dangling(handle: PartRef) -> Error {
    Error::DanglingReference(format!("{} does not exist", handle))
}

impl PartGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a part without edges.
    pub fn add_part(&mut self, part: Part) -> PartRef {
        log::trace!("adding {} part {}", part.kind, part.name);
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index];
                slot.part = Some(part);
                PartRef::new(index, slot.generation)
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    part: Some(part),
                });
                PartRef::new(self.slots.len() - 1, 0)
            }
        }
    }

    pub fn contains(&self, handle: PartRef) -> bool {
        self.part(handle).is_some()
    }

    pub fn part(&self, handle: PartRef) -> Option<&Part> {
        lookup(&self.slots, handle)
    }

    pub fn part_mut(&mut self, handle: PartRef) -> Option<&mut Part> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.part.as_mut())
    }

    /// Like [`PartGraph::part`] but a missing part is an error.
    pub fn get(&self, handle: PartRef) -> Result<&Part> {
        self.part(handle).ok_or_else(|| dangling(handle))
    }

    pub fn get_mut(&mut self, handle: PartRef) -> Result<&mut Part> {
        self.part_mut(handle).ok_or_else(|| dangling(handle))
    }

    /// XML content of a part; binary parts are reported as corrupted.
    pub fn xml(&self, handle: PartRef) -> Result<&XmlDocument> {
        let part = self.get(handle)?;
        part.xml_doc()
            .ok_or_else(|| Error::CorruptedPackage(format!("{} is not an XML part", part.name)))
    }

    pub fn xml_mut(&mut self, handle: PartRef) -> Result<&mut XmlDocument> {
        let part = self.get_mut(handle)?;
        let name = part.name.clone();
        part.xml_doc_mut()
            .ok_or_else(|| Error::CorruptedPackage(format!("{} is not an XML part", name)))
    }

    pub fn parts(&self) -> impl Iterator<Item = (PartRef, &Part)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.part
                .as_ref()
                .map(|part| (PartRef::new(index, slot.generation), part))
        })
    }

    pub fn parts_of_kind(&self, kind: PartKind) -> impl Iterator<Item = PartRef> + '_ {
        self.parts()
            .filter(move |(_, part)| part.kind == kind)
            .map(|(handle, _)| handle)
    }

    pub fn part_count(&self) -> usize {
        self.parts().count()
    }

    pub fn find_by_name(&self, name: &PartName) -> Option<PartRef> {
        self.parts()
            .find(|(_, part)| &part.name == name)
            .map(|(handle, _)| handle)
    }

    /// First free part name for a template such as `/ppt/slides/slide%d.xml`.
    pub fn next_part_name(&self, template: &str) -> Result<PartName> {
        let taken: HashSet<&str> = self.parts().map(|(_, part)| part.name.as_str()).collect();
        let mut n = 1usize;
        loop {
            let candidate = template.replace("%d", &n.to_string());
            if !taken.contains(candidate.as_str()) {
                return PartName::new(candidate);
            }
            n += 1;
        }
    }

    pub fn ids(&self) -> &IdAllocator {
        &self.ids
    }

    pub fn ids_mut(&mut self) -> &mut IdAllocator {
        &mut self.ids
    }

    /// Link `source` to `target` under a freshly allocated relationship id.
    ///
    /// An `Owns` edge fails with [`Error::DuplicateReference`] when the target
    /// already has an owner.
    pub fn link(
        &mut self,
        source: PartRef,
        target: PartRef,
        role: Role,
        rel_type: &str,
    ) -> Result<RelId> {
        self.get(target)?;
        if role == Role::Owns {
            if let Some((owner, _)) = self.owner_of(target) {
                return Err(Error::DuplicateReference(format!(
                    "{} is already owned by {}",
                    self.get(target)?.name,
                    self.get(owner)?.name
                )));
            }
        }

        let rels = &lookup(&self.slots, source).ok_or_else(|| dangling(source))?.rels;
        let id = self
            .ids
            .next_relationship_id(source, |id| rels.contains_key(id));
        self.insert_edge(
            source,
            Relationship {
                id: id.clone(),
                rel_type: rel_type.to_string(),
                target: RelTarget::Part(target),
                role,
            },
        )?;
        Ok(id)
    }

    /// Insert an edge under an existing relationship id, as read from a package.
    pub fn link_with_id(
        &mut self,
        source: PartRef,
        id: RelId,
        target: RelTarget,
        role: Role,
        rel_type: &str,
    ) -> Result<()> {
        if let RelTarget::Part(handle) = target {
            self.get(handle)?;
            if role == Role::Owns && self.owner_of(handle).is_some() {
                return Err(Error::DuplicateReference(format!(
                    "{} already has an owner",
                    self.get(handle)?.name
                )));
            }
        }
        if self.get(source)?.rels.contains_key(&id) {
            return Err(Error::DuplicateReference(format!(
                "relationship id {} is already used by {}",
                id,
                self.get(source)?.name
            )));
        }
        self.ids.observe_relationship_id(source, &id);
        self.insert_edge(
            source,
            Relationship {
                id,
                rel_type: rel_type.to_string(),
                target,
                role,
            },
        )
    }

    /// Link `source` to an external URI.
    pub fn link_external(&mut self, source: PartRef, rel_type: &str, uri: &str) -> Result<RelId> {
        let rels = &lookup(&self.slots, source).ok_or_else(|| dangling(source))?.rels;
        let id = self
            .ids
            .next_relationship_id(source, |id| rels.contains_key(id));
        self.insert_edge(
            source,
            Relationship {
                id: id.clone(),
                rel_type: rel_type.to_string(),
                target: RelTarget::External(uri.to_string()),
                role: Role::References,
            },
        )?;
        Ok(id)
    }

    fn insert_edge(&mut self, source: PartRef, rel: Relationship) -> Result<()> {
        self.get_mut(source)?.rels.insert(rel.id.clone(), rel);
        Ok(())
    }

    /// The part holding the `Owns` edge into `target`, if any.
    pub fn owner_of(&self, target: PartRef) -> Option<(PartRef, RelId)> {
        self.parts().find_map(|(handle, part)| {
            part.relationships()
                .find(|rel| rel.role == Role::Owns && rel.target == RelTarget::Part(target))
                .map(|rel| (handle, rel.id.clone()))
        })
    }

    /// Every edge pointing at `target`, as `(source, relationship id)`.
    pub fn inbound(&self, target: PartRef) -> Vec<(PartRef, RelId)> {
        self.parts()
            .flat_map(|(handle, part)| {
                part.relationships()
                    .filter(move |rel| rel.target == RelTarget::Part(target))
                    .map(move |rel| (handle, rel.id.clone()))
            })
            .collect()
    }

    /// Targets of the edges of a given type leaving `source`, in id order.
    pub fn related_by_type(&self, source: PartRef, rel_type: &str) -> Vec<PartRef> {
        self.part(source)
            .map(|part| {
                part.relationships()
                    .filter(|rel| rel.rel_type == rel_type)
                    .filter_map(Relationship::target_part)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn first_related(&self, source: PartRef, rel_type: &str) -> Option<PartRef> {
        self.related_by_type(source, rel_type).into_iter().next()
    }

    /// Follow relationship `id` from `source` to the part it targets.
    pub fn resolve(&self, source: PartRef, id: &RelId) -> Result<PartRef> {
        let part = self.get(source)?;
        let rel = part.relationship(id).ok_or_else(|| {
            Error::DanglingReference(format!("{} has no relationship {}", part.name, id))
        })?;
        match rel.target {
            RelTarget::Part(target) if self.contains(target) => Ok(target),
            RelTarget::Part(_) => Err(Error::DanglingReference(format!(
                "relationship {} of {} targets a removed part",
                id, part.name
            ))),
            RelTarget::External(ref uri) => Err(Error::DanglingReference(format!(
                "relationship {} of {} is external ({})",
                id, part.name, uri
            ))),
        }
    }

    /// Remove one edge. The target goes with it when the edge owned it, or when
    /// it was a reference and nothing else points at the target any more.
    pub fn remove_relationship(&mut self, source: PartRef, id: &RelId) -> Result<Relationship> {
        let part = self.get_mut(source)?;
        let rel = part.rels.remove(id).ok_or_else(|| {
            Error::DanglingReference(format!("{} has no relationship {}", part.name, id))
        })?;

        if let Some(target) = rel.target_part() {
            if self.contains(target) {
                let collect = match rel.role {
                    Role::Owns => true,
                    Role::References => self.live_inbound(target, &HashSet::new()) == 0,
                };
                if collect {
                    self.remove_part(target)?;
                }
            }
        }
        Ok(rel)
    }

    /// Remove every edge from `source` to `target`, collecting the target as
    /// [`PartGraph::remove_relationship`] does.
    pub fn unlink(&mut self, source: PartRef, target: PartRef) -> Result<()> {
        let ids: Vec<RelId> = self
            .get(source)?
            .relationships()
            .filter(|rel| rel.target == RelTarget::Part(target))
            .map(|rel| rel.id.clone())
            .collect();
        if ids.is_empty() {
            return Err(Error::DanglingReference(format!(
                "{} has no edge to {}",
                self.get(source)?.name,
                target
            )));
        }
        for id in ids {
            if self.get(source)?.rels.contains_key(&id) {
                self.remove_relationship(source, &id)?;
            }
        }
        Ok(())
    }

    /// Remove a part and everything that dies with it.
    ///
    /// Parts reached through `Owns` edges are removed unconditionally. Parts
    /// reached through `References` edges are removed once no surviving part
    /// points at them. Edges from surviving parts into removed parts are dropped
    /// and the matching relationship attributes in their XML are cleared.
    pub fn remove_part(&mut self, handle: PartRef) -> Result<Vec<PartRef>> {
        self.get(handle)?;

        let mut removed: HashSet<PartRef> = HashSet::new();
        let mut order = Vec::new();
        let mut work = vec![handle];
        let mut candidates: Vec<PartRef> = Vec::new();

        loop {
            while let Some(current) = work.pop() {
                if removed.contains(&current) {
                    continue;
                }
                let Some(part) = self.take(current) else {
                    continue;
                };
                log::debug!("removing {} part {}", part.kind, part.name);
                removed.insert(current);
                order.push(current);
                for rel in part.relationships() {
                    if let Some(target) = rel.target_part() {
                        match rel.role {
                            Role::Owns => work.push(target),
                            Role::References => candidates.push(target),
                        }
                    }
                }
            }

            let before = work.len();
            for candidate in candidates.drain(..) {
                if self.contains(candidate) && self.live_inbound(candidate, &removed) == 0 {
                    work.push(candidate);
                }
            }
            if work.len() == before {
                break;
            }
        }

        self.sweep_edges_into(&removed);
        Ok(order)
    }

    /// Edges into `target` from live parts other than itself, ignoring `removed`.
    fn live_inbound(&self, target: PartRef, removed: &HashSet<PartRef>) -> usize {
        self.parts()
            .filter(|(handle, _)| *handle != target && !removed.contains(handle))
            .map(|(_, part)| {
                part.relationships()
                    .filter(|rel| rel.target == RelTarget::Part(target))
                    .count()
            })
            .sum()
    }

    fn take(&mut self, handle: PartRef) -> Option<Part> {
        let slot = self
            .slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)?;
        let part = slot.part.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index as usize);
        self.ids.release_part(handle);
        Some(part)
    }

    fn sweep_edges_into(&mut self, removed: &HashSet<PartRef>) {
        for slot in self.slots.iter_mut() {
            let Some(part) = slot.part.as_mut() else {
                continue;
            };
            let stale: Vec<RelId> = part
                .relationships()
                .filter(|rel| matches!(rel.target_part(), Some(t) if removed.contains(&t)))
                .map(|rel| rel.id.clone())
                .collect();
            if stale.is_empty() {
                continue;
            }

            let mut mapping = HashMap::new();
            for id in stale {
                log::warn!("dropping relationship {} of {}: target was removed", id, part.name);
                part.rels.remove(&id);
                mapping.insert(id, None);
            }
            if let PartContent::Xml(doc) = &mut part.content {
                rewrite_relationship_refs(&mut doc.root, &mapping);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::relationship_type as rt;
    use crate::xml::XmlElement;

    fn xml_part(graph: &mut PartGraph, kind: PartKind, name: &str) -> PartRef {
        let doc = XmlDocument::new(XmlElement::new("root"));
        graph.add_part(Part::xml(kind, PartName::new(name).unwrap(), doc))
    }

    #[test]
    fn test_link_and_resolve() {
        let mut graph = PartGraph::new();
        let slide = xml_part(&mut graph, PartKind::Slide, "/ppt/slides/slide1.xml");
        let layout = xml_part(&mut graph, PartKind::SlideLayout, "/ppt/slideLayouts/slideLayout1.xml");

        let id = graph.link(slide, layout, Role::References, rt::SLIDE_LAYOUT).unwrap();
        assert_eq!(id.as_str(), "rId1");
        assert_eq!(graph.resolve(slide, &id).unwrap(), layout);
        assert_eq!(graph.first_related(slide, rt::SLIDE_LAYOUT), Some(layout));
        assert_eq!(graph.inbound(layout), vec![(slide, id)]);
    }

    #[test]
    fn test_resolve_missing_is_dangling() {
        let mut graph = PartGraph::new();
        let slide = xml_part(&mut graph, PartKind::Slide, "/ppt/slides/slide1.xml");
        let err = graph.resolve(slide, &RelId::new("rId9")).unwrap_err();
        assert!(matches!(err, Error::DanglingReference(_)));
    }

    #[test]
    fn test_second_owner_is_rejected() {
        let mut graph = PartGraph::new();
        let a = xml_part(&mut graph, PartKind::Slide, "/ppt/slides/slide1.xml");
        let b = xml_part(&mut graph, PartKind::Slide, "/ppt/slides/slide2.xml");
        let chart = xml_part(&mut graph, PartKind::Chart, "/ppt/charts/chart1.xml");

        graph.link(a, chart, Role::Owns, rt::CHART).unwrap();
        let err = graph.link(b, chart, Role::Owns, rt::CHART).unwrap_err();
        assert!(matches!(err, Error::DuplicateReference(_)));
        // A plain reference is fine.
        graph.link(b, chart, Role::References, rt::CHART).unwrap();
    }

    #[test]
    fn test_link_with_duplicate_id_is_rejected() {
        let mut graph = PartGraph::new();
        let a = xml_part(&mut graph, PartKind::Slide, "/ppt/slides/slide1.xml");
        let b = xml_part(&mut graph, PartKind::SlideLayout, "/ppt/slideLayouts/slideLayout1.xml");
        let id = RelId::new("rId3");
        graph
            .link_with_id(a, id.clone(), RelTarget::Part(b), Role::References, rt::SLIDE_LAYOUT)
            .unwrap();
        let err = graph
            .link_with_id(a, id, RelTarget::Part(b), Role::References, rt::SLIDE_LAYOUT)
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateReference(_)));

        // Allocation continues past the loaded id.
        let next = graph.link_external(a, rt::HYPERLINK, "https://example.com").unwrap();
        assert_eq!(next.as_str(), "rId4");
    }

    #[test]
    fn test_unlink_collects_unreferenced_target() {
        let mut graph = PartGraph::new();
        let slide = xml_part(&mut graph, PartKind::Slide, "/ppt/slides/slide1.xml");
        let layout = xml_part(&mut graph, PartKind::SlideLayout, "/ppt/slideLayouts/slideLayout1.xml");
        graph.link(slide, layout, Role::References, rt::SLIDE_LAYOUT).unwrap();

        graph.unlink(slide, layout).unwrap();
        assert!(!graph.contains(layout));
        assert!(graph.get(layout).is_err());
    }

    #[test]
    fn test_removing_slide_keeps_shared_layout() {
        let mut graph = PartGraph::new();
        let pres = xml_part(&mut graph, PartKind::Presentation, "/ppt/presentation.xml");
        let s1 = xml_part(&mut graph, PartKind::Slide, "/ppt/slides/slide1.xml");
        let s2 = xml_part(&mut graph, PartKind::Slide, "/ppt/slides/slide2.xml");
        let layout = xml_part(&mut graph, PartKind::SlideLayout, "/ppt/slideLayouts/slideLayout1.xml");
        let r1 = graph.link(pres, s1, Role::Owns, rt::SLIDE).unwrap();
        let r2 = graph.link(pres, s2, Role::Owns, rt::SLIDE).unwrap();
        graph.link(s1, layout, Role::References, rt::SLIDE_LAYOUT).unwrap();
        graph.link(s2, layout, Role::References, rt::SLIDE_LAYOUT).unwrap();

        graph.remove_relationship(pres, &r1).unwrap();
        assert!(!graph.contains(s1));
        assert!(graph.contains(layout));

        graph.remove_relationship(pres, &r2).unwrap();
        assert!(!graph.contains(s2));
        assert!(!graph.contains(layout));
    }

    #[test]
    fn test_owned_parts_cascade() {
        let mut graph = PartGraph::new();
        let slide = xml_part(&mut graph, PartKind::Slide, "/ppt/slides/slide1.xml");
        let chart = xml_part(&mut graph, PartKind::Chart, "/ppt/charts/chart1.xml");
        let data = graph.add_part(Part::new(
            PartKind::EmbeddedDataSource,
            PartName::new("/ppt/embeddings/Microsoft_Excel_Worksheet1.xlsx").unwrap(),
            crate::constants::content_type::SML_SHEET,
            PartContent::DataSource(EmbeddedWorkbook::new(Vec::new())),
        ));
        graph.link(slide, chart, Role::Owns, rt::CHART).unwrap();
        graph.link(chart, data, Role::Owns, rt::PACKAGE).unwrap();

        let removed = graph.remove_part(slide).unwrap();
        assert_eq!(removed.len(), 3);
        assert_eq!(graph.part_count(), 0);
    }

    #[test]
    fn test_edges_into_removed_part_are_swept() {
        let mut graph = PartGraph::new();
        let s1 = xml_part(&mut graph, PartKind::Slide, "/ppt/slides/slide1.xml");
        let s2 = xml_part(&mut graph, PartKind::Slide, "/ppt/slides/slide2.xml");
        let jump = graph.link(s1, s2, Role::References, rt::SLIDE).unwrap();
        graph
            .xml_mut(s1)
            .unwrap()
            .root
            .set_attr("xmlns:r", crate::constants::namespace::OFC_RELATIONSHIPS);
        graph.xml_mut(s1).unwrap().root.push(
            XmlElement::new("a:hlinkClick").with_attr("r:id", jump.as_str()),
        );

        graph.remove_part(s2).unwrap();
        assert!(graph.get(s1).unwrap().rels.is_empty());
        let link = graph.xml(s1).unwrap().root.child("hlinkClick").unwrap();
        assert_eq!(link.attr("r:id"), Some(""));
    }

    #[test]
    fn test_stale_handle_after_slot_reuse() {
        let mut graph = PartGraph::new();
        let old = xml_part(&mut graph, PartKind::Slide, "/ppt/slides/slide1.xml");
        graph.remove_part(old).unwrap();
        let new = xml_part(&mut graph, PartKind::Slide, "/ppt/slides/slide1.xml");
        assert_ne!(old, new);
        assert!(graph.part(old).is_none());
        assert!(graph.part(new).is_some());
    }

    #[test]
    fn test_next_part_name_fills_gaps() {
        let mut graph = PartGraph::new();
        xml_part(&mut graph, PartKind::Slide, "/ppt/slides/slide1.xml");
        xml_part(&mut graph, PartKind::Slide, "/ppt/slides/slide3.xml");
        let name = graph.next_part_name("/ppt/slides/slide%d.xml").unwrap();
        assert_eq!(name.as_str(), "/ppt/slides/slide2.xml");
    }
}
