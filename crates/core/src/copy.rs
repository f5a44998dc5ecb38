//! Copying a slide between packages.
//!
//! A copy runs in three phases:
//!
//! 1. [`Closure::compute`] collects every part the slide depends on.
//! 2. [`CopyPlan::build`] decides, without touching the destination, whether
//!    each part is cloned, replaced by an equivalent destination part, or left
//!    behind.
//! 3. [`CopyEngine::copy`] clones the parts, relinks them under fresh
//!    relationship ids, rewrites the ids inside the cloned XML and lists the new
//!    slide in the destination.
//!
//! Only the plan phase can fail without side effects. A failure while cloning
//! leaves the destination partially modified and it should be discarded.

use crate::constants::relationship_type as rt;
use crate::error::{Error, Result};
use crate::graph::{Part, PartContent, PartRef, RelTarget};
use crate::package::{Package, SlideRef};
use crate::types::{PartKind, RelId, Role};
use crate::xml::{relationship_prefixes, rewrite_relationship_refs, XmlElement};
use std::collections::{HashMap, HashSet, VecDeque};

/// Parts reachable from a slide, in breadth-first order.
#[derive(Debug, Clone)]
pub struct Closure {
    pub root: PartRef,
    pub parts: Vec<PartRef>,
    /// For each part, the closure parts with an edge into it and that edge's role.
    parents: HashMap<PartRef, Vec<(PartRef, Role)>>,
}

fn traversable(source: PartKind, target: PartKind) -> bool {
    match target {
        PartKind::Slide | PartKind::Presentation | PartKind::PackageRoot => false,
        PartKind::SlideLayout => source != PartKind::SlideMaster,
        _ => true,
    }
}

impl Closure {
    pub fn compute(package: &Package, slide: PartRef) -> Result<Self> {
        let graph = package.graph();
        let root = graph.get(slide)?;
        if root.kind != PartKind::Slide {
            return Err(Error::DanglingReference(format!("{} is not a slide", root.name)));
        }

        let mut parts = vec![slide];
        let mut seen: HashSet<PartRef> = HashSet::from([slide]);
        let mut parents: HashMap<PartRef, Vec<(PartRef, Role)>> = HashMap::new();
        let mut queue = VecDeque::from([slide]);

        while let Some(current) = queue.pop_front() {
            let part = graph.get(current)?;
            for rel in part.relationships() {
                let Some(target) = rel.target_part() else {
                    continue;
                };
                let Some(target_part) = graph.part(target) else {
                    continue;
                };
                if !traversable(part.kind, target_part.kind) {
                    continue;
                }
                parents.entry(target).or_default().push((current, rel.role));
                if seen.insert(target) {
                    parts.push(target);
                    queue.push_back(target);
                }
            }
        }

        Ok(Self {
            root: slide,
            parts,
            parents,
        })
    }

    pub fn contains(&self, part: PartRef) -> bool {
        self.parts.contains(&part)
    }

    pub fn parents(&self, part: PartRef) -> &[(PartRef, Role)] {
        self.parents.get(&part).map(Vec::as_slice).unwrap_or_default()
    }
}

/// What happens to one closure part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Deep-copy into the destination.
    Clone,
    /// Use this equivalent destination part instead.
    Reuse(PartRef),
    /// Not needed in the destination.
    Skip,
}

#[derive(Debug, Clone)]
pub struct CopyPlan {
    order: Vec<PartRef>,
    decisions: HashMap<PartRef, Decision>,
}

impl CopyPlan {
    /// Decide every closure part against the destination package.
    pub fn build(source: &Package, closure: &Closure, dest: &Package) -> Result<Self> {
        let graph = source.graph();
        let mut decisions: HashMap<PartRef, Decision> = HashMap::new();
        decisions.insert(closure.root, Decision::Clone);

        let dest_masters: Vec<(PartRef, Vec<u8>)> = dest
            .masters()
            .into_iter()
            .filter_map(|m| master_signature(dest, m).map(|sig| (m, sig)))
            .collect();

        for &part in &closure.parts {
            if graph.get(part)?.kind != PartKind::SlideMaster {
                continue;
            }
            let signature = master_signature(source, part);
            let reuse = dest_masters
                .iter()
                .find(|(_, sig)| Some(sig) == signature.as_ref())
                .map(|(m, _)| *m);
            decisions.insert(part, reuse.map_or(Decision::Clone, Decision::Reuse));
        }

        for &part in &closure.parts {
            if graph.get(part)?.kind != PartKind::SlideLayout {
                continue;
            }
            let reused_master = source
                .master_of(part)
                .and_then(|m| decisions.get(&m).copied())
                .and_then(|d| match d {
                    Decision::Reuse(dest_master) => Some(dest_master),
                    _ => None,
                });
            let decision = reused_master
                .and_then(|dest_master| equivalent_layout(source, part, dest, dest_master))
                .map_or(Decision::Clone, Decision::Reuse);
            decisions.insert(part, decision);
        }

        // Everything else depends on its parents; iterate until nothing changes.
        let mut changed = true;
        while changed {
            changed = false;
            for &part in &closure.parts {
                let kind = graph.get(part)?.kind;
                if part == closure.root
                    || matches!(kind, PartKind::SlideMaster | PartKind::SlideLayout)
                {
                    continue;
                }
                let decision = decide(source, closure, dest, part, kind, &decisions)?;
                if decisions.get(&part) != Some(&decision) {
                    decisions.insert(part, decision);
                    changed = true;
                }
            }
        }

        for &part in &closure.parts {
            log::debug!(
                "copy plan: {} -> {:?}",
                graph.get(part)?.name,
                decisions.get(&part).copied().unwrap_or(Decision::Skip)
            );
        }

        Ok(Self {
            order: closure.parts.clone(),
            decisions,
        })
    }

    pub fn decision(&self, part: PartRef) -> Decision {
        self.decisions.get(&part).copied().unwrap_or(Decision::Skip)
    }

    /// Parts to clone, in closure order.
    pub fn clones(&self) -> impl Iterator<Item = PartRef> + '_ {
        self.order
            .iter()
            .copied()
            .filter(|part| self.decision(*part) == Decision::Clone)
    }
}

fn decide(
    source: &Package,
    closure: &Closure,
    dest: &Package,
    part: PartRef,
    kind: PartKind,
    decisions: &HashMap<PartRef, Decision>,
) -> Result<Decision> {
    let cloned_parent = |role: Option<Role>| {
        closure.parents(part).iter().any(|(parent, r)| {
            decisions.get(parent) == Some(&Decision::Clone) && role.map_or(true, |role| *r == role)
        })
    };

    if !cloned_parent(None) {
        return Ok(Decision::Skip);
    }
    if cloned_parent(Some(Role::Owns)) {
        return match kind {
            PartKind::CoreProperties => Err(unsupported(source, part)),
            _ => Ok(Decision::Clone),
        };
    }

    match kind {
        PartKind::NotesMaster => Ok(dest
            .notes_master()
            .map_or(Decision::Clone, Decision::Reuse)),
        PartKind::Media => {
            let bytes = source.graph().get(part)?.bytes().unwrap_or_default();
            let same = dest.graph().parts_of_kind(PartKind::Media).find(|candidate| {
                dest.graph()
                    .part(*candidate)
                    .and_then(|p| p.bytes())
                    .is_some_and(|b| b == bytes)
            });
            Ok(same.map_or(Decision::Clone, Decision::Reuse))
        }
        PartKind::Theme
        | PartKind::Notes
        | PartKind::Chart
        | PartKind::ChartStyle
        | PartKind::ChartColors
        | PartKind::EmbeddedDataSource
        | PartKind::Other => Ok(Decision::Clone),
        _ => Err(unsupported(source, part)),
    }
}

fn unsupported(source: &Package, part: PartRef) -> Error {
    let detail = source
        .graph()
        .part(part)
        .map(|p| format!("{} ({})", p.name, p.content_type))
        .unwrap_or_else(|| part.to_string());
    Error::UnsupportedPartKind(detail)
}

/// Normalized master content plus its theme, ignoring relationship ids,
/// namespace declarations and the layout list.
fn master_signature(package: &Package, master: PartRef) -> Option<Vec<u8>> {
    let graph = package.graph();
    let mut signature = normalized(&graph.xml(master).ok()?.root)?;
    if let Some(theme) = graph.first_related(master, rt::THEME) {
        signature.extend(normalized(&graph.xml(theme).ok()?.root)?);
    }
    Some(signature)
}

fn normalized(root: &XmlElement) -> Option<Vec<u8>> {
    let prefixes = relationship_prefixes(root);
    let mut copy = root.clone();
    copy.strip_whitespace();
    copy.remove_children("sldLayoutIdLst");
    copy.walk_mut(&mut |element| {
        element.attributes.retain(|(key, _)| {
            let prefix = key.split_once(':').map(|(p, _)| p);
            key != "xmlns"
                && prefix != Some("xmlns")
                && !prefix.is_some_and(|p| prefixes.contains(p))
        });
    });
    crate::xml::XmlDocument::new(copy).to_bytes().ok()
}

fn equivalent_layout(
    source: &Package,
    layout: PartRef,
    dest: &Package,
    dest_master: PartRef,
) -> Option<PartRef> {
    let name = source.display_name(layout);
    let layout_type = source.layout_type(layout);
    dest.layouts(dest_master)
        .into_iter()
        .find(|candidate| {
            dest.display_name(*candidate) == name && dest.layout_type(*candidate) == layout_type
        })
}

/// Name template for a clone: the kind's template, else the source name with
/// its trailing number replaced.
fn clone_template(part: &Part) -> String {
    if part.kind != PartKind::Media {
        if let Some(template) = part.kind.name_template() {
            return template.to_string();
        }
    }
    let filename = part.name.filename();
    let (stem, ext) = match filename.rsplit_once('.') {
        Some((stem, ext)) => (stem, format!(".{}", ext)),
        None => (filename, String::new()),
    };
    let stem = stem.trim_end_matches(|c: char| c.is_ascii_digit());
    let base = part.name.base_uri().trim_end_matches('/');
    format!("{}/{}%d{}", base, stem, ext)
}

#[derive(Debug, Default)]
pub struct CopyEngine;

impl CopyEngine {
    pub fn new() -> Self {
        Self
    }

    /// Copy `slide` of `source` into `dest` at the 0-based `index`.
    pub fn copy(
        &self,
        source: &Package,
        slide: SlideRef,
        dest: &mut Package,
        index: usize,
    ) -> Result<SlideRef> {
        if slide.package != source.id() {
            return Err(Error::DanglingReference(format!(
                "slide {} does not belong to {}",
                slide.part,
                source.id()
            )));
        }

        let closure = Closure::compute(source, slide.part)?;
        let plan = CopyPlan::build(source, &closure, dest)?;

        // Clone contents under fresh names.
        let mut mapping: HashMap<PartRef, PartRef> = HashMap::new();
        let mut cloned: Vec<(PartRef, PartRef)> = Vec::new();
        for &part in &closure.parts {
            match plan.decision(part) {
                Decision::Reuse(target) => {
                    mapping.insert(part, target);
                }
                Decision::Clone => {
                    let original = source.graph().get(part)?;
                    let name = dest.graph().next_part_name(&clone_template(original))?;
                    let copy = Part::new(
                        original.kind,
                        name,
                        original.content_type.clone(),
                        original.content.clone(),
                    );
                    let new = dest.graph_mut().add_part(copy);
                    mapping.insert(part, new);
                    cloned.push((part, new));
                }
                Decision::Skip => {}
            }
        }

        // Relink every edge of the clones and rewrite the ids they use.
        for &(old, new) in &cloned {
            let original = source.graph().get(old)?;
            let mut ids: HashMap<RelId, Option<RelId>> = HashMap::new();
            for rel in original.relationships() {
                let new_id = match &rel.target {
                    RelTarget::External(uri) => {
                        Some(dest.graph_mut().link_external(new, &rel.rel_type, uri)?)
                    }
                    RelTarget::Part(target) => match mapping.get(target) {
                        Some(&dest_target) => {
                            Some(dest.graph_mut().link(new, dest_target, rel.role, &rel.rel_type)?)
                        }
                        None => {
                            log::debug!(
                                "dropping relationship {} of {} in copy",
                                rel.id,
                                original.name
                            );
                            None
                        }
                    },
                };
                ids.insert(rel.id.clone(), new_id);
            }
            if let PartContent::Xml(doc) = &mut dest.graph_mut().get_mut(new)?.content {
                rewrite_relationship_refs(&mut doc.root, &ids);
            }
        }

        // Register new masters, layouts and notes masters with their lists.
        for &(old, new) in &cloned {
            match source.graph().get(old)?.kind {
                PartKind::SlideMaster => {
                    dest.register_master(new)?;
                    dest.renumber_layouts(new)?;
                }
                PartKind::NotesMaster => dest.register_notes_master(new)?,
                PartKind::SlideLayout => {
                    let master = source.master_of(old).and_then(|m| match plan.decision(m) {
                        Decision::Reuse(dest_master) => Some(dest_master),
                        _ => None,
                    });
                    if let Some(dest_master) = master {
                        dest.append_layout(dest_master, new)?;
                    }
                }
                _ => {}
            }
        }

        let new_slide = mapping
            .get(&slide.part)
            .copied()
            .ok_or_else(|| Error::DanglingReference("copied slide was not cloned".to_string()))?;
        dest.insert_slide_entry(new_slide, index)?;
        log::debug!(
            "copied slide {} into {} ({} parts cloned)",
            slide.part,
            dest.id(),
            cloned.len()
        );

        Ok(SlideRef {
            package: dest.id(),
            part: new_slide,
        })
    }
}
