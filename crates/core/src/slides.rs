//! The ordered slide list of a package and the structural edits on it.

use crate::constants::{namespace as ns, relationship_type as rt};
use crate::copy::CopyEngine;
use crate::error::{Error, Result};
use crate::graph::{Part, PartRef};
use crate::package::{Package, SlideRef};
use crate::types::{PartKind, Role};
use crate::xml::{rewrite_relationship_refs, XmlDocument, XmlElement};
use std::collections::HashMap;

/// A slide handed to [`SlideCollection::add`].
///
/// A bare [`SlideRef`] names a slide of the receiving package. A slide of
/// another package travels with that package so it can be copied.
#[derive(Debug, Clone, Copy)]
pub enum SlideSource<'s> {
    Local(SlideRef),
    Foreign(&'s Package, SlideRef),
}

impl From<SlideRef> for SlideSource<'_> {
    fn from(slide: SlideRef) -> Self {
        SlideSource::Local(slide)
    }
}

impl<'s> From<(&'s Package, SlideRef)> for SlideSource<'s> {
    fn from((package, slide): (&'s Package, SlideRef)) -> Self {
        SlideSource::Foreign(package, slide)
    }
}

/// Mutable view over the slides of one package.
///
/// Positions are 1-based; inserting accepts `1..=len()+1`.
pub struct SlideCollection<'a> {
    package: &'a mut Package,
}

impl Package {
    pub fn slides_mut(&mut self) -> SlideCollection<'_> {
        SlideCollection { package: self }
    }
}

impl<'a> SlideCollection<'a> {
    pub fn len(&self) -> usize {
        self.package.slide_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Slide by 1-based number.
    pub fn get(&self, number: usize) -> Result<SlideRef> {
        self.package.slide(number)
    }

    pub fn iter(&self) -> std::vec::IntoIter<SlideRef> {
        self.package.slide_refs().into_iter()
    }

    /// 0-based insert index for an optional 1-based position; `None` appends.
    fn insert_index(&self, position: Option<usize>) -> Result<usize> {
        let count = self.len();
        match position {
            None => Ok(count),
            Some(p) if (1..=count + 1).contains(&p) => Ok(p - 1),
            Some(p) => Err(Error::index_range(p, 1, count + 1)),
        }
    }

    fn check_owned(&self, slide: SlideRef) -> Result<usize> {
        if slide.package != self.package.id() {
            return Err(Error::DanglingReference(format!(
                "slide {} belongs to {}, not {}",
                slide.part,
                slide.package,
                self.package.id()
            )));
        }
        self.package.slide_index(slide.part).ok_or_else(|| {
            Error::DanglingReference(format!("{} is not in the slide list", slide.part))
        })
    }

    /// Place a slide at `position`.
    ///
    /// A slide of this package is moved and keeps its id and parts. A slide of
    /// another package is copied with everything it depends on.
    pub fn add<'s>(
        &mut self,
        slide: impl Into<SlideSource<'s>>,
        position: Option<usize>,
    ) -> Result<SlideRef> {
        let index = self.insert_index(position)?;
        match slide.into() {
            SlideSource::Local(slide) => self.move_to(slide, index),
            SlideSource::Foreign(source, slide) if source.id() == self.package.id() => {
                self.move_to(slide, index)
            }
            SlideSource::Foreign(source, slide) => {
                CopyEngine::new().copy(source, slide, self.package, index)
            }
        }
    }

    fn move_to(&mut self, slide: SlideRef, index: usize) -> Result<SlideRef> {
        let from = self.check_owned(slide)?;
        let to = index.min(self.len() - 1);
        if from != to {
            self.package.move_slide_entry(from, to)?;
            log::debug!("moved slide from position {} to {}", from + 1, to + 1);
        }
        Ok(slide)
    }

    /// Create an empty slide bound to `layout` at `position`.
    pub fn add_with_layout(&mut self, layout: PartRef, position: Option<usize>) -> Result<SlideRef> {
        let index = self.insert_index(position)?;
        let graph = self.package.graph_mut();
        let layout_part = graph.get(layout)?;
        if layout_part.kind != PartKind::SlideLayout {
            return Err(Error::DanglingReference(format!(
                "{} is not a slide layout",
                layout_part.name
            )));
        }

        let template = PartKind::Slide.name_template().unwrap_or("/ppt/slides/slide%d.xml");
        let name = graph.next_part_name(template)?;
        let slide = graph.add_part(Part::xml(PartKind::Slide, name, empty_slide()));
        graph.link(slide, layout, Role::References, rt::SLIDE_LAYOUT)?;
        if let Err(err) = self.package.insert_slide_entry(slide, index) {
            self.package.graph_mut().remove_part(slide)?;
            return Err(err);
        }
        Ok(SlideRef {
            package: self.package.id(),
            part: slide,
        })
    }

    /// Remove a slide with everything only it was holding on to.
    pub fn remove(&mut self, slide: SlideRef) -> Result<()> {
        self.check_owned(slide)?;
        let presentation = self.package.presentation();
        let entry = self
            .package
            .slide_entries()?
            .into_iter()
            .find(|entry| {
                self.package.graph().resolve(presentation, &entry.rel).ok() == Some(slide.part)
            })
            .ok_or_else(|| Error::DanglingReference(format!("{} is not listed", slide.part)))?;

        self.package
            .graph_mut()
            .remove_relationship(presentation, &entry.rel)?;

        let mut mapping = HashMap::new();
        mapping.insert(entry.rel.clone(), None);
        let root = &mut self.package.graph_mut().xml_mut(presentation)?.root;
        rewrite_relationship_refs(root, &mapping);
        self.package.remove_from_sections(entry.id)?;

        log::debug!("removed slide {} ({})", entry.id, entry.rel);
        Ok(())
    }

    /// Remove the slide at a 1-based number.
    pub fn remove_at(&mut self, number: usize) -> Result<()> {
        let slide = self.get(number)?;
        self.remove(slide)
    }
}

fn empty_slide() -> XmlDocument {
    let sp_tree = XmlElement::new("p:spTree")
        .with_child(
            XmlElement::new("p:nvGrpSpPr")
                .with_child(
                    XmlElement::new("p:cNvPr")
                        .with_attr("id", "1")
                        .with_attr("name", ""),
                )
                .with_child(XmlElement::new("p:cNvGrpSpPr"))
                .with_child(XmlElement::new("p:nvPr")),
        )
        .with_child(XmlElement::new("p:grpSpPr"));
    XmlDocument::new(
        XmlElement::new("p:sld")
            .with_attr("xmlns:a", ns::DML)
            .with_attr("xmlns:r", ns::OFC_RELATIONSHIPS)
            .with_attr("xmlns:p", ns::PML)
            .with_child(XmlElement::new("p:cSld").with_child(sp_tree))
            .with_child(
                XmlElement::new("p:clrMapOvr").with_child(XmlElement::new("a:masterClrMapping")),
            ),
    )
}
