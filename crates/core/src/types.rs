//! Domain types shared by the part graph, the copy engine and the package I/O layer.

use crate::constants::content_type as ct;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

/// The kind of a part in a presentation package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PartKind {
    /// The `/` pseudo-part that owns package-level relationships.
    PackageRoot,
    Presentation,
    Slide,
    SlideLayout,
    SlideMaster,
    Notes,
    NotesMaster,
    Theme,
    Chart,
    ChartStyle,
    ChartColors,
    /// A spreadsheet package embedded behind a chart.
    EmbeddedDataSource,
    /// Images and other binary media.
    Media,
    CoreProperties,
    /// Any part this crate does not interpret.
    Other,
}

impl PartKind {
    /// Classify a part from its content type.
    pub fn from_content_type(content_type: &str) -> Self {
        match content_type {
            ct::PML_PRESENTATION_MAIN
            | ct::PML_PRESENTATION_MACRO
            | ct::PML_TEMPLATE_MAIN
            | ct::PML_SLIDESHOW_MAIN => Self::Presentation,
            ct::PML_SLIDE => Self::Slide,
            ct::PML_SLIDE_LAYOUT => Self::SlideLayout,
            ct::PML_SLIDE_MASTER => Self::SlideMaster,
            ct::PML_NOTES_SLIDE => Self::Notes,
            ct::PML_NOTES_MASTER => Self::NotesMaster,
            ct::OFC_THEME => Self::Theme,
            ct::DML_CHART => Self::Chart,
            ct::MS_CHART_STYLE => Self::ChartStyle,
            ct::MS_CHART_COLORS => Self::ChartColors,
            ct::SML_SHEET => Self::EmbeddedDataSource,
            ct::OPC_CORE_PROPERTIES => Self::CoreProperties,
            other
                if other.starts_with("image/")
                    || other.starts_with("audio/")
                    || other.starts_with("video/") =>
            {
                Self::Media
            }
            _ => Self::Other,
        }
    }

    /// Default content type for parts created from scratch.
    pub fn default_content_type(&self) -> Option<&'static str> {
        match self {
            Self::Presentation => Some(ct::PML_PRESENTATION_MAIN),
            Self::Slide => Some(ct::PML_SLIDE),
            Self::SlideLayout => Some(ct::PML_SLIDE_LAYOUT),
            Self::SlideMaster => Some(ct::PML_SLIDE_MASTER),
            Self::Notes => Some(ct::PML_NOTES_SLIDE),
            Self::NotesMaster => Some(ct::PML_NOTES_MASTER),
            Self::Theme => Some(ct::OFC_THEME),
            Self::Chart => Some(ct::DML_CHART),
            Self::ChartStyle => Some(ct::MS_CHART_STYLE),
            Self::ChartColors => Some(ct::MS_CHART_COLORS),
            Self::EmbeddedDataSource => Some(ct::SML_SHEET),
            Self::CoreProperties => Some(ct::OPC_CORE_PROPERTIES),
            Self::PackageRoot | Self::Media | Self::Other => None,
        }
    }

    /// Part name template with a `%d` placeholder, used when allocating new parts.
    pub fn name_template(&self) -> Option<&'static str> {
        match self {
            Self::Slide => Some("/ppt/slides/slide%d.xml"),
            Self::SlideLayout => Some("/ppt/slideLayouts/slideLayout%d.xml"),
            Self::SlideMaster => Some("/ppt/slideMasters/slideMaster%d.xml"),
            Self::Notes => Some("/ppt/notesSlides/notesSlide%d.xml"),
            Self::NotesMaster => Some("/ppt/notesMasters/notesMaster%d.xml"),
            Self::Theme => Some("/ppt/theme/theme%d.xml"),
            Self::Chart => Some("/ppt/charts/chart%d.xml"),
            Self::ChartStyle => Some("/ppt/charts/style%d.xml"),
            Self::ChartColors => Some("/ppt/charts/colors%d.xml"),
            Self::EmbeddedDataSource => Some("/ppt/embeddings/Microsoft_Excel_Worksheet%d.xlsx"),
            _ => None,
        }
    }
}

impl fmt::Display for PartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Lifetime role of a relationship edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// The target lives and dies with the source.
    Owns,
    /// The target may be shared and is reference counted.
    References,
}

/// An absolute part name inside a package, such as `/ppt/slides/slide1.xml`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartName(String);

impl PartName {
    /// Create a part name; it must begin with a forward slash.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if !name.starts_with('/') {
            return Err(Error::CorruptedPackage(format!(
                "part name must begin with slash, got '{}'",
                name
            )));
        }
        Ok(Self(name))
    }

    /// The package pseudo-part name `/`.
    pub fn root() -> Self {
        Self("/".to_string())
    }

    /// Resolve a relationship target against the directory of its source part.
    pub fn resolve(base_uri: &str, target: &str) -> Result<Self> {
        let joined = if target.starts_with('/') {
            target.to_string()
        } else if base_uri.ends_with('/') {
            format!("{}{}", base_uri, target)
        } else {
            format!("{}/{}", base_uri, target)
        };

        let mut segments: Vec<&str> = Vec::new();
        for segment in joined.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    segments.pop();
                }
                other => segments.push(other),
            }
        }
        Self::new(format!("/{}", segments.join("/")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Directory portion, e.g. `/ppt/slides` for `/ppt/slides/slide1.xml`.
    pub fn base_uri(&self) -> &str {
        match self.0.rfind('/') {
            Some(0) | None => "/",
            Some(pos) => &self.0[..pos],
        }
    }

    pub fn filename(&self) -> &str {
        match self.0.rfind('/') {
            Some(pos) => &self.0[pos + 1..],
            None => "",
        }
    }

    /// Extension without the leading period.
    pub fn ext(&self) -> &str {
        let filename = self.filename();
        match filename.rfind('.') {
            Some(pos) => &filename[pos + 1..],
            None => "",
        }
    }

    /// ZIP member name (no leading slash).
    pub fn member_name(&self) -> &str {
        &self.0[1..]
    }

    /// ZIP member name of this part's relationships item.
    pub fn rels_member_name(&self) -> String {
        if self.0 == "/" {
            return "_rels/.rels".to_string();
        }
        let base = self.base_uri().trim_start_matches('/');
        if base.is_empty() {
            format!("_rels/{}.rels", self.filename())
        } else {
            format!("{}/_rels/{}.rels", base, self.filename())
        }
    }

    /// Relative reference from `base_uri` to this part, as written in a `.rels` item.
    pub fn relative_to(&self, base_uri: &str) -> String {
        let base: Vec<&str> = base_uri.split('/').filter(|s| !s.is_empty()).collect();
        let target: Vec<&str> = self.0.split('/').filter(|s| !s.is_empty()).collect();
        let target_dirs = target.len().saturating_sub(1);

        let common = base
            .iter()
            .zip(target.iter().take(target_dirs))
            .take_while(|(a, b)| a == b)
            .count();

        let mut parts: Vec<&str> = vec![".."; base.len() - common];
        parts.extend(&target[common..]);
        parts.join("/")
    }
}

impl fmt::Display for PartName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Relationship id, unique among the edges leaving one part (e.g. `rId3`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RelId(String);

impl RelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn from_number(n: u32) -> Self {
        Self(format!("rId{}", n))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric suffix of an `rIdN` id.
    pub fn number(&self) -> Option<u32> {
        self.0.strip_prefix("rId").and_then(|n| n.parse().ok())
    }
}

impl Ord for RelId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.number(), other.number()) {
            (Some(a), Some(b)) => a.cmp(&b).then_with(|| self.0.cmp(&other.0)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for RelId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for RelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RelId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Identity of one in-memory package instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PackageId(u64);

impl PackageId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, AtomicOrdering::Relaxed))
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "package#{}", self.0)
    }
}
