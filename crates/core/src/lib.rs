//! Core model for editing presentation packages: the part graph, identifier
//! allocation, chart value resolution, slide copying and structural validation.

pub mod chart;
pub mod constants;
pub mod copy;
pub mod error;
pub mod graph;
pub mod ids;
pub mod package;
pub mod settings;
pub mod slides;
pub mod types;
pub mod validate;
pub mod value;
pub mod workbook;
pub mod xml;

pub use copy::{Closure, CopyEngine, CopyPlan, Decision};
pub use error::{Error, Result};
pub use graph::{Part, PartContent, PartGraph, PartRef, RelTarget, Relationship};
pub use ids::IdAllocator;
pub use package::{Package, PackageSummary, Section, SeriesSummary, SlideRef, SlideSummary};
pub use settings::{Clock, FixedClock, Settings, SystemClock};
pub use slides::{SlideCollection, SlideSource};
pub use types::{PackageId, PartKind, PartName, RelId, Role};
pub use validate::{ValidationIssue, Validator};
pub use value::{NameState, Value, ValueResolver, ValueTarget};
pub use workbook::{DataSourceReader, EmbeddedWorkbook, Workbook, Worksheet};
pub use xml::{XmlDocument, XmlElement, XmlNode};
