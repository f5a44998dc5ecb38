//! PPTX backend: reads a ZIP package into a part graph, writes it back, and
//! evaluates embedded workbooks for chart formulas.

pub mod presentation;
pub mod reader;
pub mod template;
pub mod writer;
pub mod xlsx;

pub use presentation::Presentation;
pub use reader::PackageReader;
pub use writer::PackageWriter;
pub use xlsx::XlsxReader;
