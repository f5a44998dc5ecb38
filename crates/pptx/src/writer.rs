//! Serialize a [`Package`] back into a PPTX ZIP container.

use slidekit_core::constants::{content_type as ct, namespace as ns, target_mode};
use slidekit_core::{
    Error, Package, Part, PartContent, PartKind, RelTarget, Result, Settings, XmlDocument,
    XmlElement,
};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Cursor, Seek, Write};
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Writes packages, stamping the modification time from its settings.
#[derive(Debug, Clone, Default)]
pub struct PackageWriter {
    settings: Settings,
}

impl PackageWriter {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    /// Write `package` to a file, replacing it if present.
    pub fn save<P: AsRef<Path>>(&self, package: &Package, path: P) -> Result<()> {
        let file = File::create(path.as_ref())?;
        self.write(package, file)?;
        log::info!("Saved {}", path.as_ref().display());
        Ok(())
    }

    pub fn to_bytes(&self, package: &Package) -> Result<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::new());
        self.write(package, &mut cursor)?;
        Ok(cursor.into_inner())
    }

    pub fn write<W: Write + Seek>(&self, package: &Package, writer: W) -> Result<()> {
        let mut zip = ZipWriter::new(writer);
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
        let graph = package.graph();

        let mut content_types = ContentTypes::new();
        let parts: Vec<&Part> = graph
            .parts()
            .map(|(_, part)| part)
            .filter(|part| part.kind != PartKind::PackageRoot)
            .collect();
        for part in &parts {
            content_types.add(part);
        }
        write_member(&mut zip, "[Content_Types].xml", &content_types.to_xml()?, options)?;

        write_member(
            &mut zip,
            "_rels/.rels",
            &rels_xml(package, graph.get(package.root())?)?,
            options,
        )?;

        let timestamp = self.settings.timestamp();
        for part in parts {
            let bytes = match &part.content {
                PartContent::Xml(doc) if part.kind == PartKind::CoreProperties => {
                    let mut doc = doc.clone();
                    stamp_property(&mut doc.root, "modified", &timestamp);
                    doc.to_bytes()?
                }
                PartContent::Xml(doc) => doc.to_bytes()?,
                PartContent::Binary(bytes) => bytes.clone(),
                PartContent::DataSource(workbook) => workbook.bytes().to_vec(),
            };
            write_member(&mut zip, part.name.member_name(), &bytes, options)?;

            if !part.rels.is_empty() {
                write_member(&mut zip, &part.name.rels_member_name(), &rels_xml(package, part)?, options)?;
            }
        }

        zip.finish()
            .map_err(|e| Error::ZipError(format!("Failed to finish ZIP: {}", e)))?;
        log::debug!("{}: wrote {} parts", package.id(), graph.part_count() - 1);
        Ok(())
    }
}

fn write_member<W: Write + Seek>(
    zip: &mut ZipWriter<W>,
    name: &str,
    bytes: &[u8],
    options: FileOptions,
) -> Result<()> {
    zip.start_file(name, options)
        .map_err(|e| Error::ZipError(format!("Failed to add {}: {}", name, e)))?;
    zip.write_all(bytes)?;
    Ok(())
}

fn rels_xml(package: &Package, part: &Part) -> Result<Vec<u8>> {
    let mut root = XmlElement::new("Relationships").with_attr("xmlns", ns::OPC_RELATIONSHIPS);
    for rel in part.relationships() {
        let mut element = XmlElement::new("Relationship")
            .with_attr("Id", rel.id.as_str())
            .with_attr("Type", rel.rel_type.as_str());
        match &rel.target {
            RelTarget::External(uri) => {
                element.set_attr("Target", uri.as_str());
                element.set_attr("TargetMode", target_mode::EXTERNAL);
            }
            RelTarget::Part(target) => {
                let Some(target) = package.graph().part(*target) else {
                    log::warn!("{}: skipping relationship {} to a removed part", part.name, rel.id);
                    continue;
                };
                element.set_attr("Target", target.name.relative_to(part.name.base_uri()));
            }
        }
        root.push(element);
    }
    XmlDocument::new(root).to_bytes()
}

/// Set a W3CDTF date property such as `modified` or `created` on a core
/// properties root, declaring the namespaces it needs.
pub(crate) fn stamp_property(root: &mut XmlElement, local: &str, timestamp: &str) {
    let dcterms = declared_prefix(root, ns::DCTERMS, "dcterms");
    let xsi = declared_prefix(root, ns::XSI, "xsi");

    let date_type = format!("{}:W3CDTF", dcterms);

    let existing = root
        .elements_mut()
        .find(|e| e.local_name() == local && e.prefix() == Some(dcterms.as_str()));
    match existing {
        Some(element) => {
            element.set_attr(format!("{}:type", xsi), date_type);
            element.set_text(timestamp);
        }
        None => root.push(
            XmlElement::new(format!("{}:{}", dcterms, local))
                .with_attr(format!("{}:type", xsi), date_type)
                .with_text(timestamp),
        ),
    }
}

fn declared_prefix(root: &mut XmlElement, namespace: &str, preferred: &str) -> String {
    let found = root.attributes.iter().find_map(|(key, value)| {
        key.strip_prefix("xmlns:")
            .filter(|_| value == namespace)
            .map(str::to_string)
    });
    match found {
        Some(prefix) => prefix,
        None => {
            root.set_attr(format!("xmlns:{}", preferred), namespace);
            preferred.to_string()
        }
    }
}

/// The `[Content_Types].xml` item being built.
///
/// Common extensions get a `Default`; every other part gets an `Override`.
struct ContentTypes {
    defaults: BTreeMap<String, String>,
    overrides: BTreeMap<String, String>,
}

impl ContentTypes {
    fn new() -> Self {
        let mut defaults = BTreeMap::new();
        defaults.insert("rels".to_string(), ct::OPC_RELATIONSHIPS.to_string());
        defaults.insert("xml".to_string(), ct::XML.to_string());
        Self {
            defaults,
            overrides: BTreeMap::new(),
        }
    }

    fn add(&mut self, part: &Part) {
        let ext = part.name.ext().to_ascii_lowercase();
        if is_default_content_type(&ext, &part.content_type) {
            self.defaults.insert(ext, part.content_type.clone());
        } else {
            self.overrides
                .insert(part.name.as_str().to_string(), part.content_type.clone());
        }
    }

    fn to_xml(&self) -> Result<Vec<u8>> {
        let mut root = XmlElement::new("Types").with_attr("xmlns", ns::OPC_CONTENT_TYPES);
        for (ext, content_type) in &self.defaults {
            root.push(
                XmlElement::new("Default")
                    .with_attr("Extension", ext.as_str())
                    .with_attr("ContentType", content_type.as_str()),
            );
        }
        for (name, content_type) in &self.overrides {
            root.push(
                XmlElement::new("Override")
                    .with_attr("PartName", name.as_str())
                    .with_attr("ContentType", content_type.as_str()),
            );
        }
        XmlDocument::new(root).to_bytes()
    }
}

fn is_default_content_type(ext: &str, content_type: &str) -> bool {
    matches!(
        (ext, content_type),
        ("rels", ct::OPC_RELATIONSHIPS)
            | ("xml", ct::XML)
            | ("bin", "application/vnd.openxmlformats-officedocument.oleObject")
            | ("png", "image/png")
            | ("jpg", "image/jpeg")
            | ("jpeg", "image/jpeg")
            | ("gif", "image/gif")
            | ("emf", "image/x-emf")
            | ("wmf", "image/x-wmf")
            | ("xlsx", ct::SML_SHEET)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use slidekit_core::FixedClock;

    #[test]
    fn test_is_default_content_type() {
        assert!(is_default_content_type("png", "image/png"));
        assert!(is_default_content_type("xlsx", ct::SML_SHEET));
        assert!(!is_default_content_type("xml", ct::PML_SLIDE));
        assert!(!is_default_content_type("png", "image/jpeg"));
    }

    #[test]
    fn test_stamp_adds_missing_property() {
        let mut root = XmlElement::new("cp:coreProperties")
            .with_attr("xmlns:cp", ns::CORE_PROPERTIES)
            .with_attr("xmlns:terms", ns::DCTERMS);
        stamp_property(&mut root, "modified", "2024-01-02T03:04:05Z");

        let modified = root.child("modified").unwrap();
        assert_eq!(modified.name, "terms:modified");
        assert_eq!(modified.text(), "2024-01-02T03:04:05Z");
        // The type QName uses the prefix actually bound to the dcterms namespace.
        assert_eq!(modified.attr("xsi:type"), Some("terms:W3CDTF"));
        assert_eq!(root.attr("xmlns:xsi"), Some(ns::XSI));
    }

    #[test]
    fn test_stamp_replaces_existing_property() {
        let mut root = XmlElement::new("cp:coreProperties")
            .with_attr("xmlns:dcterms", ns::DCTERMS)
            .with_attr("xmlns:xsi", ns::XSI)
            .with_child(
                XmlElement::new("dcterms:modified")
                    .with_attr("xsi:type", "dcterms:W3CDTF")
                    .with_text("2001-01-01T00:00:00Z"),
            );
        stamp_property(&mut root, "modified", "2024-01-02T03:04:05Z");

        let all: Vec<_> = root.children_named("modified").collect();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].text(), "2024-01-02T03:04:05Z");
        assert_eq!(all[0].attr("xsi:type"), Some("dcterms:W3CDTF"));
    }

    #[test]
    fn test_settings_drive_timestamp() {
        let at = Utc.with_ymd_and_hms(2023, 12, 31, 23, 59, 0).unwrap();
        let writer = PackageWriter::new(Settings::with_clock(FixedClock(at)));
        assert_eq!(writer.settings.timestamp(), "2023-12-31T23:59:00Z");
    }
}
