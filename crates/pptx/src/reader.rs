//! Load a PPTX ZIP package into a [`Package`].

use quick_xml::events::attributes::Attribute;
use quick_xml::events::Event;
use quick_xml::Reader;
use slidekit_core::constants::{content_type as ct, target_mode};
use slidekit_core::{
    EmbeddedWorkbook, Error, Package, Part, PartContent, PartGraph, PartKind, PartName, PartRef,
    RelId, RelTarget, Result, Role, XmlDocument,
};
use std::collections::HashMap;
use std::io::{Read, Seek};
use zip::ZipArchive;

const CONTENT_TYPES_MEMBER: &str = "[Content_Types].xml";

/// Reader for PPTX (Office Open XML) packages.
#[derive(Debug, Default)]
pub struct PackageReader;

impl PackageReader {
    pub fn new() -> Self {
        Self
    }

    /// Read every part and relationship of the package behind `reader`.
    pub fn read<R: Read + Seek>(&self, reader: R) -> Result<Package> {
        let mut archive =
            ZipArchive::new(reader).map_err(|e| Error::ZipError(format!("Failed to open ZIP: {}", e)))?;

        let content_types = ContentTypes::parse(&read_member_string(&mut archive, CONTENT_TYPES_MEMBER)?)?;

        let members: Vec<String> = archive
            .file_names()
            .filter(|name| !name.ends_with('/'))
            .filter(|name| *name != CONTENT_TYPES_MEMBER && !is_rels_member(name))
            .map(str::to_string)
            .collect();

        let mut graph = PartGraph::new();
        let root = graph.add_part(Part::new(
            PartKind::PackageRoot,
            PartName::root(),
            "",
            PartContent::Binary(Vec::new()),
        ));

        let mut by_name: HashMap<String, PartRef> = HashMap::new();
        for member in members {
            let name = PartName::new(format!("/{}", member))?;
            let Some(content_type) = content_types.lookup(&name) else {
                log::warn!("Skipping {}: no content type", name);
                continue;
            };
            let bytes = read_member(&mut archive, &member)?;
            let kind = PartKind::from_content_type(content_type);
            let content = if kind == PartKind::EmbeddedDataSource {
                PartContent::DataSource(EmbeddedWorkbook::new(bytes))
            } else if is_xml_content_type(content_type) {
                let doc = XmlDocument::parse(&bytes)
                    .map_err(|e| Error::XmlError(format!("{}: {}", name, e)))?;
                PartContent::Xml(doc)
            } else {
                PartContent::Binary(bytes)
            };
            log::trace!("Read {} as {}", name, kind);
            let handle = graph.add_part(Part::new(kind, name.clone(), content_type, content));
            by_name.insert(name.as_str().to_ascii_lowercase(), handle);
        }

        // Relationships are read after every part exists so targets resolve.
        let mut sources: Vec<(PartRef, PartName)> = vec![(root, PartName::root())];
        sources.extend(graph.parts().filter(|(h, _)| *h != root).map(|(h, p)| (h, p.name.clone())));

        for (source, name) in sources {
            let rels_member = name.rels_member_name();
            if archive.by_name(&rels_member).is_err() {
                continue;
            }
            let content = read_member_string(&mut archive, &rels_member)?;
            for rel in parse_relationships(&content)? {
                self.link(&mut graph, &by_name, source, &name, rel)?;
            }
        }

        Package::from_graph(graph, root)
    }

    fn link(
        &self,
        graph: &mut PartGraph,
        by_name: &HashMap<String, PartRef>,
        source: PartRef,
        source_name: &PartName,
        rel: RawRelationship,
    ) -> Result<()> {
        let id = RelId::new(rel.id);
        if rel.external {
            return graph.link_with_id(
                source,
                id,
                RelTarget::External(rel.target),
                Role::References,
                &rel.rel_type,
            );
        }

        let target_name = PartName::resolve(source_name.base_uri(), &rel.target)?;
        let Some(&target) = by_name.get(&target_name.as_str().to_ascii_lowercase()) else {
            log::warn!(
                "{} relationship {} targets missing part {}, skipping",
                source_name,
                id,
                target_name
            );
            return Ok(());
        };

        let source_kind = graph.get(source)?.kind;
        let target_kind = graph.get(target)?.kind;
        let mut role = role_for(source_kind, target_kind);
        if role == Role::Owns {
            if let Some((owner, _)) = graph.owner_of(target) {
                log::warn!(
                    "{} is owned by {} and {}; keeping the second edge as a reference",
                    target_name,
                    graph.get(owner)?.name,
                    source_name
                );
                role = Role::References;
            }
        }
        graph.link_with_id(source, id, RelTarget::Part(target), role, &rel.rel_type)
    }
}

/// Lifetime role of an edge, decided by the kinds at both ends.
pub fn role_for(source: PartKind, target: PartKind) -> Role {
    use PartKind::*;
    match (source, target) {
        (PackageRoot, _) => Role::Owns,
        (Presentation, Slide | Other) => Role::Owns,
        (Slide, Notes | Chart) => Role::Owns,
        (Chart, EmbeddedDataSource | ChartStyle | ChartColors) => Role::Owns,
        _ => Role::References,
    }
}

fn is_rels_member(name: &str) -> bool {
    name.ends_with(".rels") && (name.starts_with("_rels/") || name.contains("/_rels/"))
}

fn is_xml_content_type(content_type: &str) -> bool {
    content_type.ends_with("+xml") || content_type == ct::XML || content_type == "text/xml"
}

fn read_member<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> Result<Vec<u8>> {
    let mut file = archive
        .by_name(name)
        .map_err(|e| Error::ZipError(format!("Failed to read {}: {}", name, e)))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    Ok(bytes)
}

fn read_member_string<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> Result<String> {
    let bytes = read_member(archive, name)?;
    String::from_utf8(bytes).map_err(|e| Error::XmlError(format!("{} is not UTF-8: {}", name, e)))
}

pub(crate) fn attr_string(attr: &Attribute) -> String {
    attr.unescape_value()
        .map(|v| v.into_owned())
        .unwrap_or_else(|_| String::from_utf8_lossy(&attr.value).to_string())
}

/// The `[Content_Types].xml` item: defaults by extension, overrides by part name.
#[derive(Debug, Default)]
struct ContentTypes {
    defaults: HashMap<String, String>,
    overrides: HashMap<String, String>,
}

impl ContentTypes {
    fn parse(xml: &str) -> Result<Self> {
        let mut types = Self::default();
        let mut reader = Reader::from_str(xml);
        reader.trim_text(true);

        loop {
            match reader.read_event() {
                Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e)) => {
                    let tag = e.name();
                    let is_default = tag.local_name().as_ref() == b"Default";
                    let is_override = tag.local_name().as_ref() == b"Override";
                    if !is_default && !is_override {
                        continue;
                    }

                    let mut key = String::new();
                    let mut content_type = String::new();
                    for attr in e.attributes().flatten() {
                        match attr.key.as_ref() {
                            b"Extension" | b"PartName" => key = attr_string(&attr),
                            b"ContentType" => content_type = attr_string(&attr),
                            _ => {}
                        }
                    }
                    let key = key.to_ascii_lowercase();
                    if is_default {
                        types.defaults.insert(key, content_type);
                    } else {
                        types.overrides.insert(key, content_type);
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(Error::XmlError(format!(
                        "Error parsing content types: {}",
                        e
                    )))
                }
                _ => {}
            }
        }

        Ok(types)
    }

    fn lookup(&self, name: &PartName) -> Option<&str> {
        self.overrides
            .get(&name.as_str().to_ascii_lowercase())
            .or_else(|| self.defaults.get(&name.ext().to_ascii_lowercase()))
            .map(String::as_str)
    }
}

#[derive(Debug)]
struct RawRelationship {
    id: String,
    rel_type: String,
    target: String,
    external: bool,
}

fn parse_relationships(xml: &str) -> Result<Vec<RawRelationship>> {
    let mut rels = Vec::new();
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    loop {
        match reader.read_event() {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e))
                if e.name().local_name().as_ref() == b"Relationship" =>
            {
                let mut id = String::new();
                let mut rel_type = String::new();
                let mut target = String::new();
                let mut external = false;

                for attr in e.attributes().flatten() {
                    match attr.key.as_ref() {
                        b"Id" => id = attr_string(&attr),
                        b"Type" => rel_type = attr_string(&attr),
                        b"Target" => target = attr_string(&attr),
                        b"TargetMode" => external = attr_string(&attr) == target_mode::EXTERNAL,
                        _ => {}
                    }
                }

                if id.is_empty() || target.is_empty() {
                    return Err(Error::CorruptedPackage(format!(
                        "relationship without Id or Target (Id='{}')",
                        id
                    )));
                }
                rels.push(RawRelationship {
                    id,
                    rel_type,
                    target,
                    external,
                });
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(Error::XmlError(format!("Error parsing relationships: {}", e))),
            _ => {}
        }
    }

    Ok(rels)
}
