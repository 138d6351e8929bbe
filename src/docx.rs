//! DOCX package: the zip container, its main document part, and the part's
//! relationships.
//!
//! Only the main document part and its relationship part are parsed. Every
//! other entry (styles, media, headers) is carried through as raw bytes.

use std::fs::File;
use std::io::{Cursor, ErrorKind, Write};
use std::path::{Path, PathBuf};

use zip::ZipArchive;

use crate::archive::{self, Entry};
use crate::error::Error;
use crate::rewriter::HyperlinkRegistry;
use crate::xml::{Element, XmlDocument};

/// Relationship type of an external hyperlink.
pub const HYPERLINK_REL: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink";

/// Relationship type that points a package at its main document part.
const OFFICE_DOCUMENT_REL: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument";

/// Namespace of package relationship parts.
const PACKAGE_REL_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";

/// Namespace bound to the `r:` prefix in document parts.
pub const R_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

/// Main document part used when the package relationships do not name one.
const DEFAULT_DOCUMENT_PART: &str = "word/document.xml";

/// Namespace bound to the `w:` prefix in document parts.
pub const W_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";

/// An opened DOCX package held entirely in memory.
#[derive(Debug, Clone)]
pub struct DocxPackage {
    /// Parsed main document part.
    document: XmlDocument,
    /// Zip entry name of the main document part.
    document_part: String,
    /// All zip entries in archive order, as read.
    entries: Vec<Entry>,
    /// Relationships of the main document part.
    relationships: Relationships,
    /// Zip entry name of the relationship part.
    relationships_part: String,
}

/// The relationship part of the main document.
#[derive(Debug, Clone)]
pub struct Relationships {
    /// Whether anything was added since reading.
    changed: bool,
    /// Parsed `<Relationships>` part.
    doc: XmlDocument,
}

impl DocxPackage {
    /// The `<w:body>` element and the relationship registry, borrowed together
    /// so paragraphs can be rewritten while hyperlink targets are registered.
    pub fn body_and_links(&mut self) -> Option<(&mut Element, &mut Relationships)> {
        let body = self.document.root.elements_mut().find(|e| return e.name == "w:body")?;
        return Some((body, &mut self.relationships));
    }

    /// Read and parse a DOCX file. The file handle is released before returning.
    ///
    /// # Errors
    ///
    /// Returns `Error::FileNotFound` if the path does not exist,
    /// `Error::DocumentRead` if it is not a DOCX package,
    /// or `Error::MalformedXml` if the document part cannot be parsed.
    pub fn open(path: &Path) -> Result<Self, Error> {
        let bytes = match std::fs::read(path) {
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(Error::FileNotFound { path: path.to_path_buf() });
            },
            Err(e) => return Err(Error::Io(e)),
            Ok(bytes) => bytes,
        };
        let package = Self::from_bytes(&bytes).map_err(|e| return with_document_path(e, path))?;
        tracing::debug!(path = %path.display(), part = %package.document_part, "opened document");
        return Ok(package);
    }

    /// Parse a DOCX package from memory.
    ///
    /// # Errors
    ///
    /// Returns `Error::DocumentRead` (with an empty path) if the bytes are not a
    /// DOCX package, or `Error::MalformedXml` if a parsed part is malformed.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let mut zip = ZipArchive::new(Cursor::new(bytes)).map_err(|e| return document_error(e.to_string()))?;
        let entries = archive::read_all(&mut zip)?;

        let document_part = main_document_part(&entries)?;
        let Some(document_entry) = entries.iter().find(|e| return e.name == document_part) else {
            return Err(document_error(format!("missing {document_part}")));
        };
        let mut document = XmlDocument::parse(&document_part, &document_entry.data)?;
        check_document_root(&mut document.root)?;

        let relationships_part = relationships_part_for(&document_part);
        let relationships = match entries.iter().find(|e| return e.name == relationships_part) {
            Some(entry) => Relationships::parse(&relationships_part, &entry.data)?,
            None => Relationships::empty(),
        };

        return Ok(Self { document, document_part, entries, relationships, relationships_part });
    }

    /// Write the package to `path`.
    ///
    /// The whole archive is built in memory first, so a serialization failure
    /// never touches the destination.
    ///
    /// # Errors
    ///
    /// Returns `Error::OutputLocked` if the destination is held open elsewhere,
    /// or `Error::Io`/`Error::Zip` for other failures.
    pub fn save(&self, path: &Path) -> Result<(), Error> {
        let bytes = self.to_bytes()?;
        write_output(path, &bytes)?;
        tracing::debug!(path = %path.display(), bytes = bytes.len(), "saved document");
        return Ok(());
    }

    /// Serialize the package, replacing the document and relationship parts.
    ///
    /// # Errors
    ///
    /// Returns `Error::Zip` or `Error::Io` if the archive cannot be written.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        let document = self.document.to_bytes()?;
        let relationships = self.relationships.to_bytes()?;
        let mut wrote_relationships = false;

        let mut entries = Vec::with_capacity(self.entries.len().saturating_add(1));
        for entry in &self.entries {
            if entry.name == self.document_part {
                entries.push(Entry { data: document.clone(), name: entry.name.clone() });
            } else if entry.name == self.relationships_part {
                wrote_relationships = true;
                entries.push(Entry { data: relationships.clone(), name: entry.name.clone() });
            } else {
                entries.push(entry.clone());
            }
        }
        if !wrote_relationships && self.relationships.changed {
            entries.push(Entry { data: relationships, name: self.relationships_part.clone() });
        }

        return archive::write_all(&entries);
    }
}

impl HyperlinkRegistry for Relationships {
    fn hyperlink_id(&mut self, url: &str) -> String {
        if let Some(existing) = self.find_external_hyperlink(url) {
            return existing;
        }

        let id = self.next_id();
        let relationship = Element::new("Relationship")
            .with_attr("Id", &id)
            .with_attr("Type", HYPERLINK_REL)
            .with_attr("Target", url)
            .with_attr("TargetMode", "External");
        self.doc.root.push(relationship);
        self.changed = true;
        return id;
    }
}

impl Relationships {
    /// A relationship part with no entries.
    fn empty() -> Self {
        let root = Element::new("Relationships").with_attr("xmlns", PACKAGE_REL_NS);
        return Self { changed: false, doc: XmlDocument::with_declaration(root) };
    }

    /// Id of an existing external hyperlink relationship to `url`.
    fn find_external_hyperlink(&self, url: &str) -> Option<String> {
        return self
            .doc
            .root
            .elements()
            .find(|r| {
                return r.attr("Type") == Some(HYPERLINK_REL)
                    && r.attr("TargetMode") == Some("External")
                    && r.attr("Target") == Some(url);
            })
            .and_then(|r| return r.attr("Id"))
            .map(str::to_string);
    }

    /// First unused `rIdN`, counting from 1.
    fn next_id(&self) -> String {
        let used: Vec<&str> = self.doc.root.elements().filter_map(|r| return r.attr("Id")).collect();
        let mut n: usize = 1;
        loop {
            let candidate = format!("rId{n}");
            if !used.contains(&candidate.as_str()) {
                return candidate;
            }
            n = n.saturating_add(1);
        }
    }

    /// Parse an existing relationship part.
    ///
    /// # Errors
    ///
    /// Returns `Error::MalformedXml` if the part cannot be parsed.
    fn parse(part: &str, bytes: &[u8]) -> Result<Self, Error> {
        return Ok(Self { changed: false, doc: XmlDocument::parse(part, bytes)? });
    }

    /// Serialize the part.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the in-memory writer fails.
    fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        return self.doc.to_bytes();
    }
}

/// Require a `w:document` root bound to the main namespace, and make sure the
/// `r:` prefix used by hyperlinks is declared on it.
///
/// # Errors
///
/// Returns `Error::DocumentRead` if the root or its prefix is unexpected.
fn check_document_root(root: &mut Element) -> Result<(), Error> {
    if root.name != "w:document" || root.attr("xmlns:w") != Some(W_NS) {
        return Err(document_error(format!(
            "unexpected root element <{}>; expected <w:document> in the {W_NS} namespace",
            root.name
        )));
    }
    if root.child("w:body").is_none() {
        return Err(document_error("document has no <w:body>".to_string()));
    }
    if root.attr("xmlns:r").is_none() {
        root.set_attr("xmlns:r", R_NS);
    }
    return Ok(());
}

/// Map a lock-style write failure to `Error::OutputLocked`.
///
/// Permission denied covers a file opened exclusively by another program on
/// Windows (and read-only files elsewhere); sharing and lock violations are
/// reported with their raw OS codes.
pub fn classify_write_error(path: &Path, err: std::io::Error) -> Error {
    // ERROR_SHARING_VIOLATION and ERROR_LOCK_VIOLATION.
    let windows_lock = cfg!(windows) && matches!(err.raw_os_error(), Some(32 | 33));
    if err.kind() == ErrorKind::PermissionDenied || windows_lock {
        return Error::OutputLocked { path: path.to_path_buf() };
    }
    return Error::Io(err);
}

/// `Error::DocumentRead` with the path filled in later.
fn document_error(reason: String) -> Error {
    return Error::DocumentRead { path: PathBuf::new(), reason };
}

/// Name of the main document part from `_rels/.rels`, or the default.
///
/// # Errors
///
/// Returns `Error::MalformedXml` if the package relationships are malformed.
fn main_document_part(entries: &[Entry]) -> Result<String, Error> {
    let Some(rels) = entries.iter().find(|e| return e.name == "_rels/.rels") else {
        return Ok(DEFAULT_DOCUMENT_PART.to_string());
    };
    let doc = XmlDocument::parse("_rels/.rels", &rels.data)?;
    let target = doc
        .root
        .elements()
        .find(|r| return r.attr("Type") == Some(OFFICE_DOCUMENT_REL))
        .and_then(|r| return r.attr("Target"));
    return Ok(match target {
        Some(t) => t.trim_start_matches('/').to_string(),
        None => DEFAULT_DOCUMENT_PART.to_string(),
    });
}

/// `word/document.xml` -> `word/_rels/document.xml.rels`.
fn relationships_part_for(part: &str) -> String {
    return match part.rsplit_once('/') {
        Some((dir, file)) => format!("{dir}/_rels/{file}.rels"),
        None => format!("_rels/{part}.rels"),
    };
}

/// Attach the document path to errors raised while parsing its bytes.
fn with_document_path(err: Error, path: &Path) -> Error {
    return match err {
        Error::DocumentRead { reason, .. } => Error::DocumentRead { path: path.to_path_buf(), reason },
        other => other,
    };
}

/// Create or truncate the destination and write the archive.
///
/// # Errors
///
/// Returns `Error::OutputLocked` or `Error::Io`, see [`classify_write_error`].
fn write_output(path: &Path, bytes: &[u8]) -> Result<(), Error> {
    return write_with(path, bytes, |p| return File::create(p));
}

/// [`write_output`] through a caller-supplied opener.
///
/// # Errors
///
/// Returns `Error::OutputLocked` or `Error::Io`, see [`classify_write_error`].
fn write_with<W: Write>(
    path: &Path,
    bytes: &[u8],
    open: impl FnOnce(&Path) -> std::io::Result<W>,
) -> Result<(), Error> {
    let mut file = open(path).map_err(|e| return classify_write_error(path, e))?;
    file.write_all(bytes).map_err(|e| return classify_write_error(path, e))?;
    file.flush()?;
    return Ok(());
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc, reason = "tests")]
pub(crate) mod tests {
    use std::io::Write as _;

    use zip::write::SimpleFileOptions;

    use super::*;

    impl Relationships {
        /// Number of relationships in the part.
        pub(crate) fn len(&self) -> usize {
            return self.doc.root.elements().count();
        }

        /// Target of the relationship with this id.
        pub(crate) fn target(&self, id: &str) -> Option<&str> {
            return self
                .doc
                .root
                .elements()
                .find(|r| return r.attr("Id") == Some(id))
                .and_then(|r| return r.attr("Target"));
        }
    }

    /// Minimal DOCX with the given `<w:body>` inner XML and optional extra
    /// relationships XML.
    pub(crate) fn docx_bytes(body: &str, rels: Option<&str>) -> Vec<u8> {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        zip.start_file("[Content_Types].xml", options).unwrap();
        zip.write_all(br#"<?xml version="1.0" encoding="UTF-8"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#).unwrap();
        zip.start_file("_rels/.rels", options).unwrap();
        zip.write_all(format!(r#"<?xml version="1.0" encoding="UTF-8"?><Relationships xmlns="{PACKAGE_REL_NS}"><Relationship Id="rId1" Type="{OFFICE_DOCUMENT_REL}" Target="word/document.xml"/></Relationships>"#).as_bytes()).unwrap();
        zip.start_file("word/document.xml", options).unwrap();
        zip.write_all(format!(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="{W_NS}"><w:body>{body}</w:body></w:document>"#).as_bytes()).unwrap();
        if let Some(rels) = rels {
            zip.start_file("word/_rels/document.xml.rels", options).unwrap();
            zip.write_all(format!(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="{PACKAGE_REL_NS}">{rels}</Relationships>"#).as_bytes()).unwrap();
        }
        zip.start_file("word/media/image1.png", options).unwrap();
        zip.write_all(&[0x89, 0x50, 0x4e, 0x47]).unwrap();
        return zip.finish().unwrap().into_inner();
    }

    #[test]
    fn opens_package_and_declares_r_prefix() {
        let mut pkg = DocxPackage::from_bytes(&docx_bytes("<w:p/>", None)).unwrap();
        assert_eq!(pkg.document_part, "word/document.xml");
        assert_eq!(pkg.relationships_part, "word/_rels/document.xml.rels");
        assert_eq!(pkg.document.root.attr("xmlns:r"), Some(R_NS));
        assert!(pkg.body_and_links().is_some());
    }

    #[test]
    fn hyperlink_ids_skip_used_and_reuse_same_target() {
        let rels = r#"<Relationship Id="rId1" Type="x/styles" Target="styles.xml"/><Relationship Id="rId3" Type="x/theme" Target="theme.xml"/>"#;
        let mut pkg = DocxPackage::from_bytes(&docx_bytes("", Some(rels))).unwrap();
        let (_, links) = pkg.body_and_links().unwrap();

        let first = links.hyperlink_id("http://a");
        let second = links.hyperlink_id("http://b");
        let again = links.hyperlink_id("http://a");

        assert_eq!(first, "rId2");
        assert_eq!(second, "rId4");
        assert_eq!(again, "rId2");
        assert_eq!(links.len(), 4);
        assert_eq!(links.target("rId4"), Some("http://b"));
    }

    #[test]
    fn relationships_part_created_when_absent() {
        let mut pkg = DocxPackage::from_bytes(&docx_bytes("", None)).unwrap();
        let (_, links) = pkg.body_and_links().unwrap();
        links.hyperlink_id("http://example.com/?a=1&b=2");

        let reread = DocxPackage::from_bytes(&pkg.to_bytes().unwrap()).unwrap();
        assert_eq!(reread.relationships.target("rId1"), Some("http://example.com/?a=1&b=2"));
        assert!(reread.entries.iter().any(|e| return e.name == "word/media/image1.png"));
    }

    #[test]
    fn untouched_package_keeps_every_entry() {
        let bytes = docx_bytes("<w:p><w:r><w:t>x</w:t></w:r></w:p>", None);
        let pkg = DocxPackage::from_bytes(&bytes).unwrap();
        let reread = DocxPackage::from_bytes(&pkg.to_bytes().unwrap()).unwrap();
        let names: Vec<&str> = reread.entries.iter().map(|e| return e.name.as_str()).collect();
        assert_eq!(names, vec!["[Content_Types].xml", "_rels/.rels", "word/document.xml", "word/media/image1.png"]);
        assert_eq!(reread.document.root, pkg.document.root);
    }

    #[test]
    fn non_zip_input_is_a_document_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.docx");
        std::fs::write(&path, b"hello").unwrap();
        match DocxPackage::open(&path) {
            Err(Error::DocumentRead { path: reported, .. }) => assert_eq!(reported, path),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn missing_input_is_file_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let result = DocxPackage::open(&dir.path().join("absent.docx"));
        assert!(matches!(result, Err(Error::FileNotFound { .. })));
    }

    #[test]
    fn foreign_root_is_rejected() {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        zip.start_file("word/document.xml", SimpleFileOptions::default()).unwrap();
        zip.write_all(b"<doc/>").unwrap();
        let bytes = zip.finish().unwrap().into_inner();
        assert!(matches!(DocxPackage::from_bytes(&bytes), Err(Error::DocumentRead { .. })));
    }

    #[test]
    fn permission_denied_is_output_locked() {
        let path = Path::new("out.docx");
        let err = classify_write_error(path, std::io::Error::from(ErrorKind::PermissionDenied));
        assert!(matches!(err, Error::OutputLocked { .. }));

        let other = classify_write_error(path, std::io::Error::from(ErrorKind::NotFound));
        assert!(matches!(other, Error::Io(_)));
    }

    /// Destination that refuses every write with the given error kind.
    struct Refusing(ErrorKind);

    impl std::io::Write for Refusing {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            return Err(std::io::Error::from(self.0));
        }

        fn flush(&mut self) -> std::io::Result<()> {
            return Ok(());
        }
    }

    #[test]
    fn locked_destination_on_open_is_output_locked() {
        let path = Path::new("held.docx");
        let result = write_with(path, b"PK", |_| return Err::<Vec<u8>, _>(std::io::Error::from(ErrorKind::PermissionDenied)));
        match result {
            Err(Error::OutputLocked { path: locked }) => assert_eq!(locked, path),
            other => panic!("expected OutputLocked, got {other:?}"),
        }
    }

    #[test]
    fn locked_destination_on_write_is_output_locked() {
        let result = write_with(Path::new("held.docx"), b"PK", |_| return Ok(Refusing(ErrorKind::PermissionDenied)));
        assert!(matches!(result, Err(Error::OutputLocked { .. })));

        let other = write_with(Path::new("held.docx"), b"PK", |_| return Ok(Refusing(ErrorKind::WriteZero)));
        assert!(matches!(other, Err(Error::Io(_))));
    }

    #[test]
    fn write_with_passes_the_bytes_through() {
        let mut sink = Vec::new();
        write_with(Path::new("out.docx"), b"PK\x03\x04", |_| return Ok(&mut sink)).unwrap();
        assert_eq!(sink, b"PK\x03\x04");
    }

    #[test]
    fn read_only_destination_is_reported_as_locked() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("open-elsewhere.docx");
        std::fs::write(&dest, b"old").unwrap();
        let mut perms = std::fs::metadata(&dest).unwrap().permissions();
        perms.set_readonly(true);
        std::fs::set_permissions(&dest, perms).unwrap();

        // Privileged users can write read-only files; the write_with tests cover them.
        if std::fs::OpenOptions::new().write(true).open(&dest).is_ok() {
            return;
        }

        let pkg = DocxPackage::from_bytes(&docx_bytes("", None)).unwrap();
        assert!(matches!(pkg.save(&dest), Err(Error::OutputLocked { .. })));
        assert_eq!(std::fs::read(&dest).unwrap(), b"old");
    }
}
