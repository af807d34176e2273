//! Minimal OOXML package access shared by validation, extraction and
//! verification.
//!
//! A `.docx` is a ZIP archive. The parts this crate reads are:
//! - `word/document.xml`: body paragraphs and revision markers
//! - `word/settings.xml`: `w:documentProtection`
//!
//! Elements are matched by local name so documents written with a non-`w`
//! prefix are read the same way.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::io::{Cursor, Read};
use zip::result::ZipError;
use zip::ZipArchive;

pub const DOCUMENT_PART: &str = "word/document.xml";
pub const SETTINGS_PART: &str = "word/settings.xml";

/// Magic bytes of an OLE compound file. Password-encrypted OOXML documents
/// are stored in this container instead of a ZIP.
const OLE_MAGIC: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

/// Revision elements Word leaves behind while tracking changes.
const REVISION_ELEMENTS: [&[u8]; 4] = [b"ins", b"del", b"moveFrom", b"moveTo"];

pub fn is_ole_compound(bytes: &[u8]) -> bool {
    bytes.len() >= OLE_MAGIC.len() && bytes[..OLE_MAGIC.len()] == OLE_MAGIC
}

/// An opened `.docx` archive.
pub struct DocxPackage<'a> {
    archive: ZipArchive<Cursor<&'a [u8]>>,
}

impl<'a> DocxPackage<'a> {
    pub fn open(bytes: &'a [u8]) -> Result<Self, String> {
        let archive = ZipArchive::new(Cursor::new(bytes)).map_err(|e| format!("not a ZIP package: {e}"))?;
        Ok(Self { archive })
    }

    /// Read a part as UTF-8. `Ok(None)` when the part does not exist.
    pub fn part(&mut self, name: &str) -> Result<Option<String>, String> {
        match self.archive.by_name(name) {
            Ok(mut file) => {
                let mut xml = String::new();
                file.read_to_string(&mut xml)
                    .map_err(|e| format!("reading {name}: {e}"))?;
                Ok(Some(xml))
            }
            Err(ZipError::FileNotFound) => Ok(None),
            Err(e) => Err(format!("opening {name}: {e}")),
        }
    }
}

/// Collect the text of every non-empty paragraph, in document order.
///
/// Runs are concatenated; `w:tab` becomes a tab and `w:br`/`w:cr` a newline.
/// Deleted text lives in `w:delText`, not `w:t`, and is skipped. A paragraph
/// nested inside another (text boxes) is emitted before its parent.
pub fn paragraphs(xml: &str) -> Result<Vec<String>, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut open: Vec<String> = Vec::new();
    let mut out = Vec::new();
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"p" => open.push(String::new()),
                b"t" => in_text = true,
                _ => {}
            },
            Event::Empty(e) => {
                if let Some(current) = open.last_mut() {
                    match e.local_name().as_ref() {
                        b"tab" => current.push('\t'),
                        b"br" | b"cr" => current.push('\n'),
                        _ => {}
                    }
                }
            }
            Event::Text(t) if in_text => {
                if let Some(current) = open.last_mut() {
                    current.push_str(&t.unescape()?);
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    if let Some(done) = open.pop() {
                        let trimmed = done.trim();
                        if !trimmed.is_empty() {
                            out.push(trimmed.to_string());
                        }
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(out)
}

/// Count tracked-change elements (`w:ins`, `w:del`, `w:moveFrom`, `w:moveTo`).
pub fn count_revisions(xml: &str) -> Result<usize, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut count = 0;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) => {
                if REVISION_ELEMENTS.contains(&e.local_name().as_ref()) {
                    count += 1;
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(count)
}

/// Whether `settings.xml` enforces document protection.
///
/// Word writes `w:documentProtection` with `w:enforcement="1"` (or `true`/
/// `on`) when editing restrictions are active; the element may also be
/// present with enforcement off, which is not a restriction.
pub fn has_enforced_protection(xml: &str) -> Result<bool, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e)
                if e.local_name().as_ref() == b"documentProtection" =>
            {
                return Ok(enforcement_on(&e));
            }
            Event::Eof => return Ok(false),
            _ => {}
        }
        buf.clear();
    }
}

fn enforcement_on(e: &BytesStart) -> bool {
    e.attributes().flatten().any(|a| {
        a.key.local_name().as_ref() == b"enforcement"
            && matches!(a.value.as_ref(), b"1" | b"true" | b"on")
    })
}
