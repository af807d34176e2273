//! IEEE two-column rendering: [`StructuredPaper`] to `.docx` bytes.
//!
//! ## Layout
//!
//! The document has two sections. The first is single-column and holds the
//! title block (title, authors); a continuous section break then switches
//! to two columns for the abstract, index terms, body and references.
//!
//! | Element    | Size  | Style                                   |
//! |------------|-------|-----------------------------------------|
//! | Title      | 24 pt | centered, upper case                    |
//! | Authors    | 11 pt | centered                                |
//! | Abstract   | 9 pt  | bold, `Abstract—` run-in head           |
//! | Heading 1  | 10 pt | centered small caps, `I.`, `II.`, …     |
//! | Heading 2+ | 10 pt | italic, `A.`, `B.`, …                   |
//! | Body       | 10 pt | justified, first-line indent            |
//! | References | 8 pt  | `[n]` numbering, hanging indent         |
//!
//! Output is deterministic: identical papers produce identical bytes (ZIP
//! entry timestamps are fixed).
//!
//! ## Why spawn_blocking?
//!
//! Deflate compression of a long paper is CPU-bound; it runs on the blocking
//! pool like extraction does.

use crate::error::RenderError;
use crate::paper::StructuredPaper;
use async_trait::async_trait;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::fmt::Display;
use std::io::{Cursor, Write};
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

pub const PLACEHOLDER_TITLE: &str = "Untitled Paper";
pub const PLACEHOLDER_AUTHORS: &str = "Authors TBD";
pub const PLACEHOLDER_ABSTRACT: &str = "No abstract provided.";
pub const PLACEHOLDER_KEYWORDS: &str = "Keywords not specified";

const NS_W: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/><Override PartName="/docProps/core.xml" ContentType="application/vnd.openxmlformats-package.core-properties+xml"/></Types>"#;

const PACKAGE_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties" Target="docProps/core.xml"/></Relationships>"#;

/// Turns a structured paper into output document bytes.
#[async_trait]
pub trait DocumentRenderer: Send + Sync {
    async fn render(&self, paper: &StructuredPaper) -> Result<Vec<u8>, RenderError>;
}

/// Page geometry and typeface. Lengths are in twips (1/1440 inch).
#[derive(Debug, Clone, PartialEq)]
pub struct IeeeLayout {
    pub page_width: u32,
    pub page_height: u32,
    pub margin: u32,
    pub column_gap: u32,
    pub font: String,
}

impl Default for IeeeLayout {
    /// A4 with 19.1 mm margins and a 6.35 mm column gap, Times New Roman.
    fn default() -> Self {
        Self {
            page_width: mm_to_twips(210.0),
            page_height: mm_to_twips(297.0),
            margin: mm_to_twips(19.1),
            column_gap: mm_to_twips(6.35),
            font: "Times New Roman".to_string(),
        }
    }
}

pub fn mm_to_twips(mm: f64) -> u32 {
    (mm / 25.4 * 1440.0).round() as u32
}

/// Renders papers in the IEEE conference layout.
#[derive(Debug, Clone, Default)]
pub struct IeeeDocxRenderer {
    layout: IeeeLayout,
}

impl IeeeDocxRenderer {
    pub fn new(layout: IeeeLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &IeeeLayout {
        &self.layout
    }
}

#[async_trait]
impl DocumentRenderer for IeeeDocxRenderer {
    async fn render(&self, paper: &StructuredPaper) -> Result<Vec<u8>, RenderError> {
        let paper = paper.clone();
        let layout = self.layout.clone();
        tokio::task::spawn_blocking(move || render_docx(&paper, &layout))
            .await
            .map_err(|e| RenderError::Package(format!("render task failed: {e}")))?
    }
}

/// Blocking implementation of rendering.
pub fn render_docx(paper: &StructuredPaper, layout: &IeeeLayout) -> Result<Vec<u8>, RenderError> {
    let document = document_xml(paper, layout)?;
    let core = core_xml(paper)?;

    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(zip::DateTime::default());

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, body) in [
        ("[Content_Types].xml", CONTENT_TYPES.as_bytes()),
        ("_rels/.rels", PACKAGE_RELS.as_bytes()),
        ("docProps/core.xml", core.as_slice()),
        ("word/document.xml", document.as_slice()),
    ] {
        zip.start_file(name, options).map_err(package_err)?;
        zip.write_all(body).map_err(package_err)?;
    }
    let bytes = zip.finish().map_err(package_err)?.into_inner();

    debug!(
        "Rendered {} section(s), {} reference(s) → {} bytes",
        paper.sections.len(),
        paper.references.len(),
        bytes.len()
    );
    Ok(bytes)
}

fn package_err(e: impl Display) -> RenderError {
    RenderError::Package(e.to_string())
}

fn markup_err(e: impl Display) -> RenderError {
    RenderError::Markup(e.to_string())
}

/// Upper-case Roman numeral for `n` (1-based). Zero renders as empty.
pub fn to_roman(mut n: usize) -> String {
    const TABLE: [(usize, &str); 13] = [
        (1000, "M"),
        (900, "CM"),
        (500, "D"),
        (400, "CD"),
        (100, "C"),
        (90, "XC"),
        (50, "L"),
        (40, "XL"),
        (10, "X"),
        (9, "IX"),
        (5, "V"),
        (4, "IV"),
        (1, "I"),
    ];
    let mut out = String::new();
    for (value, numeral) in TABLE {
        while n >= value {
            out.push_str(numeral);
            n -= value;
        }
    }
    out
}

/// Subsection label: `A`…`Z`, then `AA`, `AB`, … like spreadsheet columns.
fn letter_label(n: usize) -> String {
    let mut n = n.max(1);
    let mut label = Vec::new();
    while n > 0 {
        n -= 1;
        label.push((b'A' + (n % 26) as u8) as char);
        n /= 26;
    }
    label.iter().rev().collect()
}

/// Reference line as printed: `[n] text`, unless the text is already numbered.
pub fn reference_line(index: usize, text: &str) -> String {
    let text = text.trim();
    if text.starts_with('[') {
        text.to_string()
    } else {
        format!("[{index}] {text}")
    }
}

/// Strip characters XML 1.0 cannot carry. Carriage returns become newlines.
pub(crate) fn xml_safe(text: &str) -> String {
    text.chars()
        .filter_map(|c| match c {
            '\r' => Some('\n'),
            '\t' | '\n' => Some(c),
            c if c < ' ' => None,
            '\u{FFFE}' | '\u{FFFF}' => None,
            c => Some(c),
        })
        .collect()
}

fn non_blank(text: &str) -> Option<&str> {
    let t = text.trim();
    (!t.is_empty()).then_some(t)
}

// ── Markup writer ────────────────────────────────────────────────────────

struct Markup {
    writer: Writer<Cursor<Vec<u8>>>,
}

impl Markup {
    fn new() -> Result<Self, RenderError> {
        let mut writer = Writer::new(Cursor::new(Vec::new()));
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))
            .map_err(markup_err)?;
        Ok(Self { writer })
    }

    fn start(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<(), RenderError> {
        let el = BytesStart::new(name).with_attributes(attrs.iter().copied());
        self.writer.write_event(Event::Start(el)).map_err(markup_err)
    }

    fn empty(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<(), RenderError> {
        let el = BytesStart::new(name).with_attributes(attrs.iter().copied());
        self.writer.write_event(Event::Empty(el)).map_err(markup_err)
    }

    fn end(&mut self, name: &str) -> Result<(), RenderError> {
        self.writer
            .write_event(Event::End(BytesEnd::new(name)))
            .map_err(markup_err)
    }

    fn text(&mut self, text: &str) -> Result<(), RenderError> {
        self.writer
            .write_event(Event::Text(BytesText::new(text)))
            .map_err(markup_err)
    }

    fn element(&mut self, name: &str, text: &str) -> Result<(), RenderError> {
        self.start(name, &[])?;
        self.text(text)?;
        self.end(name)
    }

    fn finish(self) -> Vec<u8> {
        self.writer.into_inner().into_inner()
    }
}

// ── Paragraph model ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Justify {
    #[default]
    Left,
    Center,
    Both,
}

impl Justify {
    fn val(self) -> &'static str {
        match self {
            Justify::Left => "left",
            Justify::Center => "center",
            Justify::Both => "both",
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct ParaStyle {
    justify: Justify,
    before: u32,
    after: u32,
    first_line: u32,
    hanging: u32,
}

/// Run formatting. `size` is in half-points.
#[derive(Debug, Clone, Copy, Default)]
struct RunStyle {
    size: u32,
    bold: bool,
    italic: bool,
    small_caps: bool,
}

impl RunStyle {
    fn sized(size: u32) -> Self {
        Self {
            size,
            ..Default::default()
        }
    }

    fn bold(mut self) -> Self {
        self.bold = true;
        self
    }

    fn italic(mut self) -> Self {
        self.italic = true;
        self
    }

    fn small_caps(mut self) -> Self {
        self.small_caps = true;
        self
    }
}

struct DocumentWriter<'a> {
    m: Markup,
    layout: &'a IeeeLayout,
}

impl DocumentWriter<'_> {
    fn paragraph(&mut self, para: ParaStyle, runs: &[(RunStyle, &str)]) -> Result<(), RenderError> {
        self.m.start("w:p", &[])?;
        self.paragraph_props(para, None)?;
        for (style, text) in runs {
            self.run(*style, text)?;
        }
        self.m.end("w:p")
    }

    fn paragraph_props(&mut self, para: ParaStyle, columns: Option<u32>) -> Result<(), RenderError> {
        self.m.start("w:pPr", &[])?;
        let (before, after) = (para.before.to_string(), para.after.to_string());
        self.m
            .empty("w:spacing", &[("w:before", before.as_str()), ("w:after", after.as_str())])?;
        if para.first_line > 0 {
            let first = para.first_line.to_string();
            self.m.empty("w:ind", &[("w:firstLine", first.as_str())])?;
        } else if para.hanging > 0 {
            let hanging = para.hanging.to_string();
            self.m
                .empty("w:ind", &[("w:left", hanging.as_str()), ("w:hanging", hanging.as_str())])?;
        }
        self.m.empty("w:jc", &[("w:val", para.justify.val())])?;
        if let Some(n) = columns {
            self.section_props(n, false)?;
        }
        self.m.end("w:pPr")
    }

    fn run(&mut self, style: RunStyle, text: &str) -> Result<(), RenderError> {
        let font = self.layout.font.as_str();
        let size = style.size.to_string();
        self.m.start("w:r", &[])?;
        self.m.start("w:rPr", &[])?;
        self.m.empty(
            "w:rFonts",
            &[("w:ascii", font), ("w:hAnsi", font), ("w:cs", font)],
        )?;
        if style.bold {
            self.m.empty("w:b", &[])?;
        }
        if style.italic {
            self.m.empty("w:i", &[])?;
        }
        if style.small_caps {
            self.m.empty("w:smallCaps", &[])?;
        }
        self.m.empty("w:sz", &[("w:val", size.as_str())])?;
        self.m.empty("w:szCs", &[("w:val", size.as_str())])?;
        self.m.end("w:rPr")?;
        for (i, line) in xml_safe(text).split('\n').enumerate() {
            if i > 0 {
                self.m.empty("w:br", &[])?;
            }
            self.m.start("w:t", &[("xml:space", "preserve")])?;
            self.m.text(line)?;
            self.m.end("w:t")?;
        }
        self.m.end("w:r")
    }

    fn section_props(&mut self, columns: u32, continuous: bool) -> Result<(), RenderError> {
        let l = self.layout;
        let (w, h, margin, gap, num) = (
            l.page_width.to_string(),
            l.page_height.to_string(),
            l.margin.to_string(),
            l.column_gap.to_string(),
            columns.to_string(),
        );
        self.m.start("w:sectPr", &[])?;
        if continuous {
            self.m.empty("w:type", &[("w:val", "continuous")])?;
        }
        self.m.empty("w:pgSz", &[("w:w", w.as_str()), ("w:h", h.as_str())])?;
        self.m.empty(
            "w:pgMar",
            &[
                ("w:top", margin.as_str()),
                ("w:right", margin.as_str()),
                ("w:bottom", margin.as_str()),
                ("w:left", margin.as_str()),
                ("w:header", "720"),
                ("w:footer", "720"),
                ("w:gutter", "0"),
            ],
        )?;
        self.m.empty("w:cols", &[("w:num", num.as_str()), ("w:space", gap.as_str())])?;
        self.m.end("w:sectPr")
    }
}

fn document_xml(paper: &StructuredPaper, layout: &IeeeLayout) -> Result<Vec<u8>, RenderError> {
    let mut d = DocumentWriter {
        m: Markup::new()?,
        layout,
    };
    d.m.start("w:document", &[("xmlns:w", NS_W)])?;
    d.m.start("w:body", &[])?;

    let centered = |before, after| ParaStyle {
        justify: Justify::Center,
        before,
        after,
        ..Default::default()
    };
    let justified = ParaStyle {
        justify: Justify::Both,
        after: 80,
        ..Default::default()
    };

    // Title block, single column.
    let title = non_blank(&paper.title).unwrap_or(PLACEHOLDER_TITLE).to_uppercase();
    d.paragraph(centered(240, 120), &[(RunStyle::sized(48), &title)])?;

    let authors: Vec<&str> = paper.authors.iter().filter_map(|a| non_blank(a)).collect();
    let authors = if authors.is_empty() {
        PLACEHOLDER_AUTHORS.to_string()
    } else {
        authors.join(", ")
    };
    d.paragraph(centered(0, 240), &[(RunStyle::sized(22), &authors)])?;

    // Empty paragraph closing the single-column section.
    d.m.start("w:p", &[])?;
    d.paragraph_props(ParaStyle::default(), Some(1))?;
    d.m.end("w:p")?;

    // Two-column body.
    let abstract_text = non_blank(&paper.abstract_text).unwrap_or(PLACEHOLDER_ABSTRACT);
    d.paragraph(
        justified,
        &[
            (RunStyle::sized(18).bold().italic(), "Abstract—"),
            (RunStyle::sized(18).bold(), abstract_text),
        ],
    )?;

    let keywords: Vec<&str> = paper.keywords.iter().filter_map(|k| non_blank(k)).collect();
    let keywords = if keywords.is_empty() {
        PLACEHOLDER_KEYWORDS.to_string()
    } else {
        keywords.join(", ")
    };
    d.paragraph(
        ParaStyle { after: 200, ..justified },
        &[
            (RunStyle::sized(18).bold().italic(), "Index Terms—"),
            (RunStyle::sized(18).bold(), &keywords),
        ],
    )?;

    let body = ParaStyle {
        first_line: 202,
        ..justified
    };
    let (mut major, mut minor) = (0usize, 0usize);
    for section in &paper.sections {
        if section.level <= 1 {
            major += 1;
            minor = 0;
            let heading = format!("{}. {}", to_roman(major), section.heading.trim().to_uppercase());
            d.paragraph(centered(240, 120), &[(RunStyle::sized(20).small_caps(), &heading)])?;
        } else {
            minor += 1;
            let heading = format!("{}. {}", letter_label(minor), section.heading.trim());
            d.paragraph(
                ParaStyle {
                    before: 120,
                    after: 60,
                    ..Default::default()
                },
                &[(RunStyle::sized(20).italic(), &heading)],
            )?;
        }
        for block in section.content.split("\n\n").filter_map(non_blank) {
            d.paragraph(body, &[(RunStyle::sized(20), block)])?;
        }
    }

    if !paper.references.is_empty() {
        d.paragraph(centered(240, 120), &[(RunStyle::sized(16).small_caps(), "REFERENCES")])?;
        let entry = ParaStyle {
            justify: Justify::Both,
            after: 40,
            hanging: 360,
            ..Default::default()
        };
        for (i, reference) in paper.references.iter().enumerate() {
            let line = reference_line(i + 1, reference);
            d.paragraph(entry, &[(RunStyle::sized(16), &line)])?;
        }
    }

    d.section_props(2, true)?;
    d.m.end("w:body")?;
    d.m.end("w:document")?;
    Ok(d.m.finish())
}

fn core_xml(paper: &StructuredPaper) -> Result<Vec<u8>, RenderError> {
    let mut m = Markup::new()?;
    m.start(
        "cp:coreProperties",
        &[
            (
                "xmlns:cp",
                "http://schemas.openxmlformats.org/package/2006/metadata/core-properties",
            ),
            ("xmlns:dc", "http://purl.org/dc/elements/1.1/"),
        ],
    )?;
    let title = xml_safe(non_blank(&paper.title).unwrap_or(PLACEHOLDER_TITLE));
    m.element("dc:title", &title)?;
    if !paper.authors.is_empty() {
        m.element("dc:creator", &xml_safe(&paper.authors.join("; ")))?;
    }
    if !paper.keywords.is_empty() {
        m.element("cp:keywords", &xml_safe(&paper.keywords.join(", ")))?;
    }
    m.end("cp:coreProperties")?;
    Ok(m.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paper::Section;
    use crate::pipeline::docx::{self, DocxPackage};

    fn sample() -> StructuredPaper {
        StructuredPaper {
            title: "Deep Nets".into(),
            authors: vec!["A. One".into(), "B. Two".into()],
            abstract_text: "We study nets.".into(),
            keywords: vec!["nets".into(), "depth".into()],
            sections: vec![
                Section::new("Introduction", 1, "First block.\n\nSecond block."),
                Section::new("Setup", 2, "Details & <more>."),
                Section::new("Results", 1, "Good."),
            ],
            references: vec!["Smith 2020".into(), "[7] Lee 2021".into()],
        }
    }

    fn rendered_paragraphs(paper: &StructuredPaper) -> Vec<String> {
        let bytes = render_docx(paper, &IeeeLayout::default()).unwrap();
        let mut pkg = DocxPackage::open(&bytes).unwrap();
        let xml = pkg.part(docx::DOCUMENT_PART).unwrap().unwrap();
        docx::paragraphs(&xml).unwrap()
    }

    #[test]
    fn letter_labels_do_not_repeat_past_z() {
        assert_eq!(letter_label(1), "A");
        assert_eq!(letter_label(26), "Z");
        assert_eq!(letter_label(27), "AA");
        assert_eq!(letter_label(28), "AB");
        assert_eq!(letter_label(52), "AZ");
        assert_eq!(letter_label(53), "BA");
        assert_eq!(letter_label(702), "ZZ");
        assert_eq!(letter_label(703), "AAA");
    }

    #[test]
    fn roman_numerals() {
        assert_eq!(to_roman(1), "I");
        assert_eq!(to_roman(4), "IV");
        assert_eq!(to_roman(9), "IX");
        assert_eq!(to_roman(14), "XIV");
        assert_eq!(to_roman(40), "XL");
        assert_eq!(to_roman(1994), "MCMXCIV");
        assert_eq!(to_roman(0), "");
    }

    #[test]
    fn a4_geometry() {
        let layout = IeeeLayout::default();
        assert_eq!(layout.page_width, 11906);
        assert_eq!(layout.page_height, 16838);
        assert_eq!(layout.margin, 1083);
        assert_eq!(layout.column_gap, 360);
    }

    #[test]
    fn reference_numbering_respects_existing_brackets() {
        assert_eq!(reference_line(1, "Smith 2020"), "[1] Smith 2020");
        assert_eq!(reference_line(2, " [7] Lee "), "[7] Lee");
    }

    #[test]
    fn xml_safe_drops_control_characters() {
        assert_eq!(xml_safe("a\u{0}b\u{7}c\td\r\ne"), "abc\td\n\ne");
    }

    #[test]
    fn rendered_text_follows_ieee_order() {
        let ps = rendered_paragraphs(&sample());
        assert_eq!(
            ps,
            vec![
                "DEEP NETS",
                "A. One, B. Two",
                "Abstract—We study nets.",
                "Index Terms—nets, depth",
                "I. INTRODUCTION",
                "First block.",
                "Second block.",
                "A. Setup",
                "Details & <more>.",
                "II. RESULTS",
                "Good.",
                "REFERENCES",
                "[1] Smith 2020",
                "[7] Lee 2021",
            ]
        );
    }

    #[test]
    fn placeholders_fill_empty_fields() {
        let ps = rendered_paragraphs(&StructuredPaper::default());
        assert_eq!(
            ps,
            vec![
                "UNTITLED PAPER",
                "Authors TBD",
                "Abstract—No abstract provided.",
                "Index Terms—Keywords not specified",
            ]
        );
    }

    #[test]
    fn output_is_deterministic() {
        let layout = IeeeLayout::default();
        let a = render_docx(&sample(), &layout).unwrap();
        let b = render_docx(&sample(), &layout).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn body_switches_to_two_columns() {
        let bytes = render_docx(&sample(), &IeeeLayout::default()).unwrap();
        let mut pkg = DocxPackage::open(&bytes).unwrap();
        let xml = pkg.part(docx::DOCUMENT_PART).unwrap().unwrap();
        assert!(xml.contains(r#"<w:cols w:num="1""#));
        assert!(xml.contains(r#"<w:type w:val="continuous"/>"#));
        assert!(xml.contains(r#"<w:cols w:num="2" w:space="360"/>"#));
        assert!(pkg.part("[Content_Types].xml").unwrap().is_some());
        let core = pkg.part("docProps/core.xml").unwrap().unwrap();
        assert!(core.contains("<dc:title>Deep Nets</dc:title>"));
    }

    #[tokio::test]
    async fn async_render_matches_blocking() {
        let renderer = IeeeDocxRenderer::default();
        let bytes = renderer.render(&sample()).await.unwrap();
        assert_eq!(bytes, render_docx(&sample(), renderer.layout()).unwrap());
    }
}
