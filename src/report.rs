//! Clinical report compiler.
//!
//! `compile` is pure: it filters a frozen message snapshot and lays it out
//! into pages of positioned lines. `render_pdf` turns that layout into
//! PDF bytes; nothing about the layout is decided there.

use std::io::BufWriter;

use chrono::{DateTime, Utc};
use printpdf::*;
use serde::Serialize;

use crate::config::DEFAULT_EMERGENCY_MARKER;
use crate::models::enums::MessageRole;
use crate::models::Message;

/// Wrap width for body text, in characters.
pub const WRAP_CHARS: usize = 90;
/// Cursor of the first block on page one, below the header band.
pub const FIRST_PAGE_TOP_MM: u32 = 70;
/// Cursor of the first block on continuation pages.
pub const PAGE_TOP_MM: u32 = 20;
/// A block starting below this cursor moves to a new page.
pub const PAGE_BREAK_MM: u32 = 270;
pub const LINE_ADVANCE_MM: u32 = 6;
pub const BLOCK_GAP_MM: u32 = 12;

const MIN_MESSAGE_CHARS: usize = 3;
const CHIT_CHAT: &[&str] = &[
    "thank you",
    "thanks",
    "you are welcome",
    "you're welcome",
    "hello",
    "goodbye",
];
const META_TAGS: &[&str] = &["request sent", "doctor's note", "[["];

pub const DISCLAIMER: &str = "Disclaimer: This report is AI-generated and does not constitute a formal medical diagnosis. Please consult a doctor.";

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("PDF generation failed: {0}")]
    Pdf(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LineKind {
    Label,
    Body,
}

/// One line of text at a vertical offset from the page top.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlacedLine {
    pub y_mm: u32,
    pub kind: LineKind,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Page {
    pub lines: Vec<PlacedLine>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedDocument {
    pub pages: Vec<Page>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileResult {
    Rendered(RenderedDocument),
    /// Nothing survived filtering.
    Empty,
}

/// Header fields printed on the first page.
#[derive(Debug, Clone)]
pub struct ReportHeader {
    pub patient_reference: String,
    pub generated_at: DateTime<Utc>,
}

pub fn compile(messages: &[Message]) -> CompileResult {
    compile_with_marker(messages, DEFAULT_EMERGENCY_MARKER)
}

/// Compile with a non-default emergency marker treated as a meta-tag.
pub fn compile_with_marker(messages: &[Message], marker: &str) -> CompileResult {
    let kept: Vec<&Message> = messages
        .iter()
        .filter(|m| is_reportable(&m.text, marker))
        .collect();
    if kept.is_empty() {
        return CompileResult::Empty;
    }

    let mut pages = Vec::new();
    let mut page = Page::default();
    let mut y = FIRST_PAGE_TOP_MM;
    for message in kept {
        if y > PAGE_BREAK_MM {
            pages.push(std::mem::take(&mut page));
            y = PAGE_TOP_MM;
        }
        page.lines.push(PlacedLine {
            y_mm: y,
            kind: LineKind::Label,
            text: role_label(message.role).to_string(),
        });
        for line in wrap_text(&clean_text(&message.text), WRAP_CHARS) {
            y += LINE_ADVANCE_MM;
            // Long blocks continue on the next page.
            if y > PAGE_BREAK_MM + LINE_ADVANCE_MM {
                pages.push(std::mem::take(&mut page));
                y = PAGE_TOP_MM;
            }
            page.lines.push(PlacedLine {
                y_mm: y,
                kind: LineKind::Body,
                text: line,
            });
        }
        y += BLOCK_GAP_MM;
    }
    pages.push(page);
    CompileResult::Rendered(RenderedDocument { pages })
}

impl RenderedDocument {
    /// Byte-stable plain-text rendering.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for (n, page) in self.pages.iter().enumerate() {
            out.push_str(&format!("=== Page {} ===\n", n + 1));
            for line in &page.lines {
                out.push_str(&format!("{:>3} {}\n", line.y_mm, line.text));
            }
        }
        out
    }
}

fn is_reportable(text: &str, marker: &str) -> bool {
    let lowered = text.trim().to_lowercase();
    if lowered.chars().count() < MIN_MESSAGE_CHARS {
        return false;
    }
    if CHIT_CHAT.iter().any(|p| lowered.contains(p)) {
        return false;
    }
    if META_TAGS.iter().any(|t| lowered.contains(t)) {
        return false;
    }
    let marker = marker.trim().to_lowercase();
    marker.is_empty() || !lowered.contains(&marker)
}

fn clean_text(text: &str) -> String {
    text.replace("**", "").replace('*', "•")
}

fn role_label(role: MessageRole) -> &'static str {
    match role {
        MessageRole::Patient => "PATIENT SYMPTOMS:",
        MessageRole::Assistant => "REMEDI AI ANALYSIS:",
        MessageRole::Clinician => "CLINICIAN NOTE:",
    }
}

/// Word-wrap text to `max_chars` per line (counted in characters). Line
/// breaks in the source are kept.
fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.trim().lines() {
        let mut current = String::new();
        let mut current_len = 0;
        for word in paragraph.split_whitespace() {
            let word_len = word.chars().count();
            if current_len + word_len + 1 > max_chars && !current.is_empty() {
                lines.push(std::mem::take(&mut current));
                current_len = 0;
            }
            if !current.is_empty() {
                current.push(' ');
                current_len += 1;
            }
            current.push_str(word);
            current_len += word_len;
        }
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

const PAGE_HEIGHT_MM: f32 = 297.0;
const LEFT_MM: f32 = 20.0;

/// Page-top offset to printpdf's bottom-left origin.
fn from_top(y_mm: f32) -> Mm {
    Mm(PAGE_HEIGHT_MM - y_mm)
}

/// Render a compiled document to PDF bytes.
pub fn render_pdf(document: &RenderedDocument, header: &ReportHeader) -> Result<Vec<u8>, ReportError> {
    let title = "Remedi Health Report";
    let (doc, page1, layer1) = PdfDocument::new(title, Mm(210.0), Mm(PAGE_HEIGHT_MM), "Layer 1");
    let font = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| ReportError::Pdf(format!("font error: {e}")))?;
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(|e| ReportError::Pdf(format!("font error: {e}")))?;

    for (n, page) in document.pages.iter().enumerate() {
        let layer = if n == 0 {
            doc.get_page(page1).get_layer(layer1)
        } else {
            let (page_idx, layer_idx) = doc.add_page(Mm(210.0), Mm(PAGE_HEIGHT_MM), "Layer 1");
            doc.get_page(page_idx).get_layer(layer_idx)
        };

        if n == 0 {
            layer.use_text("REMEDI", 22.0, Mm(LEFT_MM), from_top(25.0), &bold);
            layer.use_text("AI DIAGNOSTIC REPORT", 10.0, Mm(150.0), from_top(25.0), &bold);
            layer.use_text(
                format!("Patient Reference: {}", header.patient_reference),
                10.0,
                Mm(LEFT_MM),
                from_top(50.0),
                &font,
            );
            layer.use_text(
                format!(
                    "Report Date: {}",
                    header.generated_at.format("%Y-%m-%d %H:%M UTC")
                ),
                10.0,
                Mm(LEFT_MM),
                from_top(55.0),
                &font,
            );
        }

        for line in &page.lines {
            let (size, face) = match line.kind {
                LineKind::Label => (10.0, &bold),
                LineKind::Body => (10.0, &font),
            };
            layer.use_text(&line.text, size, Mm(LEFT_MM), from_top(line.y_mm as f32), face);
        }

        layer.use_text(DISCLAIMER, 8.0, Mm(LEFT_MM), from_top(290.0), &font);
    }

    let mut buf = BufWriter::new(Vec::new());
    doc.save(&mut buf)
        .map_err(|e| ReportError::Pdf(format!("save error: {e}")))?;
    buf.into_inner()
        .map_err(|e| ReportError::Pdf(format!("buffer error: {e}")))
}
