//! Text extraction and word counting.
//!
//! Extension dispatch is a closed set: `.txt` is read as UTF-8, `.docx`
//! paragraphs are joined with newlines, and anything else counts as zero
//! words without reading the bytes.

use std::io::{Cursor, Read};
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;

/// Extensions accepted at upload time, lowercase with the leading dot.
pub const ALLOWED_EXTENSIONS: [&str; 2] = [".txt", ".docx"];

const DOCX_BODY: &str = "word/document.xml";

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("text is not valid utf-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("docx archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[error("docx read error: {0}")]
    Io(#[from] std::io::Error),
    #[error("docx xml error: {0}")]
    Xml(#[from] quick_xml::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    PlainText,
    Docx,
    /// No extractor; always yields zero words.
    Unrecognized,
}

impl DocumentKind {
    pub fn from_path(path: &str) -> Self {
        match extension_of(path).as_deref() {
            Some(".txt") => Self::PlainText,
            Some(".docx") => Self::Docx,
            _ => Self::Unrecognized,
        }
    }
}

/// Lowercased extension with the leading dot, e.g. `".txt"`.
pub fn extension_of(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext.to_lowercase()))
}

pub fn is_allowed(name: &str) -> bool {
    extension_of(name).is_some_and(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()))
}

/// Number of whitespace-delimited tokens.
pub fn word_count(text: &str) -> i64 {
    i64::try_from(text.split_whitespace().count()).unwrap_or(i64::MAX)
}

pub fn extract_text(kind: DocumentKind, bytes: &[u8]) -> Result<String, ExtractError> {
    match kind {
        DocumentKind::PlainText => Ok(String::from_utf8(bytes.to_vec())?),
        DocumentKind::Docx => docx_text(bytes),
        DocumentKind::Unrecognized => Ok(String::new()),
    }
}

pub fn count_words(kind: DocumentKind, bytes: &[u8]) -> Result<i64, ExtractError> {
    if kind == DocumentKind::Unrecognized {
        return Ok(0);
    }
    Ok(word_count(&extract_text(kind, bytes)?))
}

fn docx_text(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
    let mut xml = String::new();
    archive.by_name(DOCX_BODY)?.read_to_string(&mut xml)?;
    body_paragraphs(&xml)
}

/// Text of the paragraphs directly under `w:body`, one per line.
///
/// Tables and other block containers are skipped, as are paragraphs nested
/// inside a paragraph (text boxes); their text does not leak into the
/// enclosing paragraph.
fn body_paragraphs(xml: &str) -> Result<String, ExtractError> {
    let mut reader = Reader::from_str(xml);
    let mut paragraphs: Vec<String> = Vec::new();
    let mut current = String::new();

    let mut depth = 0usize;
    let mut body_depth: Option<usize> = None;
    let mut paragraph_depth: Option<usize> = None;
    let mut skip_depth: Option<usize> = None;
    let mut in_text = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                depth += 1;
                if skip_depth.is_some() {
                    continue;
                }
                match e.name().as_ref() {
                    b"w:body" if body_depth.is_none() => body_depth = Some(depth),
                    b"w:p" if paragraph_depth.is_some() => skip_depth = Some(depth),
                    b"w:p" if body_depth.is_some_and(|b| depth == b + 1) => {
                        paragraph_depth = Some(depth);
                        current.clear();
                    }
                    b"w:t" if paragraph_depth.is_some() => in_text = true,
                    _ => {}
                }
            }
            Event::Empty(e) if skip_depth.is_none() => match e.name().as_ref() {
                b"w:p" if paragraph_depth.is_none() && body_depth == Some(depth) => {
                    paragraphs.push(String::new())
                }
                b"w:tab" if paragraph_depth.is_some() => current.push('\t'),
                b"w:br" if paragraph_depth.is_some() => current.push('\n'),
                _ => {}
            },
            Event::Text(t) if in_text && skip_depth.is_none() => current.push_str(&t.unescape()?),
            Event::End(e) => {
                if skip_depth == Some(depth) {
                    skip_depth = None;
                } else if skip_depth.is_none() {
                    match e.name().as_ref() {
                        b"w:t" => in_text = false,
                        b"w:p" if paragraph_depth == Some(depth) => {
                            paragraph_depth = None;
                            paragraphs.push(std::mem::take(&mut current));
                        }
                        b"w:body" if body_depth == Some(depth) => body_depth = None,
                        _ => {}
                    }
                }
                depth = depth.saturating_sub(1);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(paragraphs.join("\n"))
}
