//! Spreadsheet ingestion.
//!
//! Capture and reference files are OpenDocument spreadsheets: a zip archive
//! holding a `content.xml` table. This module exposes that table as a flat
//! list of rows, each carrying the first paragraph text found in its cells.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::NsReader;
use tracing::{debug, trace};
use zip::result::ZipError;
use zip::ZipArchive;

use crate::error::LoadError;

/// Archive member holding the spreadsheet body.
pub const DEFAULT_DOCUMENT: &str = "content.xml";

const TABLE_NS: &[u8] = b"urn:oasis:names:tc:opendocument:xmlns:table:1.0";
const TEXT_NS: &[u8] = b"urn:oasis:names:tc:opendocument:xmlns:text:1.0";

/// One `table:table-row` of the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRow {
    /// 1-based index among the sibling rows of the same parent element.
    pub position: usize,
    /// Text of the first `text:p` directly inside a `table:table-cell`.
    pub first_text: Option<String>,
}

/// Reads `member` out of the archive at `path`.
///
/// The archive is closed before this returns.
pub fn read_document(path: &Path, member: &str) -> Result<Vec<u8>, LoadError> {
    let file = File::open(path).map_err(|source| LoadError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    let mut archive = ZipArchive::new(file).map_err(|source| LoadError::Archive {
        path: path.to_path_buf(),
        source,
    })?;

    let mut entry = archive.by_name(member).map_err(|e| match e {
        ZipError::FileNotFound => LoadError::MissingMember {
            path: path.to_path_buf(),
            member: member.to_string(),
        },
        source => LoadError::Archive {
            path: path.to_path_buf(),
            source,
        },
    })?;

    let mut content = Vec::new();
    entry
        .read_to_end(&mut content)
        .map_err(|source| LoadError::MemberRead {
            path: path.to_path_buf(),
            member: member.to_string(),
            source,
        })?;

    debug!(path = %path.display(), member, bytes = content.len(), "Read archive member");
    Ok(content)
}

/// Reads and parses the table rows of the spreadsheet at `path`.
pub fn load_rows(path: &Path, member: &str) -> Result<Vec<TableRow>, LoadError> {
    let content = read_document(path, member)?;
    parse_rows(&content)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Element {
    Row,
    Cell,
    Paragraph,
    Other,
}

impl Element {
    fn classify(ns: &ResolveResult, local: &[u8]) -> Self {
        match ns {
            ResolveResult::Bound(Namespace(uri)) if *uri == TABLE_NS => match local {
                b"table-row" => Self::Row,
                b"table-cell" => Self::Cell,
                _ => Self::Other,
            },
            ResolveResult::Bound(Namespace(uri)) if *uri == TEXT_NS && local == b"p" => {
                Self::Paragraph
            }
            _ => Self::Other,
        }
    }
}

struct Node {
    kind: Element,
    child_rows: usize,
}

/// Paragraph whose text is being collected.
struct Capture {
    row: usize,
    depth: usize,
    /// Cleared once the paragraph opens a child element; text after it is not
    /// part of the paragraph's leading text.
    open: bool,
}

#[derive(Default)]
struct RowCollector {
    stack: Vec<Node>,
    root_rows: usize,
    rows: Vec<TableRow>,
    current_row: Option<usize>,
    capture: Option<Capture>,
}

impl RowCollector {
    fn open(&mut self, kind: Element) {
        if let Some(capture) = self.capture.as_mut() {
            if self.stack.len() == capture.depth {
                capture.open = false;
            }
        }

        match kind {
            Element::Row => {
                let position = match self.stack.last_mut() {
                    Some(parent) => {
                        parent.child_rows += 1;
                        parent.child_rows
                    }
                    None => {
                        self.root_rows += 1;
                        self.root_rows
                    }
                };
                self.rows.push(TableRow {
                    position,
                    first_text: None,
                });
                self.current_row = Some(self.rows.len() - 1);
            }
            Element::Paragraph => {
                let in_cell = matches!(self.stack.last(), Some(n) if n.kind == Element::Cell);
                if let (true, Some(row)) = (in_cell, self.current_row) {
                    if self.capture.is_none() && self.rows[row].first_text.is_none() {
                        self.rows[row].first_text = Some(String::new());
                        self.capture = Some(Capture {
                            row,
                            depth: self.stack.len() + 1,
                            open: true,
                        });
                    }
                }
            }
            Element::Cell | Element::Other => {}
        }

        self.stack.push(Node {
            kind,
            child_rows: 0,
        });
    }

    fn close(&mut self) {
        let depth = self.stack.len();
        let Some(node) = self.stack.pop() else {
            return;
        };

        if matches!(&self.capture, Some(c) if c.depth == depth) {
            self.capture = None;
        }
        if node.kind == Element::Row {
            self.current_row = None;
        }
    }

    fn text(&mut self, text: &str) {
        if let Some(capture) = &self.capture {
            if capture.open && self.stack.len() == capture.depth {
                if let Some(buf) = self.rows[capture.row].first_text.as_mut() {
                    buf.push_str(text);
                }
            }
        }
    }
}

/// Parses an OpenDocument `content.xml` body into table rows.
pub fn parse_rows(xml: &[u8]) -> Result<Vec<TableRow>, LoadError> {
    let mut reader = NsReader::from_reader(xml);
    let mut buf = Vec::new();
    let mut collector = RowCollector::default();

    loop {
        let (ns, event) = match reader.read_resolved_event_into(&mut buf) {
            Ok(resolved) => resolved,
            Err(source) => {
                return Err(LoadError::Xml {
                    position: reader.buffer_position(),
                    source,
                })
            }
        };

        match event {
            Event::Start(e) => {
                let kind = Element::classify(&ns, e.local_name().as_ref());
                collector.open(kind);
            }
            Event::Empty(e) => {
                let kind = Element::classify(&ns, e.local_name().as_ref());
                collector.open(kind);
                collector.close();
            }
            Event::End(_) => collector.close(),
            Event::Text(t) => {
                let text = t.unescape().map_err(|source| LoadError::Xml {
                    position: reader.buffer_position(),
                    source,
                })?;
                collector.text(&text);
            }
            Event::CData(c) => {
                let text = c.decode().map_err(|e| LoadError::Xml {
                    position: reader.buffer_position(),
                    source: e.into(),
                })?;
                collector.text(&text);
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    trace!(rows = collector.rows.len(), "Parsed table rows");
    Ok(collector.rows)
}
