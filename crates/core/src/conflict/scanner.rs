//! Conflict-marker scanning.
//!
//! Splits a conflicted file into verbatim text segments and
//! [`ConflictRegion`]s delimited by the standard `<<<<<<<` / `=======` /
//! `>>>>>>>` markers, with the optional diff3 `|||||||` base section.
//! Line endings are kept on every line so a document can be rendered back
//! byte-for-byte.

use tracing::debug;

use crate::errors::ResolverError;

const MARKER_LEN: usize = 7;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Whether a region may be repaired automatically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Both sides are a single version element of the same name.
    VersionOnly(VersionConflict),
    /// Anything else: extra lines, structural changes, nested markers.
    Other,
}

/// The version values on each side of a `VersionOnly` region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionConflict {
    pub element: String,
    pub ours: String,
    pub theirs: String,
    /// Merge-base value, when the file was written with diff3 markers.
    pub base: Option<String>,
}

/// One conflict block. Line numbers are 1-indexed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictRegion {
    pub start_line: usize,
    pub base_line: Option<usize>,
    pub mid_line: usize,
    pub end_line: usize,
    pub ours_label: String,
    pub theirs_label: String,
    pub ours_text: String,
    pub base_text: Option<String>,
    pub theirs_text: String,
    /// Another conflict block was opened inside this one.
    pub nested: bool,
    /// Regions start out `Other`; the resolver promotes them.
    pub classification: Classification,
    raw: String,
}

impl ConflictRegion {
    /// The region exactly as it appeared in the input, markers included.
    pub fn raw_text(&self) -> &str {
        &self.raw
    }

    pub fn is_version_only(&self) -> bool {
        matches!(self.classification, Classification::VersionOnly(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    Conflict(ConflictRegion),
}

/// A conflicted file split into text and conflict segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictDocument {
    segments: Vec<Segment>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Marker {
    Start,
    Base,
    Separator,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Ours,
    Base,
    Theirs,
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

impl ConflictDocument {
    /// Scan `text` for conflict regions.
    pub fn parse(text: &str) -> Result<Self, ResolverError> {
        let mut segments = Vec::new();
        let mut plain = String::new();
        let mut open: Option<OpenRegion> = None;

        for (idx, line) in text.split_inclusive('\n').enumerate() {
            let line_no = idx + 1;
            let marker = classify_line(line);

            let Some(region) = open.as_mut() else {
                match marker {
                    Some((Marker::Start, label)) => {
                        if !plain.is_empty() {
                            segments.push(Segment::Text(std::mem::take(&mut plain)));
                        }
                        open = Some(OpenRegion::new(line_no, label, line));
                    }
                    Some((Marker::Base, _)) | Some((Marker::End, _)) => {
                        return Err(ResolverError::UnexpectedMarker {
                            line: line_no,
                            marker: line.trim_end().to_string(),
                        });
                    }
                    // A lone separator outside a region is ordinary content.
                    Some((Marker::Separator, _)) | None => plain.push_str(line),
                }
                continue;
            };

            region.raw.push_str(line);

            if region.depth > 1 {
                match marker {
                    Some((Marker::Start, _)) => region.depth += 1,
                    Some((Marker::End, _)) => region.depth -= 1,
                    _ => {}
                }
                region.push(line);
                continue;
            }

            match (marker, region.section) {
                (Some((Marker::Start, _)), _) => {
                    region.nested = true;
                    region.depth += 1;
                    region.push(line);
                }
                (Some((Marker::Base, _)), Section::Ours) => {
                    region.base_line = Some(line_no);
                    region.base = Some(String::new());
                    region.section = Section::Base;
                }
                (Some((Marker::Separator, _)), Section::Ours | Section::Base) => {
                    region.mid_line = Some(line_no);
                    region.section = Section::Theirs;
                }
                (Some((Marker::End, label)), Section::Theirs) => {
                    if let Some(done) = open.take() {
                        segments.push(Segment::Conflict(done.close(line_no, label)));
                    }
                }
                (Some((m, _)), _) => {
                    debug!(line = line_no, marker = ?m, "conflict marker out of order");
                    return Err(ResolverError::UnexpectedMarker {
                        line: line_no,
                        marker: line.trim_end().to_string(),
                    });
                }
                (None, _) => region.push(line),
            }
        }

        if let Some(region) = open {
            return Err(ResolverError::UnterminatedRegion {
                line: region.start_line,
            });
        }
        if !plain.is_empty() {
            segments.push(Segment::Text(plain));
        }

        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn regions(&self) -> impl Iterator<Item = &ConflictRegion> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Conflict(region) => Some(region),
            Segment::Text(_) => None,
        })
    }

    pub fn regions_mut(&mut self) -> impl Iterator<Item = &mut ConflictRegion> {
        self.segments.iter_mut().filter_map(|s| match s {
            Segment::Conflict(region) => Some(region),
            Segment::Text(_) => None,
        })
    }

    pub fn has_conflicts(&self) -> bool {
        self.regions().next().is_some()
    }

    /// Reassemble the document, replacing each region with the text `pick`
    /// returns for it, or with its original raw text when `pick` returns
    /// `None`.
    pub fn render<'a, F>(&'a self, mut pick: F) -> String
    where
        F: FnMut(&'a ConflictRegion) -> Option<&'a str>,
    {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Conflict(region) => match pick(region) {
                    Some(chosen) => out.push_str(chosen),
                    None => out.push_str(&region.raw),
                },
            }
        }
        out
    }
}

/// A region whose end marker has not been seen yet.
struct OpenRegion {
    start_line: usize,
    base_line: Option<usize>,
    mid_line: Option<usize>,
    ours_label: String,
    ours: String,
    base: Option<String>,
    theirs: String,
    section: Section,
    depth: usize,
    nested: bool,
    raw: String,
}

impl OpenRegion {
    fn new(start_line: usize, label: &str, line: &str) -> Self {
        Self {
            start_line,
            base_line: None,
            mid_line: None,
            ours_label: label.to_string(),
            ours: String::new(),
            base: None,
            theirs: String::new(),
            section: Section::Ours,
            depth: 1,
            nested: false,
            raw: line.to_string(),
        }
    }

    fn push(&mut self, line: &str) {
        match self.section {
            Section::Ours => self.ours.push_str(line),
            Section::Base => {
                if let Some(base) = self.base.as_mut() {
                    base.push_str(line);
                }
            }
            Section::Theirs => self.theirs.push_str(line),
        }
    }

    fn close(self, end_line: usize, label: &str) -> ConflictRegion {
        ConflictRegion {
            start_line: self.start_line,
            base_line: self.base_line,
            // The end marker is only accepted in the theirs section, which is
            // entered through the separator.
            mid_line: self.mid_line.unwrap_or(end_line),
            end_line,
            ours_label: self.ours_label,
            theirs_label: label.to_string(),
            ours_text: self.ours,
            base_text: self.base,
            theirs_text: self.theirs,
            nested: self.nested,
            classification: Classification::Other,
            raw: self.raw,
        }
    }
}

/// Recognise a conflict marker line and return its label.
fn classify_line(line: &str) -> Option<(Marker, &str)> {
    let content = line.trim_end_matches(['\n', '\r']);
    if content == "=======" {
        return Some((Marker::Separator, ""));
    }

    let marker = match content.get(..MARKER_LEN)? {
        "<<<<<<<" => Marker::Start,
        "|||||||" => Marker::Base,
        ">>>>>>>" => Marker::End,
        _ => return None,
    };
    let rest = &content[MARKER_LEN..];
    if rest.is_empty() {
        Some((marker, ""))
    } else if rest.starts_with(' ') {
        Some((marker, rest.trim()))
    } else {
        None
    }
}
