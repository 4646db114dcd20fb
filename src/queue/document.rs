use std::collections::BTreeMap;
use std::fmt;

use crate::error::QueueError;

use super::mission::{self, is_mission};

/// The three managed sections, in canonical document order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Section {
    Pending,
    InProgress,
    Done,
}

impl Section {
    pub const ALL: [Self; 3] = [Self::Pending, Self::InProgress, Self::Done];

    pub const fn title(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::InProgress => "In Progress",
            Self::Done => "Done",
        }
    }

    /// Section named by a `## ` header line, if it is a managed one.
    pub fn from_header(line: &str) -> Option<Self> {
        let name = line.trim_end().strip_prefix("## ")?.trim();
        Self::ALL
            .into_iter()
            .find(|s| s.title().eq_ignore_ascii_case(name))
    }

    fn header(self) -> String {
        format!("## {}", self.title())
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

/// Skeleton written when no queue file exists yet.
pub const SKELETON: &str = "# Missions\n\n## Pending\n\n## In Progress\n\n## Done\n";

/// Whitespace plus the invisible format characters chat clients insert.
fn is_blank_char(c: char) -> bool {
    c.is_whitespace() || matches!(c, '\u{200B}'..='\u{200D}' | '\u{2060}' | '\u{FEFF}')
}

/// `"\r\n"` when the first line break of `text` is CRLF, `"\n"` otherwise.
pub(super) fn line_ending(text: &str) -> &'static str {
    match text.find('\n') {
        Some(i) if text[..i].ends_with('\r') => "\r\n",
        _ => "\n",
    }
}

fn is_heading(line: &str) -> bool {
    line.starts_with("# ") || line.starts_with("## ")
}

/// Mission lines of every managed section, in document order.
///
/// Unrecognized sections are skipped (their text stays in the file, it just
/// is not exposed here). When a header repeats, only its first occurrence
/// counts, the same section the mutations act on.
pub fn parse_sections(text: &str) -> BTreeMap<Section, Vec<String>> {
    let doc = QueueDocument::parse(text);
    Section::ALL
        .into_iter()
        .map(|s| (s, doc.missions(s).into_iter().map(str::to_string).collect()))
        .collect()
}

/// First Pending line eligible under `project_filter`, scanning in order.
pub fn extract_next_pending(text: &str, project_filter: Option<&str>) -> Option<String> {
    QueueDocument::parse(text)
        .missions(Section::Pending)
        .into_iter()
        .find(|line| mission::matches_project(line, project_filter))
        .map(str::to_string)
}

/// A queue document held as lines so untouched text survives byte-for-byte.
///
/// Lines are rejoined with the file's own line ending, taken from its first
/// line break.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueDocument {
    lines: Vec<String>,
    line_ending: &'static str,
    trailing_newline: bool,
}

impl QueueDocument {
    pub fn parse(text: &str) -> Self {
        Self {
            lines: text.lines().map(str::to_string).collect(),
            line_ending: line_ending(text),
            trailing_newline: text.is_empty() || text.ends_with('\n'),
        }
    }

    pub fn skeleton() -> Self {
        Self::parse(SKELETON)
    }

    pub fn render(&self) -> String {
        let mut out = self.lines.join(self.line_ending);
        if self.trailing_newline {
            out.push_str(self.line_ending);
        }
        out
    }

    /// Header index and exclusive end of a section's body.
    fn span(&self, section: Section) -> Option<(usize, usize)> {
        let header = self
            .lines
            .iter()
            .position(|l| Section::from_header(l) == Some(section))?;
        let end = self.lines[header + 1..]
            .iter()
            .position(|l| is_heading(l))
            .map_or(self.lines.len(), |offset| header + 1 + offset);
        Some((header, end))
    }

    fn mission_indices(&self, section: Section) -> Vec<usize> {
        self.span(section).map_or_else(Vec::new, |(header, end)| {
            (header + 1..end)
                .filter(|&i| is_mission(&self.lines[i]))
                .collect()
        })
    }

    /// Mission lines of one section, in order.
    pub fn missions(&self, section: Section) -> Vec<&str> {
        self.mission_indices(section)
            .into_iter()
            .map(|i| self.lines[i].as_str())
            .collect()
    }

    pub fn count(&self, section: Section) -> usize {
        self.mission_indices(section).len()
    }

    /// Add a missing managed section before the next canonical one.
    fn ensure_section(&mut self, section: Section) -> usize {
        if let Some((header, _)) = self.span(section) {
            return header;
        }
        let before = Section::ALL
            .into_iter()
            .filter(|s| *s > section)
            .find_map(|s| self.span(s).map(|(h, _)| h));
        let at = before.unwrap_or(self.lines.len());
        let mut block = Vec::new();
        if at > 0 && !self.lines[at - 1].trim().is_empty() {
            block.push(String::new());
        }
        block.push(section.header());
        block.push(String::new());
        let header = at + block.len() - 2;
        self.lines.splice(at..at, block);
        header
    }

    /// Insertion slot for a section without missions: after one blank line.
    fn empty_slot(&mut self, header: usize) -> usize {
        let next = header + 1;
        if next >= self.lines.len() || !self.lines[next].trim().is_empty() {
            self.lines.insert(next, String::new());
        }
        header + 2
    }

    fn insert_line(&mut self, section: Section, line: String, top: bool) {
        let header = self.ensure_section(section);
        let existing = self.mission_indices(section);
        let at = if top {
            existing.first().copied()
        } else {
            existing.last().map(|i| i + 1)
        };
        let at = match at {
            Some(i) => i,
            None => self.empty_slot(header),
        };
        self.lines.insert(at, line);
        if self.lines.get(at + 1).is_some_and(|l| is_heading(l)) {
            self.lines.insert(at + 1, String::new());
        }
    }

    fn remove_line(&mut self, index: usize) -> String {
        let line = self.lines.remove(index);
        // Avoid leaving two blank lines where a lone mission used to be.
        if index > 0
            && self.lines.get(index).is_some_and(|l| l.trim().is_empty())
            && self.lines[index - 1].trim().is_empty()
        {
            self.lines.remove(index);
        }
        line
    }

    fn find(&self, section: Section, line: &str) -> Option<usize> {
        let wanted = line.trim();
        self.mission_indices(section)
            .into_iter()
            .find(|&i| self.lines[i].trim() == wanted)
    }

    fn take(&mut self, section: Section, line: &str) -> Result<String, QueueError> {
        let index = self.find(section, line).ok_or_else(|| QueueError::NotInSection {
            section: section.title(),
            line: line.trim().to_string(),
        })?;
        Ok(self.remove_line(index))
    }

    /// Add a mission to Pending: top when urgent, bottom otherwise.
    pub fn insert_pending(&mut self, entry: &str, urgent: bool) -> Result<String, QueueError> {
        let line = mission::format_entry(entry)?;
        self.insert_line(Section::Pending, line.clone(), urgent);
        Ok(line)
    }

    /// Remove a Pending mission by 1-based index or keyword; returns its display text.
    ///
    /// An identifier made only of digits is always a position. A blank one is
    /// rejected rather than matching everything.
    pub fn cancel(&mut self, identifier: &str) -> Result<String, QueueError> {
        let identifier = identifier.trim_matches(is_blank_char);
        if identifier.is_empty() {
            return Err(QueueError::BlankIdentifier);
        }
        let pending = self.mission_indices(Section::Pending);
        if pending.is_empty() {
            return Err(QueueError::Empty);
        }
        let index = if identifier.bytes().all(|b| b.is_ascii_digit()) {
            let n = identifier.parse::<usize>().unwrap_or(usize::MAX);
            if n == 0 || n > pending.len() {
                return Err(QueueError::IndexOutOfRange {
                    index: n,
                    len: pending.len(),
                });
            }
            pending[n - 1]
        } else {
            let needle = identifier.to_lowercase();
            pending
                .iter()
                .copied()
                .find(|&i| mission::display_text(&self.lines[i]).to_lowercase().contains(&needle))
                .ok_or_else(|| QueueError::NoMatch {
                    keyword: identifier.to_string(),
                })?
        };
        let removed = self.remove_line(index);
        Ok(mission::display_text(&removed))
    }

    /// Move the Pending mission at `position` to `target` (both 1-based).
    pub fn reorder(&mut self, position: usize, target: usize) -> Result<String, QueueError> {
        let pending = self.mission_indices(Section::Pending);
        let len = pending.len();
        if len == 0 {
            return Err(QueueError::Empty);
        }
        for index in [position, target] {
            if index == 0 || index > len {
                return Err(QueueError::IndexOutOfRange { index, len });
            }
        }
        let mut lines: Vec<String> = pending.iter().map(|&i| self.lines[i].clone()).collect();
        let moved = lines.remove(position - 1);
        lines.insert(target - 1, moved.clone());
        // Missions keep their slots; only which mission sits in each slot changes.
        for (slot, line) in pending.into_iter().zip(lines) {
            self.lines[slot] = line;
        }
        Ok(mission::display_text(&moved))
    }

    /// Pending → bottom of In Progress.
    pub fn start_mission(&mut self, line: &str) -> Result<(), QueueError> {
        let taken = self.take(Section::Pending, line)?;
        self.insert_line(Section::InProgress, taken, false);
        Ok(())
    }

    /// In Progress → top of Done, with an optional note appended.
    pub fn complete_mission(&mut self, line: &str, note: Option<&str>) -> Result<(), QueueError> {
        let taken = self.take(Section::InProgress, line)?;
        let done = match note {
            Some(n) if !n.trim().is_empty() => format!("{taken} ({})", n.trim()),
            _ => taken,
        };
        self.insert_line(Section::Done, done, true);
        Ok(())
    }

    /// In Progress → bottom of Pending, for another attempt later.
    pub fn requeue_mission(&mut self, line: &str) -> Result<(), QueueError> {
        let taken = self.take(Section::InProgress, line)?;
        self.insert_line(Section::Pending, taken, false);
        Ok(())
    }

    /// Pending → top of Done, marked as skipped.
    pub fn skip_mission(&mut self, line: &str, reason: &str) -> Result<(), QueueError> {
        let taken = self.take(Section::Pending, line)?;
        self.insert_line(Section::Done, format!("{taken} (skipped: {})", reason.trim()), true);
        Ok(())
    }

    /// Put every In Progress mission back on top of Pending, order kept.
    pub fn recover_in_progress(&mut self) -> usize {
        let mut stranded = Vec::new();
        while let Some(&index) = self.mission_indices(Section::InProgress).first() {
            stranded.push(self.remove_line(index));
        }
        let moved = stranded.len();
        for line in stranded.into_iter().rev() {
            self.insert_line(Section::Pending, line, true);
        }
        moved
    }

    /// Keep only the newest `keep` Done missions (Done is newest-first).
    pub fn trim_done(&mut self, keep: usize) -> usize {
        let done = self.mission_indices(Section::Done);
        let excess: Vec<usize> = done.into_iter().skip(keep).collect();
        for &index in excess.iter().rev() {
            self.remove_line(index);
        }
        excess.len()
    }
}
