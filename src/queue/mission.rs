//! Helpers for single mission lines (`- [project:NAME] text`).

use std::sync::OnceLock;

use regex::Regex;

use crate::error::QueueError;

/// Marker every mission line starts with.
pub const MISSION_MARKER: &str = "- ";

fn re_leading_tag() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\[project:\s*([^\]\s]+)\s*\]").expect("leading project tag regex")
    })
}

fn re_any_tag() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[project:[^\]]*\]").expect("project tag regex"))
}

/// True for lines that hold a mission.
pub fn is_mission(line: &str) -> bool {
    line.starts_with(MISSION_MARKER)
}

/// Strip one leading list marker (`-`, `*` or `+` followed by whitespace).
pub fn strip_list_marker(text: &str) -> &str {
    let trimmed = text.trim_start();
    for marker in ['-', '*', '+'] {
        if let Some(rest) = trimmed.strip_prefix(marker)
            && (rest.is_empty() || rest.starts_with(char::is_whitespace))
        {
            return rest.trim_start();
        }
    }
    trimmed
}

/// Remove every `[project:NAME]` tag from `text`.
pub fn strip_project_tags(text: &str) -> String {
    re_any_tag().replace_all(text, "").into_owned()
}

/// The project a mission line is tagged with, if any.
///
/// Only a tag that precedes the body counts.
pub fn project_tag(line: &str) -> Option<&str> {
    let body = strip_list_marker(line);
    re_leading_tag()
        .captures(body)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Human-facing text of a mission: no marker, no tag.
pub fn display_text(line: &str) -> String {
    strip_project_tags(strip_list_marker(line)).trim().to_string()
}

/// Whether `line` is eligible under a project filter.
///
/// Untagged lines always match; tagged lines only match their own project
/// (case-insensitive). No filter matches everything.
pub fn matches_project(line: &str, filter: Option<&str>) -> bool {
    match (filter, project_tag(line)) {
        (None, _) | (Some(_), None) => true,
        (Some(want), Some(tag)) => tag.eq_ignore_ascii_case(want.trim()),
    }
}

/// Turn free text into a single mission line.
///
/// Newlines are folded into spaces and any leading list marker is replaced
/// by `- `. A bare marker is an empty mission.
pub fn format_entry(entry: &str) -> Result<String, QueueError> {
    let single: String = entry
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    let body = strip_list_marker(&single).trim();
    if body.is_empty() {
        return Err(QueueError::EmptyMission);
    }
    Ok(format!("{MISSION_MARKER}{body}"))
}

/// Build a mission line with an optional project tag in front of the body.
pub fn tagged_entry(text: &str, project: Option<&str>) -> Result<String, QueueError> {
    let line = format_entry(text)?;
    match project.map(str::trim).filter(|p| !p.is_empty()) {
        Some(p) if project_tag(&line).is_none() => {
            let body = &line[MISSION_MARKER.len()..];
            Ok(format!("{MISSION_MARKER}[project:{p}] {body}"))
        }
        _ => Ok(line),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_tag_extraction() {
        assert_eq!(project_tag("- [project:koi] fix it"), Some("koi"));
        assert_eq!(project_tag("- fix it"), None);
        // Tags after the body do not count as the mission's project.
        assert_eq!(project_tag("- fix [project:koi] it"), None);
    }

    #[test]
    fn display_text_strips_markup() {
        assert_eq!(display_text("- [project:koi] fix it"), "fix it");
        assert_eq!(display_text("- b"), "b");
        assert_eq!(display_text("* star item"), "star item");
    }

    #[test]
    fn filter_semantics() {
        assert!(matches_project("- untagged", Some("koi")));
        assert!(matches_project("- [project:koi] x", Some("koi")));
        assert!(matches_project("- [project:koi] x", Some("KOI")));
        assert!(!matches_project("- [project:other] x", Some("koi")));
        assert!(matches_project("- [project:other] x", None));
    }

    #[test]
    fn format_entry_adds_marker_and_folds_lines() {
        assert_eq!(format_entry("do thing").unwrap(), "- do thing");
        assert_eq!(format_entry("- already").unwrap(), "- already");
        assert_eq!(format_entry("two\nlines").unwrap(), "- two lines");
        assert!(matches!(format_entry("  \n "), Err(QueueError::EmptyMission)));
        assert!(matches!(format_entry("- "), Err(QueueError::EmptyMission)));
    }

    #[test]
    fn bare_list_markers_are_empty_missions() {
        for input in ["-", "- ", "  *  ", "+", "-\n  "] {
            assert!(
                matches!(format_entry(input), Err(QueueError::EmptyMission)),
                "{input:?} should be rejected"
            );
        }
        assert_eq!(format_entry("* starred").unwrap(), "- starred");
        assert_eq!(format_entry("-dash").unwrap(), "- -dash");
    }

    #[test]
    fn tagged_entry_keeps_existing_tag() {
        assert_eq!(
            tagged_entry("fix bug", Some("web")).unwrap(),
            "- [project:web] fix bug"
        );
        assert_eq!(
            tagged_entry("[project:api] fix bug", Some("web")).unwrap(),
            "- [project:api] fix bug"
        );
        assert_eq!(tagged_entry("fix bug", None).unwrap(), "- fix bug");
    }

    #[test]
    fn strip_list_marker_requires_whitespace() {
        assert_eq!(strip_list_marker("- a"), "a");
        assert_eq!(strip_list_marker("-a"), "-a");
        assert_eq!(strip_list_marker("+ b"), "b");
    }
}
