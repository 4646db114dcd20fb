//! One-shot rewrite of legacy section headers.
//!
//! Older queue files were written with French headers. The parser never
//! guesses at those; this step rewrites them to the managed names first.

use super::document::{Section, line_ending};

const LEGACY_HEADERS: &[(&str, Section)] = &[
    ("en attente", Section::Pending),
    ("en cours", Section::InProgress),
    ("terminées", Section::Done),
    ("terminés", Section::Done),
    ("terminé", Section::Done),
    ("fait", Section::Done),
];

/// Rewrite known legacy `## ` headers. Returns None when nothing changed.
pub fn migrate_legacy_headers(text: &str) -> Option<String> {
    let mut changed = false;
    let migrated: Vec<String> = text
        .lines()
        .map(|line| {
            let Some(name) = line.strip_prefix("## ") else {
                return line.to_string();
            };
            let key = name.trim().to_lowercase();
            LEGACY_HEADERS
                .iter()
                .find(|(legacy, _)| *legacy == key)
                .map_or_else(
                    || line.to_string(),
                    |(_, section)| {
                        changed = true;
                        format!("## {}", section.title())
                    },
                )
        })
        .collect();

    if !changed {
        return None;
    }
    let ending = line_ending(text);
    let mut out = migrated.join(ending);
    if text.ends_with('\n') {
        out.push_str(ending);
    }
    Some(out)
}
