//! `@section` extraction for segment and batch scripts.
//!
//! A script may contain several sections, each introduced by a line of the
//! form `@<type> <name> [key=value ...]`; lines up to the next `@` line are
//! the section's code. Text before the first `@` belongs to no section and
//! is dropped.

use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct Section {
    pub section_type: String,
    pub name: String,
    pub flags: HashMap<String, String>,
    pub code: String,
}

impl Section {
    pub fn flag_i64(&self, name: &str) -> Option<i64> {
        self.flags.get(name)?.parse().ok()
    }
}

/// Split a script into its `@` sections.
pub fn extract_sections(code: &str) -> Vec<Section> {
    let mut sections: Vec<Section> = Vec::new();

    for line in code.lines() {
        let trimmed = line.trim();
        if let Some(header) = trimmed.strip_prefix('@') {
            let mut parts = header.split_whitespace();
            let section_type = parts.next().unwrap_or("").to_string();
            let mut section = Section {
                section_type,
                ..Default::default()
            };
            for part in parts {
                match part.split_once('=') {
                    Some((key, value)) => {
                        section.flags.insert(key.to_string(), value.to_string());
                    }
                    None if section.name.is_empty() => section.name = part.to_string(),
                    None => {}
                }
            }
            sections.push(section);
        } else if let Some(current) = sections.last_mut() {
            current.code.push_str(line);
            current.code.push('\n');
        }
    }

    sections
}
