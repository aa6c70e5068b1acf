//! Reader for pinned dependency manifests (`requirements.txt` style).
//!
//! Every line is a comment (`#`), blank, or `name==version`. Section headers
//! are ordinary comments and carry no meaning for the reader.

use crate::utils::error::{CacheError, Result};
use regex::Regex;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

static REQUIREMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<name>[A-Za-z0-9](?:[A-Za-z0-9._-]*[A-Za-z0-9])?)(?:\[(?P<extras>[A-Za-z0-9._,\s-]+)\])?\s*==\s*(?P<version>\S+)$",
    )
    .expect("requirement pattern is valid")
});

static VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:[0-9]+!)?[0-9]+(?:\.[0-9]+)*(?:(?:a|b|rc)[0-9]+)?(?:\.post[0-9]+)?(?:\.dev[0-9]+)?(?:\+[A-Za-z0-9]+(?:[._-][A-Za-z0-9]+)*)?$",
    )
    .expect("version pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub line: usize,
    pub name: String,
    pub extras: Vec<String>,
    pub version: String,
}

impl Requirement {
    /// 名稱正規化：大小寫不敏感，`-`、`_`、`.` 視為相同
    pub fn normalized_name(&self) -> String {
        normalize_name(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub name: String,
    pub pins: Vec<(usize, String)>,
}

pub fn normalize_name(name: &str) -> String {
    name.to_ascii_lowercase().replace(['_', '.'], "-")
}

pub fn parse_requirements(content: &str) -> Result<Vec<Requirement>> {
    let mut requirements = Vec::new();

    for (index, raw_line) in content.lines().enumerate() {
        let line_no = index + 1;
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        let caps = REQUIREMENT_RE
            .captures(line)
            .ok_or_else(|| CacheError::ManifestError {
                line: line_no,
                reason: format!("expected name==version, found '{}'", line),
            })?;

        let version = caps["version"].to_string();
        if !VERSION_RE.is_match(&version) {
            return Err(CacheError::ManifestError {
                line: line_no,
                reason: format!("invalid version '{}'", version),
            });
        }

        let extras = caps
            .name("extras")
            .map(|m| {
                m.as_str()
                    .split(',')
                    .map(|extra| extra.trim().to_string())
                    .filter(|extra| !extra.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        requirements.push(Requirement {
            line: line_no,
            name: caps["name"].to_string(),
            extras,
            version,
        });
    }

    Ok(requirements)
}

pub fn read_requirements<P: AsRef<Path>>(path: P) -> Result<Vec<Requirement>> {
    let content = std::fs::read_to_string(path)?;
    parse_requirements(&content)
}

/// Packages pinned more than once with different versions. Repeating the
/// same pin is allowed.
pub fn find_conflicts(requirements: &[Requirement]) -> Vec<Conflict> {
    let mut by_name: BTreeMap<String, Vec<&Requirement>> = BTreeMap::new();
    for requirement in requirements {
        by_name
            .entry(requirement.normalized_name())
            .or_default()
            .push(requirement);
    }

    by_name
        .into_iter()
        .filter(|(_, pins)| pins.iter().any(|pin| pin.version != pins[0].version))
        .map(|(name, pins)| Conflict {
            name,
            pins: pins
                .into_iter()
                .map(|pin| (pin.line, pin.version.clone()))
                .collect(),
        })
        .collect()
}

fn strip_inline_comment(line: &str) -> &str {
    if line.trim_start().starts_with('#') {
        return "";
    }
    let mut previous = None;
    for (pos, ch) in line.char_indices() {
        if ch == '#' && previous.is_some_and(char::is_whitespace) {
            return &line[..pos];
        }
        previous = Some(ch);
    }
    line
}
