//! Split a model answer into named project files.

use serde::Deserialize;
use std::collections::BTreeMap;

/// The file every generated project is built around.
pub const PRIMARY_FILE: &str = "app.py";

/// Files the marker policy looks for, in output order.
pub const MARKER_TARGETS: [&str; 3] = [PRIMARY_FILE, "requirements.txt", "README.md"];

const FENCE: &str = "```";

/// How raw model text is turned into files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ExtractPolicy {
    /// The whole answer becomes `app.py`.
    #[default]
    WholeText,
    /// Fenced blocks preceded by a known file name.
    Markers,
}

/// Generated files keyed by name. Always holds [`PRIMARY_FILE`], possibly empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSet {
    files: BTreeMap<String, String>,
}

impl FileSet {
    pub fn new(primary: impl Into<String>) -> Self {
        let mut files = BTreeMap::new();
        files.insert(PRIMARY_FILE.to_string(), primary.into());
        Self { files }
    }

    fn insert(&mut self, name: &str, contents: String) {
        self.files.insert(name.to_string(), contents);
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.files.get(name).map(String::as_str)
    }

    pub fn primary(&self) -> &str {
        self.get(PRIMARY_FILE).unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.files.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// True when extraction found nothing at all.
    pub fn is_blank(&self) -> bool {
        self.files.values().all(|c| c.trim().is_empty())
    }
}

pub fn extract_files(policy: ExtractPolicy, raw_text: &str) -> FileSet {
    let files = match policy {
        ExtractPolicy::WholeText => FileSet::new(raw_text),
        ExtractPolicy::Markers => extract_marked(raw_text, &MARKER_TARGETS),
    };
    tracing::debug!(?policy, files = files.len(), blank = files.is_blank(), "extracted files");
    files
}

fn extract_marked(raw_text: &str, targets: &[&str]) -> FileSet {
    let blocks = parse_blocks(raw_text, targets);
    let mut files = FileSet::new(String::new());
    for target in targets {
        let contents = blocks
            .iter()
            .find(|b| b.label == Some(*target))
            .map(|b| b.body.clone())
            .unwrap_or_default();
        files.insert(target, contents);
    }
    files
}

/// A fenced block and the file name that introduced it, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block<'t> {
    pub label: Option<&'t str>,
    pub body: String,
}

/// Tokenize `raw_text` into fenced blocks, in order of appearance.
///
/// Outside a fence, a line mentioning a target arms a label. Blank lines keep it
/// armed and any other prose clears it. The next fence opening takes the label.
/// A fence left open at the end of the text produces no block.
pub fn parse_blocks<'t>(raw_text: &str, targets: &[&'t str]) -> Vec<Block<'t>> {
    let mut blocks = Vec::new();
    let mut pending: Option<&'t str> = None;
    let mut open: Option<(Option<&'t str>, Vec<&str>)> = None;

    for line in raw_text.lines() {
        let trimmed = line.trim();

        if let Some((label, mut body)) = open.take() {
            if trimmed.starts_with(FENCE) {
                blocks.push(Block {
                    label,
                    body: body.join("\n"),
                });
            } else {
                body.push(line);
                open = Some((label, body));
            }
            continue;
        }

        if trimmed.starts_with(FENCE) {
            open = Some((pending.take(), Vec::new()));
        } else if let Some(name) = find_marker(line, targets) {
            pending = Some(name);
        } else if !trimmed.is_empty() {
            pending = None;
        }
    }

    blocks
}

/// The target mentioned closest to the end of `line`.
fn find_marker<'t>(line: &str, targets: &[&'t str]) -> Option<&'t str> {
    targets
        .iter()
        .filter_map(|t| last_token_match(line, t).map(|pos| (pos, *t)))
        .max_by_key(|(pos, _)| *pos)
        .map(|(_, t)| t)
}

fn last_token_match(line: &str, token: &str) -> Option<usize> {
    line.match_indices(token)
        .filter(|(pos, _)| {
            let before = line[..*pos].chars().next_back();
            let after = line[pos + token.len()..].chars().next();
            // A trailing '.' may end a sentence, a leading one would extend the name.
            !before.is_some_and(|c| c == '.' || is_name_char(c)) && !after.is_some_and(is_name_char)
        })
        .map(|(pos, _)| pos)
        .last()
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '/')
}
