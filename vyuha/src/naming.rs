//! Correlating per-function artifacts across the transformation.
//!
//! The graph extractor names its files after the (mangled) function, and IR
//! files carry the pipeline id as a suffix. Keys are derived from the raw
//! label alone so both sides compute them independently and still agree.

use crate::layout::Variant;
use crate::pipeline::PipelineId;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::debug;

/// Replaces every character that is unsafe in a file name.
pub const SUBSTITUTE: char = '_';

/// Longest key kept, in bytes. LLVM clips long graph file names too.
pub const MAX_KEY_LEN: usize = 140;

/// Identity of an IR file from its stem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrStem {
    pub test_name: String,
    pub variant: Variant,
}

impl IrStem {
    /// `test_foo_full` is the `full` variant of `test_foo`; a stem whose last
    /// underscore token is not a pipeline id is an original.
    pub fn parse(stem: &str) -> Self {
        if let Some((base, token)) = stem.rsplit_once('_') {
            if let Some(p) = PipelineId::from_token(token) {
                if !base.is_empty() {
                    return Self {
                        test_name: base.to_string(),
                        variant: Variant::Transformed(p),
                    };
                }
            }
        }
        Self {
            test_name: stem.to_string(),
            variant: Variant::Original,
        }
    }

    /// Like [`IrStem::parse`], but a stem that is itself a known test name
    /// is always the original (`test_fake.c` must not read as `test` + `fake`).
    pub fn resolve(stem: &str, known_tests: &BTreeSet<String>) -> Self {
        if known_tests.contains(stem) {
            return Self {
                test_name: stem.to_string(),
                variant: Variant::Original,
            };
        }
        Self::parse(stem)
    }
}

/// The raw function label from an extractor file name such as `.main.dot`.
pub fn raw_label_from_file_name(file_name: &str) -> Option<String> {
    let stem = file_name.strip_suffix(".dot")?;
    let label = stem.trim_matches('.');
    if label.is_empty() { None } else { Some(label.to_string()) }
}

/// Path separators, characters reserved on common filesystems, whitespace
/// and control characters.
fn is_path_illegal(c: char) -> bool {
    matches!(c, '/' | '\\' | '<' | '>' | ':' | '"' | '|' | '?' | '*') || c.is_whitespace() || c.is_control()
}

/// Sanitizes a raw function label into a key that is safe as a file name.
pub fn canonical_key(raw: &str) -> String {
    let mut key = String::with_capacity(raw.len());
    for c in raw.trim_matches('.').chars() {
        let c = if is_path_illegal(c) { SUBSTITUTE } else { c };
        if key.len() + c.len_utf8() > MAX_KEY_LEN {
            break;
        }
        key.push(c);
    }
    if key.is_empty() {
        key.push(SUBSTITUTE);
    }
    key
}

/// Cosmetic label for a key: a substitute standing between two
/// alphanumerics shows as a space. Lossy; never use it as a key.
pub fn display_label(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    let mut res = String::with_capacity(key.len());
    for (i, &c) in chars.iter().enumerate() {
        let between = i > 0
            && i + 1 < chars.len()
            && chars[i - 1].is_alphanumeric()
            && chars[i + 1].is_alphanumeric();
        if c == SUBSTITUTE && between {
            res.push(' ');
        } else {
            res.push(c);
        }
    }
    res
}

/// One per-function graph artifact on one side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphArtifact {
    pub test_name: String,
    pub side: Variant,
    pub raw_label: String,
    pub canonical_key: String,
    pub path: PathBuf,
}

/// Key → artifact for one `(test, side)`. Two labels that sanitize to the
/// same key collide; the later insert wins.
#[derive(Debug, Default)]
pub struct CorrelationTable {
    entries: BTreeMap<String, GraphArtifact>,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the artifact that was displaced, if any.
    pub fn insert(&mut self, artifact: GraphArtifact) -> Option<GraphArtifact> {
        let prev = self.entries.insert(artifact.canonical_key.clone(), artifact);
        if let Some(prev) = &prev {
            debug!(key = %prev.canonical_key, displaced = %prev.raw_label, "canonical key collision");
        }
        prev
    }

    pub fn get(&self, key: &str) -> Option<&GraphArtifact> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_artifacts(self) -> impl Iterator<Item = GraphArtifact> {
        self.entries.into_values()
    }
}
