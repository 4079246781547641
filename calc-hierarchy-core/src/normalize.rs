//! Concept label normalization.
//!
//! Calculation linkbases exported by the document converter prefix child
//! labels with their weight, e.g. `(+1) Revenues` or `(-1) CostOfRevenue`.
//! Graph node identity must not depend on that presentation detail, so every
//! endpoint is normalized before the hierarchy is built.

use regex::Regex;
use std::sync::LazyLock;

/// Leading `(+1)` / `(-1)` / `(2)` / `(-0.5)` marker followed by whitespace.
static WEIGHT_MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\(\s*([+-]?\d+(?:\.\d+)?)\s*\)\s+").expect("weight marker regex is valid")
});

/// Strip every leading weight marker and surrounding whitespace.
///
/// Idempotent: `normalize_concept(&normalize_concept(x)) == normalize_concept(x)`.
pub fn normalize_concept(label: &str) -> String {
    strip_markers(label.trim()).to_string()
}

fn strip_markers(mut label: &str) -> &str {
    while let Some(m) = WEIGHT_MARKER_RE.find(label) {
        label = label[m.end()..].trim_start();
    }
    label
}

/// Split a label into the weight carried by its leading marker and the bare
/// name. Only the first marker contributes a weight.
pub fn split_weight_marker(label: &str) -> (Option<f64>, &str) {
    let trimmed = label.trim();
    let weight = WEIGHT_MARKER_RE
        .captures(trimmed)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok());
    (weight, strip_markers(trimmed))
}

/// Reduce a link-role URI to its final path segment.
///
/// `http://www.apple.com/role/CONSOLIDATEDBALANCESHEETS` becomes
/// `CONSOLIDATEDBALANCESHEETS`; a bare name is returned unchanged.
pub fn category_from_role_uri(role: &str) -> &str {
    let role = role.trim().trim_end_matches('/');
    role.rsplit('/').next().unwrap_or(role)
}

/// Label normalizer with optional namespace prefixes (e.g. `us-gaap:`).
///
/// Markers and prefixes are removed until neither matches, so the result is a
/// fixed point regardless of the order they were stacked in.
#[derive(Debug, Clone, Default)]
pub struct ConceptNormalizer {
    strip_prefixes: Vec<String>,
}

impl ConceptNormalizer {
    pub fn new<I, S>(strip_prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            strip_prefixes: strip_prefixes
                .into_iter()
                .map(Into::into)
                .filter(|p: &String| !p.is_empty())
                .collect(),
        }
    }

    pub fn normalize(&self, label: &str) -> String {
        let mut current = strip_markers(label.trim());
        loop {
            let mut changed = false;
            for prefix in &self.strip_prefixes {
                if let Some(rest) = current.strip_prefix(prefix.as_str()) {
                    current = rest.trim_start();
                    changed = true;
                }
            }
            let stripped = strip_markers(current);
            if stripped.len() != current.len() {
                current = stripped;
                changed = true;
            }
            if !changed {
                return current.to_string();
            }
        }
    }
}
