//! Runner configuration.
//!
//! Reads config from env vars (all optional):
//!   CALC_HIERARCHY_CONCURRENCY     — scopes processed in parallel (default: 4)
//!   CALC_HIERARCHY_LEVEL_POLICY    — `last_root_wins` (default) or `minimum_depth`
//!   CALC_HIERARCHY_STRIP_PREFIXES  — comma-separated namespace prefixes, e.g. `us-gaap:`
//!   CALC_HIERARCHY_GROUPS          — comma-separated groups to restrict the run to

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::annotate::ScopeAnnotator;
use crate::leveling::LevelPolicy;
use crate::normalize::ConceptNormalizer;
use crate::types::GroupKey;

pub const DEFAULT_CONCURRENCY: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Upper bound on scopes in flight at once. `1` reproduces sequential
    /// processing.
    pub max_concurrency: usize,
    pub level_policy: LevelPolicy,
    pub strip_prefixes: Vec<String>,
    /// Restrict the run to these groups; empty means every group.
    pub groups: Vec<GroupKey>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_CONCURRENCY,
            level_policy: LevelPolicy::default(),
            strip_prefixes: Vec::new(),
            groups: Vec::new(),
        }
    }
}

impl RunnerConfig {
    /// Build from process environment, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (testable without touching the
    /// process environment).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(v) = lookup("CALC_HIERARCHY_CONCURRENCY") {
            let n: usize = v
                .trim()
                .parse()
                .with_context(|| format!("CALC_HIERARCHY_CONCURRENCY: not a number: {}", v))?;
            config.max_concurrency = n.max(1);
        }
        if let Some(v) = lookup("CALC_HIERARCHY_LEVEL_POLICY") {
            config.level_policy = v
                .parse()
                .map_err(|e| anyhow!("CALC_HIERARCHY_LEVEL_POLICY: {}", e))?;
        }
        if let Some(v) = lookup("CALC_HIERARCHY_STRIP_PREFIXES") {
            config.strip_prefixes = split_list(&v);
        }
        if let Some(v) = lookup("CALC_HIERARCHY_GROUPS") {
            config.groups = split_list(&v).into_iter().map(GroupKey).collect();
        }

        Ok(config)
    }

    pub fn annotator(&self) -> ScopeAnnotator {
        ScopeAnnotator::new(
            ConceptNormalizer::new(self.strip_prefixes.iter().cloned()),
            self.level_policy,
        )
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_env() {
        let config = RunnerConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, RunnerConfig::default());
        assert_eq!(config.max_concurrency, DEFAULT_CONCURRENCY);
        assert_eq!(config.level_policy, LevelPolicy::LastRootWins);
    }

    #[test]
    fn test_reads_all_keys() {
        let config = RunnerConfig::from_lookup(lookup(&[
            ("CALC_HIERARCHY_CONCURRENCY", "8"),
            ("CALC_HIERARCHY_LEVEL_POLICY", "minimum_depth"),
            ("CALC_HIERARCHY_STRIP_PREFIXES", "us-gaap:, ifrs-full: ,"),
            ("CALC_HIERARCHY_GROUPS", "cal_1,cal_2"),
        ]))
        .unwrap();
        assert_eq!(config.max_concurrency, 8);
        assert_eq!(config.level_policy, LevelPolicy::MinimumDepth);
        assert_eq!(config.strip_prefixes, vec!["us-gaap:", "ifrs-full:"]);
        assert_eq!(config.groups, vec![GroupKey::new("cal_1"), GroupKey::new("cal_2")]);
    }

    #[test]
    fn test_zero_concurrency_clamped() {
        let config =
            RunnerConfig::from_lookup(lookup(&[("CALC_HIERARCHY_CONCURRENCY", "0")])).unwrap();
        assert_eq!(config.max_concurrency, 1);
    }

    #[test]
    fn test_bad_values_rejected() {
        let err = RunnerConfig::from_lookup(lookup(&[("CALC_HIERARCHY_CONCURRENCY", "many")]))
            .unwrap_err();
        assert!(err.to_string().contains("CALC_HIERARCHY_CONCURRENCY"));
        // The parse failure stays reachable as the source.
        assert!(err.chain().count() > 1);

        let err = RunnerConfig::from_lookup(lookup(&[("CALC_HIERARCHY_LEVEL_POLICY", "deepest")]))
            .unwrap_err();
        assert!(err.to_string().contains("deepest"));
    }

    #[test]
    fn test_deserializes_partial_json() {
        let config: RunnerConfig =
            serde_json::from_str(r#"{"level_policy": "minimum_depth"}"#).unwrap();
        assert_eq!(config.level_policy, LevelPolicy::MinimumDepth);
        assert_eq!(config.max_concurrency, DEFAULT_CONCURRENCY);
    }
}
