//! Pipeline configuration: defaults, environment overrides, and JSON.

use serde::{Deserialize, Serialize};

use crate::errors::{GraphError, GraphResult};

pub const DEFAULT_PLUGIN_ID: &str = "package-metrics";
pub const DEFAULT_DAMPING: f64 = 0.85;
pub const DEFAULT_TOLERANCE: f64 = 1e-7;
pub const DEFAULT_MAX_ITERATIONS: usize = 20;
pub const DEFAULT_WORKERS: usize = 4;

/// Tuning for the default importance strategy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageRankConfig {
    pub damping: f64,
    pub tolerance: f64,
    pub max_iterations: usize,
}

impl Default for PageRankConfig {
    fn default() -> Self {
        Self {
            damping: DEFAULT_DAMPING,
            tolerance: DEFAULT_TOLERANCE,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Origin tag written on every node and edge the pipeline creates.
    pub plugin_id: String,
    pub pagerank: PageRankConfig,
    /// Materialise missing ancestor packages (`com` for `com.a.b`).
    pub synthesize_ancestor_packages: bool,
    /// Worker threads for per-entity parsing and line counting.
    pub workers: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            plugin_id: DEFAULT_PLUGIN_ID.to_string(),
            pagerank: PageRankConfig::default(),
            synthesize_ancestor_packages: false,
            workers: DEFAULT_WORKERS,
        }
    }
}

fn parse_flag(key: &str, raw: &str) -> GraphResult<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(GraphError::Config(format!("{key}: expected a boolean, got {other:?}"))),
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, raw: &str) -> GraphResult<T> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| GraphError::Config(format!("{key}: cannot parse {raw:?}")))
}

impl PipelineConfig {
    /// Defaults overlaid with `PKGRAPH_*` environment variables.
    pub fn from_env() -> GraphResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values produced by `lookup`.
    pub fn from_lookup<F>(lookup: F) -> GraphResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(v) = lookup("PKGRAPH_PLUGIN_ID") {
            config.plugin_id = v.trim().to_string();
        }
        if let Some(v) = lookup("PKGRAPH_PAGERANK_DAMPING") {
            config.pagerank.damping = parse_value("PKGRAPH_PAGERANK_DAMPING", &v)?;
        }
        if let Some(v) = lookup("PKGRAPH_PAGERANK_TOLERANCE") {
            config.pagerank.tolerance = parse_value("PKGRAPH_PAGERANK_TOLERANCE", &v)?;
        }
        if let Some(v) = lookup("PKGRAPH_PAGERANK_MAX_ITERATIONS") {
            config.pagerank.max_iterations = parse_value("PKGRAPH_PAGERANK_MAX_ITERATIONS", &v)?;
        }
        if let Some(v) = lookup("PKGRAPH_SYNTHESIZE_ANCESTORS") {
            config.synthesize_ancestor_packages = parse_flag("PKGRAPH_SYNTHESIZE_ANCESTORS", &v)?;
        }
        if let Some(v) = lookup("PKGRAPH_WORKERS") {
            config.workers = parse_value("PKGRAPH_WORKERS", &v)?;
        }
        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON document; missing fields take their defaults.
    pub fn from_json(raw: &str) -> GraphResult<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> GraphResult<()> {
        if self.plugin_id.is_empty() {
            return Err(GraphError::Config("plugin_id must not be empty".to_string()));
        }
        let damping = self.pagerank.damping;
        if !(damping > 0.0 && damping < 1.0) {
            return Err(GraphError::Config(format!(
                "pagerank.damping must be in (0, 1), got {damping}"
            )));
        }
        if self.pagerank.tolerance <= 0.0 || self.pagerank.tolerance.is_nan() {
            return Err(GraphError::Config(format!(
                "pagerank.tolerance must be positive, got {}",
                self.pagerank.tolerance
            )));
        }
        if self.pagerank.max_iterations == 0 {
            return Err(GraphError::Config(
                "pagerank.max_iterations must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Worker count clamped to at least one thread.
    pub fn effective_workers(&self) -> usize {
        self.workers.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.plugin_id, DEFAULT_PLUGIN_ID);
        assert!(!config.synthesize_ancestor_packages);
    }

    #[test]
    fn env_overrides_apply() {
        let config = PipelineConfig::from_lookup(lookup_from(&[
            ("PKGRAPH_PLUGIN_ID", "custom"),
            ("PKGRAPH_PAGERANK_DAMPING", "0.9"),
            ("PKGRAPH_SYNTHESIZE_ANCESTORS", "yes"),
            ("PKGRAPH_WORKERS", "0"),
        ]))
        .unwrap();
        assert_eq!(config.plugin_id, "custom");
        assert_eq!(config.pagerank.damping, 0.9);
        assert!(config.synthesize_ancestor_packages);
        assert_eq!(config.effective_workers(), 1);
    }

    #[test]
    fn unparseable_env_value_is_config_error() {
        let err = PipelineConfig::from_lookup(lookup_from(&[("PKGRAPH_WORKERS", "many")]))
            .unwrap_err();
        assert!(matches!(err, GraphError::Config(_)));
    }

    #[test]
    fn json_fills_missing_fields() {
        let config = PipelineConfig::from_json(r#"{"pagerank": {"max_iterations": 50}}"#).unwrap();
        assert_eq!(config.pagerank.max_iterations, 50);
        assert_eq!(config.pagerank.damping, DEFAULT_DAMPING);
        assert_eq!(config.plugin_id, DEFAULT_PLUGIN_ID);
    }

    #[test]
    fn out_of_range_damping_rejected() {
        let err = PipelineConfig::from_json(r#"{"pagerank": {"damping": 1.5}}"#).unwrap_err();
        assert!(matches!(err, GraphError::Config(_)));
    }
}
