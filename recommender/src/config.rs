//! Recommender configuration loading
//!
//! Loads configuration from `~/.config/kindscout/recommender.toml` (or the
//! `KINDSCOUT_CONFIG` env var). Every field has a default, so an empty file
//! and a missing file behave the same.

use crate::errors::{RecommendError, Result};
use crate::types::ComplexityTier;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration for the recommendation engine
#[derive(Debug, Deserialize, Clone, Default)]
pub struct RecommenderConfig {
    /// Offline scan worker pool
    #[serde(default)]
    pub scan: ScanConfig,

    /// Capability inference
    #[serde(default)]
    pub capability: CapabilityConfig,

    /// Dependency inference
    #[serde(default)]
    pub dependency: DependencyConfig,

    /// Semantic retrieval
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Dependency resolution
    #[serde(default)]
    pub resolver: ResolverConfig,

    /// Solution ranking constants
    #[serde(default)]
    pub ranking: RankingConfig,

    /// Built-in embedder
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Persisted stores
    #[serde(default)]
    pub store: StoreConfig,
}

// ─────────────────────────────────────────────────────────────────────────────
// Scan
// ─────────────────────────────────────────────────────────────────────────────

/// Offline scan configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ScanConfig {
    /// Maximum resource types analyzed concurrently
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Per-call timeout for AI inference, in milliseconds
    #[serde(default = "default_ai_timeout_ms")]
    pub ai_timeout_ms: u64,

    /// Per-call timeout for schema fetches, in milliseconds
    #[serde(default = "default_schema_timeout_ms")]
    pub schema_timeout_ms: u64,
}

fn default_concurrency() -> usize {
    8
}
fn default_ai_timeout_ms() -> u64 {
    30_000
}
fn default_schema_timeout_ms() -> u64 {
    15_000
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            ai_timeout_ms: default_ai_timeout_ms(),
            schema_timeout_ms: default_schema_timeout_ms(),
        }
    }
}

impl ScanConfig {
    pub fn ai_timeout(&self) -> Duration {
        Duration::from_millis(self.ai_timeout_ms)
    }

    pub fn schema_timeout(&self) -> Duration {
        Duration::from_millis(self.schema_timeout_ms)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Capability inference
// ─────────────────────────────────────────────────────────────────────────────

/// Capability inference configuration
#[derive(Debug, Deserialize, Clone)]
pub struct CapabilityConfig {
    /// Whether the AI collaborator is consulted at all
    #[serde(default = "default_ai_enabled")]
    pub ai_enabled: bool,

    /// Required-without-default field count at or below which the tier is `low`
    #[serde(default = "default_tier_low_max")]
    pub tier_low_max: usize,

    /// Required-without-default field count at or below which the tier is `medium`
    #[serde(default = "default_tier_medium_max")]
    pub tier_medium_max: usize,

    /// Largest tier distance at which the AI tier is still trusted
    #[serde(default = "default_max_tier_disagreement")]
    pub max_tier_disagreement: u8,

    /// Characters of schema text included in the AI prompt
    #[serde(default = "default_schema_excerpt_chars")]
    pub schema_excerpt_chars: usize,
}

fn default_ai_enabled() -> bool {
    true
}
fn default_tier_low_max() -> usize {
    2
}
fn default_tier_medium_max() -> usize {
    6
}
fn default_max_tier_disagreement() -> u8 {
    1
}
fn default_schema_excerpt_chars() -> usize {
    4_000
}

impl Default for CapabilityConfig {
    fn default() -> Self {
        Self {
            ai_enabled: default_ai_enabled(),
            tier_low_max: default_tier_low_max(),
            tier_medium_max: default_tier_medium_max(),
            max_tier_disagreement: default_max_tier_disagreement(),
            schema_excerpt_chars: default_schema_excerpt_chars(),
        }
    }
}

impl CapabilityConfig {
    /// Rule tier for a count of required fields lacking defaults
    pub fn tier_for(&self, required_without_default: usize) -> ComplexityTier {
        if required_without_default <= self.tier_low_max {
            ComplexityTier::Low
        } else if required_without_default <= self.tier_medium_max {
            ComplexityTier::Medium
        } else {
            ComplexityTier::High
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Dependency inference
// ─────────────────────────────────────────────────────────────────────────────

/// Confidence floor every schema-derived edge must meet
pub const SCHEMA_EDGE_CONFIDENCE_FLOOR: f64 = 0.85;

/// Ceiling for provider-heuristic edges
pub const PROVIDER_EDGE_CONFIDENCE_CEILING: f64 = 0.8;

/// Dependency inference configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DependencyConfig {
    /// Confidence for a reference field resolved to exactly one known type
    #[serde(default = "default_explicit_confidence")]
    pub explicit_confidence: f64,

    /// Confidence for fixed well-known targets (Secret, ConfigMap, ...)
    #[serde(default = "default_well_known_confidence")]
    pub well_known_confidence: f64,

    /// Confidence for each edge of an ambiguous reference
    #[serde(default = "default_ambiguous_confidence")]
    pub ambiguous_confidence: f64,

    /// Whether provider-group types get an edge to the foundational resource
    #[serde(default = "default_provider_heuristic_enabled")]
    pub provider_heuristic_enabled: bool,

    /// Confidence for provider-heuristic edges
    #[serde(default = "default_provider_heuristic_confidence")]
    pub provider_heuristic_confidence: f64,
}

fn default_explicit_confidence() -> f64 {
    0.95
}
fn default_well_known_confidence() -> f64 {
    0.90
}
fn default_ambiguous_confidence() -> f64 {
    0.85
}
fn default_provider_heuristic_enabled() -> bool {
    true
}
fn default_provider_heuristic_confidence() -> f64 {
    0.80
}

impl Default for DependencyConfig {
    fn default() -> Self {
        Self {
            explicit_confidence: default_explicit_confidence(),
            well_known_confidence: default_well_known_confidence(),
            ambiguous_confidence: default_ambiguous_confidence(),
            provider_heuristic_enabled: default_provider_heuristic_enabled(),
            provider_heuristic_confidence: default_provider_heuristic_confidence(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Retrieval, resolver, ranking
// ─────────────────────────────────────────────────────────────────────────────

/// Semantic retrieval configuration
#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Hits below this similarity are dropped
    #[serde(default)]
    pub min_similarity: f64,

    /// Hard cap on `top_k` accepted from callers
    #[serde(default = "default_max_top_k")]
    pub max_top_k: usize,
}

fn default_max_top_k() -> usize {
    50
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            min_similarity: 0.0,
            max_top_k: default_max_top_k(),
        }
    }
}

/// Dependency resolver configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ResolverConfig {
    /// Maximum depth of the required-edge traversal
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

fn default_max_depth() -> usize {
    5
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
        }
    }
}

/// Solution ranking constants
#[derive(Debug, Deserialize, Clone)]
pub struct RankingConfig {
    /// Subtracted once per unsatisfiable required dependency
    #[serde(default = "default_unsatisfiable_penalty")]
    pub unsatisfiable_penalty: f64,

    /// Added when nothing is unsatisfiable
    #[serde(default = "default_completeness_bonus")]
    pub completeness_bonus: f64,

    /// Bound on the absolute pattern adjustment
    #[serde(default = "default_max_adjust")]
    pub max_adjust: f64,
}

fn default_unsatisfiable_penalty() -> f64 {
    0.30
}
fn default_completeness_bonus() -> f64 {
    0.10
}
fn default_max_adjust() -> f64 {
    0.05
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            unsatisfiable_penalty: default_unsatisfiable_penalty(),
            completeness_bonus: default_completeness_bonus(),
            max_adjust: default_max_adjust(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Embedding and storage
// ─────────────────────────────────────────────────────────────────────────────

/// Built-in hashing embedder configuration
#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// Vector dimensionality
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
}

fn default_dimensions() -> usize {
    256
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            dimensions: default_dimensions(),
        }
    }
}

/// Persisted store configuration
#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// Path to the SQLite relationship database
    #[serde(default = "default_relationship_db_path")]
    pub relationship_db_path: String,
}

fn default_relationship_db_path() -> String {
    dirs::home_dir()
        .map(|h| {
            h.join(".config")
                .join("kindscout")
                .join("relationships.db")
                .to_string_lossy()
                .into_owned()
        })
        .unwrap_or_else(|| "relationships.db".to_string())
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            relationship_db_path: default_relationship_db_path(),
        }
    }
}

impl StoreConfig {
    /// Resolved database path (expanding `~/`)
    pub fn resolved_db_path(&self) -> PathBuf {
        let path = &self.relationship_db_path;
        if let Some(stripped) = path.strip_prefix("~/")
            && let Some(home) = dirs::home_dir()
        {
            return home.join(stripped);
        }
        PathBuf::from(path)
    }
}

impl RecommenderConfig {
    /// Environment variable for config path override
    pub const ENV_CONFIG_PATH: &'static str = "KINDSCOUT_CONFIG";

    /// Default config filename
    pub const DEFAULT_CONFIG_FILENAME: &'static str = "recommender.toml";

    /// Load configuration from file
    ///
    /// Resolution order:
    /// 1. `KINDSCOUT_CONFIG` environment variable
    /// 2. `~/.config/kindscout/recommender.toml`
    ///
    /// If the config file doesn't exist, returns default configuration.
    pub fn load() -> Result<Self> {
        let path = Self::resolve_config_path();

        if !path.exists() {
            tracing::info!(
                path = %path.display(),
                "recommender config not found, using defaults"
            );
            return Ok(Self::default());
        }

        Self::load_from_path(&path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            RecommendError::config_with_source(
                format!("failed to read config at {}", path.display()),
                e,
            )
        })?;

        Self::parse(&contents)
    }

    /// Parse configuration from TOML string
    pub fn parse(contents: &str) -> Result<Self> {
        let cfg: RecommenderConfig = toml::from_str(contents)
            .map_err(|e| RecommendError::config_with_source("failed to parse config", e))?;

        cfg.validate()?;
        Ok(cfg)
    }

    fn resolve_config_path() -> PathBuf {
        if let Ok(path) = std::env::var(Self::ENV_CONFIG_PATH) {
            return PathBuf::from(path);
        }

        dirs::home_dir()
            .map(|h| {
                h.join(".config")
                    .join("kindscout")
                    .join(Self::DEFAULT_CONFIG_FILENAME)
            })
            .unwrap_or_else(|| PathBuf::from(Self::DEFAULT_CONFIG_FILENAME))
    }

    /// Validate configuration
    ///
    /// Hard errors for values that would break ranking or edge-confidence
    /// guarantees; warnings for values that are merely unusual.
    pub fn validate(&self) -> Result<()> {
        if self.scan.concurrency == 0 {
            return Err(RecommendError::config("scan.concurrency must be at least 1"));
        }

        if self.capability.tier_low_max > self.capability.tier_medium_max {
            return Err(RecommendError::config(format!(
                "capability.tier_low_max ({}) exceeds tier_medium_max ({})",
                self.capability.tier_low_max, self.capability.tier_medium_max
            )));
        }

        let dep = &self.dependency;
        for (name, value) in [
            ("explicit_confidence", dep.explicit_confidence),
            ("well_known_confidence", dep.well_known_confidence),
            ("ambiguous_confidence", dep.ambiguous_confidence),
            ("provider_heuristic_confidence", dep.provider_heuristic_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(RecommendError::config(format!(
                    "dependency.{name} must be within [0, 1], got {value}"
                )));
            }
        }
        for (name, value) in [
            ("explicit_confidence", dep.explicit_confidence),
            ("well_known_confidence", dep.well_known_confidence),
            ("ambiguous_confidence", dep.ambiguous_confidence),
        ] {
            if value < SCHEMA_EDGE_CONFIDENCE_FLOOR {
                return Err(RecommendError::config(format!(
                    "dependency.{name} ({value}) is below the schema-edge floor \
                     {SCHEMA_EDGE_CONFIDENCE_FLOOR}"
                )));
            }
        }
        if dep.provider_heuristic_confidence > PROVIDER_EDGE_CONFIDENCE_CEILING {
            return Err(RecommendError::config(format!(
                "dependency.provider_heuristic_confidence ({}) exceeds \
                 {PROVIDER_EDGE_CONFIDENCE_CEILING}",
                dep.provider_heuristic_confidence
            )));
        }

        let rank = &self.ranking;
        for (name, value) in [
            ("unsatisfiable_penalty", rank.unsatisfiable_penalty),
            ("completeness_bonus", rank.completeness_bonus),
            ("max_adjust", rank.max_adjust),
        ] {
            if !value.is_finite() {
                return Err(RecommendError::config(format!(
                    "ranking.{name} must be a finite number, got {value}"
                )));
            }
        }
        if rank.unsatisfiable_penalty <= 0.0
            || rank.completeness_bonus < 0.0
            || rank.max_adjust < 0.0
        {
            return Err(RecommendError::config(
                "ranking constants must be non-negative and the penalty positive",
            ));
        }
        // Two candidates can differ by at most 2 * max_adjust through patterns;
        // completeness must still win.
        if 2.0 * rank.max_adjust >= rank.unsatisfiable_penalty + rank.completeness_bonus {
            return Err(RecommendError::config(format!(
                "ranking.max_adjust ({}) lets pattern adjustments invert completeness \
                 (penalty {} + bonus {})",
                rank.max_adjust, rank.unsatisfiable_penalty, rank.completeness_bonus
            )));
        }
        if rank.unsatisfiable_penalty + rank.completeness_bonus < 0.1 {
            tracing::warn!(
                penalty = rank.unsatisfiable_penalty,
                bonus = rank.completeness_bonus,
                "completeness margin is small; similarity gaps may outrank incomplete candidates"
            );
        }

        if self.resolver.max_depth == 0 {
            tracing::warn!("resolver.max_depth is 0; no required dependencies will be resolved");
        }

        if !(0.0..=1.0).contains(&self.retrieval.min_similarity) {
            return Err(RecommendError::config(format!(
                "retrieval.min_similarity must be within [0, 1], got {}",
                self.retrieval.min_similarity
            )));
        }

        if self.embedding.dimensions == 0 {
            return Err(RecommendError::config("embedding.dimensions must be at least 1"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = RecommenderConfig::default();
        assert_eq!(cfg.scan.concurrency, 8);
        assert_eq!(cfg.resolver.max_depth, 5);
        assert_eq!(cfg.ranking.unsatisfiable_penalty, 0.30);
        assert_eq!(cfg.ranking.max_adjust, 0.05);
        assert_eq!(cfg.embedding.dimensions, 256);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_parse_empty_config_uses_defaults() {
        let cfg = RecommenderConfig::parse("").expect("should parse");
        assert_eq!(cfg.dependency.explicit_confidence, 0.95);
        assert_eq!(cfg.capability.tier_medium_max, 6);
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            [scan]
            concurrency = 4
            ai_timeout_ms = 5000

            [capability]
            ai_enabled = false
            tier_low_max = 1
            tier_medium_max = 4

            [dependency]
            explicit_confidence = 0.9
            provider_heuristic_confidence = 0.7

            [retrieval]
            min_similarity = 0.2

            [resolver]
            max_depth = 3

            [ranking]
            unsatisfiable_penalty = 0.5
            completeness_bonus = 0.05
            max_adjust = 0.1

            [embedding]
            dimensions = 64

            [store]
            relationship_db_path = "/tmp/edges.db"
        "#;

        let cfg = RecommenderConfig::parse(toml).expect("should parse");
        assert_eq!(cfg.scan.concurrency, 4);
        assert_eq!(cfg.scan.ai_timeout(), Duration::from_millis(5000));
        assert!(!cfg.capability.ai_enabled);
        assert_eq!(cfg.dependency.provider_heuristic_confidence, 0.7);
        assert_eq!(cfg.resolver.max_depth, 3);
        assert_eq!(cfg.ranking.max_adjust, 0.1);
        assert_eq!(cfg.store.resolved_db_path(), PathBuf::from("/tmp/edges.db"));
    }

    #[test]
    fn test_rejects_adjustment_that_inverts_completeness() {
        let toml = r#"
            [ranking]
            unsatisfiable_penalty = 0.1
            completeness_bonus = 0.0
            max_adjust = 0.05
        "#;
        let err = RecommenderConfig::parse(toml).unwrap_err();
        assert_eq!(err.category(), crate::errors::ErrorCategory::ConfigError);
        assert!(err.to_string().contains("max_adjust"));
    }

    #[test]
    fn test_rejects_non_finite_ranking_constants() {
        for toml in [
            "[ranking]\nmax_adjust = nan",
            "[ranking]\nunsatisfiable_penalty = inf",
            "[ranking]\ncompleteness_bonus = nan",
        ] {
            let err = RecommenderConfig::parse(toml).unwrap_err();
            assert!(err.to_string().contains("finite"), "accepted: {toml}");
        }
    }

    #[test]
    fn test_rejects_heuristic_confidence_above_ceiling() {
        let toml = r#"
            [dependency]
            provider_heuristic_confidence = 0.9
        "#;
        assert!(RecommenderConfig::parse(toml).is_err());
    }

    #[test]
    fn test_rejects_schema_confidence_below_floor() {
        let toml = r#"
            [dependency]
            ambiguous_confidence = 0.6
        "#;
        assert!(RecommenderConfig::parse(toml).is_err());
    }

    #[test]
    fn test_rejects_invalid_toml() {
        let err = RecommenderConfig::parse("[scan\nconcurrency = ").unwrap_err();
        assert!(err.to_string().contains("failed to parse config"));
    }

    #[test]
    fn test_tier_thresholds() {
        let cfg = CapabilityConfig::default();
        assert_eq!(cfg.tier_for(0), ComplexityTier::Low);
        assert_eq!(cfg.tier_for(2), ComplexityTier::Low);
        assert_eq!(cfg.tier_for(3), ComplexityTier::Medium);
        assert_eq!(cfg.tier_for(6), ComplexityTier::Medium);
        assert_eq!(cfg.tier_for(7), ComplexityTier::High);
    }
}
