//! Capability inference
//!
//! Turns `(resource type, schema text)` into a [`CapabilityRecord`] by merging
//! three signals:
//! - keyword matches in the schema (top-level description, field names)
//! - structural matches in the kind and API-group naming
//! - an optional AI opinion, validated against the vocabulary
//!
//! The AI signal only ever adds tags and adjusts the tier within one level of
//! the rule tier. If the AI call fails or times out, the record is built from
//! the deterministic signals and marked `degraded`.

use crate::ai::{
    AiClient, AiSignals, PromptSignals, build_capability_prompt, capability_response_schema,
    schema_excerpt, validate_capability_response,
};
use crate::config::CapabilityConfig;
use crate::errors::{RecommendError, Result};
use crate::lexicon;
use crate::providers;
use crate::schema::SchemaOutline;
use crate::types::{Capability, CapabilityRecord, ComplexityTier, ResourceTypeRef};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

/// Group labels that carry no meaning about what a type does
const NOISE_LABELS: &[&str] = &["io", "com", "org", "net", "dev", "upbound", "crossplane", "k8s"];

/// Signals derived without the AI collaborator
#[derive(Debug, Clone, PartialEq)]
pub struct DeterministicSignals {
    /// From schema description and field names
    pub keyword: BTreeSet<Capability>,
    /// From kind and API-group naming
    pub structural: BTreeSet<Capability>,
    pub providers: BTreeSet<String>,
    pub abstractions: BTreeSet<String>,
    pub rule_tier: ComplexityTier,
    pub required_without_default: usize,
}

impl DeterministicSignals {
    pub fn capabilities(&self) -> BTreeSet<Capability> {
        self.keyword.union(&self.structural).copied().collect()
    }
}

/// Collect keyword and structural signals for `resource`
pub fn deterministic_signals(
    resource: &ResourceTypeRef,
    outline: &SchemaOutline,
    config: &CapabilityConfig,
) -> DeterministicSignals {
    let (mut keyword, terms) = lexicon::capabilities_in(&outline.description);
    let mut providers = providers::providers_in_group(&resource.group);
    let mut abstractions = BTreeSet::new();

    for field in outline.config_fields() {
        keyword.extend(lexicon::capabilities_for_field(&field.name));
        providers.extend(providers::providers_for_field(&field.name).map(str::to_string));
        abstractions.extend(lexicon::abstractions_for_path(&field.path).map(str::to_string));
    }

    let (mut structural, _) = lexicon::capabilities_in(&resource.kind);
    let (from_labels, _) = lexicon::capabilities_in_labels(
        resource
            .group_labels()
            .filter(|l| !NOISE_LABELS.contains(l)),
    );
    structural.extend(from_labels);
    if providers.len() > 1 {
        structural.insert(Capability::MultiCloud);
    }

    if !terms.is_empty() {
        tracing::debug!(resource = %resource, ?terms, "description keyword matches");
    }

    let required_without_default = outline.required_without_default();
    DeterministicSignals {
        keyword,
        structural,
        providers,
        abstractions,
        rule_tier: config.tier_for(required_without_default),
        required_without_default,
    }
}

/// Pick the AI tier unless it strays too far from the rule tier
pub fn resolve_tier(
    rule: ComplexityTier,
    ai: Option<ComplexityTier>,
    max_disagreement: u8,
) -> ComplexityTier {
    match ai {
        Some(ai) if ai.level().abs_diff(rule.level()) <= max_disagreement => ai,
        _ => rule,
    }
}

/// Use-case sentence built from the merged signals
pub fn derive_use_case(
    resource: &ResourceTypeRef,
    capabilities: &BTreeSet<Capability>,
    providers: &BTreeSet<String>,
) -> String {
    let mut text = if capabilities.is_empty() {
        format!("Deploy a {} resource", resource.kind)
    } else {
        let caps: Vec<&str> = capabilities.iter().map(AsRef::as_ref).collect();
        format!("Provision {} via {}", caps.join(", "), resource.kind)
    };
    if !providers.is_empty() {
        let providers: Vec<&str> = providers.iter().map(String::as_str).collect();
        text.push_str(&format!(" on {}", providers.join(", ")));
    }
    text
}

fn fallback_description(resource: &ResourceTypeRef, outline: &SchemaOutline) -> String {
    if !outline.description.is_empty() {
        return outline.description.clone();
    }
    let group = if resource.is_core() { "core" } else { resource.group.as_str() };
    format!("{} resource in API group {group}", resource.kind)
}

/// Result of one capability inference
#[derive(Debug, Clone)]
pub struct CapabilityInference {
    pub record: CapabilityRecord,
    /// Why the AI signal is missing, if it was requested and failed
    pub ai_error: Option<RecommendError>,
}

/// Capability inference engine
#[derive(Clone)]
pub struct CapabilityInferrer {
    config: CapabilityConfig,
    ai: Option<Arc<dyn AiClient>>,
    ai_timeout: Duration,
}

impl CapabilityInferrer {
    pub fn new(
        config: CapabilityConfig,
        ai: Option<Arc<dyn AiClient>>,
        ai_timeout: Duration,
    ) -> Self {
        Self {
            config,
            ai,
            ai_timeout,
        }
    }

    /// Deterministic-only inferrer
    pub fn without_ai(config: CapabilityConfig) -> Self {
        Self::new(config, None, Duration::ZERO)
    }

    /// Infer a record from raw schema text
    pub async fn infer(
        &self,
        resource: &ResourceTypeRef,
        schema_text: &str,
    ) -> CapabilityInference {
        let outline = SchemaOutline::parse(schema_text);
        self.infer_with_outline(resource, schema_text, &outline).await
    }

    /// Infer a record when the caller already parsed the outline
    pub async fn infer_with_outline(
        &self,
        resource: &ResourceTypeRef,
        schema_text: &str,
        outline: &SchemaOutline,
    ) -> CapabilityInference {
        let signals = deterministic_signals(resource, outline, &self.config);

        let (ai, ai_error) = match self.ask_ai(resource, schema_text, &signals).await {
            Ok(ai) => (ai, None),
            Err(e) => {
                tracing::warn!(
                    resource = %resource,
                    category = %e.category(),
                    error = %e,
                    "AI capability inference unavailable; using deterministic signals"
                );
                (None, Some(e))
            }
        };

        let mut capabilities = signals.capabilities();
        let mut tier = signals.rule_tier;
        let mut description = None;
        let mut use_case = None;
        if let Some(ai) = ai {
            capabilities.extend(ai.capabilities.iter().copied());
            tier = resolve_tier(
                signals.rule_tier,
                ai.complexity_tier,
                self.config.max_tier_disagreement,
            );
            if tier != ai.complexity_tier.unwrap_or(tier) {
                tracing::debug!(
                    resource = %resource,
                    rule = %signals.rule_tier,
                    ai = ?ai.complexity_tier,
                    "AI tier too far from rule tier; keeping rule tier"
                );
            }
            description = ai.description;
            use_case = ai.use_case;
        }

        let description = description.unwrap_or_else(|| fallback_description(resource, outline));
        let use_case = use_case
            .unwrap_or_else(|| derive_use_case(resource, &capabilities, &signals.providers));

        let record = CapabilityRecord {
            resource: resource.clone(),
            capabilities,
            providers: signals.providers,
            abstractions: signals.abstractions,
            complexity_tier: tier,
            description,
            use_case,
            embedding: Vec::new(),
            embedding_model_version: String::new(),
            analyzed_at: chrono::Utc::now(),
            schema_version: crate::compute_hash(schema_text),
            degraded: ai_error.is_some(),
        };

        CapabilityInference { record, ai_error }
    }

    /// Ask the AI collaborator, if configured.
    ///
    /// `Ok(None)` means AI is disabled; errors mean it was wanted and failed.
    async fn ask_ai(
        &self,
        resource: &ResourceTypeRef,
        schema_text: &str,
        signals: &DeterministicSignals,
    ) -> Result<Option<AiSignals>> {
        let Some(client) = self.ai.as_ref().filter(|_| self.config.ai_enabled) else {
            return Ok(None);
        };

        let prompt = build_capability_prompt(
            resource,
            schema_excerpt(schema_text, self.config.schema_excerpt_chars),
            &PromptSignals {
                capabilities: signals.capabilities(),
                providers: signals.providers.clone(),
                abstractions: signals.abstractions.clone(),
                rule_tier: Some(signals.rule_tier),
            },
        );
        let response_schema = capability_response_schema();

        let response = tokio::time::timeout(
            self.ai_timeout,
            client.complete_structured(&prompt, &response_schema),
        )
        .await
        .map_err(|_| {
            RecommendError::ai_failed(format!(
                "no response within {}ms",
                self.ai_timeout.as_millis()
            ))
        })??;

        let ai = validate_capability_response(&response)?;
        if !ai.dropped_tags.is_empty() {
            tracing::debug!(
                resource = %resource,
                dropped = ?ai.dropped_tags,
                "dropped capability tags outside the vocabulary"
            );
        }
        Ok(Some(ai))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{Value, json};

    const SERVER_SCHEMA: &str = r#"{
        "description": "Server is the Schema for the Servers API. Manages a PostgreSQL Server.",
        "properties": {
            "spec": {
                "required": ["forProvider"],
                "properties": {
                    "forProvider": {
                        "required": ["location", "skuName", "administratorLogin"],
                        "properties": {
                            "location": {"type": "string"},
                            "skuName": {"type": "string"},
                            "administratorLogin": {"type": "string"},
                            "resourceGroupName": {"type": "string"},
                            "geoRedundantBackupEnabled": {"type": "boolean"}
                        }
                    },
                    "writeConnectionSecretToRef": {"type": "object"}
                }
            }
        }
    }"#;

    struct FixedAi(Value);

    #[async_trait]
    impl AiClient for FixedAi {
        async fn complete_structured(&self, _prompt: &str, _schema: &Value) -> Result<Value> {
            Ok(self.0.clone())
        }
    }

    struct FailingAi;

    #[async_trait]
    impl AiClient for FailingAi {
        async fn complete_structured(&self, _prompt: &str, _schema: &Value) -> Result<Value> {
            Err(RecommendError::ai_failed("connection refused"))
        }
    }

    struct SlowAi;

    #[async_trait]
    impl AiClient for SlowAi {
        async fn complete_structured(&self, _prompt: &str, _schema: &Value) -> Result<Value> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(json!({}))
        }
    }

    fn server() -> ResourceTypeRef {
        ResourceTypeRef::new("Server", "dbforpostgresql.azure.upbound.io", "v1beta1")
    }

    fn inferrer(ai: Arc<dyn AiClient>) -> CapabilityInferrer {
        CapabilityInferrer::new(CapabilityConfig::default(), Some(ai), Duration::from_secs(5))
    }

    #[test]
    fn test_deterministic_signals() {
        let outline = SchemaOutline::parse(SERVER_SCHEMA);
        let signals = deterministic_signals(&server(), &outline, &CapabilityConfig::default());

        assert!(signals.structural.contains(&Capability::Postgresql));
        assert!(signals.keyword.contains(&Capability::Postgresql));
        assert!(signals.keyword.contains(&Capability::Backup));
        assert_eq!(signals.providers, BTreeSet::from(["azure".to_string()]));
        assert!(signals.abstractions.contains("crossplane-managed"));
        assert!(signals.abstractions.contains("connection-secret"));
        assert_eq!(signals.required_without_default, 3);
        assert_eq!(signals.rule_tier, ComplexityTier::Medium);
    }

    #[test]
    fn test_multi_cloud_from_field_hints() {
        let schema = r#"{"properties": {"spec": {"properties": {
            "resourceGroupName": {"type": "string"},
            "gcpProject": {"type": "string"}
        }}}}"#;
        let outline = SchemaOutline::parse(schema);
        let r = ResourceTypeRef::new("XDatabase", "platform.example.org", "v1alpha1");
        let signals = deterministic_signals(&r, &outline, &CapabilityConfig::default());
        assert_eq!(signals.providers.len(), 2);
        assert!(signals.structural.contains(&Capability::MultiCloud));
    }

    #[test]
    fn test_resolve_tier() {
        use ComplexityTier::*;
        assert_eq!(resolve_tier(Low, Some(Medium), 1), Medium);
        assert_eq!(resolve_tier(Low, Some(High), 1), Low);
        assert_eq!(resolve_tier(High, Some(Low), 1), High);
        assert_eq!(resolve_tier(Medium, None, 1), Medium);
        assert_eq!(resolve_tier(Low, Some(High), 2), High);
    }

    #[tokio::test]
    async fn test_ai_tags_are_merged_and_filtered() {
        let ai = FixedAi(json!({
            "capabilities": ["high-availability", "quantum-storage"],
            "complexityTier": "high",
            "description": "Azure Database for PostgreSQL single server",
            "useCase": "Managed relational database"
        }));
        let out = inferrer(Arc::new(ai)).infer(&server(), SERVER_SCHEMA).await;

        assert!(out.ai_error.is_none());
        let record = out.record;
        assert!(!record.degraded);
        assert!(record.capabilities.contains(&Capability::HighAvailability));
        assert!(record.capabilities.contains(&Capability::Postgresql));
        let vocabulary = Capability::vocabulary();
        assert!(record.capabilities.iter().all(|c| vocabulary.contains(c)));
        // Medium rule tier, AI says high: one level apart, AI wins
        assert_eq!(record.complexity_tier, ComplexityTier::High);
        assert_eq!(record.description, "Azure Database for PostgreSQL single server");
        assert_eq!(record.schema_version, crate::compute_hash(SERVER_SCHEMA));
    }

    #[tokio::test]
    async fn test_ai_failure_degrades_to_deterministic() {
        let out = inferrer(Arc::new(FailingAi)).infer(&server(), SERVER_SCHEMA).await;

        let err = out.ai_error.expect("error recorded");
        assert_eq!(err.category(), crate::errors::ErrorCategory::AiInferenceFailed);
        assert!(out.record.degraded);
        assert!(out.record.capabilities.contains(&Capability::Postgresql));
        assert_eq!(out.record.complexity_tier, ComplexityTier::Medium);
        assert!(out.record.description.starts_with("Server is the Schema"));
        assert!(out.record.use_case.contains("postgresql"));
        assert!(out.record.use_case.ends_with("on azure"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ai_timeout_degrades() {
        let inferrer = CapabilityInferrer::new(
            CapabilityConfig::default(),
            Some(Arc::new(SlowAi)),
            Duration::from_millis(100),
        );
        let out = inferrer.infer(&server(), SERVER_SCHEMA).await;
        let err = out.ai_error.expect("timeout recorded");
        assert!(err.to_string().contains("100ms"));
        assert!(out.record.degraded);
    }

    #[tokio::test]
    async fn test_non_object_response_is_invalid_and_degrades() {
        let out = inferrer(Arc::new(FixedAi(json!("postgresql"))))
            .infer(&server(), SERVER_SCHEMA)
            .await;
        let err = out.ai_error.expect("invalid recorded");
        assert!(err.category().degrades_gracefully());
        assert!(out.record.degraded);
    }

    #[tokio::test]
    async fn test_without_ai_is_not_degraded() {
        let inferrer = CapabilityInferrer::without_ai(CapabilityConfig::default());
        let r = ResourceTypeRef::core("ConfigMap", "v1");
        let out = inferrer.infer(&r, "not a schema").await;
        assert!(out.ai_error.is_none());
        assert!(!out.record.degraded);
        assert_eq!(out.record.description, "ConfigMap resource in API group core");
        assert_eq!(out.record.complexity_tier, ComplexityTier::Low);
    }
}
