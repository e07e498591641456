//! Keyword lexicon for deterministic capability signals.
//!
//! Prose and kind names match on token boundaries: a term must equal a run of
//! consecutive CamelCase tokens of one word, optionally inflected (`streams`,
//! `monitoring`), so `upstream` never yields `stream`. API-group labels are
//! compound product names without boundaries; there terms longer than four
//! characters may appear anywhere inside the label, so `dbforpostgresql`
//! matches `postgres`.

use crate::types::Capability;
use crate::types::Capability::*;
use std::collections::BTreeSet;

/// Term → capabilities it implies
const CAPABILITY_TERMS: &[(&str, &[Capability])] = &[
    // Data stores
    ("postgres", &[Postgresql, Database]),
    ("postgresql", &[Postgresql, Database]),
    ("mysql", &[Mysql, Database]),
    ("mariadb", &[Mariadb, Database]),
    ("mongo", &[Mongodb, Database]),
    ("mongodb", &[Mongodb, Database]),
    ("cosmosdb", &[Database]),
    ("dynamodb", &[Database]),
    ("database", &[Database]),
    ("rds", &[Database]),
    ("sql", &[Database]),
    ("redis", &[Redis, Cache]),
    ("memcache", &[Cache]),
    ("memcached", &[Cache]),
    ("elasticache", &[Cache]),
    ("cache", &[Cache]),
    ("elasticsearch", &[Search]),
    ("opensearch", &[Search]),
    ("search", &[Search]),
    // Messaging
    ("kafka", &[MessageQueue, Streaming]),
    ("eventhub", &[Streaming]),
    ("kinesis", &[Streaming]),
    ("stream", &[Streaming]),
    ("servicebus", &[MessageQueue]),
    ("rabbitmq", &[MessageQueue]),
    ("pubsub", &[MessageQueue]),
    ("queue", &[MessageQueue]),
    ("sqs", &[MessageQueue]),
    ("sns", &[MessageQueue]),
    ("topic", &[MessageQueue]),
    // Storage
    ("bucket", &[ObjectStorage]),
    ("storageaccount", &[ObjectStorage]),
    ("blob", &[ObjectStorage]),
    ("s3", &[ObjectStorage]),
    ("disk", &[BlockStorage]),
    ("volume", &[BlockStorage]),
    ("ebs", &[BlockStorage]),
    ("fileshare", &[FileStorage]),
    ("filesystem", &[FileStorage]),
    ("efs", &[FileStorage]),
    ("nfs", &[FileStorage]),
    ("backup", &[Backup]),
    ("snapshot", &[Backup]),
    // Networking
    ("virtualnetwork", &[Networking]),
    ("network", &[Networking]),
    ("subnet", &[Networking]),
    ("vpc", &[Networking]),
    ("peering", &[Networking]),
    ("loadbalancer", &[LoadBalancing, Networking]),
    ("dns", &[Dns]),
    ("recordset", &[Dns]),
    ("ingress", &[Ingress, Networking]),
    ("firewall", &[Firewall, Networking]),
    ("securitygroup", &[Firewall, Networking]),
    ("networkpolicy", &[Firewall, Networking]),
    ("cdn", &[Cdn]),
    ("frontdoor", &[Cdn]),
    ("cloudfront", &[Cdn]),
    ("apigateway", &[ApiGateway]),
    ("apimanagement", &[ApiGateway]),
    // Security
    ("certificate", &[CertificateManagement]),
    ("keyvault", &[SecretManagement]),
    ("secret", &[SecretManagement]),
    ("kms", &[SecretManagement]),
    ("identity", &[Identity]),
    ("serviceaccount", &[Identity]),
    ("iam", &[Identity, AccessControl]),
    ("rolebinding", &[AccessControl]),
    ("rbac", &[AccessControl]),
    ("role", &[AccessControl]),
    // Observability
    ("monitor", &[Monitoring]),
    ("prometheus", &[Monitoring]),
    ("alert", &[Monitoring]),
    ("metric", &[Monitoring]),
    ("logging", &[Logging]),
    ("loganalytics", &[Logging]),
    ("cloudwatch", &[Logging, Monitoring]),
    ("logs", &[Logging]),
    // Compute
    ("virtualmachine", &[VirtualMachine, Compute]),
    ("instance", &[Compute]),
    ("compute", &[Compute]),
    ("ec2", &[VirtualMachine, Compute]),
    ("vm", &[VirtualMachine, Compute]),
    ("container", &[Container]),
    ("deployment", &[Container]),
    ("statefulset", &[Container]),
    ("function", &[Serverless]),
    ("lambda", &[Serverless]),
    ("serverless", &[Serverless]),
    ("kubernetes", &[KubernetesCluster]),
    ("aks", &[KubernetesCluster]),
    ("eks", &[KubernetesCluster]),
    ("gke", &[KubernetesCluster]),
    ("autoscal", &[Autoscaling]),
    ("scaling", &[Autoscaling]),
    ("hpa", &[Autoscaling]),
    // Qualities
    ("highavailability", &[HighAvailability]),
    ("georedundant", &[HighAvailability, Backup]),
    ("zoneredundant", &[HighAvailability]),
    ("replica", &[HighAvailability]),
    ("failover", &[HighAvailability]),
    ("multicloud", &[MultiCloud]),
    ("resourcegroup", &[ResourceGrouping]),
];

/// Field-name terms. Narrower than [`CAPABILITY_TERMS`]: most field names
/// describe plumbing (`passwordSecretRef`, `publicNetworkAccess`), not what the
/// resource is for, so only quality-of-service knobs count.
const FIELD_TERMS: &[(&str, &[Capability])] = &[
    ("backupretention", &[Backup]),
    ("backupenabled", &[Backup]),
    ("georedundant", &[HighAvailability, Backup]),
    ("highavailability", &[HighAvailability]),
    ("zoneredundant", &[HighAvailability]),
    ("failover", &[HighAvailability]),
    ("autoscal", &[Autoscaling]),
    ("minreplicas", &[Autoscaling]),
    ("maxreplicas", &[Autoscaling]),
];

/// Field-path patterns → abstraction tags.
///
/// Format: (path segment, tag). The segment matches any whole segment of the
/// dotted field path.
const ABSTRACTION_FIELDS: &[(&str, &str)] = &[
    ("forProvider", "crossplane-managed"),
    ("providerConfigRef", "crossplane-managed"),
    ("compositionRef", "composite"),
    ("compositionSelector", "composite"),
    ("compositionRevisionRef", "composite"),
    ("resourceRefs", "composite"),
    ("writeConnectionSecretToRef", "connection-secret"),
    ("publishConnectionDetailsTo", "connection-secret"),
    ("containers", "pod-template"),
    ("scaleTargetRef", "scaling-policy"),
    ("chart", "helm-release"),
];

/// CamelCase tokens of each word of `text`
fn words(text: &str) -> Vec<Vec<String>> {
    text.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(camel_tokens)
        .collect()
}

/// `resourceGroupNameRef` → `["resource", "group", "name", "ref"]`
pub fn camel_tokens(word: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let chars: Vec<char> = word.chars().collect();
    for (i, &c) in chars.iter().enumerate() {
        let boundary = c.is_ascii_uppercase()
            && !current.is_empty()
            && (chars[i - 1].is_ascii_lowercase()
                || chars.get(i + 1).is_some_and(|n| n.is_ascii_lowercase()));
        if boundary {
            tokens.push(std::mem::take(&mut current));
        }
        current.push(c.to_ascii_lowercase());
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Endings a term may carry in prose and still match
const INFLECTIONS: &[&str] = &["s", "es", "ing", "er", "ed"];

/// `term` equals a run of consecutive tokens, possibly inflected
fn term_matches(term: &str, tokens: &[String]) -> bool {
    for start in 0..tokens.len() {
        let mut run = String::new();
        for token in &tokens[start..] {
            run.push_str(token);
            if run == term {
                return true;
            }
            if term.len() > 4
                && let Some(ending) = run.strip_prefix(term)
                && INFLECTIONS.contains(&ending)
            {
                return true;
            }
            if run.len() >= term.len() + 3 {
                break;
            }
        }
    }
    false
}

/// Whether `term` names something inside the API-group `label`
fn label_matches(term: &str, label: &str) -> bool {
    if term.len() <= 4 {
        label == term
    } else {
        label.contains(term)
    }
}

fn collect_terms(matches: impl Fn(&str) -> bool) -> (BTreeSet<Capability>, Vec<&'static str>) {
    let mut caps = BTreeSet::new();
    let mut matched = Vec::new();
    for (term, implied) in CAPABILITY_TERMS {
        if matches(term) {
            caps.extend(implied.iter().copied());
            matched.push(*term);
        }
    }
    (caps, matched)
}

/// Capabilities named in prose or an identifier, with the terms that matched
pub fn capabilities_in(text: &str) -> (BTreeSet<Capability>, Vec<&'static str>) {
    let words = words(text);
    collect_terms(|term| words.iter().any(|tokens| term_matches(term, tokens)))
}

/// Capabilities named inside API-group labels (`dbforpostgresql`, `s3`)
pub fn capabilities_in_labels<'a>(
    labels: impl IntoIterator<Item = &'a str>,
) -> (BTreeSet<Capability>, Vec<&'static str>) {
    let labels: Vec<String> = labels.into_iter().map(str::to_ascii_lowercase).collect();
    collect_terms(|term| labels.iter().any(|label| label_matches(term, label)))
}

/// Capabilities implied by a single field name
pub fn capabilities_for_field(name: &str) -> BTreeSet<Capability> {
    let lower = name.to_ascii_lowercase();
    FIELD_TERMS
        .iter()
        .filter(|(term, _)| lower.contains(term))
        .flat_map(|(_, implied)| implied.iter().copied())
        .collect()
}

/// Abstraction tags implied by a dotted field path
pub fn abstractions_for_path(path: &str) -> impl Iterator<Item = &'static str> + '_ {
    ABSTRACTION_FIELDS
        .iter()
        .filter(move |(segment, _)| path.split('.').any(|s| s == *segment))
        .map(|(_, tag)| *tag)
}
