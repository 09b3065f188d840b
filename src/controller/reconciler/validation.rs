//! # Validation
//!
//! Validates source specs and duration strings.
//!
//! A failure here is permanent for the current generation: the reconciler
//! marks the returned condition `False` with reason `InvalidSpec` and runs no
//! convergence action until the spec changes.

use crate::crd::{
    CloudAuditLogCondition, CloudAuditLogSpec, CloudPubSubSourceCondition, CloudPubSubSourceSpec,
    Destination, PubSubSpec, ValidationError,
};
use anyhow::Result;
use regex::Regex;
use std::time::Duration;

/// Bounds Pub/Sub accepts for a subscription's ack deadline
const MIN_ACK_DEADLINE: Duration = Duration::from_secs(10);
const MAX_ACK_DEADLINE: Duration = Duration::from_secs(600);

/// Bounds Pub/Sub accepts for message retention
const MIN_RETENTION: Duration = Duration::from_secs(10 * 60);
const MAX_RETENTION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Parse Kubernetes duration string into std::time::Duration
/// Supports formats: "30s", "1m", "5m", "1h", "2h", "1d"
pub fn parse_kubernetes_duration(duration_str: &str) -> Result<Duration> {
    let duration_trimmed = duration_str.trim();

    if duration_trimmed.is_empty() {
        return Err(anyhow::anyhow!("Duration string cannot be empty"));
    }

    let duration_regex = Regex::new(r"^(?P<number>\d+)(?P<unit>[smhd])$")
        .map_err(|e| anyhow::anyhow!("Failed to compile regex: {e}"))?;

    let lower = duration_trimmed.to_lowercase();
    let captures = duration_regex.captures(&lower).ok_or_else(|| {
        anyhow::anyhow!(
            "Invalid duration format '{}'. Expected format: <number><unit> (e.g., '30s', '5m', '1d')",
            duration_trimmed
        )
    })?;

    let number: u64 = captures["number"].parse().map_err(|e| {
        anyhow::anyhow!("Invalid duration number in '{}': {}", duration_trimmed, e)
    })?;

    if number == 0 {
        return Err(anyhow::anyhow!(
            "Duration number must be greater than 0, got '{}'",
            duration_trimmed
        ));
    }

    let multiplier = match &captures["unit"] {
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        "d" => 86400,
        unit => {
            return Err(anyhow::anyhow!(
                "Invalid unit '{}' in duration '{}'. Expected: s, m, h, or d",
                unit,
                duration_trimmed
            ));
        }
    };

    let seconds = number.checked_mul(multiplier).ok_or_else(|| {
        anyhow::anyhow!("Duration '{}' is out of range", duration_trimmed)
    })?;

    Ok(Duration::from_secs(seconds))
}

/// Validate a duration string and check it falls within `[min, max]`
pub fn validate_duration_range(
    value: &str,
    field_name: &str,
    min: Duration,
    max: Duration,
) -> Result<Duration> {
    let duration = parse_kubernetes_duration(value)
        .map_err(|e| anyhow::anyhow!("{field_name}: {e}"))?;

    if duration < min || duration > max {
        return Err(anyhow::anyhow!(
            "{field_name} '{}' must be between {}s and {}s",
            value.trim(),
            min.as_secs(),
            max.as_secs()
        ));
    }

    Ok(duration)
}

/// Validate a CloudPubSubSource spec
///
/// Every failure is reported against `PullSubscriptionReady`, the only
/// dependent a CloudPubSubSource has.
pub fn validate_cloud_pubsub_source(
    spec: &CloudPubSubSourceSpec,
) -> std::result::Result<(), ValidationError<CloudPubSubSourceCondition>> {
    let invalid =
        |e: anyhow::Error| ValidationError::new(CloudPubSubSourceCondition::PullSubscriptionReady, e.to_string());

    validate_pubsub_spec(&spec.pubsub).map_err(invalid)?;
    validate_topic_id(&spec.topic, "spec.topic").map_err(invalid)?;

    if let Some(ack_deadline) = &spec.ack_deadline {
        validate_duration_range(
            ack_deadline,
            "spec.ackDeadline",
            MIN_ACK_DEADLINE,
            MAX_ACK_DEADLINE,
        )
        .map_err(invalid)?;
    }

    if let Some(retention) = &spec.retention_duration {
        validate_duration_range(
            retention,
            "spec.retentionDuration",
            MIN_RETENTION,
            MAX_RETENTION,
        )
        .map_err(invalid)?;
    }

    Ok(())
}

/// Validate a CloudAuditLog spec
///
/// Sink and credential problems surface on `PullSubscriptionReady`; a bad
/// audit log filter surfaces on `SinkReady`.
pub fn validate_cloud_audit_log(
    spec: &CloudAuditLogSpec,
) -> std::result::Result<(), ValidationError<CloudAuditLogCondition>> {
    validate_pubsub_spec(&spec.pubsub).map_err(|e| {
        ValidationError::new(CloudAuditLogCondition::PullSubscriptionReady, e.to_string())
    })?;

    let sink_invalid =
        |e: anyhow::Error| ValidationError::new(CloudAuditLogCondition::SinkReady, e.to_string());

    validate_required(&spec.service_name, "spec.serviceName").map_err(sink_invalid)?;
    validate_required(&spec.method_name, "spec.methodName").map_err(sink_invalid)?;

    if let Some(resource_name) = &spec.resource_name {
        validate_required(resource_name, "spec.resourceName").map_err(sink_invalid)?;
    }

    Ok(())
}

fn validate_pubsub_spec(spec: &PubSubSpec) -> Result<()> {
    validate_destination(&spec.sink)?;

    if let Some(project) = &spec.project {
        validate_project_id(project)?;
    }

    if let Some(secret) = &spec.secret {
        validate_required(&secret.name, "spec.secret.name")?;
        validate_required(&secret.key, "spec.secret.key")?;
    }

    Ok(())
}

/// A sink needs a reference, an absolute URI, or a reference plus a relative URI
fn validate_destination(sink: &Destination) -> Result<()> {
    match (&sink.reference, &sink.uri) {
        (None, None) => Err(anyhow::anyhow!(
            "spec.sink must set either ref or uri"
        )),
        (None, Some(uri)) => validate_url(uri, "spec.sink.uri"),
        (Some(reference), _) => {
            validate_required(&reference.api_version, "spec.sink.ref.apiVersion")?;
            validate_required(&reference.kind, "spec.sink.ref.kind")?;
            validate_required(&reference.name, "spec.sink.ref.name")
        }
    }
}

/// Pub/Sub topic IDs: 3-255 characters, start with a letter, not "goog"
fn validate_topic_id(topic: &str, field_name: &str) -> Result<()> {
    validate_required(topic, field_name)?;

    let topic_regex = Regex::new(r"^[A-Za-z][A-Za-z0-9\-_.~+%]{2,254}$")
        .map_err(|e| anyhow::anyhow!("Failed to compile regex: {e}"))?;

    if !topic_regex.is_match(topic) {
        return Err(anyhow::anyhow!(
            "{field_name} '{topic}' must be a valid Pub/Sub topic ID (3-255 characters, starting with a letter)"
        ));
    }

    if topic.to_lowercase().starts_with("goog") {
        return Err(anyhow::anyhow!(
            "{field_name} '{topic}' must not start with 'goog'"
        ));
    }

    Ok(())
}

/// GCP project IDs: 6-30 characters, lowercase letters, digits and hyphens
fn validate_project_id(project: &str) -> Result<()> {
    let project_id_regex = Regex::new(r"^[a-z][a-z0-9-]{4,28}[a-z0-9]$")
        .map_err(|e| anyhow::anyhow!("Failed to compile regex: {e}"))?;

    if !project_id_regex.is_match(project) {
        return Err(anyhow::anyhow!(
            "spec.project '{project}' must be a valid GCP project ID"
        ));
    }

    Ok(())
}

fn validate_required(value: &str, field_name: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(anyhow::anyhow!("{field_name} is required but is empty"));
    }
    Ok(())
}

fn validate_url(url: &str, field_name: &str) -> Result<()> {
    let url_trimmed = url.trim();
    validate_required(url_trimmed, field_name)?;

    let url_regex = Regex::new(r"^https?://[^\s/$.?#].[^\s]*$")
        .map_err(|e| anyhow::anyhow!("Failed to compile regex: {e}"))?;

    if !url_regex.is_match(url_trimmed) {
        return Err(anyhow::anyhow!(
            "{field_name} '{url_trimmed}' must be an absolute URL starting with http:// or https://"
        ));
    }

    Ok(())
}
