//! Audit trail for signing and validation.
//!
//! Each event is written as one JSON line through the `log` facade under the
//! `pdf_seal::audit` target, so it can be routed separately with
//! `RUST_LOG=pdf_seal::audit=info`. Recording an event never fails.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Log target for audit lines.
pub const AUDIT_TARGET: &str = "pdf_seal::audit";

/// Kind of audited operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditAction {
    /// A document was sealed
    Signature,
    /// A document was validated
    Validation,
}

/// One audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// When the event was created
    pub timestamp: DateTime<Utc>,
    pub action: AuditAction,
    /// `success`, `failure`, `valid`, `invalid`
    pub status: String,
    /// Digest of the document involved, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    /// Free-form context for the action
    #[serde(default)]
    pub details: serde_json::Value,
}

impl AuditEvent {
    /// Create an event stamped with the current time.
    pub fn new(action: AuditAction, status: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            action,
            status: status.into(),
            document_id: None,
            details: serde_json::Value::Null,
        }
    }

    /// Attach the document's digest.
    pub fn with_document_id(mut self, id: impl Into<String>) -> Self {
        self.document_id = Some(id.into());
        self
    }

    /// Replace the details object.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    /// Single-line JSON form.
    pub fn to_json_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Emit an audit event.
pub fn record(event: &AuditEvent) {
    match event.to_json_line() {
        Ok(line) => log::info!(target: AUDIT_TARGET, "{}", line),
        Err(e) => log::warn!(target: AUDIT_TARGET, "Dropped audit event: {}", e),
    }
}
