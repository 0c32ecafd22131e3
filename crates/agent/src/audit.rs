use tracing::{info, warn};

use triage_core::audit::{AuditEvent, AuditOutcome, AuditSink};

/// Forwards audit events to the `triage::audit` tracing target.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        let operation_id = event.operation_id.as_ref().map(ToString::to_string).unwrap_or_default();
        let chat_ref = event.chat_ref.clone().unwrap_or_default();
        let metadata = serde_json::to_string(&event.metadata).unwrap_or_default();

        match event.outcome {
            AuditOutcome::Success => info!(
                target: "triage::audit",
                event_name = %event.event_type,
                category = event.category.as_str(),
                correlation_id = %event.correlation_id,
                operation_id = %operation_id,
                chat_ref = %chat_ref,
                actor = %event.actor,
                metadata = %metadata,
                "audit event"
            ),
            AuditOutcome::Rejected | AuditOutcome::Failed => warn!(
                target: "triage::audit",
                event_name = %event.event_type,
                category = event.category.as_str(),
                outcome = ?event.outcome,
                correlation_id = %event.correlation_id,
                operation_id = %operation_id,
                chat_ref = %chat_ref,
                actor = %event.actor,
                metadata = %metadata,
                "audit event"
            ),
        }
    }
}
