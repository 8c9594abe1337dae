use rp_database::AuditRepository;
use rp_models::{AuditLogBuilder, CreateAuditLog};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Destination for client lifecycle audit events.
///
/// Recording never fails the operation that produced the event.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: CreateAuditLog);
}

/// Who is acting, stamped onto every event a service records
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditContext {
    actor: Option<(String, String)>,
    request_id: Option<String>,
}

impl AuditContext {
    pub fn actor(actor_type: impl Into<String>, actor_id: impl Into<String>) -> Self {
        Self {
            actor: Some((actor_type.into(), actor_id.into())),
            request_id: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub(crate) fn apply(&self, mut builder: AuditLogBuilder) -> AuditLogBuilder {
        if let Some((actor_type, actor_id)) = &self.actor {
            builder = builder.actor(actor_type, actor_id);
        }
        if let Some(request_id) = &self.request_id {
            builder = builder.request_id(request_id);
        }
        builder
    }
}

/// Emits audit events as structured log lines
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: CreateAuditLog) {
        tracing::info!(
            target: "rp_registry::audit",
            event_type = %event.event_type,
            status = %event.status,
            target_id = event.target_id.as_deref().unwrap_or(""),
            actor_id = event.actor_id.as_deref().unwrap_or(""),
            request_id = event.request_id.as_deref().unwrap_or(""),
            error = event.error_message.as_deref().unwrap_or(""),
            "{}",
            event.description.as_deref().unwrap_or("audit event")
        );
    }
}

/// Persists audit events to `audit_logs` from a background writer task.
///
/// Events that cannot be stored are logged through [`TracingAuditSink`].
#[derive(Clone)]
pub struct PgAuditSink {
    sender: mpsc::UnboundedSender<CreateAuditLog>,
}

/// Handle on the background writer of a [`PgAuditSink`]
pub struct AuditWriter {
    handle: JoinHandle<()>,
}

impl PgAuditSink {
    /// Start the writer task. Must be called inside a tokio runtime.
    pub fn spawn(repository: AuditRepository) -> (Self, AuditWriter) {
        let (sender, mut receiver) = mpsc::unbounded_channel::<CreateAuditLog>();

        let handle = tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                if let Err(e) = repository.create(event.clone()).await {
                    tracing::error!("Failed to write audit log {}: {}", event.event_type, e);
                    TracingAuditSink.record(event);
                }
            }
        });

        (Self { sender }, AuditWriter { handle })
    }
}

impl AuditSink for PgAuditSink {
    fn record(&self, event: CreateAuditLog) {
        if let Err(e) = self.sender.send(event) {
            tracing::warn!("Audit writer has stopped, logging {} instead", e.0.event_type);
            TracingAuditSink.record(e.0);
        }
    }
}

impl AuditWriter {
    /// Wait until every queued event is written. Completes once all sinks are dropped.
    pub async fn finish(self) {
        if let Err(e) = self.handle.await {
            tracing::error!("Audit writer task failed: {}", e);
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{disconnected_pg_sink, CapturedLogs, RecordingAuditSink};
    use super::*;
    use rp_database::{Database, DatabaseConfig};
    use rp_models::{events, AuditEventCategory, AuditStatus};

    fn created_event(client_id: &str) -> CreateAuditLog {
        AuditLogBuilder::new(events::CLIENT_CREATED, AuditEventCategory::ClientManagement)
            .target("client", client_id)
            .build()
    }

    #[test]
    fn test_context_stamps_actor_and_request_id() {
        let context = AuditContext::actor("admin", "alice").with_request_id("req-42");
        let event = context
            .apply(AuditLogBuilder::new(
                events::CLIENT_UPDATED,
                AuditEventCategory::ClientManagement,
            ))
            .build();

        assert_eq!(event.actor_type.as_deref(), Some("admin"));
        assert_eq!(event.actor_id.as_deref(), Some("alice"));
        assert_eq!(event.request_id.as_deref(), Some("req-42"));

        let anonymous = AuditContext::default()
            .apply(AuditLogBuilder::new(
                events::CLIENT_UPDATED,
                AuditEventCategory::ClientManagement,
            ))
            .build();
        assert_eq!(anonymous.actor_id, None);
        assert_eq!(anonymous.request_id, None);
    }

    #[test]
    fn test_tracing_sink_logs_event_fields() {
        let event = AuditContext::actor("admin", "alice")
            .apply(AuditLogBuilder::new(
                events::CLIENT_CREATED,
                AuditEventCategory::ClientManagement,
            ))
            .target("client", "rp_1")
            .description("Client Health Portal registered")
            .build();

        let logs = CapturedLogs::default();
        logs.capture(|| TracingAuditSink.record(event));

        let output = logs.output();
        assert!(output.contains("client.created"), "{}", output);
        assert!(output.contains("rp_1"), "{}", output);
        assert!(output.contains("alice"), "{}", output);
        assert!(output.contains("Client Health Portal registered"), "{}", output);
    }

    #[test]
    fn test_stopped_pg_writer_falls_back_to_logs() {
        let sink = disconnected_pg_sink();

        let logs = CapturedLogs::default();
        logs.capture(|| sink.record(created_event("rp_orphan")));

        let output = logs.output();
        assert!(output.contains("Audit writer has stopped"), "{}", output);
        assert!(output.contains("rp_orphan"), "{}", output);
    }

    #[tokio::test]
    async fn test_unreachable_database_does_not_block_writer() {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .acquire_timeout(std::time::Duration::from_millis(500))
            .connect_lazy("postgresql://rp:rp@127.0.0.1:1/rp")
            .unwrap();
        let (sink, writer) = PgAuditSink::spawn(AuditRepository::new(pool));

        sink.record(created_event("rp_1"));
        drop(sink);

        tokio::time::timeout(std::time::Duration::from_secs(10), writer.finish())
            .await
            .expect("writer did not drain its queue");
    }

    #[test]
    fn test_recording_sink_keeps_order() {
        let sink = RecordingAuditSink::default();
        sink.record(created_event("rp_1"));
        sink.record(
            AuditLogBuilder::new(events::CLIENT_VALIDATION_FAILED, AuditEventCategory::ClientManagement)
                .failure("redirect_uris: required")
                .build(),
        );

        let recorded = sink.events();
        assert_eq!(
            sink.event_types(),
            vec![events::CLIENT_CREATED, events::CLIENT_VALIDATION_FAILED]
        );
        assert_eq!(recorded[1].status, AuditStatus::Failure);
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_pg_sink_writes_queued_events() {
        let db = Database::new(DatabaseConfig::from_env()).await.unwrap();
        db.migrate().await.unwrap();
        let repository = AuditRepository::new(db.pool().clone());

        let client_id = format!("rp_audit_{}", uuid::Uuid::new_v4().simple());
        let (sink, writer) = PgAuditSink::spawn(repository.clone());
        sink.record(
            AuditContext::actor("admin", "alice")
                .with_request_id("req-1")
                .apply(AuditLogBuilder::new(
                    events::CLIENT_CREATED,
                    AuditEventCategory::ClientManagement,
                ))
                .target("client", &client_id)
                .build(),
        );
        drop(sink);
        writer.finish().await;

        let logs = repository.list_for_client(&client_id, 10).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].event_type, events::CLIENT_CREATED);
        assert_eq!(logs[0].actor_id.as_deref(), Some("alice"));
        assert_eq!(logs[0].request_id.as_deref(), Some("req-1"));
    }
}
