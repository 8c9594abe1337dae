use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq)]
#[sqlx(type_name = "audit_event_category", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AuditEventCategory {
    ClientManagement,
    Security,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum AuditStatus {
    Success,
    Failure,
}

impl std::fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuditStatus::Success => write!(f, "success"),
            AuditStatus::Failure => write!(f, "failure"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AuditLog {
    pub id: Uuid,

    // Event information
    pub event_type: String,
    pub event_category: AuditEventCategory,
    pub event_action: String,

    // Actor
    pub actor_type: Option<String>,
    pub actor_id: Option<String>,

    // Target
    pub target_type: Option<String>,
    pub target_id: Option<String>,
    pub target_name: Option<String>,

    // Details
    pub description: Option<String>,
    pub metadata: Option<serde_json::Value>,

    // Result
    pub status: String,
    pub error_message: Option<String>,

    pub request_id: Option<String>,

    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreateAuditLog {
    // Event information
    pub event_type: String,
    pub event_category: AuditEventCategory,
    pub event_action: String,

    // Actor
    pub actor_type: Option<String>,
    pub actor_id: Option<String>,

    // Target
    pub target_type: Option<String>,
    pub target_id: Option<String>,
    pub target_name: Option<String>,

    // Details
    pub description: Option<String>,
    pub metadata: Option<serde_json::Value>,

    // Result
    pub status: AuditStatus,
    pub error_message: Option<String>,

    pub request_id: Option<String>,
}

// Helper builders for client lifecycle events
pub struct AuditLogBuilder {
    log: CreateAuditLog,
}

impl AuditLogBuilder {
    pub fn new(event_type: impl Into<String>, category: AuditEventCategory) -> Self {
        let event_type = event_type.into();
        let action = event_type
            .rsplit('.')
            .next()
            .unwrap_or("unknown")
            .to_string();

        Self {
            log: CreateAuditLog {
                event_type,
                event_category: category,
                event_action: action,
                actor_type: None,
                actor_id: None,
                target_type: None,
                target_id: None,
                target_name: None,
                description: None,
                metadata: None,
                status: AuditStatus::Success,
                error_message: None,
                request_id: None,
            },
        }
    }

    pub fn actor(mut self, actor_type: impl Into<String>, actor_id: impl Into<String>) -> Self {
        self.log.actor_type = Some(actor_type.into());
        self.log.actor_id = Some(actor_id.into());
        self
    }

    pub fn target(mut self, target_type: impl Into<String>, target_id: impl Into<String>) -> Self {
        self.log.target_type = Some(target_type.into());
        self.log.target_id = Some(target_id.into());
        self
    }

    pub fn target_name(mut self, name: impl Into<String>) -> Self {
        self.log.target_name = Some(name.into());
        self
    }

    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.log.description = Some(desc.into());
        self
    }

    pub fn metadata(mut self, data: serde_json::Value) -> Self {
        self.log.metadata = Some(data);
        self
    }

    pub fn failure(mut self, reason: impl Into<String>) -> Self {
        self.log.status = AuditStatus::Failure;
        self.log.error_message = Some(reason.into());
        self
    }

    pub fn request_id(mut self, id: impl Into<String>) -> Self {
        self.log.request_id = Some(id.into());
        self
    }

    pub fn build(self) -> CreateAuditLog {
        self.log
    }
}

// Common event type constants
pub mod events {
    pub const CLIENT_CREATED: &str = "client.created";
    pub const CLIENT_UPDATED: &str = "client.updated";
    pub const CLIENT_STATUS_CHANGED: &str = "client.status_changed";
    pub const CLIENT_KEY_ROTATED: &str = "client.key_rotated";
    pub const CLIENT_VALIDATION_FAILED: &str = "client.validation_failed";
}
