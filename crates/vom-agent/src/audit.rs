//! Structured audit records for the agent.
//!
//! Every change the agent makes to the forwarding engine, and every
//! lifecycle transition of the agent itself, is emitted as an
//! [`AuditRecord`] through [`audit_log!`](crate::audit_log). Records are
//! serialised to JSON and attached to a `tracing` event on the `audit`
//! target, so they can be filtered apart from ordinary logs.
//!
//! | Outcome | Level |
//! |---------|-------|
//! | Success | info |
//! | InProgress | debug |
//! | Failure | warn |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What kind of event a record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditCategory {
    /// An object was programmed into the engine
    ResourceCreate,
    /// An object was removed from the engine
    ResourceDelete,
    /// Agent startup and shutdown
    SystemLifecycle,
    /// Configuration loaded or changed
    ConfigurationChange,
    /// Connection-level engine events (connect, ping, reconnect)
    EngineOperation,
    /// Population or replay of the registries
    Resync,
    /// Operator-driven actions
    AdminAction,
    /// Failures not covered by another category
    ErrorCondition,
}

impl fmt::Display for AuditCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditCategory::ResourceCreate => write!(f, "RESOURCE_CREATE"),
            AuditCategory::ResourceDelete => write!(f, "RESOURCE_DELETE"),
            AuditCategory::SystemLifecycle => write!(f, "SYSTEM_LIFECYCLE"),
            AuditCategory::ConfigurationChange => write!(f, "CONFIGURATION_CHANGE"),
            AuditCategory::EngineOperation => write!(f, "ENGINE_OPERATION"),
            AuditCategory::Resync => write!(f, "RESYNC"),
            AuditCategory::AdminAction => write!(f, "ADMIN_ACTION"),
            AuditCategory::ErrorCondition => write!(f, "ERROR_CONDITION"),
        }
    }
}

/// Outcome of an audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditOutcome {
    Success,
    Failure,
    InProgress,
}

impl fmt::Display for AuditOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditOutcome::Success => write!(f, "success"),
            AuditOutcome::Failure => write!(f, "failure"),
            AuditOutcome::InProgress => write!(f, "in_progress"),
        }
    }
}

/// One audited event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    /// UTC time the record was created
    pub timestamp: DateTime<Utc>,

    pub category: AuditCategory,

    /// Component emitting the record
    pub source: String,

    /// What was done
    pub action: String,

    pub outcome: AuditOutcome,

    /// Key of the affected object, e.g. a table id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,

    /// Kind of the affected object, e.g. "route-domain"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AuditRecord {
    /// Creates a record stamped with the current time. The outcome starts
    /// as `InProgress`.
    pub fn new(
        category: AuditCategory,
        source: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            category,
            source: source.into(),
            action: action.into(),
            outcome: AuditOutcome::InProgress,
            object_id: None,
            object_type: None,
            details: None,
            error: None,
        }
    }

    pub fn with_outcome(mut self, outcome: AuditOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    pub fn with_object_id(mut self, id: impl Into<String>) -> Self {
        self.object_id = Some(id.into());
        self
    }

    pub fn with_object_type(mut self, obj_type: impl Into<String>) -> Self {
        self.object_type = Some(obj_type.into());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Sets the error message and marks the record as failed.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self.outcome = AuditOutcome::Failure;
        self
    }

    /// Serialises the record to a single JSON line.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|e| format!(r#"{{"error":"serialization_failed","message":"{}"}}"#, e))
    }
}

/// Emits `record` on the `audit` target at a level chosen by its outcome.
///
/// The full record rides along as the `audit_json` field; the message
/// carries category, action, object and outcome for plain-text readers.
pub fn emit(record: &AuditRecord) {
    let json = record.to_json();
    let object = record.object_id.as_deref().unwrap_or("-");
    match record.outcome {
        AuditOutcome::Success => tracing::info!(
            target: "audit",
            category = %record.category,
            audit_json = %json,
            "{} {} [{}] {}",
            record.category,
            record.action,
            object,
            record.outcome
        ),
        AuditOutcome::InProgress => tracing::debug!(
            target: "audit",
            category = %record.category,
            audit_json = %json,
            "{} {} [{}] {}",
            record.category,
            record.action,
            object,
            record.outcome
        ),
        AuditOutcome::Failure => tracing::warn!(
            target: "audit",
            category = %record.category,
            error = record.error.as_deref().unwrap_or(""),
            audit_json = %json,
            "{} {} [{}] {}",
            record.category,
            record.action,
            object,
            record.outcome
        ),
    }
}

/// Emits an [`AuditRecord`]; see [`emit`].
///
/// ```ignore
/// audit_log!(
///     AuditRecord::new(AuditCategory::ResourceCreate, "Agent", "add_route_domain")
///         .with_outcome(AuditOutcome::Success)
///         .with_object_id("5")
/// );
/// ```
#[macro_export]
macro_rules! audit_log {
    ($record:expr) => {
        $crate::audit::emit(&$record)
    };
}

/// Installs a JSON `tracing` subscriber.
///
/// `RUST_LOG` overrides `log_level` when set. Records from the `log` crate,
/// which the object model libraries use, are captured as well.
pub fn init_logging(log_level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .json(),
        )
        .init();
}

/// Installs a human-readable `tracing` subscriber, for running the agent
/// in a terminal.
pub fn init_logging_pretty(log_level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .pretty(),
        )
        .init();
}
