//! Relying-party client registry: registration, update and lookup of OIDC
//! clients with policy validation and public key binding.

pub mod audit;
pub mod config;
pub mod error;
pub mod key_binder;
pub mod service;
pub mod validator;

pub use audit::{AuditContext, AuditSink, AuditWriter, PgAuditSink, TracingAuditSink};
pub use config::{ClientPolicy, ReadVisibility};
pub use error::{ClientError, ErrorClass, FieldViolation, KeyBindingError, Result};
pub use key_binder::{verification_key, BoundKey, JwkKeyBinder, KeyBinder};
pub use service::{ActiveClientLookup, ClientManagementService, ClientService};
