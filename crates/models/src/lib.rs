pub mod audit;
pub mod client;

// Re-export commonly used types
pub use audit::{events, AuditEventCategory, AuditLog, AuditLogBuilder, AuditStatus, CreateAuditLog};
pub use client::{
    ClientAuthMethod, ClientDetail, ClientDetailResponse, ClientStatus, CreateClientRequest,
    GrantType, KeyFamily, ParseEnumError, SigningAlgorithm, UpdateClientRequest,
};
