use crate::audit::{AuditContext, AuditSink};
use crate::config::{ClientPolicy, ReadVisibility};
use crate::error::{ClientError, FieldViolation, Result};
use crate::key_binder::{self, BoundKey, JwkKeyBinder, KeyBinder};
use crate::validator::{validate_create, validate_update};
use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey};
use rp_database::{ClientRepository, DatabaseError};
use rp_models::{
    events, AuditEventCategory, AuditLogBuilder, ClientDetail, ClientDetailResponse, ClientStatus,
    CreateClientRequest, UpdateClientRequest,
};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

/// Management operations on registered clients
#[async_trait]
pub trait ClientManagementService: Send + Sync {
    /// Register a new client. The client starts ACTIVE at version 1.
    async fn create_oidc_client(&self, request: CreateClientRequest) -> Result<ClientDetailResponse>;

    /// Apply the set fields of `request` to an existing client
    async fn update_oidc_client(
        &self,
        client_id: &str,
        request: UpdateClientRequest,
    ) -> Result<ClientDetailResponse>;

    async fn get_client_details(&self, client_id: &str) -> Result<ClientDetail>;
}

/// Lookup used by authentication flows. Never returns an INACTIVE client.
#[async_trait]
pub trait ActiveClientLookup: Send + Sync {
    async fn resolve_active_client(&self, client_id: &str) -> Result<ClientDetail>;
}

#[derive(Clone)]
pub struct ClientService {
    repository: Arc<dyn ClientRepository>,
    key_binder: Arc<dyn KeyBinder>,
    audit: Arc<dyn AuditSink>,
    audit_context: AuditContext,
    policy: Arc<ClientPolicy>,
}

impl ClientService {
    pub fn new(
        repository: Arc<dyn ClientRepository>,
        key_binder: Arc<dyn KeyBinder>,
        audit: Arc<dyn AuditSink>,
        policy: Arc<ClientPolicy>,
    ) -> Self {
        Self {
            repository,
            key_binder,
            audit,
            audit_context: AuditContext::default(),
            policy,
        }
    }

    /// Service with the JWK key binder configured from `policy`
    pub fn with_policy(
        repository: Arc<dyn ClientRepository>,
        audit: Arc<dyn AuditSink>,
        policy: ClientPolicy,
    ) -> Self {
        let key_binder = Arc::new(JwkKeyBinder::new(&policy));
        Self::new(repository, key_binder, audit, Arc::new(policy))
    }

    /// Attribute every recorded audit event to `context`
    pub fn with_audit_context(mut self, context: AuditContext) -> Self {
        self.audit_context = context;
        self
    }

    /// Bind a new public key to an existing client
    #[tracing::instrument(skip(self, public_key))]
    pub async fn rotate_client_key(
        &self,
        client_id: &str,
        public_key: serde_json::Value,
    ) -> Result<ClientDetailResponse> {
        require_client_id(client_id)?;

        let current = self.repository.find_by_id(client_id).await?;
        let bound = self.bind_key(Some(client_id), &public_key)?;

        if bound.thumbprint == current.public_key_thumbprint {
            return Err(self.reject(
                Some(client_id),
                vec![FieldViolation::new(
                    "public_key",
                    "unchanged",
                    "the new key is the currently registered key",
                )],
            ));
        }

        let rotated = ClientDetail {
            public_key: bound.canonical_jwk,
            public_key_thumbprint: bound.thumbprint,
            key_algorithm: bound.algorithm,
            updated_at: Utc::now(),
            ..current.clone()
        };

        let stored = self
            .repository
            .update(&rotated, current.version)
            .await
            .map_err(|e| storage_error(e, "rotate key of", client_id))?;

        tracing::info!(
            client_id = %stored.client_id,
            kid = %stored.public_key_thumbprint,
            "Client key rotated"
        );
        self.audit.record(
            self.event(events::CLIENT_KEY_ROTATED, AuditEventCategory::Security)
                .target("client", &stored.client_id)
                .target_name(&stored.client_name)
                .description("Client public key rotated")
                .metadata(json!({
                    "previous_kid": current.public_key_thumbprint,
                    "kid": stored.public_key_thumbprint,
                    "algorithm": stored.key_algorithm,
                    "version": stored.version,
                }))
                .build(),
        );

        Ok(stored.into())
    }

    /// Verifier for assertions signed by the client's registered key
    pub fn verification_key(&self, client: &ClientDetail) -> Result<(DecodingKey, Algorithm)> {
        Ok(key_binder::verification_key(client)?)
    }

    fn bind_key(&self, client_id: Option<&str>, public_key: &serde_json::Value) -> Result<BoundKey> {
        self.key_binder.bind(public_key).map_err(|e| {
            tracing::debug!(client_id = client_id.unwrap_or(""), "Public key rejected: {}", e);
            self.audit.record(
                self.rejection_event(client_id)
                    .failure(e.to_string())
                    .metadata(json!({ "field": "public_key" }))
                    .build(),
            );
            ClientError::from(e)
        })
    }

    fn event(&self, event_type: &str, category: AuditEventCategory) -> AuditLogBuilder {
        self.audit_context.apply(AuditLogBuilder::new(event_type, category))
    }

    fn rejection_event(&self, client_id: Option<&str>) -> AuditLogBuilder {
        let builder = self.event(
            events::CLIENT_VALIDATION_FAILED,
            AuditEventCategory::ClientManagement,
        );
        match client_id {
            Some(id) => builder.target("client", id),
            None => builder,
        }
    }

    /// Record a validation rejection and turn it into an error
    fn reject(&self, client_id: Option<&str>, violations: Vec<FieldViolation>) -> ClientError {
        let err = ClientError::Validation(violations);
        tracing::debug!(client_id = client_id.unwrap_or(""), "{}", err);
        self.audit.record(
            self.rejection_event(client_id)
                .failure(err.to_string())
                .metadata(json!({ "violations": err.violations() }))
                .build(),
        );
        err
    }
}

#[async_trait]
impl ClientManagementService for ClientService {
    #[tracing::instrument(skip(self, request), fields(rp_id = %request.rp_id))]
    async fn create_oidc_client(&self, request: CreateClientRequest) -> Result<ClientDetailResponse> {
        if let Err(violations) = validate_create(&self.policy, &request) {
            return Err(self.reject(None, violations));
        }
        let bound = self.bind_key(None, &request.public_key)?;

        let now = Utc::now();
        let client = ClientDetail {
            client_id: generate_client_id(),
            client_name: request.client_name,
            rp_id: request.rp_id,
            logo_uri: request.logo_uri,
            redirect_uris: request.redirect_uris,
            public_key: bound.canonical_jwk,
            public_key_thumbprint: bound.thumbprint,
            key_algorithm: bound.algorithm,
            grant_types: request.grant_types,
            client_auth_methods: request.client_auth_methods,
            claims: request.claims,
            acr_values: request.acr_values,
            status: ClientStatus::Active,
            version: 1,
            created_at: now,
            updated_at: now,
        };

        let stored = self
            .repository
            .save(&client)
            .await
            .map_err(|e| storage_error(e, "create", &client.client_id))?;

        tracing::info!(
            client_id = %stored.client_id,
            kid = %stored.public_key_thumbprint,
            "Client registered"
        );
        self.audit.record(
            self.event(events::CLIENT_CREATED, AuditEventCategory::ClientManagement)
                .target("client", &stored.client_id)
                .target_name(&stored.client_name)
                .description(format!("Client {} registered", stored.client_name))
                .metadata(json!({
                    "rp_id": stored.rp_id,
                    "kid": stored.public_key_thumbprint,
                    "algorithm": stored.key_algorithm,
                }))
                .build(),
        );

        Ok(stored.into())
    }

    #[tracing::instrument(skip(self, request))]
    async fn update_oidc_client(
        &self,
        client_id: &str,
        request: UpdateClientRequest,
    ) -> Result<ClientDetailResponse> {
        require_client_id(client_id)?;

        let current = self.repository.find_by_id(client_id).await?;
        let merged = merge(&current, &request);

        if let Err(violations) = validate_update(&self.policy, &request, &merged) {
            return Err(self.reject(Some(client_id), violations));
        }

        let stored = self
            .repository
            .update(&merged, current.version)
            .await
            .map_err(|e| storage_error(e, "update", client_id))?;

        let changed = changed_fields(&current, &stored);
        tracing::info!(
            client_id = %stored.client_id,
            version = stored.version,
            changed = ?changed,
            "Client updated"
        );
        self.audit.record(
            self.event(events::CLIENT_UPDATED, AuditEventCategory::ClientManagement)
                .target("client", &stored.client_id)
                .target_name(&stored.client_name)
                .description("Client configuration updated")
                .metadata(json!({ "changed": changed, "version": stored.version }))
                .build(),
        );

        if current.status != stored.status {
            tracing::info!(
                client_id = %stored.client_id,
                "Client status changed from {} to {}",
                current.status,
                stored.status
            );
            self.audit.record(
                self.event(events::CLIENT_STATUS_CHANGED, AuditEventCategory::Security)
                    .target("client", &stored.client_id)
                    .target_name(&stored.client_name)
                    .description(format!("Client is now {}", stored.status))
                    .metadata(json!({ "from": current.status, "to": stored.status }))
                    .build(),
            );
        }

        Ok(stored.into())
    }

    #[tracing::instrument(skip(self))]
    async fn get_client_details(&self, client_id: &str) -> Result<ClientDetail> {
        require_client_id(client_id)?;

        let client = match self.policy.read_visibility {
            ReadVisibility::ActiveOnly => self.repository.find_active_by_id(client_id).await?,
            ReadVisibility::IncludeInactive => self.repository.find_by_id(client_id).await?,
        };
        Ok(client)
    }
}

#[async_trait]
impl ActiveClientLookup for ClientService {
    #[tracing::instrument(skip(self))]
    async fn resolve_active_client(&self, client_id: &str) -> Result<ClientDetail> {
        require_client_id(client_id)?;
        Ok(self.repository.find_active_by_id(client_id).await?)
    }
}

fn generate_client_id() -> String {
    format!("rp_{}", Uuid::new_v4().simple())
}

fn require_client_id(client_id: &str) -> Result<()> {
    if client_id.trim().is_empty() {
        return Err(ClientError::violation(
            "client_id",
            "required",
            "client id must not be empty",
        ));
    }
    Ok(())
}

fn storage_error(err: DatabaseError, action: &str, client_id: &str) -> ClientError {
    let err = ClientError::from(err);
    match &err {
        ClientError::Conflict(msg) => {
            tracing::warn!("Conflict trying to {} client {}: {}", action, client_id, msg)
        }
        ClientError::Persistence(msg) => {
            tracing::error!("Failed to {} client {}: {}", action, client_id, msg)
        }
        _ => {}
    }
    err
}

/// Stored client with the set fields of `request` applied. Id and key are kept.
fn merge(current: &ClientDetail, request: &UpdateClientRequest) -> ClientDetail {
    let pick = |update: &Option<Vec<String>>, stored: &Vec<String>| {
        update.clone().unwrap_or_else(|| stored.clone())
    };

    ClientDetail {
        client_name: request
            .client_name
            .clone()
            .unwrap_or_else(|| current.client_name.clone()),
        rp_id: request.rp_id.clone().unwrap_or_else(|| current.rp_id.clone()),
        logo_uri: request
            .logo_uri
            .clone()
            .unwrap_or_else(|| current.logo_uri.clone()),
        redirect_uris: pick(&request.redirect_uris, &current.redirect_uris),
        grant_types: pick(&request.grant_types, &current.grant_types),
        client_auth_methods: pick(&request.client_auth_methods, &current.client_auth_methods),
        claims: pick(&request.claims, &current.claims),
        acr_values: pick(&request.acr_values, &current.acr_values),
        status: request.status.unwrap_or(current.status),
        updated_at: Utc::now(),
        ..current.clone()
    }
}

fn changed_fields(before: &ClientDetail, after: &ClientDetail) -> Vec<&'static str> {
    let mut changed = Vec::new();
    if before.client_name != after.client_name {
        changed.push("client_name");
    }
    if before.rp_id != after.rp_id {
        changed.push("rp_id");
    }
    if before.logo_uri != after.logo_uri {
        changed.push("logo_uri");
    }
    if before.redirect_uris != after.redirect_uris {
        changed.push("redirect_uris");
    }
    if before.grant_types != after.grant_types {
        changed.push("grant_types");
    }
    if before.client_auth_methods != after.client_auth_methods {
        changed.push("client_auth_methods");
    }
    if before.claims != after.claims {
        changed.push("claims");
    }
    if before.acr_values != after.acr_values {
        changed.push("acr_values");
    }
    if before.status != after.status {
        changed.push("status");
    }
    changed
}
