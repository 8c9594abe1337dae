use crate::error::{DatabaseError, Result};
use crate::repositories::ClientRepository;
use async_trait::async_trait;
use rp_models::{ClientDetail, ClientStatus};
use sqlx::PgPool;

const PUBLIC_KEY_CONSTRAINT: &str = "client_details_public_key_thumbprint_key";

#[derive(Clone)]
pub struct PgClientRepository {
    pool: PgPool,
}

impl PgClientRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn exists(&self, client_id: &str) -> Result<bool> {
        let exists: (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM client_details WHERE client_id = $1)")
                .bind(client_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(exists.0)
    }

    // Helper: Translate unique violations into duplicate errors
    fn map_write_error(err: sqlx::Error, client_id: &str) -> DatabaseError {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return match db_err.constraint() {
                    Some(PUBLIC_KEY_CONSTRAINT) => {
                        DatabaseError::duplicate("Client", "the same public key")
                    }
                    _ => DatabaseError::duplicate("Client", &format!("client_id {}", client_id)),
                };
            }
        }
        DatabaseError::from(err)
    }
}

#[async_trait]
impl ClientRepository for PgClientRepository {
    async fn save(&self, client: &ClientDetail) -> Result<ClientDetail> {
        let saved = sqlx::query_as::<_, ClientDetail>(
            r#"
            INSERT INTO client_details (
                client_id, client_name, rp_id, logo_uri, redirect_uris,
                public_key, public_key_thumbprint, key_algorithm,
                grant_types, client_auth_methods, claims, acr_values,
                status, version, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            RETURNING *
            "#,
        )
        .bind(&client.client_id)
        .bind(&client.client_name)
        .bind(&client.rp_id)
        .bind(&client.logo_uri)
        .bind(&client.redirect_uris)
        .bind(&client.public_key)
        .bind(&client.public_key_thumbprint)
        .bind(client.key_algorithm)
        .bind(&client.grant_types)
        .bind(&client.client_auth_methods)
        .bind(&client.claims)
        .bind(&client.acr_values)
        .bind(client.status)
        .bind(client.version)
        .bind(client.created_at)
        .bind(client.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| Self::map_write_error(e, &client.client_id))?;

        Ok(saved)
    }

    async fn find_by_id(&self, client_id: &str) -> Result<ClientDetail> {
        let client = sqlx::query_as::<_, ClientDetail>(
            "SELECT * FROM client_details WHERE client_id = $1",
        )
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DatabaseError::not_found("Client", client_id))?;

        Ok(client)
    }

    async fn find_active_by_id(&self, client_id: &str) -> Result<ClientDetail> {
        let client = sqlx::query_as::<_, ClientDetail>(
            "SELECT * FROM client_details WHERE client_id = $1 AND status = $2",
        )
        .bind(client_id)
        .bind(ClientStatus::Active)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DatabaseError::not_found("Active client", client_id))?;

        Ok(client)
    }

    async fn update(&self, client: &ClientDetail, expected_version: i64) -> Result<ClientDetail> {
        // Single statement: readers see either the old or the new row
        let updated = sqlx::query_as::<_, ClientDetail>(
            r#"
            UPDATE client_details
            SET client_name = $2, rp_id = $3, logo_uri = $4, redirect_uris = $5,
                public_key = $6, public_key_thumbprint = $7, key_algorithm = $8,
                grant_types = $9, client_auth_methods = $10, claims = $11, acr_values = $12,
                status = $13, updated_at = $14, version = version + 1
            WHERE client_id = $1 AND version = $15
            RETURNING *
            "#,
        )
        .bind(&client.client_id)
        .bind(&client.client_name)
        .bind(&client.rp_id)
        .bind(&client.logo_uri)
        .bind(&client.redirect_uris)
        .bind(&client.public_key)
        .bind(&client.public_key_thumbprint)
        .bind(client.key_algorithm)
        .bind(&client.grant_types)
        .bind(&client.client_auth_methods)
        .bind(&client.claims)
        .bind(&client.acr_values)
        .bind(client.status)
        .bind(client.updated_at)
        .bind(expected_version)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Self::map_write_error(e, &client.client_id))?;

        match updated {
            Some(client) => Ok(client),
            None if self.exists(&client.client_id).await? => Err(DatabaseError::stale_version(
                "Client",
                &client.client_id,
                expected_version,
            )),
            None => Err(DatabaseError::not_found("Client", &client.client_id)),
        }
    }
}
