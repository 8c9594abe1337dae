//! In-memory client repository.
//!
//! Every write runs inside a single write-lock critical section, which gives
//! the same insert-or-fail and compare-and-swap guarantees as the Postgres
//! implementation. Used by tests and local runs without a database.

use crate::error::{DatabaseError, Result};
use crate::repositories::ClientRepository;
use async_trait::async_trait;
use rp_models::ClientDetail;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct InMemoryClientRepository {
    clients: RwLock<HashMap<String, ClientDetail>>,
}

impl InMemoryClientRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.clients.read().await.is_empty()
    }

    fn key_in_use(
        clients: &HashMap<String, ClientDetail>,
        thumbprint: &str,
        except_client_id: &str,
    ) -> bool {
        clients
            .values()
            .any(|c| c.public_key_thumbprint == thumbprint && c.client_id != except_client_id)
    }
}

#[async_trait]
impl ClientRepository for InMemoryClientRepository {
    async fn save(&self, client: &ClientDetail) -> Result<ClientDetail> {
        let mut clients = self.clients.write().await;

        if clients.contains_key(&client.client_id) {
            return Err(DatabaseError::duplicate(
                "Client",
                &format!("client_id {}", client.client_id),
            ));
        }
        if Self::key_in_use(&clients, &client.public_key_thumbprint, &client.client_id) {
            return Err(DatabaseError::duplicate("Client", "the same public key"));
        }

        clients.insert(client.client_id.clone(), client.clone());
        Ok(client.clone())
    }

    async fn find_by_id(&self, client_id: &str) -> Result<ClientDetail> {
        self.clients
            .read()
            .await
            .get(client_id)
            .cloned()
            .ok_or_else(|| DatabaseError::not_found("Client", client_id))
    }

    async fn find_active_by_id(&self, client_id: &str) -> Result<ClientDetail> {
        self.clients
            .read()
            .await
            .get(client_id)
            .filter(|c| c.is_active())
            .cloned()
            .ok_or_else(|| DatabaseError::not_found("Active client", client_id))
    }

    async fn update(&self, client: &ClientDetail, expected_version: i64) -> Result<ClientDetail> {
        let mut clients = self.clients.write().await;

        let current_version = clients
            .get(&client.client_id)
            .map(|c| c.version)
            .ok_or_else(|| DatabaseError::not_found("Client", &client.client_id))?;

        if current_version != expected_version {
            return Err(DatabaseError::stale_version(
                "Client",
                &client.client_id,
                expected_version,
            ));
        }
        if Self::key_in_use(&clients, &client.public_key_thumbprint, &client.client_id) {
            return Err(DatabaseError::duplicate("Client", "the same public key"));
        }

        let mut stored = client.clone();
        stored.version = current_version + 1;
        clients.insert(stored.client_id.clone(), stored.clone());
        Ok(stored)
    }
}
