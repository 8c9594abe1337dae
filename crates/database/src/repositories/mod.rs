pub mod audit;
pub mod client;
pub mod memory;

use crate::error::Result;
use async_trait::async_trait;
use rp_models::ClientDetail;

/// Persistence contract for registered clients.
///
/// Implementations enforce uniqueness of `client_id` and of the public key
/// thumbprint at write time, and apply updates atomically.
#[async_trait]
pub trait ClientRepository: Send + Sync {
    /// Insert a new client; fails with `DuplicateEntry` if the id or key is taken
    async fn save(&self, client: &ClientDetail) -> Result<ClientDetail>;

    /// Get a client by id regardless of status
    async fn find_by_id(&self, client_id: &str) -> Result<ClientDetail>;

    /// Get a client by id, only if it is ACTIVE
    async fn find_active_by_id(&self, client_id: &str) -> Result<ClientDetail>;

    /// Replace the stored client if its version still equals `expected_version`.
    /// The stored version is incremented on success.
    async fn update(&self, client: &ClientDetail, expected_version: i64) -> Result<ClientDetail>;
}
