use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;
use thiserror::Error;
use validator::Validate;

/// Registered relying-party client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ClientDetail {
    pub client_id: String,

    pub client_name: String,

    /// Relying party (organisation) that owns this client
    pub rp_id: String,

    pub logo_uri: String,

    #[sqlx(default)]
    pub redirect_uris: Vec<String>,

    /// Canonical JWK (sorted members, no whitespace)
    pub public_key: String,

    /// RFC 7638 thumbprint of `public_key`, also used as its `kid`
    pub public_key_thumbprint: String,

    pub key_algorithm: SigningAlgorithm,

    #[sqlx(default)]
    pub grant_types: Vec<String>,

    #[sqlx(default)]
    pub client_auth_methods: Vec<String>,

    #[sqlx(default)]
    pub claims: Vec<String>,

    #[sqlx(default)]
    pub acr_values: Vec<String>,

    pub status: ClientStatus,

    /// Incremented on every successful mutation
    pub version: i64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ClientDetail {
    pub fn is_active(&self) -> bool {
        self.status == ClientStatus::Active
    }
}

/// Register client request
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct CreateClientRequest {
    #[validate(length(min = 1, max = 256))]
    pub client_name: String,

    #[validate(length(min = 1, max = 100), regex(path = *RP_ID_REGEX))]
    pub rp_id: String,

    #[validate(length(min = 1, max = 2048))]
    pub logo_uri: String,

    #[serde(default)]
    pub redirect_uris: Vec<String>,

    /// Public key as a JWK object
    #[serde(default)]
    pub public_key: serde_json::Value,

    #[serde(default)]
    pub grant_types: Vec<String>,

    #[serde(default)]
    pub client_auth_methods: Vec<String>,

    /// User claims the client may request
    #[serde(default)]
    pub claims: Vec<String>,

    /// Authentication context references the client may request
    #[serde(default)]
    pub acr_values: Vec<String>,
}

/// Update client request. Unset fields keep their stored value.
///
/// The client id and bound key are not part of the request; an update body
/// naming them (or any other unknown field) fails to decode.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct UpdateClientRequest {
    #[validate(length(min = 1, max = 256))]
    pub client_name: Option<String>,

    #[validate(length(min = 1, max = 100), regex(path = *RP_ID_REGEX))]
    pub rp_id: Option<String>,

    #[validate(length(min = 1, max = 2048))]
    pub logo_uri: Option<String>,

    pub redirect_uris: Option<Vec<String>>,

    pub grant_types: Option<Vec<String>>,

    pub client_auth_methods: Option<Vec<String>>,

    pub claims: Option<Vec<String>>,

    pub acr_values: Option<Vec<String>>,

    pub status: Option<ClientStatus>,
}

/// Client as returned to management callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientDetailResponse {
    pub client_id: String,
    pub client_name: String,
    pub rp_id: String,
    pub logo_uri: String,
    pub redirect_uris: Vec<String>,
    pub key_id: String,
    pub key_algorithm: SigningAlgorithm,
    pub grant_types: Vec<String>,
    pub client_auth_methods: Vec<String>,
    pub claims: Vec<String>,
    pub acr_values: Vec<String>,
    pub status: ClientStatus,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ClientDetail> for ClientDetailResponse {
    fn from(client: ClientDetail) -> Self {
        Self {
            client_id: client.client_id,
            client_name: client.client_name,
            rp_id: client.rp_id,
            logo_uri: client.logo_uri,
            redirect_uris: client.redirect_uris,
            key_id: client.public_key_thumbprint,
            key_algorithm: client.key_algorithm,
            grant_types: client.grant_types,
            client_auth_methods: client.client_auth_methods,
            claims: client.claims,
            acr_values: client.acr_values,
            status: client.status,
            version: client.version,
            created_at: client.created_at,
            updated_at: client.updated_at,
        }
    }
}

/// Client activation state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "client_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientStatus {
    Active,
    Inactive,
}

impl std::fmt::Display for ClientStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientStatus::Active => write!(f, "ACTIVE"),
            ClientStatus::Inactive => write!(f, "INACTIVE"),
        }
    }
}

/// Unrecognised value for one of the enumerated client capabilities
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind}: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// OAuth2 grant types a client can be registered for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    AuthorizationCode,
    RefreshToken,
    ClientCredentials,
}

impl GrantType {
    pub const ALL: [GrantType; 3] = [
        GrantType::AuthorizationCode,
        GrantType::RefreshToken,
        GrantType::ClientCredentials,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GrantType::AuthorizationCode => "authorization_code",
            GrantType::RefreshToken => "refresh_token",
            GrantType::ClientCredentials => "client_credentials",
        }
    }
}

impl FromStr for GrantType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        GrantType::ALL
            .into_iter()
            .find(|g| g.as_str() == s)
            .ok_or_else(|| ParseEnumError::new("grant type", s))
    }
}

impl std::fmt::Display for GrantType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Token endpoint authentication methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthMethod {
    PrivateKeyJwt,
    ClientSecretBasic,
    ClientSecretPost,
    None,
}

impl ClientAuthMethod {
    pub const ALL: [ClientAuthMethod; 4] = [
        ClientAuthMethod::PrivateKeyJwt,
        ClientAuthMethod::ClientSecretBasic,
        ClientAuthMethod::ClientSecretPost,
        ClientAuthMethod::None,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ClientAuthMethod::PrivateKeyJwt => "private_key_jwt",
            ClientAuthMethod::ClientSecretBasic => "client_secret_basic",
            ClientAuthMethod::ClientSecretPost => "client_secret_post",
            ClientAuthMethod::None => "none",
        }
    }
}

impl FromStr for ClientAuthMethod {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ClientAuthMethod::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| ParseEnumError::new("client auth method", s))
    }
}

impl std::fmt::Display for ClientAuthMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key families a JWS algorithm can be bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFamily {
    Rsa,
    Ec,
}

impl KeyFamily {
    /// JWK `kty` value
    pub fn kty(&self) -> &'static str {
        match self {
            KeyFamily::Rsa => "RSA",
            KeyFamily::Ec => "EC",
        }
    }
}

/// JWS algorithms a client key may be registered for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SigningAlgorithm {
    RS256,
    RS384,
    RS512,
    PS256,
    PS384,
    PS512,
    ES256,
}

impl SigningAlgorithm {
    pub const ALL: [SigningAlgorithm; 7] = [
        SigningAlgorithm::RS256,
        SigningAlgorithm::RS384,
        SigningAlgorithm::RS512,
        SigningAlgorithm::PS256,
        SigningAlgorithm::PS384,
        SigningAlgorithm::PS512,
        SigningAlgorithm::ES256,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SigningAlgorithm::RS256 => "RS256",
            SigningAlgorithm::RS384 => "RS384",
            SigningAlgorithm::RS512 => "RS512",
            SigningAlgorithm::PS256 => "PS256",
            SigningAlgorithm::PS384 => "PS384",
            SigningAlgorithm::PS512 => "PS512",
            SigningAlgorithm::ES256 => "ES256",
        }
    }

    pub fn family(&self) -> KeyFamily {
        match self {
            SigningAlgorithm::ES256 => KeyFamily::Ec,
            _ => KeyFamily::Rsa,
        }
    }
}

impl FromStr for SigningAlgorithm {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SigningAlgorithm::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| ParseEnumError::new("signing algorithm", s))
    }
}

impl std::fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// Stored as plain TEXT so new algorithms don't need a type migration
impl sqlx::Type<sqlx::Postgres> for SigningAlgorithm {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Postgres> for SigningAlgorithm {
    fn decode(
        value: sqlx::postgres::PgValueRef<'r>,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let s = <&str as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(s.parse::<SigningAlgorithm>()?)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Postgres> for SigningAlgorithm {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <&str as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.as_str(), buf)
    }
}

// Relying party id validation regex
lazy_static::lazy_static! {
    static ref RP_ID_REGEX: regex::Regex = regex::Regex::new(r"^[A-Za-z0-9._:-]+$").unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_request() -> CreateClientRequest {
        CreateClientRequest {
            client_name: "Health Portal".to_string(),
            rp_id: "rp.health-portal".to_string(),
            logo_uri: "https://app.example/logo.png".to_string(),
            redirect_uris: vec!["https://app.example/cb".to_string()],
            public_key: serde_json::json!({"kty": "EC"}),
            grant_types: vec!["authorization_code".to_string()],
            client_auth_methods: vec!["private_key_jwt".to_string()],
            claims: vec!["name".to_string()],
            acr_values: vec!["acr:otp".to_string()],
        }
    }

    #[test]
    fn test_enumerations_parse_their_wire_names() {
        assert_eq!("authorization_code".parse::<GrantType>(), Ok(GrantType::AuthorizationCode));
        assert_eq!("none".parse::<ClientAuthMethod>(), Ok(ClientAuthMethod::None));
        assert_eq!("ES256".parse::<SigningAlgorithm>(), Ok(SigningAlgorithm::ES256));

        let err = "implicit".parse::<GrantType>().unwrap_err();
        assert_eq!(err.to_string(), "unknown grant type: implicit");
        assert!("es256".parse::<SigningAlgorithm>().is_err());
    }

    #[test]
    fn test_algorithm_family() {
        assert_eq!(SigningAlgorithm::PS384.family(), KeyFamily::Rsa);
        assert_eq!(SigningAlgorithm::ES256.family().kty(), "EC");
    }

    #[test]
    fn test_status_serializes_upper_case() {
        assert_eq!(serde_json::to_string(&ClientStatus::Inactive).unwrap(), "\"INACTIVE\"");
        let status: ClientStatus = serde_json::from_str("\"ACTIVE\"").unwrap();
        assert_eq!(status, ClientStatus::Active);
    }

    #[test]
    fn test_create_request_length_and_format_rules() {
        assert!(create_request().validate().is_ok());

        let mut request = create_request();
        request.client_name = String::new();
        request.rp_id = "rp id with spaces".to_string();
        let errors = request.validate().unwrap_err();
        let fields: Vec<String> = errors.field_errors().keys().map(|k| k.to_string()).collect();
        assert!(fields.contains(&"client_name".to_string()));
        assert!(fields.contains(&"rp_id".to_string()));
    }

    #[test]
    fn test_update_request_ignores_unset_fields() {
        assert!(UpdateClientRequest::default().validate().is_ok());

        let request = UpdateClientRequest {
            client_name: Some(String::new()),
            ..Default::default()
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_update_request_rejects_immutable_fields() {
        let body = serde_json::json!({
            "client_name": "Health Portal v2",
            "public_key": {"kty": "EC", "crv": "P-256", "x": "AA", "y": "AA"},
        });
        let err = serde_json::from_value::<UpdateClientRequest>(body).unwrap_err();
        assert!(err.to_string().contains("public_key"), "{}", err);

        let body = serde_json::json!({ "client_id": "rp_other" });
        let err = serde_json::from_value::<UpdateClientRequest>(body).unwrap_err();
        assert!(err.to_string().contains("client_id"), "{}", err);

        let request: UpdateClientRequest =
            serde_json::from_value(serde_json::json!({ "status": "INACTIVE" })).unwrap();
        assert_eq!(request.status, Some(ClientStatus::Inactive));
    }

    #[test]
    fn test_requests_reject_misspelled_fields() {
        let body = serde_json::json!({ "client_nmae": "typo" });
        assert!(serde_json::from_value::<UpdateClientRequest>(body).is_err());

        let mut body = serde_json::to_value(create_request()).unwrap();
        body["redirect_uri"] = serde_json::json!("https://app.example/cb");
        let err = serde_json::from_value::<CreateClientRequest>(body).unwrap_err();
        assert!(err.to_string().contains("redirect_uri"), "{}", err);
    }
}
