use crate::error::{ClientError, Result};
use crate::key_binder::RSA_MAX_MODULUS_BITS;
use rp_models::{ClientAuthMethod, GrantType, SigningAlgorithm};
use std::fmt::Display;
use std::str::FromStr;

/// Smallest RSA modulus the policy can be configured down to
const RSA_MODULUS_FLOOR_BITS: usize = 2048;

/// Schemes that execute or read content locally instead of reaching a client
const UNSAFE_REDIRECT_SCHEMES: [&str; 6] =
    ["javascript", "data", "file", "vbscript", "about", "blob"];

/// Whether management reads return INACTIVE clients
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadVisibility {
    ActiveOnly,
    IncludeInactive,
}

impl FromStr for ReadVisibility {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "active_only" => Ok(ReadVisibility::ActiveOnly),
            "include_inactive" => Ok(ReadVisibility::IncludeInactive),
            other => Err(format!("unknown read visibility: {}", other)),
        }
    }
}

/// Registration policy shared by the validator and the key binder.
///
/// Loaded once at startup and handed to the service by reference.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientPolicy {
    /// Redirect URI schemes accepted besides loopback `http`
    pub redirect_schemes: Vec<String>,
    /// Accept `http://localhost`, `http://127.0.0.1` and `http://[::1]` redirects
    pub allow_loopback_http: bool,
    pub max_redirect_uris: usize,
    pub grant_types: Vec<GrantType>,
    pub auth_methods: Vec<ClientAuthMethod>,
    pub signing_algorithms: Vec<SigningAlgorithm>,
    pub min_rsa_modulus_bits: usize,
    pub claims_catalog: Vec<String>,
    pub acr_catalog: Vec<String>,
    pub read_visibility: ReadVisibility,
}

impl Default for ClientPolicy {
    fn default() -> Self {
        Self {
            redirect_schemes: vec!["https".to_string()],
            allow_loopback_http: false,
            max_redirect_uris: 20,
            grant_types: vec![GrantType::AuthorizationCode],
            auth_methods: vec![ClientAuthMethod::PrivateKeyJwt],
            signing_algorithms: vec![
                SigningAlgorithm::RS256,
                SigningAlgorithm::PS256,
                SigningAlgorithm::ES256,
            ],
            min_rsa_modulus_bits: RSA_MODULUS_FLOOR_BITS,
            claims_catalog: [
                "name",
                "given_name",
                "middle_name",
                "family_name",
                "nickname",
                "preferred_username",
                "gender",
                "birthdate",
                "email",
                "email_verified",
                "phone_number",
                "phone_number_verified",
                "address",
                "picture",
                "locale",
            ]
            .iter()
            .map(|c| c.to_string())
            .collect(),
            acr_catalog: ["acr:password", "acr:otp", "acr:biometrics", "acr:wallet"]
                .iter()
                .map(|a| a.to_string())
                .collect(),
            read_visibility: ReadVisibility::ActiveOnly,
        }
    }
}

impl ClientPolicy {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a policy from `CLIENT_*` settings, falling back to defaults for unset keys
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let policy = Self {
            redirect_schemes: match get("CLIENT_REDIRECT_SCHEMES") {
                Some(raw) => split_list(&raw)
                    .into_iter()
                    .map(|s| s.to_ascii_lowercase())
                    .collect(),
                None => defaults.redirect_schemes,
            },
            allow_loopback_http: match get("CLIENT_ALLOW_LOOPBACK_HTTP") {
                Some(raw) => parse_value("CLIENT_ALLOW_LOOPBACK_HTTP", &raw)?,
                None => defaults.allow_loopback_http,
            },
            max_redirect_uris: match get("CLIENT_MAX_REDIRECT_URIS") {
                Some(raw) => parse_value("CLIENT_MAX_REDIRECT_URIS", &raw)?,
                None => defaults.max_redirect_uris,
            },
            grant_types: match get("CLIENT_GRANT_TYPES") {
                Some(raw) => parse_list("CLIENT_GRANT_TYPES", &raw)?,
                None => defaults.grant_types,
            },
            auth_methods: match get("CLIENT_AUTH_METHODS") {
                Some(raw) => parse_list("CLIENT_AUTH_METHODS", &raw)?,
                None => defaults.auth_methods,
            },
            signing_algorithms: match get("CLIENT_SIGNING_ALGORITHMS") {
                Some(raw) => parse_list("CLIENT_SIGNING_ALGORITHMS", &raw)?,
                None => defaults.signing_algorithms,
            },
            min_rsa_modulus_bits: match get("CLIENT_MIN_RSA_MODULUS_BITS") {
                Some(raw) => parse_value("CLIENT_MIN_RSA_MODULUS_BITS", &raw)?,
                None => defaults.min_rsa_modulus_bits,
            },
            claims_catalog: get("CLIENT_CLAIMS")
                .map(|raw| split_list(&raw))
                .unwrap_or(defaults.claims_catalog),
            acr_catalog: get("CLIENT_ACR_VALUES")
                .map(|raw| split_list(&raw))
                .unwrap_or(defaults.acr_catalog),
            read_visibility: match get("CLIENT_READ_VISIBILITY") {
                Some(raw) => parse_value("CLIENT_READ_VISIBILITY", &raw)?,
                None => defaults.read_visibility,
            },
        };

        policy.check()?;
        Ok(policy)
    }

    /// Reject policies that could never accept a registration
    pub fn check(&self) -> Result<()> {
        if self.redirect_schemes.is_empty() && !self.allow_loopback_http {
            return Err(config_error("no redirect URI scheme is allowed"));
        }
        if let Some(scheme) = self.redirect_schemes.iter().find(|s| s.as_str() == "http") {
            return Err(config_error(format!(
                "`{}` cannot be allow-listed, use CLIENT_ALLOW_LOOPBACK_HTTP",
                scheme
            )));
        }
        if let Some(scheme) = self
            .redirect_schemes
            .iter()
            .find(|s| UNSAFE_REDIRECT_SCHEMES.contains(&s.as_str()))
        {
            return Err(config_error(format!(
                "`{}` URIs cannot receive authorization responses",
                scheme
            )));
        }
        if self.max_redirect_uris == 0 {
            return Err(config_error("max_redirect_uris must be at least 1"));
        }
        if self.grant_types.is_empty() {
            return Err(config_error("at least one grant type must be enabled"));
        }
        if self.auth_methods.is_empty() {
            return Err(config_error("at least one client auth method must be enabled"));
        }
        if self.signing_algorithms.is_empty() {
            return Err(config_error("at least one signing algorithm must be enabled"));
        }
        if self.min_rsa_modulus_bits < RSA_MODULUS_FLOOR_BITS {
            return Err(config_error(format!(
                "min_rsa_modulus_bits must be at least {}",
                RSA_MODULUS_FLOOR_BITS
            )));
        }
        if self.min_rsa_modulus_bits > RSA_MAX_MODULUS_BITS {
            return Err(config_error(format!(
                "min_rsa_modulus_bits cannot exceed {}",
                RSA_MAX_MODULUS_BITS
            )));
        }
        if self.acr_catalog.is_empty() {
            return Err(config_error("the ACR catalog cannot be empty"));
        }
        Ok(())
    }
}

fn config_error(message: impl Into<String>) -> ClientError {
    ClientError::Configuration(message.into())
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    raw.trim()
        .parse()
        .map_err(|e| config_error(format!("{}: {}", key, e)))
}

fn parse_list<T>(key: &str, raw: &str) -> Result<Vec<T>>
where
    T: FromStr,
    T::Err: Display,
{
    split_list(raw)
        .iter()
        .map(|item| parse_value(key, item))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let policy = ClientPolicy::default();
        assert!(policy.check().is_ok());
        assert_eq!(policy.read_visibility, ReadVisibility::ActiveOnly);
        assert_eq!(ClientPolicy::from_lookup(lookup(&[])).unwrap(), policy);
    }

    #[test]
    fn test_overrides_from_lookup() {
        let policy = ClientPolicy::from_lookup(lookup(&[
            ("CLIENT_REDIRECT_SCHEMES", "https, IO.Example.App"),
            ("CLIENT_ALLOW_LOOPBACK_HTTP", "true"),
            ("CLIENT_GRANT_TYPES", "authorization_code,refresh_token"),
            ("CLIENT_SIGNING_ALGORITHMS", "ES256"),
            ("CLIENT_READ_VISIBILITY", "include_inactive"),
            ("CLIENT_CLAIMS", "name,email"),
        ]))
        .unwrap();

        assert_eq!(policy.redirect_schemes, vec!["https", "io.example.app"]);
        assert!(policy.allow_loopback_http);
        assert_eq!(
            policy.grant_types,
            vec![GrantType::AuthorizationCode, GrantType::RefreshToken]
        );
        assert_eq!(policy.signing_algorithms, vec![SigningAlgorithm::ES256]);
        assert_eq!(policy.read_visibility, ReadVisibility::IncludeInactive);
        assert_eq!(policy.claims_catalog, vec!["name", "email"]);
    }

    #[test]
    fn test_unknown_enumerated_value_is_a_configuration_error() {
        let err = ClientPolicy::from_lookup(lookup(&[("CLIENT_GRANT_TYPES", "implicit")]))
            .unwrap_err();
        assert!(matches!(err, ClientError::Configuration(_)));
        assert!(err.to_string().contains("CLIENT_GRANT_TYPES"));

        let err = ClientPolicy::from_lookup(lookup(&[("CLIENT_SIGNING_ALGORITHMS", "HS256")]))
            .unwrap_err();
        assert!(matches!(err, ClientError::Configuration(_)));
    }

    #[test]
    fn test_weak_rsa_floor_is_rejected() {
        let err = ClientPolicy::from_lookup(lookup(&[("CLIENT_MIN_RSA_MODULUS_BITS", "1024")]))
            .unwrap_err();
        assert!(matches!(err, ClientError::Configuration(_)));
    }

    #[test]
    fn test_rsa_floor_above_supported_maximum_is_rejected() {
        let err = ClientPolicy::from_lookup(lookup(&[("CLIENT_MIN_RSA_MODULUS_BITS", "16384")]))
            .unwrap_err();
        assert!(matches!(err, ClientError::Configuration(_)));
        assert!(err.to_string().contains("8192"));

        let policy =
            ClientPolicy::from_lookup(lookup(&[("CLIENT_MIN_RSA_MODULUS_BITS", "8192")])).unwrap();
        assert_eq!(policy.min_rsa_modulus_bits, RSA_MAX_MODULUS_BITS);
    }

    #[test]
    fn test_local_content_schemes_cannot_be_allow_listed() {
        for scheme in ["javascript", "data", "FILE"] {
            let schemes = format!("https,{}", scheme);
            let vars = [("CLIENT_REDIRECT_SCHEMES", schemes.as_str())];
            let err = ClientPolicy::from_lookup(lookup(&vars)).unwrap_err();
            assert!(matches!(err, ClientError::Configuration(_)), "{}", scheme);
        }
    }

    #[test]
    fn test_plain_http_cannot_be_allow_listed() {
        let err = ClientPolicy::from_lookup(lookup(&[("CLIENT_REDIRECT_SCHEMES", "https,http")]))
            .unwrap_err();
        assert!(matches!(err, ClientError::Configuration(_)));
    }
}
