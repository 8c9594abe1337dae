//! Structural and policy validation of client registrations.
//!
//! Everything here is pure: no I/O, no side effects. Every check runs and
//! all violations are returned together so callers can report each bad
//! field at once.

use crate::config::ClientPolicy;
use crate::error::{violations_from, FieldViolation};
use rp_models::{ClientAuthMethod, ClientDetail, CreateClientRequest, GrantType, UpdateClientRequest};
use std::collections::HashSet;
use std::str::FromStr;
use url::{Host, Url};
use validator::Validate;

/// The policy-relevant part of a client, borrowed from a request or a record
#[derive(Debug, Clone, Copy)]
pub struct ClientDraft<'a> {
    pub logo_uri: &'a str,
    pub redirect_uris: &'a [String],
    pub grant_types: &'a [String],
    pub client_auth_methods: &'a [String],
    pub claims: &'a [String],
    pub acr_values: &'a [String],
    /// Only present on registration; bound keys are not re-validated here
    pub public_key: Option<&'a serde_json::Value>,
}

impl<'a> ClientDraft<'a> {
    pub fn from_create(request: &'a CreateClientRequest) -> Self {
        Self {
            logo_uri: &request.logo_uri,
            redirect_uris: &request.redirect_uris,
            grant_types: &request.grant_types,
            client_auth_methods: &request.client_auth_methods,
            claims: &request.claims,
            acr_values: &request.acr_values,
            public_key: Some(&request.public_key),
        }
    }

    pub fn from_record(client: &'a ClientDetail) -> Self {
        Self {
            logo_uri: &client.logo_uri,
            redirect_uris: &client.redirect_uris,
            grant_types: &client.grant_types,
            client_auth_methods: &client.client_auth_methods,
            claims: &client.claims,
            acr_values: &client.acr_values,
            public_key: None,
        }
    }
}

/// Validate a registration request
pub fn validate_create(
    policy: &ClientPolicy,
    request: &CreateClientRequest,
) -> Result<(), Vec<FieldViolation>> {
    let mut violations = request
        .validate()
        .err()
        .map(|e| violations_from(&e))
        .unwrap_or_default();
    violations.extend(check_draft(policy, &ClientDraft::from_create(request)));
    into_result(violations)
}

/// Validate an update: the request's own field rules plus the merged record it would produce
pub fn validate_update(
    policy: &ClientPolicy,
    request: &UpdateClientRequest,
    merged: &ClientDetail,
) -> Result<(), Vec<FieldViolation>> {
    let mut violations = request
        .validate()
        .err()
        .map(|e| violations_from(&e))
        .unwrap_or_default();
    violations.extend(check_draft(policy, &ClientDraft::from_record(merged)));
    into_result(violations)
}

/// Run every policy check against a draft
pub fn check_draft(policy: &ClientPolicy, draft: &ClientDraft<'_>) -> Vec<FieldViolation> {
    let mut violations = Vec::new();

    check_logo_uri(draft.logo_uri, &mut violations);
    check_redirect_uris(policy, draft.redirect_uris, &mut violations);

    check_required("grant_types", draft.grant_types, &mut violations);
    check_enumerated::<GrantType>("grant_types", draft.grant_types, &policy.grant_types, &mut violations);

    check_required("client_auth_methods", draft.client_auth_methods, &mut violations);
    check_enumerated::<ClientAuthMethod>(
        "client_auth_methods",
        draft.client_auth_methods,
        &policy.auth_methods,
        &mut violations,
    );

    check_catalog("claims", draft.claims, &policy.claims_catalog, &mut violations);

    check_required("acr_values", draft.acr_values, &mut violations);
    check_catalog("acr_values", draft.acr_values, &policy.acr_catalog, &mut violations);

    if let Some(public_key) = draft.public_key {
        check_public_key_shape(public_key, &mut violations);
    }

    violations
}

fn into_result(violations: Vec<FieldViolation>) -> Result<(), Vec<FieldViolation>> {
    if violations.is_empty() {
        Ok(())
    } else {
        Err(violations)
    }
}

fn check_required(field: &str, values: &[String], violations: &mut Vec<FieldViolation>) {
    if values.is_empty() {
        violations.push(FieldViolation::new(
            field,
            "required",
            "at least one value is required",
        ));
    }
}

fn check_duplicates(field: &str, values: &[String], violations: &mut Vec<FieldViolation>) {
    let mut seen = HashSet::new();
    for value in values {
        if !seen.insert(value.as_str()) {
            violations.push(FieldViolation::new(
                field,
                "duplicate",
                format!("`{}` is listed more than once", value),
            ));
        }
    }
}

fn check_enumerated<T>(
    field: &str,
    values: &[String],
    enabled: &[T],
    violations: &mut Vec<FieldViolation>,
) where
    T: FromStr + PartialEq,
{
    for value in values {
        match value.parse::<T>() {
            Ok(parsed) if enabled.contains(&parsed) => {}
            Ok(_) => violations.push(FieldViolation::new(
                field,
                "not_allowed",
                format!("`{}` is not enabled for registration", value),
            )),
            Err(_) => violations.push(FieldViolation::new(
                field,
                "unknown_value",
                format!("`{}` is not a recognised value", value),
            )),
        }
    }
    check_duplicates(field, values, violations);
}

fn check_catalog(
    field: &str,
    values: &[String],
    catalog: &[String],
    violations: &mut Vec<FieldViolation>,
) {
    for value in values.iter().filter(|v| !catalog.contains(v)) {
        violations.push(FieldViolation::new(
            field,
            "unknown_value",
            format!("`{}` is not in the catalog", value),
        ));
    }
    check_duplicates(field, values, violations);
}

fn check_logo_uri(logo_uri: &str, violations: &mut Vec<FieldViolation>) {
    // Emptiness is reported by the request's length rule
    if logo_uri.is_empty() {
        return;
    }
    match Url::parse(logo_uri) {
        Ok(url) if url.scheme() == "https" => {}
        Ok(_) => violations.push(FieldViolation::new(
            "logo_uri",
            "scheme_not_allowed",
            "logo URI must use https",
        )),
        Err(e) => violations.push(FieldViolation::new(
            "logo_uri",
            "invalid_uri",
            format!("logo URI is not an absolute URI: {}", e),
        )),
    }
}

fn check_redirect_uris(policy: &ClientPolicy, uris: &[String], violations: &mut Vec<FieldViolation>) {
    if uris.is_empty() {
        violations.push(FieldViolation::new(
            "redirect_uris",
            "required",
            "at least one redirect URI is required",
        ));
        return;
    }
    if uris.len() > policy.max_redirect_uris {
        violations.push(FieldViolation::new(
            "redirect_uris",
            "too_many",
            format!("at most {} redirect URIs may be registered", policy.max_redirect_uris),
        ));
    }

    for uri in uris {
        if let Err((code, message)) = check_redirect_uri(policy, uri) {
            violations.push(FieldViolation::new(
                "redirect_uris",
                code,
                format!("`{}`: {}", uri, message),
            ));
        }
    }
    check_duplicates("redirect_uris", uris, violations);
}

fn check_redirect_uri(policy: &ClientPolicy, raw: &str) -> Result<(), (&'static str, String)> {
    if raw.contains('*') {
        return Err(("wildcard_not_allowed", "wildcards are not allowed".to_string()));
    }

    let url = Url::parse(raw).map_err(|e| ("invalid_uri", format!("not an absolute URI: {}", e)))?;

    if url.fragment().is_some() {
        return Err(("fragment_not_allowed", "fragments are not allowed".to_string()));
    }

    let scheme = url.scheme();
    if scheme == "http" {
        if !(policy.allow_loopback_http && is_loopback(&url)) {
            return Err((
                "scheme_not_allowed",
                "plain http is only accepted for loopback redirects".to_string(),
            ));
        }
    } else if !policy.redirect_schemes.iter().any(|s| s == scheme) {
        return Err(("scheme_not_allowed", format!("scheme `{}` is not allowed", scheme)));
    }

    // Private-use schemes may omit the authority (`com.example.app:/cb`) but not leave it empty
    match url.host_str() {
        Some("") => return Err(("invalid_uri", "empty host".to_string())),
        None if matches!(scheme, "http" | "https") => {
            return Err(("invalid_uri", format!("{} redirect URIs need a host", scheme)));
        }
        _ => {}
    }

    Ok(())
}

fn is_loopback(url: &Url) -> bool {
    match url.host() {
        Some(Host::Domain(domain)) => domain == "localhost",
        Some(Host::Ipv4(ip)) => ip.is_loopback(),
        Some(Host::Ipv6(ip)) => ip.is_loopback(),
        None => false,
    }
}

fn check_public_key_shape(public_key: &serde_json::Value, violations: &mut Vec<FieldViolation>) {
    match public_key {
        serde_json::Value::Null => violations.push(FieldViolation::new(
            "public_key",
            "required",
            "a public key is required",
        )),
        serde_json::Value::Object(members) => match members.get("kty") {
            Some(serde_json::Value::String(kty)) if !kty.is_empty() => {}
            _ => violations.push(FieldViolation::new(
                "public_key",
                "invalid_format",
                "public key must be a JWK with a `kty` member",
            )),
        },
        _ => violations.push(FieldViolation::new(
            "public_key",
            "invalid_format",
            "public key must be a JWK object",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn valid_request() -> CreateClientRequest {
        CreateClientRequest {
            client_name: "Health Portal".to_string(),
            rp_id: "rp-health".to_string(),
            logo_uri: "https://app.example/logo.png".to_string(),
            redirect_uris: strings(&["https://app.example/cb"]),
            public_key: json!({"kty": "EC", "crv": "P-256", "x": "x", "y": "y"}),
            grant_types: strings(&["authorization_code"]),
            client_auth_methods: strings(&["private_key_jwt"]),
            claims: strings(&["name", "email"]),
            acr_values: strings(&["acr:otp"]),
        }
    }

    fn fields(violations: &[FieldViolation]) -> Vec<&str> {
        violations.iter().map(|v| v.field.as_str()).collect()
    }

    fn codes_for<'a>(violations: &'a [FieldViolation], field: &str) -> Vec<&'a str> {
        violations
            .iter()
            .filter(|v| v.field == field)
            .map(|v| v.code.as_str())
            .collect()
    }

    #[test]
    fn test_valid_request_passes() {
        assert!(validate_create(&ClientPolicy::default(), &valid_request()).is_ok());
    }

    #[test]
    fn test_empty_redirect_uris_named() {
        let mut request = valid_request();
        request.redirect_uris.clear();

        let violations = validate_create(&ClientPolicy::default(), &request).unwrap_err();
        assert_eq!(codes_for(&violations, "redirect_uris"), vec!["required"]);
    }

    #[test]
    fn test_all_violations_are_reported_together() {
        let mut request = valid_request();
        request.client_name = String::new();
        request.redirect_uris.clear();
        request.grant_types = strings(&["implicit"]);
        request.claims = strings(&["shoe_size"]);
        request.acr_values.clear();
        request.public_key = serde_json::Value::Null;

        let violations = validate_create(&ClientPolicy::default(), &request).unwrap_err();
        let fields = fields(&violations);
        for field in [
            "client_name",
            "redirect_uris",
            "grant_types",
            "claims",
            "acr_values",
            "public_key",
        ] {
            assert!(fields.contains(&field), "missing violation for {}", field);
        }
    }

    #[test]
    fn test_redirect_uri_rules() {
        let policy = ClientPolicy::default();
        let cases = [
            ("app/cb", "invalid_uri"),
            ("https://app.example/cb#frag", "fragment_not_allowed"),
            ("https://*.app.example/cb", "wildcard_not_allowed"),
            ("http://app.example/cb", "scheme_not_allowed"),
            ("http://localhost:3000/cb", "scheme_not_allowed"),
            ("javascript:alert(1)", "scheme_not_allowed"),
            ("com.example.app:/cb", "scheme_not_allowed"),
        ];

        for (uri, expected) in cases {
            let mut request = valid_request();
            request.redirect_uris = strings(&[uri]);
            let violations = validate_create(&policy, &request).unwrap_err();
            assert_eq!(codes_for(&violations, "redirect_uris"), vec![expected], "uri {}", uri);
        }
    }

    #[test]
    fn test_custom_scheme_and_loopback_when_enabled() {
        let policy = ClientPolicy {
            redirect_schemes: strings(&["https", "com.example.app"]),
            allow_loopback_http: true,
            ..ClientPolicy::default()
        };
        let mut request = valid_request();
        request.redirect_uris = strings(&[
            "https://app.example/cb",
            "com.example.app:/oauth2redirect",
            "http://localhost:3000/cb",
            "http://127.0.0.1/cb",
        ]);
        assert!(validate_create(&policy, &request).is_ok());

        request.redirect_uris = strings(&["http://evil.example/cb"]);
        assert!(validate_create(&policy, &request).is_err());

        request.redirect_uris = strings(&["com.example.app:///oauth2redirect"]);
        let violations = validate_create(&policy, &request).unwrap_err();
        assert_eq!(codes_for(&violations, "redirect_uris"), vec!["invalid_uri"]);
    }

    #[test]
    fn test_duplicates_and_limits() {
        let policy = ClientPolicy {
            max_redirect_uris: 1,
            ..ClientPolicy::default()
        };
        let mut request = valid_request();
        request.redirect_uris = strings(&["https://app.example/cb", "https://app.example/cb"]);
        request.grant_types = strings(&["authorization_code", "authorization_code"]);

        let violations = validate_create(&policy, &request).unwrap_err();
        assert_eq!(
            codes_for(&violations, "redirect_uris"),
            vec!["too_many", "duplicate"]
        );
        assert_eq!(codes_for(&violations, "grant_types"), vec!["duplicate"]);
    }

    #[test]
    fn test_known_but_disabled_values() {
        let mut request = valid_request();
        request.grant_types = strings(&["client_credentials"]);
        request.client_auth_methods = strings(&["client_secret_basic", "magic"]);

        let violations = validate_create(&ClientPolicy::default(), &request).unwrap_err();
        assert_eq!(codes_for(&violations, "grant_types"), vec!["not_allowed"]);
        assert_eq!(
            codes_for(&violations, "client_auth_methods"),
            vec!["not_allowed", "unknown_value"]
        );
    }

    #[test]
    fn test_logo_uri_must_be_https() {
        let mut request = valid_request();
        request.logo_uri = "http://app.example/logo.png".to_string();
        let violations = validate_create(&ClientPolicy::default(), &request).unwrap_err();
        assert_eq!(codes_for(&violations, "logo_uri"), vec!["scheme_not_allowed"]);
    }

    #[test]
    fn test_public_key_shape() {
        let mut request = valid_request();
        request.public_key = json!("-----BEGIN PUBLIC KEY-----");
        let violations = validate_create(&ClientPolicy::default(), &request).unwrap_err();
        assert_eq!(codes_for(&violations, "public_key"), vec!["invalid_format"]);

        request.public_key = json!({"n": "abc"});
        let violations = validate_create(&ClientPolicy::default(), &request).unwrap_err();
        assert_eq!(codes_for(&violations, "public_key"), vec!["invalid_format"]);
    }

    #[test]
    fn test_update_checks_merged_record() {
        let request = valid_request();
        let merged = ClientDetail {
            client_id: "rp_1".to_string(),
            client_name: request.client_name.clone(),
            rp_id: request.rp_id.clone(),
            logo_uri: request.logo_uri.clone(),
            redirect_uris: vec![],
            public_key: "{}".to_string(),
            public_key_thumbprint: "tp".to_string(),
            key_algorithm: rp_models::SigningAlgorithm::ES256,
            grant_types: request.grant_types.clone(),
            client_auth_methods: request.client_auth_methods.clone(),
            claims: request.claims.clone(),
            acr_values: request.acr_values.clone(),
            status: rp_models::ClientStatus::Active,
            version: 1,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };
        let update = UpdateClientRequest {
            redirect_uris: Some(vec![]),
            ..Default::default()
        };

        let violations = validate_update(&ClientPolicy::default(), &update, &merged).unwrap_err();
        assert_eq!(fields(&violations), vec!["redirect_uris"]);
    }
}
