//! Binding of client-supplied public keys.
//!
//! A JWK is checked against the policy, reduced to its public members and
//! identified by its RFC 7638 thumbprint. The canonical form stored with the
//! client carries `kid` = thumbprint so tokens can be matched back to it.

use crate::config::ClientPolicy;
use crate::error::KeyBindingError;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use jsonwebtoken::{Algorithm, DecodingKey};
use rp_models::{ClientDetail, KeyFamily, SigningAlgorithm};
use rsa::{traits::PublicKeyParts, BigUint, RsaPublicKey};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Members that only appear in private JWKs
const PRIVATE_MEMBERS: [&str; 8] = ["d", "p", "q", "dp", "dq", "qi", "oth", "k"];

/// Upper bound on accepted RSA moduli
pub(crate) const RSA_MAX_MODULUS_BITS: usize = 8192;

const P256_COORDINATE_LEN: usize = 32;

pub type Result<T> = std::result::Result<T, KeyBindingError>;

/// A public key accepted for a client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundKey {
    pub algorithm: SigningAlgorithm,
    /// RFC 7638 thumbprint, base64url without padding
    pub thumbprint: String,
    /// Sorted, whitespace-free JWK with `alg`, `kid` and `use` set
    pub canonical_jwk: String,
}

pub trait KeyBinder: Send + Sync {
    fn bind(&self, jwk: &Value) -> Result<BoundKey>;
}

pub struct JwkKeyBinder {
    algorithms: Vec<SigningAlgorithm>,
    min_rsa_modulus_bits: usize,
}

impl JwkKeyBinder {
    pub fn new(policy: &ClientPolicy) -> Self {
        Self {
            algorithms: policy.signing_algorithms.clone(),
            min_rsa_modulus_bits: policy.min_rsa_modulus_bits,
        }
    }

    fn resolve_algorithm(&self, members: &Map<String, Value>) -> Result<SigningAlgorithm> {
        let kty = string_member(members, "kty")?;
        let family = match kty {
            "RSA" => KeyFamily::Rsa,
            "EC" => KeyFamily::Ec,
            other => {
                return Err(KeyBindingError::UnsupportedAlgorithm(format!(
                    "key type `{}`",
                    other
                )))
            }
        };

        let algorithm = match members.get("alg") {
            None => match family {
                KeyFamily::Rsa => SigningAlgorithm::RS256,
                KeyFamily::Ec => SigningAlgorithm::ES256,
            },
            Some(Value::String(alg)) => alg
                .parse::<SigningAlgorithm>()
                .map_err(|_| KeyBindingError::UnsupportedAlgorithm(alg.clone()))?,
            Some(_) => return Err(malformed("`alg` must be a string")),
        };

        if algorithm.family() != family {
            return Err(malformed(format!(
                "`alg` {} does not match key type {}",
                algorithm, kty
            )));
        }
        if !self.algorithms.contains(&algorithm) {
            return Err(KeyBindingError::UnsupportedAlgorithm(format!(
                "{} is not enabled",
                algorithm
            )));
        }
        Ok(algorithm)
    }

    fn rsa_members(&self, members: &Map<String, Value>) -> Result<BTreeMap<&'static str, String>> {
        let n = string_member(members, "n")?;
        let e = string_member(members, "e")?;
        let n_bytes = decode_b64(n, "n")?;
        let e_bytes = decode_b64(e, "e")?;

        if n_bytes.first() == Some(&0) || e_bytes.first() == Some(&0) {
            return Err(malformed("RSA parameters must not have leading zero octets"));
        }

        let key = RsaPublicKey::new_with_max_size(
            BigUint::from_bytes_be(&n_bytes),
            BigUint::from_bytes_be(&e_bytes),
            RSA_MAX_MODULUS_BITS,
        )
        .map_err(|e| malformed(format!("invalid RSA key: {}", e)))?;

        let bits = key.n().bits();
        if bits < self.min_rsa_modulus_bits {
            return Err(malformed(format!(
                "RSA modulus is {} bits, at least {} required",
                bits, self.min_rsa_modulus_bits
            )));
        }

        Ok(BTreeMap::from([
            ("e", e.to_string()),
            ("kty", KeyFamily::Rsa.kty().to_string()),
            ("n", n.to_string()),
        ]))
    }

    fn ec_members(&self, members: &Map<String, Value>) -> Result<BTreeMap<&'static str, String>> {
        let crv = string_member(members, "crv")?;
        if crv != "P-256" {
            return Err(malformed(format!("curve `{}` is not P-256", crv)));
        }

        let x = string_member(members, "x")?;
        let y = string_member(members, "y")?;
        let x_bytes = decode_b64(x, "x")?;
        let y_bytes = decode_b64(y, "y")?;
        if x_bytes.len() != P256_COORDINATE_LEN || y_bytes.len() != P256_COORDINATE_LEN {
            return Err(malformed("P-256 coordinates must be 32 octets"));
        }

        let mut sec1 = Vec::with_capacity(1 + 2 * P256_COORDINATE_LEN);
        sec1.push(0x04);
        sec1.extend_from_slice(&x_bytes);
        sec1.extend_from_slice(&y_bytes);
        p256::PublicKey::from_sec1_bytes(&sec1)
            .map_err(|_| malformed("point is not on the P-256 curve"))?;

        Ok(BTreeMap::from([
            ("crv", crv.to_string()),
            ("kty", KeyFamily::Ec.kty().to_string()),
            ("x", x.to_string()),
            ("y", y.to_string()),
        ]))
    }
}

impl KeyBinder for JwkKeyBinder {
    fn bind(&self, jwk: &Value) -> Result<BoundKey> {
        let members = jwk
            .as_object()
            .ok_or_else(|| malformed("JWK must be a JSON object"))?;

        if let Some(member) = PRIVATE_MEMBERS.iter().find(|m| members.contains_key(**m)) {
            return Err(malformed(format!(
                "private key member `{}` must not be supplied",
                member
            )));
        }
        match members.get("use") {
            None => {}
            Some(Value::String(u)) if u == "sig" => {}
            Some(_) => return Err(malformed("`use` must be \"sig\"")),
        }

        let algorithm = self.resolve_algorithm(members)?;
        let required = match algorithm.family() {
            KeyFamily::Rsa => self.rsa_members(members)?,
            KeyFamily::Ec => self.ec_members(members)?,
        };

        let thumbprint = thumbprint(&required)?;

        let mut canonical = required;
        canonical.insert("alg", algorithm.to_string());
        canonical.insert("kid", thumbprint.clone());
        canonical.insert("use", "sig".to_string());
        let canonical_jwk = serde_json::to_string(&canonical)
            .map_err(|e| malformed(format!("failed to serialize JWK: {}", e)))?;

        Ok(BoundKey {
            algorithm,
            thumbprint,
            canonical_jwk,
        })
    }
}

/// RFC 7638 thumbprint over the required members
fn thumbprint(required: &BTreeMap<&'static str, String>) -> Result<String> {
    let json = serde_json::to_string(required)
        .map_err(|e| malformed(format!("failed to serialize JWK: {}", e)))?;
    Ok(URL_SAFE_NO_PAD.encode(Sha256::digest(json.as_bytes())))
}

/// Build a JWT verification key from a stored client's canonical JWK
pub fn verification_key(client: &ClientDetail) -> Result<(DecodingKey, Algorithm)> {
    let jwk: Value = serde_json::from_str(&client.public_key)
        .map_err(|e| malformed(format!("stored key is not valid JSON: {}", e)))?;
    let members = jwk
        .as_object()
        .ok_or_else(|| malformed("stored key is not a JSON object"))?;

    let key = match client.key_algorithm.family() {
        KeyFamily::Rsa => DecodingKey::from_rsa_components(
            string_member(members, "n")?,
            string_member(members, "e")?,
        ),
        KeyFamily::Ec => DecodingKey::from_ec_components(
            string_member(members, "x")?,
            string_member(members, "y")?,
        ),
    }
    .map_err(|e| malformed(format!("stored key is unusable: {}", e)))?;

    Ok((key, jwt_algorithm(client.key_algorithm)))
}

fn jwt_algorithm(algorithm: SigningAlgorithm) -> Algorithm {
    match algorithm {
        SigningAlgorithm::RS256 => Algorithm::RS256,
        SigningAlgorithm::RS384 => Algorithm::RS384,
        SigningAlgorithm::RS512 => Algorithm::RS512,
        SigningAlgorithm::PS256 => Algorithm::PS256,
        SigningAlgorithm::PS384 => Algorithm::PS384,
        SigningAlgorithm::PS512 => Algorithm::PS512,
        SigningAlgorithm::ES256 => Algorithm::ES256,
    }
}

fn string_member<'a>(members: &'a Map<String, Value>, name: &str) -> Result<&'a str> {
    match members.get(name) {
        Some(Value::String(value)) if !value.is_empty() => Ok(value),
        Some(_) => Err(malformed(format!("`{}` must be a non-empty string", name))),
        None => Err(malformed(format!("missing `{}`", name))),
    }
}

fn decode_b64(value: &str, name: &str) -> Result<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(value)
        .map_err(|_| malformed(format!("`{}` is not base64url", name)))
}

fn malformed(message: impl Into<String>) -> KeyBindingError {
    KeyBindingError::MalformedKey(message.into())
}
