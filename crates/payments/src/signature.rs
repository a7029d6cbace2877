//! Authenticity checks for inbound provider callbacks.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("no signing secret configured")]
    MissingSecret,

    #[error("malformed signature: {0}")]
    Malformed(String),

    #[error("signature mismatch")]
    Mismatch,

    #[error("timestamp outside tolerance ({age_secs}s)")]
    TimestampOutOfTolerance { age_secs: u64 },
}

/// Verifies `Stripe-Signature: t=<unix>,v1=<hex>[,v1=...]` headers.
///
/// The signed message is `"{t}.{raw body}"`, HMAC-SHA256 keyed by the
/// endpoint's signing secret. Any one matching `v1` entry is accepted
/// (Stripe sends several during secret rotation).
#[derive(Debug, Clone)]
pub struct StripeSignatureVerifier {
    secret: Option<String>,
    tolerance_secs: u64,
}

impl StripeSignatureVerifier {
    pub fn new(secret: Option<String>, tolerance_secs: u64) -> Self {
        Self {
            secret: secret.filter(|s| !s.trim().is_empty()),
            tolerance_secs,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.secret.is_some()
    }

    pub fn verify(&self, payload: &[u8], header: &str, now: DateTime<Utc>) -> Result<(), SignatureError> {
        let secret = self.secret.as_deref().ok_or(SignatureError::MissingSecret)?;

        let mut timestamp = None;
        let mut candidates = Vec::new();
        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", t)) => timestamp = Some(t),
                Some(("v1", v)) => candidates.push(v),
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or_else(|| SignatureError::Malformed("missing t".to_string()))?;
        if candidates.is_empty() {
            return Err(SignatureError::Malformed("missing v1".to_string()));
        }
        let ts: i64 = timestamp
            .parse()
            .map_err(|_| SignatureError::Malformed("timestamp is not an integer".to_string()))?;

        let age_secs = now.timestamp().abs_diff(ts);
        if age_secs > self.tolerance_secs {
            return Err(SignatureError::TimestampOutOfTolerance { age_secs });
        }

        let mac = signed_mac(secret, timestamp, payload)?;
        let matched = candidates.iter().any(|candidate| {
            hex::decode(candidate)
                .map(|bytes| mac.clone().verify_slice(&bytes).is_ok())
                .unwrap_or(false)
        });
        if matched { Ok(()) } else { Err(SignatureError::Mismatch) }
    }

    /// Header value a provider would send for `payload` at `timestamp`.
    pub fn sign(&self, payload: &[u8], timestamp: i64) -> Result<String, SignatureError> {
        let secret = self.secret.as_deref().ok_or(SignatureError::MissingSecret)?;
        let ts = timestamp.to_string();
        let mac = signed_mac(secret, &ts, payload)?;
        Ok(format!("t={ts},v1={}", hex::encode(mac.finalize().into_bytes())))
    }
}

fn signed_mac(secret: &str, timestamp: &str, payload: &[u8]) -> Result<HmacSha256, SignatureError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| SignatureError::Malformed(e.to_string()))?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}

/// Verifies SSLCommerz IPN `verify_sign` / `verify_key` fields.
///
/// `verify_key` lists the signed field names. The digest is md5 over those
/// fields plus `store_passwd=md5(store password)`, sorted by key and joined
/// as `k=v&k=v`.
#[derive(Debug, Clone)]
pub struct SslcommerzSignatureVerifier {
    store_password: Option<String>,
}

impl SslcommerzSignatureVerifier {
    pub fn new(store_password: Option<String>) -> Self {
        Self {
            store_password: store_password.filter(|s| !s.trim().is_empty()),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.store_password.is_some()
    }

    pub fn verify(&self, fields: &BTreeMap<String, String>) -> Result<(), SignatureError> {
        let password = self.store_password.as_deref().ok_or(SignatureError::MissingSecret)?;
        let sign = fields
            .get("verify_sign")
            .ok_or_else(|| SignatureError::Malformed("missing verify_sign".to_string()))?;
        let key = fields
            .get("verify_key")
            .ok_or_else(|| SignatureError::Malformed("missing verify_key".to_string()))?;

        let expected = digest(password, key, fields)?;
        if constant_time_eq(expected.as_bytes(), sign.trim().to_ascii_lowercase().as_bytes()) {
            Ok(())
        } else {
            Err(SignatureError::Mismatch)
        }
    }

    /// Adds `verify_key` and `verify_sign` over every field already present.
    pub fn sign(&self, fields: &mut BTreeMap<String, String>) -> Result<(), SignatureError> {
        let password = self.store_password.as_deref().ok_or(SignatureError::MissingSecret)?;
        fields.remove("verify_sign");
        fields.remove("verify_key");
        let key = fields.keys().cloned().collect::<Vec<_>>().join(",");
        let sign = digest(password, &key, fields)?;
        fields.insert("verify_key".to_string(), key);
        fields.insert("verify_sign".to_string(), sign);
        Ok(())
    }
}

fn digest(password: &str, verify_key: &str, fields: &BTreeMap<String, String>) -> Result<String, SignatureError> {
    let mut signed = BTreeMap::new();
    for name in verify_key.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        let value = fields
            .get(name)
            .ok_or_else(|| SignatureError::Malformed(format!("signed field '{name}' is missing")))?;
        signed.insert(name, value.as_str());
    }
    let password_hash = format!("{:x}", md5::compute(password.as_bytes()));
    signed.insert("store_passwd", password_hash.as_str());

    let joined = signed
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");
    Ok(format!("{:x}", md5::compute(joined.as_bytes())))
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
