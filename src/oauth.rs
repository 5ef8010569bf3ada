//! OAuth 1.0a request signing (HMAC-SHA1).

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::{Hmac, Mac};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use rand::Rng;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::Credentials;

/// Everything outside the RFC 3986 unreserved set is percent-encoded.
const RFC3986: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

type HmacSha1 = Hmac<sha1::Sha1>;

/// Signs requests on behalf of one set of credentials.
#[derive(Debug, Clone)]
pub struct Signer {
    credentials: Credentials,
}

impl Signer {
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }

    /// Build an `Authorization` header value for one request. `params` are the
    /// form parameters that take part in the signature; binary payloads and
    /// JSON bodies must not be passed here. Every call uses a fresh timestamp
    /// and nonce.
    pub fn authorization_header(&self, method: &str, url: &str, params: &[(&str, &str)]) -> String {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        self.header_with(method, url, params, timestamp, &nonce())
    }

    /// `authorization_header` with a fixed timestamp and nonce.
    pub(crate) fn header_with(
        &self,
        method: &str,
        url: &str,
        params: &[(&str, &str)],
        timestamp: u64,
        nonce: &str,
    ) -> String {
        let timestamp = timestamp.to_string();
        let mut oauth_params = vec![
            ("oauth_consumer_key", self.credentials.consumer_key.as_str()),
            ("oauth_nonce", nonce),
            ("oauth_signature_method", "HMAC-SHA1"),
            ("oauth_timestamp", timestamp.as_str()),
            ("oauth_token", self.credentials.access_token.as_str()),
            ("oauth_version", "1.0"),
        ];

        let mut all_params = oauth_params.clone();
        all_params.extend_from_slice(params);

        let base_string = signature_base_string(method, url, &all_params);
        let signature = self.sign(&base_string);
        oauth_params.push(("oauth_signature", signature.as_str()));
        oauth_params.sort();

        let header_parts: Vec<String> = oauth_params
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", pct_encode(k), pct_encode(v)))
            .collect();

        format!("OAuth {}", header_parts.join(", "))
    }

    fn sign(&self, base_string: &str) -> String {
        let signing_key = format!(
            "{}&{}",
            pct_encode(&self.credentials.consumer_secret),
            pct_encode(&self.credentials.access_token_secret)
        );

        let mut mac = HmacSha1::new_from_slice(signing_key.as_bytes())
            .expect("HMAC accepts any key length");
        mac.update(base_string.as_bytes());
        BASE64.encode(mac.finalize().into_bytes())
    }
}

/// `METHOD&enc(url)&enc(sorted params)`, with parameters sorted by encoded key
/// and then encoded value.
pub fn signature_base_string(method: &str, url: &str, params: &[(&str, &str)]) -> String {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (pct_encode(k), pct_encode(v)))
        .collect();
    encoded.sort();

    let param_string = encoded
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    format!(
        "{}&{}&{}",
        method.to_uppercase(),
        pct_encode(url),
        pct_encode(&param_string)
    )
}

pub fn pct_encode(input: &str) -> String {
    utf8_percent_encode(input, RFC3986).to_string()
}

fn nonce() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill(&mut bytes);
    hex::encode(bytes)
}

/// Lowercase hex for the nonce bytes.
mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes
            .as_ref()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect()
    }
}
