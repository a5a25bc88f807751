//! Shared Key request signing.

use crate::error::{ErrorKind, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use exn::ResultExt;
use hmac::{Hmac, Mac};
use reqwest::header::HeaderMap;
use reqwest::{Method, Url};
use sha2::Sha256;
use std::collections::BTreeMap;
use std::fmt;

type HmacSha256 = Hmac<Sha256>;

/// Standard headers that take part in the signature, in signing order.
const SIGNED_HEADERS: [&str; 10] = [
    "content-encoding",
    "content-language",
    "content-md5",
    "content-type",
    "date",
    "if-modified-since",
    "if-match",
    "if-none-match",
    "if-unmodified-since",
    "range",
];

pub(super) struct SharedKey {
    account: String,
    key: Vec<u8>,
}
impl SharedKey {
    pub(super) fn new(account: impl Into<String>, key: &str) -> Result<Self> {
        let account = account.into();
        if account.is_empty() {
            exn::bail!(ErrorKind::InvalidCredentials("account name is empty".to_string()));
        }
        let key = STANDARD
            .decode(key.trim())
            .or_raise(|| ErrorKind::InvalidCredentials("account key is not valid base64".to_string()))?;
        Ok(Self { account, key })
    }

    pub(super) fn account(&self) -> &str {
        &self.account
    }

    /// Value for the `Authorization` header of a request.
    pub(super) fn authorization(
        &self,
        method: &Method,
        url: &Url,
        headers: &HeaderMap,
        content_length: usize,
    ) -> Result<String> {
        let string_to_sign = self.string_to_sign(method, url, headers, content_length);
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|_| exn::Exn::from(ErrorKind::InvalidCredentials("account key rejected by HMAC".to_string())))?;
        mac.update(string_to_sign.as_bytes());
        let signature = STANDARD.encode(mac.finalize().into_bytes());
        Ok(format!("SharedKey {}:{}", self.account, signature))
    }

    pub(super) fn string_to_sign(
        &self,
        method: &Method,
        url: &Url,
        headers: &HeaderMap,
        content_length: usize,
    ) -> String {
        let mut lines = vec![method.as_str().to_string()];
        for name in SIGNED_HEADERS {
            // Content-Length sits between Content-Language and Content-MD5,
            // and is blank rather than "0" for empty bodies.
            if name == "content-md5" {
                lines.push(match content_length {
                    0 => String::new(),
                    n => n.to_string(),
                });
            }
            lines.push(header_value(headers, name));
        }
        let mut signed = lines.join("\n");
        signed.push('\n');
        signed.push_str(&canonicalized_headers(headers));
        signed.push_str(&self.canonicalized_resource(url));
        signed
    }

    fn canonicalized_resource(&self, url: &Url) -> String {
        let mut params: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (key, value) in url.query_pairs() {
            params.entry(key.to_lowercase()).or_default().push(value.into_owned());
        }
        let mut resource = format!("/{}{}", self.account, url.path());
        for (key, mut values) in params {
            values.sort();
            resource.push_str(&format!("\n{}:{}", key, values.join(",")));
        }
        resource
    }
}
impl fmt::Debug for SharedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedKey").field("account", &self.account).field("key", &"<redacted>").finish()
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> String {
    headers.get(name).map(|value| String::from_utf8_lossy(value.as_bytes()).trim().to_string()).unwrap_or_default()
}

fn canonicalized_headers(headers: &HeaderMap) -> String {
    let mut ms_headers: Vec<(&str, String)> = headers
        .iter()
        .filter(|(name, _)| name.as_str().starts_with("x-ms-"))
        .map(|(name, value)| (name.as_str(), String::from_utf8_lossy(value.as_bytes()).trim().to_string()))
        .collect();
    ms_headers.sort();
    ms_headers.into_iter().map(|(name, value)| format!("{name}:{value}\n")).collect()
}
