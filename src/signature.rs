//! Cloudinary upload signatures.
//!
//! The string to sign is the non-empty parameters as `key=value`, sorted by
//! key and joined with `&`, immediately followed by the API secret.

use std::collections::BTreeMap;
use std::str::FromStr;

use sha1::Sha1;
use sha2::{Digest, Sha256};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    Sha1,
    Sha256,
}

impl FromStr for SignatureAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sha1" => Ok(Self::Sha1),
            "sha256" => Ok(Self::Sha256),
            other => Err(format!("unsupported signature algorithm '{other}'")),
        }
    }
}

/// Parameters covered by an upload signature.
#[derive(Clone, Debug)]
pub struct UploadParams {
    pub timestamp: i64,
    pub upload_preset: Option<String>,
}

impl UploadParams {
    pub fn string_to_sign(&self) -> String {
        let mut params = BTreeMap::new();
        params.insert("timestamp", self.timestamp.to_string());
        if let Some(preset) = &self.upload_preset {
            params.insert("upload_preset", preset.clone());
        }
        params
            .iter()
            .filter(|(_, v)| !v.is_empty())
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&")
    }
}

pub fn sign_upload(params: &UploadParams, api_secret: &str, algorithm: SignatureAlgorithm) -> String {
    let payload = format!("{}{}", params.string_to_sign(), api_secret);
    match algorithm {
        SignatureAlgorithm::Sha1 => hex::encode(Sha1::digest(payload.as_bytes())),
        SignatureAlgorithm::Sha256 => hex::encode(Sha256::digest(payload.as_bytes())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(ts: i64, preset: Option<&str>) -> UploadParams {
        UploadParams { timestamp: ts, upload_preset: preset.map(String::from) }
    }

    #[test]
    fn string_to_sign_is_sorted_and_skips_empty() {
        assert_eq!(params(1700000000, Some("favor_chars")).string_to_sign(), "timestamp=1700000000&upload_preset=favor_chars");
        assert_eq!(params(1700000000, Some("")).string_to_sign(), "timestamp=1700000000");
        assert_eq!(params(1700000000, None).string_to_sign(), "timestamp=1700000000");
    }

    #[test]
    fn known_digests() {
        let p = params(1700000000, Some("favor_chars"));
        assert_eq!(sign_upload(&p, "s3cr3t", SignatureAlgorithm::Sha1), "a39ef3e456d37533d0e886a29ba19799c0a2b147");
        assert_eq!(
            sign_upload(&p, "s3cr3t", SignatureAlgorithm::Sha256),
            "62856bf03c410a962744b2a34f59a451c2ec74a5a6957f12b2e5c38a6c3f2829"
        );
        assert_eq!(
            sign_upload(&params(1700000000, None), "s3cr3t", SignatureAlgorithm::Sha1),
            "e69cb2b2e77705e7823c54fe3517765a64289923"
        );
    }

    #[test]
    fn deterministic_and_input_sensitive() {
        let base = sign_upload(&params(1700000000, Some("p")), "secret", SignatureAlgorithm::Sha1);
        assert_eq!(base, sign_upload(&params(1700000000, Some("p")), "secret", SignatureAlgorithm::Sha1));
        assert_ne!(base, sign_upload(&params(1700000001, Some("p")), "secret", SignatureAlgorithm::Sha1));
        assert_ne!(base, sign_upload(&params(1700000000, Some("q")), "secret", SignatureAlgorithm::Sha1));
        assert_ne!(base, sign_upload(&params(1700000000, Some("p")), "secret2", SignatureAlgorithm::Sha1));
    }

    #[test]
    fn algorithm_parsing() {
        assert_eq!("SHA256".parse::<SignatureAlgorithm>(), Ok(SignatureAlgorithm::Sha256));
        assert!("md5".parse::<SignatureAlgorithm>().is_err());
    }
}
