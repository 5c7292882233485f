use std::env;

use anyhow::{anyhow, bail, Context};

use crate::signature::SignatureAlgorithm;

const MIN_SECRET_LEN: usize = 32;

/// Credentials for signed direct uploads to Cloudinary.
#[derive(Clone, Debug)]
pub struct CloudinaryConfig {
    pub cloud_name: Option<String>,
    pub api_key: String,
    pub api_secret: String,
    pub upload_preset: Option<String>,
    pub algorithm: SignatureAlgorithm,
}

impl CloudinaryConfig {
    /// `None` unless both key and secret are present.
    pub fn from_env() -> anyhow::Result<Option<Self>> {
        let (Some(api_key), Some(api_secret)) = (non_empty("CLOUDINARY_API_KEY"), non_empty("CLOUDINARY_API_SECRET")) else {
            return Ok(None);
        };
        let algorithm = match non_empty("CLOUDINARY_SIGNATURE_ALGORITHM") {
            Some(v) => v.parse().map_err(|e: String| anyhow!(e))?,
            None => SignatureAlgorithm::Sha1,
        };
        Ok(Some(Self {
            cloud_name: non_empty("CLOUDINARY_CLOUD_NAME"),
            api_key,
            api_secret,
            upload_preset: non_empty("CLOUDINARY_UPLOAD_PRESET"),
            algorithm,
        }))
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub bind_addr: String,
    pub frontend_url: Option<String>,
    pub bootstrap_admins: Vec<String>,
    pub session_ttl: chrono::Duration,
    pub cloudinary: Option<CloudinaryConfig>,
    pub enable_hsts: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".into(),
            frontend_url: None,
            bootstrap_admins: Vec::new(),
            session_ttl: chrono::Duration::days(5),
            cloudinary: None,
            enable_hsts: false,
        }
    }
}

fn non_empty(name: &str) -> Option<String> {
    env::var(name).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn flag(name: &str) -> bool {
    env::var(name).map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let secret = env::var("JWT_SECRET").context("JWT_SECRET must be set")?;
        if secret.len() < MIN_SECRET_LEN {
            bail!("JWT_SECRET must be at least {MIN_SECRET_LEN} characters long");
        }
        let defaults = Self::default();
        let session_ttl = match non_empty("SESSION_TTL_DAYS") {
            Some(v) => chrono::Duration::days(v.parse().with_context(|| format!("SESSION_TTL_DAYS: invalid value '{v}'"))?),
            None => defaults.session_ttl,
        };
        Ok(Self {
            bind_addr: non_empty("BIND_ADDR").unwrap_or(defaults.bind_addr),
            frontend_url: non_empty("FRONTEND_URL"),
            bootstrap_admins: non_empty("BOOTSTRAP_ADMIN_UIDS")
                .map(|v| v.split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from).collect())
                .unwrap_or_default(),
            session_ttl,
            cloudinary: CloudinaryConfig::from_env()?,
            enable_hsts: flag("ENABLE_HSTS"),
        })
    }

    pub fn is_bootstrap_admin(&self, uid: &str) -> bool {
        self.bootstrap_admins.iter().any(|a| a == uid)
    }
}
