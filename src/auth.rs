//! Identity tokens and session cookies.
//!
//! Both credential forms are HS256 JWTs signed with `JWT_SECRET`. The `use`
//! claim keeps them apart: an ID token is only accepted as a bearer token and
//! a session cookie only as the `session` cookie.

use actix_web::cookie::{time::Duration as CookieDuration, Cookie, SameSite};
use actix_web::{dev::Payload, FromRequest, HttpRequest};
use actix_web_httpauth::extractors::bearer::BearerAuth;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::env;
use std::future::{ready, Ready};

use crate::error::ApiError;

pub const SESSION_COOKIE: &str = "session";
pub const ID_TOKEN_TTL_SECS: i64 = 3600;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenUse {
    Id,
    Session,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub name: String,
    pub exp: usize,
    pub roles: Vec<Role>,
    #[serde(rename = "use")]
    pub token_use: TokenUse,
}

impl Claims {
    pub fn uid(&self) -> &str {
        &self.sub
    }

    /// The admin claim carried by the token itself (not the stored user flag).
    pub fn is_admin(&self) -> bool {
        self.roles.contains(&Role::Admin)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum AuthError {
    #[error("credential missing")]
    Missing,
    #[error("invalid token: {0}")]
    Invalid(#[from] jsonwebtoken::errors::Error),
    #[error("token presented in the wrong place")]
    WrongTokenUse,
    #[error("{0}")]
    Misconfigured(String),
}

fn secret() -> Result<String, AuthError> {
    env::var("JWT_SECRET").map_err(|_| AuthError::Misconfigured("JWT_SECRET not set".into()))
}

fn sign(claims: &Claims) -> Result<String, AuthError> {
    let secret = secret()?;
    Ok(encode(&Header::default(), claims, &EncodingKey::from_secret(secret.as_bytes()))?)
}

fn verify(token: &str, expected: TokenUse) -> Result<Claims, AuthError> {
    let secret = secret()?;
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    let data = decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)?;
    if data.claims.token_use != expected {
        return Err(AuthError::WrongTokenUse);
    }
    Ok(data.claims)
}

fn expiry(ttl: chrono::Duration) -> usize {
    (chrono::Utc::now() + ttl).timestamp().max(0) as usize
}

/// Issue an ID token, the credential the identity provider hands to clients.
pub fn create_id_token(uid: &str, name: &str, roles: Vec<Role>) -> Result<String, AuthError> {
    sign(&Claims {
        sub: uid.to_string(),
        name: name.to_string(),
        exp: expiry(chrono::Duration::seconds(ID_TOKEN_TTL_SECS)),
        roles,
        token_use: TokenUse::Id,
    })
}

pub fn verify_id_token(token: &str) -> Result<Claims, AuthError> {
    verify(token, TokenUse::Id)
}

/// Mint a session cookie value for an already verified identity.
pub fn create_session_cookie(uid: &str, name: &str, roles: Vec<Role>, ttl: chrono::Duration) -> Result<String, AuthError> {
    sign(&Claims {
        sub: uid.to_string(),
        name: name.to_string(),
        exp: expiry(ttl),
        roles,
        token_use: TokenUse::Session,
    })
}

pub fn verify_session_cookie(value: &str) -> Result<Claims, AuthError> {
    verify(value, TokenUse::Session)
}

pub fn session_cookie(value: String, ttl: chrono::Duration) -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE, value)
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(CookieDuration::seconds(ttl.num_seconds()))
        .finish()
}

pub fn cleared_session_cookie() -> Cookie<'static> {
    let mut c = Cookie::build(SESSION_COOKIE, "").path("/").http_only(true).finish();
    c.make_removal();
    c
}

fn bearer_claims(req: &HttpRequest, pl: &mut Payload) -> Option<Result<Claims, AuthError>> {
    BearerAuth::from_request(req, pl)
        .into_inner()
        .ok()
        .map(|bearer| verify_id_token(bearer.token()))
}

/// Extractor accepting either a bearer ID token or the session cookie.
/// A present but invalid bearer token is rejected without falling back.
pub struct Auth(pub Claims);

impl FromRequest for Auth {
    type Error = ApiError;
    type Future = Ready<Result<Self, ApiError>>;

    fn from_request(req: &HttpRequest, pl: &mut Payload) -> Self::Future {
        let res = match bearer_claims(req, pl) {
            Some(r) => r,
            None => match req.cookie(SESSION_COOKIE) {
                Some(c) => verify_session_cookie(c.value()),
                None => Err(AuthError::Missing),
            },
        };
        ready(res.map(Auth).map_err(ApiError::from))
    }
}

/// Extractor accepting only a bearer ID token.
pub struct BearerIdentity(pub Claims);

impl FromRequest for BearerIdentity {
    type Error = ApiError;
    type Future = Ready<Result<Self, ApiError>>;

    fn from_request(req: &HttpRequest, pl: &mut Payload) -> Self::Future {
        let res = bearer_claims(req, pl).unwrap_or(Err(AuthError::Missing));
        ready(res.map(BearerIdentity).map_err(ApiError::from))
    }
}
