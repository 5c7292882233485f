use std::sync::Arc;

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;
use validator::Validate;

use crate::auth::{self, Auth, BearerIdentity, Role};
use crate::config::AppConfig;
use crate::error::ApiError;
use crate::models::*;
use crate::rate_limit::RateLimiterFacade;
use crate::repo::Repo;
use crate::signature::{sign_upload, UploadParams};
use crate::suggestions::{self, CreateSuggestionRequest, ReplyRequest, ToggleStatusRequest};

const MAX_IMPORT_RECORDS: usize = 1000;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(|err, _| ApiError::Validation(err.to_string()).into()))
        .app_data(web::QueryConfig::default().error_handler(|err, _| ApiError::Validation(err.to_string()).into()));
    cfg.service(
        web::scope("/api/v1")
            .service(web::resource("/auth/session").route(web::post().to(session_login)))
            .service(web::resource("/auth/token").route(web::post().to(issue_id_token)))
            .service(web::resource("/auth/logout").route(web::post().to(logout)))
            .service(web::resource("/auth/me").route(web::get().to(auth_me)))
            .service(web::resource("/users/me").route(web::get().to(users_me)))
            .service(web::resource("/admin/users/{id}/admin").route(web::post().to(set_user_admin)))
            .service(
                web::resource("/accounts")
                    .route(web::get().to(list_accounts))
                    .route(web::post().to(create_account)),
            )
            .service(
                web::resource("/accounts/{id}")
                    .route(web::patch().to(update_account))
                    .route(web::delete().to(delete_account)),
            )
            .service(
                web::resource("/characters")
                    .route(web::get().to(list_characters))
                    .route(web::post().to(create_character)),
            )
            // registered before /characters/{id} so "import" is not taken as an id
            .service(web::resource("/characters/import").route(web::post().to(import_characters)))
            .service(
                web::resource("/characters/{id}")
                    .route(web::get().to(get_character))
                    .route(web::patch().to(update_character))
                    .route(web::delete().to(delete_character)),
            )
            .service(web::resource("/characters/{id}/favors/{npc}").route(web::put().to(set_favor)))
            .service(
                web::resource("/suggestions")
                    .route(web::get().to(list_my_suggestions))
                    .route(web::post().to(create_suggestion)),
            )
            .service(web::resource("/suggestions/reply").route(web::post().to(reply_to_suggestion)))
            .service(web::resource("/suggestions/toggle-status").route(web::post().to(toggle_suggestion_status)))
            .service(web::resource("/suggestions/{id}").route(web::get().to(get_suggestion)))
            .service(web::resource("/admin/suggestions").route(web::get().to(admin_list_suggestions)))
            .service(web::resource("/messages").route(web::get().to(list_messages)))
            .service(web::resource("/messages/{id}/read").route(web::post().to(mark_message_read)))
            .service(web::resource("/uploads/signature").route(web::post().to(upload_signature))),
    );
}

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repo>,
    pub config: Arc<AppConfig>,
    pub rate_limiter: Option<RateLimiterFacade>,
}

impl AppState {
    pub fn new(repo: Arc<dyn Repo>, config: AppConfig) -> Self {
        Self { repo, config: Arc::new(config), rate_limiter: None }
    }

    pub fn with_rate_limiter(mut self, limiter: RateLimiterFacade) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    fn limit(&self, allowed: impl FnOnce(&RateLimiterFacade) -> bool) -> Result<(), ApiError> {
        match &self.rate_limiter {
            Some(rl) if !allowed(rl) => Err(ApiError::RateLimited),
            _ => Ok(()),
        }
    }

    async fn require_admin(&self, uid: &str) -> Result<(), ApiError> {
        if self.repo.is_admin(uid).await? { Ok(()) } else { Err(ApiError::Forbidden) }
    }
}

fn ok_status() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

// ---------------- auth & users -----------------------------------

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionLoginRequest {
    pub id_token: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub uid: String,
    pub display_name: String,
    pub role: String,
    pub expires_in: i64,
}

fn role_name(is_admin: bool) -> String {
    if is_admin { "admin".into() } else { "user".into() }
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/session",
    request_body = SessionLoginRequest,
    responses(
        (status = 200, description = "Session cookie issued", body = SessionResponse),
        (status = 401, description = "Invalid ID token")
    )
)]
pub async fn session_login(data: web::Data<AppState>, payload: web::Json<SessionLoginRequest>) -> Result<HttpResponse, ApiError> {
    let claims = auth::verify_id_token(&payload.id_token)?;
    let mut user = data.repo.upsert_user(claims.uid(), &claims.name).await?;
    if !user.is_admin && data.config.is_bootstrap_admin(&user.id) {
        info!(uid = %user.id, "promoting bootstrap admin");
        user = data.repo.set_admin(&user.id, true).await?;
    }
    let mut roles = vec![Role::User];
    if user.is_admin { roles.push(Role::Admin); }
    let ttl = data.config.session_ttl;
    let value = auth::create_session_cookie(&user.id, &user.display_name, roles, ttl)?;
    Ok(HttpResponse::Ok()
        .cookie(auth::session_cookie(value, ttl))
        .json(SessionResponse {
            uid: user.id,
            display_name: user.display_name,
            role: role_name(user.is_admin),
            expires_in: ttl.num_seconds(),
        }))
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IdTokenResponse {
    pub id_token: String,
    pub role: String,
    pub expires_in: i64,
}

/// Exchange the caller's credential for a fresh bearer ID token.
/// The admin claim reflects the stored flag at the time of the exchange.
#[utoipa::path(
    post,
    path = "/api/v1/auth/token",
    responses(
        (status = 200, description = "ID token issued", body = IdTokenResponse),
        (status = 401, description = "Unauthenticated or unknown user")
    )
)]
pub async fn issue_id_token(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let user = match data.repo.get_user(auth.0.uid()).await {
        Ok(u) => u,
        Err(crate::repo::RepoError::NotFound) => return Err(ApiError::Unauthenticated),
        Err(e) => return Err(e.into()),
    };
    let mut roles = vec![Role::User];
    if user.is_admin { roles.push(Role::Admin); }
    let id_token = auth::create_id_token(&user.id, &user.display_name, roles)?;
    info!(uid = %user.id, is_admin = user.is_admin, "id token issued");
    Ok(HttpResponse::Ok().json(IdTokenResponse {
        id_token,
        role: role_name(user.is_admin),
        expires_in: auth::ID_TOKEN_TTL_SECS,
    }))
}

pub async fn logout() -> HttpResponse {
    HttpResponse::Ok()
        .cookie(auth::cleared_session_cookie())
        .json(serde_json::json!({ "status": "ok" }))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MeResponse {
    pub uid: String,
    pub name: String,
    pub role: String,
}

// Role comes from the store; the credential's claim may predate a demotion.
pub async fn auth_me(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let is_admin = data.repo.is_admin(auth.0.uid()).await?;
    Ok(HttpResponse::Ok().json(MeResponse {
        uid: auth.0.sub.clone(),
        name: auth.0.name.clone(),
        role: role_name(is_admin),
    }))
}

pub async fn users_me(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let user = data.repo.get_user(auth.0.uid()).await?;
    Ok(HttpResponse::Ok().json(user))
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SetAdminRequest {
    pub is_admin: bool,
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/users/{id}/admin",
    request_body = SetAdminRequest,
    params(("id" = String, Path, description = "User id")),
    responses(
        (status = 200, description = "Admin flag updated", body = User),
        (status = 403, description = "Forbidden - Admin only"),
        (status = 404, description = "User not found")
    )
)]
pub async fn set_user_admin(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<SetAdminRequest>,
) -> Result<HttpResponse, ApiError> {
    data.require_admin(auth.0.uid()).await?;
    let user = data.repo.set_admin(&path.into_inner(), payload.is_admin).await?;
    info!(by = %auth.0.uid(), uid = %user.id, is_admin = user.is_admin, "admin flag changed");
    Ok(HttpResponse::Ok().json(user))
}

// ---------------- accounts ---------------------------------------

pub async fn list_accounts(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let accounts = data.repo.list_accounts(auth.0.uid()).await?;
    Ok(HttpResponse::Ok().json(accounts))
}

#[utoipa::path(
    post,
    path = "/api/v1/accounts",
    request_body = NewAccount,
    responses(
        (status = 201, description = "Account created", body = Account),
        (status = 409, description = "Duplicate account name")
    )
)]
pub async fn create_account(auth: Auth, data: web::Data<AppState>, payload: web::Json<NewAccount>) -> Result<HttpResponse, ApiError> {
    let new = payload.into_inner();
    new.validate()?;
    let account = data.repo.create_account(auth.0.uid(), new).await?;
    Ok(HttpResponse::Created().json(account))
}

pub async fn update_account(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<UpdateAccount>,
) -> Result<HttpResponse, ApiError> {
    let upd = payload.into_inner();
    upd.validate()?;
    let account = data.repo.update_account(auth.0.uid(), &path.into_inner(), upd).await?;
    Ok(HttpResponse::Ok().json(account))
}

pub async fn delete_account(auth: Auth, data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    data.repo.delete_account(auth.0.uid(), &path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

// ---------------- characters -------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterQuery {
    pub account_id: Option<String>,
}

pub async fn list_characters(auth: Auth, data: web::Data<AppState>, query: web::Query<CharacterQuery>) -> Result<HttpResponse, ApiError> {
    let chars = data.repo.list_characters(auth.0.uid(), query.account_id.as_deref()).await?;
    Ok(HttpResponse::Ok().json(chars))
}

// A dangling account link is a client error, not a missing character.
fn account_link_err(e: crate::repo::RepoError) -> ApiError {
    match e {
        crate::repo::RepoError::NotFound => ApiError::Validation("accountId does not name one of your accounts".into()),
        other => other.into(),
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/characters",
    request_body = NewCharacter,
    responses(
        (status = 201, description = "Character created", body = Character),
        (status = 400, description = "Invalid character or unknown account")
    )
)]
pub async fn create_character(auth: Auth, data: web::Data<AppState>, payload: web::Json<NewCharacter>) -> Result<HttpResponse, ApiError> {
    let new = payload.into_inner();
    new.validate()?;
    let character = data.repo.create_character(auth.0.uid(), new).await.map_err(account_link_err)?;
    Ok(HttpResponse::Created().json(character))
}

pub async fn get_character(auth: Auth, data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let character = data.repo.get_character(auth.0.uid(), &path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(character))
}

pub async fn update_character(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<UpdateCharacter>,
) -> Result<HttpResponse, ApiError> {
    let upd = payload.into_inner();
    upd.validate()?;
    let owner = auth.0.uid();
    let id = path.into_inner();
    if let Some(Some(acc)) = &upd.account_id {
        // resolve the link separately so a bad account is told apart from a bad character
        data.repo.list_accounts(owner).await?
            .iter()
            .find(|a| &a.id == acc)
            .ok_or_else(|| ApiError::Validation("accountId does not name one of your accounts".into()))?;
    }
    let character = data.repo.update_character(owner, &id, upd).await?;
    Ok(HttpResponse::Ok().json(character))
}

pub async fn delete_character(auth: Auth, data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    data.repo.delete_character(auth.0.uid(), &path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[utoipa::path(
    put,
    path = "/api/v1/characters/{id}/favors/{npc}",
    request_body = SetFavor,
    params(
        ("id" = String, Path, description = "Character id"),
        ("npc" = String, Path, description = "NPC name")
    ),
    responses(
        (status = 200, description = "Favor level stored", body = Character),
        (status = 404, description = "Character not found")
    )
)]
pub async fn set_favor(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<(String, String)>,
    payload: web::Json<SetFavor>,
) -> Result<HttpResponse, ApiError> {
    let (id, npc) = path.into_inner();
    let npc = npc.trim();
    if npc.is_empty() || npc.chars().count() > 100 {
        return Err(ApiError::Validation("npc name must be 1-100 characters".into()));
    }
    let character = data.repo.set_favor(auth.0.uid(), &id, npc, payload.level).await?;
    Ok(HttpResponse::Ok().json(character))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ImportCharactersRequest {
    pub characters: Vec<NewCharacter>,
}

#[utoipa::path(
    post,
    path = "/api/v1/characters/import",
    request_body = ImportCharactersRequest,
    responses(
        (status = 200, description = "Characters replaced", body = [Character]),
        (status = 400, description = "A record failed validation; nothing was written")
    )
)]
pub async fn import_characters(auth: Auth, data: web::Data<AppState>, payload: web::Json<ImportCharactersRequest>) -> Result<HttpResponse, ApiError> {
    let items = payload.into_inner().characters;
    if items.len() > MAX_IMPORT_RECORDS {
        return Err(ApiError::Validation(format!("at most {MAX_IMPORT_RECORDS} records per import")));
    }
    for (i, item) in items.iter().enumerate() {
        item.validate().map_err(|e| ApiError::Validation(format!("record {i}: {}", ApiError::from(e))))?;
    }
    let count = items.len();
    let created = data.repo.replace_characters(auth.0.uid(), items).await.map_err(account_link_err)?;
    info!(uid = %auth.0.uid(), count, "characters imported");
    Ok(HttpResponse::Ok().json(created))
}

// ---------------- suggestions ------------------------------------

pub async fn list_my_suggestions(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let list = data.repo.list_suggestions(Some(auth.0.uid()), None).await?;
    Ok(HttpResponse::Ok().json(list))
}

#[utoipa::path(
    post,
    path = "/api/v1/suggestions",
    request_body = CreateSuggestionRequest,
    responses(
        (status = 201, description = "Suggestion created", body = Suggestion),
        (status = 400, description = "Invalid input"),
        (status = 401, description = "Unauthenticated"),
        (status = 403, description = "userId does not match the caller")
    )
)]
pub async fn create_suggestion(auth: Auth, data: web::Data<AppState>, payload: web::Json<CreateSuggestionRequest>) -> Result<HttpResponse, ApiError> {
    data.limit(|rl| rl.allow_suggestion(auth.0.uid()))?;
    let s = suggestions::create_suggestion(data.repo.as_ref(), &auth.0, payload.into_inner()).await?;
    Ok(HttpResponse::Created().json(s))
}

pub async fn get_suggestion(auth: Auth, data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let s = suggestions::get_visible(data.repo.as_ref(), &auth.0, &path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(s))
}

#[utoipa::path(
    post,
    path = "/api/v1/suggestions/reply",
    request_body = ReplyRequest,
    responses(
        (status = 200, description = "Reply appended", body = Suggestion),
        (status = 400, description = "Invalid input"),
        (status = 401, description = "Unauthenticated"),
        (status = 403, description = "Identity mismatch, or neither suggester nor admin"),
        (status = 404, description = "Suggestion not found"),
        (status = 409, description = "Suggestion is closed")
    )
)]
pub async fn reply_to_suggestion(auth: Auth, data: web::Data<AppState>, payload: web::Json<ReplyRequest>) -> Result<HttpResponse, ApiError> {
    data.limit(|rl| rl.allow_reply(auth.0.uid()))?;
    let s = suggestions::reply(data.repo.as_ref(), &auth.0, payload.into_inner()).await?;
    Ok(HttpResponse::Ok().json(s))
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ToggleStatusResponse {
    pub suggestion_id: String,
    pub status: SuggestionStatus,
}

#[utoipa::path(
    post,
    path = "/api/v1/suggestions/toggle-status",
    request_body = ToggleStatusRequest,
    responses(
        (status = 200, description = "Status flipped", body = ToggleStatusResponse),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 403, description = "Identity mismatch or missing admin claim"),
        (status = 404, description = "Suggestion not found")
    )
)]
pub async fn toggle_suggestion_status(
    bearer: BearerIdentity,
    data: web::Data<AppState>,
    payload: web::Json<ToggleStatusRequest>,
) -> Result<HttpResponse, ApiError> {
    let s = suggestions::toggle_status(data.repo.as_ref(), &bearer.0, payload.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ToggleStatusResponse { suggestion_id: s.id, status: s.status }))
}

#[derive(Debug, Deserialize)]
pub struct AdminSuggestionQuery {
    pub status: Option<SuggestionStatus>,
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/suggestions",
    params(("status" = Option<String>, Query, description = "open | closed")),
    responses(
        (status = 200, description = "All suggestions, newest first", body = [Suggestion]),
        (status = 403, description = "Forbidden - Admin only")
    )
)]
pub async fn admin_list_suggestions(auth: Auth, data: web::Data<AppState>, query: web::Query<AdminSuggestionQuery>) -> Result<HttpResponse, ApiError> {
    data.require_admin(auth.0.uid()).await?;
    let list = data.repo.list_suggestions(None, query.status).await?;
    Ok(HttpResponse::Ok().json(list))
}

// ---------------- messages ---------------------------------------

pub async fn list_messages(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let msgs = data.repo.list_messages(auth.0.uid()).await?;
    Ok(HttpResponse::Ok().json(msgs))
}

pub async fn mark_message_read(auth: Auth, data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    data.repo.mark_read(auth.0.uid(), &path.into_inner()).await?;
    Ok(ok_status())
}

// ---------------- upload signature -------------------------------

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SignatureRequest {
    pub timestamp: Option<i64>,
    pub upload_preset: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SignatureResponse {
    pub signature: String,
    pub api_key: String,
    pub timestamp: i64,
    pub upload_preset: Option<String>,
    pub cloud_name: Option<String>,
}

// An absent body means "all defaults"; anything else must be a valid request.
fn parse_signature_request(body: &[u8]) -> Result<SignatureRequest, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(SignatureRequest::default());
    }
    serde_json::from_slice(body).map_err(|e| ApiError::Validation(format!("invalid signature request: {e}")))
}

#[utoipa::path(
    post,
    path = "/api/v1/uploads/signature",
    request_body = SignatureRequest,
    responses(
        (status = 200, description = "Signed upload parameters", body = SignatureResponse),
        (status = 400, description = "Malformed request body"),
        (status = 401, description = "Unauthenticated"),
        (status = 503, description = "Image host not configured")
    )
)]
pub async fn upload_signature(
    auth: Auth,
    data: web::Data<AppState>,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let Some(cloud) = data.config.cloudinary.as_ref() else {
        warn!("upload signature requested but Cloudinary is not configured");
        return Err(ApiError::ServiceUnavailable("image upload"));
    };
    data.limit(|rl| rl.allow_signature(auth.0.uid()))?;
    let req = parse_signature_request(&body)?;
    let params = UploadParams {
        timestamp: req.timestamp.unwrap_or_else(|| chrono::Utc::now().timestamp()),
        upload_preset: req.upload_preset.or_else(|| cloud.upload_preset.clone()),
    };
    let signature = sign_upload(&params, &cloud.api_secret, cloud.algorithm);
    Ok(HttpResponse::Ok().json(SignatureResponse {
        signature,
        api_key: cloud.api_key.clone(),
        timestamp: params.timestamp,
        upload_preset: params.upload_preset,
        cloud_name: cloud.cloud_name.clone(),
    }))
}
