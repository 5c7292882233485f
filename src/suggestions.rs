//! Suggestion conversations: create, reply and status toggle.
//!
//! Handlers authenticate first; these functions take the verified claims and
//! run the remaining checks in a fixed order so every failing precondition
//! surfaces as its own error.

use chrono::Utc;
use serde::Deserialize;
use tracing::{error, info, warn};
use utoipa::ToSchema;
use validator::Validate;

use crate::auth::Claims;
use crate::error::ApiError;
use crate::models::*;
use crate::repo::Repo;

#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateSuggestionRequest {
    #[validate(length(min = 1, max = 5000))]
    pub text: String,
    #[validate(length(min = 1))]
    pub user_id: String,
    #[validate(length(min = 1, max = 100))]
    pub user_name: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReplyRequest {
    #[validate(length(min = 1))]
    pub suggestion_id: String,
    #[validate(length(min = 1, max = 5000))]
    pub text: String,
    #[validate(length(min = 1))]
    pub sender_id: String,
    #[validate(length(min = 1, max = 100))]
    pub sender_name: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ToggleStatusRequest {
    #[validate(length(min = 1))]
    pub suggestion_id: String,
    #[validate(length(min = 1))]
    pub admin_id: String,
}

/// Who is allowed to append a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Replier {
    Suggester,
    Admin,
}

pub fn ensure_same_identity(caller: &Claims, claimed: &str) -> Result<(), ApiError> {
    if caller.uid() == claimed { Ok(()) } else { Err(ApiError::IdentityMismatch) }
}

/// Reply decision for an existing suggestion. Admin status is the stored flag.
pub fn decide_reply(uid: &str, suggestion: &Suggestion, is_admin: bool) -> Result<Replier, ApiError> {
    let is_suggester = suggestion.creator_id == uid;
    if is_suggester && suggestion.status == SuggestionStatus::Open {
        return Ok(Replier::Suggester);
    }
    if is_admin {
        return Ok(Replier::Admin);
    }
    if is_suggester { Err(ApiError::SuggestionClosed) } else { Err(ApiError::Forbidden) }
}

pub async fn create_suggestion(repo: &dyn Repo, caller: &Claims, req: CreateSuggestionRequest) -> Result<Suggestion, ApiError> {
    req.validate()?;
    ensure_same_identity(caller, &req.user_id)?;
    let s = repo
        .create_suggestion(NewSuggestion { text: req.text, creator_id: req.user_id, creator_name: req.user_name })
        .await?;
    info!(suggestion = %s.id, uid = %s.creator_id, "suggestion created");
    Ok(s)
}

/// Suggestion visible to its creator and to admins; anyone else sees not-found.
pub async fn get_visible(repo: &dyn Repo, caller: &Claims, id: &str) -> Result<Suggestion, ApiError> {
    let s = repo.get_suggestion(id).await?;
    if s.creator_id == caller.uid() || repo.is_admin(caller.uid()).await? {
        Ok(s)
    } else {
        Err(ApiError::NotFound)
    }
}

pub async fn reply(repo: &dyn Repo, caller: &Claims, req: ReplyRequest) -> Result<Suggestion, ApiError> {
    req.validate()?;
    ensure_same_identity(caller, &req.sender_id)?;
    let suggestion = repo.get_suggestion(&req.suggestion_id).await?;

    let uid = caller.uid();
    let open_own = suggestion.creator_id == uid && suggestion.status == SuggestionStatus::Open;
    let is_admin = if open_own { false } else { repo.is_admin(uid).await? };
    let replier = decide_reply(uid, &suggestion, is_admin).map_err(|e| {
        warn!(suggestion = %suggestion.id, %uid, reason = e.code(), "reply rejected");
        e
    })?;

    let entry = ConversationEntry {
        sender_id: req.sender_id.clone(),
        sender_name: req.sender_name.clone(),
        text: req.text.clone(),
        timestamp: Utc::now(),
    };
    let updated = repo.append_conversation(&suggestion.id, entry).await?;

    // reply is already stored; a failed notification is only logged
    if replier == Replier::Admin && suggestion.creator_id != uid {
        let notice = NewMessage {
            sender_id: req.sender_id,
            sender_name: req.sender_name,
            receiver_id: suggestion.creator_id.clone(),
            receiver_name: suggestion.creator_name.clone(),
            text: req.text,
            suggestion_id: Some(suggestion.id.clone()),
        };
        if let Err(e) = repo.create_message(notice).await {
            error!(suggestion = %suggestion.id, receiver = %suggestion.creator_id, "reply notification failed: {e}");
        }
    }
    info!(suggestion = %updated.id, %uid, ?replier, "reply appended");
    Ok(updated)
}

/// Flip open/closed. Authorization comes from the token's admin claim only.
pub async fn toggle_status(repo: &dyn Repo, caller: &Claims, req: ToggleStatusRequest) -> Result<Suggestion, ApiError> {
    req.validate()?;
    ensure_same_identity(caller, &req.admin_id)?;
    if !caller.is_admin() {
        warn!(uid = %caller.uid(), "status toggle without admin claim");
        return Err(ApiError::Forbidden);
    }
    let current = repo.get_suggestion(&req.suggestion_id).await?;
    let updated = repo.set_status(&current.id, current.status.toggled()).await?;
    info!(suggestion = %updated.id, status = updated.status.as_str(), "status toggled");
    Ok(updated)
}
