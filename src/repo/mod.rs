use async_trait::async_trait;

use crate::models::*;

#[cfg(feature = "inmem-store")]
pub mod inmem;
#[cfg(feature = "postgres-store")]
pub mod pg;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")] NotFound,
    #[error("conflict")] Conflict,
    #[error("internal: {0}")] Internal(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn get_user(&self, uid: &str) -> RepoResult<User>;
    /// Create the user on first sight, otherwise refresh the display name.
    async fn upsert_user(&self, uid: &str, display_name: &str) -> RepoResult<User>;
    async fn set_admin(&self, uid: &str, is_admin: bool) -> RepoResult<User>;
    /// Stored admin flag; an unknown user is not an admin.
    async fn is_admin(&self, uid: &str) -> RepoResult<bool> {
        match self.get_user(uid).await {
            Ok(u) => Ok(u.is_admin),
            Err(RepoError::NotFound) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
pub trait AccountRepo: Send + Sync {
    async fn list_accounts(&self, owner: &str) -> RepoResult<Vec<Account>>;
    async fn create_account(&self, owner: &str, new: NewAccount) -> RepoResult<Account>;
    async fn update_account(&self, owner: &str, id: &str, upd: UpdateAccount) -> RepoResult<Account>;
    /// Deletes the account and clears `account_id` on its characters.
    async fn delete_account(&self, owner: &str, id: &str) -> RepoResult<()>;
}

#[async_trait]
pub trait CharacterRepo: Send + Sync {
    async fn list_characters(&self, owner: &str, account_id: Option<&str>) -> RepoResult<Vec<Character>>;
    async fn get_character(&self, owner: &str, id: &str) -> RepoResult<Character>;
    async fn create_character(&self, owner: &str, new: NewCharacter) -> RepoResult<Character>;
    async fn update_character(&self, owner: &str, id: &str, upd: UpdateCharacter) -> RepoResult<Character>;
    async fn set_favor(&self, owner: &str, id: &str, npc: &str, level: FavorLevel) -> RepoResult<Character>;
    async fn delete_character(&self, owner: &str, id: &str) -> RepoResult<()>;
    /// Overwrite all of the owner's characters. All-or-nothing.
    async fn replace_characters(&self, owner: &str, items: Vec<NewCharacter>) -> RepoResult<Vec<Character>>;
}

#[async_trait]
pub trait SuggestionRepo: Send + Sync {
    async fn create_suggestion(&self, new: NewSuggestion) -> RepoResult<Suggestion>;
    async fn get_suggestion(&self, id: &str) -> RepoResult<Suggestion>;
    /// Newest first. `creator` and `status` narrow the result when given.
    async fn list_suggestions(&self, creator: Option<&str>, status: Option<SuggestionStatus>) -> RepoResult<Vec<Suggestion>>;
    /// Array-union append; existing entries are never rewritten.
    async fn append_conversation(&self, id: &str, entry: ConversationEntry) -> RepoResult<Suggestion>;
    async fn set_status(&self, id: &str, status: SuggestionStatus) -> RepoResult<Suggestion>;
}

#[async_trait]
pub trait MessageRepo: Send + Sync {
    async fn create_message(&self, new: NewMessage) -> RepoResult<Message>;
    /// Newest first.
    async fn list_messages(&self, receiver: &str) -> RepoResult<Vec<Message>>;
    async fn mark_read(&self, receiver: &str, id: &str) -> RepoResult<Message>;
}

pub trait Repo: UserRepo + AccountRepo + CharacterRepo + SuggestionRepo + MessageRepo {}

impl<T> Repo for T where T: UserRepo + AccountRepo + CharacterRepo + SuggestionRepo + MessageRepo {}
