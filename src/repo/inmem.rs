//! In-process document store persisted as a JSON snapshot after every write.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::*;

const SNAPSHOT_FILE: &str = "state.json";

#[derive(Default, Serialize, Deserialize)]
struct State {
    #[serde(default)]
    users: HashMap<Id, User>,
    #[serde(default)]
    accounts: HashMap<Id, Account>,
    #[serde(default)]
    characters: HashMap<Id, Character>,
    #[serde(default)]
    suggestions: HashMap<Id, Suggestion>,
    #[serde(default)]
    messages: HashMap<Id, Message>,
}

impl State {
    fn owned_account(&self, owner: &str, id: &str) -> RepoResult<&Account> {
        self.accounts.get(id).filter(|a| a.owner_id == owner).ok_or(RepoError::NotFound)
    }

    fn owned_character_mut(&mut self, owner: &str, id: &str) -> RepoResult<&mut Character> {
        self.characters.get_mut(id).filter(|c| c.owner_id == owner).ok_or(RepoError::NotFound)
    }

    fn check_account_link(&self, owner: &str, account_id: Option<&str>) -> RepoResult<()> {
        match account_id {
            Some(acc) => self.owned_account(owner, acc).map(|_| ()),
            None => Ok(()),
        }
    }
}

#[derive(Clone)]
pub struct InMemRepo {
    state: Arc<RwLock<State>>,
    snapshot_path: Arc<PathBuf>,
}

impl InMemRepo {
    fn snapshot_path() -> PathBuf {
        let mut p = std::env::var("FAVOR_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("data"));
        p.push(SNAPSHOT_FILE);
        p
    }

    fn load_state_from(path: &Path) -> State {
        match std::fs::read(path) {
            Ok(bytes) => match serde_json::from_slice::<State>(&bytes) {
                Ok(s) => {
                    info!("loaded snapshot '{}'", path.display());
                    s
                }
                Err(e) => {
                    warn!("failed to parse snapshot '{}': {e}; starting empty", path.display());
                    State::default()
                }
            },
            Err(e) => {
                info!("no snapshot at '{}' ({e}); starting empty", path.display());
                State::default()
            }
        }
    }

    pub fn new() -> Self {
        let snapshot_path = Self::snapshot_path();
        let state = Self::load_state_from(&snapshot_path);
        Self {
            state: Arc::new(RwLock::new(state)),
            snapshot_path: Arc::new(snapshot_path),
        }
    }

    fn read(&self) -> RepoResult<RwLockReadGuard<'_, State>> {
        self.state.read().map_err(|_| RepoError::Internal("state lock poisoned".into()))
    }

    fn write(&self) -> RepoResult<RwLockWriteGuard<'_, State>> {
        self.state.write().map_err(|_| RepoError::Internal("state lock poisoned".into()))
    }

    // A failed snapshot write is logged; the in-memory state stays authoritative.
    fn persist(&self) {
        let path = &*self.snapshot_path;
        let bytes = match self.read().and_then(|s| {
            serde_json::to_vec_pretty(&*s).map_err(|e| RepoError::Internal(e.to_string()))
        }) {
            Ok(b) => b,
            Err(e) => {
                error!("failed to serialize snapshot: {e}");
                return;
            }
        };
        if let Some(dir) = path.parent() {
            let _ = std::fs::create_dir_all(dir);
        }
        if let Err(e) = std::fs::write(path, bytes) {
            error!("failed to write snapshot '{}': {e}", path.display());
        }
    }
}

impl Default for InMemRepo {
    fn default() -> Self {
        Self::new()
    }
}

fn build_character(owner: &str, new: NewCharacter) -> Character {
    let now = Utc::now();
    Character {
        id: new_id(),
        owner_id: owner.to_string(),
        name: new.name,
        account_id: new.account_id,
        favors: new.favors,
        image_url: new.image_url,
        created_at: now,
        updated_at: now,
    }
}

#[async_trait]
impl UserRepo for InMemRepo {
    async fn get_user(&self, uid: &str) -> RepoResult<User> {
        self.read()?.users.get(uid).cloned().ok_or(RepoError::NotFound)
    }

    async fn upsert_user(&self, uid: &str, display_name: &str) -> RepoResult<User> {
        let mut s = self.write()?;
        let user = s.users.entry(uid.to_string()).or_insert_with(|| User {
            id: uid.to_string(),
            display_name: display_name.to_string(),
            is_admin: false,
            created_at: Utc::now(),
        });
        user.display_name = display_name.to_string();
        let user = user.clone();
        drop(s);
        self.persist();
        Ok(user)
    }

    async fn set_admin(&self, uid: &str, is_admin: bool) -> RepoResult<User> {
        let mut s = self.write()?;
        let user = s.users.get_mut(uid).ok_or(RepoError::NotFound)?;
        user.is_admin = is_admin;
        let user = user.clone();
        drop(s);
        self.persist();
        Ok(user)
    }
}

#[async_trait]
impl AccountRepo for InMemRepo {
    async fn list_accounts(&self, owner: &str) -> RepoResult<Vec<Account>> {
        let s = self.read()?;
        let mut v: Vec<_> = s.accounts.values().filter(|a| a.owner_id == owner).cloned().collect();
        v.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(v)
    }

    async fn create_account(&self, owner: &str, new: NewAccount) -> RepoResult<Account> {
        let mut s = self.write()?;
        if s.accounts.values().any(|a| a.owner_id == owner && a.name == new.name) {
            return Err(RepoError::Conflict);
        }
        let now = Utc::now();
        let account = Account {
            id: new_id(),
            owner_id: owner.to_string(),
            name: new.name,
            notes: new.notes,
            created_at: now,
            updated_at: now,
        };
        s.accounts.insert(account.id.clone(), account.clone());
        drop(s);
        self.persist();
        Ok(account)
    }

    async fn update_account(&self, owner: &str, id: &str, upd: UpdateAccount) -> RepoResult<Account> {
        let mut s = self.write()?;
        s.owned_account(owner, id)?;
        // uniqueness check before taking the mutable borrow
        if let Some(ref name) = upd.name {
            if s.accounts.values().any(|a| a.owner_id == owner && a.name == *name && a.id != id) {
                return Err(RepoError::Conflict);
            }
        }
        let account = s.accounts.get_mut(id).ok_or(RepoError::NotFound)?;
        if let Some(name) = upd.name { account.name = name; }
        if let Some(notes) = upd.notes { account.notes = notes; }
        account.updated_at = Utc::now();
        let updated = account.clone();
        drop(s);
        self.persist();
        Ok(updated)
    }

    async fn delete_account(&self, owner: &str, id: &str) -> RepoResult<()> {
        let mut s = self.write()?;
        s.owned_account(owner, id)?;
        s.accounts.remove(id);
        let now = Utc::now();
        for c in s.characters.values_mut().filter(|c| c.account_id.as_deref() == Some(id)) {
            c.account_id = None;
            c.updated_at = now;
        }
        drop(s);
        self.persist();
        Ok(())
    }
}

#[async_trait]
impl CharacterRepo for InMemRepo {
    async fn list_characters(&self, owner: &str, account_id: Option<&str>) -> RepoResult<Vec<Character>> {
        let s = self.read()?;
        let mut v: Vec<_> = s
            .characters
            .values()
            .filter(|c| c.owner_id == owner)
            .filter(|c| account_id.map_or(true, |acc| c.account_id.as_deref() == Some(acc)))
            .cloned()
            .collect();
        v.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(v)
    }

    async fn get_character(&self, owner: &str, id: &str) -> RepoResult<Character> {
        self.read()?
            .characters
            .get(id)
            .filter(|c| c.owner_id == owner)
            .cloned()
            .ok_or(RepoError::NotFound)
    }

    async fn create_character(&self, owner: &str, new: NewCharacter) -> RepoResult<Character> {
        let mut s = self.write()?;
        s.check_account_link(owner, new.account_id.as_deref())?;
        let character = build_character(owner, new);
        s.characters.insert(character.id.clone(), character.clone());
        drop(s);
        self.persist();
        Ok(character)
    }

    async fn update_character(&self, owner: &str, id: &str, upd: UpdateCharacter) -> RepoResult<Character> {
        let mut s = self.write()?;
        if let Some(Some(ref acc)) = upd.account_id {
            s.check_account_link(owner, Some(acc))?;
        }
        let c = s.owned_character_mut(owner, id)?;
        if let Some(name) = upd.name { c.name = name; }
        if let Some(acc) = upd.account_id { c.account_id = acc; }
        if let Some(url) = upd.image_url { c.image_url = Some(url); }
        c.updated_at = Utc::now();
        let updated = c.clone();
        drop(s);
        self.persist();
        Ok(updated)
    }

    async fn set_favor(&self, owner: &str, id: &str, npc: &str, level: FavorLevel) -> RepoResult<Character> {
        let mut s = self.write()?;
        let c = s.owned_character_mut(owner, id)?;
        c.favors.insert(npc.to_string(), level);
        c.updated_at = Utc::now();
        let updated = c.clone();
        drop(s);
        self.persist();
        Ok(updated)
    }

    async fn delete_character(&self, owner: &str, id: &str) -> RepoResult<()> {
        let mut s = self.write()?;
        s.owned_character_mut(owner, id)?;
        s.characters.remove(id);
        drop(s);
        self.persist();
        Ok(())
    }

    async fn replace_characters(&self, owner: &str, items: Vec<NewCharacter>) -> RepoResult<Vec<Character>> {
        let mut s = self.write()?;
        for item in &items {
            s.check_account_link(owner, item.account_id.as_deref())?;
        }
        s.characters.retain(|_, c| c.owner_id != owner);
        let created: Vec<Character> = items.into_iter().map(|n| build_character(owner, n)).collect();
        for c in &created {
            s.characters.insert(c.id.clone(), c.clone());
        }
        drop(s);
        self.persist();
        Ok(created)
    }
}

#[async_trait]
impl SuggestionRepo for InMemRepo {
    async fn create_suggestion(&self, new: NewSuggestion) -> RepoResult<Suggestion> {
        let suggestion = Suggestion {
            id: new_id(),
            text: new.text,
            creator_id: new.creator_id,
            creator_name: new.creator_name,
            status: SuggestionStatus::Open,
            conversation: Vec::new(),
            created_at: Utc::now(),
        };
        self.write()?.suggestions.insert(suggestion.id.clone(), suggestion.clone());
        self.persist();
        Ok(suggestion)
    }

    async fn get_suggestion(&self, id: &str) -> RepoResult<Suggestion> {
        self.read()?.suggestions.get(id).cloned().ok_or(RepoError::NotFound)
    }

    async fn list_suggestions(&self, creator: Option<&str>, status: Option<SuggestionStatus>) -> RepoResult<Vec<Suggestion>> {
        let s = self.read()?;
        let mut v: Vec<_> = s
            .suggestions
            .values()
            .filter(|x| creator.map_or(true, |c| x.creator_id == c))
            .filter(|x| status.map_or(true, |st| x.status == st))
            .cloned()
            .collect();
        v.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(v)
    }

    async fn append_conversation(&self, id: &str, entry: ConversationEntry) -> RepoResult<Suggestion> {
        let mut s = self.write()?;
        let sg = s.suggestions.get_mut(id).ok_or(RepoError::NotFound)?;
        sg.conversation.push(entry);
        let updated = sg.clone();
        drop(s);
        self.persist();
        Ok(updated)
    }

    async fn set_status(&self, id: &str, status: SuggestionStatus) -> RepoResult<Suggestion> {
        let mut s = self.write()?;
        let sg = s.suggestions.get_mut(id).ok_or(RepoError::NotFound)?;
        sg.status = status;
        let updated = sg.clone();
        drop(s);
        self.persist();
        Ok(updated)
    }
}

#[async_trait]
impl MessageRepo for InMemRepo {
    async fn create_message(&self, new: NewMessage) -> RepoResult<Message> {
        let msg = Message {
            id: new_id(),
            sender_id: new.sender_id,
            sender_name: new.sender_name,
            receiver_id: new.receiver_id,
            receiver_name: new.receiver_name,
            text: new.text,
            read: false,
            suggestion_id: new.suggestion_id,
            created_at: Utc::now(),
        };
        self.write()?.messages.insert(msg.id.clone(), msg.clone());
        self.persist();
        Ok(msg)
    }

    async fn list_messages(&self, receiver: &str) -> RepoResult<Vec<Message>> {
        let s = self.read()?;
        let mut v: Vec<_> = s.messages.values().filter(|m| m.receiver_id == receiver).cloned().collect();
        v.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(v)
    }

    async fn mark_read(&self, receiver: &str, id: &str) -> RepoResult<Message> {
        let mut s = self.write()?;
        let m = s.messages.get_mut(id).filter(|m| m.receiver_id == receiver).ok_or(RepoError::NotFound)?;
        m.read = true;
        let updated = m.clone();
        drop(s);
        self.persist();
        Ok(updated)
    }
}
