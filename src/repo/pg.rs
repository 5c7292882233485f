//! Postgres document store: one JSONB table keyed by (collection, id).

use async_trait::async_trait;
use chrono::Utc;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use sqlx::{Pool, Postgres};

use super::*;

const USERS: &str = "users";
const ACCOUNTS: &str = "accounts";
const CHARACTERS: &str = "characters";
const SUGGESTIONS: &str = "suggestions";
const MESSAGES: &str = "messages";

#[derive(Clone)]
pub struct PgRepo { pool: Pool<Postgres> }

fn db_err(e: sqlx::Error) -> RepoError {
    match e {
        sqlx::Error::RowNotFound => RepoError::NotFound,
        sqlx::Error::Database(ref d) if d.is_unique_violation() => RepoError::Conflict,
        other => RepoError::Internal(other.to_string()),
    }
}

fn decode<T: DeserializeOwned>(v: Value) -> RepoResult<T> {
    serde_json::from_value(v).map_err(|e| RepoError::Internal(format!("corrupt document: {e}")))
}

fn encode<T: Serialize>(doc: &T) -> RepoResult<Value> {
    serde_json::to_value(doc).map_err(|e| RepoError::Internal(e.to_string()))
}

fn decode_all<T: DeserializeOwned>(rows: Vec<Value>) -> RepoResult<Vec<T>> {
    rows.into_iter().map(decode).collect()
}

impl PgRepo {
    pub fn new(pool: Pool<Postgres>) -> Self { Self { pool } }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    async fn get_doc<T: DeserializeOwned>(&self, coll: &str, id: &str) -> RepoResult<T> {
        let v: Value = sqlx::query_scalar("SELECT data FROM documents WHERE collection = $1 AND id = $2")
            .bind(coll).bind(id)
            .fetch_one(&self.pool).await.map_err(db_err)?;
        decode(v)
    }

    /// Fetch a document only when `field` equals `value` (ownership check in the same read).
    async fn get_doc_where<T: DeserializeOwned>(&self, coll: &str, id: &str, field: &str, value: &str) -> RepoResult<T> {
        let v: Value = sqlx::query_scalar("SELECT data FROM documents WHERE collection = $1 AND id = $2 AND data->>$3 = $4")
            .bind(coll).bind(id).bind(field).bind(value)
            .fetch_one(&self.pool).await.map_err(db_err)?;
        decode(v)
    }

    async fn list_where(&self, coll: &str, field: Option<(&str, &str)>) -> RepoResult<Vec<Value>> {
        let (f, v) = field.unzip();
        sqlx::query_scalar("SELECT data FROM documents WHERE collection = $1 AND ($2::text IS NULL OR data->>$2 = $3)")
            .bind(coll).bind(f).bind(v)
            .fetch_all(&self.pool).await.map_err(db_err)
    }

    async fn insert_doc<T: Serialize>(&self, coll: &str, id: &str, doc: &T) -> RepoResult<()> {
        sqlx::query("INSERT INTO documents (collection, id, data) VALUES ($1, $2, $3)")
            .bind(coll).bind(id).bind(encode(doc)?)
            .execute(&self.pool).await.map_err(db_err)?;
        Ok(())
    }

    async fn put_doc<T: Serialize>(&self, coll: &str, id: &str, doc: &T) -> RepoResult<()> {
        let res = sqlx::query("UPDATE documents SET data = $3 WHERE collection = $1 AND id = $2")
            .bind(coll).bind(id).bind(encode(doc)?)
            .execute(&self.pool).await.map_err(db_err)?;
        if res.rows_affected() == 0 { return Err(RepoError::NotFound); }
        Ok(())
    }

    async fn delete_owned(&self, coll: &str, owner: &str, id: &str) -> RepoResult<()> {
        let res = sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2 AND data->>'ownerId' = $3")
            .bind(coll).bind(id).bind(owner)
            .execute(&self.pool).await.map_err(db_err)?;
        if res.rows_affected() == 0 { return Err(RepoError::NotFound); }
        Ok(())
    }

    async fn check_account_link(&self, owner: &str, account_id: Option<&str>) -> RepoResult<()> {
        match account_id {
            Some(acc) => self.get_doc_where::<Account>(ACCOUNTS, acc, "ownerId", owner).await.map(|_| ()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl UserRepo for PgRepo {
    async fn get_user(&self, uid: &str) -> RepoResult<User> {
        self.get_doc(USERS, uid).await
    }

    async fn upsert_user(&self, uid: &str, display_name: &str) -> RepoResult<User> {
        let fresh = User { id: uid.to_string(), display_name: display_name.to_string(), is_admin: false, created_at: Utc::now() };
        let v: Value = sqlx::query_scalar(r#"
            INSERT INTO documents (collection, id, data) VALUES ($1, $2, $3)
            ON CONFLICT (collection, id)
            DO UPDATE SET data = jsonb_set(documents.data, '{displayName}', to_jsonb($4::text))
            RETURNING data
        "#)
            .bind(USERS).bind(uid).bind(encode(&fresh)?).bind(display_name)
            .fetch_one(&self.pool).await.map_err(db_err)?;
        decode(v)
    }

    async fn set_admin(&self, uid: &str, is_admin: bool) -> RepoResult<User> {
        let v: Value = sqlx::query_scalar(
            "UPDATE documents SET data = jsonb_set(data, '{isAdmin}', to_jsonb($3::boolean)) WHERE collection = $1 AND id = $2 RETURNING data"
        )
            .bind(USERS).bind(uid).bind(is_admin)
            .fetch_one(&self.pool).await.map_err(db_err)?;
        decode(v)
    }
}

#[async_trait]
impl AccountRepo for PgRepo {
    async fn list_accounts(&self, owner: &str) -> RepoResult<Vec<Account>> {
        let mut v: Vec<Account> = decode_all(self.list_where(ACCOUNTS, Some(("ownerId", owner))).await?)?;
        v.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(v)
    }

    async fn create_account(&self, owner: &str, new: NewAccount) -> RepoResult<Account> {
        let existing: Vec<Account> = decode_all(self.list_where(ACCOUNTS, Some(("ownerId", owner))).await?)?;
        if existing.iter().any(|a| a.name == new.name) { return Err(RepoError::Conflict); }
        let now = Utc::now();
        let account = Account { id: new_id(), owner_id: owner.to_string(), name: new.name, notes: new.notes, created_at: now, updated_at: now };
        self.insert_doc(ACCOUNTS, &account.id, &account).await?;
        Ok(account)
    }

    async fn update_account(&self, owner: &str, id: &str, upd: UpdateAccount) -> RepoResult<Account> {
        let mut account: Account = self.get_doc_where(ACCOUNTS, id, "ownerId", owner).await?;
        if let Some(ref name) = upd.name {
            let siblings: Vec<Account> = decode_all(self.list_where(ACCOUNTS, Some(("ownerId", owner))).await?)?;
            if siblings.iter().any(|a| a.name == *name && a.id != id) { return Err(RepoError::Conflict); }
        }
        if let Some(name) = upd.name { account.name = name; }
        if let Some(notes) = upd.notes { account.notes = notes; }
        account.updated_at = Utc::now();
        self.put_doc(ACCOUNTS, id, &account).await?;
        Ok(account)
    }

    async fn delete_account(&self, owner: &str, id: &str) -> RepoResult<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let res = sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2 AND data->>'ownerId' = $3")
            .bind(ACCOUNTS).bind(id).bind(owner)
            .execute(&mut *tx).await.map_err(db_err)?;
        if res.rows_affected() == 0 { return Err(RepoError::NotFound); }
        sqlx::query(r#"
            UPDATE documents SET data = jsonb_set(data, '{accountId}', 'null'::jsonb)
            WHERE collection = $1 AND data->>'ownerId' = $2 AND data->>'accountId' = $3
        "#)
            .bind(CHARACTERS).bind(owner).bind(id)
            .execute(&mut *tx).await.map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;
        Ok(())
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
impl CharacterRepo for PgRepo {
    async fn list_characters(&self, owner: &str, account_id: Option<&str>) -> RepoResult<Vec<Character>> {
        let mut v: Vec<Character> = decode_all(self.list_where(CHARACTERS, Some(("ownerId", owner))).await?)?;
        if let Some(acc) = account_id {
            v.retain(|c| c.account_id.as_deref() == Some(acc));
        }
        v.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(v)
    }

    async fn get_character(&self, owner: &str, id: &str) -> RepoResult<Character> {
        self.get_doc_where(CHARACTERS, id, "ownerId", owner).await
    }

    async fn create_character(&self, owner: &str, new: NewCharacter) -> RepoResult<Character> {
        self.check_account_link(owner, new.account_id.as_deref()).await?;
        let character = build_character(owner, new);
        self.insert_doc(CHARACTERS, &character.id, &character).await?;
        Ok(character)
    }

    async fn update_character(&self, owner: &str, id: &str, upd: UpdateCharacter) -> RepoResult<Character> {
        if let Some(Some(ref acc)) = upd.account_id {
            self.check_account_link(owner, Some(acc)).await?;
        }
        let mut c: Character = self.get_doc_where(CHARACTERS, id, "ownerId", owner).await?;
        if let Some(name) = upd.name { c.name = name; }
        if let Some(acc) = upd.account_id { c.account_id = acc; }
        if let Some(url) = upd.image_url { c.image_url = Some(url); }
        c.updated_at = Utc::now();
        self.put_doc(CHARACTERS, id, &c).await?;
        Ok(c)
    }

    async fn set_favor(&self, owner: &str, id: &str, npc: &str, level: FavorLevel) -> RepoResult<Character> {
        let v: Value = sqlx::query_scalar(r#"
            UPDATE documents
            SET data = jsonb_set(
                jsonb_set(data, '{favors}', COALESCE(data->'favors', '{}'::jsonb) || jsonb_build_object($4::text, $5::jsonb)),
                '{updatedAt}', to_jsonb($6::text))
            WHERE collection = $1 AND id = $2 AND data->>'ownerId' = $3
            RETURNING data
        "#)
            .bind(CHARACTERS).bind(id).bind(owner).bind(npc).bind(encode(&level)?).bind(Utc::now().to_rfc3339())
            .fetch_one(&self.pool).await.map_err(db_err)?;
        decode(v)
    }

    async fn delete_character(&self, owner: &str, id: &str) -> RepoResult<()> {
        self.delete_owned(CHARACTERS, owner, id).await
    }

    async fn replace_characters(&self, owner: &str, items: Vec<NewCharacter>) -> RepoResult<Vec<Character>> {
        for item in &items {
            self.check_account_link(owner, item.account_id.as_deref()).await?;
        }
        let created: Vec<Character> = items.into_iter().map(|n| build_character(owner, n)).collect();
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        sqlx::query("DELETE FROM documents WHERE collection = $1 AND data->>'ownerId' = $2")
            .bind(CHARACTERS).bind(owner)
            .execute(&mut *tx).await.map_err(db_err)?;
        for c in &created {
            sqlx::query("INSERT INTO documents (collection, id, data) VALUES ($1, $2, $3)")
                .bind(CHARACTERS).bind(&c.id).bind(encode(c)?)
                .execute(&mut *tx).await.map_err(db_err)?;
        }
        tx.commit().await.map_err(db_err)?;
        Ok(created)
    }
}

#[async_trait]
impl SuggestionRepo for PgRepo {
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
        self.insert_doc(SUGGESTIONS, &suggestion.id, &suggestion).await?;
        Ok(suggestion)
    }

    async fn get_suggestion(&self, id: &str) -> RepoResult<Suggestion> {
        self.get_doc(SUGGESTIONS, id).await
    }

    async fn list_suggestions(&self, creator: Option<&str>, status: Option<SuggestionStatus>) -> RepoResult<Vec<Suggestion>> {
        let rows = self.list_where(SUGGESTIONS, creator.map(|c| ("creatorId", c))).await?;
        let mut v: Vec<Suggestion> = decode_all(rows)?;
        if let Some(st) = status {
            v.retain(|s| s.status == st);
        }
        v.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(v)
    }

    async fn append_conversation(&self, id: &str, entry: ConversationEntry) -> RepoResult<Suggestion> {
        let v: Value = sqlx::query_scalar(r#"
            UPDATE documents
            SET data = jsonb_set(data, '{conversation}', COALESCE(data->'conversation', '[]'::jsonb) || jsonb_build_array($3::jsonb))
            WHERE collection = $1 AND id = $2
            RETURNING data
        "#)
            .bind(SUGGESTIONS).bind(id).bind(encode(&entry)?)
            .fetch_one(&self.pool).await.map_err(db_err)?;
        decode(v)
    }

    async fn set_status(&self, id: &str, status: SuggestionStatus) -> RepoResult<Suggestion> {
        let v: Value = sqlx::query_scalar(
            "UPDATE documents SET data = jsonb_set(data, '{status}', to_jsonb($3::text)) WHERE collection = $1 AND id = $2 RETURNING data"
        )
            .bind(SUGGESTIONS).bind(id).bind(status.as_str())
            .fetch_one(&self.pool).await.map_err(db_err)?;
        decode(v)
    }
}

#[async_trait]
impl MessageRepo for PgRepo {
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
        self.insert_doc(MESSAGES, &msg.id, &msg).await?;
        Ok(msg)
    }

    async fn list_messages(&self, receiver: &str) -> RepoResult<Vec<Message>> {
        let mut v: Vec<Message> = decode_all(self.list_where(MESSAGES, Some(("receiverId", receiver))).await?)?;
        v.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(v)
    }

    async fn mark_read(&self, receiver: &str, id: &str) -> RepoResult<Message> {
        let v: Value = sqlx::query_scalar(
            "UPDATE documents SET data = jsonb_set(data, '{read}', 'true'::jsonb) WHERE collection = $1 AND id = $2 AND data->>'receiverId' = $3 RETURNING data"
        )
            .bind(MESSAGES).bind(id).bind(receiver)
            .fetch_one(&self.pool).await.map_err(db_err)?;
        decode(v)
    }
}
