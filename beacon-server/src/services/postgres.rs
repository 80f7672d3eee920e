//! Postgres-backed stores. Tables are created by the bootstrap scripts under
//! `beacon-server/db`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::models::{
    CallMode, Identity, InteractionKind, Message, MessageBody, MessageKind, NewMessage,
    NewNotification, Notification, PublicProfile, Timestamp, UpsertProfileRequest,
};
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

use super::{
    directory::{ProfileDirectory, profile_from_request},
    message_store::{MessageStore, StoreError, StoreResult},
    notification_store::NotificationStore,
};

const MESSAGE_COLUMNS: &str = "id, sequence, from_identity, to_identity, text, media_url, kind, room_id, call_mode, seen, created_at";

impl StoreError {
    fn from_db_error(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            match db.code().as_deref() {
                Some("23503") => return StoreError::NotFound(db.message().to_string()),
                Some("23514" | "22001" | "23502") => {
                    return StoreError::Validation(db.message().to_string());
                }
                _ => {}
            }
        }
        StoreError::Database(err)
    }
}

#[derive(Debug, sqlx::FromRow)]
struct MessageRow {
    id: Uuid,
    sequence: i64,
    from_identity: String,
    to_identity: String,
    text: Option<String>,
    media_url: Option<String>,
    kind: String,
    room_id: Option<String>,
    call_mode: Option<String>,
    seen: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<MessageRow> for Message {
    type Error = StoreError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        let mode = row.call_mode.as_deref().and_then(CallMode::parse);
        let kind = MessageKind::from_parts(&row.kind, row.room_id, mode).ok_or_else(|| {
            StoreError::Database(sqlx::Error::Protocol(format!(
                "message {} has unknown kind '{}'",
                row.id, row.kind
            )))
        })?;

        Ok(Message {
            id: row.id,
            from_identity: Identity::from(row.from_identity),
            to_identity: Identity::from(row.to_identity),
            body: MessageBody {
                text: row.text,
                media_url: row.media_url,
            },
            kind,
            created_at: Timestamp(row.created_at),
            sequence: row.sequence,
            seen: row.seen,
        })
    }
}

fn into_messages(rows: Vec<MessageRow>) -> StoreResult<Vec<Message>> {
    rows.into_iter().map(Message::try_from).collect()
}

#[derive(Debug, Clone)]
pub struct PgMessageStore {
    pool: PgPool,
}

impl PgMessageStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn owner_of(&self, message_id: Uuid) -> StoreResult<(String, String)> {
        sqlx::query_as::<_, (String, String)>(
            "SELECT from_identity, to_identity FROM beacon_messages WHERE id = $1",
        )
        .bind(message_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from_db_error)?
        .ok_or_else(|| StoreError::NotFound(format!("message {message_id}")))
    }
}

/// Explains why a seen update matched no row: the message is gone, or the
/// viewer is not its recipient.
fn seen_update_miss(
    message_id: Uuid,
    viewer: &Identity,
    owner: Option<&(String, String)>,
) -> StoreError {
    match owner {
        Some((_, recipient)) if recipient != viewer.as_str() => {
            StoreError::Forbidden("only the recipient can mark a message seen".into())
        }
        _ => StoreError::NotFound(format!("message {message_id}")),
    }
}

#[async_trait]
impl MessageStore for PgMessageStore {
    #[instrument(name = "store.create_message", skip(self, message), err)]
    async fn create(&self, message: NewMessage) -> StoreResult<Message> {
        message.validate().map_err(StoreError::Validation)?;

        let sql = format!(
            "INSERT INTO beacon_messages (id, from_identity, to_identity, text, media_url, kind, room_id, call_mode)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING {MESSAGE_COLUMNS}"
        );
        let row = sqlx::query_as::<_, MessageRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(message.from.as_str())
            .bind(message.to.as_str())
            .bind(message.body.text.as_deref())
            .bind(message.body.media_url.as_deref())
            .bind(message.kind.as_str())
            .bind(message.kind.room_id())
            .bind(message.kind.call_mode().map(|mode| mode.to_string()))
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::from_db_error)?;

        Message::try_from(row)
    }

    #[instrument(name = "store.list_conversation", skip(self), err)]
    async fn list_by_conversation(
        &self,
        a: &Identity,
        b: &Identity,
        page: u32,
        limit: u32,
    ) -> StoreResult<Vec<Message>> {
        let offset = i64::from(page.saturating_sub(1)) * i64::from(limit);
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM (
                SELECT {MESSAGE_COLUMNS} FROM beacon_messages
                WHERE (from_identity = $1 AND to_identity = $2)
                   OR (from_identity = $2 AND to_identity = $1)
                ORDER BY created_at DESC, sequence DESC
                LIMIT $3 OFFSET $4
             ) page
             ORDER BY created_at ASC, sequence ASC"
        );
        let rows = sqlx::query_as::<_, MessageRow>(&sql)
            .bind(a.as_str())
            .bind(b.as_str())
            .bind(i64::from(limit))
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::from_db_error)?;

        into_messages(rows)
    }

    #[instrument(name = "store.mark_seen", skip(self), err)]
    async fn mark_seen(&self, viewer: &Identity, message_id: Uuid) -> StoreResult<Message> {
        let sql = format!(
            "UPDATE beacon_messages SET seen = TRUE
             WHERE id = $1 AND to_identity = $2
             RETURNING {MESSAGE_COLUMNS}"
        );
        let row = sqlx::query_as::<_, MessageRow>(&sql)
            .bind(message_id)
            .bind(viewer.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::from_db_error)?;

        match row {
            Some(row) => Message::try_from(row),
            None => {
                let owner = match self.owner_of(message_id).await {
                    Ok(owner) => Some(owner),
                    Err(StoreError::NotFound(_)) => None,
                    Err(err) => return Err(err),
                };
                Err(seen_update_miss(message_id, viewer, owner.as_ref()))
            }
        }
    }

    async fn mark_conversation_seen(&self, viewer: &Identity, peer: &Identity) -> StoreResult<u64> {
        let result = sqlx::query(
            "UPDATE beacon_messages SET seen = TRUE
             WHERE to_identity = $1 AND from_identity = $2 AND NOT seen",
        )
        .bind(viewer.as_str())
        .bind(peer.as_str())
        .execute(&self.pool)
        .await
        .map_err(StoreError::from_db_error)?;

        Ok(result.rows_affected())
    }

    #[instrument(name = "store.delete_message", skip(self), err)]
    async fn delete(&self, actor: &Identity, message_id: Uuid) -> StoreResult<bool> {
        let (sender, _) = self.owner_of(message_id).await?;
        if sender != actor.as_str() {
            return Err(StoreError::Forbidden(
                "only the sender can delete a message".into(),
            ));
        }

        let result = sqlx::query("DELETE FROM beacon_messages WHERE id = $1")
            .bind(message_id)
            .execute(&self.pool)
            .await
            .map_err(StoreError::from_db_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn recent_for(&self, identity: &Identity, limit: u32) -> StoreResult<Vec<Message>> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM (
                SELECT DISTINCT ON (from_identity) {MESSAGE_COLUMNS} FROM beacon_messages
                WHERE to_identity = $1
                ORDER BY from_identity, created_at DESC, sequence DESC
             ) latest
             ORDER BY created_at DESC, sequence DESC
             LIMIT $2"
        );
        let rows = sqlx::query_as::<_, MessageRow>(&sql)
            .bind(identity.as_str())
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::from_db_error)?;

        into_messages(rows)
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ProfileRow {
    identity: String,
    display_name: String,
    username: Option<String>,
    avatar_url: Option<String>,
}

impl From<ProfileRow> for PublicProfile {
    fn from(row: ProfileRow) -> Self {
        Self {
            identity: Identity::from(row.identity),
            display_name: row.display_name,
            username: row.username,
            avatar_url: row.avatar_url,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PgProfileDirectory {
    pool: PgPool,
}

impl PgProfileDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProfileDirectory for PgProfileDirectory {
    async fn get(&self, identity: &Identity) -> StoreResult<Option<PublicProfile>> {
        let row = sqlx::query_as::<_, ProfileRow>(
            "SELECT identity, display_name, username, avatar_url
             FROM beacon_profiles WHERE identity = $1",
        )
        .bind(identity.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from_db_error)?;

        Ok(row.map(PublicProfile::from))
    }

    #[instrument(name = "store.upsert_profile", skip(self, request), err)]
    async fn upsert(
        &self,
        identity: &Identity,
        request: UpsertProfileRequest,
    ) -> StoreResult<PublicProfile> {
        if identity.is_blank() {
            return Err(StoreError::Validation("identity is required".into()));
        }
        let profile = profile_from_request(identity, request)?;

        let row = sqlx::query_as::<_, ProfileRow>(
            "INSERT INTO beacon_profiles (identity, display_name, username, avatar_url)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (identity) DO UPDATE
               SET display_name = EXCLUDED.display_name,
                   username = EXCLUDED.username,
                   avatar_url = EXCLUDED.avatar_url,
                   updated_at = now()
             RETURNING identity, display_name, username, avatar_url",
        )
        .bind(profile.identity.as_str())
        .bind(&profile.display_name)
        .bind(profile.username.as_deref())
        .bind(profile.avatar_url.as_deref())
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::from_db_error)?;

        Ok(row.into())
    }

    async fn ensure(&self, identity: &Identity) -> StoreResult<PublicProfile> {
        if identity.is_blank() {
            return Err(StoreError::Validation("identity is required".into()));
        }

        sqlx::query(
            "INSERT INTO beacon_profiles (identity, display_name)
             VALUES ($1, $1)
             ON CONFLICT (identity) DO NOTHING",
        )
        .bind(identity.as_str())
        .execute(&self.pool)
        .await
        .map_err(StoreError::from_db_error)?;

        self.get(identity)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("profile {identity}")))
    }
}

#[derive(Debug, sqlx::FromRow)]
struct NotificationRow {
    id: Uuid,
    recipient: String,
    sender: String,
    kind: String,
    post_id: Option<String>,
    text: Option<String>,
    read: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = StoreError;

    fn try_from(row: NotificationRow) -> Result<Self, Self::Error> {
        let kind = InteractionKind::parse(&row.kind).ok_or_else(|| {
            StoreError::Database(sqlx::Error::Protocol(format!(
                "notification {} has unknown kind '{}'",
                row.id, row.kind
            )))
        })?;

        Ok(Notification {
            id: row.id,
            recipient: Identity::from(row.recipient),
            sender: Identity::from(row.sender),
            kind,
            post_id: row.post_id,
            text: row.text,
            read: row.read,
            created_at: Timestamp(row.created_at),
        })
    }
}

#[derive(Debug, Clone)]
pub struct PgNotificationStore {
    pool: PgPool,
}

impl PgNotificationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationStore for PgNotificationStore {
    #[instrument(name = "store.create_notification", skip(self, notification), err)]
    async fn create(&self, notification: NewNotification) -> StoreResult<Notification> {
        let row = sqlx::query_as::<_, NotificationRow>(
            "INSERT INTO beacon_notifications (id, recipient, sender, kind, post_id, text)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING id, recipient, sender, kind, post_id, text, read, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(notification.recipient.as_str())
        .bind(notification.sender.as_str())
        .bind(notification.kind.as_str())
        .bind(notification.post_id.as_deref())
        .bind(notification.text.as_deref())
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::from_db_error)?;

        Notification::try_from(row)
    }

    async fn list_and_mark_read(&self, recipient: &Identity) -> StoreResult<Vec<Notification>> {
        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;

        let rows = sqlx::query_as::<_, NotificationRow>(
            "SELECT id, recipient, sender, kind, post_id, text, read, created_at
             FROM beacon_notifications
             WHERE recipient = $1
             ORDER BY created_at DESC
             FOR UPDATE",
        )
        .bind(recipient.as_str())
        .fetch_all(&mut *tx)
        .await
        .map_err(StoreError::from_db_error)?;

        sqlx::query("UPDATE beacon_notifications SET read = TRUE WHERE recipient = $1 AND NOT read")
            .bind(recipient.as_str())
            .execute(&mut *tx)
            .await
            .map_err(StoreError::from_db_error)?;

        tx.commit().await.map_err(StoreError::from)?;

        rows.into_iter().map(Notification::try_from).collect()
    }
}
