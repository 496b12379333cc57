//! SQLite message store.
//!
//! Uses split reader/writer pools in WAL mode: up to eight connections
//! serve reads while a single connection serializes writes. The schema is
//! applied from `migrations/` when the store is opened.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

use crate::message::{Attachment, ChatPreview, Message, UserId};
use crate::store::{MessageStore, Page, StoreError};

/// A [`MessageStore`] backed by a SQLite database file.
#[derive(Debug, Clone)]
pub struct SqliteMessageStore {
    reader: SqlitePool,
    writer: SqlitePool,
}

impl SqliteMessageStore {
    /// Open (creating if needed) the database at `database_url` and apply
    /// pending migrations.
    ///
    /// The URL must name a file: an in-memory database is not shared
    /// between the two pools.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let base_opts = SqliteConnectOptions::from_str(database_url)?
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5))
            .create_if_missing(true);

        let writer = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(base_opts.clone())
            .await?;

        // Migrate before any reader opens the file
        sqlx::migrate!("./migrations").run(&writer).await?;

        let reader = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(base_opts.read_only(true))
            .await?;

        info!(url = %database_url, "Opened message store");
        Ok(Self { reader, writer })
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

struct MessageRow {
    message_id: String,
    sender_id: String,
    receiver_id: String,
    content: String,
    appointment_id: Option<String>,
    agreement_id: Option<String>,
    sent_at: String,
    read_at: Option<String>,
}

impl MessageRow {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            message_id: row.try_get("message_id")?,
            sender_id: row.try_get("sender_id")?,
            receiver_id: row.try_get("receiver_id")?,
            content: row.try_get("content")?,
            appointment_id: row.try_get("appointment_id")?,
            agreement_id: row.try_get("agreement_id")?,
            sent_at: row.try_get("sent_at")?,
            read_at: row.try_get("read_at")?,
        })
    }

    fn into_message(self) -> Result<Message, StoreError> {
        let attachment = match (self.appointment_id, self.agreement_id) {
            (Some(id), _) => Attachment::Appointment(parse_uuid(&id)?),
            (None, Some(id)) => Attachment::Agreement(parse_uuid(&id)?),
            (None, None) => Attachment::None,
        };

        Ok(Message {
            id: parse_uuid(&self.message_id)?,
            sender_id: parse_uuid(&self.sender_id)?,
            receiver_id: parse_uuid(&self.receiver_id)?,
            content: self.content,
            attachment,
            sent_at: parse_datetime(&self.sent_at)?,
            read_at: self.read_at.as_deref().map(parse_datetime).transpose()?,
        })
    }
}

fn parse_uuid(s: &str) -> Result<Uuid, StoreError> {
    s.parse::<Uuid>()
        .map_err(|e| StoreError::Backend(format!("invalid UUID: {e}")))
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Backend(format!("invalid datetime: {e}")))
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn to_messages(rows: &[SqliteRow]) -> Result<Vec<Message>, StoreError> {
    rows.iter()
        .map(|row| MessageRow::from_row(row).map_err(backend)?.into_message())
        .collect()
}

// ---------------------------------------------------------------------------
// MessageStore impl
// ---------------------------------------------------------------------------

#[async_trait]
impl MessageStore for SqliteMessageStore {
    async fn save_message(&self, message: &Message) -> Result<(), StoreError> {
        let (appointment_id, agreement_id) = match message.attachment {
            Attachment::None => (None, None),
            Attachment::Appointment(id) => (Some(id.to_string()), None),
            Attachment::Agreement(id) => (None, Some(id.to_string())),
        };

        sqlx::query(
            r#"INSERT INTO messages
               (message_id, sender_id, receiver_id, content, appointment_id,
                agreement_id, sent_at, read_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(message.id.to_string())
        .bind(message.sender_id.to_string())
        .bind(message.receiver_id.to_string())
        .bind(&message.content)
        .bind(appointment_id)
        .bind(agreement_id)
        .bind(format_datetime(&message.sent_at))
        .bind(message.read_at.as_ref().map(format_datetime))
        .execute(&self.writer)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::Duplicate(message.id)
            }
            _ => backend(e),
        })?;

        Ok(())
    }

    async fn mark_read(
        &self,
        sender: UserId,
        receiver: UserId,
        read_at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"UPDATE messages
               SET read_at = MAX(?, sent_at)
               WHERE sender_id = ? AND receiver_id = ? AND read_at IS NULL"#,
        )
        .bind(format_datetime(&read_at))
        .bind(sender.to_string())
        .bind(receiver.to_string())
        .execute(&self.writer)
        .await
        .map_err(backend)?;

        Ok(result.rows_affected())
    }

    async fn list_conversation(
        &self,
        a: UserId,
        b: UserId,
        page: Page,
    ) -> Result<Vec<Message>, StoreError> {
        let rows = sqlx::query(
            r#"SELECT * FROM (
                   SELECT * FROM messages
                   WHERE (sender_id = ? AND receiver_id = ?)
                      OR (sender_id = ? AND receiver_id = ?)
                   ORDER BY sent_at DESC, message_id DESC
                   LIMIT ? OFFSET ?
               )
               ORDER BY sent_at ASC, message_id ASC"#,
        )
        .bind(a.to_string())
        .bind(b.to_string())
        .bind(b.to_string())
        .bind(a.to_string())
        .bind(page.limit() as i64)
        .bind(page.offset() as i64)
        .fetch_all(&self.reader)
        .await
        .map_err(backend)?;

        to_messages(&rows)
    }

    async fn save_user(&self, user: UserId, display_name: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"INSERT INTO users (user_id, display_name) VALUES (?, ?)
               ON CONFLICT (user_id) DO UPDATE SET display_name = excluded.display_name"#,
        )
        .bind(user.to_string())
        .bind(display_name)
        .execute(&self.writer)
        .await
        .map_err(backend)?;

        Ok(())
    }

    async fn list_previews(
        &self,
        user: UserId,
        filter: &str,
    ) -> Result<Vec<ChatPreview>, StoreError> {
        let user = user.to_string();
        let rows = sqlx::query(
            r#"WITH conversation AS (
                   SELECT
                       CASE WHEN sender_id = ? THEN receiver_id ELSE sender_id END AS peer_id,
                       message_id, receiver_id, content, sent_at, read_at
                   FROM messages
                   WHERE sender_id = ? OR receiver_id = ?
               ),
               latest AS (
                   SELECT peer_id, content, sent_at,
                          ROW_NUMBER() OVER (
                              PARTITION BY peer_id ORDER BY sent_at DESC, message_id DESC
                          ) AS position
                   FROM conversation
               ),
               unread AS (
                   SELECT peer_id, COUNT(*) AS unread_messages
                   FROM conversation
                   WHERE receiver_id = ? AND read_at IS NULL
                   GROUP BY peer_id
               )
               SELECT latest.peer_id, users.display_name, latest.content, latest.sent_at,
                      COALESCE(unread.unread_messages, 0) AS unread_messages
               FROM latest
               LEFT JOIN unread ON unread.peer_id = latest.peer_id
               LEFT JOIN users ON users.user_id = latest.peer_id
               WHERE latest.position = 1
                 AND (? = '' OR LOWER(users.display_name) LIKE '%' || LOWER(?) || '%')
               ORDER BY unread_messages DESC, latest.sent_at DESC"#,
        )
        .bind(&user)
        .bind(&user)
        .bind(&user)
        .bind(&user)
        .bind(filter)
        .bind(filter)
        .fetch_all(&self.reader)
        .await
        .map_err(backend)?;

        rows.iter()
            .map(|row| {
                let peer: String = row.try_get("peer_id").map_err(backend)?;
                let sent_at: String = row.try_get("sent_at").map_err(backend)?;
                let unread: i64 = row.try_get("unread_messages").map_err(backend)?;
                Ok(ChatPreview {
                    user_id: parse_uuid(&peer)?,
                    display_name: row.try_get("display_name").map_err(backend)?,
                    content: row.try_get("content").map_err(backend)?,
                    sent_at: Some(parse_datetime(&sent_at)?),
                    unread_messages: unread.max(0) as u64,
                })
            })
            .collect()
    }

    async fn count_unread(&self, sender: UserId, receiver: UserId) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar(
            r#"SELECT COUNT(*) FROM messages
               WHERE sender_id = ? AND receiver_id = ? AND read_at IS NULL"#,
        )
        .bind(sender.to_string())
        .bind(receiver.to_string())
        .fetch_one(&self.reader)
        .await
        .map_err(backend)?;

        Ok(count.max(0) as u64)
    }
}
