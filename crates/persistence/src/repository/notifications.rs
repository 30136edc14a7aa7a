//! Notification outbox — events produced here, delivered by an external service

use crate::DbResult;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

/// One emitted event: recipient, kind, templated message key, structured metadata
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct NotificationRecord {
    pub id: Option<i64>,
    pub recipient_id: i64,
    pub sender_id: Option<i64>,
    pub kind: String,
    pub message_key: String,
    pub metadata_json: Option<String>,
    pub link: Option<String>,
    pub created_at: Option<i64>,
}

pub struct NotificationRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> NotificationRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn append(&self, record: &NotificationRecord) -> DbResult<i64> {
        let result = sqlx::query(
            r#"INSERT INTO notifications
                (recipient_id, sender_id, kind, message_key, metadata_json, link)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
        )
        .bind(record.recipient_id)
        .bind(record.sender_id)
        .bind(&record.kind)
        .bind(&record.message_key)
        .bind(&record.metadata_json)
        .bind(&record.link)
        .execute(self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn append_many(&self, records: &[NotificationRecord]) -> DbResult<usize> {
        let mut inserted = 0usize;
        for record in records {
            self.append(record).await?;
            inserted += 1;
        }
        Ok(inserted)
    }

    pub async fn for_recipient(
        &self,
        recipient_id: i64,
        limit: i64,
    ) -> DbResult<Vec<NotificationRecord>> {
        let records = sqlx::query_as::<_, NotificationRecord>(
            r#"SELECT * FROM notifications
               WHERE recipient_id = ?1
               ORDER BY id DESC
               LIMIT ?2"#,
        )
        .bind(recipient_id)
        .bind(limit)
        .fetch_all(self.pool)
        .await?;
        Ok(records)
    }
}
