//! Message persistence using SQLite

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Row, params};
use tracing::debug;

use crate::client::{ClientRegistry, check_machine_id};
use crate::db::{Database, format_ts, opt_ts_column, ts_column};
use crate::message::{DeliveryRecord, Message, MessageId, Scope};
use crate::{Error, Result};

const MESSAGE_COLUMNS: &str = "m.id, m.url, m.text, m.scope, m.target_id, m.created_at";

/// Owner of messages and their delivery records
///
/// Delivery transitions are compare-and-set updates (`... WHERE field IS
/// NULL`); the returned flag tells the caller whether its call performed
/// the transition.
pub struct MessageStore {
    db: Arc<Database>,
    registry: Arc<ClientRegistry>,
    /// Most recent broadcasts eligible for late-join delivery (None = all)
    open_broadcasts: Option<usize>,
}

impl MessageStore {
    /// Create a store over the shared database
    pub fn new(db: Arc<Database>, registry: Arc<ClientRegistry>) -> Self {
        Self {
            db,
            registry,
            open_broadcasts: None,
        }
    }

    /// Limit late-join delivery to the `limit` most recent broadcasts
    pub fn with_open_broadcasts(mut self, limit: Option<usize>) -> Self {
        self.open_broadcasts = limit;
        self
    }

    /// Create a message
    ///
    /// Targeted messages get their single delivery record in the same
    /// transaction, so a failed call leaves no message row behind.
    pub fn create_message(
        &self,
        url: &str,
        text: &str,
        scope: Scope,
        target_id: Option<&str>,
    ) -> Result<Message> {
        let url = url.trim();
        if url.is_empty() {
            return Err(Error::Validation("url required".to_string()));
        }

        let target_id = match (scope, target_id) {
            (Scope::Broadcast, None) => None,
            (Scope::Broadcast, Some(_)) => {
                return Err(Error::Validation(
                    "broadcast messages take no target".to_string(),
                ));
            }
            (Scope::Targeted, None) => {
                return Err(Error::Validation(
                    "targeted messages require a client_id".to_string(),
                ));
            }
            (Scope::Targeted, Some(target)) => {
                check_machine_id(target)?;
                if !self.registry.exists(target)? {
                    return Err(Error::NotFound(format!("client {}", target)));
                }
                Some(target.to_string())
            }
        };

        let created_at = Utc::now();
        let id = self.db.with_conn(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO messages (url, text, scope, target_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![url, text, scope.as_str(), target_id, format_ts(&created_at)],
            )?;
            let id = tx.last_insert_rowid();
            if let Some(target) = &target_id {
                tx.execute(
                    "INSERT INTO deliveries (message_id, client_id) VALUES (?1, ?2)",
                    params![id, target],
                )?;
            }
            tx.commit()?;
            Ok(id)
        })?;

        debug!("Created {} message #{}", scope, id);
        // Round-trip through storage precision
        self.get_message(id)
    }

    /// Look up a message by id
    pub fn get_message(&self, message_id: MessageId) -> Result<Message> {
        self.db
            .with_conn(|conn| {
                Ok(conn
                    .query_row(
                        &format!("SELECT {MESSAGE_COLUMNS} FROM messages m WHERE m.id = ?1"),
                        params![message_id],
                        message_from_row,
                    )
                    .optional()?)
            })?
            .ok_or_else(|| Error::NotFound(format!("message {}", message_id)))
    }

    /// Most recent messages, newest first
    pub fn recent(&self, limit: usize) -> Result<Vec<Message>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages m ORDER BY m.id DESC LIMIT ?1"
            ))?;
            let messages = stmt
                .query_map(params![sql_limit(limit)], message_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(messages)
        })
    }

    /// Create an undelivered record for the pair unless one exists
    ///
    /// Returns `true` when this call created the record.
    pub fn record_delivery_if_absent(&self, message_id: MessageId, client_id: &str) -> Result<bool> {
        let inserted = self.db.with_conn(|conn| {
            Ok(conn.execute(
                "INSERT OR IGNORE INTO deliveries (message_id, client_id) VALUES (?1, ?2)",
                params![message_id, client_id],
            )?)
        })?;
        Ok(inserted == 1)
    }

    /// Set `delivered_at` if still unset
    ///
    /// Returns `true` when this call performed the transition.
    pub fn mark_delivered(
        &self,
        message_id: MessageId,
        client_id: &str,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let updated = self.db.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE deliveries SET delivered_at = ?3
                 WHERE message_id = ?1 AND client_id = ?2 AND delivered_at IS NULL",
                params![message_id, client_id, format_ts(&at)],
            )?)
        })?;
        Ok(updated == 1)
    }

    /// Set `read_at` (and `delivered_at` when missing) if still unread
    ///
    /// `read_at` never lands before `delivered_at`, even when `at` was taken
    /// before a concurrent delivery stamped the record. Returns `true` when
    /// this call performed the transition, `NotFound` if the pair has no
    /// record.
    pub fn mark_read(&self, message_id: MessageId, client_id: &str, at: DateTime<Utc>) -> Result<bool> {
        self.db.with_conn(|conn| {
            let tx = conn.transaction()?;
            let updated = tx.execute(
                "UPDATE deliveries SET
                    delivered_at = COALESCE(delivered_at, ?3),
                    read_at = CASE
                        WHEN delivered_at IS NOT NULL AND delivered_at > ?3 THEN delivered_at
                        ELSE ?3
                    END
                 WHERE message_id = ?1 AND client_id = ?2 AND read_at IS NULL",
                params![message_id, client_id, format_ts(&at)],
            )?;
            if updated == 0 {
                let exists: bool = tx.query_row(
                    "SELECT EXISTS(SELECT 1 FROM deliveries WHERE message_id = ?1 AND client_id = ?2)",
                    params![message_id, client_id],
                    |row| row.get(0),
                )?;
                if !exists {
                    return Err(Error::NotFound(format!(
                        "no delivery of message {} to client {}",
                        message_id, client_id
                    )));
                }
            }
            tx.commit()?;
            Ok(updated == 1)
        })
    }

    /// Messages still owed to the client, oldest first
    ///
    /// Open broadcasts the client has no record for yet get one here, inside
    /// the same critical section, so concurrent first polls cannot create
    /// duplicates.
    pub fn pending_for(&self, client_id: &str) -> Result<Vec<Message>> {
        // SQLite treats a negative LIMIT as unbounded
        let open_limit = self.open_broadcasts.map(sql_limit).unwrap_or(-1);

        self.db.with_conn(|conn| {
            let tx = conn.transaction()?;
            let materialized = tx.execute(
                "INSERT OR IGNORE INTO deliveries (message_id, client_id)
                 SELECT id, ?1 FROM (
                    SELECT id FROM messages WHERE scope = 'broadcast'
                    ORDER BY id DESC LIMIT ?2
                 )",
                params![client_id, open_limit],
            )?;
            if materialized > 0 {
                debug!(
                    "Materialized {} broadcast record(s) for client {}",
                    materialized, client_id
                );
            }

            let pending = {
                let mut stmt = tx.prepare(&format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages m
                     JOIN deliveries d ON d.message_id = m.id
                     WHERE d.client_id = ?1 AND d.delivered_at IS NULL
                     ORDER BY m.id ASC"
                ))?;
                stmt.query_map(params![client_id], message_from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?
            };
            tx.commit()?;
            Ok(pending)
        })
    }

    /// Delivery records of one message, for operator reporting
    pub fn receipts_for(&self, message_id: MessageId) -> Result<Vec<DeliveryRecord>> {
        // NotFound for unknown messages rather than an empty list
        self.get_message(message_id)?;

        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT message_id, client_id, delivered_at, read_at FROM deliveries
                 WHERE message_id = ?1 ORDER BY client_id ASC",
            )?;
            let records = stmt
                .query_map(params![message_id], record_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(records)
        })
    }

    /// Delivery record for one pair, if any
    pub fn record(&self, message_id: MessageId, client_id: &str) -> Result<Option<DeliveryRecord>> {
        self.db.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT message_id, client_id, delivered_at, read_at FROM deliveries
                     WHERE message_id = ?1 AND client_id = ?2",
                    params![message_id, client_id],
                    record_from_row,
                )
                .optional()?)
        })
    }

    /// Unread record count per client
    pub fn unread_counts(&self) -> Result<HashMap<String, usize>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT client_id, COUNT(*) FROM deliveries
                 WHERE read_at IS NULL GROUP BY client_id",
            )?;
            let mut counts = HashMap::new();
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            for row in rows {
                let (client_id, count) = row?;
                counts.insert(client_id, count as usize);
            }
            Ok(counts)
        })
    }

    /// Unread record count for one client
    pub fn unread_count(&self, client_id: &str) -> Result<usize> {
        let count: i64 = self.db.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM deliveries WHERE client_id = ?1 AND read_at IS NULL",
                params![client_id],
                |row| row.get(0),
            )?)
        })?;
        Ok(count as usize)
    }

    /// Total number of messages
    pub fn message_count(&self) -> Result<usize> {
        let count: i64 = self.db.with_conn(|conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?)
        })?;
        Ok(count as usize)
    }
}

/// `usize` limit as an SQLite LIMIT value, saturating at `i64::MAX`
fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    let scope: String = row.get(3)?;
    let scope = scope.parse::<Scope>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(Message {
        id: row.get(0)?,
        url: row.get(1)?,
        text: row.get(2)?,
        scope,
        target_id: row.get(4)?,
        created_at: ts_column(row, 5)?,
    })
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<DeliveryRecord> {
    Ok(DeliveryRecord {
        message_id: row.get(0)?,
        client_id: row.get(1)?,
        delivered_at: opt_ts_column(row, 2)?,
        read_at: opt_ts_column(row, 3)?,
    })
}
