//! Client registry backed by the shared SQLite database

use std::sync::Arc;

use chrono::Utc;
use rusqlite::{OptionalExtension, Row, params};
use tracing::{debug, info};

use crate::client::Client;
use crate::db::{Database, format_ts, ts_column};
use crate::{Error, Result};

const CLIENT_COLUMNS: &str = "client_id, display_label, platform, first_seen, last_seen";

/// Registry of known client machines
///
/// Clients are never deleted; liveness is left to callers, who can look at
/// [`Client::last_seen`].
pub struct ClientRegistry {
    db: Arc<Database>,
}

impl ClientRegistry {
    /// Create a registry over the shared database
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Create the client if unseen, otherwise refresh `last_seen`
    ///
    /// A provided label or platform replaces the stored one; `None` keeps
    /// whatever was recorded before.
    pub fn register_or_touch(
        &self,
        machine_id: &str,
        label: Option<&str>,
        platform: Option<&str>,
    ) -> Result<Client> {
        check_machine_id(machine_id)?;
        let label = non_blank(label);
        let platform = non_blank(platform);
        let now = format_ts(&Utc::now());

        let (client, is_new) = self.db.with_conn(|conn| {
            let tx = conn.transaction()?;
            let is_new = tx
                .query_row(
                    "SELECT 1 FROM clients WHERE client_id = ?1",
                    params![machine_id],
                    |_| Ok(()),
                )
                .optional()?
                .is_none();

            tx.execute(
                "INSERT INTO clients (client_id, display_label, platform, first_seen, last_seen)
                 VALUES (?1, ?2, ?3, ?4, ?4)
                 ON CONFLICT(client_id) DO UPDATE SET
                    last_seen = excluded.last_seen,
                    display_label = COALESCE(excluded.display_label, clients.display_label),
                    platform = COALESCE(excluded.platform, clients.platform)",
                params![machine_id, label, platform, now],
            )?;

            let client = tx.query_row(
                &format!("SELECT {CLIENT_COLUMNS} FROM clients WHERE client_id = ?1"),
                params![machine_id],
                client_from_row,
            )?;
            tx.commit()?;
            Ok((client, is_new))
        })?;

        if is_new {
            info!(
                "Registered new client {} ({})",
                client.machine_id,
                client.display_label.as_deref().unwrap_or("unlabeled")
            );
        } else {
            debug!("Touched client {}", client.machine_id);
        }
        Ok(client)
    }

    /// All clients, most recently seen first
    pub fn list(&self) -> Result<Vec<Client>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CLIENT_COLUMNS} FROM clients ORDER BY last_seen DESC, client_id ASC"
            ))?;
            let clients = stmt
                .query_map([], client_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(clients)
        })
    }

    /// Look up a single client
    pub fn get(&self, machine_id: &str) -> Result<Client> {
        self.db
            .with_conn(|conn| {
                Ok(conn
                    .query_row(
                        &format!("SELECT {CLIENT_COLUMNS} FROM clients WHERE client_id = ?1"),
                        params![machine_id],
                        client_from_row,
                    )
                    .optional()?)
            })?
            .ok_or_else(|| Error::NotFound(format!("client {}", machine_id)))
    }

    /// Whether the machine id has ever registered
    pub fn exists(&self, machine_id: &str) -> Result<bool> {
        self.db.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM clients WHERE client_id = ?1)",
                params![machine_id],
                |row| row.get(0),
            )?)
        })
    }

    /// Number of known clients
    pub fn count(&self) -> Result<usize> {
        let count: i64 = self.db.with_conn(|conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM clients", [], |row| row.get(0))?)
        })?;
        Ok(count as usize)
    }
}

/// Machine ids are opaque: non-empty, no leading or trailing whitespace
pub(crate) fn check_machine_id(machine_id: &str) -> Result<()> {
    if machine_id.trim().is_empty() {
        return Err(Error::Validation("client_id required".to_string()));
    }
    if machine_id.trim() != machine_id {
        return Err(Error::Validation(
            "client_id must not have leading or trailing whitespace".to_string(),
        ));
    }
    Ok(())
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

fn client_from_row(row: &Row<'_>) -> rusqlite::Result<Client> {
    Ok(Client {
        machine_id: row.get(0)?,
        display_label: row.get(1)?,
        platform: row.get(2)?,
        first_seen: ts_column(row, 3)?,
        last_seen: ts_column(row, 4)?,
    })
}
