use futures::future::BoxFuture;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

use leadflow_core::error::{LeadflowError, Result};
use leadflow_core::traits::CrmStore;
use leadflow_core::types::{
    AiConversation, JsonMap, Lead, Unit, WhatsappConfiguration, WhatsappMessage,
};
use leadflow_core::workflow::Workflow;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS workflows (
        id TEXT PRIMARY KEY,
        body TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS leads (
        id TEXT PRIMARY KEY,
        body TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS units (
        id TEXT PRIMARY KEY,
        body TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS whatsapp_configurations (
        id TEXT PRIMARY KEY,
        unit_id TEXT NOT NULL,
        is_active INTEGER NOT NULL,
        body TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_wa_config_unit
        ON whatsapp_configurations(unit_id, is_active);

    CREATE TABLE IF NOT EXISTS whatsapp_messages (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        id TEXT NOT NULL UNIQUE,
        lead_id TEXT NOT NULL,
        direction TEXT NOT NULL,
        ts INTEGER NOT NULL,
        body TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_wa_messages_lead
        ON whatsapp_messages(lead_id, direction, ts);

    CREATE TABLE IF NOT EXISTS ai_conversations (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        id TEXT NOT NULL UNIQUE,
        lead_id TEXT NOT NULL,
        body TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_ai_conversations_lead
        ON ai_conversations(lead_id);";

fn db_err(e: impl std::fmt::Display) -> LeadflowError {
    LeadflowError::Database(e.to_string())
}

/// SQLite-backed CRM document store.
///
/// Every collection keeps the full JSON document in `body`; the few columns
/// next to it exist only for the lookups the workflow handlers make.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a SQLite database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        // Create parent directories
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                LeadflowError::Database(format!("Failed to create db directory: {}", e))
            })?;
        }

        let conn = Connection::open(path).map_err(db_err)?;

        // Enable WAL mode for better concurrent performance
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;

        debug!(path = %path.display(), "SQLite store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(db_err)
    }
}

/// Fetch and decode a single document by primary key.
fn get_doc<T: DeserializeOwned>(conn: &Connection, table: &str, id: &str) -> Result<Option<T>> {
    let body: Option<String> = conn
        .query_row(
            &format!("SELECT body FROM {} WHERE id = ?1", table),
            params![id],
            |row| row.get(0),
        )
        .optional()
        .map_err(db_err)?;

    match body {
        Some(body) => Ok(Some(serde_json::from_str(&body)?)),
        None => Ok(None),
    }
}

fn put_doc(conn: &Connection, table: &str, id: &str, body: &str) -> Result<()> {
    conn.execute(
        &format!("INSERT OR REPLACE INTO {} (id, body) VALUES (?1, ?2)", table),
        params![id, body],
    )
    .map_err(db_err)?;
    Ok(())
}

/// Decode every `body` column a query returns.
fn query_docs<T: DeserializeOwned>(
    conn: &Connection,
    sql: &str,
    args: impl rusqlite::Params,
) -> Result<Vec<T>> {
    let mut stmt = conn.prepare(sql).map_err(db_err)?;
    let rows = stmt
        .query_map(args, |row| row.get::<_, String>(0))
        .map_err(db_err)?;

    let mut docs = Vec::new();
    for row in rows {
        let body = row.map_err(db_err)?;
        docs.push(serde_json::from_str(&body)?);
    }
    Ok(docs)
}

impl CrmStore for SqliteStore {
    fn get_workflow(&self, id: &str) -> BoxFuture<'_, Result<Option<Workflow>>> {
        let id = id.to_string();
        Box::pin(async move {
            let conn = self.lock()?;
            get_doc(&conn, "workflows", &id)
        })
    }

    fn insert_workflow(&self, workflow: &Workflow) -> BoxFuture<'_, Result<()>> {
        let id = workflow.id.clone();
        let body = serde_json::to_string(workflow);
        Box::pin(async move {
            let body = body?;
            let conn = self.lock()?;
            put_doc(&conn, "workflows", &id, &body)?;
            debug!(workflow_id = %id, "Workflow stored");
            Ok(())
        })
    }

    fn list_workflows(&self) -> BoxFuture<'_, Result<Vec<Workflow>>> {
        Box::pin(async move {
            let conn = self.lock()?;
            query_docs(&conn, "SELECT body FROM workflows ORDER BY id", params![])
        })
    }

    fn get_lead(&self, id: &str) -> BoxFuture<'_, Result<Option<Lead>>> {
        let id = id.to_string();
        Box::pin(async move {
            let conn = self.lock()?;
            get_doc(&conn, "leads", &id)
        })
    }

    fn insert_lead(&self, lead: &Lead) -> BoxFuture<'_, Result<()>> {
        let id = lead.id.clone();
        let body = serde_json::to_string(lead);
        Box::pin(async move {
            let body = body?;
            let conn = self.lock()?;
            put_doc(&conn, "leads", &id, &body)
        })
    }

    fn update_lead(&self, id: &str, updates: &JsonMap) -> BoxFuture<'_, Result<bool>> {
        let id = id.to_string();
        let updates = updates.clone();
        Box::pin(async move {
            let conn = self.lock()?;
            let Some(mut doc) = get_doc::<serde_json::Value>(&conn, "leads", &id)? else {
                return Ok(false);
            };

            if let Some(obj) = doc.as_object_mut() {
                for (key, value) in updates {
                    // The document key is not a field
                    if key == "id" {
                        continue;
                    }
                    obj.insert(key, value);
                }
            }

            put_doc(&conn, "leads", &id, &doc.to_string())?;
            debug!(lead_id = %id, "Lead updated");
            Ok(true)
        })
    }

    fn get_unit(&self, id: &str) -> BoxFuture<'_, Result<Option<Unit>>> {
        let id = id.to_string();
        Box::pin(async move {
            let conn = self.lock()?;
            get_doc(&conn, "units", &id)
        })
    }

    fn insert_unit(&self, unit: &Unit) -> BoxFuture<'_, Result<()>> {
        let id = unit.id.clone();
        let body = serde_json::to_string(unit);
        Box::pin(async move {
            let body = body?;
            let conn = self.lock()?;
            put_doc(&conn, "units", &id, &body)
        })
    }

    fn active_whatsapp_config(
        &self,
        unit_id: &str,
    ) -> BoxFuture<'_, Result<Option<WhatsappConfiguration>>> {
        let unit_id = unit_id.to_string();
        Box::pin(async move {
            let conn = self.lock()?;
            let mut configs: Vec<WhatsappConfiguration> = query_docs(
                &conn,
                "SELECT body FROM whatsapp_configurations
                 WHERE unit_id = ?1 AND is_active = 1
                 ORDER BY rowid ASC
                 LIMIT 1",
                params![unit_id],
            )?;
            Ok(configs.pop())
        })
    }

    fn insert_whatsapp_config(&self, config: &WhatsappConfiguration) -> BoxFuture<'_, Result<()>> {
        let id = config.id.clone();
        let unit_id = config.unit_id.clone();
        let is_active = config.is_active;
        let body = serde_json::to_string(config);
        Box::pin(async move {
            let body = body?;
            let conn = self.lock()?;
            conn.execute(
                "INSERT OR REPLACE INTO whatsapp_configurations (id, unit_id, is_active, body)
                 VALUES (?1, ?2, ?3, ?4)",
                params![id, unit_id, is_active, body],
            )
            .map_err(db_err)?;
            Ok(())
        })
    }

    fn insert_whatsapp_message(&self, message: &WhatsappMessage) -> BoxFuture<'_, Result<()>> {
        let id = message.id.clone();
        let lead_id = message.lead_id.clone();
        let direction = message.direction.as_str();
        let ts = message.timestamp.timestamp_millis();
        let body = serde_json::to_string(message);
        Box::pin(async move {
            let body = body?;
            let conn = self.lock()?;
            conn.execute(
                "INSERT INTO whatsapp_messages (id, lead_id, direction, ts, body)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, lead_id, direction, ts, body],
            )
            .map_err(db_err)?;
            debug!(message_id = %id, lead_id = %lead_id, direction, "WhatsApp message stored");
            Ok(())
        })
    }

    fn latest_incoming_message(
        &self,
        lead_id: &str,
    ) -> BoxFuture<'_, Result<Option<WhatsappMessage>>> {
        let lead_id = lead_id.to_string();
        Box::pin(async move {
            let conn = self.lock()?;
            let mut latest: Vec<WhatsappMessage> = query_docs(
                &conn,
                "SELECT body FROM whatsapp_messages
                 WHERE lead_id = ?1 AND direction = 'incoming'
                 ORDER BY ts DESC, seq DESC
                 LIMIT 1",
                params![lead_id],
            )?;
            Ok(latest.pop())
        })
    }

    fn incoming_messages(&self, lead_id: &str) -> BoxFuture<'_, Result<Vec<WhatsappMessage>>> {
        let lead_id = lead_id.to_string();
        Box::pin(async move {
            let conn = self.lock()?;
            query_docs(
                &conn,
                "SELECT body FROM whatsapp_messages
                 WHERE lead_id = ?1 AND direction = 'incoming'
                 ORDER BY ts ASC, seq ASC",
                params![lead_id],
            )
        })
    }

    fn messages_for_lead(&self, lead_id: &str) -> BoxFuture<'_, Result<Vec<WhatsappMessage>>> {
        let lead_id = lead_id.to_string();
        Box::pin(async move {
            let conn = self.lock()?;
            query_docs(
                &conn,
                "SELECT body FROM whatsapp_messages
                 WHERE lead_id = ?1
                 ORDER BY ts ASC, seq ASC",
                params![lead_id],
            )
        })
    }

    fn insert_ai_conversation(&self, conversation: &AiConversation) -> BoxFuture<'_, Result<()>> {
        let id = conversation.id.clone();
        let lead_id = conversation.lead_id.clone();
        let body = serde_json::to_string(conversation);
        Box::pin(async move {
            let body = body?;
            let conn = self.lock()?;
            conn.execute(
                "INSERT INTO ai_conversations (id, lead_id, body)
                 VALUES (?1, ?2, ?3)",
                params![id, lead_id, body],
            )
            .map_err(db_err)?;
            debug!(conversation_id = %id, lead_id = %lead_id, "AI conversation stored");
            Ok(())
        })
    }

    fn conversations_for_lead(&self, lead_id: &str) -> BoxFuture<'_, Result<Vec<AiConversation>>> {
        let lead_id = lead_id.to_string();
        Box::pin(async move {
            let conn = self.lock()?;
            query_docs(
                &conn,
                "SELECT body FROM ai_conversations WHERE lead_id = ?1 ORDER BY seq ASC",
                params![lead_id],
            )
        })
    }
}
