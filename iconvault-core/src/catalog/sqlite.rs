//! SQLite catalog adapter
//!
//! Persistent implementation of the catalog contract. Schema follows the
//! relational shape of the icon domain: an `icon` row per icon, an
//! `icon_file` row per rendition with the content blob and a per-icon
//! descriptor uniqueness constraint, and a tag table linked many-to-many.
//!
//! Every contract operation runs inside its own transaction. The connection
//! is synchronous, so calls are moved off the async executor with
//! `spawn_blocking`.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use tracing::debug;

use crate::domain::{IconAttributes, IconDescriptor, Iconfile, IconfileDescriptor};

use super::{CatalogError, CatalogStore};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS icon (
    id          INTEGER PRIMARY KEY,
    name        TEXT NOT NULL UNIQUE,
    modified_by TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS icon_file (
    id          INTEGER PRIMARY KEY,
    icon_id     INTEGER NOT NULL REFERENCES icon(id) ON DELETE CASCADE,
    file_format TEXT NOT NULL,
    icon_size   TEXT NOT NULL,
    content     BLOB NOT NULL,
    UNIQUE(icon_id, file_format, icon_size)
);
CREATE TABLE IF NOT EXISTS tag (
    id   INTEGER PRIMARY KEY,
    text TEXT NOT NULL UNIQUE
);
CREATE TABLE IF NOT EXISTS icon_to_tags (
    icon_id INTEGER NOT NULL REFERENCES icon(id) ON DELETE CASCADE,
    tag_id  INTEGER NOT NULL REFERENCES tag(id) ON DELETE CASCADE,
    UNIQUE(icon_id, tag_id)
);
";

/// SQLite-backed catalog.
pub struct SqliteCatalog {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCatalog {
    /// Open (creating if needed) a catalog database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let conn = Connection::open(path.as_ref()).map_err(backend)?;
        Self::bootstrap(conn)
    }

    /// Open a private in-memory catalog.
    pub fn open_in_memory() -> Result<Self, CatalogError> {
        let conn = Connection::open_in_memory().map_err(backend)?;
        Self::bootstrap(conn)
    }

    fn bootstrap(conn: Connection) -> Result<Self, CatalogError> {
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(backend)?;
        conn.execute_batch(SCHEMA).map_err(backend)?;
        debug!("catalog schema ready");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, CatalogError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, CatalogError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| CatalogError::Backend("catalog connection poisoned".into()))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| CatalogError::Backend(format!("catalog task failed: {e}")))?
    }
}

fn backend(err: rusqlite::Error) -> CatalogError {
    CatalogError::Backend(err.to_string())
}

fn icon_id(conn: &Connection, icon_name: &str) -> Result<Option<i64>, CatalogError> {
    conn.query_row(
        "SELECT id FROM icon WHERE name = ?1",
        params![icon_name],
        |row| row.get(0),
    )
    .optional()
    .map_err(backend)
}

fn require_icon_id(conn: &Connection, icon_name: &str) -> Result<i64, CatalogError> {
    icon_id(conn, icon_name)?.ok_or_else(|| CatalogError::IconNotFound(icon_name.to_string()))
}

fn insert_iconfile(
    conn: &Connection,
    id: i64,
    icon_name: &str,
    iconfile: &Iconfile,
) -> Result<(), CatalogError> {
    let exists: Option<i64> = conn
        .query_row(
            "SELECT id FROM icon_file WHERE icon_id = ?1 AND file_format = ?2 AND icon_size = ?3",
            params![id, iconfile.descriptor.format, iconfile.descriptor.size],
            |row| row.get(0),
        )
        .optional()
        .map_err(backend)?;
    if exists.is_some() {
        return Err(CatalogError::IconfileAlreadyExists {
            icon_name: icon_name.to_string(),
            descriptor: iconfile.descriptor.clone(),
        });
    }
    conn.execute(
        "INSERT INTO icon_file (icon_id, file_format, icon_size, content) VALUES (?1, ?2, ?3, ?4)",
        params![
            id,
            iconfile.descriptor.format,
            iconfile.descriptor.size,
            iconfile.content
        ],
    )
    .map_err(backend)?;
    Ok(())
}

fn icon_tags(conn: &Connection, id: i64) -> Result<Vec<String>, CatalogError> {
    let mut stmt = conn
        .prepare(
            "SELECT tag.text FROM tag
             JOIN icon_to_tags ON icon_to_tags.tag_id = tag.id
             WHERE icon_to_tags.icon_id = ?1 ORDER BY tag.text",
        )
        .map_err(backend)?;
    let tags = stmt
        .query_map(params![id], |row| row.get::<_, String>(0))
        .map_err(backend)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(backend)?;
    Ok(tags)
}

fn describe_row(conn: &Connection, id: i64, name: &str) -> Result<IconDescriptor, CatalogError> {
    let modified_by: String = conn
        .query_row(
            "SELECT modified_by FROM icon WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )
        .map_err(backend)?;

    let mut stmt = conn
        .prepare(
            "SELECT file_format, icon_size FROM icon_file
             WHERE icon_id = ?1 ORDER BY file_format, icon_size",
        )
        .map_err(backend)?;
    let iconfiles = stmt
        .query_map(params![id], |row| {
            Ok(IconfileDescriptor::new(
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
            ))
        })
        .map_err(backend)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(backend)?;

    Ok(IconDescriptor {
        attributes: IconAttributes {
            name: name.to_string(),
            modified_by,
            tags: icon_tags(conn, id)?.into_iter().collect(),
        },
        iconfiles,
    })
}

#[async_trait]
impl CatalogStore for SqliteCatalog {
    async fn create_icon(
        &self,
        icon_name: &str,
        modified_by: &str,
        initial_iconfile: &Iconfile,
    ) -> Result<(), CatalogError> {
        let icon_name = icon_name.to_string();
        let modified_by = modified_by.to_string();
        let iconfile = initial_iconfile.clone();
        self.with_conn(move |conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(backend)?;
            if icon_id(&tx, &icon_name)?.is_some() {
                return Err(CatalogError::IconAlreadyExists(icon_name));
            }
            tx.execute(
                "INSERT INTO icon (name, modified_by) VALUES (?1, ?2)",
                params![icon_name, modified_by],
            )
            .map_err(backend)?;
            let id = tx.last_insert_rowid();
            insert_iconfile(&tx, id, &icon_name, &iconfile)?;
            tx.commit().map_err(backend)
        })
        .await
    }

    async fn add_iconfile(
        &self,
        icon_name: &str,
        modified_by: &str,
        iconfile: &Iconfile,
    ) -> Result<(), CatalogError> {
        let icon_name = icon_name.to_string();
        let modified_by = modified_by.to_string();
        let iconfile = iconfile.clone();
        self.with_conn(move |conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(backend)?;
            let id = require_icon_id(&tx, &icon_name)?;
            insert_iconfile(&tx, id, &icon_name, &iconfile)?;
            tx.execute(
                "UPDATE icon SET modified_by = ?1 WHERE id = ?2",
                params![modified_by, id],
            )
            .map_err(backend)?;
            tx.commit().map_err(backend)
        })
        .await
    }

    async fn get_iconfile_content(
        &self,
        icon_name: &str,
        descriptor: &IconfileDescriptor,
    ) -> Result<Vec<u8>, CatalogError> {
        let icon_name = icon_name.to_string();
        let descriptor = descriptor.clone();
        self.with_conn(move |conn| {
            let id = require_icon_id(conn, &icon_name)?;
            conn.query_row(
                "SELECT content FROM icon_file
                 WHERE icon_id = ?1 AND file_format = ?2 AND icon_size = ?3",
                params![id, descriptor.format, descriptor.size],
                |row| row.get(0),
            )
            .optional()
            .map_err(backend)?
            .ok_or(CatalogError::IconfileNotFound {
                icon_name,
                descriptor,
            })
        })
        .await
    }

    async fn delete_iconfile(
        &self,
        icon_name: &str,
        descriptor: &IconfileDescriptor,
    ) -> Result<(), CatalogError> {
        let icon_name = icon_name.to_string();
        let descriptor = descriptor.clone();
        self.with_conn(move |conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(backend)?;
            let id = require_icon_id(&tx, &icon_name)?;
            let deleted = tx
                .execute(
                    "DELETE FROM icon_file
                     WHERE icon_id = ?1 AND file_format = ?2 AND icon_size = ?3",
                    params![id, descriptor.format, descriptor.size],
                )
                .map_err(backend)?;
            if deleted == 0 {
                return Err(CatalogError::IconfileNotFound {
                    icon_name,
                    descriptor,
                });
            }
            tx.commit().map_err(backend)
        })
        .await
    }

    async fn delete_icon(&self, icon_name: &str) -> Result<(), CatalogError> {
        let icon_name = icon_name.to_string();
        self.with_conn(move |conn| {
            let deleted = conn
                .execute("DELETE FROM icon WHERE name = ?1", params![icon_name])
                .map_err(backend)?;
            if deleted == 0 {
                return Err(CatalogError::IconNotFound(icon_name));
            }
            Ok(())
        })
        .await
    }

    async fn add_tag(&self, icon_name: &str, tag: &str) -> Result<(), CatalogError> {
        let icon_name = icon_name.to_string();
        let tag = tag.to_string();
        self.with_conn(move |conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(backend)?;
            let id = require_icon_id(&tx, &icon_name)?;
            tx.execute("INSERT OR IGNORE INTO tag (text) VALUES (?1)", params![tag])
                .map_err(backend)?;
            let tag_id: i64 = tx
                .query_row("SELECT id FROM tag WHERE text = ?1", params![tag], |row| {
                    row.get(0)
                })
                .map_err(backend)?;
            tx.execute(
                "INSERT OR IGNORE INTO icon_to_tags (icon_id, tag_id) VALUES (?1, ?2)",
                params![id, tag_id],
            )
            .map_err(backend)?;
            tx.commit().map_err(backend)
        })
        .await
    }

    async fn remove_tag(&self, icon_name: &str, tag: &str) -> Result<(), CatalogError> {
        let icon_name = icon_name.to_string();
        let tag = tag.to_string();
        self.with_conn(move |conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(backend)?;
            let id = require_icon_id(&tx, &icon_name)?;
            let removed = tx
                .execute(
                    "DELETE FROM icon_to_tags
                     WHERE icon_id = ?1 AND tag_id IN (SELECT id FROM tag WHERE text = ?2)",
                    params![id, tag],
                )
                .map_err(backend)?;
            if removed == 0 {
                return Err(CatalogError::ConstraintViolation(format!(
                    "tag \"{tag}\" is not attached to \"{icon_name}\""
                )));
            }
            tx.commit().map_err(backend)
        })
        .await
    }

    async fn describe_all_icons(&self) -> Result<Vec<IconDescriptor>, CatalogError> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT id, name FROM icon ORDER BY name")
                .map_err(backend)?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
                })
                .map_err(backend)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(backend)?;
            drop(stmt);

            rows.into_iter()
                .map(|(id, name)| describe_row(conn, id, &name))
                .collect()
        })
        .await
    }

    async fn describe_icon(&self, icon_name: &str) -> Result<IconDescriptor, CatalogError> {
        let icon_name = icon_name.to_string();
        self.with_conn(move |conn| {
            let id = require_icon_id(conn, &icon_name)?;
            describe_row(conn, id, &icon_name)
        })
        .await
    }

    async fn list_tags(&self) -> Result<Vec<String>, CatalogError> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT DISTINCT tag.text FROM tag
                     JOIN icon_to_tags ON icon_to_tags.tag_id = tag.id
                     ORDER BY tag.text",
                )
                .map_err(backend)?;
            let tags = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .map_err(backend)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(backend)?;
            Ok(tags)
        })
        .await
    }
}
