use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use directories::ProjectDirs;
use rusqlite::Connection;

use crate::error::StoreError;
use crate::model::init_store;

/// Find the default location of the todo database, creating its directory
/// if it does not exist.
pub fn find_default_store_file() -> anyhow::Result<PathBuf> {
    let dirs = ProjectDirs::from("org", "todos", "todos")
        .context("Failed to find a data directory for the todo store.")?;
    let root_dir = dirs.data_dir();
    if !root_dir.exists() {
        std::fs::create_dir_all(root_dir).with_context(|| {
            format!("Failed to create directory {}.", root_dir.display())
        })?;
    }
    Ok(root_dir.join("todos.sqlite"))
}

/// Process-wide handle on the todo database. Cloning shares the connection.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open the database at `path`, creating the schema if needed.
    pub fn open(path: &Path) -> anyhow::Result<Store> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open todo store at {}.", path.display()))?;
        init_store(&conn).context("Failed to initialize the todo store.")?;
        Ok(Store::from_connection(conn))
    }

    pub fn open_in_memory() -> Result<Store, StoreError> {
        let conn = Connection::open_in_memory()?;
        init_store(&conn)?;
        Ok(Store::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Store {
        Store {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Run `f` against the connection on the blocking thread pool.
    pub async fn call<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|_| StoreError::Unavailable("connection lock poisoned".to_string()))?;
            f(&mut *conn)
        })
        .await?
    }
}
