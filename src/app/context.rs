use std::path::PathBuf;
use std::sync::Arc;

use crate::app::{Bot, CancelToken, Result};
use crate::config::Config;
use crate::store::SqliteStore;

/// Everything a command needs: the loaded configuration, the open store and
/// the process-wide cancellation token.
pub struct AppContext {
    pub config: Config,
    pub store: Arc<SqliteStore>,
    pub cancel: CancelToken,
}

impl AppContext {
    /// Open the store at `db_path`, or at the configured location.
    pub fn new(config: Config, db_path: Option<PathBuf>) -> Result<Self> {
        let db_path = match db_path {
            Some(p) => p,
            None => config.db_path()?,
        };
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let store = Arc::new(SqliteStore::new(&db_path, config.op_timeout()?)?);
        Ok(Self {
            config,
            store,
            cancel: CancelToken::new(),
        })
    }

    pub fn in_memory(config: Config) -> Result<Self> {
        Ok(Self {
            config,
            store: Arc::new(SqliteStore::in_memory()?),
            cancel: CancelToken::new(),
        })
    }

    /// Command handlers over this context's store, without a poller registry.
    pub fn bot(&self) -> Bot {
        Bot::new(self.store.clone(), self.cancel.clone())
    }
}
