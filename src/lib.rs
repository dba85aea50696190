//! distfiles library -- checksum-verified upload service.
//!
//! Accepts authenticated multipart uploads, verifies them against a
//! `sha512sum`-style checksum line while streaming them to disk, and
//! publishes them into a `{project}/{project}-{version}/` tree with a
//! `LATEST` pointer per project.

use std::sync::Arc;

pub mod auth;
pub mod checksum;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod metrics;
pub mod request;
pub mod server;
pub mod storage;

use crate::auth::TokenSet;
use crate::config::Config;
use crate::storage::LocalStore;

/// Shared application state passed to all handlers via `axum::extract::State`.
///
/// Built once at startup and never mutated.
pub struct AppState {
    /// Server configuration.
    pub config: Config,
    /// Accepted upload tokens.
    pub tokens: TokenSet,
    /// The distfiles tree.
    pub store: Arc<LocalStore>,
}

impl AppState {
    /// Open the store described by `config` and capture the umask.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let tokens = TokenSet::new(config.auth.tokens.iter().cloned());
        let store = Arc::new(LocalStore::new(&config.storage.basedir)?);
        Ok(Self {
            config,
            tokens,
            store,
        })
    }
}
