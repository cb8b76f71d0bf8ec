//! Runtime configuration loaded from environment variables.

use std::path::PathBuf;

pub const DEFAULT_PORT: u16 = 3000;

/// Server configuration.
///
/// - `FEATURE_TREE_DB`: SQLite file path (defaults to the platform data dir)
/// - `FEATURE_TREE_PORT`: HTTP port
/// - `FEATURE_TREE_CORS_ORIGINS`: comma-separated allowed origins; any origin when unset
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub db_path: Option<PathBuf>,
    pub port: u16,
    pub cors_origins: Option<Vec<String>>,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let db_path = std::env::var("FEATURE_TREE_DB").ok().map(PathBuf::from);

        let port = std::env::var("FEATURE_TREE_PORT")
            .ok()
            .and_then(|s| s.parse::<u16>().ok())
            .unwrap_or(DEFAULT_PORT);

        let cors_origins = std::env::var("FEATURE_TREE_CORS_ORIGINS")
            .ok()
            .map(|s| parse_origins(&s))
            .filter(|origins| !origins.is_empty());

        Self {
            db_path,
            port,
            cors_origins,
        }
    }

    /// Config with no overrides: default database, default port, permissive CORS.
    pub fn local() -> Self {
        Self {
            db_path: None,
            port: DEFAULT_PORT,
            cors_origins: None,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
