use anyhow::{anyhow, Context, Result};
use directories::ProjectDirs;
use std::env;
use std::path::PathBuf;

pub const DB_ENV: &str = "ROUTINELY_DB";
pub const USER_ENV: &str = "ROUTINELY_USER";
pub const LOG_ENV: &str = "ROUTINELY_LOG";

/// Settings resolved from the command line, then the environment, then
/// platform defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub db_path: PathBuf,
    pub username: String,
    pub log_filter: String,
}

impl Config {
    pub fn resolve(db_file: Option<PathBuf>, user: Option<String>, verbose: bool) -> Result<Config> {
        let db_path = match db_file.or_else(|| env::var_os(DB_ENV).map(PathBuf::from)) {
            Some(path) => path,
            None => find_default_db_file()?,
        };
        Ok(Config {
            db_path,
            username: resolve_user(user),
            log_filter: resolve_log_filter(verbose),
        })
    }
}

fn find_default_db_file() -> Result<PathBuf> {
    let dirs = ProjectDirs::from("org", "routinely", "routinely")
        .ok_or_else(|| anyhow!("Failed to find a data directory for the database."))?;
    let root_dir = dirs.data_dir();
    if !root_dir.exists() {
        std::fs::create_dir_all(root_dir)
            .with_context(|| format!("Failed to create directory {}.", root_dir.display()))?;
    }
    Ok(root_dir.join("db.sqlite"))
}

fn resolve_user(user: Option<String>) -> String {
    let candidates = [
        user,
        env::var(USER_ENV).ok(),
        env::var("USER").ok(),
        env::var("USERNAME").ok(),
    ];
    candidates
        .into_iter()
        .flatten()
        .find(|u| !u.trim().is_empty())
        .unwrap_or_else(|| "default".to_string())
}

fn resolve_log_filter(verbose: bool) -> String {
    if verbose {
        return "debug".to_string();
    }
    env::var(LOG_ENV)
        .or_else(|_| env::var("RUST_LOG"))
        .unwrap_or_else(|_| "warn".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_win_over_environment() {
        let config = Config::resolve(Some(PathBuf::from("/tmp/x.sqlite")), Some("alice".into()), true).unwrap();
        assert_eq!(config.db_path, PathBuf::from("/tmp/x.sqlite"));
        assert_eq!(config.username, "alice");
        assert_eq!(config.log_filter, "debug");
    }

    #[test]
    fn blank_user_flag_is_ignored() {
        assert!(!resolve_user(Some("  ".into())).trim().is_empty());
    }
}
