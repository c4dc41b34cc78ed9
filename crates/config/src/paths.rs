//! Per-process filesystem layout.
//!
//! Every piece of durable state — memory database, desire levels, chat log,
//! capture directory, MCP config — is reachable from one [`Paths`] value
//! created at startup and passed down explicitly. Components never consult
//! the environment for paths themselves.

use std::env;
use std::path::PathBuf;

/// Resolved locations of all durable state.
#[derive(Debug, Clone)]
pub struct Paths {
    /// `~/.familiar_ai` — agent home (DB, desires, captures, ME.md).
    pub data_dir: PathBuf,
    /// `~/.cache/familiar-ai` — logs.
    pub cache_dir: PathBuf,
    /// SQLite observation memory.
    pub memory_db: PathBuf,
    /// Desire levels, rewritten on every mutation.
    pub desires_file: PathBuf,
    /// Append-only plain-text conversation log.
    pub chat_log: PathBuf,
    /// `capture_YYYYMMDD_HHMMSS.jpg` files land here.
    pub capture_dir: PathBuf,
    /// MCP server config (`MCP_CONFIG` or `~/.familiar-ai.json`).
    pub mcp_config: PathBuf,
}

impl Paths {
    pub fn resolve() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        let data_dir = home.join(".familiar_ai");
        let cache_dir = home.join(".cache").join("familiar-ai");
        let mcp_config = match env::var("MCP_CONFIG") {
            Ok(p) if !p.is_empty() => PathBuf::from(p),
            _ => home.join(".familiar-ai.json"),
        };
        Self {
            memory_db: data_dir.join("observations.db"),
            desires_file: data_dir.join("desires.json"),
            chat_log: cache_dir.join("chat.log"),
            capture_dir: data_dir.join("captures"),
            data_dir,
            cache_dir,
            mcp_config,
        }
    }

    /// ME.md personality file candidates, preferred order: cwd, then home.
    pub fn personality_candidates(&self) -> Vec<PathBuf> {
        vec![PathBuf::from("ME.md"), self.data_dir.join("ME.md")]
    }

    /// Variant rooted somewhere else entirely, for tests.
    pub fn rooted_at(root: &std::path::Path) -> Self {
        let data_dir = root.join(".familiar_ai");
        let cache_dir = root.join("cache");
        Self {
            memory_db: data_dir.join("observations.db"),
            desires_file: data_dir.join("desires.json"),
            chat_log: cache_dir.join("chat.log"),
            capture_dir: data_dir.join("captures"),
            data_dir,
            cache_dir,
            mcp_config: root.join("familiar-ai.json"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rooted_paths_stay_under_root() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = Paths::rooted_at(tmp.path());
        assert!(paths.memory_db.starts_with(tmp.path()));
        assert!(paths.desires_file.starts_with(tmp.path()));
        assert!(paths.capture_dir.starts_with(tmp.path()));
    }

    #[test]
    fn personality_candidates_check_cwd_first() {
        let paths = Paths::resolve();
        let candidates = paths.personality_candidates();
        assert_eq!(candidates[0], PathBuf::from("ME.md"));
        assert_eq!(candidates.len(), 2);
    }
}
