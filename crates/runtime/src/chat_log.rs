//! Append-only plain-text conversation log.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::warn;

/// One file per install, one header line per session. Failures are logged
/// and swallowed; the log is a convenience, not a contract.
pub struct ChatLog {
    path: PathBuf,
}

impl ChatLog {
    /// Open the log and stamp a session header.
    pub fn open(path: impl AsRef<Path>) -> Self {
        let log = Self { path: path.as_ref().to_path_buf() };
        log.append(&format!("=== session {} ===", Local::now().to_rfc3339()));
        log
    }

    pub fn user(&self, text: &str) {
        self.append(&format!("User: {text}"));
    }

    pub fn agent(&self, text: &str) {
        self.append(&format!("Agent: {text}"));
    }

    pub fn note(&self, text: &str) {
        self.append(&format!("--- {text}"));
    }

    fn append(&self, line: &str) {
        let write = (|| -> std::io::Result<()> {
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut file =
                std::fs::OpenOptions::new().create(true).append(true).open(&self.path)?;
            writeln!(file, "{line}")
        })();
        if let Err(e) = write {
            warn!(error = %e, "chat log write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sessions_append_with_headers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat.log");
        {
            let log = ChatLog::open(&path);
            log.user("こんにちは");
            log.agent("やあ");
        }
        {
            let log = ChatLog::open(&path);
            log.user("second session");
        }
        let body = std::fs::read_to_string(&path).unwrap();
        assert_eq!(body.matches("=== session ").count(), 2);
        assert!(body.contains("User: こんにちは"));
        assert!(body.contains("Agent: やあ"));
        let first = body.find("User: こんにちは").unwrap();
        let second = body.find("User: second session").unwrap();
        assert!(first < second, "log is append-only");
    }
}
