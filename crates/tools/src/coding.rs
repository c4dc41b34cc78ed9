//! Coding tools — read/edit/glob/grep, and opt-in bash.
//!
//! Relative paths resolve against `CODING_WORKDIR` when set, the process
//! cwd otherwise. `bash` exists only when `CODING_BASH=true`; when disabled
//! its definition is simply not advertised to the model.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use globset::Glob;
use regex::Regex;
use serde_json::{json, Value};
use walkdir::WalkDir;

use familiar_config::CodingConfig;
use familiar_llm::{ToolDef, ToolOutput};

use crate::Tool;

const GREP_CONTENT_LINE_CAP: usize = 500;
const DEFAULT_BASH_TIMEOUT_SECS: u64 = 30;

pub struct CodingTool {
    config: CodingConfig,
}

impl CodingTool {
    pub fn new(config: CodingConfig) -> Self {
        Self { config }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.config.workdir_path().join(p)
        }
    }

    fn read_file(&self, input: &Value) -> String {
        let Some(path) = input.get("path").and_then(Value::as_str) else {
            return "read_file requires 'path'.".into();
        };
        let resolved = self.resolve(path);
        let text = match std::fs::read_to_string(&resolved) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return format!("File not found: {path}");
            }
            Err(e) => return format!("Could not read {path}: {e}"),
        };

        let offset = input.get("offset").and_then(Value::as_u64).unwrap_or(1).max(1) as usize;
        let limit = input.get("limit").and_then(Value::as_u64).unwrap_or(0) as usize;

        let lines: Vec<&str> = text.lines().collect();
        let total = lines.len();
        let start = offset - 1;
        let end = if limit > 0 { (start + limit).min(total) } else { total };
        if start >= total {
            return format!("(empty or offset beyond end of file — total lines: {total})");
        }

        let mut out = String::new();
        for (i, line) in lines[start..end].iter().enumerate() {
            out.push_str(&format!("{:6}\t{line}\n", start + i + 1));
        }
        if end < total {
            out.push_str(&format!(
                "\n(showing lines {}–{} of {}; use offset/limit for more)",
                start + 1,
                end,
                total
            ));
        }
        out
    }

    fn edit_file(&self, input: &Value) -> String {
        let (Some(path), Some(old_string), Some(new_string)) = (
            input.get("path").and_then(Value::as_str),
            input.get("old_string").and_then(Value::as_str),
            input.get("new_string").and_then(Value::as_str),
        ) else {
            return "edit_file requires 'path', 'old_string' and 'new_string'.".into();
        };

        let resolved = self.resolve(path);
        let original = match std::fs::read_to_string(&resolved) {
            Ok(text) => text,
            Err(_) => return format!("File not found: {path}"),
        };

        let count = original.matches(old_string).count();
        if count == 0 {
            return "edit_file failed: old_string not found in file.\n\
                    Tip: call read_file first and copy the exact text."
                .into();
        }
        if count > 1 {
            return format!(
                "edit_file failed: old_string matches {count} locations. \
                 Provide a longer, more unique string."
            );
        }

        let updated = original.replacen(old_string, new_string, 1);
        match std::fs::write(&resolved, updated) {
            Ok(()) => format!("Edited {path}: replaced 1 occurrence."),
            Err(e) => format!("Could not write {path}: {e}"),
        }
    }

    fn glob(&self, input: &Value) -> String {
        let Some(pattern) = input.get("pattern").and_then(Value::as_str) else {
            return "glob requires 'pattern'.".into();
        };
        let root = match input.get("path").and_then(Value::as_str) {
            Some(p) if !p.is_empty() => self.resolve(p),
            _ => self.config.workdir_path(),
        };
        let matcher = match Glob::new(pattern) {
            Ok(g) => g.compile_matcher(),
            Err(e) => return format!("Glob error: {e}"),
        };

        let mut matches: Vec<String> = WalkDir::new(&root)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| {
                let rel = entry.path().strip_prefix(&root).ok()?;
                matcher.is_match(rel).then(|| entry.path().display().to_string())
            })
            .collect();
        matches.sort();

        if matches.is_empty() {
            format!("No files matched: {pattern}")
        } else {
            matches.join("\n")
        }
    }

    fn grep(&self, input: &Value) -> String {
        let Some(pattern) = input.get("pattern").and_then(Value::as_str) else {
            return "grep requires 'pattern'.".into();
        };
        let regex = match Regex::new(pattern) {
            Ok(r) => r,
            Err(e) => return format!("Invalid regex: {e}"),
        };
        let root = match input.get("path").and_then(Value::as_str) {
            Some(p) if !p.is_empty() => self.resolve(p),
            _ => self.config.workdir_path(),
        };
        let name_filter = input
            .get("glob")
            .and_then(Value::as_str)
            .and_then(|g| Glob::new(g).ok())
            .map(|g| g.compile_matcher());
        let content_mode =
            input.get("output_mode").and_then(Value::as_str) == Some("content");

        let files: Vec<PathBuf> = if root.is_file() {
            vec![root.clone()]
        } else {
            let mut files: Vec<PathBuf> = WalkDir::new(&root)
                .into_iter()
                .filter_map(Result::ok)
                .filter(|e| e.file_type().is_file())
                .map(|e| e.into_path())
                .filter(|p| match (&name_filter, p.file_name()) {
                    (Some(matcher), Some(name)) => matcher.is_match(name),
                    (Some(_), None) => false,
                    (None, _) => true,
                })
                .collect();
            files.sort();
            files
        };

        let mut matched_files = Vec::new();
        let mut content_lines = Vec::new();
        for file in files {
            let Ok(text) = std::fs::read_to_string(&file) else { continue };
            if content_mode {
                for (lineno, line) in text.lines().enumerate() {
                    if regex.is_match(line) {
                        content_lines.push(format!("{}:{}: {line}", file.display(), lineno + 1));
                        if content_lines.len() >= GREP_CONTENT_LINE_CAP {
                            break;
                        }
                    }
                }
            } else if regex.is_match(&text) {
                matched_files.push(file.display().to_string());
            }
        }

        if content_mode {
            if content_lines.is_empty() {
                "No matches found.".into()
            } else {
                content_lines.join("\n")
            }
        } else if matched_files.is_empty() {
            "No matching files found.".into()
        } else {
            matched_files.join("\n")
        }
    }

    async fn bash(&self, input: &Value) -> String {
        let Some(command) = input.get("command").and_then(Value::as_str) else {
            return "bash requires 'command'.".into();
        };
        let timeout_secs = input
            .get("timeout")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_BASH_TIMEOUT_SECS);

        let mut child = match tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(self.config.workdir_path())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => return format!("Bash error: {e}"),
        };

        let waited =
            tokio::time::timeout(Duration::from_secs(timeout_secs), child.wait_with_output())
                .await;
        match waited {
            Ok(Ok(output)) => {
                let mut text = String::from_utf8_lossy(&output.stdout).to_string();
                text.push_str(&String::from_utf8_lossy(&output.stderr));
                let code = output.status.code().unwrap_or(-1);
                if code != 0 {
                    format!("Exit {code}:\n{text}")
                } else if text.is_empty() {
                    "(no output)".into()
                } else {
                    text
                }
            }
            Ok(Err(e)) => format!("Bash error: {e}"),
            Err(_) => format!("Command timed out after {timeout_secs}s: {command}"),
        }
    }
}

#[async_trait]
impl Tool for CodingTool {
    fn defs(&self) -> Vec<ToolDef> {
        let mut defs = vec![
            ToolDef {
                name: "read_file".into(),
                description: "Read a file and return its contents with line numbers (cat -n \
                              format). Use offset and limit to read large files in chunks."
                    .into(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "path": {"type": "string", "description": "File path (absolute or relative to working directory)"},
                        "offset": {"type": "integer", "description": "1-based line number to start reading from (default: 1)"},
                        "limit": {"type": "integer", "description": "Maximum number of lines to read (default: all)"},
                    },
                    "required": ["path"],
                }),
            },
            ToolDef {
                name: "edit_file".into(),
                description: "Edit a file by replacing old_string with new_string. old_string \
                              must appear exactly once in the file. ALWAYS call read_file before \
                              edit_file to confirm the exact text."
                    .into(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "path": {"type": "string", "description": "File path to edit"},
                        "old_string": {"type": "string", "description": "Exact text to find and replace (must be unique in file)"},
                        "new_string": {"type": "string", "description": "Replacement text"},
                    },
                    "required": ["path", "old_string", "new_string"],
                }),
            },
            ToolDef {
                name: "glob".into(),
                description: "Find files matching a glob pattern (e.g. '**/*.rs'). Returns a \
                              newline-separated list of matching file paths."
                    .into(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "pattern": {"type": "string", "description": "Glob pattern (e.g. '**/*.rs', 'src/**/*.toml')"},
                        "path": {"type": "string", "description": "Root directory to search in (default: working directory)"},
                    },
                    "required": ["pattern"],
                }),
            },
            ToolDef {
                name: "grep".into(),
                description: "Search file contents using a regular expression pattern. Returns \
                              matching file paths (files_with_matches mode) or matching lines \
                              (content mode)."
                    .into(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "pattern": {"type": "string", "description": "Regular expression pattern to search for"},
                        "path": {"type": "string", "description": "File or directory to search (default: working directory)"},
                        "glob": {"type": "string", "description": "Filter files by glob pattern (e.g. '*.rs')"},
                        "output_mode": {
                            "type": "string",
                            "enum": ["files_with_matches", "content"],
                            "description": "Output mode: 'files_with_matches' (default) or 'content'",
                        },
                    },
                    "required": ["pattern"],
                }),
            },
        ];

        if self.config.bash_enabled {
            defs.push(ToolDef {
                name: "bash".into(),
                description: "Run a shell command and return its stdout+stderr. Working \
                              directory is the configured coding workdir. Default timeout: 30 \
                              seconds."
                    .into(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "command": {"type": "string", "description": "Shell command to execute"},
                        "timeout": {"type": "integer", "description": "Timeout in seconds (default: 30)"},
                    },
                    "required": ["command"],
                }),
            });
        }
        defs
    }

    fn handles(&self, name: &str) -> bool {
        matches!(name, "read_file" | "edit_file" | "glob" | "grep")
            || (name == "bash" && self.config.bash_enabled)
    }

    async fn call(&self, name: &str, input: &Value) -> anyhow::Result<ToolOutput> {
        let text = match name {
            "read_file" => self.read_file(input),
            "edit_file" => self.edit_file(input),
            "glob" => self.glob(input),
            "grep" => self.grep(input),
            "bash" => self.bash(input).await,
            other => format!("Unknown coding tool: {other}"),
        };
        Ok(ToolOutput::text(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool_in(dir: &Path) -> CodingTool {
        CodingTool::new(CodingConfig {
            workdir: dir.display().to_string(),
            bash_enabled: false,
        })
    }

    #[test]
    fn read_file_numbers_lines() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "alpha\nbeta\ngamma\n").unwrap();
        let out = tool_in(dir.path()).read_file(&json!({"path": "a.txt"}));
        assert!(out.contains("     1\talpha"));
        assert!(out.contains("     3\tgamma"));
    }

    #[test]
    fn read_file_offset_and_limit() {
        let dir = tempfile::tempdir().unwrap();
        let body: String = (1..=10).map(|i| format!("line{i}\n")).collect();
        std::fs::write(dir.path().join("a.txt"), body).unwrap();
        let out = tool_in(dir.path()).read_file(&json!({"path": "a.txt", "offset": 4, "limit": 2}));
        assert!(out.contains("     4\tline4"));
        assert!(out.contains("     5\tline5"));
        assert!(!out.contains("line6\n"));
        assert!(out.contains("showing lines 4–5 of 10"));
    }

    #[test]
    fn edit_file_replaces_unique_match() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "hello world\n").unwrap();
        let out = tool_in(dir.path()).edit_file(&json!({
            "path": "a.txt", "old_string": "world", "new_string": "there"
        }));
        assert_eq!(out, "Edited a.txt: replaced 1 occurrence.");
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello there\n");
    }

    #[test]
    fn edit_file_refuses_ambiguous_match() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "dup\ndup\n").unwrap();
        let out = tool_in(dir.path()).edit_file(&json!({
            "path": "a.txt", "old_string": "dup", "new_string": "x"
        }));
        assert!(out.contains("matches 2 locations"));
        // File untouched.
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "dup\ndup\n");
    }

    #[test]
    fn edit_file_reports_missing_string() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "content\n").unwrap();
        let out = tool_in(dir.path()).edit_file(&json!({
            "path": "a.txt", "old_string": "absent", "new_string": "x"
        }));
        assert!(out.contains("old_string not found"));
    }

    #[test]
    fn glob_finds_nested_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src/inner")).unwrap();
        std::fs::write(dir.path().join("src/a.rs"), "").unwrap();
        std::fs::write(dir.path().join("src/inner/b.rs"), "").unwrap();
        std::fs::write(dir.path().join("src/c.txt"), "").unwrap();
        let out = tool_in(dir.path()).glob(&json!({"pattern": "**/*.rs"}));
        assert!(out.contains("a.rs"));
        assert!(out.contains("b.rs"));
        assert!(!out.contains("c.txt"));
    }

    #[test]
    fn grep_content_mode_shows_line_numbers() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "one\ntwo needle\nthree\n").unwrap();
        let out = tool_in(dir.path())
            .grep(&json!({"pattern": "needle", "output_mode": "content"}));
        assert!(out.contains("a.txt:2: two needle"));
    }

    #[test]
    fn grep_files_mode_lists_paths() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("hit.txt"), "needle here\n").unwrap();
        std::fs::write(dir.path().join("miss.txt"), "nothing\n").unwrap();
        let out = tool_in(dir.path()).grep(&json!({"pattern": "needle"}));
        assert!(out.contains("hit.txt"));
        assert!(!out.contains("miss.txt"));
    }

    #[test]
    fn bash_hidden_unless_opted_in() {
        let dir = tempfile::tempdir().unwrap();
        let without = tool_in(dir.path());
        assert!(!without.handles("bash"));
        assert!(!without.defs().iter().any(|d| d.name == "bash"));

        let with = CodingTool::new(CodingConfig {
            workdir: dir.path().display().to_string(),
            bash_enabled: true,
        });
        assert!(with.handles("bash"));
        assert!(with.defs().iter().any(|d| d.name == "bash"));
    }

    #[tokio::test]
    async fn bash_runs_and_reports_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let tool = CodingTool::new(CodingConfig {
            workdir: dir.path().display().to_string(),
            bash_enabled: true,
        });
        let ok = tool.bash(&json!({"command": "echo hi"})).await;
        assert_eq!(ok.trim(), "hi");
        let fail = tool.bash(&json!({"command": "exit 3"})).await;
        assert!(fail.starts_with("Exit 3:"));
    }
}
