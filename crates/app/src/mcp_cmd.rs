//! `familiar mcp {add,remove,list}` — edit the MCP server config in place.

use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use serde_json::{json, Map, Value};

#[derive(Debug, Subcommand)]
pub enum McpCommands {
    /// Register a server (stdio by default, SSE with --url).
    Add {
        /// Server name (also the routing prefix shown in logs).
        name: String,
        /// Command to spawn for a stdio server.
        command: Option<String>,
        /// Arguments passed to the command.
        args: Vec<String>,
        /// SSE endpoint; switches the entry to the sse transport.
        #[arg(long)]
        url: Option<String>,
        /// KEY=VALUE environment entries for the child process.
        #[arg(long = "env")]
        env: Vec<String>,
    },
    /// Remove a server entry.
    Remove { name: String },
    /// List configured servers.
    List,
}

pub fn run(config_path: &Path, command: McpCommands) -> Result<()> {
    match command {
        McpCommands::Add { name, command, args, url, env } => {
            add(config_path, &name, command, args, url, env)
        }
        McpCommands::Remove { name } => remove(config_path, &name),
        McpCommands::List => list(config_path),
    }
}

fn load(config_path: &Path) -> Result<Value> {
    match std::fs::read_to_string(config_path) {
        Ok(raw) => serde_json::from_str(&raw)
            .with_context(|| format!("{} is not valid JSON", config_path.display())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(json!({})),
        Err(e) => Err(e).with_context(|| format!("could not read {}", config_path.display())),
    }
}

fn save(config_path: &Path, data: &Value) -> Result<()> {
    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(config_path, serde_json::to_string_pretty(data)?)?;
    Ok(())
}

fn servers_mut(data: &mut Value) -> &mut Map<String, Value> {
    if !data.is_object() {
        *data = json!({});
    }
    let obj = data.as_object_mut().expect("just ensured object");
    if !obj.get("mcpServers").is_some_and(Value::is_object) {
        obj.insert("mcpServers".into(), json!({}));
    }
    obj.get_mut("mcpServers")
        .and_then(Value::as_object_mut)
        .expect("just ensured object")
}

fn add(
    config_path: &Path,
    name: &str,
    command: Option<String>,
    args: Vec<String>,
    url: Option<String>,
    env: Vec<String>,
) -> Result<()> {
    let entry = match (&url, &command) {
        (Some(url), _) => json!({"type": "sse", "url": url}),
        (None, Some(command)) => {
            let mut entry = json!({"type": "stdio", "command": command});
            if !args.is_empty() {
                entry["args"] = json!(args);
            }
            if !env.is_empty() {
                let mut env_map = Map::new();
                for pair in &env {
                    let Some((key, value)) = pair.split_once('=') else {
                        bail!("--env entries must be KEY=VALUE, got '{pair}'");
                    };
                    env_map.insert(key.to_string(), json!(value));
                }
                entry["env"] = Value::Object(env_map);
            }
            entry
        }
        (None, None) => bail!("mcp add needs a command (stdio) or --url (sse)"),
    };

    let mut data = load(config_path)?;
    servers_mut(&mut data).insert(name.to_string(), entry);
    save(config_path, &data)?;
    println!("Added MCP server '{name}'.");
    Ok(())
}

fn remove(config_path: &Path, name: &str) -> Result<()> {
    let mut data = load(config_path)?;
    if servers_mut(&mut data).remove(name).is_none() {
        bail!("no MCP server named '{name}' in {}", config_path.display());
    }
    save(config_path, &data)?;
    println!("Removed MCP server '{name}'.");
    Ok(())
}

fn list(config_path: &Path) -> Result<()> {
    let data = load(config_path)?;
    let Some(servers) = data.get("mcpServers").and_then(Value::as_object) else {
        println!("No MCP servers configured.");
        return Ok(());
    };
    if servers.is_empty() {
        println!("No MCP servers configured.");
        return Ok(());
    }
    for (name, entry) in servers {
        let kind = entry.get("type").and_then(Value::as_str).unwrap_or("stdio");
        let detail = match kind {
            "sse" => entry.get("url").and_then(Value::as_str).unwrap_or("").to_string(),
            _ => {
                let command = entry.get("command").and_then(Value::as_str).unwrap_or("");
                let args = entry
                    .get("args")
                    .and_then(Value::as_array)
                    .map(|a| {
                        a.iter().filter_map(Value::as_str).collect::<Vec<_>>().join(" ")
                    })
                    .unwrap_or_default();
                if args.is_empty() { command.to_string() } else { format!("{command} {args}") }
            }
        };
        println!("{name:20} {kind:6} {detail}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_stdio_then_remove_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("familiar-ai.json");

        add(
            &path,
            "filesystem",
            Some("npx".into()),
            vec!["-y".into(), "@modelcontextprotocol/server-filesystem".into()],
            None,
            vec!["HOME=/home/u".into()],
        )
        .unwrap();

        let data: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let entry = &data["mcpServers"]["filesystem"];
        assert_eq!(entry["type"], "stdio");
        assert_eq!(entry["command"], "npx");
        assert_eq!(entry["args"][0], "-y");
        assert_eq!(entry["env"]["HOME"], "/home/u");

        remove(&path, "filesystem").unwrap();
        let data: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(data["mcpServers"].as_object().unwrap().is_empty());
    }

    #[test]
    fn add_sse_uses_url() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("familiar-ai.json");
        add(&path, "mem", None, vec![], Some("http://localhost:3000/sse".into()), vec![]).unwrap();
        let data: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(data["mcpServers"]["mem"]["type"], "sse");
        assert_eq!(data["mcpServers"]["mem"]["url"], "http://localhost:3000/sse");
    }

    #[test]
    fn remove_missing_server_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("familiar-ai.json");
        assert!(remove(&path, "ghost").is_err());
    }

    #[test]
    fn add_preserves_other_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("familiar-ai.json");
        std::fs::write(
            &path,
            r#"{"mcpServers": {"existing": {"type": "stdio", "command": "srv"}}}"#,
        )
        .unwrap();
        add(&path, "second", Some("other".into()), vec![], None, vec![]).unwrap();
        let data: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(data["mcpServers"].get("existing").is_some());
        assert!(data["mcpServers"].get("second").is_some());
    }

    #[test]
    fn malformed_env_pair_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("familiar-ai.json");
        let err = add(&path, "x", Some("cmd".into()), vec![], None, vec!["NOEQ".into()]);
        assert!(err.is_err());
    }
}
