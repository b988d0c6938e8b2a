//! Integration tests for the ctxstore binary
//!
//! These tests drive the real executable: CLI subcommands directly, and the
//! MCP server by piping JSON-RPC lines through stdin with a temporary
//! database.

use serde_json::{json, Value};
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};
use tempfile::TempDir;

/// Helper to run ctxstore with a specific database path
fn run_ctxstore(args: &[&str], dir: &Path) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_ctxstore"))
        .args(args)
        .current_dir(dir)
        .env("CTXSTORE_DB_PATH", dir.join("test.db"))
        .env("CTXSTORE_LOG", "warn")
        .output()
        .expect("Failed to execute ctxstore")
}

/// Helper to get stdout as string
fn stdout(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

/// Helper to get stderr as string
fn stderr(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

/// Run one server session: write every request, close stdin, collect responses
fn session(dir: &Path, requests: &[Value]) -> Vec<Value> {
    let mut child = Command::new(env!("CARGO_BIN_EXE_ctxstore"))
        .arg("serve")
        .current_dir(dir)
        .env("CTXSTORE_DB_PATH", dir.join("test.db"))
        .env("CTXSTORE_LOG", "warn")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to start ctxstore serve");

    {
        let mut stdin = child.stdin.take().unwrap();
        for request in requests {
            writeln!(stdin, "{}", request).unwrap();
        }
    }

    let output = child.wait_with_output().unwrap();
    assert!(output.status.success(), "serve failed: {}", stderr(&output));
    stdout(&output)
        .lines()
        .map(|line| serde_json::from_str(line).expect("server wrote a non-JSON line"))
        .collect()
}

fn call(id: u64, tool: &str, arguments: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "tools/call",
        "params": { "name": tool, "arguments": arguments }
    })
}

fn response(responses: &[Value], id: u64) -> &Value {
    responses
        .iter()
        .find(|r| r["id"] == id)
        .unwrap_or_else(|| panic!("no response for id {id}"))
}

fn text(resp: &Value) -> &str {
    resp["result"]["content"][0]["text"].as_str().unwrap()
}

// =============================================================================
// Basic Command Tests
// =============================================================================

#[test]
fn test_help_command() {
    let dir = TempDir::new().unwrap();
    let output = run_ctxstore(&["--help"], dir.path());

    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains("ctxstore"));
    assert!(out.contains("project knowledge"));
}

#[test]
fn test_version_command() {
    let dir = TempDir::new().unwrap();
    let output = run_ctxstore(&["--version"], dir.path());

    assert!(output.status.success());
    assert!(stdout(&output).contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_completion_zsh() {
    let dir = TempDir::new().unwrap();
    let output = run_ctxstore(&["completion", "zsh"], dir.path());

    assert!(
        output.status.success(),
        "completion zsh failed: {}",
        stderr(&output)
    );
    assert!(stdout(&output).contains("#compdef ctxstore"));
}

#[test]
fn test_tools_command_prints_catalogue() {
    let dir = TempDir::new().unwrap();
    let output = run_ctxstore(&["tools"], dir.path());

    assert!(output.status.success());
    let listing: Value = serde_json::from_str(&stdout(&output)).unwrap();
    let tools = listing["tools"].as_array().unwrap();
    assert_eq!(tools.len(), 27);
    assert_eq!(tools[26]["name"], "get_file_metadata");
}

// =============================================================================
// Health and Init
// =============================================================================

#[test]
fn test_health_reports_open_pool() {
    let dir = TempDir::new().unwrap();
    let output = run_ctxstore(&["health", "--json"], dir.path());

    assert!(output.status.success(), "health failed: {}", stderr(&output));
    let report: Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(report["state"], "open");
    assert_eq!(report["reachable"], true);
    assert!(dir.path().join("test.db").exists());
}

#[test]
fn test_unreachable_database_fails_startup() {
    let dir = TempDir::new().unwrap();
    // a regular file where a directory is needed
    std::fs::write(dir.path().join("blocker"), "").unwrap();
    let config_dir = dir.path().join(".ctxstore");
    std::fs::create_dir_all(&config_dir).unwrap();
    let config_path = config_dir.join("config.toml");
    std::fs::write(&config_path, "[pool]\nconnect_retries = 1\nretry_backoff_ms = 10\n").unwrap();

    let db = dir.path().join("blocker").join("nested").join("test.db");
    let output = Command::new(env!("CARGO_BIN_EXE_ctxstore"))
        .args(["health", "--config"])
        .arg(&config_path)
        .arg("--db")
        .arg(&db)
        .current_dir(dir.path())
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert!(stderr(&output).contains("Could not open database"), "{}", stderr(&output));
}

#[test]
fn test_init_scaffolds_project() {
    let dir = TempDir::new().unwrap();
    let output = Command::new(env!("CARGO_BIN_EXE_ctxstore"))
        .arg("init")
        .current_dir(dir.path())
        .output()
        .unwrap();

    assert!(output.status.success(), "init failed: {}", stderr(&output));
    assert!(dir.path().join(".ctxstore/config.toml").exists());
    assert!(dir.path().join(".ctxstore/ctxstore.db").exists());
    assert!(dir.path().join(".mcp.json").exists());
}

// =============================================================================
// MCP Session Tests
// =============================================================================

#[test]
fn test_session_handshake_and_listing() {
    let dir = TempDir::new().unwrap();
    let responses = session(
        dir.path(),
        &[
            json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {"protocolVersion": "2024-11-05"}}),
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
            json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}),
            json!({"jsonrpc": "2.0", "id": 3, "method": "resources/list"}),
            json!({"jsonrpc": "2.0", "id": 4, "method": "ping"}),
        ],
    );

    assert_eq!(responses.len(), 4);
    assert_eq!(response(&responses, 1)["result"]["serverInfo"]["name"], "ctxstore");
    assert_eq!(
        response(&responses, 2)["result"]["tools"].as_array().unwrap().len(),
        27
    );
    assert_eq!(response(&responses, 3)["result"]["resources"], json!([]));
    assert_eq!(response(&responses, 4)["result"], json!({}));
}

#[test]
fn test_task_upsert_survives_restart() {
    let dir = TempDir::new().unwrap();
    session(
        dir.path(),
        &[
            call(1, "store_project_task", json!({"projectName": "p", "taskId": "T1", "title": "Title"})),
        ],
    );
    let responses = session(
        dir.path(),
        &[
            call(1, "store_project_task", json!({"projectName": "p", "taskId": "T1", "title": "Title2"})),
        ],
    );
    assert!(text(response(&responses, 1)).starts_with("Successfully stored task \"T1\" (Title2)"));

    let responses = session(dir.path(), &[call(1, "get_project_tasks", json!({"projectName": "p"}))]);
    let listing = text(response(&responses, 1));
    assert_eq!(listing.matches("ID: T1").count(), 1);
    assert!(listing.contains("Title: Title2"));
}

#[test]
fn test_sensitive_config_masked_over_the_wire() {
    let dir = TempDir::new().unwrap();
    let responses = session(
        dir.path(),
        &[
            call(1, "store_environment_config", json!({
                "projectName": "p",
                "environmentName": "prod",
                "configKey": "API_KEY",
                "configValue": "hunter2",
                "isSensitive": true
            })),
        ],
    );
    assert!(response(&responses, 1)["result"].get("isError").is_none());

    let responses = session(
        dir.path(),
        &[
            call(2, "get_environment_configs", json!({"projectName": "p"})),
            call(3, "get_environment_configs", json!({"projectName": "p", "includeSensitive": true})),
        ],
    );
    assert!(text(response(&responses, 2)).starts_with("No environment configs found"));
    let shown = text(response(&responses, 3));
    assert!(shown.contains("[SENSITIVE]"));
    assert!(!shown.contains("hunter2"));
}

#[test]
fn test_protocol_errors_do_not_stop_the_server() {
    let dir = TempDir::new().unwrap();
    let responses = session(
        dir.path(),
        &[
            call(1, "no_such_tool", json!({})),
            call(2, "store_context", json!({"projectName": "", "content": 3})),
            call(3, "update_build_status", json!({"projectName": "p", "buildNumber": "404", "status": "failed"})),
            json!({"jsonrpc": "2.0", "id": 4, "method": "sampling/createMessage"}),
            call(5, "get_context", json!({"projectName": "p"})),
        ],
    );

    assert_eq!(response(&responses, 1)["error"]["code"], -32601);

    let invalid = response(&responses, 2);
    assert_eq!(invalid["error"]["code"], -32602);
    let fields: Vec<&str> = invalid["error"]["data"]["issues"]
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["field"].as_str().unwrap())
        .collect();
    assert_eq!(fields, vec!["projectName", "contextType", "content"]);

    let missing = response(&responses, 3);
    assert_eq!(missing["result"]["isError"], true);
    assert!(text(missing).starts_with("Error updating build status"));

    assert_eq!(response(&responses, 4)["error"]["code"], -32601);
    assert_eq!(text(response(&responses, 5)), "No context found for project \"p\"");
}

#[test]
fn test_file_versions_continue_across_sessions() {
    let dir = TempDir::new().unwrap();
    let store = |id| {
        call(id, "store_file_history", json!({
            "projectName": "p",
            "filePath": "src/lib.rs",
            "content": format!("revision {id}"),
            "author": "dev"
        }))
    };
    session(dir.path(), &[store(1)]);
    session(dir.path(), &[store(2)]);
    let responses = session(
        dir.path(),
        &[
            store(3),
        ],
    );
    assert!(text(response(&responses, 3)).contains("(version 3,"));
}
