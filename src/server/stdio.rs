use super::jsonrpc::{json_rpc_error, parse_request, INTERNAL_ERROR};
use super::{McpServer, Route, ToolCall};
use crate::pool::DrainReport;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

/// What happened during one serving session
#[derive(Debug, Clone)]
pub struct ServeSummary {
    pub requests: u64,
    pub tool_calls: u64,
    /// Tool calls still running when the drain timeout expired
    pub abandoned_calls: usize,
    pub pool: DrainReport,
}

impl McpServer {
    /// Serve newline-delimited JSON-RPC from `input` until it closes or
    /// `shutdown` resolves, then wait for in-flight calls and drain the pool.
    pub async fn serve<R, W, S>(
        self: Arc<Self>,
        input: R,
        output: W,
        shutdown: S,
    ) -> std::io::Result<ServeSummary>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
        S: Future<Output = ()>,
    {
        let (tx, rx) = mpsc::unbounded_channel::<Value>();
        let writer = tokio::spawn(write_responses(output, rx));

        let mut lines = BufReader::new(input).lines();
        let mut calls = JoinSet::new();
        let mut requests = 0u64;
        let mut tool_calls = 0u64;
        tokio::pin!(shutdown);

        tracing::info!(tools = self.tools.len(), "serving MCP on stdio");

        loop {
            tokio::select! {
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        requests += 1;
                        match parse_request(&line) {
                            Err(response) => {
                                let _ = tx.send(response);
                            }
                            Ok(request) => match self.route(request) {
                                Route::Reply(response) => {
                                    let _ = tx.send(response);
                                }
                                Route::Silent => {}
                                Route::Call(call) => {
                                    tool_calls += 1;
                                    calls.spawn(run_call(Arc::clone(&self), call, tx.clone()));
                                }
                            },
                        }
                    }
                    Ok(None) => {
                        tracing::info!("input closed");
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to read request");
                        break;
                    }
                },
                _ = &mut shutdown => {
                    tracing::info!("shutdown requested");
                    break;
                }
                Some(_) = calls.join_next(), if !calls.is_empty() => {}
            }
        }

        let drain_timeout = self.drain_timeout;
        let pending = calls.len();
        if pending > 0 {
            tracing::info!(pending, "waiting for in-flight tool calls");
        }
        let waited = tokio::time::timeout(drain_timeout, async {
            while calls.join_next().await.is_some() {}
        })
        .await;
        let abandoned_calls = calls.len();
        if waited.is_err() {
            tracing::warn!(
                abandoned = abandoned_calls,
                "in-flight tool calls outlived the drain timeout"
            );
            // blocking handlers keep running; their responses are dropped
            calls.abort_all();
        }

        drop(tx);
        let mut writer = writer;
        match tokio::time::timeout(drain_timeout, &mut writer).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => tracing::warn!(error = %e, "response writer failed"),
            Ok(Err(e)) => tracing::warn!(error = %e, "response writer task failed"),
            Err(_) => {
                tracing::warn!("response writer outlived the drain timeout");
                writer.abort();
            }
        }

        let server = Arc::clone(&self);
        let pool = tokio::task::spawn_blocking(move || server.db.shutdown(drain_timeout))
            .await
            .map_err(std::io::Error::other)?;

        let summary = ServeSummary {
            requests,
            tool_calls,
            abandoned_calls,
            pool,
        };
        tracing::info!(
            requests = summary.requests,
            tool_calls = summary.tool_calls,
            abandoned_calls = summary.abandoned_calls,
            abandoned_connections = summary.pool.abandoned,
            "server stopped"
        );
        Ok(summary)
    }
}

/// Run one tool call on the blocking pool and queue its response
async fn run_call(server: Arc<McpServer>, call: ToolCall, tx: mpsc::UnboundedSender<Value>) {
    let id = call.id.clone();
    let name = call.name.clone();
    let response = match tokio::task::spawn_blocking(move || server.execute(call)).await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(tool = %name, error = %e, "tool handler panicked");
            let message = format!("Internal error while running {}", name);
            json_rpc_error(id, INTERNAL_ERROR, &message)
        }
    };
    let _ = tx.send(response);
}

/// Single writer: one JSON document per line, flushed per response
async fn write_responses<W>(
    mut output: W,
    mut rx: mpsc::UnboundedReceiver<Value>,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(response) = rx.recv().await {
        let mut line = serde_json::to_vec(&response)?;
        line.push(b'\n');
        output.write_all(&line).await?;
        output.flush().await?;
    }
    output.shutdown().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::db::Database;
    use crate::pool::PoolState;
    use crate::tools::{ArgSchema, ToolRegistry, ToolResult};
    use serde_json::json;
    use std::collections::HashMap;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;

    fn server_with(tools: ToolRegistry) -> (Arc<McpServer>, TempDir) {
        let dir = TempDir::new().unwrap();
        let db = Database::open_at(dir.path().join("stdio.db")).unwrap();
        (
            Arc::new(McpServer::new(db, tools, &ServerConfig::default())),
            dir,
        )
    }

    fn server_with_drain(tools: ToolRegistry, drain_timeout_ms: u64) -> (Arc<McpServer>, TempDir) {
        let dir = TempDir::new().unwrap();
        let db = Database::open_at(dir.path().join("stdio.db")).unwrap();
        let config = ServerConfig {
            drain_timeout_ms,
            ..ServerConfig::default()
        };
        (Arc::new(McpServer::new(db, tools, &config)), dir)
    }

    async fn run(server: Arc<McpServer>, input: String) -> (Vec<Value>, ServeSummary) {
        let (out_write, mut out_read) = tokio::io::duplex(1 << 20);
        let summary = server
            .serve(input.as_bytes(), out_write, std::future::pending())
            .await
            .unwrap();
        let mut text = String::new();
        out_read.read_to_string(&mut text).await.unwrap();
        let responses = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        (responses, summary)
    }

    fn by_id(responses: &[Value]) -> HashMap<String, Value> {
        responses
            .iter()
            .map(|r| (r["id"].to_string(), r.clone()))
            .collect()
    }

    #[tokio::test]
    async fn test_session_answers_every_request() {
        let (server, _dir) = server_with(ToolRegistry::standard());
        let mut input = String::new();
        input.push_str(r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#);
        input.push('\n');
        input.push_str(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#);
        input.push_str("\n\n");
        input.push_str(r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#);
        input.push('\n');
        input.push_str("this is not json\n");

        let (responses, summary) = run(server, input).await;
        assert_eq!(responses.len(), 3);
        let ids = by_id(&responses);
        assert_eq!(ids["1"]["result"]["protocolVersion"], "2024-11-05");
        assert_eq!(ids["2"]["result"]["tools"].as_array().unwrap().len(), 27);
        assert_eq!(ids["null"]["error"]["code"], -32700);
        assert_eq!(summary.requests, 4);
        assert_eq!(summary.pool.abandoned, 0);
    }

    #[tokio::test]
    async fn test_concurrent_calls_keep_their_ids() {
        let (server, _dir) = server_with(ToolRegistry::standard());
        let mut input = String::new();
        for i in 0..20 {
            let req = json!({
                "jsonrpc": "2.0",
                "id": format!("req-{i}"),
                "method": "tools/call",
                "params": {
                    "name": "store_project_task",
                    "arguments": {"projectName": "p", "taskId": format!("T{i}"), "title": format!("task {i}")}
                }
            });
            input.push_str(&req.to_string());
            input.push('\n');
        }

        let (responses, summary) = run(server, input).await;
        assert_eq!(summary.tool_calls, 20);
        assert_eq!(summary.abandoned_calls, 0);
        let ids = by_id(&responses);
        for i in 0..20 {
            let resp = &ids[&format!("\"req-{i}\"")];
            let text = resp["result"]["content"][0]["text"].as_str().unwrap();
            assert!(text.contains(&format!("task \"T{i}\"")), "{}", text);
        }
    }

    #[tokio::test]
    async fn test_panicking_handler_reports_internal_error() {
        let mut tools = ToolRegistry::standard();
        tools.register("explode", "Always panics", ArgSchema::new(), |_: &Database, _: Value| -> ToolResult {
            panic!("boom")
        });
        let (server, _dir) = server_with(tools);
        let input = [
            json!({"jsonrpc": "2.0", "id": 1, "method": "tools/call", "params": {"name": "explode"}}),
            json!({"jsonrpc": "2.0", "id": 2, "method": "ping"}),
        ]
        .iter()
        .map(|v| format!("{v}\n"))
        .collect::<String>();

        let (responses, _) = run(server, input).await;
        let ids = by_id(&responses);
        assert_eq!(ids["1"]["error"]["code"], -32603);
        assert_eq!(ids["2"]["result"], json!({}));
    }

    #[tokio::test]
    async fn test_pool_closed_after_serve() {
        let (server, _dir) = server_with(ToolRegistry::standard());
        let (_, summary) = run(Arc::clone(&server), String::new()).await;
        assert_eq!(summary.requests, 0);
        assert_eq!(server.database().pool().state(), PoolState::Closed);
    }

    #[tokio::test]
    async fn test_slow_call_does_not_outlast_drain_timeout() {
        let mut tools = ToolRegistry::standard();
        tools.register("stall", "Sleeps past shutdown", ArgSchema::new(), |_: &Database, _: Value| {
            std::thread::sleep(std::time::Duration::from_millis(1500));
            ToolResult::text("too late")
        });
        let (server, _dir) = server_with_drain(tools, 100);
        let input = [
            json!({"jsonrpc": "2.0", "id": 1, "method": "tools/call", "params": {"name": "stall"}}),
            json!({"jsonrpc": "2.0", "id": 2, "method": "ping"}),
        ]
        .iter()
        .map(|v| format!("{v}\n"))
        .collect::<String>();

        let started = std::time::Instant::now();
        let (responses, summary) = run(server, input).await;
        assert!(started.elapsed() < std::time::Duration::from_millis(1000));
        assert_eq!(summary.abandoned_calls, 1);
        let ids = by_id(&responses);
        assert!(!ids.contains_key("1"));
        assert_eq!(ids["2"]["result"], json!({}));
    }
}
