//! MCP server over stdio
//!
//! [`McpServer`] answers the protocol methods directly and hands
//! `tools/call` requests back to the caller as a [`ToolCall`], which the
//! stdio loop runs on the blocking pool so several calls can be in flight at
//! once. Every response carries the id of the request it answers.

pub mod jsonrpc;
mod stdio;

pub use jsonrpc::JsonRpcRequest;
pub use stdio::ServeSummary;

use crate::config::ServerConfig;
use crate::db::Database;
use crate::error::DispatchError;
use crate::tools::ToolRegistry;
use jsonrpc::*;
use serde_json::{json, Value};
use std::time::{Duration, Instant};

pub const MCP_VERSION: &str = "2024-11-05";
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// A validated `tools/call` request, ready to run
#[derive(Debug)]
pub struct ToolCall {
    pub id: Option<Value>,
    pub name: String,
    pub arguments: Value,
}

/// What to do with one inbound message
#[derive(Debug)]
pub enum Route {
    /// Send this response now
    Reply(Value),
    /// Run this tool call, then send its response
    Call(ToolCall),
    /// Notification; nothing is sent
    Silent,
}

pub struct McpServer {
    db: Database,
    tools: ToolRegistry,
    name: String,
    drain_timeout: Duration,
}

impl McpServer {
    pub fn new(db: Database, tools: ToolRegistry, config: &ServerConfig) -> Self {
        Self {
            db,
            tools,
            name: config.name.clone(),
            drain_timeout: config.drain_timeout(),
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Decide how to answer one request. Never touches the database.
    pub fn route(&self, request: JsonRpcRequest) -> Route {
        let JsonRpcRequest {
            method, id, params, ..
        } = request;

        match method.as_str() {
            "initialize" => Route::Reply(json_rpc_response(
                id,
                json!({
                    "protocolVersion": MCP_VERSION,
                    "serverInfo": { "name": self.name, "version": SERVER_VERSION },
                    "capabilities": { "tools": {} }
                }),
            )),
            _ if id.is_none() => {
                tracing::debug!(method = %method, "notification");
                Route::Silent
            }
            "ping" => Route::Reply(json_rpc_response(id, json!({}))),
            "resources/list" => Route::Reply(json_rpc_response(id, json!({ "resources": [] }))),
            "tools/list" => Route::Reply(json_rpc_response(
                id,
                json!({ "tools": self.tools.descriptors() }),
            )),
            "tools/call" => self.route_call(id, params),
            other => Route::Reply(json_rpc_error(
                id,
                METHOD_NOT_FOUND,
                &format!("Method not found: {}", other),
            )),
        }
    }

    fn route_call(&self, id: Option<Value>, params: Option<Value>) -> Route {
        let Some(Value::Object(mut params)) = params else {
            return Route::Reply(json_rpc_error(id, INVALID_PARAMS, "params must be an object"));
        };
        let Some(Value::String(name)) = params.remove("name") else {
            return Route::Reply(json_rpc_error(id, INVALID_PARAMS, "params.name must be a string"));
        };
        let arguments = match params.remove("arguments") {
            None | Some(Value::Null) => json!({}),
            Some(args) => args,
        };
        Route::Call(ToolCall {
            id,
            name,
            arguments,
        })
    }

    /// Run a tool call to completion. Blocks on the database.
    pub fn execute(&self, call: ToolCall) -> Value {
        let ToolCall {
            id,
            name,
            arguments,
        } = call;
        let request_id = id.as_ref().map(Value::to_string).unwrap_or_default();
        let span = tracing::info_span!("tool_call", tool = %name, request_id = %request_id);
        let _enter = span.enter();

        let started = Instant::now();
        let outcome = self.tools.dispatch(&self.db, &name, arguments);
        let elapsed_ms = started.elapsed().as_millis();

        match outcome {
            Ok(result) => {
                tracing::debug!(elapsed_ms, is_error = result.is_error, "tool call finished");
                match serde_json::to_value(&result) {
                    Ok(value) => json_rpc_response(id, value),
                    Err(e) => json_rpc_error(id, INTERNAL_ERROR, &format!("Internal error: {}", e)),
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "rejected tool call");
                match &err {
                    DispatchError::UnknownTool(_) => {
                        json_rpc_error(id, METHOD_NOT_FOUND, &err.to_string())
                    }
                    DispatchError::InvalidArguments { issues, .. } => json_rpc_error_with_data(
                        id,
                        INVALID_PARAMS,
                        &err.to_string(),
                        json!({ "issues": issues }),
                    ),
                }
            }
        }
    }

    /// Route and, for tool calls, execute in the current thread
    pub fn handle(&self, request: JsonRpcRequest) -> Option<Value> {
        match self.route(request) {
            Route::Reply(response) => Some(response),
            Route::Call(call) => Some(self.execute(call)),
            Route::Silent => None,
        }
    }
}
