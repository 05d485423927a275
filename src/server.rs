use crate::config::Config;
use crate::edit::{self, Edit};
use crate::error::FsError;
use crate::fs;
use crate::protocol::{Request, Response, INVALID_PARAMS, METHOD_NOT_FOUND, PARSE_ERROR, SERVER_ERROR};
use crate::search;
use anyhow::Result;
use opentelemetry::trace::TraceError;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::resource::Resource;
use opentelemetry_sdk::trace as sdktrace;
use opentelemetry_semantic_conventions::resource as semconv;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{self, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{info, info_span, warn, Span};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const DEFAULT_PROTOCOL_VERSION: &str = "2024-11-05";

/// Request-level failure answered with a bare JSON-RPC error code.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
struct ProtocolError {
	code: i64,
	message: String,
}

impl ProtocolError {
	fn invalid_params(message: impl Into<String>) -> Self {
		Self {
			code: INVALID_PARAMS,
			message: message.into()
		}
	}

	fn method_not_found(message: impl Into<String>) -> Self {
		Self {
			code: METHOD_NOT_FOUND,
			message: message.into()
		}
	}
}

/// How a tool call ended. Soft errors are ordinary results flagged with
/// `isError`; hard errors become JSON-RPC errors.
enum ToolOutcome {
	Success(Value),
	SoftError(Value),
	HardError(FsError),
}

#[derive(Deserialize)]
struct PathParams {
	path: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListWithSizesParams {
	path: String,
	#[serde(default)]
	sort_by: Option<String>,
}

#[derive(Deserialize)]
struct WriteParams {
	path: String,
	content: String,
}

#[derive(Deserialize)]
struct MoveParams {
	source: String,
	destination: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchParams {
	path: String,
	pattern: String,
	#[serde(default)]
	exclude_patterns: Option<Vec<String>>,
}

#[derive(Deserialize)]
struct ReadMultipleParams {
	#[serde(default)]
	paths: Option<Vec<String>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EditParams {
	path: String,
	#[serde(default)]
	edits: Vec<Edit>,
	#[serde(default)]
	dry_run: bool,
}

/// Installs the stderr log layer and, when enabled, the OTLP span exporter.
pub fn init_tracing(config: &Config) {
	let (tracer, otel_error) = match otlp_tracer(config) {
		Ok(tracer) => (tracer, None),
		Err(err) => (None, Some(err)),
	};
	let otel_layer = tracer.map(|tracer| tracing_opentelemetry::layer().with_tracer(tracer));
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
	// stdout carries the protocol
	let fmt_layer = tracing_subscriber::fmt::layer()
		.with_target(false)
		.with_writer(std::io::stderr);
	tracing_subscriber::registry()
		.with(filter)
		.with(fmt_layer)
		.with(otel_layer)
		.init();
	if let Some(err) = otel_error {
		warn!(error = %err, "otlp export disabled");
	}
}

/// Batch OTLP pipeline tagged with the session and its roots. The pipeline
/// registers itself as the global provider.
fn otlp_tracer(config: &Config) -> std::result::Result<Option<sdktrace::Tracer>, TraceError> {
	if !config.otel_enabled {
		return Ok(None);
	}
	let _ = global::set_error_handler(|_| {});
	let resource = Resource::new(vec![
		KeyValue::new(semconv::SERVICE_NAME, config.otel_service_name.clone()),
		KeyValue::new(semconv::SERVICE_VERSION, env!("CARGO_PKG_VERSION")),
		KeyValue::new("mcp.session_id", config.session_id.clone()),
		KeyValue::new("mcp.allowed_roots", config.roots.display_list().join(",")),
	]);
	let exporter = opentelemetry_otlp::new_exporter()
		.tonic()
		.with_endpoint(config.otel_endpoint.clone());
	let tracer = opentelemetry_otlp::new_pipeline()
		.tracing()
		.with_exporter(exporter)
		.with_trace_config(sdktrace::Config::default().with_resource(resource))
		.install_batch(opentelemetry_sdk::runtime::Tokio)?;
	Ok(Some(tracer))
}

pub async fn run(config: Config) -> Result<()> {
	for root in config.roots.iter() {
		if !root.is_dir() {
			warn!(root = %root.display(), "allowed directory does not exist or is not a directory");
		}
	}
	info!(roots = %config.roots.display_list().join(", "), "starting filesystem server on stdio");
	let stdin = io::stdin();
	let stdout = io::stdout();
	let mut reader = BufReader::new(stdin).lines();
	let mut writer = io::BufWriter::new(stdout);
	while let Some(line) = reader.next_line().await? {
		if line.trim().is_empty() {
			continue;
		}
		let req: Request = match serde_json::from_str(&line) {
			Ok(req) => req,
			Err(err) => {
				let resp = Response::err(Value::Null, PARSE_ERROR, err.to_string());
				write_response(&mut writer, &resp).await?;
				continue;
			}
		};
		if let Some(resp) = handle_request(&config, req).await {
			write_response(&mut writer, &resp).await?;
		}
	}
	Ok(())
}

async fn handle_request(config: &Config, req: Request) -> Option<Response> {
	let Some(id) = req.id.clone() else {
		tracing::debug!(method = %req.method, "notification");
		return None;
	};
	let span = info_span!(
		"mcp.request",
		"mcp.session_id" = %config.session_id,
		"mcp.method" = %req.method,
		"mcp.tool_name" = req.tool_name().unwrap_or(""),
		"mcp.is_error" = tracing::field::Empty,
		"mcp.error_code" = tracing::field::Empty,
		"mcp.response_bytes" = tracing::field::Empty,
	);
	let _guard = span.enter();
	let resp = match route(config, &req).await {
		Ok(ToolOutcome::Success(value)) => {
			record_result(&span, &value, None);
			Response::ok(id, value)
		}
		Ok(ToolOutcome::SoftError(value)) => {
			record_result(&span, &value, None);
			Response::ok(id, value)
		}
		Ok(ToolOutcome::HardError(err)) => {
			warn!(error = %err, "tool failed");
			record_result(&span, &Value::Null, Some(err.code()));
			Response::err_with_data(
				id,
				SERVER_ERROR,
				err.to_string(),
				Some(json!({
					"code": err.code()
				}))
			)
		}
		Err(err) => {
			warn!(error = %err, "request failed");
			if let Some(protocol) = err.downcast_ref::<ProtocolError>() {
				Response::err(id, protocol.code, protocol.message.clone())
			}
			else {
				Response::err(id, SERVER_ERROR, err.to_string())
			}
		}
	};
	Some(resp)
}

async fn route(config: &Config, req: &Request) -> Result<ToolOutcome> {
	match req.method.as_str() {
		"initialize" => {
			let protocol_version = req.params
				.get("protocolVersion")
				.and_then(Value::as_str)
				.unwrap_or(DEFAULT_PROTOCOL_VERSION);
			Ok(ToolOutcome::Success(json!({
				"protocolVersion": protocol_version,
				"serverInfo": {
					"name": "filesystem",
					"version": env!("CARGO_PKG_VERSION")
				},
				"capabilities": {
					"tools": {
						"listChanged": true
					},
					"logging": {}
				}
			})))
		}
		"ping" => Ok(ToolOutcome::Success(json!({}))),
		"tools/list" => Ok(ToolOutcome::Success(json!({
			"tools": tool_definitions(),
		}))),
		"tools/call" => {
			let name = req.params
				.get("name")
				.and_then(Value::as_str)
				.ok_or_else(|| ProtocolError::invalid_params("name is required"))?;
			let arguments = req.params
				.get("arguments")
				.cloned()
				.unwrap_or_else(|| json!({}));
			execute_tool(config, name, arguments).await
		}
		_ => Err(ProtocolError::method_not_found(format!("method not found: {}", req.method)).into()),
	}
}

async fn execute_tool(config: &Config, name: &str, arguments: Value) -> Result<ToolOutcome> {
	info!(tool = name, arguments = %arguments, "tool call");
	let roots = &config.roots;
	match name {
		"list_directory" => {
			let params: PathParams = decode_params(name, arguments)?;
			finish(fs::list_directory(roots, &params.path).await)
		}
		"list_directory_with_sizes" => {
			let params: ListWithSizesParams = decode_params(name, arguments)?;
			let sort_by = fs::SortBy::parse(params.sort_by.as_deref());
			finish(fs::list_directory_with_sizes(roots, &params.path, sort_by).await)
		}
		"read_file" => {
			let params: PathParams = decode_params(name, arguments)?;
			finish(fs::read_file(roots, &params.path).await)
		}
		"write_file" => {
			let params: WriteParams = decode_params(name, arguments)?;
			finish(fs::write_file(roots, &params.path, &params.content).await)
		}
		"create_directory" => {
			let params: PathParams = decode_params(name, arguments)?;
			finish(fs::create_directory(roots, &params.path).await)
		}
		"get_file_info" => {
			let params: PathParams = decode_params(name, arguments)?;
			finish(fs::get_file_info(roots, &params.path).await)
		}
		"move_file" => {
			let params: MoveParams = decode_params(name, arguments)?;
			finish(fs::move_file(roots, &params.source, &params.destination).await)
		}
		"delete_file" => {
			let params: PathParams = decode_params(name, arguments)?;
			finish(fs::delete_file(roots, &params.path).await)
		}
		"search_files" => {
			let params: SearchParams = decode_params(name, arguments)?;
			let exclude = params.exclude_patterns.unwrap_or_default();
			let result = search::search_files(roots, &params.path, &params.pattern, &exclude);
			let soft = result.is_soft_error();
			let value = tool_result(&result, soft)?;
			if soft {
				return Ok(ToolOutcome::SoftError(value));
			}
			Ok(ToolOutcome::Success(value))
		}
		"read_multiple_files" => {
			let params: ReadMultipleParams = decode_params(name, arguments)?;
			let paths = params.paths.unwrap_or_default();
			let result = fs::read_multiple_files(roots, &paths).await;
			Ok(ToolOutcome::Success(tool_result(&result, false)?))
		}
		"edit_file" => {
			let params: EditParams = decode_params(name, arguments)?;
			finish(edit::edit_file(roots, &params.path, &params.edits, params.dry_run).await)
		}
		"list_allowed_directories" => {
			Ok(ToolOutcome::Success(tool_result(&fs::list_allowed_directories(roots), false)?))
		}
		"directory_tree" => {
			let params: PathParams = decode_params(name, arguments)?;
			finish(fs::directory_tree(roots, &params.path).await)
		}
		_ => Err(ProtocolError::method_not_found(format!("unknown tool: {}", name)).into()),
	}
}

fn decode_params<T: DeserializeOwned>(tool: &str, arguments: Value) -> Result<T> {
	let arguments = if arguments.is_null() {
		json!({})
	}
	else {
		arguments
	};
	serde_json::from_value(arguments).map_err(|err| ProtocolError::invalid_params(format!("invalid arguments for {}: {}", tool, err)).into())
}

fn finish<T: Serialize>(result: crate::error::Result<T>) -> Result<ToolOutcome> {
	match result {
		Ok(record) => Ok(ToolOutcome::Success(tool_result(&record, false)?)),
		Err(err) => Ok(ToolOutcome::HardError(err)),
	}
}

/// Wraps a result record the way MCP clients expect: the record as JSON text,
/// the same record as structured content, and the error flag.
fn tool_result<T: Serialize>(record: &T, is_error: bool) -> Result<Value> {
	let structured = serde_json::to_value(record)?;
	let text = serde_json::to_string(&structured)?;
	Ok(json!({
		"content": [
			{
				"type": "text",
				"text": text
			}
		],
		"structuredContent": structured,
		"isError": is_error
	}))
}

fn record_result(span: &Span, result: &Value, error_code: Option<&str>) {
	let response_bytes = serde_json::to_string(result).map(|value| value.len() as u64).ok();
	if let Some(bytes) = response_bytes {
		span.record("mcp.response_bytes", bytes);
	}
	let is_error = error_code.is_some() || result.get("isError")
		.and_then(Value::as_bool)
		.unwrap_or(false);
	span.record("mcp.is_error", is_error);
	if let Some(code) = error_code {
		span.record("mcp.error_code", code);
	}
}

/// One response per line; flushed so the client never waits on a buffer.
async fn write_response<W: AsyncWrite + Unpin>(writer: &mut W, resp: &Response) -> Result<()> {
	let mut line = serde_json::to_vec(resp)?;
	line.push(b'\n');
	writer.write_all(&line).await?;
	writer.flush().await?;
	Ok(())
}

fn path_schema(description: &str) -> Value {
	json!({
		"type": "object",
		"properties": {
			"path": { "type": "string", "description": description }
		},
		"required": ["path"]
	})
}

fn tool_definitions() -> Vec<Value> {
	vec![
	json!({
		"name": "list_directory",
		"description": "Get a detailed listing of all files and directories in a specified path. Each entry is tagged as a file or a directory. Only works within allowed directories.",
		"inputSchema": path_schema("Directory path")
	}),
	json!({
		"name": "list_directory_with_sizes",
		"description": "Get a listing of all files and directories in a specified path, including sizes and totals. Entries are sorted by name, or by size (largest first) when sortBy is \"size\". Only works within allowed directories.",
		"inputSchema": {
			"type": "object",
			"properties": {
				"path": { "type": "string", "description": "Directory path" },
				"sortBy": { "type": "string", "enum": ["name", "size"], "description": "Sort entries by name or size" }
			},
			"required": ["path"]
		}
	}),
	json!({
		"name": "read_file",
		"description": "Read the complete contents of a file from the file system as text. Only works within allowed directories.",
		"inputSchema": path_schema("File path")
	}),
	json!({
		"name": "write_file",
		"description": "Create a new file or completely overwrite an existing file with new content. Use with caution as it will overwrite existing files without warning. Only works within allowed directories.",
		"inputSchema": {
			"type": "object",
			"properties": {
				"path": { "type": "string", "description": "File path" },
				"content": { "type": "string", "description": "File content" }
			},
			"required": ["path", "content"]
		}
	}),
	json!({
		"name": "create_directory",
		"description": "Create a new directory or ensure a directory exists. Creates missing parent directories and succeeds silently if the directory already exists. Only works within allowed directories.",
		"inputSchema": path_schema("Directory path")
	}),
	json!({
		"name": "get_file_info",
		"description": "Retrieve metadata about a file or directory: size, modification time, permissions and type. Only works within allowed directories.",
		"inputSchema": path_schema("Path")
	}),
	json!({
		"name": "move_file",
		"description": "Move or rename files and directories. If the destination exists, the operation fails. Both source and destination must be within allowed directories.",
		"inputSchema": {
			"type": "object",
			"properties": {
				"source": { "type": "string", "description": "Source path" },
				"destination": { "type": "string", "description": "Destination path" }
			},
			"required": ["source", "destination"]
		}
	}),
	json!({
		"name": "delete_file",
		"description": "Delete a file or a directory with all of its contents. Only works within allowed directories.",
		"inputSchema": path_schema("Path to delete")
	}),
	json!({
		"name": "search_files",
		"description": "Recursively search for files and directories whose name matches a glob pattern, starting from a directory. Paths matching any exclude pattern are skipped. Returns paths relative to the starting directory. Only searches within allowed directories.",
		"inputSchema": {
			"type": "object",
			"properties": {
				"path": { "type": "string", "description": "Start directory" },
				"pattern": { "type": "string", "description": "Glob pattern matched against entry names" },
				"excludePatterns": {
					"type": "array",
					"items": { "type": "string" },
					"description": "Glob patterns matched against paths relative to the start directory"
				}
			},
			"required": ["path", "pattern"]
		}
	}),
	json!({
		"name": "read_multiple_files",
		"description": "Read the contents of multiple files in one call. Each file's content is returned with its path as a header. Failed reads for individual files won't stop the entire operation. Only works within allowed directories.",
		"inputSchema": {
			"type": "object",
			"properties": {
				"paths": { "type": "array", "items": { "type": "string" } }
			},
			"required": ["paths"]
		}
	}),
	json!({
		"name": "edit_file",
		"description": "Make line-based edits to a text file. Each edit replaces every occurrence of oldText with newText on every line that contains it. Returns a diff of the changed lines. Set dryRun to preview the result without writing. Only works within allowed directories.",
		"inputSchema": {
			"type": "object",
			"properties": {
				"path": { "type": "string", "description": "File to edit" },
				"edits": {
					"type": "array",
					"items": {
						"type": "object",
						"properties": {
							"oldText": { "type": "string" },
							"newText": { "type": "string" }
						},
						"required": ["oldText", "newText"]
					}
				},
				"dryRun": { "type": "boolean", "description": "Preview changes without applying" }
			},
			"required": ["path", "edits"]
		}
	}),
	json!({
		"name": "list_allowed_directories",
		"description": "Returns the list of directories that this server is allowed to access. Use this to understand which directories are available before trying to access files.",
		"inputSchema": {
			"type": "object",
			"properties": {}
		}
	}),
	json!({
		"name": "directory_tree",
		"description": "Get a recursive tree view of files and directories as a JSON structure. Each entry includes 'name', 'type' (file/directory), and 'children' for directories. Files have no children array, while directories always have a children array (which may be empty). Only works within allowed directories.",
		"inputSchema": path_schema("Directory path")
	}),
	]
}
