use crate::resolver::{normalize_path, AllowedRoots};
use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};

pub const USAGE: &str = "usage: mcp-filesystem [--otel-enabled <bool>] [--otel-endpoint <url>] [--otel-service-name <name>] <allowed-directory> [additional-directories...]";

#[derive(Clone, Debug)]
pub struct Config {
	pub roots: AllowedRoots,
	pub otel_enabled: bool,
	pub otel_endpoint: String,
	pub otel_service_name: String,
	pub session_id: String,
}

pub fn load_config() -> Result<Config> {
	let cwd = std::env::current_dir()?;
	let env_roots = std::env::var("MCP_ALLOWED_ROOTS").ok();
	parse_config(std::env::args().skip(1), env_roots.as_deref(), &cwd)
}

fn parse_config<I>(args: I, env_roots: Option<&str>, cwd: &Path) -> Result<Config>
where
	I: IntoIterator<Item = String>, {
	let mut roots_raw: Vec<String> = Vec::new();
	let mut otel_enabled = false;
	let mut otel_endpoint = String::from("http://127.0.0.1:4317");
	let mut otel_service_name = String::from("mcp-filesystem");
	let mut positional_only = false;
	let mut args = args.into_iter();
	while let Some(arg) = args.next() {
		if positional_only || !arg.starts_with("--") {
			if !arg.trim().is_empty() {
				roots_raw.push(arg);
			}
			continue;
		}
		match arg.as_str() {
			"--" => {
				positional_only = true;
			}
			"--otel-enabled" => {
				let value = args.next().ok_or_else(|| anyhow!("--otel-enabled requires a value"))?;
				otel_enabled = parse_bool(&value, "--otel-enabled")?;
			}
			"--otel-endpoint" => {
				let value = args.next().ok_or_else(|| anyhow!("--otel-endpoint requires a value"))?;
				otel_endpoint = value;
			}
			"--otel-service-name" => {
				let value = args.next().ok_or_else(|| anyhow!("--otel-service-name requires a value"))?;
				otel_service_name = value;
			}
			_ => return Err(anyhow!("unknown argument: {}\n{}", arg, USAGE)),
		}
	}
	if let Some(env_roots) = env_roots {
		for value in env_roots.split(',') {
			let trimmed = value.trim();
			if !trimmed.is_empty() {
				roots_raw.push(trimmed.to_string());
			}
		}
	}
	if let Ok(env_enabled) = std::env::var("MCP_OTEL_ENABLED") {
		if !env_enabled.trim().is_empty() {
			otel_enabled = parse_bool(&env_enabled, "MCP_OTEL_ENABLED")?;
		}
	}
	if let Ok(env_endpoint) = std::env::var("MCP_OTEL_ENDPOINT") {
		if !env_endpoint.trim().is_empty() {
			otel_endpoint = env_endpoint;
		}
	}
	if let Ok(env_service) = std::env::var("MCP_OTEL_SERVICE_NAME") {
		if !env_service.trim().is_empty() {
			otel_service_name = env_service;
		}
	}
	if roots_raw.is_empty() {
		return Err(anyhow!("at least one allowed directory is required\n{}", USAGE));
	}
	let roots = roots_raw.iter()
		.map(|raw| normalize_root_path(raw, cwd))
		.collect();
	Ok(Config {
		roots: AllowedRoots::new(roots),
		otel_enabled,
		otel_endpoint,
		otel_service_name,
		session_id: uuid::Uuid::new_v4().to_string(),
	})
}

fn normalize_root_path(path: &str, cwd: &Path) -> PathBuf {
	let raw = PathBuf::from(path);
	let absolute = if raw.is_absolute() {
		raw
	}
	else {
		cwd.join(raw)
	};
	normalize_path(&absolute)
}

fn parse_bool(value: &str, label: &str) -> Result<bool> {
	let value = value.trim().to_lowercase();
	match value.as_str() {
		"1" | "true" | "yes" | "on" => Ok(true),
		"0" | "false" | "no" | "off" => Ok(false),
		_ => Err(anyhow!("{} must be a boolean", label)),
	}
}
