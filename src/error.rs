use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FsError {
	#[error("access denied - path outside allowed directories: {0}")]
	AccessDenied(String),

	#[error("not found: {}", .0.display())]
	NotFound(PathBuf),

	#[error("destination already exists: {}", .0.display())]
	AlreadyExists(PathBuf),

	#[error("{action} {}: {source}", .path.display())]
	Io {
		action: &'static str,
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},
}

impl FsError {
	/// Classifies an io failure; a missing target becomes `NotFound`.
	pub fn io(action: &'static str, path: &Path, source: std::io::Error) -> Self {
		if source.kind() == std::io::ErrorKind::NotFound {
			return FsError::NotFound(path.to_path_buf());
		}
		FsError::Io {
			action,
			path: path.to_path_buf(),
			source
		}
	}

	/// Stable code reported in the `data` of a JSON-RPC error.
	pub fn code(&self) -> &'static str {
		match self {
			FsError::AccessDenied(_) => "ACCESS_DENIED",
			FsError::NotFound(_) => "NOT_FOUND",
			FsError::AlreadyExists(_) => "ALREADY_EXISTS",
			FsError::Io { .. } => "IO_ERROR",
		}
	}
}

pub type Result<T> = std::result::Result<T, FsError>;
