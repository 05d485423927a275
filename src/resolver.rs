use crate::error::{FsError, Result};
use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

/// Directories every operation is confined to, in declaration order.
///
/// Built once at startup and passed by reference into each call. Roots are
/// stored absolute and lexically cleaned so that containment can be decided
/// component-wise without touching the filesystem.
#[derive(Clone, Debug)]
pub struct AllowedRoots {
	roots: Vec<PathBuf>,
}

/// A path that lay inside one of the allowed roots when it was resolved.
///
/// Only [`AllowedRoots::resolve`] constructs these.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedPath {
	path: PathBuf,
	root_index: usize,
}

impl ResolvedPath {
	pub fn as_path(&self) -> &Path {
		&self.path
	}

	pub fn root_index(&self) -> usize {
		self.root_index
	}
}

impl AllowedRoots {
	/// Roots must already be absolute; relative inputs are anchored by the
	/// config loader before they get here.
	pub fn new(roots: Vec<PathBuf>) -> Self {
		Self {
			roots: roots.iter()
				.map(|root| normalize_path(root))
				.collect()
		}
	}

	pub fn iter(&self) -> impl Iterator<Item = &Path> {
		self.roots
			.iter()
			.map(PathBuf::as_path)
	}

	pub fn display_list(&self) -> Vec<String> {
		self.roots
			.iter()
			.map(|root| root.to_string_lossy().to_string())
			.collect()
	}

	/// True when `path` equals a root or sits below one.
	pub fn contains(&self, path: &Path) -> bool {
		self.root_for(path).is_some()
	}

	fn root_for(&self, path: &Path) -> Option<usize> {
		self.roots
			.iter()
			.position(|root| path.starts_with(root))
	}

	/// Maps a client supplied path to a confined absolute path.
	///
	/// Absolute inputs are matched directly against the root list. Relative
	/// inputs are joined onto each root in order and the first join that stays
	/// under its own root wins.
	pub fn resolve(&self, requested: &str) -> Result<ResolvedPath> {
		let cleaned = normalize_path(Path::new(requested));
		if cleaned.is_absolute() {
			return match self.root_for(&cleaned) {
				Some(root_index) => Ok(ResolvedPath {
					path: cleaned,
					root_index
				}),
				None => Err(FsError::AccessDenied(requested.to_string())),
			};
		}
		for (root_index, root) in self.roots
			.iter()
			.enumerate() {
			let joined = normalize_path(&root.join(&cleaned));
			if joined.starts_with(root) {
				return Ok(ResolvedPath {
					path: joined,
					root_index
				});
			}
		}
		Err(FsError::AccessDenied(requested.to_string()))
	}
}

/// Collapses `.` and `..` without consulting the filesystem.
///
/// Leading `..` segments survive on relative paths; on absolute paths they
/// stop at the root.
pub fn normalize_path(path: &Path) -> PathBuf {
	let mut stack: Vec<OsString> = Vec::new();
	let mut prefix: Option<OsString> = None;
	let mut absolute = false;
	for component in path.components() {
		match component {
			Component::Prefix(prefix_component) => {
				prefix = Some(prefix_component.as_os_str().to_os_string());
			}
			Component::RootDir => {
				absolute = true;
				stack.clear();
			}
			Component::CurDir => {}
			Component::ParentDir => {
				if stack.last().map(|last| last != "..").unwrap_or(false) {
					stack.pop();
				}
				else if !absolute {
					stack.push(OsString::from(".."));
				}
			}
			Component::Normal(part) => stack.push(part.to_os_string()),
		}
	}
	let mut out = PathBuf::new();
	if let Some(prefix) = prefix {
		out.push(prefix);
	}
	if absolute {
		out.push(Component::RootDir.as_os_str());
	}
	for part in stack {
		out.push(part);
	}
	out
}
