use crate::error::{FsError, Result};
use crate::resolver::{AllowedRoots, ResolvedPath};
use chrono::{DateTime, Local, SecondsFormat};
use serde::Serialize;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use tokio::fs;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
	File,
	Directory,
}

impl EntryKind {
	fn from_dir(is_dir: bool) -> Self {
		if is_dir {
			EntryKind::Directory
		}
		else {
			EntryKind::File
		}
	}
}

#[derive(Debug, Serialize)]
pub struct DirectoryEntry {
	pub name: String,
	#[serde(rename = "type")]
	pub kind: EntryKind,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub size: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct Listing {
	pub entries: Vec<DirectoryEntry>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SizedListing {
	pub entries: Vec<DirectoryEntry>,
	pub total_files: u64,
	pub total_dirs: u64,
	pub total_size: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortBy {
	Name,
	Size,
}

impl SortBy {
	/// Anything but `"size"` sorts by name.
	pub fn parse(value: Option<&str>) -> Self {
		match value {
			Some("size") => SortBy::Size,
			_ => SortBy::Name,
		}
	}
}

#[derive(Debug, Serialize)]
pub struct TreeNode {
	pub name: String,
	#[serde(rename = "type")]
	pub kind: EntryKind,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub children: Option<Vec<TreeNode>>,
}

#[derive(Debug, Serialize)]
pub struct Tree {
	pub tree: TreeNode,
}

#[derive(Debug, Serialize)]
pub struct FileContent {
	pub content: String,
}

#[derive(Debug, Serialize)]
pub struct Done {
	pub ok: bool,
}

impl Done {
	fn ok() -> Self {
		Self {
			ok: true
		}
	}
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
	pub size: u64,
	pub mode: String,
	pub mod_time: String,
	pub is_dir: bool,
	pub name: String,
	pub creation_time: String,
	pub access_time: String,
	pub permissions: String,
}

#[derive(Debug, Serialize)]
pub struct TextBlock {
	#[serde(rename = "type")]
	pub kind: &'static str,
	pub text: String,
}

/// Text payload shared by search and batch reads; `isError` marks a soft error.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextContent {
	pub content: Vec<TextBlock>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub is_error: Option<bool>,
}

impl TextContent {
	pub fn text(text: String) -> Self {
		Self {
			content: vec![TextBlock {
				kind: "text",
				text
			}],
			is_error: None
		}
	}

	pub fn error(message: impl std::fmt::Display) -> Self {
		Self {
			content: vec![TextBlock {
				kind: "text",
				text: format!("Error: {}", message)
			}],
			is_error: Some(true)
		}
	}

	pub fn is_soft_error(&self) -> bool {
		self.is_error.unwrap_or(false)
	}
}

#[derive(Debug, Serialize)]
pub struct AllowedDirectories {
	pub directories: Vec<String>,
}

pub async fn list_directory(roots: &AllowedRoots, path: &str) -> Result<Listing> {
	let resolved = roots.resolve(path)?;
	let dir = resolved.as_path();
	let mut entries = Vec::new();
	let mut reader = fs::read_dir(dir).await.map_err(|err| FsError::io("read directory", dir, err))?;
	while let Some(entry) = reader.next_entry().await.map_err(|err| FsError::io("read directory", dir, err))? {
		let is_dir = entry.file_type()
			.await
			.map(|kind| kind.is_dir())
			.unwrap_or(false);
		entries.push(DirectoryEntry {
			name: entry.file_name().to_string_lossy().to_string(),
			kind: EntryKind::from_dir(is_dir),
			size: None
		});
	}
	Ok(Listing {
		entries
	})
}

pub async fn list_directory_with_sizes(roots: &AllowedRoots, path: &str, sort_by: SortBy) -> Result<SizedListing> {
	let resolved = roots.resolve(path)?;
	let dir = resolved.as_path();
	let mut entries = Vec::new();
	let mut reader = fs::read_dir(dir).await.map_err(|err| FsError::io("read directory", dir, err))?;
	while let Some(entry) = reader.next_entry().await.map_err(|err| FsError::io("read directory", dir, err))? {
		let is_dir = entry.file_type()
			.await
			.map(|kind| kind.is_dir())
			.unwrap_or(false);
		let size = if is_dir {
			0
		}
		else {
			fs::metadata(entry.path())
				.await
				.map(|meta| meta.len())
				.unwrap_or(0)
		};
		entries.push(DirectoryEntry {
			name: entry.file_name().to_string_lossy().to_string(),
			kind: EntryKind::from_dir(is_dir),
			size: Some(size)
		});
	}
	match sort_by {
		SortBy::Size => entries.sort_by(|a, b| b.size
			.cmp(&a.size)
			.then_with(|| a.name.cmp(&b.name))),
		SortBy::Name => entries.sort_by(|a, b| a.name.cmp(&b.name)),
	}
	let mut total_files = 0u64;
	let mut total_dirs = 0u64;
	let mut total_size = 0u64;
	for entry in &entries {
		match entry.kind {
			EntryKind::Directory => total_dirs += 1,
			EntryKind::File => {
				total_files += 1;
				total_size += entry.size.unwrap_or(0);
			}
		}
	}
	Ok(SizedListing {
		entries,
		total_files,
		total_dirs,
		total_size
	})
}

pub async fn create_directory(roots: &AllowedRoots, path: &str) -> Result<Done> {
	let resolved = roots.resolve(path)?;
	fs::create_dir_all(resolved.as_path()).await.map_err(|err| FsError::io("create directory", resolved.as_path(), err))?;
	Ok(Done::ok())
}

pub async fn directory_tree(roots: &AllowedRoots, path: &str) -> Result<Tree> {
	let resolved = roots.resolve(path)?;
	let start = resolved.as_path();
	let meta = fs::metadata(start).await.map_err(|err| FsError::io("stat", start, err))?;
	let name = base_name(start);
	if !meta.is_dir() {
		return Ok(Tree {
			tree: TreeNode {
				name,
				kind: EntryKind::File,
				children: None
			}
		});
	}
	let canonical = fs::canonicalize(start).await.unwrap_or_else(|_| start.to_path_buf());
	let children = build_children(start.to_path_buf(), vec![canonical]).await.map_err(|err| FsError::io("read directory", start, err))?;
	Ok(Tree {
		tree: TreeNode {
			name,
			kind: EntryKind::Directory,
			children: Some(children)
		}
	})
}

/// Children of `dir` in listing order.
///
/// Entries are typed through `metadata`, so a symlink to a directory is walked
/// like the directory itself and an entry that cannot be stat'ed (a dangling
/// link, say) is left out, as is a subdirectory that cannot be read.
/// `ancestors` holds the canonical directories on the current branch; a link
/// back into one of them is listed with no children instead of being walked
/// again.
fn build_children(dir: PathBuf, ancestors: Vec<PathBuf>) -> Pin<Box<dyn Future<Output = std::io::Result<Vec<TreeNode>>> + Send>> {
	Box::pin(
		async move {
			let mut children = Vec::new();
			let mut reader = fs::read_dir(&dir).await?;
			while let Some(entry) = reader.next_entry().await? {
				let path = entry.path();
				let Ok(meta) = fs::metadata(&path).await else {
					continue;
				};
				let name = entry.file_name().to_string_lossy().to_string();
				if !meta.is_dir() {
					children.push(TreeNode {
						name,
						kind: EntryKind::File,
						children: None
					});
					continue;
				}
				let canonical = fs::canonicalize(&path).await.unwrap_or_else(|_| path.clone());
				if ancestors.contains(&canonical) {
					tracing::debug!(path = %path.display(), "directory cycle");
					children.push(TreeNode {
						name,
						kind: EntryKind::Directory,
						children: Some(Vec::new())
					});
					continue;
				}
				let mut branch = ancestors.clone();
				branch.push(canonical);
				match build_children(path.clone(), branch).await {
					Ok(grandchildren) => children.push(TreeNode {
						name,
						kind: EntryKind::Directory,
						children: Some(grandchildren)
					}),
					Err(err) => {
						tracing::debug!(path = %path.display(), error = %err, "skipping subtree");
					}
				}
			}
			Ok(children)
		}
	)
}

pub async fn read_file(roots: &AllowedRoots, path: &str) -> Result<FileContent> {
	let resolved = roots.resolve(path)?;
	Ok(FileContent {
		content: read_text(&resolved).await?
	})
}

async fn read_text(resolved: &ResolvedPath) -> Result<String> {
	tracing::debug!(path = %resolved.as_path().display(), root = resolved.root_index(), "read");
	let bytes = fs::read(resolved.as_path()).await.map_err(|err| FsError::io("read", resolved.as_path(), err))?;
	Ok(match String::from_utf8(bytes) {
		Ok(text) => text,
		Err(err) => String::from_utf8_lossy(err.as_bytes()).into_owned(),
	})
}

pub async fn write_file(roots: &AllowedRoots, path: &str, content: &str) -> Result<Done> {
	let resolved = roots.resolve(path)?;
	fs::write(resolved.as_path(), content).await.map_err(|err| FsError::io("write", resolved.as_path(), err))?;
	Ok(Done::ok())
}

pub async fn get_file_info(roots: &AllowedRoots, path: &str) -> Result<FileInfo> {
	let resolved = roots.resolve(path)?;
	let target = resolved.as_path();
	let meta = fs::metadata(target).await.map_err(|err| FsError::io("stat", target, err))?;
	// creation and access times are not portable; both mirror the modification time
	let mod_time = meta.modified()
		.map(format_time)
		.unwrap_or_default();
	let (mode, permissions) = mode_strings(&meta);
	Ok(FileInfo {
		size: meta.len(),
		mode,
		mod_time: mod_time.clone(),
		is_dir: meta.is_dir(),
		name: base_name(target),
		creation_time: mod_time.clone(),
		access_time: mod_time,
		permissions
	})
}

pub async fn move_file(roots: &AllowedRoots, source: &str, destination: &str) -> Result<Done> {
	let from = roots.resolve(source)?;
	let to = roots.resolve(destination)?;
	if fs::symlink_metadata(to.as_path()).await.is_ok() {
		return Err(FsError::AlreadyExists(to.as_path().to_path_buf()));
	}
	fs::rename(from.as_path(), to.as_path()).await.map_err(|err| FsError::io("move", from.as_path(), err))?;
	Ok(Done::ok())
}

pub async fn delete_file(roots: &AllowedRoots, path: &str) -> Result<Done> {
	let resolved = roots.resolve(path)?;
	let target = resolved.as_path();
	let meta = match fs::symlink_metadata(target).await {
		Ok(meta) => meta,
		Err(err) => return Err(FsError::io("delete", target, err)),
	};
	let removed = if meta.is_dir() {
		fs::remove_dir_all(target).await
	}
	else {
		fs::remove_file(target).await
	};
	removed.map_err(|err| FsError::io("delete", target, err))?;
	Ok(Done::ok())
}

/// Reads each path independently; a failing path becomes an inline error
/// section and never aborts the batch.
pub async fn read_multiple_files(roots: &AllowedRoots, paths: &[String]) -> TextContent {
	let mut sections = Vec::with_capacity(paths.len());
	for path in paths {
		let text = match roots.resolve(path) {
			Ok(resolved) => read_text(&resolved).await,
			Err(err) => Err(err),
		};
		match text {
			Ok(text) => sections.push(format!("{}:\n{}", path, text)),
			Err(err) => sections.push(format!("{}: Error - {}", path, err)),
		}
	}
	TextContent::text(sections.join("\n---\n"))
}

pub fn list_allowed_directories(roots: &AllowedRoots) -> AllowedDirectories {
	AllowedDirectories {
		directories: roots.display_list()
	}
}

fn base_name(path: &Path) -> String {
	path.file_name()
		.map(|name| name.to_string_lossy().to_string())
		.unwrap_or_else(|| path.to_string_lossy().to_string())
}

fn format_time(time: std::time::SystemTime) -> String {
	DateTime::<Local>::from(time).to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Returns `(mode, permissions)`, e.g. `("drwxr-xr-x", "-rwxr-xr-x")`.
#[cfg(unix)]
fn mode_strings(meta: &std::fs::Metadata) -> (String, String) {
	use std::os::unix::fs::{FileTypeExt, PermissionsExt};
	let bits = meta.permissions().mode();
	let kind = meta.file_type();
	let type_char = if kind.is_dir() {
		'd'
	}
	else if kind.is_symlink() {
		'L'
	}
	else if kind.is_fifo() {
		'p'
	}
	else if kind.is_socket() {
		'S'
	}
	else if kind.is_char_device() {
		'c'
	}
	else if kind.is_block_device() {
		'D'
	}
	else {
		'-'
	};
	let rwx = rwx_string(bits);
	(format!("{}{}", type_char, rwx), format!("-{}", rwx))
}

#[cfg(not(unix))]
fn mode_strings(meta: &std::fs::Metadata) -> (String, String) {
	let bits = if meta.permissions().readonly() {
		0o444
	}
	else {
		0o666
	};
	let rwx = rwx_string(bits);
	let type_char = if meta.is_dir() {
		'd'
	}
	else {
		'-'
	};
	(format!("{}{}", type_char, rwx), format!("-{}", rwx))
}

fn rwx_string(bits: u32) -> String {
	const FLAGS: [(u32, char); 9] = [
		(0o400, 'r'),
		(0o200, 'w'),
		(0o100, 'x'),
		(0o040, 'r'),
		(0o020, 'w'),
		(0o010, 'x'),
		(0o004, 'r'),
		(0o002, 'w'),
		(0o001, 'x'),
	];
	FLAGS.iter()
		.map(|(mask, flag)| if bits & mask != 0 {
			*flag
		}
		else {
			'-'
		})
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	fn roots_for(dir: &Path) -> AllowedRoots {
		AllowedRoots::new(vec![dir.to_path_buf()])
	}

	fn write_text(path: &Path, contents: &str) {
		std::fs::create_dir_all(path.parent().expect("parent")).expect("create parent");
		std::fs::write(path, contents).expect("write file");
	}

	#[tokio::test]
	async fn write_then_read_round_trips() {
		let root = tempfile::tempdir().expect("tempdir");
		let roots = roots_for(root.path());
		let done = write_file(&roots, "file.txt", "hello\nworld\n").await.expect("write");
		assert!(done.ok);
		let read = read_file(&roots, "file.txt").await.expect("read");
		assert_eq!(read.content, "hello\nworld\n");
	}

	#[tokio::test]
	async fn read_missing_file_is_not_found() {
		let root = tempfile::tempdir().expect("tempdir");
		let roots = roots_for(root.path());
		let err = read_file(&roots, "nope.txt").await.expect_err("missing");
		assert!(matches!(err, FsError::NotFound(_)));
	}

	#[tokio::test]
	async fn operations_outside_roots_are_denied() {
		let root = tempfile::tempdir().expect("tempdir");
		let roots = roots_for(root.path());
		let err = read_file(&roots, "../outside.txt").await.expect_err("denied");
		assert!(matches!(err, FsError::AccessDenied(_)));
		let err = write_file(&roots, "/etc/evil", "x").await.expect_err("denied");
		assert!(matches!(err, FsError::AccessDenied(_)));
		let err = list_directory(&roots, "/").await.expect_err("denied");
		assert!(matches!(err, FsError::AccessDenied(_)));
	}

	#[tokio::test]
	async fn list_directory_tags_entries() {
		let root = tempfile::tempdir().expect("tempdir");
		write_text(&root.path().join("foo.txt"), "abc");
		std::fs::create_dir(root.path().join("nested")).expect("mkdir");
		let roots = roots_for(root.path());
		let listing = list_directory(&roots, ".").await.expect("list");
		assert_eq!(listing.entries.len(), 2);
		let nested = listing.entries
			.iter()
			.find(|entry| entry.name == "nested")
			.expect("nested");
		assert_eq!(nested.kind, EntryKind::Directory);
		let file = listing.entries
			.iter()
			.find(|entry| entry.name == "foo.txt")
			.expect("file");
		assert_eq!(file.kind, EntryKind::File);
		assert!(file.size.is_none());
	}

	#[tokio::test]
	async fn sized_listing_sorts_and_totals() {
		let root = tempfile::tempdir().expect("tempdir");
		write_text(&root.path().join("a.txt"), "abc");
		write_text(&root.path().join("b.txt"), "defg");
		write_text(&root.path().join("c.txt"), "");
		std::fs::create_dir(root.path().join("subdir")).expect("mkdir");
		let roots = roots_for(root.path());

		let by_size = list_directory_with_sizes(&roots, ".", SortBy::Size).await.expect("list");
		let sizes: Vec<u64> = by_size.entries
			.iter()
			.map(|entry| entry.size.unwrap_or(0))
			.collect();
		assert!(sizes.windows(2).all(|pair| pair[0] >= pair[1]));
		assert_eq!(by_size.entries[0].name, "b.txt");
		assert_eq!(by_size.total_files, 3);
		assert_eq!(by_size.total_dirs, 1);
		assert_eq!(by_size.total_size, 7);

		let by_name = list_directory_with_sizes(&roots, ".", SortBy::parse(Some("bogus"))).await.expect("list");
		let names: Vec<&str> = by_name.entries
			.iter()
			.map(|entry| entry.name.as_str())
			.collect();
		assert_eq!(names, vec!["a.txt", "b.txt", "c.txt", "subdir"]);
		let subdir = by_name.entries.last().expect("subdir");
		assert_eq!(subdir.size, Some(0));
	}

	#[tokio::test]
	async fn create_directory_is_recursive_and_idempotent() {
		let root = tempfile::tempdir().expect("tempdir");
		let roots = roots_for(root.path());
		create_directory(&roots, "foo/bar").await.expect("create");
		create_directory(&roots, "foo/bar").await.expect("create again");
		assert!(root.path().join("foo/bar").is_dir());
	}

	#[tokio::test]
	async fn tree_has_children_for_directories_only() {
		let root = tempfile::tempdir().expect("tempdir");
		write_text(&root.path().join("a.txt"), "abc");
		write_text(&root.path().join("subdir/b.txt"), "def");
		std::fs::create_dir(root.path().join("empty")).expect("mkdir");
		let roots = roots_for(root.path());
		let tree = directory_tree(&roots, ".").await.expect("tree").tree;
		assert_eq!(tree.kind, EntryKind::Directory);
		let children = tree.children
			.as_ref()
			.expect("children");
		assert_eq!(children.len(), 3);
		let subdir = children.iter()
			.find(|node| node.name == "subdir")
			.expect("subdir");
		assert_eq!(subdir.kind, EntryKind::Directory);
		let nested = subdir.children
			.as_ref()
			.expect("subdir children");
		assert_eq!(nested.len(), 1);
		assert_eq!(nested[0].name, "b.txt");
		assert!(nested[0].children.is_none());
		let empty = children.iter()
			.find(|node| node.name == "empty")
			.expect("empty");
		assert_eq!(empty.children.as_ref().map(Vec::len), Some(0));

		let json = serde_json::to_value(&tree).expect("json");
		let file = json["children"]
			.as_array()
			.expect("array")
			.iter()
			.find(|node| node["name"] == "a.txt")
			.expect("a.txt");
		assert!(file.get("children").is_none());
		assert_eq!(file["type"], "file");
	}

	#[cfg(unix)]
	#[tokio::test]
	async fn tree_follows_symlinks_and_drops_dangling_ones() {
		let root = tempfile::tempdir().expect("tempdir");
		write_text(&root.path().join("real/f.txt"), "x");
		std::os::unix::fs::symlink(root.path().join("real"), root.path().join("link")).expect("link");
		std::os::unix::fs::symlink(root.path().join("nowhere"), root.path().join("dangling")).expect("dangling");
		std::os::unix::fs::symlink(root.path(), root.path().join("loop")).expect("loop");
		let roots = roots_for(root.path());
		let tree = directory_tree(&roots, ".").await.expect("tree").tree;
		let children = tree.children.expect("children");
		let names: Vec<&str> = children.iter()
			.map(|node| node.name.as_str())
			.collect();
		assert!(!names.contains(&"dangling"));
		let link = children.iter()
			.find(|node| node.name == "link")
			.expect("link");
		assert_eq!(link.kind, EntryKind::Directory);
		let linked = link.children
			.as_ref()
			.expect("link children");
		assert_eq!(linked.len(), 1);
		assert_eq!(linked[0].name, "f.txt");
		let cycle = children.iter()
			.find(|node| node.name == "loop")
			.expect("loop");
		assert_eq!(cycle.kind, EntryKind::Directory);
		assert_eq!(cycle.children.as_ref().map(Vec::len), Some(0));
	}

	#[cfg(unix)]
	#[tokio::test]
	async fn tree_skips_unreadable_subdirectories() {
		use std::os::unix::fs::PermissionsExt;
		let root = tempfile::tempdir().expect("tempdir");
		write_text(&root.path().join("a.txt"), "abc");
		write_text(&root.path().join("open/b.txt"), "def");
		write_text(&root.path().join("locked/c.txt"), "ghi");
		let locked = root.path().join("locked");
		std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o000)).expect("chmod");
		let denied = std::fs::read_dir(&locked).is_err();
		let roots = roots_for(root.path());
		let result = directory_tree(&roots, ".").await;
		std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).expect("chmod back");
		let children = result.expect("tree").tree.children.expect("children");
		let names: Vec<&str> = children.iter()
			.map(|node| node.name.as_str())
			.collect();
		assert!(names.contains(&"a.txt"));
		assert!(names.contains(&"open"));
		if denied {
			assert!(!names.contains(&"locked"));
		}
	}

	#[tokio::test]
	async fn invalid_utf8_is_read_lossily() {
		let root = tempfile::tempdir().expect("tempdir");
		std::fs::write(root.path().join("bin.dat"), b"ok\xff").expect("write");
		let roots = roots_for(root.path());
		let read = read_file(&roots, "bin.dat").await.expect("read");
		assert_eq!(read.content, "ok\u{FFFD}");
	}

	#[tokio::test]
	async fn file_info_reports_metadata() {
		let root = tempfile::tempdir().expect("tempdir");
		write_text(&root.path().join("f.txt"), "x");
		let roots = roots_for(root.path());
		let info = get_file_info(&roots, "f.txt").await.expect("info");
		assert_eq!(info.name, "f.txt");
		assert_eq!(info.size, 1);
		assert!(!info.is_dir);
		assert!(info.mode.starts_with('-'));
		assert_eq!(info.permissions.len(), 10);
		assert_eq!(info.creation_time, info.mod_time);
		assert_eq!(info.access_time, info.mod_time);
		assert!(DateTime::parse_from_rfc3339(&info.mod_time).is_ok());

		let dir_info = get_file_info(&roots, ".").await.expect("dir info");
		assert!(dir_info.is_dir);
		assert!(dir_info.mode.starts_with('d'));
	}

	#[tokio::test]
	async fn move_refuses_existing_destination() {
		let root = tempfile::tempdir().expect("tempdir");
		write_text(&root.path().join("a.txt"), "1");
		write_text(&root.path().join("b.txt"), "2");
		let roots = roots_for(root.path());
		let err = move_file(&roots, "a.txt", "b.txt").await.expect_err("exists");
		assert!(matches!(err, FsError::AlreadyExists(_)));
		assert_eq!(std::fs::read_to_string(root.path().join("b.txt")).expect("b"), "2");

		move_file(&roots, "a.txt", "c.txt").await.expect("move");
		assert!(!root.path().join("a.txt").exists());
		assert_eq!(std::fs::read_to_string(root.path().join("c.txt")).expect("c"), "1");
	}

	#[tokio::test]
	async fn move_checks_both_paths() {
		let root = tempfile::tempdir().expect("tempdir");
		write_text(&root.path().join("a.txt"), "1");
		let roots = roots_for(root.path());
		let err = move_file(&roots, "a.txt", "../escaped.txt").await.expect_err("denied");
		assert!(matches!(err, FsError::AccessDenied(_)));
		assert!(root.path().join("a.txt").exists());
	}

	#[tokio::test]
	async fn delete_removes_and_reports_missing() {
		let root = tempfile::tempdir().expect("tempdir");
		write_text(&root.path().join("del.txt"), "x");
		write_text(&root.path().join("tree/inner/file.txt"), "y");
		let roots = roots_for(root.path());
		delete_file(&roots, "del.txt").await.expect("delete file");
		assert!(!root.path().join("del.txt").exists());
		let err = get_file_info(&roots, "del.txt").await.expect_err("gone");
		assert!(matches!(err, FsError::NotFound(_)));

		delete_file(&roots, "tree").await.expect("delete dir");
		assert!(!root.path().join("tree").exists());

		let err = delete_file(&roots, "doesnotexist.txt").await.expect_err("missing");
		assert!(matches!(err, FsError::NotFound(_)));
	}

	#[tokio::test]
	async fn read_multiple_files_collects_inline_errors() {
		let root = tempfile::tempdir().expect("tempdir");
		write_text(&root.path().join("a.txt"), "A");
		write_text(&root.path().join("b.txt"), "B");
		let roots = roots_for(root.path());
		let paths = vec![
			"a.txt".to_string(),
			"b.txt".to_string(),
			"missing.txt".to_string(),
			"../outside.txt".to_string(),
		];
		let result = read_multiple_files(&roots, &paths).await;
		assert!(!result.is_soft_error());
		let text = &result.content[0].text;
		assert!(text.contains("a.txt:\nA"));
		assert!(text.contains("b.txt:\nB"));
		assert!(text.contains("missing.txt: Error - "));
		assert!(text.contains("../outside.txt: Error - access denied"));
		assert_eq!(text.matches("\n---\n").count(), 3);

		let empty = read_multiple_files(&roots, &[]).await;
		assert_eq!(empty.content[0].text, "");
	}

	#[test]
	fn allowed_directories_are_listed_in_order() {
		let roots = AllowedRoots::new(vec![PathBuf::from("/srv/one"), PathBuf::from("/srv/two")]);
		let listed = list_allowed_directories(&roots);
		assert_eq!(listed.directories.len(), 2);
		assert!(listed.directories[0].ends_with("one"));
	}

	#[test]
	fn rwx_renders_permission_bits() {
		assert_eq!(rwx_string(0o755), "rwxr-xr-x");
		assert_eq!(rwx_string(0o640), "rw-r-----");
	}
}
