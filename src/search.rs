use crate::fs::TextContent;
use crate::resolver::AllowedRoots;
use anyhow::{anyhow, Result};
use globset::{GlobBuilder, GlobMatcher, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use std::path::{Component, Path};

pub const NO_MATCHES: &str = "No matches found";

/// Recursive name search below `path`.
///
/// Never fails outright: an unresolvable start path or a bad glob comes back
/// as a soft error payload, and entries the walker cannot read are skipped.
/// The start directory is a candidate too and is reported as `.`.
pub fn search_files(roots: &AllowedRoots, path: &str, pattern: &str, exclude: &[String]) -> TextContent {
	let start = match roots.resolve(path) {
		Ok(resolved) => resolved,
		Err(err) => return TextContent::error(err),
	};
	let matcher = match build_matcher(pattern) {
		Ok(matcher) => matcher,
		Err(err) => return TextContent::error(err),
	};
	let exclude_set = match build_exclude_set(exclude) {
		Ok(set) => set,
		Err(err) => return TextContent::error(err),
	};
	let matches = walk_matches(roots, start.as_path(), &matcher, exclude_set.as_ref());
	if matches.is_empty() {
		return TextContent::text(NO_MATCHES.to_string());
	}
	TextContent::text(matches.join("\n"))
}

fn walk_matches(roots: &AllowedRoots, start: &Path, matcher: &GlobMatcher, exclude: Option<&GlobSet>) -> Vec<String> {
	let mut builder = WalkBuilder::new(start);
	builder.standard_filters(false);
	builder.follow_links(false);
	let mut matches = Vec::new();
	for entry in builder.build() {
		let entry = match entry {
			Ok(entry) => entry,
			Err(err) => {
				tracing::debug!(error = %err, "skipping unreadable entry");
				continue;
			}
		};
		let path = entry.path();
		if !roots.contains(path) {
			continue;
		}
		let Some(file_name) = path.file_name().map(|name| name.to_string_lossy()) else {
			continue;
		};
		if !matcher.is_match(&*file_name) {
			continue;
		}
		let rel = relative_display(start, path);
		if let Some(excludes) = exclude {
			if excludes.is_match(&rel) {
				continue;
			}
		}
		matches.push(rel);
	}
	matches
}

/// `/`-separated path of `path` below `start`; the start itself is `.`.
fn relative_display(start: &Path, path: &Path) -> String {
	let Ok(rel) = path.strip_prefix(start) else {
		return path.to_string_lossy().to_string();
	};
	if rel.as_os_str().is_empty() {
		return ".".to_string();
	}
	rel.components()
		.filter_map(|component| match component {
			Component::Normal(part) => Some(part.to_string_lossy()),
			_ => None,
		})
		.collect::<Vec<_>>()
		.join("/")
}

fn build_matcher(pattern: &str) -> Result<GlobMatcher> {
	let glob = GlobBuilder::new(pattern)
		.literal_separator(true)
		.build()
		.map_err(|err| anyhow!("invalid pattern: {}", err))?;
	Ok(glob.compile_matcher())
}

fn build_exclude_set(patterns: &[String]) -> Result<Option<GlobSet>> {
	if patterns.is_empty() {
		return Ok(None);
	}
	let mut builder = GlobSetBuilder::new();
	for pattern in patterns {
		let glob = GlobBuilder::new(pattern)
			.literal_separator(true)
			.build()
			.map_err(|err| anyhow!("invalid exclude pattern: {}", err))?;
		builder.add(glob);
	}
	Ok(Some(builder.build().map_err(|err| anyhow!("invalid exclude set: {}", err))?))
}
