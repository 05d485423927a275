use crate::error::{FsError, Result};
use crate::resolver::AllowedRoots;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edit {
	pub old_text: String,
	pub new_text: String,
}

#[derive(Debug, Default, Serialize)]
pub struct EditOutcome {
	pub diff: String,
	pub changed: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub preview: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub ok: Option<bool>,
}

/// Result of running the edits over a line sequence, before anything is written.
#[derive(Debug, PartialEq, Eq)]
pub struct Patched {
	pub lines: Vec<String>,
	pub diff: String,
	pub changed: bool,
}

/// Applies `edits` in order. Every line containing an edit's old text has all
/// occurrences replaced; each changed line adds a `-old`/`+new` pair to the
/// diff and an edit that matches nothing adds a `~ not found` note.
pub fn apply_edits(content: &str, edits: &[Edit]) -> Patched {
	let mut lines: Vec<String> = content.split('\n')
		.map(str::to_string)
		.collect();
	let mut diff = String::new();
	let mut changed = false;
	for edit in edits {
		let mut matched = false;
		for line in lines.iter_mut() {
			if !line.contains(&edit.old_text) {
				continue;
			}
			matched = true;
			let updated = line.replace(&edit.old_text, &edit.new_text);
			if updated != *line {
				changed = true;
				diff.push_str(&format!("-{}\n+{}\n", line, updated));
				*line = updated;
			}
		}
		if !matched {
			diff.push_str(&format!("~ not found: {:?}\n", edit.old_text));
		}
	}
	Patched {
		lines,
		diff,
		changed
	}
}

pub async fn edit_file(roots: &AllowedRoots, path: &str, edits: &[Edit], dry_run: bool) -> Result<EditOutcome> {
	let resolved = roots.resolve(path)?;
	let target = resolved.as_path();
	let existing = tokio::fs::read_to_string(target).await.map_err(|err| FsError::io("read", target, err))?;
	let patched = apply_edits(&existing, edits);
	let updated = patched.lines.join("\n");
	let mut outcome = EditOutcome {
		diff: patched.diff,
		changed: patched.changed,
		..EditOutcome::default()
	};
	if dry_run {
		outcome.preview = Some(updated);
		return Ok(outcome);
	}
	if patched.changed {
		tokio::fs::write(target, updated).await.map_err(|err| FsError::io("write", target, err))?;
	}
	outcome.ok = Some(patched.changed);
	Ok(outcome)
}
