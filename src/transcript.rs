//! Local conversation transcripts.
//!
//! The app keeps the SceneBot conversation on screen and in device storage;
//! this is the crate's counterpart: one JSON file per conversation under
//! `<root>/<profile>/`, named so the list sorts chronologically.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::Utc;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

pub const ROLE_USER: &str = "user";
pub const ROLE_BOT: &str = "bot";

/// One side of an exchange, as stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptMessage {
    pub role: String,
    pub timestamp: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
}

fn is_safe_component(component: &str) -> bool {
    if component.is_empty() || component.len() > 255 {
        return false;
    }

    let pattern = Regex::new(r"^[\w.-]+$").unwrap();
    pattern.is_match(component)
}

fn sanitize_component(component: &str) -> Result<String> {
    let sanitized = Path::new(component)
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow::anyhow!("invalid path component: {}", component))?
        .to_string();

    if !is_safe_component(&sanitized) {
        return Err(anyhow::anyhow!("invalid characters in path component: {}", component));
    }

    Ok(sanitized)
}

fn profile_dir(root: &Path, profile: &str) -> Result<PathBuf> {
    Ok(root.join(sanitize_component(profile)?))
}

fn transcript_path(root: &Path, profile: &str, transcript_uid: &str) -> Result<PathBuf> {
    let dir = profile_dir(root, profile)?;
    let full_path = dir.join(format!("{}.json", sanitize_component(transcript_uid)?));

    // Both components were reduced to bare file names above; this guards the
    // join itself.
    if !full_path.starts_with(&dir) {
        return Err(anyhow::anyhow!("path escapes the transcript root"));
    }

    Ok(full_path)
}

/// Start a new transcript and return its uid
/// (`YYYY-MM-DD_HH-MM-SS_<uuid>`, so file listings sort by age).
pub fn create_transcript(root: &Path, profile: &str) -> Result<String> {
    let dir = profile_dir(root, profile)?;
    fs::create_dir_all(&dir)?;

    let now = Utc::now();
    let transcript_uid = format!(
        "{}_{}",
        now.format("%Y-%m-%d_%H-%M-%S"),
        Uuid::new_v4().as_simple()
    );

    let head = vec![serde_json::json!({
        "role": "metadata",
        "timestamp": now.to_rfc3339(),
    })];
    let path = dir.join(format!("{}.json", transcript_uid));
    fs::write(&path, serde_json::to_string_pretty(&head)?)?;
    debug!("created transcript {:?}", path);

    Ok(transcript_uid)
}

/// Append one message to an existing transcript.
pub fn append_message(
    root: &Path,
    profile: &str,
    transcript_uid: &str,
    role: &str,
    content: &str,
    lang: Option<&str>,
) -> Result<()> {
    let path = transcript_path(root, profile, transcript_uid)?;

    let mut entries: Vec<serde_json::Value> = if path.exists() {
        serde_json::from_str(&fs::read_to_string(&path)?)?
    } else {
        Vec::new()
    };

    entries.push(serde_json::json!({
        "role": role,
        "timestamp": Utc::now().to_rfc3339(),
        "content": content,
        "lang": lang,
    }));

    fs::write(&path, serde_json::to_string_pretty(&entries)?)?;
    Ok(())
}

/// Load a transcript's messages, skipping the metadata head entry.
pub fn load_transcript(root: &Path, profile: &str, transcript_uid: &str) -> Result<Vec<TranscriptMessage>> {
    let path = transcript_path(root, profile, transcript_uid)?;
    if !path.exists() {
        return Ok(Vec::new());
    }

    let entries: Vec<serde_json::Value> = serde_json::from_str(&fs::read_to_string(&path)?)?;

    let mut messages = Vec::new();
    for entry in entries {
        if entry.get("role").and_then(|r| r.as_str()) == Some("metadata") {
            continue;
        }
        if let Ok(message) = serde_json::from_value::<TranscriptMessage>(entry) {
            messages.push(message);
        }
    }

    Ok(messages)
}

/// List a profile's transcript uids, newest first.
pub fn list_transcripts(root: &Path, profile: &str) -> Result<Vec<String>> {
    let dir = profile_dir(root, profile)?;
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut uids = Vec::new();
    for entry in fs::read_dir(&dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension() == Some(std::ffi::OsStr::new("json")) {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                uids.push(stem.to_string());
            }
        }
    }

    uids.sort();
    uids.reverse();
    Ok(uids)
}

/// Delete one transcript; deleting a missing one is not an error.
pub fn delete_transcript(root: &Path, profile: &str, transcript_uid: &str) -> Result<()> {
    let path = transcript_path(root, profile, transcript_uid)?;
    if path.exists() {
        fs::remove_file(&path)?;
        debug!("deleted transcript {:?}", path);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_and_load_round_trip_skips_metadata() {
        let dir = tempfile::tempdir().expect("tempdir");
        let uid = create_transcript(dir.path(), "ada").expect("create");

        append_message(dir.path(), "ada", &uid, ROLE_USER, "any heist movies?", Some("english"))
            .expect("append");
        append_message(dir.path(), "ada", &uid, ROLE_BOT, "Try Heat (1995).", None).expect("append");

        let messages = load_transcript(dir.path(), "ada", &uid).expect("load");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, ROLE_USER);
        assert_eq!(messages[0].lang.as_deref(), Some("english"));
        assert_eq!(messages[1].content, "Try Heat (1995).");
    }

    #[test]
    fn list_and_delete() {
        let dir = tempfile::tempdir().expect("tempdir");
        let first = create_transcript(dir.path(), "ada").expect("create");
        let second = create_transcript(dir.path(), "ada").expect("create");

        let uids = list_transcripts(dir.path(), "ada").expect("list");
        assert_eq!(uids.len(), 2);
        assert!(uids.contains(&first));
        assert!(uids.contains(&second));

        delete_transcript(dir.path(), "ada", &first).expect("delete");
        let uids = list_transcripts(dir.path(), "ada").expect("list");
        assert_eq!(uids, vec![second]);

        // Deleting twice is fine.
        delete_transcript(dir.path(), "ada", &first).expect("delete again");
    }

    #[test]
    fn empty_profile_lists_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(list_transcripts(dir.path(), "nobody").expect("list").is_empty());
    }

    #[test]
    fn path_components_are_sanitized() {
        let dir = tempfile::tempdir().expect("tempdir");

        // Bare traversal components cannot name a file at all.
        assert!(create_transcript(dir.path(), "..").is_err());
        assert!(create_transcript(dir.path(), "").is_err());
        assert!(append_message(dir.path(), "ada", "..", ROLE_USER, "hi", None).is_err());

        // Directory-qualified names are reduced to their final component, so
        // nothing lands outside the root.
        let uid = create_transcript(dir.path(), "../outside").expect("create");
        assert_eq!(list_transcripts(dir.path(), "outside").expect("list"), vec![uid]);
    }
}
