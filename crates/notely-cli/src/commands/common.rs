use std::sync::Arc;

use chrono::{DateTime, Utc};
use notely_core::api::NotesApiClient;
use notely_core::context::{NotesContext, WriteMode};
use notely_core::sync::{FileStore, ProcessOutcome, SyncOperation};
use notely_core::{Note, NoteId};
use serde::Serialize;

use crate::config::Settings;
use crate::error::CliError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteListItem {
    pub id: String,
    pub title: String,
    pub body: String,
    pub created_at: String,
    pub archived: bool,
    pub relative_time: String,
    pub unsynced: bool,
}

/// Build the services for one invocation: HTTP client plus file-backed queue.
pub fn open_context(settings: &Settings) -> Result<NotesContext, CliError> {
    let api = NotesApiClient::from_config(&settings.client)?;
    let storage = FileStore::new(settings.data_dir.clone());
    tracing::debug!(
        api = %settings.client.api_base_url,
        data_dir = %settings.data_dir.display(),
        "Opened notes context"
    );
    Ok(NotesContext::new(Arc::new(api), Arc::new(storage)))
}

pub fn format_note_lines(notes: &[Note]) -> Vec<String> {
    let now = Utc::now();
    notes
        .iter()
        .map(|note| {
            let id = note.id.to_string();
            let preview = note_preview(note, 40);
            let relative_time = format_relative_time(note.created_at, now);
            if note.archived {
                format!("{id:<24}  {preview:<40}  {relative_time:<10}  [archived]")
            } else {
                format!("{id:<24}  {preview:<40}  {relative_time}")
            }
        })
        .collect()
}

pub fn format_note_detail(note: &Note) -> String {
    let mut lines = vec![
        format!("id:       {}", note.id),
        format!("title:    {}", note.title),
        format!(
            "created:  {}",
            note.created_at.format("%Y-%m-%d %H:%M:%S UTC")
        ),
        format!("archived: {}", note.archived),
    ];
    if note.id.is_local() {
        lines.push("status:   waiting for sync".to_string());
    }
    lines.push(String::new());
    lines.push(note.body.clone());
    lines.join("\n")
}

pub fn note_to_list_item(note: &Note) -> NoteListItem {
    NoteListItem {
        id: note.id.to_string(),
        title: note.title.clone(),
        body: note.body.clone(),
        created_at: note.created_at.to_rfc3339(),
        archived: note.archived,
        relative_time: format_relative_time(note.created_at, Utc::now()),
        unsynced: note.id.is_local(),
    }
}

pub fn note_preview(note: &Note, max_chars: usize) -> String {
    let source = note.preview(usize::MAX);
    let collapsed = source.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = collapsed.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

pub fn format_relative_time(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let diff = (now - timestamp).num_milliseconds().max(0);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

pub fn format_queue_lines(operations: &[SyncOperation]) -> Vec<String> {
    operations
        .iter()
        .map(|operation| {
            let target = operation
                .data
                .get("id")
                .or_else(|| operation.data.get("title"))
                .and_then(serde_json::Value::as_str)
                .unwrap_or("-");
            format!(
                "{}  {:<9}  {target}  retries={}  queued={}",
                operation.id,
                operation.kind.as_str(),
                operation.retries,
                operation.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
            )
        })
        .collect()
}

pub fn format_outcome(outcome: &ProcessOutcome) -> String {
    match outcome {
        ProcessOutcome::Skipped => "Sync already in progress".to_string(),
        ProcessOutcome::Drained { applied: 0 } => "Nothing to sync".to_string(),
        ProcessOutcome::Drained { applied } => format!("Synced {applied} operation(s)"),
        ProcessOutcome::Stalled {
            applied,
            operation_id,
            retries,
            dropped: true,
            error,
        } => format!(
            "Synced {applied} operation(s); dropped operation {operation_id} after {retries} attempts: {error}"
        ),
        ProcessOutcome::Stalled {
            applied,
            operation_id,
            retries,
            error,
            ..
        } => format!(
            "Synced {applied} operation(s); operation {operation_id} failed (attempt {retries}): {error}"
        ),
    }
}

pub const fn describe_write(mode: WriteMode) -> &'static str {
    match mode {
        WriteMode::Synced => "",
        WriteMode::Queued => " (offline, queued for sync)",
    }
}

pub fn resolve_body(body_parts: &[String]) -> String {
    body_parts.join(" ").trim().to_string()
}

pub fn normalize_note_identifier(id: &str) -> Result<NoteId, CliError> {
    id.parse::<NoteId>().map_err(|_| CliError::EmptyNoteId)
}
