use notely_core::context::NotesContext;
use notely_core::filters::{sort_notes, SortOrder};
use notely_core::Note;

use crate::commands::common::{format_note_lines, note_to_list_item, NoteListItem};
use crate::error::CliError;

pub async fn list_notes(
    context: &NotesContext,
    archived: bool,
    query: Option<&str>,
    order: SortOrder,
) -> Result<Vec<Note>, CliError> {
    match context.refresh().await {
        Ok(_) => {}
        Err(error) if error.is_transport() => {
            tracing::warn!("Showing local notes only, API unreachable: {error}");
        }
        Err(error) => return Err(error.into()),
    }
    let mut notes = match query {
        Some(query) => context.search(query, archived),
        None => context.list(archived),
    };
    sort_notes(&mut notes, order);
    Ok(notes)
}

pub async fn run_list(
    context: &NotesContext,
    archived: bool,
    query: Option<&str>,
    order: SortOrder,
    as_json: bool,
) -> Result<(), CliError> {
    let notes = list_notes(context, archived, query, order).await?;

    if as_json {
        let json_items = notes
            .iter()
            .map(note_to_list_item)
            .collect::<Vec<NoteListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else if notes.is_empty() {
        println!("No notes found.");
    } else {
        for line in format_note_lines(&notes) {
            println!("{line}");
        }
    }

    Ok(())
}
