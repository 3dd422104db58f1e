use notely_core::context::NotesContext;
use notely_core::NoteDraft;

use crate::commands::common::{describe_write, normalize_note_identifier};
use crate::error::CliError;

pub async fn run_edit(
    context: &NotesContext,
    id: &str,
    title: Option<String>,
    body: Option<String>,
) -> Result<(), CliError> {
    if title.is_none() && body.is_none() {
        return Err(CliError::NothingToEdit);
    }
    let id = normalize_note_identifier(id)?;

    let current = match context.get(&id).await {
        Ok(note) => Some(NoteDraft {
            title: note.title,
            body: note.body,
        }),
        Err(error) if error.is_transport() => {
            tracing::debug!(%id, "Note lookup failed offline: {error}");
            context.pending_draft(&id)
        }
        Err(error) => return Err(error.into()),
    };

    let draft = match (title, body, current) {
        (Some(title), Some(body), _) => NoteDraft::new(title, body)?,
        (title, body, Some(current)) => NoteDraft::new(
            title.unwrap_or(current.title),
            body.unwrap_or(current.body),
        )?,
        _ => return Err(CliError::OfflineEditIncomplete(id.to_string())),
    };
    let updated = context.update(&id, &draft).await?;

    println!("{}{}", updated.value.id, describe_write(updated.mode));
    Ok(())
}
