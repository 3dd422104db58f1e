use notely_core::context::NotesContext;

use crate::commands::common::{describe_write, normalize_note_identifier};
use crate::error::CliError;

pub async fn run_archive(context: &NotesContext, id: &str) -> Result<(), CliError> {
    let id = normalize_note_identifier(id)?;
    let result = context.archive(&id).await?;
    println!("{id}{}", describe_write(result.mode));
    Ok(())
}

pub async fn run_unarchive(context: &NotesContext, id: &str) -> Result<(), CliError> {
    let id = normalize_note_identifier(id)?;
    let result = context.unarchive(&id).await?;
    println!("{id}{}", describe_write(result.mode));
    Ok(())
}
