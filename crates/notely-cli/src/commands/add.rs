use notely_core::context::NotesContext;
use notely_core::NoteDraft;

use crate::commands::common::{describe_write, resolve_body};
use crate::error::CliError;

pub async fn run_add(
    context: &NotesContext,
    title: &str,
    body_parts: &[String],
) -> Result<(), CliError> {
    let draft = NoteDraft::new(title, resolve_body(body_parts))?;
    let created = context.create(&draft).await?;

    println!("{}{}", created.value.id, describe_write(created.mode));
    Ok(())
}
