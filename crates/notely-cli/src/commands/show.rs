use notely_core::context::NotesContext;

use crate::commands::common::{format_note_detail, normalize_note_identifier, note_to_list_item};
use crate::error::CliError;

pub async fn run_show(context: &NotesContext, id: &str, as_json: bool) -> Result<(), CliError> {
    let id = normalize_note_identifier(id)?;
    let note = context.get(&id).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&note_to_list_item(&note))?);
    } else {
        println!("{}", format_note_detail(&note));
    }
    Ok(())
}
