use notely_core::context::NotesContext;

use crate::commands::common::format_outcome;
use crate::error::CliError;

pub async fn run_sync(context: &NotesContext) -> Result<(), CliError> {
    let outcome = context.sync().await;
    println!("{}", format_outcome(&outcome));
    Ok(())
}
