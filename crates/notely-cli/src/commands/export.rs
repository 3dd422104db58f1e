use std::path::Path;

use notely_core::context::NotesContext;
use notely_core::export::render_notes_export;

use crate::cli::ExportFormat;
use crate::error::CliError;

pub async fn run_export(
    context: &NotesContext,
    format: ExportFormat,
    output_path: Option<&Path>,
) -> Result<(), CliError> {
    context.refresh().await?;
    let mut notes = context.list(false);
    notes.extend(context.list(true));
    let rendered = render_notes_export(&notes, format.into())?;

    if let Some(path) = output_path {
        std::fs::write(path, rendered)?;
        println!("{}", path.display());
    } else {
        println!("{rendered}");
    }

    Ok(())
}
