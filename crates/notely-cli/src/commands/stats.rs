use notely_core::context::NotesContext;

use crate::error::CliError;

pub async fn run_stats(context: &NotesContext, as_json: bool) -> Result<(), CliError> {
    let stats = context.refresh().await?;
    let pending = context.queue().len();

    if as_json {
        let payload = serde_json::json!({
            "activeCount": stats.active_count,
            "archivedCount": stats.archived_count,
            "totalCount": stats.total_count,
            "pendingCount": pending,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        println!("active:   {}", stats.active_count);
        println!("archived: {}", stats.archived_count);
        println!("total:    {}", stats.total_count);
        println!("pending:  {pending}");
    }
    Ok(())
}
