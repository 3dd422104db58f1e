use notely_core::context::NotesContext;

use crate::cli::QueueCommands;
use crate::commands::common::format_queue_lines;
use crate::error::CliError;

pub fn run_queue(context: &NotesContext, command: QueueCommands) -> Result<(), CliError> {
    let queue = context.queue();
    match command {
        QueueCommands::List { json } => {
            let operations = queue.queue();
            if json {
                println!("{}", serde_json::to_string_pretty(&operations)?);
            } else if operations.is_empty() {
                println!("No pending operations.");
            } else {
                for line in format_queue_lines(&operations) {
                    println!("{line}");
                }
            }
        }
        QueueCommands::Clear => {
            let dropped = queue.len();
            queue.clear();
            println!("Dropped {dropped} pending operation(s)");
        }
    }
    Ok(())
}
