//! Session management commands.
//!
//! Lists, renames, and deletes saved conversation sessions through the
//! backend session registry.

use colored::Colorize;
use prettytable::{format, Table};

use crate::cli::SessionCommand;
use crate::config::Config;
use crate::error::Result;
use crate::session::{HttpSessionRegistry, Session, SessionRegistry};

/// Handle `datachat sessions <command>`
pub async fn handle_sessions(config: Config, command: SessionCommand) -> Result<()> {
    let registry = HttpSessionRegistry::new(config.base_url()?, config.bearer_token());

    match command {
        SessionCommand::List { project } => {
            let sessions = registry.list(project.or(config.server.project_id)).await?;

            if sessions.is_empty() {
                println!("{}", "No saved sessions found.".yellow());
                return Ok(());
            }

            print_sessions(&sessions);
            println!(
                "Use {} to resume a session.",
                "datachat chat --resume <ID>".cyan()
            );
            println!();
        }
        SessionCommand::Rename { id, title } => {
            registry.rename(&id, &title).await?;
            println!("{}", format!("Renamed session {} to \"{}\".", id, title).green());
        }
        SessionCommand::Delete { id } => {
            registry.delete(&id).await?;
            println!("{}", format!("Deleted session {}.", id).green());
        }
    }

    Ok(())
}

/// Print sessions as a table.
pub fn print_sessions(sessions: &[Session]) {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);

    table.add_row(prettytable::row![
        "ID".bold(),
        "Title".bold(),
        "Last Updated".bold()
    ]);

    for session in sessions {
        let title = if session.title.len() > 48 {
            format!("{}...", &session.title[..45])
        } else {
            session.title.clone()
        };
        let updated = session.updated_at.format("%Y-%m-%d %H:%M").to_string();

        table.add_row(prettytable::row![session.id.cyan(), title, updated]);
    }

    println!("\nSaved sessions:");
    table.printstd();
    println!();
}
