//! Interactive chat mode handler.
//!
//! Runs a readline-based loop that submits turns to the streaming backend
//! and renders events as they arrive. The interrupt gate is ground truth
//! for the composer: while a SQL review is outstanding the free-form
//! prompt is swapped for a review prompt, and only an approve or edit
//! decision leaves it.

use std::io::Write;
use std::time::Duration;

use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::client::{run_turn_with, ChatClient, TurnRequest};
use crate::config::Config;
use crate::conversation::{ConversationState, Message, ReviewDecision, Role, TaskStatus};
use crate::error::{DatachatError, Result};
use crate::session::{rebuild_state, HttpSessionRegistry, SessionRegistry, ThreadStore};
use crate::stream::{AgentEvent, TableData};

/// Start interactive chat mode
///
/// # Arguments
///
/// * `config` - Global configuration (consumed)
/// * `resume` - Optional session ID to resume from history
/// * `new` - Start under a freshly minted thread id
/// * `project` - Optional project scope override
pub async fn run_chat(
    config: Config,
    resume: Option<String>,
    new: bool,
    project: Option<u64>,
) -> Result<()> {
    let base_url = config.base_url()?;
    let token = config.bearer_token();
    if token.is_none() {
        tracing::warn!(
            "no bearer token in ${}; requests go out unauthenticated",
            config.server.token_env
        );
    }

    let client = ChatClient::new(
        base_url.clone(),
        token.clone(),
        Duration::from_secs(config.server.connect_timeout_secs),
        Duration::from_secs(config.server.stall_secs),
    );
    let registry = HttpSessionRegistry::new(base_url, token);
    let thread_store = ThreadStore::new()?;
    let project_id = project.or(config.server.project_id);
    let show_thinking = config.chat.show_thinking;

    // Resolve the thread: resume swaps the persisted id wholesale, --new
    // mints a fresh one, otherwise the last thread continues.
    let mut state = if let Some(session_id) = resume {
        let turns = registry.history(&session_id).await?;
        thread_store.store(&session_id)?;
        let state = rebuild_state(session_id, &turns);
        render_transcript(&state);
        state
    } else if new {
        ConversationState::new(thread_store.mint()?)
    } else {
        ConversationState::new(thread_store.load_or_mint()?)
    };

    print_welcome_banner(state.thread_id());

    let mut rl = DefaultEditor::new()?;

    loop {
        // The review prompt owns the terminal while the gate is closed.
        while state.gate().is_awaiting() {
            let decision = prompt_review(&mut rl, &state)?;
            let sql = state.resolve_review(&decision)?;
            let request = match decision {
                ReviewDecision::Approve => TurnRequest::approve(sql, state.thread_id()),
                ReviewDecision::Edit(_) => TurnRequest::edit(sql, state.thread_id()),
            }
            .with_project(project_id);
            submit_turn(&client, &mut state, &request, show_thinking).await?;
        }

        match rl.readline("datachat> ") {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                rl.add_history_entry(trimmed)?;

                match trimmed {
                    "/quit" | "/exit" => break,
                    "/help" => {
                        print_help();
                        continue;
                    }
                    "/new" => {
                        state.reset(thread_store.mint()?);
                        println!("{}", "Started a new conversation.".green());
                        println!("Thread: {}\n", state.thread_id().cyan());
                        continue;
                    }
                    "/sessions" => {
                        match registry.list(project_id).await {
                            Ok(sessions) => super::sessions::print_sessions(&sessions),
                            Err(e) => println!("{}", format!("Could not list sessions: {}", e).red()),
                        }
                        continue;
                    }
                    "/tables" => {
                        if state.selected_tables().is_empty() {
                            println!("{}", "No tables selected yet.".yellow());
                        } else {
                            println!("Tables: {}", state.selected_tables().join(", ").cyan());
                        }
                        continue;
                    }
                    "/export" => {
                        match state.latest_export() {
                            Some(rows) => {
                                let json = serde_json::to_string_pretty(rows)?;
                                println!("{}", json);
                            }
                            None => println!("{}", "Nothing exportable yet.".yellow()),
                        }
                        continue;
                    }
                    _ => {}
                }

                let request = TurnRequest::for_input(&state, trimmed)?.with_project(project_id);
                submit_turn(&client, &mut state, &request, show_thinking).await?;
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(err) => return Err(err.into()),
        }
    }

    println!("Goodbye!");
    Ok(())
}

/// Run one turn, rendering events as they stream in.
///
/// Authentication and transport failures are surfaced to the user here
/// instead of unwinding the whole chat loop; a 401 aborted the turn
/// before any state mutation, so the user can re-authenticate and retry.
async fn submit_turn(
    client: &ChatClient,
    state: &mut ConversationState,
    request: &TurnRequest,
    show_thinking: bool,
) -> Result<()> {
    let mut thinking_open = false;

    let outcome = run_turn_with(client, state, request, |event, state| {
        render_event(event, state, show_thinking, &mut thinking_open);
    })
    .await;

    if thinking_open {
        println!();
    }

    if let Err(err) = outcome {
        match err.downcast_ref::<DatachatError>() {
            Some(DatachatError::Authentication(_)) => {
                println!(
                    "{}",
                    "Session expired. Set a fresh token and try again.".red()
                );
            }
            _ => {
                println!("{}", format!("Turn failed: {}", err).red());
            }
        }
    }

    Ok(())
}

/// Render one streamed event to the terminal.
fn render_event(
    event: &AgentEvent,
    state: &ConversationState,
    show_thinking: bool,
    thinking_open: &mut bool,
) {
    // Close the thinking line before anything that writes its own lines.
    if *thinking_open && !matches!(event, AgentEvent::Thinking { .. }) {
        println!();
        *thinking_open = false;
    }

    match event {
        AgentEvent::Thinking { content } => {
            if show_thinking {
                print!("{}", content.dimmed());
                let _ = std::io::stdout().flush();
                *thinking_open = true;
            }
        }
        AgentEvent::Plan { .. } => {
            println!("{}", "Plan:".bold());
            for task in state.plan().tasks() {
                println!("  {} {}", status_tag(task.status), task.title);
            }
        }
        AgentEvent::Step { node, .. } => {
            if let Some(task) = state.plan().tasks().iter().find(|t| &t.id == node) {
                let duration = task
                    .duration_ms
                    .map(|ms| format!(" ({}ms)", ms))
                    .unwrap_or_default();
                println!("  {} {}{}", status_tag(task.status), task.title, duration);
            }
        }
        AgentEvent::Interrupt { sql } => {
            println!("{}", "Generated SQL awaiting your review:".yellow().bold());
            println!("{}", sql.yellow());
        }
        AgentEvent::Result { content } => {
            println!("{}", content);
        }
        AgentEvent::Visualization(viz) => {
            if let Some(table) = &viz.table_data {
                print_table(table);
            } else if viz.option.is_some() {
                println!("{}", "[chart output]".cyan());
            }
        }
        AgentEvent::SelectedTables { tables } => {
            println!("{}", format!("Using tables: {}", tables.join(", ")).cyan());
        }
        AgentEvent::DataExport { rows } => {
            println!(
                "{}",
                format!("{} rows exportable; use /export to print them.", rows.len()).cyan()
            );
        }
        AgentEvent::DataDownload { token } => {
            println!("{}", format!("Download token: {}", token).cyan());
        }
        AgentEvent::Error { message } => {
            println!("{}", message.red());
        }
        AgentEvent::Unknown { .. } => {}
    }
}

/// Prompt for a decision on the pending SQL review.
fn prompt_review(rl: &mut DefaultEditor, state: &ConversationState) -> Result<ReviewDecision> {
    let sql = state.gate().pending_sql().unwrap_or_default().to_string();

    loop {
        match rl.readline(&format!("{} ", "[a]pprove / [e]dit>".yellow())) {
            Ok(choice) => match choice.trim().to_lowercase().as_str() {
                "a" | "approve" => return Ok(ReviewDecision::Approve),
                "e" | "edit" => {
                    let edited = rl.readline_with_initial("sql> ", (&sql, ""))?;
                    let edited = edited.trim().to_string();
                    if edited.is_empty() {
                        println!("{}", "Empty statement; keeping the original.".yellow());
                        continue;
                    }
                    return Ok(ReviewDecision::Edit(edited));
                }
                _ => {
                    println!("{}", "Please answer 'a' to approve or 'e' to edit.".yellow());
                }
            },
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                // The gate stays closed; approving is the only way out
                // besides quitting, and quitting must be explicit.
                println!(
                    "{}",
                    "A SQL review is pending; answer 'a' or 'e' (or /quit after deciding).".yellow()
                );
            }
            Err(err) => return Err(err.into()),
        }
    }
}

/// Print a resumed session's transcript.
fn render_transcript(state: &ConversationState) {
    for message in state.messages() {
        print_message(message);
    }
}

fn print_message(message: &Message) {
    match message.role {
        Role::User => {
            println!("{} {}", ">".bold(), message.content.as_deref().unwrap_or(""));
        }
        Role::Agent => {
            if message.interrupt {
                println!("{}", "Proposed SQL:".yellow());
            }
            if let Some(content) = &message.content {
                println!("{}", content);
            }
            if let Some(table) = &message.table_data {
                print_table(table);
            }
            if let Some(clarification) = &message.clarification {
                println!("{}", clarification.question.cyan());
                for option in &clarification.options {
                    println!("  - {}", option);
                }
            }
        }
    }
}

fn print_table(table: &TableData) {
    use prettytable::{format, Cell, Row, Table};

    let mut out = Table::new();
    out.set_format(*format::consts::FORMAT_BORDERS_ONLY);

    out.add_row(Row::new(
        table
            .columns
            .iter()
            .map(|c| Cell::new(&c.bold().to_string()))
            .collect(),
    ));
    for row in &table.data {
        out.add_row(Row::new(
            row.iter().map(|v| Cell::new(&value_to_cell(v))).collect(),
        ));
    }

    out.printstd();
}

/// Render a JSON value for a table cell without quoting strings.
fn value_to_cell(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => "-".to_string(),
        other => other.to_string(),
    }
}

fn status_tag(status: TaskStatus) -> colored::ColoredString {
    match status {
        TaskStatus::Pending => "·".dimmed(),
        TaskStatus::Running => "▸".cyan(),
        TaskStatus::Done => "✓".green(),
        TaskStatus::Error => "✗".red(),
    }
}

fn print_welcome_banner(thread_id: &str) {
    println!();
    println!("{}", "DataChat".bold());
    println!("Thread: {}", thread_id.cyan());
    println!("Type {} for commands, {} to leave.", "/help".cyan(), "/quit".cyan());
    println!();
}

fn print_help() {
    println!("Commands:");
    println!("  {}      start a new conversation thread", "/new".cyan());
    println!("  {} list saved sessions", "/sessions".cyan());
    println!("  {}   show tables the backend selected", "/tables".cyan());
    println!("  {}   print the latest exportable rows", "/export".cyan());
    println!("  {}     leave chat", "/quit".cyan());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_to_cell_renders_strings_bare() {
        assert_eq!(value_to_cell(&serde_json::json!("north")), "north");
        assert_eq!(value_to_cell(&serde_json::json!(42)), "42");
        assert_eq!(value_to_cell(&serde_json::Value::Null), "-");
    }

    #[test]
    fn test_status_tags_are_distinct() {
        let tags: Vec<String> = [
            TaskStatus::Pending,
            TaskStatus::Running,
            TaskStatus::Done,
            TaskStatus::Error,
        ]
        .iter()
        .map(|s| status_tag(*s).to_string())
        .collect();

        for (i, tag) in tags.iter().enumerate() {
            for other in &tags[i + 1..] {
                assert_ne!(tag, other);
            }
        }
    }
}
