//! Interactive chat application for the fireflies backend.
//!
//! This binary provides a streaming REPL over [`ChatController`]: plain text is
//! chat, and the in-chat commands `/cari`, `/web`, `/kalkulator`, and `/clear`
//! are routed by the controller.
//!
//! # Usage
//!
//! ```bash
//! # Basic usage; the bearer token is read from FIREFLIES_API_TOKEN
//! fireflies-chat
//!
//! # Specify a model and keep chats between runs
//! fireflies-chat --model qwen2.5:7b --transcript chats.json
//!
//! # Read two search results per /cari and disable colors
//! fireflies-chat --search-fan-out 2 --no-color
//! ```
//!
//! Logging goes to stderr and is controlled by `FIREFLIES_LOG` (default `warn`).
//! Press Ctrl+C while a response is streaming to stop it.

use std::env;
use std::sync::Arc;

use arrrg::CommandLine;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use fireflies::chat::{
    ChatArgs, ChatCommand, ChatConfig, ChatController, ChatView, PlainTextView, help_text,
    parse_command,
};
use fireflies::{
    Backend, ChatSession, HistoryStore, ImageAttachment, InMemoryHistoryStore, PlanTier, Profile,
    SessionId, WebRetriever,
};

/// Main entry point for the fireflies-chat application.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_env("FIREFLIES_LOG").unwrap_or_else(|_| "warn".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let (args, _) = ChatArgs::from_command_line_relaxed("fireflies-chat [OPTIONS]");
    let config = ChatConfig::from(args);
    let use_color = config.use_color;

    let backend = Backend::with_options(None, Some(config.backend_url.clone()), None)?;
    let retriever = WebRetriever::new(config.proxy_url.clone())
        .with_max_results(config.search_max_results)
        .with_timeouts(config.search_timeout, config.fetch_timeout);
    let store = Arc::new(match &config.transcript_path {
        Some(path) => InMemoryHistoryStore::with_transcript(path)?,
        None => InMemoryHistoryStore::new(),
    });

    let mut controller = ChatController::new(
        Arc::new(backend),
        Arc::new(retriever),
        store.clone(),
        config,
    )
    .with_profile(profile_from_env());
    let mut view = PlainTextView::with_color(use_color);
    let mut rl = DefaultEditor::new()?;

    // Ctrl+C during a response stops the active generation.
    let stopper = controller.stopper();
    ctrlc::set_handler(move || {
        stopper.stop();
    })?;

    println!("Fireflies Chat (model: {})", controller.model());
    println!("Type /help for commands, /quit to exit\n");

    loop {
        let readline = rl.readline("You: ");

        match readline {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(line);

                if let Some(cmd) = parse_command(line) {
                    match cmd {
                        ChatCommand::Quit => {
                            println!("Goodbye!");
                            break;
                        }
                        ChatCommand::Help => {
                            for line in help_text().lines() {
                                println!("    {}", line);
                            }
                        }
                        ChatCommand::New => match controller.new_chat().await {
                            Ok(_) => view.print_info("Started a new chat."),
                            Err(err) => view.print_error(&err.to_string()),
                        },
                        ChatCommand::Chats => {
                            print_chats(&controller.sessions(), controller.active_session());
                        }
                        ChatCommand::Open(position) => match nth_session(&controller, position) {
                            Some(session) => match controller.select_chat(session.id) {
                                Ok(()) => {
                                    view.print_info(&format!("Opened: {}", session.title));
                                    print_transcript(&controller);
                                }
                                Err(err) => view.print_error(&err.to_string()),
                            },
                            None => view.print_error(&format!("No chat number {position}")),
                        },
                        ChatCommand::Rename(title) => match controller.active_session() {
                            Some(session) => match controller.rename_chat(session, &title).await {
                                Ok(()) => view.print_info(&format!("Chat renamed to: {title}")),
                                Err(err) => view.print_error(&err.to_string()),
                            },
                            None => view.print_error("No active chat to rename."),
                        },
                        ChatCommand::Delete(position) => {
                            let target = match position {
                                Some(position) => nth_session(&controller, position).map(|s| s.id),
                                None => controller.active_session(),
                            };
                            match target {
                                Some(session) => match controller.delete_chat(session).await {
                                    Ok(()) => view.print_info("Chat deleted."),
                                    Err(err) => view.print_error(&err.to_string()),
                                },
                                None => view.print_error("No such chat."),
                            }
                        }
                        ChatCommand::Image { path, prompt } => {
                            match ImageAttachment::from_path(&path) {
                                Ok(image) => {
                                    if let Err(err) =
                                        controller.send(&prompt, Some(image), &mut view).await
                                    {
                                        view.print_error(&err.to_string());
                                    }
                                }
                                Err(err) => view.print_error(&err.to_string()),
                            }
                        }
                        ChatCommand::Model(model) => {
                            controller.set_model(model.clone());
                            view.print_info(&format!("Model changed to: {}", model));
                        }
                        ChatCommand::SaveTranscript(path) => match store.save_transcript_to(&path) {
                            Ok(_) => view.print_info(&format!("Chats saved to {}", path)),
                            Err(err) => {
                                view.print_error(&format!("Failed to save chats: {}", err))
                            }
                        },
                        ChatCommand::LoadTranscript(path) => match store.load_transcript_from(&path)
                        {
                            Ok(_) => {
                                view.print_info(&format!("Chats loaded from {}", path));
                                if let Some(session) = store.sessions().first() {
                                    let _ = controller.select_chat(session.id);
                                }
                            }
                            Err(err) => {
                                view.print_error(&format!("Failed to load chats: {}", err))
                            }
                        },
                        ChatCommand::Stats => {
                            print_stats(&controller);
                        }
                        ChatCommand::ShowConfig => {
                            print_config(&controller);
                        }
                        ChatCommand::Invalid(message) => {
                            view.print_error(&message);
                        }
                    }
                    continue;
                }

                if let Err(e) = controller.send(line, None, &mut view).await {
                    view.print_error(&e.to_string());
                }
            }
            Err(ReadlineError::Interrupted) => {
                // Ctrl+C at prompt - soft interrupt
                println!();
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("\nGoodbye!");
                break;
            }
            Err(err) => {
                view.print_error(&format!("Input error: {}", err));
                break;
            }
        }
    }

    Ok(())
}

/// Builds the signed-in profile from `FIREFLIES_USER`, `FIREFLIES_EMAIL`, and `FIREFLIES_PLAN`.
fn profile_from_env() -> Profile {
    let user = env::var("FIREFLIES_USER").unwrap_or_else(|_| "local".to_string());
    let email = env::var("FIREFLIES_EMAIL").unwrap_or_default();
    let plan = match env::var("FIREFLIES_PLAN").as_deref() {
        Ok("premium") => PlanTier::Premium,
        _ => PlanTier::Free,
    };
    Profile::new(user, email, plan)
}

fn nth_session(controller: &ChatController, position: usize) -> Option<ChatSession> {
    controller.sessions().into_iter().nth(position.checked_sub(1)?)
}

fn print_chats(sessions: &[ChatSession], active: Option<SessionId>) {
    if sessions.is_empty() {
        println!("    (no chats yet)");
        return;
    }
    for (i, session) in sessions.iter().enumerate() {
        let marker = if Some(session.id) == active { "*" } else { " " };
        println!(
            "    {marker} {:>2}. {} ({} messages)",
            i + 1,
            session.title,
            session.messages.len()
        );
    }
}

fn print_transcript(controller: &ChatController) {
    let Ok(messages) = controller.messages() else {
        return;
    };
    for message in messages {
        println!("{}: {}", message.role, message.content);
    }
}

fn print_stats(controller: &ChatController) {
    let stats = controller.stats();
    println!("    Session Statistics:");
    println!("      Model: {}", stats.model);
    println!("      Chats: {}", stats.session_count);
    match stats.active_title {
        Some(ref title) => println!("      Active chat: {} ({} messages)", title, stats.message_count),
        None => println!("      Active chat: (none)"),
    }
    println!(
        "      Generations: {} completed / {} stopped / {} failed",
        stats.completed, stats.cancelled, stats.failed
    );
}

fn print_config(controller: &ChatController) {
    let config = controller.config();
    println!("    Current Configuration:");
    println!("      Model: {}", config.model);
    println!("      Backend: {}", config.backend_url);
    println!("      Retrieval proxy: {}", config.proxy_url);
    println!(
        "      Search: {} of {} results, {:?} search / {:?} fetch timeout",
        config.search_fan_out, config.search_max_results, config.search_timeout, config.fetch_timeout
    );
    println!("      History turns: {}", config.history_turns);
    match config.transcript_path {
        Some(ref path) => println!("      Transcript file: {}", path.display()),
        None => println!("      Transcript file: (disabled)"),
    }
    if let Some(profile) = controller.profile() {
        println!("      Signed in as: {} ({:?})", profile.user_id, profile.plan);
    }
}
