//! The interactive review loop.

use anyhow::Context;
use clap::Args;
use std::time::Instant;

use shellcard_core::types::ExecutionResult as CardExecution;
use shellcard_core::{Config, Rating, SessionOptions, ShellcardError};
use shellcard_sandbox::{builtin_registry, PodmanDriver};

use crate::app::App;

#[derive(Args)]
pub struct ReviewArgs {
    /// Review cards from a specific deck id (omit for all decks)
    #[arg(long)]
    pub deck_id: Option<i64>,

    /// Maximum cards this session (0 = unlimited; default from config)
    #[arg(long)]
    pub max_cards: Option<usize>,

    /// Only review new cards
    #[arg(long)]
    pub new_only: bool,

    /// Only review cards that are due
    #[arg(long)]
    pub due_only: bool,

    /// Keep the queue in due order instead of shuffling
    #[arg(long)]
    pub no_shuffle: bool,

    /// Allow network access for this session (cards may still opt out)
    #[arg(long)]
    pub network: bool,
}

impl ReviewArgs {
    pub async fn run(self, config: Config) -> anyhow::Result<()> {
        if config.sandbox.driver == "podman" {
            // Fail fast with an actionable message before opening a session.
            PodmanDriver::is_available()
                .await
                .context("the podman sandbox backend is unavailable")?;
        }

        let registry = builtin_registry();
        let mut app = App::new(config, &registry)?;

        let options = SessionOptions {
            deck_id: self.deck_id,
            max_cards: self
                .max_cards
                .unwrap_or(app.config.review.max_cards_per_session),
            new_only: self.new_only,
            due_only: self.due_only,
            shuffle: !self.no_shuffle,
            network_enabled: self.network || app.config.sandbox.network_enabled,
        };

        println!("Starting review session...");
        let session = app.review.start_session(options.clone()).map_err(|e| {
            anyhow::anyhow!("{e}{}", suggestion_suffix(&e))
        })?;
        println!("Session started with {} card(s).", session.cards_remaining);
        if options.network_enabled {
            println!("NOTE: network access is ENABLED for this session.");
        } else {
            println!("Network access is disabled.");
        }

        let outcome = run_loop(&mut app, &session.id).await;

        println!("\nFinalizing session...");
        match app.review.end_session(&session.id) {
            Ok(stats) => {
                println!("Session finished in {:?}.", stats.duration);
                println!(
                    "Cards reviewed: {} ({} new, {} review)",
                    stats.cards_reviewed, stats.new_cards, stats.review_cards
                );
                if stats.cards_reviewed > 0 {
                    println!(
                        "Ratings: {} again, {} hard, {} good, {} easy (average {:.2})",
                        stats.again_count,
                        stats.hard_count,
                        stats.good_count,
                        stats.easy_count,
                        stats.average_rating
                    );
                }
            }
            Err(e) => eprintln!("warning: failed to compute session stats: {e}"),
        }

        app.close().await;
        outcome
    }
}

/// Drive cards until the queue is exhausted, the learner quits, or an
/// interrupt arrives. Returns Ok for all normal completions.
async fn run_loop(app: &mut App, session_id: &str) -> anyhow::Result<()> {
    loop {
        let card = match app.review.get_next_card(session_id) {
            Ok(card) => card,
            Err(ShellcardError::Session(shellcard_core::SessionError::QueueExhausted)) => {
                println!("\nNo more cards to review.");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        println!("\n{}", "=".repeat(60));
        println!("Card: {}", card.title);
        if !card.description.is_empty() {
            println!("Description: {}", card.description);
        }
        println!("Image: {} | Timeout: {:?}", card.image, card.timeout);
        if card.network_enabled {
            println!("Network: ENABLED");
        }
        println!("Working dir: {}", card.working_dir);
        println!("Command: {}", card.command);
        println!("{}", "=".repeat(60));

        let thinking_started = Instant::now();
        match prompt("Press Enter to execute the command (or 'q' to quit): ").await? {
            Some(line) if is_quit(&line) => return Ok(()),
            Some(_) => {}
            None => return Ok(()), // EOF
        }
        let thinking_time = thinking_started.elapsed();

        println!("\nExecuting command...");
        let execution = tokio::select! {
            result = app.review.execute_card(session_id, &card) => match result {
                Ok(result) => {
                    if result.timed_out {
                        println!("Command timed out (exit code: {}).", result.exit_code);
                    } else {
                        println!("Command completed (exit code: {}).", result.exit_code);
                    }
                    Some(result)
                }
                Err(e) => {
                    // Failed execution is information, not a fatal event; the
                    // learner can still rate the attempt.
                    eprintln!("Execution failed: {e}");
                    None
                }
            },
            _ = tokio::signal::ctrl_c() => {
                println!("\nInterrupted; the current card is left unreviewed.");
                return Ok(());
            }
        };

        if let Some(result) = &execution {
            if !result.stdout.is_empty() {
                println!("\nSTDOUT:\n{}", result.stdout);
            }
            if !result.stderr.is_empty() {
                println!("\nSTDERR:\n{}", result.stderr);
            }
        }

        let rating = match prompt_rating().await? {
            Some(rating) => rating,
            None => return Ok(()), // quit or EOF
        };

        let card_execution = execution.map(|result| {
            CardExecution::from_sandbox(&result, thinking_time, card.network_enabled)
        });

        loop {
            match app
                .review
                .submit_review(session_id, card.id, rating, card_execution.as_ref())
            {
                Ok(()) => break,
                Err(e) if e.is_retryable() => {
                    eprintln!("Saving the review failed: {e}");
                    match prompt("Retry saving? [Y/n]: ").await? {
                        Some(line) if line.eq_ignore_ascii_case("n") => return Err(e.into()),
                        Some(_) => continue,
                        None => return Err(e.into()),
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
        println!("Review saved with rating: {rating}");

        let remaining = app
            .review
            .session(session_id)
            .map(|session| session.cards_remaining)
            .unwrap_or(0);
        if remaining == 0 {
            println!("\nAll cards reviewed.");
            return Ok(());
        }
    }
}

async fn prompt_rating() -> anyhow::Result<Option<Rating>> {
    loop {
        let Some(line) = prompt("\nRate your recall (1=Again, 2=Hard, 3=Good, 4=Easy, q=quit): ").await?
        else {
            return Ok(None);
        };
        if is_quit(&line) {
            return Ok(None);
        }
        match Rating::parse(&line) {
            Ok(rating) => return Ok(Some(rating)),
            Err(e) => {
                eprintln!("{e}");
                if let Some(hint) = e.suggestion() {
                    eprintln!("{hint}");
                }
            }
        }
    }
}

/// Read one line from stdin without blocking the runtime. None on EOF.
async fn prompt(message: &str) -> anyhow::Result<Option<String>> {
    use std::io::Write;
    print!("{message}");
    std::io::stdout().flush()?;

    let line = tokio::task::spawn_blocking(|| {
        let mut buffer = String::new();
        match std::io::stdin().read_line(&mut buffer) {
            Ok(0) => None,
            Ok(_) => Some(buffer.trim().to_string()),
            Err(_) => None,
        }
    })
    .await?;
    Ok(line)
}

fn is_quit(line: &str) -> bool {
    matches!(line, "q" | "quit")
}

fn suggestion_suffix(error: &ShellcardError) -> String {
    error
        .suggestion()
        .map(|hint| format!(" ({hint})"))
        .unwrap_or_default()
}
