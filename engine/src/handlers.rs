//! Command handlers for CLI operations
//!
//! This module implements the handlers for all CLI commands:
//! - ask: Answer a single request
//! - chat: Interactive session over stdin
//! - festivals: Filter the festival catalog
//! - history: Show recent conversations
//! - memory: Inspect or reset stored memory
//! - doctor: Validate configuration and check dependencies

use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::cli::MemoryAction;
use crate::conductor::{Executor, Orchestrator, Planner, TurnReport};
use crate::config::Config;
use crate::events::{format_catalog, format_event, DaySpec, EventCatalog, FestivalQuery, TimeSpec};
use crate::llm::gemini::GeminiProvider;
use crate::llm::retry::RetryPolicy;
use crate::llm::{GenerationParams, TextGenerator};
use crate::memory::MemoryStore;
use sdk::errors::{AgentError, AgentErrorExt};

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// Marks an error that was already shown to the user
#[derive(Debug, thiserror::Error)]
#[error("request failed")]
pub struct AlreadyReported;

/// Wrap an error with its user-facing hint
fn hinted(err: AgentError) -> anyhow::Error {
    let hint = err.user_hint().to_string();
    anyhow::Error::new(err).context(hint)
}

/// Build a ready orchestrator from config
///
/// Opens the memory store first so a broken memory file fails before any
/// network traffic, then loads the festival catalog once for the session.
pub async fn build_orchestrator(config: &Config) -> Result<Orchestrator, AgentError> {
    let tz = config.timezone()?;
    let store = MemoryStore::open(config.memory_path())?;

    let llm: Arc<dyn TextGenerator> = Arc::new(GeminiProvider::from_config(config)?);
    let retry = RetryPolicy::from_config(&config.retry);
    let timeout = config.llm.timeout();
    let params = GenerationParams::new(config.llm.temperature, config.llm.max_output_tokens);

    let catalog = EventCatalog::from_config(&config.events, tz);
    let events = catalog.collect(Utc::now()).await;
    tracing::info!(count = events.len(), "Festival catalog loaded");

    let planner = Planner::new(Arc::clone(&llm), retry.clone(), timeout, params);
    let executor = Executor::new(llm, retry, timeout, params)
        .with_cache_max_age(Duration::from_secs(config.memory.cache_max_age_secs));

    Ok(Orchestrator::new(planner, executor, store)
        .with_catalog(format_catalog(&events, tz))
        .with_location(config.events.location.clone())
        .with_recall_limit(config.memory.recall_limit))
}

fn print_report(report: &TurnReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            println!("{}", report.response);
        }
        OutputFormat::Json => {
            let output = json!({
                "status": "completed",
                "turn_id": report.turn_id,
                "used_fallback_plan": report.used_fallback_plan,
                "succeeded": report.succeeded(),
                "failed": report.failed(),
                "skipped": report.skipped(),
                "outcomes": report.outcomes,
                "response": report.response,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

fn print_error(err: &AgentError, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            eprintln!("✗ {}", err);
            eprintln!("  {}", err.user_hint());
        }
        OutputFormat::Json => {
            let output = json!({
                "status": "failed",
                "error": err.to_string(),
                "hint": err.user_hint(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

/// Answer a single request
pub async fn handle_ask(input: String, config: &Config, format: OutputFormat) -> Result<()> {
    let mut orchestrator = build_orchestrator(config).await.map_err(hinted)?;

    match orchestrator.handle_turn(&input).await {
        Ok(report) => print_report(&report, format),
        Err(e) => {
            print_error(&e, format)?;
            Err(AlreadyReported.into())
        }
    }
}

/// Interactive session
///
/// Reads one request per line until `exit`, `quit` or end of input. Turns
/// run one at a time; a recoverable error is reported and the session
/// continues.
pub async fn handle_chat(config: &Config, format: OutputFormat) -> Result<()> {
    let mut orchestrator = build_orchestrator(config).await.map_err(hinted)?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    if let OutputFormat::Text = format {
        println!("Montreal festival concierge. Type 'exit' to leave.");
    }

    loop {
        if let OutputFormat::Text = format {
            stdout.write_all(b"\n> ").await?;
            stdout.flush().await?;
        }

        let Some(line) = lines.next_line().await.context("Failed to read input")? else {
            break;
        };

        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
            break;
        }

        match orchestrator.handle_turn(input).await {
            Ok(report) => print_report(&report, format)?,
            Err(e) if e.is_recoverable() => print_error(&e, format)?,
            Err(e) => {
                print_error(&e, format)?;
                return Err(AlreadyReported.into());
            }
        }
    }

    if let OutputFormat::Text = format {
        println!("Goodbye!");
    }
    Ok(())
}

/// List festivals matching category, day and time
///
/// A free-text `text` is parsed for all three and replaces the flags.
pub async fn handle_festivals(
    text: Option<String>,
    category: Option<String>,
    day: DaySpec,
    time: TimeSpec,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let tz = config.timezone().map_err(hinted)?;
    let now = Utc::now();

    let catalog = EventCatalog::from_config(&config.events, tz);
    let events = catalog.collect(now).await;

    let query = match text.as_deref() {
        Some(text) => FestivalQuery::from_text(text, now, tz),
        None => FestivalQuery::new(category.as_deref(), day, time),
    };
    let (day, time) = (query.day, query.time);
    let matches = query.apply(&events, now, tz);

    match format {
        OutputFormat::Text => {
            let label = query.category.as_deref().unwrap_or("all categories");
            println!("Festivals: {}, {}, {}", label, day, time);
            println!("============================");

            if matches.is_empty() {
                println!("No festivals match.");
                return Ok(());
            }

            for m in &matches {
                println!();
                if m.running {
                    println!("[happening then]");
                }
                print!("{}", format_event(&m.event, tz));
                if !m.event.url.is_empty() {
                    println!("Link: {}", m.event.url);
                }
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "category": query.category,
                "day": day.to_string(),
                "time": time.to_string(),
                "sources": catalog.source_names(),
                "matches": matches.iter().map(|m| {
                    json!({
                        "running": m.running,
                        "event": m.event,
                    })
                }).collect::<Vec<_>>(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// Show recent conversations, most recent first
pub async fn handle_history(limit: usize, config: &Config, format: OutputFormat) -> Result<()> {
    let store = MemoryStore::open(config.memory_path())
        .map_err(|e| hinted(e.into()))
        .context("Failed to open memory")?;

    let conversations = store.recall_conversations(limit);

    match format {
        OutputFormat::Text => {
            if conversations.is_empty() {
                println!("No conversations in history");
                return Ok(());
            }

            println!("Conversation History (last {}):", limit);
            println!();

            for record in &conversations {
                println!("{}  {}", record.timestamp.format("%Y-%m-%d %H:%M"), record.id);
                println!("  You:       {}", record.user_input);
                let first_line = record.agent_response.lines().next().unwrap_or("");
                println!("  Concierge: {}", first_line);
                for entry in &record.task_summary {
                    println!("    [{}] {}: {}", entry.disposition, entry.task_id, entry.description);
                }
                println!();
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "conversations": conversations,
                "count": conversations.len(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// Inspect or reset stored memory
pub async fn handle_memory(action: MemoryAction, config: &Config, format: OutputFormat) -> Result<()> {
    let mut store = MemoryStore::open(config.memory_path())
        .map_err(|e| hinted(e.into()))
        .context("Failed to open memory")?;

    match action {
        MemoryAction::Stats => {
            let stats = store.get_stats();
            match format {
                OutputFormat::Text => {
                    println!("Memory Statistics");
                    println!("  {:<20} {}", "Conversations:", stats.conversations);
                    println!("  {:<20} {}", "Task results:", stats.task_results);
                    println!("  {:<20} {}", "Preferences:", stats.user_preferences);
                    println!("  {:<20} {}", "Learned patterns:", stats.learned_patterns);
                    println!("  {:<20} {} bytes", "File size:", stats.size_bytes);
                }
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
            }
        }

        MemoryAction::Preferences => {
            let preferences = store.user_preferences();
            match format {
                OutputFormat::Text => {
                    if preferences.is_empty() {
                        println!("No preferences stored");
                    }
                    for (key, pref) in preferences {
                        println!(
                            "  {:<20} {} (updated {})",
                            key,
                            pref.value,
                            pref.updated_at.format("%Y-%m-%d")
                        );
                    }
                }
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(preferences)?),
            }
        }

        MemoryAction::Patterns { category } => {
            let patterns = store.learned_patterns(category.as_deref());
            match format {
                OutputFormat::Text => {
                    if patterns.is_empty() {
                        println!("No patterns learned");
                    }
                    for pattern in &patterns {
                        println!(
                            "  {:<40} seen {:>3}x  confidence {:.2}",
                            pattern.key, pattern.frequency, pattern.confidence
                        );
                    }
                }
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&patterns)?),
            }
        }

        MemoryAction::Clear => {
            store.clear().map_err(|e| hinted(e.into()))?;
            match format {
                OutputFormat::Text => println!("Memory cleared."),
                OutputFormat::Json => println!("{}", json!({ "status": "cleared" })),
            }
        }
    }

    Ok(())
}

/// Validate configuration and check dependencies
pub async fn handle_doctor(config: &Config, format: OutputFormat) -> Result<()> {
    let mut checks: Vec<(&str, String)> = Vec::new();
    let mut issues: Vec<String> = Vec::new();

    checks.push((
        "Version",
        format!("{} ({})", env!("CARGO_PKG_VERSION"), env!("GIT_COMMIT_HASH")),
    ));
    checks.push(("Configuration", "Loaded".to_string()));

    // Check 1: Data directory
    let data_dir = &config.core.data_dir;
    if data_dir.is_dir() {
        checks.push(("Data directory", data_dir.display().to_string()));
    } else {
        checks.push(("Data directory", "Missing".to_string()));
        issues.push(format!("Data directory does not exist: {}", data_dir.display()));
    }

    // Check 2: Memory document
    match MemoryStore::open(config.memory_path()) {
        Ok(store) => {
            let stats = store.get_stats();
            checks.push((
                "Memory",
                format!("{} conversations, {} bytes", stats.conversations, stats.size_bytes),
            ));
        }
        Err(e) => {
            checks.push(("Memory", "Unreadable".to_string()));
            issues.push(format!("Cannot read memory file: {}", e));
        }
    }

    // Check 3: Timezone
    match config.timezone() {
        Ok(tz) => checks.push(("Timezone", tz.name().to_string())),
        Err(e) => {
            checks.push(("Timezone", "Invalid".to_string()));
            issues.push(e.to_string());
        }
    }

    // Check 4: Text generation credential and reachability
    match GeminiProvider::from_config(config) {
        Ok(provider) => {
            checks.push(("API key", format!("{} set", config.llm.api_key_env)));
            if provider.check_health().await {
                checks.push(("Gemini", format!("Reachable ({})", config.llm.model)));
            } else {
                checks.push(("Gemini", "Unreachable".to_string()));
                issues.push(format!(
                    "Cannot reach {} with model {}",
                    config.llm.base_url, config.llm.model
                ));
            }
        }
        Err(e) => {
            checks.push(("API key", "Not set".to_string()));
            issues.push(format!("{}. {}", e, e.user_hint()));
        }
    }

    // Check 5: Event sources
    let sources = [
        ("Ticketmaster", &config.events.ticketmaster),
        ("Eventbrite", &config.events.eventbrite),
        ("Google Places", &config.events.google_places),
    ];
    for (name, source) in sources {
        let status = if source.api_key().is_some() {
            "Enabled".to_string()
        } else {
            format!("Disabled ({} not set)", source.api_key_env)
        };
        checks.push((name, status));
    }
    checks.push((
        "Quebec open data",
        match config.events.open_data.resource_id() {
            Some(id) => format!("Enabled (resource {})", id),
            None => "Disabled (no resource_id)".to_string(),
        },
    ));

    // Output results
    match format {
        OutputFormat::Text => {
            println!("Concierge System Diagnostics");
            println!("============================");
            println!();

            println!("System Checks:");
            for (check, status) in &checks {
                println!("  {:<20} {}", format!("{}:", check), status);
            }

            println!();

            if issues.is_empty() {
                println!("✓ All checks passed!");
            } else {
                println!("⚠ Issues found:");
                println!();
                for (i, issue) in issues.iter().enumerate() {
                    println!("  {}. {}", i + 1, issue);
                }
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "checks": checks.iter().map(|(name, status)| {
                    json!({
                        "name": name,
                        "status": status
                    })
                }).collect::<Vec<_>>(),
                "issues": issues,
                "healthy": issues.is_empty()
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}
