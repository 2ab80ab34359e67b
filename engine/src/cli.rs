//! CLI interface for Concierge
//!
//! This module provides the command-line interface using clap's derive API.
//! It defines all commands and global flags.

use crate::events::{DaySpec, TimeSpec};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Concierge festival assistant
///
/// Answers questions about Montreal festivals by planning each request into
/// sub-tasks, running them against a text generation service, and remembering
/// past conversations and preferences.
#[derive(Parser, Debug)]
#[command(name = "concierge")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Answer a single request
    Ask {
        /// The request, e.g. "find jazz festivals this weekend"
        input: String,
    },

    /// Start an interactive session (type "exit" to leave)
    Chat,

    /// List festivals by category, day and time
    Festivals {
        /// Free-text request, e.g. "jazz tomorrow evening"; replaces the flags
        #[arg(conflicts_with_all = ["category", "day", "time"])]
        query: Option<String>,

        /// Category or name fragment (music, film, food, comedy...)
        #[arg(short, long)]
        category: Option<String>,

        /// today, tomorrow, tonight, a weekday, or YYYY-MM-DD
        #[arg(short, long, default_value = "any")]
        day: DaySpec,

        /// morning, afternoon, evening, or HH:MM
        #[arg(short, long, default_value = "any")]
        time: TimeSpec,
    },

    /// Show recent conversations
    History {
        /// Number of conversations to show (default: 10)
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Inspect or reset stored memory
    Memory {
        #[command(subcommand)]
        action: MemoryAction,
    },

    /// Run system diagnostics
    Doctor,
}

/// Memory management actions
#[derive(Subcommand, Debug)]
pub enum MemoryAction {
    /// Show counts and file size
    Stats,

    /// Show stored user preferences
    Preferences,

    /// Show learned request patterns
    Patterns {
        /// Only show patterns of this category
        #[arg(short, long)]
        category: Option<String>,
    },

    /// Delete all stored memory
    Clear,
}
