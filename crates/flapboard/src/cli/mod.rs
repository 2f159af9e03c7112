//! Command-line interface for flapboard.
//!
//! This module provides the CLI structure for the `flapboard` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    AiCommand, AttendanceCommand, AuthCommand, BoardCommand, ConfigCommand, CourseCommand,
    FilterArgs, RosterCommand, ScheduleCommand, StudentCommand, TripArgs, TripPatchArgs,
};

use crate::logging::Verbosity;

/// flapboard - School shuttle departures board
///
/// Keeps the weekly trip schedule, shows it as a split-flap board and
/// records per-trip attendance for secondary courses.
#[derive(Debug, Parser)]
#[command(name = "flapboard")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Print results as JSON; writes print `{"success": ..}` outcomes
    #[arg(long, global = true)]
    pub json: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Manage scheduled trips
    #[command(subcommand)]
    Schedule(ScheduleCommand),

    /// Show the departures board
    Board(BoardCommand),

    /// Manage secondary course groups and students
    #[command(subcommand)]
    Roster(RosterCommand),

    /// Record per-trip attendance
    #[command(subcommand)]
    Attendance(AttendanceCommand),

    /// Sign up, sign in and out
    #[command(subcommand)]
    Auth(AuthCommand),

    /// Generated text for the board
    #[command(subcommand)]
    Ai(AiCommand),

    /// Show database location, signed-in user and record counts
    Status,

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> Verbosity {
        Verbosity::from_flags(self.verbose, self.quiet)
    }
}
