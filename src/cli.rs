//! Command-line interface for octoqueue based on clap.
//!
//! Defines the [`Cli`] struct with its [`Command`] subcommands and the global
//! flags (--config, --repo, --verbose).

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use octoqueue::JobState;

/// octoqueue: a job queue kept in GitHub issues.
#[derive(Debug, Parser)]
#[command(name = "octoqueue", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file.
    #[arg(long, global = true, default_value = octoqueue::config::DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Repository as `owner/name`, overriding the configuration.
    #[arg(long, global = true)]
    pub repo: Option<String>,

    /// Enable debug logging.
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

/// State argument accepted by the CLI, mapped to [`JobState`] internally.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum StateArg {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl From<StateArg> for JobState {
    fn from(arg: StateArg) -> Self {
        match arg {
            StateArg::Queued => JobState::Queued,
            StateArg::Processing => JobState::Processing,
            StateArg::Completed => JobState::Completed,
            StateArg::Failed => JobState::Failed,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Add a job to the queue.
    Enqueue {
        /// Job payload as JSON.
        data: String,

        /// Issue title; defaults to a timestamped one.
        #[arg(long)]
        title: Option<String>,

        /// Extra label to attach (repeatable).
        #[arg(long = "label")]
        labels: Vec<String>,

        /// Validate the payload against this JSON Schema file first.
        #[arg(long)]
        schema: Option<PathBuf>,
    },

    /// Claim the oldest queued job and print it.
    Dequeue,

    /// Mark a claimed job as completed.
    Complete { id: String },

    /// Mark a claimed job as failed.
    Fail {
        id: String,

        /// Reason recorded in the job's history.
        #[arg(long, default_value = "This job has failed")]
        reason: String,
    },

    /// Put a completed or failed job back in the queue.
    Requeue { id: String },

    /// Print the state of a job.
    Status { id: String },

    /// Print a job with its payload and history.
    Show { id: String },

    /// List jobs in a state.
    Jobs {
        #[arg(long, value_enum, default_value_t = StateArg::Processing)]
        state: StateArg,
    },

    /// Count queued and processing jobs.
    Count,

    /// Fail processing jobs whose claim is older than the given age.
    Sweep {
        /// Maximum claim age in seconds.
        #[arg(long)]
        older_than: u32,
    },

    /// Create the state labels in the repository.
    InitLabels,
}
