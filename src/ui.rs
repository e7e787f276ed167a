//! Terminal output for the octoqueue CLI: spinners and coloured state badges.
//!
//! Uses `indicatif` for the progress spinner and `console` for styling.

use std::time::Duration;

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use octoqueue::{Job, JobId, JobState};

/// Spinner shown while a request to the repository is in flight.
pub struct Spinner {
    pb: ProgressBar,
    green: Style,
    red: Style,
}

impl Spinner {
    pub fn start(message: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(message.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
        }
    }

    pub fn success(&self, message: &str) {
        self.pb.finish_and_clear();
        println!("  {} {message}", self.green.apply_to("✓"));
    }

    pub fn failure(&self, message: &str) {
        self.pb.finish_and_clear();
        eprintln!("  {} {message}", self.red.apply_to("✗"));
    }

    pub fn clear(&self) {
        self.pb.finish_and_clear();
    }
}

fn state_style(state: JobState) -> Style {
    match state {
        JobState::Queued => Style::new().yellow(),
        JobState::Processing => Style::new().cyan(),
        JobState::Completed => Style::new().green().bold(),
        JobState::Failed => Style::new().red().bold(),
    }
}

/// Coloured state name.
pub fn badge(state: JobState) -> String {
    state_style(state).apply_to(state.as_str()).to_string()
}

pub fn print_status(id: JobId, state: JobState) {
    println!("{id} {}", badge(state));
}

/// One line per job: id, state, time in state, title.
pub fn print_job_line(job: &Job) {
    let dim = Style::new().dim();
    println!(
        "{:>6} {:<12} {} {}",
        job.id.to_string(),
        badge(job.state),
        dim.apply_to(job.entered_state_at().format("%Y-%m-%d %H:%M:%S")),
        job.title
    );
}

/// Full job view with payload and history.
pub fn print_job(job: &Job) {
    let bold = Style::new().bold();
    let dim = Style::new().dim();

    println!("{} {}", bold.apply_to(format!("Job {}", job.id)), badge(job.state));
    println!("  title:   {}", job.title);
    println!("  created: {}", job.created_at.to_rfc3339());
    if !job.labels.is_empty() {
        println!("  labels:  {}", job.labels.join(", "));
    }
    println!("{}", bold.apply_to("─── Payload ───"));
    println!(
        "{}",
        serde_json::to_string_pretty(&job.data).unwrap_or_default()
    );
    println!("{}", bold.apply_to("─── History ───"));
    for entry in &job.history {
        println!(
            "  {} {}",
            dim.apply_to(entry.at.format("%Y-%m-%d %H:%M:%S")),
            entry.event
        );
    }
}
