mod cli;
mod ui;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command};
use octoqueue::{JobId, JobQueue, JobState, QueueConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = QueueConfig::load_from(&cli.config)?;
    if let Some(repo) = cli.repo {
        config.repo = repo;
    }
    if let Command::Enqueue {
        schema: Some(path), ..
    } = &cli.command
    {
        config.schema_path = Some(path.clone());
    }

    let queue = JobQueue::from_config(&config)?;
    run(&queue, cli.command).await
}

// RUST_LOG wins; otherwise warn, or debug with --verbose.
fn init_tracing(verbose: bool) {
    let fallback = if verbose { "octoqueue=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn parse_id(raw: &str) -> Result<JobId> {
    raw.parse()
        .with_context(|| format!("invalid job id: {raw}"))
}

async fn run(queue: &JobQueue<octoqueue::github::GitHubStore>, command: Command) -> Result<()> {
    match command {
        Command::Enqueue {
            data, title, labels, ..
        } => {
            let data: serde_json::Value =
                serde_json::from_str(&data).context("payload is not valid JSON")?;
            let spinner = ui::Spinner::start("enqueueing job");
            match queue.enqueue(data, title, labels).await {
                Ok(id) => spinner.success(&format!("enqueued job {id}")),
                Err(e) => {
                    spinner.failure("enqueue failed");
                    return Err(e.into());
                }
            }
        }
        Command::Dequeue => {
            let spinner = ui::Spinner::start("claiming next job");
            let claimed = queue.dequeue().await;
            spinner.clear();
            match claimed? {
                Some(job) => ui::print_job(&job),
                None => println!("no queued jobs"),
            }
        }
        Command::Complete { id } => {
            let id = parse_id(&id)?;
            queue.complete(id).await?;
            ui::print_status(id, JobState::Completed);
        }
        Command::Fail { id, reason } => {
            let id = parse_id(&id)?;
            queue.fail(id, reason).await?;
            ui::print_status(id, JobState::Failed);
        }
        Command::Requeue { id } => {
            let id = parse_id(&id)?;
            queue.requeue(id).await?;
            ui::print_status(id, JobState::Queued);
        }
        Command::Status { id } => {
            let id = parse_id(&id)?;
            let state = queue.status(id).await?;
            ui::print_status(id, state);
        }
        Command::Show { id } => {
            let job = queue.job(parse_id(&id)?).await?;
            ui::print_job(&job);
        }
        Command::Jobs { state } => {
            let state = JobState::from(state);
            let spinner = ui::Spinner::start(&format!("listing {state} jobs"));
            let jobs = queue.jobs(state).await;
            spinner.clear();
            let jobs = jobs?;
            if jobs.is_empty() {
                println!("no {state} jobs");
            }
            for job in &jobs {
                ui::print_job_line(job);
            }
        }
        Command::Count => {
            println!("{}", queue.count_active().await?);
        }
        Command::Sweep { older_than } => {
            let max_age = chrono::Duration::seconds(i64::from(older_than));
            let spinner = ui::Spinner::start("sweeping stale claims");
            let swept = queue.sweep_stale(max_age).await;
            spinner.clear();
            let swept = swept?;
            for id in &swept {
                ui::print_status(*id, JobState::Failed);
            }
            println!("swept {} job(s)", swept.len());
        }
        Command::InitLabels => {
            let spinner = ui::Spinner::start("creating state labels");
            match queue.ensure_labels().await {
                Ok(()) => spinner.success("state labels are present"),
                Err(e) => {
                    spinner.failure("could not create labels");
                    return Err(e.into());
                }
            }
        }
    }
    Ok(())
}
