use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use log::info;
use odra_core::error::ErrorKind;
use odra_core::{
    AuditReport, AuditRequest, DEFAULT_PRIORITY, DocumentFile, HealthSnapshot, JobStatus,
    MAX_ITERATIONS,
};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use crate::controller::{JobController, PollPolicy};
use crate::events::{AuditEvent, NoopObserver};
use crate::health::{HEALTH_POLL_INTERVAL, HealthMonitor};
use crate::report::ReportAssembler;
use crate::transport::{AuditApi, AuditClient, ClientConfig, ENV_BASE_URL, load_dotenv};

#[derive(Parser, Debug)]
#[command(name = "odra")]
#[command(about = "Submit document audits and follow them through to the report")]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Backend base URL. Overrides ODRA_API_URL.
    #[arg(long)]
    pub api_url: Option<String>,

    /// Log filter when RUST_LOG is unset (trace/debug/info/warn/error).
    #[arg(long)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run an audit and wait for its report.
    Run {
        #[arg(long)]
        goal: String,
        #[arg(long)]
        scope: Option<String>,
        #[arg(long, default_value_t = DEFAULT_PRIORITY)]
        priority: u8,
        /// Document to upload before the audit starts. Repeatable.
        #[arg(long = "file")]
        files: Vec<PathBuf>,
    },
    /// Print backend health.
    Health {
        /// Keep checking every 10 seconds until interrupted.
        #[arg(long)]
        watch: bool,
    },
}

pub async fn dispatch(args: Args) -> Result<()> {
    init_logging(args.log_level.as_deref())?;
    load_dotenv();

    let config = ClientConfig::from_lookup(|key| match (key, &args.api_url) {
        (ENV_BASE_URL, Some(url)) => Some(url.clone()),
        _ => env::var(key).ok(),
    })?;
    info!("Using audit backend at {}", config.base_url);
    let api: Arc<dyn AuditApi> = Arc::new(AuditClient::new(config)?);

    match args.cmd {
        Command::Run {
            goal,
            scope,
            priority,
            files,
        } => {
            let mut request = AuditRequest::new(goal).with_priority(priority);
            if let Some(scope) = scope {
                request = request.with_scope(scope);
            }
            run_audit(api, request, &files).await
        }
        Command::Health { watch } => show_health(api, watch).await,
    }
}

fn init_logging(level: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.unwrap_or("info")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))
}

async fn run_audit(api: Arc<dyn AuditApi>, request: AuditRequest, paths: &[PathBuf]) -> Result<()> {
    let files = read_files(paths).await?;
    let policy = PollPolicy::from_env()?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let controller = JobController::new(api.clone(), Arc::new(tx), policy);
    let job = controller.start(request, files).await?;
    println!("Submitted job {} ({})", job.id, job.status.state);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(AuditEvent::StatusUpdate(status)) => println!("{}", status_line(&status)),
                Some(AuditEvent::ReportReady(job_id)) => {
                    let mut assembler =
                        ReportAssembler::new(api.clone(), Arc::new(NoopObserver), job_id);
                    let report = assembler.fetch().await?;
                    print!("{}", render_report(&report));
                    return Ok(());
                }
                Some(AuditEvent::Error { kind: ErrorKind::JobFailed, message }) => bail!(message),
                Some(AuditEvent::Error { kind, message }) => eprintln!("{kind}: {message}"),
                None => bail!("controller stopped without a result"),
            },
            _ = &mut ctrl_c => {
                controller.cancel().await;
                println!("Cancelled job {}", job.id);
                return Ok(());
            }
        }
    }
}

async fn read_files(paths: &[PathBuf]) -> Result<Vec<DocumentFile>> {
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("read {}", path.display()))?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        files.push(DocumentFile::new(name, bytes));
    }
    Ok(files)
}

async fn show_health(api: Arc<dyn AuditApi>, watch: bool) -> Result<()> {
    if !watch {
        let snapshot = api.get_health().await?;
        print!("{}", render_health(&snapshot));
        return Ok(());
    }

    let mut monitor = HealthMonitor::spawn(api, HEALTH_POLL_INTERVAL);
    let mut rx = monitor.subscribe();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let reading = rx.borrow_and_update().clone();
                match reading {
                    Some(Ok(snapshot)) => print!("{}", render_health(&snapshot)),
                    Some(Err(err)) => eprintln!("health check failed: {err}"),
                    None => {}
                }
            }
            _ = &mut ctrl_c => break,
        }
    }

    monitor.stop().await;
    Ok(())
}

fn status_line(status: &JobStatus) -> String {
    let mut line = format!(
        "[{}] {:>3}%  {}/{} documents  iteration {}/{}",
        status.state,
        status.progress_percent,
        status.processed_documents,
        status.total_documents,
        status.current_iteration,
        MAX_ITERATIONS
    );
    if let (Some(precision), Some(recall)) = (status.precision(), status.recall()) {
        line.push_str(&format!("  precision {precision:.2}  recall {recall:.2}"));
    }
    line
}

fn render_report(report: &AuditReport) -> String {
    let metrics = report.metrics();
    let mut out = format!(
        "\nReport for {} ({})\nprecision {:.2}  recall {:.2}  evidence {}\n",
        report.job_id, report.goal, metrics.precision, metrics.recall, metrics.total_evidence
    );
    if !report.summary.is_empty() {
        out.push_str(&format!("\n{}\n", report.summary));
    }
    if !report.evidence().is_empty() {
        out.push_str("\nEvidence:\n");
        for (i, item) in report.evidence().iter().enumerate() {
            out.push_str(&format!(
                "{:>3}. [{:.2}] {}: {}\n",
                i + 1,
                item.relevance_score,
                item.doc_id,
                item.snippet
            ));
        }
    }
    if !report.recommendations().is_empty() {
        out.push_str("\nRecommendations:\n");
        for rec in report.recommendations() {
            out.push_str(&format!("  - {rec}\n"));
        }
    }
    out
}

fn render_health(snapshot: &HealthSnapshot) -> String {
    let mut out = format!("status: {}\n", snapshot.status);
    let components = [
        ("database", &snapshot.database),
        ("embeddings", &snapshot.embeddings),
        ("task_queue", &snapshot.task_queue),
    ];
    for (name, value) in components {
        if let Some(value) = value {
            out.push_str(&format!("{name}: {value}\n"));
        }
    }
    if let Some(at) = snapshot.timestamp {
        out.push_str(&format!("checked: {}\n", at.to_rfc3339()));
    }
    out
}
