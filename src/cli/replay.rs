use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Args;
use footfall_core_types::ManualClock;
use footfall_storage::StoreSet;
use footfall_tracker::EventType;
use footfall_transport::{Emitter, FetchTransport, QueuedTransport, RecordingTransport};
use tracing::info;

use super::context::CliContext;
use super::output::{emit, format_unix, short_id, OutputFormat};
use crate::journey::{Journey, Replayer, ReplaySummary};

#[derive(Args, Clone, Debug)]
pub struct ReplayArgs {
    /// Journey script (YAML)
    pub script: PathBuf,

    /// Keep all tracker state in memory instead of the state directory
    #[arg(long)]
    pub ephemeral: bool,

    /// Deliver events to the configured collector endpoints
    #[arg(long)]
    pub send: bool,
}

pub async fn cmd_replay(args: ReplayArgs, ctx: &CliContext, format: OutputFormat) -> Result<()> {
    let config = ctx.config();
    let journey = Journey::load(&args.script)
        .with_context(|| format!("loading journey {}", args.script.display()))?;
    let clock = ManualClock::at_unix(journey.start_at.unwrap_or_else(|| Utc::now().timestamp()));

    let origin = if args.ephemeral {
        StoreSet::in_memory(Arc::new(clock.clone()))
    } else {
        ctx.state_stores(Arc::new(clock.clone()))?
    };

    let (emitter, worker) = if args.send {
        let (queued, worker) =
            QueuedTransport::spawn(&config.transport).context("starting beacon worker")?;
        let fetch = FetchTransport::new(&config.transport).context("building fetch client")?;
        (
            Emitter::with_fallback(Arc::new(queued), Arc::new(fetch)),
            Some(worker),
        )
    } else {
        (Emitter::new(Arc::new(RecordingTransport::new())), None)
    };

    let mut replayer = Replayer::new(clock, origin, emitter, config.tracker.clone());
    let summary = replayer
        .run(&journey)
        .with_context(|| format!("replaying {}", args.script.display()))?;
    info!(
        pageviews = summary.pageviews,
        exits = summary.exits,
        sessions = summary.sessions,
        "journey replayed"
    );

    if let Some(worker) = worker {
        worker.shutdown().await.context("flushing queued events")?;
    }

    emit(&format, &summary, || render(&summary))
}

fn render(summary: &ReplaySummary) -> String {
    let mut out = String::new();
    for step in &summary.steps {
        let _ = write!(
            out,
            "#{:<3} {}  [{}] {:<8} {:?}",
            step.step,
            format_unix(step.at),
            step.tab,
            step.action,
            step.outcome
        );
        if let Some(reason) = step.reason {
            let _ = write!(out, " ({reason:?})");
        }
        out.push('\n');
        for event in &step.events {
            let kind = match event.event_type {
                EventType::Pageview => "pageview",
                EventType::PageExit => "exit",
            };
            let _ = writeln!(
                out,
                "      {:<8} session={} seq={} landing={} {} utm={}/{} time_on_page={}s",
                kind,
                short_id(&event.session_id),
                event.page_sequence,
                event.is_landing_page,
                event.page_url,
                event.utm_source,
                event.utm_medium,
                event.time_on_page
            );
        }
    }
    let _ = write!(
        out,
        "{} pageview(s), {} exit(s), {} session(s)",
        summary.pageviews, summary.exits, summary.sessions
    );
    out
}
