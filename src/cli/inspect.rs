use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use footfall_core_types::{Clock, ManualClock, SystemClock};
use footfall_tracker::StateSnapshot;
use serde::Serialize;

use super::context::CliContext;
use super::output::{emit, format_unix, OutputFormat};

#[derive(Args, Clone, Debug)]
pub struct InspectArgs {
    /// Evaluate expiry at this unix time instead of now
    #[arg(long, value_name = "UNIX_SECS")]
    pub at: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct InspectReport {
    pub state_dir: PathBuf,
    #[serde(flatten)]
    pub state: StateSnapshot,
}

pub fn cmd_inspect(args: InspectArgs, ctx: &CliContext, format: OutputFormat) -> Result<()> {
    // Stored TTLs are judged against the same instant as session expiry.
    let clock: Arc<dyn Clock> = match args.at {
        Some(at) => Arc::new(ManualClock::at_unix(at)),
        None => Arc::new(SystemClock),
    };
    let stores = ctx.state_stores(clock.clone())?;
    let report = InspectReport {
        state_dir: ctx.config().state_dir.clone(),
        state: StateSnapshot::read(&stores, &ctx.config().tracker, clock.unix_secs()),
    };

    emit(&format, &report, || render(&report))
}

fn render(report: &InspectReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "State directory: {}", report.state_dir.display());
    let report = &report.state;
    let _ = writeln!(out, "Evaluated at:    {}", format_unix(report.evaluated_at));
    match &report.visitor {
        Some(visitor) => {
            let _ = writeln!(
                out,
                "Visitor:         {} (visits: {})",
                visitor.visitor_id, visitor.visit_count
            );
        }
        None => out.push_str("Visitor:         none\n"),
    }
    match &report.session {
        Some(session) => {
            let _ = writeln!(
                out,
                "Session:         {} ({}, last activity {})",
                session.session_id,
                if report.session_live { "live" } else { "expired" },
                format_unix(session.last_activity_at)
            );
        }
        None => out.push_str("Session:         none\n"),
    }
    if let Some(attribution) = &report.attribution {
        let _ = writeln!(
            out,
            "Attribution:     {}/{} campaign={:?} code={:?}",
            attribution.utm_source,
            attribution.utm_medium,
            attribution.utm_campaign,
            attribution.tracking_code
        );
    }
    if let Some(sequence) = &report.sequence {
        let _ = writeln!(out, "Page sequence:   {}", sequence.page_sequence);
    }
    if let Some(flow) = &report.flow {
        let _ = writeln!(
            out,
            "Last page:       {} ({} in session)",
            flow.last_page_url, flow.session_page_count
        );
    }
    let _ = write!(out, "Exit candidate:  {:?}", report.exit_state);
    if let Some(candidate) = &report.exit_candidate {
        let _ = write!(
            out,
            " {} (time on page {}s)",
            candidate.event.page_url, candidate.time_on_page
        );
    }
    if !report.malformed.is_empty() {
        let _ = write!(out, "\nMalformed:       {}", report.malformed.join(", "));
    }
    out
}
