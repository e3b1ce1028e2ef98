use clap::Subcommand;

use super::config::ConfigArgs;
use super::inspect::InspectArgs;
use super::replay::ReplayArgs;

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Replay a scripted browsing journey through the tracker
    Replay(ReplayArgs),

    /// Show tracker state persisted in the state directory
    Inspect(InspectArgs),

    /// Show or validate the effective configuration
    Config(ConfigArgs),
}
