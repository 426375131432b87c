//! CLI argument definitions (spec §6: "a single executable").

use clap::Parser;

const VERSION_BANNER: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (commit ",
    env!("VERGEN_GIT_SHA"),
    ", built ",
    env!("VERGEN_BUILD_TIMESTAMP"),
    ")"
);

#[derive(Parser)]
#[command(name = "kg-server")]
#[command(about = "Local knowledge-graph tool server for an observability backend")]
#[command(version = VERSION_BANNER)]
pub struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Serve over HTTP instead of stdio (overrides the HTTP env var)
    #[arg(long)]
    pub http: bool,
}
