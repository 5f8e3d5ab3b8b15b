//! Command-line interface definition.

use std::path::PathBuf;

use clap::Parser;
use sitewhere_core::TracingOutputFormat;

/// sitewhere-example - a demo device talking to a SiteWhere platform
#[derive(Debug, Parser)]
#[command(name = "sitewhere-example")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "SITEWHERE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v')]
    pub debug: bool,

    /// Log output: pretty, compact or json
    #[arg(long, default_value = "compact")]
    pub log_format: TracingOutputFormat,

    // --- Connection ---
    /// Delivery service host (overrides config)
    #[arg(long)]
    pub host: Option<String>,

    /// Delivery service port (overrides config)
    #[arg(long)]
    pub port: Option<u16>,

    /// Run against an in-process platform instead of a delivery service
    #[arg(long)]
    pub loopback: bool,

    // --- Device ---
    /// Hardware id to register under (defaults to the machine id)
    #[arg(long, env = "SITEWHERE_HARDWARE_ID")]
    pub hardware_id: Option<String>,

    /// Device specification token (overrides config)
    #[arg(long)]
    pub specification_token: Option<String>,

    /// Site token (overrides config)
    #[arg(long)]
    pub site_token: Option<String>,

    // --- Behavior ---
    /// Seconds of synthetic audio to stream once a stream is created
    #[arg(long, default_value_t = 10)]
    pub stream_secs: u64,

    /// Seconds between location reports (overrides config)
    #[arg(long)]
    pub location_interval: Option<u64>,
}
