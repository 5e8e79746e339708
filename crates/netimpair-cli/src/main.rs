//! CLI for netimpair — impairs live network traffic for testing applications
//! under degraded conditions.

mod adapters;
mod commands;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "netimpair")]
#[command(about = "netimpair — impairs live network traffic for testing applications under degraded conditions")]
#[command(version = netimpair_core::VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Impair traffic on a port until interrupted (Ctrl-C)
    Run(RunArgs),
}

#[derive(clap::Args, Debug)]
pub struct RunArgs {
    /// Transport protocol
    #[arg(short, long, value_enum, default_value = "tcp")]
    pub transport: Transport,

    /// Permissions level at which network interference occurs
    #[arg(short, long, value_enum, default_value = "kernel")]
    pub level: Level,

    /// Impaired interface; "auto" resolves the default outward-facing interface
    #[arg(short, long, default_value = "lo")]
    pub interface: String,

    /// Flaky inbound/outbound traffic occurs on this port
    #[arg(short, long)]
    pub port: u16,

    /// Which physical traffic direction(s) get impaired at kernel level
    #[arg(short, long, value_enum, default_value = "both")]
    pub direction: Direction,

    /// IP version(s) to install iptables rules for
    #[arg(long, value_enum, default_value = "v4")]
    pub ip_version: IpVersion,

    /// Proxy port for receiving all inbound traffic (user level only)
    #[arg(short = 'x', long)]
    pub proxy_port: Option<u16>,

    /// Port for the HTTP control surface; omit to run without one
    #[arg(long)]
    pub control_port: Option<u16>,

    /// Initial bandwidth limit in bytes/sec; <= 0 means unlimited
    #[arg(long, default_value_t = -1)]
    pub bandwidth: i64,

    /// Initial max queue occupancy in bytes; <= 0 means unbounded
    #[arg(long, default_value_t = -1)]
    pub buffer: i64,

    /// Initial constant additive latency in seconds
    #[arg(long, default_value_t = 0.0)]
    pub delay: f64,

    /// Initial Bernoulli drop probability in [0.0, 1.0]
    #[arg(long, default_value_t = 0.0)]
    pub loss: f64,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transport {
    Tcp,
    Udp,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    Kernel,
    User,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
    Both,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum IpVersion {
    V4,
    V6,
    Both,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => commands::run::run(args),
    }
}
