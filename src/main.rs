use std::ffi::OsString;
use std::path::PathBuf;

use anyhow::Result;
use clap::{CommandFactory, Parser};

use tempreduce::accel::cpu::CpuBackend;
use tempreduce::accel::{AccelerationManager, BackendKind, ComputeBackend};
use tempreduce::config::StatsConfig;
use tempreduce::loader::MalformedPolicy;
use tempreduce::report;

#[derive(Parser, Debug)]
#[command(
    name = "tempreduce",
    about = "Work-group parallel statistics (mean, min, max, stdev) over temperature series",
    version,
    long_about = None
)]
struct Cli {
    /// Select platform
    #[arg(short = 'p', long)]
    platform: Option<usize>,

    /// Select device
    #[arg(short = 'd', long)]
    device: Option<usize>,

    /// List all platforms and devices
    #[arg(short = 'l', long)]
    list: bool,

    /// Compute backend
    #[arg(long, value_enum)]
    backend: Option<BackendKind>,

    /// Temperature file; the last token of each line is the reading
    #[arg(long)]
    data: Option<PathBuf>,

    /// Kernel program source (embedded program if omitted)
    #[arg(long)]
    kernels: Option<PathBuf>,

    /// Configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Skip lines whose last token is not a number instead of failing
    #[arg(long)]
    skip_malformed: bool,

    /// JSON output for machine parsing
    #[arg(long)]
    json: bool,
}

/// Drop arguments clap does not know about, so stray flags are ignored
/// rather than rejected.
fn known_args<I: IntoIterator<Item = OsString>>(args: I) -> (Vec<OsString>, Vec<OsString>) {
    let cmd = Cli::command();
    let mut kept = Vec::new();
    let mut dropped = Vec::new();
    let mut args = args.into_iter();

    if let Some(bin) = args.next() {
        kept.push(bin);
    }

    while let Some(raw) = args.next() {
        let text = raw.to_string_lossy().into_owned();
        let (name, inline_value) = if text.starts_with("--") {
            match text.split_once('=') {
                Some((n, _)) => (n.to_string(), true),
                None => (text.clone(), false),
            }
        } else if text.starts_with('-') && text.chars().count() > 2 {
            // `-p3`: short flag with its value attached
            (text.chars().take(2).collect(), true)
        } else {
            (text.clone(), false)
        };

        let known = cmd.get_arguments().find(|a| {
            name.strip_prefix("--")
                .map(|long| a.get_long() == Some(long))
                .or_else(|| {
                    name.strip_prefix('-')
                        .filter(|s| s.chars().count() == 1)
                        .and_then(|s| s.chars().next())
                        .map(|short| a.get_short() == Some(short))
                })
                .unwrap_or(false)
        });
        let builtin = matches!(name.as_str(), "-h" | "--help" | "-V" | "--version");

        match known {
            Some(arg) => {
                kept.push(raw);
                if arg.get_action().takes_values() && !inline_value {
                    if let Some(value) = args.next() {
                        kept.push(value);
                    }
                }
            }
            None if builtin => kept.push(raw),
            None => dropped.push(raw),
        }
    }

    (kept, dropped)
}

/// `RUST_LOG` if set, otherwise `fallback`.
fn log_filter(fallback: &str) -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(fallback))
}

fn main() -> Result<()> {
    let (args, ignored) = known_args(std::env::args_os());
    let cli = Cli::parse_from(args);

    // Config discovery logs before the configured level is known
    let bootstrap = tracing_subscriber::fmt()
        .with_env_filter(log_filter("warn"))
        .with_writer(std::io::stderr)
        .finish();
    let mut config = tracing::subscriber::with_default(bootstrap, || match &cli.config {
        Some(path) => StatsConfig::load(path),
        None => Ok(StatsConfig::load_or_default()),
    })?;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(&config.logging.level))
        .with_writer(std::io::stderr)
        .init();

    if !ignored.is_empty() {
        tracing::debug!(?ignored, "ignoring unknown arguments");
    }

    // CLI overrides config
    if let Some(platform) = cli.platform {
        config.backend.platform = platform;
    }
    if let Some(device) = cli.device {
        config.backend.device = device;
    }
    if let Some(kind) = cli.backend {
        config.backend.kind = kind;
    }
    if let Some(data) = cli.data {
        config.data.path = data;
    }
    if let Some(kernels) = cli.kernels {
        config.kernels.source = Some(kernels);
    }
    if cli.skip_malformed {
        config.data.malformed = MalformedPolicy::Skip;
    }

    if cli.list {
        let host = CpuBackend::with_max_work_group_size(config.backend.cpu_max_work_group_size);
        let platforms = AccelerationManager::list_platforms();
        println!("{}", report::format_listing(&platforms, host.info()));
    }

    tracing::info!(
        backend = ?config.backend.kind,
        platform = config.backend.platform,
        device = config.backend.device,
        data = %config.data.path.display(),
        "Running statistics"
    );
    let run = tempreduce::run(&config)?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&run)?);
    } else {
        print!("{}", report::format_text(&run));
    }

    Ok(())
}
