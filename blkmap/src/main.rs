// SPDX-License-Identifier: MIT

mod utils;

use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use blkmap_diag::{
    Config, DedupPolicy, Diagnoser, ErrorEvent, EventParser, SectorSize, StampParser, YearPolicy,
};
use clap::{ArgAction, Parser, ValueEnum};

use crate::utils::log::{LogLevel, init_logger};

/// Exit code when `--strict` is set and a device could not be diagnosed.
const EXIT_DEVICE_FAILED: u8 = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Parser)]
#[command(
    name = "blkmap",
    version,
    about = "Map GEOM disk I/O errors to the UFS/FFS files they hit",
    long_about = None
)]
struct Cli {
    /// Log files to scan (stdin when none)
    files: Vec<PathBuf>,

    /// Configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Report format
    #[arg(short, long, value_enum, default_value_t = Format::Text)]
    format: Format,

    /// Devices diagnosed in parallel
    #[arg(short, long, default_value_t = 1)]
    jobs: usize,

    /// Year of syslog stamps: current, rolling or a fixed year
    #[arg(long)]
    year: Option<YearPolicy>,

    /// Location grouping: exact or merge-overlapping
    #[arg(long)]
    dedup: Option<DedupPolicy>,

    /// Sector size: provider or a byte count
    #[arg(long, value_name = "BYTES|provider")]
    sector_size: Option<SectorSize>,

    /// Per-tool timeout in seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Blocks per findblk command (1-32)
    #[arg(long)]
    batch_size: Option<usize>,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Errors only
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Don't check that the external tools are installed
    #[arg(long)]
    skip_tool_check: bool,

    /// Exit with status 2 when a device could not be diagnosed
    #[arg(long)]
    strict: bool,
}

impl Cli {
    fn load_config(&self) -> anyhow::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };

        if let Some(year) = self.year {
            config.year = year;
        }
        if let Some(dedup) = self.dedup {
            config.dedup = dedup;
        }
        if let Some(sector_size) = self.sector_size {
            config.sector_size = sector_size;
        }
        if let Some(secs) = self.timeout {
            config.tool_timeout_secs = secs;
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }

        config.validate()?;
        Ok(config)
    }
}

fn read_events(parser: &EventParser, files: &[PathBuf]) -> anyhow::Result<Vec<ErrorEvent>> {
    if files.is_empty() {
        return parser
            .parse_reader(io::stdin().lock())
            .context("while reading stdin");
    }

    let mut events = Vec::new();
    for path in files {
        events.extend(read_file(parser, path)?);
    }
    Ok(events)
}

fn read_file(parser: &EventParser, path: &Path) -> anyhow::Result<Vec<ErrorEvent>> {
    let file = File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
    parser
        .parse_reader(BufReader::new(file))
        .with_context(|| format!("while reading {}", path.display()))
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_logger(LogLevel::from_flags(cli.quiet, cli.verbose));

    let config = cli.load_config()?;
    log::debug!(
        "year {} dedup {} sector size {} batch {} timeout {}s",
        config.year,
        config.dedup,
        config.sector_size,
        config.batch_size,
        config.tool_timeout_secs
    );

    if !cli.skip_tool_check {
        config
            .tool_set()
            .validate_binaries()
            .context("use --skip-tool-check to run anyway")?;
    }

    let parser = EventParser::new(StampParser::new(config.year));
    let events = read_events(&parser, &cli.files)?;
    if events.is_empty() {
        log::info!("no GEOM errors found");
    }

    let diagnoser = Diagnoser::system(config);
    let report = diagnoser.diagnose(events, cli.jobs);

    let mut out = io::stdout().lock();
    match cli.format {
        Format::Text => write!(out, "{report}")?,
        Format::Json => writeln!(out, "{}", report.to_json()?)?,
    }
    out.flush()?;

    let failed = report.failed_devices().count();
    if failed > 0 {
        log::warn!("{failed} of {} device(s) could not be diagnosed", report.devices.len());
        if cli.strict {
            return Ok(ExitCode::from(EXIT_DEVICE_FAILED));
        }
    }

    Ok(ExitCode::SUCCESS)
}
