use clap::error::ErrorKind;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::fs;
use std::path::{Path, PathBuf};

use crate::engine::validate_config;
use crate::error::{Error, Result};
use crate::layout::GridSpec;
use crate::models::{ArrivalProfile, LayoutSource, PolicyKind, SimConfig};

#[derive(Parser, Debug)]
#[command(name = "park-sim", version, about = "Parking facility spot-allocation simulator")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(about = "Run one simulation and print its report")]
    Run(RunArgs),
    #[command(about = "Run every policy on the same arrivals and compare them")]
    Compare(CompareArgs),
    #[command(about = "Print the effective configuration after overrides")]
    ShowConfig(SimArgs),
    #[command(about = "List the assignment policies")]
    ListPolicies,
    #[command(about = "Write the facility layout (file or generated grid) back out")]
    ExportLayout(ExportLayoutArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct SimArgs {
    #[arg(long, help = "TOML or JSON simulation config")]
    pub config: Option<PathBuf>,
    #[arg(long, help = "TOML or JSON facility layout")]
    pub layout: Option<PathBuf>,
    #[command(flatten)]
    pub grid: GridArgs,
    #[arg(long, value_enum)]
    pub policy: Option<PolicyArg>,
    #[arg(long)]
    pub seed: Option<u64>,
    #[arg(long, help = "Stop processing events after this minute")]
    pub end_time: Option<u64>,
    #[arg(long, help = "Poisson arrival rate in vehicles per hour")]
    pub rate: Option<f64>,
    #[arg(long, help = "Last minute at which Poisson arrivals are generated")]
    pub horizon: Option<u64>,
    #[arg(
        long,
        help = "Minutes an unassigned vehicle waits before leaving (0 rejects at once)"
    )]
    pub max_wait: Option<u64>,
    #[arg(long, help = "Minutes between batch dispatches (batch-optimal only)")]
    pub batch_window: Option<u64>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct GridArgs {
    #[arg(long)]
    pub aisles: Option<u32>,
    #[arg(long, help = "Lane cells per aisle of the generated grid")]
    pub aisle_length: Option<u32>,
    #[arg(long, help = "Floors of the generated grid, joined by ramps")]
    pub floors: Option<u32>,
}

impl GridArgs {
    fn is_set(&self) -> bool {
        self.aisles.is_some() || self.aisle_length.is_some() || self.floors.is_some()
    }
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub sim: SimArgs,
    #[arg(long, value_enum, default_value_t = FormatArg::Human)]
    pub format: FormatArg,
    #[arg(long, help = "Write the event log as JSON lines")]
    pub export: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct CompareArgs {
    #[command(flatten)]
    pub sim: SimArgs,
    #[arg(long, value_enum, default_value_t = FormatArg::Human)]
    pub format: FormatArg,
}

#[derive(Args, Debug, Clone)]
pub struct ExportLayoutArgs {
    #[arg(long)]
    pub layout: Option<PathBuf>,
    #[command(flatten)]
    pub grid: GridArgs,
    #[arg(long, help = "Destination (.json or .toml); stdout as JSON when omitted")]
    pub output: Option<PathBuf>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum PolicyArg {
    NearestFirst,
    Weighted,
    BatchOptimal,
}

impl From<PolicyArg> for PolicyKind {
    fn from(value: PolicyArg) -> Self {
        match value {
            PolicyArg::NearestFirst => PolicyKind::NearestFirst,
            PolicyArg::Weighted => PolicyKind::Weighted,
            PolicyArg::BatchOptimal => PolicyKind::BatchOptimal,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum FormatArg {
    Human,
    Summary,
    Json,
}

pub fn parse_args() -> Result<Cli> {
    match Cli::try_parse() {
        Ok(cli) => Ok(cli),
        Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            err.exit()
        }
        Err(err) => Err(Error::Cli(err.to_string())),
    }
}

// A relative layout path is resolved against the config file's directory.
pub fn load_config(path: &Path) -> Result<SimConfig> {
    let contents = fs::read_to_string(path).map_err(|err| {
        Error::ConfigIo(format!(
            "failed to read config '{}': {}",
            path.display(),
            err
        ))
    })?;
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .unwrap_or("");

    let mut config: SimConfig = match ext {
        "toml" => toml::from_str(&contents)
            .map_err(|err| Error::ConfigParse(format!("failed to parse TOML: {}", err)))?,
        "json" => serde_json::from_str(&contents)
            .map_err(|err| Error::ConfigParse(format!("failed to parse JSON: {}", err)))?,
        "" => return Err(Error::UnsupportedConfigFormat("unknown".to_string())),
        _ => return Err(Error::UnsupportedConfigFormat(ext.to_string())),
    };

    if let LayoutSource::File(layout) = &config.layout {
        if layout.is_relative() {
            if let Some(dir) = path.parent() {
                config.layout = LayoutSource::File(dir.join(layout));
            }
        }
    }
    Ok(config)
}

pub fn build_config(args: &SimArgs) -> Result<SimConfig> {
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => SimConfig::default(),
    };

    if let Some(layout) = &args.layout {
        config.layout = LayoutSource::File(layout.clone());
    }
    if args.grid.is_set() {
        config.layout = grid_override(&config.layout, args.layout.as_deref(), &args.grid)?;
    }
    if let Some(policy) = args.policy {
        config.policy = policy.into();
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if let Some(end_time) = args.end_time {
        config.end_time = Some(end_time);
    }
    if let Some(max_wait) = args.max_wait {
        config.max_wait = max_wait;
    }
    if let Some(window) = args.batch_window {
        config.batch_window = window;
    }

    if args.rate.is_some() || args.horizon.is_some() {
        match &mut config.arrivals {
            ArrivalProfile::Poisson {
                rate_per_hour,
                horizon,
                ..
            } => {
                if let Some(rate) = args.rate {
                    *rate_per_hour = rate;
                }
                if let Some(limit) = args.horizon {
                    *horizon = Some(limit);
                }
            }
            ArrivalProfile::Scripted { .. } => {
                return Err(Error::Cli(
                    "--rate and --horizon apply to poisson arrivals only".to_string(),
                ));
            }
        }
    }

    validate_config(&config)?;
    Ok(config)
}

pub fn layout_source(args: &ExportLayoutArgs) -> Result<LayoutSource> {
    let base = match &args.layout {
        Some(path) => LayoutSource::File(path.clone()),
        None => LayoutSource::default(),
    };
    if args.grid.is_set() {
        return grid_override(&base, args.layout.as_deref(), &args.grid);
    }
    Ok(base)
}

fn grid_override(
    current: &LayoutSource,
    layout_flag: Option<&Path>,
    flags: &GridArgs,
) -> Result<LayoutSource> {
    if layout_flag.is_some() {
        return Err(Error::Cli(
            "--aisles/--aisle-length/--floors cannot be combined with --layout".to_string(),
        ));
    }
    let mut grid = match current {
        LayoutSource::Grid { grid } => grid.clone(),
        LayoutSource::File(_) => GridSpec::default(),
    };
    if let Some(aisles) = flags.aisles {
        grid.aisles = aisles;
    }
    if let Some(length) = flags.aisle_length {
        grid.aisle_length = length;
    }
    if let Some(floors) = flags.floors {
        grid.floors = floors;
    }
    Ok(LayoutSource::Grid { grid })
}
