//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{ArgAction, Args as ClapArgs, Parser, Subcommand};
use vds_client::{Environment, GridFormat, TimeSeriesFormat};

/// Default number of simultaneous calls to the API.
pub const DEFAULT_N_PROC: u8 = 4;

/// Get data from the VanderSat API.
///
/// Builds requests, submits them as asynchronous jobs, waits for the
/// backend to finish and downloads the results. Unfinished jobs from an
/// earlier run are always completed first.
#[derive(Parser, Debug)]
#[command(name = "vds")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Account user name [env: VDS_USER]
    #[arg(short, long, global = true)]
    pub username: Option<String>,

    /// Account password [env: VDS_PASS]
    #[arg(short, long, global = true)]
    pub password: Option<String>,

    /// OAuth bearer token [env: PL_VDS_OAUTH_TOKEN]
    #[arg(short = 't', long, global = true)]
    pub oauth_token: Option<String>,

    /// User to impersonate
    #[arg(short, long, global = true)]
    pub impersonate: Option<String>,

    /// Backend deployment (maps, staging)
    #[arg(long, default_value = "maps", global = true)]
    pub environment: Environment,

    /// Explicit backend base URL, overrides --environment
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Directory holding job markers and audit logs
    #[arg(long, default_value = ".", global = true)]
    pub workdir: PathBuf,

    /// TOML file with request defaults
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Download gridded data over a range of dates
    Grid(GridArgs),
    /// Download time series over points or rois
    Ts(TsArgs),
    /// Download files of jobs recorded in the working directory
    Resume(ResumeArgs),
    /// Show backend version, account details, products and rois
    Info(InfoArgs),
    /// Check the status endpoint of every deployment and report response times
    Test,
}

/// Options shared by every downloading subcommand.
#[derive(ClapArgs, Debug, Clone, Default)]
pub struct DownloadArgs {
    /// Number of simultaneous calls to the API (1-8)
    #[arg(short, long, value_parser = clap::value_parser!(u8).range(1..=8))]
    pub n_proc: Option<u8>,

    /// Path to output the data (created if non-existent)
    #[arg(short, long)]
    pub outfold: Option<PathBuf>,

    /// Re-download files that already exist
    #[arg(long)]
    pub overwrite: bool,

    /// Give up waiting for a job after this many seconds
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub max_wait: Option<u64>,
}

/// `grid` options.
#[derive(ClapArgs, Debug)]
pub struct GridArgs {
    /// Product to download (repeat for several)
    #[arg(long = "product")]
    pub products: Vec<String>,

    /// Range of longitudes: MIN MAX
    #[arg(long, num_args = 2, value_names = ["MIN", "MAX"], allow_negative_numbers = true)]
    pub lon_range: Option<Vec<f64>>,

    /// Range of latitudes: MIN MAX
    #[arg(long, num_args = 2, value_names = ["MIN", "MAX"], allow_negative_numbers = true)]
    pub lat_range: Option<Vec<f64>>,

    /// Start and end date: YYYY-MM-DD YYYY-MM-DD
    #[arg(long, num_args = 2, value_names = ["START", "END"])]
    pub date_range: Option<Vec<NaiveDate>>,

    /// File format (gtiff, netcdf4), default is gtiff
    #[arg(short, long)]
    pub format: Option<GridFormat>,

    /// Return zip folders with all files included
    #[arg(short, long)]
    pub zipped: bool,

    #[command(flatten)]
    pub download: DownloadArgs,
}

/// `ts` options.
#[derive(ClapArgs, Debug)]
pub struct TsArgs {
    /// Product to download (repeat for several)
    #[arg(long = "product")]
    pub products: Vec<String>,

    /// Latitude-Longitude pair (repeat for several)
    #[arg(long, num_args = 2, value_names = ["LAT", "LON"], action = ArgAction::Append, allow_negative_numbers = true)]
    pub latlon: Vec<f64>,

    /// Region name or id (repeat for several)
    #[arg(short, long = "roi")]
    pub rois: Vec<String>,

    /// Start and end date: YYYY-MM-DD YYYY-MM-DD
    #[arg(long, num_args = 2, value_names = ["START", "END"])]
    pub date_range: Option<Vec<NaiveDate>>,

    /// Output format (csv, json)
    #[arg(short, long, default_value = "csv")]
    pub format: TimeSeriesFormat,

    /// Include masked data in output
    #[arg(long)]
    pub masked: bool,

    /// Add averaging +/- days window column to output
    #[arg(long)]
    pub av_win: Option<u32>,

    /// Place the averaging window before each date instead of around it
    #[arg(long)]
    pub backward: bool,

    /// Include climatology column in output
    #[arg(long)]
    pub clim: bool,

    /// Rootzone soil moisture parameter (days)
    #[arg(short = 'T')]
    pub exp_filter_t: Option<u32>,

    /// Add coverage column to roi time series
    #[arg(long)]
    pub provide_coverage: bool,

    #[command(flatten)]
    pub download: DownloadArgs,
}

/// `resume` options.
#[derive(ClapArgs, Debug)]
pub struct ResumeArgs {
    /// Delete the marker of a job that will never finish (repeat for several)
    #[arg(long, value_name = "HANDLE")]
    pub abandon: Vec<String>,

    #[command(flatten)]
    pub download: DownloadArgs,
}

/// `info` options. Without any flag every section is shown.
#[derive(ClapArgs, Debug, Default)]
pub struct InfoArgs {
    /// Show every section
    #[arg(short, long)]
    pub all: bool,

    /// Show account details
    #[arg(long)]
    pub user: bool,

    /// Show available products
    #[arg(long)]
    pub products: bool,

    /// Show rois in the account
    #[arg(short, long)]
    pub rois: bool,
}

impl Command {
    /// Download options of the selected subcommand, if it downloads anything.
    pub fn download_args(&self) -> Option<&DownloadArgs> {
        match self {
            Self::Grid(args) => Some(&args.download),
            Self::Ts(args) => Some(&args.download),
            Self::Resume(args) => Some(&args.download),
            Self::Info(_) | Self::Test => None,
        }
    }
}
