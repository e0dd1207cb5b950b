//! CLI entry point for the VanderSat API client.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vds_client::{
    ApiClient, AvgWindowDirection, Catalog, ClientConfig, CycleReport, Credentials, DispatchError,
    GridFormat, GriddedDataRequest, JobHandle, LifecycleCoordinator, Request, RunSummary, Session,
    SessionBuilder, TimeSeriesRequest,
};

mod app_config;
mod cli;
mod info;

use app_config::{FileConfig, load_file_config};
use cli::{Args, Command, DEFAULT_N_PROC, GridArgs, TsArgs};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(command = ?args.command, "CLI arguments parsed");

    let builder = session_builder(&args)?;
    if matches!(args.command, Command::Test) {
        return info::test_environments(builder, args.base_url.is_some()).await;
    }

    let session = builder.build()?;
    info!("{session}");

    let download = match &args.command {
        Command::Info(info_args) => return info::show(&ApiClient::new(session), info_args).await,
        command => command.download_args().cloned().unwrap_or_default(),
    };

    let file_config = match &args.config {
        Some(path) => load_file_config(path)?,
        None => FileConfig::default(),
    };

    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone());

    let n_proc = usize::from(
        download
            .n_proc
            .or(file_config.n_proc)
            .unwrap_or(DEFAULT_N_PROC),
    );
    let output_dir = download
        .outfold
        .clone()
        .or_else(|| file_config.outfold.clone())
        .unwrap_or_else(|| PathBuf::from("."));
    let max_wait = download
        .max_wait
        .or(file_config.max_wait_secs)
        .map(Duration::from_secs);

    let config = ClientConfig::default()
        .with_marker_dir(&args.workdir)
        .with_output_dir(&output_dir)
        .with_overwrite(download.overwrite)
        .with_max_wait(max_wait)
        .with_progress(!args.quiet);

    let mut coordinator = LifecycleCoordinator::new(session.clone(), &config, cancel)
        .with_context(|| format!("Failed to read job markers in '{}'", args.workdir.display()))?;

    if let Command::Resume(resume) = &args.command {
        for handle in &resume.abandon {
            let handle = JobHandle::new(handle.as_str());
            let known = coordinator
                .abandon(&handle)
                .with_context(|| format!("Failed to abandon job '{handle}'"))?;
            if !known {
                warn!(handle = %handle, "no such job recorded, nothing abandoned");
            }
        }
    }

    // Unfinished jobs from an earlier run always come first
    if !coordinator.pending().is_empty() || matches!(args.command, Command::Resume(_)) {
        if coordinator.pending().is_empty() {
            info!(workdir = %args.workdir.display(), "no unfinished jobs found");
        } else {
            info!(
                count = coordinator.pending().len(),
                "finishing jobs from an earlier run, new work starts on the next invocation"
            );
        }
        let report = coordinator.resume(n_proc).await;
        return finish(coordinator.summary(), report).context("Failed to finish pending jobs");
    }

    let api = ApiClient::new(session.clone());
    let requests = match &args.command {
        Command::Grid(grid) => grid_requests(&api, grid, &file_config, n_proc).await?,
        Command::Ts(ts) => ts_requests(&api, ts, &file_config).await?,
        Command::Resume(_) | Command::Info(_) | Command::Test => Vec::new(),
    };
    info!(count = requests.len(), "requests generated");

    let report = coordinator.run(&requests, n_proc, n_proc).await;
    finish(coordinator.summary(), report).context("Download run failed")
}

fn session_builder(args: &Args) -> Result<SessionBuilder> {
    let credentials = Credentials::resolve(
        args.username.clone(),
        args.password.clone(),
        args.oauth_token.clone(),
    )?;
    if credentials == Credentials::None {
        warn!("no credentials configured, requests are anonymous");
    }

    let mut builder = Session::builder()
        .environment(args.environment)
        .credentials(credentials);
    if let Some(base_url) = &args.base_url {
        builder = builder.base_url(base_url.clone());
    }
    if let Some(user) = &args.impersonate {
        builder = builder.impersonate(user.clone());
    }
    Ok(builder)
}

fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after running downloads");
            cancel.cancel();
        }
    });
}

/// Prints the accumulated summary whether or not the cycle succeeded.
fn finish(
    summary: &RunSummary,
    report: Result<CycleReport, DispatchError>,
) -> Result<(), DispatchError> {
    summary.log();
    println!("{summary}");

    let report = report?;
    if !report.unresolved.is_empty() {
        let handles: Vec<&str> = report.unresolved.iter().map(JobHandle::as_str).collect();
        warn!(
            jobs = %handles.join(", "),
            "unfinished jobs are retried on the next run; use `resume --abandon <HANDLE>` to drop one"
        );
    }
    info!(" ================== Finished ==================");
    Ok(())
}

fn date_range(
    cli: Option<&Vec<NaiveDate>>,
    file: Option<[NaiveDate; 2]>,
) -> Result<(NaiveDate, NaiveDate)> {
    match (cli.map(Vec::as_slice), file) {
        (Some([start, end]), _) => Ok((*start, *end)),
        (None, Some([start, end])) => Ok((start, end)),
        _ => bail!("--date-range START END is required"),
    }
}

fn pair(name: &str, cli: Option<&Vec<f64>>, file: Option<[f64; 2]>) -> Result<(f64, f64)> {
    match (cli.map(Vec::as_slice), file) {
        (Some([min, max]), _) => Ok((*min, *max)),
        (None, Some([min, max])) => Ok((min, max)),
        _ => bail!("--{name} MIN MAX is required"),
    }
}

fn products(cli: &[String], file: Option<&Vec<String>>) -> Result<Vec<String>> {
    let products = if cli.is_empty() {
        file.cloned().unwrap_or_default()
    } else {
        cli.to_vec()
    };
    if products.is_empty() {
        bail!("at least one --product is required");
    }
    Ok(products)
}

async fn grid_requests(
    api: &ApiClient,
    grid: &GridArgs,
    file: &FileConfig,
    n_proc: usize,
) -> Result<Vec<Request>> {
    let names = products(&grid.products, file.products.as_ref())?;
    let (start, end) = date_range(grid.date_range.as_ref(), file.date_range)?;
    let lon = pair("lon-range", grid.lon_range.as_ref(), file.lon_range)?;
    let lat = pair("lat-range", grid.lat_range.as_ref(), file.lat_range)?;

    let format = match (grid.format, file.format.as_deref()) {
        (Some(format), _) => format,
        (None, Some(raw)) => raw.parse()?,
        (None, None) => GridFormat::default(),
    };

    let catalog = Catalog::fetch(api).await.context("Failed to load product catalog")?;
    let products = catalog.products.validate(&names)?;

    let request = GriddedDataRequest::new(products, start, end, lon, lat)
        .with_format(format)
        .with_zipped(grid.zipped || file.zipped.unwrap_or(false))
        .with_nrequests(n_proc);
    Ok(request.build(api.session())?)
}

async fn ts_requests(api: &ApiClient, ts: &TsArgs, file: &FileConfig) -> Result<Vec<Request>> {
    let names = products(&ts.products, file.products.as_ref())?;
    let (start, end) = date_range(ts.date_range.as_ref(), file.date_range)?;

    let catalog = Catalog::fetch(api).await.context("Failed to load catalog")?;
    let products = catalog.products.validate(&names)?;
    let rois = catalog.rois.validate(&ts.rois)?;

    let mut request = TimeSeriesRequest::new(products, start, end);
    for point in ts.latlon.chunks_exact(2) {
        request = request.with_point(point[0], point[1]);
    }
    for roi in rois {
        request = request.with_roi(roi);
    }
    request.format = ts.format;
    request.avg_window_days = ts.av_win.unwrap_or(0);
    request.avg_window_direction = if ts.backward {
        AvgWindowDirection::Backward
    } else {
        AvgWindowDirection::Center
    };
    request.masked = ts.masked;
    request.climatology = ts.clim;
    request.exp_filter_t = ts.exp_filter_t;
    request.provide_coverage = ts.provide_coverage;

    Ok(request.build(api.session())?)
}
