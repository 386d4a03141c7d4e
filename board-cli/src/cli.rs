use std::{
    future::Future,
    io::{self, Write},
    path::{Path, PathBuf},
    pin::pin,
    process::ExitCode,
    time::Duration,
};

use bvg_board_core::{
    BoardParams, Config, DefaultsUpdate, DepartureQuery, Error, Location, Overrides,
    PartialBoard, TransitProvider, ValidationError, WeatherProvider,
    board::{fetch_board, ticks},
    provider::{self, DEFAULT_NEARBY_LIMIT, providers_from_config},
    render::{refresh_footer, render, render_nearby, render_partial},
};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use crossterm::{
    cursor::MoveTo,
    queue,
    terminal::{Clear, ClearType},
};
use futures::{Stream, StreamExt};
use tracing::{debug, info, warn};

/// Exit code for bad input or an unusable config file.
pub const EXIT_INVALID: u8 = 1;
/// Exit code for a failed upstream call.
pub const EXIT_API: u8 = 2;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "bvg-board", version, about = "BVG departures board with Berlin time and weather")]
pub struct Cli {
    /// Read and save defaults in this file instead of the platform config path.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log debug output to stderr (RUST_LOG takes precedence).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List stops near a coordinate.
    Nearby(NearbyArgs),

    /// Show departures, Berlin time and current weather once.
    Show(BoardArgs),

    /// Live view that refreshes departures and weather.
    Watch {
        #[command(flatten)]
        board: BoardArgs,

        /// Refresh interval in seconds. Defaults to the config value or 30.
        #[arg(short, long)]
        interval: Option<u64>,
    },
}

#[derive(Debug, Clone, Args)]
pub struct NearbyArgs {
    /// Latitude in decimal degrees. Falls back to the configured default.
    #[arg(short = 'a', long, allow_negative_numbers = true)]
    pub latitude: Option<f64>,

    /// Longitude in decimal degrees. Falls back to the configured default.
    #[arg(short = 'o', long, allow_negative_numbers = true)]
    pub longitude: Option<f64>,

    /// Maximum number of stops to list.
    #[arg(short, long, default_value_t = DEFAULT_NEARBY_LIMIT)]
    pub limit: usize,

    /// Maximum distance in meters.
    #[arg(short, long)]
    pub distance: Option<u32>,

    /// Save the nearest stop's id and coordinates as defaults.
    #[arg(long)]
    pub save: bool,
}

#[derive(Debug, Clone, Args)]
pub struct BoardArgs {
    /// BVG stop id, e.g. 900000100001.
    #[arg(short, long)]
    pub stop_id: Option<String>,

    /// Latitude for weather; selects the nearest stop when no stop id is given.
    #[arg(short = 'a', long, allow_negative_numbers = true)]
    pub latitude: Option<f64>,

    /// Longitude for weather; selects the nearest stop when no stop id is given.
    #[arg(short = 'o', long, allow_negative_numbers = true)]
    pub longitude: Option<f64>,

    /// Number of departures to show.
    #[arg(short, long, default_value_t = 10, value_parser = clap::value_parser!(u32).range(1..=30))]
    pub results: u32,

    /// Look-ahead window for departures in minutes.
    #[arg(short, long, default_value_t = 60, value_parser = clap::value_parser!(u32).range(1..))]
    pub duration: u32,
}

impl Cli {
    pub async fn run(self) -> ExitCode {
        let mut stdout = io::stdout();
        match self.execute(&mut stdout).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                let _ = stdout.flush();
                eprintln!("Error: {err:#}");
                ExitCode::from(exit_code(&err))
            }
        }
    }

    async fn execute(self, out: &mut impl Write) -> anyhow::Result<()> {
        let (config, config_path) = match self.config {
            Some(path) => (Config::load_from(&path).map_err(Error::from)?, path),
            None => (
                Config::load().map_err(Error::from)?,
                Config::config_file_path().map_err(Error::from)?,
            ),
        };
        debug!(path = %config_path.display(), ?config, "loaded config");

        let (transit, weather) = providers_from_config(&config)?;

        match self.command {
            Command::Nearby(args) => nearby(&transit, &config, &config_path, &args, out).await,
            Command::Show(args) => show(&transit, &weather, &config, &args, out).await,
            Command::Watch { board, interval } => {
                watch(&transit, &weather, &config, &board, interval, shutdown_signal(), out).await
            }
        }
    }
}

/// Map a failure to the process exit code.
pub fn exit_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<Error>() {
        Some(Error::Api(_)) => EXIT_API,
        _ => EXIT_INVALID,
    }
}

pub async fn nearby<T: TransitProvider + ?Sized>(
    transit: &T,
    config: &Config,
    config_path: &Path,
    args: &NearbyArgs,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let config = config.merge_overrides(&Overrides {
        latitude: args.latitude,
        longitude: args.longitude,
        ..Overrides::default()
    });
    let location = config
        .location()
        .map_err(Error::from)?
        .ok_or(Error::Validation(ValidationError::MissingCoordinates))?;

    let stops = provider::find_nearby_stops(
        transit,
        location.latitude,
        location.longitude,
        args.limit,
        args.distance,
    )
    .await?;

    print_lines(out, &render_nearby(&stops))?;

    if args.save {
        match stops.first() {
            Some(nearest) => {
                match Config::save_defaults(config_path, &DefaultsUpdate::from(nearest)) {
                    Ok(()) => writeln!(out, "Saved defaults to {}", config_path.display())?,
                    Err(err) => {
                        debug!(error = %err, "saving defaults failed");
                        writeln!(out, "Warning: could not save defaults: {err}")?;
                    }
                }
            }
            None => writeln!(out, "Nothing saved: no stops found.")?,
        }
    }
    Ok(())
}

pub async fn show<T, W>(
    transit: &T,
    weather: &W,
    config: &Config,
    args: &BoardArgs,
    out: &mut impl Write,
) -> anyhow::Result<()>
where
    T: TransitProvider + ?Sized,
    W: WeatherProvider + ?Sized,
{
    let params = board_params(transit, config, args).await?;
    let board = fetch_board(transit, weather, &params, Utc::now()).await;
    let snapshot = board.into_snapshot().map_err(Error::from)?;

    print_lines(out, &render(&snapshot))?;
    out.flush()?;
    Ok(())
}

pub async fn watch<T, W, S>(
    transit: &T,
    weather: &W,
    config: &Config,
    args: &BoardArgs,
    interval: Option<u64>,
    shutdown: S,
    out: &mut impl Write,
) -> anyhow::Result<()>
where
    T: TransitProvider + ?Sized,
    W: WeatherProvider + ?Sized,
    S: Future<Output = ()>,
{
    let config = config.merge_overrides(&Overrides {
        watch_interval_seconds: interval,
        ..Overrides::default()
    });
    let period = config.watch_interval().map_err(Error::from)?;
    let params = board_params(transit, &config, args).await?;

    info!(stop_id = %params.stop_id, interval = config.watch_interval_seconds, "starting watch");
    drive(ticks(transit, weather, &params), period, shutdown, out).await
}

/// Paint each board, then wait `period` or until `shutdown` resolves.
async fn drive<B, S>(
    boards: B,
    period: Duration,
    shutdown: S,
    out: &mut impl Write,
) -> anyhow::Result<()>
where
    B: Stream<Item = PartialBoard>,
    S: Future<Output = ()>,
{
    let mut boards = pin!(boards);
    let mut shutdown = pin!(shutdown);

    while let Some(board) = boards.next().await {
        paint(out, &board, period.as_secs())?;

        tokio::select! {
            () = &mut shutdown => break,
            () = tokio::time::sleep(period) => {}
        }
    }

    writeln!(out, "\nStopped watch.")?;
    out.flush()?;
    Ok(())
}

fn paint(out: &mut impl Write, board: &PartialBoard, interval_seconds: u64) -> io::Result<()> {
    queue!(out, Clear(ClearType::All), MoveTo(0, 0))?;
    print_lines(out, &render_partial(board))?;
    writeln!(out, "{}", refresh_footer(interval_seconds))?;
    out.flush()
}

/// Work out which stop to show and where to read the weather.
///
/// An explicit stop id wins. Explicit coordinates without a stop id select
/// the nearest stop; otherwise the configured stop is used, then the
/// configured coordinates. The coordinate flags come as a pair.
async fn board_params<T: TransitProvider + ?Sized>(
    transit: &T,
    config: &Config,
    args: &BoardArgs,
) -> anyhow::Result<BoardParams> {
    let explicit_coordinates = match (args.latitude, args.longitude) {
        (Some(_), Some(_)) => true,
        (None, None) => false,
        _ => return Err(Error::Validation(ValidationError::IncompleteCoordinates).into()),
    };
    let config = config.merge_overrides(&Overrides {
        stop_id: args.stop_id.clone(),
        latitude: args.latitude,
        longitude: args.longitude,
        ..Overrides::default()
    });
    let location = config.location().map_err(Error::from)?;

    let stop_id = match (&args.stop_id, explicit_coordinates, &config.stop_id) {
        (Some(id), _, _) => id.clone(),
        (None, false, Some(id)) => id.clone(),
        _ => {
            let location = location.ok_or(Error::Validation(ValidationError::MissingStop))?;
            nearest_stop_id(transit, location).await?
        }
    };

    Ok(BoardParams {
        stop_id,
        weather_location: location,
        departures: DepartureQuery {
            when: None,
            duration_minutes: args.duration,
            results: args.results,
        },
    })
}

async fn nearest_stop_id<T: TransitProvider + ?Sized>(
    transit: &T,
    location: Location,
) -> anyhow::Result<String> {
    let stops =
        provider::find_nearby_stops(transit, location.latitude, location.longitude, 1, None)
            .await?;
    let nearest = stops
        .into_iter()
        .next()
        .ok_or(Error::Validation(ValidationError::MissingStop))?;
    debug!(stop_id = %nearest.id, name = %nearest.name, "using nearest stop");
    Ok(nearest.id)
}

fn print_lines(out: &mut impl Write, lines: &[String]) -> io::Result<()> {
    for line in lines {
        writeln!(out, "{line}")?;
    }
    Ok(())
}

/// Resolves on Ctrl-C. The listener runs in its own task so an interrupt
/// during a request is still seen once that request finishes.
fn shutdown_signal() -> impl Future<Output = ()> {
    let listener = tokio::spawn(async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    });
    async move {
        let _ = listener.await;
    }
}
