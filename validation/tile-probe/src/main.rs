//! Tile probe CLI for precomputed volume servers.

use anyhow::Context;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use tile_probe::{
    parse_count, ApiClient, HttpTileFetcher, ProbeConfig, ProbeReport, ProbeRunner, ProbeSummary,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};
use volume_common::TilePathLayout;

#[derive(Parser)]
#[command(name = "tile-probe")]
#[command(about = "Probe tile servability and latency of precomputed volumes", long_about = None)]
struct Cli {
    /// Log level when RUST_LOG is unset (logs go to stderr)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a probe from a scenario file
    Run {
        /// Path to scenario YAML file
        #[arg(short, long)]
        scenario: PathBuf,

        /// Override tile count
        #[arg(short, long, allow_negative_numbers = true, value_parser = count_arg)]
        count: Option<i64>,

        /// Override level key
        #[arg(short, long)]
        level: Option<String>,

        /// Override per-tile timeout in seconds
        #[arg(short, long)]
        timeout_secs: Option<u64>,

        /// Output format: table (default), json, csv
        #[arg(short, long, default_value = "table")]
        output: String,
    },

    /// Probe a volume without a scenario file
    Quick {
        /// Volume to probe
        #[arg(short, long)]
        volume: String,

        /// Level key
        #[arg(short, long, default_value = "0")]
        level: String,

        /// Number of tiles to fetch
        #[arg(short, long, default_value = "8", allow_negative_numbers = true, value_parser = count_arg)]
        count: i64,

        /// Backend URL
        #[arg(short, long, default_value = "http://localhost:9000", env = "PROBE_BASE_URL")]
        url: String,

        /// Tile mount (defaults to {url}/precomp)
        #[arg(short, long)]
        mount: Option<String>,

        /// Path layout: level_first or coords_first
        #[arg(long, default_value = "level_first")]
        layout: TilePathLayout,

        /// Per-tile timeout in seconds
        #[arg(short, long)]
        timeout_secs: Option<u64>,

        /// Output format: table (default), json, csv
        #[arg(short, long, default_value = "table")]
        output: String,
    },

    /// Log in and list converted volumes
    Volumes {
        /// Backend URL
        #[arg(short, long, default_value = "http://localhost:9000", env = "PROBE_BASE_URL")]
        url: String,

        #[arg(long, env = "PROBE_USERNAME")]
        username: String,

        #[arg(long, env = "PROBE_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Show server memory and cache usage
    Memory {
        /// Backend URL
        #[arg(short, long, default_value = "http://localhost:9000", env = "PROBE_BASE_URL")]
        url: String,

        #[arg(long, env = "PROBE_USERNAME")]
        username: String,

        #[arg(long, env = "PROBE_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Delete a converted volume (admin only)
    Delete {
        /// Volume name
        #[arg(short, long)]
        volume: String,

        /// Backend URL
        #[arg(short, long, default_value = "http://localhost:9000", env = "PROBE_BASE_URL")]
        url: String,

        #[arg(long, env = "PROBE_USERNAME")]
        username: String,

        #[arg(long, env = "PROBE_PASSWORD", hide_env_values = true)]
        password: String,

        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },

    /// Show the precomputed info of a volume
    Info {
        /// Volume name
        #[arg(short, long)]
        volume: String,

        /// Backend URL
        #[arg(short, long, default_value = "http://localhost:9000", env = "PROBE_BASE_URL")]
        url: String,

        /// Tile mount (defaults to {url}/precomp)
        #[arg(short, long)]
        mount: Option<String>,
    },

    /// List available scenarios
    List {
        /// Scenarios directory
        #[arg(short, long, default_value = "scenarios")]
        dir: PathBuf,
    },
}

fn count_arg(input: &str) -> Result<i64, String> {
    parse_count(input).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            scenario,
            count,
            level,
            timeout_secs,
            output,
        } => {
            let mut config = ProbeConfig::from_file(&scenario)
                .with_context(|| format!("loading scenario {}", scenario.display()))?;

            // Apply overrides
            if let Some(c) = count {
                config.count = c;
            }
            if let Some(l) = level {
                config.level = l;
            }
            if timeout_secs.is_some() {
                config.timeout_secs = timeout_secs;
            }

            execute_probe(config, &output).await
        }
        Commands::Quick {
            volume,
            level,
            count,
            url,
            mount,
            layout,
            timeout_secs,
            output,
        } => {
            let mut config = ProbeConfig::quick(url, volume);
            config.level = level;
            config.count = count;
            config.tile_mount = mount;
            config.layout = layout;
            config.timeout_secs = timeout_secs;

            execute_probe(config, &output).await
        }
        Commands::Volumes {
            url,
            username,
            password,
        } => {
            let api = ApiClient::new(url);
            let session = api.login(&username, &password).await?;
            let volumes = api.list_volumes(&session).await?;

            if volumes.is_empty() {
                println!("No converted volumes found");
            }
            for volume in &volumes {
                let dims = volume
                    .dimensions
                    .map(|d| format!("{}x{}x{}", d[0], d[1], d[2]))
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "  {} [{}] {}",
                    volume.name,
                    volume.location.as_deref().unwrap_or("default"),
                    dims
                );
                println!("    {}", volume.info_url);
            }

            session.logout();
            Ok(())
        }
        Commands::Memory {
            url,
            username,
            password,
        } => {
            let api = ApiClient::new(url);
            let session = api.login(&username, &password).await?;
            let status = api.memory_status(&session).await?;

            println!(
                "Server memory: {:.1}MB ({:.1}%)",
                status.memory.process_mb, status.memory.system_percent
            );
            println!(
                "Cache usage:   {:.1}MB / {}MB",
                status.cache.cache_size_mb, status.config.cache_max_size_mb
            );
            println!("Cache hits:    {:.1}%", status.cache.hit_rate * 100.0);

            session.logout();
            Ok(())
        }
        Commands::Delete {
            volume,
            url,
            username,
            password,
            yes,
        } => {
            if !yes {
                anyhow::bail!("refusing to delete '{}' without --yes", volume);
            }
            let api = ApiClient::new(url);
            let session = api.login(&username, &password).await?;
            if !session.is_admin() {
                warn!(login_id = %session.login_id(), "Deleting volumes usually requires the admin role");
            }
            let message = api.delete_volume(&session, &volume).await?;
            println!("{}", message);

            session.logout();
            Ok(())
        }
        Commands::Info { volume, url, mount } => {
            let mut config = ProbeConfig::quick(url, volume);
            config.tile_mount = mount;
            let api = ApiClient::new(config.base_url.clone());
            let info = api.volume_info(&config.mount(), &config.volume).await?;

            println!(
                "{}: {} / {} / {} channel(s)",
                config.volume, info.volume_type, info.data_type, info.num_channels
            );
            for scale in &info.scales {
                let (cols, rows) = scale.grid_extent();
                println!(
                    "  level {}: size {:?}, chunk {:?}, {}x{} chunks, encoding {}",
                    scale.key,
                    scale.size,
                    scale.chunk_sizes.first(),
                    cols,
                    rows,
                    scale.encoding
                );
            }
            Ok(())
        }
        Commands::List { dir } => {
            println!("Available scenarios in {}:", dir.display());
            println!();

            let entries = std::fs::read_dir(&dir)
                .with_context(|| format!("reading scenario directory {}", dir.display()))?;

            let mut scenarios = Vec::new();
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().and_then(|s| s.to_str()) != Some("yaml") {
                    continue;
                }
                match ProbeConfig::from_file(&path) {
                    Ok(config) => scenarios.push((
                        entry.file_name().to_string_lossy().to_string(),
                        config.name,
                        config.description,
                    )),
                    Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable scenario"),
                }
            }

            scenarios.sort_by(|a, b| a.0.cmp(&b.0));

            if scenarios.is_empty() {
                println!("No scenario files found");
            } else {
                for (filename, name, desc) in scenarios {
                    println!("  {} - {}", filename, name);
                    println!("    {}", desc);
                    println!();
                }
            }
            Ok(())
        }
    }
}

async fn execute_probe(config: ProbeConfig, output: &str) -> anyhow::Result<()> {
    config.validate()?;

    if config.check_info {
        check_volume_info(&config).await;
    }

    let fetcher = HttpTileFetcher::default().with_timeout(config.timeout());
    let progress = ProgressBar::new(config.count as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} tiles")?
            .progress_chars("##-"),
    );

    let mut runner =
        ProbeRunner::new(Arc::new(fetcher), config.runner_options()).with_progress(progress);

    // Ctrl-C stops the batch; in-flight tiles are reported as cancelled.
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    let batch = runner.run_with_cancel(config.request(), cancel).await?;
    let summary = ProbeSummary::from_batch(batch);

    match output {
        "json" => println!("{}", ProbeReport::format_json(batch, &summary)?),
        "csv" => {
            println!("{}", ProbeReport::csv_header());
            println!("{}", ProbeReport::format_csv(batch));
        }
        _ => {
            println!("{}", ProbeReport::format_table(batch));
            println!("{}", ProbeReport::format_summary(&summary));
        }
    }

    Ok(())
}

/// Warn when the requested level or raster extent does not fit the volume.
async fn check_volume_info(config: &ProbeConfig) {
    let api = ApiClient::new(config.base_url.clone());
    let info = match api.volume_info(&config.mount(), &config.volume).await {
        Ok(info) => info,
        Err(e) => {
            warn!(volume = %config.volume, error = %e, "Could not load volume info");
            return;
        }
    };

    match info.scale(config.level.trim()) {
        Ok(scale) => {
            let (cols, rows) = scale.grid_extent();
            let needed_rows = (config.count as u64).div_ceil(config.row_width as u64);
            if config.row_width as u64 > cols || needed_rows > rows {
                warn!(
                    cols,
                    rows,
                    row_width = config.row_width,
                    count = config.count,
                    "Probe extends past the level's chunk grid; expect 404s"
                );
            }
            info!(level = %scale.key, size = ?scale.size, "Volume info loaded");
        }
        Err(e) => warn!(error = %e, "Requested level not listed in volume info"),
    }
}
