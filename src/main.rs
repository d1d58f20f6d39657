pub mod charts;
pub mod config;
pub mod data;
pub mod map;
pub mod mobility;
pub mod page;
pub mod regions;
pub mod selection;
pub mod server;
pub mod stats;
pub mod types;

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the interactive province dashboard
    Serve {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Write the map, the twelve charts and an index.html for one province
    Render {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
        /// Province to render; defaults to the first one in the dataset
        #[arg(short, long)]
        province: Option<String>,
        #[arg(short, long, value_name = "DIR", default_value = "output")]
        out: PathBuf,
    },
    /// List province names in dataset order
    Provinces {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Serve { config } => {
            info!("Serving dashboard with config: {:?}", config);
            let app_config = config::AppConfig::load_from_file(config)?;
            server::start_server(app_config).await?;
        }
        Commands::Render { config, province, out } => {
            let app_config = config::AppConfig::load_from_file(config)?;
            let client = reqwest::Client::builder().gzip(true).build()?;
            let regions = data::load_regions(&client, &app_config.regions).await?;

            let mut selection = selection::Selection::new(&regions);
            if let Some(name) = province {
                if !selection.select(&regions, name) {
                    return Err(anyhow!("Unknown province: {}", name));
                }
            }

            let renderer = charts::ChartRenderer::new(&app_config.charts)?;
            let dashboard = page::Dashboard::render(&app_config, &regions, &renderer, &selection)?;

            // 1. Map
            fs::create_dir_all(out).with_context(|| format!("Failed to create output directory {:?}", out))?;
            fs::write(out.join("map.svg"), &dashboard.map_svg)?;

            // 2. Charts
            for (i, chart) in dashboard.charts.iter().enumerate() {
                fs::write(out.join(format!("chart_{:02}.svg", i + 1)), chart)?;
            }

            // 3. Page
            fs::write(out.join("index.html"), dashboard.to_html())?;

            info!("Rendered {} into {:?}", dashboard.province, out);
        }
        Commands::Provinces { config } => {
            let app_config = config::AppConfig::load_from_file(config)?;
            let client = reqwest::Client::builder().gzip(true).build()?;
            let regions = data::load_regions(&client, &app_config.regions).await?;
            for name in regions.names() {
                println!("{}", name);
            }
        }
    }

    Ok(())
}
