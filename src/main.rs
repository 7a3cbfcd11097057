pub mod types;
pub mod config;
pub mod data;
pub mod processing;
pub mod controls;
pub mod render;
pub mod server;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct SelectionArgs {
    /// Narrows the municipality list by substring
    #[arg(long)]
    search: Option<String>,
    #[arg(long)]
    municipality: Option<String>,
    #[arg(long)]
    price_category: Option<String>,
    /// Omit to aggregate every period
    #[arg(long)]
    period: Option<String>,
    #[arg(long, value_parser = clap::value_parser!(u32).range(0..=99))]
    age_min: Option<u32>,
    #[arg(long, value_parser = clap::value_parser!(u32).range(0..=99))]
    age_max: Option<u32>,
}

impl From<SelectionArgs> for controls::SelectionRequest {
    fn from(args: SelectionArgs) -> Self {
        Self {
            municipality_search: args.search,
            municipality: args.municipality,
            price_category: args.price_category,
            period: args.period,
            age_min: args.age_min,
            age_max: args.age_max,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Render the price map for one selection to a standalone HTML page
    Render {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
        #[arg(short, long, value_name = "FILE", default_value = "map.html")]
        out: PathBuf,
        /// Also write the markers as GeoJSON
        #[arg(long, value_name = "FILE")]
        geojson: Option<PathBuf>,
        #[command(flatten)]
        selection: SelectionArgs,
    },
    /// List the values each selector offers
    Options {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
        #[arg(long, default_value = "")]
        search: String,
    },
    /// Serve the interactive viewer
    Serve {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Render { config, out, geojson, selection } => {
            info!("Rendering map with config: {:?}", config);
            let app_config = config::AppConfig::load_from_file(&config)?;
            let table = data::load_transactions(&app_config.input.data_csv)?;

            let request = controls::SelectionRequest::from(selection);
            let prefecture = &app_config.filters.prefecture;
            let (criteria, outcome) = match controls::resolve(&table, prefecture, &request)? {
                controls::Selection::Criteria(criteria) => {
                    let outcome = processing::run(&table, &criteria);
                    (Some(criteria), outcome)
                }
                controls::Selection::NoMunicipality => (None, types::PipelineOutcome::Empty),
            };

            match &outcome {
                types::PipelineOutcome::Empty => warn!("{}", render::EMPTY_NOTICE),
                types::PipelineOutcome::Points { points, centroid } => info!(
                    "Aggregated {} points around ({}, {})",
                    points.len(),
                    centroid.latitude,
                    centroid.longitude
                ),
            }

            let search = request.municipality_search.as_deref().unwrap_or("");
            let options = controls::options(&table, prefecture, search);
            render::write_page(&out, &render::PageView {
                options: &options,
                search,
                criteria: criteria.as_ref(),
                outcome: &outcome,
                map: &app_config.map,
                interactive: false,
            })?;

            if let Some(path) = geojson {
                render::write_geojson(&path, &outcome)?;
            }

            info!("Render complete!");
        }
        Commands::Options { config, search } => {
            let app_config = config::AppConfig::load_from_file(&config)?;
            let table = data::load_transactions(&app_config.input.data_csv)?;
            let options = controls::options(&table, &app_config.filters.prefecture, &search);
            println!("{}", serde_json::to_string_pretty(&options)?);
        }
        Commands::Serve { config } => {
            info!("Serving viewer with config: {:?}", config);
            let app_config = config::AppConfig::load_from_file(&config)?;

            // Loaded once; every request reads this table.
            let table = data::load_transactions(&app_config.input.data_csv)?;

            server::start_server(app_config, table).await?;
        }
    }

    Ok(())
}
