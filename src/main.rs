pub mod types;
pub mod config;
pub mod data;
pub mod scale;
pub mod projection;
pub mod path;
pub mod render;
pub mod interaction;
pub mod tooltip;
pub mod server;

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
    /// Render the choropleth to a standalone SVG file
    Render {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Serve the interactive map
    Serve {
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
        Commands::Render { config } => {
            info!("Rendering map with config: {:?}", config);
            let app_config = config::AppConfig::load_from_file(config)?;

            // 1. Load Data
            let dataset = data::load_dataset(&app_config)?;

            // 2. Fit projection to the data
            let bounds = dataset.bounds().ok_or_else(|| anyhow!("Dataset has no geometry"))?;
            let projection = projection::Projection::fit(
                bounds,
                app_config.canvas.width,
                app_config.canvas.height,
            )?;
            info!("Fitted projection scale {:.1}", projection.scale());

            // 3. Build and draw layers
            let scale = scale::ColorScale::new(app_config.scale.domain, app_config.scale.palette.clone())?;
            let layers = render::MapLayers::build(&app_config, &dataset, &projection, &scale)?;
            let mut svg = render::SvgRenderer::default();
            render::draw_map(&mut svg, app_config.canvas.width, app_config.canvas.height, &layers);

            // 4. Write
            let out = &app_config.output.svg;
            if let Some(dir) = out.parent().filter(|d| !d.as_os_str().is_empty()) {
                fs::create_dir_all(dir)
                    .with_context(|| format!("Failed to create output directory: {:?}", dir))?;
            }
            fs::write(out, svg.to_svg())
                .with_context(|| format!("Failed to write SVG: {:?}", out))?;

            info!("Wrote {:?}", out);
        }
        Commands::Serve { config } => {
            info!("Serving map with config: {:?}", config);
            let app_config = config::AppConfig::load_from_file(config)?;
            let dataset = data::load_dataset(&app_config)?;

            server::start_server(app_config, dataset).await?;
        }
    }

    Ok(())
}
