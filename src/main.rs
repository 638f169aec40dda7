use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use shoecommend::recommend::Recommender;
use shoecommend::server::RecommendResponse;
use shoecommend::{config, server, FeatureExtractor};

#[derive(Parser)]
#[command(name = "shoecommend")]
#[command(version, about = "Recommend shoes that match an outfit photo")]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP recommendation service
    Serve {
        /// Address to bind, overrides the config file
        #[arg(short, long)]
        bind: Option<String>,
    },
    /// Rank the catalog against a local outfit image and print the JSON result
    Recommend {
        #[arg(short, long)]
        image: PathBuf,
    },
    /// Print the embedding size and norm for a local image
    Embed {
        #[arg(short, long)]
        image: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_target(false)
        .format_timestamp(None)
        .init();

    let cli = Cli::parse();
    let mut cfg = config::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                cfg.bind = bind;
            }
            serve(&cfg)
        }
        Commands::Recommend { image } => recommend(&cfg, &image),
        Commands::Embed { image } => embed(&cfg, &image),
    }
}

fn serve(cfg: &config::Config) -> Result<()> {
    // Built before the runtime starts: the HTTP clients inside are blocking.
    let recommender = Arc::new(Recommender::from_config(cfg)?);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    runtime.block_on(server::serve(recommender.clone(), cfg))?;
    drop(runtime);

    Ok(())
}

fn recommend(cfg: &config::Config, image: &Path) -> Result<()> {
    let bytes =
        std::fs::read(image).with_context(|| format!("reading {}", image.display()))?;
    let recommender = Recommender::from_config(cfg)?;

    let recommendations = recommender.recommend(&bytes)?;
    info!("✓ {} recommendation(s)", recommendations.len());

    let body = serde_json::to_string_pretty(&RecommendResponse { recommendations })?;
    println!("{}", body);
    Ok(())
}

fn embed(cfg: &config::Config, image: &Path) -> Result<()> {
    let img = image::open(image).with_context(|| format!("opening {}", image.display()))?;
    let mut extractor = FeatureExtractor::load(&cfg.model_path, cfg.input_layout)
        .context("Failed to initialize feature extractor")?;

    let embedding = extractor.extract(&img)?;
    println!(
        "{}: length {}, norm {:.4}",
        image.display(),
        embedding.len(),
        embedding.norm()
    );
    Ok(())
}
