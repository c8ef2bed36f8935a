//! Model Optimizer CLI
//!
//! Inspect glTF / GLB files, run them through the optimization pipeline and
//! warm the scene cache for a batch of files.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use futures::StreamExt;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use model_optimizer_core::{
    AssetFetcher, ErrorRecovery, OptimizationSettings, PipelineConfig, RetryConfig, Scene,
    SceneDecoder, Tier,
};
use model_optimizer_loader::{
    CacheStats, FileFetcher, GltfDecoder, ModelLoader, PerformanceMetrics,
};
use model_optimizer_processing::{SceneInspector, SceneStats};

#[derive(Parser)]
#[command(name = "model-optimizer")]
#[command(about = "Optimize and cache 3D models for real-time rendering")]
#[command(version)]
struct Cli {
    /// Pipeline configuration file (YAML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Cache budget in MiB, overrides the configuration file
    #[arg(long, global = true)]
    budget_mb: Option<u64>,

    /// Output format
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Summary)]
    format: OutputFormat,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print statistics of a model as decoded, without optimizing it
    Inspect {
        /// Input glTF or GLB file
        input: PathBuf,
    },

    /// Run a model through the optimization pipeline
    Optimize {
        /// Input glTF or GLB file
        input: PathBuf,

        #[command(flatten)]
        settings: SettingsArgs,

        /// Extra attempts after a failed load
        #[arg(long, default_value = "0")]
        retries: usize,
    },

    /// Load several models concurrently into the cache
    Preload {
        /// Input glTF or GLB files
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        #[command(flatten)]
        settings: SettingsArgs,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Summary,
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
enum Preset {
    Default,
    LowEnd,
    HighEnd,
}

#[derive(Args)]
struct SettingsArgs {
    /// Starting point for the settings below
    #[arg(long, value_enum, default_value_t = Preset::Default)]
    preset: Preset,

    /// Texture resolution tier (low, medium, high)
    #[arg(long)]
    texture_resolution: Option<Tier>,

    /// LOD decimation strength (low, medium, high)
    #[arg(long)]
    compression: Option<Tier>,

    /// Farthest LOD switch distance
    #[arg(long)]
    max_distance: Option<f32>,

    /// Skip LOD generation
    #[arg(long)]
    no_lod: bool,

    /// Leave frustum culling disabled on meshes
    #[arg(long)]
    no_culling: bool,
}

impl SettingsArgs {
    fn resolve(&self) -> OptimizationSettings {
        let mut settings = match self.preset {
            Preset::Default => OptimizationSettings::default(),
            Preset::LowEnd => OptimizationSettings::low_end(),
            Preset::HighEnd => OptimizationSettings::high_end(),
        };
        if let Some(tier) = self.texture_resolution {
            settings.texture_resolution = tier;
        }
        if let Some(tier) = self.compression {
            settings.compression_level = tier;
        }
        if let Some(distance) = self.max_distance {
            settings.max_distance = distance;
        }
        settings.enable_lod &= !self.no_lod;
        settings.enable_frustum_culling &= !self.no_culling;
        settings
    }
}

#[derive(Serialize)]
struct InspectOutput<'a> {
    file: String,
    name: Option<&'a str>,
    stats: SceneStats,
}

#[derive(Serialize)]
struct OptimizeOutput {
    file: String,
    settings: OptimizationSettings,
    stats: SceneStats,
    elapsed_ms: f64,
    metrics: PerformanceMetrics,
}

#[derive(Serialize)]
struct PreloadOutput {
    loaded: Vec<String>,
    failed: Vec<(String, String)>,
    cache: CacheStats,
}

fn init_tracing(log_json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn load_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::load_from_path(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if let Some(mb) = cli.budget_mb {
        config.cache_max_bytes = mb.saturating_mul(1024 * 1024);
    }
    config.validate()?;
    debug!("Pipeline configuration: {:?}", config);
    Ok(config)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_stats(stats: &SceneStats) {
    println!("  Meshes: {}", stats.meshes);
    println!("  Triangles: {}", stats.triangles);
    println!("  Vertices: {}", stats.vertices);
    println!("  Materials: {}", stats.materials);
    println!("  Textures: {}", stats.textures);
    println!("  Complexity: {}", stats.complexity);
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);
    let config = load_config(&cli)?;

    match &cli.command {
        Commands::Inspect { input } => inspect_command(input, &config, cli.format).await,
        Commands::Optimize {
            input,
            settings,
            retries,
        } => optimize_command(input, config, settings.resolve(), *retries, cli.format).await,
        Commands::Preload { inputs, settings } => {
            preload_command(inputs, config, settings.resolve(), cli.format).await
        }
    }
}

async fn decode_file(input: &Path, config: &PipelineConfig) -> Result<Scene> {
    let url = input.to_string_lossy().to_string();
    let bytes = FileFetcher::new().fetch(&url).await?;
    let decoder = GltfDecoder::new().with_decoder_path(config.decoder_path.clone());
    let scene = tokio::task::spawn_blocking(move || decoder.decode(&bytes, &url)).await??;
    Ok(scene)
}

async fn inspect_command(
    input: &Path,
    config: &PipelineConfig,
    format: OutputFormat,
) -> Result<()> {
    let scene = decode_file(input, config).await?;
    let output = InspectOutput {
        file: input.display().to_string(),
        name: scene.name.as_deref(),
        stats: SceneInspector::new().inspect(&scene),
    };

    match format {
        OutputFormat::Json => print_json(&output),
        OutputFormat::Summary => {
            println!("Model: {}", output.file);
            if let Some(name) = output.name {
                println!("  Scene: {}", name);
            }
            print_stats(&output.stats);
            Ok(())
        }
    }
}

async fn optimize_command(
    input: &Path,
    config: PipelineConfig,
    settings: OptimizationSettings,
    retries: usize,
    format: OutputFormat,
) -> Result<()> {
    let url = input.to_string_lossy().to_string();
    let loader = ModelLoader::from_config(config);
    let recovery = ErrorRecovery::new(RetryConfig {
        max_attempts: retries + 1,
        ..RetryConfig::for_network()
    });

    let started = Instant::now();
    let scene = recovery
        .retry_async(|| loader.load(&url, &settings, false))
        .await
        .with_context(|| format!("optimizing {}", url))?;
    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
    info!("Optimized {} in {:.1} ms", url, elapsed_ms);

    let output = OptimizeOutput {
        file: url,
        settings,
        stats: SceneInspector::new().inspect(&scene),
        elapsed_ms,
        metrics: loader.monitor().get_metrics().await,
    };

    match format {
        OutputFormat::Json => print_json(&output),
        OutputFormat::Summary => {
            println!("✓ Optimized {} in {:.1} ms", output.file, output.elapsed_ms);
            println!(
                "  Settings: compression {}, textures {}, LOD {}, culling {}, max distance {}",
                settings.compression_level,
                settings.texture_resolution,
                settings.enable_lod,
                settings.enable_frustum_culling,
                settings.max_distance
            );
            print_stats(&output.stats);
            println!(
                "  Cache: {} entries, {} / {} bytes",
                output.metrics.cache.entries,
                output.metrics.cache.current_size,
                output.metrics.cache.max_size
            );
            Ok(())
        }
    }
}

async fn preload_command(
    inputs: &[PathBuf],
    config: PipelineConfig,
    settings: OptimizationSettings,
    format: OutputFormat,
) -> Result<()> {
    let loader = ModelLoader::from_config(config);
    let urls = inputs
        .iter()
        .map(|p| p.to_string_lossy().to_string())
        .collect();

    let mut loaded = Vec::new();
    let mut failed = Vec::new();
    let mut outcomes = Box::pin(loader.preload(urls, settings));
    while let Some((url, result)) = outcomes.next().await {
        match result {
            Ok(()) => {
                if matches!(format, OutputFormat::Summary) {
                    println!("  ✓ {}", url);
                }
                loaded.push(url);
            }
            Err(e) => {
                if matches!(format, OutputFormat::Summary) {
                    println!("  ✗ {}: {}", url, e);
                }
                failed.push((url, e.to_string()));
            }
        }
    }

    let output = PreloadOutput {
        loaded,
        failed,
        cache: loader.cache().stats().await,
    };
    match format {
        OutputFormat::Json => print_json(&output)?,
        OutputFormat::Summary => {
            println!(
                "Preloaded {} of {} models ({} bytes cached, {:.0}% of budget)",
                output.loaded.len(),
                inputs.len(),
                output.cache.current_size,
                output.cache.utilization * 100.0
            );
        }
    }

    if output.failed.is_empty() {
        Ok(())
    } else {
        anyhow::bail!("{} model(s) failed to load", output.failed.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_flags_override_preset() {
        let cli = Cli::parse_from([
            "model-optimizer",
            "optimize",
            "chair.glb",
            "--preset",
            "low-end",
            "--texture-resolution",
            "high",
            "--no-lod",
        ]);
        let Commands::Optimize { settings, .. } = cli.command else {
            panic!("expected optimize");
        };
        let resolved = settings.resolve();
        assert_eq!(resolved.texture_resolution, Tier::High);
        assert_eq!(resolved.compression_level, Tier::High);
        assert_eq!(resolved.max_distance, 50.0);
        assert!(!resolved.enable_lod);
        assert!(resolved.enable_frustum_culling);
    }

    #[test]
    fn test_budget_override() {
        let cli = Cli::parse_from(["model-optimizer", "--budget-mb", "8", "inspect", "a.gltf"]);
        let config = load_config(&cli).unwrap();
        assert_eq!(config.cache_max_bytes, 8 * 1024 * 1024);
    }

    #[test]
    fn test_config_file_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("optimizer.yaml");
        std::fs::write(&path, "max_concurrent_loads: 3\n").unwrap();

        let cli = Cli::parse_from([
            "model-optimizer",
            "inspect",
            "a.gltf",
            "--config",
            path.to_str().unwrap(),
        ]);
        assert_eq!(load_config(&cli).unwrap().max_concurrent_loads, 3);
    }

    #[test]
    fn test_unknown_tier_rejected() {
        let parsed = Cli::try_parse_from([
            "model-optimizer",
            "optimize",
            "a.gltf",
            "--compression",
            "ultra",
        ]);
        assert!(parsed.is_err());
    }
}
