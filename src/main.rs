use anyhow::{Context, Result};
use arabic_news_bert::{pipeline, ClassificationReport, PipelineConfig};
use burn::{config::Config, tensor::backend::AutodiffBackend};
use clap::Parser;
use std::path::PathBuf;

/// Fine-tunes a pretrained BERT on Arabic news topics and reports test-set metrics.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// JSON file with a saved PipelineConfig; flags below override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the classification report as JSON to this file
    #[arg(long)]
    report: Option<PathBuf>,

    #[arg(long)]
    data_dir: Option<String>,

    #[arg(long)]
    cache_dir: Option<String>,

    /// english, chinese or multilingual (arabic is accepted as multilingual)
    #[arg(long)]
    language: Option<String>,

    #[arg(long)]
    max_seq_length: Option<usize>,

    #[arg(long)]
    batch_size: Option<usize>,

    /// Data loader threads; 0 loads batches on the main thread
    #[arg(long)]
    num_workers: Option<usize>,

    #[arg(long)]
    num_epochs: Option<usize>,

    #[arg(long)]
    train_fraction: Option<f64>,

    #[arg(long)]
    sample_size: Option<usize>,

    #[arg(long)]
    seed: Option<u64>,

    #[arg(long)]
    learning_rate: Option<f64>,

    #[arg(long)]
    warmup_proportion: Option<f64>,

    #[arg(long)]
    weight_decay: Option<f32>,

    #[arg(long)]
    log_interval: Option<usize>,

    #[arg(long)]
    dataset_file: Option<String>,

    /// Hugging Face dataset repository holding the corpus file
    #[arg(long)]
    dataset_repo: Option<String>,
}

impl Cli {
    fn pipeline_config(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::load(path)
                .map_err(|e| anyhow::anyhow!("cannot load config '{}': {e}", path.display()))?,
            None => PipelineConfig::new(),
        };

        macro_rules! apply {
            ($($field:ident),*) => {
                $(if let Some(value) = self.$field.clone() {
                    config.$field = value;
                })*
            };
        }
        apply!(
            data_dir,
            cache_dir,
            language,
            max_seq_length,
            batch_size,
            num_workers,
            num_epochs,
            train_fraction,
            sample_size,
            seed,
            learning_rate,
            warmup_proportion,
            weight_decay,
            log_interval,
            dataset_file
        );
        if self.dataset_repo.is_some() {
            config.dataset_repo = self.dataset_repo.clone();
        }
        Ok(config)
    }
}

fn launch<B: AutodiffBackend>(
    config: &PipelineConfig,
    device: B::Device,
) -> Result<ClassificationReport> {
    Ok(pipeline::run::<B>(config, device)?)
}

#[cfg(feature = "wgpu")]
mod backend {
    use super::*;
    use burn::backend::wgpu::{AutoGraphicsApi, Wgpu, WgpuDevice};
    use burn::backend::Autodiff;

    pub fn run(config: &PipelineConfig) -> Result<ClassificationReport> {
        launch::<Autodiff<Wgpu<AutoGraphicsApi, f32, i32>>>(config, WgpuDevice::default())
    }
}

#[cfg(all(any(feature = "tch-cpu", feature = "tch-gpu"), not(feature = "wgpu")))]
mod backend {
    use super::*;
    use burn::backend::libtorch::{LibTorch, LibTorchDevice};
    use burn::backend::Autodiff;

    pub fn run(config: &PipelineConfig) -> Result<ClassificationReport> {
        #[cfg(feature = "tch-gpu")]
        let device = LibTorchDevice::Cuda(0);
        #[cfg(not(feature = "tch-gpu"))]
        let device = LibTorchDevice::Cpu;

        launch::<Autodiff<LibTorch>>(config, device)
    }
}

#[cfg(not(any(feature = "wgpu", feature = "tch-cpu", feature = "tch-gpu")))]
mod backend {
    use super::*;
    use burn::backend::ndarray::{NdArray, NdArrayDevice};
    use burn::backend::Autodiff;

    pub fn run(config: &PipelineConfig) -> Result<ClassificationReport> {
        launch::<Autodiff<NdArray<f32>>>(config, NdArrayDevice::Cpu)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("arabic_news_bert=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.pipeline_config()?;
    tracing::info!("Running with {config:?}");

    let report = backend::run(&config)?;
    println!("{report}");

    if let Some(path) = &cli.report {
        std::fs::write(path, report.to_json()?)
            .with_context(|| format!("cannot write report to '{}'", path.display()))?;
        tracing::info!("Report written to '{}'", path.display());
    }
    Ok(())
}
