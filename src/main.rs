use anyhow::Result;
use clap::Parser;
use onnx_medscan::{config::Config, web::serve};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "onnx-medscan")]
#[command(about = "ONNX-powered medical image classification service")]
struct Args {
    /// Server host
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Server port
    #[arg(long, env = "PORT", default_value_t = 5000)]
    port: u16,

    /// Number of worker threads
    #[arg(long)]
    workers: Option<usize>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Model directory path
    #[arg(long, env = "MODELS_DIR", default_value = "models")]
    models_dir: String,

    /// Load models on first request instead of at startup
    #[arg(long)]
    lazy: bool,

    /// Enable development mode
    #[arg(long)]
    dev: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // 初始化日志系统
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .with_target(false)
        .init();

    let config = Config::new(
        args.host,
        args.port,
        args.models_dir,
        args.workers,
        args.dev,
        args.lazy,
    )?;

    tracing::info!("Starting ONNX medical imaging service...");
    tracing::info!("Bind address: {}", config.bind_addr());
    tracing::info!("Models directory: {}", config.models_dir.display());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.workers)
        .enable_all()
        .build()?;

    runtime.block_on(serve(config))?;

    Ok(())
}
