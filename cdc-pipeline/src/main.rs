use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use cdc_common::err::CResult;
use cdc_common::log::{OutputType, TracingFactory, TracingFactoryOptions};
use cdc_common::{Metrics, ReError};
use cdc_config::{ConfigLoader, ConfigWatcher};
use cdc_offsets::FileOffsetStore;
use cdc_pipeline::controller::PipelineController;
use cdc_publish::KafkaPublisher;
use cdc_schema::SchemaTracker;
use clap::Parser;
use tracing::{error, info};

#[derive(Parser, Debug, Clone)]
#[command(name = "cdc-pipeline")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Change-data-capture pipeline: database source to Kafka-style broker")]
struct CliArgs {
    #[arg(short, long, env = "CDC_CONFIG_PATH", help = "path to the pipeline configuration file", value_name = "FILE")]
    config: PathBuf,

    #[arg(long, env = "CDC_OFFSET_DIR", help = "directory for offset store files", default_value = "/var/lib/cdc-pipeline/offsets")]
    offset_dir: PathBuf,

    #[arg(short, long, help = "enable debug logging", default_value_t = false)]
    debug: bool,

    #[arg(long, help = "directory for rolling log files; stdout if omitted")]
    log_dir: Option<String>,
}

#[tokio::main]
async fn main() -> CResult<()> {
    let args = CliArgs::parse();

    let output_type = if args.log_dir.is_some() { OutputType::RollingFile } else { OutputType::Stdout };
    let log_factory = TracingFactory::init_log_with_options(TracingFactoryOptions::new(args.debug, output_type, args.log_dir.clone()));

    eprintln!();
    eprintln!("╔═╗╔╦╗╔═╗  ╔═╗╦╔═╗╔═╗╦  ╦╔╗╔╔═╗");
    eprintln!("║   ║║║    ╠═╝║╠═╝║╣ ║  ║║║║║╣ ");
    eprintln!("╚═╝═╩╝╚═╝  ╩  ╩╩  ╚═╝╩═╝╩╝╚╝╚═╝ database-to-broker change capture");
    eprintln!();

    info!(log_dir = %log_factory.get_log_dir(), config = %args.config.display(), "starting cdc-pipeline");

    let loader = ConfigLoader::new(&args.config);
    let aggregate = loader.load()?;

    let offsets = Arc::new(FileOffsetStore::new(&args.offset_dir));
    offsets.ensure_dir().await?;

    let metrics = Arc::new(Metrics::new());
    let publisher = Arc::new(KafkaPublisher::new(aggregate.kafka.clone(), metrics.clone())?);
    let schema = Arc::new(SchemaTracker::new());

    let controller = Arc::new(PipelineController::new(schema, offsets, publisher, metrics));
    controller.start(aggregate.clone()).await?;
    info!("pipeline started");

    let watcher = Arc::new(ConfigWatcher::new(loader, aggregate));
    let (config_tx, config_rx) = tokio::sync::mpsc::unbounded_channel();
    let (watcher_shutdown_tx, watcher_shutdown_rx) = tokio::sync::oneshot::channel();

    let watcher_task = {
        let watcher = watcher.clone();
        tokio::spawn(async move { watcher.watch(config_tx, watcher_shutdown_rx).await })
    };
    let changes_task = tokio::spawn(controller.clone().handle_config_changes(config_rx));

    tokio::signal::ctrl_c().await.map_err(|e| ReError::Bug(format!("failed to listen for ctrl-c: {e}")))?;
    info!("shutdown signal received, stopping pipeline");

    let _ = watcher_shutdown_tx.send(());
    let _ = watcher_task.await;
    changes_task.abort();

    match tokio::time::timeout(Duration::from_secs(30), controller.stop()).await {
        Ok(Ok(())) => info!("pipeline stopped cleanly"),
        Ok(Err(err)) => error!(error = %err, "error while stopping pipeline"),
        Err(_) => error!("pipeline did not stop within the shutdown deadline"),
    }

    Ok(())
}
