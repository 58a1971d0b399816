//! OBD Sentinel - Main Entry Point
//!
//! Edge telemetry service: reads the vehicle over an ELM327 link, labels
//! each reading, records the training corpus and ships batches to the
//! remote store. `train` rebuilds the health model from the recorded
//! corpus, `probe` checks the adapter without starting the collector.

mod logic;
pub mod constants;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::{Parser, Subcommand};

use logic::collector::Collector;
use logic::config::CollectorConfig;
use logic::model::artifact::save_artifact;
use logic::session::ObdSession;

#[derive(Parser, Debug)]
#[command(name = "obd-sentinel")]
#[command(version = constants::APP_VERSION)]
#[command(about = "Vehicle health telemetry collector", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Collect readings until interrupted (default)
    Run,
    /// Train the health model from the recorded corpus
    Train,
    /// Check the adapter link and report what the vehicle supports
    Probe,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    log::info!("Starting {} v{}", constants::APP_NAME, constants::APP_VERSION);

    let config = match CollectorConfig::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            log::error!("Configuration rejected: {}", e);
            std::process::exit(2);
        }
    };

    let code = match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_collector(config),
        Commands::Train => train_model(&config),
        Commands::Probe => probe_link(&config),
    };
    std::process::exit(code);
}

/// Run the read loop on a worker thread and wait for Ctrl-C. The worker
/// owns the whole pipeline; main only handles shutdown.
fn run_collector(config: CollectorConfig) -> i32 {
    let collector = Collector::new(config);
    let stop = Arc::new(AtomicBool::new(false));

    let worker_stop = Arc::clone(&stop);
    let (done_tx, done_rx) = tokio::sync::oneshot::channel::<()>();
    let worker = std::thread::spawn(move || {
        let result = collector.run(worker_stop);
        let _ = done_tx.send(());
        result
    });

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to create tokio runtime for shutdown handling");
    rt.block_on(async {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                log::info!("Shutdown signal received");
            }
            _ = done_rx => {
                log::warn!("Collector loop ended on its own");
            }
        }
    });

    stop.store(true, Ordering::SeqCst);
    match worker.join() {
        Ok(Ok(())) => 0,
        Ok(Err(e)) => {
            log::error!("Link initialization failed: {}", e);
            1
        }
        Err(_) => {
            log::error!("Collector thread panicked");
            1
        }
    }
}

fn train_model(config: &CollectorConfig) -> i32 {
    let corpus_dir = constants::data_dir().join("dataset");
    let records = match logic::dataset::load_corpus(&corpus_dir) {
        Ok(r) => r,
        Err(e) => {
            log::error!(
                "Failed to read corpus under {}: {}",
                corpus_dir.display(),
                e
            );
            return 1;
        }
    };

    let (artifact, report) = match logic::model::train(&records, &config.trainer) {
        Ok(out) => out,
        Err(e) => {
            log::error!("Training failed: {}", e);
            return 1;
        }
    };

    let model_path = constants::model_path();
    if let Err(e) = save_artifact(&model_path, &artifact) {
        log::error!("Failed to write model artifact: {}", e);
        return 1;
    }
    let sidecar = model_path.with_file_name(constants::MODEL_SIDECAR_FILE);
    if let Err(e) = report.save(&sidecar) {
        log::error!("Failed to write training report: {}", e);
        return 1;
    }

    log::info!(
        "Model written to {} (accuracy {:.3} over {} held-out records)",
        model_path.display(),
        report.accuracy,
        report.test_count
    );
    0
}

fn probe_link(config: &CollectorConfig) -> i32 {
    match ObdSession::open(&config.link_candidates, config.link_timeout()) {
        Ok(mut session) => {
            log::info!("Adapter answered on {}", session.endpoint());
            log::info!("Vehicle signature {}", session.vehicle_signature());
            log::info!("{} PIDs in the read cycle", session.cycle_len());
            let reading = session.read_cycle();
            log::info!(
                "Sample read: {}/{} parameters decoded",
                reading.decoded,
                reading.attempted
            );
            session.close();
            0
        }
        Err(e) => {
            log::error!("Probe failed: {}", e);
            1
        }
    }
}
