use anyhow::Result;
use clap::Parser;
use em540_exporter::metrics::PrometheusSink;
use em540_exporter::modbus::ModbusClient;
use em540_exporter::web::{self, AppState};
use em540_exporter::{APP_VERSION, Config, Poller};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};

/// Prometheus exporter for Carlo Gavazzi EM530/EM540 meters
#[derive(Debug, Parser)]
#[command(version = APP_VERSION)]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, env = "EM540_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref()).map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        e
    })?;

    em540_exporter::logging::init_logging(&config.logging)?;

    println!("EM540 exporter v{}\n", APP_VERSION);
    println!("Serial port  : {}", config.serial.port);
    println!("Port         : {}", config.web.port);

    let mut client = ModbusClient::new(&config.serial);
    client.connect()?;

    let sink = Arc::new(PrometheusSink::new(&config.metrics.namespace)?);
    let mut poller = Poller::new(
        client,
        sink.clone(),
        config.serial.unit_id,
        Duration::from_millis(config.poll_interval_ms),
    );

    // Identification must succeed before anything is served
    let identity = poller
        .prime()
        .await
        .map_err(|e| anyhow::anyhow!("Device identification failed: {}", e))?;
    for line in identity.report_lines() {
        println!("{}", line);
    }

    let listener = web::bind(&config.web.host, config.web.port).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let state = AppState {
        sink,
        identity: Arc::new(identity),
    };
    let web_task = tokio::spawn(web::serve(listener, state, shutdown_rx.clone()));

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl-C received, shutting down");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => {
                error!("Failed to listen for Ctrl-C: {}", e);
                // Dropping the sender would stop the poller
                std::future::pending::<()>().await;
            }
        }
    });

    let result = poller.run(shutdown_rx).await;
    if result.is_err() {
        web_task.abort();
    } else {
        match web_task.await {
            Ok(Err(e)) => error!("Web server error: {}", e),
            Err(e) => error!("Web server task failed: {}", e),
            Ok(Ok(())) => {}
        }
    }

    match result {
        Ok(()) => {
            info!("Exporter shutdown complete");
            Ok(())
        }
        Err(e) => {
            error!("Poller failed with error: {}", e);
            Err(anyhow::anyhow!("Poller error: {}", e))
        }
    }
}
