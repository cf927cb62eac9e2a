use actix::prelude::*;
use clap::Parser;
use miette::Result;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

pub mod actors;
pub mod actuator;
pub mod alert;
pub mod config;
pub mod error;
pub mod messages;
pub mod server;
pub mod services;
pub mod utils;

use crate::config::CONFIG;
use crate::messages::supervisor::{RegisterActor, SystemShutdown};
use crate::messages::{GetSystemHealth, StartCapture};
use actors::{AlarmActor, CaptureActor, DetectionActor, SupervisorActor, TelemetryActor};
use server::AppState;
use utils::event_store::EventStore;

/// Buffered frames per stream subscriber before drop-oldest kicks in.
const FRAME_CHANNEL_CAPACITY: usize = 16;

#[derive(Parser)]
#[command(version, about, long_about = None, name = "Drowsewatch Service")]
struct Args {
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

fn main() -> Result<()> {
    // Parse CLI args and set CONFIG_PATH before any config access
    let args = Args::parse();
    std::env::set_var("CONFIG_PATH", &args.config);

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "drowsewatch_service=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting!");

    // Create and run the actor system
    let system = System::new();

    system.block_on(async {
        // Start the supervisor
        let supervisor = SupervisorActor::new().start();

        // Frame fan-out to the stream subscribers
        let (frame_tx, _) = broadcast::channel(FRAME_CHANNEL_CAPACITY);

        // Hardware and telemetry adapters
        let alarm = AlarmActor::new(actuator::from_config()).start();
        let telemetry = TelemetryActor::new(services::generic::channels_from_config()).start();

        // Durable episode store
        let event_store = EventStore::new(&CONFIG.store.log_file, &CONFIG.store.snapshot_dir);

        // The frame-processing core
        let detection = DetectionActor::new(
            alarm.clone(),
            telemetry.clone(),
            event_store.clone(),
            frame_tx.clone(),
        )
        .start();

        // Camera owner
        let capture = CaptureActor::with_actors(detection.clone(), supervisor.clone()).start();

        // Register all actors with supervisor for health monitoring
        for name in [
            "CaptureActor",
            "DetectionActor",
            "AlarmActor",
            "TelemetryActor",
        ] {
            supervisor.do_send(RegisterActor {
                name: name.to_string(),
            });
        }

        info!("Actor system started");

        // Verify system health
        if let Ok(health) = supervisor.send(GetSystemHealth).await {
            match health {
                Ok(h) if h.overall_healthy => info!("System health check passed"),
                Ok(_) => {
                    error!("System health check failed");
                    System::current().stop();
                    return;
                }
                Err(e) => {
                    error!("Failed to get system health: {}", e);
                    System::current().stop();
                    return;
                }
            }
        }

        // HTTP surface
        let state = AppState {
            detection: detection.clone(),
            supervisor: supervisor.clone(),
            frames: frame_tx,
            event_store,
        };
        match server::run_server(state) {
            Ok(http_server) => {
                actix::spawn(async move {
                    if let Err(e) = http_server.await {
                        error!("HTTP server failed: {}", e);
                        System::current().stop();
                    }
                });
            }
            Err(e) => {
                error!("Failed to bind HTTP server: {}", e);
                System::current().stop();
                return;
            }
        }

        // Start the capture loop
        info!("Starting capture from {}", CONFIG.camera.source);
        match capture
            .send(StartCapture {
                source: CONFIG.camera.source.clone(),
            })
            .await
        {
            Ok(Ok(())) => info!("Capture started successfully"),
            Ok(Err(e)) => {
                error!("Failed to start capture: {}", e);
                System::current().stop();
                return;
            }
            Err(e) => {
                error!("Failed to send start capture message: {}", e);
                System::current().stop();
                return;
            }
        }

        info!("Monitor running; the actors handle the video processing from here.");

        // Setup Ctrl+C handler for manual shutdown
        let supervisor_for_signal = supervisor.clone();
        actix::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Received Ctrl+C signal, initiating shutdown...");
                    supervisor_for_signal.do_send(SystemShutdown);
                }
                Err(err) => {
                    error!("Unable to listen for shutdown signal: {}", err);
                    System::current().stop();
                }
            }
        });
    });

    // Run the system - this will block until System::current().stop() is called
    if let Err(e) = system.run() {
        error!("System run failed: {}", e);
        return Err(miette::miette!("System run failed: {}", e));
    }

    info!("Application shutdown complete.");
    Ok(())
}
