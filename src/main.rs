use clap::Parser;
use device_gateway::config::{self, Config};
use device_gateway::connection::WebSocketConnector;
use device_gateway::device::LogActuator;
use device_gateway::http;
use device_gateway::node::{DeviceNode, simulated_sensor};
use log::{error, info};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::signal;

#[derive(Parser)]
#[command(name = "device-gateway")]
#[command(about = "Relay game device inputs and sensors to the coordinator")]
struct Cli {
    /// File with KEY=value settings; real environment variables win.
    #[arg(long, env = "ENV_FILE", default_value = ".env")]
    env_file: PathBuf,

    /// Override the local HTTP port.
    #[arg(long)]
    http_port: Option<u16>,
}

fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Load .env before the runtime starts any thread
    config::load_dotenv(&cli.env_file);
    init_logger();

    let mut config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {}", e);
            return ExitCode::from(1);
        }
    };
    if let Some(port) = cli.http_port {
        config.http.port = port;
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start runtime: {}", e);
            return ExitCode::from(1);
        }
    };

    runtime.block_on(run(config))
}

async fn run(config: Config) -> ExitCode {
    info!("Starting device gateway");
    info!("Configuration loaded:");
    info!("  Device: {} #{}", config.device.role, config.device.device_number);
    if let Some(name) = &config.device.display_name {
        info!("  Name: {}", name);
    }
    info!("  Coordinator: {}", config.endpoint());
    info!("  Mode: {}", config.run_mode);
    info!("  Sensor: {} ({})", config.sensor, config.sampling);

    let node = DeviceNode::new(
        &config,
        Arc::new(WebSocketConnector::default()),
        Arc::new(LogActuator::new("hit-led")),
        simulated_sensor(config.sensor),
    );
    node.start();

    match http::bind(config.http.port).await {
        Ok(listener) => node.serve_http(listener),
        Err(e) => error!("[HTTP] Cannot listen on port {}: {}", config.http.port, e),
    }

    info!("Device gateway is running");
    info!("  - Press Ctrl+C to exit");

    // Wait for shutdown signal
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Received shutdown signal");
        }
        Err(e) => {
            error!("Failed to listen for shutdown signal: {}", e);
        }
    }

    node.shutdown().await;

    info!("Device gateway stopped");
    ExitCode::SUCCESS
}
