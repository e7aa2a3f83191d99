mod kootoueg;

use kootoueg::{
    spawn_engine, spawn_websocket_server_with_engine, Command, EngineConfig, WebSocketConfig,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing subscriber with environment-based filtering
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("kootoueg_poc=info".parse()?)
                .add_directive("kootoueg=info".parse()?),
        )
        .init();

    info!("Koo-Toueg checkpointing POC starting...");

    // Spawn the simulation engine with a small initial process table
    let engine_config = EngineConfig {
        initial_processes: 3,
        ..EngineConfig::default()
    };
    let (engine, event_broadcaster, engine_handle) = spawn_engine(engine_config);

    info!("simulation engine spawned");

    // Start WebSocket and HTTP servers for real-time visualization
    let websocket_config = WebSocketConfig::default();
    info!(
        "starting WebSocket server on {}:{}",
        websocket_config.host, websocket_config.port
    );
    info!(
        "starting HTTP server on {}:{}",
        websocket_config.host, websocket_config.http_port
    );
    let (websocket_handle, http_handle) = spawn_websocket_server_with_engine(
        websocket_config,
        event_broadcaster,
        Some(engine.clone()),
    )
    .await;

    info!("simulation running with visualization:");
    info!("   WebSocket: ws://127.0.0.1:8082");
    info!("   Dashboard: http://127.0.0.1:8081");

    println!("\n=== Koo-Toueg Simulation Interactive Console ===");
    println!("Dashboard: http://127.0.0.1:8081 (Web UI)");
    println!("WebSocket: ws://127.0.0.1:8082 (Direct API)");
    print_help();
    println!("================================================\n");

    // Setup graceful shutdown handler
    let shutdown_signal = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
        warn!("received Ctrl+C, initiating graceful shutdown...");
    };

    // Setup command line interface
    let cli_handler = async {
        let stdin = tokio::io::stdin();
        let reader = BufReader::new(stdin);
        let mut lines = reader.lines();

        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }

                    let parts: Vec<&str> = line.split_whitespace().collect();
                    let command = match parts.as_slice() {
                        ["add"] => Some(Command::AddProcess { name: None }),
                        ["add", name] => Some(Command::AddProcess {
                            name: Some(name.to_string()),
                        }),
                        ["remove", pid] => parse_pid(pid).map(|pid| Command::RemoveProcess { pid }),
                        ["fail", pid] => parse_pid(pid).map(|pid| Command::TriggerFailure { pid }),
                        ["checkpoint"] => Some(Command::TriggerCheckpoint),
                        ["recover", pid] => {
                            parse_pid(pid).map(|pid| Command::TriggerRecovery { pid })
                        }
                        ["step"] => Some(Command::StepForward),
                        ["start"] => Some(Command::StartAuto {
                            speed: 1.0,
                            frequency: 5,
                        }),
                        ["start", speed, frequency] => {
                            match (speed.parse::<f64>(), frequency.parse::<u64>()) {
                                (Ok(speed), Ok(frequency)) => {
                                    Some(Command::StartAuto { speed, frequency })
                                }
                                _ => {
                                    println!("Usage: start [<speed> <frequency>]");
                                    None
                                }
                            }
                        }
                        ["pause"] => Some(Command::Pause),
                        ["resume"] => Some(Command::Resume),
                        ["stop"] => Some(Command::Stop),
                        ["reset"] => Some(Command::Reset),
                        ["help"] => {
                            print_help();
                            None
                        }
                        ["exit"] | ["quit"] => {
                            warn!("exiting...");
                            break;
                        }
                        [cmd, ..] => {
                            println!(
                                "Unknown command: '{cmd}'. Type 'help' for available commands."
                            );
                            None
                        }
                        [] => None,
                    };

                    if let Some(command) = command {
                        let name = command.name();
                        if engine.send(command).is_ok() {
                            info!("submitted command: {}", name);
                        } else {
                            error!("failed to submit command: engine is not running");
                        }
                    }
                }
                Ok(None) => {
                    // EOF reached - continue running for visualization
                    warn!("EOF reached, continuing in background mode for visualization...");
                    warn!("access the web dashboard at http://127.0.0.1:8081");
                    warn!("use Ctrl+C to shutdown");

                    loop {
                        tokio::time::sleep(std::time::Duration::from_secs(10)).await;
                    }
                }
                Err(e) => {
                    error!("error reading input: {}", e);
                    break;
                }
            }
        }
    };

    // Run either until shutdown signal or CLI exit
    tokio::select! {
        _ = shutdown_signal => {
            warn!("shutdown signal received");
        }
        _ = cli_handler => {
            warn!("CLI handler completed");
        }
    }

    warn!("shutting down...");

    // Clean up - abort WebSocket and HTTP servers
    websocket_handle.abort();
    http_handle.abort();
    info!("WebSocket and HTTP servers shut down");

    // Clean up - abort the engine task
    engine_handle.abort();
    info!("engine shut down");

    info!("Koo-Toueg POC completed");
    Ok(())
}

fn parse_pid(raw: &str) -> Option<u64> {
    match raw.parse::<u64>() {
        Ok(pid) => Some(pid),
        Err(_) => {
            println!("Invalid pid: '{raw}'");
            None
        }
    }
}

fn print_help() {
    println!("Commands:");
    println!("  add [name]               - Add a process");
    println!("  remove <pid>             - Remove a process");
    println!("  fail <pid>               - Crash a process");
    println!("  checkpoint               - Run the two-phase checkpoint protocol");
    println!("  recover <pid>            - Recover a failed process (global rollback)");
    println!("  step                     - Advance one computation step");
    println!("  start [<speed> <freq>]   - Start auto-run (default 1.0 steps/s, checkpoint every 5)");
    println!("  pause | resume | stop    - Control the auto-run loop");
    println!("  reset                    - Clear the simulation");
    println!("  help                     - Show this help message");
    println!("  quit                     - Shutdown and exit");
}
