use futures_util::{SinkExt, StreamExt};
use serde_json;
/// WebSocket and HTTP server for real-time simulation visualization.
/// The WebSocket server streams engine events to web clients and forwards
/// client JSON commands into the engine; the HTTP server serves the static
/// dashboard files.
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};
use tracing::{debug, error, info, warn};
use warp::Filter;

use crate::kootoueg::command::Command;
use crate::kootoueg::engine::EngineHandle;
use crate::kootoueg::events::{EventBroadcaster, SimEvent};

/// Configuration for both WebSocket and HTTP servers
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// Host to bind the WebSocket server to
    pub host: String,
    /// Port to bind the WebSocket server to
    pub port: u16,
    /// Port to bind the HTTP server to (for serving static files)
    pub http_port: u16,
    /// Directory path containing static web files
    pub static_dir: String,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8082,
            http_port: 8081,
            static_dir: "web".to_string(),
        }
    }
}

/// WebSocket server for streaming simulation events to web clients
#[derive(Debug)]
pub struct WebSocketServer {
    /// Server configuration
    config: WebSocketConfig,
    /// Event broadcaster to subscribe to engine events
    event_broadcaster: EventBroadcaster,
    /// Engine handle for forwarding client commands
    engine: Option<EngineHandle>,
}

impl WebSocketServer {
    /// Creates a new WebSocket server with the given configuration and event broadcaster
    pub fn new(config: WebSocketConfig, event_broadcaster: EventBroadcaster) -> Self {
        Self {
            config,
            event_broadcaster,
            engine: None,
        }
    }

    /// Creates a new WebSocket server with an engine handle for command submission
    pub fn with_engine(
        config: WebSocketConfig,
        event_broadcaster: EventBroadcaster,
        engine: EngineHandle,
    ) -> Self {
        Self {
            config,
            event_broadcaster,
            engine: Some(engine),
        }
    }

    /// Starts the WebSocket server and begins accepting connections
    pub async fn start(self) -> Result<(), Box<dyn std::error::Error>> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;

        info!("WebSocket server starting on {}", addr);

        while let Ok((stream, peer_addr)) = listener.accept().await {
            info!("new WebSocket connection from {}", peer_addr);

            let event_broadcaster = self.event_broadcaster.clone();
            let engine = self.engine.clone();

            tokio::spawn(async move {
                if let Err(e) = handle_websocket_connection(stream, event_broadcaster, engine).await
                {
                    error!("WebSocket connection error for {}: {}", peer_addr, e);
                }
                info!("WebSocket connection closed for {}", peer_addr);
            });
        }

        Ok(())
    }
}

/// Handles a single WebSocket connection
async fn handle_websocket_connection(
    stream: TcpStream,
    event_broadcaster: EventBroadcaster,
    engine: Option<EngineHandle>,
) -> Result<(), Box<dyn std::error::Error>> {
    let ws_stream = accept_async(stream).await?;
    info!("WebSocket connection established");

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    // Subscribe to the event stream before anything can be missed
    let mut event_receiver = event_broadcaster.subscribe();

    let welcome_msg = serde_json::json!({
        "type": "connected",
        "message": "Connected to Koo-Toueg simulation server",
        "timestamp": chrono::Utc::now().timestamp_millis()
    });

    if let Err(e) = ws_sender.send(Message::Text(welcome_msg.to_string())).await {
        warn!("failed to send welcome message: {}", e);
    }

    // Handle incoming messages and outgoing events concurrently
    loop {
        tokio::select! {
            // Incoming WebSocket messages from the client
            ws_msg = ws_receiver.next() => {
                match ws_msg {
                    Some(Ok(msg)) => {
                        if let Err(e) = handle_client_message(msg, &mut ws_sender, &engine).await {
                            error!("error handling client message: {}", e);
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        error!("WebSocket message error: {}", e);
                        break;
                    }
                    None => {
                        debug!("WebSocket connection closed by client");
                        break;
                    }
                }
            }

            // Outgoing engine events to the client
            event = event_receiver.recv() => {
                match event {
                    Ok(sim_event) => {
                        if let Err(e) = send_event_to_client(&sim_event, &mut ws_sender).await {
                            error!("error sending event to client: {}", e);
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("event broadcast channel closed");
                        break;
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!("client lagged behind, missed {} events", missed);
                        // Keep processing, the next snapshot catches the client up
                    }
                }
            }
        }
    }

    Ok(())
}

/// Handles incoming messages from WebSocket clients
async fn handle_client_message(
    message: Message,
    ws_sender: &mut futures_util::stream::SplitSink<WebSocketStream<TcpStream>, Message>,
    engine: &Option<EngineHandle>,
) -> Result<(), Box<dyn std::error::Error>> {
    match message {
        Message::Text(text) => {
            debug!("received text message from client: {}", text);
            handle_client_command(&text, ws_sender, engine).await?;
        }
        Message::Binary(data) => {
            debug!("received binary message from client: {} bytes", data.len());
            // Binary messages not currently supported
        }
        Message::Ping(data) => {
            debug!("received ping from client");
            ws_sender.send(Message::Pong(data)).await?;
        }
        Message::Pong(_) => {
            debug!("received pong from client");
        }
        Message::Close(_) => {
            info!("received close message from client");
            return Err("client requested close".into());
        }
        Message::Frame(_) => {
            // Raw frames are handled by the library
        }
    }

    Ok(())
}

/// Handles one JSON text message from a WebSocket client. Connection-level
/// messages (ping, get_status) are answered locally; everything else must
/// parse as a simulation `Command` and is forwarded to the engine.
async fn handle_client_command(
    text: &str,
    ws_sender: &mut futures_util::stream::SplitSink<WebSocketStream<TcpStream>, Message>,
    engine: &Option<EngineHandle>,
) -> Result<(), Box<dyn std::error::Error>> {
    let value: serde_json::Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(_) => {
            warn!("invalid JSON received from client: {}", text);
            return Ok(());
        }
    };

    match value.get("type").and_then(|v| v.as_str()) {
        Some("ping") => {
            let response = serde_json::json!({
                "type": "pong",
                "timestamp": chrono::Utc::now().timestamp_millis()
            });
            ws_sender.send(Message::Text(response.to_string())).await?;
            return Ok(());
        }
        Some("get_status") => {
            let response = serde_json::json!({
                "type": "status",
                "engine_active": engine.is_some(),
                "timestamp": chrono::Utc::now().timestamp_millis()
            });
            ws_sender.send(Message::Text(response.to_string())).await?;
            return Ok(());
        }
        _ => {}
    }

    let command: Command = match serde_json::from_value(value) {
        Ok(command) => command,
        Err(e) => {
            warn!("unknown client command {}: {}", text, e);
            let response = serde_json::json!({
                "type": "command_submitted",
                "success": false,
                "error": "unrecognized command",
                "timestamp": chrono::Utc::now().timestamp_millis()
            });
            ws_sender.send(Message::Text(response.to_string())).await?;
            return Ok(());
        }
    };

    let response = match engine {
        Some(engine) => {
            let name = command.name();
            match engine.send(command) {
                Ok(()) => {
                    info!("WebSocket client submitted command: {}", name);
                    serde_json::json!({
                        "type": "command_submitted",
                        "command": name,
                        "success": true,
                        "timestamp": chrono::Utc::now().timestamp_millis()
                    })
                }
                Err(_) => serde_json::json!({
                    "type": "command_submitted",
                    "command": name,
                    "success": false,
                    "error": "engine is not running",
                    "timestamp": chrono::Utc::now().timestamp_millis()
                }),
            }
        }
        None => serde_json::json!({
            "type": "command_submitted",
            "success": false,
            "error": "engine handle not available",
            "timestamp": chrono::Utc::now().timestamp_millis()
        }),
    };
    ws_sender.send(Message::Text(response.to_string())).await?;

    Ok(())
}

/// Sends one engine event to a WebSocket client, tagged with its log kind
/// so the dashboard can color the line
async fn send_event_to_client(
    event: &SimEvent,
    ws_sender: &mut futures_util::stream::SplitSink<WebSocketStream<TcpStream>, Message>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut json_event = serde_json::to_value(event)?;
    if let Some(obj) = json_event.as_object_mut() {
        obj.insert(
            "kind".to_string(),
            serde_json::Value::String(event.event_type.log_kind().to_string()),
        );
    }

    ws_sender.send(Message::Text(json_event.to_string())).await?;

    Ok(())
}

/// HTTP server for serving static web dashboard files
#[derive(Debug)]
pub struct HttpServer {
    /// Server configuration
    config: WebSocketConfig,
}

impl HttpServer {
    /// Creates a new HTTP server with the given configuration
    pub fn new(config: WebSocketConfig) -> Self {
        Self { config }
    }

    /// Starts the HTTP server for serving static files
    pub async fn start(self) -> Result<(), Box<dyn std::error::Error>> {
        let static_dir = self.config.static_dir.clone();
        let http_port = self.config.http_port;
        let host = self.config.host.clone();

        info!("HTTP server starting on {}:{}", host, http_port);
        info!("serving static files from: {}", static_dir);

        let index_path = format!("{}/index.html", static_dir);
        let index = warp::path::end().and(warp::fs::file(index_path));

        let static_files = warp::fs::dir(static_dir).with(warp::log("http"));

        let websocket_port = self.config.port;
        let api_status = warp::path!("api" / "status").and(warp::get()).map(move || {
            warp::reply::json(&serde_json::json!({
                "status": "running",
                "websocket_port": websocket_port,
                "timestamp": chrono::Utc::now().timestamp_millis()
            }))
        });

        let routes = index.or(static_files).or(api_status).with(
            warp::cors()
                .allow_any_origin()
                .allow_headers(vec!["content-type"])
                .allow_methods(vec!["GET", "POST"]),
        );

        let addr: std::net::SocketAddr = format!("{}:{}", host, http_port).parse()?;

        warp::serve(routes).run(addr).await;

        Ok(())
    }
}

/// Spawns both WebSocket and HTTP servers that run concurrently with the engine
pub async fn spawn_websocket_server(
    config: WebSocketConfig,
    event_broadcaster: EventBroadcaster,
) -> (tokio::task::JoinHandle<()>, tokio::task::JoinHandle<()>) {
    spawn_websocket_server_with_engine(config, event_broadcaster, None).await
}

/// Spawns both WebSocket and HTTP servers with an engine handle for command submission
pub async fn spawn_websocket_server_with_engine(
    config: WebSocketConfig,
    event_broadcaster: EventBroadcaster,
    engine: Option<EngineHandle>,
) -> (tokio::task::JoinHandle<()>, tokio::task::JoinHandle<()>) {
    let ws_config = config.clone();
    let http_config = config.clone();

    let ws_handle = tokio::spawn(async move {
        let server = if let Some(engine) = engine {
            WebSocketServer::with_engine(ws_config, event_broadcaster, engine)
        } else {
            WebSocketServer::new(ws_config, event_broadcaster)
        };

        if let Err(e) = server.start().await {
            error!("WebSocket server error: {}", e);
        }
    });

    let http_handle = tokio::spawn(async move {
        let http_server = HttpServer::new(http_config);

        if let Err(e) = http_server.start().await {
            error!("HTTP server error: {}", e);
        }
    });

    (ws_handle, http_handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_websocket_config() {
        let config = WebSocketConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8082);
        assert_eq!(config.http_port, 8081);
        assert_eq!(config.static_dir, "web");

        let custom_config = WebSocketConfig {
            host: "0.0.0.0".to_string(),
            port: 9090,
            http_port: 9091,
            static_dir: "static".to_string(),
        };
        assert_eq!(custom_config.host, "0.0.0.0");
        assert_eq!(custom_config.port, 9090);
        assert_eq!(custom_config.http_port, 9091);
        assert_eq!(custom_config.static_dir, "static");
    }

    #[test]
    fn test_client_command_parsing() {
        let parsed: Command =
            serde_json::from_str(r#"{"type":"add_process","name":"Sensor-A"}"#).unwrap();
        assert_eq!(
            parsed,
            Command::AddProcess {
                name: Some("Sensor-A".to_string())
            }
        );

        let parsed: Command =
            serde_json::from_str(r#"{"type":"start_auto","speed":2.0,"frequency":5}"#).unwrap();
        assert_eq!(
            parsed,
            Command::StartAuto {
                speed: 2.0,
                frequency: 5
            }
        );

        let parsed: Command = serde_json::from_str(r#"{"type":"trigger_checkpoint"}"#).unwrap();
        assert_eq!(parsed, Command::TriggerCheckpoint);
    }
}
