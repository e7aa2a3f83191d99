/// Core process state machine and checkpoint data structures
pub mod core;

/// Koo-Toueg protocol implementation: two-phase checkpoint and rollback-recovery
pub mod coordinator;

/// Command surface exposed to the transport layer
pub mod command;

/// Simulation engine owning the process table and the auto-run loop
pub mod engine;

/// Real-time event system for visualization
pub mod events;

/// WebSocket server for real-time visualization
pub mod websocket;


/// Integration tests for engine behavior
#[cfg(test)]
pub mod integration_tests;

// Re-export commonly used types for convenience
pub use command::Command;
pub use engine::{spawn_engine, EngineConfig, EngineHandle};
pub use websocket::{spawn_websocket_server_with_engine, WebSocketConfig};
