use serde::{Deserialize, Serialize};
/// Real-time event system for checkpoint/recovery visualization.
/// This module defines the structured events the engine emits at every
/// mutating command and at every phase boundary of the two protocols.
use std::sync::atomic::{AtomicU64, Ordering};

use crate::kootoueg::core::{ProcessId, ProcessView};

/// A single structured event emitted by the simulation engine.
/// Each event carries a timestamp and a payload for real-time visualization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimEvent {
    /// Unique event identifier for tracking
    pub id: u64,
    /// Unix timestamp in milliseconds when the event occurred
    pub timestamp: u64,
    /// The specific event data
    pub event_type: SimEventType,
}

static EVENT_COUNTER: AtomicU64 = AtomicU64::new(0);

impl SimEvent {
    /// Creates a new SimEvent with the current timestamp
    pub fn new(event_type: SimEventType) -> Self {
        Self {
            id: EVENT_COUNTER.fetch_add(1, Ordering::Relaxed) + 1,
            timestamp: chrono::Utc::now().timestamp_millis() as u64,
            event_type,
        }
    }
}

/// All events the engine can emit, for monitoring and the web dashboard
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SimEventType {
    /// Full view of the simulation, emitted after every mutating command and
    /// after every per-process phase step inside the protocols
    StateSnapshot {
        processes: Vec<ProcessView>,
        step_count: u64,
        is_running: bool,
        is_paused: bool,
    },

    /// Process lifecycle events
    ProcessAdded {
        pid: ProcessId,
        name: String,
    },

    ProcessRemoved {
        pid: ProcessId,
        name: String,
    },

    ProcessFailed {
        pid: ProcessId,
        name: String,
    },

    /// One computation step finished
    StepCompleted {
        step_count: u64,
    },

    /// Two-phase checkpoint protocol events
    CheckpointPhaseOneStarted {
        participants: Vec<ProcessId>,
    },

    TentativeCheckpointTaken {
        pid: ProcessId,
        name: String,
        checkpoint_id: String,
        computation_step: u64,
    },

    CheckpointDecision {
        committed: bool,
        collected: usize,
        expected: usize,
    },

    CheckpointCommitted {
        pid: ProcessId,
        name: String,
        checkpoint_id: String,
    },

    CheckpointAborted {
        collected: usize,
        expected: usize,
    },

    /// Rollback-recovery protocol events
    RecoveryStarted {
        pid: ProcessId,
        name: String,
    },

    RecoverySkipped {
        pid: ProcessId,
        reason: String,
    },

    ProcessRestored {
        pid: ProcessId,
        name: String,
        checkpoint_id: String,
        computation_step: u64,
    },

    RecoveryComplete,

    /// Auto-run lifecycle events
    AutoRunStarted {
        speed: f64,
        frequency: u64,
    },

    SimulationPaused,

    SimulationResumed,

    SimulationStopped,

    SimulationReset,
}

impl SimEventType {
    /// Log kind used by the dashboard to color a line:
    /// info | checkpoint | success | error | recovery | step
    pub fn log_kind(&self) -> &'static str {
        match self {
            Self::StateSnapshot { .. } => "info",
            Self::ProcessAdded { .. } => "info",
            Self::ProcessRemoved { .. } => "error",
            Self::ProcessFailed { .. } => "error",
            Self::StepCompleted { .. } => "step",
            Self::CheckpointPhaseOneStarted { .. } => "checkpoint",
            Self::TentativeCheckpointTaken { .. } => "info",
            Self::CheckpointDecision { .. } => "checkpoint",
            Self::CheckpointCommitted { .. } => "success",
            Self::CheckpointAborted { .. } => "error",
            Self::RecoveryStarted { .. } => "recovery",
            Self::RecoverySkipped { .. } => "info",
            Self::ProcessRestored { .. } => "recovery",
            Self::RecoveryComplete => "success",
            Self::AutoRunStarted { .. } => "info",
            Self::SimulationPaused => "info",
            Self::SimulationResumed => "info",
            Self::SimulationStopped => "error",
            Self::SimulationReset => "info",
        }
    }
}

/// Event channel wrapper for broadcasting events to multiple subscribers
#[derive(Debug, Clone)]
pub struct EventBroadcaster {
    sender: tokio::sync::broadcast::Sender<SimEvent>,
}

impl EventBroadcaster {
    /// Creates a new event broadcaster with the specified channel capacity
    pub fn new(capacity: usize) -> (Self, tokio::sync::broadcast::Receiver<SimEvent>) {
        let (sender, receiver) = tokio::sync::broadcast::channel(capacity);
        (Self { sender }, receiver)
    }

    /// Broadcasts an event to all subscribers
    pub fn emit(
        &self,
        event: SimEvent,
    ) -> Result<usize, tokio::sync::broadcast::error::SendError<SimEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber to the event stream
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<SimEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_creation() {
        let event = SimEvent::new(SimEventType::ProcessAdded {
            pid: 0,
            name: "Node-0".to_string(),
        });

        match event.event_type {
            SimEventType::ProcessAdded { pid, name } => {
                assert_eq!(pid, 0);
                assert_eq!(name, "Node-0");
            }
            _ => panic!("Wrong event type"),
        }
    }

    #[test]
    fn test_event_ids_are_unique() {
        let a = SimEvent::new(SimEventType::RecoveryComplete);
        let b = SimEvent::new(SimEventType::RecoveryComplete);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_event_broadcaster() {
        let (broadcaster, mut receiver) = EventBroadcaster::new(100);

        let event = SimEvent::new(SimEventType::StepCompleted { step_count: 7 });
        broadcaster.emit(event.clone()).unwrap();

        let received_event = receiver.blocking_recv().unwrap();
        assert_eq!(received_event.id, event.id);
        match received_event.event_type {
            SimEventType::StepCompleted { step_count } => assert_eq!(step_count, 7),
            _ => panic!("Wrong event type"),
        }
    }

    #[test]
    fn test_event_serialization() {
        let event = SimEvent::new(SimEventType::CheckpointDecision {
            committed: true,
            collected: 3,
            expected: 3,
        });

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"CheckpointDecision\""));
        let deserialized: SimEvent = serde_json::from_str(&json).unwrap();

        assert_eq!(deserialized.id, event.id);
        match deserialized.event_type {
            SimEventType::CheckpointDecision {
                committed,
                collected,
                expected,
            } => {
                assert!(committed);
                assert_eq!(collected, 3);
                assert_eq!(expected, 3);
            }
            _ => panic!("Wrong event type"),
        }
    }

    #[test]
    fn test_log_kinds() {
        assert_eq!(
            SimEventType::CheckpointAborted {
                collected: 1,
                expected: 2
            }
            .log_kind(),
            "error"
        );
        assert_eq!(SimEventType::RecoveryComplete.log_kind(), "success");
        assert_eq!(SimEventType::StepCompleted { step_count: 1 }.log_kind(), "step");
    }
}
