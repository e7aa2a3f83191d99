use serde::{Deserialize, Serialize};

use crate::kootoueg::core::ProcessId;

/// Commands the outside world can send to the simulation engine.
/// This enum is the whole control surface: the web dashboard submits these
/// as JSON text and the interactive console builds them from stdin input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Add a fresh process with randomized initial state
    AddProcess {
        /// Optional display name, defaults to `Node-{pid}`
        #[serde(default)]
        name: Option<String>,
    },
    /// Remove a process from the simulation (silent no-op if absent)
    RemoveProcess { pid: ProcessId },
    /// Crash a process, freezing its state until recovery
    TriggerFailure { pid: ProcessId },
    /// Run the two-phase checkpoint protocol across all non-failed processes
    TriggerCheckpoint,
    /// Run coordinated rollback-recovery for a failed process
    TriggerRecovery { pid: ProcessId },
    /// Advance the simulation by one manual step
    StepForward,
    /// Start the auto-run loop with the given pacing and checkpoint cadence
    StartAuto { speed: f64, frequency: u64 },
    /// Pause the auto-run loop (future ticks are skipped, loop keeps running)
    Pause,
    /// Resume a paused auto-run loop
    Resume,
    /// Stop the auto-run loop entirely
    Stop,
    /// Clear all processes and counters back to the initial empty state
    Reset,
}

impl Command {
    /// Returns the command name as a string for debugging/logging
    pub fn name(&self) -> &'static str {
        match self {
            Self::AddProcess { .. } => "AddProcess",
            Self::RemoveProcess { .. } => "RemoveProcess",
            Self::TriggerFailure { .. } => "TriggerFailure",
            Self::TriggerCheckpoint => "TriggerCheckpoint",
            Self::TriggerRecovery { .. } => "TriggerRecovery",
            Self::StepForward => "StepForward",
            Self::StartAuto { .. } => "StartAuto",
            Self::Pause => "Pause",
            Self::Resume => "Resume",
            Self::Stop => "Stop",
            Self::Reset => "Reset",
        }
    }
}
