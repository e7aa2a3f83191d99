use tracing::{debug, info, warn};

use crate::kootoueg::core::{Checkpoint, ProcessId, ProcessStatus};
use crate::kootoueg::engine::SimulationEngine;
use crate::kootoueg::events::SimEventType;

impl SimulationEngine {
    /// Runs the Koo-Toueg two-phase checkpoint protocol across the current
    /// process table. Returns true iff the commit path was taken.
    ///
    /// The participation set is fixed at entry: processes that are non-failed
    /// right now. Phase 1 visits participants sequentially in table order;
    /// in this single-owner model replies cannot race, unlike a true
    /// distributed two-phase commit. The decision is all-or-nothing against
    /// the participation set: any participant that fails mid-run routes the
    /// whole run to abort, and no history entry is written.
    pub fn initiate_checkpoint(&mut self) -> bool {
        let participants: Vec<ProcessId> = self
            .processes
            .iter()
            .filter(|p| !p.is_failed)
            .map(|p| p.pid)
            .collect();

        info!(
            participants = participants.len(),
            "checkpoint phase 1: requesting tentative checkpoints"
        );
        self.emit(SimEventType::CheckpointPhaseOneStarted {
            participants: participants.clone(),
        });

        if participants.is_empty() {
            // Nothing to coordinate; an empty run commits trivially
            self.emit(SimEventType::CheckpointDecision {
                committed: true,
                collected: 0,
                expected: 0,
            });
            self.emit_snapshot();
            return true;
        }

        // Phase 1: collect tentative checkpoints. A participant that failed
        // after the set was fixed is skipped entirely, not attempted; the
        // shortfall shows up in the decision below.
        let mut collected: Vec<(ProcessId, Checkpoint)> = Vec::new();
        for &pid in &participants {
            let Some(process) = self.get_process_mut(pid) else {
                continue;
            };
            if process.is_failed {
                continue;
            }
            let checkpoint = process.take_tentative_checkpoint();
            let name = process.name.clone();
            let checkpoint_id = checkpoint.checkpoint_id.clone();
            let computation_step = checkpoint.vars.computation_step;
            info!(
                pid,
                name = %name,
                checkpoint_id = %checkpoint_id,
                step = computation_step,
                "tentative checkpoint taken"
            );
            self.emit(SimEventType::TentativeCheckpointTaken {
                pid,
                name,
                checkpoint_id,
                computation_step,
            });
            self.emit_snapshot();
            collected.push((pid, checkpoint));
        }

        let collected_count = collected.len();
        let expected = participants.len();
        let all_success = collected_count == expected;
        self.emit(SimEventType::CheckpointDecision {
            committed: all_success,
            collected: collected_count,
            expected,
        });

        if all_success {
            // Phase 2a: commit in collection order; each checkpoint moves
            // into its process's history
            info!("checkpoint phase 2: all acks received, committing");
            for (pid, checkpoint) in collected {
                let checkpoint_id = checkpoint.checkpoint_id.clone();
                let Some(process) = self.get_process_mut(pid) else {
                    continue;
                };
                process.commit_checkpoint(checkpoint);
                let name = process.name.clone();
                info!(pid, name = %name, checkpoint_id = %checkpoint_id, "checkpoint committed");
                self.emit(SimEventType::CheckpointCommitted {
                    pid,
                    name,
                    checkpoint_id,
                });
                self.emit_snapshot();
            }
        } else {
            // Phase 2b: discard every tentative checkpoint; none reach history
            warn!(
                collected = collected_count,
                expected, "checkpoint aborted: participant failed mid-run"
            );
            for (pid, _checkpoint) in collected {
                if let Some(process) = self.get_process_mut(pid) {
                    process.abort_checkpoint();
                }
            }
            self.emit(SimEventType::CheckpointAborted {
                collected: collected_count,
                expected,
            });
        }

        // Finalize: participants that are still alive go back to running
        for &pid in &participants {
            if let Some(process) = self.get_process_mut(pid) {
                if !process.is_failed {
                    process.status = ProcessStatus::Running;
                    process.pending_checkpoint = None;
                }
            }
        }
        self.emit_snapshot();

        all_success
    }

    /// Runs coordinated rollback-recovery for the named failed process.
    /// Returns true iff a recovery actually ran.
    ///
    /// The rollback is global, not selective: every process returns to its
    /// own latest committed checkpoint. Because the committed set was
    /// captured consistently by the two-phase protocol, restoring all of
    /// them is always safe and avoids the domino effect; no per-channel
    /// message-count analysis runs here (a faithful Chandy-Lamport recovery
    /// would add one).
    pub fn initiate_recovery(&mut self, pid: ProcessId) -> bool {
        let Some(process) = self.get_process(pid) else {
            debug!(pid, "recovery for unknown pid ignored");
            return false;
        };
        if !process.is_failed {
            debug!(pid, "nothing to recover: process is not failed");
            self.emit(SimEventType::RecoverySkipped {
                pid,
                reason: "process is not failed".to_string(),
            });
            return false;
        }

        let name = process.name.clone();
        info!(pid, name = %name, "recovery initiated");
        self.emit(SimEventType::RecoveryStarted { pid, name });

        // The named process becomes eligible to be restored with the rest
        if let Some(process) = self.get_process_mut(pid) {
            process.is_failed = false;
        }

        for index in 0..self.processes.len() {
            let process = &mut self.processes[index];
            let Some(checkpoint_id) = process.restore_from_checkpoint() else {
                // No committed checkpoint yet: nothing to roll back to
                continue;
            };
            let restored_pid = process.pid;
            let restored_name = process.name.clone();
            let computation_step = process.vars.computation_step;
            info!(
                pid = restored_pid,
                name = %restored_name,
                checkpoint_id = %checkpoint_id,
                step = computation_step,
                "restored to checkpoint"
            );
            self.emit(SimEventType::ProcessRestored {
                pid: restored_pid,
                name: restored_name,
                checkpoint_id,
                computation_step,
            });
            self.emit_snapshot();
        }

        // A failed process with no history to restore from stays failed;
        // everyone else resumes
        for process in &mut self.processes {
            if !process.is_failed {
                process.status = ProcessStatus::Running;
            }
        }
        self.emit_snapshot();
        self.emit(SimEventType::RecoveryComplete);
        info!("recovery complete, resuming computation");

        true
    }
}
