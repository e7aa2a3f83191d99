use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Type alias for process identifiers in the simulation
pub type ProcessId = u64;

/// Simulated application state carried by each process.
/// The weather fields stand in for arbitrary computation state; the step
/// counter rides along so a checkpoint snapshot pins the step it was taken at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessVars {
    pub temperature: f64,
    pub pressure: f64,
    pub wind_speed: f64,
    pub humidity: f64,
    pub computation_step: u64,
}

impl ProcessVars {
    /// Creates randomized initial state within the fixed startup bounds
    pub fn random<R: Rng>(rng: &mut R) -> Self {
        Self {
            temperature: 20.0 + rng.gen_range(-5.0..=5.0),
            pressure: 1013.0 + rng.gen_range(-10.0..=10.0),
            wind_speed: 10.0 + rng.gen_range(-3.0..=3.0),
            humidity: 60.0 + rng.gen_range(-10.0..=10.0),
            computation_step: 0,
        }
    }

    /// Perturbs each field by a bounded random delta scaled by intensity and
    /// advances the step counter
    pub fn perturb<R: Rng>(&mut self, intensity: f64, rng: &mut R) {
        self.temperature += rng.gen_range(-0.5..=0.5) * intensity;
        self.pressure += rng.gen_range(-2.0..=2.0) * intensity;
        self.wind_speed += rng.gen_range(-0.3..=0.3) * intensity;
        self.humidity += rng.gen_range(-0.5..=0.5) * intensity;
        self.computation_step += 1;
    }
}

/// Represents the externally visible status of a simulated process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessStatus {
    /// Process is executing its simulated computation
    Running,
    /// Process is participating in a checkpoint protocol run
    Checkpointing,
    /// Process is being rolled back to its last committed checkpoint
    Recovering,
    /// Process has crashed and its state is frozen until recovery
    Failed,
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessStatus::Running => write!(f, "running"),
            ProcessStatus::Checkpointing => write!(f, "checkpointing"),
            ProcessStatus::Recovering => write!(f, "recovering"),
            ProcessStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Lifecycle stage of a checkpoint in the two-phase protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointKind {
    /// Provisional snapshot held by the coordinator, not yet part of history
    Tentative,
    /// Committed snapshot, appended to the owning process's history
    Permanent,
}

impl fmt::Display for CheckpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckpointKind::Tentative => write!(f, "tentative"),
            CheckpointKind::Permanent => write!(f, "permanent"),
        }
    }
}

/// An immutable snapshot of one process's state, produced in phase 1 of the
/// checkpoint protocol. The coordinator holds tentative checkpoints
/// exclusively; on commit the value moves into the owning process's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Process this snapshot belongs to
    pub pid: ProcessId,
    /// Opaque short unique token identifying this checkpoint
    pub checkpoint_id: String,
    /// Unix timestamp in milliseconds at capture time
    pub timestamp_ms: u64,
    /// Tentative until the commit phase flips it
    pub kind: CheckpointKind,
    /// Deep copy of the process vars at capture time
    pub vars: ProcessVars,
    /// Per-peer sent counters at capture time
    pub sent_count: BTreeMap<ProcessId, u64>,
    /// Per-peer received counters at capture time
    pub rcvd_count: BTreeMap<ProcessId, u64>,
}

/// Read-only projection of a process for external reporting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessView {
    pub pid: ProcessId,
    pub name: String,
    pub vars: ProcessVars,
    pub status: ProcessStatus,
    pub pending_checkpoint: Option<CheckpointKind>,
    pub num_checkpoints: usize,
    pub is_failed: bool,
    pub messages_sent: u64,
    pub messages_received: u64,
    pub last_checkpoint_id: Option<String>,
}

/// One simulated process: mutable application state, committed checkpoint
/// history, and failure/status flags. All mutation goes through the engine
/// task; the coordinator borrows processes only for the duration of one
/// protocol run.
#[derive(Debug)]
pub struct ProcessState {
    /// Unique identifier, assigned monotonically and never reused
    pub pid: ProcessId,
    /// Display name, defaults to `Node-{pid}`
    pub name: String,
    /// Simulated application state
    pub vars: ProcessVars,
    /// Per-peer message counters (placeholders for per-channel state a full
    /// Chandy-Lamport implementation would track)
    pub sent_count: BTreeMap<ProcessId, u64>,
    pub rcvd_count: BTreeMap<ProcessId, u64>,
    /// Aggregate in-flight traffic counters, informational only
    pub messages_sent: u64,
    pub messages_received: u64,
    /// Committed checkpoints, append-only, oldest first
    pub checkpoint_history: Vec<Checkpoint>,
    /// Externally visible status
    pub status: ProcessStatus,
    /// In-flight protocol phase, if any
    pub pending_checkpoint: Option<CheckpointKind>,
    /// Crash flag; failed implies status == Failed
    pub is_failed: bool,
}

impl ProcessState {
    /// Creates a new process with randomized initial vars
    pub fn new<R: Rng>(pid: ProcessId, name: Option<String>, rng: &mut R) -> Self {
        Self {
            pid,
            name: name.unwrap_or_else(|| format!("Node-{pid}")),
            vars: ProcessVars::random(rng),
            sent_count: BTreeMap::new(),
            rcvd_count: BTreeMap::new(),
            messages_sent: 0,
            messages_received: 0,
            checkpoint_history: Vec::new(),
            status: ProcessStatus::Running,
            pending_checkpoint: None,
            is_failed: false,
        }
    }

    /// Captures a tentative checkpoint of the current state.
    /// Must not be called on a failed process; the coordinator's
    /// participation-set filtering guarantees that.
    pub fn take_tentative_checkpoint(&mut self) -> Checkpoint {
        debug_assert!(!self.is_failed, "tentative checkpoint on failed process");
        self.status = ProcessStatus::Checkpointing;
        self.pending_checkpoint = Some(CheckpointKind::Tentative);
        Checkpoint {
            pid: self.pid,
            checkpoint_id: fresh_checkpoint_id(),
            timestamp_ms: chrono::Utc::now().timestamp_millis() as u64,
            kind: CheckpointKind::Tentative,
            vars: self.vars.clone(),
            sent_count: self.sent_count.clone(),
            rcvd_count: self.rcvd_count.clone(),
        }
    }

    /// Promotes a tentative checkpoint to permanent and appends it to this
    /// process's history. Consumes the checkpoint: ownership transfers from
    /// the coordinator's run into the history. Must be called at most once
    /// per tentative checkpoint.
    pub fn commit_checkpoint(&mut self, mut checkpoint: Checkpoint) {
        debug_assert_eq!(checkpoint.pid, self.pid, "checkpoint committed to wrong process");
        checkpoint.kind = CheckpointKind::Permanent;
        self.checkpoint_history.push(checkpoint);
        self.pending_checkpoint = Some(CheckpointKind::Permanent);
    }

    /// Discards the in-flight tentative checkpoint state. The checkpoint
    /// value itself is dropped by the coordinator. Idempotent.
    pub fn abort_checkpoint(&mut self) {
        self.status = ProcessStatus::Running;
        self.pending_checkpoint = None;
    }

    /// Advances the simulated computation by one step. No-op on a failed
    /// process: its state stays frozen until recovery.
    pub fn advance<R: Rng>(&mut self, intensity: f64, rng: &mut R) {
        if self.is_failed {
            return;
        }
        self.vars.perturb(intensity, rng);

        // Models in-flight traffic; not used for consistency decisions.
        if rng.gen::<f64>() > 0.7 {
            self.messages_sent += 1;
        }
        if rng.gen::<f64>() > 0.7 {
            self.messages_received += 1;
        }
    }

    /// Rolls this process back to its most recent committed checkpoint.
    /// Returns the restored checkpoint id, or None when there is no history
    /// (nothing to roll back to yet — the process is left untouched). The
    /// checkpoint stays in history and remains usable for later recoveries.
    pub fn restore_from_checkpoint(&mut self) -> Option<String> {
        let last = self.checkpoint_history.last()?;
        self.vars = last.vars.clone();
        self.sent_count = last.sent_count.clone();
        self.rcvd_count = last.rcvd_count.clone();
        let checkpoint_id = last.checkpoint_id.clone();
        self.is_failed = false;
        self.status = ProcessStatus::Recovering;
        Some(checkpoint_id)
    }

    /// Marks this process as crashed. Idempotent.
    pub fn fail(&mut self) {
        self.is_failed = true;
        self.status = ProcessStatus::Failed;
    }

    /// Read-only projection of this process for reporting
    pub fn snapshot_view(&self) -> ProcessView {
        ProcessView {
            pid: self.pid,
            name: self.name.clone(),
            vars: self.vars.clone(),
            status: self.status,
            pending_checkpoint: self.pending_checkpoint,
            num_checkpoints: self.checkpoint_history.len(),
            is_failed: self.is_failed,
            messages_sent: self.messages_sent,
            messages_received: self.messages_received,
            last_checkpoint_id: self
                .checkpoint_history
                .last()
                .map(|c| c.checkpoint_id.clone()),
        }
    }
}

/// Generates a short opaque checkpoint token
fn fresh_checkpoint_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] step:{} ckpts:{}",
            self.name,
            self.status,
            self.vars.computation_step,
            self.checkpoint_history.len()
        )
    }
}
