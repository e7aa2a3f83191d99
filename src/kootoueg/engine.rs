use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::kootoueg::command::Command;
use crate::kootoueg::core::{ProcessId, ProcessState};
use crate::kootoueg::events::{EventBroadcaster, SimEvent, SimEventType};

/// Configuration for the simulation engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Number of processes seeded into the table at startup
    pub initial_processes: usize,
    /// Steps per second while auto-running; also the `advance` intensity
    pub speed: f64,
    /// Steps between automatic checkpoint protocol runs
    pub frequency: u64,
    /// Noise-source seed; None seeds from entropy. Fix it for reproducible runs.
    pub seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            initial_processes: 0,
            speed: 1.0,
            frequency: 5,
            seed: None,
        }
    }
}

/// Handle for sending commands into the engine task.
/// Clonable; this is the only way to reach the engine's mutable state.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    sender: mpsc::UnboundedSender<Command>,
}

impl EngineHandle {
    /// Sends a command to the engine (non-blocking)
    pub fn send(&self, command: Command) -> Result<(), mpsc::error::SendError<Command>> {
        self.sender.send(command)
    }
}

/// Owns the process table and drives the simulation. All mutation is
/// serialized through the engine task's command loop: commands are handled
/// atomically with respect to each other and to auto-run ticks, and a
/// protocol run always completes before the next command is looked at.
#[derive(Debug)]
pub struct SimulationEngine {
    /// The process table, addressed by pid, iterated in insertion order
    pub processes: Vec<ProcessState>,
    /// Next pid to assign; monotonic, never reused within a run
    pub next_pid: ProcessId,
    /// Global step counter
    pub step_count: u64,
    /// Auto-run loop is active
    pub is_running: bool,
    /// Auto-run loop is paused (ticks are skipped, loop keeps going)
    pub is_paused: bool,
    /// Automatic checkpoints are taken every `frequency` steps
    pub auto_mode: bool,
    /// Steps per second while auto-running; also the advance intensity
    pub speed: f64,
    /// Steps between automatic checkpoints
    pub frequency: u64,
    /// Engine-owned noise source, seedable for reproducible tests
    pub rng: StdRng,
    /// Outbound event stream
    pub events: EventBroadcaster,
}

impl SimulationEngine {
    /// Creates a new engine and seeds the initial process table
    pub fn new(config: EngineConfig, events: EventBroadcaster) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut engine = Self {
            processes: Vec::new(),
            next_pid: 0,
            step_count: 0,
            is_running: false,
            is_paused: false,
            auto_mode: false,
            speed: config.speed,
            frequency: config.frequency.max(1),
            rng,
            events,
        };

        for _ in 0..config.initial_processes {
            engine.add_process(None);
        }
        engine
    }

    /// Appends a fresh process with randomized initial vars, returns its pid
    pub fn add_process(&mut self, name: Option<String>) -> ProcessId {
        let pid = self.next_pid;
        self.next_pid += 1;
        let process = ProcessState::new(pid, name, &mut self.rng);
        info!(pid, name = %process.name, "process added");
        self.processes.push(process);
        pid
    }

    /// Removes a process by pid. Silent no-op when the pid is absent.
    /// Returns the removed process's name, if any.
    pub fn remove_process(&mut self, pid: ProcessId) -> Option<String> {
        let index = self.processes.iter().position(|p| p.pid == pid)?;
        let process = self.processes.remove(index);
        info!(pid, name = %process.name, "process removed");
        Some(process.name)
    }

    /// Looks up a process by pid
    pub fn get_process(&self, pid: ProcessId) -> Option<&ProcessState> {
        self.processes.iter().find(|p| p.pid == pid)
    }

    /// Looks up a process by pid for mutation
    pub fn get_process_mut(&mut self, pid: ProcessId) -> Option<&mut ProcessState> {
        self.processes.iter_mut().find(|p| p.pid == pid)
    }

    /// Advances the simulation by one step: every process computes, then an
    /// automatic checkpoint runs when the step counter hits the cadence
    pub fn step(&mut self) {
        self.step_count += 1;
        debug!(step = self.step_count, "computation step");
        self.emit(SimEventType::StepCompleted {
            step_count: self.step_count,
        });

        let intensity = self.speed;
        for process in &mut self.processes {
            process.advance(intensity, &mut self.rng);
        }
        self.emit_snapshot();

        if self.auto_mode && self.step_count % self.frequency == 0 {
            self.initiate_checkpoint();
        }
    }

    /// Handles one external command. Commands mutate atomically: nothing
    /// else touches the process table while this runs.
    pub fn handle_command(&mut self, command: Command) {
        debug!(command = command.name(), "handling command");
        match command {
            Command::AddProcess { name } => {
                let pid = self.add_process(name);
                let name = self
                    .get_process(pid)
                    .map(|p| p.name.clone())
                    .unwrap_or_default();
                self.emit(SimEventType::ProcessAdded { pid, name });
                self.emit_snapshot();
            }
            Command::RemoveProcess { pid } => {
                match self.remove_process(pid) {
                    Some(name) => {
                        self.emit(SimEventType::ProcessRemoved { pid, name });
                        self.emit_snapshot();
                    }
                    None => debug!(pid, "remove for unknown pid ignored"),
                }
            }
            Command::TriggerFailure { pid } => match self.get_process_mut(pid) {
                Some(process) if !process.is_failed => {
                    process.fail();
                    let name = process.name.clone();
                    warn!(pid, name = %name, "process crashed");
                    self.emit(SimEventType::ProcessFailed { pid, name });
                    self.emit_snapshot();
                }
                Some(_) => debug!(pid, "failure for already-failed pid ignored"),
                None => debug!(pid, "failure for unknown pid ignored"),
            },
            Command::TriggerCheckpoint => {
                self.initiate_checkpoint();
            }
            Command::TriggerRecovery { pid } => {
                self.initiate_recovery(pid);
            }
            Command::StepForward => {
                // Manual single tick, only honored outside continuous auto-run
                if !self.is_running || self.is_paused {
                    self.step();
                }
            }
            Command::StartAuto { speed, frequency } => {
                self.auto_mode = true;
                self.is_running = true;
                self.is_paused = false;
                self.speed = if speed.is_finite() && speed > 0.0 {
                    speed
                } else {
                    1.0
                };
                self.frequency = frequency.max(1);
                info!(
                    speed = self.speed,
                    frequency = self.frequency,
                    "auto mode started"
                );
                self.emit(SimEventType::AutoRunStarted {
                    speed: self.speed,
                    frequency: self.frequency,
                });
                self.emit_snapshot();
            }
            Command::Pause => {
                self.is_paused = true;
                info!("simulation paused");
                self.emit(SimEventType::SimulationPaused);
                self.emit_snapshot();
            }
            Command::Resume => {
                self.is_paused = false;
                info!("simulation resumed");
                self.emit(SimEventType::SimulationResumed);
                self.emit_snapshot();
            }
            Command::Stop => {
                self.is_running = false;
                self.is_paused = false;
                self.auto_mode = false;
                info!("simulation stopped");
                self.emit(SimEventType::SimulationStopped);
                self.emit_snapshot();
            }
            Command::Reset => {
                self.processes.clear();
                self.next_pid = 0;
                self.step_count = 0;
                self.is_running = false;
                self.is_paused = false;
                self.auto_mode = false;
                info!("simulation reset");
                self.emit(SimEventType::SimulationReset);
                self.emit_snapshot();
            }
        }
    }

    /// Broadcasts one event; send errors just mean nobody is listening
    pub fn emit(&self, event_type: SimEventType) {
        let _ = self.events.emit(SimEvent::new(event_type));
    }

    /// Broadcasts the current full state of the simulation
    pub fn emit_snapshot(&self) {
        self.emit(SimEventType::StateSnapshot {
            processes: self.processes.iter().map(|p| p.snapshot_view()).collect(),
            step_count: self.step_count,
            is_running: self.is_running,
            is_paused: self.is_paused,
        });
    }

    /// How long the run loop may sleep before the next auto-run tick
    fn pacing_interval(&self) -> Duration {
        if self.is_running && self.auto_mode {
            if self.is_paused {
                // Paused: keep looping so Resume takes effect promptly
                Duration::from_millis(100)
            } else {
                Duration::from_secs_f64(1.0 / self.speed)
            }
        } else {
            // Idle: nothing scheduled, wake only for commands
            Duration::from_secs(3600)
        }
    }

    /// One auto-run tick; a no-op unless the loop is running and not paused
    fn tick(&mut self) {
        if self.is_running && self.auto_mode && !self.is_paused {
            self.step();
        }
    }
}

/// Runs the engine task: the single owner of all mutable simulation state.
/// Commands are handled as they arrive; between commands the loop sleeps for
/// the pacing interval and fires auto-run ticks on timeout. This is the only
/// place `SimulationEngine` is mutated, so commands, protocol runs, and ticks
/// never interleave.
pub async fn run_engine(mut engine: SimulationEngine, mut receiver: mpsc::UnboundedReceiver<Command>) {
    engine.emit_snapshot();
    loop {
        let pacing = engine.pacing_interval();
        match timeout(pacing, receiver.recv()).await {
            Ok(Some(command)) => engine.handle_command(command),
            Ok(None) => {
                // All handles dropped, engine should shut down
                break;
            }
            Err(_) => engine.tick(),
        }
    }
    info!("engine task shutting down");
}

/// Spawns the simulation engine task and returns the pieces the transport
/// layer needs: a command handle, the event stream, and the join handle
pub fn spawn_engine(config: EngineConfig) -> (EngineHandle, EventBroadcaster, JoinHandle<()>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    let (event_broadcaster, _) = EventBroadcaster::new(1000); // Buffer up to 1000 events

    info!(
        initial_processes = config.initial_processes,
        "spawning simulation engine"
    );
    let engine = SimulationEngine::new(config, event_broadcaster.clone());

    let handle = tokio::spawn(run_engine(engine, receiver));

    (EngineHandle { sender }, event_broadcaster, handle)
}
