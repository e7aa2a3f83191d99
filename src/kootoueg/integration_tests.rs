#[cfg(test)]
mod integration_tests {
    use super::super::command::Command;
    use super::super::engine::{spawn_engine, EngineConfig};
    use super::super::events::{SimEvent, SimEventType};
    use tokio::sync::broadcast;
    use tokio::time::{timeout, Duration};
    use tracing::info;

    /// Waits for the next event matching the predicate, skipping everything
    /// else. Returns None when the deadline passes or the channel closes.
    async fn wait_for_event<F>(
        receiver: &mut broadcast::Receiver<SimEvent>,
        predicate: F,
    ) -> Option<SimEvent>
    where
        F: Fn(&SimEventType) -> bool,
    {
        timeout(Duration::from_secs(5), async {
            loop {
                match receiver.recv().await {
                    Ok(event) if predicate(&event.event_type) => return Some(event),
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
        .await
        .ok()
        .flatten()
    }

    #[tokio::test]
    async fn test_checkpoint_commit_flow() {
        let _ = tracing_subscriber::fmt().try_init();
        info!("starting checkpoint commit flow test");

        let (engine, broadcaster, handle) = spawn_engine(EngineConfig::default());
        let mut events = broadcaster.subscribe();

        for _ in 0..3 {
            engine.send(Command::AddProcess { name: None }).unwrap();
        }
        engine.send(Command::TriggerCheckpoint).unwrap();

        let decision = wait_for_event(&mut events, |e| {
            matches!(e, SimEventType::CheckpointDecision { .. })
        })
        .await
        .expect("no checkpoint decision observed");

        match decision.event_type {
            SimEventType::CheckpointDecision {
                committed,
                collected,
                expected,
            } => {
                assert!(committed);
                assert_eq!(collected, 3);
                assert_eq!(expected, 3);
            }
            _ => unreachable!(),
        }

        // Every participant gets its own commit event
        let mut committed_pids = Vec::new();
        while committed_pids.len() < 3 {
            let event = wait_for_event(&mut events, |e| {
                matches!(e, SimEventType::CheckpointCommitted { .. })
            })
            .await
            .expect("missing per-process commit event");
            if let SimEventType::CheckpointCommitted { pid, .. } = event.event_type {
                committed_pids.push(pid);
            }
        }
        committed_pids.sort_unstable();
        assert_eq!(committed_pids, vec![0, 1, 2]);

        handle.abort();
    }

    #[tokio::test]
    async fn test_failure_and_recovery_flow() {
        let _ = tracing_subscriber::fmt().try_init();
        info!("starting failure and recovery flow test");

        let (engine, broadcaster, handle) = spawn_engine(EngineConfig::default());
        let mut events = broadcaster.subscribe();

        engine.send(Command::AddProcess { name: None }).unwrap();
        engine.send(Command::AddProcess { name: None }).unwrap();
        engine.send(Command::TriggerCheckpoint).unwrap();
        engine.send(Command::TriggerFailure { pid: 0 }).unwrap();
        engine.send(Command::TriggerRecovery { pid: 0 }).unwrap();

        // Collect restores until the protocol reports completion
        let mut restored_pids = Vec::new();
        loop {
            let event = wait_for_event(&mut events, |e| {
                matches!(
                    e,
                    SimEventType::ProcessRestored { .. } | SimEventType::RecoveryComplete
                )
            })
            .await
            .expect("recovery never completed");

            match event.event_type {
                SimEventType::ProcessRestored { pid, .. } => restored_pids.push(pid),
                SimEventType::RecoveryComplete => break,
                _ => unreachable!(),
            }
        }

        // Global rollback: both processes restored, not just the failed one
        restored_pids.sort_unstable();
        assert_eq!(restored_pids, vec![0, 1]);

        handle.abort();
    }

    #[tokio::test]
    async fn test_recovery_skipped_for_healthy_process() {
        let _ = tracing_subscriber::fmt().try_init();

        let (engine, broadcaster, handle) = spawn_engine(EngineConfig::default());
        let mut events = broadcaster.subscribe();

        engine.send(Command::AddProcess { name: None }).unwrap();
        engine.send(Command::TriggerRecovery { pid: 0 }).unwrap();

        let skipped = wait_for_event(&mut events, |e| {
            matches!(e, SimEventType::RecoverySkipped { .. })
        })
        .await
        .expect("no recovery-skipped event observed");

        match skipped.event_type {
            SimEventType::RecoverySkipped { pid, .. } => assert_eq!(pid, 0),
            _ => unreachable!(),
        }

        handle.abort();
    }

    #[tokio::test]
    async fn test_auto_run_triggers_checkpoints() {
        let _ = tracing_subscriber::fmt().try_init();
        info!("starting auto-run test");

        let (engine, broadcaster, handle) = spawn_engine(EngineConfig::default());
        let mut events = broadcaster.subscribe();

        engine.send(Command::AddProcess { name: None }).unwrap();
        engine
            .send(Command::StartAuto {
                speed: 50.0,
                frequency: 2,
            })
            .unwrap();

        // The pacing loop ticks on its own; a checkpoint run must show up
        let phase_one = wait_for_event(&mut events, |e| {
            matches!(e, SimEventType::CheckpointPhaseOneStarted { .. })
        })
        .await
        .expect("auto-run never triggered a checkpoint");

        match phase_one.event_type {
            SimEventType::CheckpointPhaseOneStarted { participants } => {
                assert_eq!(participants, vec![0]);
            }
            _ => unreachable!(),
        }

        engine.send(Command::Stop).unwrap();
        wait_for_event(&mut events, |e| {
            matches!(e, SimEventType::SimulationStopped)
        })
        .await
        .expect("stop was not acknowledged");

        handle.abort();
    }

    #[tokio::test]
    async fn test_pause_skips_ticks() {
        let _ = tracing_subscriber::fmt().try_init();

        let (engine, broadcaster, handle) = spawn_engine(EngineConfig::default());
        let mut events = broadcaster.subscribe();

        engine.send(Command::AddProcess { name: None }).unwrap();
        engine
            .send(Command::StartAuto {
                speed: 50.0,
                frequency: 100,
            })
            .unwrap();
        wait_for_event(&mut events, |e| {
            matches!(e, SimEventType::StepCompleted { .. })
        })
        .await
        .expect("auto-run never stepped");

        engine.send(Command::Pause).unwrap();
        wait_for_event(&mut events, |e| {
            matches!(e, SimEventType::SimulationPaused)
        })
        .await
        .expect("pause was not acknowledged");

        // While paused, the loop keeps running but no steps fire
        let stray_step = timeout(Duration::from_millis(300), async {
            loop {
                match events.recv().await {
                    Ok(event)
                        if matches!(event.event_type, SimEventType::StepCompleted { .. }) =>
                    {
                        return;
                    }
                    Ok(_) => continue,
                    Err(_) => continue,
                }
            }
        })
        .await;
        assert!(stray_step.is_err(), "step fired while paused");

        engine.send(Command::Resume).unwrap();
        wait_for_event(&mut events, |e| {
            matches!(e, SimEventType::StepCompleted { .. })
        })
        .await
        .expect("auto-run did not resume");

        handle.abort();
    }

    #[tokio::test]
    async fn test_reset_empties_the_simulation() {
        let _ = tracing_subscriber::fmt().try_init();

        let (engine, broadcaster, handle) = spawn_engine(EngineConfig::default());
        let mut events = broadcaster.subscribe();

        engine.send(Command::AddProcess { name: None }).unwrap();
        engine.send(Command::AddProcess { name: None }).unwrap();
        wait_for_event(&mut events, |e| {
            matches!(e, SimEventType::StateSnapshot { processes, .. } if processes.len() == 2)
        })
        .await
        .expect("processes never showed up in a snapshot");

        engine.send(Command::Reset).unwrap();
        let snapshot = wait_for_event(&mut events, |e| {
            matches!(e, SimEventType::StateSnapshot { processes, .. } if processes.is_empty())
        })
        .await
        .expect("reset snapshot never arrived");

        match snapshot.event_type {
            SimEventType::StateSnapshot {
                step_count,
                is_running,
                ..
            } => {
                assert_eq!(step_count, 0);
                assert!(!is_running);
            }
            _ => unreachable!(),
        }

        handle.abort();
    }

    #[tokio::test]
    async fn test_initial_processes_config() {
        let _ = tracing_subscriber::fmt().try_init();

        let config = EngineConfig {
            initial_processes: 4,
            seed: Some(11),
            ..EngineConfig::default()
        };
        let (engine, broadcaster, handle) = spawn_engine(config);
        let mut events = broadcaster.subscribe();

        // Nudge the engine so a post-subscription snapshot is emitted
        engine.send(Command::StepForward).unwrap();
        let snapshot = wait_for_event(&mut events, |e| {
            matches!(e, SimEventType::StateSnapshot { processes, .. } if !processes.is_empty())
        })
        .await
        .expect("no snapshot observed");

        match snapshot.event_type {
            SimEventType::StateSnapshot { processes, .. } => {
                assert_eq!(processes.len(), 4);
                let pids: Vec<_> = processes.iter().map(|p| p.pid).collect();
                assert_eq!(pids, vec![0, 1, 2, 3]);
            }
            _ => unreachable!(),
        }

        handle.abort();
    }
}
