use crate::{
    backend::{DrainStats, GraphBackend},
    error::RunError,
    operation_log::{EdgeOperation, Operation},
    workload::Workload,
};
use std::{
    fmt,
    time::{Duration, Instant},
};
use tracing::{info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Phase1Loading,
    Phase2Updating,
    Done,
}

impl Phase {
    pub const fn as_str(self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Phase1Loading => "loading core graph",
            Phase::Phase2Updating => "applying updates",
            Phase::Done => "done",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Worker that receives the record at `index` within its phase.
#[inline]
pub fn assign_thread(index: usize, threads: usize) -> usize {
    index % threads
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseReport {
    pub phase: Phase,
    pub submitted: usize,
    pub skipped_reads: usize,
    /// Records handed to each worker index.
    pub per_thread: Vec<usize>,
    pub drain: DrainStats,
    /// Wall-clock time spent inside `start`.
    pub elapsed: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub core: PhaseReport,
    pub updates: PhaseReport,
    pub node_bound: usize,
    pub final_edge_count: usize,
}

/// Drives one backend through core-graph load then update application.
pub struct Orchestrator<'a> {
    backend: &'a mut dyn GraphBackend,
    threads: usize,
    phase: Phase,
}

impl<'a> Orchestrator<'a> {
    pub fn new(backend: &'a mut dyn GraphBackend, threads: usize) -> Self {
        Self {
            backend,
            threads: threads.max(1),
            phase: Phase::Idle,
        }
    }

    #[inline]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Idle -> Phase1Loading; leaves the orchestrator ready for updates.
    pub fn load_core_graph(&mut self, records: &[EdgeOperation]) -> Result<PhaseReport, RunError> {
        self.require(Phase::Idle, Phase::Phase1Loading)?;
        self.phase = Phase::Phase1Loading;
        let report = self.dispatch(records)?;
        self.phase = Phase::Phase2Updating;
        Ok(report)
    }

    /// Phase2Updating -> Done.
    pub fn apply_updates(&mut self, records: &[EdgeOperation]) -> Result<PhaseReport, RunError> {
        self.require(Phase::Phase2Updating, Phase::Phase2Updating)?;
        let report = self.dispatch(records)?;
        self.phase = Phase::Done;
        Ok(report)
    }

    fn require(&self, required: Phase, requested: Phase) -> Result<(), RunError> {
        if self.phase == required {
            Ok(())
        } else {
            Err(RunError::OutOfOrder {
                requested: requested.as_str(),
                current: self.phase.as_str(),
            })
        }
    }

    #[instrument(
        name = "phase",
        level = "debug",
        skip_all,
        fields(phase = %self.phase, records = records.len(), threads = self.threads)
    )]
    fn dispatch(&mut self, records: &[EdgeOperation]) -> Result<PhaseReport, RunError> {
        let phase = self.phase;
        let backend_error = |source| RunError::Backend {
            phase: phase.as_str(),
            source,
        };

        let mut per_thread = vec![0usize; self.threads];
        let mut skipped_reads = 0usize;
        for (index, record) in records.iter().enumerate() {
            let thread_index = assign_thread(index, self.threads);
            match record.op {
                Operation::Add => self
                    .backend
                    .submit_add(thread_index, record.src, record.dst)
                    .map_err(backend_error)?,
                Operation::Delete => self
                    .backend
                    .submit_delete(thread_index, record.src, record.dst)
                    .map_err(backend_error)?,
                Operation::Read => {
                    skipped_reads += 1;
                    warn!(index, src = record.src, dst = record.dst, "READ is not executable");
                    continue;
                }
            }
            per_thread[thread_index] += 1;
        }

        let started = Instant::now();
        let drain = self.backend.start(self.threads).map_err(backend_error)?;
        let elapsed = started.elapsed();
        self.backend.stop().map_err(backend_error)?;

        let submitted = records.len() - skipped_reads;
        info!(
            %phase,
            submitted,
            skipped_reads,
            applied = drain.applied(),
            elapsed_ms = elapsed.as_secs_f64() * 1_000.0,
            "phase complete"
        );

        Ok(PhaseReport {
            phase,
            submitted,
            skipped_reads,
            per_thread,
            drain,
            elapsed,
        })
    }
}

/// Run both phases of `workload` on `backend` with `threads` workers.
#[instrument(name = "execute", level = "debug", skip_all, fields(threads = threads))]
pub fn execute(
    backend: &mut dyn GraphBackend,
    workload: &Workload,
    threads: usize,
) -> Result<RunReport, RunError> {
    let mut orchestrator = Orchestrator::new(backend, threads);
    let core = orchestrator.load_core_graph(workload.core.records())?;
    let updates = orchestrator.apply_updates(workload.update_slice())?;
    debug_assert_eq!(orchestrator.phase(), Phase::Done);

    let final_edge_count = orchestrator.backend.edge_count();
    Ok(RunReport {
        core,
        updates,
        node_bound: workload.node_bound,
        final_edge_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backend::{self, BackendError, BackendParams},
        config::{BackendVariant, SearchMode},
        operation_log::OperationLog,
    };

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        Add { thread: usize, src: usize, dst: usize },
        Delete { thread: usize, src: usize, dst: usize },
        Start(usize),
        Stop,
    }

    #[derive(Default)]
    struct RecordingBackend {
        events: Vec<Event>,
        queued: usize,
    }

    impl GraphBackend for RecordingBackend {
        fn submit_add(
            &mut self,
            thread_index: usize,
            src: usize,
            dst: usize,
        ) -> Result<(), BackendError> {
            self.queued += 1;
            self.events.push(Event::Add {
                thread: thread_index,
                src,
                dst,
            });
            Ok(())
        }

        fn submit_delete(
            &mut self,
            thread_index: usize,
            src: usize,
            dst: usize,
        ) -> Result<(), BackendError> {
            self.queued += 1;
            self.events.push(Event::Delete {
                thread: thread_index,
                src,
                dst,
            });
            Ok(())
        }

        fn start(&mut self, thread_count: usize) -> Result<DrainStats, BackendError> {
            self.events.push(Event::Start(thread_count));
            let drain = DrainStats {
                adds_applied: self.queued,
                ..DrainStats::default()
            };
            self.queued = 0;
            Ok(drain)
        }

        fn stop(&mut self) -> Result<(), BackendError> {
            self.events.push(Event::Stop);
            Ok(())
        }

        fn edge_count(&self) -> usize {
            0
        }
    }

    fn records(ops: &[(Operation, usize, usize)]) -> Vec<EdgeOperation> {
        ops.iter()
            .map(|&(op, src, dst)| EdgeOperation::new(op, src, dst))
            .collect()
    }

    fn workload(core: Vec<EdgeOperation>, updates: Vec<EdgeOperation>, size: usize) -> Workload {
        let node_bound = core
            .iter()
            .chain(updates.iter())
            .map(|r| r.src.max(r.dst))
            .max()
            .unwrap_or(0);
        Workload {
            size: size.min(updates.len()),
            core: OperationLog::from(core),
            updates: OperationLog::from(updates),
            node_bound,
        }
    }

    #[test]
    fn two_phase_protocol_matches_expected_event_order() {
        let mut recorder = RecordingBackend::default();
        let workload = Workload {
            node_bound: 4,
            ..workload(
                records(&[(Operation::Add, 0, 1), (Operation::Add, 2, 3)]),
                records(&[(Operation::Add, 1, 2), (Operation::Delete, 0, 3)]),
                2,
            )
        };

        let report = execute(&mut recorder, &workload, 2).unwrap();

        assert_eq!(
            recorder.events,
            vec![
                Event::Add { thread: 0, src: 0, dst: 1 },
                Event::Add { thread: 1, src: 2, dst: 3 },
                Event::Start(2),
                Event::Stop,
                Event::Add { thread: 0, src: 1, dst: 2 },
                Event::Delete { thread: 1, src: 0, dst: 3 },
                Event::Start(2),
                Event::Stop,
            ]
        );
        assert_eq!(report.node_bound, 4);
        assert_eq!(report.core.submitted, 2);
        assert_eq!(report.updates.submitted, 2);
    }

    #[test]
    fn assignment_is_index_mod_threads_per_phase() {
        let core = records(&[(Operation::Add, 9, 9); 7]);
        let updates = records(&[(Operation::Delete, 1, 1); 5]);
        let mut recorder = RecordingBackend::default();
        execute(&mut recorder, &workload(core, updates, 5), 3).unwrap();

        let threads: Vec<usize> = recorder
            .events
            .iter()
            .filter_map(|event| match *event {
                Event::Add { thread, .. } | Event::Delete { thread, .. } => Some(thread),
                _ => None,
            })
            .collect();
        // update indices restart at zero
        assert_eq!(threads, vec![0, 1, 2, 0, 1, 2, 0, 0, 1, 2, 0, 1]);
        for index in 0..100 {
            assert_eq!(assign_thread(index, 4), index % 4);
        }
    }

    #[test]
    fn clamped_workload_executes_exactly_the_update_log() {
        let updates = records(&[
            (Operation::Add, 1, 2),
            (Operation::Add, 2, 3),
            (Operation::Add, 3, 4),
        ]);
        let mut recorder = RecordingBackend::default();
        let report = execute(&mut recorder, &workload(vec![], updates, 50), 2).unwrap();
        assert_eq!(report.updates.submitted, 3);
        assert_eq!(report.updates.per_thread, vec![2, 1]);
        assert_eq!(report.core.submitted, 0);
    }

    #[test]
    fn update_submission_waits_for_core_drain() {
        let core = records(&[(Operation::Add, 0, 1); 4]);
        let updates = records(&[(Operation::Delete, 0, 1); 4]);
        let mut recorder = RecordingBackend::default();
        execute(&mut recorder, &workload(core, updates, 4), 2).unwrap();

        let first_delete = recorder
            .events
            .iter()
            .position(|event| matches!(event, Event::Delete { .. }))
            .unwrap();
        let first_stop = recorder
            .events
            .iter()
            .position(|event| *event == Event::Stop)
            .unwrap();
        assert!(first_stop < first_delete);
        assert!(recorder.events[..first_stop]
            .iter()
            .all(|event| !matches!(event, Event::Delete { .. })));
    }

    #[test]
    fn read_records_are_skipped_but_keep_their_slot() {
        let core = records(&[
            (Operation::Add, 0, 1),
            (Operation::Read, 0, 1),
            (Operation::Add, 1, 2),
        ]);
        let mut recorder = RecordingBackend::default();
        let report = execute(&mut recorder, &workload(core, vec![], 0), 2).unwrap();
        assert_eq!(report.core.skipped_reads, 1);
        assert_eq!(report.core.submitted, 2);
        // index 2 still maps to thread 0
        assert_eq!(report.core.per_thread, vec![2, 0]);
    }

    #[test]
    fn phases_cannot_run_out_of_order() {
        let mut recorder = RecordingBackend::default();
        let mut orchestrator = Orchestrator::new(&mut recorder, 1);
        assert!(matches!(
            orchestrator.apply_updates(&[]),
            Err(RunError::OutOfOrder { .. })
        ));
        orchestrator.load_core_graph(&[]).unwrap();
        assert_eq!(orchestrator.phase(), Phase::Phase2Updating);
        orchestrator.apply_updates(&[]).unwrap();
        assert_eq!(orchestrator.phase(), Phase::Done);
        assert!(matches!(
            orchestrator.apply_updates(&[]),
            Err(RunError::OutOfOrder { current: "done", .. })
        ));
        assert!(matches!(
            orchestrator.load_core_graph(&[]),
            Err(RunError::OutOfOrder { .. })
        ));
    }

    #[test]
    fn backend_failures_name_the_phase() {
        let mut pool = backend::build(
            BackendVariant::Baseline,
            BackendParams {
                threads: 2,
                search: SearchMode::Locked,
                node_capacity: 4,
                partitions_per_domain: 1,
            },
        );
        let core = records(&[(Operation::Add, 0, 1)]);
        // three orchestrator threads against a two-worker pool
        let err = execute(pool.as_mut(), &workload(core, vec![], 0), 3).unwrap_err();
        assert!(matches!(
            err,
            RunError::Backend {
                phase: "loading core graph",
                source: BackendError::ThreadCount { .. },
            }
        ));
    }

    #[test]
    fn real_backend_materializes_core_then_updates() {
        for variant in [
            BackendVariant::Baseline,
            BackendVariant::PartitionedParallel,
            BackendVariant::PartitionedParallelNuma,
        ] {
            let core = records(&[
                (Operation::Add, 0, 1),
                (Operation::Add, 2, 3),
                (Operation::Add, 1, 3),
            ]);
            let updates = records(&[(Operation::Add, 1, 2), (Operation::Delete, 0, 1)]);
            let workload = workload(core, updates, 2);
            let mut pool = backend::build(
                variant,
                BackendParams {
                    threads: 2,
                    search: SearchMode::LockFree,
                    node_capacity: workload.node_capacity(),
                    partitions_per_domain: 2,
                },
            );
            let report = execute(pool.as_mut(), &workload, 2).unwrap();
            assert_eq!(report.core.drain.adds_applied, 3, "{variant}");
            assert_eq!(report.updates.drain.adds_applied, 1, "{variant}");
            assert_eq!(report.updates.drain.deletes_applied, 1, "{variant}");
            assert_eq!(report.final_edge_count, 3, "{variant}");
        }
    }
}
