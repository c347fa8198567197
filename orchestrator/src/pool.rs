use std::{fs::File, io, num::NonZeroUsize};

use comms::{
    ControlReceiver, ControlSender, Priority, WorkItem, WorkQueue,
    msg::{RoundHeader, Signal},
};
use log::{debug, error, info, warn};
use ml_core::{Learner, LossMetric};
use nix::{
    sys::{
        signal::{self, Signal as OsSignal},
        wait::{WaitStatus, waitpid},
    },
    unistd::{ForkResult, Pid, fork},
};

use crate::{
    OrchestratorError, StopHandle,
    executor::{Round, RoundExecutor, RoundOutcome},
};

/// The orchestrator's record of a running worker process.
struct WorkerHandle {
    worker_id: usize,
    pid: Pid,
    tx: ControlSender<File>,
    rx: ControlReceiver<File>,
}

/// The worker side of a freshly forked process.
pub struct WorkerEndpoint {
    pub worker_id: usize,
    pub rx: ControlReceiver<File>,
    pub tx: ControlSender<File>,
}

/// What the calling process turned into after spawning the workers.
pub enum Role<'q> {
    Orchestrator(WorkerPool<'q>),
    Worker(WorkerEndpoint),
}

/// The set of worker processes driven by the orchestrator.
///
/// Workers not shut down gracefully are killed and reaped when the pool is
/// dropped, so a failing run never leaves processes behind.
pub struct WorkerPool<'q> {
    queue: &'q WorkQueue,
    stop: StopHandle,
    handles: Vec<WorkerHandle>,
}

/// Forks the worker processes.
///
/// Every worker gets its own pair of pipes, opened right before its fork. A
/// worker closes the orchestrator's ends of every pipe it inherited.
///
/// # Arguments
/// * `workers` - The amount of worker processes to fork.
/// * `queue` - The work queue, already mapped so every worker inherits it.
/// * `stop` - The orchestrator's stop handle.
///
/// # Returns
/// The pool in the orchestrator process or the control channel in a worker.
///
/// # Errors
/// Returns an io error if a pipe or a process could not be created, in which
/// case the workers forked so far are killed.
pub fn spawn(workers: NonZeroUsize, queue: &WorkQueue, stop: StopHandle) -> io::Result<Role<'_>> {
    let mut pool = WorkerPool {
        queue,
        stop,
        handles: Vec::with_capacity(workers.get()),
    };

    for worker_id in 0..workers.get() {
        let (child_rx, parent_tx) = comms::pipe()?;
        let (parent_rx, child_tx) = comms::pipe()?;

        // SAFETY: The child only touches memory it owns or inherited mappings,
        // and it never returns to the caller's stack frames past the training loop.
        match unsafe { fork() }? {
            ForkResult::Child => {
                drop((parent_tx, parent_rx));
                pool.release();
                return Ok(Role::Worker(WorkerEndpoint {
                    worker_id,
                    rx: child_rx,
                    tx: child_tx,
                }));
            }
            ForkResult::Parent { child } => {
                debug!(worker_id = worker_id; "forked worker with pid {child}");
                pool.handles.push(WorkerHandle {
                    worker_id,
                    pid: child,
                    tx: parent_tx,
                    rx: parent_rx,
                });
            }
        }
    }

    info!("spawned {} worker(s)", workers);
    Ok(Role::Orchestrator(pool))
}

impl WorkerPool<'_> {
    /// Closes the inherited handles without touching the processes behind them.
    fn release(mut self) {
        self.handles.clear();
    }

    /// Runs a round on every worker: broadcasts the header, enqueues the
    /// indices and one sentinel per worker, then waits for every reply.
    ///
    /// Once a stop is requested no more indices are enqueued and the sentinels
    /// overtake the indices still queued. Those are drained after the round and
    /// counted as discarded.
    fn dispatch<L: LossMetric>(&mut self, round: Round<'_>) -> Result<RoundOutcome<L>, OrchestratorError> {
        let Round { indices, header } = round;
        self.broadcast(header)?;

        let mut sent = 0;
        for &index in indices {
            if self.stop.is_requested() {
                break;
            }
            self.queue.send(WorkItem::Index(index), Priority::Normal)?;
            sent += 1;
        }

        let priority = if self.stop.is_requested() {
            Priority::Urgent
        } else {
            Priority::Normal
        };
        for _ in &self.handles {
            self.queue.send(WorkItem::Stop, priority)?;
        }

        let mut loss = L::default();
        for handle in &mut self.handles {
            loss += handle.rx.recv_pod::<L>().map_err(|source| OrchestratorError::WorkerLost {
                worker_id: handle.worker_id,
                source,
            })?;
        }

        let mut drained = 0;
        while let Some(item) = self.queue.try_recv()? {
            if let WorkItem::Index(_) = item {
                drained += 1;
            }
        }

        let discarded = (indices.len() - sent) as u64 + drained;
        if discarded > 0 {
            warn!(
                epoch = header.epoch, dev = header.is_dev;
                "stop requested, {discarded} of {} item(s) left unscored",
                indices.len()
            );
        }

        Ok(RoundOutcome { loss, discarded })
    }

    fn broadcast(&mut self, header: RoundHeader) -> Result<(), OrchestratorError> {
        let signal = Signal::Continue(header);
        for handle in &mut self.handles {
            handle
                .tx
                .send_signal(&signal)
                .map_err(|source| OrchestratorError::WorkerLost {
                    worker_id: handle.worker_id,
                    source,
                })?;
        }
        Ok(())
    }

    /// Stops every worker and waits for their processes to exit.
    ///
    /// # Errors
    /// Returns the first failure found, after every worker has been reaped.
    pub fn shutdown(mut self) -> Result<(), OrchestratorError> {
        let mut result = Ok(());

        for mut handle in std::mem::take(&mut self.handles) {
            if let Err(e) = handle.tx.send_signal(&Signal::Stop) {
                warn!(worker_id = handle.worker_id; "failed to send stop: {e}");
            }
            drop(handle.tx);

            let outcome = match waitpid(handle.pid, None) {
                Ok(WaitStatus::Exited(_, 0)) => Ok(()),
                Ok(status) => Err(OrchestratorError::WorkerFailed {
                    worker_id: handle.worker_id,
                    status: format!("{status:?}"),
                }),
                Err(errno) => Err(OrchestratorError::Io(errno.into())),
            };

            if let Err(e) = outcome {
                error!("{e}");
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }

        info!("every worker exited");
        result
    }

    /// Kills and reaps every worker still running.
    pub fn abort(mut self) {
        self.kill_all();
    }

    fn kill_all(&mut self) {
        for handle in self.handles.drain(..) {
            warn!(worker_id = handle.worker_id; "killing worker with pid {}", handle.pid);
            if let Err(e) = signal::kill(handle.pid, OsSignal::SIGKILL) {
                warn!(worker_id = handle.worker_id; "failed to kill worker: {e}");
            }
            if let Err(e) = waitpid(handle.pid, None) {
                warn!(worker_id = handle.worker_id; "failed to reap worker: {e}");
            }
        }
    }
}

impl Drop for WorkerPool<'_> {
    fn drop(&mut self) {
        self.kill_all();
    }
}

impl<D, L: Learner<D>> RoundExecutor<D, L> for WorkerPool<'_> {
    fn run_round(&mut self, _learner: &mut L, round: Round<'_>) -> Result<RoundOutcome<L::Loss>, OrchestratorError> {
        self.dispatch(round)
    }
}
