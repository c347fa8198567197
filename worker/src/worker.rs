use std::{
    io::{Read, Write},
    num::NonZeroUsize,
    time::Instant,
};

use comms::{
    ControlReceiver, ControlSender, Gate, WorkItem, WorkQueue,
    msg::{RoundHeader, Signal},
};
use log::{debug, info, trace};
use ml_core::{Learner, Optimizer};

use crate::{Progress, Result, WorkerErr, WorkerMetrics};

/// A worker process' training loop.
///
/// Waits for round headers on its control channel, drains the shared work
/// queue until it reads a stop sentinel and replies with the round's total
/// loss. Training rounds go through the cross-process gate after every datum.
pub struct Worker<'d, D> {
    worker_id: usize,
    num_workers: NonZeroUsize,
    train: &'d [D],
    dev: &'d [D],
    metrics: WorkerMetrics,
    started: Instant,
}

impl<'d, D> Worker<'d, D> {
    /// Creates a new worker.
    ///
    /// # Args
    /// * `worker_id` - Identifier of the worker, the worker `0` applies the model updates.
    /// * `num_workers` - The amount of workers taking part of the run.
    /// * `train` - The training set.
    /// * `dev` - The dev set, possibly empty.
    ///
    /// # Returns
    /// A new worker instance.
    pub fn new(worker_id: usize, num_workers: NonZeroUsize, train: &'d [D], dev: &'d [D]) -> Self {
        Self {
            worker_id,
            num_workers,
            train,
            dev,
            metrics: WorkerMetrics::default(),
            started: Instant::now(),
        }
    }

    /// Whether this worker is the one applying the model updates.
    pub fn is_updater(&self) -> bool {
        self.worker_id == 0
    }

    /// Runs the worker until the orchestrator sends a stop signal.
    ///
    /// # Args
    /// * `learner` - The per-datum scoring strategy.
    /// * `optimizer` - The model's update rule.
    /// * `rx` - Receiving end of the orchestrator's control channel.
    /// * `tx` - Sending end of the reply channel.
    /// * `queue` - The work queue shared with every other worker.
    /// * `gate` - The synchronization gate shared with every other worker.
    ///
    /// # Returns
    /// The metrics gathered during the whole run.
    ///
    /// # Errors
    /// Returns `WorkerErr` on I/O failures, out of range indices or learner failures.
    pub fn run<L, O, R, W>(
        mut self,
        learner: &mut L,
        optimizer: &mut O,
        mut rx: ControlReceiver<R>,
        mut tx: ControlSender<W>,
        queue: &WorkQueue,
        gate: &Gate,
    ) -> Result<WorkerMetrics>
    where
        L: Learner<D>,
        O: Optimizer,
        R: Read,
        W: Write,
    {
        info!(worker_id = self.worker_id; "worker started");

        loop {
            let header = match rx.recv_signal()? {
                Signal::Continue(header) => header,
                Signal::Stop => break,
            };

            let start = Instant::now();
            let total = self.run_round(learner, optimizer, header, queue, gate)?;
            self.metrics.busy_time += start.elapsed();
            self.metrics.bump_round(header.is_dev);

            tx.send_pod(&total)?;
        }

        let metrics = self.metrics;
        info!(
            worker_id = self.worker_id;
            "worker finished: busy={:.1?} train_rounds={} dev_rounds={} items={} updates={}",
            metrics.busy_time,
            metrics.train_rounds,
            metrics.dev_rounds,
            metrics.items,
            metrics.updates
        );
        Ok(metrics)
    }

    /// Drains the work queue for a single round.
    fn run_round<L, O>(
        &mut self,
        learner: &mut L,
        optimizer: &mut O,
        header: RoundHeader,
        queue: &WorkQueue,
        gate: &Gate,
    ) -> Result<L::Loss>
    where
        L: Learner<D>,
        O: Optimizer,
    {
        debug!(
            worker_id = self.worker_id, epoch = header.epoch;
            "starting {} round",
            if header.is_dev { "dev" } else { "train" }
        );

        let learn = !header.is_dev;
        let mut total = L::Loss::default();
        let mut progress = Progress::new(header.report_frequency, self.started);

        while let WorkItem::Index(index) = queue.recv()? {
            let datum = self.resolve(index, header.is_dev)?;
            let loss = learner.score_datum(datum, learn)?;
            total += loss;
            self.metrics.bump_item();

            if learn {
                self.sync_update(optimizer, gate, header.learning_scale)?;
            }

            if progress.record(learner.unit_counts(datum), loss) {
                learner.report_step(&progress.take_report(self.worker_id, header));
            }
        }

        if header.end_of_epoch {
            optimizer.advance_epoch(1.0 / self.num_workers.get() as f32);
        }

        Ok(total)
    }

    fn resolve(&self, index: u32, is_dev: bool) -> Result<&'d D> {
        let data = if is_dev { self.dev } else { self.train };
        data.get(index as usize).ok_or(WorkerErr::IndexOutOfRange {
            index,
            len: data.len(),
            is_dev,
        })
    }

    /// Goes through the gate after a training datum, applying the update when
    /// this worker is the updater.
    fn sync_update<O: Optimizer>(&mut self, optimizer: &mut O, gate: &Gate, scale: f32) -> Result<()> {
        {
            let mut counter = gate.lock_counter()?;
            let arrived = counter.increment();
            if !self.is_updater() {
                return Ok(());
            }

            trace!("{arrived} datums scored since the last update");
            counter.reset();
        }

        let _update = gate.lock_update()?;
        optimizer.apply_update(scale);
        self.metrics.bump_update();
        Ok(())
    }
}

