use std::{io, num::NonZeroUsize, time::Duration};

use comms::{
    ControlReceiver, Gate, Priority, WorkItem, WorkQueue,
    msg::{RoundHeader, Signal},
};
use ml_core::{Learner, MlError, Optimizer, StepReport};
use worker::{Worker, WorkerErr};

/// Scores a datum as its own value and records every callback.
#[derive(Default)]
struct Recorder {
    scored: Vec<(u32, bool)>,
    reports: Vec<(u64, f64)>,
}

impl Learner<u32> for Recorder {
    type Loss = f64;

    fn score_datum(&mut self, datum: &u32, learn: bool) -> Result<f64, MlError> {
        self.scored.push((*datum, learn));
        Ok(f64::from(*datum))
    }

    fn report_step(&mut self, report: &StepReport<f64>) {
        self.reports.push((report.primary, report.loss_delta));
    }
}

#[derive(Default)]
struct Counting {
    updates: Vec<f32>,
    epochs: Vec<f32>,
}

impl Optimizer for Counting {
    fn apply_update(&mut self, scale: f32) {
        self.updates.push(scale);
    }

    fn advance_epoch(&mut self, scale: f32) {
        self.epochs.push(scale);
    }

    fn base_rate(&self) -> f32 {
        0.1
    }
}

/// Prepares the orchestrator's side of a run as an in-memory stream.
fn encode_signals(signals: &[Signal]) -> io::Result<ControlReceiver<io::Cursor<Vec<u8>>>> {
    let (_, mut tx) = comms::channel(io::empty(), Vec::new());
    for signal in signals {
        tx.send_signal(signal)?;
    }
    Ok(reader(tx.into_inner()))
}

fn reader(bytes: Vec<u8>) -> ControlReceiver<io::Cursor<Vec<u8>>> {
    comms::channel(io::Cursor::new(bytes), io::sink()).0
}

fn enqueue_round(queue: &WorkQueue, indices: impl IntoIterator<Item = u32>) -> io::Result<()> {
    for index in indices {
        queue.send(WorkItem::Index(index), Priority::Normal)?;
    }
    queue.send(WorkItem::Stop, Priority::Normal)
}

#[test]
fn worker_replies_once_per_round() -> io::Result<()> {
    let train: Vec<u32> = (0..10).map(|i| i * 10).collect();
    let dev: Vec<u32> = vec![1, 2, 3];

    let queue = WorkQueue::new(32)?;
    let gate = Gate::new()?;
    enqueue_round(&queue, 0..6)?;
    enqueue_round(&queue, 6..10)?;
    enqueue_round(&queue, 0..3)?;

    let rx = encode_signals(&[
        Signal::Continue(RoundHeader::train(false, 100, 1, 0.5)),
        Signal::Continue(RoundHeader::train(true, 100, 1, 0.5)),
        Signal::Continue(RoundHeader::dev(100, 1, 0.5)),
        Signal::Stop,
    ])?;
    let mut replies = Vec::new();
    let (_, tx) = comms::channel(io::empty(), &mut replies);

    let mut learner = Recorder::default();
    let mut optimizer = Counting::default();
    let workers = NonZeroUsize::new(2).unwrap();
    let metrics = Worker::new(0, workers, &train, &dev)
        .run(&mut learner, &mut optimizer, rx, tx, &queue, &gate)?;

    let mut rx = reader(replies);
    assert_eq!(rx.recv_pod::<f64>()?, 150.0);
    assert_eq!(rx.recv_pod::<f64>()?, 300.0);
    assert_eq!(rx.recv_pod::<f64>()?, 6.0);
    assert!(rx.recv_pod::<f64>().is_err());

    assert_eq!(metrics.train_rounds, 2);
    assert_eq!(metrics.dev_rounds, 1);
    assert_eq!(metrics.items, 13);
    assert_eq!(metrics.updates, 10);
    assert!(metrics.busy_time > Duration::ZERO);

    assert_eq!(optimizer.updates, vec![0.5; 10]);
    assert_eq!(optimizer.epochs, vec![0.5]);
    assert!(learner.scored[..10].iter().all(|&(_, learn)| learn));
    assert!(learner.scored[10..].iter().all(|&(_, learn)| !learn));
    assert_eq!(gate.lock_counter()?.value(), 0);
    Ok(())
}

#[test]
fn only_the_updater_applies_updates() -> io::Result<()> {
    let train: Vec<u32> = (0..5).collect();
    let queue = WorkQueue::new(8)?;
    let gate = Gate::new()?;
    enqueue_round(&queue, 0..5)?;

    let rx = encode_signals(&[
        Signal::Continue(RoundHeader::train(true, 100, 1, 1.0)),
        Signal::Stop,
    ])?;
    let (_, tx) = comms::channel(io::empty(), io::sink());

    let mut optimizer = Counting::default();
    let workers = NonZeroUsize::new(4).unwrap();
    let metrics = Worker::new(3, workers, &train, &[])
        .run(&mut Recorder::default(), &mut optimizer, rx, tx, &queue, &gate)?;

    assert_eq!(metrics.updates, 0);
    assert!(optimizer.updates.is_empty());
    assert_eq!(optimizer.epochs, vec![0.25]);
    assert_eq!(gate.lock_counter()?.value(), 5);
    Ok(())
}

#[test]
fn progress_is_reported_per_bucket() -> io::Result<()> {
    let train: Vec<u32> = vec![1; 7];
    let queue = WorkQueue::new(8)?;
    let gate = Gate::new()?;
    enqueue_round(&queue, 0..7)?;

    let rx = encode_signals(&[
        Signal::Continue(RoundHeader::train(false, 3, 1, 1.0)),
        Signal::Stop,
    ])?;
    let (_, tx) = comms::channel(io::empty(), io::sink());

    let mut learner = Recorder::default();
    let workers = NonZeroUsize::new(1).unwrap();
    Worker::new(0, workers, &train, &[])
        .run(&mut learner, &mut Counting::default(), rx, tx, &queue, &gate)?;

    assert_eq!(learner.reports, vec![(3, 3.0), (6, 3.0)]);
    Ok(())
}

#[test]
fn out_of_range_index_is_fatal() -> io::Result<()> {
    let train: Vec<u32> = (0..4).collect();
    let dev: Vec<u32> = (0..2).collect();
    let queue = WorkQueue::new(8)?;
    let gate = Gate::new()?;
    enqueue_round(&queue, [0, 1, 2])?;

    let rx = encode_signals(&[Signal::Continue(RoundHeader::dev(10, 1, 1.0)), Signal::Stop])?;
    let (_, tx) = comms::channel(io::empty(), io::sink());

    let workers = NonZeroUsize::new(1).unwrap();
    let err = Worker::new(0, workers, &train, &dev)
        .run(&mut Recorder::default(), &mut Counting::default(), rx, tx, &queue, &gate)
        .unwrap_err();

    assert!(matches!(
        err,
        WorkerErr::IndexOutOfRange {
            index: 2,
            len: 2,
            is_dev: true
        }
    ));
    Ok(())
}

#[test]
fn closed_control_channel_is_an_error() -> io::Result<()> {
    let train: Vec<u32> = (0..4).collect();
    let queue = WorkQueue::new(4)?;
    let gate = Gate::new()?;

    let (rx, tx) = comms::channel(io::empty(), io::sink());
    let workers = NonZeroUsize::new(1).unwrap();
    let err = Worker::new(0, workers, &train, &[])
        .run(&mut Recorder::default(), &mut Counting::default(), rx, tx, &queue, &gate)
        .unwrap_err();

    assert!(matches!(err, WorkerErr::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof));
    Ok(())
}
