mod common;

use std::error::Error;

use common::{Counting, Probe, Tally, values};
use orchestrator::{
    EvalSchedule, OrchestratorError, RunContext, StopHandle, TrainingConfig, run_single_process,
};

type TestResult = Result<(), Box<dyn Error>>;

fn config(round_size: usize, epochs: u32) -> TrainingConfig {
    TrainingConfig {
        workers: 1,
        epochs,
        round_size,
        report_frequency: 10,
        batch_size: 1,
        rate_decay: 1.0,
        rate_threshold: 0.0,
        eval_schedule: EvalSchedule::EveryEpoch,
        seed: Some(7),
    }
}

#[test]
fn epochs_split_into_rounds_with_one_dev_pass() -> TestResult {
    let (train, dev) = (values(100), values(20));
    let mut learner = Probe::default();
    let mut optimizer = Counting::new(0.1)?;

    let summary = run_single_process(
        &RunContext::new(),
        &config(25, 3),
        &mut learner,
        &mut optimizer,
        &train,
        &dev,
    )?;

    assert_eq!(summary.epochs_run, 3);
    assert_eq!(summary.rounds, 3 * (4 + 1));
    assert!(!summary.stopped_early);
    assert_eq!(summary.discarded, 0);
    assert_eq!(summary.best_train, Some(Tally::over(train.iter().copied())));
    assert_eq!(summary.best_dev, Some(Tally::over(dev.iter().copied())));

    assert_eq!((learner.train_starts, learner.dev_starts), (12, 3));
    let epochs: Vec<f64> = learner.dev_evals().iter().map(|p| p.epoch).collect();
    assert_eq!(epochs, [1.0, 2.0, 3.0]);
    let new_bests: Vec<bool> = learner.dev_evals().iter().map(|p| p.new_best).collect();
    assert_eq!(new_bests, [true, false, false]);

    // The train point of an epoch carries its last round only.
    let train_evals = learner.train_evals();
    assert_eq!(train_evals.len(), 3);
    assert!(train_evals.iter().all(|p| p.loss.count == 25.0 && !p.new_best));

    assert_eq!((learner.dev_checkpoints, learner.train_checkpoints), (1, 1));
    assert_eq!(optimizer.shared_updates.get()?, 300);
    assert_eq!(optimizer.epochs, [1.0; 3]);
    Ok(())
}

#[test]
fn batch_counter_spans_rounds() -> TestResult {
    let train = values(20);
    let mut optimizer = Counting::new(0.1)?;
    let config = TrainingConfig {
        batch_size: 5,
        ..config(7, 1)
    };

    run_single_process(&RunContext::new(), &config, &mut Probe::default(), &mut optimizer, &train, &[])?;

    assert_eq!(optimizer.shared_updates.get()?, 4);
    assert_eq!(optimizer.scales, [1.0; 4]);
    Ok(())
}

#[test]
fn worsening_dev_loss_decays_until_stop() -> TestResult {
    let (train, dev) = (values(10), values(4));
    let mut learner = Probe {
        dev_drift: true,
        ..Probe::default()
    };
    let mut optimizer = Counting::new(0.1)?;
    let config = TrainingConfig {
        rate_decay: 0.5,
        rate_threshold: 0.03,
        ..config(5, 10)
    };

    let summary = run_single_process(&RunContext::new(), &config, &mut learner, &mut optimizer, &train, &dev)?;

    // Scale 1.0, then 0.5, then 0.25 which falls below 0.03 / 0.1.
    assert!(summary.stopped_early);
    assert_eq!(summary.epochs_run, 3);
    assert_eq!(summary.learning_scale, 0.25);
    assert_eq!(learner.dev_checkpoints, 1);
    assert_eq!(learner.train_checkpoints, 1);

    // The second epoch's plateau is only seen by the third epoch's updates.
    assert_eq!(optimizer.scales.len(), 30);
    assert_eq!(&optimizer.scales[..20], &[1.0; 20]);
    assert_eq!(&optimizer.scales[20..], &[0.5; 10]);
    Ok(())
}

#[test]
fn without_dev_set_train_loss_is_tracked_per_epoch() -> TestResult {
    let train = vec![1.0; 12];
    let mut learner = Probe::default();
    let config = TrainingConfig {
        rate_decay: 0.5,
        eval_schedule: EvalSchedule::EveryRound,
        ..config(4, 3)
    };

    let summary = run_single_process(
        &RunContext::new(),
        &config,
        &mut learner,
        &mut Counting::new(0.1)?,
        &train,
        &[],
    )?;

    // A constant epoch loss plateaus once per epoch, never per round.
    assert_eq!(summary.learning_scale, 0.25);
    assert_eq!(summary.rounds, 9);
    assert_eq!(learner.dev_starts, 0);
    assert_eq!(learner.train_checkpoints, 1);
    assert_eq!(summary.best_train, Some(Tally::over(train.iter().copied())));
    Ok(())
}

#[test]
fn every_round_schedule_evaluates_dev_after_each_round() -> TestResult {
    let (train, dev) = (values(8), values(2));
    let mut learner = Probe::default();
    let config = TrainingConfig {
        eval_schedule: EvalSchedule::EveryRound,
        ..config(2, 2)
    };

    let summary = run_single_process(
        &RunContext::new(),
        &config,
        &mut learner,
        &mut Counting::new(0.1)?,
        &train,
        &dev,
    )?;

    assert_eq!(summary.rounds, 2 * (4 + 4));
    let epochs: Vec<f64> = learner.dev_evals().iter().map(|p| p.epoch).collect();
    assert_eq!(epochs, [0.25, 0.5, 0.75, 1.0, 1.25, 1.5, 1.75, 2.0]);
    Ok(())
}

#[test]
fn stop_request_skips_evaluation() -> TestResult {
    let (train, dev) = (values(100), values(20));
    let stop = StopHandle::new();
    let ctx = RunContext::with_stop(stop.clone());
    let mut learner = Probe {
        stop_at_train: Some((2, stop)),
        ..Probe::default()
    };
    let mut optimizer = Counting::new(0.1)?;

    let summary = run_single_process(&ctx, &config(25, 3), &mut learner, &mut optimizer, &train, &dev)?;

    assert!(summary.stopped_early);
    assert_eq!(summary.rounds, 2);
    assert_eq!(summary.discarded, 25);
    assert_eq!(summary.best_dev, None);
    assert_eq!(learner.dev_starts, 0);
    assert!(learner.evals.is_empty());
    assert_eq!((learner.dev_checkpoints, learner.train_checkpoints), (0, 0));
    assert_eq!(optimizer.shared_updates.get()?, 25);
    Ok(())
}

#[test]
fn stop_during_the_last_round_skips_the_epoch_hook() -> TestResult {
    let train = values(100);
    let stop = StopHandle::new();
    let ctx = RunContext::with_stop(stop.clone());
    let mut learner = Probe {
        stop_at_train: Some((4, stop)),
        ..Probe::default()
    };
    let mut optimizer = Counting::new(0.1)?;

    let summary = run_single_process(&ctx, &config(25, 3), &mut learner, &mut optimizer, &train, &[])?;

    assert!(summary.stopped_early);
    assert_eq!(summary.rounds, 4);
    assert_eq!(summary.discarded, 25);
    assert_eq!(optimizer.shared_updates.get()?, 75);
    assert!(optimizer.epochs.is_empty());
    Ok(())
}

#[test]
fn learner_errors_abort_the_run() -> TestResult {
    let train = values(10);
    let mut learner = Probe {
        fail_on: Some(3.0),
        ..Probe::default()
    };

    let err = run_single_process(
        &RunContext::new(),
        &config(5, 1),
        &mut learner,
        &mut Counting::new(0.1)?,
        &train,
        &[],
    )
    .unwrap_err();

    assert!(matches!(err, OrchestratorError::Learner(_)));
    Ok(())
}

#[test]
fn invalid_config_is_rejected_upfront() -> TestResult {
    let mut learner = Probe::default();
    let config = TrainingConfig {
        batch_size: 0,
        ..config(5, 1)
    };

    let err = run_single_process(
        &RunContext::new(),
        &config,
        &mut learner,
        &mut Counting::new(0.1)?,
        &values(10),
        &[],
    )
    .unwrap_err();

    assert!(matches!(err, OrchestratorError::InvalidConfig(_)));
    assert_eq!(learner.train_starts, 0);
    Ok(())
}
