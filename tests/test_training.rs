//! End-to-end training tests on small Finkel variants.
//!
//! A two-piece game trains in well under a second, and the trained table is
//! shared across tests.

use std::collections::HashSet;
use std::sync::OnceLock;

use ur_lut::encoding::StateEncoder;
use ur_lut::storage::{read_lut, read_lut_expecting};
use ur_lut::trainer::TrainOutcome;
use ur_lut::{FastGame, GameConfig, GameSnapshot, Lut, LutTrainer, SweepOrder, TrainSettings, ValueType};

const PRECISION: f64 = 0.001;

fn config() -> GameConfig {
    GameConfig::finkel().with_starting_pieces(2)
}

fn settings(order: SweepOrder) -> TrainSettings {
    TrainSettings {
        precision: PRECISION,
        order,
        ..TrainSettings::default()
    }
}

fn train(order: SweepOrder) -> (Lut, TrainOutcome) {
    let trainer = LutTrainer::new(config()).unwrap();
    let mut lut = trainer.populate_new_lut(ValueType::F32, false).unwrap();
    let outcome = trainer.train(&mut lut, &settings(order)).unwrap();
    (lut, outcome)
}

static TRAINED: OnceLock<(Lut, TrainOutcome)> = OnceLock::new();

fn trained() -> &'static (Lut, TrainOutcome) {
    TRAINED.get_or_init(|| train(SweepOrder::Layered))
}

fn win_percent(lut: &Lut, snapshot: &GameSnapshot) -> f64 {
    let mut game = lut.new_game();
    game.copy_from_snapshot(snapshot).unwrap();
    let mut scratch = lut.new_game();
    lut.get_light_win_percent(&game, &mut scratch).unwrap()
}

#[test]
fn test_training_converges() {
    let (lut, outcome) = trained();
    assert!(outcome.is_converged(), "{outcome:?}");
    assert!(outcome.report().max_change < PRECISION);
    assert_eq!(
        lut.annotation("training.sweeps"),
        Some(outcome.report().sweep.to_string().as_str())
    );
    assert_eq!(lut.annotation("training.order"), Some("layered"));
}

#[test]
fn test_initial_state_value() {
    let (lut, _) = trained();
    let light = win_percent(lut, &GameSnapshot::initial());
    assert!(light > 40.0 && light < 65.0, "light={light}");

    // The same position with dark to move is its mirror image.
    let dark_first = GameSnapshot {
        light_to_move: false,
        ..GameSnapshot::initial()
    };
    let dark = win_percent(lut, &dark_first);
    assert!((light + dark - 100.0).abs() < 1e-4, "light={light} dark={dark}");
}

#[test]
fn test_nearly_won_state() {
    let (lut, _) = trained();
    let last = lut.topology().path_len();
    let snapshot = GameSnapshot {
        light_pieces: vec![last],
        dark_pieces: vec![],
        light_score: 1,
        dark_score: 0,
        light_to_move: true,
    };
    let value = win_percent(lut, &snapshot);
    assert!(value > 90.0, "value={value}");
}

#[test]
fn test_finished_states_are_exact() {
    let (lut, _) = trained();
    let won = GameSnapshot {
        light_pieces: vec![],
        dark_pieces: vec![3],
        light_score: 2,
        dark_score: 1,
        light_to_move: false,
    };
    assert_eq!(win_percent(lut, &won), 100.0);
    let lost = GameSnapshot {
        light_pieces: vec![5],
        dark_pieces: vec![],
        light_score: 0,
        dark_score: 2,
        light_to_move: true,
    };
    assert_eq!(win_percent(lut, &lost), 0.0);
}

#[test]
fn test_values_within_bounds() {
    let (lut, _) = trained();
    for chunk in lut.store().chunks() {
        for i in 0..chunk.len() {
            let v = chunk.get(i);
            assert!((0.0..=100.0).contains(&v), "shard {} index {i}: {v}", chunk.upper());
        }
    }
}

#[test]
fn test_extra_sweep_stays_converged() {
    let (lut, outcome) = trained();
    let mut lut = lut.clone();
    let trainer = LutTrainer::new(config()).unwrap();
    let change = trainer.sweep(&mut lut, SweepOrder::Layered, false).unwrap();
    assert!(change < PRECISION, "change={change} after {:?}", outcome.report());
}

#[test]
fn test_values_satisfy_bellman_equation() {
    let (lut, _) = trained();
    let trainer = LutTrainer::new(config()).unwrap();
    let enumerator = trainer.enumerator();
    let mut buffers = enumerator.new_buffers();
    let mut checked = 0u64;
    let mut states = Vec::new();
    enumerator
        .for_each_state(&mut buffers, |key, state| {
            if (key >> 1) % 97 == 0 {
                states.push((key, state.clone()));
            }
            Ok(())
        })
        .unwrap();

    for (key, state) in states {
        let successors = enumerator.collect_successors(&state, &mut buffers).unwrap();
        let mut expected = 0.0;
        for roll in successors.rolls() {
            // A roll with no legal move still has the pass as its one successor.
            assert!(!roll.successors().is_empty());
            let best = roll
                .successors()
                .iter()
                .map(|s| s.light_percent(|k| lut.get_canonical(k)).unwrap())
                .fold(f64::MIN, f64::max);
            expected += roll.probability * best;
        }
        let stored = lut.get_canonical(key).unwrap();
        assert!(
            (stored - expected).abs() < 10.0 * PRECISION,
            "key {key:#x}: stored {stored} expected {expected}"
        );
        checked += 1;
    }
    assert!(checked > 0);
}

#[test]
fn test_keys_unique_and_canonical() {
    let trainer = LutTrainer::new(config()).unwrap();
    let enumerator = trainer.enumerator();
    let encoder = enumerator.encoder().clone();
    let mut buffers = enumerator.new_buffers();
    let mut decoded = FastGame::new(encoder.topology().clone());
    let mut keys = HashSet::new();
    enumerator
        .for_each_state(&mut buffers, |key, state| {
            assert!(StateEncoder::is_canonical(key));
            assert!(state.is_light_turn() && !state.is_finished());
            assert_eq!(encoder.encode(state), key);
            encoder.decode(key, &mut decoded).unwrap();
            assert!(decoded.same_position(state));
            assert!(keys.insert(key), "duplicate key {key:#x}");
            Ok(())
        })
        .unwrap();
    assert_eq!(keys.len() as u64, enumerator.count_states());
}

#[test]
fn test_jacobi_agrees_with_layered() {
    let (layered, _) = trained();
    let (jacobi, outcome) = train(SweepOrder::Jacobi);
    assert!(outcome.is_converged());
    let a = win_percent(layered, &GameSnapshot::initial());
    let b = win_percent(&jacobi, &GameSnapshot::initial());
    assert!((a - b).abs() < 0.1, "layered={a} jacobi={b}");
}

#[test]
fn test_checkpoint_and_resume() {
    let dir = tempfile::tempdir().unwrap();
    let checkpoint = dir.path().join("finkel2.lut.checkpoint");
    let trainer = LutTrainer::new(config()).unwrap();

    let mut lut = trainer.populate_new_lut(ValueType::F32, false).unwrap();
    let limited = TrainSettings {
        max_sweeps: Some(2),
        checkpoint: Some(checkpoint.clone()),
        ..settings(SweepOrder::Layered)
    };
    let outcome = trainer.train(&mut lut, &limited).unwrap();
    assert!(matches!(outcome, TrainOutcome::SweepLimit(_)), "{outcome:?}");
    assert_eq!(outcome.report().sweep, 2);

    let mut resumed = read_lut_expecting(&checkpoint, ValueType::F32).unwrap();
    resumed.check_config(&config()).unwrap();
    assert_eq!(resumed.annotation("training.sweeps"), Some("2"));

    let resume = TrainSettings {
        checkpoint: Some(checkpoint.clone()),
        ..settings(SweepOrder::Layered)
    };
    let outcome = trainer.train(&mut resumed, &resume).unwrap();
    assert!(outcome.is_converged());

    // Resuming from an exact checkpoint replays the uninterrupted run.
    let (uninterrupted, full) = trained();
    assert_eq!(outcome.report().sweep, full.report().sweep);
    let a = win_percent(&resumed, &GameSnapshot::initial());
    let b = win_percent(uninterrupted, &GameSnapshot::initial());
    assert!((a - b).abs() < 1e-9, "resumed={a} uninterrupted={b}");

    let on_disk = read_lut(&checkpoint).unwrap();
    assert_eq!(on_disk.annotation("training.sweeps"), Some(full.report().sweep.to_string().as_str()));
}

#[test]
fn test_train_and_write() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out").join("finkel2.lut");
    let trainer = LutTrainer::new(config()).unwrap();

    // A run cut short leaves no output behind.
    let mut lut = trainer.populate_new_lut(ValueType::F32, false).unwrap();
    let short = TrainSettings {
        max_sweeps: Some(1),
        ..settings(SweepOrder::Layered)
    };
    let outcome = trainer
        .train_and_write(&mut lut, &short, &output, ValueType::Percent16)
        .unwrap();
    assert!(!outcome.is_converged());
    assert!(!output.exists());

    let outcome = trainer
        .train_and_write(&mut lut, &settings(SweepOrder::Layered), &output, ValueType::Percent16)
        .unwrap();
    assert!(outcome.is_converged());

    let written = read_lut_expecting(&output, ValueType::Percent16).unwrap();
    assert_eq!(written.entry_count(), lut.entry_count());
    let a = win_percent(&written, &GameSnapshot::initial());
    let b = win_percent(&lut, &GameSnapshot::initial());
    assert!((a - b).abs() <= 0.01, "percent16={a} f32={b}");
    assert!(read_lut_expecting(&output, ValueType::F32).is_err());
}

/// The four-piece Finkel game trained to the default precision.
///
/// Takes minutes in release mode: `cargo test --release -- --ignored`.
#[test]
#[ignore]
fn test_four_piece_finkel_end_to_end() {
    let config = GameConfig::finkel().with_starting_pieces(4);
    let trainer = LutTrainer::new(config).unwrap();
    let mut lut = trainer.populate_new_lut(ValueType::F32, false).unwrap();
    let settings = TrainSettings {
        precision: 0.0001,
        ..TrainSettings::default()
    };
    let outcome = trainer.train(&mut lut, &settings).unwrap();
    assert!(outcome.is_converged(), "{outcome:?}");

    let initial = win_percent(&lut, &GameSnapshot::initial());
    assert!((initial - 50.0).abs() < 5.0, "initial={initial}");

    // Light has scored all but one piece, which waits one step from home.
    let nearly_won = GameSnapshot {
        light_pieces: vec![lut.topology().path_len()],
        dark_pieces: vec![],
        light_score: 3,
        dark_score: 0,
        light_to_move: true,
    };
    let value = win_percent(&lut, &nearly_won);
    assert!(value > 99.0, "value={value}");

    let change = trainer.sweep(&mut lut, SweepOrder::Layered, false).unwrap();
    assert!(change < settings.precision, "change={change}");
}
