//! Property-based tests for the game rules and the state encoding.
//!
//! Positions are generated by random playouts from the start, so every
//! checked state is reachable.

use std::sync::Arc;

use proptest::prelude::*;

use ur_lut::encoding::StateEncoder;
use ur_lut::topology::Topology;
use ur_lut::{FastGame, GameConfig};

fn encoder(config: GameConfig) -> StateEncoder {
    StateEncoder::new(Arc::new(Topology::new(config).unwrap()))
}

/// Strategy: a rule preset.
fn config_strategy() -> impl Strategy<Value = GameConfig> {
    prop_oneof![
        Just(GameConfig::finkel()),
        Just(GameConfig::masters()),
        Just(GameConfig::aseb()),
        (1..=7u8).prop_map(|n| GameConfig::finkel().with_starting_pieces(n)),
    ]
}

/// Strategy: (roll choice, move choice) pairs driving a playout.
fn choices_strategy() -> impl Strategy<Value = Vec<(usize, usize)>> {
    prop::collection::vec((0..16usize, 0..8usize), 0..200)
}

/// Play from the start, returning every position visited before the game ends.
fn playout(topology: &Arc<Topology>, choices: &[(usize, usize)]) -> Vec<FastGame> {
    let mut game = FastGame::new(topology.clone());
    let mut visited = vec![game.clone()];
    let rolls = topology.rolls();
    for &(r, m) in choices {
        if game.is_finished() {
            break;
        }
        let roll = rolls[r % rolls.len()].roll;
        let moves = game.apply_roll(roll).unwrap().to_vec();
        if !moves.is_empty() {
            game.apply_move(moves[m % moves.len()]).unwrap();
        }
        visited.push(game.clone());
    }
    visited
}

fn conserved(game: &FastGame, pieces: u8) -> bool {
    let light = game.light();
    let dark = game.dark();
    game.pieces_on_board(true) + light.waiting + light.score == pieces
        && game.pieces_on_board(false) + dark.waiting + dark.score == pieces
}

proptest! {
    // 1. Pieces are neither created nor destroyed
    #[test]
    fn pieces_conserved(config in config_strategy(), choices in choices_strategy()) {
        let enc = encoder(config);
        let pieces = config.starting_pieces;
        for game in playout(enc.topology(), &choices) {
            prop_assert!(conserved(&game, pieces), "{:?}", game.snapshot());
        }
    }

    // 2. Mirroring twice is the identity
    #[test]
    fn mirror_involution(config in config_strategy(), choices in choices_strategy()) {
        let enc = encoder(config);
        let mut once = FastGame::new(enc.topology().clone());
        let mut twice = FastGame::new(enc.topology().clone());
        for game in playout(enc.topology(), &choices) {
            game.mirror_into(&mut once);
            once.mirror_into(&mut twice);
            prop_assert!(twice.same_position(&game), "{:?}", game.snapshot());
            prop_assert_ne!(once.is_light_turn(), game.is_light_turn());
        }
    }

    // 3. Decoding a key gives back the encoded position
    #[test]
    fn encode_decode_round_trip(config in config_strategy(), choices in choices_strategy()) {
        let enc = encoder(config);
        let mut decoded = FastGame::new(enc.topology().clone());
        for game in playout(enc.topology(), &choices) {
            if game.is_finished() {
                continue;
            }
            let key = enc.encode(&game);
            enc.decode(key, &mut decoded).unwrap();
            prop_assert!(decoded.same_position(&game), "key {key:#x}");
            prop_assert_eq!(enc.encode(&decoded), key);
        }
    }

    // 4. A position and its mirror share one canonical, light-to-move key
    #[test]
    fn mirror_shares_canonical_key(config in config_strategy(), choices in choices_strategy()) {
        let enc = encoder(config);
        let mut mirror = FastGame::new(enc.topology().clone());
        let mut scratch = FastGame::new(enc.topology().clone());
        for game in playout(enc.topology(), &choices) {
            game.mirror_into(&mut mirror);
            let key = enc.encode_canonical(&game, &mut scratch);
            prop_assert!(StateEncoder::is_canonical(key));
            prop_assert_eq!(enc.encode_canonical(&mirror, &mut scratch), key);
        }
    }

    // 5. Snapshots reproduce the position they were taken from
    #[test]
    fn snapshot_round_trip(config in config_strategy(), choices in choices_strategy()) {
        let enc = encoder(config);
        let mut loaded = FastGame::new(enc.topology().clone());
        for game in playout(enc.topology(), &choices) {
            loaded.copy_from_snapshot(&game.snapshot()).unwrap();
            prop_assert!(loaded.same_position(&game), "{:?}", game.snapshot());
        }
    }

    // 6. Out-of-range rolls are rejected without changing the position
    #[test]
    fn illegal_roll_rejected(roll in 5..=u8::MAX) {
        let enc = encoder(GameConfig::finkel());
        let mut game = FastGame::new(enc.topology().clone());
        let before = game.clone();
        prop_assert!(game.apply_roll(roll).is_err());
        prop_assert!(game.same_position(&before));
    }
}
