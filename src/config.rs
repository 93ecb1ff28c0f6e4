//! Game configurations: board shape, path pair, dice and rule flags.
//!
//! A [`GameConfig`] is the descriptor persisted in every table's metadata. It is
//! plain data; [`crate::topology::Topology::new`] validates it and derives the
//! tile tables the solver works with.
//!
//! | Preset | Board | Paths | Dice | Pieces | Safe rosettes |
//! |--------|-------|-------|------|--------|---------------|
//! | `finkel` | Standard | Bell | four binary | 7 | yes |
//! | `masters` | Standard | Masters | three binary, 0 counts as 4 | 7 | no |
//! | `aseb` | Aseb | Aseb | four binary | 5 | yes |

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::MAX_ROLL;
use crate::error::{Error, Result};

/// Board coordinate, 1-based. Column 1 is light's side, column 3 is dark's.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tile {
    pub x: u8,
    pub y: u8,
}

impl Tile {
    pub const fn new(x: u8, y: u8) -> Self {
        Self { x, y }
    }

    /// Reflect across the central column.
    pub const fn mirrored(self) -> Self {
        Self {
            x: 4 - self.x,
            y: self.y,
        }
    }
}

impl fmt::Display for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.x, self.y)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoardShape {
    Standard,
    Aseb,
}

impl BoardShape {
    pub fn contains(self, tile: Tile) -> bool {
        match self {
            BoardShape::Standard => match tile.x {
                2 => (1..=8).contains(&tile.y),
                1 | 3 => (1..=4).contains(&tile.y) || (7..=8).contains(&tile.y),
                _ => false,
            },
            BoardShape::Aseb => match tile.x {
                2 => (1..=12).contains(&tile.y),
                1 | 3 => (1..=4).contains(&tile.y),
                _ => false,
            },
        }
    }

    pub fn is_rosette(self, tile: Tile) -> bool {
        let rosettes: &[(u8, u8)] = match self {
            BoardShape::Standard => &[(1, 1), (3, 1), (2, 4), (1, 7), (3, 7)],
            BoardShape::Aseb => &[(1, 1), (3, 1), (2, 4), (2, 8), (2, 12)],
        };
        rosettes.contains(&(tile.x, tile.y))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathPair {
    Bell,
    Masters,
    Aseb,
}

impl PathPair {
    /// On-board tiles of light's path, in travel order.
    pub fn light_path(self) -> Vec<Tile> {
        let mut path: Vec<Tile> = (1..=4).rev().map(|y| Tile::new(1, y)).collect();
        match self {
            PathPair::Bell => {
                path.extend((1..=8).map(|y| Tile::new(2, y)));
                path.extend([Tile::new(1, 8), Tile::new(1, 7)]);
            }
            PathPair::Masters => {
                path.extend((1..=7).map(|y| Tile::new(2, y)));
                path.extend([
                    Tile::new(3, 7),
                    Tile::new(3, 8),
                    Tile::new(2, 8),
                    Tile::new(1, 8),
                    Tile::new(1, 7),
                ]);
            }
            PathPair::Aseb => {
                path.extend((1..=12).map(|y| Tile::new(2, y)));
            }
        }
        path
    }

    /// Dark's path: light's path reflected across the central column.
    pub fn dark_path(self) -> Vec<Tile> {
        self.light_path().into_iter().map(Tile::mirrored).collect()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiceKind {
    /// Four binary dice: rolls 0..=4 with weights 1, 4, 6, 4, 1.
    FourBinary,
    /// Three binary dice where a total of zero counts as four.
    ThreeBinary0Max,
}

impl DiceKind {
    /// Probability of each roll value, indexed by the roll.
    pub fn roll_probabilities(self) -> [f64; MAX_ROLL + 1] {
        match self {
            DiceKind::FourBinary => [1.0 / 16.0, 4.0 / 16.0, 6.0 / 16.0, 4.0 / 16.0, 1.0 / 16.0],
            DiceKind::ThreeBinary0Max => [0.0, 3.0 / 8.0, 3.0 / 8.0, 1.0 / 8.0, 1.0 / 8.0],
        }
    }
}

/// Full description of one solvable game variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameConfig {
    pub board: BoardShape,
    pub paths: PathPair,
    pub dice: DiceKind,
    pub starting_pieces: u8,
    pub safe_rosettes: bool,
    pub rosettes_grant_extra_rolls: bool,
    pub captures_grant_extra_rolls: bool,
}

impl GameConfig {
    pub fn finkel() -> Self {
        Self {
            board: BoardShape::Standard,
            paths: PathPair::Bell,
            dice: DiceKind::FourBinary,
            starting_pieces: 7,
            safe_rosettes: true,
            rosettes_grant_extra_rolls: true,
            captures_grant_extra_rolls: false,
        }
    }

    pub fn masters() -> Self {
        Self {
            board: BoardShape::Standard,
            paths: PathPair::Masters,
            dice: DiceKind::ThreeBinary0Max,
            starting_pieces: 7,
            safe_rosettes: false,
            rosettes_grant_extra_rolls: true,
            captures_grant_extra_rolls: false,
        }
    }

    pub fn aseb() -> Self {
        Self {
            board: BoardShape::Aseb,
            paths: PathPair::Aseb,
            dice: DiceKind::FourBinary,
            starting_pieces: 5,
            safe_rosettes: true,
            rosettes_grant_extra_rolls: true,
            captures_grant_extra_rolls: false,
        }
    }

    pub fn with_starting_pieces(mut self, pieces: u8) -> Self {
        self.starting_pieces = pieces;
        self
    }

    /// JSON descriptor stored in table metadata.
    pub fn descriptor(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{:?}", self))
    }
}

impl FromStr for GameConfig {
    type Err = Error;

    /// Parse a preset name.
    fn from_str(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "finkel" => Ok(Self::finkel()),
            "masters" => Ok(Self::masters()),
            "aseb" => Ok(Self::aseb()),
            other => Err(Error::config(format!(
                "unknown preset '{other}' (expected finkel, masters or aseb)"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_stay_on_their_boards() {
        for (board, paths) in [
            (BoardShape::Standard, PathPair::Bell),
            (BoardShape::Standard, PathPair::Masters),
            (BoardShape::Aseb, PathPair::Aseb),
        ] {
            for tile in paths.light_path().into_iter().chain(paths.dark_path()) {
                assert!(board.contains(tile), "{paths:?} leaves {board:?} at {tile}");
            }
        }
    }

    #[test]
    fn test_path_lengths() {
        assert_eq!(PathPair::Bell.light_path().len(), 14);
        assert_eq!(PathPair::Masters.light_path().len(), 16);
        assert_eq!(PathPair::Aseb.light_path().len(), 16);
    }

    #[test]
    fn test_roll_probabilities_sum_to_one() {
        for dice in [DiceKind::FourBinary, DiceKind::ThreeBinary0Max] {
            let sum: f64 = dice.roll_probabilities().iter().sum();
            assert!((sum - 1.0).abs() < 1e-12, "{dice:?} sums to {sum}");
        }
    }

    #[test]
    fn test_bell_rosettes_on_light_path() {
        let path = PathPair::Bell.light_path();
        let rosettes: Vec<usize> = path
            .iter()
            .enumerate()
            .filter(|(_, &t)| BoardShape::Standard.is_rosette(t))
            .map(|(i, _)| i + 1)
            .collect();
        assert_eq!(rosettes, vec![4, 8, 14]);
    }

    #[test]
    fn test_preset_parsing() {
        assert_eq!("Finkel".parse::<GameConfig>().unwrap(), GameConfig::finkel());
        assert!("senet".parse::<GameConfig>().is_err());
    }

    #[test]
    fn test_descriptor_round_trips() {
        let config = GameConfig::masters().with_starting_pieces(3);
        let parsed: GameConfig = serde_json::from_str(&config.descriptor()).unwrap();
        assert_eq!(parsed, config);
    }
}
