use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::DecodeError;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Win,
    Loss,
    Tie,
}
impl Outcome {
    /// The same round seen from the other side of the table.
    pub fn reversed(self) -> Outcome {
        match self {
            Outcome::Win => Outcome::Loss,
            Outcome::Loss => Outcome::Win,
            Outcome::Tie => Outcome::Tie,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Move {
    Rock,
    Paper,
    Scissors,
}
impl Move {
    pub const ALL: [Move; 3] = [Move::Rock, Move::Paper, Move::Scissors];

    /// Rock crushes scissors, scissors cut paper, paper covers rock.
    pub fn beats(&self, other: &Move) -> bool {
        matches!(
            (self, other),
            (Move::Rock, Move::Scissors) | (Move::Scissors, Move::Paper) | (Move::Paper, Move::Rock)
        )
    }

    /// The single move that beats this one.
    pub fn beaten_by(&self) -> Move {
        match self {
            Move::Rock => Move::Paper,
            Move::Paper => Move::Scissors,
            Move::Scissors => Move::Rock,
        }
    }

    /// Name used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Move::Rock => "ROCK",
            Move::Paper => "PAPER",
            Move::Scissors => "SCISSORS",
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        self.as_str().as_bytes().to_vec()
    }

    pub fn decode(bytes: &[u8]) -> Result<Move, DecodeError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|_| DecodeError::InvalidUtf8 { len: bytes.len() })?;
        text.parse()
    }
}

impl FromStr for Move {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ROCK" => Ok(Move::Rock),
            "PAPER" => Ok(Move::Paper),
            "SCISSORS" => Ok(Move::Scissors),
            other => Err(DecodeError::UnknownMove(other.to_owned())),
        }
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn resolve(my_move: Move, peer_move: Move) -> Outcome {
    if my_move.beats(&peer_move) {
        Outcome::Win
    } else if my_move == peer_move {
        Outcome::Tie
    } else {
        debug_assert!(
            peer_move.beats(&my_move),
            "{peer_move} must beat {my_move} when neither wins nor ties"
        );
        Outcome::Loss
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn any_move() -> impl Strategy<Value = Move> {
        prop::sample::select(Move::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn exactly_one_relation_holds(a in any_move(), b in any_move()) {
            let relations = [a.beats(&b), b.beats(&a), a == b];
            prop_assert_eq!(relations.iter().filter(|held| **held).count(), 1);
        }

        #[test]
        fn resolution_is_antisymmetric(a in any_move(), b in any_move()) {
            if a == b {
                prop_assert_eq!(resolve(a, b), Outcome::Tie);
                prop_assert_eq!(resolve(b, a), Outcome::Tie);
            } else {
                prop_assert_eq!(resolve(a, b), resolve(b, a).reversed());
                prop_assert_ne!(resolve(a, b), Outcome::Tie);
            }
        }
    }

    #[test]
    fn no_move_beats_itself() {
        for m in Move::ALL {
            assert!(!m.beats(&m));
        }
    }

    #[test]
    fn dominance_is_cyclic() {
        assert!(Move::Rock.beats(&Move::Scissors));
        assert!(Move::Scissors.beats(&Move::Paper));
        assert!(Move::Paper.beats(&Move::Rock));
        for m in Move::ALL {
            assert!(m.beaten_by().beats(&m));
        }
    }

    #[test]
    fn decodes_wire_names() {
        assert_eq!(Move::decode(b"ROCK"), Ok(Move::Rock));
        assert_eq!(Move::decode(b"PAPER"), Ok(Move::Paper));
        assert_eq!(Move::decode(b"SCISSORS"), Ok(Move::Scissors));
        assert_eq!(Move::Scissors.encode(), b"SCISSORS".to_vec());
    }

    #[test]
    fn rejects_unknown_payloads() {
        assert_eq!(
            Move::decode(b"LIZARD"),
            Err(DecodeError::UnknownMove("LIZARD".to_owned()))
        );
        // Case-sensitive, like the enumeration names
        assert!(Move::decode(b"rock").is_err());
        assert_eq!(
            Move::decode(&[0xff, 0xfe]),
            Err(DecodeError::InvalidUtf8 { len: 2 })
        );
    }

    #[test]
    fn serializes_as_wire_name() {
        assert_eq!(serde_json::to_string(&Move::Paper).unwrap(), "\"PAPER\"");
        let parsed: Move = serde_json::from_str("\"SCISSORS\"").unwrap();
        assert_eq!(parsed, Move::Scissors);
    }
}
