use common::model::game::{Move, Outcome};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Round {
    pub my_move: Move,
    pub their_move: Move,
    pub outcome: Outcome,
}
pub trait Strategy {
    fn make_move(&mut self, history: &[Round]) -> Move;
}

// Trivial strategies
pub struct OnlyRock {}
impl Strategy for OnlyRock {
    fn make_move(&mut self, _: &[Round]) -> Move {
        Move::Rock
    }
}
pub struct OnlyPaper {}
impl Strategy for OnlyPaper {
    fn make_move(&mut self, _: &[Round]) -> Move {
        Move::Paper
    }
}
pub struct OnlyScissors {}
impl Strategy for OnlyScissors {
    fn make_move(&mut self, _: &[Round]) -> Move {
        Move::Scissors
    }
}

// Random
pub struct RandomMove {
    rng: StdRng,
}
impl RandomMove {
    pub fn new() -> Self {
        RandomMove {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        RandomMove {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}
impl Default for RandomMove {
    fn default() -> Self {
        Self::new()
    }
}
impl Strategy for RandomMove {
    fn make_move(&mut self, _: &[Round]) -> Move {
        *Move::ALL.choose(&mut self.rng).unwrap_or(&Move::Rock)
    }
}

/// Plays whatever would have beaten the opponent's previous move.
pub struct BeatLast {}
impl Strategy for BeatLast {
    fn make_move(&mut self, history: &[Round]) -> Move {
        history
            .last()
            .map(|round| round.their_move.beaten_by())
            .unwrap_or(Move::Rock)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round(my_move: Move, their_move: Move) -> Round {
        Round {
            my_move,
            their_move,
            outcome: common::model::game::resolve(my_move, their_move),
        }
    }

    #[test]
    fn beat_last_counters_previous_move() {
        let mut strategy = BeatLast {};
        assert_eq!(strategy.make_move(&[]), Move::Rock);
        let history = vec![round(Move::Rock, Move::Paper)];
        assert_eq!(strategy.make_move(&history), Move::Scissors);
        let history = vec![
            round(Move::Rock, Move::Paper),
            round(Move::Scissors, Move::Scissors),
        ];
        assert_eq!(strategy.make_move(&history), Move::Rock);
    }

    #[test]
    fn seeded_random_is_repeatable() {
        let mut first = RandomMove::seeded(7);
        let mut second = RandomMove::seeded(7);
        let a: Vec<Move> = (0..16).map(|_| first.make_move(&[])).collect();
        let b: Vec<Move> = (0..16).map(|_| second.make_move(&[])).collect();
        assert_eq!(a, b);
    }
}
