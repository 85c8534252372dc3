//! Prize-pool-delta NGR estimate.
//!
//! New money entering draw N is whatever N's prize tiers hold beyond the
//! rollover carried from N-1:
//!
//! ```text
//! prev_rollover = Σ amount(N-1) - Σ win(N-1)
//! estimate      = Σ amount(N)   - prev_rollover
//! ```

use serde::{Deserialize, Serialize};

use crate::feeds::PrizeBook;
use crate::models::PrizeTier;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrizeDelta {
    pub current_total: f64,
    pub previous_total: f64,
    pub previous_payouts: f64,
    pub previous_rollover: f64,
    pub estimated_ngr: f64,
}

pub fn prize_delta(current: &[PrizeTier], previous: &[PrizeTier]) -> PrizeDelta {
    let current_total: f64 = current.iter().map(|t| t.amount).sum();
    let previous_total: f64 = previous.iter().map(|t| t.amount).sum();
    let previous_payouts: f64 = previous.iter().map(|t| t.win).sum();
    let previous_rollover = previous_total - previous_payouts;

    PrizeDelta {
        current_total,
        previous_total,
        previous_payouts,
        previous_rollover,
        estimated_ngr: current_total - previous_rollover,
    }
}

/// `None` when either draw's prize data is missing; never guessed.
pub fn estimate_from_book(book: &PrizeBook, draw_number: u64) -> Option<PrizeDelta> {
    if draw_number <= 1 {
        return None;
    }
    let current = book.get(draw_number)?;
    let previous = book.get(draw_number - 1)?;
    Some(prize_delta(current, previous))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn tier(category: &str, amount: f64, win_count: u64, win: f64) -> PrizeTier {
        PrizeTier {
            category: category.to_string(),
            amount,
            win_count,
            win,
        }
    }

    #[test]
    fn test_delta_formula() {
        let previous = vec![
            tier("JACKPOT", 900_000.0, 0, 0.0),
            tier("TIER_2", 100_000.0, 4, 100_000.0),
        ];
        let current = vec![
            tier("JACKPOT", 960_000.0, 0, 0.0),
            tier("TIER_2", 140_000.0, 0, 0.0),
        ];
        let d = prize_delta(&current, &previous);
        assert_eq!(d.previous_rollover, 900_000.0);
        assert_eq!(d.current_total, 1_100_000.0);
        assert_eq!(d.estimated_ngr, 200_000.0);
    }

    #[test]
    fn test_missing_either_side_is_none() {
        let mut book = PrizeBook::new();
        book.insert(5, Arc::new(vec![tier("JACKPOT", 10.0, 0, 0.0)]));
        assert!(estimate_from_book(&book, 5).is_none());
        assert!(estimate_from_book(&book, 6).is_none());

        book.insert(4, Arc::new(vec![tier("JACKPOT", 8.0, 0, 1.0)]));
        assert_eq!(estimate_from_book(&book, 5).unwrap().estimated_ngr, 3.0);
    }

    #[test]
    fn test_first_draw_has_no_delta() {
        let mut book = PrizeBook::new();
        book.insert(1, Arc::new(vec![tier("JACKPOT", 10.0, 0, 0.0)]));
        assert!(estimate_from_book(&book, 1).is_none());
    }
}
