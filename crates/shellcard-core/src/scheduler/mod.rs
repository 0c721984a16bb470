//! FSRS scheduling for review cards.
//!
//! Provides the card state machine ({New, Learning, Review, Relearning}),
//! the stability/difficulty update rules, retrievability queries, and
//! interval computation used by the review coordinator.

mod fsrs_engine;

pub use fsrs_engine::*;
