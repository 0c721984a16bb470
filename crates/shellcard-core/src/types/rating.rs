//! Learner ratings and FSRS card states.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ShellcardError, ShellcardResult};

/// The learner's self-assessment of their recall (maps to FSRS rating values 1-4).
///
/// - Again (1): complete failure, the card needs to come back soon
/// - Hard (2): recalled with difficulty, longer interval than Again but shorter than Good
/// - Good (3): correct response, standard interval
/// - Easy (4): effortless, much longer interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Rating {
    Again = 1,
    Hard = 2,
    Good = 3,
    Easy = 4,
}

impl Rating {
    /// All ratings in ascending order.
    pub const ALL: [Rating; 4] = [Rating::Again, Rating::Hard, Rating::Good, Rating::Easy];

    /// Convert to the FSRS rating value (1-4).
    pub fn value(self) -> u8 {
        self as u8
    }

    /// Create from an FSRS rating value. Returns None for anything outside 1-4.
    pub fn from_value(value: u8) -> Option<Self> {
        match value {
            1 => Some(Rating::Again),
            2 => Some(Rating::Hard),
            3 => Some(Rating::Good),
            4 => Some(Rating::Easy),
            _ => None,
        }
    }

    /// Parse learner input into a rating.
    ///
    /// Accepts the integers 1-4, the words Again/Hard/Good/Easy in any case,
    /// and their single-letter prefixes a/h/g/e. Surrounding whitespace is
    /// ignored. Anything else fails with an invalid-rating error.
    pub fn parse(input: &str) -> ShellcardResult<Self> {
        let trimmed = input.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "1" | "again" | "a" => Ok(Rating::Again),
            "2" | "hard" | "h" => Ok(Rating::Hard),
            "3" | "good" | "g" => Ok(Rating::Good),
            "4" | "easy" | "e" => Ok(Rating::Easy),
            _ => Err(ShellcardError::invalid_rating(trimmed)),
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Rating::Again => "Again",
            Rating::Hard => "Hard",
            Rating::Good => "Good",
            Rating::Easy => "Easy",
        }
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<u8> for Rating {
    type Error = ShellcardError;

    fn try_from(value: u8) -> ShellcardResult<Self> {
        Rating::from_value(value).ok_or_else(|| ShellcardError::invalid_rating(value.to_string()))
    }
}

/// The FSRS learning state of a card.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum CardState {
    /// Never studied.
    #[default]
    New = 0,
    /// Currently in learning steps.
    Learning = 1,
    /// Graduated into the review phase.
    Review = 2,
    /// Forgotten during review, relearning.
    Relearning = 3,
}

impl CardState {
    /// The stored numeric representation (0=New, 1=Learning, 2=Review, 3=Relearning).
    pub fn value(self) -> i64 {
        self as i64
    }

    /// Create from the stored numeric representation.
    pub fn from_value(value: i64) -> Option<Self> {
        match value {
            0 => Some(CardState::New),
            1 => Some(CardState::Learning),
            2 => Some(CardState::Review),
            3 => Some(CardState::Relearning),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            CardState::New => "New",
            CardState::Learning => "Learning",
            CardState::Review => "Review",
            CardState::Relearning => "Relearning",
        }
    }
}

impl fmt::Display for CardState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_accepts_all_spellings() {
        let again = ["1", "again", "Again", "AGAIN", "a", "A", " 1 ", "\tagain\n"];
        for input in again {
            assert_eq!(Rating::parse(input).unwrap(), Rating::Again, "input {input:?}");
        }

        let hard = ["2", "hard", "Hard", "HARD", "h", "H", " h "];
        for input in hard {
            assert_eq!(Rating::parse(input).unwrap(), Rating::Hard, "input {input:?}");
        }

        let good = ["3", "good", "Good", "GOOD", "g", "G", "  3"];
        for input in good {
            assert_eq!(Rating::parse(input).unwrap(), Rating::Good, "input {input:?}");
        }

        let easy = ["4", "easy", "Easy", "EASY", "e", "E", "easy "];
        for input in easy {
            assert_eq!(Rating::parse(input).unwrap(), Rating::Easy, "input {input:?}");
        }
    }

    #[test]
    fn test_parse_rejects_everything_else() {
        for input in ["", "0", "5", "-1", "ok", "agian", "ha", "12", "q"] {
            assert!(Rating::parse(input).is_err(), "input {input:?} should be rejected");
        }
    }

    #[test]
    fn test_rating_values_round_trip() {
        for rating in Rating::ALL {
            assert_eq!(Rating::from_value(rating.value()), Some(rating));
        }
        assert_eq!(Rating::from_value(0), None);
        assert_eq!(Rating::from_value(5), None);
    }

    #[test]
    fn test_card_state_round_trip() {
        for state in [
            CardState::New,
            CardState::Learning,
            CardState::Review,
            CardState::Relearning,
        ] {
            assert_eq!(CardState::from_value(state.value()), Some(state));
        }
        assert_eq!(CardState::from_value(4), None);
        assert_eq!(CardState::from_value(-1), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(Rating::Good.to_string(), "Good");
        assert_eq!(CardState::Relearning.to_string(), "Relearning");
    }
}
