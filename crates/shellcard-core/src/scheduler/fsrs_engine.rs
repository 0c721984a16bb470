//! FSRS scheduler implementation.
//!
//! The update rules follow the FSRS model: a power forgetting curve
//! R(t) = (1 + factor * t/S)^(-decay) with factor = 0.9^(1/-decay) - 1,
//! per-rating initial stability from the default parameter vector, and
//! separate recall/forget stability updates during review.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{CardState, Rating};

/// Tunable FSRS parameters.
///
/// Decks may override these through their opaque parameter blob; unset fields
/// keep the defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Parameters {
    /// Target recall probability when scheduling the next review.
    #[serde(alias = "request_retention")]
    pub desired_retention: f32,
    /// Upper bound on a scheduled interval, in days.
    pub maximum_interval: i64,
    /// FSRS weight vector.
    pub weights: [f32; 21],
    /// Decay constant of the forgetting curve.
    pub decay: f32,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            desired_retention: 0.9,
            maximum_interval: 36500,
            weights: fsrs::DEFAULT_PARAMETERS,
            decay: fsrs::FSRS6_DEFAULT_DECAY,
        }
    }
}

impl Parameters {
    /// Parse a deck's JSON parameter override blob.
    ///
    /// Missing fields keep their defaults, so a deck may tune only
    /// `desired_retention` without restating the weight vector.
    pub fn from_json(blob: &str) -> crate::error::ShellcardResult<Self> {
        Ok(serde_json::from_str(blob)?)
    }
}

/// The FSRS state vector of a single card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FsrsCard {
    /// When the card next comes up for review.
    pub due: DateTime<Utc>,
    /// Days for retrievability to drop to 90%. Zero until first review.
    pub stability: f32,
    /// 1.0-10.0 scale, higher is harder. Zero until first review.
    pub difficulty: f32,
    /// Whole days between the previous review and this one.
    pub elapsed_days: i64,
    /// Whole days the current interval was scheduled for.
    pub scheduled_days: i64,
    /// Review count.
    pub reps: u32,
    /// Forgetting count.
    pub lapses: u32,
    pub state: CardState,
    pub last_review: Option<DateTime<Utc>>,
}

impl FsrsCard {
    /// A fresh state vector: New, due immediately, no memory formed.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            due: now,
            stability: 0.0,
            difficulty: 0.0,
            elapsed_days: 0,
            scheduled_days: 0,
            reps: 0,
            lapses: 0,
            state: CardState::New,
            last_review: None,
        }
    }
}

/// Log entry produced alongside every scheduling transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewLog {
    pub rating: Rating,
    /// Card state before the transition.
    pub state: CardState,
    pub elapsed_days: i64,
    pub scheduled_days: i64,
    pub reviewed_at: DateTime<Utc>,
}

/// A scheduling outcome: the post-review card plus its log entry.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulingInfo {
    pub card: FsrsCard,
    pub review_log: ReviewLog,
}

/// All four scheduling outcomes for a card, for previewing rating choices.
#[derive(Debug, Clone)]
pub struct SchedulingOptions {
    pub again: SchedulingInfo,
    pub hard: SchedulingInfo,
    pub good: SchedulingInfo,
    pub easy: SchedulingInfo,
}

impl SchedulingOptions {
    pub fn get(&self, rating: Rating) -> &SchedulingInfo {
        match rating {
            Rating::Again => &self.again,
            Rating::Hard => &self.hard,
            Rating::Good => &self.good,
            Rating::Easy => &self.easy,
        }
    }
}

/// Stateless FSRS scheduler.
///
/// Parameters are fixed at construction and held immutably; the review
/// coordinator builds one scheduler per session.
#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    params: Parameters,
}

impl Scheduler {
    /// Create a scheduler with default FSRS parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a scheduler with custom parameters (e.g. a deck override).
    pub fn with_params(params: Parameters) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &Parameters {
        &self.params
    }

    /// Create a fresh card: state New, due immediately, no memory formed.
    pub fn new_card(&self, now: DateTime<Utc>) -> FsrsCard {
        FsrsCard::new(now)
    }

    /// Process a review: consume the pre-review card, the rating, and the
    /// review instant; produce the post-review card and a log entry.
    ///
    /// A clock that moved backwards relative to the last review is not an
    /// error here; elapsed time is clamped to zero.
    pub fn next(&self, card: &FsrsCard, rating: Rating, now: DateTime<Utc>) -> SchedulingInfo {
        let mut next = card.clone();
        let previous_state = card.state;

        next.elapsed_days = match card.state {
            CardState::New => 0,
            _ => card
                .last_review
                .map(|last| (now - last).num_days().max(0))
                .unwrap_or(0),
        };
        next.last_review = Some(now);
        next.reps += 1;

        match previous_state {
            CardState::New => {
                next.stability = self.init_stability(rating);
                next.difficulty = self.init_difficulty(rating);
                match rating {
                    Rating::Again => {
                        next.scheduled_days = 0;
                        next.due = now + Duration::minutes(1);
                        next.state = CardState::Learning;
                    }
                    Rating::Hard => {
                        next.scheduled_days = 0;
                        next.due = now + Duration::minutes(5);
                        next.state = CardState::Learning;
                    }
                    Rating::Good => {
                        next.scheduled_days = 0;
                        next.due = now + Duration::minutes(10);
                        next.state = CardState::Learning;
                    }
                    Rating::Easy => {
                        let interval = self.next_interval(next.stability);
                        next.scheduled_days = interval;
                        next.due = now + Duration::days(interval);
                        next.state = CardState::Review;
                    }
                }
            }
            CardState::Learning | CardState::Relearning => match rating {
                Rating::Again => {
                    next.scheduled_days = 0;
                    next.due = now + Duration::minutes(5);
                }
                Rating::Hard => {
                    next.scheduled_days = 0;
                    next.due = now + Duration::minutes(10);
                }
                Rating::Good => {
                    let interval = self.next_interval(next.stability);
                    next.scheduled_days = interval;
                    next.due = now + Duration::days(interval);
                    next.state = CardState::Review;
                }
                Rating::Easy => {
                    let good_interval = self.next_interval(next.stability);
                    let interval = self.next_interval(next.stability).max(good_interval + 1);
                    next.scheduled_days = interval;
                    next.due = now + Duration::days(interval);
                    next.state = CardState::Review;
                }
            },
            CardState::Review => {
                let retrievability = self.review_retrievability(card, next.elapsed_days);
                let difficulty = card.difficulty;
                let stability = card.stability;

                let s_again = self.next_forget_stability(difficulty, stability, retrievability);
                let s_hard =
                    self.next_recall_stability(difficulty, stability, retrievability, Rating::Hard);
                let s_good =
                    self.next_recall_stability(difficulty, stability, retrievability, Rating::Good);
                let s_easy =
                    self.next_recall_stability(difficulty, stability, retrievability, Rating::Easy);

                next.difficulty = self.next_difficulty(difficulty, rating);

                match rating {
                    Rating::Again => {
                        next.lapses += 1;
                        next.stability = s_again;
                        next.scheduled_days = 0;
                        next.due = now + Duration::minutes(5);
                        next.state = CardState::Relearning;
                    }
                    Rating::Hard | Rating::Good | Rating::Easy => {
                        // Force the deterministic ordering hard <= good < easy.
                        let mut hard_interval = self.next_interval(s_hard);
                        let mut good_interval = self.next_interval(s_good);
                        hard_interval = hard_interval.min(good_interval);
                        good_interval = good_interval.max(hard_interval + 1);
                        let easy_interval = self.next_interval(s_easy).max(good_interval + 1);

                        let (new_stability, interval) = match rating {
                            Rating::Hard => (s_hard, hard_interval),
                            Rating::Good => (s_good, good_interval),
                            Rating::Easy => (s_easy, easy_interval),
                            Rating::Again => unreachable!(),
                        };
                        next.stability = new_stability;
                        next.scheduled_days = interval;
                        next.due = now + Duration::days(interval);
                        next.state = CardState::Review;
                    }
                }
            }
        }

        let review_log = ReviewLog {
            rating,
            state: previous_state,
            elapsed_days: next.elapsed_days,
            scheduled_days: next.scheduled_days,
            reviewed_at: now,
        };

        SchedulingInfo { card: next, review_log }
    }

    /// Preview all four rating outcomes without committing any of them.
    pub fn all_options(&self, card: &FsrsCard, now: DateTime<Utc>) -> SchedulingOptions {
        SchedulingOptions {
            again: self.next(card, Rating::Again, now),
            hard: self.next(card, Rating::Hard, now),
            good: self.next(card, Rating::Good, now),
            easy: self.next(card, Rating::Easy, now),
        }
    }

    /// True iff the card is due at `now`.
    pub fn is_due(&self, card: &FsrsCard, now: DateTime<Utc>) -> bool {
        now >= card.due
    }

    /// Current recall probability in [0, 1].
    pub fn retrievability(&self, card: &FsrsCard, now: DateTime<Utc>) -> f32 {
        let last_review = match card.last_review {
            Some(last) => last,
            // Never reviewed: nothing has decayed yet.
            None => return 1.0,
        };

        let days_elapsed = (now - last_review).num_seconds() as f32 / 86_400.0;
        if days_elapsed <= 0.0 {
            return 1.0;
        }
        if card.stability <= 0.001 {
            return 0.0;
        }

        let state = fsrs::MemoryState {
            stability: card.stability,
            difficulty: card.difficulty,
        };
        fsrs::current_retrievability(state, days_elapsed, self.params.decay)
    }

    /// Days until the card is due; zero when due or overdue.
    pub fn days_until_due(&self, card: &FsrsCard, now: DateTime<Utc>) -> i64 {
        if self.is_due(card, now) {
            return 0;
        }
        (card.due - now).num_hours() / 24
    }

    fn init_stability(&self, rating: Rating) -> f32 {
        let w = &self.params.weights;
        w[rating.value() as usize - 1].max(0.1)
    }

    fn init_difficulty(&self, rating: Rating) -> f32 {
        let w = &self.params.weights;
        let grade = rating.value() as f32;
        (w[4] - (w[5] * (grade - 1.0)).exp() + 1.0).clamp(1.0, 10.0)
    }

    fn next_difficulty(&self, difficulty: f32, rating: Rating) -> f32 {
        let w = &self.params.weights;
        let grade = rating.value() as f32;
        // Linear damping toward the upper bound, then mean reversion to the
        // initial Easy difficulty.
        let delta = -w[6] * (grade - 3.0);
        let damped = difficulty + delta * (10.0 - difficulty) / 9.0;
        let reverted = w[7] * self.init_difficulty(Rating::Easy) + (1.0 - w[7]) * damped;
        reverted.clamp(1.0, 10.0)
    }

    fn next_recall_stability(
        &self,
        difficulty: f32,
        stability: f32,
        retrievability: f32,
        rating: Rating,
    ) -> f32 {
        let w = &self.params.weights;
        let hard_penalty = if rating == Rating::Hard { w[15] } else { 1.0 };
        let easy_bonus = if rating == Rating::Easy { w[16] } else { 1.0 };
        stability
            * (1.0
                + w[8].exp()
                    * (11.0 - difficulty)
                    * stability.powf(-w[9])
                    * ((w[10] * (1.0 - retrievability)).exp() - 1.0)
                    * hard_penalty
                    * easy_bonus)
    }

    fn next_forget_stability(&self, difficulty: f32, stability: f32, retrievability: f32) -> f32 {
        let w = &self.params.weights;
        let forgotten = w[11]
            * difficulty.powf(-w[12])
            * ((stability + 1.0).powf(w[13]) - 1.0)
            * (w[14] * (1.0 - retrievability)).exp();
        // A lapse never leaves the card more stable than it was.
        forgotten.min(stability).max(0.1)
    }

    /// Interval (whole days, >= 1) at which retrievability decays to the
    /// desired retention, clamped to the maximum interval.
    fn next_interval(&self, stability: f32) -> i64 {
        let factor = 0.9f32.powf(-1.0 / self.params.decay) - 1.0;
        let interval =
            stability / factor * (self.params.desired_retention.powf(-1.0 / self.params.decay) - 1.0);
        (interval.round() as i64).clamp(1, self.params.maximum_interval)
    }

    fn review_retrievability(&self, card: &FsrsCard, elapsed_days: i64) -> f32 {
        if card.stability <= 0.001 {
            return 0.0;
        }
        if elapsed_days <= 0 {
            return 1.0;
        }
        let state = fsrs::MemoryState {
            stability: card.stability,
            difficulty: card.difficulty,
        };
        fsrs::current_retrievability(state, elapsed_days as f32, self.params.decay)
    }
}
