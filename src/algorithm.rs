//! FSRS scheduling algorithm.
//!
//! Pure functions over card state and parameters: no I/O, deterministic
//! except for the optional interval fuzz, which draws from a caller-supplied
//! RNG so tests can seed or disable it.
//!
//! State machine (timed learning-step variant):
//! - New → Again/Hard/Good enter Learning with 1/5/10 minute steps;
//!   Easy graduates straight to Review.
//! - Learning/Relearning → Again/Hard repeat a short step; Good graduates;
//!   Easy graduates with a bonus interval of at least good + 1.
//! - Review → Again lapses into Relearning; Hard/Good/Easy stay in Review.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;

use crate::models::{CardState, Flashcard, Rating, ReviewLog, SchedulingPreview};
use crate::params::{FsrsParameters, DECAY, FACTOR, MIN_STABILITY};
use uuid::Uuid;

/// Sub-day learning steps out of the New state, per rating (minutes).
const NEW_STEP_AGAIN_MIN: i64 = 1;
const NEW_STEP_HARD_MIN: i64 = 5;
const NEW_STEP_GOOD_MIN: i64 = 10;

/// Sub-day steps while in Learning or Relearning (minutes).
const RELEARN_STEP_AGAIN_MIN: i64 = 5;
const RELEARN_STEP_HARD_MIN: i64 = 10;

/// Intervals shorter than this are never fuzzed (days).
const FUZZ_MIN_INTERVAL: i64 = 3;
const FUZZ_RANGE: f64 = 0.05;

/// Predicted probability of recall after `elapsed_days` at the given
/// stability. Total on all inputs: non-positive stability reads as "just
/// reviewed" and returns 1.
pub fn retrievability(elapsed_days: f64, stability: f64) -> f64 {
    if stability <= 0.0 {
        return 1.0;
    }
    (1.0 + FACTOR * elapsed_days.max(0.0) / stability).powf(DECAY)
}

/// The FSRS scheduler. Holds validated parameters; may be shared freely
/// across threads since every entry point is side-effect-free.
#[derive(Debug, Clone)]
pub struct Scheduler {
    params: FsrsParameters,
}

impl Scheduler {
    pub fn new(params: FsrsParameters) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &FsrsParameters {
        &self.params
    }

    /// Compute one candidate card per rating.
    ///
    /// Uses the thread RNG for fuzz; irrelevant when fuzz is disabled.
    pub fn schedule(&self, card: &Flashcard, now: DateTime<Utc>) -> SchedulingPreview {
        self.schedule_with_rng(card, now, &mut rand::thread_rng())
    }

    /// `schedule` with an explicit RNG, for deterministic fuzz.
    pub fn schedule_with_rng<R: Rng>(
        &self,
        card: &Flashcard,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> SchedulingPreview {
        SchedulingPreview {
            again: self.next_card(card, Rating::Again, now, rng),
            hard: self.next_card(card, Rating::Hard, now, rng),
            good: self.next_card(card, Rating::Good, now, rng),
            easy: self.next_card(card, Rating::Easy, now, rng),
        }
    }

    /// Apply a rating: returns the updated card value and the audit log
    /// entry. Nothing is persisted or mutated in place.
    pub fn review(
        &self,
        card: &Flashcard,
        rating: Rating,
        now: DateTime<Utc>,
        duration_ms: i64,
    ) -> (Flashcard, ReviewLog) {
        self.review_with_rng(card, rating, now, duration_ms, &mut rand::thread_rng())
    }

    /// `review` with an explicit RNG, for deterministic fuzz.
    pub fn review_with_rng<R: Rng>(
        &self,
        card: &Flashcard,
        rating: Rating,
        now: DateTime<Utc>,
        duration_ms: i64,
        rng: &mut R,
    ) -> (Flashcard, ReviewLog) {
        let next = self.next_card(card, rating, now, rng);
        let log = ReviewLog {
            id: Uuid::new_v4(),
            card_id: card.id,
            rating,
            state: card.state,
            due: next.due,
            stability: card.stability,
            difficulty: card.difficulty,
            elapsed_days: next.elapsed_days,
            scheduled_days: card.scheduled_days,
            reviewed_at: now,
            duration_ms,
        };
        (next, log)
    }

    /// Interval in whole days for a given stability, clamped to
    /// `[1, maximum_interval]`. No fuzz.
    pub fn next_interval(&self, stability: f64) -> i64 {
        let raw = stability / FACTOR * (self.params.request_retention().powf(1.0 / DECAY) - 1.0);
        (raw.round() as i64).clamp(1, self.params.maximum_interval())
    }

    fn next_interval_with_rng<R: Rng>(&self, stability: f64, rng: &mut R) -> i64 {
        let days = self.next_interval(stability);
        if !self.params.enable_fuzz() || days < FUZZ_MIN_INTERVAL {
            return days;
        }
        let jitter = days as f64 * FUZZ_RANGE;
        let fuzzed = rng.gen_range(days as f64 - jitter..=days as f64 + jitter);
        (fuzzed.round() as i64).clamp(1, self.params.maximum_interval())
    }

    fn next_card<R: Rng>(
        &self,
        card: &Flashcard,
        rating: Rating,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Flashcard {
        let elapsed = elapsed_days(card, now);

        let mut next = card.clone();
        next.elapsed_days = elapsed;
        next.last_review = Some(now);
        next.reps += 1;
        next.updated_at = now;

        match card.state {
            CardState::New => {
                next.difficulty = self.init_difficulty(rating);
                next.stability = self.init_stability(rating);
                match rating {
                    Rating::Again => {
                        learning_step(&mut next, CardState::Learning, now, NEW_STEP_AGAIN_MIN)
                    }
                    Rating::Hard => {
                        learning_step(&mut next, CardState::Learning, now, NEW_STEP_HARD_MIN)
                    }
                    Rating::Good => {
                        learning_step(&mut next, CardState::Learning, now, NEW_STEP_GOOD_MIN)
                    }
                    Rating::Easy => {
                        let days = self.next_interval_with_rng(next.stability, rng);
                        graduate(&mut next, now, days);
                    }
                }
            }
            CardState::Learning | CardState::Relearning => {
                // A row can arrive here with unreviewed FSRS fields; clamp
                // before feeding the formulas rather than trusting storage.
                let stability = card.stability.max(MIN_STABILITY);
                let difficulty = card.difficulty.clamp(1.0, 10.0);
                let r = retrievability(elapsed, stability);
                next.difficulty = self.next_difficulty(difficulty, rating);
                match rating {
                    Rating::Again => {
                        next.stability = self.next_forget_stability(difficulty, stability, r);
                        learning_step(&mut next, card.state, now, RELEARN_STEP_AGAIN_MIN);
                    }
                    Rating::Hard => {
                        next.stability =
                            self.next_recall_stability(difficulty, stability, r, Rating::Hard);
                        learning_step(&mut next, card.state, now, RELEARN_STEP_HARD_MIN);
                    }
                    Rating::Good => {
                        next.stability =
                            self.next_recall_stability(difficulty, stability, r, Rating::Good);
                        let days = self.next_interval_with_rng(next.stability, rng);
                        graduate(&mut next, now, days);
                    }
                    Rating::Easy => {
                        let good_stability =
                            self.next_recall_stability(difficulty, stability, r, Rating::Good);
                        let good_days = self.next_interval_with_rng(good_stability, rng);
                        next.stability =
                            self.next_recall_stability(difficulty, stability, r, Rating::Easy);
                        let days = self
                            .next_interval_with_rng(next.stability, rng)
                            .max(good_days + 1)
                            .min(self.params.maximum_interval());
                        graduate(&mut next, now, days);
                    }
                }
            }
            CardState::Review => {
                let stability = card.stability.max(MIN_STABILITY);
                let difficulty = card.difficulty.clamp(1.0, 10.0);
                let r = retrievability(elapsed, stability);
                next.difficulty = self.next_difficulty(difficulty, rating);
                match rating {
                    Rating::Again => {
                        next.lapses += 1;
                        next.stability = self.next_forget_stability(difficulty, stability, r);
                        learning_step(&mut next, CardState::Relearning, now, RELEARN_STEP_AGAIN_MIN);
                    }
                    Rating::Hard | Rating::Good => {
                        next.stability =
                            self.next_recall_stability(difficulty, stability, r, rating);
                        let days = self.next_interval_with_rng(next.stability, rng);
                        next.scheduled_days = days;
                        next.due = now + Duration::days(days);
                    }
                    Rating::Easy => {
                        let good_stability =
                            self.next_recall_stability(difficulty, stability, r, Rating::Good);
                        let good_days = self.next_interval_with_rng(good_stability, rng);
                        next.stability =
                            self.next_recall_stability(difficulty, stability, r, Rating::Easy);
                        let days = self
                            .next_interval_with_rng(next.stability, rng)
                            .max(good_days + 1)
                            .min(self.params.maximum_interval());
                        next.scheduled_days = days;
                        next.due = now + Duration::days(days);
                    }
                }
            }
        }

        next
    }

    // ==================== FSRS formulas ====================

    fn init_stability(&self, rating: Rating) -> f64 {
        self.params.w((rating.value() - 1) as usize).max(MIN_STABILITY)
    }

    fn init_difficulty(&self, rating: Rating) -> f64 {
        (self.params.w(4) - (rating.value() - 3) as f64 * self.params.w(5)).clamp(1.0, 10.0)
    }

    fn mean_reversion(&self, init: f64, current: f64) -> f64 {
        self.params.w(7) * init + (1.0 - self.params.w(7)) * current
    }

    fn next_difficulty(&self, difficulty: f64, rating: Rating) -> f64 {
        let shifted = difficulty - self.params.w(6) * (rating.value() - 3) as f64;
        self.mean_reversion(self.init_difficulty(Rating::Easy), shifted)
            .clamp(1.0, 10.0)
    }

    fn next_recall_stability(
        &self,
        difficulty: f64,
        stability: f64,
        r: f64,
        rating: Rating,
    ) -> f64 {
        let hard_penalty = if rating == Rating::Hard {
            self.params.w(15)
        } else {
            1.0
        };
        let easy_bonus = if rating == Rating::Easy {
            self.params.w(16)
        } else {
            1.0
        };
        let growth = self.params.w(8).exp()
            * (11.0 - difficulty)
            * stability.powf(-self.params.w(9))
            * (((1.0 - r) * self.params.w(10)).exp() - 1.0)
            * hard_penalty
            * easy_bonus;
        (stability * (1.0 + growth)).max(MIN_STABILITY)
    }

    fn next_forget_stability(&self, difficulty: f64, stability: f64, r: f64) -> f64 {
        let s = self.params.w(11)
            * difficulty.powf(-self.params.w(12))
            * ((stability + 1.0).powf(self.params.w(13)) - 1.0)
            * ((1.0 - r) * self.params.w(14)).exp();
        s.max(MIN_STABILITY)
    }
}

/// Days since the previous review, 0 for never-reviewed cards.
fn elapsed_days(card: &Flashcard, now: DateTime<Utc>) -> f64 {
    match card.last_review {
        Some(last) => ((now - last).num_seconds() as f64 / 86_400.0).max(0.0),
        None => 0.0,
    }
}

/// Keep the card in a sub-day step: interval 0, due a few minutes out.
fn learning_step(card: &mut Flashcard, state: CardState, now: DateTime<Utc>, minutes: i64) {
    card.state = state;
    card.scheduled_days = 0;
    card.due = now + Duration::minutes(minutes);
}

/// Enter (or stay in) Review with a whole-day interval.
fn graduate(card: &mut Flashcard, now: DateTime<Utc>, days: i64) {
    card.state = CardState::Review;
    card.scheduled_days = days;
    card.due = now + Duration::days(days);
}
