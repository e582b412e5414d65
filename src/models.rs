//! Data models for decks, cards, and review history.
//!
//! Cards carry their own FSRS memory state. The algorithm never mutates a
//! card in place — every review produces a new card value, and persistence
//! is a separate, explicit step in the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Recall rating for a review, Anki-style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Rating {
    Again,
    Hard,
    Good,
    Easy,
}

impl Rating {
    pub const ALL: [Rating; 4] = [Rating::Again, Rating::Hard, Rating::Good, Rating::Easy];

    /// Numeric value used by the FSRS formulas (Again=1 .. Easy=4).
    pub fn value(self) -> i64 {
        match self {
            Rating::Again => 1,
            Rating::Hard => 2,
            Rating::Good => 3,
            Rating::Easy => 4,
        }
    }

    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            1 => Some(Rating::Again),
            2 => Some(Rating::Hard),
            3 => Some(Rating::Good),
            4 => Some(Rating::Easy),
            _ => None,
        }
    }
}

/// Position of a card in the learning state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CardState {
    /// Never reviewed
    New,
    /// In timed sub-day learning steps
    Learning,
    /// Regular spaced review
    Review,
    /// Lapsed from review, re-learning
    Relearning,
}

impl Default for CardState {
    fn default() -> Self {
        Self::New
    }
}

impl CardState {
    /// Stable ordinal used by the storage layer.
    pub fn ordinal(self) -> i64 {
        match self {
            CardState::New => 0,
            CardState::Learning => 1,
            CardState::Review => 2,
            CardState::Relearning => 3,
        }
    }

    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(CardState::New),
            1 => Some(CardState::Learning),
            2 => Some(CardState::Review),
            3 => Some(CardState::Relearning),
            _ => None,
        }
    }
}

/// A flashcard with its FSRS memory state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flashcard {
    pub id: Uuid,
    pub deck_id: Uuid,
    pub front: String,
    pub back: String,
    pub subject: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub state: CardState,
    /// Memory stability in days. 0 until the first review; floored at 0.1
    /// by the algorithm afterwards.
    #[serde(default)]
    pub stability: f64,
    /// Difficulty in [1, 10]. 0 until the first review.
    #[serde(default)]
    pub difficulty: f64,
    /// Days since the previous review, as of the last review.
    #[serde(default)]
    pub elapsed_days: f64,
    /// The interval just assigned, in days. 0 for sub-day learning steps.
    #[serde(default)]
    pub scheduled_days: i64,
    #[serde(default)]
    pub reps: i64,
    #[serde(default)]
    pub lapses: i64,
    pub due: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_review: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Flashcard {
    pub fn new(deck_id: Uuid, front: String, back: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            deck_id,
            front,
            back,
            subject: String::new(),
            owner: None,
            tags: Vec::new(),
            state: CardState::New,
            stability: 0.0,
            difficulty: 0.0,
            elapsed_days: 0.0,
            scheduled_days: 0,
            reps: 0,
            lapses: 0,
            due: now,
            last_review: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.due <= now
    }
}

/// A named grouping of cards. Decks own cards by foreign key, not by
/// embedding, and carry no FSRS state of their own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlashcardDeck {
    pub id: Uuid,
    pub name: String,
    pub subject: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_reviewed: Option<DateTime<Utc>>,
}

impl FlashcardDeck {
    pub fn new(name: String, subject: String, owner: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name,
            subject,
            owner,
            created_at: now,
            updated_at: now,
            last_reviewed: None,
        }
    }
}

/// Append-only audit record of one rating event.
///
/// Captures the card's pre-review memory state plus the due date of the
/// branch that was chosen. Never mutated once written; the scheduler
/// itself does not read logs back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewLog {
    pub id: Uuid,
    pub card_id: Uuid,
    pub rating: Rating,
    /// State before the review.
    pub state: CardState,
    /// Due date assigned by the review.
    pub due: DateTime<Utc>,
    /// Stability before the review.
    pub stability: f64,
    /// Difficulty before the review.
    pub difficulty: f64,
    /// Days elapsed since the previous review, at review time.
    pub elapsed_days: f64,
    /// Interval that had been scheduled before the review.
    pub scheduled_days: i64,
    pub reviewed_at: DateTime<Utc>,
    /// Client-supplied review duration in milliseconds.
    pub duration_ms: i64,
}

/// One fully-computed candidate card per rating, all sharing the same
/// `elapsed_days` and `last_review`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulingPreview {
    pub again: Flashcard,
    pub hard: Flashcard,
    pub good: Flashcard,
    pub easy: Flashcard,
}

impl SchedulingPreview {
    /// The candidate for a given rating.
    pub fn get(&self, rating: Rating) -> &Flashcard {
        match rating {
            Rating::Again => &self.again,
            Rating::Hard => &self.hard,
            Rating::Good => &self.good,
            Rating::Easy => &self.easy,
        }
    }

    /// Consume the preview, keeping one branch.
    pub fn take(self, rating: Rating) -> Flashcard {
        match rating {
            Rating::Again => self.again,
            Rating::Hard => self.hard,
            Rating::Good => self.good,
            Rating::Easy => self.easy,
        }
    }
}

/// Aggregate statistics for a deck (or the whole store).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewStats {
    pub total_cards: usize,
    pub new_cards: usize,
    pub learning_cards: usize,
    pub review_cards: usize,
    pub due_cards: usize,
    pub avg_stability: f64,
    pub avg_difficulty: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_study: Option<DateTime<Utc>>,
}
