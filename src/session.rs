//! Review session bookkeeping.
//!
//! A session is a point-in-time snapshot of due cards plus a cursor and
//! tally. It owns no persistence: the caller reviews the current card
//! through the store, then records the rating here to advance.

use chrono::{DateTime, Utc};

use crate::models::{Flashcard, Rating};

#[derive(Debug, Clone)]
pub struct ReviewSession {
    cards: Vec<Flashcard>,
    index: usize,
    reviewed: usize,
    correct: usize,
    started_at: DateTime<Utc>,
}

impl ReviewSession {
    /// Start a session over a due-card snapshot (e.g. `CardStore::due_cards`).
    pub fn new(cards: Vec<Flashcard>, started_at: DateTime<Utc>) -> Self {
        Self {
            cards,
            index: 0,
            reviewed: 0,
            correct: 0,
            started_at,
        }
    }

    /// The card currently up for review, if any remain.
    pub fn current(&self) -> Option<&Flashcard> {
        self.cards.get(self.index)
    }

    /// Record the rating given to the current card and advance. Returns
    /// false when the session was already complete.
    pub fn record(&mut self, rating: Rating) -> bool {
        if self.index >= self.cards.len() {
            return false;
        }
        self.reviewed += 1;
        if rating != Rating::Again {
            self.correct += 1;
        }
        self.index += 1;
        true
    }

    pub fn is_complete(&self) -> bool {
        self.index >= self.cards.len()
    }

    pub fn total(&self) -> usize {
        self.cards.len()
    }

    pub fn remaining(&self) -> usize {
        self.cards.len() - self.index
    }

    pub fn reviewed(&self) -> usize {
        self.reviewed
    }

    pub fn correct(&self) -> usize {
        self.correct
    }

    /// Fraction of reviewed cards rated anything but Again, in percent.
    /// 0 before the first rating.
    pub fn accuracy(&self) -> f64 {
        if self.reviewed == 0 {
            return 0.0;
        }
        self.correct as f64 / self.reviewed as f64 * 100.0
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}
