//! Embedded FSRS spaced repetition scheduling engine.
//!
//! Two layers, leaves first:
//! - [`algorithm`]: the pure FSRS model — difficulty, stability,
//!   retrievability, intervals, and the New → Learning → Review →
//!   Relearning state machine. No I/O; safe to call from any thread.
//! - [`storage`]: a SQLite-backed store owning decks, cards, and the
//!   append-only review log, answering "what is due now".
//!
//! Data flows one way: the caller hands the scheduler a card, a rating,
//! and the current time; the scheduler returns a new card value; the store
//! persists it and appends the audit log entry. Cards are never mutated in
//! place.
//!
//! ```no_run
//! use chrono::Utc;
//! use mnemo::{CardStore, FsrsParameters, Rating};
//!
//! # fn main() -> Result<(), mnemo::StoreError> {
//! let mut store = CardStore::open("cards.db".as_ref(), FsrsParameters::default())?;
//! let deck = store.create_deck("Chemistry".into(), "science".into(), None)?;
//! let card = store.add_card(deck.id, "H2O?".into(), "water".into(), vec![])?;
//!
//! let card = store.review_card(&card, Rating::Good, Utc::now(), 3200)?;
//! let due = store.due_cards(Some(deck.id), 20, Utc::now())?;
//! # let _ = (card, due);
//! # Ok(())
//! # }
//! ```

pub mod algorithm;
pub mod models;
pub mod params;
pub mod session;
pub mod storage;

pub use algorithm::{retrievability, Scheduler};
pub use models::{
    CardState, Flashcard, FlashcardDeck, Rating, ReviewLog, ReviewStats, SchedulingPreview,
};
pub use params::{FsrsParameters, ParameterError, DEFAULT_WEIGHTS};
pub use session::ReviewSession;
pub use storage::{CardStore, StoreError};
