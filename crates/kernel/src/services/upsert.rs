//! Create-or-update of a single (page, language) layout row.
//!
//! The upsert is a small state machine:
//!
//! ```text
//! TryUpdate ──rows>0──▶ Done(Updated)
//!     │ 0 rows
//!     ▼
//! CheckExists ──no row──▶ Insert ──▶ Done(Inserted)
//!     │ row found
//!     ▼
//! RetryWithCanonicalId(row.page_id) ──rows>0──▶ Done(Healed)
//!                                   └─0 rows──▶ UpsertFailed
//! ```
//!
//! A row that exists although the update matched nothing means the caller's
//! key did not compare equal to the stored id (representation mismatch), or a
//! concurrent writer inserted it in between. Either way the update is retried
//! with the id read back from the row. Constraint violations from `Insert`
//! are never caught here.

use serde_json::Value;
use tracing::debug;

use crate::error::{LayoutError, LayoutResult};
use crate::models::PageKey;
use crate::storage::PageStorage;

/// How an upsert completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// The existing row was updated on the first try.
    Updated,
    /// No row existed; a new one was inserted with version 1.
    Inserted,
    /// The first update missed; the retry with the stored page id succeeded.
    Healed,
}

impl UpsertOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Updated => "updated",
            Self::Inserted => "inserted",
            Self::Healed => "healed",
        }
    }
}

/// Upsert states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertState {
    TryUpdate,
    CheckExists,
    Insert,
    RetryWithCanonicalId(i64),
    Done(UpsertOutcome),
}

/// One upsert of `layout` into (`key`, `language`).
pub struct LayoutUpsert<'a, S: PageStorage + ?Sized> {
    storage: &'a S,
    key: &'a PageKey,
    language: &'a str,
    layout: &'a Value,
}

impl<'a, S: PageStorage + ?Sized> LayoutUpsert<'a, S> {
    pub fn new(storage: &'a S, key: &'a PageKey, language: &'a str, layout: &'a Value) -> Self {
        Self {
            storage,
            key,
            language,
            layout,
        }
    }

    /// Perform one transition.
    pub async fn step(&self, state: UpsertState) -> LayoutResult<UpsertState> {
        let next = match state {
            UpsertState::TryUpdate => {
                let rows = self
                    .storage
                    .update_layout(self.key, self.language, self.layout)
                    .await?;
                if rows > 0 {
                    UpsertState::Done(UpsertOutcome::Updated)
                } else {
                    UpsertState::CheckExists
                }
            }
            UpsertState::CheckExists => {
                match self.storage.find_layout(self.key, self.language).await? {
                    Some(existing) => UpsertState::RetryWithCanonicalId(existing.page_id),
                    None => UpsertState::Insert,
                }
            }
            UpsertState::Insert => {
                self.storage
                    .insert_layout(self.key, self.language, self.layout)
                    .await?;
                UpsertState::Done(UpsertOutcome::Inserted)
            }
            UpsertState::RetryWithCanonicalId(page_id) => {
                let rows = self
                    .storage
                    .update_layout(&PageKey::Id(page_id), self.language, self.layout)
                    .await?;
                if rows == 0 {
                    return Err(LayoutError::UpsertFailed {
                        page_id: self.key.to_string(),
                        language: self.language.to_string(),
                    });
                }
                UpsertState::Done(UpsertOutcome::Healed)
            }
            done @ UpsertState::Done(_) => done,
        };

        debug!(
            page_id = %self.key,
            language = %self.language,
            next = ?next,
            "layout upsert transition"
        );
        Ok(next)
    }

    /// Drive the state machine to completion.
    pub async fn run(&self) -> LayoutResult<UpsertOutcome> {
        let mut state = UpsertState::TryUpdate;
        loop {
            state = self.step(state).await?;
            if let UpsertState::Done(outcome) = state {
                return Ok(outcome);
            }
        }
    }
}
