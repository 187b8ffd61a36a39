//! Reconciliation of fetched records against stored per-item user state.
//!
//! The rule is asymmetric on purpose: a refresh owns the descriptive fields
//! (title, authors, abstract, ...) and never the user-state fields (status,
//! bookmark, note). A record the store has never seen comes in with default
//! user state.

use crate::feed::FetchedPaper;
use crate::storage::{Paper, ReadStatus};

/// Merge one incoming record with whatever is stored for the same id.
///
/// Pure and synchronous: callers do the store reads/writes around it, so no
/// suspension point can ever observe a half-merged record.
pub fn reconcile(incoming: &FetchedPaper, existing: Option<&Paper>, now: i64) -> Paper {
    let (status, bookmarked, bookmarked_at, note, created_at) = match existing {
        Some(prev) => (
            prev.status,
            prev.bookmarked,
            prev.bookmarked_at,
            prev.note.clone(),
            prev.created_at,
        ),
        None => (ReadStatus::Unread, false, None, None, now),
    };

    Paper {
        id: incoming.id.clone(),
        title: incoming.title.clone(),
        authors: incoming.authors.clone(),
        abstract_text: incoming.abstract_text.clone(),
        published: incoming.published.map(|dt| dt.timestamp()),
        primary_category: incoming.primary_category.clone(),
        categories: incoming.categories.clone(),
        url: incoming.url.clone(),
        pdf_url: incoming.pdf_url.clone(),
        status,
        bookmarked,
        bookmarked_at,
        note,
        created_at,
        updated_at: now,
    }
}
