//! Content store: posts, comments on posts, answers to comments.
//!
//! Every listing is newest first. Reaction lists and counts are attached
//! after the page is read, in one query per page.

pub mod answers;
pub mod comments;
pub mod posts;

use rusqlite::Connection;

use crate::db::models::{Answer, Comment, ReactionEntry};
use crate::error::{AppError, AppResult};
use crate::reactions::{self, ReactionTarget};

/// Author columns shared by every content query. Expects `users` as `u`.
pub(crate) const AUTHOR_COLUMNS: &str = "COALESCE(u.nickname, 'User-' || u.id), u.avatar";

pub(crate) const NOW_SQL: &str = "strftime('%Y-%m-%dT%H:%M:%fZ', 'now')";

/// Trim a required text field, rejecting blank input.
pub(crate) fn require_text(value: &str, field: &str) -> AppResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::bad_request(format!("{} cannot be empty", field)));
    }
    Ok(trimmed.to_string())
}

pub(crate) trait Reactable {
    const TARGET: ReactionTarget;

    fn id(&self) -> i64;
    fn set_reactions(&mut self, entries: Vec<ReactionEntry>);
}

impl Reactable for Comment {
    const TARGET: ReactionTarget = ReactionTarget::Comment;

    fn id(&self) -> i64 {
        self.id
    }

    fn set_reactions(&mut self, entries: Vec<ReactionEntry>) {
        self.counts = reactions::tally(&entries);
        self.reactions = entries;
    }
}

impl Reactable for Answer {
    const TARGET: ReactionTarget = ReactionTarget::Answer;

    fn id(&self) -> i64 {
        self.id
    }

    fn set_reactions(&mut self, entries: Vec<ReactionEntry>) {
        self.counts = reactions::tally(&entries);
        self.reactions = entries;
    }
}

pub(crate) fn attach_reactions<T: Reactable>(conn: &Connection, items: &mut [T]) -> AppResult<()> {
    let ids: Vec<i64> = items.iter().map(Reactable::id).collect();
    let mut grouped = reactions::entries_for(conn, T::TARGET, &ids)?;
    for item in items.iter_mut() {
        let entries = grouped.remove(&item.id()).unwrap_or_default();
        item.set_reactions(entries);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_text_trims_and_rejects_blank() {
        assert_eq!(require_text("  hi \n", "Title").unwrap(), "hi");
        let err = require_text(" \t ", "Title").unwrap_err();
        assert_eq!(err.to_string(), "Bad request: Title cannot be empty");
    }
}
