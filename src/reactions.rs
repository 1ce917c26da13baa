//! LIKE/DISLIKE reactions on posts, comments and answers.
//!
//! Each target kind has its own table with a unique (user_id, target)
//! key. Counts are never stored; they are derived from the rows on read.

use std::collections::HashMap;

use rusqlite::{params, params_from_iter, Connection};

use crate::db;
use crate::db::models::{Reaction, ReactionCounts, ReactionEntry, ReactionKind};
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactionTarget {
    Post,
    Comment,
    Answer,
}

impl ReactionTarget {
    fn table(self) -> &'static str {
        match self {
            ReactionTarget::Post => "post_reactions",
            ReactionTarget::Comment => "comment_reactions",
            ReactionTarget::Answer => "answer_reactions",
        }
    }

    fn column(self) -> &'static str {
        match self {
            ReactionTarget::Post => "post_id",
            ReactionTarget::Comment => "comment_id",
            ReactionTarget::Answer => "answer_id",
        }
    }

    fn label(self) -> &'static str {
        match self {
            ReactionTarget::Post => "Post",
            ReactionTarget::Comment => "Comment",
            ReactionTarget::Answer => "Answer",
        }
    }
}

/// Create or overwrite the caller's reaction on a target.
pub fn set_reaction(
    conn: &Connection,
    target: ReactionTarget,
    user_id: i64,
    target_id: i64,
    kind: ReactionKind,
) -> AppResult<Reaction> {
    let sql = format!(
        "INSERT INTO {table} (user_id, {col}, kind) VALUES (?1, ?2, ?3)
         ON CONFLICT(user_id, {col}) DO UPDATE SET kind = excluded.kind
         RETURNING id, user_id, {col}, kind",
        table = target.table(),
        col = target.column()
    );

    conn.query_row(&sql, params![user_id, target_id, kind], |row| {
        Ok(Reaction {
            id: row.get(0)?,
            user_id: row.get(1)?,
            target_id: row.get(2)?,
            kind: row.get(3)?,
        })
    })
    .map_err(|e| {
        // The target is the only foreign key a caller can get wrong.
        if db::is_foreign_key_violation(&e) {
            AppError::not_found(format!("{} not found", target.label()))
        } else {
            e.into()
        }
    })
}

/// Remove the caller's reaction. Other users' reactions are untouched.
pub fn clear_reaction(
    conn: &Connection,
    target: ReactionTarget,
    user_id: i64,
    target_id: i64,
) -> AppResult<()> {
    let sql = format!(
        "DELETE FROM {} WHERE user_id = ?1 AND {} = ?2",
        target.table(),
        target.column()
    );
    let deleted = conn.execute(&sql, params![user_id, target_id])?;
    if deleted == 0 {
        return Err(AppError::not_found("Reaction not found"));
    }
    Ok(())
}

/// Likes and dislikes on one target, counted from its rows.
pub fn counts(conn: &Connection, target: ReactionTarget, target_id: i64) -> AppResult<ReactionCounts> {
    let sql = format!(
        "SELECT COALESCE(SUM(kind = 'LIKE'), 0), COALESCE(SUM(kind = 'DISLIKE'), 0)
         FROM {} WHERE {} = ?1",
        target.table(),
        target.column()
    );
    let counts = conn.query_row(&sql, params![target_id], |row| {
        Ok(ReactionCounts {
            likes: row.get(0)?,
            dislikes: row.get(1)?,
        })
    })?;
    Ok(counts)
}

pub fn entries(
    conn: &Connection,
    target: ReactionTarget,
    target_id: i64,
) -> AppResult<Vec<ReactionEntry>> {
    Ok(entries_for(conn, target, &[target_id])?
        .remove(&target_id)
        .unwrap_or_default())
}

/// Reaction lists for several targets in one query, keyed by target id.
pub fn entries_for(
    conn: &Connection,
    target: ReactionTarget,
    target_ids: &[i64],
) -> AppResult<HashMap<i64, Vec<ReactionEntry>>> {
    let mut grouped: HashMap<i64, Vec<ReactionEntry>> = HashMap::new();
    if target_ids.is_empty() {
        return Ok(grouped);
    }

    let placeholders = vec!["?"; target_ids.len()].join(", ");
    let sql = format!(
        "SELECT {col}, kind, user_id FROM {table} WHERE {col} IN ({placeholders}) ORDER BY id",
        table = target.table(),
        col = target.column(),
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(target_ids.iter()), |row| {
        Ok((
            row.get::<_, i64>(0)?,
            ReactionEntry {
                kind: row.get(1)?,
                user_id: row.get(2)?,
            },
        ))
    })?;
    for row in rows {
        let (id, entry) = row?;
        grouped.entry(id).or_default().push(entry);
    }
    Ok(grouped)
}

/// Tally a reaction list.
pub fn tally(entries: &[ReactionEntry]) -> ReactionCounts {
    entries
        .iter()
        .fold(ReactionCounts::default(), |mut acc, e| {
            match e.kind {
                ReactionKind::Like => acc.likes += 1,
                ReactionKind::Dislike => acc.dislikes += 1,
            }
            acc
        })
}
