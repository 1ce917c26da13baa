use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{attach_reactions, posts, require_text, AUTHOR_COLUMNS};
use crate::db::models::{AuthorSummary, Comment, ReactionCounts};
use crate::error::{AppError, AppResult};
use crate::pagination::{ScrollPage, ScrollRequest};

fn select_comments() -> String {
    format!(
        "SELECT c.id, c.content, c.post_id, c.author_id, c.created_at, {}
         FROM comments c JOIN users u ON u.id = c.author_id",
        AUTHOR_COLUMNS
    )
}

fn map_comment(row: &Row<'_>) -> rusqlite::Result<Comment> {
    let author_id: i64 = row.get(3)?;
    Ok(Comment {
        id: row.get(0)?,
        content: row.get(1)?,
        post_id: row.get(2)?,
        author_id,
        created_at: row.get(4)?,
        author: AuthorSummary {
            id: author_id,
            nickname: row.get(5)?,
            avatar: row.get(6)?,
        },
        reactions: Vec::new(),
        counts: ReactionCounts::default(),
    })
}

pub fn list_comments(
    conn: &Connection,
    post_slug: &str,
    request: ScrollRequest,
) -> AppResult<ScrollPage<Comment>> {
    let post_id = posts::post_id_by_slug(conn, post_slug)?;

    let mut stmt = conn.prepare(&format!(
        "{} WHERE c.post_id = ?1 ORDER BY c.created_at DESC, c.id DESC LIMIT ?2 OFFSET ?3",
        select_comments()
    ))?;
    let rows = stmt
        .query_map(
            params![post_id, request.probe_limit(), request.offset()],
            map_comment,
        )?
        .collect::<Result<Vec<_>, _>>()?;

    let mut page = ScrollPage::from_probe(rows, request);
    attach_reactions(conn, &mut page.items)?;
    Ok(page)
}

pub fn find_comment(conn: &Connection, id: i64) -> AppResult<Option<Comment>> {
    let comment = conn
        .query_row(
            &format!("{} WHERE c.id = ?1", select_comments()),
            params![id],
            map_comment,
        )
        .optional()?;
    Ok(comment)
}

pub(crate) fn ensure_comment_exists(conn: &Connection, id: i64) -> AppResult<()> {
    let exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM comments WHERE id = ?1",
        params![id],
        |row| row.get(0),
    )?;
    if !exists {
        return Err(AppError::not_found("Comment not found"));
    }
    Ok(())
}

pub fn create_comment(
    conn: &Connection,
    post_slug: &str,
    author_id: i64,
    content: &str,
) -> AppResult<Comment> {
    let post_id = posts::post_id_by_slug(conn, post_slug)?;
    let content = require_text(content, "Comment")?;

    conn.execute(
        "INSERT INTO comments (content, post_id, author_id) VALUES (?1, ?2, ?3)",
        params![content, post_id, author_id],
    )?;
    let id = conn.last_insert_rowid();
    tracing::debug!(comment_id = id, post_id, author_id, "Comment created");

    find_comment(conn, id)?.ok_or_else(|| AppError::not_found("Comment not found"))
}
