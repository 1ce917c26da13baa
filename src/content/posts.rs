use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::Deserialize;

use super::{require_text, AUTHOR_COLUMNS, NOW_SQL};
use crate::db;
use crate::db::models::{AuthorSummary, Post, PostDetail};
use crate::error::{AppError, AppResult};
use crate::pagination::{OffsetPage, OffsetRequest};
use crate::reactions::{self, ReactionTarget};
use crate::slug;

/// Number of posts shown on a public profile.
pub const PROFILE_POST_LIMIT: i64 = 3;

const NEWEST_FIRST: &str = "ORDER BY p.created_at DESC, p.id DESC";

fn select_posts() -> String {
    format!(
        "SELECT p.id, p.title, p.content, p.slug, p.author_id, p.created_at, p.updated_at, {}
         FROM posts p JOIN users u ON u.id = p.author_id",
        AUTHOR_COLUMNS
    )
}

fn map_post(row: &Row<'_>) -> rusqlite::Result<Post> {
    let author_id: i64 = row.get(4)?;
    Ok(Post {
        id: row.get(0)?,
        title: row.get(1)?,
        content: row.get(2)?,
        slug: row.get(3)?,
        author_id,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
        author: AuthorSummary {
            id: author_id,
            nickname: row.get(7)?,
            avatar: row.get(8)?,
        },
    })
}

/// Partial update. Absent fields are left alone.
#[derive(Debug, Default, Deserialize)]
pub struct PostPatch {
    pub title: Option<String>,
    pub content: Option<String>,
}

/// Filters for post listings. Empty search means no filter.
#[derive(Debug, Default, Clone, Copy)]
pub struct PostFilter<'a> {
    pub author_id: Option<i64>,
    pub search: Option<&'a str>,
}

pub fn list_posts(
    conn: &Connection,
    filter: PostFilter<'_>,
    request: OffsetRequest,
) -> AppResult<OffsetPage<Post>> {
    let mut clauses = Vec::new();
    let mut args: Vec<Value> = Vec::new();

    if let Some(author_id) = filter.author_id {
        args.push(Value::Integer(author_id));
        clauses.push(format!("p.author_id = ?{}", args.len()));
    }
    if let Some(term) = filter.search.map(str::trim).filter(|t| !t.is_empty()) {
        args.push(Value::Text(term.to_string()));
        let n = args.len();
        clauses.push(format!(
            "(contains_ci(p.title, ?{n}) OR contains_ci(p.content, ?{n}))"
        ));
    }

    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    };

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM posts p{}", where_sql),
        params_from_iter(args.iter()),
        |row| row.get(0),
    )?;

    args.push(Value::Integer(request.page_size));
    args.push(Value::Integer(request.offset()));
    let sql = format!(
        "{}{} {} LIMIT ?{} OFFSET ?{}",
        select_posts(),
        where_sql,
        NEWEST_FIRST,
        args.len() - 1,
        args.len()
    );

    let mut stmt = conn.prepare(&sql)?;
    let items = stmt
        .query_map(params_from_iter(args.iter()), map_post)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(OffsetPage {
        items,
        page: request.page,
        page_size: request.page_size,
        total,
    })
}

/// Every post, newest first. Admin listing.
pub fn list_all_posts(conn: &Connection) -> AppResult<Vec<Post>> {
    let mut stmt = conn.prepare(&format!("{} {}", select_posts(), NEWEST_FIRST))?;
    let posts = stmt
        .query_map([], map_post)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(posts)
}

pub fn latest_posts_by_author(conn: &Connection, author_id: i64, limit: i64) -> AppResult<Vec<Post>> {
    let mut stmt = conn.prepare(&format!(
        "{} WHERE p.author_id = ?1 {} LIMIT ?2",
        select_posts(),
        NEWEST_FIRST
    ))?;
    let posts = stmt
        .query_map(params![author_id, limit], map_post)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(posts)
}

pub fn find_post(conn: &Connection, id: i64) -> AppResult<Option<Post>> {
    let post = conn
        .query_row(
            &format!("{} WHERE p.id = ?1", select_posts()),
            params![id],
            map_post,
        )
        .optional()?;
    Ok(post)
}

fn get_post(conn: &Connection, id: i64) -> AppResult<Post> {
    find_post(conn, id)?.ok_or_else(|| AppError::not_found("Post not found"))
}

pub fn get_post_by_slug(conn: &Connection, slug: &str) -> AppResult<PostDetail> {
    let post = conn
        .query_row(
            &format!("{} WHERE p.slug = ?1", select_posts()),
            params![slug],
            map_post,
        )
        .optional()?
        .ok_or_else(|| AppError::not_found("Post not found"))?;

    let reactions = reactions::entries(conn, ReactionTarget::Post, post.id)?;
    let counts = reactions::counts(conn, ReactionTarget::Post, post.id)?;
    Ok(PostDetail {
        post,
        reactions,
        counts,
    })
}

pub(crate) fn post_id_by_slug(conn: &Connection, slug: &str) -> AppResult<i64> {
    conn.query_row(
        "SELECT id FROM posts WHERE slug = ?1",
        params![slug],
        |row| row.get(0),
    )
    .optional()?
    .ok_or_else(|| AppError::not_found("Post not found"))
}

/// Create a post under a freshly allocated slug.
///
/// Slug allocation reads before it writes, so a concurrent writer can
/// take the same candidate first. The unique index catches that and the
/// slug is recomputed, a bounded number of times.
pub fn create_post(conn: &Connection, author_id: i64, title: &str, content: &str) -> AppResult<Post> {
    let title = require_text(title, "Title")?;
    let content = require_text(content, "Content")?;

    for attempt in 1..=db::MAX_INSERT_ATTEMPTS {
        let slug = slug::generate_unique_slug(conn, &title)?;
        let inserted = conn.execute(
            "INSERT INTO posts (title, content, slug, author_id) VALUES (?1, ?2, ?3, ?4)",
            params![title, content, slug, author_id],
        );
        match inserted {
            Ok(_) => {
                let id = conn.last_insert_rowid();
                tracing::info!(post_id = id, author_id, slug = %slug, "Post created");
                return get_post(conn, id);
            }
            Err(e) if db::is_unique_violation(&e) => {
                tracing::debug!(attempt, slug = %slug, "Slug taken concurrently, retrying");
            }
            Err(e) if db::is_foreign_key_violation(&e) => {
                return Err(AppError::not_found("User not found"));
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(AppError::Internal(format!(
        "no free slug for {:?} after {} attempts",
        title,
        db::MAX_INSERT_ATTEMPTS
    )))
}

fn owned_post_author(conn: &Connection, post_id: i64) -> AppResult<i64> {
    conn.query_row(
        "SELECT author_id FROM posts WHERE id = ?1",
        params![post_id],
        |row| row.get(0),
    )
    .optional()?
    .ok_or_else(|| AppError::not_found("Post not found"))
}

/// Edit title and/or content. The slug stays what it was at creation.
pub fn update_post(conn: &Connection, post_id: i64, author_id: i64, patch: &PostPatch) -> AppResult<Post> {
    if owned_post_author(conn, post_id)? != author_id {
        return Err(AppError::forbidden("You can only edit your own posts"));
    }

    let title = patch
        .title
        .as_deref()
        .map(|t| require_text(t, "Title"))
        .transpose()?;
    let content = patch
        .content
        .as_deref()
        .map(|c| require_text(c, "Content"))
        .transpose()?;

    conn.execute(
        &format!(
            "UPDATE posts SET title = COALESCE(?1, title), content = COALESCE(?2, content),
             updated_at = {} WHERE id = ?3",
            NOW_SQL
        ),
        params![title, content, post_id],
    )?;

    get_post(conn, post_id)
}

pub fn delete_post(conn: &Connection, post_id: i64, author_id: i64) -> AppResult<()> {
    if owned_post_author(conn, post_id)? != author_id {
        return Err(AppError::forbidden("You can only delete your own posts"));
    }
    conn.execute("DELETE FROM posts WHERE id = ?1", params![post_id])?;
    Ok(())
}

/// Delete any post regardless of its author.
pub fn admin_delete_post(conn: &Connection, post_id: i64) -> AppResult<()> {
    let deleted = conn.execute("DELETE FROM posts WHERE id = ?1", params![post_id])?;
    if deleted == 0 {
        return Err(AppError::not_found("Post not found"));
    }
    tracing::info!(post_id, "Post deleted by admin");
    Ok(())
}
