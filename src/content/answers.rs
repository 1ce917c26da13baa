use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{attach_reactions, comments, require_text, AUTHOR_COLUMNS};
use crate::db;
use crate::db::models::{Answer, AuthorSummary, ReactionCounts};
use crate::error::{AppError, AppResult};
use crate::pagination::{ScrollPage, ScrollRequest, ANSWER_PAGE_SIZE};

fn select_answers() -> String {
    format!(
        "SELECT a.id, a.content, a.comment_id, a.author_id, a.created_at, {}
         FROM answers a JOIN users u ON u.id = a.author_id",
        AUTHOR_COLUMNS
    )
}

fn map_answer(row: &Row<'_>) -> rusqlite::Result<Answer> {
    let author_id: i64 = row.get(3)?;
    Ok(Answer {
        id: row.get(0)?,
        content: row.get(1)?,
        comment_id: row.get(2)?,
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

/// Answers to a comment, `ANSWER_PAGE_SIZE` per page.
pub fn list_answers(conn: &Connection, comment_id: i64, page: Option<i64>) -> AppResult<ScrollPage<Answer>> {
    comments::ensure_comment_exists(conn, comment_id)?;
    let request = ScrollRequest::fixed(page, ANSWER_PAGE_SIZE);

    let mut stmt = conn.prepare(&format!(
        "{} WHERE a.comment_id = ?1 ORDER BY a.created_at DESC, a.id DESC LIMIT ?2 OFFSET ?3",
        select_answers()
    ))?;
    let rows = stmt
        .query_map(
            params![comment_id, request.probe_limit(), request.offset()],
            map_answer,
        )?
        .collect::<Result<Vec<_>, _>>()?;

    let mut page = ScrollPage::from_probe(rows, request);
    attach_reactions(conn, &mut page.items)?;
    Ok(page)
}

pub fn create_answer(conn: &Connection, comment_id: i64, author_id: i64, content: &str) -> AppResult<Answer> {
    comments::ensure_comment_exists(conn, comment_id)?;
    let content = require_text(content, "Answer")?;

    conn.execute(
        "INSERT INTO answers (content, comment_id, author_id) VALUES (?1, ?2, ?3)",
        params![content, comment_id, author_id],
    )
    .map_err(|e| {
        if db::is_foreign_key_violation(&e) {
            AppError::not_found("Comment not found")
        } else {
            e.into()
        }
    })?;
    let id = conn.last_insert_rowid();
    tracing::debug!(answer_id = id, comment_id, author_id, "Answer created");

    conn.query_row(
        &format!("{} WHERE a.id = ?1", select_answers()),
        params![id],
        map_answer,
    )
    .optional()?
    .ok_or_else(|| AppError::not_found("Answer not found"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::comments::create_comment;
    use crate::content::posts::{admin_delete_post, create_post};
    use crate::db::models::ReactionKind;
    use crate::db::testing::{insert_user, test_pool};
    use crate::reactions::{set_reaction, ReactionTarget};

    fn comment_fixture(conn: &Connection) -> (i64, i64, i64) {
        let a = insert_user(conn, "a@example.com");
        let post = create_post(conn, a, "Post", "x").unwrap();
        let comment = create_comment(conn, "post", a, "question").unwrap();
        (a, post.id, comment.id)
    }

    #[test]
    fn answers_page_size_is_fixed() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        let (a, _, comment) = comment_fixture(&conn);
        for i in 0..6 {
            create_answer(&conn, comment, a, &format!("a{}", i)).unwrap();
        }

        let first = list_answers(&conn, comment, None).unwrap();
        assert_eq!(first.page_size, ANSWER_PAGE_SIZE);
        assert_eq!(first.items.len(), 4);
        assert_eq!(first.items[0].content, "a5");
        assert!(first.has_more);

        let second = list_answers(&conn, comment, Some(1)).unwrap();
        let contents: Vec<_> = second.items.iter().map(|a| a.content.as_str()).collect();
        assert_eq!(contents, ["a1", "a0"]);
        assert!(!second.has_more);
    }

    #[test]
    fn answering_a_missing_comment_is_not_found() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        let a = insert_user(&conn, "a@example.com");
        assert!(matches!(
            create_answer(&conn, 77, a, "hi").unwrap_err(),
            AppError::NotFound(_)
        ));
        assert!(matches!(
            list_answers(&conn, 77, None).unwrap_err(),
            AppError::NotFound(_)
        ));
        // The missing parent wins over the blank body, as for comments.
        assert!(matches!(
            create_answer(&conn, 77, a, "  ").unwrap_err(),
            AppError::NotFound(_)
        ));
    }

    #[test]
    fn blank_answer_is_rejected() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        let (a, _, comment) = comment_fixture(&conn);
        assert!(matches!(
            create_answer(&conn, comment, a, "").unwrap_err(),
            AppError::BadRequest(_)
        ));
    }

    #[test]
    fn answers_carry_reactions_and_vanish_with_their_post() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        let (a, post, comment) = comment_fixture(&conn);
        let answer = create_answer(&conn, comment, a, "reply").unwrap();
        assert_eq!(answer.comment_id, comment);
        set_reaction(&conn, ReactionTarget::Answer, a, answer.id, ReactionKind::Dislike).unwrap();

        let page = list_answers(&conn, comment, None).unwrap();
        assert_eq!(page.items[0].counts, ReactionCounts { likes: 0, dislikes: 1 });

        admin_delete_post(&conn, post).unwrap();
        let left: i64 = conn
            .query_row(
                "SELECT (SELECT COUNT(*) FROM answers) + (SELECT COUNT(*) FROM answer_reactions)",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(left, 0);
    }
}
