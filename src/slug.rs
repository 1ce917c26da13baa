//! URL slugs for posts.
//!
//! Candidates are tried in a fixed order: `base`, `base-0`, `base-1`, ...
//! The scan starts over on every call, so a slug freed by a deleted post
//! is handed out again.

use std::collections::HashSet;

use rusqlite::{params, Connection};

/// Used when nothing alphanumeric survives transliteration.
pub const FALLBACK_SLUG: &str = "post";

/// Transliterate to ASCII, then keep lowercase alphanumerics; every other
/// run of characters collapses into one `-`, with none at either end.
pub fn slugify(title: &str) -> String {
    let ascii = deunicode::deunicode(title);
    let mut slug = String::with_capacity(ascii.len());
    let mut pending_separator = false;

    for c in ascii.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_separator && !slug.is_empty() {
                slug.push('-');
            }
            pending_separator = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_separator = true;
        }
    }

    if slug.is_empty() {
        FALLBACK_SLUG.to_string()
    } else {
        slug
    }
}

/// First free candidate for `title`, given the slugs currently stored.
///
/// This is a read; two callers can get the same answer. The insert that
/// follows must treat a unique violation on `slug` as "try again".
pub fn generate_unique_slug(conn: &Connection, title: &str) -> rusqlite::Result<String> {
    let base = slugify(title);

    // base contains only [a-z0-9-], so it is safe inside a LIKE pattern.
    let mut stmt = conn.prepare("SELECT slug FROM posts WHERE slug = ?1 OR slug LIKE ?1 || '-%'")?;
    let taken: HashSet<String> = stmt
        .query_map(params![base], |row| row.get(0))?
        .collect::<Result<_, _>>()?;

    Ok(first_free(&base, &taken))
}

fn first_free(base: &str, taken: &HashSet<String>) -> String {
    if !taken.contains(base) {
        return base.to_string();
    }
    let mut n: u64 = 0;
    loop {
        let candidate = format!("{}-{}", base, n);
        if !taken.contains(&candidate) {
            return candidate;
        }
        n += 1;
    }
}
