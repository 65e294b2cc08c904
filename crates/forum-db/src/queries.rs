//! The store contract. Every query is a free function over `&Connection` so
//! it can run inside a caller-owned transaction (a `Transaction` derefs to
//! `Connection`); the `Database` methods at the top are the read-side
//! conveniences that pick a reader connection themselves.

use crate::Database;
use crate::models::{CredentialRow, SessionRow, UserRow};
use anyhow::{Result, anyhow};
use forum_types::models::{Polarity, ReactionCounts, SubjectKind};
use rusqlite::{Connection, OptionalExtension, params};

impl Database {
    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_id(conn, id))
    }

    pub fn find_credential_by_login(&self, login: &str) -> Result<Option<CredentialRow>> {
        self.with_conn(|conn| find_credential_by_login(conn, login))
    }

    pub fn count_reactions(&self, kind: SubjectKind, subject_id: &str) -> Result<ReactionCounts> {
        self.with_conn(|conn| count_reactions(conn, kind, subject_id))
    }

    pub fn count_sessions_for_user(&self, user_id: &str) -> Result<u64> {
        self.with_conn(|conn| count_sessions_for_user(conn, user_id))
    }
}

// -- Users --

pub fn insert_user(
    conn: &Connection,
    id: &str,
    email: &str,
    username: &str,
    password_hash: &str,
) -> Result<()> {
    conn.execute(
        "INSERT INTO users (id, email, username, password) VALUES (?1, ?2, ?3, ?4)",
        (id, email, username, password_hash),
    )?;
    Ok(())
}

pub fn email_taken(conn: &Connection, email: &str) -> Result<bool> {
    let taken = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM users WHERE email = ?1)",
        [email],
        |row| row.get(0),
    )?;
    Ok(taken)
}

/// Usernames compare case-insensitively (the column is `COLLATE NOCASE`).
pub fn username_taken(conn: &Connection, username: &str) -> Result<bool> {
    let taken = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM users WHERE username = ?1)",
        [username],
        |row| row.get(0),
    )?;
    Ok(taken)
}

fn query_user_by_id(conn: &Connection, id: &str) -> Result<Option<UserRow>> {
    let row = conn
        .query_row(
            "SELECT id, username FROM users WHERE id = ?1",
            [id],
            |row| {
                Ok(UserRow {
                    id: row.get(0)?,
                    username: row.get(1)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

/// `login` may be an email or a username.
pub fn find_credential_by_login(conn: &Connection, login: &str) -> Result<Option<CredentialRow>> {
    let row = conn
        .query_row(
            "SELECT id, password FROM users WHERE email = ?1 OR username = ?1 LIMIT 1",
            [login],
            |row| {
                Ok(CredentialRow {
                    user_id: row.get(0)?,
                    password_hash: row.get(1)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

// -- Sessions --

pub fn insert_session(
    conn: &Connection,
    token_hash: &str,
    user_id: &str,
    expires_at: i64,
) -> Result<()> {
    conn.execute(
        "INSERT INTO sessions (token_hash, user_id, expires_at) VALUES (?1, ?2, ?3)",
        params![token_hash, user_id, expires_at],
    )?;
    Ok(())
}

pub fn find_session(conn: &Connection, token_hash: &str) -> Result<Option<SessionRow>> {
    let row = conn
        .query_row(
            "SELECT user_id, expires_at FROM sessions WHERE token_hash = ?1",
            [token_hash],
            |row| {
                Ok(SessionRow {
                    user_id: row.get(0)?,
                    expires_at: row.get(1)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

pub fn delete_sessions_for_user(conn: &Connection, user_id: &str) -> Result<usize> {
    Ok(conn.execute("DELETE FROM sessions WHERE user_id = ?1", [user_id])?)
}

pub fn delete_session_by_token(conn: &Connection, token_hash: &str) -> Result<usize> {
    Ok(conn.execute("DELETE FROM sessions WHERE token_hash = ?1", [token_hash])?)
}

/// Remove every session whose expiry (ms since epoch) is before `now`.
pub fn delete_expired_sessions(conn: &Connection, now: i64) -> Result<usize> {
    Ok(conn.execute("DELETE FROM sessions WHERE expires_at < ?1", [now])?)
}

pub fn count_sessions_for_user(conn: &Connection, user_id: &str) -> Result<u64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sessions WHERE user_id = ?1",
        [user_id],
        |row| row.get(0),
    )?;
    Ok(count as u64)
}

// -- Posts / comments --
// Content CRUD belongs to the surrounding forum; these inserts exist so
// reactions have something to point at.

pub fn create_post(
    conn: &Connection,
    id: &str,
    author_id: &str,
    title: &str,
    content: &str,
) -> Result<()> {
    conn.execute(
        "INSERT INTO posts (id, author_id, title, content) VALUES (?1, ?2, ?3, ?4)",
        (id, author_id, title, content),
    )?;
    Ok(())
}

pub fn create_comment(
    conn: &Connection,
    id: &str,
    post_id: &str,
    author_id: &str,
    content: &str,
) -> Result<()> {
    conn.execute(
        "INSERT INTO comments (id, post_id, author_id, content) VALUES (?1, ?2, ?3, ?4)",
        (id, post_id, author_id, content),
    )?;
    Ok(())
}

pub fn subject_exists(conn: &Connection, kind: SubjectKind, subject_id: &str) -> Result<bool> {
    let sql = match kind {
        SubjectKind::Post => "SELECT EXISTS(SELECT 1 FROM posts WHERE id = ?1)",
        SubjectKind::Comment => "SELECT EXISTS(SELECT 1 FROM comments WHERE id = ?1)",
    };
    let exists = conn.query_row(sql, [subject_id], |row| row.get(0))?;
    Ok(exists)
}

// -- Reactions --

/// Table and subject column holding reactions for `kind`.
fn reaction_table(kind: SubjectKind) -> (&'static str, &'static str) {
    match kind {
        SubjectKind::Post => ("post_reactions", "post_id"),
        SubjectKind::Comment => ("comment_reactions", "comment_id"),
    }
}

pub fn find_reaction(
    conn: &Connection,
    kind: SubjectKind,
    subject_id: &str,
    user_id: &str,
) -> Result<Option<Polarity>> {
    let (table, column) = reaction_table(kind);
    let sql = format!("SELECT polarity FROM {table} WHERE {column} = ?1 AND user_id = ?2");

    let raw: Option<String> = conn
        .query_row(&sql, [subject_id, user_id], |row| row.get(0))
        .optional()?;

    raw.map(|p| {
        p.parse::<Polarity>()
            .map_err(|e| anyhow!("Corrupt reaction row in {}: {}", table, e))
    })
    .transpose()
}

pub fn insert_reaction(
    conn: &Connection,
    kind: SubjectKind,
    subject_id: &str,
    user_id: &str,
    polarity: Polarity,
) -> Result<()> {
    let (table, column) = reaction_table(kind);
    let sql = format!("INSERT INTO {table} ({column}, user_id, polarity) VALUES (?1, ?2, ?3)");
    conn.execute(&sql, [subject_id, user_id, polarity.as_str()])?;
    Ok(())
}

pub fn update_reaction_polarity(
    conn: &Connection,
    kind: SubjectKind,
    subject_id: &str,
    user_id: &str,
    polarity: Polarity,
) -> Result<usize> {
    let (table, column) = reaction_table(kind);
    let sql = format!("UPDATE {table} SET polarity = ?3 WHERE {column} = ?1 AND user_id = ?2");
    Ok(conn.execute(&sql, [subject_id, user_id, polarity.as_str()])?)
}

pub fn delete_reaction(
    conn: &Connection,
    kind: SubjectKind,
    subject_id: &str,
    user_id: &str,
) -> Result<usize> {
    let (table, column) = reaction_table(kind);
    let sql = format!("DELETE FROM {table} WHERE {column} = ?1 AND user_id = ?2");
    Ok(conn.execute(&sql, [subject_id, user_id])?)
}

pub fn count_reactions(
    conn: &Connection,
    kind: SubjectKind,
    subject_id: &str,
) -> Result<ReactionCounts> {
    let (table, column) = reaction_table(kind);
    let sql = format!(
        "SELECT
            COALESCE(SUM(CASE WHEN polarity = 'like' THEN 1 ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN polarity = 'dislike' THEN 1 ELSE 0 END), 0)
         FROM {table} WHERE {column} = ?1"
    );

    let (likes, dislikes): (i64, i64) =
        conn.query_row(&sql, [subject_id], |row| Ok((row.get(0)?, row.get(1)?)))?;

    Ok(ReactionCounts {
        likes: likes as u64,
        dislikes: dislikes as u64,
    })
}

/// Rows a user holds on a subject. The unique index keeps this at 0 or 1.
pub fn count_user_reactions(
    conn: &Connection,
    kind: SubjectKind,
    subject_id: &str,
    user_id: &str,
) -> Result<u64> {
    let (table, column) = reaction_table(kind);
    let sql = format!("SELECT COUNT(*) FROM {table} WHERE {column} = ?1 AND user_id = ?2");
    let count: i64 = conn.query_row(&sql, [subject_id, user_id], |row| row.get(0))?;
    Ok(count as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::setup_db;
    use uuid::Uuid;

    fn seed_user(db: &Database, username: &str) -> String {
        let id = Uuid::new_v4().to_string();
        db.with_conn_mut(|conn| {
            insert_user(conn, &id, &format!("{username}@example.com"), username, "hash")
        })
        .unwrap();
        id
    }

    #[test]
    fn credential_lookup_by_email_or_username() {
        let (db, _dir) = setup_db();
        let id = seed_user(&db, "Alice");

        let by_email = db.find_credential_by_login("Alice@example.com").unwrap().unwrap();
        assert_eq!(by_email.user_id, id);

        let by_name = db.find_credential_by_login("alice").unwrap().unwrap();
        assert_eq!(by_name.user_id, id);
        assert_eq!(by_name.password_hash, "hash");

        assert!(db.find_credential_by_login("bob").unwrap().is_none());
    }

    #[test]
    fn username_taken_ignores_case() {
        let (db, _dir) = setup_db();
        seed_user(&db, "Alice");
        db.with_conn(|conn| {
            assert!(username_taken(conn, "ALICE")?);
            assert!(!username_taken(conn, "bob")?);
            assert!(email_taken(conn, "Alice@example.com")?);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn expired_sessions_are_bulk_deleted() {
        let (db, _dir) = setup_db();
        let a = seed_user(&db, "alice");
        let b = seed_user(&db, "bob");

        db.with_conn_mut(|conn| {
            insert_session(conn, "old", &a, 1_000)?;
            insert_session(conn, "fresh", &b, 10_000)?;
            assert_eq!(delete_expired_sessions(conn, 5_000)?, 1);
            assert!(find_session(conn, "old")?.is_none());
            assert_eq!(find_session(conn, "fresh")?.unwrap().expires_at, 10_000);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn second_session_row_for_user_is_rejected() {
        let (db, _dir) = setup_db();
        let a = seed_user(&db, "alice");

        db.with_conn_mut(|conn| insert_session(conn, "one", &a, 10))
            .unwrap();
        let dup = db.with_conn_mut(|conn| insert_session(conn, "two", &a, 10));
        assert!(dup.is_err());
        assert_eq!(db.count_sessions_for_user(&a).unwrap(), 1);
    }

    #[test]
    fn rolled_back_transaction_leaves_no_trace() {
        let (db, _dir) = setup_db();
        let a = seed_user(&db, "alice");

        let result: Result<()> = db.transaction(|tx| {
            insert_session(tx, "tok", &a, 10)?;
            Err(anyhow!("abort"))
        });
        assert!(result.is_err());
        assert_eq!(db.count_sessions_for_user(&a).unwrap(), 0);
    }

    #[test]
    fn reaction_rows_and_counts() {
        let (db, _dir) = setup_db();
        let author = seed_user(&db, "author");
        let reader = seed_user(&db, "reader");
        let post = Uuid::new_v4().to_string();

        db.transaction(|tx| {
            create_post(tx, &post, &author, "t", "c")?;
            insert_reaction(tx, SubjectKind::Post, &post, &author, Polarity::Like)?;
            insert_reaction(tx, SubjectKind::Post, &post, &reader, Polarity::Dislike)?;
            Ok(())
        })
        .unwrap();

        let counts = db.count_reactions(SubjectKind::Post, &post).unwrap();
        assert_eq!(counts, ReactionCounts { likes: 1, dislikes: 1 });

        db.transaction(|tx| {
            assert_eq!(
                find_reaction(tx, SubjectKind::Post, &post, &reader)?,
                Some(Polarity::Dislike)
            );
            update_reaction_polarity(tx, SubjectKind::Post, &post, &reader, Polarity::Like)?;
            assert_eq!(delete_reaction(tx, SubjectKind::Post, &post, &author)?, 1);
            Ok(())
        })
        .unwrap();

        let counts = db.count_reactions(SubjectKind::Post, &post).unwrap();
        assert_eq!(counts, ReactionCounts { likes: 1, dislikes: 0 });
    }

    #[test]
    fn reaction_on_missing_subject_violates_foreign_key() {
        let (db, _dir) = setup_db();
        let user = seed_user(&db, "alice");
        let ghost = Uuid::new_v4().to_string();

        db.with_conn(|conn| {
            assert!(!subject_exists(conn, SubjectKind::Comment, &ghost)?);
            Ok(())
        })
        .unwrap();

        let err = db
            .transaction(|tx| insert_reaction(tx, SubjectKind::Comment, &ghost, &user, Polarity::Like))
            .unwrap_err();
        assert!(crate::is_foreign_key_violation(&err));
    }
}
