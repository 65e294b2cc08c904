use std::sync::Arc;

use tempfile::TempDir;
use uuid::Uuid;

use forum_db::{Database, queries};

use crate::config::Config;
use crate::state::{AppState, AppStateInner};

/// Open a fresh database in a temporary directory. Keep the `TempDir`
/// alive for as long as the database is used.
pub fn setup_db() -> (Arc<Database>, TempDir) {
    let dir = TempDir::new().unwrap();
    let db = Database::open(&dir.path().join("forum.db")).unwrap();
    (Arc::new(db), dir)
}

pub fn test_state() -> (AppState, TempDir) {
    let (db, dir) = setup_db();
    (Arc::new(AppStateInner::new(db, Config::default())), dir)
}

/// Insert a user directly. The password hash is a placeholder, so this user
/// cannot log in.
pub fn seed_user(db: &Database, username: &str) -> Uuid {
    let id = Uuid::new_v4();
    db.with_conn_mut(|conn| {
        queries::insert_user(
            conn,
            &id.to_string(),
            &format!("{}@example.com", username),
            username,
            "not-a-real-hash",
        )
    })
    .unwrap();
    id
}

pub fn seed_post(db: &Database, author: Uuid) -> Uuid {
    let id = Uuid::new_v4();
    db.with_conn_mut(|conn| {
        queries::create_post(conn, &id.to_string(), &author.to_string(), "Hello", "First post")
    })
    .unwrap();
    id
}

pub fn seed_comment(db: &Database, post: Uuid, author: Uuid) -> Uuid {
    let id = Uuid::new_v4();
    db.with_conn_mut(|conn| {
        queries::create_comment(conn, &id.to_string(), &post.to_string(), &author.to_string(), "Nice")
    })
    .unwrap();
    id
}
