/// Database row types. These map directly to SQLite rows and are kept apart
/// from the forum-types models so the DB layer stays independent.

pub struct UserRow {
    pub id: String,
    pub username: String,
}

/// What login needs: the user id and the stored PHC password string.
pub struct CredentialRow {
    pub user_id: String,
    pub password_hash: String,
}

pub struct SessionRow {
    pub user_id: String,
    /// Milliseconds since the Unix epoch.
    pub expires_at: i64,
}
