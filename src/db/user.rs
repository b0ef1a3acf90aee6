//! User accounts for authentication

use super::PgRepository;
use crate::auth::model::User;

impl PgRepository {
    /// Get user by username
    pub async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            "SELECT id, username, password_hash, full_name, role, created_at \
             FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
    }
}
