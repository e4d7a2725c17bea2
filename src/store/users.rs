use uuid::Uuid;

use crate::{AppResult, now_ts};

use super::Store;
use super::models::User;

impl Store {
    pub async fn get_or_create_user(&self, username: &str) -> AppResult<User> {
        sqlx::query("INSERT INTO users (id,username,created_at) VALUES (?,?,?) ON CONFLICT(username) DO NOTHING")
            .bind(Uuid::now_v7().to_string())
            .bind(username)
            .bind(now_ts())
            .execute(&self.pool)
            .await?;
        let (id, created_at): (String, i64) =
            sqlx::query_as("SELECT id,created_at FROM users WHERE username=?")
                .bind(username)
                .fetch_one(&self.pool)
                .await?;
        Ok(User {
            id: Uuid::parse_str(&id)?,
            username: username.to_owned(),
            created_at,
        })
    }

    pub async fn user(&self, id: Uuid) -> AppResult<Option<User>> {
        let row: Option<(String, i64)> = sqlx::query_as("SELECT username,created_at FROM users WHERE id=?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(username, created_at)| User {
            id,
            username,
            created_at,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_or_create_is_stable() {
        let store = Store::connect("sqlite::memory:").await.unwrap();
        let first = store.get_or_create_user("alice").await.unwrap();
        let second = store.get_or_create_user("alice").await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(store.user(first.id).await.unwrap().unwrap().username, "alice");
    }
}
