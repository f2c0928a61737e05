use async_trait::async_trait;

use super::PostgresStore;
use crate::{
    database::{StoreError, StoreResult, ports::UserRepository},
    users::{NewUser, Role, User},
};

const USER_COLUMNS: &str = "id, username, full_name, email, password AS password_hash, created_at";

#[async_trait]
impl UserRepository for PostgresStore {
    async fn create_user(&self, user: &NewUser) -> StoreResult<User> {
        let query = format!(
            r#"
            INSERT INTO users (username, full_name, email, password)
            VALUES ($1, $2, $3, $4)
            RETURNING {USER_COLUMNS}
            "#
        );

        let row = sqlx::query_as::<_, User>(&query)
            .bind(&user.username)
            .bind(&user.full_name)
            .bind(&user.email)
            .bind(&user.password_hash)
            .fetch_one(self.pool())
            .await?;

        Ok(row)
    }

    async fn get_user(&self, id: i64) -> StoreResult<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        Ok(sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(self.pool())
            .await?)
    }

    async fn get_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1 LIMIT 1");
        Ok(sqlx::query_as::<_, User>(&query)
            .bind(username)
            .fetch_optional(self.pool())
            .await?)
    }

    async fn get_user_role(&self, user_id: i64) -> StoreResult<Option<String>> {
        let name = sqlx::query_scalar::<_, String>(
            r#"
            SELECT r.name
            FROM role_user ru
            JOIN roles r ON r.id = ru.role_id
            WHERE ru.user_id = $1
            ORDER BY r.id
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(self.pool())
        .await?;

        Ok(name)
    }

    async fn assign_role(&self, user_id: i64, role_name: &str) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO role_user (user_id, role_id)
            SELECT u.id, r.id
            FROM users u, roles r
            WHERE u.id = $1 AND r.name = $2
            ON CONFLICT (user_id, role_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(role_name)
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            let exists = sqlx::query_scalar::<_, bool>(
                r#"
                SELECT EXISTS (
                    SELECT 1 FROM role_user ru JOIN roles r ON r.id = ru.role_id
                    WHERE ru.user_id = $1 AND r.name = $2
                )
                "#,
            )
            .bind(user_id)
            .bind(role_name)
            .fetch_one(self.pool())
            .await?;

            if !exists {
                return Err(StoreError::NotFound);
            }
        }
        Ok(())
    }

    async fn list_roles(&self) -> StoreResult<Vec<Role>> {
        Ok(
            sqlx::query_as::<_, Role>("SELECT id, name FROM roles ORDER BY id")
                .fetch_all(self.pool())
                .await?,
        )
    }
}
