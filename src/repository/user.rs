//! User repository

use crate::domain::{CreateUserInput, StringUuid, User};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use sqlx::MySqlPool;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, input: &CreateUserInput) -> Result<User>;
    async fn find_by_id(&self, id: StringUuid) -> Result<Option<User>>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;
}

pub struct UserRepositoryImpl {
    pool: MySqlPool,
}

impl UserRepositoryImpl {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for UserRepositoryImpl {
    async fn create(&self, input: &CreateUserInput) -> Result<User> {
        let id = StringUuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO users
                (id, email, password_hash, first_name, last_name, role, school_id, status,
                 created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, 'active', NOW(), NOW())
            "#,
        )
        .bind(id)
        .bind(&input.email)
        .bind(&input.password_hash)
        .bind(&input.first_name)
        .bind(&input.last_name)
        .bind(input.role)
        .bind(input.school_id)
        .execute(&self.pool)
        .await?;

        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Failed to create user")))
    }

    async fn find_by_id(&self, id: StringUuid) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, password_hash, first_name, last_name, role, school_id, status,
                   created_at, updated_at
            FROM users
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, password_hash, first_name, last_name, role, school_id, status,
                   created_at, updated_at
            FROM users
            WHERE email = ?
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }
}
