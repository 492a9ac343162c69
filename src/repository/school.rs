//! School repository

use crate::domain::{CreateSchoolInput, School, SchoolStatus, StringUuid};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use sqlx::MySqlPool;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SchoolRepository: Send + Sync {
    async fn create(&self, input: &CreateSchoolInput) -> Result<School>;
    async fn find_by_id(&self, id: StringUuid) -> Result<Option<School>>;
    /// Subdomains are stored lowercase; lookup is case-insensitive.
    async fn find_by_subdomain(&self, subdomain: &str) -> Result<Option<School>>;
    /// Administrative status change. The gating pipeline never calls this.
    async fn update_status(&self, id: StringUuid, status: SchoolStatus) -> Result<School>;
}

pub struct SchoolRepositoryImpl {
    pool: MySqlPool,
}

impl SchoolRepositoryImpl {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SchoolRepository for SchoolRepositoryImpl {
    async fn create(&self, input: &CreateSchoolInput) -> Result<School> {
        let id = StringUuid::new_v4();
        let settings = input.settings.clone().unwrap_or_default();
        let settings_json =
            serde_json::to_string(&settings).map_err(|e| AppError::Internal(e.into()))?;

        sqlx::query(
            r#"
            INSERT INTO schools (id, name, subdomain, settings, status, created_at, updated_at)
            VALUES (?, ?, LOWER(?), ?, 'active', NOW(), NOW())
            "#,
        )
        .bind(id)
        .bind(&input.name)
        .bind(&input.subdomain)
        .bind(&settings_json)
        .execute(&self.pool)
        .await?;

        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Failed to create school")))
    }

    async fn find_by_id(&self, id: StringUuid) -> Result<Option<School>> {
        let school = sqlx::query_as::<_, School>(
            r#"
            SELECT id, name, subdomain, settings, status, created_at, updated_at
            FROM schools
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(school)
    }

    async fn find_by_subdomain(&self, subdomain: &str) -> Result<Option<School>> {
        let school = sqlx::query_as::<_, School>(
            r#"
            SELECT id, name, subdomain, settings, status, created_at, updated_at
            FROM schools
            WHERE subdomain = LOWER(?)
            "#,
        )
        .bind(subdomain)
        .fetch_optional(&self.pool)
        .await?;

        Ok(school)
    }

    async fn update_status(&self, id: StringUuid, status: SchoolStatus) -> Result<School> {
        let result = sqlx::query(
            r#"
            UPDATE schools
            SET status = ?, updated_at = NOW()
            WHERE id = ?
            "#,
        )
        .bind(status)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("School {} not found", id)));
        }

        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Failed to update school")))
    }
}
