use async_trait::async_trait;
use sqlx::Row;
use uuid::Uuid;

use crate::app_error::{AppError, AppResult};
use crate::application::use_cases::auth::RoleRepo;
use crate::domain::entities::role::RoleName;

use super::PostgresPersistence;

#[async_trait]
impl RoleRepo for PostgresPersistence {
    async fn ensure_default_roles(&self) -> AppResult<()> {
        for (name, description) in [
            (RoleName::Admin, "Полный доступ к администрированию"),
            (RoleName::User, "Обычный пользователь"),
            (RoleName::Moderator, "Модерация пользовательского контента"),
            (RoleName::Support, "Доступ службы поддержки"),
        ] {
            sqlx::query(
                "INSERT INTO roles (id, name, description) VALUES ($1, $2, $3) \
                 ON CONFLICT (name) DO NOTHING",
            )
            .bind(Uuid::new_v4())
            .bind(name.as_str())
            .bind(description)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn id_by_name(&self, name: RoleName) -> AppResult<Uuid> {
        let row = sqlx::query("SELECT id FROM roles WHERE name = $1")
            .bind(name.as_str())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::Internal(format!("role {} is not seeded", name.as_str())))?;
        Ok(row.get("id"))
    }
}
