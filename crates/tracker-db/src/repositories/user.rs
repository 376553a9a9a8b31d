use crate::Result;
use sqlx::PgPool;

pub struct UserRepository;

impl UserRepository {
    /// Insert the user if absent and return its id either way
    pub async fn upsert(pool: &PgPool, external_id: i64) -> Result<i64> {
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO users (external_id)
            VALUES ($1)
            ON CONFLICT (external_id) DO UPDATE SET external_id = EXCLUDED.external_id
            RETURNING id
            "#,
        )
        .bind(external_id)
        .fetch_one(pool)
        .await?;
        Ok(id)
    }

    pub async fn get_id(pool: &PgPool, external_id: i64) -> Result<Option<i64>> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM users WHERE external_id = $1")
            .bind(external_id)
            .fetch_optional(pool)
            .await?;
        Ok(row.map(|(id,)| id))
    }
}
