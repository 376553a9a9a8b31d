use crate::Result;
use sqlx::PgConnection;

pub struct SubscriptionRepository;

impl SubscriptionRepository {
    /// Insert or ignore. Returns whether a new row was created
    pub async fn insert_if_not_exists(
        conn: &mut PgConnection,
        user_id: i64,
        wallet_id: i64,
        wallet_address: &str,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO subscriptions (user_id, wallet_id, wallet_address)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, wallet_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(wallet_id)
        .bind(wallet_address)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete(conn: &mut PgConnection, user_id: i64, wallet_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM subscriptions WHERE user_id = $1 AND wallet_id = $2")
            .bind(user_id)
            .bind(wallet_id)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn count_for_wallet(conn: &mut PgConnection, wallet_id: i64) -> Result<i64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM subscriptions WHERE wallet_id = $1")
                .bind(wallet_id)
                .fetch_one(&mut *conn)
                .await?;
        Ok(count)
    }
}
