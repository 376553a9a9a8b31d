use crate::models::DbWallet;
use crate::Result;
use sqlx::{PgConnection, PgPool};

pub struct WalletRepository;

impl WalletRepository {
    /// Look up the wallet id, inserting an inactive wallet when absent
    pub async fn upsert(pool: &PgPool, address: &str) -> Result<i64> {
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO wallets (address)
            VALUES ($1)
            ON CONFLICT (address) DO UPDATE SET address = EXCLUDED.address
            RETURNING id
            "#,
        )
        .bind(address)
        .fetch_one(pool)
        .await?;
        Ok(id)
    }

    pub async fn is_active(pool: &PgPool, wallet_id: i64) -> Result<Option<bool>> {
        let row: Option<(bool,)> =
            sqlx::query_as("SELECT subscription_active FROM wallets WHERE id = $1")
                .bind(wallet_id)
                .fetch_optional(pool)
                .await?;
        Ok(row.map(|(active,)| active))
    }

    /// Row-lock the wallet for the rest of the transaction
    pub async fn lock_by_address(conn: &mut PgConnection, address: &str) -> Result<Option<DbWallet>> {
        let result = sqlx::query_as::<_, DbWallet>(
            "SELECT * FROM wallets WHERE address = $1 FOR UPDATE",
        )
        .bind(address)
        .fetch_optional(&mut *conn)
        .await?;
        Ok(result)
    }

    pub async fn lock_by_id(conn: &mut PgConnection, wallet_id: i64) -> Result<Option<DbWallet>> {
        let result = sqlx::query_as::<_, DbWallet>("SELECT * FROM wallets WHERE id = $1 FOR UPDATE")
            .bind(wallet_id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(result)
    }

    /// Returns whether a row was updated
    pub async fn set_active(conn: &mut PgConnection, wallet_id: i64, active: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE wallets SET subscription_active = $2 WHERE id = $1")
            .bind(wallet_id)
            .bind(active)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn get_active(pool: &PgPool) -> Result<Vec<DbWallet>> {
        let results = sqlx::query_as::<_, DbWallet>(
            "SELECT * FROM wallets WHERE subscription_active ORDER BY id",
        )
        .fetch_all(pool)
        .await?;
        Ok(results)
    }
}
