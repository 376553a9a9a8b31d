use crate::Result;
use sqlx::PgPool;
use tracker_core::types::TokenSnapshot;

pub struct TokenRepository;

impl TokenRepository {
    /// Insert or refresh the token row
    pub async fn upsert(pool: &PgPool, token: &TokenSnapshot) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO tokens (address, name, symbol, supply, price, fdv, socials, token_created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (address) DO UPDATE SET
                name = EXCLUDED.name,
                symbol = EXCLUDED.symbol,
                supply = EXCLUDED.supply,
                price = EXCLUDED.price,
                fdv = EXCLUDED.fdv,
                socials = EXCLUDED.socials,
                token_created_at = EXCLUDED.token_created_at,
                updated_at = NOW()
            "#,
        )
        .bind(&token.address)
        .bind(&token.name)
        .bind(&token.symbol)
        .bind(token.supply)
        .bind(token.price)
        .bind(token.fdv)
        .bind(&token.socials)
        .bind(token.created_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Returns whether a row was deleted
    pub async fn delete(pool: &PgPool, address: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM tokens WHERE address = $1")
            .bind(address)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
