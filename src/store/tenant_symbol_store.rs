use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::TenantSymbol;

/// Persistence boundary for tenant-scoped symbol overrides (spec.md §3
/// "Tenant-symbol override"). Mirrors the original's
/// `domain.TenantSymbolRepo` one-for-one; the spec only exercises
/// `upsert`, the rest exist for the CRUD surface the original service
/// exposes around it.
#[async_trait]
pub trait TenantSymbolStore: Send + Sync {
    async fn upsert(&self, s: &TenantSymbol) -> AppResult<()>;

    async fn delete(&self, tenant_id: Uuid, source: &str, symbol: &str) -> AppResult<()>;

    async fn get_list(
        &self,
        tenant_id: Uuid,
        source: &str,
        symbols: &[String],
    ) -> AppResult<Vec<TenantSymbol>>;

    async fn get_list_by_source(&self, tenant_id: Uuid, source: &str) -> AppResult<Vec<TenantSymbol>>;
}

pub struct PgTenantSymbolStore {
    pool: PgPool,
}

impl PgTenantSymbolStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TenantSymbolStore for PgTenantSymbolStore {
    async fn upsert(&self, s: &TenantSymbol) -> AppResult<()> {
        sqlx::query!(
            r#"
            INSERT INTO tenant_symbols (tenant_id, source, symbol, coin_id)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (tenant_id, source, symbol)
            DO UPDATE SET coin_id = EXCLUDED.coin_id
            "#,
            s.tenant_id,
            s.source,
            s.symbol,
            s.coin_id,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, tenant_id: Uuid, source: &str, symbol: &str) -> AppResult<()> {
        sqlx::query!(
            r#"
            DELETE FROM tenant_symbols
            WHERE tenant_id = $1 AND source = $2 AND symbol = $3
            "#,
            tenant_id,
            source,
            symbol,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_list(
        &self,
        tenant_id: Uuid,
        source: &str,
        symbols: &[String],
    ) -> AppResult<Vec<TenantSymbol>> {
        if symbols.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query!(
            r#"
            SELECT tenant_id, source, symbol, coin_id
            FROM tenant_symbols
            WHERE tenant_id = $1 AND source = $2 AND symbol = ANY($3)
            "#,
            tenant_id,
            source,
            symbols,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| TenantSymbol::new(r.tenant_id, r.source, r.symbol, r.coin_id))
            .collect())
    }

    async fn get_list_by_source(&self, tenant_id: Uuid, source: &str) -> AppResult<Vec<TenantSymbol>> {
        let rows = sqlx::query!(
            r#"
            SELECT tenant_id, source, symbol, coin_id
            FROM tenant_symbols
            WHERE tenant_id = $1 AND source = $2
            "#,
            tenant_id,
            source,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| TenantSymbol::new(r.tenant_id, r.source, r.symbol, r.coin_id))
            .collect())
    }
}
