//! PostgreSQL 저장소.
//!
//! 프로바이더 카탈로그(`providers`)와 시계열 포인트(`time_series_points`) 테이블을
//! 다룹니다. 스키마는 `migrations/`에 있습니다.

use std::collections::{BTreeSet, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use timebase_core::{DatabaseConfig, Provider, RangeQuery, SymbolSummary, TimeSeriesPoint};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::{PointStore, ProviderStore};
use crate::error::{DataError, Result};

/// 일괄 삽입 청크 크기.
const INSERT_CHUNK: usize = 500;

/// 프로바이더 테이블 레코드.
#[derive(Debug, Clone, FromRow)]
struct ProviderRecord {
    id: Uuid,
    slug: String,
    name: String,
    version: String,
    enabled: bool,
    origin: String,
    endpoint: String,
    capabilities: Option<String>,
    config: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ProviderRecord> for Provider {
    fn from(r: ProviderRecord) -> Self {
        Provider {
            id: r.id,
            slug: r.slug,
            name: r.name,
            version: r.version,
            enabled: r.enabled,
            origin: r.origin,
            endpoint: r.endpoint,
            capabilities: r.capabilities,
            config: r.config,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

/// 시계열 포인트 레코드.
#[derive(Debug, Clone, FromRow)]
struct PointRecord {
    time: DateTime<Utc>,
    symbol: String,
    timeframe: String,
    provider_id: Uuid,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
    metadata: Option<serde_json::Value>,
}

impl From<PointRecord> for TimeSeriesPoint {
    fn from(r: PointRecord) -> Self {
        TimeSeriesPoint {
            timestamp: r.time,
            symbol: r.symbol,
            provider_id: r.provider_id,
            interval: r.timeframe,
            open: r.open,
            high: r.high,
            low: r.low,
            close: r.close,
            volume: r.volume,
            metadata: r.metadata,
        }
    }
}

const PROVIDER_COLUMNS: &str = "id, slug, name, version, enabled, origin, endpoint, \
     capabilities, config, created_at, updated_at";

/// PostgreSQL 기반 저장소.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 새로운 데이터베이스 연결 풀을 생성합니다.
    pub async fn connect(url: &str, config: &DatabaseConfig) -> Result<Self> {
        info!("Connecting to database...");

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(url)
            .await
            .map_err(|e| DataError::ConnectionError(e.to_string()))?;

        info!("Database connection established");

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// 데이터베이스 마이그레이션을 실행합니다.
    pub async fn migrate(&self) -> Result<()> {
        info!("Running database migrations...");

        sqlx::migrate!("../../migrations").run(&self.pool).await?;

        info!("Migrations completed successfully");
        Ok(())
    }

    /// 데이터베이스 상태를 확인합니다.
    pub async fn health_check(&self) -> Result<bool> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(true)
    }

    async fn fetch_provider(&self, column: &str, value: impl ToString) -> Result<Option<Provider>> {
        let sql = format!(
            "SELECT {} FROM providers WHERE {} = $1",
            PROVIDER_COLUMNS, column
        );
        let record: Option<ProviderRecord> = sqlx::query_as(&sql)
            .bind(value.to_string())
            .fetch_optional(&self.pool)
            .await?;
        Ok(record.map(Provider::from))
    }
}

#[async_trait]
impl ProviderStore for PgStore {
    #[instrument(skip(self, provider), fields(slug = %provider.slug))]
    async fn insert_provider(&self, provider: &Provider) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO providers
                (id, slug, name, version, enabled, origin, endpoint,
                 capabilities, config, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(provider.id)
        .bind(&provider.slug)
        .bind(&provider.name)
        .bind(&provider.version)
        .bind(provider.enabled)
        .bind(&provider.origin)
        .bind(&provider.endpoint)
        .bind(&provider.capabilities)
        .bind(&provider.config)
        .bind(provider.created_at)
        .bind(provider.updated_at)
        .execute(&self.pool)
        .await?;

        debug!("프로바이더 저장");
        Ok(())
    }

    async fn provider_by_id(&self, id: Uuid) -> Result<Option<Provider>> {
        let record: Option<ProviderRecord> = sqlx::query_as(&format!(
            "SELECT {} FROM providers WHERE id = $1",
            PROVIDER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record.map(Provider::from))
    }

    async fn provider_by_slug(&self, slug: &str) -> Result<Option<Provider>> {
        self.fetch_provider("slug", slug).await
    }

    async fn provider_by_origin(&self, origin: &str) -> Result<Option<Provider>> {
        self.fetch_provider("origin", origin).await
    }

    async fn list_providers(&self, enabled: Option<bool>) -> Result<Vec<Provider>> {
        let records: Vec<ProviderRecord> = sqlx::query_as(&format!(
            "SELECT {} FROM providers \
             WHERE ($1::boolean IS NULL OR enabled = $1) \
             ORDER BY created_at ASC",
            PROVIDER_COLUMNS
        ))
        .bind(enabled)
        .fetch_all(&self.pool)
        .await?;
        Ok(records.into_iter().map(Provider::from).collect())
    }

    #[instrument(skip(self, provider), fields(slug = %provider.slug))]
    async fn update_provider(&self, provider: &Provider) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE providers SET
                slug = $2, name = $3, version = $4, enabled = $5, origin = $6,
                endpoint = $7, capabilities = $8, config = $9, updated_at = $10
            WHERE id = $1
            "#,
        )
        .bind(provider.id)
        .bind(&provider.slug)
        .bind(&provider.name)
        .bind(&provider.version)
        .bind(provider.enabled)
        .bind(&provider.origin)
        .bind(&provider.endpoint)
        .bind(&provider.capabilities)
        .bind(&provider.config)
        .bind(provider.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DataError::NotFound(format!("provider {}", provider.id)));
        }
        Ok(())
    }

    async fn delete_provider(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM providers WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| DataError::DeleteError(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl PointStore for PgStore {
    #[instrument(skip(self), fields(symbol = %query.symbol, interval = %query.interval))]
    async fn query_range(&self, query: &RangeQuery) -> Result<Vec<TimeSeriesPoint>> {
        let records: Vec<PointRecord> = sqlx::query_as(
            r#"
            SELECT time, symbol, timeframe, provider_id, open, high, low, close, volume, metadata
            FROM time_series_points
            WHERE symbol = $1 AND timeframe = $2 AND provider_id = $3
              AND time >= $4 AND time <= $5
            ORDER BY time ASC
            "#,
        )
        .bind(&query.symbol)
        .bind(&query.interval)
        .bind(query.provider_id)
        .bind(query.start)
        .bind(query.end)
        .fetch_all(&self.pool)
        .await?;

        debug!(count = records.len(), "저장된 포인트 조회");
        Ok(records.into_iter().map(TimeSeriesPoint::from).collect())
    }

    #[instrument(skip(self, points), fields(count = points.len()))]
    async fn insert_points(&self, points: &[TimeSeriesPoint]) -> Result<usize> {
        if points.is_empty() {
            return Ok(0);
        }

        // 같은 배치 안의 중복 키는 ON CONFLICT가 처리하지 못하므로 마지막 값만 남김
        let mut seen = HashSet::new();
        let mut unique: Vec<&TimeSeriesPoint> = points
            .iter()
            .rev()
            .filter(|p| {
                seen.insert((p.timestamp, p.symbol.as_str(), p.interval.as_str(), p.provider_id))
            })
            .collect();
        unique.reverse();

        let mut inserted = 0;

        // UNNEST 패턴으로 일괄 삽입
        for chunk in unique.chunks(INSERT_CHUNK) {
            let times: Vec<DateTime<Utc>> = chunk.iter().map(|p| p.timestamp).collect();
            let symbols: Vec<&str> = chunk.iter().map(|p| p.symbol.as_str()).collect();
            let timeframes: Vec<&str> = chunk.iter().map(|p| p.interval.as_str()).collect();
            let provider_ids: Vec<Uuid> = chunk.iter().map(|p| p.provider_id).collect();
            let opens: Vec<f64> = chunk.iter().map(|p| p.open).collect();
            let highs: Vec<f64> = chunk.iter().map(|p| p.high).collect();
            let lows: Vec<f64> = chunk.iter().map(|p| p.low).collect();
            let closes: Vec<f64> = chunk.iter().map(|p| p.close).collect();
            let volumes: Vec<f64> = chunk.iter().map(|p| p.volume).collect();
            let metadata: Vec<Option<serde_json::Value>> =
                chunk.iter().map(|p| p.metadata.clone()).collect();

            let result = sqlx::query(
                r#"
                INSERT INTO time_series_points
                    (time, symbol, timeframe, provider_id, open, high, low, close, volume, metadata)
                SELECT * FROM UNNEST(
                    $1::timestamptz[], $2::text[], $3::text[], $4::uuid[],
                    $5::float8[], $6::float8[], $7::float8[], $8::float8[], $9::float8[],
                    $10::jsonb[]
                )
                ON CONFLICT (time, symbol, timeframe, provider_id) DO UPDATE SET
                    open = EXCLUDED.open,
                    high = EXCLUDED.high,
                    low = EXCLUDED.low,
                    close = EXCLUDED.close,
                    volume = EXCLUDED.volume,
                    metadata = EXCLUDED.metadata
                "#,
            )
            .bind(&times)
            .bind(&symbols)
            .bind(&timeframes)
            .bind(&provider_ids)
            .bind(&opens)
            .bind(&highs)
            .bind(&lows)
            .bind(&closes)
            .bind(&volumes)
            .bind(&metadata)
            .execute(&self.pool)
            .await
            .map_err(|e| DataError::InsertError(e.to_string()))?;

            inserted += result.rows_affected() as usize;
        }

        info!(inserted = inserted, "포인트 저장");
        Ok(inserted)
    }

    async fn providers_with_symbol(&self, symbol: &str) -> Result<Vec<Uuid>> {
        let ids: Vec<(Uuid,)> = sqlx::query_as(
            "SELECT DISTINCT provider_id FROM time_series_points WHERE symbol = $1",
        )
        .bind(symbol)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids.into_iter().map(|(id,)| id).collect())
    }

    async fn symbol_summary(&self, symbol: &str) -> Result<Option<SymbolSummary>> {
        let row: (i64, Option<DateTime<Utc>>, Option<DateTime<Utc>>, i64, Vec<String>) =
            sqlx::query_as(
                r#"
                SELECT
                    COUNT(*),
                    MIN(time),
                    MAX(time),
                    COUNT(DISTINCT provider_id),
                    COALESCE(ARRAY_AGG(DISTINCT timeframe), '{}'::text[])
                FROM time_series_points
                WHERE symbol = $1
                "#,
            )
            .bind(symbol)
            .fetch_one(&self.pool)
            .await?;

        let (count, min_time, max_time, distinct_provider_count, intervals) = row;
        match (min_time, max_time) {
            (Some(min_time), Some(max_time)) if count > 0 => Ok(Some(SymbolSummary {
                symbol: symbol.to_string(),
                count,
                min_time,
                max_time,
                distinct_provider_count,
                distinct_intervals: intervals.into_iter().collect::<BTreeSet<_>>(),
            })),
            _ => Ok(None),
        }
    }

    #[instrument(skip(self), fields(symbol = %query.symbol, interval = %query.interval))]
    async fn delete_range(&self, query: &RangeQuery) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM time_series_points
            WHERE symbol = $1 AND timeframe = $2 AND provider_id = $3
              AND time >= $4 AND time <= $5
            "#,
        )
        .bind(&query.symbol)
        .bind(&query.interval)
        .bind(query.provider_id)
        .bind(query.start)
        .bind(query.end)
        .execute(&self.pool)
        .await
        .map_err(|e| DataError::DeleteError(e.to_string()))?;

        Ok(result.rows_affected())
    }
}
