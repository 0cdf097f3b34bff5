//! 과거 데이터 접근 코디네이터.
//!
//! # 동작 방식
//!
//! 1. 프로바이더 확인 (없거나 비활성이면 빈 결과, 저장소/프로바이더 접근 없음)
//! 2. 저장소에서 범위 조회, 결과가 있으면 그대로 반환 (저장소 우선)
//! 3. 없으면 프로바이더에서 가져와 저장 후 반환
//! 4. 프로바이더도 빈 결과면 저장 없이 빈 결과 반환
//!
//! 저장소가 "이미 가져온 범위"의 유일한 기준입니다. 정정된 데이터를 다시 받으려면
//! `invalidate`로 범위를 지운 뒤 다시 조회합니다.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use timebase_core::telemetry;
use timebase_core::{Provider, RangeQuery, SymbolSummary, TimeSeriesPoint};
use timebase_transport::{HistoricalRequest, ProviderTransport};
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use crate::error::Result;
use crate::storage::{PointStore, ProviderStore};

/// 조회 결과 출처 (메트릭 라벨).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuerySource {
    Cache,
    Provider,
    None,
}

impl QuerySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuerySource::Cache => "cache",
            QuerySource::Provider => "provider",
            QuerySource::None => "none",
        }
    }
}

/// 과거 데이터 코디네이터.
pub struct DataAccessCoordinator {
    providers: Arc<dyn ProviderStore>,
    points: Arc<dyn PointStore>,
    transport: Arc<dyn ProviderTransport>,
}

impl DataAccessCoordinator {
    pub fn new(
        providers: Arc<dyn ProviderStore>,
        points: Arc<dyn PointStore>,
        transport: Arc<dyn ProviderTransport>,
    ) -> Self {
        Self {
            providers,
            points,
            transport,
        }
    }

    /// 과거 데이터를 조회합니다.
    #[instrument(skip(self))]
    pub async fn fetch_historical(
        &self,
        symbol: &str,
        interval: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        provider_id: Uuid,
    ) -> Result<Vec<TimeSeriesPoint>> {
        let provider = match self.providers.provider_by_id(provider_id).await? {
            Some(provider) if provider.enabled => provider,
            Some(provider) => {
                debug!(slug = %provider.slug, "비활성 프로바이더, 빈 결과 반환");
                return Ok(Vec::new());
            }
            None => {
                debug!(provider_id = %provider_id, "알 수 없는 프로바이더, 빈 결과 반환");
                return Ok(Vec::new());
            }
        };

        let query = RangeQuery {
            symbol: symbol.to_string(),
            interval: interval.to_string(),
            provider_id,
            start,
            end,
        };

        let started = Instant::now();
        let result = self.load(&provider, &query).await;
        let elapsed = started.elapsed().as_secs_f64();

        match result {
            Ok((points, source)) => {
                telemetry::record_query(&provider.slug, source.as_str(), true, elapsed);
                debug!(
                    slug = %provider.slug,
                    source = source.as_str(),
                    count = points.len(),
                    "과거 데이터 조회 완료"
                );
                Ok(points)
            }
            Err(e) => {
                telemetry::record_query(&provider.slug, "error", false, elapsed);
                telemetry::record_error("fetch_historical", e.kind());
                error!(slug = %provider.slug, error = %e, "과거 데이터 조회 실패");
                Err(e)
            }
        }
    }

    async fn load(
        &self,
        provider: &Provider,
        query: &RangeQuery,
    ) -> Result<(Vec<TimeSeriesPoint>, QuerySource)> {
        let cached = self.points.query_range(query).await?;
        if !cached.is_empty() {
            return Ok((cached, QuerySource::Cache));
        }

        let request = HistoricalRequest::new(
            query.symbol.clone(),
            query.interval.clone(),
            query.start,
            query.end,
        );
        let fetched = self.transport.fetch_historical(provider, &request).await?;
        if fetched.is_empty() {
            return Ok((fetched, QuerySource::None));
        }

        let stored = self.points.insert_points(&fetched).await?;
        telemetry::record_points_stored(&provider.slug, stored);
        info!(
            slug = %provider.slug,
            symbol = %query.symbol,
            interval = %query.interval,
            stored,
            "프로바이더 데이터 캐시에 저장"
        );

        Ok((fetched, QuerySource::Provider))
    }

    /// 저장된 데이터가 있는 활성 프로바이더 (생성 순).
    pub async fn providers_for_symbol(&self, symbol: &str) -> Result<Vec<Provider>> {
        let ids: HashSet<Uuid> = self
            .points
            .providers_with_symbol(symbol)
            .await?
            .into_iter()
            .collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        Ok(self
            .providers
            .list_providers(Some(true))
            .await?
            .into_iter()
            .filter(|p| ids.contains(&p.id))
            .collect())
    }

    /// 포인트를 일괄 저장합니다.
    #[instrument(skip(self, points), fields(count = points.len()))]
    pub async fn store_batch(&self, points: &[TimeSeriesPoint]) -> Result<usize> {
        if points.is_empty() {
            return Ok(0);
        }

        let stored = self.points.insert_points(points).await.inspect_err(|e| {
            telemetry::record_error("store_batch", e.kind());
        })?;

        for (slug, count) in self.stored_by_slug(points).await {
            telemetry::record_points_stored(&slug, count);
        }

        Ok(stored)
    }

    /// 저장 메트릭용 프로바이더별 고유 키 개수.
    ///
    /// 라벨은 `fetch_historical`과 같은 slug이고, 카탈로그에 없는 id는 문자열로 남깁니다.
    async fn stored_by_slug(&self, points: &[TimeSeriesPoint]) -> BTreeMap<String, usize> {
        let mut keys: BTreeMap<Uuid, HashSet<(DateTime<Utc>, &str, &str)>> = BTreeMap::new();
        for point in points {
            keys.entry(point.provider_id).or_default().insert((
                point.timestamp,
                point.symbol.as_str(),
                point.interval.as_str(),
            ));
        }

        let mut counts = BTreeMap::new();
        for (provider_id, unique) in keys {
            let slug = match self.providers.provider_by_id(provider_id).await {
                Ok(Some(provider)) => provider.slug,
                _ => provider_id.to_string(),
            };
            *counts.entry(slug).or_default() += unique.len();
        }
        counts
    }

    /// 심볼 요약. 데이터가 없으면 `None`.
    pub async fn summary(&self, symbol: &str) -> Result<Option<SymbolSummary>> {
        self.points.symbol_summary(symbol).await
    }

    /// 저장된 범위를 삭제하여 다음 조회가 프로바이더로 가도록 합니다.
    #[instrument(skip(self))]
    pub async fn invalidate(
        &self,
        symbol: &str,
        interval: &str,
        provider_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<u64> {
        let query = RangeQuery {
            symbol: symbol.to_string(),
            interval: interval.to_string(),
            provider_id,
            start,
            end,
        };
        let deleted = self.points.delete_range(&query).await?;
        info!(deleted, "캐시 범위 무효화");
        Ok(deleted)
    }
}
