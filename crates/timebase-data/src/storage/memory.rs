//! 인메모리 저장소.
//!
//! DB 없이 서버를 띄우거나 테스트할 때 사용합니다.
//! slug 고유 제약 등 PostgreSQL 스키마와 같은 규칙을 따릅니다.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use timebase_core::{Provider, RangeQuery, SymbolSummary, TimeSeriesPoint};
use uuid::Uuid;

use super::{PointStore, ProviderStore};
use crate::error::{DataError, Result};

/// 포인트 키 (time, symbol, interval, provider).
type PointKey = (DateTime<Utc>, String, String, Uuid);

#[derive(Default)]
struct Inner {
    /// 삽입 순번과 레코드 (생성 시각이 같을 때 순번으로 정렬)
    providers: HashMap<Uuid, (u64, Provider)>,
    next_seq: u64,
    points: BTreeMap<PointKey, TimeSeriesPoint>,
}

/// 인메모리 저장소.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// 저장된 포인트 수.
    pub fn point_count(&self) -> usize {
        self.read().points.len()
    }
}

fn point_key(point: &TimeSeriesPoint) -> PointKey {
    (
        point.timestamp,
        point.symbol.clone(),
        point.interval.clone(),
        point.provider_id,
    )
}

#[async_trait]
impl ProviderStore for MemoryStore {
    async fn insert_provider(&self, provider: &Provider) -> Result<()> {
        let mut inner = self.write();
        if inner.providers.values().any(|(_, p)| p.slug == provider.slug) {
            return Err(DataError::DuplicateError(format!(
                "duplicate key value violates unique constraint \"providers_slug_key\": {}",
                provider.slug
            )));
        }
        if inner.providers.contains_key(&provider.id) {
            return Err(DataError::DuplicateError(format!("provider {}", provider.id)));
        }
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.providers.insert(provider.id, (seq, provider.clone()));
        Ok(())
    }

    async fn provider_by_id(&self, id: Uuid) -> Result<Option<Provider>> {
        Ok(self.read().providers.get(&id).map(|(_, p)| p.clone()))
    }

    async fn provider_by_slug(&self, slug: &str) -> Result<Option<Provider>> {
        Ok(self
            .read()
            .providers
            .values()
            .find(|(_, p)| p.slug == slug)
            .map(|(_, p)| p.clone()))
    }

    async fn provider_by_origin(&self, origin: &str) -> Result<Option<Provider>> {
        Ok(self
            .read()
            .providers
            .values()
            .find(|(_, p)| p.origin == origin)
            .map(|(_, p)| p.clone()))
    }

    async fn list_providers(&self, enabled: Option<bool>) -> Result<Vec<Provider>> {
        let mut providers: Vec<(u64, Provider)> = self
            .read()
            .providers
            .values()
            .filter(|(_, p)| enabled.map_or(true, |flag| p.enabled == flag))
            .cloned()
            .collect();
        providers.sort_by(|(seq_a, a), (seq_b, b)| {
            a.created_at.cmp(&b.created_at).then(seq_a.cmp(seq_b))
        });
        Ok(providers.into_iter().map(|(_, p)| p).collect())
    }

    async fn update_provider(&self, provider: &Provider) -> Result<()> {
        let mut inner = self.write();
        if inner
            .providers
            .values()
            .any(|(_, p)| p.slug == provider.slug && p.id != provider.id)
        {
            return Err(DataError::DuplicateError(provider.slug.clone()));
        }
        match inner.providers.get_mut(&provider.id) {
            Some((_, existing)) => {
                *existing = provider.clone();
                Ok(())
            }
            None => Err(DataError::NotFound(format!("provider {}", provider.id))),
        }
    }

    async fn delete_provider(&self, id: Uuid) -> Result<bool> {
        Ok(self.write().providers.remove(&id).is_some())
    }
}

#[async_trait]
impl PointStore for MemoryStore {
    async fn query_range(&self, query: &RangeQuery) -> Result<Vec<TimeSeriesPoint>> {
        // BTreeMap 키가 시간 우선이므로 결과는 시간 오름차순
        Ok(self
            .read()
            .points
            .values()
            .filter(|p| query.matches(p))
            .cloned()
            .collect())
    }

    async fn insert_points(&self, points: &[TimeSeriesPoint]) -> Result<usize> {
        if points.is_empty() {
            return Ok(0);
        }
        // 같은 배치의 중복 키는 마지막 값이 남고 한 행으로 셈
        let mut inner = self.write();
        let mut keys = BTreeSet::new();
        for point in points {
            let key = point_key(point);
            keys.insert(key.clone());
            inner.points.insert(key, point.clone());
        }
        Ok(keys.len())
    }

    async fn providers_with_symbol(&self, symbol: &str) -> Result<Vec<Uuid>> {
        let ids: BTreeSet<Uuid> = self
            .read()
            .points
            .values()
            .filter(|p| p.symbol == symbol)
            .map(|p| p.provider_id)
            .collect();
        Ok(ids.into_iter().collect())
    }

    async fn symbol_summary(&self, symbol: &str) -> Result<Option<SymbolSummary>> {
        let inner = self.read();
        let mut rows = inner.points.values().filter(|p| p.symbol == symbol);

        let Some(first) = rows.next() else {
            return Ok(None);
        };

        let mut summary = SymbolSummary {
            symbol: symbol.to_string(),
            count: 1,
            min_time: first.timestamp,
            max_time: first.timestamp,
            distinct_provider_count: 0,
            distinct_intervals: BTreeSet::from([first.interval.clone()]),
        };
        let mut providers = BTreeSet::from([first.provider_id]);

        for point in rows {
            summary.count += 1;
            summary.min_time = summary.min_time.min(point.timestamp);
            summary.max_time = summary.max_time.max(point.timestamp);
            summary.distinct_intervals.insert(point.interval.clone());
            providers.insert(point.provider_id);
        }
        summary.distinct_provider_count = providers.len() as i64;

        Ok(Some(summary))
    }

    async fn delete_range(&self, query: &RangeQuery) -> Result<u64> {
        let mut inner = self.write();
        let before = inner.points.len();
        inner.points.retain(|_, p| !query.matches(p));
        Ok((before - inner.points.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn point(day: u32, symbol: &str, interval: &str, provider_id: Uuid) -> TimeSeriesPoint {
        TimeSeriesPoint {
            timestamp: Utc.with_ymd_and_hms(2024, 3, day, 0, 0, 0).unwrap(),
            symbol: symbol.to_string(),
            provider_id,
            interval: interval.to_string(),
            open: 10.0,
            high: 11.0,
            low: 9.0,
            close: 10.5,
            volume: 500.0,
            metadata: None,
        }
    }

    #[tokio::test]
    async fn test_duplicate_slug_rejected() {
        let store = MemoryStore::new();
        store
            .insert_provider(&Provider::new("acme", "https://a/acme", "ws://acme:50051"))
            .await
            .unwrap();

        let err = store
            .insert_provider(&Provider::new("acme", "https://b/acme", "ws://acme:50051"))
            .await
            .unwrap_err();
        assert!(matches!(err, DataError::DuplicateError(_)));
    }

    #[tokio::test]
    async fn test_upsert_same_key() {
        let store = MemoryStore::new();
        let provider_id = Uuid::new_v4();
        let mut updated = point(1, "AAPL", "1d", provider_id);
        updated.close = 12.0;

        let stored = store
            .insert_points(&[
                point(1, "AAPL", "1d", provider_id),
                updated,
                point(2, "AAPL", "1d", provider_id),
            ])
            .await
            .unwrap();

        // 배치 안의 중복 키는 한 행
        assert_eq!(stored, 2);
        assert_eq!(store.point_count(), 2);
        let query = RangeQuery {
            symbol: "AAPL".to_string(),
            interval: "1d".to_string(),
            provider_id,
            start: Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
        };
        let points = store.query_range(&query).await.unwrap();
        assert_eq!(points[0].close, 12.0);
    }

    #[tokio::test]
    async fn test_summary() {
        let store = MemoryStore::new();
        let (p1, p2) = (Uuid::new_v4(), Uuid::new_v4());
        store
            .insert_points(&[
                point(3, "AAPL", "1d", p1),
                point(1, "AAPL", "1h", p1),
                point(2, "AAPL", "1d", p2),
                point(2, "MSFT", "1d", p2),
            ])
            .await
            .unwrap();

        let summary = store.symbol_summary("AAPL").await.unwrap().unwrap();
        assert_eq!(summary.count, 3);
        assert_eq!(summary.min_time, Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap());
        assert_eq!(summary.max_time, Utc.with_ymd_and_hms(2024, 3, 3, 0, 0, 0).unwrap());
        assert_eq!(summary.distinct_provider_count, 2);
        assert_eq!(summary.distinct_intervals.len(), 2);

        assert!(store.symbol_summary("TSLA").await.unwrap().is_none());
    }
}
