//! 저장소 인터페이스와 구현.
//!
//! - `ProviderStore`: 프로바이더 카탈로그 레코드
//! - `PointStore`: 시계열 포인트 (과거 데이터 캐시의 유일한 진실 공급원)
//!
//! 구현:
//! - [`PgStore`]: PostgreSQL (sqlx)
//! - [`MemoryStore`]: 인메모리 (테스트, DB 없이 실행)

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use timebase_core::{Provider, RangeQuery, SymbolSummary, TimeSeriesPoint};
use uuid::Uuid;

use crate::error::Result;

/// 프로바이더 레코드 저장소.
#[async_trait]
pub trait ProviderStore: Send + Sync {
    /// 새 프로바이더 저장. slug 중복 시 `DuplicateError`.
    async fn insert_provider(&self, provider: &Provider) -> Result<()>;

    async fn provider_by_id(&self, id: Uuid) -> Result<Option<Provider>>;

    async fn provider_by_slug(&self, slug: &str) -> Result<Option<Provider>>;

    async fn provider_by_origin(&self, origin: &str) -> Result<Option<Provider>>;

    /// 생성 시각 오름차순 목록. `enabled`가 주어지면 필터링.
    async fn list_providers(&self, enabled: Option<bool>) -> Result<Vec<Provider>>;

    /// 레코드 전체 갱신. 존재하지 않으면 `NotFound`.
    async fn update_provider(&self, provider: &Provider) -> Result<()>;

    /// 삭제 여부 반환.
    async fn delete_provider(&self, id: Uuid) -> Result<bool>;
}

/// 시계열 포인트 저장소.
#[async_trait]
pub trait PointStore: Send + Sync {
    /// 범위 내 포인트를 시간 오름차순으로 반환 (양 끝 포함).
    async fn query_range(&self, query: &RangeQuery) -> Result<Vec<TimeSeriesPoint>>;

    /// 일괄 저장. 같은 (time, symbol, interval, provider) 키는 덮어씀.
    async fn insert_points(&self, points: &[TimeSeriesPoint]) -> Result<usize>;

    /// 해당 심볼 포인트를 가진 프로바이더 ID 목록 (중복 제거).
    async fn providers_with_symbol(&self, symbol: &str) -> Result<Vec<Uuid>>;

    /// 심볼 요약. 행이 없으면 `None`.
    async fn symbol_summary(&self, symbol: &str) -> Result<Option<SymbolSummary>>;

    /// 범위 내 포인트 삭제. 삭제된 행 수 반환.
    async fn delete_range(&self, query: &RangeQuery) -> Result<u64>;
}
