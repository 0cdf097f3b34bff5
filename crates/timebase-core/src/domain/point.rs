//! 시계열 데이터 포인트와 조회 타입.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// OHLCV 시계열 포인트.
///
/// OHLC 값은 프로바이더가 보낸 그대로 전달되며 보정하지 않습니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesPoint {
    /// 타임스탬프 (UTC)
    pub timestamp: DateTime<Utc>,
    /// 심볼
    pub symbol: String,
    /// 프로바이더 ID
    pub provider_id: Uuid,
    /// 인터벌 (프로바이더 보고 문자열)
    pub interval: String,
    /// 시가
    pub open: f64,
    /// 고가
    pub high: f64,
    /// 저가
    pub low: f64,
    /// 종가
    pub close: f64,
    /// 거래량
    pub volume: f64,
    /// 부가 메타데이터
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// 과거 데이터 범위 조회.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeQuery {
    pub symbol: String,
    pub interval: String,
    pub provider_id: Uuid,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl RangeQuery {
    /// 포인트가 이 조회 범위에 속하는지 확인합니다. 양 끝 포함.
    pub fn matches(&self, point: &TimeSeriesPoint) -> bool {
        point.provider_id == self.provider_id
            && point.symbol == self.symbol
            && point.interval == self.interval
            && point.timestamp >= self.start
            && point.timestamp <= self.end
    }
}

/// 심볼별 저장 데이터 요약.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolSummary {
    pub symbol: String,
    pub count: i64,
    pub min_time: DateTime<Utc>,
    pub max_time: DateTime<Utc>,
    pub distinct_provider_count: i64,
    pub distinct_intervals: BTreeSet<String>,
}
