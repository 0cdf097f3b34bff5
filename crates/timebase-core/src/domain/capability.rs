//! 프로바이더가 자체 보고하는 capability, 심볼, 헬스 정보.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use crate::types::Interval;

/// 프로바이더 capability.
///
/// 프로바이더가 `get_capabilities` 호출에 응답한 내용입니다.
/// refresh 시 통째로 덮어써지며 자동 만료되지 않습니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    /// 프로바이더가 보고한 이름
    pub name: String,
    /// 프로바이더가 보고한 버전
    pub version: String,
    /// 프로바이더가 보고한 slug
    #[serde(default)]
    pub slug: Option<String>,
    /// 과거 데이터 지원 여부
    pub supports_historical: bool,
    /// 실시간 스트리밍 지원 여부
    pub supports_realtime: bool,
    /// 백필 지원 여부
    #[serde(default)]
    pub supports_backfill: bool,
    /// 지원 자산 분류 (stocks, crypto, ...)
    #[serde(default)]
    pub data_types: BTreeSet<String>,
    /// 지원 인터벌 (프로바이더 보고 문자열 그대로)
    #[serde(default)]
    pub intervals: BTreeSet<String>,
    /// 요청 한도 (requests_per_minute 등)
    #[serde(default)]
    pub rate_limits: HashMap<String, i64>,
    /// 최대 조회 가능 일수
    #[serde(default)]
    pub max_lookback_days: Option<i64>,
}

impl CapabilityDescriptor {
    /// 주어진 인터벌을 지원하는지 확인합니다.
    pub fn supports_interval(&self, interval: Interval) -> bool {
        self.intervals.contains(interval.as_str())
    }
}

/// 프로바이더가 제공하는 심볼 정보.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolInfo {
    pub symbol: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type")]
    pub asset_type: String,
    #[serde(default)]
    pub intervals: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// 프로바이더 헬스 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// 헬스 체크 응답.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    #[serde(default)]
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl HealthReport {
    /// 요청을 처리할 수 있는 상태인지 확인합니다.
    ///
    /// `DEGRADED`는 응답은 가능하므로 정상으로 취급합니다.
    pub fn is_serving(&self) -> bool {
        matches!(self.status, HealthStatus::Healthy | HealthStatus::Degraded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_minimal_payload() {
        // 최소 필드만 보내는 프로바이더도 허용
        let json = r#"{
            "name": "Minimal",
            "version": "1.0.0",
            "supports_historical": true,
            "supports_realtime": false,
            "data_types": ["stocks"],
            "intervals": ["1d"]
        }"#;
        let caps: CapabilityDescriptor = serde_json::from_str(json).unwrap();
        assert!(caps.supports_historical);
        assert!(!caps.supports_realtime);
        assert!(caps.supports_interval(Interval::D1));
        assert!(!caps.supports_interval(Interval::M1));
        assert!(caps.rate_limits.is_empty());
    }

    #[test]
    fn test_health_status_wire_format() {
        let report: HealthReport = serde_json::from_str(
            r#"{"status":"DEGRADED","message":"slow","timestamp":"2024-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(report.status, HealthStatus::Degraded);
        assert!(report.is_serving());
    }
}
