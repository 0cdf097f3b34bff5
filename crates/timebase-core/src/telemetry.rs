//! 메트릭 기록 헬퍼.
//!
//! `metrics` 파사드로 기록하며, 실제 익스포터(Prometheus)는 서버에서 설치합니다.
//! 레코더가 설치되지 않은 경우(테스트 등) 모든 호출은 no-op입니다.

use metrics::{counter, gauge, histogram};

/// 프로바이더 설치 시도 카운터 증가.
pub fn record_install_attempt(slug: &str, outcome: &str) {
    counter!(
        "timebase_provider_install_total",
        "provider" => slug.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// 프로바이더 제거 시도 카운터 증가.
pub fn record_uninstall_attempt(outcome: &str) {
    counter!("timebase_provider_uninstall_total", "outcome" => outcome.to_string()).increment(1);
}

/// 활성 프로바이더 수 증감.
pub fn adjust_active_providers(delta: i64) {
    let active = gauge!("timebase_providers_active");
    if delta >= 0 {
        active.increment(delta as f64);
    } else {
        active.decrement((-delta) as f64);
    }
}

/// 활성 프로바이더 수를 절대값으로 맞춤 (시작 시 동기화용).
pub fn set_active_providers(count: usize) {
    gauge!("timebase_providers_active").set(count as f64);
}

/// 과거 데이터 조회 결과 기록.
///
/// `source`: `cache` | `provider` | `none`
pub fn record_query(provider: &str, source: &str, success: bool, duration_secs: f64) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "timebase_queries_total",
        "provider" => provider.to_string(),
        "source" => source.to_string(),
        "status" => status
    )
    .increment(1);
    histogram!(
        "timebase_query_duration_seconds",
        "provider" => provider.to_string(),
        "status" => status
    )
    .record(duration_secs);
}

/// 저장된 포인트 수 기록.
pub fn record_points_stored(provider: &str, count: usize) {
    counter!("timebase_points_stored_total", "provider" => provider.to_string())
        .increment(count as u64);
}

/// 프로바이더 헬스 게이지 설정 (1 = 정상, 0 = 비정상).
pub fn set_provider_health(slug: &str, healthy: bool) {
    gauge!("timebase_provider_health", "provider" => slug.to_string())
        .set(if healthy { 1.0 } else { 0.0 });
}

/// 에러 카운터 증가.
pub fn record_error(operation: &str, kind: &str) {
    counter!(
        "timebase_errors_total",
        "operation" => operation.to_string(),
        "kind" => kind.to_string()
    )
    .increment(1);
}

/// 활성 업스트림 스트림 수 설정.
pub fn set_active_streams(count: usize) {
    gauge!("timebase_upstream_streams_active").set(count as f64);
}
