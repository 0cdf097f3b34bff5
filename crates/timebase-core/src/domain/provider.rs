//! 프로바이더 도메인 모델.
//!
//! 카탈로그에 등록된 외부 데이터 프로바이더의 식별 정보, 활성화 여부,
//! 캐시된 capability 정보를 표현합니다.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::capability::CapabilityDescriptor;
use crate::error::{CoreError, CoreResult};

/// 저장소 이름 규칙 접두사 (`timebase-provider-yahoo` → `yahoo`).
pub const SLUG_PREFIX: &str = "timebase-provider-";

/// 기본 엔드포인트 템플릿. `{slug}`가 프로바이더 slug로 치환됩니다.
pub const DEFAULT_ENDPOINT_TEMPLATE: &str = "ws://{slug}:50051";

/// 등록된 프로바이더.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provider {
    /// 프로바이더 ID
    pub id: Uuid,
    /// 전역 고유 slug
    pub slug: String,
    /// 표시 이름
    pub name: String,
    /// 버전
    pub version: String,
    /// 활성화 여부
    pub enabled: bool,
    /// origin 참조 (예: 저장소 URL)
    pub origin: String,
    /// 네트워크 엔드포인트 주소
    pub endpoint: String,
    /// 캐시된 capability (JSON 텍스트, refresh 전에는 None)
    pub capabilities: Option<String>,
    /// 프로바이더별 설정 (불투명)
    pub config: Option<serde_json::Value>,
    /// 생성 시각
    pub created_at: DateTime<Utc>,
    /// 수정 시각
    pub updated_at: DateTime<Utc>,
}

impl Provider {
    /// 새 프로바이더 레코드를 생성합니다.
    ///
    /// 새 레코드는 활성화 상태이며 capability가 비어 있습니다.
    pub fn new(
        slug: impl Into<String>,
        origin: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        let slug = slug.into();
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: slug.clone(),
            slug,
            version: "unknown".to_string(),
            enabled: true,
            origin: origin.into(),
            endpoint: endpoint.into(),
            capabilities: None,
            config: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// 캐시된 capability를 역직렬화합니다.
    ///
    /// 값이 없거나 손상된 경우 `None`을 반환합니다.
    pub fn cached_capabilities(&self) -> Option<CapabilityDescriptor> {
        let raw = self.capabilities.as_deref()?;
        serde_json::from_str(raw).ok()
    }

    /// 캐시된 capability가 실시간 스트리밍을 지원하는지 확인합니다.
    pub fn supports_realtime(&self) -> bool {
        self.cached_capabilities()
            .map(|caps| caps.supports_realtime)
            .unwrap_or(false)
    }
}

/// origin 참조에서 slug를 도출합니다.
///
/// 마지막 경로 세그먼트를 소문자로 변환하고, 이름 규칙 접두사가 있으면 제거합니다.
/// 끝의 `/`와 `.git` 접미사는 무시합니다.
pub fn derive_slug(origin: &str) -> CoreResult<String> {
    let trimmed = origin.trim().trim_end_matches('/');
    let segment = trimmed
        .rsplit(|c| c == '/' || c == ':')
        .next()
        .unwrap_or(trimmed);
    let segment = segment.strip_suffix(".git").unwrap_or(segment);
    let lower = segment.to_lowercase();

    let base = match lower.strip_prefix(SLUG_PREFIX) {
        Some(rest) if !rest.is_empty() => rest,
        _ => lower.as_str(),
    };

    let slug: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect();
    let slug = slug.trim_matches('-').to_string();

    if slug.is_empty() {
        return Err(CoreError::InvalidOrigin(origin.to_string()));
    }
    Ok(slug)
}

/// 템플릿에서 엔드포인트 주소를 만듭니다.
pub fn endpoint_for(template: &str, slug: &str) -> String {
    template.replace("{slug}", slug)
}
