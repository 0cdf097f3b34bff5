//! 프로바이더 카탈로그.
//!
//! 등록된 프로바이더의 식별 정보, 활성화 여부, capability 캐시를 관리합니다.
//! capability는 `refresh_capabilities` 호출 시에만 갱신되며 자동 만료되지 않습니다.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use timebase_core::telemetry;
use timebase_core::{
    derive_slug, endpoint_for, CapabilityDescriptor, CatalogConfig, Provider, SymbolInfo,
};
use timebase_transport::ProviderTransport;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::error::{DataError, Result};
use crate::storage::ProviderStore;

/// 프로바이더별 심볼 정보.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderSymbol {
    /// 프로바이더 slug
    pub provider: String,
    #[serde(flatten)]
    pub symbol: SymbolInfo,
}

/// 프로바이더 카탈로그.
pub struct ProviderCatalog {
    store: Arc<dyn ProviderStore>,
    transport: Arc<dyn ProviderTransport>,
    endpoint_template: String,
}

impl ProviderCatalog {
    pub fn new(
        store: Arc<dyn ProviderStore>,
        transport: Arc<dyn ProviderTransport>,
        config: &CatalogConfig,
    ) -> Self {
        Self {
            store,
            transport,
            endpoint_template: config.endpoint_template.clone(),
        }
    }

    /// origin으로 프로바이더를 등록합니다.
    ///
    /// 같은 origin이 이미 있으면 기존 레코드를 반환합니다.
    /// 엔드포인트는 slug로 템플릿에서 도출됩니다.
    pub async fn register(&self, origin: &str) -> Result<Provider> {
        self.install(origin, None).await
    }

    /// 엔드포인트를 직접 지정하여 등록합니다.
    pub async fn register_at(&self, origin: &str, endpoint: &str) -> Result<Provider> {
        self.install(origin, Some(endpoint)).await
    }

    #[instrument(skip(self))]
    async fn install(&self, origin: &str, endpoint: Option<&str>) -> Result<Provider> {
        if let Some(existing) = self.store.provider_by_origin(origin).await? {
            debug!(slug = %existing.slug, "이미 등록된 origin");
            telemetry::record_install_attempt(&existing.slug, "existing");
            return Ok(existing);
        }

        let slug = derive_slug(origin)?;
        let endpoint = endpoint
            .map(str::to_string)
            .unwrap_or_else(|| endpoint_for(&self.endpoint_template, &slug));
        let provider = Provider::new(slug, origin, endpoint);

        if let Err(e) = self.store.insert_provider(&provider).await {
            // 동시 등록에서 진 쪽: 같은 origin이 먼저 들어갔으면 그 레코드를 반환
            if matches!(e, DataError::DuplicateError(_)) {
                if let Some(existing) = self.store.provider_by_origin(origin).await? {
                    debug!(slug = %existing.slug, "동시 등록, 기존 레코드 반환");
                    telemetry::record_install_attempt(&existing.slug, "existing");
                    return Ok(existing);
                }
            }
            error!(slug = %provider.slug, error = %e, "프로바이더 등록 실패");
            telemetry::record_install_attempt(&provider.slug, "failed");
            telemetry::record_error("register", e.kind());
            return Err(e);
        }

        telemetry::record_install_attempt(&provider.slug, "created");
        telemetry::adjust_active_providers(1);
        info!(
            provider_id = %provider.id,
            slug = %provider.slug,
            endpoint = %provider.endpoint,
            "프로바이더 등록"
        );

        Ok(provider)
    }

    /// 프로바이더 목록 (생성 시각 오름차순).
    pub async fn list(&self, enabled: Option<bool>) -> Result<Vec<Provider>> {
        self.store.list_providers(enabled).await
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<Provider>> {
        self.store.provider_by_id(id).await
    }

    pub async fn get_by_slug(&self, slug: &str) -> Result<Option<Provider>> {
        self.store.provider_by_slug(slug).await
    }

    /// 활성화 여부를 변경합니다.
    ///
    /// 값이 실제로 바뀔 때만 활성 프로바이더 메트릭이 변합니다.
    #[instrument(skip(self))]
    pub async fn set_enabled(&self, id: Uuid, enabled: bool) -> Result<Option<Provider>> {
        let Some(mut provider) = self.store.provider_by_id(id).await? else {
            return Ok(None);
        };

        if provider.enabled != enabled {
            provider.enabled = enabled;
            provider.updated_at = Utc::now();
            self.store.update_provider(&provider).await?;
            telemetry::adjust_active_providers(if enabled { 1 } else { -1 });
            info!(slug = %provider.slug, enabled, "프로바이더 활성화 상태 변경");
        }

        Ok(Some(provider))
    }

    /// 프로바이더를 제거합니다.
    #[instrument(skip(self))]
    pub async fn remove(&self, id: Uuid) -> Result<bool> {
        let existing = self.store.provider_by_id(id).await?;
        let removed = match self.store.delete_provider(id).await {
            Ok(removed) => removed,
            Err(e) => {
                telemetry::record_uninstall_attempt("failed");
                telemetry::record_error("remove", e.kind());
                return Err(e);
            }
        };

        if removed {
            telemetry::record_uninstall_attempt("removed");
            if existing.as_ref().is_some_and(|p| p.enabled) {
                telemetry::adjust_active_providers(-1);
            }
            info!(provider_id = %id, "프로바이더 제거");
        } else {
            telemetry::record_uninstall_attempt("not_found");
        }

        Ok(removed)
    }

    /// capability를 다시 조회하여 캐시를 덮어씁니다.
    ///
    /// 프로바이더를 사용할 수 없으면 기존 레코드를 그대로 반환합니다.
    #[instrument(skip(self))]
    pub async fn refresh_capabilities(&self, id: Uuid) -> Result<Option<Provider>> {
        let Some(mut provider) = self.store.provider_by_id(id).await? else {
            return Ok(None);
        };

        let caps = match self.transport.fetch_capabilities(&provider).await {
            Ok(Some(caps)) => caps,
            Ok(None) => {
                warn!(slug = %provider.slug, "capability 조회 불가, 기존 값 유지");
                return Ok(Some(provider));
            }
            Err(e) => {
                error!(slug = %provider.slug, error = %e, "capability 조회 실패");
                telemetry::record_error("refresh_capabilities", e.kind());
                return Err(e.into());
            }
        };

        provider.capabilities = Some(serde_json::to_string(&caps)?);
        provider.name = caps.name.clone();
        provider.version = caps.version.clone();
        provider.updated_at = Utc::now();
        self.store.update_provider(&provider).await?;

        info!(
            slug = %provider.slug,
            name = %provider.name,
            version = %provider.version,
            realtime = caps.supports_realtime,
            "capability 갱신"
        );

        Ok(Some(provider))
    }

    /// 활성화된 모든 프로바이더의 capability를 순차적으로 갱신합니다.
    ///
    /// 한 프로바이더의 실패는 기록 후 건너뜁니다.
    pub async fn refresh_all(&self) -> Result<Vec<Provider>> {
        let providers = self.store.list_providers(Some(true)).await?;
        let mut refreshed = Vec::with_capacity(providers.len());

        for provider in providers {
            match self.refresh_capabilities(provider.id).await {
                Ok(Some(updated)) => refreshed.push(updated),
                Ok(None) => {}
                Err(e) => warn!(slug = %provider.slug, error = %e, "capability 갱신 건너뜀"),
            }
        }

        Ok(refreshed)
    }

    /// 캐시된 capability. 없거나 손상되었으면 `None`.
    pub fn cached_capabilities(&self, provider: &Provider) -> Option<CapabilityDescriptor> {
        if provider.capabilities.is_some() && provider.cached_capabilities().is_none() {
            warn!(slug = %provider.slug, "손상된 capability 캐시");
        }
        provider.cached_capabilities()
    }

    /// 활성화된 모든 프로바이더의 심볼 목록.
    ///
    /// 응답하지 않는 프로바이더는 결과에 포함되지 않습니다.
    pub async fn get_all_symbols(&self) -> Result<Vec<ProviderSymbol>> {
        let providers = self.store.list_providers(Some(true)).await?;
        let mut symbols = Vec::new();

        for provider in providers {
            match self.transport.fetch_symbols(&provider).await {
                Ok(list) => symbols.extend(list.into_iter().map(|symbol| ProviderSymbol {
                    provider: provider.slug.clone(),
                    symbol,
                })),
                Err(e) => {
                    warn!(slug = %provider.slug, error = %e, "심볼 목록 조회 실패");
                    telemetry::record_error("get_symbols", e.kind());
                }
            }
        }

        Ok(symbols)
    }

    /// 실시간 스트리밍을 지원하는 활성 프로바이더.
    pub async fn realtime_providers(&self) -> Result<Vec<Provider>> {
        Ok(self
            .store
            .list_providers(Some(true))
            .await?
            .into_iter()
            .filter(Provider::supports_realtime)
            .collect())
    }

    /// 활성 프로바이더 메트릭을 저장소 상태와 맞춥니다.
    pub async fn sync_metrics(&self) -> Result<usize> {
        let active = self.store.list_providers(Some(true)).await?.len();
        telemetry::set_active_providers(active);
        Ok(active)
    }
}
