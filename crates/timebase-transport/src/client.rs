//! 프로바이더 클라이언트.
//!
//! `ProviderTransport`의 WebSocket 구현입니다. 엔드포인트별 연결은
//! `ConnectionPool`이 재사용하며, "사용 불가"는 빈 결과로 대체됩니다.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

use timebase_core::{
    CapabilityDescriptor, HealthReport, Provider, StreamControl, SymbolInfo, TimeSeriesPoint,
    TransportConfig,
};

use crate::connection::Call;
use crate::error::{TransportError, TransportResult};
use crate::pool::ConnectionPool;
use crate::protocol::{ClientMessage, HistoricalRequest, ProviderMessage};
use crate::traits::{PointStream, ProviderTransport};

/// WebSocket 기반 프로바이더 클라이언트.
pub struct ProviderClient {
    pool: ConnectionPool,
    health_timeout: Duration,
}

impl ProviderClient {
    /// 설정으로 클라이언트를 생성합니다.
    pub fn new(config: &TransportConfig) -> Self {
        Self::with_timeouts(config.connect_timeout(), config.health_timeout())
    }

    pub fn with_timeouts(connect_timeout: Duration, health_timeout: Duration) -> Self {
        Self {
            pool: ConnectionPool::new(connect_timeout),
            health_timeout,
        }
    }

    /// 연결 풀 참조.
    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    async fn open_call(&self, provider: &Provider) -> TransportResult<Call> {
        let conn = self.pool.get(&provider.endpoint).await?;
        conn.open_call()
    }

    /// 단일 응답을 기대하는 호출.
    async fn unary(&self, provider: &Provider, request: ClientMessage) -> TransportResult<ProviderMessage> {
        let mut call = self.open_call(provider).await?;
        call.send(&request)?;
        call.recv().await
    }

    async fn collect_historical(
        &self,
        provider: &Provider,
        request: &HistoricalRequest,
    ) -> TransportResult<Vec<TimeSeriesPoint>> {
        let mut call = self.open_call(provider).await?;
        call.send(&ClientMessage::GetHistoricalData(request.clone()))?;

        let mut points = Vec::new();
        loop {
            match call.recv().await? {
                ProviderMessage::Data { point } => points.push(point.into_point(provider.id)),
                ProviderMessage::End => break,
                other => return Err(unexpected(&other)),
            }
        }
        Ok(points)
    }

    async fn health(&self, provider: &Provider) -> TransportResult<HealthReport> {
        match self.unary(provider, ClientMessage::HealthCheck).await? {
            ProviderMessage::Health(report) => Ok(report),
            other => Err(unexpected(&other)),
        }
    }

    /// 헬스 리포트를 데드라인 안에서 조회합니다. 초과 시 `Timeout`.
    pub async fn health_report(&self, provider: &Provider) -> TransportResult<HealthReport> {
        tokio::time::timeout(self.health_timeout, self.health(provider))
            .await
            .map_err(|_| {
                TransportError::Timeout(format!(
                    "health check exceeded {}ms",
                    self.health_timeout.as_millis()
                ))
            })?
    }
}

fn unexpected(message: &ProviderMessage) -> TransportError {
    TransportError::Protocol(format!("unexpected message: {}", message.kind()))
}

/// "사용 불가"를 기본값으로 대체합니다. 그 외 에러는 그대로 전파.
fn soften<T: Default>(
    result: TransportResult<T>,
    provider: &Provider,
    operation: &str,
) -> TransportResult<T> {
    match result {
        Err(e) if e.is_unavailable() => {
            warn!(
                provider = %provider.slug,
                operation = operation,
                error = %e,
                "프로바이더 사용 불가, 빈 결과 반환"
            );
            Ok(T::default())
        }
        other => other,
    }
}

#[async_trait]
impl ProviderTransport for ProviderClient {
    async fn fetch_historical(
        &self,
        provider: &Provider,
        request: &HistoricalRequest,
    ) -> TransportResult<Vec<TimeSeriesPoint>> {
        let result = self.collect_historical(provider, request).await;
        if let Ok(points) = &result {
            debug!(
                provider = %provider.slug,
                symbol = %request.symbol,
                interval = %request.interval,
                count = points.len(),
                "과거 데이터 수신 완료"
            );
        }
        soften(result, provider, "fetch_historical")
    }

    async fn fetch_capabilities(
        &self,
        provider: &Provider,
    ) -> TransportResult<Option<CapabilityDescriptor>> {
        let result = match self.unary(provider, ClientMessage::GetCapabilities).await {
            Ok(ProviderMessage::Capabilities(caps)) => Ok(Some(caps)),
            Ok(other) => Err(unexpected(&other)),
            Err(e) => Err(e),
        };
        soften(result, provider, "fetch_capabilities")
    }

    async fn check_health(&self, provider: &Provider) -> bool {
        match self.health_report(provider).await {
            Ok(report) => {
                debug!(provider = %provider.slug, status = ?report.status, "헬스 체크 응답");
                report.is_serving()
            }
            Err(e) => {
                debug!(provider = %provider.slug, kind = e.kind(), error = %e, "헬스 체크 실패");
                false
            }
        }
    }

    async fn fetch_symbols(&self, provider: &Provider) -> TransportResult<Vec<SymbolInfo>> {
        let result = match self.unary(provider, ClientMessage::GetSymbols).await {
            Ok(ProviderMessage::Symbols { symbols }) => Ok(symbols),
            Ok(other) => Err(unexpected(&other)),
            Err(e) => Err(e),
        };
        soften(result, provider, "fetch_symbols")
    }

    async fn open_realtime_stream(
        &self,
        provider: &Provider,
        mut control: mpsc::UnboundedReceiver<StreamControl>,
        cancel: CancellationToken,
    ) -> TransportResult<PointStream> {
        let call = self.open_call(provider).await?;
        call.send(&ClientMessage::StreamOpen)?;
        info!(provider = %provider.slug, call_id = call.id(), "실시간 스트림 열림");

        // 수신 스트림이 끝나거나 drop되면 forwarder도 정리됨
        let stream_token = cancel.child_token();

        let sender = call.sender();
        let forward_token = stream_token.clone();
        let slug = provider.slug.clone();
        tokio::spawn(async move {
            let mut half_closed = false;
            loop {
                tokio::select! {
                    _ = forward_token.cancelled() => {
                        let _ = sender.send(&ClientMessage::Cancel);
                        break;
                    }
                    msg = control.recv(), if !half_closed => match msg {
                        Some(msg) => {
                            debug!(
                                provider = %slug,
                                action = ?msg.action,
                                symbol = %msg.symbol,
                                interval = %msg.interval,
                                "스트림 제어 메시지 전달"
                            );
                            if let Err(e) = sender.send(&ClientMessage::StreamControl(msg)) {
                                warn!(provider = %slug, error = %e, "스트림 제어 메시지 전송 실패");
                                break;
                            }
                        }
                        None => {
                            let _ = sender.send(&ClientMessage::StreamClose);
                            half_closed = true;
                        }
                    },
                }
            }
            debug!(provider = %slug, "스트림 forwarder 종료");
        });

        let state = RealtimeState {
            call,
            token: stream_token.clone(),
            _guard: stream_token.drop_guard(),
            provider_id: provider.id,
        };

        let stream = futures::stream::unfold(Some(state), |state| async move {
            let mut state = state?;
            loop {
                let next = tokio::select! {
                    _ = state.token.cancelled() => return None,
                    next = state.call.recv() => next,
                };
                match next {
                    Ok(ProviderMessage::Data { point }) => {
                        let point = point.into_point(state.provider_id);
                        return Some((Ok(point), Some(state)));
                    }
                    Ok(ProviderMessage::End) => return None,
                    Ok(other) => debug!(kind = other.kind(), "스트림에서 예상하지 못한 메시지 무시"),
                    Err(e) => return Some((Err(e), None)),
                }
            }
        });

        Ok(stream.boxed())
    }
}

struct RealtimeState {
    call: Call,
    token: CancellationToken,
    _guard: DropGuard,
    provider_id: Uuid,
}
