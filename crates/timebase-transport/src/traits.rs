//! 프로바이더 전송 trait 정의.

use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use timebase_core::{CapabilityDescriptor, Provider, StreamControl, SymbolInfo, TimeSeriesPoint};

use crate::error::TransportResult;
use crate::protocol::HistoricalRequest;

/// 실시간 포인트 스트림.
pub type PointStream = BoxStream<'static, TransportResult<TimeSeriesPoint>>;

/// 프로바이더와의 통신 인터페이스.
///
/// 카탈로그, 코디네이터, 멀티플렉서는 이 trait에만 의존하므로
/// 테스트에서는 스텁 구현으로 교체할 수 있습니다.
#[async_trait]
pub trait ProviderTransport: Send + Sync {
    /// 과거 데이터를 모두 받아 반환합니다.
    ///
    /// 프로바이더를 사용할 수 없으면 빈 목록을 반환합니다.
    async fn fetch_historical(
        &self,
        provider: &Provider,
        request: &HistoricalRequest,
    ) -> TransportResult<Vec<TimeSeriesPoint>>;

    /// capability를 조회합니다. 사용할 수 없으면 `None`.
    async fn fetch_capabilities(
        &self,
        provider: &Provider,
    ) -> TransportResult<Option<CapabilityDescriptor>>;

    /// 헬스 체크. 어떤 실패든 `false`입니다.
    async fn check_health(&self, provider: &Provider) -> bool;

    /// 심볼 목록을 조회합니다. 사용할 수 없으면 빈 목록.
    async fn fetch_symbols(&self, provider: &Provider) -> TransportResult<Vec<SymbolInfo>>;

    /// 양방향 실시간 스트림을 엽니다.
    ///
    /// `control`로 들어오는 메시지는 송신 방향으로 전달됩니다.
    /// `control`이 닫히면 송신 방향만 닫히고, `cancel`이 트리거되면 양방향 모두 닫힙니다.
    async fn open_realtime_stream(
        &self,
        provider: &Provider,
        control: mpsc::UnboundedReceiver<StreamControl>,
        cancel: CancellationToken,
    ) -> TransportResult<PointStream>;
}
