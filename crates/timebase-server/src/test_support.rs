//! 단위 테스트용 전송 스텁.

use async_trait::async_trait;
use timebase_core::{CapabilityDescriptor, Provider, StreamControl, SymbolInfo, TimeSeriesPoint};
use timebase_transport::{
    HistoricalRequest, PointStream, ProviderTransport, TransportError, TransportResult,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// 어떤 프로바이더에도 연결할 수 없는 전송.
pub struct NullTransport;

#[async_trait]
impl ProviderTransport for NullTransport {
    async fn fetch_historical(
        &self,
        _: &Provider,
        _: &HistoricalRequest,
    ) -> TransportResult<Vec<TimeSeriesPoint>> {
        Ok(Vec::new())
    }

    async fn fetch_capabilities(
        &self,
        _: &Provider,
    ) -> TransportResult<Option<CapabilityDescriptor>> {
        Ok(None)
    }

    async fn check_health(&self, _: &Provider) -> bool {
        false
    }

    async fn fetch_symbols(&self, _: &Provider) -> TransportResult<Vec<SymbolInfo>> {
        Ok(Vec::new())
    }

    async fn open_realtime_stream(
        &self,
        _: &Provider,
        _: mpsc::UnboundedReceiver<StreamControl>,
        _: CancellationToken,
    ) -> TransportResult<PointStream> {
        Err(TransportError::Unavailable("no providers".to_string()))
    }
}
