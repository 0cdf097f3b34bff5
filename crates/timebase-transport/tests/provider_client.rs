//! 인프로세스 가짜 프로바이더를 상대로 한 ProviderClient 통합 테스트.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{TimeZone, Utc};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::{accept_async, tungstenite::protocol::Message};
use tokio_util::sync::CancellationToken;

use timebase_core::{
    CapabilityDescriptor, HealthReport, HealthStatus, Provider, StreamAction, StreamControl,
    SubscriptionKey, SymbolInfo,
};
use timebase_transport::{
    ClientMessage, Envelope, HistoricalRequest, ProviderClient, ProviderMessage,
    ProviderTransport, TransportError, WirePoint,
};

/// 가짜 프로바이더 동작 옵션.
#[derive(Clone, Copy, Default)]
struct Behavior {
    slow_health: bool,
}

struct FakeProvider {
    endpoint: String,
    connections: Arc<AtomicUsize>,
    received: Arc<Mutex<Vec<ClientMessage>>>,
}

impl FakeProvider {
    async fn start(behavior: Behavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connections = Arc::new(AtomicUsize::new(0));
        let received = Arc::new(Mutex::new(Vec::new()));

        let conn_counter = Arc::clone(&connections);
        let log = Arc::clone(&received);
        tokio::spawn(async move {
            while let Ok((tcp, _)) = listener.accept().await {
                conn_counter.fetch_add(1, Ordering::SeqCst);
                let log = Arc::clone(&log);
                tokio::spawn(async move {
                    let Ok(ws) = accept_async(tcp).await else {
                        return;
                    };
                    serve(ws, behavior, log).await;
                });
            }
        });

        Self {
            endpoint: format!("ws://{}", addr),
            connections,
            received,
        }
    }

    fn provider(&self) -> Provider {
        Provider::new("fake", "https://github.com/acme/timebase-provider-fake", &self.endpoint)
    }

    fn received(&self) -> Vec<ClientMessage> {
        self.received.lock().unwrap().clone()
    }
}

async fn serve(
    ws: tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
    behavior: Behavior,
    log: Arc<Mutex<Vec<ClientMessage>>>,
) {
    let (mut sink, mut stream) = ws.split();

    while let Some(Ok(frame)) = stream.next().await {
        let Message::Text(text) = frame else {
            continue;
        };
        let envelope: Envelope<ClientMessage> = serde_json::from_str(&text).unwrap();
        log.lock().unwrap().push(envelope.message.clone());

        let replies = match envelope.message {
            ClientMessage::GetCapabilities => vec![ProviderMessage::Capabilities(capabilities())],
            ClientMessage::GetHistoricalData(request) => historical(&request),
            ClientMessage::HealthCheck => {
                if behavior.slow_health {
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
                vec![ProviderMessage::Health(HealthReport {
                    status: HealthStatus::Degraded,
                    message: "warming up".to_string(),
                    timestamp: Utc::now(),
                })]
            }
            ClientMessage::GetSymbols => vec![ProviderMessage::Symbols {
                symbols: vec![SymbolInfo {
                    symbol: "AAPL".to_string(),
                    name: "Apple Inc.".to_string(),
                    asset_type: "stock".to_string(),
                    intervals: vec!["1d".to_string()],
                    metadata: HashMap::new(),
                }],
            }],
            ClientMessage::StreamControl(control) if control.action == StreamAction::Subscribe => {
                vec![ProviderMessage::Data {
                    point: wire_point(&control.symbol, &control.interval, 0),
                }]
            }
            _ => Vec::new(),
        };

        for reply in replies {
            let text = serde_json::to_string(&Envelope {
                id: envelope.id,
                message: reply,
            })
            .unwrap();
            if sink.send(Message::Text(text)).await.is_err() {
                return;
            }
        }
    }
}

fn capabilities() -> CapabilityDescriptor {
    CapabilityDescriptor {
        name: "Fake Provider".to_string(),
        version: "0.3.1".to_string(),
        slug: Some("fake".to_string()),
        supports_historical: true,
        supports_realtime: true,
        supports_backfill: false,
        data_types: BTreeSet::from(["stocks".to_string()]),
        intervals: BTreeSet::from(["1m".to_string(), "1d".to_string()]),
        rate_limits: HashMap::new(),
        max_lookback_days: Some(365),
    }
}

fn historical(request: &HistoricalRequest) -> Vec<ProviderMessage> {
    match request.symbol.as_str() {
        "BOOM" => vec![ProviderMessage::Error {
            code: "INTERNAL".to_string(),
            message: "upstream exploded".to_string(),
        }],
        "DOWN" => vec![ProviderMessage::Error {
            code: "UNAVAILABLE".to_string(),
            message: "upstream offline".to_string(),
        }],
        symbol => {
            let mut replies: Vec<ProviderMessage> = (0..3)
                .map(|i| ProviderMessage::Data {
                    point: wire_point(symbol, &request.interval, i),
                })
                .collect();
            replies.push(ProviderMessage::End);
            replies
        }
    }
}

fn wire_point(symbol: &str, interval: &str, day: u32) -> WirePoint {
    WirePoint {
        symbol: symbol.to_string(),
        timestamp: Utc.with_ymd_and_hms(2024, 1, 2 + day, 0, 0, 0).unwrap(),
        open: 100.0,
        // 역전된 OHLC도 그대로 전달되어야 함
        high: 99.0,
        low: 101.0,
        close: 100.5,
        volume: 1_000.0,
        interval: interval.to_string(),
        provider: Some("fake".to_string()),
        metadata: None,
    }
}

fn client() -> ProviderClient {
    ProviderClient::with_timeouts(Duration::from_secs(2), Duration::from_millis(300))
}

fn request(symbol: &str) -> HistoricalRequest {
    HistoricalRequest::new(
        symbol,
        "1d",
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2024, 1, 31, 0, 0, 0).unwrap(),
    )
}

#[tokio::test]
async fn test_capabilities_roundtrip() {
    let fake = FakeProvider::start(Behavior::default()).await;
    let caps = client()
        .fetch_capabilities(&fake.provider())
        .await
        .unwrap()
        .expect("capabilities");

    assert_eq!(caps.name, "Fake Provider");
    assert_eq!(caps.version, "0.3.1");
    assert!(caps.supports_realtime);
    assert_eq!(caps.max_lookback_days, Some(365));
}

#[tokio::test]
async fn test_historical_accumulates_until_end() {
    let fake = FakeProvider::start(Behavior::default()).await;
    let provider = fake.provider();

    let points = client().fetch_historical(&provider, &request("AAPL")).await.unwrap();

    assert_eq!(points.len(), 3);
    assert!(points.iter().all(|p| p.provider_id == provider.id));
    assert!(points.iter().all(|p| p.symbol == "AAPL" && p.interval == "1d"));
    assert_eq!(points[0].high, 99.0);
    assert_eq!(points[0].low, 101.0);
}

#[tokio::test]
async fn test_remote_errors() {
    let fake = FakeProvider::start(Behavior::default()).await;
    let provider = fake.provider();
    let client = client();

    let err = client
        .fetch_historical(&provider, &request("BOOM"))
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::Remote { ref code, .. } if code == "INTERNAL"));

    let points = client.fetch_historical(&provider, &request("DOWN")).await.unwrap();
    assert!(points.is_empty());
}

#[tokio::test]
async fn test_unreachable_endpoint_is_soft() {
    let provider = Provider::new("ghost", "https://github.com/acme/ghost", "ws://127.0.0.1:1");
    let client = client();

    assert!(client.fetch_historical(&provider, &request("AAPL")).await.unwrap().is_empty());
    assert!(client.fetch_capabilities(&provider).await.unwrap().is_none());
    assert!(client.fetch_symbols(&provider).await.unwrap().is_empty());
    assert!(!client.check_health(&provider).await);
}

#[tokio::test]
async fn test_health_degraded_counts_as_healthy() {
    let fake = FakeProvider::start(Behavior::default()).await;
    assert!(client().check_health(&fake.provider()).await);
}

#[tokio::test]
async fn test_health_deadline() {
    let fake = FakeProvider::start(Behavior { slow_health: true }).await;

    let started = std::time::Instant::now();
    let healthy = client().check_health(&fake.provider()).await;

    assert!(!healthy);
    assert!(started.elapsed() < Duration::from_secs(2));

    let err = client().health_report(&fake.provider()).await.unwrap_err();
    assert!(matches!(err, TransportError::Timeout(_)));
}

#[tokio::test]
async fn test_fetch_symbols() {
    let fake = FakeProvider::start(Behavior::default()).await;
    let symbols = client().fetch_symbols(&fake.provider()).await.unwrap();
    assert_eq!(symbols.len(), 1);
    assert_eq!(symbols[0].asset_type, "stock");
}

#[tokio::test]
async fn test_single_connection_under_concurrent_first_use() {
    let fake = FakeProvider::start(Behavior::default()).await;
    let provider = fake.provider();
    let client = client();

    let calls = (0..8).map(|_| client.fetch_capabilities(&provider));
    let results = futures::future::join_all(calls).await;

    assert!(results.iter().all(|r| matches!(r, Ok(Some(_)))));
    assert_eq!(fake.connections.load(Ordering::SeqCst), 1);
    assert_eq!(client.pool().open_connections(), 1);
}

#[tokio::test]
async fn test_closed_connection_is_replaced() {
    let fake = FakeProvider::start(Behavior::default()).await;
    let provider = fake.provider();
    let client = client();

    assert!(client.check_health(&provider).await);
    client.pool().get(&provider.endpoint).await.unwrap().close();

    assert!(client.check_health(&provider).await);
    assert_eq!(fake.connections.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_realtime_control_forwarding() {
    let fake = FakeProvider::start(Behavior::default()).await;
    let provider = fake.provider();
    let client = client();

    let (control_tx, control_rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let mut stream = client
        .open_realtime_stream(&provider, control_rx, cancel.clone())
        .await
        .unwrap();

    control_tx
        .send(StreamControl::subscribe(&SubscriptionKey::new("MSFT", "1m")))
        .unwrap();

    let point = tokio::time::timeout(Duration::from_secs(2), stream.next())
        .await
        .expect("point within deadline")
        .expect("stream open")
        .unwrap();
    assert_eq!(point.symbol, "MSFT");
    assert_eq!(point.provider_id, provider.id);

    // control 닫힘 → 송신 방향만 종료
    drop(control_tx);
    wait_for(&fake, |m| matches!(m, ClientMessage::StreamClose)).await;

    cancel.cancel();
    let end = tokio::time::timeout(Duration::from_secs(2), stream.next())
        .await
        .expect("stream ends after cancel");
    assert!(end.is_none());
    wait_for(&fake, |m| matches!(m, ClientMessage::Cancel)).await;

    let received = fake.received();
    assert!(matches!(received[0], ClientMessage::StreamOpen));
    assert!(received.iter().any(|m| matches!(
        m,
        ClientMessage::StreamControl(c) if c.action == StreamAction::Subscribe && c.symbol == "MSFT"
    )));
}

async fn wait_for(fake: &FakeProvider, predicate: impl Fn(&ClientMessage) -> bool) {
    for _ in 0..100 {
        if fake.received().iter().any(&predicate) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("message not received by fake provider");
}
