//! 실시간 구독 멀티플렉서.
//!
//! 다운스트림의 (symbol, interval) 구독을 프로바이더별 참조 카운트로 관리하고,
//! 프로바이더마다 하나의 업스트림 스트림만 유지합니다.
//!
//! # 동작 방식
//!
//! - 모든 구독/해제 요청은 하나의 순서 보장 큐에 들어가고, 단일 워커가 직렬로 처리합니다.
//! - 카운트가 0 → 1이 되면 스트림 컨텍스트를 보장하고 `subscribe` 제어 메시지를 보냅니다.
//! - 카운트가 0이 되면 항목을 제거하고 `unsubscribe` 제어 메시지를 보냅니다.
//! - 스트림이 끝난 프로바이더에 새 컨텍스트가 생기면 남은 키를 모두 다시 구독합니다.
//! - 마지막 키가 해제된 스트림은 유휴 시간이 지나면 닫습니다 (설정 시).

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::StreamExt;
use timebase_core::telemetry;
use timebase_core::{Provider, StreamControl, StreamingConfig, SubscriptionKey};
use timebase_data::ProviderCatalog;
use timebase_transport::ProviderTransport;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

use super::broadcaster::Broadcaster;

/// 멀티플렉서 설정.
#[derive(Debug, Clone)]
pub struct MultiplexerConfig {
    /// 첫 요청 처리 전 대기 시간
    pub warmup: Duration,
    /// 유휴 스트림 종료 시간 (`None`이면 계속 유지)
    pub idle_teardown: Option<Duration>,
    /// 유휴 스트림 점검 주기
    pub idle_check: Duration,
}

impl Default for MultiplexerConfig {
    fn default() -> Self {
        Self::from(&StreamingConfig::default())
    }
}

impl From<&StreamingConfig> for MultiplexerConfig {
    fn from(config: &StreamingConfig) -> Self {
        Self {
            warmup: config.warmup(),
            idle_teardown: config.idle_teardown(),
            idle_check: config.idle_check(),
        }
    }
}

/// 구독 상태 스냅샷.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultiplexerSnapshot {
    /// 프로바이더별 키 참조 카운트
    pub counts: BTreeMap<Uuid, BTreeMap<SubscriptionKey, usize>>,
    /// 업스트림 스트림이 열린 프로바이더
    pub streams: BTreeSet<Uuid>,
}

impl MultiplexerSnapshot {
    /// 프로바이더의 키 카운트. 없으면 0.
    pub fn count(&self, provider_id: Uuid, key: &SubscriptionKey) -> usize {
        self.counts
            .get(&provider_id)
            .and_then(|keys| keys.get(key))
            .copied()
            .unwrap_or(0)
    }
}

enum Intent {
    Subscribe(SubscriptionKey),
    Unsubscribe(SubscriptionKey),
    Snapshot(oneshot::Sender<MultiplexerSnapshot>),
}

/// 스트림 멀티플렉서 핸들.
pub struct StreamMultiplexer {
    intents: mpsc::UnboundedSender<Intent>,
    cancel: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl StreamMultiplexer {
    /// 워커를 시작합니다.
    ///
    /// `shutdown`이 취소되면 워커와 모든 업스트림 스트림이 종료됩니다.
    pub fn start(
        catalog: Arc<ProviderCatalog>,
        transport: Arc<dyn ProviderTransport>,
        broadcaster: Arc<Broadcaster>,
        config: MultiplexerConfig,
        shutdown: &CancellationToken,
    ) -> Self {
        let (intents, rx) = mpsc::unbounded_channel();
        let cancel = shutdown.child_token();

        let worker = Worker {
            catalog,
            transport,
            broadcaster,
            config,
            cancel: cancel.clone(),
            counts: HashMap::new(),
            contexts: Arc::new(Mutex::new(HashMap::new())),
            idle_since: HashMap::new(),
            next_generation: 0,
            tracker: TaskTracker::new(),
        };
        let handle = tokio::spawn(worker.run(rx));

        Self {
            intents,
            cancel,
            worker: Mutex::new(Some(handle)),
        }
    }

    /// 구독 요청을 큐에 넣습니다. 워커가 종료되었으면 `false`.
    pub fn subscribe(&self, symbol: &str, interval: &str) -> bool {
        self.enqueue(Intent::Subscribe(SubscriptionKey::new(symbol, interval)))
    }

    /// 구독 해제 요청을 큐에 넣습니다. 워커가 종료되었으면 `false`.
    pub fn unsubscribe(&self, symbol: &str, interval: &str) -> bool {
        self.enqueue(Intent::Unsubscribe(SubscriptionKey::new(symbol, interval)))
    }

    /// 앞선 요청이 모두 처리된 뒤의 상태를 반환합니다.
    ///
    /// 워커가 종료되었으면 `None`.
    pub async fn snapshot(&self) -> Option<MultiplexerSnapshot> {
        let (tx, rx) = oneshot::channel();
        if !self.enqueue(Intent::Snapshot(tx)) {
            return None;
        }
        rx.await.ok()
    }

    /// 워커와 모든 업스트림 스트림을 종료하고 완료를 기다립니다.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(error = %e, "멀티플렉서 워커 비정상 종료");
            }
        }
    }

    fn enqueue(&self, intent: Intent) -> bool {
        if self.intents.send(intent).is_err() {
            warn!("멀티플렉서가 종료되어 요청을 처리할 수 없음");
            return false;
        }
        true
    }
}

impl Drop for StreamMultiplexer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// 프로바이더별 업스트림 스트림 상태.
struct StreamContext {
    control: mpsc::UnboundedSender<StreamControl>,
    cancel: CancellationToken,
    generation: u64,
}

type Contexts = Arc<Mutex<HashMap<Uuid, StreamContext>>>;

fn lock_contexts(contexts: &Contexts) -> MutexGuard<'_, HashMap<Uuid, StreamContext>> {
    contexts.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Worker {
    catalog: Arc<ProviderCatalog>,
    transport: Arc<dyn ProviderTransport>,
    broadcaster: Arc<Broadcaster>,
    config: MultiplexerConfig,
    cancel: CancellationToken,
    counts: HashMap<Uuid, BTreeMap<SubscriptionKey, usize>>,
    contexts: Contexts,
    idle_since: HashMap<Uuid, Instant>,
    next_generation: u64,
    tracker: TaskTracker,
}

impl Worker {
    async fn run(mut self, mut intents: mpsc::UnboundedReceiver<Intent>) {
        info!(
            warmup_secs = self.config.warmup.as_secs(),
            idle_teardown_secs = self.config.idle_teardown.map(|d| d.as_secs()),
            "스트림 멀티플렉서 시작"
        );

        let cancel = self.cancel.clone();

        tokio::select! {
            _ = tokio::time::sleep(self.config.warmup) => {}
            _ = cancel.cancelled() => {
                info!("스트림 멀티플렉서: 종료 시그널 수신 (초기화 중)");
                self.shutdown().await;
                return;
            }
        }

        let teardown_enabled = self.config.idle_teardown.is_some();
        let mut idle_tick = tokio::time::interval(self.config.idle_check);
        idle_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("스트림 멀티플렉서: 종료 시그널 수신, 정리 중...");
                    break;
                }
                intent = intents.recv() => match intent {
                    Some(intent) => self.handle(intent).await,
                    None => break,
                },
                _ = idle_tick.tick(), if teardown_enabled => self.teardown_idle(),
            }
        }

        self.shutdown().await;
    }

    async fn handle(&mut self, intent: Intent) {
        match intent {
            Intent::Subscribe(key) => self.subscribe(key).await,
            Intent::Unsubscribe(key) => self.unsubscribe(key),
            Intent::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    async fn subscribe(&mut self, key: SubscriptionKey) {
        let providers = match self.catalog.realtime_providers().await {
            Ok(providers) => providers,
            Err(e) => {
                error!(key = %key, error = %e, "실시간 프로바이더 조회 실패");
                telemetry::record_error("subscribe", e.kind());
                return;
            }
        };

        if providers.is_empty() {
            debug!(key = %key, "실시간 프로바이더 없음");
        }

        for provider in providers {
            let count = self
                .counts
                .entry(provider.id)
                .or_default()
                .entry(key.clone())
                .or_insert(0);
            *count += 1;
            let first = *count == 1;
            self.idle_since.remove(&provider.id);

            debug!(slug = %provider.slug, key = %key, count = *count, "구독 카운트 증가");

            match self.live_control(provider.id) {
                Some(control) => {
                    if first && control.send(StreamControl::subscribe(&key)).is_err() {
                        // 스트림이 방금 끝남, 새 컨텍스트에서 전체 재구독
                        self.open_stream(&provider);
                    }
                }
                None => self.open_stream(&provider),
            }
        }
    }

    fn unsubscribe(&mut self, key: SubscriptionKey) {
        let provider_ids: Vec<Uuid> = self.counts.keys().copied().collect();
        let mut known = false;

        for provider_id in provider_ids {
            let Some(keys) = self.counts.get_mut(&provider_id) else {
                continue;
            };
            let Some(count) = keys.get_mut(&key) else {
                continue;
            };
            known = true;
            *count -= 1;
            if *count > 0 {
                debug!(provider_id = %provider_id, key = %key, count = *count, "구독 카운트 감소");
                continue;
            }

            keys.remove(&key);
            let idle = keys.is_empty();
            if idle {
                self.counts.remove(&provider_id);
            }

            if let Some(control) = self.live_control(provider_id) {
                let _ = control.send(StreamControl::unsubscribe(&key));
            }
            debug!(provider_id = %provider_id, key = %key, "마지막 구독 해제");

            if idle && self.config.idle_teardown.is_some() {
                self.idle_since.insert(provider_id, Instant::now());
            }
        }

        if !known {
            debug!(key = %key, "알 수 없는 구독 해제 무시");
        }
    }

    /// 살아있는 스트림의 제어 큐.
    fn live_control(&self, provider_id: Uuid) -> Option<mpsc::UnboundedSender<StreamControl>> {
        lock_contexts(&self.contexts)
            .get(&provider_id)
            .filter(|ctx| !ctx.cancel.is_cancelled() && !ctx.control.is_closed())
            .map(|ctx| ctx.control.clone())
    }

    /// 새 스트림 컨텍스트를 만들고 읽기 루프를 시작합니다.
    ///
    /// 카운트가 남아있는 모든 키에 대해 `subscribe`를 먼저 큐에 넣습니다.
    fn open_stream(&mut self, provider: &Provider) {
        let (control, control_rx) = mpsc::unbounded_channel();
        let cancel = self.cancel.child_token();
        self.next_generation += 1;
        let generation = self.next_generation;

        let mut replayed = 0;
        if let Some(keys) = self.counts.get(&provider.id) {
            for key in keys.keys() {
                let _ = control.send(StreamControl::subscribe(key));
                replayed += 1;
            }
        }

        let active = {
            let mut contexts = lock_contexts(&self.contexts);
            let previous = contexts.insert(
                provider.id,
                StreamContext {
                    control,
                    cancel: cancel.clone(),
                    generation,
                },
            );
            if let Some(previous) = previous {
                previous.cancel.cancel();
            }
            contexts.len()
        };
        telemetry::set_active_streams(active);

        info!(slug = %provider.slug, generation, replayed, "업스트림 스트림 컨텍스트 생성");

        let read_loop = ReadLoop {
            provider: provider.clone(),
            transport: Arc::clone(&self.transport),
            broadcaster: Arc::clone(&self.broadcaster),
            contexts: Arc::clone(&self.contexts),
            generation,
            cancel,
        };
        let span = timebase_core::provider_span!("upstream_stream", provider.slug);
        self.tracker.spawn(read_loop.run(control_rx).instrument(span));
    }

    fn teardown_idle(&mut self) {
        let Some(idle_after) = self.config.idle_teardown else {
            return;
        };
        let now = Instant::now();
        let expired: Vec<Uuid> = self
            .idle_since
            .iter()
            .filter(|(_, since)| now.duration_since(**since) >= idle_after)
            .map(|(id, _)| *id)
            .collect();

        for provider_id in expired {
            self.idle_since.remove(&provider_id);
            if self.counts.contains_key(&provider_id) {
                continue;
            }
            let active = {
                let mut contexts = lock_contexts(&self.contexts);
                if let Some(ctx) = contexts.remove(&provider_id) {
                    ctx.cancel.cancel();
                    info!(provider_id = %provider_id, "유휴 업스트림 스트림 종료");
                }
                contexts.len()
            };
            telemetry::set_active_streams(active);
        }
    }

    fn snapshot(&self) -> MultiplexerSnapshot {
        MultiplexerSnapshot {
            counts: self
                .counts
                .iter()
                .map(|(id, keys)| (*id, keys.clone()))
                .collect(),
            streams: lock_contexts(&self.contexts).keys().copied().collect(),
        }
    }

    async fn shutdown(self) {
        let contexts: Vec<StreamContext> = lock_contexts(&self.contexts)
            .drain()
            .map(|(_, ctx)| ctx)
            .collect();
        for ctx in &contexts {
            ctx.cancel.cancel();
        }

        self.tracker.close();
        self.tracker.wait().await;
        telemetry::set_active_streams(0);

        info!(closed = contexts.len(), "스트림 멀티플렉서 종료");
    }
}

/// 프로바이더 하나의 업스트림 읽기 루프.
struct ReadLoop {
    provider: Provider,
    transport: Arc<dyn ProviderTransport>,
    broadcaster: Arc<Broadcaster>,
    contexts: Contexts,
    generation: u64,
    cancel: CancellationToken,
}

impl ReadLoop {
    /// 스트림이 끝날 때까지 포인트를 브로드캐스터로 넘깁니다.
    ///
    /// 종료 시 자신의 세대인 경우에만 컨텍스트를 제거합니다.
    async fn run(self, control_rx: mpsc::UnboundedReceiver<StreamControl>) {
        let slug = self.provider.slug.as_str();

        match self
            .transport
            .open_realtime_stream(&self.provider, control_rx, self.cancel.clone())
            .await
        {
            Ok(mut stream) => {
                debug!(slug, generation = self.generation, "업스트림 스트림 열림");
                loop {
                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => {
                            debug!(slug, "업스트림 스트림 취소");
                            break;
                        }
                        next = stream.next() => match next {
                            Some(Ok(point)) => {
                                self.broadcaster.publish_one(&point);
                            }
                            Some(Err(e)) => {
                                warn!(slug, error = %e, "업스트림 스트림 오류");
                                telemetry::record_error("realtime_stream", e.kind());
                                break;
                            }
                            None => {
                                info!(slug, "프로바이더가 업스트림 스트림을 닫음");
                                break;
                            }
                        }
                    }
                }
            }
            Err(e) => {
                error!(slug, error = %e, "업스트림 스트림 열기 실패");
                telemetry::record_error("open_realtime_stream", e.kind());
            }
        }

        self.cancel.cancel();

        let active = {
            let mut contexts = lock_contexts(&self.contexts);
            if contexts
                .get(&self.provider.id)
                .is_some_and(|ctx| ctx.generation == self.generation)
            {
                contexts.remove(&self.provider.id);
            }
            contexts.len()
        };
        telemetry::set_active_streams(active);
    }
}
