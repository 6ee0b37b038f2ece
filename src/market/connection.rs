use crate::error::AppError;
use crate::market::ledger::{Delivery, SubscriptionChange, SubscriptionLedger};
use crate::market::types::{
    encode_frame, normalize_symbols, parse_frame_action, ConnectionStatus, OutboundFrame,
    ACTION_PONG,
};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async_with_config, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

pub const DEFAULT_RECONNECT_BASE_MS: u64 = 1_000;
pub const DEFAULT_RECONNECT_MAX_MS: u64 = 30_000;
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 30_000;
pub const DEFAULT_HEARTBEAT_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

pub type FeedWsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
pub type FrameHandler = Arc<dyn Fn(FeedFrame) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub url: String,
    pub reconnect_base: Duration,
    pub reconnect_max: Duration,
    pub heartbeat_interval: Duration,
    pub heartbeat_timeout: Duration,
    pub connect_timeout: Duration,
}

impl FeedConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect_base: Duration::from_millis(DEFAULT_RECONNECT_BASE_MS),
            reconnect_max: Duration::from_millis(DEFAULT_RECONNECT_MAX_MS),
            heartbeat_interval: Duration::from_millis(DEFAULT_HEARTBEAT_INTERVAL_MS),
            heartbeat_timeout: Duration::from_millis(DEFAULT_HEARTBEAT_TIMEOUT_MS),
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
        }
    }
}

/// Inbound frame forwarded untouched to the registered handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedFrame {
    text: String,
}

impl FeedFrame {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.text.into_bytes()
    }
}

/// Exponential reconnect delay: `base * 2^n`, capped at `max`.
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    base: Duration,
    max: Duration,
    attempt: u32,
}

impl ReconnectBackoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
            attempt: 0,
        }
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn next_delay(&mut self) -> Duration {
        let factor = 1_u32.checked_shl(self.attempt.min(31)).unwrap_or(u32::MAX);
        let delay = self.base.saturating_mul(factor).min(self.max);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

/// Ping schedule and pong deadline for one physical connection.
#[derive(Debug)]
struct Heartbeat {
    ticker: tokio::time::Interval,
    timeout: Duration,
    pong_deadline: Option<Instant>,
}

impl Heartbeat {
    fn start(interval: Duration, timeout: Duration) -> Self {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self {
            ticker,
            timeout,
            pong_deadline: None,
        }
    }

    fn ping_sent(&mut self) {
        if self.pong_deadline.is_none() {
            self.pong_deadline = Some(Instant::now() + self.timeout);
        }
    }

    fn pong_received(&mut self) {
        self.pong_deadline = None;
    }
}

async fn pong_overdue(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionOutcome {
    Closed,
    Failed,
    Cancelled,
}

struct SessionShared {
    config: FeedConfig,
    status: watch::Sender<ConnectionStatus>,
    handler: Mutex<Option<FrameHandler>>,
    ledger: Mutex<SubscriptionLedger>,
    outbound: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    wake: Notify,
    cancel: CancellationToken,
}

impl SessionShared {
    // The cancel check runs under the watch lock so it orders against
    // `mark_torn_down`.
    fn set_status(&self, status: ConnectionStatus) {
        self.status.send_if_modified(|current| {
            if self.cancel.is_cancelled() || *current == status {
                return false;
            }
            *current = status;
            true
        });
    }

    fn mark_torn_down(&self) {
        self.status.send_modify(|current| {
            self.cancel.cancel();
            *current = ConnectionStatus::Disconnected;
        });
    }

    fn send_frame(&self, frame: &OutboundFrame) -> Result<(), AppError> {
        let text = encode_frame(frame)?;
        let outbound = self.outbound.lock();
        let Some(sender) = outbound.as_ref() else {
            return Err(AppError::NotConnected);
        };
        sender
            .send(Message::Text(text))
            .map_err(|_| AppError::NotConnected)
    }

    fn dispatch(&self, text: String, heartbeat: &mut Heartbeat) {
        let mut scratch = text.as_bytes().to_vec();
        match parse_frame_action(&mut scratch) {
            Ok(Some(action)) if action == ACTION_PONG => {
                trace!("heartbeat pong received");
                heartbeat.pong_received();
                return;
            }
            Ok(_) => {}
            Err(error) => {
                warn!(%error, "dropping malformed feed frame");
                return;
            }
        }

        if self.cancel.is_cancelled() {
            return;
        }
        let handler = self.handler.lock().clone();
        if let Some(handler) = handler {
            (*handler)(FeedFrame::new(text));
        }
    }
}

/// One logical connection to the realtime feed.
///
/// The session survives any number of physical reconnects and keeps the
/// subscription ledger for them. It is terminal after [`FeedSession::teardown`].
pub struct FeedSession {
    shared: Arc<SessionShared>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl FeedSession {
    pub fn new(config: FeedConfig) -> Self {
        Self::with_ledger(config, SubscriptionLedger::new())
    }

    pub fn with_ledger(config: FeedConfig, ledger: SubscriptionLedger) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::Disconnected);
        Self {
            shared: Arc::new(SessionShared {
                config,
                status,
                handler: Mutex::new(None),
                ledger: Mutex::new(ledger),
                outbound: Mutex::new(None),
                wake: Notify::new(),
                cancel: CancellationToken::new(),
            }),
            driver: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &FeedConfig {
        &self.shared.config
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.shared.status.borrow()
    }

    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.shared.status.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }

    /// Starts the connection driver. Must be called inside a tokio runtime.
    ///
    /// While the driver is connecting or connected this is a no-op; while it
    /// is waiting out a backoff delay the next attempt starts immediately.
    pub fn connect(&self) -> Result<(), AppError> {
        if self.is_closed() {
            return Err(AppError::SessionClosed);
        }

        let mut driver = self.driver.lock();
        if let Some(handle) = driver.as_ref() {
            if !handle.is_finished() {
                if self.status().is_down() {
                    self.shared.wake.notify_one();
                }
                return Ok(());
            }
        }

        self.shared.set_status(ConnectionStatus::Connecting);
        *driver = Some(tokio::spawn(run_feed_session(Arc::clone(&self.shared))));
        Ok(())
    }

    /// Sends a frame on the live connection; nothing is queued when offline.
    pub fn send(&self, frame: &OutboundFrame) -> Result<(), AppError> {
        if self.is_closed() {
            return Err(AppError::SessionClosed);
        }
        let result = self.shared.send_frame(frame);
        if let Err(AppError::NotConnected) = &result {
            warn!(action = frame.action(), "feed not connected, frame not sent");
        }
        result
    }

    /// Installs the single frame handler, replacing any previous one.
    pub fn register_handler<F>(&self, handler: F)
    where
        F: Fn(FeedFrame) + Send + Sync + 'static,
    {
        *self.shared.handler.lock() = Some(Arc::new(handler));
    }

    pub fn clear_handler(&self) {
        self.shared.handler.lock().take();
    }

    pub fn subscribe<S: AsRef<str>>(&self, symbols: &[S]) -> Result<SubscriptionChange, AppError> {
        if self.is_closed() {
            return Err(AppError::SessionClosed);
        }
        let symbols = normalize_symbols(symbols)?;

        let mut ledger = self.shared.ledger.lock();
        let added = ledger.subscribe(symbols);
        let delivery = self.deliver(&added, |symbols| OutboundFrame::Subscribe { symbols });
        drop(ledger);

        debug!(symbols = ?added, ?delivery, "subscribe");
        Ok(SubscriptionChange {
            changed: added,
            delivery,
        })
    }

    pub fn unsubscribe<S: AsRef<str>>(
        &self,
        symbols: &[S],
    ) -> Result<SubscriptionChange, AppError> {
        if self.is_closed() {
            return Err(AppError::SessionClosed);
        }
        let symbols = normalize_symbols(symbols)?;

        let mut ledger = self.shared.ledger.lock();
        let removed = ledger.unsubscribe(symbols);
        let delivery = self.deliver(&removed, |symbols| OutboundFrame::Unsubscribe { symbols });
        drop(ledger);

        debug!(symbols = ?removed, ?delivery, "unsubscribe");
        Ok(SubscriptionChange {
            changed: removed,
            delivery,
        })
    }

    // Called with the ledger lock held so a concurrent open cannot replay a
    // ledger that misses these symbols.
    fn deliver(
        &self,
        changed: &[String],
        build: impl FnOnce(Vec<String>) -> OutboundFrame,
    ) -> Delivery {
        if changed.is_empty() {
            return Delivery::Unchanged;
        }
        match self.shared.send_frame(&build(changed.to_vec())) {
            Ok(()) => Delivery::Sent,
            Err(_) => Delivery::Deferred,
        }
    }

    pub fn ledger(&self) -> SubscriptionLedger {
        self.shared.ledger.lock().clone()
    }

    /// Detaches the handler and outbound channel, then stops the driver.
    ///
    /// Once this returns no frame reaches the handler and the status no longer
    /// changes.
    pub async fn teardown(&self) {
        self.shared.handler.lock().take();
        self.shared.outbound.lock().take();
        self.shared.mark_torn_down();

        let handle = self.driver.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        info!(url = %self.shared.config.url, "feed session torn down");
    }
}

impl Drop for FeedSession {
    fn drop(&mut self) {
        self.shared.cancel.cancel();
    }
}

pub async fn connect_feed_stream(url: &str) -> Result<FeedWsStream, AppError> {
    let ws_config = WebSocketConfig {
        max_message_size: Some(16 << 20),
        max_frame_size: Some(4 << 20),
        ..Default::default()
    };

    let (stream, _) = connect_async_with_config(url, Some(ws_config), true).await?;
    Ok(stream)
}

async fn run_feed_session(shared: Arc<SessionShared>) {
    let config = &shared.config;
    let mut backoff = ReconnectBackoff::new(config.reconnect_base, config.reconnect_max);

    while !shared.cancel.is_cancelled() {
        shared.set_status(ConnectionStatus::Connecting);
        debug!(url = %config.url, attempt = backoff.attempt(), "opening feed connection");

        let connect_result = tokio::select! {
            _ = shared.cancel.cancelled() => break,
            result = tokio::time::timeout(config.connect_timeout, connect_feed_stream(&config.url)) => result,
        };

        let outcome = match connect_result {
            Ok(Ok(stream)) => {
                backoff.reset();
                drive_connection(&shared, stream).await
            }
            Ok(Err(error)) => {
                warn!(%error, url = %config.url, "feed connect failed");
                ConnectionOutcome::Failed
            }
            Err(_) => {
                let timeout_ms = config.connect_timeout.as_millis().min(u64::MAX as u128) as u64;
                warn!(error = %AppError::Timeout(timeout_ms), url = %config.url, "feed connect failed");
                ConnectionOutcome::Failed
            }
        };

        match outcome {
            ConnectionOutcome::Cancelled => break,
            ConnectionOutcome::Closed => shared.set_status(ConnectionStatus::Disconnected),
            ConnectionOutcome::Failed => shared.set_status(ConnectionStatus::Error),
        }

        let delay = backoff.next_delay();
        info!(delay_ms = delay.as_millis() as u64, "feed disconnected, retrying");
        tokio::select! {
            _ = shared.cancel.cancelled() => break,
            _ = shared.wake.notified() => {}
            _ = tokio::time::sleep(delay) => {}
        }
    }

    debug!("feed session driver stopped");
}

async fn drive_connection(shared: &SessionShared, stream: FeedWsStream) -> ConnectionOutcome {
    let (mut sink, mut source) = stream.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();

    let replay = {
        let ledger = shared.ledger.lock();
        *shared.outbound.lock() = Some(outbound_tx);
        ledger.replay_frame()
    };

    let outcome = 'connection: {
        if let Some(frame) = replay {
            let symbols = match &frame {
                OutboundFrame::Subscribe { symbols } => symbols.len(),
                _ => 0,
            };
            match encode_frame(&frame) {
                Ok(text) => {
                    if let Err(error) = sink.send(Message::Text(text)).await {
                        warn!(%error, "failed to replay subscriptions");
                        break 'connection ConnectionOutcome::Failed;
                    }
                    info!(symbols, "replayed subscriptions");
                }
                Err(error) => warn!(%error, "failed to encode subscription replay"),
            }
        }

        shared.set_status(ConnectionStatus::Connected);
        info!(url = %shared.config.url, "feed connected");

        let mut heartbeat = Heartbeat::start(
            shared.config.heartbeat_interval,
            shared.config.heartbeat_timeout,
        );

        loop {
            tokio::select! {
                _ = shared.cancel.cancelled() => {
                    let _ = sink.send(Message::Close(None)).await;
                    break ConnectionOutcome::Cancelled;
                }
                _ = pong_overdue(heartbeat.pong_deadline) => {
                    warn!(timeout_ms = shared.config.heartbeat_timeout.as_millis() as u64, "heartbeat timeout, closing feed connection");
                    let _ = sink.close().await;
                    break ConnectionOutcome::Closed;
                }
                _ = heartbeat.ticker.tick() => {
                    let ping = match encode_frame(&OutboundFrame::Ping) {
                        Ok(text) => text,
                        Err(error) => {
                            warn!(%error, "failed to encode ping");
                            continue;
                        }
                    };
                    if let Err(error) = sink.send(Message::Text(ping)).await {
                        warn!(%error, "failed to send ping");
                        break ConnectionOutcome::Failed;
                    }
                    heartbeat.ping_sent();
                }
                Some(message) = outbound_rx.recv() => {
                    if let Err(error) = sink.send(message).await {
                        warn!(%error, "failed to send feed frame");
                        break ConnectionOutcome::Failed;
                    }
                }
                next = source.next() => {
                    let message = match next {
                        None => break ConnectionOutcome::Closed,
                        Some(Err(error)) => {
                            warn!(%error, "feed socket error");
                            break ConnectionOutcome::Failed;
                        }
                        Some(Ok(message)) => message,
                    };
                    match message {
                        Message::Text(text) => shared.dispatch(text, &mut heartbeat),
                        Message::Binary(bytes) => match String::from_utf8(bytes) {
                            Ok(text) => shared.dispatch(text, &mut heartbeat),
                            Err(error) => warn!(%error, "dropping non utf-8 binary frame"),
                        },
                        Message::Close(frame) => {
                            debug!(?frame, "feed closed by server");
                            break ConnectionOutcome::Closed;
                        }
                        _ => {}
                    }
                }
            }
        }
    };

    shared.outbound.lock().take();
    outcome
}
