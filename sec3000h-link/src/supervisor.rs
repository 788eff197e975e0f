//! Link supervisor
//!
//! Owns the device handle of one station. A single reader task opens the
//! device (with backoff between failed attempts), polls it with a short read
//! timeout, feeds the resynchronizing scanner and pushes decoded frames into
//! an unbounded queue so that reception never waits on frame processing.
//!
//! Writes go through [`LinkHandle::send`]. Reader and writers share the
//! device behind one async mutex; the reader only holds it for one poll.

use crate::error::{SecError, SecResult};
use crate::frame::{Frame, hex_dump};
use crate::scanner::FrameScanner;
use crate::state::LinkState;
use crate::statistics::LinkStatistics;
use sec3000h_transport::TransportLayer;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Reconnect backoff
///
/// The n-th consecutive failed open waits `initial * multiplier^n`, capped at `max`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: u32,
}

impl BackoffPolicy {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            multiplier: 2,
        }
    }

    /// Fixed delay between attempts
    pub fn constant(delay: Duration) -> Self {
        Self {
            initial: delay,
            max: delay,
            multiplier: 1,
        }
    }

    /// Delay before the next attempt, `failures` being the consecutive failures so far
    pub fn delay(&self, failures: u32) -> Duration {
        let mut delay = self.initial;
        for _ in 0..failures {
            delay = match delay.checked_mul(self.multiplier) {
                Some(d) if d < self.max => d,
                _ => return self.max,
            };
        }
        delay.min(self.max)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(2), Duration::from_secs(30))
    }
}

/// Link supervisor configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Poll timeout of a single read
    pub read_timeout: Duration,
    /// Silence after which the device is probed
    pub idle_timeout: Duration,
    /// Close and reopen the device when idle, instead of only probing it
    pub recycle_when_idle: bool,
    pub backoff: BackoffPolicy,
    /// Consecutive I/O errors that drop the link; zero is treated as one
    pub max_consecutive_errors: u32,
    /// Consecutive failed opens before giving up; `None` retries forever
    pub max_reconnect_attempts: Option<u32>,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_millis(100),
            idle_timeout: Duration::from_secs(30),
            recycle_when_idle: false,
            backoff: BackoffPolicy::default(),
            max_consecutive_errors: 3,
            max_reconnect_attempts: None,
        }
    }
}

impl SupervisorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn with_recycle_when_idle(mut self, recycle: bool) -> Self {
        self.recycle_when_idle = recycle;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_max_consecutive_errors(mut self, max: u32) -> Self {
        self.max_consecutive_errors = max.max(1);
        self
    }

    pub fn with_max_reconnect_attempts(mut self, max: u32) -> Self {
        self.max_reconnect_attempts = Some(max);
        self
    }
}

/// State shared between the reader task and every handle
#[derive(Debug)]
struct Shared {
    state: watch::Sender<LinkState>,
    stats: parking_lot::Mutex<LinkStatistics>,
    config: SupervisorConfig,
    cancel: CancellationToken,
    name: String,
    /// Successful opens so far
    generation: AtomicU64,
}

impl Shared {
    fn state(&self) -> LinkState {
        *self.state.borrow()
    }

    fn set_state(&self, new_state: LinkState) {
        let old = self.state.send_replace(new_state);
        if old == new_state {
            return;
        }
        if let Err(e) = old.validate_transition(new_state) {
            log::debug!("{}: {}", self.name, e);
        }
        match new_state {
            LinkState::Connected | LinkState::Disconnected => {
                log::info!("{}: link {} -> {}", self.name, old, new_state)
            }
            _ => log::debug!("{}: link {} -> {}", self.name, old, new_state),
        }
    }

    /// Count an I/O failure; returns true once the error limit is reached
    fn record_io_error(&self) -> bool {
        self.stats.lock().increment_io_errors();
        let current = self.state();
        let next = match current {
            LinkState::Connected => LinkState::Degraded(1),
            LinkState::Degraded(n) => LinkState::Degraded(n + 1),
            other => other,
        };
        self.set_state(next);
        next.error_count() >= self.error_limit()
    }

    fn record_io_success(&self) {
        if matches!(self.state(), LinkState::Degraded(_)) {
            self.set_state(LinkState::Connected);
        }
    }

    fn error_limit(&self) -> u32 {
        self.config.max_consecutive_errors.max(1)
    }

    fn error_limit_reached(&self) -> bool {
        self.state().error_count() >= self.error_limit()
    }
}

/// Why a connected read loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PumpExit {
    Cancelled,
    ConsumerGone,
    LinkLost,
}

/// Cloneable handle for writing to, observing and stopping a supervised link
pub struct LinkHandle<T: TransportLayer> {
    transport: Arc<Mutex<T>>,
    shared: Arc<Shared>,
}

impl<T: TransportLayer> Clone for LinkHandle<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: TransportLayer> LinkHandle<T> {
    /// Write one encoded frame
    ///
    /// # Errors
    ///
    /// `LinkNotReady` unless the link is `Connected`; the transport error if
    /// the write fails (which also counts towards dropping the link).
    pub async fn send(&self, bytes: &[u8]) -> SecResult<()> {
        let state = self.shared.state();
        if !state.can_send() {
            return Err(SecError::LinkNotReady(format!("link is {}", state)));
        }

        let result = {
            let mut transport = self.transport.lock().await;
            match transport.write_all(bytes).await {
                Ok(()) => transport.flush().await,
                Err(e) => Err(e),
            }
        };

        match result {
            Ok(()) => {
                log::debug!("{}: TX {}", self.shared.name, hex_dump(bytes));
                self.shared.stats.lock().increment_frames_sent();
                self.shared.record_io_success();
                Ok(())
            }
            Err(e) => {
                log::error!("{}: write failed: {}", self.shared.name, e);
                self.shared.record_io_error();
                Err(e)
            }
        }
    }

    pub fn state(&self) -> LinkState {
        self.shared.state()
    }

    /// Watch link state changes
    ///
    /// The watch only keeps the latest state. Compare [`generation`](Self::generation)
    /// between observations to notice a drop and reopen that happened in between.
    pub fn subscribe(&self) -> watch::Receiver<LinkState> {
        self.shared.state.subscribe()
    }

    /// Number of times the device has been opened; bumped before `Connected` is published
    pub fn generation(&self) -> u64 {
        self.shared.generation.load(Ordering::SeqCst)
    }

    /// Copy of the current statistics
    pub fn statistics(&self) -> LinkStatistics {
        self.shared.stats.lock().clone()
    }

    /// Count a NAK seen by the session layer
    pub fn record_nak(&self) {
        self.shared.stats.lock().increment_naks();
    }

    /// Ask the reader task to stop and close the device
    pub fn shutdown(&self) {
        self.shared.cancel.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }
}

/// A supervisor running on its own task
pub struct SpawnedLink<T: TransportLayer> {
    pub handle: LinkHandle<T>,
    /// Decoded frames in wire order
    pub frames: mpsc::UnboundedReceiver<Frame>,
    /// Resolves when the reader stops; `Err(ReconnectExhausted)` if it gave up
    pub task: JoinHandle<SecResult<()>>,
}

/// Link supervisor for one device
pub struct LinkSupervisor<T: TransportLayer> {
    transport: Arc<Mutex<T>>,
    shared: Arc<Shared>,
}

impl<T: TransportLayer + 'static> LinkSupervisor<T> {
    /// Create a supervisor; nothing is opened until [`run`](Self::run)
    pub fn new(transport: T, config: SupervisorConfig) -> Self {
        let name = transport.describe();
        let (state, _) = watch::channel(LinkState::Disconnected);
        Self {
            transport: Arc::new(Mutex::new(transport)),
            shared: Arc::new(Shared {
                state,
                stats: parking_lot::Mutex::new(LinkStatistics::new()),
                config,
                cancel: CancellationToken::new(),
                name,
                generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn handle(&self) -> LinkHandle<T> {
        LinkHandle {
            transport: Arc::clone(&self.transport),
            shared: Arc::clone(&self.shared),
        }
    }

    /// Start the reader loop on a new task
    pub fn spawn(self) -> SpawnedLink<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = self.handle();
        let task = tokio::spawn(self.run(tx));
        SpawnedLink {
            handle,
            frames: rx,
            task,
        }
    }

    /// Run the connect / read / reconnect loop until cancelled
    ///
    /// Returns `Ok(())` on shutdown or when the frame receiver is dropped,
    /// and `Err(ReconnectExhausted)` if a reconnect cap is configured and
    /// exceeded. The device is closed and the state set to `Disconnected`
    /// on every exit path.
    pub async fn run(self, frames: mpsc::UnboundedSender<Frame>) -> SecResult<()> {
        let config = self.shared.config.clone();
        let cancel = self.shared.cancel.clone();
        let mut scanner = FrameScanner::new();
        let mut failures: u32 = 0;
        let mut opened_once = false;

        let result = loop {
            if cancel.is_cancelled() {
                break Ok(());
            }

            self.shared.set_state(LinkState::Connecting);
            let delay = match self.open().await {
                Ok(()) => {
                    failures = 0;
                    if opened_once {
                        self.shared.stats.lock().increment_reconnects();
                    }
                    opened_once = true;
                    self.shared.generation.fetch_add(1, Ordering::SeqCst);
                    self.shared.set_state(LinkState::Connected);
                    scanner.clear();

                    let exit = self.pump(&mut scanner, &frames).await;
                    self.close().await;
                    self.shared.set_state(LinkState::Disconnected);
                    match exit {
                        PumpExit::Cancelled | PumpExit::ConsumerGone => break Ok(()),
                        PumpExit::LinkLost => config.backoff.delay(0),
                    }
                }
                Err(e) => {
                    failures += 1;
                    self.shared.stats.lock().increment_failed_opens();
                    self.shared.set_state(LinkState::Disconnected);
                    log::warn!(
                        "{}: open attempt {} failed: {}",
                        self.shared.name,
                        failures,
                        e
                    );
                    if let Some(max) = config.max_reconnect_attempts {
                        if failures >= max {
                            log::error!(
                                "{}: giving up after {} failed open attempts",
                                self.shared.name,
                                failures
                            );
                            break Err(SecError::ReconnectExhausted { attempts: failures });
                        }
                    }
                    config.backoff.delay(failures - 1)
                }
            };

            log::debug!("{}: reconnecting in {:?}", self.shared.name, delay);
            tokio::select! {
                () = cancel.cancelled() => break Ok(()),
                () = tokio::time::sleep(delay) => {}
            }
        };

        self.close().await;
        self.shared.set_state(LinkState::Disconnected);
        result
    }

    async fn open(&self) -> SecResult<()> {
        let mut transport = self.transport.lock().await;
        if !transport.is_closed() {
            transport.close().await?;
        }
        transport.open().await?;
        transport
            .set_timeout(Some(self.shared.config.read_timeout))
            .await
    }

    async fn close(&self) {
        let mut transport = self.transport.lock().await;
        if let Err(e) = transport.close().await {
            log::warn!("{}: close failed: {}", self.shared.name, e);
        }
    }

    async fn pump(
        &self,
        scanner: &mut FrameScanner,
        frames: &mpsc::UnboundedSender<Frame>,
    ) -> PumpExit {
        let config = &self.shared.config;
        let mut last_rx = Instant::now();

        loop {
            if self.shared.error_limit_reached() {
                log::error!(
                    "{}: {} consecutive I/O errors, dropping link",
                    self.shared.name,
                    self.shared.state().error_count()
                );
                return PumpExit::LinkLost;
            }

            let read = tokio::select! {
                () = self.shared.cancel.cancelled() => return PumpExit::Cancelled,
                read = async {
                    let mut transport = self.transport.lock().await;
                    transport.read_into(scanner.buffer_mut()).await
                } => read,
            };

            match read {
                Ok(0) => {
                    log::warn!("{}: device closed", self.shared.name);
                    return PumpExit::LinkLost;
                }
                Ok(n) => {
                    last_rx = Instant::now();
                    self.shared.record_io_success();
                    while let Some(frame) = scanner.next_frame() {
                        log::trace!("{}: RX {}", self.shared.name, frame);
                        if frames.send(frame).is_err() {
                            return PumpExit::ConsumerGone;
                        }
                    }
                    let mut stats = self.shared.stats.lock();
                    stats.add_bytes_received(n);
                    stats.absorb_scan(scanner.counters());
                }
                Err(SecError::Timeout) => {
                    if frames.is_closed() {
                        return PumpExit::ConsumerGone;
                    }
                    if last_rx.elapsed() >= config.idle_timeout {
                        self.shared.stats.lock().increment_idle_probes();
                        log::warn!(
                            "{}: no data for {:?}, probing device",
                            self.shared.name,
                            last_rx.elapsed()
                        );
                        if self.transport.lock().await.is_closed() || config.recycle_when_idle {
                            return PumpExit::LinkLost;
                        }
                        last_rx = Instant::now();
                    }
                }
                Err(e) => {
                    log::error!("{}: read failed: {}", self.shared.name, e);
                    if self.shared.record_io_error() {
                        continue;
                    }
                    if self.transport.lock().await.is_closed() {
                        return PumpExit::LinkLost;
                    }
                    tokio::select! {
                        () = self.shared.cancel.cancelled() => return PumpExit::Cancelled,
                        () = tokio::time::sleep(config.read_timeout) => {}
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{AckFrame, CommandFrame, encode_ack, encode_command};
    use sec3000h_core::StationId;
    use sec3000h_transport::MemoryTransport;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio_test::{assert_err, assert_ok};

    fn fast_config() -> SupervisorConfig {
        SupervisorConfig::new()
            .with_read_timeout(Duration::from_millis(10))
            .with_backoff(BackoffPolicy::constant(Duration::from_millis(10)))
    }

    async fn wait_for(rx: &mut watch::Receiver<LinkState>, target: LinkState) {
        let waited = tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|s| *s == target)).await;
        assert!(waited.is_ok(), "link never reached {}", target);
    }

    fn two_devices() -> (MemoryTransport, tokio::io::DuplexStream, tokio::io::DuplexStream) {
        let (first, first_device) = tokio::io::duplex(64);
        let (second, second_device) = tokio::io::duplex(64);
        let transport = MemoryTransport::from_streams("memory:dut", vec![first, second]);
        (transport, first_device, second_device)
    }

    #[test]
    fn test_backoff_doubles_to_cap() {
        let backoff = BackoffPolicy::default();
        assert_eq!(backoff.delay(0), Duration::from_secs(2));
        assert_eq!(backoff.delay(1), Duration::from_secs(4));
        assert_eq!(backoff.delay(2), Duration::from_secs(8));
        assert_eq!(backoff.delay(3), Duration::from_secs(16));
        assert_eq!(backoff.delay(4), Duration::from_secs(30));
        assert_eq!(backoff.delay(40), Duration::from_secs(30));
        assert_eq!(
            BackoffPolicy::constant(Duration::from_millis(5)).delay(9),
            Duration::from_millis(5)
        );
    }

    #[test]
    fn test_config_defaults() {
        let config = SupervisorConfig::default();
        assert_eq!(config.read_timeout, Duration::from_millis(100));
        assert_eq!(config.idle_timeout, Duration::from_secs(30));
        assert_eq!(config.max_consecutive_errors, 3);
        assert_eq!(config.max_reconnect_attempts, None);
        assert_eq!(
            SupervisorConfig::new().with_max_consecutive_errors(0).max_consecutive_errors,
            1
        );
    }

    #[tokio::test]
    async fn test_send_rejected_while_disconnected() {
        let (a, _b) = MemoryTransport::pair(64);
        let supervisor = LinkSupervisor::new(a, fast_config());
        let handle = supervisor.handle();
        let station = StationId::AUTO_PILOT;
        let err = assert_err!(handle.send(&encode_ack(station)).await);
        assert!(matches!(err, SecError::LinkNotReady(_)));
    }

    #[tokio::test]
    async fn test_frames_flow_and_send() {
        let (stream, mut device) = tokio::io::duplex(256);
        let supervisor = LinkSupervisor::new(MemoryTransport::new("memory:dut", stream), fast_config());
        let SpawnedLink {
            handle,
            mut frames,
            task,
        } = supervisor.spawn();
        let mut states = handle.subscribe();
        wait_for(&mut states, LinkState::Connected).await;

        let station = StationId::ELEVATOR;
        assert_ok!(device.write_all(&[0xAA, 0xBB]).await);
        assert_ok!(device.write_all(&encode_command(station, 0x0001, 0x0003)).await);

        let frame = tokio::time::timeout(Duration::from_secs(2), frames.recv()).await;
        assert_eq!(
            frame.ok().flatten(),
            Some(Frame::Command(CommandFrame::new(station, 0x0001, 0x0003)))
        );

        assert_ok!(handle.send(&AckFrame::ack(StationId::AUTO_PILOT).encode()).await);
        let mut buf = [0u8; 5];
        assert_ok!(device.read_exact(&mut buf).await);
        assert_eq!(&buf, b"\x060001");

        let stats = handle.statistics();
        assert_eq!(stats.frames_received, 1);
        assert_eq!(stats.bytes_discarded, 2);
        assert_eq!(stats.frames_sent, 1);

        handle.shutdown();
        assert!(matches!(task.await, Ok(Ok(()))));
        assert_eq!(handle.state(), LinkState::Disconnected);
    }

    #[tokio::test]
    async fn test_reconnects_after_device_loss() {
        let (first, first_device) = tokio::io::duplex(64);
        let (second, mut second_device) = tokio::io::duplex(64);
        let transport = MemoryTransport::from_streams("memory:dut", vec![first, second]);
        let SpawnedLink {
            handle,
            mut frames,
            task,
        } = LinkSupervisor::new(transport, fast_config()).spawn();
        let mut states = handle.subscribe();
        wait_for(&mut states, LinkState::Connected).await;

        drop(first_device);
        wait_for(&mut states, LinkState::Disconnected).await;
        wait_for(&mut states, LinkState::Connected).await;

        assert_ok!(second_device.write_all(&encode_ack(StationId::ELEVATOR)).await);
        let frame = tokio::time::timeout(Duration::from_secs(2), frames.recv()).await;
        assert!(matches!(frame, Ok(Some(Frame::Ack(_)))));
        assert_eq!(handle.statistics().reconnects, 1);
        assert_eq!(handle.generation(), 2);

        handle.shutdown();
        assert!(matches!(task.await, Ok(Ok(()))));
    }

    #[tokio::test]
    async fn test_reconnect_cap_is_reported() {
        let (stream, _device) = tokio::io::duplex(64);
        let transport = MemoryTransport::new("memory:dut", stream).with_open_failures(10);
        let config = fast_config().with_max_reconnect_attempts(3);
        let SpawnedLink { handle, task, .. } = LinkSupervisor::new(transport, config).spawn();

        let result = tokio::time::timeout(Duration::from_secs(2), task).await;
        match result {
            Ok(Ok(Err(SecError::ReconnectExhausted { attempts }))) => assert_eq!(attempts, 3),
            other => panic!("unexpected result: {:?}", other.map(|r| r.map(|r| r.is_ok()))),
        }
        assert_eq!(handle.statistics().failed_opens, 3);
        assert_eq!(handle.state(), LinkState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_recycle_reopens_device() {
        let (transport, _first_device, _second_device) = two_devices();
        let config = fast_config()
            .with_idle_timeout(Duration::from_millis(50))
            .with_recycle_when_idle(true);
        let SpawnedLink {
            handle,
            frames: _frames,
            task,
        } = LinkSupervisor::new(transport, config).spawn();

        let mut states = handle.subscribe();
        wait_for(&mut states, LinkState::Connected).await;
        wait_for(&mut states, LinkState::Disconnected).await;
        assert_eq!(handle.statistics().idle_probes, 1);
        wait_for(&mut states, LinkState::Connected).await;

        let stats = handle.statistics();
        assert_eq!(stats.reconnects, 1);
        assert_eq!(stats.io_errors, 0);

        handle.shutdown();
        assert!(matches!(task.await, Ok(Ok(()))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_io_errors_degrade_then_recover() {
        let (stream, mut device) = tokio::io::duplex(64);
        let transport = MemoryTransport::new("memory:dut", stream).with_read_failures(2);
        let SpawnedLink {
            handle,
            mut frames,
            task,
        } = LinkSupervisor::new(transport, fast_config()).spawn();
        let mut states = handle.subscribe();

        wait_for(&mut states, LinkState::Degraded(1)).await;
        let err = assert_err!(handle.send(&encode_ack(StationId::AUTO_PILOT)).await);
        assert!(matches!(err, SecError::LinkNotReady(_)));
        wait_for(&mut states, LinkState::Degraded(2)).await;

        assert_ok!(device.write_all(&encode_ack(StationId::ELEVATOR)).await);
        wait_for(&mut states, LinkState::Connected).await;
        let frame = tokio::time::timeout(Duration::from_secs(2), frames.recv()).await;
        assert!(matches!(frame, Ok(Some(Frame::Ack(_)))));

        let stats = handle.statistics();
        assert_eq!(stats.io_errors, 2);
        assert_eq!(stats.reconnects, 0);
        assert_eq!(handle.generation(), 1);

        handle.shutdown();
        assert!(matches!(task.await, Ok(Ok(()))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_limit_drops_and_reopens() {
        let (transport, _first_device, _second_device) = two_devices();
        let transport = transport.with_read_failures(3);
        let SpawnedLink {
            handle,
            frames: _frames,
            task,
        } = LinkSupervisor::new(transport, fast_config()).spawn();
        let mut states = handle.subscribe();

        wait_for(&mut states, LinkState::Degraded(1)).await;
        wait_for(&mut states, LinkState::Degraded(2)).await;
        wait_for(&mut states, LinkState::Disconnected).await;
        wait_for(&mut states, LinkState::Connected).await;

        let stats = handle.statistics();
        assert_eq!(stats.io_errors, 3);
        assert_eq!(stats.reconnects, 1);
        assert_eq!(handle.generation(), 2);

        handle.shutdown();
        assert!(matches!(task.await, Ok(Ok(()))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_error_limit_does_not_drop_healthy_link() {
        let (stream, _device) = tokio::io::duplex(64);
        let config = SupervisorConfig {
            max_consecutive_errors: 0,
            ..fast_config()
        };
        let SpawnedLink {
            handle,
            frames: _frames,
            task,
        } = LinkSupervisor::new(MemoryTransport::new("memory:dut", stream), config).spawn();
        let mut states = handle.subscribe();
        wait_for(&mut states, LinkState::Connected).await;

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(handle.state(), LinkState::Connected);
        assert_eq!(handle.generation(), 1);
        assert_eq!(handle.statistics().reconnects, 0);

        handle.shutdown();
        assert!(matches!(task.await, Ok(Ok(()))));
    }
}
