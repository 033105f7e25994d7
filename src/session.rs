//! Remote player session lifecycle.
//!
//! Owns the playback engine handle and the device registration. The key
//! invariant: at most one initialization attempt runs at a time, and
//! every concurrent `ensure_ready` caller joins that attempt and shares
//! its outcome instead of spawning another engine.

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::broadcast::Sender;

use crate::protocol::{Message, SessionMessage};
use crate::relay_client::{TokenError, TokenSource};
use crate::remote::{EngineEvent, EngineFactory, PlayerEngine, RemoteController};

const EVENT_POLL_PERIOD: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The engine never reported ready within the init window.
    InitTimeout,
    InitFailed(String),
    /// Credentials rejected; the OAuth collaborator must re-authorize.
    AuthenticationRequired,
    /// The engine refused the connection outright.
    EngineUnavailable,
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::InitTimeout => write!(formatter, "engine initialization timed out"),
            SessionError::InitFailed(message) => {
                write!(formatter, "engine initialization failed: {message}")
            }
            SessionError::AuthenticationRequired => {
                write!(formatter, "authentication required")
            }
            SessionError::EngineUnavailable => {
                write!(formatter, "engine refused the connection")
            }
        }
    }
}

impl std::error::Error for SessionError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Uninitialized,
    Connecting,
    Ready,
    /// Credentials rejected; waiting on the OAuth flow.
    Authenticating,
    Error,
}

struct SessionInner {
    phase: SessionPhase,
    device_id: Option<String>,
    last_error: Option<SessionError>,
}

/// Seam the synchronization controller uses to reach the session.
pub trait SessionHandle: Send + Sync {
    /// Returns the ready device id, initializing the session if needed.
    fn ensure_ready(&self, wait_timeout: Duration) -> Result<String, SessionError>;

    /// Device id if the session is currently ready.
    fn device_id(&self) -> Option<String>;

    /// Drops the device registration after the remote side reports it
    /// gone; the next `ensure_ready` reconnects.
    fn invalidate_device(&self);
}

pub struct SessionManager {
    inner: Mutex<SessionInner>,
    ready_cv: Condvar,
    engine: Mutex<Option<Box<dyn PlayerEngine>>>,
    engine_factory: EngineFactory,
    token_source: Arc<dyn TokenSource>,
    controller: Arc<dyn RemoteController>,
    bus_producer: Sender<Message>,
    init_timeout: Duration,
}

impl SessionManager {
    pub fn new(
        engine_factory: EngineFactory,
        token_source: Arc<dyn TokenSource>,
        controller: Arc<dyn RemoteController>,
        bus_producer: Sender<Message>,
        init_timeout: Duration,
    ) -> Self {
        Self {
            inner: Mutex::new(SessionInner {
                phase: SessionPhase::Uninitialized,
                device_id: None,
                last_error: None,
            }),
            ready_cv: Condvar::new(),
            engine: Mutex::new(None),
            engine_factory,
            token_source,
            controller,
            bus_producer,
            init_timeout,
        }
    }

    fn emit(&self, message: SessionMessage) {
        let _ = self.bus_producer.send(Message::Session(message));
    }

    /// Runs one full initialization. Called with `phase == Connecting`
    /// already claimed; the inner lock is NOT held here.
    fn run_initialization(&self) -> Result<String, SessionError> {
        // Verify credentials before spinning up an engine. A rejected
        // token gets one refresh attempt; only when that also fails does
        // the OAuth flow have to re-run.
        match self.token_source.fresh_token() {
            Ok(_) => {}
            Err(TokenError::NotAuthenticated) => {
                log::info!("access token rejected, attempting refresh");
                match self.token_source.refreshed_token() {
                    Ok(_) => {}
                    Err(TokenError::NotAuthenticated) => {
                        return Err(SessionError::AuthenticationRequired)
                    }
                    Err(TokenError::Transport(message)) => {
                        return Err(SessionError::InitFailed(message))
                    }
                }
            }
            Err(TokenError::Transport(message)) => return Err(SessionError::InitFailed(message)),
        }

        let mut engine_slot = match self.engine.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };

        // Prefer reconnecting the engine we already have; only build a
        // fresh one when that fails.
        let mut connected = false;
        if let Some(engine) = engine_slot.as_mut() {
            match engine.connect() {
                Ok(true) => connected = true,
                Ok(false) => log::info!("stale engine refused reconnect, replacing it"),
                Err(err) => log::warn!("stale engine reconnect failed: {err}"),
            }
        }
        if !connected {
            let mut engine = (self.engine_factory)();
            match engine.connect() {
                Ok(true) => {}
                Ok(false) => return Err(SessionError::EngineUnavailable),
                Err(err) => return Err(SessionError::InitFailed(err)),
            }
            *engine_slot = Some(engine);
        }

        let engine = engine_slot
            .as_mut()
            .ok_or(SessionError::EngineUnavailable)?;
        let device_id = self.wait_for_ready(engine.as_mut())?;

        // Route playback to our device without starting anything; the
        // first play request decides the start position.
        if let Err(err) = self.controller.transfer_playback(&device_id, false) {
            log::warn!("initial device transfer failed: {err}");
        }
        Ok(device_id)
    }

    fn wait_for_ready(&self, engine: &mut dyn PlayerEngine) -> Result<String, SessionError> {
        let deadline = Instant::now() + self.init_timeout;
        loop {
            let events = engine
                .poll_events()
                .map_err(SessionError::InitFailed)?;
            for event in events {
                match event {
                    EngineEvent::Ready { device_id } => return Ok(device_id),
                    EngineEvent::AuthenticationError { message } => {
                        log::warn!("engine rejected credentials: {message}");
                        return Err(SessionError::AuthenticationRequired);
                    }
                    EngineEvent::InitializationError { message }
                    | EngineEvent::AccountError { message } => {
                        return Err(SessionError::InitFailed(message));
                    }
                    EngineEvent::StateChanged(state) => {
                        self.emit(SessionMessage::EngineStateChanged(state));
                    }
                    EngineEvent::NotReady { .. } | EngineEvent::PlaybackError { .. } => {}
                }
            }
            if Instant::now() >= deadline {
                return Err(SessionError::InitTimeout);
            }
            std::thread::sleep(EVENT_POLL_PERIOD);
        }
    }

    fn apply_outcome(&self, outcome: &Result<String, SessionError>) {
        let mut inner = match self.inner.lock() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        };
        match outcome {
            Ok(device_id) => {
                inner.phase = SessionPhase::Ready;
                inner.device_id = Some(device_id.clone());
                inner.last_error = None;
                self.emit(SessionMessage::DeviceReady {
                    device_id: device_id.clone(),
                });
            }
            Err(SessionError::AuthenticationRequired) => {
                inner.phase = SessionPhase::Authenticating;
                inner.device_id = None;
                inner.last_error = Some(SessionError::AuthenticationRequired);
                self.emit(SessionMessage::AuthenticationRequired);
            }
            Err(err) => {
                inner.phase = SessionPhase::Error;
                inner.device_id = None;
                inner.last_error = Some(err.clone());
            }
        }
        self.ready_cv.notify_all();
    }

    /// Forwards queued engine events onto the bus. Skipped entirely while
    /// an initialization holds the engine, which is what we want: init
    /// consumes its own events.
    pub fn pump_engine_events(&self) {
        let Ok(mut engine_slot) = self.engine.try_lock() else {
            return;
        };
        let Some(engine) = engine_slot.as_mut() else {
            return;
        };
        let events = match engine.poll_events() {
            Ok(events) => events,
            Err(err) => {
                log::warn!("engine event poll failed: {err}");
                return;
            }
        };
        for event in events {
            match event {
                EngineEvent::StateChanged(state) => {
                    self.emit(SessionMessage::EngineStateChanged(state));
                }
                EngineEvent::NotReady { device_id } => {
                    self.handle_device_lost(&device_id, engine.as_mut())
                }
                EngineEvent::AuthenticationError { message } => {
                    log::warn!("engine authentication lapsed: {message}");
                    let mut inner = match self.inner.lock() {
                        Ok(inner) => inner,
                        Err(poisoned) => poisoned.into_inner(),
                    };
                    inner.phase = SessionPhase::Authenticating;
                    inner.device_id = None;
                    drop(inner);
                    self.emit(SessionMessage::AuthenticationRequired);
                }
                EngineEvent::PlaybackError { message }
                | EngineEvent::InitializationError { message }
                | EngineEvent::AccountError { message } => {
                    self.emit(SessionMessage::EngineError { message });
                }
                EngineEvent::Ready { device_id } => {
                    // Late ready (e.g. after a bare reconnect); adopt it.
                    let mut inner = match self.inner.lock() {
                        Ok(inner) => inner,
                        Err(poisoned) => poisoned.into_inner(),
                    };
                    inner.phase = SessionPhase::Ready;
                    inner.device_id = Some(device_id.clone());
                    drop(inner);
                    self.emit(SessionMessage::DeviceReady { device_id });
                }
            }
        }
    }

    fn handle_device_lost(&self, lost_device_id: &str, engine: &mut dyn PlayerEngine) {
        {
            let mut inner = match self.inner.lock() {
                Ok(inner) => inner,
                Err(poisoned) => poisoned.into_inner(),
            };
            if inner.device_id.as_deref() != Some(lost_device_id) {
                return;
            }
            inner.device_id = None;
            inner.phase = SessionPhase::Uninitialized;
        }
        self.emit(SessionMessage::DeviceLost {
            device_id: lost_device_id.to_string(),
        });
        // Bare reconnect; a new Ready event will restore the device.
        match engine.connect() {
            Ok(true) => log::info!("reconnecting engine after device loss"),
            Ok(false) => log::warn!("engine refused reconnect after device loss"),
            Err(err) => log::warn!("engine reconnect failed after device loss: {err}"),
        }
    }

    /// Tears the engine down; used on shutdown.
    pub fn disconnect(&self) {
        let mut engine_slot = match self.engine.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(mut engine) = engine_slot.take() {
            engine.disconnect();
        }
        let mut inner = match self.inner.lock() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        };
        inner.phase = SessionPhase::Uninitialized;
        inner.device_id = None;
        self.ready_cv.notify_all();
    }
}

impl SessionHandle for SessionManager {
    fn ensure_ready(&self, wait_timeout: Duration) -> Result<String, SessionError> {
        let deadline = Instant::now() + wait_timeout;
        let mut inner = match self.inner.lock() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        };
        loop {
            match inner.phase {
                SessionPhase::Ready => {
                    if let Some(device_id) = inner.device_id.clone() {
                        return Ok(device_id);
                    }
                    // Ready without a device should not happen; fall
                    // through to a fresh attempt.
                    inner.phase = SessionPhase::Uninitialized;
                }
                SessionPhase::Connecting => {
                    // Join the in-flight attempt and share its outcome.
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Err(SessionError::InitTimeout);
                    }
                    let (guard, wait_result) = match self.ready_cv.wait_timeout(inner, remaining) {
                        Ok(outcome) => outcome,
                        Err(poisoned) => {
                            let (guard, wait_result) = poisoned.into_inner();
                            (guard, wait_result)
                        }
                    };
                    inner = guard;
                    if wait_result.timed_out() && inner.phase == SessionPhase::Connecting {
                        return Err(SessionError::InitTimeout);
                    }
                    if inner.phase != SessionPhase::Connecting && inner.phase != SessionPhase::Ready
                    {
                        return Err(inner
                            .last_error
                            .clone()
                            .unwrap_or(SessionError::EngineUnavailable));
                    }
                }
                SessionPhase::Uninitialized | SessionPhase::Authenticating | SessionPhase::Error => {
                    inner.phase = SessionPhase::Connecting;
                    drop(inner);
                    let outcome = self.run_initialization();
                    self.apply_outcome(&outcome);
                    return outcome;
                }
            }
        }
    }

    fn device_id(&self) -> Option<String> {
        let inner = match self.inner.lock() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        };
        if inner.phase == SessionPhase::Ready {
            inner.device_id.clone()
        } else {
            None
        }
    }

    fn invalidate_device(&self) {
        let mut inner = match self.inner.lock() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        };
        if inner.phase == SessionPhase::Ready {
            inner.phase = SessionPhase::Uninitialized;
            inner.device_id = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::broadcast;

    use crate::protocol::EngineState;
    use crate::remote::RemoteApiError;
    use crate::remote::RemoteController;

    struct ScriptedEngine {
        ready_after_polls: usize,
        polls: usize,
        fail_message: Option<String>,
    }

    impl PlayerEngine for ScriptedEngine {
        fn connect(&mut self) -> Result<bool, String> {
            Ok(true)
        }

        fn disconnect(&mut self) {}

        fn poll_events(&mut self) -> Result<Vec<EngineEvent>, String> {
            self.polls += 1;
            if let Some(message) = &self.fail_message {
                return Ok(vec![EngineEvent::InitializationError {
                    message: message.clone(),
                }]);
            }
            if self.polls > self.ready_after_polls {
                Ok(vec![EngineEvent::Ready {
                    device_id: "device-1".to_string(),
                }])
            } else {
                Ok(Vec::new())
            }
        }
    }

    #[derive(Default)]
    struct RecordingController {
        transfers: Mutex<Vec<(String, bool)>>,
    }

    impl RemoteController for RecordingController {
        fn transfer_playback(&self, device_id: &str, play: bool) -> Result<(), RemoteApiError> {
            self.transfers
                .lock()
                .unwrap()
                .push((device_id.to_string(), play));
            Ok(())
        }
        fn play_uri(&self, _: &str, _: &str, _: u64) -> Result<(), RemoteApiError> {
            Ok(())
        }
        fn pause(&self) -> Result<(), RemoteApiError> {
            Ok(())
        }
        fn resume(&self, _: &str) -> Result<(), RemoteApiError> {
            Ok(())
        }
        fn seek(&self, _: u64) -> Result<(), RemoteApiError> {
            Ok(())
        }
        fn next_track(&self) -> Result<(), RemoteApiError> {
            Ok(())
        }
        fn previous_track(&self) -> Result<(), RemoteApiError> {
            Ok(())
        }
        fn playback_state(&self) -> Result<Option<EngineState>, RemoteApiError> {
            Ok(None)
        }
        fn set_volume(&self, _: f32) -> Result<(), RemoteApiError> {
            Ok(())
        }
    }

    struct StaticTokens {
        fresh: Result<String, TokenError>,
        refreshed: Result<String, TokenError>,
        refreshes: Arc<AtomicUsize>,
    }

    impl StaticTokens {
        fn valid() -> Self {
            Self {
                fresh: Ok("token".to_string()),
                refreshed: Ok("token".to_string()),
                refreshes: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn unauthorized() -> Self {
            Self {
                fresh: Err(TokenError::NotAuthenticated),
                refreshed: Err(TokenError::NotAuthenticated),
                refreshes: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn expired_but_refreshable() -> Self {
            Self {
                fresh: Err(TokenError::NotAuthenticated),
                refreshed: Ok("token".to_string()),
                refreshes: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl TokenSource for StaticTokens {
        fn fresh_token(&self) -> Result<String, TokenError> {
            self.fresh.clone()
        }

        fn refreshed_token(&self) -> Result<String, TokenError> {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            self.refreshed.clone()
        }
    }

    fn manager_with(
        engines_built: Arc<AtomicUsize>,
        tokens: StaticTokens,
        ready_after_polls: usize,
        fail_message: Option<String>,
    ) -> (Arc<SessionManager>, broadcast::Receiver<Message>) {
        let (bus_producer, observer) = broadcast::channel(16);
        let controller = Arc::new(RecordingController::default());
        let factory: EngineFactory = Box::new(move || {
            engines_built.fetch_add(1, Ordering::SeqCst);
            Box::new(ScriptedEngine {
                ready_after_polls,
                polls: 0,
                fail_message: fail_message.clone(),
            })
        });
        let manager = Arc::new(SessionManager::new(
            factory,
            Arc::new(tokens),
            controller,
            bus_producer,
            Duration::from_secs(2),
        ));
        (manager, observer)
    }

    #[test]
    fn test_ensure_ready_initializes_and_transfers_device() {
        let engines_built = Arc::new(AtomicUsize::new(0));
        let (manager, mut observer) =
            manager_with(Arc::clone(&engines_built), StaticTokens::valid(), 0, None);

        let device_id = manager
            .ensure_ready(Duration::from_secs(5))
            .expect("session should become ready");
        assert_eq!(device_id, "device-1");
        assert_eq!(engines_built.load(Ordering::SeqCst), 1);

        match observer.try_recv() {
            Ok(Message::Session(SessionMessage::DeviceReady { device_id })) => {
                assert_eq!(device_id, "device-1");
            }
            other => panic!("expected DeviceReady, got {other:?}"),
        }
    }

    #[test]
    fn test_concurrent_ensure_ready_builds_one_engine() {
        let engines_built = Arc::new(AtomicUsize::new(0));
        let (manager, _observer) =
            manager_with(Arc::clone(&engines_built), StaticTokens::valid(), 3, None);

        let mut handles = Vec::new();
        for _ in 0..4 {
            let manager = Arc::clone(&manager);
            handles.push(std::thread::spawn(move || {
                manager.ensure_ready(Duration::from_secs(5))
            }));
        }
        let results: Vec<_> = handles
            .into_iter()
            .map(|handle| handle.join().expect("thread should not panic"))
            .collect();

        for result in &results {
            assert_eq!(result.as_deref(), Ok("device-1"));
        }
        assert_eq!(engines_built.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_ready_session_returns_immediately_without_new_engine() {
        let engines_built = Arc::new(AtomicUsize::new(0));
        let (manager, _observer) =
            manager_with(Arc::clone(&engines_built), StaticTokens::valid(), 0, None);

        manager
            .ensure_ready(Duration::from_secs(5))
            .expect("first call should succeed");
        manager
            .ensure_ready(Duration::from_secs(5))
            .expect("second call should succeed");
        assert_eq!(engines_built.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_missing_token_requires_authentication_without_engine() {
        let engines_built = Arc::new(AtomicUsize::new(0));
        let (manager, mut observer) = manager_with(
            Arc::clone(&engines_built),
            StaticTokens::unauthorized(),
            0,
            None,
        );

        let result = manager.ensure_ready(Duration::from_secs(5));
        assert_eq!(result, Err(SessionError::AuthenticationRequired));
        assert_eq!(engines_built.load(Ordering::SeqCst), 0);
        assert!(matches!(
            observer.try_recv(),
            Ok(Message::Session(SessionMessage::AuthenticationRequired))
        ));
    }

    #[test]
    fn test_init_error_propagates_and_next_call_retries() {
        let engines_built = Arc::new(AtomicUsize::new(0));
        let (manager, _observer) = manager_with(
            Arc::clone(&engines_built),
            StaticTokens::valid(),
            0,
            Some("sdk load failed".to_string()),
        );

        let result = manager.ensure_ready(Duration::from_secs(5));
        assert_eq!(
            result,
            Err(SessionError::InitFailed("sdk load failed".to_string()))
        );
        // A later caller is not stuck behind the failed attempt; the
        // existing engine is reconnected rather than rebuilt.
        let result = manager.ensure_ready(Duration::from_secs(5));
        assert!(result.is_err());
        assert_eq!(engines_built.load(Ordering::SeqCst), 1);
    }

    /// Engine that registers a device and then drops it on the next poll.
    struct DroppingEngine {
        connects: Arc<AtomicUsize>,
        polls: usize,
    }

    impl PlayerEngine for DroppingEngine {
        fn connect(&mut self) -> Result<bool, String> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        }

        fn disconnect(&mut self) {}

        fn poll_events(&mut self) -> Result<Vec<EngineEvent>, String> {
            self.polls += 1;
            match self.polls {
                1 => Ok(vec![EngineEvent::Ready {
                    device_id: "device-1".to_string(),
                }]),
                2 => Ok(vec![EngineEvent::NotReady {
                    device_id: "device-1".to_string(),
                }]),
                _ => Ok(Vec::new()),
            }
        }
    }

    #[test]
    fn test_pumped_device_loss_clears_device_and_reconnects() {
        let connects = Arc::new(AtomicUsize::new(0));
        let (bus_producer, mut observer) = broadcast::channel(16);
        let factory_connects = Arc::clone(&connects);
        let factory: EngineFactory = Box::new(move || {
            Box::new(DroppingEngine {
                connects: Arc::clone(&factory_connects),
                polls: 0,
            })
        });
        let manager = SessionManager::new(
            factory,
            Arc::new(StaticTokens::valid()),
            Arc::new(RecordingController::default()),
            bus_producer,
            Duration::from_secs(2),
        );

        manager
            .ensure_ready(Duration::from_secs(5))
            .expect("session should become ready");
        assert_eq!(connects.load(Ordering::SeqCst), 1);

        manager.pump_engine_events();

        assert_eq!(manager.device_id(), None);
        assert_eq!(connects.load(Ordering::SeqCst), 2, "lost device should reconnect");
        let mut saw_device_lost = false;
        while let Ok(message) = observer.try_recv() {
            if matches!(
                message,
                Message::Session(SessionMessage::DeviceLost { .. })
            ) {
                saw_device_lost = true;
            }
        }
        assert!(saw_device_lost);
    }

    #[test]
    fn test_expired_token_is_refreshed_before_init() {
        let engines_built = Arc::new(AtomicUsize::new(0));
        let tokens = StaticTokens::expired_but_refreshable();
        let refreshes = Arc::clone(&tokens.refreshes);
        let (manager, _observer) = manager_with(Arc::clone(&engines_built), tokens, 0, None);

        let device_id = manager
            .ensure_ready(Duration::from_secs(5))
            .expect("refreshed token should allow init");
        assert_eq!(device_id, "device-1");
        assert_eq!(refreshes.load(Ordering::SeqCst), 1);
        assert_eq!(engines_built.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_invalidate_device_clears_ready_state() {
        let engines_built = Arc::new(AtomicUsize::new(0));
        let (manager, _observer) =
            manager_with(Arc::clone(&engines_built), StaticTokens::valid(), 0, None);

        manager
            .ensure_ready(Duration::from_secs(5))
            .expect("session should become ready");
        assert_eq!(manager.device_id().as_deref(), Some("device-1"));
        manager.invalidate_device();
        assert_eq!(manager.device_id(), None);
    }
}
