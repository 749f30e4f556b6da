//! Shared fixtures: a scripted image provider and artifact store

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use atelier_core::{
    Artifact, ArtifactStore, EditSession, ImageEditor, ImageSessionConfig, Role, SessionManager,
    SessionOptions, StorageMetadata, Turn, TurnOptions, TurnResponse, Usage,
};
use parking_lot::Mutex;

/// Install a test subscriber once; honours RUST_LOG
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Counters and failure switches shared by the editor and its sessions
#[derive(Default)]
pub struct MockState {
    pub created: AtomicUsize,
    pub closed: AtomicUsize,
    pub sends: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub fail_create: AtomicBool,
    pub fail_next_send: AtomicBool,
    pub artifact_size: AtomicUsize,
}

/// Scripted editor; every session answers with one PNG artifact
pub struct MockEditor {
    pub state: Arc<MockState>,
    create_delay: Duration,
    send_delay: Duration,
    close_delay: Duration,
}

impl MockEditor {
    pub fn new() -> Self {
        let state = MockState::default();
        state.artifact_size.store(16, Ordering::SeqCst);
        Self {
            state: Arc::new(state),
            create_delay: Duration::ZERO,
            send_delay: Duration::ZERO,
            close_delay: Duration::ZERO,
        }
    }

    pub fn with_create_delay(mut self, delay: Duration) -> Self {
        self.create_delay = delay;
        self
    }

    pub fn with_send_delay(mut self, delay: Duration) -> Self {
        self.send_delay = delay;
        self
    }

    pub fn with_close_delay(mut self, delay: Duration) -> Self {
        self.close_delay = delay;
        self
    }

    pub fn created(&self) -> usize {
        self.state.created.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.state.closed.load(Ordering::SeqCst)
    }

    pub fn fail_create(&self, fail: bool) {
        self.state.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn fail_next_send(&self) {
        self.state.fail_next_send.store(true, Ordering::SeqCst);
    }

    pub fn set_artifact_size(&self, size: usize) {
        self.state.artifact_size.store(size, Ordering::SeqCst);
    }

    pub fn max_in_flight(&self) -> usize {
        self.state.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageEditor for MockEditor {
    fn name(&self) -> &str {
        "mock"
    }

    async fn create_session(&self, _options: &SessionOptions) -> anyhow::Result<Box<dyn EditSession>> {
        if !self.create_delay.is_zero() {
            tokio::time::sleep(self.create_delay).await;
        }
        if self.state.fail_create.load(Ordering::SeqCst) {
            return Err(anyhow!("quota exhausted upstream"));
        }
        self.state.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockSession {
            state: Arc::clone(&self.state),
            send_delay: self.send_delay,
            close_delay: self.close_delay,
            history: Mutex::new(Vec::new()),
        }))
    }
}

pub struct MockSession {
    state: Arc<MockState>,
    send_delay: Duration,
    close_delay: Duration,
    history: Mutex<Vec<Turn>>,
}

#[async_trait]
impl EditSession for MockSession {
    async fn send_message(&self, message: &str, _options: &TurnOptions) -> anyhow::Result<TurnResponse> {
        let in_flight = self.state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.max_in_flight.fetch_max(in_flight, Ordering::SeqCst);

        if !self.send_delay.is_zero() {
            tokio::time::sleep(self.send_delay).await;
        }
        self.state.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.state.sends.fetch_add(1, Ordering::SeqCst);

        if self.state.fail_next_send.swap(false, Ordering::SeqCst) {
            return Err(anyhow!("model overloaded"));
        }

        let size = self.state.artifact_size.load(Ordering::SeqCst);
        let artifacts = if size > 0 {
            vec![Artifact::new(vec![0x89u8; size], "image/png")]
        } else {
            Vec::new()
        };

        let mut history = self.history.lock();
        history.push(Turn {
            role: Role::User,
            message: message.to_string(),
            artifacts: Vec::new(),
        });
        history.push(Turn {
            role: Role::Model,
            message: format!("done: {}", message),
            artifacts: artifacts.clone(),
        });

        Ok(TurnResponse {
            text: format!("done: {}", message),
            usage: Some(Usage {
                input_tokens: 10,
                output_tokens: 20,
                artifacts_generated: artifacts.len(),
            }),
            artifacts,
        })
    }

    fn history(&self) -> Vec<Turn> {
        self.history.lock().clone()
    }

    async fn close(&self) -> anyhow::Result<()> {
        if !self.close_delay.is_zero() {
            tokio::time::sleep(self.close_delay).await;
        }
        self.state.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Store that records calls and can be told to fail
#[derive(Default)]
pub struct MockStore {
    pub stored: AtomicUsize,
    pub fail: AtomicBool,
    pub last_metadata: Mutex<Option<StorageMetadata>>,
}

impl MockStore {
    pub fn failing() -> Self {
        let store = Self::default();
        store.fail.store(true, Ordering::SeqCst);
        store
    }
}

#[async_trait]
impl ArtifactStore for MockStore {
    fn name(&self) -> &str {
        "mock-store"
    }

    async fn store(&self, _artifact: &Artifact, metadata: &StorageMetadata) -> anyhow::Result<String> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("bucket unavailable"));
        }
        let n = self.stored.fetch_add(1, Ordering::SeqCst) + 1;
        *self.last_metadata.lock() = Some(metadata.clone());
        Ok(format!("https://images.test/{}/{}.png", metadata.session_key, n))
    }
}

/// Explicit-key config with a 30s idle timeout and a reaper that stays out of the way
pub fn test_config() -> ImageSessionConfig {
    ImageSessionConfig {
        session_timeout_secs: 30,
        reap_interval_secs: 3600,
        ..ImageSessionConfig::explicit_key()
    }
}

pub fn manager_with(editor: &Arc<MockEditor>, config: ImageSessionConfig) -> SessionManager {
    init_tracing();
    SessionManager::new(Arc::clone(editor) as Arc<dyn ImageEditor>, config)
        .expect("valid test config")
}
