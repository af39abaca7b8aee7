//! Credential readiness tracking for gated sources.
//!
//! Some sources only work with stored credentials (login cookies collected
//! by an external flow). This module tracks per-source readiness and drives
//! a bounded polling loop while an acquisition flow is in progress. The
//! actual credential storage and login UI live behind the
//! [`CredentialProvider`] trait.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::{Result, SourceKey};

/// Pause between status checks while acquiring.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Status checks before an acquisition poll loop gives up.
pub const DEFAULT_MAX_POLLS: u32 = 150;

/// Readiness of a source's stored credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialState {
    /// No credential stored.
    #[default]
    Unconfigured,
    /// An acquisition flow is in progress.
    Acquiring,
    /// A credential is stored and usable.
    Ready,
}

/// A credential state paired with the provider's detail message.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CredentialStatus {
    /// Readiness of the stored credential.
    pub state: CredentialState,
    /// Human-readable detail from the provider, empty if never checked.
    pub detail: String,
}

impl CredentialStatus {
    /// Builds a status.
    pub fn new(state: CredentialState, detail: impl Into<String>) -> Self {
        Self {
            state,
            detail: detail.into(),
        }
    }
}

/// External credential collaborator.
///
/// `check` reports the credential's current readiness along with a
/// human-readable detail (for example "logged in as ..."). `begin` kicks
/// off the external acquisition flow (for example, opening a login window);
/// it returns once the flow is started, not once it finishes.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Reports the credential's readiness for the source.
    async fn check(&self, source: SourceKey) -> Result<CredentialStatus>;

    /// Starts the external acquisition flow for the source.
    async fn begin(&self, source: SourceKey) -> Result<()>;

    /// Discards any stored credential for the source.
    async fn clear(&self, source: SourceKey) -> Result<()>;
}

/// Tracks credential readiness per source.
///
/// States move `unconfigured -> acquiring -> ready`. While a source is
/// acquiring, a spawned loop re-checks the provider every
/// [`DEFAULT_POLL_INTERVAL`] until the state leaves `acquiring` or
/// [`DEFAULT_MAX_POLLS`] checks have run, after which polling stops
/// silently and the caller may re-poll via [`status`](Self::status).
#[derive(Clone)]
pub struct CredentialGate {
    provider: Arc<dyn CredentialProvider>,
    states: Arc<RwLock<HashMap<SourceKey, CredentialStatus>>>,
    polling: Arc<RwLock<HashSet<SourceKey>>>,
    poll_interval: Duration,
    max_polls: u32,
}

impl CredentialGate {
    /// Creates a gate over the given provider.
    pub fn new<P: CredentialProvider + 'static>(provider: P) -> Self {
        Self {
            provider: Arc::new(provider),
            states: Arc::new(RwLock::new(HashMap::new())),
            polling: Arc::new(RwLock::new(HashSet::new())),
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_polls: DEFAULT_MAX_POLLS,
        }
    }

    /// Sets the pause between acquisition status checks.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets how many status checks an acquisition loop runs before giving up.
    pub fn with_max_polls(mut self, max_polls: u32) -> Self {
        self.max_polls = max_polls;
        self
    }

    /// Last known state for a source, without contacting the provider.
    pub async fn state(&self, source: SourceKey) -> CredentialState {
        self.states
            .read()
            .await
            .get(&source)
            .map(|status| status.state)
            .unwrap_or_default()
    }

    /// Last known status for a source, without contacting the provider.
    pub async fn last_known(&self, source: SourceKey) -> CredentialStatus {
        self.states
            .read()
            .await
            .get(&source)
            .cloned()
            .unwrap_or_default()
    }

    /// Returns true if the source's credential is ready to use.
    pub async fn ready(&self, source: SourceKey) -> bool {
        self.state(source).await == CredentialState::Ready
    }

    /// Returns true if an acquisition poll loop is running for the source.
    pub async fn is_polling(&self, source: SourceKey) -> bool {
        self.polling.read().await.contains(&source)
    }

    /// Last known status of every source the gate has seen.
    pub async fn snapshot(&self) -> HashMap<SourceKey, CredentialStatus> {
        self.states.read().await.clone()
    }

    /// Re-checks the provider and returns the updated status.
    ///
    /// If the check itself fails, the previous known status is retained and
    /// the error is returned; a failed check never resets a source to
    /// `unconfigured`. A source stays `acquiring` until the provider
    /// reports it ready.
    pub async fn status(&self, source: SourceKey) -> Result<CredentialStatus> {
        let reported = self.provider.check(source).await?;
        let mut states = self.states.write().await;
        let current = states.get(&source).map(|s| s.state).unwrap_or_default();
        let state = match reported.state {
            CredentialState::Ready => CredentialState::Ready,
            _ if current == CredentialState::Acquiring => CredentialState::Acquiring,
            other => other,
        };
        let status = CredentialStatus {
            state,
            detail: reported.detail,
        };
        states.insert(source, status.clone());
        Ok(status)
    }

    /// Starts the acquisition flow for a source and polls until it settles.
    ///
    /// A second call while a poll loop is already running is a no-op. If the
    /// provider fails to start the flow, the source reverts to
    /// `unconfigured` and the error is returned.
    pub async fn begin_acquisition(&self, source: SourceKey) -> Result<()> {
        {
            let mut polling = self.polling.write().await;
            if polling.contains(&source) {
                debug!("Credential acquisition for {} already running", source);
                return Ok(());
            }
            polling.insert(source);
        }

        self.states.write().await.insert(
            source,
            CredentialStatus::new(CredentialState::Acquiring, "acquisition started"),
        );

        if let Err(err) = self.provider.begin(source).await {
            self.states.write().await.insert(
                source,
                CredentialStatus::new(CredentialState::Unconfigured, "acquisition failed to start"),
            );
            self.polling.write().await.remove(&source);
            return Err(err);
        }

        info!("Started credential acquisition for {}", source);
        let gate = self.clone();
        tokio::spawn(async move {
            gate.poll_until_settled(source).await;
        });
        Ok(())
    }

    /// Resets a source to `unconfigured` and discards its stored credential.
    ///
    /// The state transition happens even if the provider fails to discard.
    pub async fn clear(&self, source: SourceKey) -> Result<()> {
        self.states
            .write()
            .await
            .insert(source, CredentialStatus::default());
        info!("Cleared credential for {}", source);
        self.provider.clear(source).await
    }

    async fn poll_until_settled(&self, source: SourceKey) {
        for _ in 0..self.max_polls {
            tokio::time::sleep(self.poll_interval).await;
            match self.status(source).await {
                Ok(status) if status.state == CredentialState::Acquiring => {}
                Ok(status) => {
                    info!("Credential state for {} settled at {:?}", source, status.state);
                    self.polling.write().await.remove(&source);
                    return;
                }
                Err(err) => {
                    warn!("Credential status check for {} failed: {}", source, err);
                }
            }
        }
        debug!(
            "Credential polling for {} stopped after {} checks",
            source, self.max_polls
        );
        self.polling.write().await.remove(&source);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SearchError;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    /// Provider whose check succeeds after a configurable number of calls.
    /// Clones share counters so tests can observe calls made by the gate.
    #[derive(Clone)]
    struct MockProvider {
        inner: Arc<MockState>,
    }

    struct MockState {
        configured_after: u32,
        checks: AtomicU32,
        begins: AtomicU32,
        clears: AtomicU32,
        fail_checks: AtomicBool,
    }

    impl MockProvider {
        fn new(configured_after: u32) -> Self {
            Self {
                inner: Arc::new(MockState {
                    configured_after,
                    checks: AtomicU32::new(0),
                    begins: AtomicU32::new(0),
                    clears: AtomicU32::new(0),
                    fail_checks: AtomicBool::new(false),
                }),
            }
        }

        fn never_configured() -> Self {
            Self::new(u32::MAX)
        }

        fn begins(&self) -> u32 {
            self.inner.begins.load(Ordering::SeqCst)
        }

        fn clears(&self) -> u32 {
            self.inner.clears.load(Ordering::SeqCst)
        }

        fn fail_checks(&self, fail: bool) {
            self.inner.fail_checks.store(fail, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl CredentialProvider for MockProvider {
        async fn check(&self, source: SourceKey) -> Result<CredentialStatus> {
            if self.inner.fail_checks.load(Ordering::SeqCst) {
                return Err(SearchError::upstream(source, "timeout", "status check failed"));
            }
            let n = self.inner.checks.fetch_add(1, Ordering::SeqCst) + 1;
            if n >= self.inner.configured_after {
                Ok(CredentialStatus::new(CredentialState::Ready, "logged in"))
            } else {
                Ok(CredentialStatus::new(
                    CredentialState::Unconfigured,
                    "no credential stored",
                ))
            }
        }

        async fn begin(&self, _source: SourceKey) -> Result<()> {
            self.inner.begins.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn clear(&self, _source: SourceKey) -> Result<()> {
            self.inner.clears.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    async fn wait_until_not_polling(gate: &CredentialGate, source: SourceKey) {
        for _ in 0..1000 {
            if !gate.is_polling(source).await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("poll loop for {} never finished", source);
    }

    #[tokio::test]
    async fn test_state_defaults_to_unconfigured() {
        let gate = CredentialGate::new(MockProvider::never_configured());
        assert_eq!(gate.state(SourceKey::Pixiv).await, CredentialState::Unconfigured);
        assert_eq!(gate.last_known(SourceKey::Pixiv).await, CredentialStatus::default());
        assert!(!gate.ready(SourceKey::Pixiv).await);
    }

    #[tokio::test]
    async fn test_status_reports_ready() {
        let gate = CredentialGate::new(MockProvider::new(1));
        let status = gate.status(SourceKey::Pixiv).await.unwrap();
        assert_eq!(status.state, CredentialState::Ready);
        assert_eq!(status.detail, "logged in");
        assert!(gate.ready(SourceKey::Pixiv).await);
    }

    #[tokio::test]
    async fn test_status_unconfigured_stays_unconfigured() {
        let gate = CredentialGate::new(MockProvider::never_configured());
        let status = gate.status(SourceKey::Lofter).await.unwrap();
        assert_eq!(status.state, CredentialState::Unconfigured);
    }

    #[tokio::test]
    async fn test_failed_check_retains_previous_state() {
        let provider = MockProvider::new(1);
        let gate = CredentialGate::new(provider.clone());
        gate.status(SourceKey::Pixiv).await.unwrap();
        assert!(gate.ready(SourceKey::Pixiv).await);

        provider.fail_checks(true);
        assert!(gate.status(SourceKey::Pixiv).await.is_err());
        assert_eq!(gate.state(SourceKey::Pixiv).await, CredentialState::Ready);
        assert_eq!(gate.last_known(SourceKey::Pixiv).await.detail, "logged in");
    }

    #[tokio::test(start_paused = true)]
    async fn test_begin_acquisition_polls_until_ready() {
        let gate = CredentialGate::new(MockProvider::new(3))
            .with_poll_interval(Duration::from_millis(50))
            .with_max_polls(10);
        gate.begin_acquisition(SourceKey::Pixiv).await.unwrap();
        assert_eq!(gate.state(SourceKey::Pixiv).await, CredentialState::Acquiring);

        wait_until_not_polling(&gate, SourceKey::Pixiv).await;
        assert_eq!(gate.state(SourceKey::Pixiv).await, CredentialState::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn test_begin_acquisition_is_single_flight() {
        let provider = MockProvider::never_configured();
        let gate = CredentialGate::new(provider.clone())
            .with_poll_interval(Duration::from_millis(50))
            .with_max_polls(3);
        gate.begin_acquisition(SourceKey::Lofter).await.unwrap();
        gate.begin_acquisition(SourceKey::Lofter).await.unwrap();

        wait_until_not_polling(&gate, SourceKey::Lofter).await;
        assert_eq!(provider.begins(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_loop_gives_up_after_max_polls() {
        let gate = CredentialGate::new(MockProvider::never_configured())
            .with_poll_interval(Duration::from_millis(50))
            .with_max_polls(4);
        gate.begin_acquisition(SourceKey::Pixiv).await.unwrap();

        wait_until_not_polling(&gate, SourceKey::Pixiv).await;
        // Still acquiring: the caller may re-poll manually.
        assert_eq!(gate.state(SourceKey::Pixiv).await, CredentialState::Acquiring);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_stops_polling() {
        let gate = CredentialGate::new(MockProvider::never_configured())
            .with_poll_interval(Duration::from_millis(50))
            .with_max_polls(100);
        gate.begin_acquisition(SourceKey::Pixiv).await.unwrap();
        gate.clear(SourceKey::Pixiv).await.unwrap();
        assert_eq!(gate.state(SourceKey::Pixiv).await, CredentialState::Unconfigured);

        wait_until_not_polling(&gate, SourceKey::Pixiv).await;
        assert_eq!(gate.state(SourceKey::Pixiv).await, CredentialState::Unconfigured);
    }

    #[tokio::test]
    async fn test_clear_resets_ready_source() {
        let provider = MockProvider::new(1);
        let gate = CredentialGate::new(provider.clone());
        gate.status(SourceKey::Pixiv).await.unwrap();
        assert!(gate.ready(SourceKey::Pixiv).await);

        gate.clear(SourceKey::Pixiv).await.unwrap();
        assert_eq!(gate.state(SourceKey::Pixiv).await, CredentialState::Unconfigured);
        assert_eq!(provider.clears(), 1);
    }

    #[tokio::test]
    async fn test_snapshot_lists_known_sources() {
        let gate = CredentialGate::new(MockProvider::new(1));
        gate.status(SourceKey::Pixiv).await.unwrap();
        gate.status(SourceKey::Lofter).await.unwrap();
        let snapshot = gate.snapshot().await;
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[&SourceKey::Pixiv].state, CredentialState::Ready);
    }

    #[test]
    fn test_credential_state_serialization() {
        assert_eq!(
            serde_json::to_string(&CredentialState::Acquiring).unwrap(),
            "\"acquiring\""
        );
        let state: CredentialState = serde_json::from_str("\"ready\"").unwrap();
        assert_eq!(state, CredentialState::Ready);
    }
}
