//! Example: Retry behavior and credential gating for unreliable sources.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use ficweave::{
    CredentialGate, CredentialProvider, CredentialState, CredentialStatus, PageRequest, Result,
    SearchError, SearchQuery, SearchSession, SourceAdapter, SourceKey, SourcePage, Story, TagRule,
};

/// Source that rejects the first few calls before serving its page.
struct FlakySource {
    key: SourceKey,
    failures: AtomicU32,
    signature: &'static str,
    calls: AtomicU32,
}

impl FlakySource {
    fn new(key: SourceKey, failures: u32, signature: &'static str) -> Self {
        Self {
            key,
            failures: AtomicU32::new(failures),
            signature,
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl SourceAdapter for FlakySource {
    fn key(&self) -> SourceKey {
        self.key
    }

    async fn fetch_page(&self, _request: &PageRequest) -> Result<SourcePage> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            println!("  ({} call {} rejected with {})", self.key, call, self.signature);
            return Err(SearchError::upstream(
                self.key,
                self.signature,
                "upstream rejected the request",
            ));
        }
        println!("  ({} call {} served)", self.key, call);
        let stories = vec![Story::new(
            self.key,
            format!("{}-1", self.key),
            format!("Story from {}", self.key),
        )];
        Ok(SourcePage::new(stories, false))
    }
}

/// Login flow stand-in that flips to ready when the demo confirms it.
#[derive(Clone)]
struct DemoLogin {
    ready: Arc<AtomicBool>,
}

impl DemoLogin {
    fn new() -> Self {
        Self {
            ready: Arc::new(AtomicBool::new(false)),
        }
    }

    fn log_in(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl CredentialProvider for DemoLogin {
    async fn check(&self, _source: SourceKey) -> Result<CredentialStatus> {
        if self.ready.load(Ordering::SeqCst) {
            Ok(CredentialStatus::new(CredentialState::Ready, "cookie stored"))
        } else {
            Ok(CredentialStatus::new(
                CredentialState::Unconfigured,
                "no cookie stored",
            ))
        }
    }

    async fn begin(&self, _source: SourceKey) -> Result<()> {
        Ok(())
    }

    async fn clear(&self, _source: SourceKey) -> Result<()> {
        self.ready.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing for debug output
    tracing_subscriber::fmt::init();

    let mut session = SearchSession::new();
    // Bilibili rejects twice with a risk-control code its catalog profile
    // retries; ao3 fails once with a server error that is not retried.
    session.add_source(FlakySource::new(SourceKey::Bilibili, 2, "-352"));
    session.add_source(FlakySource::new(SourceKey::Ao3, 1, "503"));

    let query = SearchQuery::new()
        .with_rule(SourceKey::Ao3, TagRule::new(vec!["canon divergence"]))
        .with_rule(SourceKey::Bilibili, TagRule::new(vec!["全员向"]));
    session.set_query(query);

    println!("Searching with flaky sources...");
    session.search(true).await?;
    session.settled().await;

    let snapshot = session.snapshot();
    println!();
    println!("Merged {} stories", snapshot.stories.len());
    for source in [SourceKey::Bilibili, SourceKey::Ao3] {
        match session.source_status(source).error {
            Some(error) => println!("  {}: failed ({})", source, error),
            None => println!("  {}: ok", source),
        }
    }

    // The risk-control rejections were retried automatically; the server
    // error was not. A manual retry re-fetches only what is missing.
    println!();
    println!("Retrying the failed source...");
    session.retry().await;
    session.settled().await;

    let snapshot = session.snapshot();
    println!();
    println!("Merged {} stories after retry", snapshot.stories.len());
    for story in &snapshot.stories {
        println!("  [{}] {}", story.source, story.title);
    }

    // Pixiv needs a stored login; with a gate attached, the session fails
    // the source locally instead of sending doomed requests.
    println!();
    println!("Adding a credential gated source...");
    let login = DemoLogin::new();
    let gate = CredentialGate::new(login.clone());
    session.set_credential_gate(gate.clone());
    session.add_source(FlakySource::new(SourceKey::Pixiv, 0, "503"));
    session.set_query(
        SearchQuery::new()
            .with_rule(SourceKey::Ao3, TagRule::new(vec!["canon divergence"]))
            .with_rule(SourceKey::Bilibili, TagRule::new(vec!["全员向"]))
            .with_rule(SourceKey::Pixiv, TagRule::new(vec!["現代パロ"])),
    );

    session.search(true).await?;
    session.settled().await;
    match session.source_status(SourceKey::Pixiv).error {
        Some(error) => println!("  pixiv blocked: {}", error),
        None => println!("  pixiv: ok"),
    }

    println!();
    println!("Confirming the login and searching again...");
    login.log_in();
    let status = gate.status(SourceKey::Pixiv).await?;
    println!("  pixiv credential: {:?} ({})", status.state, status.detail);

    session.search(true).await?;
    session.settled().await;

    let snapshot = session.snapshot();
    println!();
    println!("Merged {} stories with pixiv unlocked", snapshot.stories.len());
    for story in &snapshot.stories {
        println!("  [{}] {}", story.source, story.title);
    }

    Ok(())
}
