//! Example: Tag search merged across two fan fiction sources.

use async_trait::async_trait;
use ficweave::{
    PageRequest, Result, SearchQuery, SearchSession, SourceAdapter, SourceKey, SourcePage, Story,
    TagRule,
};

/// In-memory source with a fixed shelf of stories, two per page.
struct DemoArchive {
    key: SourceKey,
    titles: Vec<&'static str>,
}

impl DemoArchive {
    fn new(key: SourceKey, titles: Vec<&'static str>) -> Self {
        Self { key, titles }
    }
}

#[async_trait]
impl SourceAdapter for DemoArchive {
    fn key(&self) -> SourceKey {
        self.key
    }

    async fn fetch_page(&self, request: &PageRequest) -> Result<SourcePage> {
        let per_page = 2usize;
        let start = ((request.page - 1) as usize) * per_page;
        let stories: Vec<Story> = self
            .titles
            .iter()
            .enumerate()
            .skip(start)
            .take(per_page)
            .map(|(i, title)| {
                Story::new(self.key, format!("{}-{}", self.key, i + 1), *title)
                    .with_author("demo")
                    .with_tags(request.tags.clone())
            })
            .collect();
        let has_more = start + per_page < self.titles.len();
        Ok(SourcePage::new(stories, has_more))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing for debug output
    tracing_subscriber::fmt::init();

    // Create a session and register two sources
    let mut session = SearchSession::new();
    session.add_source(DemoArchive::new(
        SourceKey::Ao3,
        vec![
            "Five Times the Clock Turned Back",
            "The Long Road Home",
            "Paper Cranes",
        ],
    ));
    session.add_source(DemoArchive::new(
        SourceKey::Bilibili,
        vec!["重来一次", "雪夜归人"],
    ));

    println!("Configured {} sources", session.source_count());

    // Per-source tag rules; each source searches its own tag vocabulary
    let query = SearchQuery::new()
        .with_rule(SourceKey::Ao3, TagRule::new(vec!["time travel fix-it"]))
        .with_rule(SourceKey::Bilibili, TagRule::new(vec!["时间旅行"]));
    session.set_query(query);

    // Fan out and wait for every source to settle
    session.search(true).await?;
    session.settled().await;

    let snapshot = session.snapshot();
    println!();
    println!(
        "Merged {} stories on page {} (has_more: {})",
        snapshot.stories.len(),
        snapshot.page,
        snapshot.has_more
    );
    for (i, story) in snapshot.stories.iter().enumerate() {
        println!("{}. [{}] {}", i + 1, story.source, story.title);
    }

    // Pull the next page from every source that reported more
    session.load_more().await;
    session.settled().await;

    let snapshot = session.snapshot();
    println!();
    println!(
        "After load_more: {} stories (has_more: {})",
        snapshot.stories.len(),
        snapshot.has_more
    );
    for (i, story) in snapshot.stories.iter().enumerate() {
        println!("{}. [{}] {}", i + 1, story.source, story.title);
    }

    Ok(())
}
