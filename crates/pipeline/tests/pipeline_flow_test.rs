//! End-to-end pipeline flow against a real PostgreSQL instance.
//!
//! All tests are `#[ignore]` by default; run them with
//! `cargo test -- --ignored` and `DATABASE_URL` pointing at a scratch
//! database. Tests create their own uniquely-named rows so they can
//! share a database and survive reruns.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use depesche_core::SourceType;
use depesche_pipeline::{handle_feed_created, handle_raw_posts_created, RelayProcessor};
use depesche_rohrpost::events::{FeedCreated, RawPostsCreated, SourceRef};
use depesche_rohrpost::{subjects, Envelope, QueuePublisher, RohrpostError};
use depesche_store::{FeedStore, NewRawPost, OffsetStore, PostStore, RawPostStore, SourceStore};
use sqlx::PgPool;
use uuid::Uuid;

async fn test_pool() -> PgPool {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for ignored tests");
    let pool = PgPool::connect(&url).await.expect("connect");
    sqlx::migrate!("../../migrations")
        .run(&pool)
        .await
        .expect("migrate");
    pool
}

#[derive(Default)]
struct RecordingPublisher {
    published: Mutex<Vec<Envelope>>,
}

impl RecordingPublisher {
    fn count(&self, subject: &str) -> usize {
        self.published
            .lock()
            .unwrap()
            .iter()
            .filter(|envelope| envelope.subject == subject)
            .count()
    }
}

#[async_trait]
impl QueuePublisher for RecordingPublisher {
    async fn publish(&self, envelope: &Envelope) -> Result<(), RohrpostError> {
        self.published.lock().unwrap().push(envelope.clone());
        Ok(())
    }

    async fn publish_delayed(
        &self,
        envelope: &Envelope,
        _deliver_at: DateTime<Utc>,
    ) -> Result<(), RohrpostError> {
        self.published.lock().unwrap().push(envelope.clone());
        Ok(())
    }
}

fn raw_item(tag: &str) -> NewRawPost {
    NewRawPost {
        unique_code: format!("rss_{tag}_{}", Uuid::new_v4().simple()),
        title: Some(format!("post {tag}")),
        content: format!("content {tag}"),
        url: Some(format!("https://example.org/items/{tag}/{}", Uuid::new_v4())),
        author: None,
        published_at: Some(Utc::now()),
    }
}

#[tokio::test]
#[ignore = "requires DATABASE_URL pointing at a PostgreSQL instance"]
async fn feed_lifecycle_from_bootstrap_to_incremental_passes() {
    let pool = test_pool().await;
    let publisher = RecordingPublisher::default();
    let processor = RelayProcessor;

    // A source with a three-post backlog, as if polled for a while.
    let url = format!("https://example.org/pipeline/{}", Uuid::new_v4());
    let source = SourceStore::get_or_create(&pool, SourceType::Rss, &url, None)
        .await
        .unwrap();
    let backlog = RawPostStore::insert_batch(
        &pool,
        source.id,
        &[raw_item("a"), raw_item("b"), raw_item("c")],
    )
    .await
    .unwrap();
    assert_eq!(backlog.len(), 3);

    // A user surface announces a feed over that source.
    let announcement = FeedCreated {
        feed_id: Uuid::new_v4(),
        pipeline_id: Uuid::new_v4(),
        user_id: Uuid::new_v4(),
        sources: vec![SourceRef {
            source_type: SourceType::Rss,
            url: url.clone(),
        }],
        prompt_text: String::new(),
        feed_type: "relay".into(),
    };
    let created_envelope = Envelope::new(subjects::FEED_CREATED, &announcement).unwrap();

    handle_feed_created(&pool, &publisher, &processor, &created_envelope, 2, 60)
        .await
        .unwrap();

    // The feed exists and its source is linked and boosted.
    let feed = FeedStore::get(&pool, announcement.feed_id).await.unwrap();
    assert_eq!(feed.pipeline_id, announcement.pipeline_id);
    let boosted = SourceStore::get(&pool, source.id).await.unwrap();
    assert!(boosted.boost_active(Utc::now()));

    // Initial sync took the two newest backlog rows, announced once,
    // and seeded the offset at the newest row.
    let posts = PostStore::list_for_feed(&pool, feed.id, 10).await.unwrap();
    assert_eq!(posts.len(), 2);
    assert_eq!(publisher.count(subjects::FEED_INITIAL_SYNC), 1);
    let offset = OffsetStore::get(&pool, feed.pipeline_id, source.id)
        .await
        .unwrap()
        .expect("offset seeded");
    assert_eq!(offset.last_post_id, backlog[2].id);

    // A redelivered announcement is a no-op.
    handle_feed_created(&pool, &publisher, &processor, &created_envelope, 2, 60)
        .await
        .unwrap();
    assert_eq!(
        PostStore::list_for_feed(&pool, feed.id, 10).await.unwrap().len(),
        2
    );
    assert_eq!(publisher.count(subjects::FEED_INITIAL_SYNC), 1);

    // A poll stores two fresh raw posts and announces them.
    let fresh = RawPostStore::insert_batch(&pool, source.id, &[raw_item("d"), raw_item("e")])
        .await
        .unwrap();
    let event = RawPostsCreated {
        source_id: source.id,
        raw_post_ids: fresh.iter().map(|raw| raw.id).collect(),
        source_type: SourceType::Rss,
    };
    let raw_envelope = Envelope::new(subjects::RAW_POST_CREATED, &event).unwrap();

    handle_raw_posts_created(&pool, &publisher, &processor, &raw_envelope, 50)
        .await
        .unwrap();

    // The pass produced exactly the fresh posts, announced each, and
    // advanced the offset past them.
    let posts = PostStore::list_for_feed(&pool, feed.id, 10).await.unwrap();
    assert_eq!(posts.len(), 4);
    assert_eq!(publisher.count(subjects::POST_CREATED), 2);
    let offset = OffsetStore::get(&pool, feed.pipeline_id, source.id)
        .await
        .unwrap()
        .expect("offset advanced");
    assert_eq!(offset.last_post_id, fresh[1].id);

    // Redelivering the same event double-produces nothing: the offset
    // already sits past the batch.
    handle_raw_posts_created(&pool, &publisher, &processor, &raw_envelope, 50)
        .await
        .unwrap();
    assert_eq!(
        PostStore::list_for_feed(&pool, feed.id, 10).await.unwrap().len(),
        4
    );
    assert_eq!(publisher.count(subjects::POST_CREATED), 2);
    let replayed = OffsetStore::get(&pool, feed.pipeline_id, source.id)
        .await
        .unwrap()
        .expect("offset unchanged");
    assert_eq!(replayed.last_post_id, fresh[1].id);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL pointing at a PostgreSQL instance"]
async fn sources_without_feeds_consume_cleanly() {
    let pool = test_pool().await;
    let publisher = RecordingPublisher::default();

    let source = SourceStore::get_or_create(
        &pool,
        SourceType::Website,
        &format!("https://example.org/orphan/{}", Uuid::new_v4()),
        None,
    )
    .await
    .unwrap();
    let rows = RawPostStore::insert_batch(&pool, source.id, &[raw_item("orphan")])
        .await
        .unwrap();

    let event = RawPostsCreated {
        source_id: source.id,
        raw_post_ids: rows.iter().map(|raw| raw.id).collect(),
        source_type: SourceType::Website,
    };
    let envelope = Envelope::new(subjects::RAW_POST_CREATED, &event).unwrap();

    handle_raw_posts_created(&pool, &publisher, &RelayProcessor, &envelope, 50)
        .await
        .unwrap();

    assert_eq!(publisher.count(subjects::POST_CREATED), 0);
}
