//! Integration tests for the crawl pipeline
//!
//! These tests use wiremock as the origin server and run both workers
//! against in-memory and SQLite-backed queues and stores.

use site_crawler::config::{
    BlobConfig, Config, FetchConfig, MetadataConfig, ProcessConfig, QueueConfig,
};
use site_crawler::crawler::{
    content_hash, fetch_loop, fetch_worker, process_loop, process_worker, seed,
};
use site_crawler::queue::{Consumer, CrawlMessage, MemoryQueue, SqliteQueue};
use site_crawler::storage::{
    BlobStore, ContentStore, FsBlobStore, MemoryBlobStore, MemoryMetadataStore, MetadataStore,
    SqliteMetadataStore,
};
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration; retries are immediate so tests stay fast
fn create_test_config(dir: &std::path::Path) -> Config {
    Config {
        queue: QueueConfig {
            database_path: dir.join("queue.db").display().to_string(),
            fetch_topic: "site-fetch".to_string(),
            process_topic: "site-process".to_string(),
            dead_letter_topic: "site-fetch-dlq".to_string(),
            partitions: 2,
            batch_size: 4,
            poll_interval_ms: 10,
        },
        metadata: MetadataConfig {
            database_path: dir.join("metadata.db").display().to_string(),
        },
        blobs: BlobConfig {
            root: dir.join("blobs").display().to_string(),
        },
        fetch: FetchConfig {
            retry_delay_ms: 0,
            ..FetchConfig::default()
        },
        process: ProcessConfig::default(),
    }
}

struct MemoryPipeline {
    config: Config,
    queue: Arc<MemoryQueue>,
    metadata: Arc<MemoryMetadataStore>,
    blobs: Arc<MemoryBlobStore>,
    store: ContentStore,
}

fn memory_pipeline() -> MemoryPipeline {
    let config = create_test_config(std::path::Path::new("unused"));
    let queue = Arc::new(MemoryQueue::new(config.queue.partitions));
    let metadata = Arc::new(MemoryMetadataStore::new());
    let blobs = Arc::new(MemoryBlobStore::new());
    let store = ContentStore::new(metadata.clone(), blobs.clone());

    MemoryPipeline {
        config,
        queue,
        metadata,
        blobs,
        store,
    }
}

fn fetch_links(queue: &MemoryQueue, topic: &str) -> Vec<String> {
    queue
        .payloads(topic)
        .iter()
        .map(|p| CrawlMessage::decode(p.as_bytes()).unwrap().link)
        .collect()
}

#[tokio::test]
async fn test_first_fetch_stores_once_and_refetch_is_silent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<p>home</p>"))
        .mount(&server)
        .await;

    let p = memory_pipeline();
    let worker = fetch_worker(&p.config, p.queue.clone(), p.store.clone()).unwrap();
    let consume = fetch_loop(&p.config, p.queue.clone());
    let home = format!("{}/", server.uri());

    seed(p.queue.as_ref(), "site-fetch", [&home]).await.unwrap();
    assert_eq!(consume.drain(&worker).await.unwrap(), 1);

    let key = format!("{}/", server.address());
    assert_eq!(p.metadata.write_count(), 1);
    assert_eq!(p.blobs.write_count(), 1);
    assert_eq!(p.queue.payloads("site-process"), vec![key.clone()]);

    // Same content again: no writes, no processing
    seed(p.queue.as_ref(), "site-fetch", [&home]).await.unwrap();
    assert_eq!(consume.drain(&worker).await.unwrap(), 1);

    assert_eq!(p.metadata.write_count(), 1);
    assert_eq!(p.blobs.write_count(), 1);
    assert_eq!(p.queue.payloads("site-process").len(), 1);

    let record = p.metadata.get_record(&key).await.unwrap().unwrap();
    assert_eq!(record.content_hash, content_hash(b"<p>home</p>"));
}

#[tokio::test]
async fn test_processing_expands_frontier_and_records_text() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!(
            r#"<html><head><style>p {{ color: red }}</style></head><body>
            <p>Welcome<br>home</p>
            <a href="{base}/page1">Page 1</a>
            <a href="{base}/page2?utm=x">Page 2</a>
            <a href="/local">Local</a>
            <script>track()</script>
            </body></html>"#
        )))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/page1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<p>one</p>"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/page2"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<p>two</p>"))
        .mount(&server)
        .await;

    let p = memory_pipeline();
    let fetcher = fetch_worker(&p.config, p.queue.clone(), p.store.clone()).unwrap();
    let processor = process_worker(&p.config, p.queue.clone(), p.store.clone());
    let fetch = fetch_loop(&p.config, p.queue.clone());
    let process = process_loop(&p.config, p.queue.clone());

    seed(p.queue.as_ref(), "site-fetch", [format!("{}/", base)])
        .await
        .unwrap();
    fetch.drain(&fetcher).await.unwrap();
    assert_eq!(process.drain(&processor).await.unwrap(), 1);

    let host = server.address().to_string();
    let discovered = fetch_links(&p.queue, "site-fetch");
    assert_eq!(
        discovered[1..],
        [
            format!("{}/page1", base),
            format!("{}/page2?utm=x", base),
            format!("{}/local", host),
        ]
    );

    let home = p
        .metadata
        .get_record(&format!("{}/", host))
        .await
        .unwrap()
        .unwrap();
    let content = home.content.unwrap();
    assert!(content.contains("Welcome \nhome"));
    assert!(!content.contains("track()"));
    assert!(!content.contains("color"));
    assert!(home.last_updated.is_some());

    // The scheme-less local link is fetched over https and fails against the
    // plain-http mock; the two absolute links are stored and queued
    fetch.drain(&fetcher).await.unwrap();
    assert!(p
        .metadata
        .get_record(&format!("{}/page1", host))
        .await
        .unwrap()
        .is_some());
    assert!(p
        .metadata
        .get_record(&format!("{}/page2", host))
        .await
        .unwrap()
        .is_some());

    let processed: Vec<String> = p.queue.payloads("site-process");
    assert!(processed.contains(&format!("{}/page1", host)));
    assert!(processed.contains(&format!("{}/page2", host)));
}

#[tokio::test]
async fn test_failing_origin_is_retried_then_dead_lettered() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(404))
        .expect(6)
        .mount(&server)
        .await;

    let p = memory_pipeline();
    let worker = fetch_worker(&p.config, p.queue.clone(), p.store.clone()).unwrap();
    let consume = fetch_loop(&p.config, p.queue.clone());
    let link = format!("{}/broken", server.uri());

    seed(p.queue.as_ref(), "site-fetch", [&link]).await.unwrap();
    let handled = consume.drain(&worker).await.unwrap();

    assert_eq!(handled, 6);
    assert_eq!(p.queue.payloads("site-fetch-dlq"), vec![link]);
    assert!(p.queue.payloads("site-process").is_empty());
    assert_eq!(p.metadata.write_count(), 0);

    let retry_counts: Vec<u32> = p
        .queue
        .payloads("site-fetch")
        .iter()
        .map(|payload| CrawlMessage::decode(payload.as_bytes()).unwrap().retry_count)
        .collect();
    assert_eq!(retry_counts, vec![0, 1, 2, 3, 4, 5]);

    server.verify().await;
}

#[tokio::test]
async fn test_durable_backends_end_to_end() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/doc"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<h1>Docs</h1><a href="/doc/intro">Intro</a>"#,
        ))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(dir.path());

    let queue = Arc::new(
        SqliteQueue::new(
            std::path::Path::new(&config.queue.database_path),
            config.queue.partitions,
        )
        .unwrap(),
    );
    let metadata = Arc::new(
        SqliteMetadataStore::new(std::path::Path::new(&config.metadata.database_path)).unwrap(),
    );
    let blobs = Arc::new(FsBlobStore::new(&config.blobs.root));
    let store = ContentStore::new(metadata.clone(), blobs.clone());

    let fetcher = fetch_worker(&config, queue.clone(), store.clone()).unwrap();
    let processor = process_worker(&config, queue.clone(), store);
    let fetch = fetch_loop(&config, queue.clone());
    let process = process_loop(&config, queue.clone());

    seed(queue.as_ref(), &config.queue.fetch_topic, [format!("{}/doc", server.uri())])
        .await
        .unwrap();
    assert_eq!(fetch.drain(&fetcher).await.unwrap(), 1);
    assert_eq!(process.drain(&processor).await.unwrap(), 1);

    let key = format!("{}/doc", server.address());
    let record = metadata.get_record(&key).await.unwrap().unwrap();
    assert_eq!(record.content.as_deref(), Some("Docs Intro "));
    assert_eq!(
        blobs.get_blob(&key).await.unwrap().unwrap(),
        br#"<h1>Docs</h1><a href="/doc/intro">Intro</a>"#.to_vec()
    );

    assert_eq!(metadata.count_records().await.unwrap(), 1);
    assert_eq!(queue.topic_len(&config.queue.fetch_topic).await.unwrap(), 2);
    assert_eq!(
        queue
            .backlog(fetch.group(), &config.queue.fetch_topic)
            .await
            .unwrap(),
        1
    );
    assert_eq!(
        queue
            .backlog(process.group(), &config.queue.process_topic)
            .await
            .unwrap(),
        0
    );
}
