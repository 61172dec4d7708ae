//! End-to-end extraction tests against a mock paginated API.

use chrono::NaiveDate;
use flate2::read::GzDecoder;
use omx_extract::config::ExtractConfig;
use omx_extract::error::ExtractError;
use omx_extract::orchestrator::Orchestrator;
use omx_extract::partition::{Partition, NO_SAMPLES_MARKER};
use omx_extract::retry::RetryPolicy;
use omx_extract::source::SourceSpec;
use serde_json::{json, Value};
use std::io::BufRead;
use std::path::Path;
use std::time::{Duration, Instant};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2021, 1, d).unwrap()
}

fn sample(accession: &str) -> Value {
    json!({
        "accession": accession,
        "name": accession,
        "update": "2021-01-01T12:00:00Z",
        "taxId": 9606,
        "characteristics": {
            "organism": [{"text": "Homo sapiens"}]
        }
    })
}

fn page(samples: Vec<Value>, next: Option<String>) -> Value {
    let mut body = json!({"_links": {}});
    if !samples.is_empty() {
        body["_embedded"] = json!({ "samples": samples });
    }
    if let Some(href) = next {
        body["_links"]["next"] = json!({ "href": href });
    }
    body
}

fn filter_for(d: NaiveDate) -> String {
    format!(
        "dt:update:from={}until={}",
        d.format("%Y-%m-%d"),
        d.format("%Y-%m-%d")
    )
}

fn test_config(output_dir: &Path, as_of: NaiveDate) -> ExtractConfig {
    let mut config = ExtractConfig::new(output_dir);
    config.concurrency = 2;
    config.start_date = Some(day(1));
    config.as_of = Some(as_of);
    config.retry = RetryPolicy {
        max_attempts: 10,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
    };
    config
}

fn mock_source(server: &MockServer) -> SourceSpec {
    SourceSpec::ebi_biosamples().with_base_url(format!("{}/samples", server.uri()))
}

fn partition_for(d: NaiveDate) -> Partition {
    Partition::new("biosamples", d, d)
}

fn read_ndjson_gz(path: &Path) -> Vec<Value> {
    let file = std::fs::File::open(path).unwrap();
    let reader = std::io::BufReader::new(GzDecoder::new(file));
    reader
        .lines()
        .map(|line| serde_json::from_str(&line.unwrap()).unwrap())
        .collect()
}

async fn request_count(server: &MockServer) -> usize {
    server.received_requests().await.unwrap_or_default().len()
}

/// Three-day run: day 1 has records, day 2 is empty, day 3 needs two retries.
/// A second run afterwards issues zero additional HTTP requests.
#[tokio::test]
async fn three_day_run_with_retries_and_idempotent_rerun() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path("/samples"))
        .and(query_param("filter", filter_for(day(1))))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(
            vec![sample("SAMEA1"), sample("SAMEA2"), sample("SAMEA3")],
            None,
        )))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/samples"))
        .and(query_param("filter", filter_for(day(2))))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(vec![], None)))
        .mount(&server)
        .await;

    // Day 3 fails twice with a 500 before succeeding.
    Mock::given(method("GET"))
        .and(path("/samples"))
        .and(query_param("filter", filter_for(day(3))))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/samples"))
        .and(query_param("filter", filter_for(day(3))))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(page(vec![sample("SAMEA4")], None)),
        )
        .mount(&server)
        .await;

    let config = test_config(dir.path(), day(3));
    let summary = Orchestrator::new(config.clone(), mock_source(&server))
        .unwrap()
        .run()
        .await
        .unwrap();

    assert!(summary.is_ok());
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.empty, 1);
    assert_eq!(summary.skipped, 0);

    let day1 = partition_for(day(1));
    let records = read_ndjson_gz(&day1.data_path(dir.path()));
    assert_eq!(records.len(), 3);

    let day2 = partition_for(day(2));
    assert!(!day2.data_path(dir.path()).exists());
    let marker = std::fs::read_to_string(day2.checkpoint_path(dir.path())).unwrap();
    assert_eq!(marker, NO_SAMPLES_MARKER);

    let day3 = partition_for(day(3));
    assert_eq!(read_ndjson_gz(&day3.data_path(dir.path())).len(), 1);

    // 1 request for day 1, 1 for day 2, 3 for day 3 (two 500s, one success).
    let requests_after_first_run = request_count(&server).await;
    assert_eq!(requests_after_first_run, 5);

    let rerun = Orchestrator::new(config, mock_source(&server))
        .unwrap()
        .run()
        .await
        .unwrap();
    assert!(rerun.is_ok());
    assert_eq!(rerun.skipped, 3);
    assert_eq!(rerun.succeeded + rerun.empty, 0);
    assert_eq!(request_count(&server).await, requests_after_first_run);
}

/// A record without an accession is dropped with a warning; the rest of the
/// page is still written and the partition reaches Done.
#[tokio::test]
async fn malformed_record_is_dropped_not_fatal() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path("/samples"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(
            vec![
                sample("SAMEA1"),
                json!({"name": "missing accession"}),
                sample("SAMEA2"),
            ],
            None,
        )))
        .mount(&server)
        .await;

    let config = test_config(dir.path(), day(1));
    let summary = Orchestrator::new(config, mock_source(&server))
        .unwrap()
        .run()
        .await
        .unwrap();

    assert!(summary.is_ok());
    assert_eq!(summary.succeeded, 1);

    let records = read_ndjson_gz(&partition_for(day(1)).data_path(dir.path()));
    assert_eq!(records.len(), 2);
    let accessions: Vec<_> = records.iter().map(|r| r["accession"].clone()).collect();
    assert_eq!(accessions, vec![json!("SAMEA1"), json!("SAMEA2")]);
}

/// A non-429 4xx is not retried: the partition fails after one request and
/// leaves no checkpoint, so the next run would try it again.
#[tokio::test]
async fn permanent_rejection_fails_partition_without_retry() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path("/samples"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such collection"))
        .mount(&server)
        .await;

    let config = test_config(dir.path(), day(1));
    let summary = Orchestrator::new(config, mock_source(&server))
        .unwrap()
        .run()
        .await
        .unwrap();

    assert!(!summary.is_ok());
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].0, "biosamples-2021-01-01--2021-01-01--daily");
    assert_eq!(request_count(&server).await, 1);

    let partition = partition_for(day(1));
    assert!(!partition.is_checkpointed(dir.path()));
    assert!(!partition.data_path(dir.path()).exists());
}

/// One failing partition does not abort its siblings.
#[tokio::test]
async fn partition_failures_are_isolated() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path("/samples"))
        .and(query_param("filter", filter_for(day(1))))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad filter"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/samples"))
        .and(query_param("filter", filter_for(day(2))))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(page(vec![sample("SAMEA9")], None)),
        )
        .mount(&server)
        .await;

    let config = test_config(dir.path(), day(2));
    let summary = Orchestrator::new(config, mock_source(&server))
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.succeeded, 1);
    assert!(partition_for(day(2)).is_checkpointed(dir.path()));
    assert!(!partition_for(day(1)).is_checkpointed(dir.path()));
}

/// The fetcher follows the next link until the source stops supplying one,
/// and all pages land in the same partition file.
#[tokio::test]
async fn pagination_follows_next_links() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    let page2_url = format!("{}/samples?cursor=page2", server.uri());
    Mock::given(method("GET"))
        .and(path("/samples"))
        .and(query_param("cursor", "*"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(
            vec![sample("SAMEA1"), sample("SAMEA2")],
            Some(page2_url),
        )))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/samples"))
        .and(query_param("cursor", "page2"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(page(vec![sample("SAMEA3")], None)),
        )
        .mount(&server)
        .await;

    let config = test_config(dir.path(), day(1));
    let summary = Orchestrator::new(config, mock_source(&server))
        .unwrap()
        .run()
        .await
        .unwrap();

    assert!(summary.is_ok());
    let records = read_ndjson_gz(&partition_for(day(1)).data_path(dir.path()));
    assert_eq!(records.len(), 3);
    assert_eq!(request_count(&server).await, 2);
}

/// A filesystem failure during commit is fatal to the run: scheduling stops
/// and the error surfaces at run level instead of being counted as an
/// ordinary partition failure. No checkpoint is written for the partition.
#[tokio::test]
async fn filesystem_failure_aborts_the_run() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path("/samples"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(page(vec![sample("SAMEA1")], None)),
        )
        .mount(&server)
        .await;

    // A directory squatting on the tmp path makes the serialization step
    // fail with an I/O error, like a permission or disk problem would.
    let blocked = partition_for(day(1));
    std::fs::create_dir_all(blocked.tmp_path(dir.path())).unwrap();

    let config = test_config(dir.path(), day(2));
    let result = Orchestrator::new(config, mock_source(&server))
        .unwrap()
        .run()
        .await;

    assert!(matches!(result, Err(ExtractError::Io(_))));
    assert!(!blocked.is_checkpointed(dir.path()));
}

/// With a concurrency limit of one, partitions are processed strictly one at
/// a time: total elapsed time is at least the sum of the per-day delays.
#[tokio::test]
async fn concurrency_limit_of_one_serializes_partitions() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path("/samples"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(page(vec![], None))
                .set_delay(Duration::from_millis(150)),
        )
        .mount(&server)
        .await;

    let mut config = test_config(dir.path(), day(4));
    config.concurrency = 1;

    let started = Instant::now();
    let summary = Orchestrator::new(config, mock_source(&server))
        .unwrap()
        .run()
        .await
        .unwrap();
    let elapsed = started.elapsed();

    assert!(summary.is_ok());
    assert_eq!(summary.empty, 4);
    assert!(
        elapsed >= Duration::from_millis(600),
        "4 serialized partitions finished in {:?}",
        elapsed
    );
}
