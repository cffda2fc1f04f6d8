//! Integration tests for `GelfHttpShipper` using wiremock HTTP mocks.

use chrono::Utc;
use secops_collect::{EventShipper, GelfHttpShipper, ShipError};
use secops_core::NormalizedRecord;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn records(count: usize) -> Vec<NormalizedRecord> {
    (0..count)
        .map(|i| NormalizedRecord {
            integration: "duo".to_string(),
            customer_code: "00001".to_string(),
            observed_at: Utc::now(),
            payload: serde_json::json!({ "seq": i }),
        })
        .collect()
}

fn shipper(server: &MockServer, max_retries: u32) -> GelfHttpShipper {
    GelfHttpShipper::new(&format!("{}/gelf", server.uri()), 5, max_retries, 0)
        .expect("shipper construction")
}

#[tokio::test]
async fn ships_each_record_as_gelf_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/gelf"))
        .and(body_partial_json(serde_json::json!({
            "version": "1.1",
            "_integration": "duo",
            "_customer_code": "00001"
        })))
        .respond_with(ResponseTemplate::new(202))
        .expect(3)
        .mount(&server)
        .await;

    let shipped = shipper(&server, 0).ship(&records(3)).await.expect("ship");
    assert_eq!(shipped, 3);
}

#[tokio::test]
async fn retries_unavailable_pipeline() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(202))
        .mount(&server)
        .await;

    let shipped = shipper(&server, 3).ship(&records(1)).await.expect("ship");
    assert_eq!(shipped, 1);
}

#[tokio::test]
async fn rejected_record_stops_batch_without_retry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400))
        .expect(1)
        .mount(&server)
        .await;

    let err = shipper(&server, 3).ship(&records(4)).await.unwrap_err();
    match err {
        ShipError::Partial {
            shipped,
            total,
            source,
        } => {
            assert_eq!(shipped, 0);
            assert_eq!(total, 4);
            assert!(matches!(*source, ShipError::Rejected { status: 400 }));
        }
        other => panic!("expected partial failure, got {other:?}"),
    }
}

#[tokio::test]
async fn exhausted_retries_report_delivered_prefix() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(202))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let err = shipper(&server, 1).ship(&records(5)).await.unwrap_err();
    assert_eq!(err.shipped(), 2);
}
