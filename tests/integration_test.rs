//! Integration tests for the Commvault client and poller
//!
//! These tests use mockito to simulate Commvault API responses

use commvault_exporter::{
    client::CommvaultClient,
    config::CommvaultConfig,
    metrics::MetricsCollector,
    poller::{FetchStatus, Poller},
    snapshot::SnapshotStore,
    CommvaultError,
};
use mockito::{Matcher, Server, ServerGuard};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const TOKEN: &str = "QSDK 3f2a9c";

/// Helper to create a test config pointing to mock server
fn create_test_config(server_url: &str) -> CommvaultConfig {
    CommvaultConfig {
        base_url: format!("{}/", server_url),
        username: "api-user".to_string(),
        password: "api-pass".to_string(),
        verify_tls: false,
        timeout_seconds: 5,
        poll_interval_seconds: 30,
    }
}

/// Helper returning a client that has logged in against the mock server
async fn logged_in_client(server: &mut ServerGuard) -> CommvaultClient {
    let _login = server
        .mock("POST", "/webconsole/api/Login")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(format!(r#"{{"token": "{}", "userName": "api-user"}}"#, TOKEN))
        .create_async()
        .await;

    let mut client = CommvaultClient::new(create_test_config(&server.url())).unwrap();
    client.login().await.unwrap();
    client
}

#[tokio::test]
async fn test_login_success() {
    let mut server = Server::new_async().await;

    let mock = server
        .mock("POST", "/webconsole/api/Login")
        .match_header("content-type", "application/json")
        .match_body(Matcher::PartialJson(json!({
            "username": "api-user",
            "password": "api-pass",
            "timeout": 30
        })))
        .with_status(200)
        .with_body(format!(r#"{{"token": "{}"}}"#, TOKEN))
        .create_async()
        .await;

    let mut client = CommvaultClient::new(create_test_config(&server.url())).unwrap();
    assert!(!client.is_authenticated());

    client.login().await.unwrap();
    assert!(client.is_authenticated());

    mock.assert_async().await;
}

#[tokio::test]
async fn test_login_rejected() {
    let mut server = Server::new_async().await;

    let _mock = server
        .mock("POST", "/webconsole/api/Login")
        .with_status(401)
        .with_body(r#"{"errorCode": 5}"#)
        .create_async()
        .await;

    let mut client = CommvaultClient::new(create_test_config(&server.url())).unwrap();
    let result = client.login().await;

    assert!(matches!(result, Err(CommvaultError::Auth(_))));
    assert!(!client.is_authenticated());
}

#[tokio::test]
async fn test_login_non_json_body() {
    let mut server = Server::new_async().await;

    let _mock = server
        .mock("POST", "/webconsole/api/Login")
        .with_status(200)
        .with_body("<html>maintenance</html>")
        .create_async()
        .await;

    let mut client = CommvaultClient::new(create_test_config(&server.url())).unwrap();
    assert!(matches!(client.login().await, Err(CommvaultError::Auth(_))));
}

#[tokio::test]
async fn test_login_without_token() {
    let mut server = Server::new_async().await;

    let _mock = server
        .mock("POST", "/webconsole/api/Login")
        .with_status(200)
        .with_body(r#"{"token": null, "errList": [{"errorCode": 1}]}"#)
        .create_async()
        .await;

    let mut client = CommvaultClient::new(create_test_config(&server.url())).unwrap();
    assert!(matches!(client.login().await, Err(CommvaultError::Auth(_))));
}

#[tokio::test]
async fn test_login_unreachable_server() {
    let config = CommvaultConfig {
        timeout_seconds: 1,
        ..create_test_config("http://127.0.0.1:1")
    };
    let mut client = CommvaultClient::new(config).unwrap();
    assert!(matches!(client.login().await, Err(CommvaultError::Api(_))));
}

#[tokio::test]
async fn test_fetch_before_login_fails() {
    let server = Server::new_async().await;
    let client = CommvaultClient::new(create_test_config(&server.url())).unwrap();

    assert!(matches!(
        client.get_vm_status().await,
        Err(CommvaultError::Auth(_))
    ));
    assert!(matches!(
        client.get_disk_storage().await,
        Err(CommvaultError::Auth(_))
    ));
}

#[tokio::test]
async fn test_vm_status_request_headers_and_body() {
    let mut server = Server::new_async().await;
    let client = logged_in_client(&mut server).await;

    let mock = server
        .mock("GET", "/webconsole/api/VM")
        .match_header("authtoken", TOKEN)
        .match_header("paginginfo", "0,10000")
        .match_header("sortinginfo", "asc:2")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{
            "totalRecords": 2,
            "vmStatusInfoList": [
                {
                    "name": "sql-01",
                    "vmStatus": 1,
                    "slaStatus": 1,
                    "subclientName": "default",
                    "strGUID": "5012a4f1-0000",
                    "plan": {"planName": "Server plan", "planId": 4},
                    "lastBackupJobInfo": {"status": 1, "jobID": 1201},
                    "bkpEndTime": 1700000000,
                    "vmSize": 107374182400,
                    "vmUsedSpace": 42949672960
                },
                {
                    "name": "web-02",
                    "vmStatus": 2
                }
            ]
        }"#,
        )
        .create_async()
        .await;

    let response = client.get_vm_status().await.unwrap();

    assert_eq!(response.total_records(), 2);
    assert_eq!(response.records().len(), 2);
    assert_eq!(response.records()[0].name, Some(json!("sql-01")));
    assert!(response.records()[1].plan.is_none());

    mock.assert_async().await;
}

#[tokio::test]
async fn test_vm_status_server_error() {
    let mut server = Server::new_async().await;
    let client = logged_in_client(&mut server).await;

    let _mock = server
        .mock("GET", "/webconsole/api/VM")
        .with_status(500)
        .create_async()
        .await;

    assert!(matches!(
        client.get_vm_status().await,
        Err(CommvaultError::Api(_))
    ));
}

#[tokio::test]
async fn test_vm_status_unparseable_body() {
    let mut server = Server::new_async().await;
    let client = logged_in_client(&mut server).await;

    let _mock = server
        .mock("GET", "/webconsole/api/VM")
        .with_status(200)
        .with_body(r#"{"vmStatusInfoList": "not a list"}"#)
        .create_async()
        .await;

    assert!(matches!(
        client.get_vm_status().await,
        Err(CommvaultError::ParseError(_))
    ));
}

#[tokio::test]
async fn test_disk_storage_single_object() {
    let mut server = Server::new_async().await;
    let client = logged_in_client(&mut server).await;

    let mock = server
        .mock("GET", "/webconsole/api/V4/Storage/Disk")
        .match_header("authtoken", TOKEN)
        .with_status(200)
        .with_body(
            r#"{"diskStorage": {"id": 9, "name": "DiskPool01", "storagePoolType": 1,
                "status": "Online", "capacity": 52428800, "freeSpace": 10485760}}"#,
        )
        .create_async()
        .await;

    let response = client.get_disk_storage().await.unwrap();
    assert_eq!(response.pools().len(), 1);
    assert_eq!(response.pools()[0].name, Some(json!("DiskPool01")));

    mock.assert_async().await;
}

#[tokio::test]
async fn test_poller_failures_are_independent() {
    let mut server = Server::new_async().await;
    let client = logged_in_client(&mut server).await;

    let _vm = server
        .mock("GET", "/webconsole/api/VM")
        .with_status(503)
        .create_async()
        .await;
    let _disk = server
        .mock("GET", "/webconsole/api/V4/Storage/Disk")
        .with_status(200)
        .with_body(r#"{"diskStorage": [{"id": 1, "capacity": 100, "freeSpace": 50}]}"#)
        .create_async()
        .await;

    let snapshots = Arc::new(SnapshotStore::new());
    let poller = Poller::new(client, snapshots.clone());
    let outcome = poller.refresh().await;

    assert_eq!(outcome.vm, FetchStatus::Failed);
    assert_eq!(outcome.disk_storage, FetchStatus::Updated);
    assert!(snapshots.vm().is_none());
    assert_eq!(snapshots.disk_storage().unwrap().body.pools().len(), 1);
}

#[tokio::test]
async fn test_poller_keeps_previous_snapshot_on_failure() {
    let mut server = Server::new_async().await;
    let client = logged_in_client(&mut server).await;

    let vm_ok = server
        .mock("GET", "/webconsole/api/VM")
        .with_status(200)
        .with_body(r#"{"totalRecords": 1, "vmStatusInfoList": [{"name": "keep-me", "vmStatus": 1}]}"#)
        .create_async()
        .await;

    let snapshots = Arc::new(SnapshotStore::new());
    let poller = Poller::new(client, snapshots.clone());
    assert_eq!(poller.refresh_vm().await, FetchStatus::Updated);

    vm_ok.remove_async().await;
    let _vm_broken = server
        .mock("GET", "/webconsole/api/VM")
        .with_status(200)
        .with_body("not json")
        .create_async()
        .await;

    assert_eq!(poller.refresh_vm().await, FetchStatus::Failed);

    let snapshot = snapshots.vm().unwrap();
    assert_eq!(snapshot.body.records()[0].name, Some(json!("keep-me")));
}

#[tokio::test]
async fn test_spawned_poller_refreshes_on_interval() {
    let mut server = Server::new_async().await;
    let _login = server
        .mock("POST", "/webconsole/api/Login")
        .with_status(200)
        .with_body(format!(r#"{{"token": "{}"}}"#, TOKEN))
        .create_async()
        .await;

    let vm = server
        .mock("GET", "/webconsole/api/VM")
        .with_status(200)
        .with_body(r#"{"totalRecords": 1, "vmStatusInfoList": [{"name": "tick", "vmStatus": 1}]}"#)
        .expect_at_least(2)
        .create_async()
        .await;
    let _disk = server
        .mock("GET", "/webconsole/api/V4/Storage/Disk")
        .with_status(200)
        .with_body(r#"{"diskStorage": []}"#)
        .create_async()
        .await;

    let config = CommvaultConfig {
        poll_interval_seconds: 1,
        ..create_test_config(&server.url())
    };
    let mut client = CommvaultClient::new(config).unwrap();
    client.login().await.unwrap();

    let snapshots = Arc::new(SnapshotStore::new());
    let handle = Poller::new(client, snapshots.clone()).spawn();

    // Nothing is fetched before the first interval has elapsed
    assert!(snapshots.vm().is_none());

    tokio::time::sleep(Duration::from_millis(1500)).await;
    let first = snapshots.vm().expect("first cycle should have published");

    tokio::time::sleep(Duration::from_millis(1200)).await;
    let second = snapshots.vm().unwrap();
    handle.abort();

    assert!(!Arc::ptr_eq(&first, &second));
    assert!(second.fetched_at > first.fetched_at);
    vm.assert_async().await;
}

#[tokio::test]
async fn test_poll_cycle_duration_is_observed() {
    let mut server = Server::new_async().await;
    let client = logged_in_client(&mut server).await;

    let _vm = server
        .mock("GET", "/webconsole/api/VM")
        .with_status(200)
        .with_body(r#"{"totalRecords": 0, "vmStatusInfoList": []}"#)
        .create_async()
        .await;
    let _disk = server
        .mock("GET", "/webconsole/api/V4/Storage/Disk")
        .with_status(500)
        .create_async()
        .await;

    let snapshots = Arc::new(SnapshotStore::new());
    let metrics = MetricsCollector::new(snapshots.clone(), "cv.test").unwrap();
    let poller = Poller::new(client, snapshots)
        .with_cycle_histogram(metrics.request_processing_seconds());

    poller.refresh().await;
    poller.refresh().await;

    // Failed fetches still complete a cycle
    assert_eq!(metrics.request_processing_seconds().get_sample_count(), 2);
    assert!(metrics.render().unwrap().contains("request_processing_seconds_count 2"));
}
