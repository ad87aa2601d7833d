//! DSpace submission tests against a mock REST API.

use oai_harvester::{
    DSpaceClient, HarvesterError, ItemDocument, ItemExporter, ItemSubmitter, Metadata, Record,
};
use oai_harvester::record::Header;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn item(title: &str) -> ItemDocument {
    let record = Record::new(
        Header {
            identifier: format!("oai:repo:{title}"),
            datestamp: "2024-01-15".to_string(),
            set_specs: vec![],
            deleted: false,
        },
        Metadata::from_pairs([("dc:title", title), ("dc:creator", "Alice")]),
    );
    ItemExporter::default().export_record(&record).unwrap()
}

async fn mount_login(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/server/api/authn/login"))
        .and(body_string_contains("user=admin%40example.org"))
        .respond_with(
            ResponseTemplate::new(200).insert_header("Authorization", "Bearer test-token"),
        )
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_upload_items_logs_in_once() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("POST"))
        .and(path("/server/api/core/collections/col-uuid/items"))
        .and(header("Authorization", "Bearer test-token"))
        .and(body_string_contains("\"dc.contributor.author\""))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(serde_json::json!({"uuid": "item-1"})),
        )
        .expect(2)
        .mount(&server)
        .await;

    let base_url = format!("{}/server/", server.uri());
    let (created, progress) = tokio::task::spawn_blocking(move || {
        let mut client = DSpaceClient::new(base_url, "admin@example.org", "secret").unwrap();
        let mut progress = Vec::new();
        let created = client
            .upload_items("col-uuid", &[item("One"), item("Two")], |done, total| {
                progress.push((done, total));
            })
            .unwrap();
        (created, progress)
    })
    .await
    .unwrap();

    assert_eq!(created.len(), 2);
    assert_eq!(created[0]["uuid"], "item-1");
    assert_eq!(progress, vec![(1, 2), (2, 2)]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_list_collections() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("GET"))
        .and(path("/server/api/core/collections"))
        .and(query_param("page", "0"))
        .and(query_param("size", "20"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "_embedded": {
                "collections": [
                    {"uuid": "c1", "name": "Theses", "handle": "123456789/1"},
                    {"uuid": "c2", "name": "Articles", "handle": null}
                ]
            }
        })))
        .mount(&server)
        .await;

    let base_url = format!("{}/server", server.uri());
    let collections = tokio::task::spawn_blocking(move || {
        let mut client = DSpaceClient::new(base_url, "admin@example.org", "secret").unwrap();
        client.list_collections(0, 20)
    })
    .await
    .unwrap()
    .unwrap();

    assert_eq!(collections.len(), 2);
    assert_eq!(collections[0].name, "Theses");
    assert_eq!(collections[0].handle.as_deref(), Some("123456789/1"));
    assert_eq!(collections[1].handle, None);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_failed_login() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/server/api/authn/login"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let base_url = format!("{}/server", server.uri());
    let result = tokio::task::spawn_blocking(move || {
        let mut client = DSpaceClient::new(base_url, "admin@example.org", "wrong").unwrap();
        client.create_item("col-uuid", &item("One"))
    })
    .await
    .unwrap();

    match result {
        Err(HarvesterError::Submission { endpoint, message }) => {
            assert!(endpoint.ends_with("/api/authn/login"));
            assert!(message.contains("401"));
        }
        other => panic!("expected submission error, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_rejected_item_stops_upload() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("POST"))
        .and(path("/server/api/core/collections/col-uuid/items"))
        .respond_with(ResponseTemplate::new(422).set_body_string("missing dc.title"))
        .expect(1)
        .mount(&server)
        .await;

    let base_url = format!("{}/server", server.uri());
    let result = tokio::task::spawn_blocking(move || {
        let mut client = DSpaceClient::new(base_url, "admin@example.org", "secret").unwrap();
        client.upload_items("col-uuid", &[item("One"), item("Two")], |_, _| {})
    })
    .await
    .unwrap();

    match result {
        Err(HarvesterError::Submission { message, .. }) => {
            assert!(message.contains("'One'"));
            assert!(message.contains("missing dc.title"));
        }
        other => panic!("expected submission error, got {other:?}"),
    }
}
