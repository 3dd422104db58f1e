use std::sync::Arc;

use notely_core::api::{NotesApi, NotesApiClient};
use notely_core::context::{NotesContext, WriteMode};
use notely_core::sync::MemoryStore;
use notely_core::{Error, NoteDraft, NoteId};
use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn note_json(id: &str, title: &str, archived: bool) -> serde_json::Value {
    json!({
        "id": id,
        "title": title,
        "body": format!("{title} body"),
        "createdAt": "2022-07-28T10:03:12.594Z",
        "archived": archived,
    })
}

async fn client_for(server: &MockServer) -> NotesApiClient {
    NotesApiClient::new(format!("{}/v2/", server.uri())).unwrap()
}

#[tokio::test]
async fn lists_active_and_archived_notes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/notes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "message": "Notes retrieved",
            "data": [note_json("notes-1", "Welcome", false)],
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/notes/archived"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "message": "Notes retrieved",
            "data": [note_json("notes-2", "Old", true)],
        })))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    assert!(client.base_url().ends_with("/v2"));

    let active = client.list_active().await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id.as_str(), "notes-1");
    assert!(!active[0].archived);

    let archived = client.list_archived().await.unwrap();
    assert_eq!(archived[0].title, "Old");
    assert!(archived[0].archived);
}

#[tokio::test]
async fn create_posts_title_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/notes"))
        .and(body_json(json!({ "title": "Groceries", "body": "milk" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "status": "success",
            "message": "Note created",
            "data": {
                "id": "notes-9",
                "title": "Groceries",
                "body": "milk",
                "createdAt": "2024-01-01T00:00:00.000Z",
                "archived": false,
            },
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let draft = NoteDraft::new("Groceries", "milk").unwrap();
    let created = client.create(&draft).await.unwrap();
    assert_eq!(created.id.as_str(), "notes-9");
    assert_eq!(created.body, "milk");
}

#[tokio::test]
async fn error_envelope_becomes_api_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/notes/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "status": "fail",
            "message": "Note is not found",
        })))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let error = client.get(&NoteId::new("missing")).await.unwrap_err();
    match error {
        Error::Api(message) => assert_eq!(message, "Note is not found"),
        other => panic!("expected API error, got {other:?}"),
    }
}

#[tokio::test]
async fn error_flag_with_success_status_is_still_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/v2/notes/notes-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": true,
            "message": "Failed to delete note",
        })))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let error = client.delete(&NoteId::new("notes-1")).await.unwrap_err();
    assert!(!error.is_transport());
}

#[tokio::test]
async fn archive_returns_server_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/notes/notes-1/archive"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "message": "Note archived",
        })))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let message = client.archive(&NoteId::new("notes-1")).await.unwrap();
    assert_eq!(message, "Note archived");
}

#[tokio::test]
async fn context_queues_writes_when_server_is_unreachable() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let base_url = format!("http://{}/v2", listener.local_addr().unwrap());
    drop(listener);

    let client = NotesApiClient::new(base_url).unwrap();
    let context = NotesContext::new(Arc::new(client), Arc::new(MemoryStore::new()));

    let draft = NoteDraft::new("Offline", "written on a plane").unwrap();
    let created = context.create(&draft).await.unwrap();
    assert_eq!(created.mode, WriteMode::Queued);
    assert!(created.value.id.is_local());
    assert_eq!(context.queue().len(), 1);
    assert_eq!(context.list(false).len(), 1);
}
