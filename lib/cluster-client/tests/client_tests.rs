//! Integration tests for cluster-client API operations.
//!
//! A wiremock server stands in for the API server; the client is bound to a
//! token configuration pointing at it over plain HTTP. Watch transport
//! behavior is checked against a hand-driven TCP listener.

use cluster_client::{ClusterClient, ListOptions, WatchEventType, WatchOptions};
use cluster_core::{ClusterEndpoint, ClusterError, ErrorKind, ParseSource, ResolvedConfig, UserAuth};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &str) -> ClusterClient {
    let config = ResolvedConfig {
        cluster: ClusterEndpoint::new(server),
        user: UserAuth::Token {
            token: "mytoken".to_string(),
        },
        namespace: None,
    };
    ClusterClient::new(config).unwrap()
}

#[tokio::test]
async fn test_get_resource_success() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/namespaces/ns/pods/mypod"))
        .and(header("authorization", "Bearer mytoken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "kind": "Pod",
            "metadata": {"name": "mypod", "namespace": "ns"}
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server.uri());
    let pod: Value = client
        .get_resource("v1", "Pod", "mypod", Some("ns"))
        .await
        .unwrap();

    assert_eq!(pod["metadata"]["name"], "mypod");
}

#[tokio::test]
async fn test_get_resource_not_found() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/apis/apps/v1/namespaces/ns/deployments/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "kind": "Status",
            "status": "Failure",
            "message": "deployments.apps \"missing\" not found",
            "reason": "NotFound",
            "code": 404
        })))
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server.uri());
    let result = client
        .get_resource::<Value>("apps/v1", "Deployment", "missing", Some("ns"))
        .await;

    match result {
        Err(ClusterError::Api {
            status_code,
            message,
            raw_body,
        }) => {
            assert_eq!(status_code, 404);
            assert_eq!(message, "deployments.apps \"missing\" not found");
            assert!(raw_body.contains("NotFound"));
        }
        other => panic!("Expected Api error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_connection_refused_is_network_error() {
    let client = client_for("http://127.0.0.1:1");

    let err = client
        .get_resource::<Value>("v1", "Pod", "mypod", Some("ns"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Network);
}

#[tokio::test]
async fn test_invalid_json_is_parsing_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/nodes/worker-1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>proxy</html>"))
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server.uri());
    let err = client
        .get_resource::<Value>("v1", "Node", "worker-1", None)
        .await
        .unwrap_err();

    match err {
        ClusterError::Parsing { context, raw, .. } => {
            assert!(context.contains("GET /api/v1/nodes/worker-1"));
            assert_eq!(raw, "<html>proxy</html>");
        }
        other => panic!("Expected Parsing error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_list_resources_unwraps_items() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/apis/tekton.dev/v1beta1/namespaces/default/pipelines"))
        .and(query_param("labelSelector", "app=build"))
        .and(query_param("fieldSelector", "metadata.name=p1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "kind": "PipelineList",
            "items": [
                {"metadata": {"name": "p1"}},
                {"metadata": {"name": "p2"}}
            ]
        })))
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server.uri());
    let options = ListOptions {
        label_selector: Some("app=build".to_string()),
        field_selector: Some("metadata.name=p1".to_string()),
    };
    let items: Vec<Value> = client
        .list_resources("tekton.dev/v1beta1", "Pipeline", Some("default"), &options)
        .await
        .unwrap();

    assert_eq!(items.len(), 2);
    assert_eq!(items[1]["metadata"]["name"], "p2");
}

#[tokio::test]
async fn test_list_resources_null_items() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/namespaces"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": null})))
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server.uri());
    let items: Vec<Value> = client
        .list_resources("v1", "Namespace", None, &ListOptions::default())
        .await
        .unwrap();

    assert!(items.is_empty());
}

#[tokio::test]
async fn test_create_resource() {
    let mock_server = MockServer::start().await;
    let config_map = json!({
        "apiVersion": "v1",
        "kind": "ConfigMap",
        "metadata": {"name": "settings"},
        "data": {"mode": "fast"}
    });

    Mock::given(method("POST"))
        .and(path("/api/v1/namespaces/ns/configmaps"))
        .and(body_json(&config_map))
        .respond_with(ResponseTemplate::new(201).set_body_json(&config_map))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server.uri());
    let created: Value = client
        .create_resource("v1", "ConfigMap", Some("ns"), &config_map)
        .await
        .unwrap();

    assert_eq!(created["data"]["mode"], "fast");
}

#[tokio::test]
async fn test_update_resource_conflict() {
    let mock_server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/api/v1/namespaces/ns/configmaps/settings"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "kind": "Status",
            "message": "the object has been modified",
            "code": 409
        })))
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server.uri());
    let err = client
        .update_resource::<_, Value>(
            "v1",
            "ConfigMap",
            "settings",
            Some("ns"),
            &json!({"metadata": {"name": "settings"}}),
        )
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), Some(409));
    assert!(!err.is_not_found());
}

#[tokio::test]
async fn test_update_resource_success() {
    let mock_server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/api/v1/namespaces/ns/configmaps/settings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "metadata": {"name": "settings", "resourceVersion": "7"}
        })))
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server.uri());
    let updated: Value = client
        .update_resource(
            "v1",
            "ConfigMap",
            "settings",
            Some("ns"),
            &json!({"metadata": {"name": "settings"}}),
        )
        .await
        .unwrap();

    assert_eq!(updated["metadata"]["resourceVersion"], "7");
}

#[tokio::test]
async fn test_delete_resource_no_content() {
    let mock_server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/api/v1/namespaces/ns/secrets/old"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server.uri());
    let deleted: Option<Value> = client
        .delete_resource("v1", "Secret", "old", Some("ns"))
        .await
        .unwrap();

    assert!(deleted.is_none());
}

#[tokio::test]
async fn test_delete_resource_returns_status() {
    let mock_server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/api/v1/namespaces/ns/secrets/old"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "kind": "Status",
            "status": "Success"
        })))
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server.uri());
    let deleted: Option<Value> = client
        .delete_resource("v1", "Secret", "old", Some("ns"))
        .await
        .unwrap();

    assert_eq!(deleted.unwrap()["status"], "Success");
}

#[tokio::test]
async fn test_get_pod_logs() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/namespaces/ns/pods/web-0/log"))
        .and(query_param("container", "app"))
        .respond_with(ResponseTemplate::new(200).set_body_string("line one\nline two\n"))
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server.uri());
    let logs = client
        .get_pod_logs("web-0", "ns", Some("app"))
        .await
        .unwrap();

    assert_eq!(logs, "line one\nline two\n");
}

#[tokio::test]
async fn test_watch_yields_events_in_order() {
    let mock_server = MockServer::start().await;

    let body = concat!(
        r#"{"type":"ADDED","object":{"metadata":{"name":"p1"}}}"#,
        "\n\n",
        r#"{"type":"MODIFIED","object":{"metadata":{"name":"p1"}}}"#,
        "\n",
    );
    Mock::given(method("GET"))
        .and(path("/api/v1/namespaces/ns/pods"))
        .and(query_param("watch", "true"))
        .and(query_param("resourceVersion", "100"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server.uri());
    let options = WatchOptions {
        resource_version: Some("100".to_string()),
        ..Default::default()
    };
    let events: Vec<_> = client
        .watch_resource::<Value>("v1", "Pod", Some("ns"), &options)
        .collect()
        .await;

    assert_eq!(events.len(), 2);
    let first = events[0].as_ref().unwrap();
    let second = events[1].as_ref().unwrap();
    assert_eq!(first.event_type, WatchEventType::Added);
    assert_eq!(second.event_type, WatchEventType::Modified);
    assert_eq!(second.object["metadata"]["name"], "p1");
}

#[tokio::test]
async fn test_watch_decodes_unterminated_last_line() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/pods"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"{"type":"DELETED","object":{"metadata":{"name":"p9"}}}"#),
        )
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server.uri());
    let events: Vec<_> = client
        .watch_resource::<Value>("v1", "Pod", None, &WatchOptions::default())
        .collect()
        .await;

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].as_ref().unwrap().event_type, WatchEventType::Deleted);
}

#[tokio::test]
async fn test_watch_malformed_line_ends_stream() {
    let mock_server = MockServer::start().await;

    let body = concat!(
        r#"{"type":"ADDED","object":{"metadata":{"name":"p1"}}}"#,
        "\n",
        "{not json\n",
        r#"{"type":"DELETED","object":{"metadata":{"name":"p1"}}}"#,
        "\n",
    );
    Mock::given(method("GET"))
        .and(path("/api/v1/namespaces/ns/pods"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server.uri());
    let events: Vec<_> = client
        .watch_resource::<Value>("v1", "Pod", Some("ns"), &WatchOptions::default())
        .collect()
        .await;

    assert_eq!(events.len(), 2);
    assert_eq!(events[0].as_ref().unwrap().event_type, WatchEventType::Added);
    match &events[1] {
        Err(ClusterError::Parsing { raw, .. }) => assert_eq!(raw, "{not json"),
        other => panic!("Expected Parsing error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_watch_rejected_with_api_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/namespaces/ns/secrets"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "kind": "Status",
            "message": "secrets is forbidden",
            "code": 403
        })))
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server.uri());
    let events: Vec<_> = client
        .watch_resource::<Value>("v1", "Secret", Some("ns"), &WatchOptions::default())
        .collect()
        .await;

    assert_eq!(events.len(), 1);
    match &events[0] {
        Err(ClusterError::Api {
            status_code,
            message,
            ..
        }) => {
            assert_eq!(*status_code, 403);
            assert_eq!(message, "secrets is forbidden");
        }
        other => panic!("Expected Api error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_watch_is_lazy() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/namespaces/ns/pods"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "{\"type\":\"ADDED\",\"object\":{}}\n",
        ))
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server.uri());
    let mut stream =
        client.watch_resource::<Value>("v1", "Pod", Some("ns"), &WatchOptions::default());

    let before = mock_server.received_requests().await.unwrap();
    assert!(before.is_empty());

    let event = stream.next().await.unwrap().unwrap();
    assert_eq!(event.event_type, WatchEventType::Added);

    let after = mock_server.received_requests().await.unwrap();
    assert_eq!(after.len(), 1);
}

#[tokio::test]
async fn test_no_content_resolves_without_body() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/namespaces/ns/configmaps/settings"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&mock_server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/v1/namespaces/ns/configmaps/settings"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server.uri());
    let fetched: Option<Value> = client
        .get_resource("v1", "ConfigMap", "settings", Some("ns"))
        .await
        .unwrap();
    assert!(fetched.is_none());

    let updated: Value = client
        .update_resource(
            "v1",
            "ConfigMap",
            "settings",
            Some("ns"),
            &json!({"metadata": {"name": "settings"}}),
        )
        .await
        .unwrap();
    assert_eq!(updated, Value::Null);
}

#[tokio::test]
async fn test_no_content_rejected_when_body_required() {
    #[derive(Debug, Deserialize)]
    struct Named {
        #[allow(dead_code)]
        metadata: Value,
    }

    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/namespaces/ns/configmaps/settings"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&mock_server)
        .await;

    let client = client_for(&mock_server.uri());
    let err = client
        .get_resource::<Named>("v1", "ConfigMap", "settings", Some("ns"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ClusterError::Parsing {
            origin: ParseSource::ResponseBody,
            ..
        }
    ));
}

const CHUNKED_HEAD: &[u8] = b"HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ntransfer-encoding: chunked\r\n\r\n";

fn chunk(data: &str) -> Vec<u8> {
    format!("{:x}\r\n{}\r\n", data.len(), data).into_bytes()
}

async fn read_request_head(socket: &mut TcpStream) {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = socket.read(&mut buf).await.unwrap();
        if n == 0 {
            break;
        }
        head.extend_from_slice(&buf[..n]);
    }
}

#[tokio::test]
async fn test_watch_transport_error_ends_stream() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        read_request_head(&mut socket).await;
        socket.write_all(CHUNKED_HEAD).await.unwrap();
        socket
            .write_all(&chunk("{\"type\":\"ADDED\",\"object\":{}}\n"))
            .await
            .unwrap();
        // Announce a 64-byte chunk, send part of it, then hang up
        socket.write_all(b"40\r\n{\"type\"").await.unwrap();
        socket.flush().await.unwrap();
    });

    let client = client_for(&format!("http://{}", addr));
    let events: Vec<_> = client
        .watch_resource::<Value>("v1", "Pod", Some("ns"), &WatchOptions::default())
        .collect()
        .await;
    server.await.unwrap();

    assert_eq!(events.len(), 2);
    assert_eq!(events[0].as_ref().unwrap().event_type, WatchEventType::Added);
    match &events[1] {
        Err(ClusterError::Network { message, .. }) => assert_eq!(message, "Error in watch stream"),
        other => panic!("Expected Network error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_dropping_watch_closes_connection() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        read_request_head(&mut socket).await;
        socket.write_all(CHUNKED_HEAD).await.unwrap();
        socket
            .write_all(&chunk("{\"type\":\"ADDED\",\"object\":{}}\n"))
            .await
            .unwrap();
        socket.flush().await.unwrap();

        // The body is never terminated; only the client can end it
        let mut buf = [0u8; 64];
        let read = tokio::time::timeout(Duration::from_secs(5), socket.read(&mut buf))
            .await
            .expect("connection still open after the stream was dropped");
        matches!(read, Ok(0) | Err(_))
    });

    let client = client_for(&format!("http://{}", addr));
    let mut stream =
        client.watch_resource::<Value>("v1", "Pod", Some("ns"), &WatchOptions::default());
    let event = stream.next().await.unwrap().unwrap();
    assert_eq!(event.event_type, WatchEventType::Added);

    drop(stream);
    assert!(server.await.unwrap());
}

#[tokio::test]
async fn test_truncated_error_body_still_reports_status() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        read_request_head(&mut socket).await;
        socket
            .write_all(b"HTTP/1.1 500 Internal Server Error\r\ncontent-length: 100\r\n\r\npart")
            .await
            .unwrap();
        socket.flush().await.unwrap();
    });

    let client = client_for(&format!("http://{}", addr));
    let err = client
        .get_resource::<Value>("v1", "Pod", "mypod", Some("ns"))
        .await
        .unwrap_err();
    server.await.unwrap();

    match err {
        ClusterError::Api {
            status_code,
            message,
            raw_body,
        } => {
            assert_eq!(status_code, 500);
            assert_eq!(message, "Internal Server Error");
            assert!(raw_body.is_empty());
        }
        other => panic!("Expected Api error, got {:?}", other),
    }
}
