use futures::StreamExt;
use mimic_http::{
    BoundBackend, Capabilities, FallbackSession, HttpError, HttpMethod, HttpStatus,
    RequestOptions, Session, SessionConfig,
};
use serde_json::json;
use std::pin::pin;
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config() -> SessionConfig {
    // Keep proxy environment variables from rerouting requests to the mock.
    SessionConfig::new().trust_env(false)
}

fn session_with(config: SessionConfig, socks: bool) -> Session {
    let caps = Capabilities {
        preferred: false,
        socks,
    };
    let fallback = FallbackSession::with_capabilities(config, caps).unwrap();
    Session::with_backend(BoundBackend::Fallback(fallback))
}

fn session() -> Session {
    session_with(config(), false)
}

#[tokio::test]
async fn test_buffered_get_parses_json() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(r#"{"a":1}"#, "application/json"))
        .mount(&server)
        .await;

    let response = session()
        .get(&format!("{}/data", server.uri()), RequestOptions::new())
        .await
        .unwrap();

    assert_eq!(response.status_code, 200);
    assert!(response.is_closed());
    assert_eq!(response.header("CONTENT-TYPE"), Some("application/json"));
    assert_eq!(response.json().unwrap(), json!({"a": 1}));
}

#[tokio::test]
async fn test_streamed_body_is_fully_consumed_and_released() {
    let server = MockServer::start().await;
    let body = "0123456789abcdefghijABCDEFGHIJ";
    Mock::given(method("GET"))
        .and(path("/stream"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&server)
        .await;

    let s = session();
    let mut response = s
        .get(
            &format!("{}/stream", server.uri()),
            RequestOptions::new().stream(true),
        )
        .await
        .unwrap();
    assert!(!response.is_closed());
    assert!(matches!(response.json(), Err(HttpError::Usage(_))));

    let mut collected = Vec::new();
    {
        let mut chunks = pin!(response.aiter_content(5));
        while let Some(chunk) = chunks.next().await {
            collected.extend_from_slice(&chunk.unwrap());
        }
    }

    assert_eq!(collected.len(), 30);
    assert_eq!(collected, body.as_bytes());
    assert!(response.is_closed());
}

#[tokio::test]
async fn test_streamed_lines() {
    let server = MockServer::start().await;
    Mock::given(path("/events"))
        .respond_with(ResponseTemplate::new(200).set_body_string("data: 1\r\n\r\ndata: 2"))
        .mount(&server)
        .await;

    let s = session();
    let mut response = s
        .get(
            &format!("{}/events", server.uri()),
            RequestOptions::new().stream(true),
        )
        .await
        .unwrap();

    let lines: Vec<String> = response
        .aiter_lines()
        .map(|line| line.unwrap())
        .collect()
        .await;
    assert_eq!(lines, vec!["data: 1", "", "data: 2"]);
    assert!(response.is_closed());
}

#[tokio::test]
async fn test_streamed_text_then_json() {
    let server = MockServer::start().await;
    Mock::given(path("/empty"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let s = session();
    let mut response = s
        .get(
            &format!("{}/empty", server.uri()),
            RequestOptions::new().stream(true),
        )
        .await
        .unwrap();

    assert_eq!(response.text().await.unwrap(), "");
    assert_eq!(response.json().unwrap(), json!({}));
}

#[tokio::test]
async fn test_socks_without_support_makes_no_network_call() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let err = session()
        .get(
            &format!("{}/via-socks", server.uri()),
            RequestOptions::new().proxy("socks5://127.0.0.1:1080"),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, HttpError::Configuration(_)));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[cfg(feature = "socks")]
#[tokio::test]
async fn test_unreachable_socks_proxy_is_transport_error() {
    let s = session_with(config(), true);
    let err = s
        .get(
            "http://example.invalid/",
            RequestOptions::new()
                .proxy("socks5://127.0.0.1:1")
                .timeout(Duration::from_secs(5)),
        )
        .await
        .unwrap_err();
    assert!(err.is_transport(), "unexpected error: {err}");
}

#[tokio::test]
async fn test_connection_refused_is_transport_error() {
    let err = session()
        .get("http://127.0.0.1:1/", RequestOptions::new())
        .await
        .unwrap_err();
    assert!(err.is_transport(), "unexpected error: {err}");
}

#[tokio::test]
async fn test_timeout_is_transport_error() {
    let server = MockServer::start().await;
    Mock::given(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let err = session()
        .get(
            &format!("{}/slow", server.uri()),
            RequestOptions::new().timeout(Duration::from_millis(200)),
        )
        .await
        .unwrap_err();
    assert!(err.is_transport(), "unexpected error: {err}");
}

#[tokio::test]
async fn test_session_timeout_applies_when_call_has_none() {
    let server = MockServer::start().await;
    Mock::given(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let s = session_with(config().timeout_secs(0.2), false);
    let err = s
        .get(&format!("{}/slow", server.uri()), RequestOptions::new())
        .await
        .unwrap_err();
    assert!(err.is_transport());
}

#[tokio::test]
async fn test_redirects_follow_by_default() {
    let server = MockServer::start().await;
    Mock::given(path("/old"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "/new"))
        .mount(&server)
        .await;
    Mock::given(path("/new"))
        .respond_with(ResponseTemplate::new(200).set_body_string("moved"))
        .mount(&server)
        .await;

    let s = session();
    let url = format!("{}/old", server.uri());

    let mut followed = s.get(&url, RequestOptions::new()).await.unwrap();
    assert_eq!(followed.status(), HttpStatus::OK);
    assert_eq!(followed.text().await.unwrap(), "moved");

    let stopped = s
        .get(&url, RequestOptions::new().allow_redirects(false))
        .await
        .unwrap();
    assert_eq!(stopped.status(), HttpStatus::FOUND);
    assert!(stopped.status().is_redirect());
    assert_eq!(stopped.header("location"), Some("/new"));
}

#[tokio::test]
async fn test_session_headers_and_cookies_are_sent() {
    let server = MockServer::start().await;
    Mock::given(path("/whoami"))
        .and(header("x-client", "mimic"))
        .and(header("x-call", "1"))
        .and(header("cookie", "sid=abc"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let s = session_with(config().header("X-Client", "mimic").cookie("sid", "abc"), false);
    let response = s
        .get(
            &format!("{}/whoami", server.uri()),
            RequestOptions::new().header("X-Call", "1"),
        )
        .await
        .unwrap();
    assert_eq!(response.status_code, 200);
}

#[tokio::test]
async fn test_post_json_with_query() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/items"))
        .and(query_param("dry_run", "true"))
        .and(body_json(json!({"name": "widget"})))
        .respond_with(ResponseTemplate::new(201).set_body_raw(r#"{"id":7}"#, "application/json"))
        .mount(&server)
        .await;

    let response = session()
        .post(
            &format!("{}/items", server.uri()),
            RequestOptions::new()
                .query("dry_run", "true")
                .json(json!({"name": "widget"})),
        )
        .await
        .unwrap();
    assert_eq!(response.status_code, 201);
    assert_eq!(response.json().unwrap()["id"], 7);
}

#[tokio::test]
async fn test_delete_and_generic_request() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/items/7"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/items/7"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let s = session();
    let url = format!("{}/items/7", server.uri());
    assert_eq!(s.delete(&url, RequestOptions::new()).await.unwrap().status_code, 204);
    let method: HttpMethod = "put".parse().unwrap();
    assert_eq!(
        s.request(method, &url, RequestOptions::new().text("x"))
            .await
            .unwrap()
            .status_code,
        200
    );
}

#[tokio::test]
async fn test_impersonation_hints_are_accepted_and_ignored() {
    let server = MockServer::start().await;
    Mock::given(path("/"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let s = session();
    let response = s
        .get(
            &format!("{}/", server.uri()),
            RequestOptions::new().impersonate("chrome124").http_version("2"),
        )
        .await
        .unwrap();
    assert_eq!(response.status_code, 200);
    assert!(!s.capabilities().impersonation);
}

#[tokio::test]
async fn test_per_call_verify_uses_separate_client() {
    let server = MockServer::start().await;
    Mock::given(path("/"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let s = session();
    let url = format!("{}/", server.uri());
    s.get(&url, RequestOptions::new()).await.unwrap();
    s.get(&url, RequestOptions::new()).await.unwrap();
    s.get(&url, RequestOptions::new().verify("off")).await.unwrap();
    assert_eq!(s.fallback().unwrap().client_count(), 2);
}

#[tokio::test]
async fn test_closed_session_rejects_requests() {
    let s = session();
    s.close().await.unwrap();
    let err = s
        .get("http://127.0.0.1:1/", RequestOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, HttpError::Usage(_)));
}

#[tokio::test]
async fn test_invalid_url_is_reported() {
    let err = session()
        .get("not a url", RequestOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, HttpError::InvalidUrl(_)));
}
