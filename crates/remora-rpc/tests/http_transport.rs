use std::time::Duration;

use anyhow::Result;
use httpmock::prelude::*;
use remora_rpc::request::{session_get, torrent_get, torrent_start};
use remora_rpc::{
    HttpTransport, HttpTransportConfig, RpcError, SESSION_ID_HEADER, TORRENT_FIELDS, Transport,
    TransportErrorKind,
};
use serde_json::json;

const RPC_PATH: &str = "/transmission/rpc";

fn transport_for(server: &MockServer, timeout: Duration) -> Result<HttpTransport> {
    Ok(HttpTransport::new(HttpTransportConfig {
        endpoint: server.url(RPC_PATH).parse()?,
        username: None,
        password: None,
        timeout,
    })?)
}

#[tokio::test]
async fn successful_envelope_is_returned() -> Result<()> {
    let server = MockServer::start_async().await;
    let mock = server.mock(|when, then| {
        when.method(POST).path(RPC_PATH);
        then.status(200).json_body(json!({
            "result": "success",
            "arguments": {"torrents": [{"id": 1, "name": "a"}]}
        }));
    });

    let transport = transport_for(&server, Duration::from_secs(5))?;
    let response = transport.dispatch(torrent_get(TORRENT_FIELDS)).await?;

    mock.assert();
    assert!(response.is_success());
    assert_eq!(response.arguments["torrents"][0]["id"], json!(1));
    Ok(())
}

#[tokio::test]
async fn daemon_failure_becomes_protocol_error() -> Result<()> {
    let server = MockServer::start_async().await;
    server.mock(|when, then| {
        when.method(POST).path(RPC_PATH);
        then.status(200)
            .json_body(json!({"result": "invalid or corrupt torrent file"}));
    });

    let transport = transport_for(&server, Duration::from_secs(5))?;
    let err = transport
        .dispatch(torrent_start(&[4]))
        .await
        .err()
        .ok_or_else(|| anyhow::anyhow!("expected protocol failure"))?;

    assert!(matches!(err, RpcError::Protocol { .. }));
    assert_eq!(err.user_message(), "invalid or corrupt torrent file");
    Ok(())
}

#[tokio::test]
async fn non_json_body_becomes_decode_error() -> Result<()> {
    let server = MockServer::start_async().await;
    server.mock(|when, then| {
        when.method(POST).path(RPC_PATH);
        then.status(200).body("<html>proxy error</html>");
    });

    let transport = transport_for(&server, Duration::from_secs(5))?;
    let err = transport.dispatch(session_get()).await.err();

    assert!(matches!(err, Some(RpcError::Decode { .. })));
    Ok(())
}

#[tokio::test]
async fn http_status_becomes_http_error() -> Result<()> {
    let server = MockServer::start_async().await;
    server.mock(|when, then| {
        when.method(POST).path(RPC_PATH);
        then.status(401);
    });

    let transport = transport_for(&server, Duration::from_secs(5))?;
    let err = transport.dispatch(session_get()).await.err();

    match err {
        Some(err @ RpcError::Http { code: 401 }) => {
            assert_eq!(err.status_code(), -501);
            assert_eq!(err.user_message(), "Request failed with HTTP code 401");
        }
        other => panic!("unexpected result: {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn conflict_stores_session_id_and_retries_once() -> Result<()> {
    let server = MockServer::start_async().await;
    let conflict = server.mock(|when, then| {
        when.method(POST).path(RPC_PATH);
        then.status(409).header(SESSION_ID_HEADER, "abc123");
    });

    let transport = transport_for(&server, Duration::from_secs(5))?;
    let err = transport.dispatch(session_get()).await.err();

    conflict.assert_hits(2);
    assert!(matches!(err, Some(RpcError::Http { code: 409 })));
    assert_eq!(transport.session_id().as_deref(), Some("abc123"));
    Ok(())
}

#[tokio::test]
async fn basic_auth_is_sent_when_configured() -> Result<()> {
    let server = MockServer::start_async().await;
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path(RPC_PATH)
            .header("Authorization", "Basic YWRtaW46c2VjcmV0");
        then.status(200).json_body(json!({"result": "success"}));
    });

    let transport = HttpTransport::new(HttpTransportConfig {
        endpoint: server.url(RPC_PATH).parse()?,
        username: Some("admin".into()),
        password: Some("secret".into()),
        timeout: Duration::from_secs(5),
    })?;
    transport.dispatch(session_get()).await?;

    mock.assert();
    Ok(())
}

#[tokio::test]
async fn slow_daemon_is_a_timeout() -> Result<()> {
    let server = MockServer::start_async().await;
    server.mock(|when, then| {
        when.method(POST).path(RPC_PATH);
        then.status(200)
            .delay(Duration::from_millis(500))
            .json_body(json!({"result": "success"}));
    });

    let transport = transport_for(&server, Duration::from_millis(50))?;
    let err = transport.dispatch(session_get()).await.err();

    assert!(matches!(
        err,
        Some(RpcError::Transport {
            kind: TransportErrorKind::Timeout,
            ..
        })
    ));
    Ok(())
}

#[tokio::test]
async fn refused_connection_is_a_transport_error() -> Result<()> {
    let transport = HttpTransport::new(HttpTransportConfig {
        endpoint: "http://127.0.0.1:1/transmission/rpc".parse()?,
        username: None,
        password: None,
        timeout: Duration::from_secs(2),
    })?;
    let err = transport.dispatch(session_get()).await.err();

    assert!(matches!(err, Some(RpcError::Transport { .. })));
    Ok(())
}
