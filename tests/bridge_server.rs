//! End-to-end bridge tests
//!
//! Runs the full server against a mock realtime backend and drives it with
//! a real telephony WebSocket client.

mod mock_realtime;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message,
};
use tower::util::ServiceExt;

use callbridge::core::audio::{
    decode_base64, encode_base64, synthesize_dtmf_tone, synthesize_silence,
};
use callbridge::{CallEvent, CallStatus, ServerConfig, routes, state::AppState};
use mock_realtime::MockRealtime;

type Phone = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start_server(realtime_url: &str) -> (SocketAddr, Arc<AppState>) {
    let mut config = ServerConfig::default();
    config.host = "127.0.0.1".to_string();
    config.openai_api_key = Some("test-key".to_string());
    config.realtime_url = realtime_url.to_string();

    let state = AppState::new(config);
    let app = routes::create_app(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, state)
}

async fn dial(addr: SocketAddr) -> Phone {
    let (phone, _) = connect_async(format!("ws://{addr}/media-stream?call_type=inbound"))
        .await
        .unwrap();
    phone
}

async fn send(phone: &mut Phone, frame: Value) {
    phone
        .send(Message::Text(frame.to_string().into()))
        .await
        .unwrap();
}

/// Next JSON frame from the server.
async fn recv(phone: &mut Phone) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), phone.next())
            .await
            .expect("timed out waiting for telephony frame")
            .expect("telephony socket closed")
            .unwrap();
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

async fn start_call(phone: &mut Phone, call_sid: &str) {
    send(phone, json!({"event": "connected", "protocol": "Call", "version": "1.0.0"})).await;
    send(
        phone,
        json!({
            "event": "start",
            "sequenceNumber": "1",
            "start": {
                "streamSid": "MZ1",
                "callSid": call_sid,
                "customParameters": {"voice": "coral", "from": "+15550001111"}
            },
            "streamSid": "MZ1"
        }),
    )
    .await;
}

async fn wait_until<F: Fn() -> bool>(condition: F) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

async fn call_api(state: &Arc<AppState>, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };
    let response = routes::create_app(state.clone())
        .oneshot(request)
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn test_call_audio_flows_both_ways() {
    let mut backend = MockRealtime::start().await;
    let (addr, state) = start_server(&backend.url).await;
    let mut phone = dial(addr).await;

    start_call(&mut phone, "CA100").await;

    let update = backend.expect_event("session.update").await;
    assert_eq!(update["session"]["input_audio_format"], "pcm16");
    assert_eq!(update["session"]["output_audio_format"], "g711_ulaw");
    assert_eq!(update["session"]["voice"], "coral");

    // Caller audio is transcoded to 16 kHz PCM
    let ulaw = vec![0x7Fu8; 160];
    send(
        &mut phone,
        json!({"event": "media", "media": {"track": "inbound", "timestamp": "20", "payload": encode_base64(&ulaw)}}),
    )
    .await;
    let append = backend.expect_event("input_audio_buffer.append").await;
    let pcm = decode_base64(append["audio"].as_str().unwrap()).unwrap();
    assert_eq!(pcm.len(), ulaw.len() * 4);

    // Agent audio is passed through and followed by a mark
    let agent = vec![0x55u8; 160];
    backend.send(json!({
        "type": "response.audio.delta",
        "response_id": "resp_1",
        "item_id": "item_1",
        "output_index": 0,
        "content_index": 0,
        "delta": encode_base64(&agent)
    }));

    let media = recv(&mut phone).await;
    assert_eq!(media["event"], "media");
    assert_eq!(media["streamSid"], "MZ1");
    assert_eq!(media["media"]["payload"], encode_base64(&agent));
    let mark = recv(&mut phone).await;
    assert_eq!(mark["event"], "mark");

    wait_until(|| {
        state
            .tracker
            .get("CA100")
            .is_some_and(|c| c.status == callbridge::CallStatus::Active)
    })
    .await;

    let (status, body) = call_api(&state, "GET", "/calls/CA100", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["call_sid"], "CA100");
    assert_eq!(body["status"], "active");
    assert_eq!(body["from_number"], "+15550001111");

    // Carrier hangs up
    send(&mut phone, json!({"event": "stop", "streamSid": "MZ1"})).await;
    wait_until(|| state.registry.session_count() == 0).await;
    assert!(state.registry.get_by_call_id("CA100").is_none());
    assert!(state.tracker.get("CA100").is_none());
}

#[tokio::test]
async fn test_caller_barge_in_clears_playback() {
    let mut backend = MockRealtime::start().await;
    let (addr, _state) = start_server(&backend.url).await;
    let mut phone = dial(addr).await;

    start_call(&mut phone, "CA200").await;
    backend.expect_event("session.update").await;

    send(
        &mut phone,
        json!({"event": "media", "media": {"timestamp": "100", "payload": encode_base64(&[0xFF; 160])}}),
    )
    .await;
    backend.expect_event("input_audio_buffer.append").await;

    backend.send(json!({
        "type": "response.audio.delta",
        "item_id": "item_7",
        "delta": encode_base64(&[0x55; 160])
    }));
    assert_eq!(recv(&mut phone).await["event"], "media");
    assert_eq!(recv(&mut phone).await["event"], "mark");

    send(
        &mut phone,
        json!({"event": "media", "media": {"timestamp": "400", "payload": encode_base64(&[0xFF; 160])}}),
    )
    .await;
    backend.expect_event("input_audio_buffer.append").await;

    backend.send(json!({"type": "input_audio_buffer.speech_started", "audio_start_ms": 380, "item_id": "item_8"}));

    let clear = recv(&mut phone).await;
    assert_eq!(clear["event"], "clear");
    assert_eq!(clear["streamSid"], "MZ1");

    let truncate = backend.next_control_event().await;
    assert_eq!(truncate["type"], "conversation.item.truncate");
    assert_eq!(truncate["item_id"], "item_7");
    assert_eq!(truncate["audio_end_ms"], 300);
}

#[tokio::test]
async fn test_operator_context_reaches_backend() {
    let mut backend = MockRealtime::start().await;
    let (addr, state) = start_server(&backend.url).await;
    let mut phone = dial(addr).await;

    start_call(&mut phone, "CA300").await;
    backend.expect_event("session.update").await;
    wait_until(|| state.registry.get_by_call_id("CA300").is_some()).await;

    let (status, _) = call_api(
        &state,
        "POST",
        "/calls/CA300/context",
        Some(json!({"text": "Offer the loyalty discount", "history_summary": "Caller wants to cancel"})),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let item = backend.next_control_event().await;
    assert_eq!(item["type"], "conversation.item.create");
    assert_eq!(item["item"]["role"], "system");
    let text = item["item"]["content"][0]["text"].as_str().unwrap();
    assert!(text.contains("Offer the loyalty discount"));
    assert!(text.contains("Caller wants to cancel"));
    assert_eq!(backend.next_control_event().await["type"], "response.create");

    let (status, body) = call_api(
        &state,
        "POST",
        "/calls/CA999/context",
        Some(json!({"text": "nobody home"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn test_operator_hangup_closes_telephony_socket() {
    let mut backend = MockRealtime::start().await;
    let (addr, state) = start_server(&backend.url).await;
    let mut phone = dial(addr).await;

    start_call(&mut phone, "CA400").await;
    backend.expect_event("session.update").await;
    wait_until(|| state.registry.get_by_call_id("CA400").is_some()).await;

    let (status, _) = call_api(&state, "POST", "/calls/CA400/end", None).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let closed = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match phone.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(closed.is_ok());
    wait_until(|| state.registry.session_count() == 0).await;
}

#[tokio::test]
async fn test_operator_dtmf_plays_in_order() {
    let mut backend = MockRealtime::start().await;
    let (addr, state) = start_server(&backend.url).await;
    let mut phone = dial(addr).await;

    start_call(&mut phone, "CA600").await;
    backend.expect_event("session.update").await;
    wait_until(|| state.registry.get_by_call_id("CA600").is_some()).await;

    let (status, _) = call_api(
        &state,
        "POST",
        "/calls/CA600/dtmf",
        Some(json!({"digits": "1w2", "tone_ms": 100, "pause_ms": 50})),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let expected = [
        synthesize_dtmf_tone('1', 100),
        synthesize_silence(50),
        synthesize_silence(500),
        synthesize_dtmf_tone('2', 100),
        synthesize_silence(50),
    ];
    for chunk in &expected {
        let frame = recv(&mut phone).await;
        assert_eq!(frame["event"], "media");
        assert_eq!(frame["streamSid"], "MZ1");
        let payload = decode_base64(frame["media"]["payload"].as_str().unwrap()).unwrap();
        assert_eq!(&payload, chunk);
    }
}

#[tokio::test]
async fn test_event_stream_follows_one_call() {
    let mut backend = MockRealtime::start().await;
    let (addr, state) = start_server(&backend.url).await;
    let mut phone = dial(addr).await;

    start_call(&mut phone, "CA500").await;
    backend.expect_event("session.update").await;
    wait_until(|| {
        state
            .tracker
            .get("CA500")
            .is_some_and(|c| c.status == CallStatus::Active)
    })
    .await;

    let (mut events, _) = connect_async(format!("ws://{addr}/calls/CA500/events"))
        .await
        .unwrap();

    // Another call's traffic must not leak into this stream
    state.tracker.events().publish(CallEvent::transcript(
        Some("CA999".to_string()),
        callbridge::core::call::Role::User,
        "someone else",
        false,
    ));

    backend.send(json!({
        "type": "conversation.item.input_audio_transcription.completed",
        "item_id": "item_1",
        "transcript": "I need help with my order"
    }));
    wait_until(|| {
        state
            .tracker
            .get("CA500")
            .is_some_and(|c| !c.transcript.is_empty())
    })
    .await;

    let (status, _) = call_api(&state, "POST", "/calls/CA500/hold", None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = call_api(&state, "POST", "/calls/CA500/end", None).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let received = tokio::time::timeout(Duration::from_secs(5), async {
        let mut received = Vec::new();
        loop {
            match events.next().await {
                Some(Ok(Message::Text(text))) => {
                    received.push(serde_json::from_str::<Value>(&text).unwrap());
                }
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            }
        }
        received
    })
    .await
    .expect("event stream did not close after session_end");

    assert!(received.iter().all(|e| e["call_sid"] == "CA500"));
    assert!(received.iter().any(|e| e["type"] == "transcript"
        && e["role"] == "user"
        && e["text"] == "I need help with my order"
        && e["partial"] == false));
    assert!(
        received
            .iter()
            .any(|e| e["type"] == "status" && e["status"] == "on_hold")
    );
    assert_eq!(received.last().unwrap()["type"], "session_end");
}
