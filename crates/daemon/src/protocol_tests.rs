// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Protocol unit tests

use super::*;

#[test]
fn fence_request_wire_form() {
    let json = r#"{"op":"fence","target":"node3","action":"reboot","timeout_s":90,"async":true}"#;

    let request: Request = decode(json.as_bytes()).expect("decode failed");

    assert_eq!(
        request,
        Request::Fence {
            target: "node3".to_string(),
            action: Action::Reboot,
            timeout_s: Some(90),
            tolerance_s: None,
            allow_self_fencing: false,
            detach: true,
            client_id: None,
        }
    );
}

#[test]
fn register_request_builds_a_device_spec() {
    let json = r#"{"op":"register_device","device":"ipmi-1","agent":"fence_ipmilan",
        "params":{"ip":"10.0.0.5","pcmk_host_list":"node1"},"unfencing":true}"#;

    let request: Request = decode(json.as_bytes()).expect("decode failed");
    let spec = request.device_spec().expect("not a registration");

    assert_eq!(spec.id, "ipmi-1");
    assert_eq!(spec.agent, "fence_ipmilan");
    assert_eq!(spec.params.get("ip").map(String::as_str), Some("10.0.0.5"));
    assert!(spec.provides_unfencing);
    assert_eq!(request.op(), "register_device");
}

#[test]
fn query_defaults_to_off() {
    let request: Request = decode(br#"{"op":"query","target":"node1"}"#).expect("decode failed");
    assert_eq!(
        request,
        Request::Query {
            target: "node1".to_string(),
            action: Action::Off,
        }
    );
}

#[test]
fn level_request_carries_target_kind() {
    let request = Request::RegisterLevel {
        target: TargetSpec::pattern("node[0-9]+"),
        index: 2,
        devices: vec!["D1".to_string(), "D2".to_string()],
    };

    let encoded = encode(&request).expect("encode failed");
    let json: serde_json::Value = serde_json::from_slice(&encoded).expect("not json");

    assert_eq!(json["op"], "register_level");
    assert_eq!(json["target"]["kind"], "pattern");
    assert_eq!(decode::<Request>(&encoded).expect("decode failed"), request);
}

#[test]
fn unknown_op_is_rejected() {
    let result: Result<Request, _> = decode(br#"{"op":"explode"}"#);
    assert!(matches!(result, Err(ProtocolError::Json(_))));
}

#[test]
fn error_response_carries_rc_and_reason() {
    let response = Response::error(&FenceError::NoDevices);

    let encoded = encode(&response).expect("encode failed");
    let json: serde_json::Value = serde_json::from_slice(&encoded).expect("not json");

    assert_eq!(json["type"], "error");
    assert_eq!(json["rc"], FenceError::RC_NO_DEVICES);
}

#[test]
fn encode_returns_json_without_length_prefix() {
    let response = Response::Ok;
    let encoded = encode(&response).expect("encode failed");

    let json_str = std::str::from_utf8(&encoded).expect("should be valid UTF-8");
    assert!(
        json_str.starts_with('{'),
        "should be JSON object: {}",
        json_str
    );
}

#[tokio::test]
async fn read_write_message_roundtrip() {
    let original = b"hello world";

    let mut buffer = Vec::new();
    write_message(&mut buffer, original)
        .await
        .expect("write failed");

    // 4-byte length prefix
    assert_eq!(buffer.len(), 4 + original.len());

    let mut cursor = std::io::Cursor::new(buffer);
    let read_back = read_message(&mut cursor).await.expect("read failed");

    assert_eq!(read_back, original);
}

#[tokio::test]
async fn write_message_adds_length_prefix() {
    let data = b"test data";

    let mut buffer = Vec::new();
    write_message(&mut buffer, data)
        .await
        .expect("write failed");

    let len = u32::from_be_bytes([buffer[0], buffer[1], buffer[2], buffer[3]]) as usize;
    assert_eq!(len, data.len());
    assert_eq!(&buffer[4..], data);
}

#[tokio::test]
async fn empty_stream_is_a_closed_connection() {
    let mut cursor = std::io::Cursor::new(Vec::<u8>::new());
    let result = read_message(&mut cursor).await;
    assert!(matches!(result, Err(ProtocolError::ConnectionClosed)));
}

#[tokio::test]
async fn oversized_length_is_refused() {
    let len = (MAX_MESSAGE_SIZE as u32 + 1).to_be_bytes();
    let mut cursor = std::io::Cursor::new(len.to_vec());
    let result = read_message(&mut cursor).await;
    assert!(matches!(result, Err(ProtocolError::MessageTooLarge { .. })));
}

#[tokio::test]
async fn request_and_response_over_a_duplex_pipe() {
    let (mut client, mut server) = tokio::io::duplex(1024);

    let request = Request::Cancel {
        op_id: OpId::from("op-7"),
    };
    write_message(&mut client, &encode(&request).unwrap())
        .await
        .unwrap();
    let received = read_request(&mut server, DEFAULT_TIMEOUT).await.unwrap();
    assert_eq!(received, request);

    write_response(&mut server, &Response::Ok, DEFAULT_TIMEOUT)
        .await
        .unwrap();
    let reply: Response = decode(&read_message(&mut client).await.unwrap()).unwrap();
    assert_eq!(reply, Response::Ok);
}
