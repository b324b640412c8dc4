use bytes::BytesMut;
use hostplane::core::protocol::{
    EndpointCreated, EndpointReply, Message, MessageCodec, ResyncStateReply, ReturnCode,
};
use tokio_util::codec::{Decoder, Encoder};

#[test]
fn test_endpoint_created_round_trip() {
    let json = r#"{
        "type": "ENDPOINTCREATED",
        "endpoint_id": "e1",
        "resync_id": "R1",
        "issued": 1700000000000,
        "mac": "AA:BB:CC:00:00:01",
        "state": "enabled",
        "addrs": ["10.0.0.1", "fd00::1"]
    }"#;
    let message: Message = serde_json::from_str(json).unwrap();
    let Message::EndpointCreated(created) = &message else {
        panic!("Expected ENDPOINTCREATED, got {}", message.kind());
    };
    assert_eq!(created.endpoint_id, "e1");
    assert_eq!(created.resync_id.as_deref(), Some("R1"));
    // MAC addresses are normalized to lowercase on deserialization.
    assert_eq!(created.mac.as_str(), "aa:bb:cc:00:00:01");
    assert_eq!(created.addrs.len(), 2);

    let encoded = serde_json::to_string(&message).unwrap();
    let decoded: Message = serde_json::from_str(&encoded).unwrap();
    assert_eq!(decoded, message);
}

#[test]
fn test_resync_id_defaults_to_none() {
    let json = r#"{
        "type": "ENDPOINTCREATED",
        "endpoint_id": "e1",
        "issued": 1,
        "mac": "aa:bb:cc:00:00:01",
        "state": "disabled"
    }"#;
    let message: Message = serde_json::from_str(json).unwrap();
    let Message::EndpointCreated(EndpointCreated {
        resync_id, addrs, ..
    }) = message
    else {
        panic!("Expected ENDPOINTCREATED");
    };
    assert_eq!(resync_id, None);
    assert!(addrs.is_empty());
}

#[test]
fn test_missing_required_field_is_rejected() {
    // No endpoint_id.
    let json = r#"{"type":"ENDPOINTCREATED","issued":1,"mac":"aa:bb:cc:00:00:01","state":"enabled"}"#;
    assert!(serde_json::from_str::<Message>(json).is_err());
}

#[test]
fn test_invalid_mac_is_rejected() {
    let json = r#"{"type":"ENDPOINTCREATED","endpoint_id":"e1","issued":1,"mac":"not-a-mac","state":"enabled"}"#;
    assert!(serde_json::from_str::<Message>(json).is_err());
}

#[test]
fn test_unknown_message_type_is_rejected() {
    let json = r#"{"type":"FROBNICATE"}"#;
    assert!(serde_json::from_str::<Message>(json).is_err());
}

#[test]
fn test_heartbeat_round_trip() {
    let message: Message = serde_json::from_str(r#"{"type":"HEARTBEAT"}"#).unwrap();
    assert_eq!(message, Message::Heartbeat);
    let encoded = serde_json::to_string(&message).unwrap();
    assert!(encoded.contains("HEARTBEAT"));
}

#[test]
fn test_return_code_mapping() {
    let reply: ResyncStateReply =
        serde_json::from_str(r#"{"rc":"SUCCESS","message":"","endpoint_count":3}"#).unwrap();
    assert!(reply.rc.is_success());
    assert_eq!(reply.endpoint_count, 3);

    let reply: ResyncStateReply =
        serde_json::from_str(r#"{"rc":"NO SUCH HOST","message":"oops","endpoint_count":0}"#)
            .unwrap();
    assert_eq!(reply.rc, ReturnCode::Error("NO SUCH HOST".to_string()));

    let encoded = serde_json::to_string(&Message::EndpointReply(EndpointReply {
        rc: ReturnCode::Success,
        message: String::new(),
    }))
    .unwrap();
    assert!(encoded.contains("\"SUCCESS\""));
}

#[test]
fn test_codec_round_trip() {
    let mut codec = MessageCodec::new();
    let message = Message::EndpointReply(EndpointReply {
        rc: ReturnCode::Success,
        message: "ok".to_string(),
    });

    let mut buf = BytesMut::new();
    codec.encode(message.clone(), &mut buf).unwrap();
    let decoded = codec.decode(&mut buf).unwrap().unwrap();
    assert_eq!(decoded, message);
    assert!(buf.is_empty());
}

#[test]
fn test_codec_partial_frame_waits_for_more() {
    let mut codec = MessageCodec::new();
    let mut buf = BytesMut::new();
    codec.encode(Message::Heartbeat, &mut buf).unwrap();

    // Truncate the frame; the decoder must ask for more rather than fail.
    let partial = buf.split_to(buf.len() - 2);
    let mut partial = BytesMut::from(&partial[..]);
    assert!(codec.decode(&mut partial).unwrap().is_none());
}

#[test]
fn test_codec_garbage_payload_is_an_error() {
    let mut inner = tokio_util::codec::LengthDelimitedCodec::new();
    let mut buf = BytesMut::new();
    inner
        .encode(bytes::Bytes::from_static(b"not json"), &mut buf)
        .unwrap();

    let mut codec = MessageCodec::new();
    assert!(codec.decode(&mut buf).is_err());
}
