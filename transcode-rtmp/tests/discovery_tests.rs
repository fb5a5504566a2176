//! Track discovery and initialization tests over a scripted message channel.

use async_trait::async_trait;
use bytes::Bytes;
use pretty_assertions::assert_eq;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use transcode_rtmp::message::{
    AudioMessage, CommandMessage, DataMessage, UserControl, VideoMessage, AAC_RAW,
    AAC_SEQUENCE_HEADER, AVC_NALU, AVC_SEQUENCE_HEADER, CODEC_AAC, CODEC_H264,
    MEDIA_MESSAGE_STREAM_ID,
};
use transcode_rtmp::{
    AmfMap, AmfValue, Conn, ConnConfig, Message, MessageChannel, RtmpError, SessionRole,
};
use transcode_rtp::avcc;

const SPS: &[u8] = &[0x67, 0x64, 0x00, 0x1F, 0xac, 0xd9, 0x40, 0x50];
const PPS: &[u8] = &[0x68, 0xeb, 0xe3, 0xcb];
const AVC_CONFIG: &[u8] = &[
    0x01, 0x64, 0x00, 0x1F, 0xFF, 0xE1, 0x00, 0x08, 0x67, 0x64, 0x00, 0x1F, 0xac, 0xd9, 0x40,
    0x50, 0x01, 0x00, 0x04, 0x68, 0xeb, 0xe3, 0xcb,
];
// AAC-LC, 44.1 kHz, stereo
const AAC_CONFIG: &[u8] = &[0x12, 0x10];

/// Replays queued messages and records what is written.
struct ScriptedChannel {
    incoming: VecDeque<Message>,
    written: Arc<Mutex<Vec<Message>>>,
}

#[async_trait]
impl MessageChannel for ScriptedChannel {
    async fn read(&mut self) -> transcode_rtmp::Result<Message> {
        self.incoming.pop_front().ok_or(RtmpError::ConnectionClosed)
    }

    async fn write(&mut self, msg: &Message) -> transcode_rtmp::Result<()> {
        self.written.lock().unwrap().push(msg.clone());
        Ok(())
    }
}

fn scripted(messages: Vec<Message>) -> (Conn, Arc<Mutex<Vec<Message>>>) {
    let written = Arc::new(Mutex::new(Vec::new()));
    let channel = ScriptedChannel {
        incoming: messages.into(),
        written: Arc::clone(&written),
    };
    let conn = Conn::from_channel(Box::new(channel), ConnConfig::default()).unwrap();
    (conn, written)
}

fn command(name: &str, id: u32, arguments: Vec<AmfValue>) -> Message {
    Message::Command(CommandMessage {
        chunk_stream_id: 3,
        message_stream_id: 0,
        name: name.into(),
        command_id: id,
        arguments,
    })
}

fn metadata(video: AmfValue, audio: AmfValue) -> Message {
    let mut md = AmfMap::new();
    if !matches!(video, AmfValue::Undefined) {
        md.insert("videocodecid", video);
    }
    if !matches!(audio, AmfValue::Undefined) {
        md.insert("audiocodecid", audio);
    }
    Message::Data(DataMessage {
        chunk_stream_id: 4,
        message_stream_id: MEDIA_MESSAGE_STREAM_ID,
        payload: vec!["@setDataFrame".into(), "onMetaData".into(), md.into()],
    })
}

fn video(dts_ms: u64, key: bool, avc_type: u8, payload: &[u8]) -> Message {
    Message::Video(VideoMessage {
        chunk_stream_id: 6,
        message_stream_id: MEDIA_MESSAGE_STREAM_ID,
        dts: Duration::from_millis(dts_ms),
        pts_delta: Duration::ZERO,
        is_key_frame: key,
        codec: CODEC_H264,
        avc_type,
        payload: Bytes::copy_from_slice(payload),
    })
}

fn audio(dts_ms: u64, aac_type: u8, payload: &[u8]) -> Message {
    Message::Audio(AudioMessage {
        chunk_stream_id: 4,
        message_stream_id: MEDIA_MESSAGE_STREAM_ID,
        dts: Duration::from_millis(dts_ms),
        codec: CODEC_AAC,
        rate: 3,
        depth: 1,
        channels: 1,
        aac_type,
        payload: Bytes::copy_from_slice(payload),
    })
}

fn status_of(msg: &Message) -> Option<(String, String)> {
    match msg {
        Message::Command(cmd) if cmd.name == "onStatus" => {
            let map = cmd.arguments.get(1)?.as_map()?;
            Some((
                map.get_str("code")?.to_string(),
                map.get_str("description")?.to_string(),
            ))
        }
        _ => None,
    }
}

// =============================================================================
// Metadata-driven discovery
// =============================================================================

#[tokio::test]
async fn test_metadata_with_decoder_configs() {
    let (mut conn, _) = scripted(vec![
        command("onStatus", 0, vec![AmfValue::Null]),
        Message::Data(DataMessage {
            chunk_stream_id: 4,
            message_stream_id: MEDIA_MESSAGE_STREAM_ID,
            payload: vec!["|RtmpSampleAccess".into(), true.into(), true.into()],
        }),
        metadata(7.0.into(), 10.0.into()),
        video(0, true, AVC_SEQUENCE_HEADER, AVC_CONFIG),
        audio(0, AAC_SEQUENCE_HEADER, AAC_CONFIG),
    ]);

    let (video, audio) = conn.read_tracks().await.unwrap();

    let h264 = video.unwrap();
    let h264 = h264.as_h264().unwrap();
    assert_eq!(h264.payload_type(), 96);
    assert_eq!(h264.packetization_mode(), 1);
    assert_eq!(h264.safe_sps().as_deref(), Some(SPS));
    assert_eq!(h264.safe_pps().as_deref(), Some(PPS));

    let audio = audio.unwrap();
    assert_eq!(audio.payload_type, 96);
    assert_eq!(audio.config.sample_rate(), 44100);
    assert_eq!(audio.config.channels(), 2);
    assert_eq!(&audio.config.marshal()[..], AAC_CONFIG);
}

#[tokio::test]
async fn test_metadata_with_h265_key_frame() {
    let vps: &[u8] = &[0x40, 0x01, 0x0c, 0x01];
    let sps: &[u8] = &[0x42, 0x01, 0x01, 0x01];
    let pps: &[u8] = &[0x44, 0x01, 0xc1, 0x72];
    let idr: &[u8] = &[0x26, 0x01, 0xaf, 0x09];
    let frame = avcc::marshal(&[
        Bytes::from_static(vps),
        Bytes::from_static(sps),
        Bytes::from_static(pps),
        Bytes::from_static(idr),
    ]);

    let (mut conn, _) = scripted(vec![
        metadata("avc1".into(), AmfValue::Undefined),
        video(0, false, AVC_NALU, &avcc::marshal(&[Bytes::from_static(&[0x02, 0x01])])),
        video(40, true, AVC_NALU, &frame),
    ]);

    let (video, audio) = conn.read_tracks().await.unwrap();
    assert!(audio.is_none());

    let h265 = video.unwrap();
    let h265 = h265.as_h265().unwrap();
    assert_eq!(h265.safe_vps().as_deref(), Some(vps));
    assert_eq!(h265.safe_sps().as_deref(), Some(sps));
    assert_eq!(h265.safe_pps().as_deref(), Some(pps));
}

#[tokio::test]
async fn test_metadata_unsupported_codec() {
    let (mut conn, _) = scripted(vec![metadata(7.0.into(), 2.0.into())]);

    let err = conn.read_tracks().await.unwrap_err();
    assert!(matches!(err, RtmpError::UnsupportedCodec { kind: "audio", .. }));
    assert_eq!(err.to_string(), "unsupported audio codec 2");
}

#[tokio::test]
async fn test_metadata_unexpected_video() {
    let (mut conn, _) = scripted(vec![
        metadata(AmfValue::Undefined, "mp4a".into()),
        video(0, true, AVC_SEQUENCE_HEADER, AVC_CONFIG),
    ]);

    let err = conn.read_tracks().await.unwrap_err();
    assert_eq!(err.to_string(), "protocol error: unexpected video packet");
}

// =============================================================================
// Traffic analysis
// =============================================================================

#[tokio::test]
async fn test_analysis_stops_when_both_tracks_found() {
    // nothing is queued after the configs, so any further read would fail
    let (mut conn, _) = scripted(vec![
        video(0, true, AVC_SEQUENCE_HEADER, AVC_CONFIG),
        audio(20, AAC_SEQUENCE_HEADER, AAC_CONFIG),
    ]);

    let (video, audio) = conn.read_tracks().await.unwrap();
    assert!(video.unwrap().as_h264().is_some());
    assert!(audio.is_some());
}

#[tokio::test]
async fn test_empty_metadata_falls_back_to_analysis() {
    let mut messages = vec![metadata(0.0.into(), 0.0.into())];
    messages.push(audio(5000, AAC_SEQUENCE_HEADER, AAC_CONFIG));
    for ms in (5100..=6000).step_by(100) {
        messages.push(audio(ms, AAC_RAW, &[0x21, 0x10]));
    }
    let (mut conn, _) = scripted(messages);

    let (video, audio) = conn.read_tracks().await.unwrap();
    assert!(video.is_none());
    assert_eq!(audio.unwrap().config.sample_rate(), 44100);
}

#[tokio::test]
async fn test_no_tracks_found_only_after_window() {
    let traffic = |last_ms: u64| {
        let mut messages = vec![metadata(0.0.into(), 0.0.into())];
        for ms in (0..=last_ms).step_by(100) {
            messages.push(audio(ms, AAC_RAW, &[0x21, 0x10]));
        }
        messages
    };

    // 900 ms of traffic: the window is still open when the channel ends
    let (mut conn, _) = scripted(traffic(900));
    let err = conn.read_tracks().await.unwrap_err();
    assert!(matches!(err, RtmpError::ConnectionClosed));

    let (mut conn, _) = scripted(traffic(1000));
    let err = conn.read_tracks().await.unwrap_err();
    assert!(matches!(err, RtmpError::NoTracksFound));
    assert_eq!(err.to_string(), "no tracks found");
}

#[tokio::test]
async fn test_analysis_window_is_per_media_type() {
    // video starts late: its window starts at its own first timestamp
    let mut messages = Vec::new();
    for ms in (0..=900).step_by(100) {
        messages.push(audio(ms, AAC_RAW, &[0x21]));
    }
    messages.push(video(3000, false, AVC_NALU, &[0, 0, 0, 1, 0x41]));
    messages.push(video(3500, true, AVC_SEQUENCE_HEADER, AVC_CONFIG));
    messages.push(video(4000, false, AVC_NALU, &[0, 0, 0, 1, 0x41]));
    let (mut conn, _) = scripted(messages);

    let (video, audio) = conn.read_tracks().await.unwrap();
    assert!(video.is_some());
    assert!(audio.is_none());
}

// =============================================================================
// Initialization
// =============================================================================

#[tokio::test]
async fn test_server_play_sequence() {
    let connect = AmfMap::new()
        .with("app", "live")
        .with("tcurl", "rtmp://example.com:1935/live")
        .with("objectEncoding", 3.0);
    let (mut conn, written) = scripted(vec![
        command("connect", 1, vec![connect.into()]),
        command("createStream", 2, vec![AmfValue::Null]),
        command("getStreamLength", 3, vec![AmfValue::Null, "cam".into()]),
        command("play", 4, vec![AmfValue::Null, "cam".into()]),
    ]);

    let target = conn.initialize_server().await.unwrap();
    assert_eq!(target.role, SessionRole::Playing);
    assert_eq!(target.url.as_str(), "rtmp://example.com:1935/live/cam");

    let written = written.lock().unwrap();
    assert_eq!(written[0], Message::SetWindowAckSize(2_500_000));
    assert_eq!(
        written[1],
        Message::SetPeerBandwidth {
            value: 2_500_000,
            limit_type: 2
        }
    );
    assert_eq!(written[2], Message::SetChunkSize(65536));

    let Message::Command(result) = &written[3] else {
        panic!("expected connect result");
    };
    assert_eq!(result.name, "_result");
    assert_eq!(result.command_id, 1);
    let info = result.arguments[1].as_map().unwrap();
    assert_eq!(info.get_str("code"), Some("NetConnection.Connect.Success"));
    assert_eq!(info.get_number("objectEncoding"), Some(3.0));

    let Message::Command(created) = &written[4] else {
        panic!("expected createStream result");
    };
    assert_eq!(created.arguments, vec![AmfValue::Null, AmfValue::Number(1.0)]);

    assert_eq!(
        written[5],
        Message::UserControl(UserControl::StreamIsRecorded { stream_id: 1 })
    );
    assert_eq!(
        written[6],
        Message::UserControl(UserControl::StreamBegin { stream_id: 1 })
    );

    let statuses: Vec<_> = written[7..].iter().filter_map(status_of).collect();
    assert_eq!(
        statuses,
        vec![
            ("NetStream.Play.Reset".to_string(), "play reset".to_string()),
            ("NetStream.Play.Start".to_string(), "play start".to_string()),
            ("NetStream.Data.Start".to_string(), "data start".to_string()),
            (
                "NetStream.Play.PublishNotify".to_string(),
                "publish notify".to_string()
            ),
        ]
    );
    assert_eq!(written.len(), 11);
    for msg in &written[7..] {
        let Message::Command(cmd) = msg else {
            panic!("expected onStatus");
        };
        assert_eq!(cmd.command_id, 4);
        assert_eq!(cmd.chunk_stream_id, 5);
        assert_eq!(cmd.message_stream_id, MEDIA_MESSAGE_STREAM_ID);
    }
}

#[tokio::test]
async fn test_server_publish_sequence() {
    let connect = AmfMap::new()
        .with("app", "live")
        .with("tcUrl", "rtmp://example.com/live");
    let (mut conn, written) = scripted(vec![
        command("connect", 1, vec![connect.into()]),
        command("releaseStream", 2, vec![AmfValue::Null, "cam".into()]),
        command("FCPublish", 3, vec![AmfValue::Null, "cam".into()]),
        command("createStream", 4, vec![AmfValue::Null]),
        command("publish", 5, vec![AmfValue::Null, "cam".into(), "live".into()]),
    ]);

    let target = conn.initialize_server().await.unwrap();
    assert_eq!(target.role, SessionRole::Publishing);
    assert_eq!(target.url.as_str(), "rtmp://example.com/live/cam");

    let written = written.lock().unwrap();
    // negotiation, connect result, createStream result, publish status
    assert_eq!(written.len(), 6);

    let Message::Command(created) = &written[4] else {
        panic!("expected createStream result");
    };
    assert_eq!(created.name, "_result");
    assert_eq!(created.command_id, 4);
    assert_eq!(created.chunk_stream_id, 3);
    assert_eq!(created.arguments, vec![AmfValue::Null, AmfValue::Number(1.0)]);

    let Message::Command(started) = &written[5] else {
        panic!("expected onStatus");
    };
    assert_eq!(started.name, "onStatus");
    assert_eq!(started.command_id, 5);
    assert_eq!(started.chunk_stream_id, 5);
    assert_eq!(started.message_stream_id, MEDIA_MESSAGE_STREAM_ID);
    assert_eq!(
        status_of(&written[5]),
        Some((
            "NetStream.Publish.Start".to_string(),
            "publish start".to_string()
        ))
    );
}

#[tokio::test]
async fn test_client_publish_sequence() {
    let url = url::Url::parse("rtmp://example.com/live/cam").unwrap();
    let (mut conn, written) = scripted(vec![
        command(
            "_result",
            1,
            vec![
                AmfValue::Null,
                AmfMap::new().with("level", "status").into(),
            ],
        ),
        command("_result", 4, vec![AmfValue::Null, AmfValue::Number(1.0)]),
        command(
            "onStatus",
            5,
            vec![
                AmfValue::Null,
                AmfMap::new().with("level", "status").into(),
            ],
        ),
    ]);

    conn.initialize_client(&url, true).await.unwrap();

    let written = written.lock().unwrap();
    let commands: Vec<_> = written
        .iter()
        .filter_map(|msg| match msg {
            Message::Command(cmd) => Some(cmd.clone()),
            _ => None,
        })
        .collect();

    let sequence: Vec<_> = commands
        .iter()
        .map(|cmd| (cmd.name.as_str(), cmd.command_id))
        .collect();
    assert_eq!(
        sequence,
        vec![
            ("connect", 1),
            ("releaseStream", 2),
            ("FCPublish", 3),
            ("createStream", 4),
            ("publish", 5),
        ]
    );

    for cmd in &commands[..4] {
        assert_eq!(cmd.chunk_stream_id, 3);
        assert_eq!(cmd.message_stream_id, 0);
    }
    assert_eq!(commands[1].arguments, vec![AmfValue::Null, "cam".into()]);
    assert_eq!(commands[2].arguments, vec![AmfValue::Null, "cam".into()]);
    assert_eq!(commands[3].arguments, vec![AmfValue::Null]);

    let publish = &commands[4];
    assert_eq!(publish.chunk_stream_id, 4);
    assert_eq!(publish.message_stream_id, MEDIA_MESSAGE_STREAM_ID);
    assert_eq!(
        publish.arguments,
        vec![AmfValue::Null, "cam".into(), "live".into()]
    );
}

#[tokio::test]
async fn test_server_rejects_bad_connect() {
    let (mut conn, _) = scripted(vec![command("play", 1, vec![])]);
    let err = conn.initialize_server().await.unwrap_err();
    assert!(matches!(err, RtmpError::Protocol(_)));

    let connect = AmfMap::new().with("app", "live");
    let (mut conn, written) = scripted(vec![command("connect", 1, vec![connect.into()])]);
    let err = conn.initialize_server().await.unwrap_err();
    assert!(matches!(err, RtmpError::Protocol(_)));
    assert!(written.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_client_refused() {
    let url = url::Url::parse("rtmp://example.com/live/cam").unwrap();
    let (mut conn, _) = scripted(vec![
        // unrelated command with the same ID is skipped
        command("onBWDone", 1, vec![]),
        command(
            "_result",
            1,
            vec![
                AmfValue::Null,
                AmfMap::new().with("level", "error").into(),
            ],
        ),
    ]);

    let err = conn.initialize_client(&url, false).await.unwrap_err();
    assert!(matches!(err, RtmpError::Refused));
    assert_eq!(err.to_string(), "server refused connect request");
}
