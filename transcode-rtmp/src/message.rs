//! RTMP protocol messages.
//!
//! A [`RawMessage`] is what the chunk layer reassembles; [`Message`] is its
//! typed form. Conversion is lossless for every message the engine writes.

use crate::amf::AmfValue;
use crate::error::{Result, RtmpError};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::time::Duration;

// Message type IDs
pub const MSG_SET_CHUNK_SIZE: u8 = 1;
pub const MSG_ABORT: u8 = 2;
pub const MSG_ACKNOWLEDGE: u8 = 3;
pub const MSG_USER_CONTROL: u8 = 4;
pub const MSG_WINDOW_ACK_SIZE: u8 = 5;
pub const MSG_SET_PEER_BANDWIDTH: u8 = 6;
pub const MSG_AUDIO: u8 = 8;
pub const MSG_VIDEO: u8 = 9;
pub const MSG_DATA_AMF3: u8 = 15;
pub const MSG_COMMAND_AMF3: u8 = 17;
pub const MSG_DATA_AMF0: u8 = 18;
pub const MSG_COMMAND_AMF0: u8 = 20;

// User control event types
const EVENT_STREAM_BEGIN: u16 = 0;
const EVENT_STREAM_EOF: u16 = 1;
const EVENT_STREAM_DRY: u16 = 2;
const EVENT_SET_BUFFER_LENGTH: u16 = 3;
const EVENT_STREAM_IS_RECORDED: u16 = 4;
const EVENT_PING_REQUEST: u16 = 6;
const EVENT_PING_RESPONSE: u16 = 7;

/// Chunk stream of protocol control messages.
pub const CONTROL_CHUNK_STREAM_ID: u32 = 2;
/// Chunk stream of connection commands.
pub const COMMAND_CHUNK_STREAM_ID: u32 = 3;
/// Chunk stream of data messages and stream commands.
pub const DATA_CHUNK_STREAM_ID: u32 = 4;
/// Chunk stream of audio.
pub const AUDIO_CHUNK_STREAM_ID: u32 = 4;
/// Chunk stream of status notifications.
pub const STATUS_CHUNK_STREAM_ID: u32 = 5;
/// Chunk stream of video.
pub const VIDEO_CHUNK_STREAM_ID: u32 = 6;

/// Message stream used for media and stream commands.
///
/// Written big-endian on the wire, so little-endian peers read stream 1.
pub const MEDIA_MESSAGE_STREAM_ID: u32 = 0x100_0000;

/// FLV video codec: AVC.
pub const CODEC_H264: u8 = 7;
/// FLV audio codec: AAC.
pub const CODEC_AAC: u8 = 10;

/// AVC packet type: decoder configuration record.
pub const AVC_SEQUENCE_HEADER: u8 = 0;
/// AVC packet type: NAL units.
pub const AVC_NALU: u8 = 1;
/// AAC packet type: AudioSpecificConfig.
pub const AAC_SEQUENCE_HEADER: u8 = 0;
/// AAC packet type: raw frame.
pub const AAC_RAW: u8 = 1;

/// Sound rate field: 44 kHz.
pub const SOUND_RATE_44KHZ: u8 = 3;
/// Sound size field: 16 bit.
pub const SOUND_SIZE_16BIT: u8 = 1;
/// Sound type field: stereo.
pub const SOUND_TYPE_STEREO: u8 = 1;

/// A reassembled message as carried by chunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    /// Chunk stream the message travels on.
    pub chunk_stream_id: u32,
    /// Timestamp in milliseconds.
    pub timestamp: u32,
    /// Message type ID.
    pub type_id: u8,
    /// Message stream ID.
    pub message_stream_id: u32,
    /// Message body.
    pub body: Bytes,
}

/// User control events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserControl {
    /// Stream became functional.
    StreamBegin {
        /// Stream ID.
        stream_id: u32,
    },
    /// Playback ended.
    StreamEof {
        /// Stream ID.
        stream_id: u32,
    },
    /// No more data on the stream.
    StreamDry {
        /// Stream ID.
        stream_id: u32,
    },
    /// Client buffer size in milliseconds.
    SetBufferLength {
        /// Stream ID.
        stream_id: u32,
        /// Buffer length in milliseconds.
        buffer_length: u32,
    },
    /// Stream is a recorded one.
    StreamIsRecorded {
        /// Stream ID.
        stream_id: u32,
    },
    /// Liveness probe.
    PingRequest {
        /// Sender timestamp.
        server_time: u32,
    },
    /// Answer to a ping.
    PingResponse {
        /// Echoed timestamp.
        server_time: u32,
    },
}

/// AMF0 command (`connect`, `play`, `_result`, `onStatus`, ...).
#[derive(Debug, Clone, PartialEq)]
pub struct CommandMessage {
    /// Chunk stream ID.
    pub chunk_stream_id: u32,
    /// Message stream ID.
    pub message_stream_id: u32,
    /// Command name.
    pub name: String,
    /// Transaction ID.
    pub command_id: u32,
    /// Arguments following the transaction ID.
    pub arguments: Vec<AmfValue>,
}

/// AMF0 data message (`@setDataFrame`, `onMetaData`, ...).
#[derive(Debug, Clone, PartialEq)]
pub struct DataMessage {
    /// Chunk stream ID.
    pub chunk_stream_id: u32,
    /// Message stream ID.
    pub message_stream_id: u32,
    /// Values.
    pub payload: Vec<AmfValue>,
}

/// Audio message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioMessage {
    /// Chunk stream ID.
    pub chunk_stream_id: u32,
    /// Message stream ID.
    pub message_stream_id: u32,
    /// Decoding timestamp.
    pub dts: Duration,
    /// FLV sound format.
    pub codec: u8,
    /// Sound rate field.
    pub rate: u8,
    /// Sound size field.
    pub depth: u8,
    /// Sound type field.
    pub channels: u8,
    /// AAC packet type, meaningful for AAC only.
    pub aac_type: u8,
    /// Codec payload.
    pub payload: Bytes,
}

impl AudioMessage {
    /// Whether this carries an AudioSpecificConfig.
    pub fn is_aac_config(&self) -> bool {
        self.codec == CODEC_AAC && self.aac_type == AAC_SEQUENCE_HEADER
    }
}

/// Video message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoMessage {
    /// Chunk stream ID.
    pub chunk_stream_id: u32,
    /// Message stream ID.
    pub message_stream_id: u32,
    /// Decoding timestamp.
    pub dts: Duration,
    /// Composition time offset.
    pub pts_delta: Duration,
    /// Frame type 1.
    pub is_key_frame: bool,
    /// FLV codec ID.
    pub codec: u8,
    /// AVC packet type.
    pub avc_type: u8,
    /// Codec payload.
    pub payload: Bytes,
}

impl VideoMessage {
    /// Whether this carries an AVCDecoderConfigurationRecord.
    pub fn is_avc_config(&self) -> bool {
        self.codec == CODEC_H264 && self.avc_type == AVC_SEQUENCE_HEADER
    }
}

/// A typed RTMP message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Maximum chunk size of subsequent chunks from the sender.
    SetChunkSize(u32),
    /// Discard a partially received message.
    Abort {
        /// Chunk stream to discard.
        chunk_stream_id: u32,
    },
    /// Bytes received so far.
    Acknowledge(u32),
    /// Acknowledgement window.
    SetWindowAckSize(u32),
    /// Output bandwidth limit of the peer.
    SetPeerBandwidth {
        /// Window size.
        value: u32,
        /// 0 hard, 1 soft, 2 dynamic.
        limit_type: u8,
    },
    /// User control event.
    UserControl(UserControl),
    /// AMF0 command.
    Command(CommandMessage),
    /// AMF0 data.
    Data(DataMessage),
    /// Audio.
    Audio(AudioMessage),
    /// Video.
    Video(VideoMessage),
    /// Anything else, kept verbatim.
    Unknown(RawMessage),
}

fn need(body: &Bytes, n: usize, what: &str) -> Result<()> {
    if body.len() < n {
        return Err(RtmpError::Protocol(format!(
            "invalid {} message: {} bytes",
            what,
            body.len()
        )));
    }
    Ok(())
}

impl Message {
    /// Parse a reassembled message.
    pub fn decode(raw: RawMessage) -> Result<Self> {
        let mut body = raw.body.clone();

        let msg = match raw.type_id {
            MSG_SET_CHUNK_SIZE => {
                need(&body, 4, "set chunk size")?;
                Message::SetChunkSize(body.get_u32() & 0x7FFF_FFFF)
            }
            MSG_ABORT => {
                need(&body, 4, "abort")?;
                Message::Abort {
                    chunk_stream_id: body.get_u32(),
                }
            }
            MSG_ACKNOWLEDGE => {
                need(&body, 4, "acknowledge")?;
                Message::Acknowledge(body.get_u32())
            }
            MSG_WINDOW_ACK_SIZE => {
                need(&body, 4, "window acknowledgement size")?;
                Message::SetWindowAckSize(body.get_u32())
            }
            MSG_SET_PEER_BANDWIDTH => {
                need(&body, 5, "set peer bandwidth")?;
                Message::SetPeerBandwidth {
                    value: body.get_u32(),
                    limit_type: body.get_u8(),
                }
            }
            MSG_USER_CONTROL => Message::UserControl(Self::decode_user_control(body)?),
            MSG_COMMAND_AMF0 | MSG_COMMAND_AMF3 => {
                if raw.type_id == MSG_COMMAND_AMF3 {
                    need(&body, 1, "AMF3 command")?;
                    body.advance(1);
                }
                let mut values = AmfValue::decode_all(&mut body)?.into_iter();

                let name = match values.next() {
                    Some(AmfValue::String(s)) => s,
                    _ => return Err(RtmpError::Protocol("invalid command name".into())),
                };
                let command_id = match values.next() {
                    Some(AmfValue::Number(n)) => n as u32,
                    _ => return Err(RtmpError::Protocol("invalid command ID".into())),
                };

                Message::Command(CommandMessage {
                    chunk_stream_id: raw.chunk_stream_id,
                    message_stream_id: raw.message_stream_id,
                    name,
                    command_id,
                    arguments: values.collect(),
                })
            }
            MSG_DATA_AMF0 | MSG_DATA_AMF3 => {
                if raw.type_id == MSG_DATA_AMF3 {
                    need(&body, 1, "AMF3 data")?;
                    body.advance(1);
                }
                Message::Data(DataMessage {
                    chunk_stream_id: raw.chunk_stream_id,
                    message_stream_id: raw.message_stream_id,
                    payload: AmfValue::decode_all(&mut body)?,
                })
            }
            MSG_AUDIO => {
                need(&body, 1, "audio")?;
                let header = body.get_u8();
                let codec = header >> 4;
                let aac_type = if codec == CODEC_AAC {
                    need(&body, 1, "audio")?;
                    body.get_u8()
                } else {
                    0
                };
                Message::Audio(AudioMessage {
                    chunk_stream_id: raw.chunk_stream_id,
                    message_stream_id: raw.message_stream_id,
                    dts: Duration::from_millis(raw.timestamp as u64),
                    codec,
                    rate: (header >> 2) & 0x03,
                    depth: (header >> 1) & 0x01,
                    channels: header & 0x01,
                    aac_type,
                    payload: body,
                })
            }
            MSG_VIDEO => {
                need(&body, 1, "video")?;
                let header = body.get_u8();
                let codec = header & 0x0F;
                let (avc_type, cts) = if codec == CODEC_H264 {
                    need(&body, 4, "video")?;
                    let avc_type = body.get_u8();
                    // 24-bit signed composition time
                    let cts = ((body.get_uint(3) as i32) << 8) >> 8;
                    (avc_type, cts)
                } else {
                    (0, 0)
                };
                Message::Video(VideoMessage {
                    chunk_stream_id: raw.chunk_stream_id,
                    message_stream_id: raw.message_stream_id,
                    dts: Duration::from_millis(raw.timestamp as u64),
                    pts_delta: Duration::from_millis(cts.max(0) as u64),
                    is_key_frame: header >> 4 == 1,
                    codec,
                    avc_type,
                    payload: body,
                })
            }
            _ => Message::Unknown(raw),
        };

        Ok(msg)
    }

    fn decode_user_control(mut body: Bytes) -> Result<UserControl> {
        need(&body, 6, "user control")?;
        let event = body.get_u16();
        let value = body.get_u32();

        let uc = match event {
            EVENT_STREAM_BEGIN => UserControl::StreamBegin { stream_id: value },
            EVENT_STREAM_EOF => UserControl::StreamEof { stream_id: value },
            EVENT_STREAM_DRY => UserControl::StreamDry { stream_id: value },
            EVENT_SET_BUFFER_LENGTH => {
                need(&body, 4, "set buffer length")?;
                UserControl::SetBufferLength {
                    stream_id: value,
                    buffer_length: body.get_u32(),
                }
            }
            EVENT_STREAM_IS_RECORDED => UserControl::StreamIsRecorded { stream_id: value },
            EVENT_PING_REQUEST => UserControl::PingRequest { server_time: value },
            EVENT_PING_RESPONSE => UserControl::PingResponse { server_time: value },
            _ => {
                return Err(RtmpError::Protocol(format!(
                    "unsupported user control event {}",
                    event
                )))
            }
        };
        Ok(uc)
    }

    /// Serialize into a raw message.
    pub fn encode(&self) -> RawMessage {
        let mut body = BytesMut::new();

        let (chunk_stream_id, timestamp, type_id, message_stream_id) = match self {
            Message::SetChunkSize(v) => {
                body.put_u32(*v & 0x7FFF_FFFF);
                (CONTROL_CHUNK_STREAM_ID, 0, MSG_SET_CHUNK_SIZE, 0)
            }
            Message::Abort { chunk_stream_id } => {
                body.put_u32(*chunk_stream_id);
                (CONTROL_CHUNK_STREAM_ID, 0, MSG_ABORT, 0)
            }
            Message::Acknowledge(v) => {
                body.put_u32(*v);
                (CONTROL_CHUNK_STREAM_ID, 0, MSG_ACKNOWLEDGE, 0)
            }
            Message::SetWindowAckSize(v) => {
                body.put_u32(*v);
                (CONTROL_CHUNK_STREAM_ID, 0, MSG_WINDOW_ACK_SIZE, 0)
            }
            Message::SetPeerBandwidth { value, limit_type } => {
                body.put_u32(*value);
                body.put_u8(*limit_type);
                (CONTROL_CHUNK_STREAM_ID, 0, MSG_SET_PEER_BANDWIDTH, 0)
            }
            Message::UserControl(uc) => {
                let (event, value) = match *uc {
                    UserControl::StreamBegin { stream_id } => (EVENT_STREAM_BEGIN, stream_id),
                    UserControl::StreamEof { stream_id } => (EVENT_STREAM_EOF, stream_id),
                    UserControl::StreamDry { stream_id } => (EVENT_STREAM_DRY, stream_id),
                    UserControl::SetBufferLength { stream_id, .. } => {
                        (EVENT_SET_BUFFER_LENGTH, stream_id)
                    }
                    UserControl::StreamIsRecorded { stream_id } => {
                        (EVENT_STREAM_IS_RECORDED, stream_id)
                    }
                    UserControl::PingRequest { server_time } => (EVENT_PING_REQUEST, server_time),
                    UserControl::PingResponse { server_time } => {
                        (EVENT_PING_RESPONSE, server_time)
                    }
                };
                body.put_u16(event);
                body.put_u32(value);
                if let UserControl::SetBufferLength { buffer_length, .. } = uc {
                    body.put_u32(*buffer_length);
                }
                (CONTROL_CHUNK_STREAM_ID, 0, MSG_USER_CONTROL, 0)
            }
            Message::Command(cmd) => {
                AmfValue::String(cmd.name.clone()).encode(&mut body);
                AmfValue::Number(cmd.command_id as f64).encode(&mut body);
                AmfValue::encode_all(&cmd.arguments, &mut body);
                (cmd.chunk_stream_id, 0, MSG_COMMAND_AMF0, cmd.message_stream_id)
            }
            Message::Data(data) => {
                AmfValue::encode_all(&data.payload, &mut body);
                (data.chunk_stream_id, 0, MSG_DATA_AMF0, data.message_stream_id)
            }
            Message::Audio(audio) => {
                body.put_u8(
                    (audio.codec << 4)
                        | ((audio.rate & 0x03) << 2)
                        | ((audio.depth & 0x01) << 1)
                        | (audio.channels & 0x01),
                );
                if audio.codec == CODEC_AAC {
                    body.put_u8(audio.aac_type);
                }
                body.put_slice(&audio.payload);
                (
                    audio.chunk_stream_id,
                    millis(audio.dts),
                    MSG_AUDIO,
                    audio.message_stream_id,
                )
            }
            Message::Video(video) => {
                let frame_type: u8 = if video.is_key_frame { 1 } else { 2 };
                body.put_u8((frame_type << 4) | (video.codec & 0x0F));
                if video.codec == CODEC_H264 {
                    body.put_u8(video.avc_type);
                    body.put_uint(millis(video.pts_delta) as u64 & 0xFF_FFFF, 3);
                }
                body.put_slice(&video.payload);
                (
                    video.chunk_stream_id,
                    millis(video.dts),
                    MSG_VIDEO,
                    video.message_stream_id,
                )
            }
            Message::Unknown(raw) => return raw.clone(),
        };

        RawMessage {
            chunk_stream_id,
            timestamp,
            type_id,
            message_stream_id,
            body: body.freeze(),
        }
    }
}

fn millis(d: Duration) -> u32 {
    d.as_millis() as u32
}
