//! RTMP connection engine.
//!
//! Drives a session from the handshake to the first media message:
//!
//! 1. **Initialization** - [`Conn::initialize_client`] connects to a server
//!    and plays or publishes; [`Conn::initialize_server`] accepts a client
//!    and resolves what it wants to play or publish.
//! 2. **Track discovery** - [`Conn::read_tracks`] reads the tracks of a
//!    published stream, from `onMetaData` when present, otherwise from the
//!    first second of traffic. [`Conn::write_tracks`] announces tracks to a
//!    player.
//!
//! After that, media flows through [`Conn::read_message`] and
//! [`Conn::write_message`].

use crate::amf::{AmfMap, AmfValue};
use crate::bytecounter::{ByteCounter, ByteCounts};
use crate::config::ConnConfig;
use crate::error::{Result, RtmpError};
use crate::h264conf::H264Conf;
use crate::handshake;
use crate::message::{
    AudioMessage, CommandMessage, DataMessage, Message, UserControl, VideoMessage,
    AAC_SEQUENCE_HEADER, AUDIO_CHUNK_STREAM_ID, AVC_NALU, AVC_SEQUENCE_HEADER, CODEC_AAC,
    CODEC_H264, COMMAND_CHUNK_STREAM_ID, DATA_CHUNK_STREAM_ID, MEDIA_MESSAGE_STREAM_ID,
    SOUND_RATE_44KHZ, SOUND_SIZE_16BIT, SOUND_TYPE_STEREO, STATUS_CHUNK_STREAM_ID,
    VIDEO_CHUNK_STREAM_ID,
};
use crate::readwriter::{MessageChannel, MessageReadWriter};
use crate::target::{create_url, split_path, tc_url, SessionRole, SessionTarget};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use transcode_rtp::avcc;
use transcode_rtp::format::{VideoFormat, DEFAULT_PAYLOAD_TYPE, H264, H265};
use transcode_rtp::h265::NaluType;
use transcode_rtp::Mpeg4Audio;
use url::Url;

/// Stream ID returned by `createStream`.
pub const STREAM_ID: u32 = 1;

/// How much traffic is analyzed when tracks are not declared.
pub const ANALYSIS_WINDOW: Duration = Duration::from_secs(1);

/// Byte stream a connection runs on.
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Transport for T {}

enum Channel {
    /// Before the handshake.
    Transport(ByteCounter<Box<dyn Transport>>),
    /// After the handshake.
    Messages(Box<dyn MessageChannel>),
    /// Handshake in progress or failed.
    Closed,
}

/// Outcome of reading tracks from `onMetaData`.
#[derive(Debug)]
enum MetadataOutcome {
    /// Every declared track was found.
    Found(Option<VideoFormat>, Option<Arc<Mpeg4Audio>>),
    /// Metadata declares neither video nor audio.
    Empty,
}

fn command(
    chunk_stream_id: u32,
    message_stream_id: u32,
    name: &str,
    command_id: u32,
    arguments: Vec<AmfValue>,
) -> Message {
    Message::Command(CommandMessage {
        chunk_stream_id,
        message_stream_id,
        name: name.to_string(),
        command_id,
        arguments,
    })
}

fn status(code: &str, description: &str) -> AmfValue {
    AmfMap::new()
        .with("level", "status")
        .with("code", code)
        .with("description", description)
        .into()
}

/// Whether argument 1 is a map with level "status".
fn result_is_ok1(res: &CommandMessage) -> bool {
    res.arguments
        .get(1)
        .and_then(AmfValue::as_map)
        .and_then(|m| m.get_str("level"))
        == Some("status")
}

/// Whether argument 1 is the number 1.
fn result_is_ok2(res: &CommandMessage) -> bool {
    res.arguments.get(1).and_then(AmfValue::as_number) == Some(1.0)
}

fn invalid_connect(cmd: &CommandMessage) -> RtmpError {
    RtmpError::Protocol(format!("invalid connect command: {:?}", cmd.arguments))
}

fn stream_argument(cmd: &CommandMessage) -> Result<String> {
    cmd.arguments
        .get(1)
        .and_then(AmfValue::as_str)
        .map(str::to_string)
        .ok_or_else(|| RtmpError::Protocol(format!("invalid {} command arguments", cmd.name)))
}

fn codec_declared(
    md: &AmfMap,
    key: &str,
    kind: &'static str,
    id: u8,
    fourcc: &str,
) -> Result<bool> {
    match md.get(key) {
        None => Ok(false),
        Some(AmfValue::Number(n)) if *n == 0.0 => Ok(false),
        Some(AmfValue::Number(n)) if *n == id as f64 => Ok(true),
        Some(AmfValue::String(s)) if s == fourcc => Ok(true),
        Some(v) => Err(RtmpError::UnsupportedCodec {
            kind,
            codec: v.to_string(),
        }),
    }
}

fn track_from_h264_config(data: &[u8]) -> Result<VideoFormat> {
    let conf = H264Conf::unmarshal(data)?;
    let track = H264::with_parameter_sets(DEFAULT_PAYLOAD_TYPE, Some(conf.sps), Some(conf.pps))
        .with_packetization_mode(1);
    Ok(VideoFormat::H264(Arc::new(track)))
}

fn track_from_aac_config(data: &[u8]) -> Result<Arc<Mpeg4Audio>> {
    Ok(Arc::new(Mpeg4Audio::from_decoder_config(
        DEFAULT_PAYLOAD_TYPE,
        data,
    )?))
}

/// Look for H.265 parameter sets in an AVCC key frame.
fn track_from_h265_key_frame(payload: &[u8]) -> Result<Option<VideoFormat>> {
    let mut vps = None;
    let mut sps = None;
    let mut pps = None;

    for nalu in avcc::unmarshal(payload)? {
        match NaluType::of(&nalu) {
            Some(NaluType::VPS) => vps = Some(nalu),
            Some(NaluType::SPS) => sps = Some(nalu),
            Some(NaluType::PPS) => pps = Some(nalu),
            _ => {}
        }
    }

    Ok(match (vps, sps, pps) {
        (Some(vps), Some(sps), Some(pps)) => Some(VideoFormat::H265(Arc::new(
            H265::with_parameter_sets(DEFAULT_PAYLOAD_TYPE, Some(vps), Some(sps), Some(pps)),
        ))),
        _ => None,
    })
}

/// An RTMP connection.
pub struct Conn {
    channel: Channel,
    counts: ByteCounts,
    config: ConnConfig,
}

impl std::fmt::Debug for Conn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Conn")
            .field("bytes_received", &self.bytes_received())
            .field("bytes_sent", &self.bytes_sent())
            .field("config", &self.config)
            .finish()
    }
}

impl Conn {
    /// Create a connection over a transport, with default settings.
    pub fn new<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let counter = ByteCounter::new(Box::new(stream) as Box<dyn Transport>);
        Self {
            counts: counter.counts(),
            channel: Channel::Transport(counter),
            config: ConnConfig::default(),
        }
    }

    /// Create a connection over a transport.
    pub fn with_config<S>(stream: S, config: ConnConfig) -> Result<Self>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        config.validate()?;
        let mut conn = Self::new(stream);
        conn.config = config;
        Ok(conn)
    }

    /// Create a connection over an established message channel.
    ///
    /// Initialization skips the handshake. Byte counters stay at zero.
    pub fn from_channel(channel: Box<dyn MessageChannel>, config: ConnConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            channel: Channel::Messages(channel),
            counts: ByteCounts::default(),
            config,
        })
    }

    /// Bytes received.
    pub fn bytes_received(&self) -> u64 {
        self.counts.received()
    }

    /// Bytes sent.
    pub fn bytes_sent(&self) -> u64 {
        self.counts.sent()
    }

    /// Connection settings.
    pub fn config(&self) -> &ConnConfig {
        &self.config
    }

    async fn handshake(&mut self, client: bool) -> Result<()> {
        let mut counter = match std::mem::replace(&mut self.channel, Channel::Closed) {
            Channel::Transport(counter) => counter,
            Channel::Messages(channel) => {
                self.channel = Channel::Messages(channel);
                return Ok(());
            }
            Channel::Closed => return Err(RtmpError::ConnectionClosed),
        };

        if client {
            handshake::do_client(&mut counter).await?;
        } else {
            handshake::do_server(&mut counter).await?;
        }

        self.channel = Channel::Messages(Box::new(MessageReadWriter::new(counter)));
        Ok(())
    }

    fn channel(&mut self) -> Result<&mut Box<dyn MessageChannel>> {
        match &mut self.channel {
            Channel::Messages(channel) => Ok(channel),
            Channel::Transport(_) => Err(RtmpError::Protocol(
                "connection is not initialized".into(),
            )),
            Channel::Closed => Err(RtmpError::ConnectionClosed),
        }
    }

    /// Read a message.
    pub async fn read_message(&mut self) -> Result<Message> {
        let timeout = self.config.read_timeout;
        let channel = self.channel()?;
        match timeout {
            Some(t) => tokio::time::timeout(t, channel.read())
                .await
                .map_err(|_| RtmpError::Timeout("message read".into()))?,
            None => channel.read().await,
        }
    }

    /// Write a message.
    pub async fn write_message(&mut self, msg: &Message) -> Result<()> {
        let timeout = self.config.write_timeout;
        let channel = self.channel()?;
        match timeout {
            Some(t) => tokio::time::timeout(t, channel.write(msg))
                .await
                .map_err(|_| RtmpError::Timeout("message write".into()))?,
            None => channel.write(msg).await,
        }
    }

    async fn read_command(&mut self) -> Result<CommandMessage> {
        loop {
            match self.read_message().await? {
                Message::Command(cmd) => return Ok(cmd),
                other => tracing::debug!("skipping message while waiting for command: {:?}", other),
            }
        }
    }

    async fn read_command_result(
        &mut self,
        command_id: u32,
        name: &str,
        is_valid: fn(&CommandMessage) -> bool,
    ) -> Result<()> {
        loop {
            if let Message::Command(cmd) = self.read_message().await? {
                if cmd.command_id == command_id && cmd.name == name {
                    if !is_valid(&cmd) {
                        return Err(RtmpError::Refused);
                    }
                    return Ok(());
                }
                tracing::debug!(name = %cmd.name, id = cmd.command_id, "skipping command");
            }
        }
    }

    async fn write_negotiation(&mut self) -> Result<()> {
        let window = self.config.window_ack_size;
        let bandwidth = self.config.peer_bandwidth;
        let chunk_size = self.config.chunk_size;

        self.write_message(&Message::SetWindowAckSize(window)).await?;
        self.write_message(&Message::SetPeerBandwidth {
            value: bandwidth,
            limit_type: 2,
        })
        .await?;
        self.write_message(&Message::SetChunkSize(chunk_size)).await
    }

    /// Connect to a server and start playing or publishing `u`.
    pub async fn initialize_client(&mut self, u: &Url, publishing: bool) -> Result<()> {
        let (app, stream) = split_path(u);

        self.handshake(true).await?;
        self.write_negotiation().await?;

        let connect = AmfMap::new()
            .with("app", app.as_str())
            .with("flashVer", self.config.flash_version.as_str())
            .with("tcUrl", tc_url(u))
            .with("fpad", false)
            .with("capabilities", 15.0)
            .with("audioCodecs", 4071.0)
            .with("videoCodecs", 252.0)
            .with("videoFunction", 1.0);
        self.write_message(&command(
            COMMAND_CHUNK_STREAM_ID,
            0,
            "connect",
            1,
            vec![connect.into()],
        ))
        .await?;
        self.read_command_result(1, "_result", result_is_ok1).await?;

        if !publishing {
            self.write_message(&command(
                COMMAND_CHUNK_STREAM_ID,
                0,
                "createStream",
                2,
                vec![AmfValue::Null],
            ))
            .await?;
            self.read_command_result(2, "_result", result_is_ok2).await?;

            let buffer_length = self.config.buffer_length;
            self.write_message(&Message::UserControl(UserControl::SetBufferLength {
                stream_id: 0,
                buffer_length,
            }))
            .await?;

            self.write_message(&command(
                DATA_CHUNK_STREAM_ID,
                MEDIA_MESSAGE_STREAM_ID,
                "play",
                3,
                vec![AmfValue::Null, stream.as_str().into()],
            ))
            .await?;
            self.read_command_result(3, "onStatus", result_is_ok1).await?;

            tracing::info!(app = %app, stream = %stream, "playing");
            return Ok(());
        }

        self.write_message(&command(
            COMMAND_CHUNK_STREAM_ID,
            0,
            "releaseStream",
            2,
            vec![AmfValue::Null, stream.as_str().into()],
        ))
        .await?;
        self.write_message(&command(
            COMMAND_CHUNK_STREAM_ID,
            0,
            "FCPublish",
            3,
            vec![AmfValue::Null, stream.as_str().into()],
        ))
        .await?;
        self.write_message(&command(
            COMMAND_CHUNK_STREAM_ID,
            0,
            "createStream",
            4,
            vec![AmfValue::Null],
        ))
        .await?;
        self.read_command_result(4, "_result", result_is_ok2).await?;

        self.write_message(&command(
            DATA_CHUNK_STREAM_ID,
            MEDIA_MESSAGE_STREAM_ID,
            "publish",
            5,
            vec![AmfValue::Null, stream.as_str().into(), app.as_str().into()],
        ))
        .await?;
        self.read_command_result(5, "onStatus", result_is_ok1).await?;

        tracing::info!(app = %app, stream = %stream, "publishing");
        Ok(())
    }

    /// Accept a client and resolve what it plays or publishes.
    pub async fn initialize_server(&mut self) -> Result<SessionTarget> {
        self.handshake(false).await?;

        let cmd = self.read_command().await?;
        if cmd.name != "connect" {
            return Err(RtmpError::Protocol(format!(
                "unexpected command: {}",
                cmd.name
            )));
        }

        let ma = cmd
            .arguments
            .first()
            .and_then(AmfValue::as_map)
            .ok_or_else(|| invalid_connect(&cmd))?;
        let app = ma
            .get_str("app")
            .ok_or_else(|| invalid_connect(&cmd))?
            .to_string();
        let tc_url = ma
            .get_str("tcUrl")
            .or_else(|| ma.get_str("tcurl"))
            .ok_or_else(|| invalid_connect(&cmd))?
            .to_string();
        let object_encoding = ma.get_number("objectEncoding").unwrap_or(0.0);

        self.write_negotiation().await?;

        let server = AmfMap::new()
            .with("fmsVer", self.config.flash_version.as_str())
            .with("capabilities", 31.0);
        let result = AmfMap::new()
            .with("level", "status")
            .with("code", "NetConnection.Connect.Success")
            .with("description", "Connection succeeded.")
            .with("objectEncoding", object_encoding);
        self.write_message(&command(
            cmd.chunk_stream_id,
            0,
            "_result",
            cmd.command_id,
            vec![server.into(), result.into()],
        ))
        .await?;

        tracing::info!(app = %app, tc_url = %tc_url, "connect accepted");

        loop {
            let cmd = self.read_command().await?;

            match cmd.name.as_str() {
                "createStream" => {
                    self.write_message(&command(
                        cmd.chunk_stream_id,
                        0,
                        "_result",
                        cmd.command_id,
                        vec![AmfValue::Null, AmfValue::Number(STREAM_ID as f64)],
                    ))
                    .await?;
                }

                "play" => {
                    let stream = stream_argument(&cmd)?;
                    let url = create_url(&tc_url, &app, &stream)?;

                    self.write_message(&Message::UserControl(UserControl::StreamIsRecorded {
                        stream_id: STREAM_ID,
                    }))
                    .await?;
                    self.write_message(&Message::UserControl(UserControl::StreamBegin {
                        stream_id: STREAM_ID,
                    }))
                    .await?;

                    for (code, description) in [
                        ("NetStream.Play.Reset", "play reset"),
                        ("NetStream.Play.Start", "play start"),
                        ("NetStream.Data.Start", "data start"),
                        ("NetStream.Play.PublishNotify", "publish notify"),
                    ] {
                        self.write_message(&command(
                            STATUS_CHUNK_STREAM_ID,
                            MEDIA_MESSAGE_STREAM_ID,
                            "onStatus",
                            cmd.command_id,
                            vec![AmfValue::Null, status(code, description)],
                        ))
                        .await?;
                    }

                    tracing::info!(%url, "client is playing");
                    return Ok(SessionTarget {
                        url,
                        role: SessionRole::Playing,
                    });
                }

                "publish" => {
                    let stream = stream_argument(&cmd)?;
                    let url = create_url(&tc_url, &app, &stream)?;

                    self.write_message(&command(
                        STATUS_CHUNK_STREAM_ID,
                        MEDIA_MESSAGE_STREAM_ID,
                        "onStatus",
                        cmd.command_id,
                        vec![
                            AmfValue::Null,
                            status("NetStream.Publish.Start", "publish start"),
                        ],
                    ))
                    .await?;

                    tracing::info!(%url, "client is publishing");
                    return Ok(SessionTarget {
                        url,
                        role: SessionRole::Publishing,
                    });
                }

                other => tracing::debug!(command = other, "ignoring command"),
            }
        }
    }

    /// Read the tracks of a published stream.
    pub async fn read_tracks(&mut self) -> Result<(Option<VideoFormat>, Option<Arc<Mpeg4Audio>>)> {
        let msg = loop {
            let msg = self.read_message().await?;
            let skip = match &msg {
                // play start, data start
                Message::Command(cmd) => cmd.name == "onStatus",
                Message::Data(data) => {
                    data.payload.first().and_then(AmfValue::as_str) == Some("|RtmpSampleAccess")
                }
                _ => false,
            };
            if !skip {
                break msg;
            }
        };

        if let Message::Data(data) = &msg {
            let mut payload = &data.payload[..];
            if payload.first().and_then(AmfValue::as_str) == Some("@setDataFrame") {
                payload = &payload[1..];
            }

            if payload.first().and_then(AmfValue::as_str) == Some("onMetaData") {
                match self.read_tracks_from_metadata(&payload[1..]).await? {
                    MetadataOutcome::Found(video, audio) => {
                        log_tracks(&video, &audio);
                        return Ok((video, audio));
                    }
                    MetadataOutcome::Empty => {
                        tracing::debug!("metadata is empty, analyzing traffic");
                        let msg = self.read_message().await?;
                        return self.read_tracks_from_messages(msg).await;
                    }
                }
            }
        }

        self.read_tracks_from_messages(msg).await
    }

    async fn read_tracks_from_metadata(&mut self, payload: &[AmfValue]) -> Result<MetadataOutcome> {
        let md = match payload {
            [value] => value
                .as_map()
                .ok_or_else(|| RtmpError::Protocol("invalid metadata".into()))?,
            _ => return Err(RtmpError::Protocol("invalid metadata".into())),
        };

        let has_video = codec_declared(md, "videocodecid", "video", CODEC_H264, "avc1")?;
        let has_audio = codec_declared(md, "audiocodecid", "audio", CODEC_AAC, "mp4a")?;
        if !has_video && !has_audio {
            return Ok(MetadataOutcome::Empty);
        }

        let mut video = None;
        let mut audio = None;

        loop {
            match self.read_message().await? {
                Message::Video(msg) => {
                    if !has_video {
                        return Err(RtmpError::Protocol("unexpected video packet".into()));
                    }
                    if video.is_none() {
                        video = video_track_from_message(&msg)?;
                    }
                }
                Message::Audio(msg) => {
                    if !has_audio {
                        return Err(RtmpError::Protocol("unexpected audio packet".into()));
                    }
                    if audio.is_none() && msg.is_aac_config() {
                        audio = Some(track_from_aac_config(&msg.payload)?);
                    }
                }
                _ => {}
            }

            if (!has_video || video.is_some()) && (!has_audio || audio.is_some()) {
                return Ok(MetadataOutcome::Found(video, audio));
            }
        }
    }

    async fn read_tracks_from_messages(
        &mut self,
        mut msg: Message,
    ) -> Result<(Option<VideoFormat>, Option<Arc<Mpeg4Audio>>)> {
        let mut video_start = None;
        let mut audio_start = None;
        let mut video = None;
        let mut audio = None;

        loop {
            let elapsed = match &msg {
                Message::Video(v) => {
                    let start = *video_start.get_or_insert(v.dts);
                    if video.is_none() && v.is_avc_config() {
                        video = Some(track_from_h264_config(&v.payload)?);
                        if audio.is_some() {
                            break;
                        }
                    }
                    v.dts.saturating_sub(start)
                }
                Message::Audio(a) => {
                    let start = *audio_start.get_or_insert(a.dts);
                    if audio.is_none() && a.is_aac_config() {
                        audio = Some(track_from_aac_config(&a.payload)?);
                        if video.is_some() {
                            break;
                        }
                    }
                    a.dts.saturating_sub(start)
                }
                _ => Duration::ZERO,
            };

            if elapsed >= ANALYSIS_WINDOW {
                break;
            }

            msg = self.read_message().await?;
        }

        if video.is_none() && audio.is_none() {
            return Err(RtmpError::NoTracksFound);
        }

        log_tracks(&video, &audio);
        Ok((video, audio))
    }

    /// Announce tracks to a player: `onMetaData`, then the decoder
    /// configurations that are known.
    pub async fn write_tracks(&mut self, video: Option<&H264>, audio: Option<&Mpeg4Audio>) -> Result<()> {
        let metadata = AmfMap::new()
            .with("videodatarate", 0.0)
            .with(
                "videocodecid",
                if video.is_some() { CODEC_H264 as f64 } else { 0.0 },
            )
            .with("audiodatarate", 0.0)
            .with(
                "audiocodecid",
                if audio.is_some() { CODEC_AAC as f64 } else { 0.0 },
            );

        self.write_message(&Message::Data(DataMessage {
            chunk_stream_id: DATA_CHUNK_STREAM_ID,
            message_stream_id: MEDIA_MESSAGE_STREAM_ID,
            payload: vec!["@setDataFrame".into(), "onMetaData".into(), metadata.into()],
        }))
        .await?;

        if let Some(video) = video {
            // without both parameter sets there is no configuration to send
            if let (Some(sps), Some(pps)) = (video.safe_sps(), video.safe_pps()) {
                let payload = H264Conf { sps, pps }.marshal()?;
                self.write_message(&Message::Video(VideoMessage {
                    chunk_stream_id: VIDEO_CHUNK_STREAM_ID,
                    message_stream_id: MEDIA_MESSAGE_STREAM_ID,
                    dts: Duration::ZERO,
                    pts_delta: Duration::ZERO,
                    is_key_frame: true,
                    codec: CODEC_H264,
                    avc_type: AVC_SEQUENCE_HEADER,
                    payload,
                }))
                .await?;
            }
        }

        if let Some(audio) = audio {
            self.write_message(&Message::Audio(AudioMessage {
                chunk_stream_id: AUDIO_CHUNK_STREAM_ID,
                message_stream_id: MEDIA_MESSAGE_STREAM_ID,
                dts: Duration::ZERO,
                codec: CODEC_AAC,
                rate: SOUND_RATE_44KHZ,
                depth: SOUND_SIZE_16BIT,
                channels: SOUND_TYPE_STEREO,
                aac_type: AAC_SEQUENCE_HEADER,
                payload: audio.config.marshal(),
            }))
            .await?;
        }

        Ok(())
    }
}

fn video_track_from_message(msg: &VideoMessage) -> Result<Option<VideoFormat>> {
    if msg.is_avc_config() {
        return track_from_h264_config(&msg.payload).map(Some);
    }
    if msg.codec == CODEC_H264 && msg.avc_type == AVC_NALU && msg.is_key_frame {
        return track_from_h265_key_frame(&msg.payload);
    }
    Ok(None)
}

fn log_tracks(video: &Option<VideoFormat>, audio: &Option<Arc<Mpeg4Audio>>) {
    tracing::info!(
        video = ?video.as_ref().map(VideoFormat::codec),
        audio_sample_rate = ?audio.as_ref().map(|a| a.clock_rate()),
        "tracks discovered"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn result(args: Vec<AmfValue>) -> CommandMessage {
        CommandMessage {
            chunk_stream_id: 3,
            message_stream_id: 0,
            name: "_result".into(),
            command_id: 1,
            arguments: args,
        }
    }

    #[test]
    fn test_result_predicates() {
        let ok1 = result(vec![AmfValue::Null, status("X", "x")]);
        assert!(result_is_ok1(&ok1));
        assert!(!result_is_ok2(&ok1));

        let error = result(vec![
            AmfValue::Null,
            AmfMap::new().with("level", "error").into(),
        ]);
        assert!(!result_is_ok1(&error));

        let ok2 = result(vec![AmfValue::Null, AmfValue::Number(1.0)]);
        assert!(result_is_ok2(&ok2));
        assert!(!result_is_ok1(&ok2));

        assert!(!result_is_ok2(&result(vec![AmfValue::Null, AmfValue::Number(2.0)])));
        assert!(!result_is_ok1(&result(vec![])));
    }

    #[test]
    fn test_codec_declared() {
        let md = AmfMap::new()
            .with("videocodecid", 7.0)
            .with("audiocodecid", "mp4a");
        assert!(codec_declared(&md, "videocodecid", "video", CODEC_H264, "avc1").unwrap());
        assert!(codec_declared(&md, "audiocodecid", "audio", CODEC_AAC, "mp4a").unwrap());

        let md = AmfMap::new().with("videocodecid", 0.0);
        assert!(!codec_declared(&md, "videocodecid", "video", CODEC_H264, "avc1").unwrap());
        assert!(!codec_declared(&md, "audiocodecid", "audio", CODEC_AAC, "mp4a").unwrap());

        let md = AmfMap::new().with("videocodecid", 12.0);
        let err = codec_declared(&md, "videocodecid", "video", CODEC_H264, "avc1").unwrap_err();
        assert!(matches!(err, RtmpError::UnsupportedCodec { kind: "video", .. }));
    }

    #[test]
    fn test_h265_sniffing() {
        let vps = Bytes::from_static(&[0x40, 0x01, 0x0c]);
        let sps = Bytes::from_static(&[0x42, 0x01, 0x01]);
        let pps = Bytes::from_static(&[0x44, 0x01, 0xc1]);
        let idr = Bytes::from_static(&[0x26, 0x01, 0xaf]);

        let payload = avcc::marshal(&[vps.clone(), sps.clone(), pps.clone(), idr.clone()]);
        let track = track_from_h265_key_frame(&payload).unwrap().unwrap();
        let h265 = track.as_h265().unwrap();
        assert_eq!(h265.safe_vps(), Some(vps));
        assert_eq!(h265.safe_sps(), Some(sps.clone()));
        assert_eq!(h265.safe_pps(), Some(pps));

        let payload = avcc::marshal(&[sps, idr]);
        assert!(track_from_h265_key_frame(&payload).unwrap().is_none());
    }
}
