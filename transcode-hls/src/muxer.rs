//! HLS muxer.

use crate::config::{MuxerConfig, MuxerVariant};
use crate::error::{HlsError, Result};
use crate::playlist::{
    parse_numbered, PrimaryPlaylist, INIT_SEGMENT, MEDIA_PLAYLIST, PLAYLIST_CONTENT_TYPE,
    PRIMARY_PLAYLIST,
};
use crate::segmenter::{Availability, Segmenter};
use crate::writer::{Sample, SampleData, SegmentWriter};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use transcode_rtp::{Mpeg4Audio, H264};

const NALU_TYPE_IDR: u8 = 5;
const NALU_TYPE_SPS: u8 = 7;
const NALU_TYPE_PPS: u8 = 8;
const NALU_TYPE_AUD: u8 = 9;

/// Response of [`Muxer::file`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MuxerFileResponse {
    /// HTTP status code.
    pub status: u16,
    /// HTTP headers.
    pub headers: HashMap<String, String>,
    /// Body, present on success.
    pub body: Option<Bytes>,
}

impl MuxerFileResponse {
    fn ok(content_type: &str, body: Bytes) -> Self {
        let mut headers = HashMap::new();
        headers.insert("Content-Type".to_string(), content_type.to_string());
        Self {
            status: 200,
            headers,
            body: Some(body),
        }
    }

    fn status(status: u16) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: None,
        }
    }

    fn not_found() -> Self {
        Self::status(404)
    }

    fn bad_request() -> Self {
        Self::status(400)
    }
}

/// Segments H.264 and AAC access units and serves the resulting playlists,
/// segments and parts.
///
/// Writers and readers may share the muxer across threads.
pub struct Muxer {
    variant: MuxerVariant,
    video: Option<Arc<H264>>,
    audio: Option<Arc<Mpeg4Audio>>,
    primary: PrimaryPlaylist,
    segmenter: Mutex<Segmenter>,
}

impl std::fmt::Debug for Muxer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Muxer")
            .field("variant", &self.variant)
            .finish_non_exhaustive()
    }
}

impl Muxer {
    /// Create a muxer for the given tracks.
    ///
    /// Container bytes are produced by `writer`.
    pub fn new(
        config: MuxerConfig,
        video: Option<Arc<H264>>,
        audio: Option<Arc<Mpeg4Audio>>,
        writer: Box<dyn SegmentWriter>,
    ) -> Result<Self> {
        config.validate()?;
        if video.is_none() && audio.is_none() {
            return Err(HlsError::NoTracks);
        }

        tracing::info!(
            variant = ?config.variant,
            segment_count = config.segment_count,
            video = video.is_some(),
            audio = audio.is_some(),
            "HLS muxer created"
        );

        let variant = config.variant;
        Ok(Self {
            variant,
            video: video.clone(),
            audio: audio.clone(),
            primary: PrimaryPlaylist::new(variant, video.clone(), audio.clone()),
            segmenter: Mutex::new(Segmenter::new(config, video, audio, writer)),
        })
    }

    /// Variant produced by the muxer.
    pub fn variant(&self) -> MuxerVariant {
        self.variant
    }

    /// Write the NAL units of an H.264 access unit.
    ///
    /// In-band SPS and PPS update the video track. Access unit delimiters are dropped.
    pub fn write_h264(&self, ntp: DateTime<Utc>, pts: Duration, nalus: &[Bytes]) -> Result<()> {
        let video = self.video.as_ref().ok_or(HlsError::MissingTrack("H264"))?;

        let mut idr = false;
        let mut kept = Vec::with_capacity(nalus.len());
        for nalu in nalus {
            let Some(&header) = nalu.first() else {
                continue;
            };
            match header & 0x1F {
                NALU_TYPE_SPS => {
                    video.update_sps(nalu);
                }
                NALU_TYPE_PPS => {
                    video.update_pps(nalu);
                }
                NALU_TYPE_AUD => continue,
                NALU_TYPE_IDR => idr = true,
                _ => {}
            }
            kept.push(nalu.clone());
        }

        if kept.is_empty() {
            return Ok(());
        }

        self.segmenter.lock().write_sample(Sample {
            ntp,
            pts,
            data: SampleData::H264 { nalus: kept, idr },
        })
    }

    /// Write an AAC access unit.
    pub fn write_aac(&self, ntp: DateTime<Utc>, pts: Duration, au: Bytes) -> Result<()> {
        if self.audio.is_none() {
            return Err(HlsError::MissingTrack("AAC"));
        }

        self.segmenter.lock().write_sample(Sample {
            ntp,
            pts,
            data: SampleData::Aac(au),
        })
    }

    /// Serve a file.
    ///
    /// `msn`, `part` and `skip` are the `_HLS_msn`, `_HLS_part` and `_HLS_skip`
    /// query parameters of a media playlist request. A request for a segment or
    /// part not produced yet is answered with 404 without waiting.
    pub fn file(
        &self,
        name: &str,
        msn: Option<&str>,
        part: Option<&str>,
        skip: Option<&str>,
    ) -> MuxerFileResponse {
        if name == PRIMARY_PLAYLIST {
            return MuxerFileResponse::ok(
                PLAYLIST_CONTENT_TYPE,
                Bytes::from(self.primary.render()),
            );
        }

        let segmenter = self.segmenter.lock();

        if name == MEDIA_PLAYLIST {
            return self.media_playlist(&segmenter, msn, part, skip);
        }

        if name == INIT_SEGMENT && self.variant.is_fmp4() {
            return match segmenter.init() {
                Some(init) => MuxerFileResponse::ok("video/mp4", init),
                None => MuxerFileResponse::not_found(),
            };
        }

        let extension = self.variant.segment_extension();
        if let Some(sequence) = parse_numbered(name, "seg", extension) {
            return match segmenter.segment(sequence) {
                Some(body) => MuxerFileResponse::ok(self.variant.segment_content_type(), body),
                None => MuxerFileResponse::not_found(),
            };
        }

        if self.variant.is_low_latency() {
            if let Some(id) = parse_numbered(name, "part", "mp4") {
                return match segmenter.part(id) {
                    Some(body) => MuxerFileResponse::ok("video/mp4", body),
                    None => MuxerFileResponse::not_found(),
                };
            }
        }

        MuxerFileResponse::not_found()
    }

    fn media_playlist(
        &self,
        segmenter: &Segmenter,
        msn: Option<&str>,
        part: Option<&str>,
        skip: Option<&str>,
    ) -> MuxerFileResponse {
        let mut skip_requested = false;

        if self.variant.is_low_latency() {
            let msn = match msn.map(str::parse::<u64>).transpose() {
                Ok(msn) => msn,
                Err(_) => return MuxerFileResponse::bad_request(),
            };
            let part = match part.map(str::parse::<u64>).transpose() {
                Ok(part) => part,
                Err(_) => return MuxerFileResponse::bad_request(),
            };

            match (msn, part) {
                (None, Some(_)) => return MuxerFileResponse::bad_request(),
                (Some(msn), part) => match segmenter.availability(msn, part) {
                    Availability::Ready => {}
                    Availability::Pending => return MuxerFileResponse::not_found(),
                    Availability::Invalid => return MuxerFileResponse::bad_request(),
                },
                (None, None) => {}
            }

            skip_requested = matches!(skip, Some(s) if s.eq_ignore_ascii_case("yes") || s == "v2");
        }

        match segmenter.media_playlist(skip_requested) {
            Some(playlist) => {
                MuxerFileResponse::ok(PLAYLIST_CONTENT_TYPE, Bytes::from(playlist.render()))
            }
            None => MuxerFileResponse::not_found(),
        }
    }
}
