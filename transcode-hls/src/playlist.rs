//! M3U8 rendering.

use crate::config::MuxerVariant;
use chrono::{DateTime, SecondsFormat, Utc};
use std::sync::Arc;
use std::time::Duration;
use transcode_rtp::{Mpeg4Audio, H264};

/// MIME type of playlists.
pub const PLAYLIST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";

/// Name of the primary playlist.
pub const PRIMARY_PLAYLIST: &str = "index.m3u8";

/// Name of the media playlist.
pub const MEDIA_PLAYLIST: &str = "stream.m3u8";

/// Name of the fragmented MP4 initialization segment.
pub const INIT_SEGMENT: &str = "init.mp4";

/// File name of a segment.
pub fn segment_name(variant: MuxerVariant, sequence: u64) -> String {
    format!("seg{}.{}", sequence, variant.segment_extension())
}

/// File name of a part.
pub fn part_name(id: u64) -> String {
    format!("part{}.mp4", id)
}

/// Parse a numbered file name such as `seg12.ts`.
pub fn parse_numbered(name: &str, prefix: &str, extension: &str) -> Option<u64> {
    let number = name.strip_prefix(prefix)?.strip_suffix(extension)?.strip_suffix('.')?;
    if number.is_empty() || !number.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    number.parse().ok()
}

/// RFC 6381 codec strings of the tracks.
///
/// The video entry is omitted until an SPS is known.
pub fn codecs(video: Option<&H264>, audio: Option<&Mpeg4Audio>) -> Vec<String> {
    let mut codecs = Vec::new();

    if let Some(sps) = video.and_then(|v| v.safe_sps()) {
        if sps.len() >= 4 {
            codecs.push(format!("avc1.{:02x}{:02x}{:02x}", sps[1], sps[2], sps[3]));
        }
    }

    if let Some(audio) = audio {
        codecs.push(format!("mp4a.40.{}", audio.config.audio_object_type));
    }

    codecs
}

/// Playlist listing the single variant of a muxer.
#[derive(Debug, Clone)]
pub struct PrimaryPlaylist {
    variant: MuxerVariant,
    video: Option<Arc<H264>>,
    audio: Option<Arc<Mpeg4Audio>>,
}

impl PrimaryPlaylist {
    /// Nominal bandwidth announced for the variant.
    pub const BANDWIDTH: u64 = 200_000;

    /// Create a primary playlist.
    pub fn new(
        variant: MuxerVariant,
        video: Option<Arc<H264>>,
        audio: Option<Arc<Mpeg4Audio>>,
    ) -> Self {
        Self { variant, video, audio }
    }

    /// Generate playlist content as M3U8 format.
    pub fn render(&self) -> String {
        let mut lines = vec![
            "#EXTM3U".to_string(),
            format!("#EXT-X-VERSION:{}", self.variant.playlist_version()),
        ];

        if self.variant.is_fmp4() {
            lines.push("#EXT-X-INDEPENDENT-SEGMENTS".to_string());
        }

        let mut attrs = vec![format!("BANDWIDTH={}", Self::BANDWIDTH)];
        let codecs = codecs(self.video.as_deref(), self.audio.as_deref());
        if !codecs.is_empty() {
            attrs.push(format!("CODECS=\"{}\"", codecs.join(",")));
        }

        lines.push(String::new());
        lines.push(format!("#EXT-X-STREAM-INF:{}", attrs.join(",")));
        lines.push(MEDIA_PLAYLIST.to_string());

        finish(lines)
    }
}

/// Partial segment (EXT-X-PART).
#[derive(Debug, Clone, PartialEq)]
pub struct PartialSegment {
    /// Part identifier, unique across the stream.
    pub id: u64,
    /// Duration of the part.
    pub duration: Duration,
    /// Whether the part starts with a random access point.
    pub independent: bool,
}

impl PartialSegment {
    /// Render as EXT-X-PART tag.
    pub fn render(&self) -> String {
        let mut attrs = vec![
            format!("DURATION={:.6}", self.duration.as_secs_f64()),
            format!("URI=\"{}\"", part_name(self.id)),
        ];

        if self.independent {
            attrs.push("INDEPENDENT=YES".to_string());
        }

        format!("#EXT-X-PART:{}", attrs.join(","))
    }
}

/// Server control settings (EXT-X-SERVER-CONTROL).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ServerControl {
    /// Part hold-back in seconds.
    pub part_hold_back: f64,
    /// Segments older than this many seconds from the end may be skipped.
    pub can_skip_until: f64,
}

impl ServerControl {
    /// Render as EXT-X-SERVER-CONTROL tag.
    pub fn render(&self) -> String {
        format!(
            "#EXT-X-SERVER-CONTROL:CAN-BLOCK-RELOAD=YES,PART-HOLD-BACK={:.6},CAN-SKIP-UNTIL={:.6}",
            self.part_hold_back, self.can_skip_until
        )
    }
}

/// A complete segment as listed in the media playlist.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentEntry {
    /// Media sequence number.
    pub sequence: u64,
    /// Wall-clock time of the first sample.
    pub ntp: DateTime<Utc>,
    /// Duration.
    pub duration: Duration,
    /// Parts, listed only for the most recent segments.
    pub parts: Vec<PartialSegment>,
}

/// Media playlist of a variant.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaPlaylist {
    /// Variant the segments belong to.
    pub variant: MuxerVariant,
    /// Target duration in whole seconds.
    pub target_duration: u64,
    /// Complete segments, oldest first.
    pub segments: Vec<SegmentEntry>,
    /// Parts of the segment being built.
    pub pending_parts: Vec<PartialSegment>,
    /// Part target duration (low-latency).
    pub part_target: Option<Duration>,
    /// Server control (low-latency).
    pub server_control: Option<ServerControl>,
    /// Identifier of the next part, hinted to clients (low-latency).
    pub preload_hint: Option<u64>,
    /// Number of leading segments replaced by EXT-X-SKIP.
    pub skipped_segments: u64,
}

impl MediaPlaylist {
    /// Media sequence number of the first segment.
    pub fn media_sequence(&self) -> u64 {
        self.segments.first().map(|s| s.sequence).unwrap_or(0)
    }

    /// Number of leading segments that end at least `can_skip_until`
    /// seconds before the end of the playlist.
    pub fn skippable_segments(&self) -> u64 {
        let Some(control) = self.server_control else {
            return 0;
        };

        let total: f64 = self.segments.iter().map(|s| s.duration.as_secs_f64()).sum();
        let mut end = 0.0;
        let mut count = 0;
        for segment in &self.segments {
            end += segment.duration.as_secs_f64();
            if total - end < control.can_skip_until {
                break;
            }
            count += 1;
        }
        count
    }

    /// Generate playlist content as M3U8 format.
    pub fn render(&self) -> String {
        let mut lines = vec![
            "#EXTM3U".to_string(),
            format!("#EXT-X-VERSION:{}", self.variant.playlist_version()),
            format!("#EXT-X-TARGETDURATION:{}", self.target_duration),
        ];

        if let Some(ref control) = self.server_control {
            lines.push(control.render());
        }

        if let Some(part_target) = self.part_target {
            lines.push(format!(
                "#EXT-X-PART-INF:PART-TARGET={:.6}",
                part_target.as_secs_f64()
            ));
        }

        lines.push(format!("#EXT-X-MEDIA-SEQUENCE:{}", self.media_sequence()));

        if self.variant.is_fmp4() {
            lines.push(format!("#EXT-X-MAP:URI=\"{}\"", INIT_SEGMENT));
        }

        if self.skipped_segments > 0 {
            lines.push(format!("#EXT-X-SKIP:SKIPPED-SEGMENTS={}", self.skipped_segments));
        }

        for segment in self.segments.iter().skip(self.skipped_segments as usize) {
            lines.push(String::new());
            lines.push(format!(
                "#EXT-X-PROGRAM-DATE-TIME:{}",
                segment.ntp.to_rfc3339_opts(SecondsFormat::Millis, true)
            ));

            for part in &segment.parts {
                lines.push(part.render());
            }

            lines.push(format!("#EXTINF:{:.6},", segment.duration.as_secs_f64()));
            lines.push(segment_name(self.variant, segment.sequence));
        }

        if !self.pending_parts.is_empty() || self.preload_hint.is_some() {
            lines.push(String::new());
        }

        for part in &self.pending_parts {
            lines.push(part.render());
        }

        if let Some(id) = self.preload_hint {
            lines.push(format!(
                "#EXT-X-PRELOAD-HINT:TYPE=PART,URI=\"{}\"",
                part_name(id)
            ));
        }

        finish(lines)
    }
}

fn finish(lines: Vec<String>) -> String {
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use chrono::TimeZone;
    use transcode_rtp::format::AacConfig;

    fn entry(sequence: u64, secs: u64) -> SegmentEntry {
        SegmentEntry {
            sequence,
            ntp: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            duration: Duration::from_secs(secs),
            parts: Vec::new(),
        }
    }

    #[test]
    fn test_codecs() {
        let video = H264::with_parameter_sets(
            96,
            Some(Bytes::from_static(&[0x67, 0x64, 0x00, 0x1f, 0xac])),
            None,
        );
        let audio = Mpeg4Audio::new(96, AacConfig::aac_lc(44100, 2));

        assert_eq!(
            codecs(Some(&video), Some(&audio)),
            vec!["avc1.64001f".to_string(), "mp4a.40.2".to_string()]
        );
        assert!(codecs(Some(&H264::new(96)), None).is_empty());
    }

    #[test]
    fn test_parse_numbered() {
        assert_eq!(parse_numbered("seg12.ts", "seg", "ts"), Some(12));
        assert_eq!(parse_numbered("part0.mp4", "part", "mp4"), Some(0));
        assert_eq!(parse_numbered("seg.ts", "seg", "ts"), None);
        assert_eq!(parse_numbered("seg1.mp4", "seg", "ts"), None);
        assert_eq!(parse_numbered("seg+1.ts", "seg", "ts"), None);
    }

    #[test]
    fn test_primary_playlist() {
        let audio = Arc::new(Mpeg4Audio::new(96, AacConfig::aac_lc(48000, 2)));
        let playlist = PrimaryPlaylist::new(MuxerVariant::MpegTs, None, Some(audio));

        assert_eq!(
            playlist.render(),
            "#EXTM3U\n#EXT-X-VERSION:3\n\n\
             #EXT-X-STREAM-INF:BANDWIDTH=200000,CODECS=\"mp4a.40.2\"\nstream.m3u8\n"
        );
    }

    #[test]
    fn test_part_tag() {
        let part = PartialSegment {
            id: 3,
            duration: Duration::from_millis(200),
            independent: true,
        };
        assert_eq!(
            part.render(),
            "#EXT-X-PART:DURATION=0.200000,URI=\"part3.mp4\",INDEPENDENT=YES"
        );
    }

    #[test]
    fn test_skippable_segments() {
        let mut playlist = MediaPlaylist {
            variant: MuxerVariant::LowLatency,
            target_duration: 1,
            segments: (0..7).map(|i| entry(i, 1)).collect(),
            pending_parts: Vec::new(),
            part_target: Some(Duration::from_millis(200)),
            server_control: Some(ServerControl {
                part_hold_back: 0.6,
                can_skip_until: 6.0,
            }),
            preload_hint: None,
            skipped_segments: 0,
        };
        assert_eq!(playlist.skippable_segments(), 1);

        playlist.server_control = None;
        assert_eq!(playlist.skippable_segments(), 0);
    }

    #[test]
    fn test_media_playlist_mpegts() {
        let playlist = MediaPlaylist {
            variant: MuxerVariant::MpegTs,
            target_duration: 2,
            segments: vec![entry(4, 2)],
            pending_parts: Vec::new(),
            part_target: None,
            server_control: None,
            preload_hint: None,
            skipped_segments: 0,
        };

        assert_eq!(
            playlist.render(),
            "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:2\n#EXT-X-MEDIA-SEQUENCE:4\n\n\
             #EXT-X-PROGRAM-DATE-TIME:2026-01-01T00:00:00.000Z\n#EXTINF:2.000000,\nseg4.ts\n"
        );
    }
}
