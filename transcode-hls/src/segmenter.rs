//! Segment and part cutting.

use crate::config::MuxerConfig;
use crate::error::{HlsError, Result};
use crate::playlist::{MediaPlaylist, PartialSegment, SegmentEntry, ServerControl};
use crate::writer::{Sample, SegmentWriter};
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use transcode_rtp::{Mpeg4Audio, H264};

/// Number of most recent segments whose parts are listed.
const SEGMENTS_WITH_PARTS: usize = 2;

#[derive(Debug)]
struct Part {
    id: u64,
    duration: Duration,
    independent: bool,
    body: Bytes,
}

impl Part {
    fn entry(&self) -> PartialSegment {
        PartialSegment {
            id: self.id,
            duration: self.duration,
            independent: self.independent,
        }
    }
}

#[derive(Debug)]
struct Segment {
    sequence: u64,
    ntp: DateTime<Utc>,
    duration: Duration,
    parts: Vec<Part>,
    body: Bytes,
}

/// Segment being filled.
#[derive(Debug)]
struct OpenSegment {
    sequence: u64,
    ntp: DateTime<Utc>,
    start_pts: Duration,
    size: u64,
    parts: Vec<Part>,
    samples: Vec<Sample>,
    part_start_pts: Duration,
}

impl OpenSegment {
    fn new(sequence: u64, first: &Sample) -> Self {
        Self {
            sequence,
            ntp: first.ntp,
            start_pts: first.pts,
            size: 0,
            parts: Vec::new(),
            samples: Vec::new(),
            part_start_pts: first.pts,
        }
    }
}

/// Whether a request can be answered now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Availability {
    /// The requested segment or part exists.
    Ready,
    /// The requested segment or part has not been produced yet.
    Pending,
    /// The request points too far in the future.
    Invalid,
}

/// Cuts samples into segments and parts and retains the most recent ones.
pub(crate) struct Segmenter {
    config: MuxerConfig,
    video: Option<Arc<H264>>,
    audio: Option<Arc<Mpeg4Audio>>,
    writer: Box<dyn SegmentWriter>,
    init: Option<Bytes>,
    /// Parameter-set revision of the video track the init segment was built from.
    init_revision: u64,
    segments: VecDeque<Segment>,
    current: Option<OpenSegment>,
    next_sequence: u64,
    next_part_id: u64,
    next_fragment: u64,
}

impl Segmenter {
    pub(crate) fn new(
        config: MuxerConfig,
        video: Option<Arc<H264>>,
        audio: Option<Arc<Mpeg4Audio>>,
        writer: Box<dyn SegmentWriter>,
    ) -> Self {
        Self {
            config,
            video,
            audio,
            writer,
            init: None,
            init_revision: 0,
            segments: VecDeque::new(),
            current: None,
            next_sequence: 0,
            next_part_id: 0,
            next_fragment: 0,
        }
    }

    pub(crate) fn write_sample(&mut self, sample: Sample) -> Result<()> {
        let has_video = self.video.is_some();

        let (elapsed, oversized, part_due) = match &self.current {
            Some(current) => (
                sample.pts.saturating_sub(current.start_pts),
                current.size + sample.size() > self.config.segment_max_size,
                !current.samples.is_empty()
                    && sample.pts.saturating_sub(current.part_start_pts)
                        >= self.config.part_duration,
            ),
            None => {
                // the first segment starts at a random access point
                if has_video && !sample.is_idr() {
                    tracing::trace!("dropping sample received before the first IDR");
                    return Ok(());
                }
                return self.start_segment(sample);
            }
        };

        let at_boundary = !has_video || sample.is_idr();
        if at_boundary && (elapsed >= self.config.segment_duration || oversized) {
            self.close_segment(sample.pts)?;
            return self.start_segment(sample);
        }

        if oversized {
            return Err(HlsError::SegmentTooLarge(self.config.segment_max_size));
        }

        if self.config.variant.is_low_latency() && part_due {
            self.flush_part(sample.pts)?;
        }

        let size = sample.size();

        if let Some(current) = self.current.as_mut() {
            current.size += size;
            current.samples.push(sample);
        }
        Ok(())
    }

    fn start_segment(&mut self, sample: Sample) -> Result<()> {
        if self.config.variant.is_fmp4() {
            let revision = self.video.as_ref().map_or(0, |v| v.revision());
            if self.init.is_none() || revision != self.init_revision {
                let init = self
                    .writer
                    .write_init(self.video.as_deref(), self.audio.as_deref())?;
                if self.init.is_some() {
                    tracing::debug!(revision, "parameter sets changed, init segment rebuilt");
                }
                self.init = Some(init);
                self.init_revision = revision;
            }
        }

        let mut segment = OpenSegment::new(self.next_sequence, &sample);
        self.next_sequence += 1;
        segment.size = sample.size();
        segment.samples.push(sample);
        self.current = Some(segment);
        Ok(())
    }

    fn flush_part(&mut self, end_pts: Duration) -> Result<()> {
        let Some(current) = self.current.as_mut() else {
            return Ok(());
        };
        if current.samples.is_empty() {
            return Ok(());
        }

        let samples = std::mem::take(&mut current.samples);
        let body = self.writer.write_media(self.next_fragment, &samples)?;
        self.next_fragment += 1;

        let part = Part {
            id: self.next_part_id,
            duration: end_pts.saturating_sub(current.part_start_pts),
            independent: self.video.is_none() || samples[0].is_idr(),
            body,
        };
        self.next_part_id += 1;

        tracing::trace!(part = part.id, duration = ?part.duration, "part closed");
        current.parts.push(part);
        current.part_start_pts = end_pts;
        Ok(())
    }

    fn close_segment(&mut self, end_pts: Duration) -> Result<()> {
        self.flush_part(end_pts)?;
        let Some(open) = self.current.take() else {
            return Ok(());
        };

        let body = if open.parts.len() == 1 {
            open.parts[0].body.clone()
        } else {
            let mut buf = BytesMut::new();
            for part in &open.parts {
                buf.extend_from_slice(&part.body);
            }
            buf.freeze()
        };

        let segment = Segment {
            sequence: open.sequence,
            ntp: open.ntp,
            duration: end_pts.saturating_sub(open.start_pts),
            parts: if self.config.variant.is_low_latency() {
                open.parts
            } else {
                Vec::new()
            },
            body,
        };

        tracing::debug!(
            sequence = segment.sequence,
            duration = ?segment.duration,
            size = segment.body.len(),
            "segment closed"
        );

        self.segments.push_back(segment);
        while self.segments.len() > self.config.segment_count {
            if let Some(removed) = self.segments.pop_front() {
                tracing::trace!(sequence = removed.sequence, "segment removed");
            }
        }
        Ok(())
    }

    pub(crate) fn init(&self) -> Option<Bytes> {
        self.init.clone()
    }

    pub(crate) fn segment(&self, sequence: u64) -> Option<Bytes> {
        self.segments
            .iter()
            .find(|s| s.sequence == sequence)
            .map(|s| s.body.clone())
    }

    pub(crate) fn part(&self, id: u64) -> Option<Bytes> {
        self.segments
            .iter()
            .flat_map(|s| s.parts.iter())
            .chain(self.current.iter().flat_map(|c| c.parts.iter()))
            .find(|p| p.id == id)
            .map(|p| p.body.clone())
    }

    /// Whether segment `msn`, or part `part` of it, exists.
    pub(crate) fn availability(&self, msn: u64, part: Option<u64>) -> Availability {
        let open_sequence = self.next_sequence.saturating_sub(1);
        let open_parts = self.current.as_ref().map(|c| c.parts.len() as u64);

        match open_parts {
            Some(count) => {
                if msn < open_sequence {
                    Availability::Ready
                } else if msn == open_sequence && part.is_some_and(|p| p < count) {
                    Availability::Ready
                } else if msn > open_sequence + 2 {
                    Availability::Invalid
                } else {
                    Availability::Pending
                }
            }
            None => {
                if msn < self.next_sequence {
                    Availability::Ready
                } else if msn > self.next_sequence + 2 {
                    Availability::Invalid
                } else {
                    Availability::Pending
                }
            }
        }
    }

    /// Snapshot of the media playlist, or `None` before the first segment completes.
    pub(crate) fn media_playlist(&self, skip: bool) -> Option<MediaPlaylist> {
        if self.segments.is_empty() {
            return None;
        }

        let low_latency = self.config.variant.is_low_latency();
        let listed_from = self.segments.len().saturating_sub(SEGMENTS_WITH_PARTS);

        let segments: Vec<SegmentEntry> = self
            .segments
            .iter()
            .enumerate()
            .map(|(i, s)| SegmentEntry {
                sequence: s.sequence,
                ntp: s.ntp,
                duration: s.duration,
                parts: if i >= listed_from {
                    s.parts.iter().map(Part::entry).collect()
                } else {
                    Vec::new()
                },
            })
            .collect();

        let max_duration = self
            .segments
            .iter()
            .map(|s| s.duration)
            .max()
            .unwrap_or(self.config.segment_duration);
        let target_duration = (max_duration.as_secs_f64().ceil() as u64).max(1);

        let mut playlist = MediaPlaylist {
            variant: self.config.variant,
            target_duration,
            segments,
            pending_parts: Vec::new(),
            part_target: None,
            server_control: None,
            preload_hint: None,
            skipped_segments: 0,
        };

        if low_latency {
            let part_target = self
                .segments
                .iter()
                .flat_map(|s| s.parts.iter())
                .chain(self.current.iter().flat_map(|c| c.parts.iter()))
                .map(|p| p.duration)
                .fold(self.config.part_duration, Duration::max);

            playlist.pending_parts = self
                .current
                .iter()
                .flat_map(|c| c.parts.iter())
                .map(Part::entry)
                .collect();
            playlist.part_target = Some(part_target);
            playlist.server_control = Some(ServerControl {
                part_hold_back: part_target.as_secs_f64() * 3.0,
                can_skip_until: target_duration as f64 * 6.0,
            });
            playlist.preload_hint = Some(self.next_part_id);

            if skip {
                playlist.skipped_segments = playlist.skippable_segments();
            }
        }

        Some(playlist)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MuxerVariant;
    use crate::writer::SampleData;

    struct CountingWriter;

    impl SegmentWriter for CountingWriter {
        fn write_init(&mut self, video: Option<&H264>, _: Option<&Mpeg4Audio>) -> Result<Bytes> {
            Ok(video.and_then(H264::safe_sps).unwrap_or_else(|| Bytes::from_static(b"init")))
        }

        fn write_media(&mut self, fragment: u64, samples: &[Sample]) -> Result<Bytes> {
            Ok(Bytes::from(vec![fragment as u8; samples.len()]))
        }
    }

    fn segmenter(variant: MuxerVariant) -> Segmenter {
        let config = MuxerConfig::new(variant).with_segment_count(7);
        Segmenter::new(
            config,
            Some(Arc::new(H264::new(96))),
            None,
            Box::new(CountingWriter),
        )
    }

    fn video(ms: u64, idr: bool) -> Sample {
        Sample {
            ntp: Utc::now(),
            pts: Duration::from_millis(ms),
            data: SampleData::H264 {
                nalus: vec![Bytes::from_static(&[0x65, 0x88])],
                idr,
            },
        }
    }

    #[test]
    fn test_waits_for_idr() {
        let mut s = segmenter(MuxerVariant::MpegTs);
        s.write_sample(video(0, false)).unwrap();
        assert!(s.current.is_none());

        s.write_sample(video(40, true)).unwrap();
        assert_eq!(s.current.as_ref().map(|c| c.start_pts), Some(Duration::from_millis(40)));
    }

    #[test]
    fn test_cuts_at_idr_after_duration() {
        let mut s = segmenter(MuxerVariant::MpegTs);
        s.write_sample(video(0, true)).unwrap();
        s.write_sample(video(500, false)).unwrap();
        // too early
        s.write_sample(video(900, true)).unwrap();
        s.write_sample(video(1200, false)).unwrap();
        assert!(s.segments.is_empty());

        s.write_sample(video(1300, true)).unwrap();
        assert_eq!(s.segments.len(), 1);
        assert_eq!(s.segments[0].duration, Duration::from_millis(1300));
        assert_eq!(s.segments[0].body.len(), 4);
        assert_eq!(s.availability(0, None), Availability::Ready);
        assert_eq!(s.availability(1, None), Availability::Pending);
        assert_eq!(s.availability(4, None), Availability::Invalid);
    }

    #[test]
    fn test_low_latency_parts() {
        let mut s = segmenter(MuxerVariant::LowLatency);
        for ms in (0..=1000).step_by(100) {
            s.write_sample(video(ms, ms % 1000 == 0)).unwrap();
        }

        // parts are cut every 200ms; the IDR at 1000ms closed segment 0
        let segment = &s.segments[0];
        assert_eq!(segment.parts.len(), 5);
        assert!(segment.parts[0].independent);
        assert!(!segment.parts[1].independent);
        assert_eq!(segment.body.len(), 10);
        assert_eq!(s.part(4).map(|b| b.len()), Some(2));

        assert_eq!(s.availability(1, Some(0)), Availability::Pending);
        s.write_sample(video(1100, false)).unwrap();
        s.write_sample(video(1200, false)).unwrap();
        assert_eq!(s.availability(1, Some(0)), Availability::Ready);

        let playlist = s.media_playlist(false).unwrap();
        assert_eq!(playlist.pending_parts.len(), 1);
        assert_eq!(playlist.preload_hint, Some(6));
    }

    #[test]
    fn test_init_rebuilt_when_parameter_sets_change() {
        let video_track = Arc::new(H264::new(96));
        let mut s = Segmenter::new(
            MuxerConfig::new(MuxerVariant::Fmp4),
            Some(Arc::clone(&video_track)),
            None,
            Box::new(CountingWriter),
        );

        video_track.update_sps(&[0x67, 0x42, 0x00, 0x1e]);
        s.write_sample(video(0, true)).unwrap();
        assert_eq!(s.init().as_deref(), Some(&[0x67, 0x42, 0x00, 0x1e][..]));

        // unchanged parameter sets keep the init segment
        s.write_sample(video(1000, true)).unwrap();
        assert_eq!(s.init().as_deref(), Some(&[0x67, 0x42, 0x00, 0x1e][..]));

        video_track.update_sps(&[0x67, 0x64, 0x00, 0x28]);
        s.write_sample(video(1500, false)).unwrap();
        assert_eq!(s.init().as_deref(), Some(&[0x67, 0x42, 0x00, 0x1e][..]));

        s.write_sample(video(2000, true)).unwrap();
        assert_eq!(s.segments.len(), 2);
        assert_eq!(s.init().as_deref(), Some(&[0x67, 0x64, 0x00, 0x28][..]));
    }

    #[test]
    fn test_segment_too_large() {
        let config = MuxerConfig::new(MuxerVariant::MpegTs).with_segment_max_size(5);
        let mut s = Segmenter::new(
            config,
            Some(Arc::new(H264::new(96))),
            None,
            Box::new(CountingWriter),
        );

        s.write_sample(video(0, true)).unwrap();
        s.write_sample(video(10, false)).unwrap();
        assert!(matches!(
            s.write_sample(video(20, false)),
            Err(HlsError::SegmentTooLarge(5))
        ));

        // an IDR closes the oversized segment instead
        s.write_sample(video(30, true)).unwrap();
        assert_eq!(s.segments.len(), 1);
    }
}
