//! Muxer behaviour through the file-serving interface.

use bytes::Bytes;
use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

use transcode_hls::{
    HlsError, Muxer, MuxerConfig, MuxerVariant, Sample, SampleData, SegmentWriter,
    PLAYLIST_CONTENT_TYPE,
};
use transcode_rtp::format::AacConfig;
use transcode_rtp::{Mpeg4Audio, H264};

const SPS: &[u8] = &[0x67, 0x64, 0x00, 0x1f, 0xac, 0xd9];
const PPS: &[u8] = &[0x68, 0xeb, 0xe3, 0xcb];
const IDR: &[u8] = &[0x65, 0x88, 0x84];
const NON_IDR: &[u8] = &[0x41, 0x9a];

/// Writes one byte per video sample and two per audio sample.
struct TallyWriter;

impl SegmentWriter for TallyWriter {
    fn write_init(
        &mut self,
        video: Option<&H264>,
        _: Option<&Mpeg4Audio>,
    ) -> transcode_hls::Result<Bytes> {
        let sps = video.and_then(|v| v.safe_sps()).unwrap_or_default();
        Ok(sps)
    }

    fn write_media(&mut self, _: u64, samples: &[Sample]) -> transcode_hls::Result<Bytes> {
        let mut out = Vec::new();
        for sample in samples {
            match &sample.data {
                SampleData::H264 { .. } => out.push(b'v'),
                SampleData::Aac(_) => out.extend_from_slice(b"aa"),
            }
        }
        Ok(Bytes::from(out))
    }
}

struct FailingWriter;

impl SegmentWriter for FailingWriter {
    fn write_init(
        &mut self,
        _: Option<&H264>,
        _: Option<&Mpeg4Audio>,
    ) -> transcode_hls::Result<Bytes> {
        Err(HlsError::SegmentWriter("disk full".into()))
    }

    fn write_media(&mut self, _: u64, _: &[Sample]) -> transcode_hls::Result<Bytes> {
        Err(HlsError::SegmentWriter("disk full".into()))
    }
}

fn muxer(config: MuxerConfig) -> Muxer {
    let video = Arc::new(H264::new(96));
    let audio = Arc::new(Mpeg4Audio::new(96, AacConfig::aac_lc(48000, 2)));
    Muxer::new(config, Some(video), Some(audio), Box::new(TallyWriter)).unwrap()
}

fn write_frame(muxer: &Muxer, ms: u64, key: bool) {
    let ntp = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
        + chrono::Duration::milliseconds(ms as i64);
    let nalus: Vec<Bytes> = if key {
        vec![
            Bytes::from_static(&[0x09, 0xf0]),
            Bytes::from_static(SPS),
            Bytes::from_static(PPS),
            Bytes::from_static(IDR),
        ]
    } else {
        vec![Bytes::from_static(NON_IDR)]
    };
    muxer.write_h264(ntp, Duration::from_millis(ms), &nalus).unwrap();
}

fn body_text(muxer: &Muxer, name: &str) -> String {
    let res = muxer.file(name, None, None, None);
    assert_eq!(res.status, 200, "{}", name);
    String::from_utf8(res.body.unwrap().to_vec()).unwrap()
}

#[test]
fn test_primary_playlist_codecs_follow_in_band_sps() {
    let muxer = muxer(MuxerConfig::new(MuxerVariant::Fmp4));

    let before = body_text(&muxer, "index.m3u8");
    assert!(before.contains("CODECS=\"mp4a.40.2\""));

    write_frame(&muxer, 0, true);
    let after = body_text(&muxer, "index.m3u8");
    assert_eq!(
        after,
        "#EXTM3U\n#EXT-X-VERSION:9\n#EXT-X-INDEPENDENT-SEGMENTS\n\n\
         #EXT-X-STREAM-INF:BANDWIDTH=200000,CODECS=\"avc1.64001f,mp4a.40.2\"\nstream.m3u8\n"
    );

    let res = muxer.file("index.m3u8", None, None, None);
    assert_eq!(
        res.headers.get("Content-Type").map(String::as_str),
        Some(PLAYLIST_CONTENT_TYPE)
    );
}

#[test]
fn test_mpegts_segments_and_retention() {
    let muxer = muxer(MuxerConfig::new(MuxerVariant::MpegTs).with_segment_count(3));

    // nothing to list before the first segment completes
    assert_eq!(muxer.file("stream.m3u8", None, None, None).status, 404);

    for second in 0..6u64 {
        write_frame(&muxer, second * 1000, true);
        write_frame(&muxer, second * 1000 + 500, false);
        let pts = Duration::from_millis(second * 1000 + 250);
        muxer
            .write_aac(Utc::now(), pts, Bytes::from_static(&[0x21]))
            .unwrap();
    }

    // segments 0..=4 are complete, only the last three are retained
    let playlist = body_text(&muxer, "stream.m3u8");
    assert!(playlist.starts_with(
        "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:1\n#EXT-X-MEDIA-SEQUENCE:2\n"
    ));
    assert!(playlist.contains("#EXTINF:1.000000,\nseg4.ts\n"));
    assert!(!playlist.contains("seg1.ts"));
    assert!(!playlist.contains("EXT-X-MAP"));
    assert!(!playlist.contains("EXT-X-PART"));

    let res = muxer.file("seg4.ts", None, None, None);
    assert_eq!(res.status, 200);
    assert_eq!(res.headers.get("Content-Type").map(String::as_str), Some("video/MP2T"));
    assert_eq!(res.body.unwrap(), Bytes::from_static(b"vvaa"));

    assert_eq!(muxer.file("seg1.ts", None, None, None).status, 404);
    assert_eq!(muxer.file("seg5.ts", None, None, None).status, 404);
    assert_eq!(muxer.file("init.mp4", None, None, None).status, 404);
    assert_eq!(muxer.file("part0.mp4", None, None, None).status, 404);
}

#[test]
fn test_fmp4_init_segment() {
    let muxer = muxer(MuxerConfig::new(MuxerVariant::Fmp4));
    assert_eq!(muxer.file("init.mp4", None, None, None).status, 404);

    write_frame(&muxer, 0, true);
    let res = muxer.file("init.mp4", None, None, None);
    assert_eq!(res.status, 200);
    assert_eq!(res.body.unwrap(), Bytes::from_static(SPS));

    write_frame(&muxer, 1000, true);
    let playlist = body_text(&muxer, "stream.m3u8");
    assert!(playlist.contains("#EXT-X-MAP:URI=\"init.mp4\"\n"));
    assert!(playlist.contains("seg0.mp4"));
}

fn low_latency_muxer() -> Muxer {
    let muxer = muxer(MuxerConfig::new(MuxerVariant::LowLatency));
    // 8 one-second segments of five 200ms parts, plus two parts of segment 8
    for frame in 0..=84u64 {
        let ms = frame * 100;
        write_frame(&muxer, ms, ms % 1000 == 0);
    }
    muxer
}

#[test]
fn test_low_latency_playlist() {
    let muxer = low_latency_muxer();
    let playlist = body_text(&muxer, "stream.m3u8");

    assert!(playlist.starts_with(
        "#EXTM3U\n#EXT-X-VERSION:9\n#EXT-X-TARGETDURATION:1\n\
         #EXT-X-SERVER-CONTROL:CAN-BLOCK-RELOAD=YES,PART-HOLD-BACK=0.600000,CAN-SKIP-UNTIL=6.000000\n\
         #EXT-X-PART-INF:PART-TARGET=0.200000\n\
         #EXT-X-MEDIA-SEQUENCE:1\n#EXT-X-MAP:URI=\"init.mp4\"\n"
    ));

    // parts of the two most recent segments and of the open one
    assert!(!playlist.contains("URI=\"part29.mp4\""));
    assert!(playlist.contains("#EXT-X-PART:DURATION=0.200000,URI=\"part30.mp4\",INDEPENDENT=YES\n"));
    assert!(playlist.contains("#EXT-X-PART:DURATION=0.200000,URI=\"part41.mp4\"\n"));
    assert!(playlist.ends_with("#EXT-X-PRELOAD-HINT:TYPE=PART,URI=\"part42.mp4\"\n"));
    assert!(!playlist.contains("EXT-X-SKIP"));

    let part = muxer.file("part41.mp4", None, None, None);
    assert_eq!(part.status, 200);
    assert_eq!(part.body.unwrap(), Bytes::from_static(b"vv"));
    assert_eq!(muxer.file("part42.mp4", None, None, None).status, 404);
    assert_eq!(muxer.file("seg7.mp4", None, None, None).body.unwrap().len(), 10);
}

#[test]
fn test_low_latency_delta_playlist() {
    let muxer = low_latency_muxer();

    let res = muxer.file("stream.m3u8", None, None, Some("YES"));
    let delta = String::from_utf8(res.body.unwrap().to_vec()).unwrap();

    assert!(delta.contains("#EXT-X-MEDIA-SEQUENCE:1\n"));
    assert!(delta.contains("#EXT-X-SKIP:SKIPPED-SEGMENTS=1\n"));
    assert!(!delta.contains("seg1.mp4"));
    assert!(delta.contains("seg2.mp4"));
}

#[test]
fn test_low_latency_blocking_parameters() {
    let muxer = low_latency_muxer();

    // segment 8 is open with two parts
    assert_eq!(muxer.file("stream.m3u8", Some("7"), None, None).status, 200);
    assert_eq!(muxer.file("stream.m3u8", Some("8"), Some("1"), None).status, 200);
    assert_eq!(muxer.file("stream.m3u8", Some("8"), Some("2"), None).status, 404);
    assert_eq!(muxer.file("stream.m3u8", Some("8"), None, None).status, 404);
    assert_eq!(muxer.file("stream.m3u8", Some("11"), None, None).status, 400);
    assert_eq!(muxer.file("stream.m3u8", None, Some("0"), None).status, 400);
    assert_eq!(muxer.file("stream.m3u8", Some("x"), None, None).status, 400);
}

#[test]
fn test_audio_only_cuts_on_any_sample() {
    let audio = Arc::new(Mpeg4Audio::new(96, AacConfig::aac_lc(44100, 2)));
    let muxer = Muxer::new(
        MuxerConfig::new(MuxerVariant::MpegTs),
        None,
        Some(audio),
        Box::new(TallyWriter),
    )
    .unwrap();

    for i in 0..=10u64 {
        muxer
            .write_aac(Utc::now(), Duration::from_millis(i * 250), Bytes::from_static(&[0x21]))
            .unwrap();
    }

    let playlist = body_text(&muxer, "stream.m3u8");
    assert!(playlist.contains("seg1.ts"));
    assert_eq!(
        muxer.file("seg0.ts", None, None, None).body.unwrap(),
        Bytes::from_static(b"aaaaaaaa")
    );

    assert!(matches!(
        muxer.write_h264(Utc::now(), Duration::ZERO, &[Bytes::from_static(IDR)]),
        Err(HlsError::MissingTrack("H264"))
    ));
}

#[test]
fn test_constructor_errors() {
    assert!(matches!(
        Muxer::new(MuxerConfig::default(), None, None, Box::new(TallyWriter)),
        Err(HlsError::NoTracks)
    ));
    assert!(matches!(
        Muxer::new(
            MuxerConfig::default().with_segment_count(2),
            Some(Arc::new(H264::new(96))),
            None,
            Box::new(TallyWriter)
        ),
        Err(HlsError::InvalidConfig(_))
    ));
}

#[test]
fn test_writer_errors_propagate() {
    let muxer = Muxer::new(
        MuxerConfig::new(MuxerVariant::Fmp4),
        Some(Arc::new(H264::new(96))),
        None,
        Box::new(FailingWriter),
    )
    .unwrap();

    let err = muxer
        .write_h264(Utc::now(), Duration::ZERO, &[Bytes::from_static(IDR)])
        .unwrap_err();
    assert_eq!(err.to_string(), "Segment writer error: disk full");
}

#[test]
fn test_muxer_is_shared_across_threads() {
    let muxer = Arc::new(muxer(MuxerConfig::new(MuxerVariant::MpegTs)));

    let writer = {
        let muxer = Arc::clone(&muxer);
        std::thread::spawn(move || {
            for second in 0..4u64 {
                write_frame(&muxer, second * 1000, true);
            }
        })
    };
    writer.join().unwrap();

    assert_eq!(muxer.file("seg2.ts", None, None, None).status, 200);
}
