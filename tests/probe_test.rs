//! Format probing integration tests

#[path = "common/mod.rs"]
mod common;

use common::*;
use std::io::{Cursor, Write};
use std::sync::Arc;
use zvd_demux::codec::{CodecId, CodecRegistry};
use zvd_demux::error::Error;
use zvd_demux::format::{DemuxOptions, DemuxerContext, FormatRegistry, MediaSource, Streaming};
use zvd_demux::probe::{FormatDetector, ProbeData, PROBE_SCORE_MAX};

fn open(
    source: Box<dyn MediaSource>,
    filename: &str,
    formats: &FormatRegistry,
    options: DemuxOptions,
) -> zvd_demux::Result<DemuxerContext> {
    DemuxerContext::open_input(source, filename, formats, Arc::new(CodecRegistry::new()), options)
}

fn zmux_registry() -> FormatRegistry {
    registry_with(ZmuxFormat::new(vec![video_stream(CodecId::Mpeg4)]))
}

// ============================================================================
// Detection Tests
// ============================================================================

#[test]
fn test_detects_zmux() {
    let data = zmux_bytes(&timed_records(5, 5));
    let ctx = open(
        Box::new(Cursor::new(data)),
        "clip.bin",
        &zmux_registry(),
        DemuxOptions::default(),
    )
    .unwrap();
    assert_eq!(ctx.format_info().name, "zmux");
    assert_eq!(ctx.streams().len(), 1);
    assert_eq!(ctx.file_size(), Some((DATA_OFFSET as usize + 5 * RECORD_SIZE) as u64));
}

#[test]
fn test_highest_score_wins() {
    let mut formats = zmux_registry();
    formats.register(MagicFormat::new("weak", b"ZMUX", 30));

    let data = zmux_bytes(&timed_records(2, 1));
    let ctx = open(Box::new(Cursor::new(data)), "clip", &formats, DemuxOptions::default()).unwrap();
    assert_eq!(ctx.format_info().name, "zmux");
}

#[test]
fn test_equal_scores_are_ambiguous() {
    let mut formats = FormatRegistry::new();
    formats.register(MagicFormat::new("left", b"TIE!", 60));
    formats.register(MagicFormat::new("right", b"TIE!", 60));

    let mut data = b"TIE!".to_vec();
    data.resize(100, 0);
    match open(Box::new(Cursor::new(data)), "tie", &formats, DemuxOptions::default()) {
        Err(Error::InvalidData(msg)) => assert!(msg.contains("equally")),
        other => panic!("expected ambiguity error, got {:?}", other.map(|c| c.format_info().name.clone())),
    }
}

#[test]
fn test_unrecognized_input() {
    let data = vec![0x42u8; 512];
    match open(Box::new(Cursor::new(data)), "noise.bin", &zmux_registry(), DemuxOptions::default()) {
        Err(Error::InvalidData(msg)) => {
            assert!(msg.contains("could not determine"));
            assert!(!msg.contains("equally"));
        }
        other => panic!("expected detection failure, got {:?}", other.map(|c| c.streams().len())),
    }
}

#[test]
fn test_extension_fallback() {
    // garbage with a .zmx name is handed to the ZMUX reader, which rejects it
    let data = vec![0x42u8; 512];
    let result = open(Box::new(Cursor::new(data)), "noise.zmx", &zmux_registry(), DemuxOptions::default());
    assert!(matches!(result, Err(Error::Format(_))));
}

#[test]
fn test_detector_scores_directly() {
    let formats = zmux_registry();
    let detector = FormatDetector::new(&formats);

    let data = zmux_bytes(&[]);
    let decision = detector.detect(&ProbeData::new("clip", &data), true, 0);
    assert_eq!(decision.score, PROBE_SCORE_MAX);
    assert!(!decision.ambiguous);
    assert_eq!(decision.format.unwrap().info().name, "zmux");

    // formats that do not read bytes are skipped for opened inputs
    let decision = detector.detect(&ProbeData::new("clip", &data), false, 0);
    assert!(decision.format.is_none());
}

#[test]
fn test_detect_elementary_codec() {
    let mut formats = zmux_registry();
    formats.register(MagicFormat::elementary("mp2", &[0xff, 0xfd], 50, CodecId::Mp2));
    let detector = FormatDetector::new(&formats);

    assert_eq!(detector.detect_elementary(&[0xff, 0xfd, 0x90, 0x00], 25), Some(CodecId::Mp2));
    assert_eq!(detector.detect_elementary(&[0xff, 0xfd, 0x90, 0x00], 50), None);
    // container formats never answer for elementary payloads
    assert_eq!(detector.detect_elementary(&zmux_bytes(&[]), 0), None);
}

// ============================================================================
// Source Tests
// ============================================================================

#[test]
fn test_forward_only_source_replays_probe() {
    let data = zmux_bytes(&timed_records(5, 5));
    let source = Streaming::new(Cursor::new(data));
    let mut ctx = open(Box::new(source), "pipe:", &zmux_registry(), DemuxOptions::default()).unwrap();

    assert_eq!(ctx.data_offset(), DATA_OFFSET);
    assert_eq!(ctx.file_size(), None);

    let packets = read_all(&mut ctx);
    assert_eq!(
        pts_of(&packets),
        vec![Some(0), Some(1), Some(2), Some(3), Some(4)]
    );
}

#[test]
fn test_forward_only_source_seeks_within_probed_prefix() {
    // the whole clip fits into the probe prefix, so it stays reachable
    let data = zmux_bytes(&timed_records(5, 5));
    let mut ctx = open(
        Box::new(Streaming::new(Cursor::new(data))),
        "pipe:",
        &zmux_registry(),
        DemuxOptions::default(),
    )
    .unwrap();
    read_all(&mut ctx);

    ctx.seek_frame(Some(0), record_pos(3), zvd_demux::format::SeekFlags::byte())
        .unwrap();
    let packets = read_all(&mut ctx);
    assert_eq!(pts_of(&packets), vec![Some(3), Some(4)]);
}

#[test]
fn test_opens_file_on_disk() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&zmux_bytes(&timed_records(6, 3))).unwrap();
    file.flush().unwrap();

    let source = std::fs::File::open(file.path()).unwrap();
    let mut ctx = open(Box::new(source), "clip.zmx", &zmux_registry(), DemuxOptions::default()).unwrap();
    assert_eq!(ctx.file_size(), Some((DATA_OFFSET as usize + 6 * RECORD_SIZE) as u64));
    assert_eq!(read_all(&mut ctx).len(), 6);
}

// ============================================================================
// Options Tests
// ============================================================================

#[test]
fn test_probe_size_below_minimum() {
    let options = DemuxOptions {
        format_probe_size: 1000,
        ..DemuxOptions::default()
    };
    let data = zmux_bytes(&timed_records(2, 1));
    let result = open(Box::new(Cursor::new(data)), "clip", &zmux_registry(), options);
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn test_forced_codec_must_match_media_type() {
    let options = DemuxOptions {
        video_codec_id: Some(CodecId::Aac),
        ..DemuxOptions::default()
    };
    assert!(matches!(options.validate(), Err(Error::Config(_))));
}

#[test]
fn test_options_from_partial_json() {
    let options = DemuxOptions::from_json(r#"{"probe_size": 1024, "flags": {"gen_pts": true}}"#).unwrap();
    assert_eq!(options.probe_size, 1024);
    assert!(options.flags.gen_pts);
    assert!(!options.flags.ign_dts);
    assert_eq!(options.max_probe_packets, DemuxOptions::default().max_probe_packets);

    let back = DemuxOptions::from_json(&options.to_json().unwrap()).unwrap();
    assert_eq!(back, options);
}
