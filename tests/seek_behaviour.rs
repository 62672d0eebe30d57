//! Integration tests for seeking
//!
//! The engine only moves forward, so these check that both seek modes land
//! on exactly the samples a straight play-through produces, and that the
//! fade envelope follows the jump.

mod common;

use approx::assert_abs_diff_eq;
use common::{pull, raw_f32, EngineControl, MockEngine, MockTrack, RecordingHost, RATE};
use sid_session::{
    DurationResolver, FadePhase, SeekRequest, Session, SessionConfig, SessionError,
    SonglengthDatabase, Track,
};
use std::rc::Rc;

type TestSession = Session<MockEngine, RecordingHost>;

fn open(
    config: SessionConfig,
    track: MockTrack,
    lengths: Option<Vec<u32>>,
) -> (TestSession, Rc<EngineControl>) {
    open_with_channels(config, track, lengths, 1)
}

fn open_with_channels(
    config: SessionConfig,
    track: MockTrack,
    lengths: Option<Vec<u32>>,
    channels: u16,
) -> (TestSession, Rc<EngineControl>) {
    let (engine, control) = MockEngine::new();
    let mut session = Session::new(engine, RecordingHost::default(), config);
    if let Some(lengths) = lengths {
        let mut db = SonglengthDatabase::new();
        db.insert(track.fingerprint(), lengths);
        session = session.with_resolver(DurationResolver::with_database(db));
    }
    session.set_format(RATE, channels).expect("format");
    session.open(track).expect("open");
    (session, control)
}

fn plain() -> SessionConfig {
    SessionConfig::default().without_fades()
}

#[test]
fn test_backward_seek_replays_identical_audio() {
    let (mut s, control) = open(plain(), MockTrack::new(1, 1), None);
    let straight = pull(&mut s, 3 * RATE as usize, 700);

    let resets = control.resets.get();
    let landed = s.seek(SeekRequest::Time(0.5)).unwrap();
    assert_abs_diff_eq!(landed, 0.5, epsilon = 1.0 / f64::from(RATE));
    assert_eq!(control.resets.get(), resets + 1);

    let start = (RATE / 2) as usize;
    let replay = pull(&mut s, RATE as usize, 700);
    assert_eq!(replay[..], straight[start..start + RATE as usize]);
}

#[test]
fn test_forward_seek_matches_straight_play() {
    let (mut s, control) = open(plain(), MockTrack::new(2, 1), None);
    s.seek(SeekRequest::Subsong(2)).unwrap();

    let resets = control.resets.get();
    let before = control.decoded_samples.get();
    s.seek(SeekRequest::Time(2.0)).unwrap();
    assert_eq!(control.resets.get(), resets);
    assert_eq!(control.decoded_samples.get() - before, 2 * u64::from(RATE));

    let audio = pull(&mut s, 1_000, 256);
    assert_eq!(audio, raw_f32(2, 2 * u64::from(RATE), 1_000));
}

#[test]
fn test_seek_round_trip_within_one_sample() {
    let (mut s, _) = open(plain(), MockTrack::new(1, 1), None);
    let one_sample = 1.0 / f64::from(RATE);

    for target in [1.23456, 0.00155, 3.50001, 0.75003] {
        let landed = s.seek(SeekRequest::Time(target)).unwrap();
        assert_abs_diff_eq!(landed, target, epsilon = one_sample);
        assert_abs_diff_eq!(s.position_seconds(), target, epsilon = one_sample);
    }
}

#[test]
fn test_seek_to_current_position_decodes_nothing() {
    let (mut s, control) = open(plain(), MockTrack::new(1, 1), None);
    pull(&mut s, RATE as usize, 800);

    let calls = control.decode_calls.get();
    let landed = s.seek(SeekRequest::Time(1.0)).unwrap();
    assert_eq!(landed, 1.0);
    assert_eq!(control.decode_calls.get(), calls);
}

#[test]
fn test_unreachable_seek_keeps_session_consistent() {
    let track = MockTrack::new(1, 1).with_end(1, u64::from(RATE));
    let (mut s, _) = open(plain(), track, None);

    match s.seek(SeekRequest::Time(5.0)) {
        Err(SessionError::SeekUnreachable {
            target_ms,
            reached_ms,
        }) => {
            assert_eq!(target_ms, 5_000);
            assert_eq!(reached_ms, 1_000);
        }
        other => panic!("expected SeekUnreachable, got {:?}", other),
    }
    assert!(s.is_open());
    assert_eq!(s.position_ms(), 1_000);
    assert_eq!(s.summary().unwrap().durations, vec![120]);

    // The tune is exhausted, but seeking back still works
    let mut buf = vec![0.0f32; 64];
    assert_eq!(s.process(&mut buf).unwrap(), 0);
    s.seek(SeekRequest::Time(0.25)).unwrap();
    assert_eq!(pull(&mut s, 100, 100), raw_f32(1, 2_000, 100));
}

#[test]
fn test_host_position_values() {
    let (mut s, _) = open(plain(), MockTrack::new(3, 1), None);

    assert_eq!(s.seek_host_position(0x8000_0001).unwrap(), 0.0);
    assert_eq!(s.current_subsong(), Some(2));

    let landed = s.seek_host_position(1_500).unwrap();
    assert_abs_diff_eq!(landed, 1.5, epsilon = 1e-9);
    assert_eq!(s.current_subsong(), Some(2));
}

#[test]
fn test_invalid_subsong_is_rejected() {
    let (mut s, _) = open(plain(), MockTrack::new(3, 1), None);
    assert!(matches!(
        s.seek(SeekRequest::Subsong(4)),
        Err(SessionError::InvalidSubsong {
            index: 4,
            available: 3
        })
    ));
    assert!(matches!(
        s.seek(SeekRequest::Subsong(0)),
        Err(SessionError::InvalidSubsong { .. })
    ));
    assert_eq!(s.current_subsong(), Some(1));
}

#[test]
fn test_subsong_change_restarts_position_and_fade() {
    let config = SessionConfig::default().with_fade_in(80);
    let (mut s, _) = open(config, MockTrack::new(2, 1), None);
    pull(&mut s, RATE as usize, 800);
    assert_eq!(s.fade_state().unwrap().phase, FadePhase::Idle);

    s.seek(SeekRequest::Subsong(2)).unwrap();
    assert_eq!(s.position_ms(), 0);
    assert_eq!(s.fade_state().unwrap().phase, FadePhase::FadingIn);
}

#[test]
fn test_seek_to_start_rearms_fade_in() {
    let config = SessionConfig::default().with_fade_in(80);
    let (mut s, _) = open(config, MockTrack::new(1, 1), None);
    pull(&mut s, RATE as usize, 800);

    s.seek(SeekRequest::Time(0.0)).unwrap();
    assert_eq!(s.fade_state().unwrap().phase, FadePhase::FadingIn);

    // Mid-track seeks play at full gain
    s.seek(SeekRequest::Time(0.5)).unwrap();
    assert_eq!(s.fade_state().unwrap().phase, FadePhase::Idle);
    assert_eq!(pull(&mut s, 200, 200), raw_f32(1, 4_000, 200));
}

#[test]
fn test_fade_out_runs_to_silence_at_subsong_end() {
    let config = plain().with_fade_out(500);
    let (mut s, _) = open(config, MockTrack::new(1, 1), Some(vec![2]));

    let audio = pull(&mut s, 10 * RATE as usize, 800);
    assert_eq!(audio.len(), 2 * RATE as usize);

    let raw = raw_f32(1, 0, audio.len());
    let trigger = (RATE * 3 / 2) as usize;
    assert_eq!(audio[..trigger], raw[..trigger]);

    // Halfway through the fade the gain is about one half
    let mid = trigger + (RATE / 4) as usize;
    let gain = audio[mid] / raw[mid];
    assert_abs_diff_eq!(gain, 0.5, epsilon = 0.01);
    assert!(audio[audio.len() - 1].abs() < 1e-3);
}

#[test]
fn test_seek_past_fade_out_point_plays_at_full_gain() {
    let config = plain().with_fade_out(500);
    let (mut s, _) = open(config, MockTrack::new(1, 1), Some(vec![2]));

    s.seek(SeekRequest::Time(1.8)).unwrap();
    assert_eq!(s.fade_state().unwrap().phase, FadePhase::Idle);
    let start = (RATE as f64 * 1.8) as u64;
    assert_eq!(pull(&mut s, 800, 800), raw_f32(1, start, 800));
}

#[test]
fn test_seek_back_before_fade_out_rearms_it() {
    let config = plain().with_fade_out(500);
    let (mut s, _) = open(config, MockTrack::new(1, 1), Some(vec![2]));
    pull(&mut s, (RATE * 7 / 4) as usize, 700);
    assert_eq!(s.fade_state().unwrap().phase, FadePhase::FadingOut);

    s.seek(SeekRequest::Time(1.0)).unwrap();
    assert_eq!(s.fade_state().unwrap().phase, FadePhase::Holding);
    pull(&mut s, (RATE * 3 / 4) as usize, 700);
    assert_eq!(s.fade_state().unwrap().phase, FadePhase::FadingOut);
}

#[test]
fn test_seek_cost_grows_with_target_when_going_back() {
    let (mut s, control) = open(plain(), MockTrack::new(1, 1), None);
    s.seek(SeekRequest::Time(4.0)).unwrap();

    let before = control.decoded_samples.get();
    s.seek(SeekRequest::Time(3.0)).unwrap();
    assert_eq!(control.decoded_samples.get() - before, 3 * u64::from(RATE));
}

#[test]
fn test_stereo_backward_seek_replays_identical_audio() {
    let (mut s, control) = open_with_channels(plain(), MockTrack::new(1, 1), None, 2);
    let frame = 2 * RATE as usize;
    let straight = pull(&mut s, 3 * frame, 700);
    assert_eq!(s.position_ms(), 3_000);

    let resets = control.resets.get();
    let landed = s.seek(SeekRequest::Time(0.75003)).unwrap();
    assert_abs_diff_eq!(landed, 0.75003, epsilon = 1.0 / f64::from(RATE));
    assert_eq!(control.resets.get(), resets + 1);

    // floor(0.75003 * 8000) = 6000 frames, 12000 interleaved samples
    let start = 12_000;
    assert_eq!(control.decoded_samples.get(), (3 * frame + start) as u64);
    let replay = pull(&mut s, frame, 700);
    assert_eq!(replay[..], straight[start..start + frame]);
}

#[test]
fn test_stereo_subsong_stops_at_its_length() {
    let (mut s, _) = open_with_channels(plain(), MockTrack::new(1, 1), Some(vec![1]), 2);
    let audio = pull(&mut s, 10 * RATE as usize, 800);
    assert_eq!(audio.len(), 2 * RATE as usize);
    assert_eq!(audio, raw_f32(1, 0, 2 * RATE as usize));
}

#[test]
fn test_non_finite_seek_is_rejected() {
    let (mut s, control) = open_with_channels(plain(), MockTrack::new(1, 1), None, 2);
    pull(&mut s, 2 * RATE as usize, 800);
    let decoded = control.decoded_samples.get();

    for target in [f64::INFINITY, f64::NEG_INFINITY, f64::NAN] {
        match s.seek(SeekRequest::Time(target)) {
            Err(SessionError::SeekUnreachable { reached_ms, .. }) => {
                assert_eq!(reached_ms, 1_000);
            }
            other => panic!("expected SeekUnreachable for {}, got {:?}", target, other),
        }
    }
    assert_eq!(control.decoded_samples.get(), decoded);
    assert_eq!(control.resets.get(), 0);
    assert_eq!(s.position_ms(), 1_000);
    assert_eq!(pull(&mut s, 100, 100), raw_f32(1, 2 * u64::from(RATE), 100));
}
