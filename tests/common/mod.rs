//! Shared fixtures: a deterministic decode engine and a recording host.

#![allow(dead_code)]

use sid_session::{
    DecodeEngine, EngineError, EngineSettings, Host, OutputFormat, SessionError, Track,
};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Tune with a fixed subsong layout and optional per-subsong end points.
#[derive(Debug, Clone)]
pub struct MockTrack {
    pub subsongs: usize,
    pub default: usize,
    pub data: Vec<u8>,
    /// Interleaved samples each subsong produces before ending (None = forever)
    pub ends: Vec<Option<u64>>,
}

impl MockTrack {
    pub fn new(subsongs: usize, default: usize) -> Self {
        Self {
            subsongs,
            default,
            data: format!("mock-tune-{}-{}", subsongs, default).into_bytes(),
            ends: vec![None; subsongs],
        }
    }

    pub fn with_data(mut self, data: &[u8]) -> Self {
        self.data = data.to_vec();
        self
    }

    /// Make `subsong` (1-based) run dry after `samples` interleaved samples.
    pub fn with_end(mut self, subsong: usize, samples: u64) -> Self {
        self.ends[subsong - 1] = Some(samples);
        self
    }
}

impl Track for MockTrack {
    fn subsong_count(&self) -> usize {
        self.subsongs
    }

    fn default_subsong(&self) -> usize {
        self.default
    }

    fn tune_data(&self) -> &[u8] {
        &self.data
    }
}

/// Knobs and counters shared between a test and its engine.
#[derive(Debug, Default)]
pub struct EngineControl {
    pub fail_configure: Cell<bool>,
    pub fail_load: Cell<bool>,
    pub configure_calls: Cell<usize>,
    pub decode_calls: Cell<usize>,
    pub decoded_samples: Cell<u64>,
    pub resets: Cell<usize>,
    pub last_format: Cell<Option<OutputFormat>>,
    pub last_settings: RefCell<Option<EngineSettings>>,
}

/// Raw sample the mock produces at `position` of `subsong`.
pub fn pcm_value(subsong: usize, position: u64) -> i16 {
    let v = (position.wrapping_mul(7_919) + subsong as u64 * 104_729) % 32_000;
    v as i16 - 16_000
}

/// Forward-only engine whose output depends only on subsong and position.
#[derive(Debug)]
pub struct MockEngine {
    control: Rc<EngineControl>,
    ends: Option<Vec<Option<u64>>>,
    subsong: usize,
    position: u64,
    format: OutputFormat,
}

impl MockEngine {
    pub fn new() -> (Self, Rc<EngineControl>) {
        let control = Rc::new(EngineControl::default());
        let engine = Self {
            control: Rc::clone(&control),
            ends: None,
            subsong: 0,
            position: 0,
            format: OutputFormat::default(),
        };
        (engine, control)
    }

    pub fn subsong(&self) -> usize {
        self.subsong
    }
}

impl DecodeEngine for MockEngine {
    type Track = MockTrack;

    fn configure(
        &mut self,
        settings: &EngineSettings,
        format: OutputFormat,
    ) -> Result<(), EngineError> {
        self.control
            .configure_calls
            .set(self.control.configure_calls.get() + 1);
        if self.control.fail_configure.get() {
            return Err("emulator refused configuration".into());
        }
        self.format = format;
        self.control.last_format.set(Some(format));
        *self.control.last_settings.borrow_mut() = Some(settings.clone());
        Ok(())
    }

    fn load(&mut self, track: &MockTrack) -> Result<(), EngineError> {
        if self.control.fail_load.get() {
            return Err("unsupported tune".into());
        }
        self.ends = Some(track.ends.clone());
        self.subsong = 0;
        self.position = 0;
        Ok(())
    }

    fn select_subsong(&mut self, index: usize) -> Result<(), EngineError> {
        let ends = self.ends.as_ref().ok_or("no tune loaded")?;
        if index == 0 || index > ends.len() {
            return Err(format!("no subsong {}", index).into());
        }
        self.subsong = index;
        self.position = 0;
        Ok(())
    }

    fn decode(&mut self, buffer: &mut [i16]) -> usize {
        self.control.decode_calls.set(self.control.decode_calls.get() + 1);
        let Some(ends) = &self.ends else { return 0 };
        if self.subsong == 0 {
            return 0;
        }
        let available = match ends[self.subsong - 1] {
            Some(end) => end.saturating_sub(self.position),
            None => u64::MAX,
        };
        let n = (buffer.len() as u64).min(available) as usize;
        for (i, out) in buffer[..n].iter_mut().enumerate() {
            *out = pcm_value(self.subsong, self.position + i as u64);
        }
        self.position += n as u64;
        self.control
            .decoded_samples
            .set(self.control.decoded_samples.get() + n as u64);
        n
    }

    fn elapsed_ms(&self) -> u64 {
        self.position * 1000 / self.format.samples_per_second()
    }

    fn reset(&mut self) {
        self.control.resets.set(self.control.resets.get() + 1);
        self.ends = None;
        self.subsong = 0;
        self.position = 0;
    }
}

/// Host that records every notification.
#[derive(Debug, Default)]
pub struct RecordingHost {
    pub lengths: Vec<(u64, bool)>,
    pub title_changes: usize,
    pub notices: Vec<String>,
}

impl Host for RecordingHost {
    fn report_length(&mut self, seconds: u64, is_estimate: bool) {
        self.lengths.push((seconds, is_estimate));
    }

    fn notify_title_changed(&mut self) {
        self.title_changes += 1;
    }

    fn notice(&mut self, error: &SessionError) {
        self.notices.push(error.to_string());
    }
}

/// 8 kHz mono, so one second is 8000 samples.
pub const RATE: u32 = 8_000;

/// Pull `count` samples in blocks of `block`, stopping early at end of subsong.
pub fn pull<E: DecodeEngine, H: Host>(
    session: &mut sid_session::Session<E, H>,
    count: usize,
    block: usize,
) -> Vec<f32> {
    let mut out = Vec::with_capacity(count);
    let mut buf = vec![0.0f32; block];
    while out.len() < count {
        let want = block.min(count - out.len());
        let n = session.process(&mut buf[..want]).expect("process");
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buf[..n]);
    }
    out
}

/// Raw samples of `subsong` scaled to float, as a straight play-through yields them.
pub fn raw_f32(subsong: usize, start: u64, count: usize) -> Vec<f32> {
    (start..start + count as u64)
        .map(|p| f32::from(pcm_value(subsong, p)) / 32768.0)
        .collect()
}
