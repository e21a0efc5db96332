//! Conversions between pixel offsets, seconds and musical positions.

pub const DEFAULT_BPM: f64 = 120.0;
pub const MIN_BPM: f64 = 20.0;
pub const MAX_BPM: f64 = 300.0;
pub const DEFAULT_PIXELS_PER_SECOND: f64 = 100.0;

/// Sub-beat readout resolution: always sixteenth notes, whatever the snap
/// resolution is.
const SUB_BEATS_PER_BEAT: f64 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSignature {
    pub numerator: u32,
    pub denominator: u32,
}

impl TimeSignature {
    pub fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    pub fn beats_per_bar(&self) -> u32 {
        self.numerator
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self::new(4, 4)
    }
}

impl From<(u32, u32)> for TimeSignature {
    fn from((numerator, denominator): (u32, u32)) -> Self {
        Self::new(numerator, denominator)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayMode {
    #[default]
    Beats,
    Time,
}

/// Tempo and zoom: everything needed to map between pixels, seconds and beats.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeContext {
    bpm: f64,
    time_signature: TimeSignature,
    pixels_per_second: f64,
}

impl TimeContext {
    /// `pixels_per_second` must be positive; `bpm` is clamped to 20..=300.
    pub fn new(bpm: f64, time_signature: impl Into<TimeSignature>, pixels_per_second: f64) -> Self {
        Self {
            bpm: clamp_bpm(bpm),
            time_signature: time_signature.into(),
            pixels_per_second,
        }
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    /// Set the tempo, clamped to 20..=300. Returns the value applied.
    /// Existing clip positions are pixels and do not move.
    pub fn set_bpm(&mut self, bpm: f64) -> f64 {
        self.bpm = clamp_bpm(bpm);
        self.bpm
    }

    /// Set the tempo from user text. Only the leading integer counts and
    /// anything unparsable falls back to 120.
    pub fn set_bpm_from_input(&mut self, input: &str) -> f64 {
        self.set_bpm(parse_bpm(input))
    }

    pub fn time_signature(&self) -> TimeSignature {
        self.time_signature
    }

    pub fn beats_per_bar(&self) -> u32 {
        self.time_signature.beats_per_bar()
    }

    pub fn pixels_per_second(&self) -> f64 {
        self.pixels_per_second
    }

    pub fn pixels_per_beat(&self) -> f64 {
        self.pixels_per_second * 60.0 / self.bpm
    }

    pub fn pixels_per_bar(&self) -> f64 {
        self.pixels_per_beat() * self.beats_per_bar() as f64
    }

    pub fn pixels_to_seconds(&self, px: f64) -> f64 {
        px / self.pixels_per_second
    }

    pub fn seconds_to_pixels(&self, seconds: f64) -> f64 {
        seconds * self.pixels_per_second
    }

    pub fn pixels_to_beats(&self, px: f64) -> f64 {
        px / self.pixels_per_beat()
    }

    pub fn beats_to_pixels(&self, beats: f64) -> f64 {
        beats * self.pixels_per_beat()
    }

    pub fn format_position(&self, px: f64) -> MusicalPosition {
        let total_beats = self.pixels_to_beats(px.max(0.0));
        let beats_per_bar = self.beats_per_bar() as f64;

        MusicalPosition {
            bar: (total_beats / beats_per_bar).floor() as u32 + 1,
            beat: (total_beats % beats_per_bar).floor() as u32 + 1,
            sub_beat: ((total_beats % 1.0) * SUB_BEATS_PER_BEAT).floor() as u32,
        }
    }

    pub fn format_clock(&self, px: f64) -> ClockPosition {
        let total_seconds = self.pixels_to_seconds(px.max(0.0));
        ClockPosition {
            minutes: (total_seconds / 60.0).floor() as u32,
            seconds: (total_seconds % 60.0).floor() as u32,
            centiseconds: ((total_seconds % 1.0) * 100.0).floor() as u32,
        }
    }

    pub fn display(&self, px: f64, mode: DisplayMode) -> String {
        match mode {
            DisplayMode::Beats => self.format_position(px).to_string(),
            DisplayMode::Time => self.format_clock(px).to_string(),
        }
    }
}

impl Default for TimeContext {
    fn default() -> Self {
        Self::new(DEFAULT_BPM, TimeSignature::default(), DEFAULT_PIXELS_PER_SECOND)
    }
}

fn clamp_bpm(bpm: f64) -> f64 {
    if bpm.is_finite() {
        bpm.clamp(MIN_BPM, MAX_BPM)
    } else {
        DEFAULT_BPM
    }
}

fn parse_bpm(input: &str) -> f64 {
    let trimmed = input.trim_start();
    let sign_len = usize::from(trimmed.starts_with(['-', '+']));
    let digits = trimmed[sign_len..]
        .find(|c: char| !c.is_ascii_digit())
        .map_or(trimmed.len(), |end| end + sign_len);

    match trimmed[..digits].parse::<i64>() {
        Ok(0) | Err(_) => DEFAULT_BPM,
        Ok(value) => value as f64,
    }
}

/// `bar:beat:sub-beat`, all one-based except the sub-beat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MusicalPosition {
    pub bar: u32,
    pub beat: u32,
    pub sub_beat: u32,
}

impl std::fmt::Display for MusicalPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.bar, self.beat, self.sub_beat)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockPosition {
    pub minutes: u32,
    pub seconds: u32,
    pub centiseconds: u32,
}

impl std::fmt::Display for ClockPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}",
            self.minutes, self.seconds, self.centiseconds
        )
    }
}
