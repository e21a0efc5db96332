//! Min/max envelope rendering for clip waveforms.
//!
//! Audio is far denser than the pixels available to show it, so each pixel
//! column covers a run of samples and is drawn as one vertical bar spanning the
//! lowest and highest value in that run.

use crate::AudioArc;

/// Something a waveform can be painted onto.
pub trait Surface {
    fn fill_rect(&mut self, x: f32, y: f32, width: f32, height: f32);
}

/// One pixel column of the envelope.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColumnSpan {
    pub x: u32,
    pub y: f32,
    pub height: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WaveformView {
    pub width_px: u32,
    pub height_px: u32,
    pub start_offset_secs: f64,
    pub end_secs: f64,
    pub samples_per_pixel: usize,
    pub columns: Vec<ColumnSpan>,
}

impl WaveformView {
    pub fn draw(&self, surface: &mut impl Surface) {
        for column in &self.columns {
            surface.fill_rect(column.x as f32, column.y, 1.0, column.height);
        }
    }
}

/// Render the envelope of `[start_offset_secs, end_secs)` of channel 0 into
/// `width_px` columns of a `height_px` tall canvas.
///
/// Columns whose sample range lies past the end of the window produce no span.
pub fn render_waveform(
    audio: &AudioArc,
    width_px: u32,
    height_px: u32,
    start_offset_secs: f64,
    end_secs: f64,
) -> WaveformView {
    let sample_rate = audio.sample_rate() as f64;
    let frames = audio.frames();
    let channels = audio.channels() as usize;
    let samples = audio.samples();

    let start_sample = ((start_offset_secs.max(0.0) * sample_rate).floor() as usize).min(frames);
    let end_sample = ((end_secs.max(0.0) * sample_rate).floor() as usize)
        .min(frames)
        .max(start_sample);

    let span = end_sample - start_sample;
    let samples_per_pixel = if width_px == 0 {
        0
    } else {
        span.div_ceil(width_px as usize)
    };

    let amp = height_px as f32 / 2.0;
    let mut columns = Vec::with_capacity(width_px as usize);

    if samples_per_pixel > 0 {
        for x in 0..width_px {
            let from = start_sample + x as usize * samples_per_pixel;
            if from >= end_sample {
                break;
            }
            let to = (from + samples_per_pixel).min(end_sample);

            let mut min = 1.0f32;
            let mut max = -1.0f32;
            for frame in from..to {
                let datum = samples[frame * channels];
                min = min.min(datum);
                max = max.max(datum);
            }

            columns.push(ColumnSpan {
                x,
                y: (1.0 + min) * amp,
                height: ((max - min) * amp).max(1.0),
            });
        }
    }

    WaveformView {
        width_px,
        height_px,
        start_offset_secs,
        end_secs,
        samples_per_pixel,
        columns,
    }
}
