//! Sweep programs built on the generator facade.
//!
//! Each program drives the generator step by step from the host and writes
//! one CSV row per step (`elapsed_s,frequency_hz,amplitude_v`) to a caller
//! supplied writer.

use std::fs;
use std::io::Write;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use log::info;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::gen33220a::Gen33220a;
use crate::scpi::{Frequency, OutputLoad, Shape};
use crate::session::Session;

const MAX_POINTS: usize = 1_000_000;

/// One leg of a stepped frequency sweep at constant amplitude.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SweepSegment {
    pub start_hz: f64,
    pub stop_hz: f64,
    pub step_hz: f64,
    /// Time spent on each frequency.
    pub dwell_s: f64,
    pub amplitude_v: f64,
}

impl SweepSegment {
    /// Number of frequencies visited, both ends included.
    pub fn points(&self) -> Result<usize> {
        for (what, value) in [
            ("sweep start", self.start_hz),
            ("sweep stop", self.stop_hz),
            ("sweep step", self.step_hz),
            ("dwell time", self.dwell_s),
            ("sweep amplitude", self.amplitude_v),
        ] {
            if !value.is_finite() {
                return Err(Error::invalid(what, value));
            }
        }
        if self.step_hz <= 0.0 {
            return Err(Error::invalid("sweep step", self.step_hz));
        }
        if self.stop_hz < self.start_hz {
            return Err(Error::invalid(
                "sweep bounds",
                format!("{} -> {}", self.start_hz, self.stop_hz),
            ));
        }
        if self.dwell_s < 0.0 {
            return Err(Error::invalid("dwell time", self.dwell_s));
        }
        // Tolerate rounding so that e.g. 0.1 Hz steps still reach stop_hz.
        let steps = ((self.stop_hz - self.start_hz) / self.step_hz + 1e-9).floor();
        if steps >= MAX_POINTS as f64 {
            return Err(Error::invalid("sweep point count", steps));
        }
        Ok(steps as usize + 1)
    }

    pub fn frequencies(&self) -> Result<impl Iterator<Item = f64> + '_> {
        let points = self.points()?;
        Ok((0..points).map(move |i| self.start_hz + i as f64 * self.step_hz))
    }

    pub fn dwell(&self) -> Result<Duration> {
        Duration::try_from_secs_f64(self.dwell_s)
            .map_err(|_| Error::invalid("dwell time", self.dwell_s))
    }
}

/// Ordered list of sweep segments, loadable from TOML:
///
/// ```toml
/// [[segment]]
/// start_hz = 80
/// stop_hz = 1000
/// step_hz = 10
/// dwell_s = 5
/// amplitude_v = 0.3668
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SweepTable {
    #[serde(rename = "segment")]
    pub segments: Vec<SweepSegment>,
}

impl SweepTable {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_toml(&fs::read_to_string(path)?)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let table: SweepTable = toml::from_str(text)?;
        table.validate()?;
        Ok(table)
    }

    pub fn validate(&self) -> Result<()> {
        if self.segments.is_empty() {
            return Err(Error::Config("sweep table has no segments".into()));
        }
        for segment in &self.segments {
            segment.points()?;
        }
        Ok(())
    }

    /// The audio-band response table: 80 Hz to 150 kHz in six legs, with the
    /// base amplitudes scaled by `amp_coefficient`.
    pub fn audio_band(dwell_s: f64, amp_coefficient: f64) -> Self {
        let rows = [
            (80.0, 1_000.0, 10.0, 0.131),
            (1_000.0, 5_000.0, 100.0, 0.262),
            (5_000.0, 9_900.0, 100.0, 0.262),
            (10_000.0, 40_000.0, 1_000.0, 0.262),
            (40_000.0, 50_000.0, 1_000.0, 0.262),
            (50.0, 150_000.0, 1_000.0, 0.0857),
        ];
        SweepTable {
            segments: rows
                .iter()
                .map(|&(start_hz, stop_hz, step_hz, amplitude)| SweepSegment {
                    start_hz,
                    stop_hz,
                    step_hz,
                    dwell_s,
                    amplitude_v: amplitude * amp_coefficient,
                })
                .collect(),
        }
    }

    pub fn total_points(&self) -> Result<usize> {
        self.segments.iter().map(SweepSegment::points).sum()
    }
}

/// Output configuration applied before a sweep starts.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSetup {
    pub reset: bool,
    pub shape: Shape,
    pub frequency: Frequency,
    pub amplitude_v: f64,
    pub offset_v: Option<f64>,
    pub load: OutputLoad,
}

impl Default for OutputSetup {
    fn default() -> Self {
        OutputSetup {
            reset: false,
            shape: Shape::Sine,
            frequency: Frequency::Hz(1.0),
            amplitude_v: 0.0,
            offset_v: None,
            load: OutputLoad::Ohms(50.0),
        }
    }
}

/// Program the output and switch it on.
pub fn prepare_output<S: Session>(
    generator: &mut Gen33220a<S>,
    setup: &OutputSetup,
) -> Result<()> {
    if setup.reset {
        generator.reset()?;
    }
    generator.set_waveform(setup.shape)?;
    generator.set_freq(setup.frequency)?;
    generator.set_voltage(setup.amplitude_v)?;
    generator.set_output_load(setup.load)?;
    if let Some(offset) = setup.offset_v {
        generator.set_offset(offset)?;
    }
    generator.set_trigger_immediate()?;
    generator.trigger()?;
    generator.set_output_on()?;
    info!("Output on: {:?}", setup);
    Ok(())
}

struct SweepLog<W: Write> {
    out: W,
    start: Instant,
}

impl<W: Write> SweepLog<W> {
    fn new(mut out: W) -> Result<Self> {
        writeln!(out, "elapsed_s,frequency_hz,amplitude_v")?;
        Ok(SweepLog {
            out,
            start: Instant::now(),
        })
    }

    fn row(&mut self, frequency_hz: f64, amplitude_v: f64) -> Result<()> {
        writeln!(
            self.out,
            "{:.3},{},{}",
            self.start.elapsed().as_secs_f64(),
            frequency_hz,
            amplitude_v
        )?;
        Ok(())
    }

    fn finish(mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}

fn run_segment<S: Session, W: Write>(
    generator: &mut Gen33220a<S>,
    segment: &SweepSegment,
    log: &mut SweepLog<W>,
) -> Result<()> {
    let dwell = segment.dwell()?;
    let amplitude = generator.set_voltage(segment.amplitude_v)?.value;
    for frequency in segment.frequencies()? {
        let sent = match generator.set_freq(frequency)?.value {
            Frequency::Hz(hz) => hz,
            _ => frequency,
        };
        info!(
            "Set: {} Hz, amplitude: {} V, dwell: {} s",
            sent, amplitude, segment.dwell_s
        );
        log.row(sent, amplitude)?;
        thread::sleep(dwell);
    }
    Ok(())
}

/// Step the output frequency across one segment, then switch the output off.
pub fn run_step_sweep<S: Session, W: Write>(
    generator: &mut Gen33220a<S>,
    segment: &SweepSegment,
    out: W,
) -> Result<()> {
    info!("Starting step sweep with {} points", segment.points()?);
    let mut log = SweepLog::new(out)?;
    run_segment(generator, segment, &mut log)?;
    generator.set_output_off()?;
    info!("Step sweep completed");
    log.finish()
}

/// Run every segment of `table` in order, then switch the output off.
pub fn run_table_sweep<S: Session, W: Write>(
    generator: &mut Gen33220a<S>,
    table: &SweepTable,
    out: W,
) -> Result<()> {
    table.validate()?;
    info!(
        "Starting table sweep: {} segments, {} points",
        table.segments.len(),
        table.total_points()?
    );
    let mut log = SweepLog::new(out)?;
    for (i, segment) in table.segments.iter().enumerate() {
        info!("Segment {}: {:?}", i + 1, segment);
        run_segment(generator, segment, &mut log)?;
    }
    generator.set_output_off()?;
    info!("Table sweep completed");
    log.finish()
}

/// Raise the amplitude by `step_v` `steps` times, starting from `start_v`,
/// at a fixed frequency. The output is switched off at the end.
pub fn run_voltage_ramp<S: Session, W: Write>(
    generator: &mut Gen33220a<S>,
    frequency: Frequency,
    start_v: f64,
    step_v: f64,
    steps: usize,
    dwell: Duration,
    out: W,
) -> Result<()> {
    let frequency_hz = match generator.set_freq(frequency)?.value {
        Frequency::Hz(hz) => hz,
        _ => f64::NAN,
    };
    let mut log = SweepLog::new(out)?;
    for i in 0..=steps {
        // Round to mV so repeated additions do not drift.
        let target = ((start_v + i as f64 * step_v) * 1000.0).round() / 1000.0;
        let sent = generator.set_voltage(target)?;
        info!("Vout: {} V", sent.value);
        log.row(frequency_hz, sent.value)?;
        thread::sleep(dwell);
    }
    generator.set_output_off()?;
    log.finish()
}

/// Hand the sweep to the instrument and return once it is programmed.
pub fn run_native_sweep<S: Session>(
    generator: &mut Gen33220a<S>,
    start_hz: f64,
    stop_hz: f64,
    duration_s: f64,
) -> Result<()> {
    if !(duration_s > 0.0) {
        return Err(Error::invalid("sweep time", duration_s));
    }
    generator.sweep(start_hz, stop_hz, duration_s)?;
    info!(
        "Instrument sweep running: {} Hz -> {} Hz in {} s",
        start_hz, stop_hz, duration_s
    );
    Ok(())
}
