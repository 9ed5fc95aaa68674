//! Command facade for the Agilent/Keysight 33220A function generator.
//!
//! Each method maps one logical operation to SCPI text sent through a
//! [`Session`]. Numeric parameters with a [`Range`](crate::range::Range) are
//! clamped, never rejected; the returned [`Clamped`] says whether the value
//! sent differs from the value asked for. The instrument's own state is
//! authoritative and not mirrored here.

use std::thread;
use std::time::Duration;

use log::{debug, info};

use crate::config::GeneratorConfig;
use crate::error::{Error, Result};
use crate::range::{self, Clamped};
use crate::scpi::{
    self, BurstMode, Command, Frequency, GatePolarity, Identity, Modulation, ModulationShape,
    ModulationSource, OutputLoad, Shape, Slope, SystemError, TriggerSource,
};
use crate::session::{self, Session};

const STATE_NAME_MAX: usize = 12;
const CAL_CODE_MAX: usize = 12;
const CAL_STRING_MAX: usize = 40;

pub struct Gen33220a<S: Session> {
    session: S,
    idn: String,
    closed: bool,
}

impl Gen33220a<Box<dyn Session>> {
    /// Open the session described by `config` and connect to it.
    pub fn open(config: &GeneratorConfig) -> Result<Self> {
        config.validate()?;
        Self::new(session::open(config)?)
    }
}

impl<S: Session> Gen33220a<S> {
    /// Take over an open session: clear the bus and check the instrument
    /// answers `*IDN?`.
    pub fn new(mut session: S) -> Result<Self> {
        session.clear()?;
        let idn = session.query(&Command::Identify.to_string())?;
        let idn = idn.trim().to_string();
        info!("Connected to: {}", idn);
        Ok(Gen33220a {
            session,
            idn,
            closed: false,
        })
    }

    /// Identification string read at connection time.
    pub fn idn(&self) -> &str {
        &self.idn
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    pub fn into_session(self) -> S {
        self.session
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn link(&mut self) -> Result<&mut S> {
        if self.closed {
            return Err(Error::SessionClosed);
        }
        Ok(&mut self.session)
    }

    fn send(&mut self, command: Command) -> Result<()> {
        let text = command.to_string();
        debug!("write: {}", text);
        self.link()?.write(&text)
    }

    fn ask(&mut self, command: Command) -> Result<String> {
        let text = command.to_string();
        let response = self.link()?.query(&text)?;
        debug!("query: {} -> {}", text, response.trim_end());
        Ok(response)
    }

    /// Unvalidated access for commands this facade does not wrap.
    pub fn raw(&mut self) -> RawAccess<'_, S> {
        RawAccess { generator: self }
    }

    // Waveform

    pub fn conf_pulse(&mut self) -> Result<()> {
        self.set_waveform(Shape::Pulse)
    }

    pub fn conf_square(&mut self) -> Result<()> {
        self.set_waveform(Shape::Square)
    }

    pub fn conf_sinusoid(&mut self) -> Result<()> {
        self.set_waveform(Shape::Sine)
    }

    pub fn conf_dc(&mut self) -> Result<()> {
        self.set_waveform(Shape::Dc)
    }

    pub fn set_waveform(&mut self, shape: Shape) -> Result<()> {
        self.send(Command::Function(shape))
    }

    /// Set the output frequency.
    ///
    /// Accepts hertz (`250.0`, `80`) or [`Frequency::Minimum`] /
    /// [`Frequency::Maximum`]; strings such as `"min"` parse into the latter.
    /// Hertz values are clamped to the sine range of the instrument.
    pub fn set_freq(&mut self, frequency: impl Into<Frequency>) -> Result<Clamped<Frequency>> {
        let frequency = match frequency.into() {
            Frequency::Hz(hz) => range::FREQUENCY.check(hz)?.map(Frequency::Hz),
            limit => Clamped::exact(limit),
        };
        self.send(Command::Frequency(frequency.value))?;
        Ok(frequency)
    }

    /// Amplitude in volts, clamped to [-10, 10].
    pub fn set_voltage(&mut self, volts: f64) -> Result<Clamped<f64>> {
        let volts = range::VOLTAGE.check(volts)?;
        self.send(Command::Voltage(volts.value))?;
        Ok(volts)
    }

    /// DC offset in volts, clamped to [-5, 5].
    pub fn set_offset(&mut self, volts: f64) -> Result<Clamped<f64>> {
        let volts = range::OFFSET.check(volts)?;
        self.send(Command::Offset(volts.value))?;
        Ok(volts)
    }

    // Output

    pub fn set_output_on(&mut self) -> Result<()> {
        self.send(Command::Output(true))
    }

    pub fn set_output_off(&mut self) -> Result<()> {
        self.send(Command::Output(false))
    }

    /// Expected load termination. Resistances are clamped to [1, 10000] ohm;
    /// zero ohm is not a load and fails with [`Error::InvalidLoad`].
    pub fn set_output_load(&mut self, load: OutputLoad) -> Result<Clamped<OutputLoad>> {
        let load = match load {
            OutputLoad::Ohms(ohms) if ohms == 0.0 || ohms.is_nan() => {
                return Err(Error::InvalidLoad);
            }
            OutputLoad::Ohms(ohms) => range::LOAD.check(ohms)?.map(OutputLoad::Ohms),
            sentinel => Clamped::exact(sentinel),
        };
        self.send(Command::OutputLoad(load.value))?;
        Ok(load)
    }

    // Trigger

    pub fn set_trigger_immediate(&mut self) -> Result<()> {
        self.set_trigger_source(TriggerSource::Immediate)
    }

    pub fn set_trigger_source(&mut self, source: TriggerSource) -> Result<()> {
        self.send(Command::TriggerSource(source))
    }

    pub fn set_trigger_slope(&mut self, slope: Slope) -> Result<()> {
        self.send(Command::TriggerSlope(slope))
    }

    /// Enable or disable the rear-panel trigger output and set its edge.
    pub fn set_trigger_output(&mut self, enable: bool, slope: Slope) -> Result<()> {
        self.send(Command::TriggerOutput(enable))?;
        self.send(Command::TriggerOutputSlope(slope))
    }

    /// Bus trigger (`*TRG`).
    pub fn trigger(&mut self) -> Result<()> {
        self.send(Command::BusTrigger)
    }

    // Sweep

    /// Start the instrument's own frequency sweep from `start_hz` to
    /// `stop_hz` over `duration_s` seconds.
    ///
    /// The sweep is switched off while it is reprogrammed. Individual steps
    /// are not verified.
    pub fn sweep(&mut self, start_hz: f64, stop_hz: f64, duration_s: f64) -> Result<()> {
        self.send(Command::SweepState(false))?;
        self.send(Command::SweepStart(start_hz))?;
        self.send(Command::SweepStop(stop_hz))?;
        self.send(Command::SweepTime(duration_s))?;
        self.send(Command::SweepState(true))
    }

    pub fn stop_sweep(&mut self) -> Result<()> {
        self.send(Command::SweepState(false))
    }

    pub fn set_sweep_center(&mut self, hz: f64) -> Result<()> {
        self.send(Command::FrequencyCenter(hz))
    }

    pub fn set_sweep_span(&mut self, hz: f64) -> Result<()> {
        self.send(Command::FrequencySpan(hz))
    }

    pub fn set_marker(&mut self, enable: bool) -> Result<()> {
        self.send(Command::Marker(enable))
    }

    pub fn set_marker_frequency(&mut self, hz: f64) -> Result<()> {
        self.send(Command::MarkerFrequency(hz))
    }

    // Pulse

    pub fn set_pulse_duty_cycle(&mut self, percent: f64) -> Result<()> {
        self.send(Command::PulseDutyCycle(percent))
    }

    pub fn set_pulse_transition(&mut self, seconds: f64) -> Result<()> {
        self.send(Command::PulseTransition(seconds))
    }

    pub fn set_pulse_period(&mut self, seconds: f64) -> Result<()> {
        self.send(Command::PulsePeriod(seconds))
    }

    pub fn set_pulse_width(&mut self, seconds: f64) -> Result<()> {
        self.send(Command::PulseWidth(seconds))
    }

    // Modulation

    pub fn set_modulation(&mut self, modulation: Modulation, enable: bool) -> Result<()> {
        self.send(Command::ModulationState(modulation, enable))
    }

    pub fn set_modulation_source(
        &mut self,
        modulation: Modulation,
        source: ModulationSource,
    ) -> Result<()> {
        self.send(Command::ModulationSource(modulation, source))
    }

    /// Shape of the internal modulating signal. FSK has none and is rejected.
    pub fn set_modulation_function(
        &mut self,
        modulation: Modulation,
        shape: ModulationShape,
    ) -> Result<()> {
        if modulation == Modulation::Fsk {
            return Err(Error::invalid("modulation for internal function", modulation));
        }
        self.send(Command::ModulationFunction(modulation, shape))
    }

    /// Frequency of the internal modulating signal; for FSK this is the hop rate.
    pub fn set_modulation_frequency(&mut self, modulation: Modulation, hz: f64) -> Result<()> {
        match modulation {
            Modulation::Fsk => self.send(Command::FskRate(hz)),
            other => self.send(Command::ModulationFrequency(other, hz)),
        }
    }

    pub fn set_am_depth(&mut self, percent: f64) -> Result<()> {
        self.send(Command::AmDepth(percent))
    }

    pub fn set_fm_deviation(&mut self, hz: f64) -> Result<()> {
        self.send(Command::FmDeviation(hz))
    }

    pub fn set_fsk_hop_frequency(&mut self, hz: f64) -> Result<()> {
        self.send(Command::FskFrequency(hz))
    }

    pub fn set_fsk_rate(&mut self, hz: f64) -> Result<()> {
        self.send(Command::FskRate(hz))
    }

    // Burst

    pub fn set_burst(&mut self, enable: bool) -> Result<()> {
        self.send(Command::BurstState(enable))
    }

    pub fn set_burst_mode(&mut self, mode: BurstMode) -> Result<()> {
        self.send(Command::BurstMode(mode))
    }

    pub fn set_burst_gate_polarity(&mut self, polarity: GatePolarity) -> Result<()> {
        self.send(Command::BurstGatePolarity(polarity))
    }

    pub fn set_burst_cycles(&mut self, cycles: u32) -> Result<()> {
        if cycles == 0 {
            return Err(Error::invalid("burst cycle count", cycles));
        }
        self.send(Command::BurstCycles(cycles))
    }

    pub fn set_burst_period(&mut self, seconds: f64) -> Result<()> {
        self.send(Command::BurstPeriod(seconds))
    }

    pub fn set_burst_phase(&mut self, degrees: f64) -> Result<()> {
        self.send(Command::BurstPhase(degrees))
    }

    // Stored states. Slot 0 holds the power-down state and can only be recalled.

    pub fn save_state(&mut self, slot: u8) -> Result<()> {
        if !(1..=4).contains(&slot) {
            return Err(Error::invalid("state slot", slot));
        }
        self.send(Command::SaveState(slot))
    }

    pub fn recall_state(&mut self, slot: u8) -> Result<()> {
        if slot > 4 {
            return Err(Error::invalid("state slot", slot));
        }
        self.send(Command::RecallState(slot))
    }

    /// Name a stored state: up to 12 letters, digits or underscores,
    /// starting with a letter.
    pub fn name_state(&mut self, slot: u8, name: &str) -> Result<()> {
        if slot > 4 {
            return Err(Error::invalid("state slot", slot));
        }
        let valid = name.len() <= STATE_NAME_MAX
            && name.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
            && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid {
            return Err(Error::invalid("state name", name));
        }
        self.send(Command::StateName(slot, name.to_string()))
    }

    pub fn set_auto_recall(&mut self, enable: bool) -> Result<()> {
        self.send(Command::AutoRecall(enable))
    }

    // System

    pub fn reset(&mut self) -> Result<()> {
        self.send(Command::Reset)
    }

    /// Bus clear (device clear) without closing the session. Aborts a pending
    /// command and discards unread replies.
    pub fn clear(&mut self) -> Result<()> {
        debug!("bus clear");
        self.link()?.clear()
    }

    /// Clear the status registers and the error queue (`*CLS`).
    pub fn clear_status(&mut self) -> Result<()> {
        self.send(Command::ClearStatus)
    }

    /// Sound the beeper `n_times`, waiting `delay_s` (clamped to [0, 5]
    /// seconds) after each beep. Blocks the calling thread throughout.
    pub fn beep(&mut self, delay_s: f64, n_times: u32) -> Result<Clamped<f64>> {
        let delay = range::BEEP_DELAY.check(delay_s)?;
        for _ in 0..n_times {
            self.send(Command::Beep)?;
            thread::sleep(Duration::from_secs_f64(delay.value));
        }
        Ok(delay)
    }

    pub fn identify(&mut self) -> Result<Identity> {
        self.ask(Command::Identify)?.parse()
    }

    /// Pop the oldest entry of the instrument error queue.
    pub fn system_error(&mut self) -> Result<SystemError> {
        self.ask(Command::SystemError)?.parse()
    }

    pub fn system_version(&mut self) -> Result<String> {
        Ok(self.ask(Command::SystemVersion)?.trim().to_string())
    }

    // Measurement read-back

    /// Raw reply to `MEASure:VOLTage:DC? AUTO`.
    pub fn measure_voltage(&mut self) -> Result<String> {
        self.ask(Command::MeasureVoltageDc)
    }

    pub fn measure_voltage_value(&mut self) -> Result<f64> {
        scpi::parse_number(&self.measure_voltage()?)
    }

    /// Raw reply to `READ?`.
    pub fn cmd_read(&mut self) -> Result<String> {
        self.ask(Command::Read)
    }

    // Calibration

    pub fn set_calibration_secure(&mut self, secure: bool, code: &str) -> Result<()> {
        let valid = !code.is_empty()
            && code.len() <= CAL_CODE_MAX
            && code.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid {
            return Err(Error::invalid("calibration code", code));
        }
        self.send(Command::CalibrationSecure(secure, code.to_string()))
    }

    pub fn calibration_count(&mut self) -> Result<u32> {
        let response = self.ask(Command::CalibrationCount)?;
        response
            .trim()
            .parse()
            .map_err(|_| Error::Response(response))
    }

    pub fn set_calibration_message(&mut self, message: &str) -> Result<()> {
        if message.len() > CAL_STRING_MAX || message.contains('"') || !message.is_ascii() {
            return Err(Error::invalid("calibration message", message));
        }
        self.send(Command::CalibrationString(message.to_string()))
    }

    pub fn calibration_message(&mut self) -> Result<String> {
        let response = self.ask(Command::CalibrationStringQuery)?;
        Ok(response.trim().trim_matches('"').to_string())
    }

    /// Bus clear, then close the session. Every later call fails with
    /// [`Error::SessionClosed`].
    pub fn close(&mut self) -> Result<()> {
        let session = self.link()?;
        let cleared = session.clear();
        let closed = session.close();
        self.closed = true;
        info!("Disconnected from: {}", self.idn);
        cleared.and(closed)
    }
}

/// Passthrough of arbitrary SCPI text, bypassing all validation.
pub struct RawAccess<'a, S: Session> {
    generator: &'a mut Gen33220a<S>,
}

impl<S: Session> RawAccess<'_, S> {
    pub fn cmd_write(&mut self, text: &str) -> Result<()> {
        debug!("raw write: {}", text);
        self.generator.link()?.write(text)
    }

    pub fn cmd_query(&mut self, text: &str) -> Result<String> {
        debug!("raw query: {}", text);
        self.generator.link()?.query(text)
    }
}
