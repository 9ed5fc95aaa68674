//! SCPI vocabulary of the 33220A.
//!
//! Every command the driver can send is a [`Command`] variant; its `Display`
//! implementation yields the exact text written to the instrument. Keyword
//! parameters are enums so a malformed selector cannot reach the wire. Their
//! `FromStr` implementations accept the SCPI short or long form (any case)
//! and fail with [`Error::InvalidArgument`] otherwise.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Matches `input` against a mixed-case SCPI mnemonic such as `MINimum`,
/// accepting either the short (`MIN`) or the long (`MINIMUM`) form.
pub fn keyword_matches(input: &str, mnemonic: &str) -> bool {
    let short: String = mnemonic
        .chars()
        .filter(|c| !c.is_ascii_lowercase())
        .collect();
    let input = input.trim();
    input.eq_ignore_ascii_case(mnemonic) || input.eq_ignore_ascii_case(&short)
}

macro_rules! keyword_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $what:literal {
            $($variant:ident => $mnemonic:literal $(| $alias:literal)*),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn mnemonic(self) -> &'static str {
                match self {
                    $($name::$variant => $mnemonic),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.mnemonic())
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                $(
                    if keyword_matches(s, $mnemonic) $(|| s.trim().eq_ignore_ascii_case($alias))* {
                        return Ok($name::$variant);
                    }
                )+
                Err(Error::invalid($what, s))
            }
        }
    };
}

keyword_enum! {
    /// Output function selected with `FUNCtion`.
    Shape, "waveform shape" {
        Sine => "SIN" | "sine" | "sinusoid",
        Square => "SQU" | "square",
        Ramp => "RAMP",
        Pulse => "PULS" | "pulse",
        Noise => "NOISE" | "nois",
        Dc => "DC",
        User => "USER",
    }
}

keyword_enum! {
    TriggerSource, "trigger source" {
        Immediate => "IMMediate",
        External => "EXTernal",
        Bus => "BUS",
    }
}

keyword_enum! {
    Slope, "slope" {
        Positive => "POSitive",
        Negative => "NEGative",
    }
}

keyword_enum! {
    /// Modulation subsystems; each one is also the command root.
    Modulation, "modulation" {
        Am => "AM",
        Fm => "FM",
        Pm => "PM",
        Fsk => "FSKey",
        Pwm => "PWM",
    }
}

keyword_enum! {
    ModulationSource, "modulation source" {
        Internal => "INTernal",
        External => "EXTernal",
    }
}

keyword_enum! {
    /// Shape of the internal modulating waveform.
    ModulationShape, "modulating function" {
        Sinusoid => "SINusoid",
        Square => "SQUare",
        Ramp => "RAMP",
        NegativeRamp => "NRAMp",
        Triangle => "TRIangle",
        Noise => "NOISe",
        User => "USER",
    }
}

keyword_enum! {
    BurstMode, "burst mode" {
        Triggered => "TRIGgered",
        Gated => "GATed",
    }
}

keyword_enum! {
    GatePolarity, "gate polarity" {
        Normal => "NORMal",
        Inverted => "INVerted",
    }
}

/// Frequency setting: a value in hertz or one of the instrument limits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Frequency {
    Hz(f64),
    Minimum,
    Maximum,
}

impl From<f64> for Frequency {
    fn from(hz: f64) -> Self {
        Frequency::Hz(hz)
    }
}

impl From<i32> for Frequency {
    fn from(hz: i32) -> Self {
        Frequency::Hz(f64::from(hz))
    }
}

impl From<u32> for Frequency {
    fn from(hz: u32) -> Self {
        Frequency::Hz(f64::from(hz))
    }
}

impl FromStr for Frequency {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if keyword_matches(s, "MINimum") {
            return Ok(Frequency::Minimum);
        }
        if keyword_matches(s, "MAXimum") {
            return Ok(Frequency::Maximum);
        }
        s.trim()
            .parse::<f64>()
            .ok()
            .filter(|hz| hz.is_finite())
            .map(Frequency::Hz)
            .ok_or_else(|| Error::invalid("frequency", s))
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frequency::Hz(hz) => write!(f, "{hz}"),
            Frequency::Minimum => f.write_str("MINimum"),
            Frequency::Maximum => f.write_str("MAXimum"),
        }
    }
}

/// Expected output termination.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputLoad {
    Ohms(f64),
    Infinite,
    Minimum,
    Maximum,
}

impl OutputLoad {
    /// Builds a load from the `(ohms, text)` pair of the script-style API.
    ///
    /// A non-zero resistance wins; with zero ohms the text must name one of
    /// `inf`, `min` or `max`.
    pub fn from_legacy(ohms: f64, text: Option<&str>) -> Result<Self> {
        if ohms != 0.0 {
            return Ok(OutputLoad::Ohms(ohms));
        }
        match text.map(str::parse::<OutputLoad>) {
            Some(Ok(load)) if !matches!(load, OutputLoad::Ohms(_)) => Ok(load),
            _ => Err(Error::InvalidLoad),
        }
    }
}

impl FromStr for OutputLoad {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if keyword_matches(s, "INFinity") {
            return Ok(OutputLoad::Infinite);
        }
        if keyword_matches(s, "MINimum") {
            return Ok(OutputLoad::Minimum);
        }
        if keyword_matches(s, "MAXimum") {
            return Ok(OutputLoad::Maximum);
        }
        match s.trim().parse::<f64>() {
            Ok(ohms) if ohms.is_finite() && ohms != 0.0 => Ok(OutputLoad::Ohms(ohms)),
            _ => Err(Error::InvalidLoad),
        }
    }
}

impl fmt::Display for OutputLoad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputLoad::Ohms(ohms) => write!(f, "{ohms}"),
            OutputLoad::Infinite => f.write_str("INFinity"),
            OutputLoad::Minimum => f.write_str("MINimum"),
            OutputLoad::Maximum => f.write_str("MAXimum"),
        }
    }
}

fn on_off(state: bool) -> &'static str {
    if state { "ON" } else { "OFF" }
}

/// One SCPI program message understood by the 33220A.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Identify,
    Reset,
    ClearStatus,
    BusTrigger,
    Function(Shape),
    Frequency(Frequency),
    Voltage(f64),
    Offset(f64),
    Output(bool),
    OutputLoad(OutputLoad),
    TriggerSource(TriggerSource),
    TriggerSlope(Slope),
    TriggerOutput(bool),
    TriggerOutputSlope(Slope),
    SweepState(bool),
    SweepStart(f64),
    SweepStop(f64),
    SweepTime(f64),
    FrequencyCenter(f64),
    FrequencySpan(f64),
    Marker(bool),
    MarkerFrequency(f64),
    PulseDutyCycle(f64),
    PulseTransition(f64),
    PulsePeriod(f64),
    PulseWidth(f64),
    ModulationState(Modulation, bool),
    ModulationSource(Modulation, ModulationSource),
    ModulationFunction(Modulation, ModulationShape),
    ModulationFrequency(Modulation, f64),
    AmDepth(f64),
    FmDeviation(f64),
    FskFrequency(f64),
    FskRate(f64),
    BurstState(bool),
    BurstMode(BurstMode),
    BurstGatePolarity(GatePolarity),
    BurstCycles(u32),
    BurstPeriod(f64),
    BurstPhase(f64),
    SaveState(u8),
    RecallState(u8),
    StateName(u8, String),
    AutoRecall(bool),
    Beep,
    MeasureVoltageDc,
    Read,
    SystemError,
    SystemVersion,
    CalibrationSecure(bool, String),
    CalibrationCount,
    CalibrationString(String),
    CalibrationStringQuery,
}

/// Whether the instrument answers `text`. Any SCPI message containing a
/// query header (`?`) produces a reply, wherever the header sits.
pub fn is_query(text: &str) -> bool {
    text.contains('?')
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Identify => f.write_str("*IDN?"),
            Command::Reset => f.write_str("*RST"),
            Command::ClearStatus => f.write_str("*CLS"),
            Command::BusTrigger => f.write_str("*TRG"),
            Command::Function(shape) => write!(f, "FUNCtion {shape}"),
            Command::Frequency(freq) => write!(f, "FREQuency {freq}"),
            Command::Voltage(v) => write!(f, "VOLTage {v}"),
            Command::Offset(v) => write!(f, "VOLTage:OFFSet {v}"),
            Command::Output(on) => write!(f, "OUTPut {}", on_off(*on)),
            Command::OutputLoad(load) => write!(f, "OUTPut:LOAD {load}"),
            Command::TriggerSource(src) => write!(f, "TRIGger:SOURce {src}"),
            Command::TriggerSlope(slope) => write!(f, "TRIGger:SLOPe {slope}"),
            Command::TriggerOutput(on) => write!(f, "OUTPut:TRIGger {}", on_off(*on)),
            Command::TriggerOutputSlope(slope) => write!(f, "OUTPut:TRIGger:SLOPe {slope}"),
            Command::SweepState(on) => write!(f, "SWEep:STATe {}", on_off(*on)),
            Command::SweepStart(hz) => write!(f, "SWEep:STARt {hz}"),
            Command::SweepStop(hz) => write!(f, "SWEep:STOP {hz}"),
            Command::SweepTime(s) => write!(f, "SWEep:TIME {s}"),
            Command::FrequencyCenter(hz) => write!(f, "FREQuency:CENTer {hz}"),
            Command::FrequencySpan(hz) => write!(f, "FREQuency:SPAN {hz}"),
            Command::Marker(on) => write!(f, "MARKer {}", on_off(*on)),
            Command::MarkerFrequency(hz) => write!(f, "MARKer:FREQuency {hz}"),
            Command::PulseDutyCycle(pct) => write!(f, "FUNCtion:PULSe:DCYCle {pct}"),
            Command::PulseTransition(s) => write!(f, "FUNCtion:PULSe:TRANsition {s}"),
            Command::PulsePeriod(s) => write!(f, "PULSe:PERiod {s}"),
            Command::PulseWidth(s) => write!(f, "PULSe:WIDTh {s}"),
            Command::ModulationState(m, on) => write!(f, "{m}:STATe {}", on_off(*on)),
            Command::ModulationSource(m, src) => write!(f, "{m}:SOURce {src}"),
            Command::ModulationFunction(m, shape) => write!(f, "{m}:INTernal:FUNCtion {shape}"),
            Command::ModulationFrequency(m, hz) => write!(f, "{m}:INTernal:FREQuency {hz}"),
            Command::AmDepth(pct) => write!(f, "AM:DEPTh {pct}"),
            Command::FmDeviation(hz) => write!(f, "FM:DEViation {hz}"),
            Command::FskFrequency(hz) => write!(f, "FSKey:FREQuency {hz}"),
            Command::FskRate(hz) => write!(f, "FSKey:INTernal:RATE {hz}"),
            Command::BurstState(on) => write!(f, "BURSt:STATe {}", on_off(*on)),
            Command::BurstMode(mode) => write!(f, "BURSt:MODE {mode}"),
            Command::BurstGatePolarity(pol) => write!(f, "BURSt:GATE:POLarity {pol}"),
            Command::BurstCycles(n) => write!(f, "BURSt:NCYCles {n}"),
            Command::BurstPeriod(s) => write!(f, "BURSt:INTernal:PERiod {s}"),
            Command::BurstPhase(deg) => write!(f, "BURSt:PHASe {deg}"),
            Command::SaveState(slot) => write!(f, "*SAV {slot}"),
            Command::RecallState(slot) => write!(f, "*RCL {slot}"),
            Command::StateName(slot, name) => write!(f, "MEMory:STATe:NAME {slot},{name}"),
            Command::AutoRecall(on) => write!(f, "MEMory:STATe:RECall:AUTO {}", on_off(*on)),
            Command::Beep => f.write_str("SYSTem:BEEP"),
            Command::MeasureVoltageDc => f.write_str("MEASure:VOLTage:DC? AUTO"),
            Command::Read => f.write_str("READ?"),
            Command::SystemError => f.write_str("SYSTem:ERRor?"),
            Command::SystemVersion => f.write_str("SYSTem:VERSion?"),
            Command::CalibrationSecure(on, code) => {
                write!(f, "CALibration:SECure:STATe {},{code}", on_off(*on))
            }
            Command::CalibrationCount => f.write_str("CALibration:COUNt?"),
            Command::CalibrationString(msg) => write!(f, "CALibration:STRing \"{msg}\""),
            Command::CalibrationStringQuery => f.write_str("CALibration:STRing?"),
        }
    }
}

/// Parsed `*IDN?` reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub manufacturer: String,
    pub model: String,
    pub serial: String,
    pub firmware: String,
}

impl FromStr for Identity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let fields: Vec<&str> = s.trim().splitn(4, ',').map(str::trim).collect();
        match fields.as_slice() {
            [manufacturer, model, serial, firmware] => Ok(Identity {
                manufacturer: manufacturer.to_string(),
                model: model.to_string(),
                serial: serial.to_string(),
                firmware: firmware.to_string(),
            }),
            _ => Err(Error::Response(s.to_string())),
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} (serial {}, firmware {})",
            self.manufacturer, self.model, self.serial, self.firmware
        )
    }
}

/// Entry popped from the instrument error queue, e.g. `-113,"Undefined header"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemError {
    pub code: i32,
    pub message: String,
}

impl SystemError {
    /// Code 0 means the queue was empty.
    pub fn is_none(&self) -> bool {
        self.code == 0
    }
}

impl FromStr for SystemError {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (code, message) = s
            .trim()
            .split_once(',')
            .ok_or_else(|| Error::Response(s.to_string()))?;
        let code = code
            .trim()
            .parse::<i32>()
            .map_err(|_| Error::Response(s.to_string()))?;
        Ok(SystemError {
            code,
            message: message.trim().trim_matches('"').to_string(),
        })
    }
}

/// Parses a numeric reply such as `+1.23450000E+00`.
pub fn parse_number(response: &str) -> Result<f64> {
    response
        .trim()
        .parse::<f64>()
        .map_err(|_| Error::Response(response.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_commands_render_exactly() {
        let cases = [
            (Command::Identify, "*IDN?"),
            (Command::Reset, "*RST"),
            (Command::ClearStatus, "*CLS"),
            (Command::BusTrigger, "*TRG"),
            (Command::Function(Shape::Pulse), "FUNCtion PULS"),
            (Command::Function(Shape::Noise), "FUNCtion NOISE"),
            (Command::Frequency(Frequency::Minimum), "FREQuency MINimum"),
            (Command::Frequency(Frequency::Maximum), "FREQuency MAXimum"),
            (Command::Frequency(Frequency::Hz(250.0)), "FREQuency 250"),
            (Command::Voltage(2.5), "VOLTage 2.5"),
            (Command::Offset(-5.0), "VOLTage:OFFSet -5"),
            (Command::Output(true), "OUTPut ON"),
            (Command::Output(false), "OUTPut OFF"),
            (Command::OutputLoad(OutputLoad::Ohms(50.0)), "OUTPut:LOAD 50"),
            (Command::OutputLoad(OutputLoad::Infinite), "OUTPut:LOAD INFinity"),
            (
                Command::TriggerSource(TriggerSource::Immediate),
                "TRIGger:SOURce IMMediate",
            ),
            (Command::SweepState(false), "SWEep:STATe OFF"),
            (Command::SweepStart(80.0), "SWEep:STARt 80"),
            (Command::SweepTime(0.5), "SWEep:TIME 0.5"),
            (Command::Beep, "SYSTem:BEEP"),
            (Command::MeasureVoltageDc, "MEASure:VOLTage:DC? AUTO"),
            (Command::Read, "READ?"),
        ];
        for (cmd, text) in cases {
            assert_eq!(cmd.to_string(), text);
        }
    }

    #[test]
    fn modulation_commands_use_the_subsystem_root() {
        assert_eq!(
            Command::ModulationState(Modulation::Fsk, true).to_string(),
            "FSKey:STATe ON"
        );
        assert_eq!(
            Command::ModulationFunction(Modulation::Pwm, ModulationShape::NegativeRamp).to_string(),
            "PWM:INTernal:FUNCtion NRAMp"
        );
        assert_eq!(
            Command::ModulationSource(Modulation::Am, ModulationSource::External).to_string(),
            "AM:SOURce EXTernal"
        );
    }

    #[test]
    fn query_classification() {
        assert!(is_query(&Command::Identify.to_string()));
        assert!(is_query("MEASure:VOLTage:DC? AUTO"));
        assert!(is_query("APPLy?"));
        assert!(!is_query(&Command::Beep.to_string()));
        assert!(!is_query(&Command::CalibrationString("x".into()).to_string()));
    }

    #[test]
    fn keywords_accept_short_and_long_forms() {
        assert_eq!("imm".parse::<TriggerSource>().unwrap(), TriggerSource::Immediate);
        assert_eq!("IMMEDIATE".parse::<TriggerSource>().unwrap(), TriggerSource::Immediate);
        assert_eq!("sinusoid".parse::<Shape>().unwrap(), Shape::Sine);
        assert_eq!("fsk".parse::<Modulation>().unwrap(), Modulation::Fsk);
        assert!(matches!(
            "IMMED".parse::<TriggerSource>(),
            Err(Error::InvalidArgument { what: "trigger source", .. })
        ));
        assert!("triangle".parse::<Shape>().is_err());
    }

    #[test]
    fn frequency_parses_limits_and_numbers() {
        assert_eq!("min".parse::<Frequency>().unwrap(), Frequency::Minimum);
        assert_eq!("MAX".parse::<Frequency>().unwrap(), Frequency::Maximum);
        assert_eq!("1e3".parse::<Frequency>().unwrap(), Frequency::Hz(1000.0));
        assert!("fast".parse::<Frequency>().is_err());
        assert!("NaN".parse::<Frequency>().is_err());
    }

    #[test]
    fn legacy_load_selection() {
        assert_eq!(OutputLoad::from_legacy(50.0, None).unwrap(), OutputLoad::Ohms(50.0));
        assert_eq!(
            OutputLoad::from_legacy(50.0, Some("inf")).unwrap(),
            OutputLoad::Ohms(50.0)
        );
        assert_eq!(
            OutputLoad::from_legacy(0.0, Some("inf")).unwrap(),
            OutputLoad::Infinite
        );
        assert_eq!(
            OutputLoad::from_legacy(0.0, Some("max")).unwrap(),
            OutputLoad::Maximum
        );
        assert!(matches!(OutputLoad::from_legacy(0.0, None), Err(Error::InvalidLoad)));
        assert!(matches!(
            OutputLoad::from_legacy(0.0, Some("open")),
            Err(Error::InvalidLoad)
        ));
        assert!(matches!(
            OutputLoad::from_legacy(0.0, Some("75")),
            Err(Error::InvalidLoad)
        ));
    }

    #[test]
    fn identity_reply_is_split_into_fields() {
        let idn: Identity = "Agilent Technologies,33220A,MY44048527,2.07-2.06-22-2\n"
            .parse()
            .unwrap();
        assert_eq!(idn.manufacturer, "Agilent Technologies");
        assert_eq!(idn.model, "33220A");
        assert_eq!(idn.serial, "MY44048527");
        assert_eq!(idn.firmware, "2.07-2.06-22-2");
        assert!("33220A".parse::<Identity>().is_err());
    }

    #[test]
    fn error_queue_entries() {
        let err: SystemError = "-113,\"Undefined header\"\n".parse().unwrap();
        assert_eq!(err.code, -113);
        assert_eq!(err.message, "Undefined header");
        assert!(!err.is_none());

        let none: SystemError = "+0,\"No error\"".parse().unwrap();
        assert!(none.is_none());
        assert!("garbage".parse::<SystemError>().is_err());
    }

    #[test]
    fn numeric_replies() {
        assert_eq!(parse_number("+1.23450000E+00\n").unwrap(), 1.2345);
        assert!(matches!(parse_number("overload"), Err(Error::Response(_))));
    }
}
