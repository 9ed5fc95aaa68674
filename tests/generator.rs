//! End-to-end checks of the generator facade over a recording session.

use std::time::{Duration, Instant};

use gen33220a::experiment::{self, OutputSetup, SweepSegment};
use gen33220a::scpi::TriggerSource;
use gen33220a::{Error, Frequency, Gen33220a, OutputLoad, RecordingSession, Shape};

const IDN: &str = "Agilent Technologies,33220A,MY44048527,2.07-2.06-22-2\n";

fn connect() -> Gen33220a<RecordingSession> {
    Gen33220a::new(RecordingSession::new().with_replies([IDN])).unwrap()
}

fn commands(generator: &Gen33220a<RecordingSession>) -> Vec<String> {
    generator.session().sent().to_vec()
}

#[test]
fn voltage_commands_carry_the_clamped_value() {
    let mut generator = connect();
    for v in [-20.0, -10.0, -0.5, 0.0, 1.5, 10.0, 10.5, 99.0] {
        let clamped = generator.set_voltage(v).unwrap();
        assert_eq!(clamped.value, (-10.0f64).max(10.0f64.min(v)));
        assert_eq!(clamped.adjusted, !(-10.0..=10.0).contains(&v));
        let sent = generator.session().sent().last().unwrap().clone();
        assert_eq!(sent, format!("VOLTage {}", clamped.value));
    }
}

#[test]
fn offset_and_load_commands_carry_the_clamped_value() {
    let mut generator = connect();
    for v in [-8.0, -5.0, 2.5, 5.0, 6.0] {
        let clamped = generator.set_offset(v).unwrap();
        assert_eq!(clamped.value, (-5.0f64).max(5.0f64.min(v)));
        assert_eq!(
            generator.session().sent().last().unwrap(),
            &format!("VOLTage:OFFSet {}", clamped.value)
        );
    }
    for ohms in [0.5, 1.0, 50.0, 10_000.0, 1e6] {
        let clamped = generator.set_output_load(OutputLoad::Ohms(ohms)).unwrap();
        let expected = 1.0f64.max(10_000.0f64.min(ohms));
        assert_eq!(clamped.value, OutputLoad::Ohms(expected));
        assert_eq!(
            generator.session().sent().last().unwrap(),
            &format!("OUTPut:LOAD {}", expected)
        );
    }
}

#[test]
fn nan_values_never_reach_the_instrument() {
    let mut generator = connect();
    assert!(matches!(
        generator.set_voltage(f64::NAN),
        Err(Error::InvalidArgument { .. })
    ));
    assert!(matches!(
        generator.set_offset(f64::NAN),
        Err(Error::InvalidArgument { .. })
    ));
    assert!(matches!(
        generator.set_freq(f64::NAN),
        Err(Error::InvalidArgument { .. })
    ));
    assert!(matches!(
        generator.beep(f64::NAN, 1),
        Err(Error::InvalidArgument { .. })
    ));
    assert_eq!(commands(&generator), ["*IDN?"]);

    let high = generator.set_voltage(f64::INFINITY).unwrap();
    assert_eq!(high.value, 10.0);
    assert!(high.adjusted);
    assert_eq!(
        generator.session().sent().last().unwrap(),
        "VOLTage 10"
    );
}

#[test]
fn frequency_sentinels_and_values() {
    let mut generator = connect();
    generator.set_freq("min".parse::<Frequency>().unwrap()).unwrap();
    generator.set_freq("max".parse::<Frequency>().unwrap()).unwrap();
    generator.set_freq(250).unwrap();
    let sent = commands(&generator);
    assert_eq!(sent[1], "FREQuency MINimum");
    assert_eq!(sent[2], "FREQuency MAXimum");
    assert!(sent[3].starts_with("FREQuency") && sent[3].contains("250"));
}

#[test]
fn sweep_emits_five_commands_in_order() {
    let mut generator = connect();
    generator.sweep(80.0, 1000.0, 20.0).unwrap();
    assert_eq!(
        generator.session().sent()[1..],
        [
            "SWEep:STATe OFF",
            "SWEep:STARt 80",
            "SWEep:STOP 1000",
            "SWEep:TIME 20",
            "SWEep:STATe ON"
        ]
    );
}

#[test]
fn legacy_load_specifications() {
    let mut generator = connect();
    let load = OutputLoad::from_legacy(0.0, Some("inf")).unwrap();
    let set = generator.set_output_load(load).unwrap();
    assert_eq!(set.value, OutputLoad::Infinite);
    assert_eq!(
        generator.session().sent().last().unwrap(),
        "OUTPut:LOAD INFinity"
    );
    assert!(matches!(
        OutputLoad::from_legacy(0.0, None),
        Err(Error::InvalidLoad)
    ));
}

#[test]
fn beep_blocks_for_every_repetition() {
    let mut generator = connect();
    let start = Instant::now();
    let delay = generator.beep(2.0, 3).unwrap();
    assert!(start.elapsed() >= Duration::from_secs(6));
    assert!(!delay.adjusted);
    let beeps = generator
        .session()
        .sent()
        .iter()
        .filter(|line| *line == "SYSTem:BEEP")
        .count();
    assert_eq!(beeps, 3);
}

#[test]
fn invalid_selectors_fail_with_invalid_argument() {
    assert!(matches!(
        "sawtooth".parse::<Shape>(),
        Err(Error::InvalidArgument { what: "waveform shape", .. })
    ));
    assert!(matches!(
        "later".parse::<TriggerSource>(),
        Err(Error::InvalidArgument { .. })
    ));
}

#[test]
fn commands_after_close_report_a_closed_session() {
    let mut generator = connect();
    generator.close().unwrap();
    assert!(matches!(generator.reset(), Err(Error::SessionClosed)));
    assert!(matches!(generator.set_freq(1000), Err(Error::SessionClosed)));
    assert!(matches!(generator.cmd_read(), Err(Error::SessionClosed)));
    assert!(matches!(
        generator.raw().cmd_query("*IDN?"),
        Err(Error::SessionClosed)
    ));
}

#[test]
fn scripted_sweep_session() {
    let mut generator = connect();
    let setup = OutputSetup {
        amplitude_v: 2.0,
        frequency: Frequency::Hz(80.0),
        ..OutputSetup::default()
    };
    experiment::prepare_output(&mut generator, &setup).unwrap();
    let segment = SweepSegment {
        start_hz: 80.0,
        stop_hz: 100.0,
        step_hz: 10.0,
        dwell_s: 0.0,
        amplitude_v: 2.0,
    };
    let mut csv = Vec::new();
    experiment::run_step_sweep(&mut generator, &segment, &mut csv).unwrap();
    generator.close().unwrap();

    let session = generator.into_session();
    assert!(session.is_closed());
    let sent = session.sent();
    assert_eq!(sent.first().map(String::as_str), Some("*IDN?"));
    assert_eq!(sent.last().map(String::as_str), Some("OUTPut OFF"));
    assert_eq!(
        sent.iter().filter(|line| line.starts_with("FREQuency")).count(),
        1 + 3
    );
    assert_eq!(String::from_utf8(csv).unwrap().lines().count(), 1 + 3);
}
