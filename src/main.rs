use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use log::{error, info, warn};

use gen33220a::experiment::{self, OutputSetup, SweepSegment, SweepTable};
use gen33220a::scpi::{self, Identity};
use gen33220a::{
    Error, Frequency, Gen33220a, GeneratorConfig, OutputLoad, RecordingSession, Result, Session,
    Shape, Transport,
};

#[derive(Parser)]
#[command(name = "gen33220a")]
#[command(about = "Drive an Agilent/Keysight 33220A function generator", long_about = None)]
struct Cli {
    /// TOML file with address, timeout_ms, transport and socket_port
    #[arg(long)]
    config: Option<PathBuf>,

    /// VISA resource string, or host name for the socket transport
    #[arg(long)]
    address: Option<String>,

    #[arg(long, value_enum)]
    transport: Option<TransportArg>,

    /// I/O timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Print the commands instead of sending them
    #[arg(long)]
    dry_run: bool,

    /// Log every SCPI line
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum TransportArg {
    Visa,
    Socket,
}

#[derive(Subcommand)]
enum Commands {
    /// Query and print the instrument identification
    Idn,

    /// Step the frequency from start to stop at a fixed amplitude
    StepSweep {
        #[arg(long, default_value_t = 80.0)]
        start: f64,
        #[arg(long, default_value_t = 1000.0)]
        stop: f64,
        #[arg(long, default_value_t = 10.0)]
        step: f64,
        /// Seconds spent on each frequency
        #[arg(long, default_value_t = 5.0)]
        dwell: f64,
        /// Amplitude in volts
        #[arg(long, default_value_t = 0.13)]
        amplitude: f64,
        /// DC offset in volts
        #[arg(long)]
        offset: Option<f64>,
        /// Ohms, or inf/min/max
        #[arg(long, default_value = "50")]
        load: OutputLoad,
        /// CSV log file (stdout when omitted)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Run a table of sweep segments (built-in audio-band table by default)
    TableSweep {
        /// TOML file with [[segment]] entries
        #[arg(long)]
        table: Option<PathBuf>,
        /// Dwell for the built-in table, seconds
        #[arg(long, default_value_t = 5.0)]
        dwell: f64,
        /// Amplitude scale for the built-in table
        #[arg(long, default_value_t = 2.8)]
        amp_coefficient: f64,
        #[arg(long, default_value_t = 4.0)]
        offset: f64,
        #[arg(long, default_value = "50")]
        load: OutputLoad,
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Raise the amplitude in fixed steps at a fixed frequency
    Ramp {
        #[arg(long, default_value_t = 2.0)]
        start: f64,
        #[arg(long, default_value_t = 0.1)]
        step: f64,
        #[arg(long, default_value_t = 100)]
        steps: usize,
        #[arg(long, default_value_t = 1.0)]
        dwell: f64,
        /// Hz, or min/max
        #[arg(long, default_value = "min")]
        frequency: Frequency,
        #[arg(long, default_value = "square")]
        shape: Shape,
        #[arg(long, default_value = "100")]
        load: OutputLoad,
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Start the instrument's own frequency sweep
    Sweep {
        #[arg(long, default_value_t = 80.0)]
        start: f64,
        #[arg(long, default_value_t = 1000.0)]
        stop: f64,
        /// Sweep time in seconds
        #[arg(long, default_value_t = 20.0)]
        time: f64,
        #[arg(long, default_value_t = 2.0)]
        amplitude: f64,
        #[arg(long, default_value = "50")]
        load: OutputLoad,
    },

    /// Stop a running instrument sweep and switch the output off
    Stop,

    /// Sound the beeper
    Beep {
        #[arg(long, default_value_t = 1)]
        times: u32,
        /// Seconds between beeps (0 to 5)
        #[arg(long, default_value_t = 0.5)]
        delay: f64,
    },

    /// Send raw SCPI text; replies are printed for queries
    Send { text: String },

    /// Read and print the instrument error queue until it is empty
    Errors,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{}", err);
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> Result<GeneratorConfig> {
    let mut config = match &cli.config {
        Some(path) => GeneratorConfig::load(path)?,
        None => GeneratorConfig::default(),
    };
    if let Some(address) = &cli.address {
        config.address = address.clone();
    }
    if let Some(transport) = cli.transport {
        config.transport = match transport {
            TransportArg::Visa => Transport::Visa,
            TransportArg::Socket => Transport::Socket,
        };
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        config.timeout_ms = timeout_ms;
    }
    config.validate()?;
    Ok(config)
}

fn connect(cli: &Cli) -> Result<Gen33220a<Box<dyn Session>>> {
    if cli.dry_run {
        info!("Dry run: commands are logged, nothing is sent");
        let session = RecordingSession::new()
            .with_replies(["DRY-RUN,33220A,0,0"])
            .with_fallback("+0,\"No error\"")
            .with_echo(true);
        return Gen33220a::new(Box::new(session) as Box<dyn Session>);
    }
    let config = load_config(cli)?;
    info!("Connecting to {} ({:?})", config.address, config.transport);
    Gen33220a::open(&config)
}

fn csv_writer(path: &Option<PathBuf>) -> Result<Box<dyn Write>> {
    Ok(match path {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(io::stdout().lock()),
    })
}

fn run(cli: Cli) -> Result<()> {
    let mut generator = connect(&cli)?;

    match &cli.command {
        Commands::Idn => {
            let identity: Identity = generator.idn().parse()?;
            println!("{}", identity);
        }
        Commands::StepSweep {
            start,
            stop,
            step,
            dwell,
            amplitude,
            offset,
            load,
            output,
        } => {
            let segment = SweepSegment {
                start_hz: *start,
                stop_hz: *stop,
                step_hz: *step,
                dwell_s: *dwell,
                amplitude_v: *amplitude,
            };
            let setup = OutputSetup {
                frequency: Frequency::Hz(*start),
                amplitude_v: *amplitude,
                offset_v: *offset,
                load: *load,
                ..OutputSetup::default()
            };
            experiment::prepare_output(&mut generator, &setup)?;
            experiment::run_step_sweep(&mut generator, &segment, csv_writer(output)?)?;
        }
        Commands::TableSweep {
            table,
            dwell,
            amp_coefficient,
            offset,
            load,
            output,
        } => {
            let table = match table {
                Some(path) => SweepTable::load(path)?,
                None => SweepTable::audio_band(*dwell, *amp_coefficient),
            };
            let setup = OutputSetup {
                reset: true,
                offset_v: Some(*offset),
                load: *load,
                ..OutputSetup::default()
            };
            experiment::prepare_output(&mut generator, &setup)?;
            experiment::run_table_sweep(&mut generator, &table, csv_writer(output)?)?;
        }
        Commands::Ramp {
            start,
            step,
            steps,
            dwell,
            frequency,
            shape,
            load,
            output,
        } => {
            let setup = OutputSetup {
                shape: *shape,
                frequency: *frequency,
                amplitude_v: *start,
                load: *load,
                ..OutputSetup::default()
            };
            experiment::prepare_output(&mut generator, &setup)?;
            experiment::run_voltage_ramp(
                &mut generator,
                *frequency,
                *start,
                *step,
                *steps,
                Duration::try_from_secs_f64(*dwell).map_err(|_| Error::InvalidArgument {
                    what: "dwell time",
                    value: dwell.to_string(),
                })?,
                csv_writer(output)?,
            )?;
        }
        Commands::Sweep {
            start,
            stop,
            time,
            amplitude,
            load,
        } => {
            let setup = OutputSetup {
                frequency: Frequency::Hz(*start),
                amplitude_v: *amplitude,
                load: *load,
                ..OutputSetup::default()
            };
            experiment::prepare_output(&mut generator, &setup)?;
            experiment::run_native_sweep(&mut generator, *start, *stop, *time)?;
        }
        Commands::Stop => {
            generator.stop_sweep()?;
            generator.set_output_off()?;
        }
        Commands::Beep { times, delay } => {
            let delay = generator.beep(*delay, *times)?;
            if delay.adjusted {
                warn!("Beep delay limited to {} s", delay.value);
            }
        }
        Commands::Send { text } => {
            if scpi::is_query(text) {
                let reply = generator.raw().cmd_query(text)?;
                println!("{}", reply.trim_end());
            } else {
                generator.raw().cmd_write(text)?;
            }
        }
        Commands::Errors => loop {
            let entry = generator.system_error()?;
            if entry.is_none() {
                break;
            }
            println!("{},\"{}\"", entry.code, entry.message);
        },
    }

    generator.close()
}
