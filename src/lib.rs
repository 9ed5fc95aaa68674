//! Remote control of the Agilent/Keysight 33220A function generator.
//!
//! [`Gen33220a`] turns method calls into SCPI text and sends it through a
//! [`Session`]: a VISA resource (feature `visa`), a raw LAN socket, or a
//! [`RecordingSession`] for dry runs and tests.
//!
//! ```no_run
//! use gen33220a::{Gen33220a, GeneratorConfig, OutputLoad, Transport};
//!
//! # fn main() -> gen33220a::Result<()> {
//! let config = GeneratorConfig {
//!     address: "192.168.1.20".into(),
//!     transport: Transport::Socket,
//!     ..GeneratorConfig::default()
//! };
//! let mut generator = Gen33220a::open(&config)?;
//! generator.conf_sinusoid()?;
//! generator.set_freq(80)?;
//! generator.set_voltage(2.0)?;
//! generator.set_output_load(OutputLoad::Ohms(50.0))?;
//! generator.set_output_on()?;
//! generator.sweep(80.0, 1000.0, 20.0)?;
//! generator.close()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod experiment;
pub mod gen33220a;
pub mod range;
pub mod scpi;
pub mod session;
#[cfg(feature = "visa")]
pub mod visa;

pub use config::{GeneratorConfig, Transport};
pub use error::{Error, Result};
pub use gen33220a::{Gen33220a, RawAccess};
pub use range::Clamped;
pub use scpi::{Frequency, OutputLoad, Shape};
pub use session::{RecordingSession, Session, SocketSession};
