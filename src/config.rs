//! Connection settings for one generator.
//!
//! Loaded from a TOML file; any field may be left out:
//!
//! ```toml
//! address = "USB0::0x0957::0x0407::MY44048527::0::INSTR"
//! timeout_ms = 5000
//! transport = "visa"
//! ```
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

pub const DEFAULT_ADDRESS: &str = "USB0::0x0957::0x0407::MY44048527::0::INSTR";
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_SOCKET_PORT: u16 = 5025;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// VISA resource string such as `USB0::...::INSTR` or `TCPIP0::host::INSTR`.
    #[default]
    Visa,
    /// Host name or IP address of the LAN interface; SCPI over a raw socket.
    Socket,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct GeneratorConfig {
    pub address: String,
    pub timeout_ms: u64,
    pub transport: Transport,
    pub socket_port: u16,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        GeneratorConfig {
            address: DEFAULT_ADDRESS.to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            transport: Transport::default(),
            socket_port: DEFAULT_SOCKET_PORT,
        }
    }
}

impl GeneratorConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: GeneratorConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.address.trim().is_empty() {
            return Err(Error::Config("address must not be empty".into()));
        }
        if self.timeout_ms == 0 {
            return Err(Error::Config("timeout_ms must be greater than 0".into()));
        }
        if self.transport == Transport::Socket && self.socket_port == 0 {
            return Err(Error::Config("socket_port must be greater than 0".into()));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
