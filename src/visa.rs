//! VISA-backed session (USB, GPIB and LAN through the vendor VISA library).

use std::ffi::CString;
use std::io::{BufRead, BufReader, Write};
use std::time::Duration;

use log::info;
use visa_rs::prelude::*;

use crate::error::{Error, Result};
use crate::session::Session;

pub fn io_to_vs_err(err: std::io::Error) -> visa_rs::Error {
    visa_rs::io_to_vs_err(err)
}

pub struct VisaSession {
    // The resource manager must outlive the instrument session.
    _rm: DefaultRM,
    instr: Option<Instrument>,
}

impl VisaSession {
    /// Open `address` (e.g. `USB0::0x0957::0x0407::MY44048527::0::INSTR`).
    pub fn open(address: &str, timeout: Duration) -> Result<Self> {
        let rm = DefaultRM::new()?;
        let resource =
            CString::new(address).map_err(|_| Error::invalid("VISA address", address))?;
        let instr = rm.open(&resource.into(), AccessMode::NO_LOCK, timeout)?;
        info!("Opened VISA resource {}", address);
        Ok(VisaSession {
            _rm: rm,
            instr: Some(instr),
        })
    }

    fn instr(&mut self) -> Result<&mut Instrument> {
        self.instr.as_mut().ok_or(Error::SessionClosed)
    }
}

impl Session for VisaSession {
    fn write(&mut self, command: &str) -> Result<()> {
        let instr = self.instr()?;
        instr
            .write_all(format!("{}\n", command).as_bytes())
            .map_err(io_to_vs_err)?;
        Ok(())
    }

    fn query(&mut self, command: &str) -> Result<String> {
        self.write(command)?;
        let instr = self.instr()?;
        let mut response = String::new();
        {
            // Scope the reader so it is dropped before the instrument is used again
            let mut reader = BufReader::new(&*instr);
            reader.read_line(&mut response).map_err(io_to_vs_err)?;
        }
        Ok(response)
    }

    fn clear(&mut self) -> Result<()> {
        self.instr()?.clear()?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        // Dropping the instrument closes the VISA session.
        self.instr.take().map(drop).ok_or(Error::SessionClosed)
    }
}
