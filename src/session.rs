//! Instrument sessions: the transport underneath the generator facade.
//!
//! A session moves newline-free SCPI text to one instrument and reads its
//! replies. Every backend refuses further traffic once closed.

use std::collections::VecDeque;
use std::io::{self, BufRead, BufReader, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

use log::{debug, info};

use crate::config::{GeneratorConfig, Transport};
use crate::error::{Error, Result};

pub trait Session {
    /// Send one command without waiting for a reply.
    fn write(&mut self, command: &str) -> Result<()>;

    /// Send one command and return the reply line, terminator included.
    fn query(&mut self, command: &str) -> Result<String>;

    /// Device clear: abort pending I/O and flush buffers.
    fn clear(&mut self) -> Result<()>;

    fn close(&mut self) -> Result<()>;
}

impl<S: Session + ?Sized> Session for Box<S> {
    fn write(&mut self, command: &str) -> Result<()> {
        (**self).write(command)
    }

    fn query(&mut self, command: &str) -> Result<String> {
        (**self).query(command)
    }

    fn clear(&mut self) -> Result<()> {
        (**self).clear()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

/// Opens the transport named by the configuration.
pub fn open(config: &GeneratorConfig) -> Result<Box<dyn Session>> {
    let timeout = config.timeout();
    match config.transport {
        Transport::Socket => Ok(Box::new(SocketSession::connect(
            (config.address.as_str(), config.socket_port),
            timeout,
        )?)),
        #[cfg(feature = "visa")]
        Transport::Visa => Ok(Box::new(crate::visa::VisaSession::open(
            &config.address,
            timeout,
        )?)),
        #[cfg(not(feature = "visa"))]
        Transport::Visa => Err(Error::TransportDisabled("visa")),
    }
}

/// Raw SCPI socket, as served by the 33220A LAN interface on port 5025.
pub struct SocketSession {
    reader: Option<BufReader<TcpStream>>,
}

impl SocketSession {
    /// Connect to the instrument and apply `timeout` to reads and writes.
    pub fn connect<A: ToSocketAddrs>(addr: A, timeout: Duration) -> Result<Self> {
        let mut last_err = None;
        for addr in addr.to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => {
                    stream.set_read_timeout(Some(timeout))?;
                    stream.set_write_timeout(Some(timeout))?;
                    stream.set_nodelay(true)?;
                    info!("Connected to {}", addr);
                    return Ok(SocketSession {
                        reader: Some(BufReader::new(stream)),
                    });
                }
                Err(err) => last_err = Some(err),
            }
        }
        Err(last_err
            .unwrap_or_else(|| {
                io::Error::new(io::ErrorKind::NotFound, "Address resolved to nothing")
            })
            .into())
    }

    fn reader(&mut self) -> Result<&mut BufReader<TcpStream>> {
        self.reader.as_mut().ok_or(Error::SessionClosed)
    }
}

impl Session for SocketSession {
    fn write(&mut self, command: &str) -> Result<()> {
        let stream = self.reader()?.get_mut();
        stream.write_all(format!("{}\n", command).as_bytes())?;
        Ok(())
    }

    fn query(&mut self, command: &str) -> Result<String> {
        self.write(command)?;
        let mut response = String::new();
        if self.reader()?.read_line(&mut response)? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "Instrument closed the connection",
            )
            .into());
        }
        Ok(response)
    }

    fn clear(&mut self) -> Result<()> {
        // No bus clear on a raw socket; drop whatever reply bytes are buffered.
        let reader = self.reader()?;
        let buffered = reader.buffer().len();
        reader.consume(buffered);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let reader = self.reader.take().ok_or(Error::SessionClosed)?;
        match reader.get_ref().shutdown(Shutdown::Both) {
            Err(err) if err.kind() != io::ErrorKind::NotConnected => Err(err.into()),
            _ => Ok(()),
        }
    }
}

/// Session that talks to nothing: it records every line and answers
/// queries from a scripted queue.
///
/// Used for dry runs of the sweep programs and in tests.
#[derive(Debug, Default)]
pub struct RecordingSession {
    sent: Vec<String>,
    replies: VecDeque<String>,
    fallback: Option<String>,
    clears: usize,
    closed: bool,
    echo: bool,
}

impl RecordingSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue replies handed out, in order, to subsequent queries.
    pub fn with_replies<I, T>(mut self, replies: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.replies.extend(replies.into_iter().map(Into::into));
        self
    }

    /// Reply used once the queue is empty. Without one, such a query times out.
    pub fn with_fallback(mut self, reply: impl Into<String>) -> Self {
        self.fallback = Some(reply.into());
        self
    }

    /// Log every line at info level as it is sent.
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    pub fn push_reply(&mut self, reply: impl Into<String>) {
        self.replies.push_back(reply.into());
    }

    /// Every line sent so far, writes and queries alike.
    pub fn sent(&self) -> &[String] {
        &self.sent
    }

    pub fn take_sent(&mut self) -> Vec<String> {
        std::mem::take(&mut self.sent)
    }

    pub fn clears(&self) -> usize {
        self.clears
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn record(&mut self, line: &str) -> Result<()> {
        if self.closed {
            return Err(Error::SessionClosed);
        }
        if self.echo {
            info!("> {}", line);
        } else {
            debug!("> {}", line);
        }
        self.sent.push(line.to_string());
        Ok(())
    }
}

impl Session for RecordingSession {
    fn write(&mut self, command: &str) -> Result<()> {
        self.record(command)
    }

    fn query(&mut self, command: &str) -> Result<String> {
        self.record(command)?;
        self.replies
            .pop_front()
            .or_else(|| self.fallback.clone())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("No reply to {:?}", command),
                )
                .into()
            })
    }

    fn clear(&mut self) -> Result<()> {
        if self.closed {
            return Err(Error::SessionClosed);
        }
        self.clears += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Err(Error::SessionClosed);
        }
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn recording_session_answers_in_order_then_falls_back() {
        let mut session = RecordingSession::new()
            .with_replies(["first\n", "second\n"])
            .with_fallback("0\n");
        assert_eq!(session.query("A?").unwrap(), "first\n");
        assert_eq!(session.query("B?").unwrap(), "second\n");
        assert_eq!(session.query("C?").unwrap(), "0\n");
        assert_eq!(session.sent(), ["A?", "B?", "C?"]);
    }

    #[test]
    fn recording_session_times_out_without_replies() {
        let mut session = RecordingSession::new();
        match session.query("*IDN?") {
            Err(Error::Io(err)) => assert_eq!(err.kind(), io::ErrorKind::TimedOut),
            other => panic!("expected a timeout, got {:?}", other),
        }
    }

    #[test]
    fn recording_session_rejects_use_after_close() {
        let mut session = RecordingSession::new();
        session.write("*RST").unwrap();
        session.close().unwrap();
        assert!(session.is_closed());
        assert!(matches!(session.write("*RST"), Err(Error::SessionClosed)));
        assert!(matches!(session.clear(), Err(Error::SessionClosed)));
        assert!(matches!(session.close(), Err(Error::SessionClosed)));
        assert_eq!(session.sent(), ["*RST"]);
    }

    #[test]
    fn boxed_sessions_forward_calls() {
        let mut session: Box<dyn Session> = Box::new(RecordingSession::new().with_fallback("1"));
        session.write("OUTPut ON").unwrap();
        assert_eq!(session.query("OUTPut?").unwrap(), "1");
        session.clear().unwrap();
        session.close().unwrap();
        assert!(matches!(session.write("OUTPut OFF"), Err(Error::SessionClosed)));
    }

    #[test]
    fn socket_session_terminates_lines_and_reads_replies() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(conn.try_clone().unwrap());
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            assert_eq!(line, "VOLTage 2\n");
            line.clear();
            reader.read_line(&mut line).unwrap();
            assert_eq!(line, "*IDN?\n");
            conn.write_all(b"Agilent Technologies,33220A,0,1.0\n").unwrap();
            let mut rest = Vec::new();
            reader.read_to_end(&mut rest).unwrap();
            rest
        });

        let mut session = SocketSession::connect(addr, Duration::from_secs(2)).unwrap();
        session.write("VOLTage 2").unwrap();
        let idn = session.query("*IDN?").unwrap();
        assert_eq!(idn.trim(), "Agilent Technologies,33220A,0,1.0");
        session.clear().unwrap();
        session.close().unwrap();
        assert!(matches!(session.write("*RST"), Err(Error::SessionClosed)));
        assert!(server.join().unwrap().is_empty());
    }
}
