//! Transport seam between the session lifecycle and the wire.
//!
//! A `Connector` opens a `Session` (the outbound control surface) and starts
//! whatever reader delivers inbound traffic. `TcpConnector` is the bundled
//! implementation using length-prefixed JSON frames.

use std::io::{self, BufReader, BufWriter};
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::Sender;
use log::{debug, error, info};

use crate::framing::{read_frame, write_frame};
use crate::protocol::{
    ClientMessage, ControlChanges, Inbound, PlaybackControl, ServerMessage, SessionEvent,
    SessionId, WeightedPrompt,
};

/// Outbound half of a live session.
pub trait Session: Send {
    fn set_weighted_prompts(&mut self, prompts: &[WeightedPrompt]) -> io::Result<()>;
    fn send_control_changes(&mut self, changes: ControlChanges) -> io::Result<()>;
    fn play(&mut self) -> io::Result<()>;
    fn pause(&mut self) -> io::Result<()>;
    fn stop(&mut self) -> io::Result<()>;
    /// Tear down the transport. Inbound traffic after this is not reported.
    fn close(&mut self);
}

/// Opens sessions against the generation service.
pub trait Connector: Send + Sync {
    /// Connect and send setup for `model`. Inbound traffic is delivered to
    /// `inbound` tagged with `id` until the session ends.
    fn connect(
        &self,
        id: SessionId,
        model: &str,
        inbound: Sender<SessionEvent>,
    ) -> io::Result<Box<dyn Session>>;
}

/// TCP transport speaking framed JSON.
pub struct TcpConnector {
    addr: String,
    connect_timeout: Duration,
}

impl TcpConnector {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            connect_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }
}

impl Connector for TcpConnector {
    fn connect(
        &self,
        id: SessionId,
        model: &str,
        inbound: Sender<SessionEvent>,
    ) -> io::Result<Box<dyn Session>> {
        info!(target: "session", "connecting {} to {}", id, self.addr);

        let stream = connect_stream(&self.addr, self.connect_timeout)?;
        stream.set_nodelay(true)?;
        let read_stream = stream.try_clone()?;
        let shutdown_handle = stream.try_clone()?;

        let mut writer = BufWriter::new(stream);
        write_frame(&mut writer, &ClientMessage::Setup { model: model.to_string() })?;

        let closed = Arc::new(AtomicBool::new(false));
        let reader_closed = Arc::clone(&closed);
        thread::Builder::new()
            .name(format!("promptdj-{}", id))
            .spawn(move || session_reader_thread(id, read_stream, inbound, reader_closed))?;

        Ok(Box::new(TcpSession {
            writer,
            shutdown_handle,
            closed,
        }))
    }
}

fn connect_stream(addr: &str, timeout: Duration) -> io::Result<TcpStream> {
    use std::net::ToSocketAddrs;

    let mut last_err = io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("no address for {}", addr),
    );
    for sock in addr.to_socket_addrs()? {
        match TcpStream::connect_timeout(&sock, timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => last_err = e,
        }
    }
    Err(last_err)
}

struct TcpSession {
    writer: BufWriter<TcpStream>,
    shutdown_handle: TcpStream,
    closed: Arc<AtomicBool>,
}

impl TcpSession {
    fn send(&mut self, msg: &ClientMessage) -> io::Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "session closed"));
        }
        write_frame(&mut self.writer, msg)
    }
}

impl Session for TcpSession {
    fn set_weighted_prompts(&mut self, prompts: &[WeightedPrompt]) -> io::Result<()> {
        self.send(&ClientMessage::SetWeightedPrompts {
            weighted_prompts: prompts.to_vec(),
        })
    }

    fn send_control_changes(&mut self, changes: ControlChanges) -> io::Result<()> {
        self.send(&ClientMessage::ControlChanges(changes))
    }

    fn play(&mut self) -> io::Result<()> {
        self.send(&ClientMessage::PlaybackControl(PlaybackControl::Play))
    }

    fn pause(&mut self) -> io::Result<()> {
        self.send(&ClientMessage::PlaybackControl(PlaybackControl::Pause))
    }

    fn stop(&mut self) -> io::Result<()> {
        self.send(&ClientMessage::PlaybackControl(PlaybackControl::Stop))
    }

    fn close(&mut self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            let _ = self.shutdown_handle.shutdown(Shutdown::Both);
        }
    }
}

impl Drop for TcpSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// Background thread that reads frames from the service.
fn session_reader_thread(
    id: SessionId,
    stream: TcpStream,
    inbound: Sender<SessionEvent>,
    closed: Arc<AtomicBool>,
) {
    let mut reader = BufReader::new(stream);

    loop {
        match read_frame::<_, ServerMessage>(&mut reader) {
            Ok(msg) => {
                let is_close = matches!(msg, ServerMessage::Close {});
                let event = SessionEvent {
                    session: id,
                    inbound: Inbound::Message(msg),
                };
                if inbound.send(event).is_err() || is_close {
                    break;
                }
            }
            Err(e) => {
                if closed.load(Ordering::Acquire) {
                    break;
                }
                let reason = if e.kind() == io::ErrorKind::UnexpectedEof {
                    "connection closed by service".to_string()
                } else {
                    error!(target: "session", "{} read error: {}", id, e);
                    e.to_string()
                };
                let _ = inbound.send(SessionEvent {
                    session: id,
                    inbound: Inbound::Disconnected(reason),
                });
                break;
            }
        }
    }

    debug!(target: "session", "{} reader thread exiting", id);
}
