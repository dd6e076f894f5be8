#![allow(dead_code)]
//! Test harness utilities for promptdj-net integration tests.

use std::io::{BufReader, BufWriter};
use std::net::{TcpListener, TcpStream};
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;

use promptdj_net::framing::{read_frame, write_frame};
use promptdj_net::protocol::{ClientMessage, ServerMessage, SessionEvent};
use promptdj_net::SessionConnection;

/// A loopback stand-in for the generation service.
pub struct FakeService {
    listener: TcpListener,
}

impl FakeService {
    pub fn bind() -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        Ok(Self { listener })
    }

    pub fn addr(&self) -> String {
        self.listener.local_addr().unwrap().to_string()
    }

    /// Accept the next client connection.
    pub fn accept(&self) -> std::io::Result<ServiceConn> {
        let (stream, _) = self.listener.accept()?;
        ServiceConn::new(stream)
    }
}

/// Service side of one accepted connection.
pub struct ServiceConn {
    pub reader: BufReader<TcpStream>,
    pub writer: BufWriter<TcpStream>,
    stream: TcpStream,
}

impl ServiceConn {
    fn new(stream: TcpStream) -> std::io::Result<Self> {
        stream.set_read_timeout(Some(Duration::from_secs(5)))?;
        Ok(Self {
            reader: BufReader::new(stream.try_clone()?),
            writer: BufWriter::new(stream.try_clone()?),
            stream,
        })
    }

    pub fn send(&mut self, msg: &ServerMessage) -> std::io::Result<()> {
        write_frame(&mut self.writer, msg)
    }

    pub fn recv(&mut self) -> std::io::Result<ClientMessage> {
        read_frame(&mut self.reader)
    }

    /// Drop the socket without a close frame.
    pub fn hang_up(self) {
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
    }
}

/// Receive the next inbound event or panic after `timeout`.
pub fn next_event(rx: &Receiver<SessionEvent>, timeout: Duration) -> SessionEvent {
    rx.recv_timeout(timeout)
        .unwrap_or_else(|_| panic!("no inbound event within {:?}", timeout))
}

/// Poll a connection until its pending connect resolves.
pub fn drive_connect(conn: &mut SessionConnection, timeout: Duration) -> Result<(), String> {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if let Some(result) = conn.poll_connect() {
            return result;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    panic!("connect did not resolve within {:?}", timeout);
}
