//! Gateway server: many TCP client sessions multiplexed onto one engine
//! link over a unix domain socket.
//!
//! Non-blocking readiness polling; one frame per readable connection per
//! iteration batch. Client frames are validated and forwarded to the
//! engine verbatim; engine frames are broadcast to every client. Losing
//! the engine is fatal, losing a client is not.

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{bail, Context};
use mio::net::{TcpListener, TcpStream, UnixStream};
use mio::{Events, Interest, Poll, Token};
use tracing::{info, warn};

use meridian_proto::{FrameDecoder, ParseError};

const LISTENER: Token = Token(0);
const ENGINE: Token = Token(1);
const FIRST_CLIENT_TOKEN: usize = 2;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Per-connection outbound buffer. A client that cannot drain it in time
/// is dropped rather than allowed to stall the loop.
const WRITE_BUFFER_SIZE: usize = 64 * 1024;

struct WriteQueue {
    buf: Box<[u8]>,
    pos: usize,
    len: usize,
}

impl WriteQueue {
    fn new() -> Self {
        Self {
            buf: vec![0; WRITE_BUFFER_SIZE].into_boxed_slice(),
            pos: 0,
            len: 0,
        }
    }

    /// Queue bytes for writing. Returns `false` when the buffer is full.
    fn queue(&mut self, data: &[u8]) -> bool {
        if self.len + data.len() > self.buf.len() {
            return false;
        }
        self.buf[self.len..self.len + data.len()].copy_from_slice(data);
        self.len += data.len();
        true
    }

    /// Write as much as the socket accepts. `Err` means the peer is gone.
    fn flush<W: Write>(&mut self, stream: &mut W) -> io::Result<()> {
        while self.pos < self.len {
            match stream.write(&self.buf[self.pos..self.len]) {
                Ok(0) => break,
                Ok(n) => self.pos += n,
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        if self.pos == self.len {
            self.pos = 0;
            self.len = 0;
        }
        Ok(())
    }
}

struct ClientSession {
    stream: TcpStream,
    addr: SocketAddr,
    decoder: FrameDecoder,
    out: WriteQueue,
}

struct EngineLink {
    stream: UnixStream,
    decoder: FrameDecoder,
    out: WriteQueue,
}

/// The gateway server.
pub struct Gateway {
    poll: Poll,
    listener: TcpListener,
    engine: EngineLink,
    clients: HashMap<Token, ClientSession>,
    next_token: usize,
}

impl Gateway {
    /// Dial the engine, then bind the client listener.
    pub fn connect(port: u16, engine_socket: &Path) -> anyhow::Result<Self> {
        let stream = StdUnixStream::connect(engine_socket).with_context(|| {
            format!("failed to connect to engine at {}", engine_socket.display())
        })?;
        stream
            .set_nonblocking(true)
            .context("failed to set engine socket non-blocking")?;
        let mut engine_stream = UnixStream::from_std(stream);
        info!(path = %engine_socket.display(), "connected to engine");

        let addr: SocketAddr = ([0, 0, 0, 0], port).into();
        let mut listener =
            TcpListener::bind(addr).with_context(|| format!("failed to bind port {port}"))?;

        let poll = Poll::new().context("failed to create poll instance")?;
        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)
            .context("failed to register listener")?;
        poll.registry()
            .register(
                &mut engine_stream,
                ENGINE,
                Interest::READABLE | Interest::WRITABLE,
            )
            .context("failed to register engine stream")?;

        info!(port, "listening for clients");
        Ok(Self {
            poll,
            listener,
            engine: EngineLink {
                stream: engine_stream,
                decoder: FrameDecoder::new(),
                out: WriteQueue::new(),
            },
            clients: HashMap::new(),
            next_token: FIRST_CLIENT_TOKEN,
        })
    }

    /// Run until shutdown is signalled. Engine loss is an error.
    pub fn run(&mut self, shutdown: &AtomicBool) -> anyhow::Result<()> {
        let mut events = Events::with_capacity(256);

        while !shutdown.load(Ordering::Relaxed) {
            if let Err(e) = self.poll.poll(&mut events, Some(POLL_INTERVAL)) {
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(e).context("poll failed");
            }

            let mut dead_clients = Vec::new();

            for event in events.iter() {
                match event.token() {
                    LISTENER => self.accept_clients()?,
                    ENGINE => {
                        self.handle_engine(event.is_readable(), event.is_writable(), &mut dead_clients)?;
                    }
                    token => {
                        if !self.handle_client(token, event.is_readable(), event.is_writable()) {
                            dead_clients.push(token);
                        }
                    }
                }
            }

            for token in dead_clients {
                self.remove_client(token);
            }
        }

        info!("shutdown signalled");
        Ok(())
    }

    fn accept_clients(&mut self) -> anyhow::Result<()> {
        loop {
            match self.listener.accept() {
                Ok((mut stream, addr)) => {
                    stream.set_nodelay(true).ok();
                    let token = Token(self.next_token);
                    self.next_token += 1;

                    self.poll
                        .registry()
                        .register(&mut stream, token, Interest::READABLE | Interest::WRITABLE)
                        .context("failed to register client stream")?;

                    info!(%addr, clients = self.clients.len() + 1, "client connected");
                    self.clients.insert(
                        token,
                        ClientSession {
                            stream,
                            addr,
                            decoder: FrameDecoder::new(),
                            out: WriteQueue::new(),
                        },
                    );
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e).context("accept failed"),
            }
        }
        Ok(())
    }

    /// Read engine frames and broadcast them to every client.
    fn handle_engine(
        &mut self,
        readable: bool,
        writable: bool,
        dead_clients: &mut Vec<Token>,
    ) -> anyhow::Result<()> {
        if readable {
            loop {
                let space = self.engine.decoder.space();
                match self.engine.stream.read(space) {
                    Ok(0) => bail!("engine connection closed"),
                    Ok(n) => self.engine.decoder.advance(n),
                    Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                    Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e).context("engine read error"),
                }
            }

            loop {
                match self.engine.decoder.next_frame() {
                    Ok(Some((_msg_type, frame))) => {
                        for (&token, client) in self.clients.iter_mut() {
                            if !client.out.queue(frame) {
                                warn!(addr = %client.addr, "client write buffer full, dropping");
                                dead_clients.push(token);
                            }
                        }
                    }
                    Ok(None) => break,
                    Err(ParseError::BadVersion(version)) => {
                        warn!(version, "dropping engine frame with bad version");
                    }
                    Err(e) => bail!("unrecoverable framing error on engine link: {e}"),
                }
            }

            for client in self.clients.values_mut() {
                let _ = client.out.flush(&mut client.stream);
            }
        }

        if writable {
            self.engine
                .out
                .flush(&mut self.engine.stream)
                .context("engine write error")?;
        }
        Ok(())
    }

    /// Service one client. Returns `false` when the session should close.
    fn handle_client(&mut self, token: Token, readable: bool, writable: bool) -> bool {
        let Some(client) = self.clients.get_mut(&token) else {
            return true;
        };

        if readable {
            loop {
                let space = client.decoder.space();
                match client.stream.read(space) {
                    Ok(0) => return false,
                    Ok(n) => client.decoder.advance(n),
                    Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                    Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        warn!(addr = %client.addr, %e, "client read error");
                        return false;
                    }
                }
            }

            loop {
                match client.decoder.next_frame() {
                    Ok(Some((_msg_type, frame))) => {
                        // Forward verbatim; the engine owns semantics.
                        if !self.engine.out.queue(frame) {
                            warn!("engine write buffer full, dropping client frame");
                        }
                    }
                    Ok(None) => break,
                    Err(ParseError::BadVersion(version)) => {
                        warn!(addr = %client.addr, version, "dropping client frame with bad version");
                    }
                    Err(e) => {
                        warn!(addr = %client.addr, %e, "unframeable client stream");
                        return false;
                    }
                }
            }

            let _ = self.engine.out.flush(&mut self.engine.stream);
        }

        if writable {
            if let Some(client) = self.clients.get_mut(&token) {
                if client.out.flush(&mut client.stream).is_err() {
                    return false;
                }
            }
        }
        true
    }

    fn remove_client(&mut self, token: Token) {
        if let Some(mut client) = self.clients.remove(&token) {
            info!(addr = %client.addr, clients = self.clients.len(), "client disconnected");
            let _ = self.poll.registry().deregister(&mut client.stream);
        }
    }
}
