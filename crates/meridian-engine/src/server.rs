//! Unix-socket server loop for the gateway link.
//!
//! Single-threaded readiness polling over the listener and the one
//! accepted gateway stream. Frames are decoded incrementally, dispatched
//! to the order manager, and its outbound frames flushed back on the
//! same stream.

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::Context;
use mio::net::{UnixListener, UnixStream};
use mio::{Events, Interest, Poll, Token};
use tracing::{error, info, warn};

use meridian_proto::{FrameDecoder, ParseError};

use crate::manager::OrderManager;

const LISTENER: Token = Token(0);
const GATEWAY: Token = Token(1);

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const STATS_INTERVAL: Duration = Duration::from_secs(10);

/// Nanoseconds since the epoch.
pub fn now_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

/// The single accepted gateway connection.
struct GatewayLink {
    stream: UnixStream,
    decoder: FrameDecoder,
    out: Vec<u8>,
}

impl GatewayLink {
    fn new(stream: UnixStream) -> Self {
        Self {
            stream,
            decoder: FrameDecoder::new(),
            out: Vec::with_capacity(16 * 1024),
        }
    }

    fn queue(&mut self, data: &[u8]) {
        self.out.extend_from_slice(data);
    }

    fn flush(&mut self) -> io::Result<()> {
        while !self.out.is_empty() {
            match self.stream.write(&self.out) {
                Ok(0) => break,
                Ok(n) => {
                    self.out.drain(..n);
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

/// The engine's IPC server.
pub struct EngineServer {
    poll: Poll,
    listener: UnixListener,
    socket_path: PathBuf,
}

impl EngineServer {
    /// Bind the unix socket, replacing any stale socket file.
    pub fn bind(socket_path: &Path) -> anyhow::Result<Self> {
        if socket_path.exists() {
            std::fs::remove_file(socket_path)
                .with_context(|| format!("failed to remove stale socket {}", socket_path.display()))?;
        }

        let mut listener = UnixListener::bind(socket_path)
            .with_context(|| format!("failed to bind {}", socket_path.display()))?;
        let poll = Poll::new().context("failed to create poll instance")?;
        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)
            .context("failed to register listener")?;

        info!(path = %socket_path.display(), "listening for gateway connection");
        Ok(Self {
            poll,
            listener,
            socket_path: socket_path.to_owned(),
        })
    }

    /// Run until the gateway disconnects or shutdown is signalled.
    pub fn run(
        &mut self,
        manager: &mut OrderManager,
        shutdown: &AtomicBool,
    ) -> anyhow::Result<()> {
        let mut events = Events::with_capacity(256);
        let mut link: Option<GatewayLink> = None;
        let mut last_stats = Instant::now();

        while !shutdown.load(Ordering::Relaxed) {
            if let Err(e) = self.poll.poll(&mut events, Some(POLL_INTERVAL)) {
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(e).context("poll failed");
            }

            for event in events.iter() {
                match event.token() {
                    LISTENER => self.accept_gateway(&mut link)?,
                    GATEWAY => {
                        let Some(l) = link.as_mut() else { continue };
                        let mut connected = true;
                        if event.is_readable() {
                            connected = read_gateway(l, manager);
                        }
                        if connected && event.is_writable() {
                            connected = l.flush().is_ok();
                        }
                        if !connected {
                            info!("gateway disconnected, shutting down");
                            let _ = self.poll.registry().deregister(&mut l.stream);
                            return Ok(());
                        }
                    }
                    _ => {}
                }
            }

            // Housekeeping: expiry sweep and statistics.
            let now = now_nanos();
            let expired = manager.process_expirations(now);
            if expired > 0 {
                info!(expired, "expired orders cancelled");
            }
            if let Some(l) = link.as_mut() {
                let outbound = manager.take_outbound();
                if !outbound.is_empty() {
                    l.queue(&outbound);
                }
                if l.flush().is_err() {
                    info!("gateway disconnected, shutting down");
                    let _ = self.poll.registry().deregister(&mut l.stream);
                    return Ok(());
                }
            }

            if last_stats.elapsed() >= STATS_INTERVAL {
                let stats = manager.statistics();
                info!(
                    received = stats.total_orders_received,
                    accepted = stats.total_orders_accepted,
                    rejected = stats.total_orders_rejected,
                    cancelled = stats.total_orders_cancelled,
                    executions = stats.total_executions,
                    volume = stats.total_volume,
                    "engine statistics"
                );
                last_stats = Instant::now();
            }
        }

        Ok(())
    }

    fn accept_gateway(&mut self, link: &mut Option<GatewayLink>) -> anyhow::Result<()> {
        loop {
            match self.listener.accept() {
                Ok((mut stream, _addr)) => {
                    if link.is_some() {
                        warn!("second gateway connection refused");
                        continue;
                    }
                    self.poll
                        .registry()
                        .register(
                            &mut stream,
                            GATEWAY,
                            Interest::READABLE | Interest::WRITABLE,
                        )
                        .context("failed to register gateway stream")?;
                    info!("gateway connected");
                    *link = Some(GatewayLink::new(stream));
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e).context("accept failed"),
            }
        }
        Ok(())
    }
}

impl Drop for EngineServer {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.socket_path);
    }
}

/// Read and dispatch everything available. Returns `false` once the
/// gateway is gone.
fn read_gateway(link: &mut GatewayLink, manager: &mut OrderManager) -> bool {
    loop {
        let space = link.decoder.space();
        match link.stream.read(space) {
            Ok(0) => return false,
            Ok(n) => link.decoder.advance(n),
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!(%e, "gateway read error");
                return false;
            }
        }
    }

    loop {
        match link.decoder.next_frame() {
            Ok(Some((msg_type, frame))) => {
                manager.handle_frame(msg_type, frame, now_nanos());
            }
            Ok(None) => break,
            Err(ParseError::BadVersion(version)) => {
                warn!(version, "dropping frame with bad protocol version");
            }
            Err(e) => {
                error!(%e, "unrecoverable framing error on gateway link");
                return false;
            }
        }
    }

    let outbound = manager.take_outbound();
    if !outbound.is_empty() {
        link.queue(&outbound);
    }
    link.flush().is_ok()
}
