//! Minimal HTTP/1.1 endpoint that serves the presence feed.
//!
//! One request per connection, answered with `Connection: close`. The accept
//! loop runs non-blocking so the shutdown flag is noticed within one tick, and
//! each accepted connection is answered on its own short-lived thread so a
//! stalled client never holds up the next request.

#![allow(missing_docs)]

use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crate::core::config::FeedConfig;
use crate::core::errors::{PwError, Result};
use crate::feed::rss::render_feed;
use crate::presence::tracker::PresenceView;

const ACCEPT_TICK: Duration = Duration::from_millis(100);
const IO_TIMEOUT: Duration = Duration::from_secs(2);
const MAX_HEADER_LINES: usize = 100;

/// A status line plus body, ready to write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub reason: &'static str,
    pub content_type: &'static str,
    pub body: String,
}

impl Response {
    fn text(status: u16, reason: &'static str) -> Self {
        Self {
            status,
            reason,
            content_type: "text/plain; charset=utf-8",
            body: format!("{status} {reason}\n"),
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut head = format!(
            "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n",
            self.status,
            self.reason,
            self.content_type,
            self.body.len()
        );
        if self.status == 405 {
            head.push_str("Allow: GET, HEAD\r\n");
        }
        head.push_str("\r\n");
        let mut bytes = head.into_bytes();
        bytes.extend_from_slice(self.body.as_bytes());
        bytes
    }
}

/// Request handling shared by every connection thread.
struct FeedRoutes {
    config: FeedConfig,
    view: PresenceView,
}

impl FeedRoutes {
    fn route(&self, method: &str, target: &str) -> Response {
        let path = target.split_once('?').map_or(target, |(p, _)| p);
        if path != self.config.path {
            return Response::text(404, "Not Found");
        }
        match method {
            "GET" | "HEAD" => Response {
                status: 200,
                reason: "OK",
                content_type: "application/rss+xml; charset=utf-8",
                body: render_feed(
                    &self.config.title,
                    &self.config.description,
                    &self.view.render(),
                ),
            },
            _ => Response::text(405, "Method Not Allowed"),
        }
    }

    fn handle(&self, stream: TcpStream) -> std::io::Result<()> {
        stream.set_nonblocking(false)?;
        stream.set_read_timeout(Some(IO_TIMEOUT))?;
        stream.set_write_timeout(Some(IO_TIMEOUT))?;

        let mut reader = BufReader::new(&stream);
        let mut request_line = String::new();
        if reader.read_line(&mut request_line)? == 0 {
            return Ok(());
        }

        // Drain headers; the body of a GET is never needed.
        let mut header = String::new();
        for _ in 0..MAX_HEADER_LINES {
            header.clear();
            if reader.read_line(&mut header)? == 0 || header.trim_end().is_empty() {
                break;
            }
        }

        let mut parts = request_line.split_whitespace();
        let response = match (parts.next(), parts.next()) {
            (Some(method), Some(target)) => self.route(method, target),
            _ => Response::text(400, "Bad Request"),
        };

        let mut bytes = response.to_bytes();
        if request_line.starts_with("HEAD ") {
            let head_len = bytes.len() - response.body.len();
            bytes.truncate(head_len);
        }
        let mut out = &stream;
        out.write_all(&bytes)?;
        out.flush()
    }
}

fn answer(routes: &FeedRoutes, stream: TcpStream, peer: SocketAddr) {
    if let Err(e) = routes.handle(stream) {
        eprintln!("[PW-FEED] request from {peer} failed: {e}");
    }
}

pub struct FeedServer {
    listener: TcpListener,
    routes: Arc<FeedRoutes>,
}

impl FeedServer {
    pub fn bind(config: &FeedConfig, addr: SocketAddr, view: PresenceView) -> Result<Self> {
        let listener = TcpListener::bind(addr).map_err(|e| PwError::Runtime {
            details: format!("cannot bind feed listener on {addr}: {e}"),
        })?;
        listener.set_nonblocking(true).map_err(|e| PwError::Runtime {
            details: format!("cannot configure feed listener: {e}"),
        })?;
        Ok(Self {
            listener,
            routes: Arc::new(FeedRoutes {
                config: config.clone(),
                view,
            }),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().map_err(|e| PwError::Runtime {
            details: format!("feed listener has no local address: {e}"),
        })
    }

    /// Decide the response for one request line.
    pub fn route(&self, method: &str, target: &str) -> Response {
        self.routes.route(method, target)
    }

    /// Accept connections until `stop` is raised, then wait for in-flight
    /// requests. Returns the number of connections accepted.
    pub fn serve(&self, stop: &AtomicBool) -> u64 {
        let mut served = 0_u64;
        let mut in_flight: Vec<thread::JoinHandle<()>> = Vec::new();
        while !stop.load(Ordering::Relaxed) {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    served += 1;
                    in_flight.retain(|h| !h.is_finished());
                    let routes = Arc::clone(&self.routes);
                    let spawned = thread::Builder::new()
                        .name("pw-feed-conn".to_string())
                        .spawn(move || answer(&routes, stream, peer));
                    match spawned {
                        Ok(handle) => in_flight.push(handle),
                        Err(e) => eprintln!("[PW-FEED] cannot spawn handler for {peer}: {e}"),
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_TICK);
                }
                Err(e) => {
                    eprintln!("[PW-FEED] accept failed: {e}");
                    thread::sleep(ACCEPT_TICK);
                }
            }
        }
        // Each handler is bounded by IO_TIMEOUT.
        for handle in in_flight {
            let _ = handle.join();
        }
        served
    }
}

/// Move the feed server onto its own thread.
pub fn spawn_feed_server(
    server: FeedServer,
    stop: Arc<AtomicBool>,
) -> Result<thread::JoinHandle<u64>> {
    thread::Builder::new()
        .name("pw-feed".to_string())
        .spawn(move || server.serve(&stop))
        .map_err(|e| PwError::Runtime {
            details: format!("failed to spawn feed thread: {e}"),
        })
}
