// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! UDP sockets owned by a context.
//!
//! Five sockets, all bound to `host_ip` on ephemeral ports and switched to
//! non-blocking mode so that a send never waits on the kernel:
//!
//! | Socket | Direction | Announced as |
//! |--------|-----------|--------------|
//! | publisher | send data frames | `EndpointKind::Publisher` |
//! | subscriber | receive data frames | `EndpointKind::Subscriber` |
//! | requester | send requests | - |
//! | response receiver | receive responses | - (carried in `reply_to`) |
//! | replier | receive requests, send responses | `EndpointKind::ServiceProvider` |

use crate::error::{Error, Result};
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{IpAddr, SocketAddr, UdpSocket};

/// Receive buffer size requested for the inbound sockets.
const RECV_BUFFER_SIZE: usize = 1024 * 1024;

pub struct Sockets {
    publisher: UdpSocket,
    subscriber: UdpSocket,
    requester: UdpSocket,
    response_receiver: UdpSocket,
    replier: UdpSocket,
}

impl Sockets {
    /// Bind all five sockets on `ip`.
    pub fn bind(ip: IpAddr) -> Result<Self> {
        let sockets = Self {
            publisher: bind_udp(ip, false)?,
            subscriber: bind_udp(ip, true)?,
            requester: bind_udp(ip, false)?,
            response_receiver: bind_udp(ip, true)?,
            replier: bind_udp(ip, true)?,
        };
        log::debug!(
            "[Transport] bound pub={} sub={} req={} rsp={} rep={}",
            local(&sockets.publisher),
            local(&sockets.subscriber),
            local(&sockets.requester),
            local(&sockets.response_receiver),
            local(&sockets.replier)
        );
        Ok(sockets)
    }

    pub fn publisher_addr(&self) -> Result<SocketAddr> {
        Ok(self.publisher.local_addr()?)
    }

    pub fn subscriber_addr(&self) -> Result<SocketAddr> {
        Ok(self.subscriber.local_addr()?)
    }

    pub fn response_addr(&self) -> Result<SocketAddr> {
        Ok(self.response_receiver.local_addr()?)
    }

    pub fn replier_addr(&self) -> Result<SocketAddr> {
        Ok(self.replier.local_addr()?)
    }

    pub(crate) fn publisher(&self) -> &UdpSocket {
        &self.publisher
    }

    pub(crate) fn requester(&self) -> &UdpSocket {
        &self.requester
    }

    pub(crate) fn replier(&self) -> &UdpSocket {
        &self.replier
    }

    /// Clones of the three inbound sockets for registration with `mio`.
    pub(crate) fn inbound_clones(&self) -> io::Result<InboundSockets> {
        Ok(InboundSockets {
            subscriber: mio::net::UdpSocket::from_std(self.subscriber.try_clone()?),
            replier: mio::net::UdpSocket::from_std(self.replier.try_clone()?),
            response_receiver: mio::net::UdpSocket::from_std(self.response_receiver.try_clone()?),
        })
    }
}

/// Inbound sockets as seen by the reception thread.
pub(crate) struct InboundSockets {
    pub(crate) subscriber: mio::net::UdpSocket,
    pub(crate) replier: mio::net::UdpSocket,
    pub(crate) response_receiver: mio::net::UdpSocket,
}

/// Send one datagram. `WouldBlock` is reported as a send failure rather than
/// retried.
pub(crate) fn send_datagram(socket: &UdpSocket, buf: &[u8], to: SocketAddr) -> Result<()> {
    match socket.send_to(buf, to) {
        Ok(n) if n == buf.len() => Ok(()),
        Ok(n) => Err(Error::SendFailed(format!(
            "short send to {} ({} of {} bytes)",
            to,
            n,
            buf.len()
        ))),
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => Err(Error::SendFailed(format!(
            "send buffer full for {}",
            to
        ))),
        Err(e) => Err(Error::SendFailed(format!("send to {}: {}", to, e))),
    }
}

fn bind_udp(ip: IpAddr, inbound: bool) -> Result<UdpSocket> {
    let domain = match ip {
        IpAddr::V4(_) => Domain::IPV4,
        IpAddr::V6(_) => Domain::IPV6,
    };
    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))
        .map_err(|e| Error::BindFailed(format!("socket(): {}", e)))?;

    if inbound {
        if let Err(e) = socket.set_recv_buffer_size(RECV_BUFFER_SIZE) {
            log::debug!("[Transport] SO_RCVBUF not applied: {}", e);
        }
    }

    let bind_addr = SocketAddr::new(ip, 0);
    socket
        .bind(&bind_addr.into())
        .map_err(|e| Error::BindFailed(format!("bind {}: {}", bind_addr, e)))?;
    socket
        .set_nonblocking(true)
        .map_err(|e| Error::BindFailed(format!("set_nonblocking: {}", e)))?;

    Ok(socket.into())
}

fn local(socket: &UdpSocket) -> String {
    socket
        .local_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "?".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::time::{Duration, Instant};

    #[test]
    fn test_bind_on_loopback_gives_distinct_ports() {
        let sockets = Sockets::bind(IpAddr::V4(Ipv4Addr::LOCALHOST)).expect("bind");
        let addrs = [
            sockets.publisher_addr().expect("pub"),
            sockets.subscriber_addr().expect("sub"),
            sockets.response_addr().expect("rsp"),
            sockets.replier_addr().expect("rep"),
        ];
        let ports: std::collections::HashSet<u16> = addrs.iter().map(|a| a.port()).collect();
        assert_eq!(ports.len(), addrs.len());
        assert!(addrs.iter().all(|a| a.ip().is_loopback()));
    }

    #[test]
    fn test_datagram_reaches_subscriber_socket() {
        let sockets = Sockets::bind(IpAddr::V4(Ipv4Addr::LOCALHOST)).expect("bind");
        let to = sockets.subscriber_addr().expect("sub");
        send_datagram(sockets.publisher(), b"ping", to).expect("send");

        let mut buf = [0u8; 16];
        let deadline = Instant::now() + Duration::from_secs(1);
        loop {
            match sockets.subscriber.recv_from(&mut buf) {
                Ok((n, from)) => {
                    assert_eq!(&buf[..n], b"ping");
                    assert_eq!(from, sockets.publisher_addr().expect("pub"));
                    break;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    assert!(Instant::now() < deadline, "datagram never arrived");
                    std::thread::sleep(Duration::from_millis(5));
                }
                Err(e) => panic!("recv failed: {}", e),
            }
        }
    }
}
