// Copyright 2023 Matthew Ingwersen.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! The UDP transport used for all queries.
//!
//! The [`Transport`] trait is the seam between the query logic and the
//! network: the resolver and the prober are generic over it, so tests
//! can substitute scripted servers without opening sockets.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::time::{Duration, Instant};

/// The DNS port.
pub const DNS_PORT: u16 = 53;

/// How long to wait for a response to a query. A query is attempted
/// exactly once; there are no retries at this layer.
pub const EXCHANGE_TIMEOUT: Duration = Duration::from_secs(5);

/// The receive buffer size. This accommodates the 4096-octet EDNS
/// payload size we advertise.
const RECEIVE_BUFFER_SIZE: usize = 4096;

////////////////////////////////////////////////////////////////////////
// THE TRANSPORT SEAM                                                 //
////////////////////////////////////////////////////////////////////////

/// A one-shot DNS message exchange.
pub trait Transport {
    /// Sends `query` to `server` and waits for a matching response.
    /// Returns `Ok(None)` if the wait timed out. Datagrams from the
    /// wrong source or with the wrong message ID do not count as
    /// responses.
    fn exchange(&self, server: Ipv4Addr, query: &[u8]) -> io::Result<Option<Vec<u8>>>;
}

////////////////////////////////////////////////////////////////////////
// UDP IMPLEMENTATION                                                 //
////////////////////////////////////////////////////////////////////////

/// The production [`Transport`]: plain UDP, one ephemeral socket per
/// exchange.
pub struct UdpTransport {
    port: u16,
    timeout: Duration,
}

impl UdpTransport {
    /// Creates a `UdpTransport` targeting the given destination port
    /// with the given receive timeout. Production use is
    /// `UdpTransport::default()`; the parameters exist so tests can
    /// target mock servers on unprivileged ports.
    pub fn new(port: u16, timeout: Duration) -> Self {
        Self { port, timeout }
    }
}

impl Default for UdpTransport {
    fn default() -> Self {
        Self::new(DNS_PORT, EXCHANGE_TIMEOUT)
    }
}

impl Transport for UdpTransport {
    fn exchange(&self, server: Ipv4Addr, query: &[u8]) -> io::Result<Option<Vec<u8>>> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        let target = SocketAddrV4::new(server, self.port);
        socket.send_to(query, target)?;

        let deadline = Instant::now() + self.timeout;
        let mut buf = [0; RECEIVE_BUFFER_SIZE];
        loop {
            // Recompute the remaining time before every receive so that
            // mismatched datagrams can't extend the overall wait.
            let remaining = match deadline.checked_duration_since(Instant::now()) {
                Some(remaining) if !remaining.is_zero() => remaining,
                _ => return Ok(None),
            };
            socket.set_read_timeout(Some(remaining))?;
            let (len, src) = match socket.recv_from(&mut buf) {
                Ok(received) => received,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(None),
                Err(e) if e.kind() == io::ErrorKind::TimedOut => return Ok(None),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            if src != SocketAddr::V4(target) {
                continue;
            }
            if len < 2 || buf[0..2] != query[0..2] {
                continue;
            }
            return Ok(Some(buf[..len].to_vec()));
        }
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
