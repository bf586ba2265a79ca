//! Multicast group probing
//!
//! Walks a range of group addresses, joins each one briefly, and reports the
//! groups that carry traffic along with the service name from their SDT.

use serde::Serialize;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use tokio::net::UdpSocket;
use tokio::time::{timeout, Instant};

use crate::config::ScannerConfig;
use crate::constants::MAX_DATAGRAM_SIZE;
use crate::error::ScanError;
use crate::scanner::sdt::parse_service_info;

/// A group that answered the probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveredChannel {
    pub address: Ipv4Addr,
    pub port: u16,
    pub service_name: String,
    /// `None` when no SDT arrived during the hunt
    pub provider: Option<String>,
    pub service_id: Option<u16>,
}

/// Progress callback payload
#[derive(Debug, Clone, Copy)]
pub struct ScanProgress {
    pub address: Ipv4Addr,
    pub completed: usize,
    pub total: usize,
}

impl ScanProgress {
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            100
        } else {
            (self.completed * 100 / self.total) as u8
        }
    }
}

/// Sweeps consecutive multicast groups
pub struct ChannelScanner {
    config: ScannerConfig,
}

impl ChannelScanner {
    pub fn new(config: ScannerConfig) -> Self {
        Self { config }
    }

    /// Group addresses to probe: the start address with its last octet
    /// incremented `limit` times
    pub fn addresses(&self) -> Result<Vec<Ipv4Addr>, ScanError> {
        let start = self.config.start_address;
        let [a, b, c, d] = start.octets();

        if u16::from(d) + self.config.limit > 256 {
            return Err(ScanError::RangeOverflow {
                start,
                limit: self.config.limit,
            });
        }

        Ok((0..self.config.limit)
            .map(|i| Ipv4Addr::new(a, b, c, d + i as u8))
            .collect())
    }

    /// Probe every address in range, reporting progress after each one
    ///
    /// A failure on one address is logged and skipped.
    pub async fn scan(
        &self,
        mut on_progress: impl FnMut(ScanProgress),
    ) -> Result<Vec<DiscoveredChannel>, ScanError> {
        let addresses = self.addresses()?;
        let total = addresses.len();
        let mut found = Vec::new();

        for (i, address) in addresses.into_iter().enumerate() {
            tracing::debug!("Checking {}...", address);

            match self.probe(address).await {
                Ok(Some(channel)) => {
                    tracing::info!("Found '{}' at {}", channel.service_name, address);
                    found.push(channel);
                }
                Ok(None) => {}
                Err(e) => tracing::debug!("Skipping {}: {}", address, e),
            }

            on_progress(ScanProgress {
                address,
                completed: i + 1,
                total,
            });
        }

        Ok(found)
    }

    /// Join one group and look for traffic, then for its SDT
    pub async fn probe(&self, group: Ipv4Addr) -> Result<Option<DiscoveredChannel>, ScanError> {
        let socket = open_group_socket(group, self.config.port)?;
        let result = self.listen(&socket, group).await;

        if let Err(e) = socket.leave_multicast_v4(group, Ipv4Addr::UNSPECIFIED) {
            tracing::trace!("Leaving {} failed: {}", group, e);
        }
        Ok(result)
    }

    async fn listen(&self, socket: &UdpSocket, group: Ipv4Addr) -> Option<DiscoveredChannel> {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

        // any datagram at all means the group is live
        match timeout(self.config.peek_timeout(), socket.recv(&mut buf)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                tracing::debug!("Receive on {} failed: {}", group, e);
                return None;
            }
            Err(_) => return None,
        }

        let mut channel = DiscoveredChannel {
            address: group,
            port: self.config.port,
            service_name: format!("Unknown Channel {}", group.octets()[3]),
            provider: None,
            service_id: None,
        };

        let deadline = Instant::now() + self.config.hunt_duration();
        while Instant::now() < deadline {
            let n = match timeout(self.config.read_timeout(), socket.recv(&mut buf)).await {
                Ok(Ok(n)) => n,
                _ => break,
            };

            if let Some(info) = parse_service_info(&buf[..n]) {
                channel.service_name = info.name;
                channel.provider = Some(info.provider);
                channel.service_id = Some(info.service_id);
                break;
            }
        }

        Some(channel)
    }
}

/// UDP socket joined to `group`, shareable with players on the same port
fn open_group_socket(group: Ipv4Addr, port: u16) -> Result<UdpSocket, ScanError> {
    let group_addr = SocketAddr::V4(SocketAddrV4::new(group, port));
    let socket_err = |source| ScanError::Socket {
        address: group_addr,
        source,
    };

    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).map_err(socket_err)?;
    socket.set_reuse_address(true).map_err(socket_err)?;

    // binding to the group address filters out other groups on the same
    // port; not every platform allows it
    if socket.bind(&group_addr.into()).is_err() {
        let any = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port));
        socket.bind(&any.into()).map_err(socket_err)?;
    }

    socket
        .join_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED)
        .map_err(|source| ScanError::JoinFailed { group, source })?;
    socket.set_nonblocking(true).map_err(socket_err)?;

    UdpSocket::from_std(socket.into()).map_err(socket_err)
}
