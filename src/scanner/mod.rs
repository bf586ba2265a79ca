//! Multicast channel scanner
//!
//! Finds which simulated channels are on air by joining their groups and
//! reading the service name out of the transport stream.

pub mod probe;
pub mod sdt;

pub use probe::{ChannelScanner, DiscoveredChannel, ScanProgress};
pub use sdt::{parse_service_info, parse_service_name, ServiceInfo};
