//! Attaches container network namespaces to a shared Linux bridge.
//!
//! Every operation converges: running it again for the same bridge or
//! container leaves the host as it was after the first successful run.

mod macros;

pub mod bridge;
pub mod error;
pub mod iface;
pub mod ip;
pub mod link;
pub mod netns;
pub mod socket;
pub mod types;
pub mod veth;

pub use bridge::{ensure_bridge, ensure_bridge_addr, set_bridge_ip, setup_bridge};
pub use error::{Error, Result};
pub use iface::{configure_interface, interface_exists, set_interface_mac_address};
pub use ip::calculate_bridge_ip;
pub use netns::NetNs;
pub use socket::RouteSocket;
pub use types::{CmdArgs, IpamResult, NetConf, Route};
pub use veth::setup_veth;
