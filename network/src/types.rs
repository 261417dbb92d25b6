use std::{net::Ipv4Addr, path::PathBuf};

use ipnet::Ipv4Net;
use serde::Deserialize;

pub const DEFAULT_BRIDGE_NAME: &str = "cni0";
pub const DEFAULT_MTU: u32 = 1500;

fn default_bridge_name() -> String {
    DEFAULT_BRIDGE_NAME.to_string()
}

fn default_mtu() -> u32 {
    DEFAULT_MTU
}

/// Bridge network configuration, as found in the CNI network config.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetConf {
    #[serde(default)]
    pub cni_version: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "bridge", default = "default_bridge_name")]
    pub bridge_name: String,
    #[serde(default)]
    pub bridge_subnet: Option<String>,
    #[serde(rename = "bridgeIP", default)]
    pub bridge_ip: Option<String>,
    #[serde(default = "default_mtu")]
    pub mtu: u32,
    #[serde(default)]
    pub hairpin_mode: bool,
    /// Whether the bridge gets its own gateway address from `bridgeSubnet`.
    #[serde(rename = "assignBridgeIP", default)]
    pub assign_bridge_ip: bool,
    #[serde(default)]
    pub mac_address: Option<String>,
}

impl Default for NetConf {
    fn default() -> Self {
        Self {
            cni_version: String::new(),
            name: String::new(),
            bridge_name: default_bridge_name(),
            bridge_subnet: None,
            bridge_ip: None,
            mtu: DEFAULT_MTU,
            hairpin_mode: false,
            assign_bridge_ip: false,
            mac_address: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CmdArgs {
    pub container_id: String,
    pub netns: PathBuf,
    pub if_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Route {
    pub dst: Ipv4Net,
    #[serde(default)]
    pub gw: Option<Ipv4Addr>,
}

/// IPv4 configuration handed out by the IPAM step.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IpamResult {
    pub ip: Ipv4Net,
    #[serde(default)]
    pub gateway: Option<Ipv4Addr>,
    #[serde(default)]
    pub routes: Vec<Route>,
}

impl IpamResult {
    /// Next hop for `route`: its own gateway, else the IPAM default gateway.
    pub fn gateway_for(&self, route: &Route) -> Option<Ipv4Addr> {
        route.gw.or(self.gateway)
    }
}
