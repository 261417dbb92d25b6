use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use network::{calculate_bridge_ip, ensure_bridge, set_bridge_ip, NetConf, RouteSocket};
use serde_json::{json, Value};
use tracing::info;
use tracing_subscriber::EnvFilter;

const CNI_VERSION: &str = "0.4.0";

/// Prepares the host bridge and writes the network config for bridge-cni.
#[derive(Debug, Parser)]
#[command(name = "install", version)]
struct Opts {
    #[arg(long, default_value = network::types::DEFAULT_BRIDGE_NAME)]
    bridge: String,
    /// Subnet the bridge and its containers live in
    #[arg(long)]
    subnet: String,
    /// Gateway address for the bridge, by default the first host of the subnet
    #[arg(long)]
    bridge_ip: Option<String>,
    #[arg(long, default_value_t = network::types::DEFAULT_MTU)]
    mtu: u32,
    #[arg(long)]
    hairpin_mode: bool,
    #[arg(long, default_value = "/etc/cni/net.d/08-bridge.conf")]
    conf_path: PathBuf,
}

impl Opts {
    fn net_conf(&self) -> NetConf {
        NetConf {
            cni_version: CNI_VERSION.to_string(),
            name: "bridge".to_string(),
            bridge_name: self.bridge.clone(),
            bridge_subnet: Some(self.subnet.clone()),
            bridge_ip: self.bridge_ip.clone(),
            mtu: self.mtu,
            hairpin_mode: self.hairpin_mode,
            ..Default::default()
        }
    }
}

fn setup_bridge(conf: &NetConf) -> Result<()> {
    let mut socket = RouteSocket::new().context("failed to open netlink socket")?;

    ensure_bridge(&mut socket, &conf.bridge_name, conf.mtu)?;
    set_bridge_ip(&mut socket, conf)?;

    Ok(())
}

/// Network config handed to the runtime. The bridge already carries its
/// address, so the plugin is told not to assign one.
fn cni_conf(conf: &NetConf) -> Result<Value> {
    let gateway = calculate_bridge_ip(conf)?;
    let subnet = network::ip::bridge_subnet(conf)?;

    Ok(json!({
        "cniVersion": conf.cni_version,
        "name": conf.name,
        "type": "bridge-cni",
        "bridge": conf.bridge_name,
        "bridgeSubnet": subnet.to_string(),
        "mtu": conf.mtu,
        "hairpinMode": conf.hairpin_mode,
        "assignBridgeIP": false,
        "ipam": {
            "type": "host-local",
            "ranges": [[{ "subnet": subnet.to_string(), "gateway": gateway.addr().to_string() }]],
            "routes": [{ "dst": "0.0.0.0/0" }]
        }
    }))
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let opts = Opts::parse();
    let conf = opts.net_conf();

    setup_bridge(&conf).with_context(|| format!("failed to set up bridge {:?}", conf.bridge_name))?;
    info!(bridge = %conf.bridge_name, "bridge is ready");

    let net_conf = serde_json::to_string_pretty(&cni_conf(&conf)?)?;
    fs::write(&opts.conf_path, net_conf)
        .with_context(|| format!("failed to write {}", opts.conf_path.display()))?;
    info!(path = %opts.conf_path.display(), "wrote network config");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opts_test() {
        let opts = Opts::try_parse_from(["install", "--subnet", "10.244.0.0/24"]).unwrap();

        assert_eq!(opts.bridge, "cni0");
        assert_eq!(opts.mtu, 1500);
        assert!(!opts.hairpin_mode);
        assert_eq!(opts.conf_path, PathBuf::from("/etc/cni/net.d/08-bridge.conf"));
        assert!(Opts::try_parse_from(["install"]).is_err());
    }

    #[test]
    fn cni_conf_test() {
        let opts = Opts::try_parse_from([
            "install",
            "--bridge",
            "br0",
            "--subnet",
            "10.244.0.0/24",
            "--mtu",
            "1450",
            "--hairpin-mode",
        ])
        .unwrap();

        let conf = cni_conf(&opts.net_conf()).unwrap();

        assert_eq!(conf["type"], "bridge-cni");
        assert_eq!(conf["bridge"], "br0");
        assert_eq!(conf["mtu"], 1450);
        assert_eq!(conf["hairpinMode"], true);
        assert_eq!(conf["assignBridgeIP"], false);
        assert_eq!(conf["ipam"]["ranges"][0][0]["gateway"], "10.244.0.1");

        let parsed: NetConf = serde_json::from_value(conf).unwrap();
        assert_eq!(parsed.bridge_name, "br0");
        assert_eq!(parsed.bridge_subnet.as_deref(), Some("10.244.0.0/24"));
    }

    #[test]
    fn cni_conf_invalid_subnet_test() {
        let opts = Opts::try_parse_from(["install", "--subnet", "not-a-subnet"]).unwrap();
        assert!(cni_conf(&opts.net_conf()).is_err());
    }
}
