use anyhow::{Context, Result};
use network::{
    configure_interface, interface_exists, set_interface_mac_address, setup_bridge, setup_veth,
    CmdArgs, IpamResult, NetConf, NetNs, RouteSocket,
};
use serde_json::Value;
use tracing::info;

/// Attaches the container to the bridge and configures its interface with
/// whatever `ipam` hands out. The IPAM result is returned verbatim.
pub fn add<F>(args: &CmdArgs, conf: &NetConf, mac: Option<&str>, ipam: F) -> Result<String>
where
    F: FnOnce() -> Result<(IpamResult, Value)>,
{
    let mut socket = RouteSocket::new().context("failed to open netlink socket")?;
    let bridge = setup_bridge(&mut socket, conf)?;

    let netns = NetNs::open(&args.netns)?;

    if interface_exists(&args.netns, &args.if_name) {
        info!(
            container_id = %args.container_id,
            if_name = %args.if_name,
            "container interface already exists, skipping veth setup"
        );
    } else {
        let host_veth = setup_veth(&netns, &bridge, &args.if_name, conf.mtu, conf.hairpin_mode)?;
        info!(
            container_id = %args.container_id,
            host_veth = %host_veth.name,
            bridge = %bridge.name,
            "connected container to bridge"
        );
    }

    let (result, raw) = ipam()?;

    netns.run(|_| {
        if let Some(mac) = mac {
            set_interface_mac_address(&args.if_name, mac)?;
        }
        configure_interface(&args.if_name, &result)
    })?;

    info!(
        container_id = %args.container_id,
        ip = %result.ip,
        "configured container interface"
    );

    Ok(raw.to_string())
}
