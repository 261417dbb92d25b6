use ipnet::Ipv4Net;
use tracing::{debug, info};

use crate::{
    error::{already_exists, Error, Result},
    ip::calculate_bridge_ip,
    link::{BridgeAttrs, Link, LinkKind},
    socket::RouteSocket,
    types::NetConf,
};

/// What has to happen for a link to carry a given address.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum AddrAction {
    Add,
    Present,
    Conflict,
}

pub(crate) fn reconcile_addr(existing: &[Ipv4Net], wanted: &Ipv4Net) -> AddrAction {
    if existing.is_empty() {
        AddrAction::Add
    } else if existing.contains(wanted) {
        AddrAction::Present
    } else {
        AddrAction::Conflict
    }
}

pub fn bridge_by_name(socket: &mut RouteSocket, name: &str) -> Result<Link> {
    let link = socket
        .link_by_name(name)
        .map_err(|source| Error::LinkNotFound {
            name: name.to_string(),
            source,
        })?;

    match link.kind {
        LinkKind::Bridge => Ok(link),
        kind => Err(Error::NotABridge {
            name: name.to_string(),
            kind,
        }),
    }
}

/// Creates the bridge `name`, or adopts an existing bridge of that name, and brings it up.
pub fn ensure_bridge(socket: &mut RouteSocket, name: &str, mtu: u32) -> Result<Link> {
    let attrs = BridgeAttrs::new(name, mtu);

    let bridge = match socket.link_add(attrs.to_message()) {
        Ok(()) => {
            debug!(bridge = name, mtu, "created bridge");
            bridge_by_name(socket, name)?
        }
        // it's ok if the device already exists as long as it is a bridge
        Err(e) if already_exists(&e) => bridge_by_name(socket, name)?,
        Err(e) => return Err(Error::netlink(format!("could not add {:?}", name), e)),
    };

    socket
        .link_set_up(bridge.index)
        .map_err(|e| Error::netlink(format!("failed to set {:?} up", name), e))?;

    Ok(bridge)
}

/// Makes sure `bridge` carries `wanted`. Never removes or replaces a different address.
pub fn ensure_bridge_addr(socket: &mut RouteSocket, bridge: &Link, wanted: Ipv4Net) -> Result<()> {
    let existing = socket.addr_list_v4(bridge.index).map_err(|e| {
        Error::netlink(
            format!("could not list IP addresses of {:?}", bridge.name),
            e,
        )
    })?;

    match reconcile_addr(&existing, &wanted) {
        AddrAction::Present => {
            debug!(bridge = %bridge.name, addr = %wanted, "bridge address already set");
            Ok(())
        }
        AddrAction::Conflict => Err(Error::AddressConflict {
            link: bridge.name.clone(),
            wanted,
            existing,
        }),
        AddrAction::Add => {
            socket.addr_add_v4(bridge.index, wanted).map_err(|e| {
                Error::netlink(format!("could not add IP address to {:?}", bridge.name), e)
            })?;
            info!(bridge = %bridge.name, addr = %wanted, "assigned bridge address");
            Ok(())
        }
    }
}

/// Assigns the gateway address computed from `conf` to the configured bridge.
pub fn set_bridge_ip(socket: &mut RouteSocket, conf: &NetConf) -> Result<()> {
    let wanted = calculate_bridge_ip(conf)?;

    let link = socket
        .link_by_name(&conf.bridge_name)
        .map_err(|source| Error::LinkNotFound {
            name: conf.bridge_name.clone(),
            source,
        })?;

    ensure_bridge_addr(socket, &link, wanted)
}

/// Ensures the bridge and, when `assignBridgeIP` is set, its gateway address.
pub fn setup_bridge(socket: &mut RouteSocket, conf: &NetConf) -> Result<Link> {
    let bridge = ensure_bridge(socket, &conf.bridge_name, conf.mtu)?;

    if conf.assign_bridge_ip {
        let wanted = calculate_bridge_ip(conf)?;
        ensure_bridge_addr(socket, &bridge, wanted)?;
    }

    Ok(bridge)
}
