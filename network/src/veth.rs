use std::os::fd::AsRawFd;

use netlink_packet_route::{
    nlas::link::{Info, InfoData, InfoKind, Nla, VethInfo},
    LinkMessage,
};
use tracing::debug;

use crate::{
    error::{Error, Result},
    link::Link,
    netns::NetNs,
    socket::RouteSocket,
};

fn random_veth_name() -> String {
    format!("veth{:08x}", rand::random::<u32>())
}

fn veth_message(if_name: &str, peer_name: &str, mtu: u32, peer_ns: &NetNs) -> LinkMessage {
    let mut peer = LinkMessage::default();
    peer.nlas.push(Nla::IfName(peer_name.to_string()));
    if mtu > 0 {
        peer.nlas.push(Nla::Mtu(mtu));
    }
    peer.nlas.push(Nla::NetNsFd(peer_ns.as_raw_fd()));

    let mut msg = LinkMessage::default();
    msg.nlas.push(Nla::IfName(if_name.to_string()));
    if mtu > 0 {
        msg.nlas.push(Nla::Mtu(mtu));
    }
    msg.nlas.push(Nla::Info(vec![
        Info::Kind(InfoKind::Veth),
        Info::Data(InfoData::Veth(VethInfo::Peer(peer))),
    ]));
    msg
}

/// Creates a veth pair with `if_name` inside `netns` and its peer in the
/// calling namespace, then attaches the peer to `bridge`. Returns the host end.
///
/// Earlier steps are not undone when a later one fails.
pub fn setup_veth(
    netns: &NetNs,
    bridge: &Link,
    if_name: &str,
    mtu: u32,
    hairpin_mode: bool,
) -> Result<Link> {
    let host_veth_name = netns.run(|host_ns| {
        let host_veth_name = random_veth_name();
        let mut socket = RouteSocket::new()
            .map_err(|e| Error::netlink("failed to open netlink socket", e))?;

        socket
            .link_add(veth_message(if_name, &host_veth_name, mtu, host_ns))
            .map_err(|e| {
                Error::netlink(
                    format!("failed to make veth pair {:?} <-> {:?}", if_name, host_veth_name),
                    e,
                )
            })?;

        debug!(
            container_veth = if_name,
            host_veth = %host_veth_name,
            netns = %netns.path().display(),
            "created veth pair"
        );

        Ok(host_veth_name)
    })?;

    let mut socket =
        RouteSocket::new().map_err(|e| Error::netlink("failed to open netlink socket", e))?;

    // the host end was created from inside the container namespace; look it up
    // again here rather than trusting any index seen over there
    let host_veth = socket
        .link_by_name(&host_veth_name)
        .map_err(|source| Error::LinkNotFound {
            name: host_veth_name.clone(),
            source,
        })?;

    socket.link_set_up(host_veth.index).map_err(|e| {
        Error::netlink(format!("failed to set {:?} up", host_veth_name), e)
    })?;

    socket
        .link_set_master(host_veth.index, bridge.index)
        .map_err(|e| {
            Error::netlink(
                format!(
                    "failed to connect {:?} to bridge {:?}",
                    host_veth_name, bridge.name
                ),
                e,
            )
        })?;

    socket
        .link_set_hairpin(host_veth.index, hairpin_mode)
        .map_err(|source| Error::Hairpin {
            name: host_veth_name.clone(),
            source,
        })?;

    debug!(
        host_veth = %host_veth.name,
        bridge = %bridge.name,
        hairpin_mode,
        "attached veth to bridge"
    );

    Ok(host_veth)
}
