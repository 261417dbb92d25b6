use std::path::Path;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, info};

use crate::{
    error::{already_exists, Error, Result},
    link::Link,
    netns::NetNs,
    socket::RouteSocket,
    types::IpamResult,
};

fn lookup(socket: &mut RouteSocket, if_name: &str) -> Result<Link> {
    socket
        .link_by_name(if_name)
        .map_err(|source| Error::LinkNotFound {
            name: if_name.to_string(),
            source,
        })
}

/// Applies an IPAM result to `if_name` in the calling namespace.
///
/// An address or route that is already present is left alone; the first
/// route installed for a destination wins.
pub fn configure_interface(if_name: &str, res: &IpamResult) -> Result<()> {
    let mut socket =
        RouteSocket::new().map_err(|e| Error::netlink("failed to open netlink socket", e))?;
    let link = lookup(&mut socket, if_name)?;

    socket
        .link_set_up(link.index)
        .map_err(|e| Error::netlink(format!("failed to set {:?} UP", if_name), e))?;

    // TODO: IPv6 addresses and routes
    match socket.addr_add_v4(link.index, res.ip) {
        Ok(()) => debug!(interface = if_name, addr = %res.ip, "added address"),
        Err(e) if already_exists(&e) => {
            info!(
                interface = if_name,
                addr = %res.ip,
                "interface already has IP address, no worries"
            );
        }
        Err(e) => {
            return Err(Error::netlink(
                format!("failed to add IP addr {} to {:?}", res.ip, if_name),
                e,
            ))
        }
    }

    for route in &res.routes {
        let gw = res.gateway_for(route);

        match socket.route_add_v4(link.index, route.dst, gw) {
            Ok(()) => debug!(interface = if_name, dst = %route.dst, gw = ?gw, "added route"),
            Err(e) if already_exists(&e) => {
                debug!(interface = if_name, dst = %route.dst, "route already present, skipping");
            }
            Err(e) => {
                let via = gw.map(|gw| gw.to_string()).unwrap_or_default();
                return Err(Error::netlink(
                    format!("failed to add route '{} via {} dev {}'", route.dst, via, if_name),
                    e,
                ));
            }
        }
    }

    Ok(())
}

/// True when `if_name` can be found inside the namespace at `netns`. Every
/// failure, including an unopenable namespace, reads as absent.
pub fn interface_exists<P: AsRef<Path>>(netns: P, if_name: &str) -> bool {
    let found = NetNs::open(netns).and_then(|ns| {
        ns.run(|_| {
            let mut socket = RouteSocket::new()
                .map_err(|e| Error::netlink("failed to open netlink socket", e))?;
            lookup(&mut socket, if_name)
        })
    });

    found.is_ok()
}

/// Parses a 6-octet hardware address in colon, hyphen or dotted
/// (`0242.ac11.0002`) notation.
pub fn parse_mac(mac: &str) -> Result<[u8; 6]> {
    lazy_static! {
        static ref RE: Regex = Regex::new(
            r"^(?:[0-9A-Fa-f]{2}(?::[0-9A-Fa-f]{2}){5}|[0-9A-Fa-f]{2}(?:-[0-9A-Fa-f]{2}){5}|[0-9A-Fa-f]{4}(?:\.[0-9A-Fa-f]{4}){2})$"
        )
        .unwrap();
    }

    if !RE.is_match(mac) {
        return Err(Error::InvalidMac(mac.to_string()));
    }

    let digits: Vec<u8> = mac.bytes().filter(u8::is_ascii_hexdigit).collect();

    let mut octets = [0u8; 6];
    for (octet, pair) in octets.iter_mut().zip(digits.chunks(2)) {
        let pair = std::str::from_utf8(pair).map_err(|_| Error::InvalidMac(mac.to_string()))?;
        *octet = u8::from_str_radix(pair, 16).map_err(|_| Error::InvalidMac(mac.to_string()))?;
    }

    Ok(octets)
}

/// Sets the hardware address of `if_name` in the calling namespace.
pub fn set_interface_mac_address(if_name: &str, mac: &str) -> Result<()> {
    let hwaddr = parse_mac(mac)?;

    let mut socket =
        RouteSocket::new().map_err(|e| Error::netlink("failed to open netlink socket", e))?;
    let link = lookup(&mut socket, if_name)?;

    socket
        .link_set_address(link.index, hwaddr)
        .map_err(|e| {
            Error::netlink(
                format!("failed to set hw address of interface {:?}", if_name),
                e,
            )
        })?;

    debug!(interface = if_name, mac, "set hardware address");
    Ok(())
}
