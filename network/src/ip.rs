use std::net::Ipv4Addr;

use ipnet::Ipv4Net;

use crate::{
    error::{Error, Result},
    types::NetConf,
};

fn ip_to_binary(ip: Ipv4Addr) -> u32 {
    let octets = ip.octets();
    (octets[0] as u32) << 24
        | (octets[1] as u32) << 16
        | (octets[2] as u32) << 8
        | (octets[3] as u32)
}

pub fn next_ip(ip: Ipv4Addr) -> Option<Ipv4Addr> {
    ip_to_binary(ip).checked_add(1).map(Ipv4Addr::from)
}

/// Parses `bridgeSubnet`, which is mandatory for any bridge addressing.
pub fn bridge_subnet(conf: &NetConf) -> Result<Ipv4Net> {
    let subnet = conf
        .bridge_subnet
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::invalid_config("mandatory bridgeSubnet not specified in config"))?;

    let subnet = subnet.parse::<Ipv4Net>().map_err(|e| {
        Error::invalid_config(format!("invalid bridgeSubnet {:?}: {}", subnet, e))
    })?;

    Ok(subnet.trunc())
}

/// Gateway address of the bridge: `bridgeIP` when set, otherwise the first
/// host of `bridgeSubnet`, always with the subnet's prefix length.
pub fn calculate_bridge_ip(conf: &NetConf) -> Result<Ipv4Net> {
    let subnet = bridge_subnet(conf)?;

    let ip = match conf.bridge_ip.as_deref().filter(|s| !s.is_empty()) {
        Some(bridge_ip) => parse_ip_or_cidr(bridge_ip).ok_or_else(|| {
            Error::invalid_config(format!("invalid bridgeIP {:?} specified in config", bridge_ip))
        })?,
        None => next_ip(subnet.network())
            .ok_or_else(|| Error::invalid_config(format!("{} has no usable host address", subnet)))?,
    };

    if !subnet.contains(&ip) {
        return Err(Error::invalid_config(format!(
            "bridgeIP {} is not in bridgeSubnet {}",
            ip, subnet
        )));
    }

    Ipv4Net::new(ip, subnet.prefix_len()).map_err(|e| Error::invalid_config(e.to_string()))
}

fn parse_ip_or_cidr(s: &str) -> Option<Ipv4Addr> {
    s.parse::<Ipv4Addr>()
        .ok()
        .or_else(|| s.parse::<Ipv4Net>().ok().map(|net| net.addr()))
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use crate::{error::Error, types::NetConf};

    use super::{calculate_bridge_ip, ip_to_binary, next_ip};

    fn conf(subnet: &str, ip: &str) -> NetConf {
        NetConf {
            bridge_subnet: Some(subnet.to_string()),
            bridge_ip: Some(ip.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn ip_to_binary_test() {
        let ip = Ipv4Addr::new(10, 244, 0, 1);
        let binary = ip_to_binary(ip);

        assert_eq!(binary, 0b00001010_11110100_00000000_00000001);
    }

    #[test]
    fn next_ip_test() {
        assert_eq!(
            next_ip(Ipv4Addr::new(10, 0, 0, 255)),
            Some(Ipv4Addr::new(10, 0, 1, 0))
        );
        assert_eq!(next_ip(Ipv4Addr::BROADCAST), None);
    }

    #[test]
    fn default_bridge_ip_test() {
        let ip = calculate_bridge_ip(&conf("10.0.0.0/24", "")).unwrap();
        assert_eq!(ip.to_string(), "10.0.0.1/24");
    }

    #[test]
    fn default_bridge_ip_from_host_bits_test() {
        let ip = calculate_bridge_ip(&conf("10.244.3.77/16", "")).unwrap();
        assert_eq!(ip.to_string(), "10.244.0.1/16");
    }

    #[test]
    fn explicit_bridge_ip_test() {
        let ip = calculate_bridge_ip(&conf("10.0.0.0/24", "10.0.0.5")).unwrap();
        assert_eq!(ip.to_string(), "10.0.0.5/24");
    }

    #[test]
    fn explicit_bridge_ip_cidr_takes_subnet_prefix_test() {
        let ip = calculate_bridge_ip(&conf("10.0.0.0/24", "10.0.0.5/30")).unwrap();
        assert_eq!(ip.to_string(), "10.0.0.5/24");
    }

    #[test]
    fn bridge_ip_outside_subnet_test() {
        let err = calculate_bridge_ip(&conf("10.0.0.0/24", "10.1.0.5")).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn unparseable_bridge_ip_test() {
        let err = calculate_bridge_ip(&conf("10.0.0.0/24", "10.0.0.x")).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn missing_subnet_test() {
        let conf = NetConf::default();
        let err = calculate_bridge_ip(&conf).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn invalid_subnet_test() {
        let err = calculate_bridge_ip(&conf("fd00::/64", "")).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn host_subnet_has_no_gateway_test() {
        let err = calculate_bridge_ip(&conf("10.0.0.7/32", "")).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }
}
