use std::fmt;

use netlink_packet_route::{
    nlas::link::{Info, InfoKind, Nla},
    LinkMessage,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkKind {
    Bridge,
    Veth,
    /// No IFLA_INFO_KIND reported: physical NICs, loopback.
    Device,
    Other(String),
}

impl fmt::Display for LinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkKind::Bridge => write!(f, "bridge"),
            LinkKind::Veth => write!(f, "veth"),
            LinkKind::Device => write!(f, "device"),
            LinkKind::Other(kind) => write!(f, "{}", kind),
        }
    }
}

impl From<&InfoKind> for LinkKind {
    fn from(kind: &InfoKind) -> Self {
        match kind {
            InfoKind::Bridge => LinkKind::Bridge,
            InfoKind::Veth => LinkKind::Veth,
            InfoKind::Other(other) => LinkKind::Other(other.clone()),
            other => LinkKind::Other(format!("{:?}", other).to_lowercase()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub index: u32,
    pub name: String,
    pub kind: LinkKind,
    pub mtu: u32,
}

impl From<LinkMessage> for Link {
    fn from(msg: LinkMessage) -> Self {
        let mut link = Link {
            index: msg.header.index,
            name: String::new(),
            kind: LinkKind::Device,
            mtu: 0,
        };

        for nla in msg.nlas {
            match nla {
                Nla::IfName(name) => link.name = name,
                Nla::Mtu(mtu) => link.mtu = mtu,
                Nla::Info(infos) => {
                    for info in infos {
                        if let Info::Kind(kind) = &info {
                            link.kind = LinkKind::from(kind);
                        }
                    }
                }
                _ => {}
            }
        }

        link
    }
}

/// Attributes of a bridge to be created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeAttrs {
    pub name: String,
    pub mtu: u32,
    /// `None` leaves the queue length to the kernel; `Some(0)` really means zero.
    pub tx_queue_len: Option<u32>,
}

impl BridgeAttrs {
    pub fn new(name: &str, mtu: u32) -> Self {
        Self {
            name: name.to_string(),
            mtu,
            tx_queue_len: None,
        }
    }

    pub fn to_message(&self) -> LinkMessage {
        let mut msg = LinkMessage::default();
        msg.nlas.push(Nla::IfName(self.name.clone()));

        if self.mtu > 0 {
            msg.nlas.push(Nla::Mtu(self.mtu));
        }

        if let Some(tx_queue_len) = self.tx_queue_len {
            msg.nlas.push(Nla::TxQueueLen(tx_queue_len));
        }

        msg.nlas.push(Nla::Info(vec![Info::Kind(InfoKind::Bridge)]));
        msg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link_message(index: u32, nlas: Vec<Nla>) -> LinkMessage {
        let mut msg = LinkMessage::default();
        msg.header.index = index;
        msg.nlas = nlas;
        msg
    }

    #[test]
    fn link_from_bridge_message_test() {
        let msg = link_message(
            7,
            vec![
                Nla::IfName("cni0".to_string()),
                Nla::Mtu(1450),
                Nla::Info(vec![Info::Kind(InfoKind::Bridge)]),
            ],
        );

        let link = Link::from(msg);

        assert_eq!(link.index, 7);
        assert_eq!(link.name, "cni0");
        assert_eq!(link.mtu, 1450);
        assert_eq!(link.kind, LinkKind::Bridge);
    }

    #[test]
    fn link_without_kind_is_device_test() {
        let msg = link_message(1, vec![Nla::IfName("lo".to_string())]);

        let link = Link::from(msg);

        assert_eq!(link.kind, LinkKind::Device);
        assert_eq!(link.kind.to_string(), "device");
    }

    #[test]
    fn link_kind_dummy_test() {
        let kind = LinkKind::from(&InfoKind::Dummy);
        assert_eq!(kind, LinkKind::Other("dummy".to_string()));
    }

    #[test]
    fn bridge_attrs_default_tx_queue_len_test() {
        let msg = BridgeAttrs::new("cni0", 1500).to_message();

        assert!(!msg
            .nlas
            .iter()
            .any(|nla| matches!(nla, Nla::TxQueueLen(_))));
        assert!(msg.nlas.iter().any(|nla| matches!(nla, Nla::Mtu(1500))));
    }

    #[test]
    fn bridge_attrs_explicit_zero_tx_queue_len_test() {
        let mut attrs = BridgeAttrs::new("cni0", 1500);
        attrs.tx_queue_len = Some(0);

        let msg = attrs.to_message();

        assert!(msg
            .nlas
            .iter()
            .any(|nla| matches!(nla, Nla::TxQueueLen(0))));
    }
}
