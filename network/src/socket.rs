use std::{
    io::{Error, ErrorKind, Result},
    net::Ipv4Addr,
};

use ipnet::Ipv4Net;
use netlink_packet_core::{
    NetlinkHeader, NetlinkMessage, NetlinkPayload, NLM_F_ACK, NLM_F_CREATE, NLM_F_DUMP,
    NLM_F_EXCL, NLM_F_REQUEST,
};
use netlink_packet_route::{
    nlas::{address, link, route},
    AddressMessage, LinkMessage, RouteMessage, RtnlMessage, AF_INET, IFF_UP, RTN_UNICAST,
    RTPROT_BOOT, RT_SCOPE_LINK, RT_SCOPE_UNIVERSE, RT_TABLE_MAIN,
};
use netlink_sys::{protocols::NETLINK_ROUTE, SocketAddr};

use crate::link::Link;

const RECV_BUF_SIZE: usize = 8192;
const NLMSG_ALIGNTO: usize = 4;
const RTA_ALIGNTO: usize = 4;

const RTM_SETLINK: u16 = 19;
const AF_BRIDGE: u8 = 7;
const IFLA_PROTINFO: u16 = 12;
const IFLA_BRPORT_MODE: u16 = 4;
const NLA_F_NESTED: u16 = 0x8000;

/// NETLINK_ROUTE socket bound to the network namespace it was opened in.
pub struct RouteSocket {
    socket: netlink_sys::Socket,
    sequence_number: u32,
    buffer: Vec<u8>,
}

impl RouteSocket {
    pub fn new() -> Result<Self> {
        let mut socket = netlink_sys::Socket::new(NETLINK_ROUTE)?;
        let _ = socket.bind_auto()?;
        socket.connect(&SocketAddr::new(0, 0))?;

        Ok(Self {
            socket,
            sequence_number: 0,
            buffer: vec![0; RECV_BUF_SIZE],
        })
    }

    pub fn link_by_name(&mut self, name: &str) -> Result<Link> {
        let mut msg = LinkMessage::default();
        msg.nlas.push(link::Nla::IfName(name.to_string()));

        let mut result = self.request(RtnlMessage::GetLink(msg), 0)?;
        match result.pop() {
            Some(RtnlMessage::NewLink(m)) => Ok(Link::from(m)),
            _ => Err(Error::new(
                ErrorKind::InvalidData,
                "unexpected response to RTM_GETLINK",
            )),
        }
    }

    pub fn link_add(&mut self, msg: LinkMessage) -> Result<()> {
        self.request(
            RtnlMessage::NewLink(msg),
            NLM_F_ACK | NLM_F_CREATE | NLM_F_EXCL,
        )?;
        Ok(())
    }

    pub fn link_set_up(&mut self, index: u32) -> Result<()> {
        let mut msg = LinkMessage::default();
        msg.header.index = index;
        msg.header.flags |= IFF_UP;
        msg.header.change_mask |= IFF_UP;

        self.request(RtnlMessage::SetLink(msg), NLM_F_ACK)?;
        Ok(())
    }

    pub fn link_set_master(&mut self, index: u32, master: u32) -> Result<()> {
        let mut msg = LinkMessage::default();
        msg.header.index = index;
        msg.nlas.push(link::Nla::Master(master));

        self.request(RtnlMessage::SetLink(msg), NLM_F_ACK)?;
        Ok(())
    }

    pub fn link_set_address(&mut self, index: u32, mac: [u8; 6]) -> Result<()> {
        let mut msg = LinkMessage::default();
        msg.header.index = index;
        msg.nlas.push(link::Nla::Address(mac.to_vec()));

        self.request(RtnlMessage::SetLink(msg), NLM_F_ACK)?;
        Ok(())
    }

    /// Sets hairpin (reflective relay) mode on a bridge port.
    pub fn link_set_hairpin(&mut self, index: u32, enabled: bool) -> Result<()> {
        self.sequence_number += 1;
        let buf = hairpin_request(self.sequence_number, index, enabled);

        self.socket.send(&buf, 0)?;
        self.recv(false)?;
        Ok(())
    }

    /// IPv4 addresses currently assigned to the link at `index`.
    pub fn addr_list_v4(&mut self, index: u32) -> Result<Vec<Ipv4Net>> {
        let mut msg = AddressMessage::default();
        msg.header.family = AF_INET as u8;

        let result = self.request(RtnlMessage::GetAddress(msg), NLM_F_DUMP)?;

        // the kernel does not filter address dumps by index
        Ok(result
            .into_iter()
            .filter_map(|m| match m {
                RtnlMessage::NewAddress(m)
                    if m.header.index == index && m.header.family == AF_INET as u8 =>
                {
                    address_of(&m)
                }
                _ => None,
            })
            .collect())
    }

    pub fn addr_add_v4(&mut self, index: u32, addr: Ipv4Net) -> Result<()> {
        let mut msg = AddressMessage::default();
        msg.header.family = AF_INET as u8;
        msg.header.prefix_len = addr.prefix_len();
        msg.header.index = index;

        let octets = addr.addr().octets().to_vec();
        msg.nlas.push(address::Nla::Local(octets.clone()));
        msg.nlas.push(address::Nla::Address(octets));
        if addr.prefix_len() < 31 {
            msg.nlas.push(address::Nla::Broadcast(
                addr.broadcast().octets().to_vec(),
            ));
        }

        self.request(
            RtnlMessage::NewAddress(msg),
            NLM_F_ACK | NLM_F_CREATE | NLM_F_EXCL,
        )?;
        Ok(())
    }

    pub fn route_add_v4(&mut self, index: u32, dst: Ipv4Net, gw: Option<Ipv4Addr>) -> Result<()> {
        let mut msg = RouteMessage::default();
        msg.header.address_family = AF_INET as u8;
        msg.header.destination_prefix_length = dst.prefix_len();
        msg.header.table = RT_TABLE_MAIN;
        msg.header.protocol = RTPROT_BOOT;
        msg.header.kind = RTN_UNICAST;
        msg.header.scope = match gw {
            Some(_) => RT_SCOPE_UNIVERSE,
            None => RT_SCOPE_LINK,
        };

        if dst.prefix_len() > 0 {
            msg.nlas
                .push(route::Nla::Destination(dst.network().octets().to_vec()));
        }
        if let Some(gw) = gw {
            msg.nlas.push(route::Nla::Gateway(gw.octets().to_vec()));
        }
        msg.nlas.push(route::Nla::Oif(index));

        self.request(
            RtnlMessage::NewRoute(msg),
            NLM_F_ACK | NLM_F_CREATE | NLM_F_EXCL,
        )?;
        Ok(())
    }

    fn request(&mut self, msg: RtnlMessage, flags: u16) -> Result<Vec<RtnlMessage>> {
        self.send(msg, flags)?;
        self.recv(flags & NLM_F_DUMP == NLM_F_DUMP)
    }

    fn send(&mut self, msg: RtnlMessage, flags: u16) -> Result<()> {
        let mut packet = NetlinkMessage::new(NetlinkHeader::default(), NetlinkPayload::from(msg));
        packet.header.flags = NLM_F_REQUEST | flags;
        packet.header.sequence_number = {
            self.sequence_number += 1;
            self.sequence_number
        };
        packet.finalize();

        let len = packet.buffer_len();
        if len > self.buffer.len() {
            self.buffer.resize(len, 0);
        }
        packet.serialize(&mut self.buffer[..len]);

        self.socket.send(&self.buffer[..len], 0)?;
        Ok(())
    }

    fn recv(&mut self, multi: bool) -> Result<Vec<RtnlMessage>> {
        let mut result = Vec::new();

        loop {
            let size = self.socket.recv(&mut &mut self.buffer[..], 0)?;
            let mut offset = 0;

            while offset < size {
                let bytes = &self.buffer[offset..size];
                let rx_packet: NetlinkMessage<RtnlMessage> = NetlinkMessage::deserialize(bytes)
                    .map_err(|e| Error::new(ErrorKind::InvalidData, e.to_string()))?;

                if rx_packet.header.sequence_number != self.sequence_number {
                    return Err(Error::new(
                        ErrorKind::InvalidData,
                        format!(
                            "wrong sequence number: {}, expected: {}",
                            rx_packet.header.sequence_number, self.sequence_number
                        ),
                    ));
                }

                let length = rx_packet.header.length as usize;

                match rx_packet.payload {
                    NetlinkPayload::Done => return Ok(result),
                    NetlinkPayload::Noop => {}
                    NetlinkPayload::Overrun(_) => {
                        return Err(Error::new(ErrorKind::Other, "netlink overrun"))
                    }
                    NetlinkPayload::Error(e) | NetlinkPayload::Ack(e) => {
                        if e.code != 0 {
                            return Err(Error::from_raw_os_error(-e.code));
                        }
                        return Ok(result);
                    }
                    NetlinkPayload::InnerMessage(msg) => {
                        result.push(msg);
                        if !multi {
                            return Ok(result);
                        }
                    }
                    _ => {}
                };

                if length == 0 {
                    break;
                }
                offset += align(length, NLMSG_ALIGNTO);
            }
        }
    }
}

fn align(len: usize, align_to: usize) -> usize {
    (len + align_to - 1) & !(align_to - 1)
}

fn push_attr(buf: &mut Vec<u8>, rta_type: u16, value: &[u8]) {
    let rta_len = (4 + value.len()) as u16;
    buf.extend_from_slice(&rta_len.to_ne_bytes());
    buf.extend_from_slice(&rta_type.to_ne_bytes());
    buf.extend_from_slice(value);
    buf.resize(align(buf.len(), RTA_ALIGNTO), 0);
}

/// RTM_SETLINK for the AF_BRIDGE family carrying IFLA_PROTINFO { IFLA_BRPORT_MODE }.
fn hairpin_request(sequence_number: u32, index: u32, enabled: bool) -> Vec<u8> {
    let mut brport = Vec::new();
    push_attr(&mut brport, IFLA_BRPORT_MODE, &[enabled as u8]);

    // ifinfomsg
    let mut body = vec![AF_BRIDGE, 0, 0, 0];
    body.extend_from_slice(&index.to_ne_bytes());
    body.extend_from_slice(&0u32.to_ne_bytes());
    body.extend_from_slice(&0u32.to_ne_bytes());
    // without NLA_F_NESTED the bridge reads IFLA_PROTINFO as a port state
    push_attr(&mut body, IFLA_PROTINFO | NLA_F_NESTED, &brport);

    let len = (16 + body.len()) as u32;
    let mut buf = Vec::with_capacity(len as usize);
    buf.extend_from_slice(&len.to_ne_bytes());
    buf.extend_from_slice(&RTM_SETLINK.to_ne_bytes());
    buf.extend_from_slice(&(NLM_F_REQUEST | NLM_F_ACK).to_ne_bytes());
    buf.extend_from_slice(&sequence_number.to_ne_bytes());
    buf.extend_from_slice(&0u32.to_ne_bytes());
    buf.extend_from_slice(&body);
    buf
}

fn address_of(msg: &AddressMessage) -> Option<Ipv4Net> {
    // IFA_LOCAL is the interface's own address; IFA_ADDRESS may be the peer on p2p links
    let mut local = None;
    let mut addr = None;

    for nla in &msg.nlas {
        match nla {
            address::Nla::Local(bytes) => local = ipv4_from(bytes),
            address::Nla::Address(bytes) => addr = ipv4_from(bytes),
            _ => {}
        }
    }

    local
        .or(addr)
        .and_then(|ip| Ipv4Net::new(ip, msg.header.prefix_len).ok())
}

fn ipv4_from(bytes: &[u8]) -> Option<Ipv4Addr> {
    let octets: [u8; 4] = bytes.try_into().ok()?;
    Some(Ipv4Addr::from(octets))
}
