use std::{io, path::PathBuf};

use ipnet::Ipv4Net;
use thiserror::Error;

use crate::link::LinkKind;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to lookup {name:?}: {source}")]
    LinkNotFound {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("{name:?} already exists but is not a bridge (found {kind})")]
    NotABridge { name: String, kind: LinkKind },

    #[error("{link:?} already has an IP address different from {wanted} (found {existing:?})")]
    AddressConflict {
        link: String,
        wanted: Ipv4Net,
        existing: Vec<Ipv4Net>,
    },

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("failed to parse MAC address {0:?}")]
    InvalidMac(String),

    #[error("{context}: {source}")]
    Netlink {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("netns {path:?}: {source}")]
    Namespace {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to setup hairpin mode for {name}: {source}")]
    Hairpin {
        name: String,
        #[source]
        source: io::Error,
    },
}

impl Error {
    pub(crate) fn netlink(context: impl Into<String>, source: io::Error) -> Self {
        Self::Netlink {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}

/// True when the kernel rejected a create request because the object is already there.
pub(crate) fn already_exists(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::AlreadyExists
}
