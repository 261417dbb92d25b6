pub mod command;
pub mod ipam;
pub mod logging;

use std::{
    io::{self, Read},
    path::PathBuf,
    process,
};

use anyhow::{anyhow, bail, Result};
use clap::{Parser, ValueEnum};
use network::{CmdArgs, NetConf};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error, info};

use crate::command::version::CNI_VERSION;

/// Plugin-specific error code reported back to the runtime.
const ERR_CODE_PLUGIN: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Command {
    #[value(name = "ADD")]
    Add,
    #[value(name = "CHECK")]
    Check,
    #[value(name = "DEL")]
    Del,
    #[value(name = "VERSION")]
    Version,
}

/// Invocation parameters. The runtime passes these through `CNI_*`
/// environment variables; the flags exist for running the plugin by hand.
#[derive(Debug, Parser)]
#[command(name = "bridge-cni", version, about = "Attaches containers to a Linux bridge")]
struct Opts {
    #[arg(long, env = "CNI_COMMAND", value_enum)]
    command: Command,
    #[arg(long, env = "CNI_CONTAINERID", default_value = "")]
    container_id: String,
    #[arg(long, env = "CNI_NETNS", default_value = "")]
    netns: String,
    #[arg(long, env = "CNI_IFNAME", default_value = "")]
    if_name: String,
    #[arg(long, env = "CNI_ARGS", default_value = "")]
    args: String,
    #[arg(long, env = "CNI_PATH", default_value = "")]
    path: String,
}

impl Opts {
    fn cmd_args(&self) -> Result<CmdArgs> {
        if self.netns.is_empty() {
            bail!("CNI_NETNS is required");
        }
        if self.if_name.is_empty() {
            bail!("CNI_IFNAME is required");
        }

        Ok(CmdArgs {
            container_id: self.container_id.clone(),
            netns: PathBuf::from(&self.netns),
            if_name: self.if_name.clone(),
        })
    }

    /// MAC address requested through `CNI_ARGS`, falling back to the network config.
    fn mac_address(&self, conf: &NetConf) -> Option<String> {
        cni_arg(&self.args, "MACAddress").or_else(|| conf.mac_address.clone())
    }

    fn handle<R>(&self, reader: R) -> Result<String>
    where
        R: Read,
    {
        match self.command {
            Command::Version => command::version::version(),
            Command::Add => {
                let config = Config::from(reader)?;
                let args = self.cmd_args()?;
                let mac = self.mac_address(&config.net);
                let ipam = config.ipam_delegate(&self.path)?;

                command::add::add(&args, &config.net, mac.as_deref(), || {
                    ipam.add(&config.raw)
                })
            }
            Command::Check => {
                let _config = Config::from(reader)?;
                command::check::check(&self.cmd_args()?)
            }
            Command::Del => {
                let config = Config::from(reader)?;
                let ipam = config.ipam_delegate(&self.path)?;

                command::del::del(&self.container_id, &self.if_name, || {
                    ipam.del(&config.raw)
                })
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct IpamConf {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct Config {
    #[serde(flatten)]
    net: NetConf,
    #[serde(default)]
    ipam: Option<IpamConf>,
    /// The config exactly as received, forwarded untouched to the IPAM plugin.
    #[serde(skip)]
    raw: String,
}

impl Config {
    fn from<R>(mut reader: R) -> Result<Self>
    where
        R: Read,
    {
        let mut buffer = String::new();
        reader.read_to_string(&mut buffer)?;

        let mut config: Self = serde_json::from_str(buffer.as_str())
            .map_err(|e| anyhow!("failed to load netconf: {}", e))?;
        config.raw = buffer;

        Ok(config)
    }

    fn ipam_delegate(&self, cni_path: &str) -> Result<ipam::Delegate> {
        match &self.ipam {
            Some(ipam) if !ipam.kind.is_empty() => ipam::Delegate::find(&ipam.kind, cni_path),
            _ => bail!("ipam type is not specified in network config {:?}", self.net.name),
        }
    }
}

/// Looks up `key` in a `K1=V1;K2=V2` style `CNI_ARGS` string.
fn cni_arg(args: &str, key: &str) -> Option<String> {
    args.split(';')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| k.trim() == key)
        .map(|(_, v)| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn error_response(err: &anyhow::Error) -> String {
    json!({
        "cniVersion": CNI_VERSION,
        "code": ERR_CODE_PLUGIN,
        "msg": format!("{:#}", err),
    })
    .to_string()
}

fn main() {
    logging::init();

    let opts = Opts::parse();
    info!(
        command = ?opts.command,
        container_id = %opts.container_id,
        netns = %opts.netns,
        if_name = %opts.if_name,
        "CNI command"
    );
    debug!(?opts, "invocation");

    match opts.handle(io::stdin().lock()) {
        Ok(out) => {
            if !out.is_empty() {
                println!("{}", out);
            }
        }
        Err(e) => {
            error!(command = ?opts.command, "{:#}", e);
            println!("{}", error_response(&e));
            process::exit(1);
        }
    }
}
