//! Delegation of address management to an external IPAM plugin.

use std::{
    io::{ErrorKind, Write},
    net::{IpAddr, Ipv4Addr},
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

use anyhow::{anyhow, bail, Context, Result};
use ipnet::{IpNet, Ipv4Net};
use network::{IpamResult, Route};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

/// An IPAM plugin binary located on `CNI_PATH`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delegate {
    plugin: PathBuf,
}

impl Delegate {
    pub fn find(plugin_type: &str, cni_path: &str) -> Result<Self> {
        if plugin_type.contains('/') {
            bail!("invalid IPAM plugin type {:?}", plugin_type);
        }

        cni_path
            .split(':')
            .filter(|dir| !dir.is_empty())
            .map(|dir| Path::new(dir).join(plugin_type))
            .find(|candidate| candidate.is_file())
            .map(|plugin| Self { plugin })
            .ok_or_else(|| anyhow!("failed to find plugin {:?} in path [{}]", plugin_type, cni_path))
    }

    pub fn path(&self) -> &Path {
        &self.plugin
    }

    /// Runs the plugin's ADD with `stdin` as its network config. The rest of
    /// the `CNI_*` environment is inherited.
    pub fn add(&self, stdin: &str) -> Result<(IpamResult, Value)> {
        let out = self.exec("ADD", stdin)?;
        parse_result(&out)
    }

    /// Releases whatever the plugin allocated for this container.
    pub fn del(&self, stdin: &str) -> Result<()> {
        self.exec("DEL", stdin)?;
        Ok(())
    }

    fn exec(&self, command: &str, stdin: &str) -> Result<Vec<u8>> {
        debug!(plugin = %self.plugin.display(), command, "delegating to IPAM plugin");

        let mut child = Command::new(&self.plugin)
            .env("CNI_COMMAND", command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .with_context(|| format!("failed to execute {}", self.plugin.display()))?;

        if let Some(mut input) = child.stdin.take() {
            match input.write_all(stdin.as_bytes()) {
                // the exit status tells whether the plugin needed its input
                Err(e) if e.kind() == ErrorKind::BrokenPipe => {}
                res => res.context("failed to write network config to IPAM plugin")?,
            }
        }

        let out = child
            .wait_with_output()
            .with_context(|| format!("failed to wait for {}", self.plugin.display()))?;

        if !out.status.success() {
            bail!(
                "IPAM plugin {} failed: {}",
                self.plugin.display(),
                plugin_error(&out.stdout)
            );
        }

        Ok(out.stdout)
    }
}

#[derive(Debug, Deserialize)]
struct PluginError {
    #[serde(default)]
    code: u32,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    details: String,
}

fn plugin_error(stdout: &[u8]) -> String {
    match serde_json::from_slice::<PluginError>(stdout) {
        Ok(e) if e.details.is_empty() => format!("{} (code {})", e.msg, e.code),
        Ok(e) => format!("{}; {} (code {})", e.msg, e.details, e.code),
        Err(_) => String::from_utf8_lossy(stdout).trim().to_string(),
    }
}

/// `ip4` as reported by 0.1.0 and 0.2.0 results.
#[derive(Debug, Deserialize)]
struct LegacyIpConfig {
    ip: Ipv4Net,
    #[serde(default)]
    gateway: Option<Ipv4Addr>,
    #[serde(default)]
    routes: Vec<RawRoute>,
}

/// An `ips` entry of 0.3.0 and later results.
#[derive(Debug, Deserialize)]
struct IpConfig {
    address: IpNet,
    #[serde(default)]
    gateway: Option<IpAddr>,
}

#[derive(Debug, Deserialize)]
struct RawRoute {
    dst: IpNet,
    #[serde(default)]
    gw: Option<IpAddr>,
}

#[derive(Debug, Deserialize)]
struct RawResult {
    #[serde(default)]
    ip4: Option<LegacyIpConfig>,
    #[serde(default)]
    ips: Vec<IpConfig>,
    #[serde(default)]
    routes: Vec<RawRoute>,
}

fn v4_routes(routes: Vec<RawRoute>) -> Vec<Route> {
    routes
        .into_iter()
        .filter_map(|route| {
            let dst = match route.dst {
                IpNet::V4(dst) => dst,
                IpNet::V6(_) => return None,
            };
            match route.gw {
                None => Some(Route { dst, gw: None }),
                Some(IpAddr::V4(gw)) => Some(Route { dst, gw: Some(gw) }),
                Some(IpAddr::V6(_)) => None,
            }
        })
        .collect()
}

/// Reads the IPv4 part of an IPAM result, in either result format.
pub fn parse_result(stdout: &[u8]) -> Result<(IpamResult, Value)> {
    let raw: Value =
        serde_json::from_slice(stdout).context("failed to parse IPAM plugin output")?;
    let res: RawResult =
        serde_json::from_value(raw.clone()).context("failed to parse IPAM result")?;

    let result = if let Some(ip4) = res.ip4 {
        IpamResult {
            ip: ip4.ip,
            gateway: ip4.gateway,
            routes: v4_routes(ip4.routes),
        }
    } else {
        let (ip, gateway) = res
            .ips
            .iter()
            .find_map(|config| match config.address {
                IpNet::V4(ip) => {
                    let gateway = match config.gateway {
                        Some(IpAddr::V4(gw)) => Some(gw),
                        _ => None,
                    };
                    Some((ip, gateway))
                }
                IpNet::V6(_) => None,
            })
            .ok_or_else(|| anyhow!("IPAM plugin returned missing IPv4 config"))?;

        IpamResult {
            ip,
            gateway,
            routes: v4_routes(res.routes),
        }
    };

    Ok((result, raw))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parse_result_current_test() {
        let out = json!({
            "cniVersion": "0.4.0",
            "ips": [
                { "version": "6", "address": "fd00::5/64", "gateway": "fd00::1" },
                { "version": "4", "address": "10.244.0.5/24", "gateway": "10.244.0.1" }
            ],
            "routes": [
                { "dst": "0.0.0.0/0" },
                { "dst": "192.168.0.0/16", "gw": "10.244.0.254" },
                { "dst": "::/0" }
            ],
            "dns": {}
        })
        .to_string();

        let (res, raw) = parse_result(out.as_bytes()).unwrap();

        assert_eq!(res.ip, "10.244.0.5/24".parse::<Ipv4Net>().unwrap());
        assert_eq!(res.gateway, Some(Ipv4Addr::new(10, 244, 0, 1)));
        assert_eq!(
            res.routes,
            vec![
                Route {
                    dst: "0.0.0.0/0".parse().unwrap(),
                    gw: None
                },
                Route {
                    dst: "192.168.0.0/16".parse().unwrap(),
                    gw: Some(Ipv4Addr::new(10, 244, 0, 254))
                },
            ]
        );
        assert_eq!(raw["dns"], json!({}));
    }

    #[test]
    fn parse_result_legacy_test() {
        let out = br#"{
            "cniVersion": "0.2.0",
            "ip4": {
                "ip": "10.244.0.5/24",
                "gateway": "10.244.0.1",
                "routes": [{ "dst": "0.0.0.0/0" }]
            }
        }"#;

        let (res, _) = parse_result(out).unwrap();

        assert_eq!(res.ip, "10.244.0.5/24".parse::<Ipv4Net>().unwrap());
        assert_eq!(res.gateway, Some(Ipv4Addr::new(10, 244, 0, 1)));
        assert_eq!(res.routes.len(), 1);
    }

    #[test]
    fn parse_result_without_ipv4_test() {
        let out = br#"{ "cniVersion": "0.4.0", "ips": [{ "address": "fd00::5/64" }] }"#;

        let err = parse_result(out).unwrap_err();
        assert_eq!(err.to_string(), "IPAM plugin returned missing IPv4 config");
    }

    #[test]
    fn parse_result_garbage_test() {
        assert!(parse_result(b"no IPs left").is_err());
    }

    #[test]
    fn plugin_error_test() {
        assert_eq!(
            plugin_error(br#"{"cniVersion":"0.4.0","code":11,"msg":"no IP addresses available"}"#),
            "no IP addresses available (code 11)"
        );
        assert_eq!(plugin_error(b"segfault\n"), "segfault");
    }

    #[test]
    fn find_test() {
        let delegate = Delegate::find("cat", "/nonexistent:/bin:/usr/bin").unwrap();
        assert!(delegate.path().ends_with("cat"));

        assert!(Delegate::find("no-such-ipam", "/bin:/usr/bin").is_err());
        assert!(Delegate::find("cat", "").is_err());
        assert!(Delegate::find("../bin/cat", "/usr").is_err());
    }

    #[test]
    fn add_test() {
        // cat echoes the config back, which is enough to look like a result
        let delegate = Delegate::find("cat", "/bin:/usr/bin").unwrap();
        let stdin = r#"{"cniVersion":"0.4.0","ips":[{"address":"10.244.0.7/24"}]}"#;

        let (res, raw) = delegate.add(stdin).unwrap();

        assert_eq!(res.ip, "10.244.0.7/24".parse::<Ipv4Net>().unwrap());
        assert_eq!(res.gateway, None);
        assert_eq!(raw["cniVersion"], "0.4.0");
    }

    #[test]
    fn del_test() {
        let delegate = Delegate::find("true", "/bin:/usr/bin").unwrap();
        delegate.del(r#"{"cniVersion":"0.4.0","name":"mynet"}"#).unwrap();
    }

    #[test]
    fn del_failure_test() {
        let delegate = Delegate::find("false", "/bin:/usr/bin").unwrap();

        let err = delegate.del("{}").unwrap_err();
        assert!(err.to_string().starts_with("IPAM plugin"));
    }

    #[test]
    fn add_failure_test() {
        let delegate = Delegate::find("false", "/bin:/usr/bin").unwrap();

        let err = delegate.add("{}").unwrap_err();
        assert!(err.to_string().contains("failed"));
    }
}
