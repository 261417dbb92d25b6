use anyhow::{bail, Result};
use network::{interface_exists, CmdArgs};

pub fn check(args: &CmdArgs) -> Result<String> {
    if !interface_exists(&args.netns, &args.if_name) {
        bail!(
            "interface {:?} not found in {}",
            args.if_name,
            args.netns.display()
        );
    }

    Ok(String::new())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use network::{test_setup, NetNs};

    use super::*;

    #[test]
    fn check_missing_netns_test() {
        let args = CmdArgs {
            container_id: "123456789".to_string(),
            netns: PathBuf::from("/var/run/netns/does-not-exist"),
            if_name: "eth0".to_string(),
        };

        let err = check(&args).unwrap_err();
        assert!(err.to_string().contains("\"eth0\" not found"));
    }

    #[test]
    fn check_test() {
        test_setup!();
        let ns = NetNs::current().unwrap();

        let mut args = CmdArgs {
            container_id: "123456789".to_string(),
            netns: ns.path().to_path_buf(),
            if_name: "lo".to_string(),
        };
        assert_eq!(check(&args).unwrap(), "");

        args.if_name = "eth0".to_string();
        assert!(check(&args).is_err());
    }
}
