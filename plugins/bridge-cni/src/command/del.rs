use anyhow::Result;
use tracing::info;

/// Releases the IPAM allocation. Links are left alone: the container end of
/// the veth goes away with its namespace, taking the host end with it, and
/// the bridge is shared.
pub fn del<F>(container_id: &str, if_name: &str, ipam: F) -> Result<String>
where
    F: FnOnce() -> Result<()>,
{
    ipam()?;

    info!(container_id, if_name, "released IPAM allocation");
    Ok(String::new())
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use anyhow::anyhow;

    use super::*;

    #[test]
    fn del_test() {
        let released = Cell::new(false);

        let res = del("123456789", "eth0", || {
            released.set(true);
            Ok(())
        })
        .unwrap();

        assert_eq!(res, "");
        assert!(released.get());
    }

    #[test]
    fn del_ipam_failure_test() {
        let err = del("123456789", "eth0", || Err(anyhow!("lease not found"))).unwrap_err();
        assert_eq!(err.to_string(), "lease not found");
    }
}
