use anyhow::Result;
use serde_json::json;

pub const CNI_VERSION: &str = "0.4.0";

/// Result shapes this plugin can read back from an IPAM plugin.
pub const SUPPORTED_VERSIONS: [&str; 5] = ["0.1.0", "0.2.0", "0.3.0", "0.3.1", "0.4.0"];

pub fn version() -> Result<String> {
    Ok(json!({
        "cniVersion": CNI_VERSION,
        "supportedVersions": SUPPORTED_VERSIONS,
    })
    .to_string())
}
