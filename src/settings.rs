use config::{Config, ConfigError, Environment};
use serde::Deserialize;

/// Runtime configuration, read from the process environment.
///
/// `API_PORT`, `WS_PORT`, `1INCH_URL`, `1INCH_API_KEY`, `EVM_RPC_URL`,
/// `APTOS_RPC_URL` and `DEV_MODE` are the deployment-facing variables; the
/// rest are tunables with sensible defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub api_port: u16,
    pub ws_port: u16,
    #[serde(rename = "1inch_url")]
    pub oneinch_url: String,
    #[serde(rename = "1inch_api_key")]
    pub oneinch_api_key: String,
    pub evm_rpc_url: String,
    pub aptos_rpc_url: String,
    pub dev_mode: bool,
    /// Frames buffered per WS subscriber before broadcasts start dropping.
    pub outbox_capacity: usize,
    /// How long a fetched quote stays addressable.
    pub quote_ttl_secs: u64,
    /// Safety margin added on top of the computed withdrawal wait.
    pub release_buffer_secs: u64,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::builder()
            .set_default("api_port", 8080)?
            .set_default("ws_port", 8081)?
            .set_default("1inch_url", "https://api.1inch.dev/fusion-plus")?
            .set_default("1inch_api_key", "")?
            .set_default("evm_rpc_url", "http://localhost:8545")?
            .set_default("aptos_rpc_url", "https://fullnode.mainnet.aptoslabs.com")?
            .set_default("dev_mode", false)?
            .set_default("outbox_capacity", 32)?
            .set_default("quote_ttl_secs", 900)?
            .set_default("release_buffer_secs", 2)?
            .add_source(Environment::default().try_parsing(true))
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_environment() {
        let settings = Settings::from_env().unwrap();
        assert_eq!(settings.api_port, 8080);
        assert_eq!(settings.ws_port, 8081);
        assert_eq!(settings.quote_ttl_secs, 900);
        assert_eq!(settings.release_buffer_secs, 2);
        assert_eq!(settings.outbox_capacity, 32);
        assert!(settings.oneinch_url.starts_with("https://"));
    }
}
