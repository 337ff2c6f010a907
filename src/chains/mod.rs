//! Chain descriptor registry.
//!
//! Describes which networks the worker monitors and how to reach them.
//! The default set covers the networks the verification service supports
//! out of the box; `CHAINS_FILE` points at a JSON array overriding it.

use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("failed to read chain registry file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse chain registry: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("chain registry is empty")]
    Empty,
}

/// One monitored network: identity plus an ordered list of RPC endpoints,
/// tried in order at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct ChainDescriptor {
    #[serde(rename = "chainId")]
    pub chain_id: u64,
    pub name: String,
    #[serde(rename = "rpc")]
    pub rpc_urls: Vec<String>,
}

impl ChainDescriptor {
    pub fn new(chain_id: u64, name: impl Into<String>, rpc_urls: Vec<String>) -> Self {
        Self {
            chain_id,
            name: name.into(),
            rpc_urls,
        }
    }
}

/// Built-in default chain set.
pub fn default_chains() -> Vec<ChainDescriptor> {
    vec![
        ChainDescriptor::new(
            1,
            "ethereum",
            vec![
                "https://eth.llamarpc.com".to_string(),
                "https://ethereum-rpc.publicnode.com".to_string(),
            ],
        ),
        ChainDescriptor::new(
            11155111,
            "sepolia",
            vec![
                "https://ethereum-sepolia-rpc.publicnode.com".to_string(),
                "https://rpc.sepolia.org".to_string(),
            ],
        ),
        ChainDescriptor::new(
            17000,
            "holesky",
            vec!["https://ethereum-holesky-rpc.publicnode.com".to_string()],
        ),
        ChainDescriptor::new(
            100,
            "gnosis",
            vec![
                "https://rpc.gnosischain.com".to_string(),
                "wss://rpc.gnosischain.com/wss".to_string(),
            ],
        ),
        ChainDescriptor::new(
            137,
            "polygon",
            vec!["https://polygon-rpc.com".to_string()],
        ),
    ]
}

/// Load the chain set: `CHAINS_FILE` if set, the built-in defaults otherwise.
pub fn load_registry() -> Result<Vec<ChainDescriptor>, RegistryError> {
    match std::env::var("CHAINS_FILE") {
        Ok(path) => {
            let contents = std::fs::read_to_string(&path)?;
            parse_registry(&contents)
        }
        Err(_) => Ok(default_chains()),
    }
}

fn parse_registry(contents: &str) -> Result<Vec<ChainDescriptor>, RegistryError> {
    let chains: Vec<ChainDescriptor> = serde_json::from_str(contents)?;
    if chains.is_empty() {
        return Err(RegistryError::Empty);
    }
    Ok(chains)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_set_has_unique_chain_ids() {
        let chains = default_chains();
        assert!(!chains.is_empty());
        let mut ids: Vec<u64> = chains.iter().map(|c| c.chain_id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), chains.len());
        assert!(chains.iter().all(|c| !c.rpc_urls.is_empty()));
    }

    #[test]
    fn registry_json_parses() {
        let json = r#"[
            {"chainId": 1, "name": "ethereum", "rpc": ["https://example.org/rpc"]},
            {"chainId": 10, "name": "optimism", "rpc": ["wss://example.org/ws"]}
        ]"#;
        let chains = parse_registry(json).unwrap();
        assert_eq!(chains.len(), 2);
        assert_eq!(chains[0].chain_id, 1);
        assert_eq!(chains[1].name, "optimism");
        assert_eq!(chains[1].rpc_urls, vec!["wss://example.org/ws"]);
    }

    #[test]
    fn empty_registry_is_rejected() {
        assert!(matches!(parse_registry("[]"), Err(RegistryError::Empty)));
    }
}
