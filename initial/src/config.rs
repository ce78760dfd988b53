use std::collections::HashMap;

use node::{
    NodeErr, Result,
    config::{ENTRY_PORT, PortMap, resolve_replicas},
};

/// Startup configuration of the entry coordinator process.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct EntryConfig {
    /// Role of the pipeline's first stage, the target of every emission.
    pub first_role: String,
    /// Where the completion intake listens for final-stage outputs.
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Emission cadence.
    #[serde(default = "default_period_ms")]
    pub period_ms: u64,
    /// Size in bytes of one synthetic input frame.
    pub frame_len: usize,
    /// Prefix of the correlation tags assigned at pipeline entry.
    #[serde(default = "default_tag")]
    pub tag: String,
    /// Role name to ordered replica host list.
    #[serde(default)]
    pub addresses: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub ports: PortMap,
    #[serde(default)]
    pub forward_timeout_ms: Option<u64>,
    #[serde(default)]
    pub acquire_timeout_ms: Option<u64>,
}

impl EntryConfig {
    /// Loads and validates a config from a JSON file.
    pub fn load(path: &str) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let cfg: Self =
            serde_json::from_str(&text).map_err(|e| NodeErr::InvalidConfig(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Replica addresses of the first stage, sentinel applied.
    pub fn first_stage_replicas(&self) -> Vec<String> {
        resolve_replicas(&self.addresses, &self.first_role, &self.ports)
    }

    pub fn validate(&self) -> Result<()> {
        if self.frame_len == 0 {
            return Err(NodeErr::InvalidConfig("frame_len must be non-zero".into()));
        }
        if self.first_stage_replicas().is_empty() {
            return Err(NodeErr::NoReplicas {
                role: self.first_role.clone(),
            });
        }
        Ok(())
    }
}

fn default_listen() -> String {
    format!("0.0.0.0:{ENTRY_PORT}")
}

fn default_period_ms() -> u64 {
    1000
}

fn default_tag() -> String {
    "initial".to_string()
}
