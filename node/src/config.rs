//! Static startup configuration for a stage coordinator.

use std::{collections::HashMap, num::NonZeroUsize};

use model::UnitSpec;

use crate::error::{NodeErr, Result};

/// Role label of the terminal sink that originates and collects requests.
pub const ENTRY_ROLE: &str = "initial";

/// Entry that truncates an address list: later entries are ignored.
pub const LIST_SENTINEL: &str = "#";

/// Default port interior stages listen on for stage-to-stage forwarding.
pub const STAGE_PORT: u16 = 12345;

/// Default port the entry coordinator's completion intake listens on.
pub const ENTRY_PORT: u16 = 9999;

/// Well-known ports per role kind, overridable from the config file.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct PortMap {
    #[serde(default = "default_stage_port")]
    pub stage: u16,
    #[serde(default = "default_entry_port")]
    pub entry: u16,
}

impl Default for PortMap {
    fn default() -> Self {
        Self {
            stage: STAGE_PORT,
            entry: ENTRY_PORT,
        }
    }
}

/// Element type of the tensor payload a stage expects on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dtype {
    U8,
    F32,
}

/// Expected shape of one inbound partial, known out of band per role.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct InputSpec {
    pub dtype: Dtype,
    pub len: usize,
}

/// One downstream consumer of this stage's output.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Downstream {
    pub role: String,
    /// Independent forward calls issued per request, e.g. 2 when the same
    /// output feeds two replicas of the next role.
    #[serde(default = "one")]
    pub copies: usize,
}

/// Full startup configuration of one stage coordinator process.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct NodeConfig {
    pub role: String,
    #[serde(default = "default_listen")]
    pub listen: String,
    pub input: InputSpec,
    /// Present only on merge-point roles: partials needed before computing.
    #[serde(default)]
    pub quorum: Option<NonZeroUsize>,
    #[serde(default)]
    pub downstream: Vec<Downstream>,
    pub unit: UnitSpec,
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

impl NodeConfig {
    /// Loads and validates a config from a JSON file.
    pub fn load(path: &str) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let cfg: Self =
            serde_json::from_str(&text).map_err(|e| NodeErr::InvalidConfig(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Replica addresses for one downstream role, sentinel applied.
    pub fn replicas(&self, role: &str) -> Vec<String> {
        resolve_replicas(&self.addresses, role, &self.ports)
    }

    pub fn validate(&self) -> Result<()> {
        for down in &self.downstream {
            if down.copies == 0 {
                return Err(NodeErr::InvalidConfig(format!(
                    "downstream {} has zero copies",
                    down.role
                )));
            }
            if self.replicas(&down.role).is_empty() {
                return Err(NodeErr::NoReplicas {
                    role: down.role.clone(),
                });
            }
        }

        let expected = self.input.len * self.quorum.map(NonZeroUsize::get).unwrap_or(1);
        if self.unit.in_len != expected {
            return Err(NodeErr::InvalidConfig(format!(
                "unit expects {} inputs but role {} receives {expected}",
                self.unit.in_len, self.role
            )));
        }

        Ok(())
    }
}

/// Resolves the replica list for `role` from an address book.
///
/// Reading stops at the `"#"` sentinel, a truncation convention of the
/// deployment files, not an error. Bare hosts get the role's well-known
/// port appended; entries already carrying a port are kept as given.
pub fn resolve_replicas(
    book: &HashMap<String, Vec<String>>,
    role: &str,
    ports: &PortMap,
) -> Vec<String> {
    let Some(entries) = book.get(role) else {
        return Vec::new();
    };

    let port = if role == ENTRY_ROLE {
        ports.entry
    } else {
        ports.stage
    };

    entries
        .iter()
        .take_while(|entry| entry.as_str() != LIST_SENTINEL)
        .map(|entry| {
            if entry.contains(':') {
                entry.clone()
            } else {
                format!("{entry}:{port}")
            }
        })
        .collect()
}

fn one() -> usize {
    1
}

fn default_listen() -> String {
    format!("0.0.0.0:{STAGE_PORT}")
}

fn default_stage_port() -> u16 {
    STAGE_PORT
}

fn default_entry_port() -> u16 {
    ENTRY_PORT
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book(entries: &[&str]) -> HashMap<String, Vec<String>> {
        let mut book = HashMap::new();
        book.insert(
            "fc1".to_string(),
            entries.iter().map(|s| s.to_string()).collect(),
        );
        book
    }

    #[test]
    fn sentinel_truncates_the_list() {
        let book = book(&["192.168.1.10", "192.168.1.11", "#", "192.168.1.12"]);
        let replicas = resolve_replicas(&book, "fc1", &PortMap::default());

        assert_eq!(replicas, vec!["192.168.1.10:12345", "192.168.1.11:12345"]);
    }

    #[test]
    fn explicit_ports_are_kept() {
        let book = book(&["127.0.0.1:4000"]);
        let replicas = resolve_replicas(&book, "fc1", &PortMap::default());

        assert_eq!(replicas, vec!["127.0.0.1:4000"]);
    }

    #[test]
    fn entry_role_gets_the_intake_port() {
        let mut book = HashMap::new();
        book.insert(ENTRY_ROLE.to_string(), vec!["192.168.1.1".to_string()]);

        let replicas = resolve_replicas(&book, ENTRY_ROLE, &PortMap::default());
        assert_eq!(replicas, vec!["192.168.1.1:9999"]);
    }

    #[test]
    fn unknown_role_resolves_to_nothing() {
        let replicas = resolve_replicas(&HashMap::new(), "fc1", &PortMap::default());
        assert!(replicas.is_empty());
    }

    #[test]
    fn config_parses_with_defaults() {
        let cfg: NodeConfig = serde_json::from_str(
            r#"{
                "role": "fc2",
                "input": { "dtype": "f32", "len": 2048 },
                "quorum": 2,
                "downstream": [{ "role": "initial" }],
                "unit": { "in_len": 4096, "out_len": 1000 },
                "addresses": { "initial": ["192.168.1.1"] }
            }"#,
        )
        .unwrap();

        cfg.validate().unwrap();
        assert_eq!(cfg.listen, "0.0.0.0:12345");
        assert_eq!(cfg.downstream[0].copies, 1);
        assert_eq!(cfg.quorum.unwrap().get(), 2);
    }

    #[test]
    fn validation_rejects_missing_replicas() {
        let cfg: NodeConfig = serde_json::from_str(
            r#"{
                "role": "fc1",
                "input": { "dtype": "f32", "len": 8 },
                "downstream": [{ "role": "fc2" }],
                "unit": { "in_len": 8, "out_len": 4 }
            }"#,
        )
        .unwrap();

        assert!(matches!(
            cfg.validate(),
            Err(NodeErr::NoReplicas { role }) if role == "fc2"
        ));
    }

    #[test]
    fn validation_rejects_quorum_unit_mismatch() {
        let cfg: NodeConfig = serde_json::from_str(
            r#"{
                "role": "fc2",
                "input": { "dtype": "f32", "len": 8 },
                "quorum": 2,
                "unit": { "in_len": 8, "out_len": 4 }
            }"#,
        )
        .unwrap();

        assert!(matches!(cfg.validate(), Err(NodeErr::InvalidConfig(_))));
    }
}
