use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use vigil_consensus::StaticStandingOracle;
use vigil_core::operation::{Operation, Submission};
use vigil_core::types::{ReporterId, Standing};
use vigil_crypto::seal_submission;
use vigil_genesis::GenesisParams;

fn default_data_dir() -> PathBuf {
    PathBuf::from("~/.vigil/data")
}

fn default_channel_capacity() -> usize {
    512
}

/// One row of the static standing table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandingEntry {
    /// Base-58 reporter identity.
    pub reporter: String,
    pub standing: Standing,
}

/// Node configuration file (JSON).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Only used when the database is fresh.
    #[serde(default)]
    pub genesis: GenesisParams,
    /// Standings served to the reputation gate.
    #[serde(default)]
    pub standings: Vec<StandingEntry>,
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            genesis: GenesisParams::default(),
            standings: Vec::new(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl NodeConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("reading node config from {}", path.display()))?;
        serde_json::from_str(&json).context("parsing node config JSON")
    }

    pub fn standing_oracle(&self) -> anyhow::Result<StaticStandingOracle> {
        let mut oracle = StaticStandingOracle::new();
        for entry in &self.standings {
            let id = ReporterId::from_b58(&entry.reporter)
                .with_context(|| format!("standing entry {}", entry.reporter))?;
            oracle.set(id, entry.standing);
        }
        Ok(oracle)
    }
}

/// An operation as written in an input file: the caller is given in
/// base-58 and the node computes the operation id.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SubmissionRequest {
    pub caller: String,
    #[serde(default)]
    pub client_ref: u64,
    pub operation: Operation,
}

impl SubmissionRequest {
    pub fn seal(self) -> anyhow::Result<Submission> {
        let caller = ReporterId::from_b58(&self.caller)
            .with_context(|| format!("caller {}", self.caller))?;
        Ok(seal_submission(caller, self.client_ref, self.operation))
    }
}

/// Expand a leading `~` to the user's home directory (`HOME` or `USERPROFILE`).
pub fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Ok(home) = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE")) {
            return PathBuf::from(home).join(stripped);
        }
    }
    path.to_path_buf()
}
