use config::{Config, ConfigError, File};
use serde::Deserialize;

use std::path::Path;

fn default_max_transactions() -> u32 {
    10
}
fn default_proposal_delay_ms() -> u64 {
    3000
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    /// Address the wire server binds to.
    pub listener_ip: String,
    /// Ledger peers in the format `PUBKEYHEX@IP:PORT`, in ledger order.
    pub ledger_peers: Vec<String>,
    /// Hex-encoded ed25519 keypair of this node; generated when absent.
    pub keypair: Option<String>,
    /// Proposal size cap.
    #[serde(default = "default_max_transactions")]
    pub max_number_of_transactions: u32,
    /// Timeout for the proposal request to the issuer, in milliseconds.
    #[serde(default = "default_proposal_delay_ms")]
    pub proposal_delay_ms: u64,
    /// Hex-encoded hashes priming the permutation window: pre-genesis and
    /// genesis. Exactly two entries.
    pub initial_hashes: Vec<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub enum ENV {
    Testing,
    Development,
    Production,
}

impl std::fmt::Display for ENV {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ENV::Testing => write!(f, "Testing"),
            ENV::Production => write!(f, "Production"),
            ENV::Development => write!(f, "Development"),
        }
    }
}

impl From<&str> for ENV {
    fn from(env: &str) -> Self {
        match env {
            "Testing" => ENV::Testing,
            "Production" => ENV::Production,
            _ => ENV::Development,
        }
    }
}

impl Settings {
    pub fn new(home: &Path) -> Result<Self, ConfigError> {
        let env = ENV::from(
            std::env::var("RUN_ENV").unwrap_or_else(|_| "Development".into()).as_str(),
        );
        Config::builder()
            .set_default("env", env.to_string())?
            .add_source(File::from(home.join("Default")))
            .add_source(File::from(home.join(env.to_string())).required(false))
            .build()?
            .try_deserialize()
    }
}
