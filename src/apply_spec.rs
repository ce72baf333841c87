//! The deployment spec last pushed by `apply`.
//!
//! Heartbeats and `get_state` read the job identity from here.

use serde::Deserialize;
use serde_json::Value;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct JobSpec {
    #[serde(default)]
    pub name: String,
}

/// Parsed view of an applied spec. Unknown keys are kept in `raw` only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplySpec {
    pub job: Option<JobSpec>,
    pub index: Option<u32>,
    pub raw: Value,
}

#[derive(Deserialize)]
struct SpecFields {
    #[serde(default)]
    job: Option<JobSpec>,
    #[serde(default)]
    index: Option<u32>,
}

impl ApplySpec {
    pub fn from_value(raw: Value) -> Result<Self, serde_json::Error> {
        let fields: SpecFields = serde_json::from_value(raw.clone())?;
        Ok(Self {
            job: fields.job,
            index: fields.index,
            raw,
        })
    }

    /// Job name, empty before anything was applied.
    pub fn job_name(&self) -> &str {
        self.job.as_ref().map_or("", |j| j.name.as_str())
    }
}

#[derive(Debug, Default)]
pub struct SpecStore {
    current: RwLock<ApplySpec>,
}

impl SpecStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn current(&self) -> ApplySpec {
        self.current.read().await.clone()
    }

    pub async fn replace(&self, spec: ApplySpec) {
        *self.current.write().await = spec;
    }
}
