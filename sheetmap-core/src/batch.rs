//! Batch id counters: a shared remote sequence with a local file fallback

use anyhow::{Context, Result, anyhow, bail};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::config::BatchConfig;

/// Claims the next batch id and advances the sequence
pub trait BatchCounter {
    fn claim(&mut self) -> Result<u64>;
}

#[derive(Debug, Deserialize)]
struct CurrentId {
    batch_id: u64,
}

#[derive(Debug, Serialize)]
struct NextId {
    next_id: u64,
}

#[derive(Debug, Deserialize)]
struct Ack {
    ok: bool,
}

/// Remote sequence service: `GET` returns the current id, `POST` stores the next
#[derive(Debug, Clone)]
pub struct HttpBatchCounter {
    url: String,
    timeout_seconds: u64,
}

impl HttpBatchCounter {
    pub fn new(url: impl Into<String>, timeout_seconds: u64) -> Self {
        Self {
            url: url.into(),
            timeout_seconds,
        }
    }
}

#[cfg(feature = "remote-counter")]
impl BatchCounter for HttpBatchCounter {
    fn claim(&mut self) -> Result<u64> {
        use reqwest::blocking::Client;
        use std::time::Duration;

        let client = Client::builder()
            .timeout(Duration::from_secs(self.timeout_seconds))
            .build()
            .context("Failed to build HTTP client")?;

        let current: CurrentId = client
            .get(&self.url)
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.json())
            .with_context(|| format!("Failed to read batch id from {}", self.url))?;

        let next = NextId {
            next_id: current.batch_id + 1,
        };
        let ack: Ack = client
            .post(&self.url)
            .json(&next)
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.json())
            .with_context(|| format!("Failed to store next batch id at {}", self.url))?;

        if !ack.ok {
            bail!("Batch service at {} rejected next id {}", self.url, next.next_id);
        }

        debug!("Claimed batch id {} from {}", current.batch_id, self.url);
        Ok(current.batch_id)
    }
}

#[cfg(not(feature = "remote-counter"))]
impl BatchCounter for HttpBatchCounter {
    fn claim(&mut self) -> Result<u64> {
        Err(anyhow!(
            "remote batch counter at {} unavailable: built without the remote-counter feature",
            self.url
        ))
    }
}

/// Local counter file holding the next id as decimal text.
///
/// Read-modify-write without locking; only safe for a single process.
#[derive(Debug, Clone)]
pub struct FileBatchCounter {
    path: PathBuf,
    start: u64,
}

impl FileBatchCounter {
    pub fn new(path: impl Into<PathBuf>, start: u64) -> Self {
        Self {
            path: path.into(),
            start,
        }
    }

    fn current(&self) -> Result<u64> {
        if !self.path.exists() {
            return Ok(self.start);
        }
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read batch counter: {}", self.path.display()))?;
        let content = content.trim();
        if content.is_empty() {
            return Ok(self.start);
        }
        content.parse::<u64>().map_err(|_| {
            anyhow!(
                "Batch counter {} holds '{}', not a number",
                self.path.display(),
                content
            )
        })
    }
}

impl BatchCounter for FileBatchCounter {
    fn claim(&mut self) -> Result<u64> {
        let id = self.current()?;
        fs::write(&self.path, (id + 1).to_string())
            .with_context(|| format!("Failed to write batch counter: {}", self.path.display()))?;
        debug!("Claimed batch id {} from {}", id, self.path.display());
        Ok(id)
    }
}

/// Tries `primary`, then `fallback` when it fails
pub struct FallbackBatchCounter {
    primary: Box<dyn BatchCounter>,
    fallback: Box<dyn BatchCounter>,
}

impl FallbackBatchCounter {
    pub fn new(primary: Box<dyn BatchCounter>, fallback: Box<dyn BatchCounter>) -> Self {
        Self { primary, fallback }
    }
}

impl BatchCounter for FallbackBatchCounter {
    fn claim(&mut self) -> Result<u64> {
        match self.primary.claim() {
            Ok(id) => Ok(id),
            Err(e) => {
                warn!("Batch counter unavailable ({:#}); using local fallback", e);
                self.fallback.claim()
            }
        }
    }
}

/// Counter chain described by the `[batch]` section
pub fn counter_from_config(config: &BatchConfig) -> Box<dyn BatchCounter> {
    let file = FileBatchCounter::new(config.fallback_path.clone(), config.start);
    match &config.url {
        Some(url) => Box::new(FallbackBatchCounter::new(
            Box::new(HttpBatchCounter::new(url.clone(), config.timeout_seconds)),
            Box::new(file),
        )),
        None => Box::new(file),
    }
}
