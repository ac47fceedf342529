/*!
 * Coarse resumption layer.
 *
 * Before a job dispatches anything, the existing record file is parsed once
 * into the set of time keys it already holds. The dispatcher asks a small
 * request/response service whether a line's key is present and skips it if
 * so. The fine layer (existing image artifact) lives in `extraction`.
 */

use std::collections::HashSet;
use std::path::Path;
use anyhow::Result;
use log::{debug, trace};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::file_utils::FileManager;
use crate::output::parse_records;

// @const: Position of the display time in a record
pub const TIME_FIELD_INDEX: usize = 1;

/// Time keys already present in a record file
#[derive(Debug, Clone, Default)]
pub struct SeenTimeKeys {
    keys: HashSet<String>,
}

impl SeenTimeKeys {
    /// Parse a record file; a missing file yields an empty set
    pub fn load<P: AsRef<Path>>(path: P, field_separator: &str) -> Result<Self> {
        let path = path.as_ref();
        if !FileManager::file_exists(path) {
            return Ok(Self::default());
        }

        let content = FileManager::read_to_string(path)?;
        let seen = Self::from_records(&content, field_separator);
        debug!("{} lines already recorded in {:?}", seen.len(), path);
        Ok(seen)
    }

    /// Collect the time field of every record
    pub fn from_records(content: &str, field_separator: &str) -> Self {
        let keys = parse_records(content, field_separator)
            .into_iter()
            .filter_map(|mut fields| {
                (fields.len() > TIME_FIELD_INDEX).then(|| fields.swap_remove(TIME_FIELD_INDEX))
            })
            .collect();
        Self { keys }
    }

    pub fn contains(&self, time_key: &str) -> bool {
        self.keys.contains(time_key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

// @struct: One question to the service
#[derive(Debug)]
struct ResumptionQuery {
    time_key: String,
    reply: oneshot::Sender<bool>,
}

/// Client side of the resumption service
#[derive(Debug, Clone)]
pub struct ResumptionHandle {
    requests: mpsc::Sender<ResumptionQuery>,
}

impl ResumptionHandle {
    /// Whether the record file already holds this time key.
    ///
    /// A stopped service answers `false`, so the line gets processed and the
    /// fine layer still guards against duplicate work.
    pub async fn is_already_recorded(&self, time_key: &str) -> bool {
        let (reply, answer) = oneshot::channel();
        let query = ResumptionQuery { time_key: time_key.to_string(), reply };

        if self.requests.send(query).await.is_err() {
            return false;
        }
        answer.await.unwrap_or(false)
    }
}

/// Task owning the seen-key set for the duration of a job
pub struct ResumptionService;

impl ResumptionService {
    /// Start the service; it stops once every handle is dropped
    pub fn spawn(seen: SeenTimeKeys) -> (ResumptionHandle, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<ResumptionQuery>(1);

        let task = tokio::spawn(async move {
            while let Some(query) = rx.recv().await {
                let present = seen.contains(&query.time_key);
                trace!("Resumption check {} -> {}", query.time_key, present);
                let _ = query.reply.send(present);
            }
        });

        (ResumptionHandle { requests: tx }, task)
    }
}
