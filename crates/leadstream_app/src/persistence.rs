use std::fs;
use std::path::Path;

use chrono::Utc;
use leadstream_core::{Record, ResultAccumulator, ResultStats, SearchParameters};
use leadstream_engine::write_atomically;
use serde::{Deserialize, Serialize};
use stream_logging::{stream_error, stream_info, stream_warn};

/// The last completed result set, kept between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct SessionCache {
    pub saved_utc: String,
    pub parameters: SearchParameters,
    pub records: Vec<Record>,
    pub stats: ResultStats,
}

impl SessionCache {
    pub(crate) fn new(parameters: SearchParameters, records: Vec<Record>) -> Self {
        let stats = ResultAccumulator::from_iter(records.iter().cloned()).stats();
        Self {
            saved_utc: Utc::now().to_rfc3339(),
            parameters,
            records,
            stats,
        }
    }
}

pub(crate) fn load_session_cache(path: &Path) -> Option<SessionCache> {
    let content = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
        Err(err) => {
            stream_warn!("Failed to read session cache from {:?}: {}", path, err);
            return None;
        }
    };

    match ron::from_str::<SessionCache>(&content) {
        Ok(cache) => {
            stream_info!(
                "Loaded {} cached results from {:?}",
                cache.records.len(),
                path
            );
            Some(cache)
        }
        Err(err) => {
            stream_warn!("Failed to parse session cache from {:?}: {}", path, err);
            None
        }
    }
}

pub(crate) fn save_session_cache(path: &Path, cache: &SessionCache) {
    let pretty = ron::ser::PrettyConfig::new();
    let content = match ron::ser::to_string_pretty(cache, pretty) {
        Ok(text) => text,
        Err(err) => {
            stream_error!("Failed to serialize session cache: {}", err);
            return;
        }
    };

    match write_atomically(path, &content) {
        Ok(written) => stream_info!(
            "Saved {} results to {:?}",
            cache.records.len(),
            written
        ),
        Err(err) => stream_error!("Failed to write session cache to {:?}: {}", path, err),
    }
}

/// Records to store after a completed search. With `merge` the fresh
/// records are folded into the cached ones by id, fresh values winning.
pub(crate) fn records_to_store(
    previous: Option<&SessionCache>,
    fresh: Vec<Record>,
    merge: bool,
) -> Vec<Record> {
    match previous {
        Some(previous) if merge => {
            let mut results: ResultAccumulator = previous.records.iter().cloned().collect();
            for record in fresh {
                results.upsert(record);
            }
            results.snapshot()
        }
        _ => fresh,
    }
}
