use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use stream_logging::{stream_debug, stream_trace};

use crate::{Record, RecordId};

/// Derived counts shown next to the results and sent to history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResultStats {
    pub total: usize,
    pub with_email: usize,
    pub with_phone: usize,
    /// Records with at least one filled contact field.
    pub valid: usize,
}

/// Deduplicated, insertion-ordered record set for one search session.
///
/// Identity is the record id and nothing else.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultAccumulator {
    records: Vec<Record>,
    index: HashMap<RecordId, usize>,
}

impl ResultAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a record whose id is new. Returns `false` for a duplicate lead.
    pub fn apply_lead(&mut self, record: Record) -> bool {
        if self.index.contains_key(&record.id) {
            stream_trace!("Duplicate lead for id {} ignored", record.id);
            return false;
        }
        self.index.insert(record.id.clone(), self.records.len());
        self.records.push(record);
        true
    }

    /// Merges a patch over the record with the same id. Returns `false` when the id is unknown.
    pub fn apply_update(&mut self, patch: Record) -> bool {
        match self.index.get(&patch.id) {
            Some(&position) => {
                self.records[position].merge_from(patch);
                true
            }
            None => {
                stream_debug!("Update for unknown id {} ignored", patch.id);
                false
            }
        }
    }

    /// Insert-or-merge, used when folding a finished result set into earlier ones.
    pub fn upsert(&mut self, record: Record) {
        if self.index.contains_key(&record.id) {
            self.apply_update(record);
        } else {
            self.apply_lead(record);
        }
    }

    pub fn contains(&self, id: &RecordId) -> bool {
        self.index.contains_key(id)
    }

    pub fn get(&self, id: &RecordId) -> Option<&Record> {
        self.index.get(id).map(|&position| &self.records[position])
    }

    /// Records in order of their first lead.
    pub fn snapshot(&self) -> Vec<Record> {
        self.records.clone()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn stats(&self) -> ResultStats {
        self.records
            .iter()
            .fold(ResultStats::default(), |mut stats, record| {
                stats.total += 1;
                stats.with_email += usize::from(record.has_email());
                stats.with_phone += usize::from(record.has_phone());
                stats.valid += usize::from(record.has_contact());
                stats
            })
    }

    pub fn reset(&mut self) {
        self.records.clear();
        self.index.clear();
    }
}

impl FromIterator<Record> for ResultAccumulator {
    fn from_iter<I: IntoIterator<Item = Record>>(iter: I) -> Self {
        let mut accumulator = Self::new();
        for record in iter {
            accumulator.apply_lead(record);
        }
        accumulator
    }
}
