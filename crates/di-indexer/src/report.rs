use serde::{Deserialize, Serialize};

/// Outcome of an update call. Ids keep the order of the input batch.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UpdateReport {
    /// Ids that existed and were overwritten.
    pub updated: Vec<String>,
    /// Ids not present in the collection. Nothing was written for them.
    pub skipped: Vec<String>,
}

impl UpdateReport {
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }

    pub fn total(&self) -> usize {
        self.updated.len() + self.skipped.len()
    }

    pub(crate) fn record(&mut self, id: &str, replaced: bool) {
        if replaced {
            self.updated.push(id.to_string());
        } else {
            self.skipped.push(id.to_string());
        }
    }
}
