use crate::{DEFAULT_ERROR_CAP, OTHER_ERRORS_LABEL};
use std::collections::HashMap;

/// Distinct error messages with occurrence counts.
///
/// At most `cap` distinct messages are kept; anything new past the cap only bumps `other`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorTally {
    counts: HashMap<String, u64>,
    other: u64,
    cap: usize,
}

impl Default for ErrorTally {
    fn default() -> Self {
        Self::new(DEFAULT_ERROR_CAP)
    }
}

impl ErrorTally {
    pub fn new(cap: usize) -> Self {
        Self {
            counts: HashMap::new(),
            other: 0,
            cap,
        }
    }

    pub fn add(&mut self, message: &str) {
        if let Some(count) = self.counts.get_mut(message) {
            *count += 1;
        } else if self.counts.len() < self.cap {
            self.counts.insert(message.to_string(), 1);
        } else {
            self.other += 1;
        }
    }

    pub fn get(&self, message: &str) -> u64 {
        self.counts.get(message).copied().unwrap_or(0)
    }

    /// Count folded into the overflow bucket.
    pub fn other(&self) -> u64 {
        self.other
    }

    pub fn distinct(&self) -> usize {
        self.counts.len()
    }

    pub fn total(&self) -> u64 {
        self.counts.values().sum::<u64>() + self.other
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Entries ordered by count descending, then message. The overflow bucket comes last.
    pub fn sorted(&self) -> Vec<(&str, u64)> {
        let mut entries: Vec<_> = self
            .counts
            .iter()
            .map(|(msg, count)| (msg.as_str(), *count))
            .collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        if self.other > 0 {
            entries.push((OTHER_ERRORS_LABEL, self.other));
        }
        entries
    }
}
