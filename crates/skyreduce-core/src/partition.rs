//! Partition planning over an ordered index axis.
//!
//! A `Partitioner` splits an inclusive index range `[lo, hi]` into contiguous
//! groups of a fixed size. The last group may be shorter when the range does
//! not divide evenly.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// A contiguous, inclusive slice of the dataset's index axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Partition {
    /// Position of this partition in the plan.
    pub index: usize,
    /// First index covered.
    pub start: u64,
    /// Last index covered (inclusive).
    pub end: u64,
}

impl Partition {
    /// Number of indices covered.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// A partition always covers at least one index.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Whether `i` falls inside this partition.
    #[must_use]
    pub fn contains(&self, i: u64) -> bool {
        (self.start..=self.end).contains(&i)
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} [{}, {}]", self.index, self.start, self.end)
    }
}

/// Splits index ranges into partitions.
#[derive(Debug, Clone, Copy)]
pub struct Partitioner {
    group_size: u64,
    single: bool,
}

impl Partitioner {
    /// Create a partitioner with the given group size.
    #[must_use]
    pub fn new(group_size: u64) -> Self {
        Self {
            group_size,
            single: false,
        }
    }

    /// Truncate every plan to its first partition.
    #[must_use]
    pub fn single(mut self, single: bool) -> Self {
        self.single = single;
        self
    }

    /// Configured group size.
    #[must_use]
    pub fn group_size(&self) -> u64 {
        self.group_size
    }

    /// Plan the partitions of `[lo, hi]`.
    pub fn plan(&self, lo: u64, hi: u64) -> Result<Vec<Partition>, PipelineError> {
        if hi < lo || self.group_size < 1 {
            return Err(PipelineError::InvalidRange {
                lo,
                hi,
                group_size: self.group_size,
            });
        }

        let step = self.group_size - 1;
        let mut partitions = Vec::new();
        let mut start = lo;
        loop {
            let end = start.saturating_add(step).min(hi);
            partitions.push(Partition {
                index: partitions.len(),
                start,
                end,
            });
            if self.single || end == hi {
                break;
            }
            start = end + 1;
        }

        tracing::debug!(
            lo,
            hi,
            group_size = self.group_size,
            single = self.single,
            count = partitions.len(),
            "planned partitions"
        );
        Ok(partitions)
    }
}
