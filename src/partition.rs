use crate::error::InvalidDataError;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// A partition of a block vector into contiguous blocks, one per field.
///
/// Stores the offsets `[0, n_1, n_1 + n_2, ..., n_1 + ... + n_k]`, so that block `i` occupies
/// `offsets[i] .. offsets[i + 1]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "BlockPartitionData")]
pub struct BlockPartition {
    offsets: Vec<usize>,
}

#[derive(Deserialize)]
struct BlockPartitionData {
    offsets: Vec<usize>,
}

impl TryFrom<BlockPartitionData> for BlockPartition {
    type Error = InvalidDataError;

    fn try_from(data: BlockPartitionData) -> Result<Self, Self::Error> {
        let offsets = data.offsets;
        if offsets.first() != Some(&0) {
            return Err(InvalidDataError::new("block partition", "offsets must start at zero"));
        }
        if let Some(w) = offsets.windows(2).find(|w| w[0] > w[1]) {
            return Err(InvalidDataError::new(
                "block partition",
                format!("offsets must be non-decreasing, found {} followed by {}", w[0], w[1]),
            ));
        }
        Ok(Self { offsets })
    }
}

impl BlockPartition {
    pub fn from_block_sizes(sizes: impl IntoIterator<Item = usize>) -> Self {
        let mut offsets = vec![0];
        let mut total = 0;
        for size in sizes {
            total += size;
            offsets.push(total);
        }
        Self { offsets }
    }

    /// Creates a partition from explicit offsets.
    ///
    /// # Panics
    ///
    /// Panics if `offsets` is empty, does not start at zero or is decreasing.
    pub fn from_offsets(offsets: Vec<usize>) -> Self {
        assert_eq!(offsets.first(), Some(&0), "Offsets must start at zero");
        assert!(
            offsets.windows(2).all(|w| w[0] <= w[1]),
            "Offsets must be monotonically non-decreasing"
        );
        Self { offsets }
    }

    pub fn num_blocks(&self) -> usize {
        self.offsets.len() - 1
    }

    pub fn total_size(&self) -> usize {
        // The offsets always contain at least the initial zero
        *self.offsets.last().unwrap_or(&0)
    }

    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    pub fn block_offset(&self, block: usize) -> usize {
        self.offsets[block]
    }

    pub fn block_size(&self, block: usize) -> usize {
        self.offsets[block + 1] - self.offsets[block]
    }

    pub fn block_range(&self, block: usize) -> Range<usize> {
        self.offsets[block]..self.offsets[block + 1]
    }

    pub fn block_sizes(&self) -> impl '_ + Iterator<Item = usize> {
        self.offsets.windows(2).map(|w| w[1] - w[0])
    }

    /// Maps a global index to its block and the index local to that block.
    ///
    /// Returns `None` if the index is out of bounds.
    pub fn find_block(&self, global_index: usize) -> Option<(usize, usize)> {
        if global_index >= self.total_size() {
            return None;
        }
        // The first offset strictly larger than the index ends the block containing it
        let block = self.offsets.partition_point(|&offset| offset <= global_index) - 1;
        Some((block, global_index - self.offsets[block]))
    }
}
