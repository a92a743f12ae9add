use crate::operator::LinearOperator;
use crate::partition::BlockPartition;
use crate::sparse::spmv_csr;
use crate::Real;
use nalgebra::{DMatrix, DVectorView, DVectorViewMut, Scalar};
use nalgebra_sparse::CsrMatrix;

/// A square grid of sparse blocks acting on block vectors.
///
/// Block `(i, j)` maps block `j` of the input to block `i` of the output and has dimensions
/// `block_size(i) x block_size(j)`. A missing block acts as zero.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockOperator<T: Scalar> {
    partition: BlockPartition,
    // Row-major, num_blocks x num_blocks
    blocks: Vec<Option<CsrMatrix<T>>>,
}

impl<T: Real> BlockOperator<T> {
    /// Creates a block operator with all blocks missing.
    pub fn new(partition: BlockPartition) -> Self {
        let n = partition.num_blocks();
        Self {
            partition,
            blocks: vec![None; n * n],
        }
    }

    pub fn partition(&self) -> &BlockPartition {
        &self.partition
    }

    pub fn num_blocks(&self) -> usize {
        self.partition.num_blocks()
    }

    fn linear_index(&self, row_block: usize, col_block: usize) -> usize {
        let n = self.num_blocks();
        assert!(
            row_block < n && col_block < n,
            "Block ({}, {}) out of bounds for {} x {} block operator",
            row_block,
            col_block,
            n,
            n
        );
        n * row_block + col_block
    }

    /// The block at `(row_block, col_block)`, or `None` if the block is zero.
    ///
    /// # Panics
    ///
    /// Panics if the block index is out of bounds.
    pub fn block(&self, row_block: usize, col_block: usize) -> Option<&CsrMatrix<T>> {
        self.blocks[self.linear_index(row_block, col_block)].as_ref()
    }

    pub fn block_mut(&mut self, row_block: usize, col_block: usize) -> Option<&mut CsrMatrix<T>> {
        let idx = self.linear_index(row_block, col_block);
        self.blocks[idx].as_mut()
    }

    /// Sets (or clears) the block at `(row_block, col_block)`.
    ///
    /// # Panics
    ///
    /// Panics if the block index is out of bounds or the block has the wrong dimensions.
    pub fn set_block(&mut self, row_block: usize, col_block: usize, block: Option<CsrMatrix<T>>) {
        let idx = self.linear_index(row_block, col_block);
        if let Some(matrix) = &block {
            assert_eq!(
                (matrix.nrows(), matrix.ncols()),
                (self.partition.block_size(row_block), self.partition.block_size(col_block)),
                "Block ({}, {}) has wrong dimensions",
                row_block,
                col_block
            );
        }
        self.blocks[idx] = block;
    }

    /// Iterates over the present blocks as `(row_block, col_block, matrix)`.
    pub fn nonzero_blocks(&self) -> impl '_ + Iterator<Item = (usize, usize, &CsrMatrix<T>)> {
        let n = self.num_blocks();
        self.blocks
            .iter()
            .enumerate()
            .filter_map(move |(idx, block)| block.as_ref().map(|matrix| (idx / n, idx % n, matrix)))
    }

    /// Assembles the full operator into a dense matrix. Mostly useful for testing and debugging.
    pub fn to_dense(&self) -> DMatrix<T> {
        let total = self.partition.total_size();
        let mut dense = DMatrix::zeros(total, total);
        for (i, j, block) in self.nonzero_blocks() {
            let row_offset = self.partition.block_offset(i);
            let col_offset = self.partition.block_offset(j);
            for (row, col, value) in block.triplet_iter() {
                dense[(row_offset + row, col_offset + col)] += *value;
            }
        }
        dense
    }
}

impl<T: Real> LinearOperator<T> for BlockOperator<T> {
    fn nrows(&self) -> usize {
        self.partition.total_size()
    }

    fn ncols(&self) -> usize {
        self.partition.total_size()
    }

    fn apply_into(&self, x: DVectorView<T>, mut y: DVectorViewMut<T>) {
        let total = self.partition.total_size();
        assert_eq!(x.len(), total, "Input dimension must match block operator");
        assert_eq!(y.len(), total, "Output dimension must match block operator");

        y.fill(T::zero());
        for (i, j, block) in self.nonzero_blocks() {
            let x_j = x.rows(self.partition.block_offset(j), self.partition.block_size(j));
            let y_i = y.rows_mut(self.partition.block_offset(i), self.partition.block_size(i));
            spmv_csr(T::one(), y_i, T::one(), block, x_j);
        }
    }
}
