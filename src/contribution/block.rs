use crate::contribution::LocalContext;
use crate::partition::BlockPartition;
use crate::Real;
use nalgebra::{DMatrix, DMatrixViewMut, DVector, DVectorView, DVectorViewMut, Scalar};

/// The restriction of a block vector to the dofs of one mesh entity.
///
/// Block `i` holds the entity's dofs of field `i`, in the order given by that field's space.
#[derive(Debug, Clone)]
pub struct LocalBlockVector<T: Scalar> {
    data: DVector<T>,
    partition: BlockPartition,
}

impl<T: Real> Default for LocalBlockVector<T> {
    fn default() -> Self {
        Self {
            data: DVector::zeros(0),
            partition: BlockPartition::from_offsets(vec![0]),
        }
    }
}

impl<T: Real> LocalBlockVector<T> {
    /// Creates a zeroed local block vector with the given block sizes.
    pub fn zeros(block_sizes: impl IntoIterator<Item = usize>) -> Self {
        let mut vector = Self::default();
        vector.resize_and_zero(block_sizes);
        vector
    }

    /// Creates a local block vector by concatenating the given blocks.
    pub fn from_blocks(blocks: &[DVector<T>]) -> Self {
        let mut vector = Self::zeros(blocks.iter().map(|block| block.len()));
        for (i, block) in blocks.iter().enumerate() {
            vector.block_mut(i).copy_from(block);
        }
        vector
    }

    pub(crate) fn resize_and_zero(&mut self, block_sizes: impl IntoIterator<Item = usize>) {
        self.partition = BlockPartition::from_block_sizes(block_sizes);
        self.data
            .resize_vertically_mut(self.partition.total_size(), T::zero());
        self.data.fill(T::zero());
    }

    pub fn num_blocks(&self) -> usize {
        self.partition.num_blocks()
    }

    pub fn partition(&self) -> &BlockPartition {
        &self.partition
    }

    pub fn block(&self, field: usize) -> DVectorView<T> {
        self.data
            .rows(self.partition.block_offset(field), self.partition.block_size(field))
    }

    pub fn block_mut(&mut self, field: usize) -> DVectorViewMut<T> {
        self.data
            .rows_mut(self.partition.block_offset(field), self.partition.block_size(field))
    }

    /// All blocks as one contiguous vector.
    pub fn as_vector(&self) -> DVectorView<T> {
        DVectorView::from(&self.data)
    }
}

/// The local Jacobian of one mesh entity, as a grid of dense blocks.
///
/// Block `(i, j)` is the derivative of the local residual of field `i` with respect to the
/// local dofs of field `j`. Only the blocks for field pairs that the contribution couples are
/// allocated.
#[derive(Debug, Clone)]
pub struct LocalBlockMatrix<T: Scalar> {
    partition: BlockPartition,
    blocks: Vec<Option<DMatrix<T>>>,
}

impl<T: Real> Default for LocalBlockMatrix<T> {
    fn default() -> Self {
        Self {
            partition: BlockPartition::from_offsets(vec![0]),
            blocks: Vec::new(),
        }
    }
}

impl<T: Real> LocalBlockMatrix<T> {
    /// Resizes the grid to the given partition, allocating (and zeroing) exactly the blocks
    /// for which `coupled(i, j)` holds.
    pub(crate) fn reset(&mut self, partition: &BlockPartition, coupled: impl Fn(usize, usize) -> bool) {
        let n = partition.num_blocks();
        if self.partition != *partition {
            self.partition = partition.clone();
            self.blocks.clear();
            self.blocks.resize(n * n, None);
        }

        for i in 0..n {
            for j in 0..n {
                let entry = &mut self.blocks[n * i + j];
                if coupled(i, j) {
                    let (rows, cols) = (partition.block_size(i), partition.block_size(j));
                    let block = entry.get_or_insert_with(|| DMatrix::zeros(rows, cols));
                    block.fill(T::zero());
                } else {
                    *entry = None;
                }
            }
        }
    }

    pub fn num_blocks(&self) -> usize {
        self.partition.num_blocks()
    }

    pub fn is_coupled(&self, row_field: usize, col_field: usize) -> bool {
        self.block(row_field, col_field).is_some()
    }

    pub fn block(&self, row_field: usize, col_field: usize) -> Option<&DMatrix<T>> {
        let n = self.num_blocks();
        assert!(row_field < n && col_field < n, "Block index out of bounds");
        self.blocks[n * row_field + col_field].as_ref()
    }

    /// A mutable view of block `(row_field, col_field)`, or `None` if the pair is not coupled.
    pub fn block_mut(&mut self, row_field: usize, col_field: usize) -> Option<DMatrixViewMut<T>> {
        let n = self.num_blocks();
        assert!(row_field < n && col_field < n, "Block index out of bounds");
        self.blocks[n * row_field + col_field]
            .as_mut()
            .map(DMatrixViewMut::from)
    }
}

/// A local contribution over an ordered tuple of fields.
///
/// The block counterpart of [`LocalContribution`](crate::contribution::LocalContribution).
/// The contribution sees the entity's dofs of every field at once, which is what makes
/// coupling terms between fields possible.
pub trait BlockLocalContribution<T: Real> {
    /// Computes the local residual of every field on the entity.
    ///
    /// `output` is zeroed and partitioned like `u_local`.
    fn assemble_local_residual_into(
        &self,
        context: &LocalContext,
        u_local: &LocalBlockVector<T>,
        output: &mut LocalBlockVector<T>,
    ) -> eyre::Result<()>;

    fn as_jacobian(&self) -> Option<&dyn BlockLocalJacobian<T>> {
        None
    }

    fn as_energy(&self) -> Option<&dyn BlockLocalEnergy<T>> {
        None
    }
}

pub trait BlockLocalJacobian<T: Real> {
    /// Whether the residual of `row_field` depends on `col_field`.
    ///
    /// Field pairs that no contribution couples have no block in the global Jacobian at all.
    /// The answer must not depend on the trial vector.
    fn couples(&self, _row_field: usize, _col_field: usize) -> bool {
        true
    }

    /// Computes the coupled blocks of the local Jacobian. The blocks of `output` are zeroed.
    fn assemble_local_jacobian_into(
        &self,
        context: &LocalContext,
        u_local: &LocalBlockVector<T>,
        output: &mut LocalBlockMatrix<T>,
    ) -> eyre::Result<()>;
}

pub trait BlockLocalEnergy<T: Real> {
    fn compute_local_energy(&self, context: &LocalContext, u_local: &LocalBlockVector<T>) -> eyre::Result<T>;
}
