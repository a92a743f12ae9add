//! Sparse matrix helpers: sparsity pattern construction, local-to-global scattering and
//! matrix-vector products.
use crate::Real;
use nalgebra::{DMatrix, DVectorView, DVectorViewMut, Scalar};
use nalgebra_sparse::ops::serial::spmm_csr_dense;
use nalgebra_sparse::ops::Op;
use nalgebra_sparse::pattern::SparsityPattern;
use nalgebra_sparse::CsrMatrix;
use std::collections::BTreeSet;
use std::iter;

/// Incrementally collects the entries of a sparsity pattern.
///
/// Entries shared by neighboring entities are stored once.
#[derive(Debug, Clone)]
pub struct PatternBuilder {
    nrows: usize,
    ncols: usize,
    entries: BTreeSet<(usize, usize)>,
}

impl PatternBuilder {
    pub fn new(nrows: usize, ncols: usize) -> Self {
        Self {
            nrows,
            ncols,
            entries: BTreeSet::new(),
        }
    }

    /// Adds the dense block `rows x cols` to the pattern.
    ///
    /// # Panics
    ///
    /// Panics if an index is out of bounds.
    pub fn add_block(&mut self, rows: &[usize], cols: &[usize]) {
        for &i in rows {
            assert!(i < self.nrows, "Row index {} out of bounds ({} rows)", i, self.nrows);
            for &j in cols {
                assert!(j < self.ncols, "Column index {} out of bounds ({} columns)", j, self.ncols);
                self.entries.insert((i, j));
            }
        }
    }

    /// Adds the diagonal entries `(i, i)` to the pattern.
    pub fn add_diagonal(&mut self, indices: impl IntoIterator<Item = usize>) {
        for i in indices {
            assert!(i < self.nrows && i < self.ncols, "Diagonal index {} out of bounds", i);
            self.entries.insert((i, i));
        }
    }

    pub fn build(self) -> SparsityPattern {
        let mut row_counts = vec![0; self.nrows];
        for &(i, _) in &self.entries {
            row_counts[i] += 1;
        }
        let offsets: Vec<usize> = iter::once(0)
            .chain(row_counts.iter().scan(0, |nnz, &count| {
                *nnz += count;
                Some(*nnz)
            }))
            .collect();
        // BTreeSet iterates in row-major order, so the column indices of each row come out sorted
        let column_indices: Vec<usize> = self.entries.into_iter().map(|(_, j)| j).collect();

        SparsityPattern::try_from_offsets_and_indices(self.nrows, self.ncols, offsets, column_indices)
            .expect("Internal error: Entries are sorted, unique and in bounds")
    }
}

/// Creates a matrix with a copy of the given pattern and all stored values set to zero.
pub fn zeroed_csr_from_pattern<T: Real>(pattern: &SparsityPattern) -> CsrMatrix<T> {
    let values = vec![T::zero(); pattern.nnz()];
    CsrMatrix::try_from_pattern_and_values(pattern.clone(), values)
        .expect("Internal error: Number of values matches the pattern by construction")
}

/// Adds a local (element) matrix to the global CSR matrix.
///
/// Row `i` of `local` is added to global row `row_dofs[i]`, column `j` to global column
/// `col_dofs[j]`. Repeated dofs are summed.
///
/// # Panics
///
/// Panics if the dimensions of `local` do not match the dof lists, or if an entry is not part
/// of the sparsity pattern of `csr`.
pub fn add_local_matrix_to_csr<T>(csr: &mut CsrMatrix<T>, row_dofs: &[usize], col_dofs: &[usize], local: &DMatrix<T>)
where
    T: Real,
{
    assert_eq!(local.nrows(), row_dofs.len());
    assert_eq!(local.ncols(), col_dofs.len());

    for (local_row, &global_row) in row_dofs.iter().enumerate() {
        let mut csr_row = csr.row_mut(global_row);
        let (cols, values) = csr_row.cols_and_values_mut();
        for (local_col, &global_col) in col_dofs.iter().enumerate() {
            // TODO: Use a sorted permutation of the column dofs to replace the binary search
            // with a single merge pass over the row
            let idx = cols
                .binary_search(&global_col)
                .unwrap_or_else(|_| panic!("Entry ({}, {}) is not in the sparsity pattern", global_row, global_col));
            values[idx] += local[(local_row, local_col)];
        }
    }
}

/// Gathers the entries `global[indices[i]]` into `local[i]`.
pub fn gather_global_to_local<'a, 'b, T>(
    global: impl Into<DVectorView<'a, T>>,
    local: impl Into<DVectorViewMut<'b, T>>,
    indices: &[usize],
) where
    T: Scalar,
{
    let global = global.into();
    let mut local = local.into();
    assert_eq!(local.len(), indices.len());
    for (local_entry, &global_index) in local.iter_mut().zip(indices) {
        *local_entry = global[global_index].clone();
    }
}

/// Adds `local[i]` to `global[indices[i]]`.
pub fn scatter_local_to_global<'a, 'b, T>(
    local: impl Into<DVectorView<'a, T>>,
    global: impl Into<DVectorViewMut<'b, T>>,
    indices: &[usize],
) where
    T: Real,
{
    let local = local.into();
    let mut global = global.into();
    assert_eq!(local.len(), indices.len());
    for (local_entry, &global_index) in local.iter().zip(indices) {
        global[global_index] += *local_entry;
    }
}

/// Computes `y = beta * y + alpha * A * x`.
///
/// When `beta` is zero, `y` is overwritten and its previous contents (including NaN) are
/// ignored.
pub fn spmv_csr<'a, 'b, T>(
    beta: T,
    y: impl Into<DVectorViewMut<'a, T>>,
    alpha: T,
    a: &CsrMatrix<T>,
    x: impl Into<DVectorView<'b, T>>,
) where
    T: Real,
{
    let mut y = y.into();
    let x = x.into();
    assert_eq!(y.len(), a.nrows(), "Output dimension must match number of rows");
    assert_eq!(x.len(), a.ncols(), "Input dimension must match number of columns");

    if beta == T::zero() {
        y.fill(T::zero());
    }
    spmm_csr_dense(beta, &mut y, alpha, Op::NoOp(a), Op::NoOp(&x));
}
