//! Essential boundary conditions: boundary markers, essential dof sets and their elimination.
use crate::error::InvalidDataError;
use crate::Real;
use nalgebra::{DMatrix, DVectorView, DVectorViewMut};
use nalgebra_sparse::CsrMatrix;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A boolean selector over boundary attributes.
///
/// Entry `a` tells whether boundary attribute `a` is selected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundaryMarker {
    selected: Vec<bool>,
}

impl BoundaryMarker {
    pub fn new(selected: Vec<bool>) -> Self {
        Self { selected }
    }

    /// A marker selecting every one of `num_attributes` attributes.
    pub fn all(num_attributes: usize) -> Self {
        Self::new(vec![true; num_attributes])
    }

    /// A marker selecting none of `num_attributes` attributes.
    pub fn none(num_attributes: usize) -> Self {
        Self::new(vec![false; num_attributes])
    }

    /// A marker over `num_attributes` attributes selecting exactly the given ones.
    ///
    /// # Panics
    ///
    /// Panics if any attribute is out of bounds.
    pub fn from_attributes(num_attributes: usize, attributes: &[usize]) -> Self {
        let mut selected = vec![false; num_attributes];
        for &attribute in attributes {
            assert!(
                attribute < num_attributes,
                "Attribute {} out of bounds for marker of length {}",
                attribute,
                num_attributes
            );
            selected[attribute] = true;
        }
        Self { selected }
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    /// Whether the attribute is selected. Attributes beyond the marker's length are not.
    pub fn is_selected(&self, attribute: usize) -> bool {
        self.selected.get(attribute).copied().unwrap_or(false)
    }

    pub fn selected_attributes(&self) -> impl '_ + Iterator<Item = usize> {
        self.selected
            .iter()
            .enumerate()
            .filter_map(|(attribute, &selected)| selected.then_some(attribute))
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.selected
    }
}

impl From<Vec<bool>> for BoundaryMarker {
    fn from(selected: Vec<bool>) -> Self {
        Self::new(selected)
    }
}

/// A sorted set of global dof indices whose values are prescribed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "EssentialDofsData")]
pub struct EssentialDofs {
    dofs: Vec<usize>,
}

#[derive(Deserialize)]
struct EssentialDofsData {
    dofs: Vec<usize>,
}

impl TryFrom<EssentialDofsData> for EssentialDofs {
    type Error = InvalidDataError;

    fn try_from(data: EssentialDofsData) -> Result<Self, Self::Error> {
        if let Some(w) = data.dofs.windows(2).find(|w| w[0] >= w[1]) {
            return Err(InvalidDataError::new(
                "essential dofs",
                format!("dofs must be strictly increasing, found {} followed by {}", w[0], w[1]),
            ));
        }
        Ok(Self { dofs: data.dofs })
    }
}

impl EssentialDofs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collects dofs into a set for a vector of size `num_dofs`. Duplicates collapse.
    ///
    /// # Panics
    ///
    /// Panics if any index is not in `0 .. num_dofs`. Such an index can only come from a
    /// faulty dof map, which cannot be recovered from locally.
    pub fn from_dofs(dofs: impl IntoIterator<Item = usize>, num_dofs: usize) -> Self {
        let dofs: BTreeSet<_> = dofs.into_iter().collect();
        if let Some(&max) = dofs.iter().next_back() {
            assert!(
                max < num_dofs,
                "Invalid essential dof index {}: index must be smaller than the number of dofs ({})",
                max,
                num_dofs
            );
        }
        Self {
            dofs: dofs.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.dofs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dofs.is_empty()
    }

    pub fn contains(&self, dof: usize) -> bool {
        self.dofs.binary_search(&dof).is_ok()
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.dofs
    }

    pub fn iter(&self) -> impl '_ + Iterator<Item = usize> {
        self.dofs.iter().copied()
    }

    /// A boolean mask of length `num_dofs` with `true` for essential dofs.
    pub fn membership_mask(&self, num_dofs: usize) -> Vec<bool> {
        let mut mask = vec![false; num_dofs];
        for &dof in &self.dofs {
            mask[dof] = true;
        }
        mask
    }
}

/// Copies the entries of `source` at essential dofs into `target`.
///
/// Used both for identity-row elimination of residuals (`target` is the residual, `source` the
/// trial vector) and for writing prescribed values into a right-hand side.
pub fn copy_essential_entries<'a, 'b, T>(
    target: impl Into<DVectorViewMut<'a, T>>,
    source: impl Into<DVectorView<'b, T>>,
    dofs: &EssentialDofs,
) where
    T: Real,
{
    let mut target = target.into();
    let source = source.into();
    assert_eq!(target.len(), source.len());
    for dof in dofs.iter() {
        target[dof] = source[dof];
    }
}

/// Sets the entries of the vector at essential dofs to zero.
pub fn zero_essential_entries<'a, T>(vector: impl Into<DVectorViewMut<'a, T>>, dofs: &EssentialDofs)
where
    T: Real,
{
    let mut vector = vector.into();
    for dof in dofs.iter() {
        vector[dof] = T::zero();
    }
}

/// Zeros rows and columns of essential dofs and puts one on their diagonal.
///
/// Unlike a symmetric elimination that only visits the rows reachable from essential rows,
/// this visits every stored entry once, so it is also correct for matrices with a
/// non-symmetric sparsity pattern.
///
/// # Panics
///
/// Panics if the matrix is not square or if the diagonal entry of an essential dof is not
/// part of the sparsity pattern.
pub fn eliminate_rows_and_columns_csr<T>(matrix: &mut CsrMatrix<T>, dofs: &EssentialDofs)
where
    T: Real,
{
    assert_eq!(matrix.nrows(), matrix.ncols(), "Elimination requires a square matrix");
    if dofs.is_empty() {
        return;
    }
    let is_essential = dofs.membership_mask(matrix.nrows());

    for (row_index, mut row) in matrix.row_iter_mut().enumerate() {
        let (cols, values) = row.cols_and_values_mut();
        if is_essential[row_index] {
            let mut found_diagonal = false;
            for (&col, value) in cols.iter().zip(values.iter_mut()) {
                if col == row_index {
                    *value = T::one();
                    found_diagonal = true;
                } else {
                    *value = T::zero();
                }
            }
            assert!(
                found_diagonal,
                "Diagonal entry ({0}, {0}) of essential dof is missing from the sparsity pattern",
                row_index
            );
        } else {
            for (&col, value) in cols.iter().zip(values.iter_mut()) {
                if is_essential[col] {
                    *value = T::zero();
                }
            }
        }
    }
}

/// Zeros the rows of the matrix that belong to the given dofs.
pub fn zero_rows_csr<T>(matrix: &mut CsrMatrix<T>, rows: &EssentialDofs)
where
    T: Real,
{
    for row_index in rows.iter() {
        matrix.row_mut(row_index).values_mut().fill(T::zero());
    }
}

/// Zeros the columns of the matrix that belong to the given dofs.
pub fn zero_columns_csr<T>(matrix: &mut CsrMatrix<T>, columns: &EssentialDofs)
where
    T: Real,
{
    if columns.is_empty() {
        return;
    }
    let is_essential = columns.membership_mask(matrix.ncols());
    for mut row in matrix.row_iter_mut() {
        let (cols, values) = row.cols_and_values_mut();
        for (&col, value) in cols.iter().zip(values.iter_mut()) {
            if is_essential[col] {
                *value = T::zero();
            }
        }
    }
}

/// Dense counterpart of [`eliminate_rows_and_columns_csr`].
pub fn eliminate_rows_and_columns_dense<T>(matrix: &mut DMatrix<T>, dofs: &EssentialDofs)
where
    T: Real,
{
    assert_eq!(matrix.nrows(), matrix.ncols(), "Elimination requires a square matrix");
    for dof in dofs.iter() {
        matrix.column_mut(dof).fill(T::zero());
        matrix.row_mut(dof).fill(T::zero());
        matrix[(dof, dof)] = T::one();
    }
}
