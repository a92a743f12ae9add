//! The operator contracts shared by the assemblers and their linearizations.
use crate::error::AssemblyError;
use crate::sparse::spmv_csr;
use crate::Real;
use nalgebra::{DMatrix, DVector, DVectorView, DVectorViewMut};
use nalgebra_sparse::CsrMatrix;

/// A linear map $y = A x$ that can be applied without knowing its storage.
pub trait LinearOperator<T: Real> {
    fn nrows(&self) -> usize;

    fn ncols(&self) -> usize;

    /// Computes `y = A x`, overwriting `y`.
    ///
    /// # Panics
    ///
    /// Panics if the dimensions of `x` or `y` do not match the operator.
    fn apply_into(&self, x: DVectorView<T>, y: DVectorViewMut<T>);

    fn apply(&self, x: DVectorView<T>) -> DVector<T> {
        let mut y = DVector::zeros(self.nrows());
        self.apply_into(x, DVectorViewMut::from(&mut y));
        y
    }
}

impl<T: Real> LinearOperator<T> for CsrMatrix<T> {
    fn nrows(&self) -> usize {
        CsrMatrix::nrows(self)
    }

    fn ncols(&self) -> usize {
        CsrMatrix::ncols(self)
    }

    fn apply_into(&self, x: DVectorView<T>, y: DVectorViewMut<T>) {
        spmv_csr(T::zero(), y, T::one(), self, x);
    }
}

impl<T: Real> LinearOperator<T> for DMatrix<T> {
    fn nrows(&self) -> usize {
        self.shape().0
    }

    fn ncols(&self) -> usize {
        self.shape().1
    }

    fn apply_into(&self, x: DVectorView<T>, mut y: DVectorViewMut<T>) {
        y.gemv(T::one(), self, &x, T::zero());
    }
}

/// A (generally nonlinear) operator $F: \mathbb{R}^n \to \mathbb{R}^m$ with an assembled
/// linearization.
///
/// A nonlinear solver only needs this contract, regardless of whether the operator is
/// assembled from one field or from several.
pub trait Operator<T: Real> {
    /// The linearization $\partial F / \partial x$ as returned by
    /// [`linearization`](Self::linearization).
    type Linearization: LinearOperator<T>;

    /// The dimensions `(m, n)` of the operator.
    fn size(&self) -> (usize, usize);

    /// Evaluates `y = F(x)`.
    ///
    /// On failure, `y` is left unchanged.
    fn apply_into(&mut self, x: DVectorView<T>, y: DVectorViewMut<T>) -> Result<(), AssemblyError>;

    fn apply(&mut self, x: DVectorView<T>) -> Result<DVector<T>, AssemblyError> {
        let mut y = DVector::zeros(self.size().0);
        self.apply_into(x, DVectorViewMut::from(&mut y))?;
        Ok(y)
    }

    /// Assembles the linearization of the operator at `x`.
    ///
    /// The returned reference stays valid until the operator is used mutably again, which is
    /// also when the linearization may be replaced.
    fn linearization(&mut self, x: DVectorView<T>) -> Result<&Self::Linearization, AssemblyError>;
}
