use crate::contribution::{LocalContext, LocalContribution, LocalEnergy, LocalJacobian};
use crate::Real;
use eyre::ensure;
use nalgebra::{DMatrix, DMatrixViewMut, DVector, DVectorView, DVectorViewMut, Scalar};

/// A contribution with the same affine residual $r(u) = A u - b$ on every entity.
///
/// The local Jacobian is the constant matrix $A$. The local energy is
/// $\frac{1}{2} u^T A u - b^T u$, which is consistent with the residual only when $A$ is
/// symmetric.
#[derive(Debug, Clone, PartialEq)]
pub struct AffineContribution<T: Scalar> {
    matrix: DMatrix<T>,
    vector: DVector<T>,
}

impl<T: Real> AffineContribution<T> {
    /// # Panics
    ///
    /// Panics if the matrix is not square or if the vector does not have a matching length.
    pub fn new(matrix: DMatrix<T>, vector: DVector<T>) -> Self {
        assert_eq!(matrix.nrows(), matrix.ncols(), "Matrix must be square");
        assert_eq!(matrix.nrows(), vector.len(), "Vector length must match matrix dimensions");
        Self { matrix, vector }
    }

    /// The linear contribution $r(u) = A u$.
    pub fn linear(matrix: DMatrix<T>) -> Self {
        let n = matrix.nrows();
        Self::new(matrix, DVector::zeros(n))
    }

    /// The contribution $r(u) = u$ on entities with `local_dofs` dofs.
    pub fn identity(local_dofs: usize) -> Self {
        Self::linear(DMatrix::identity(local_dofs, local_dofs))
    }

    pub fn matrix(&self) -> &DMatrix<T> {
        &self.matrix
    }

    pub fn vector(&self) -> &DVector<T> {
        &self.vector
    }

    fn check_local_size(&self, context: &LocalContext, local_size: usize) -> eyre::Result<()> {
        ensure!(
            local_size == self.vector.len(),
            "{} entity {} has {} local dofs, but the affine contribution expects {}",
            context.domain,
            context.index,
            local_size,
            self.vector.len()
        );
        Ok(())
    }
}

impl<T: Real> LocalContribution<T> for AffineContribution<T> {
    fn assemble_local_residual_into(
        &self,
        context: &LocalContext,
        u_local: DVectorView<T>,
        mut output: DVectorViewMut<T>,
    ) -> eyre::Result<()> {
        self.check_local_size(context, u_local.len())?;
        output.copy_from(&self.vector);
        output.gemv(T::one(), &self.matrix, &u_local, -T::one());
        Ok(())
    }

    fn as_jacobian(&self) -> Option<&dyn LocalJacobian<T>> {
        Some(self)
    }

    fn as_energy(&self) -> Option<&dyn LocalEnergy<T>> {
        Some(self)
    }
}

impl<T: Real> LocalJacobian<T> for AffineContribution<T> {
    fn assemble_local_jacobian_into(
        &self,
        context: &LocalContext,
        u_local: DVectorView<T>,
        mut output: DMatrixViewMut<T>,
    ) -> eyre::Result<()> {
        self.check_local_size(context, u_local.len())?;
        output.copy_from(&self.matrix);
        Ok(())
    }
}

impl<T: Real> LocalEnergy<T> for AffineContribution<T> {
    fn compute_local_energy(&self, context: &LocalContext, u_local: DVectorView<T>) -> eyre::Result<T> {
        self.check_local_size(context, u_local.len())?;
        let two = T::one() + T::one();
        let a_u = &self.matrix * &u_local;
        Ok(u_local.dot(&a_u) / two - self.vector.dot(&u_local))
    }
}
