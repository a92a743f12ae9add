use crate::constraints::{copy_essential_entries, zero_essential_entries, EssentialDofs};
use crate::operator::LinearOperator;
use crate::Real;
use nalgebra::{DVector, DVectorView, DVectorViewMut};
use std::marker::PhantomData;

/// Applies essential dof elimination to a square linear operator without assembling it.
///
/// The constrained operator acts like the eliminated matrix: it zeros rows and columns of
/// essential dofs and puts one on their diagonal. For an assembled matrix, this agrees with
/// [`eliminate_rows_and_columns_csr`](crate::constraints::eliminate_rows_and_columns_csr).
#[derive(Debug)]
pub struct ConstrainedOperator<'a, T: Real, A: ?Sized> {
    operator: &'a A,
    essential_dofs: &'a EssentialDofs,
    marker: PhantomData<T>,
}

impl<'a, T, A> ConstrainedOperator<'a, T, A>
where
    T: Real,
    A: ?Sized + LinearOperator<T>,
{
    /// # Panics
    ///
    /// Panics if the operator is not square or an essential dof is out of bounds.
    pub fn new(operator: &'a A, essential_dofs: &'a EssentialDofs) -> Self {
        let n = operator.nrows();
        assert_eq!(n, operator.ncols(), "Constrained operator must be square");
        if let Some(dof) = essential_dofs.iter().find(|&dof| dof >= n) {
            panic!("Essential dof {} out of bounds for operator of size {}", dof, n);
        }
        Self {
            operator,
            essential_dofs,
            marker: PhantomData,
        }
    }

    pub fn essential_dofs(&self) -> &EssentialDofs {
        self.essential_dofs
    }

    /// Moves the known essential values of the solution to the right-hand side.
    ///
    /// Given `x` holding the prescribed values at essential dofs, computes
    /// `b <- b - A x_E` and then sets `b[i] = x[i]` for every essential dof `i`, where `x_E` is
    /// `x` restricted to the essential dofs. Solving the constrained system with this
    /// right-hand side reproduces the prescribed values exactly.
    pub fn eliminate_rhs<'b, 'c>(&self, x: impl Into<DVectorView<'b, T>>, b: impl Into<DVectorViewMut<'c, T>>) {
        let x = x.into();
        let mut b = b.into();
        let n = self.operator.nrows();
        assert_eq!(x.len(), n, "Solution dimension must match operator");
        assert_eq!(b.len(), n, "Right-hand side dimension must match operator");

        let mut x_essential = DVector::zeros(n);
        copy_essential_entries(&mut x_essential, &x, self.essential_dofs);
        let a_x = self.operator.apply(DVectorView::from(&x_essential));
        b -= &a_x;
        copy_essential_entries(b, x, self.essential_dofs);
    }
}

impl<'a, T, A> LinearOperator<T> for ConstrainedOperator<'a, T, A>
where
    T: Real,
    A: ?Sized + LinearOperator<T>,
{
    fn nrows(&self) -> usize {
        self.operator.nrows()
    }

    fn ncols(&self) -> usize {
        self.operator.ncols()
    }

    fn apply_into(&self, x: DVectorView<T>, mut y: DVectorViewMut<T>) {
        assert_eq!(x.len(), self.ncols(), "Input dimension must match operator");
        let mut z = x.clone_owned();
        zero_essential_entries(&mut z, self.essential_dofs);
        self.operator
            .apply_into(DVectorView::from(&z), DVectorViewMut::from(&mut y));
        copy_essential_entries(y, x, self.essential_dofs);
    }
}
