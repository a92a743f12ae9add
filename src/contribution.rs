//! Local contributions (integrators) and their capabilities.
//!
//! A local contribution computes the residual of one mesh entity given the restriction of the
//! trial vector to the entity's dofs. Computing a local Jacobian or a local energy are optional
//! capabilities: a contribution advertises them by returning `Some(self)` from
//! [`LocalContribution::as_jacobian`] or [`LocalContribution::as_energy`]. The assemblers only
//! ask for a capability when the corresponding global operation is requested, so a residual-only
//! contribution can be registered and used for residual evaluation without further ado.
use crate::space::IntegrationDomain;
use crate::Real;
use nalgebra::{DMatrixViewMut, DVectorView, DVectorViewMut};

mod affine;
mod block;

pub use affine::*;
pub use block::*;

/// Identifies the mesh entity a local contribution is evaluated on.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct LocalContext {
    /// The kind of entity.
    pub domain: IntegrationDomain,
    /// The index of the entity among the entities of its kind in the field space.
    pub index: usize,
    /// The boundary attribute of boundary elements and boundary faces.
    pub attribute: Option<usize>,
}

pub trait LocalContribution<T: Real> {
    /// Computes the local residual of the entity and stores it in `output`.
    ///
    /// `u_local` holds the trial vector at the entity's dofs, in the order given by the
    /// field space. `output` has the same length and is zeroed before the call.
    fn assemble_local_residual_into(
        &self,
        context: &LocalContext,
        u_local: DVectorView<T>,
        output: DVectorViewMut<T>,
    ) -> eyre::Result<()>;

    fn as_jacobian(&self) -> Option<&dyn LocalJacobian<T>> {
        None
    }

    fn as_energy(&self) -> Option<&dyn LocalEnergy<T>> {
        None
    }
}

pub trait LocalJacobian<T: Real> {
    /// Computes the derivative of the local residual with respect to `u_local`.
    ///
    /// `output` is a zeroed square matrix with one row and column per local dof.
    fn assemble_local_jacobian_into(
        &self,
        context: &LocalContext,
        u_local: DVectorView<T>,
        output: DMatrixViewMut<T>,
    ) -> eyre::Result<()>;
}

pub trait LocalEnergy<T: Real> {
    fn compute_local_energy(&self, context: &LocalContext, u_local: DVectorView<T>) -> eyre::Result<T>;
}
