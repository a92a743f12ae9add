//! Assembly of nonlinear finite element operators.
//!
//! A nonlinear form is a sum of local contributions (integrators) over the elements and faces
//! of a mesh. Given a trial vector $u$, the forms in this crate assemble the global residual
//! $F(u)$, its linearization $\partial F / \partial u$ as a sparse matrix, and eliminate
//! essential (Dirichlet-type) boundary conditions from both.
//!
//! - [`form::NonlinearForm`] works with a single field.
//! - [`block_form::BlockNonlinearForm`] works with an ordered tuple of fields, keeps one set of
//!   essential dofs per field and stores its linearization as a grid of sparse blocks
//!   ([`block_operator::BlockOperator`]).
//!
//! Both implement the [`operator::Operator`] trait, so a nonlinear solver can drive either
//! without knowing how many or which contributions are present.
use nalgebra::RealField;

pub mod block_form;
pub mod block_operator;
pub mod cache;
pub mod constrained;
pub mod constraints;
pub mod contribution;
pub mod error;
pub mod form;
pub mod operator;
pub mod partition;
pub mod space;
pub mod sparse;

#[cfg(feature = "proptest-support")]
pub mod proptest;

mod assembly;

pub extern crate fenris_nested_vec as nested_vec;
pub extern crate nalgebra;
pub extern crate nalgebra_sparse;

/// Real scalar types supported by the assemblers.
///
/// Used as a trait alias for the traits needed by generic routines in this crate.
pub trait Real: RealField + Copy {}

impl<T: RealField + Copy> Real for T {}
