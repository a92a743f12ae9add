//! Nonlinear forms over a single field.
use crate::assembly::{check_marker, contribution_error, populate_entity_dofs, Registered};
use crate::cache::LinearizationCache;
use crate::constraints::{copy_essential_entries, eliminate_rows_and_columns_csr, BoundaryMarker, EssentialDofs};
use crate::contribution::LocalContribution;
use crate::error::{AssemblyError, Capability, SizeOf};
use crate::operator::Operator;
use crate::space::{FieldSpace, IntegrationDomain};
use crate::sparse::{
    add_local_matrix_to_csr, gather_global_to_local, scatter_local_to_global, zeroed_csr_from_pattern,
    PatternBuilder,
};
use crate::Real;
use log::{debug, trace, warn};
use nalgebra::{DMatrix, DMatrixViewMut, DVector, DVectorView, DVectorViewMut};
use nalgebra_sparse::pattern::SparsityPattern;
use nalgebra_sparse::CsrMatrix;
use std::fmt;
use std::sync::Arc;

/// Buffers reused between evaluations to avoid allocating per entity.
#[derive(Debug)]
struct NonlinearFormWorkspace<T: Real> {
    entity_dofs: Vec<usize>,
    u_local: DVector<T>,
    local_residual: DVector<T>,
    local_jacobian: DMatrix<T>,
    residual: DVector<T>,
}

impl<T: Real> Default for NonlinearFormWorkspace<T> {
    fn default() -> Self {
        Self {
            entity_dofs: Vec::new(),
            u_local: DVector::zeros(0),
            local_residual: DVector::zeros(0),
            local_jacobian: DMatrix::zeros(0, 0),
            residual: DVector::zeros(0),
        }
    }
}

impl<T: Real> NonlinearFormWorkspace<T> {
    /// Loads the dofs of the entity and gathers the trial vector at them into `u_local`.
    fn gather_entity(&mut self, space: &dyn FieldSpace, domain: IntegrationDomain, index: usize, u: &DVectorView<T>) {
        populate_entity_dofs(space, domain, index, &mut self.entity_dofs);
        self.u_local
            .resize_vertically_mut(self.entity_dofs.len(), T::zero());
        gather_global_to_local(u, &mut self.u_local, &self.entity_dofs);
    }
}

/// A nonlinear form $F(u) = \sum_K r_K(u|_K)$ over a single field space.
///
/// The form owns its local contributions and a set of essential dofs. Residuals are
/// eliminated with identity rows, i.e. $F_i(u) = u_i$ for every essential dof $i$, and the
/// linearization accordingly has zero rows and columns with a unit diagonal at essential dofs.
///
/// The most recent linearization is cached and handed out by reference. Evaluating the
/// residual, changing the essential dofs or registering contributions invalidates it, while a
/// failed linearization leaves it as it was.
pub struct NonlinearForm<T: Real> {
    space: Arc<dyn FieldSpace>,
    contributions: Vec<Registered<dyn LocalContribution<T>>>,
    essential_dofs: EssentialDofs,
    jacobian: LinearizationCache<CsrMatrix<T>>,
    pattern: Option<SparsityPattern>,
    workspace: NonlinearFormWorkspace<T>,
}

impl<T: Real> fmt::Debug for NonlinearForm<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NonlinearForm")
            .field("space", &self.space)
            .field("num_contributions", &self.contributions.len())
            .field("essential_dofs", &self.essential_dofs)
            .field("jacobian", &self.jacobian)
            .finish()
    }
}

impl<T: Real> NonlinearForm<T> {
    pub fn new(space: Arc<dyn FieldSpace>) -> Self {
        Self {
            space,
            contributions: Vec::new(),
            essential_dofs: EssentialDofs::new(),
            jacobian: LinearizationCache::new(),
            pattern: None,
            workspace: NonlinearFormWorkspace::default(),
        }
    }

    pub fn space(&self) -> &Arc<dyn FieldSpace> {
        &self.space
    }

    pub fn num_dofs(&self) -> usize {
        self.space.num_dofs()
    }

    pub fn num_contributions(&self) -> usize {
        self.contributions.len()
    }

    pub fn essential_dofs(&self) -> &EssentialDofs {
        &self.essential_dofs
    }

    /// The most recent linearization, unless it has been invalidated since.
    pub fn jacobian(&self) -> Option<&CsrMatrix<T>> {
        self.jacobian.get()
    }

    pub fn add_domain_contribution(&mut self, contribution: impl LocalContribution<T> + 'static) {
        self.register(IntegrationDomain::Domain, None, Box::new(contribution));
    }

    pub fn add_boundary_contribution(&mut self, contribution: impl LocalContribution<T> + 'static) {
        self.register(IntegrationDomain::Boundary, None, Box::new(contribution));
    }

    pub fn add_interior_face_contribution(&mut self, contribution: impl LocalContribution<T> + 'static) {
        self.register(IntegrationDomain::InteriorFace, None, Box::new(contribution));
    }

    /// Adds a contribution evaluated on the boundary faces whose attribute is selected by
    /// `marker`.
    pub fn add_boundary_face_contribution(
        &mut self,
        contribution: impl LocalContribution<T> + 'static,
        marker: &BoundaryMarker,
    ) -> Result<(), AssemblyError> {
        check_marker(&*self.space, marker)?;
        self.register(IntegrationDomain::BoundaryFace, Some(marker.clone()), Box::new(contribution));
        Ok(())
    }

    fn register(
        &mut self,
        domain: IntegrationDomain,
        marker: Option<BoundaryMarker>,
        contribution: Box<dyn LocalContribution<T>>,
    ) {
        let mut registered = Registered::new(domain, contribution);
        if let Some(marker) = marker {
            registered = registered.with_marker(marker);
        }
        self.contributions.push(registered);
        self.invalidate_structure();
    }

    fn invalidate_structure(&mut self) {
        self.jacobian.invalidate();
        self.pattern = None;
    }

    /// Makes the dofs of the boundary attributes selected by `marker` essential, replacing
    /// any previous essential dofs.
    pub fn set_essential_bc(&mut self, marker: &BoundaryMarker) -> Result<(), AssemblyError> {
        check_marker(&*self.space, marker)?;
        let dofs = self.space.boundary_dofs(marker);
        if dofs.is_empty() && marker.selected_attributes().next().is_some() {
            warn!("Essential boundary marker {:?} does not select any dofs", marker.as_slice());
        }
        self.set_essential_dofs(dofs);
        Ok(())
    }

    /// Like [`set_essential_bc`](Self::set_essential_bc), and additionally writes the
    /// prescribed values into `rhs`: `rhs[i] = prescribed[i]` for every essential dof `i`.
    ///
    /// Passing the current state as `prescribed` takes the boundary values from the state,
    /// passing a vector of target values imposes those instead.
    pub fn set_essential_bc_with_rhs<'a, 'b>(
        &mut self,
        marker: &BoundaryMarker,
        rhs: impl Into<DVectorViewMut<'a, T>>,
        prescribed: impl Into<DVectorView<'b, T>>,
    ) -> Result<(), AssemblyError> {
        let rhs = rhs.into();
        let prescribed = prescribed.into();
        let n = self.num_dofs();
        AssemblyError::check_size(SizeOf::Rhs, n, rhs.len())?;
        AssemblyError::check_size(SizeOf::Rhs, n, prescribed.len())?;
        self.set_essential_bc(marker)?;
        copy_essential_entries(rhs, prescribed, &self.essential_dofs);
        Ok(())
    }

    /// Replaces the essential dofs with the given list. Duplicates collapse.
    ///
    /// # Panics
    ///
    /// Panics if a dof is out of bounds.
    pub fn set_essential_dofs(&mut self, dofs: impl IntoIterator<Item = usize>) {
        self.essential_dofs = EssentialDofs::from_dofs(dofs, self.num_dofs());
        self.invalidate_structure();
    }

    fn check_capability(&self, capability: Capability) -> Result<(), AssemblyError> {
        for (k, registered) in self.contributions.iter().enumerate() {
            let supported = match capability {
                Capability::Jacobian => registered.contribution.as_jacobian().is_some(),
                Capability::Energy => registered.contribution.as_energy().is_some(),
            };
            if !supported {
                return Err(AssemblyError::UnsupportedOperation {
                    operation: capability,
                    domain: registered.domain,
                    contribution: k,
                });
            }
        }
        Ok(())
    }

    /// Computes the total energy $E(u) = \sum_K e_K(u|_K)$.
    ///
    /// Fails with [`AssemblyError::UnsupportedOperation`] if any contribution has no energy.
    pub fn energy(&mut self, u: DVectorView<T>) -> Result<T, AssemblyError> {
        AssemblyError::check_size(SizeOf::Input, self.num_dofs(), u.len())?;
        self.check_capability(Capability::Energy)?;

        let space = &*self.space;
        let ws = &mut self.workspace;
        let mut energy = T::zero();
        for registered in &self.contributions {
            if let Some(local_energy) = registered.contribution.as_energy() {
                for context in registered.selected_entities(space) {
                    ws.gather_entity(space, context.domain, context.index, &u);
                    energy += local_energy
                        .compute_local_energy(&context, DVectorView::from(&ws.u_local))
                        .map_err(|err| contribution_error(&context, err))?;
                }
            }
        }
        Ok(energy)
    }

    fn assemble_residual_into(&mut self, u: DVectorView<T>, mut output: DVectorViewMut<T>) -> Result<(), AssemblyError> {
        let n = self.num_dofs();
        AssemblyError::check_size(SizeOf::Input, n, u.len())?;
        AssemblyError::check_size(SizeOf::Output, n, output.len())?;
        self.jacobian.invalidate();

        let space = &*self.space;
        let ws = &mut self.workspace;
        ws.residual.resize_vertically_mut(n, T::zero());
        ws.residual.fill(T::zero());

        for registered in &self.contributions {
            for context in registered.selected_entities(space) {
                ws.gather_entity(space, context.domain, context.index, &u);
                ws.local_residual
                    .resize_vertically_mut(ws.entity_dofs.len(), T::zero());
                ws.local_residual.fill(T::zero());

                registered
                    .contribution
                    .assemble_local_residual_into(
                        &context,
                        DVectorView::from(&ws.u_local),
                        DVectorViewMut::from(&mut ws.local_residual),
                    )
                    .map_err(|err| contribution_error(&context, err))?;
                scatter_local_to_global(&ws.local_residual, &mut ws.residual, &ws.entity_dofs);
            }
            trace!("Assembled residual of {} contribution", registered.domain);
        }

        copy_essential_entries(&mut ws.residual, &u, &self.essential_dofs);
        output.copy_from(&ws.residual);
        Ok(())
    }

    fn build_pattern(&self) -> SparsityPattern {
        let space = &*self.space;
        let n = space.num_dofs();
        let mut builder = PatternBuilder::new(n, n);
        let mut entity_dofs = Vec::new();
        for registered in &self.contributions {
            for context in registered.selected_entities(space) {
                populate_entity_dofs(space, context.domain, context.index, &mut entity_dofs);
                builder.add_block(&entity_dofs, &entity_dofs);
            }
        }
        // Elimination puts ones on the diagonal of essential dofs, so these entries must exist
        // even when no contribution touches them
        builder.add_diagonal(self.essential_dofs.iter());
        builder.build()
    }

    fn assemble_linearization(&mut self, u: DVectorView<T>) -> Result<&CsrMatrix<T>, AssemblyError> {
        AssemblyError::check_size(SizeOf::Input, self.num_dofs(), u.len())?;
        self.check_capability(Capability::Jacobian)?;

        let pattern = match self.pattern.take() {
            Some(pattern) => pattern,
            None => {
                let pattern = self.build_pattern();
                debug!(
                    "Built Jacobian sparsity pattern with {} stored entries for {} dofs",
                    pattern.nnz(),
                    pattern.major_dim()
                );
                pattern
            }
        };
        let mut matrix = zeroed_csr_from_pattern(&pattern);
        self.pattern = Some(pattern);

        let space = &*self.space;
        let ws = &mut self.workspace;
        for registered in &self.contributions {
            if let Some(local_jacobian) = registered.contribution.as_jacobian() {
                for context in registered.selected_entities(space) {
                    ws.gather_entity(space, context.domain, context.index, &u);
                    let local_size = ws.entity_dofs.len();
                    ws.local_jacobian
                        .resize_mut(local_size, local_size, T::zero());
                    ws.local_jacobian.fill(T::zero());

                    local_jacobian
                        .assemble_local_jacobian_into(
                            &context,
                            DVectorView::from(&ws.u_local),
                            DMatrixViewMut::from(&mut ws.local_jacobian),
                        )
                        .map_err(|err| contribution_error(&context, err))?;
                    add_local_matrix_to_csr(&mut matrix, &ws.entity_dofs, &ws.entity_dofs, &ws.local_jacobian);
                }
            }
        }

        eliminate_rows_and_columns_csr(&mut matrix, &self.essential_dofs);
        debug!(
            "Assembled Jacobian from {} contributions with {} essential dofs",
            self.contributions.len(),
            self.essential_dofs.len()
        );
        Ok(self.jacobian.replace(matrix))
    }
}

impl<T: Real> Operator<T> for NonlinearForm<T> {
    type Linearization = CsrMatrix<T>;

    fn size(&self) -> (usize, usize) {
        let n = self.num_dofs();
        (n, n)
    }

    fn apply_into(&mut self, x: DVectorView<T>, y: DVectorViewMut<T>) -> Result<(), AssemblyError> {
        self.assemble_residual_into(x, y)
    }

    fn linearization(&mut self, x: DVectorView<T>) -> Result<&CsrMatrix<T>, AssemblyError> {
        self.assemble_linearization(x)
    }
}
