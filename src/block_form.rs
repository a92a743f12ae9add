//! Nonlinear forms over a tuple of fields.
use crate::assembly::{check_marker, contribution_error, populate_entity_dofs, Registered};
use crate::block_operator::BlockOperator;
use crate::cache::LinearizationCache;
use crate::constraints::{
    copy_essential_entries, eliminate_rows_and_columns_csr, zero_essential_entries, zero_columns_csr, zero_rows_csr,
    BoundaryMarker, EssentialDofs,
};
use crate::contribution::{BlockLocalContribution, LocalBlockMatrix, LocalBlockVector, LocalContext};
use crate::error::{AssemblyError, Capability, SizeOf};
use crate::operator::Operator;
use crate::partition::BlockPartition;
use crate::space::{FieldSpace, IntegrationDomain};
use crate::sparse::{
    add_local_matrix_to_csr, gather_global_to_local, scatter_local_to_global, zeroed_csr_from_pattern,
    PatternBuilder,
};
use crate::Real;
use itertools::iproduct;
use log::{debug, trace, warn};
use nalgebra::{DVector, DVectorView, DVectorViewMut};
use nalgebra_sparse::pattern::SparsityPattern;
use std::fmt;
use std::sync::Arc;

#[derive(Debug)]
struct BlockFormWorkspace<T: Real> {
    // Dofs of the current entity, per field
    entity_dofs: Vec<Vec<usize>>,
    u_local: LocalBlockVector<T>,
    local_residual: LocalBlockVector<T>,
    local_jacobian: LocalBlockMatrix<T>,
    residual: DVector<T>,
}

impl<T: Real> Default for BlockFormWorkspace<T> {
    fn default() -> Self {
        Self {
            entity_dofs: Vec::new(),
            u_local: LocalBlockVector::default(),
            local_residual: LocalBlockVector::default(),
            local_jacobian: LocalBlockMatrix::default(),
            residual: DVector::zeros(0),
        }
    }
}

impl<T: Real> BlockFormWorkspace<T> {
    /// Loads the per-field dofs of the entity and gathers the block vector `u` at them.
    fn gather_entity(
        &mut self,
        spaces: &[Arc<dyn FieldSpace>],
        partition: &BlockPartition,
        context: &LocalContext,
        u: &DVectorView<T>,
    ) {
        self.entity_dofs.resize_with(spaces.len(), Vec::new);
        for (space, dofs) in spaces.iter().zip(&mut self.entity_dofs) {
            populate_entity_dofs(&**space, context.domain, context.index, dofs);
        }
        self.u_local
            .resize_and_zero(self.entity_dofs.iter().map(Vec::len));
        for (field, dofs) in self.entity_dofs.iter().enumerate() {
            let u_field = u.rows(partition.block_offset(field), partition.block_size(field));
            gather_global_to_local(u_field, self.u_local.block_mut(field), dofs);
        }
    }
}

/// A nonlinear form over an ordered tuple of fields, each with its own space.
///
/// The unknown is a block vector partitioned by field according to [`partition`](Self::partition).
/// Contributions see all fields of an entity at once. Each field has its own set of essential
/// dofs, given in the field's local numbering. Residuals are eliminated with identity rows per
/// field, and the linearization is a [`BlockOperator`] whose blocks exist only for field pairs
/// that some contribution couples.
///
/// All spaces discretize the same mesh: the entity counts of every space must agree, and
/// entities with the same index are the same mesh entity. Boundary attributes are taken from the
/// first space.
pub struct BlockNonlinearForm<T: Real> {
    spaces: Vec<Arc<dyn FieldSpace>>,
    partition: BlockPartition,
    true_partition: BlockPartition,
    contributions: Vec<Registered<dyn BlockLocalContribution<T>>>,
    essential_dofs: Vec<EssentialDofs>,
    jacobian: LinearizationCache<BlockOperator<T>>,
    // Row-major grid of block patterns, present for blocks that are materialized
    patterns: Option<Vec<Option<SparsityPattern>>>,
    workspace: BlockFormWorkspace<T>,
}

impl<T: Real> fmt::Debug for BlockNonlinearForm<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockNonlinearForm")
            .field("spaces", &self.spaces)
            .field("partition", &self.partition)
            .field("num_contributions", &self.contributions.len())
            .field("essential_dofs", &self.essential_dofs)
            .field("jacobian", &self.jacobian)
            .finish()
    }
}

/// The space that provides entity counts and boundary attributes.
///
/// Returns `None` for a form without fields, which has no entities to visit.
fn reference_space(spaces: &[Arc<dyn FieldSpace>]) -> Option<&dyn FieldSpace> {
    spaces.first().map(|space| &**space)
}

fn check_compatible_spaces(spaces: &[Arc<dyn FieldSpace>]) -> Result<(), AssemblyError> {
    if let Some((first, rest)) = spaces.split_first() {
        for space in rest {
            for domain in IntegrationDomain::ALL {
                AssemblyError::check_size(
                    SizeOf::MeshEntities(domain),
                    first.num_entities(domain),
                    space.num_entities(domain),
                )?;
            }
        }
    }
    Ok(())
}

impl<T: Real> BlockNonlinearForm<T> {
    /// Creates a form over the given fields, without contributions or essential dofs.
    ///
    /// Fails with [`AssemblyError::DimensionMismatch`] if the spaces do not agree on the number
    /// of mesh entities.
    pub fn new(spaces: Vec<Arc<dyn FieldSpace>>) -> Result<Self, AssemblyError> {
        let mut form = Self {
            spaces: Vec::new(),
            partition: BlockPartition::from_offsets(vec![0]),
            true_partition: BlockPartition::from_offsets(vec![0]),
            contributions: Vec::new(),
            essential_dofs: Vec::new(),
            jacobian: LinearizationCache::new(),
            patterns: None,
            workspace: BlockFormWorkspace::default(),
        };
        form.set_spaces(spaces)?;
        Ok(form)
    }

    /// Replaces the field spaces.
    ///
    /// The partitions are recomputed and the essential dofs of every field are cleared.
    /// Registered contributions are kept. On failure the form is left unchanged.
    pub fn set_spaces(&mut self, spaces: Vec<Arc<dyn FieldSpace>>) -> Result<(), AssemblyError> {
        check_compatible_spaces(&spaces)?;
        self.partition = BlockPartition::from_block_sizes(spaces.iter().map(|space| space.num_dofs()));
        self.true_partition = BlockPartition::from_block_sizes(spaces.iter().map(|space| space.num_true_dofs()));
        self.essential_dofs = vec![EssentialDofs::new(); spaces.len()];
        self.spaces = spaces;
        self.invalidate_structure();
        debug!(
            "Block form fields have sizes {:?}",
            self.partition.block_sizes().collect::<Vec<_>>()
        );
        Ok(())
    }

    pub fn spaces(&self) -> &[Arc<dyn FieldSpace>] {
        &self.spaces
    }

    pub fn num_fields(&self) -> usize {
        self.spaces.len()
    }

    /// The partition of the full block vector by field.
    pub fn partition(&self) -> &BlockPartition {
        &self.partition
    }

    /// The partition of the true (reduced) block vector by field.
    pub fn true_partition(&self) -> &BlockPartition {
        &self.true_partition
    }

    pub fn num_contributions(&self) -> usize {
        self.contributions.len()
    }

    /// The essential dofs of the given field, in the field's local numbering.
    pub fn essential_dofs(&self, field: usize) -> &EssentialDofs {
        &self.essential_dofs[field]
    }

    /// The most recent linearization, unless it has been invalidated since.
    pub fn jacobian(&self) -> Option<&BlockOperator<T>> {
        self.jacobian.get()
    }

    pub fn add_domain_contribution(&mut self, contribution: impl BlockLocalContribution<T> + 'static) {
        self.register(IntegrationDomain::Domain, None, Box::new(contribution));
    }

    pub fn add_boundary_contribution(&mut self, contribution: impl BlockLocalContribution<T> + 'static) {
        self.register(IntegrationDomain::Boundary, None, Box::new(contribution));
    }

    pub fn add_interior_face_contribution(&mut self, contribution: impl BlockLocalContribution<T> + 'static) {
        self.register(IntegrationDomain::InteriorFace, None, Box::new(contribution));
    }

    /// Adds a contribution evaluated on the boundary faces whose attribute is selected by
    /// `marker`. The marker is validated against the boundary attributes of the first field.
    pub fn add_boundary_face_contribution(
        &mut self,
        contribution: impl BlockLocalContribution<T> + 'static,
        marker: &BoundaryMarker,
    ) -> Result<(), AssemblyError> {
        let num_attributes = self
            .spaces
            .first()
            .map(|space| space.num_boundary_attributes())
            .unwrap_or(0);
        AssemblyError::check_size(SizeOf::Marker, num_attributes, marker.len())?;
        self.register(IntegrationDomain::BoundaryFace, Some(marker.clone()), Box::new(contribution));
        Ok(())
    }

    fn register(
        &mut self,
        domain: IntegrationDomain,
        marker: Option<BoundaryMarker>,
        contribution: Box<dyn BlockLocalContribution<T>>,
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
        self.patterns = None;
    }

    fn check_field_list(&self, len: usize) -> Result<(), AssemblyError> {
        AssemblyError::check_size(SizeOf::FieldList, self.num_fields(), len)
    }

    fn check_field_vector(&self, field: usize, len: usize) -> Result<(), AssemblyError> {
        AssemblyError::check_size(SizeOf::Rhs, self.spaces[field].num_dofs(), len)
    }

    /// Resolves one marker per field into the field's essential dofs. Nothing is stored.
    fn resolve_markers(&self, markers: &[BoundaryMarker]) -> Result<Vec<EssentialDofs>, AssemblyError> {
        self.check_field_list(markers.len())?;
        for (space, marker) in self.spaces.iter().zip(markers) {
            check_marker(&**space, marker)?;
        }
        let resolved = self
            .spaces
            .iter()
            .zip(markers)
            .enumerate()
            .map(|(field, (space, marker))| {
                let dofs = space.boundary_dofs(marker);
                if dofs.is_empty() && marker.selected_attributes().next().is_some() {
                    warn!(
                        "Essential boundary marker {:?} of field {} does not select any dofs",
                        marker.as_slice(),
                        field
                    );
                }
                EssentialDofs::from_dofs(dofs, space.num_dofs())
            })
            .collect();
        Ok(resolved)
    }

    /// Makes the dofs of the boundary attributes selected by `markers[i]` essential for field
    /// `i`, replacing any previous essential dofs.
    ///
    /// For every field with `rhs[i]` present, the right-hand side is zeroed at the field's
    /// essential dofs, so that it can serve as the residual target of a Newton correction whose
    /// essential entries are fixed.
    pub fn set_essential_bc(
        &mut self,
        markers: &[BoundaryMarker],
        rhs: &mut [Option<DVectorViewMut<T>>],
    ) -> Result<(), AssemblyError> {
        self.check_field_list(rhs.len())?;
        for (field, field_rhs) in rhs.iter().enumerate() {
            if let Some(field_rhs) = field_rhs {
                self.check_field_vector(field, field_rhs.len())?;
            }
        }
        let resolved = self.resolve_markers(markers)?;
        for (field_rhs, dofs) in rhs.iter_mut().zip(&resolved) {
            if let Some(field_rhs) = field_rhs {
                zero_essential_entries(field_rhs, dofs);
            }
        }
        self.essential_dofs = resolved;
        self.invalidate_structure();
        Ok(())
    }

    /// Like [`set_essential_bc`](Self::set_essential_bc), but writes the prescribed values of
    /// each field into its right-hand side: `rhs[i][k] = prescribed[i][k]` for every essential
    /// dof `k` of field `i`.
    pub fn set_essential_bc_with_rhs(
        &mut self,
        markers: &[BoundaryMarker],
        rhs: &mut [DVectorViewMut<T>],
        prescribed: &[DVectorView<T>],
    ) -> Result<(), AssemblyError> {
        self.check_field_list(rhs.len())?;
        self.check_field_list(prescribed.len())?;
        for (field, (field_rhs, field_prescribed)) in rhs.iter().zip(prescribed).enumerate() {
            self.check_field_vector(field, field_rhs.len())?;
            self.check_field_vector(field, field_prescribed.len())?;
        }
        let resolved = self.resolve_markers(markers)?;
        for ((field_rhs, field_prescribed), dofs) in rhs.iter_mut().zip(prescribed).zip(&resolved) {
            copy_essential_entries(field_rhs, field_prescribed, dofs);
        }
        self.essential_dofs = resolved;
        self.invalidate_structure();
        Ok(())
    }

    /// Replaces the essential dofs of every field with the given lists, in field-local
    /// numbering. Duplicates collapse.
    ///
    /// # Panics
    ///
    /// Panics if a dof is out of bounds for its field.
    pub fn set_essential_dofs(&mut self, per_field_dofs: &[Vec<usize>]) -> Result<(), AssemblyError> {
        self.check_field_list(per_field_dofs.len())?;
        self.essential_dofs = self
            .spaces
            .iter()
            .zip(per_field_dofs)
            .map(|(space, dofs)| EssentialDofs::from_dofs(dofs.iter().copied(), space.num_dofs()))
            .collect();
        self.invalidate_structure();
        Ok(())
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

    /// Computes the total energy over all contributions.
    ///
    /// Fails with [`AssemblyError::UnsupportedOperation`] if any contribution has no energy.
    pub fn energy(&mut self, u: DVectorView<T>) -> Result<T, AssemblyError> {
        AssemblyError::check_size(SizeOf::Input, self.partition.total_size(), u.len())?;
        self.check_capability(Capability::Energy)?;

        let mut energy = T::zero();
        let reference_space = match reference_space(&self.spaces) {
            Some(space) => space,
            None => return Ok(energy),
        };
        let ws = &mut self.workspace;
        for registered in &self.contributions {
            if let Some(local_energy) = registered.contribution.as_energy() {
                for context in registered.selected_entities(reference_space) {
                    ws.gather_entity(&self.spaces, &self.partition, &context, &u);
                    energy += local_energy
                        .compute_local_energy(&context, &ws.u_local)
                        .map_err(|err| contribution_error(&context, err))?;
                }
            }
        }
        Ok(energy)
    }

    fn assemble_residual_into(&mut self, u: DVectorView<T>, mut output: DVectorViewMut<T>) -> Result<(), AssemblyError> {
        let n = self.partition.total_size();
        AssemblyError::check_size(SizeOf::Input, n, u.len())?;
        AssemblyError::check_size(SizeOf::Output, n, output.len())?;
        self.jacobian.invalidate();

        let ws = &mut self.workspace;
        ws.residual.resize_vertically_mut(n, T::zero());
        ws.residual.fill(T::zero());

        if let Some(reference_space) = reference_space(&self.spaces) {
            for registered in &self.contributions {
                for context in registered.selected_entities(reference_space) {
                    ws.gather_entity(&self.spaces, &self.partition, &context, &u);
                    ws.local_residual
                        .resize_and_zero(ws.u_local.partition().block_sizes());

                    registered
                        .contribution
                        .assemble_local_residual_into(&context, &ws.u_local, &mut ws.local_residual)
                        .map_err(|err| contribution_error(&context, err))?;

                    for (field, dofs) in ws.entity_dofs.iter().enumerate() {
                        let residual_field = ws.residual.rows_mut(
                            self.partition.block_offset(field),
                            self.partition.block_size(field),
                        );
                        scatter_local_to_global(ws.local_residual.block(field), residual_field, dofs);
                    }
                }
                trace!("Assembled block residual of {} contribution", registered.domain);
            }
        }

        for (field, dofs) in self.essential_dofs.iter().enumerate() {
            let range = self.partition.block_range(field);
            let u_field = u.rows(range.start, range.len());
            let residual_field = ws.residual.rows_mut(range.start, range.len());
            copy_essential_entries(residual_field, u_field, dofs);
        }
        output.copy_from(&ws.residual);
        Ok(())
    }

    /// Determines which field pairs have a block in the linearization.
    ///
    /// A pair is present if some contribution couples it. Diagonal blocks of fields with
    /// essential dofs are always present, since they receive the unit diagonal.
    fn coupled_blocks(&self) -> Vec<bool> {
        let n = self.num_fields();
        let mut coupled = vec![false; n * n];
        for registered in &self.contributions {
            if let Some(jacobian) = registered.contribution.as_jacobian() {
                for (i, j) in iproduct!(0..n, 0..n) {
                    coupled[n * i + j] |= jacobian.couples(i, j);
                }
            }
        }
        for (i, dofs) in self.essential_dofs.iter().enumerate() {
            coupled[n * i + i] |= !dofs.is_empty();
        }
        coupled
    }

    fn build_patterns(&self) -> Vec<Option<SparsityPattern>> {
        let n = self.num_fields();
        let coupled = self.coupled_blocks();
        let mut builders: Vec<Option<PatternBuilder>> = iproduct!(0..n, 0..n)
            .map(|(i, j)| {
                coupled[n * i + j].then(|| PatternBuilder::new(self.partition.block_size(i), self.partition.block_size(j)))
            })
            .collect();

        if let Some(reference_space) = reference_space(&self.spaces) {
            let mut entity_dofs = vec![Vec::new(); n];
            for registered in &self.contributions {
                if let Some(jacobian) = registered.contribution.as_jacobian() {
                    for context in registered.selected_entities(reference_space) {
                        for (space, dofs) in self.spaces.iter().zip(&mut entity_dofs) {
                            populate_entity_dofs(&**space, context.domain, context.index, dofs);
                        }
                        for (i, j) in iproduct!(0..n, 0..n) {
                            if jacobian.couples(i, j) {
                                if let Some(builder) = &mut builders[n * i + j] {
                                    builder.add_block(&entity_dofs[i], &entity_dofs[j]);
                                }
                            }
                        }
                    }
                }
            }
        }

        for (i, dofs) in self.essential_dofs.iter().enumerate() {
            if let Some(builder) = &mut builders[n * i + i] {
                builder.add_diagonal(dofs.iter());
            }
        }

        builders
            .into_iter()
            .map(|builder| builder.map(PatternBuilder::build))
            .collect()
    }

    fn assemble_linearization(&mut self, u: DVectorView<T>) -> Result<&BlockOperator<T>, AssemblyError> {
        AssemblyError::check_size(SizeOf::Input, self.partition.total_size(), u.len())?;
        self.check_capability(Capability::Jacobian)?;

        let n = self.num_fields();
        let patterns = match self.patterns.take() {
            Some(patterns) => patterns,
            None => {
                let patterns = self.build_patterns();
                debug!(
                    "Built block sparsity patterns: {} of {} blocks present",
                    patterns.iter().filter(|pattern| pattern.is_some()).count(),
                    n * n
                );
                patterns
            }
        };
        let mut operator = BlockOperator::new(self.partition.clone());
        for (i, j) in iproduct!(0..n, 0..n) {
            let block = patterns[n * i + j].as_ref().map(zeroed_csr_from_pattern::<T>);
            operator.set_block(i, j, block);
        }
        self.patterns = Some(patterns);

        let ws = &mut self.workspace;
        if let Some(reference_space) = reference_space(&self.spaces) {
            for registered in &self.contributions {
                if let Some(local_jacobian) = registered.contribution.as_jacobian() {
                    for context in registered.selected_entities(reference_space) {
                        ws.gather_entity(&self.spaces, &self.partition, &context, &u);
                        ws.local_jacobian
                            .reset(ws.u_local.partition(), |i, j| local_jacobian.couples(i, j));

                        local_jacobian
                            .assemble_local_jacobian_into(&context, &ws.u_local, &mut ws.local_jacobian)
                            .map_err(|err| contribution_error(&context, err))?;

                        for (i, j) in iproduct!(0..n, 0..n) {
                            if let (Some(local_block), Some(global_block)) =
                                (ws.local_jacobian.block(i, j), operator.block_mut(i, j))
                            {
                                add_local_matrix_to_csr(
                                    global_block,
                                    &ws.entity_dofs[i],
                                    &ws.entity_dofs[j],
                                    local_block,
                                );
                            }
                        }
                    }
                }
            }
        }

        for (i, j) in iproduct!(0..n, 0..n) {
            if let Some(block) = operator.block_mut(i, j) {
                if i == j {
                    eliminate_rows_and_columns_csr(block, &self.essential_dofs[i]);
                } else {
                    zero_rows_csr(block, &self.essential_dofs[i]);
                    zero_columns_csr(block, &self.essential_dofs[j]);
                }
            }
        }

        debug!(
            "Assembled block Jacobian from {} contributions over {} fields",
            self.contributions.len(),
            n
        );
        Ok(self.jacobian.replace(operator))
    }
}

impl<T: Real> Operator<T> for BlockNonlinearForm<T> {
    type Linearization = BlockOperator<T>;

    fn size(&self) -> (usize, usize) {
        let n = self.partition.total_size();
        (n, n)
    }

    fn apply_into(&mut self, x: DVectorView<T>, y: DVectorViewMut<T>) -> Result<(), AssemblyError> {
        self.assemble_residual_into(x, y)
    }

    fn linearization(&mut self, x: DVectorView<T>) -> Result<&BlockOperator<T>, AssemblyError> {
        self.assemble_linearization(x)
    }
}
