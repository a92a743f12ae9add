//! Strategies for property-based testing with `proptest`.
use crate::constraints::{BoundaryMarker, EssentialDofs};
use crate::partition::BlockPartition;
use crate::space::procedural::line_p1_space;
use crate::space::ExplicitSpace;
use ::proptest::collection::vec;
use ::proptest::prelude::*;

/// Partitions with at most `max_blocks` blocks of size at most `max_block_size`.
///
/// Empty blocks are allowed, since fields with no dofs must be handled like any other field.
pub fn block_partition(max_blocks: usize, max_block_size: usize) -> impl Strategy<Value = BlockPartition> {
    vec(0..=max_block_size, 0..=max_blocks).prop_map(BlockPartition::from_block_sizes)
}

/// Markers over exactly `num_attributes` boundary attributes.
pub fn boundary_marker(num_attributes: usize) -> impl Strategy<Value = BoundaryMarker> {
    vec(any::<bool>(), num_attributes).prop_map(BoundaryMarker::new)
}

/// Essential dof sets for a vector with `num_dofs` entries.
pub fn essential_dofs(num_dofs: usize) -> impl Strategy<Value = EssentialDofs> {
    vec(any::<bool>(), num_dofs).prop_map(move |mask| {
        let dofs = mask
            .into_iter()
            .enumerate()
            .filter_map(|(dof, essential)| essential.then_some(dof));
        EssentialDofs::from_dofs(dofs, num_dofs)
    })
}

/// A number of dofs together with an essential dof set for it.
pub fn dofs_with_essential_set(max_dofs: usize) -> impl Strategy<Value = (usize, EssentialDofs)> {
    (0..=max_dofs).prop_flat_map(|num_dofs| (Just(num_dofs), essential_dofs(num_dofs)))
}

/// Piecewise linear spaces on the unit interval with between one and `max_cells` cells.
pub fn line_space(max_cells: usize) -> impl Strategy<Value = ExplicitSpace> {
    (1..=max_cells.max(1)).prop_map(line_p1_space)
}
