//! Procedurally generated field spaces on uniform 1D line meshes.
//!
//! Both spaces are defined on the mesh with vertices `0, 1, ..., num_cells` and cells
//! `[k, k + 1]`. The left end point carries boundary attribute `0`, the right end point
//! boundary attribute `1`. Interior faces are the interior vertices, ordered from left to right,
//! and boundary faces are the end points (left first).
use crate::space::ExplicitSpace;

pub const LEFT_ATTRIBUTE: usize = 0;
pub const RIGHT_ATTRIBUTE: usize = 1;

/// Continuous piecewise linear space with one dof per vertex.
pub fn line_p1_space(num_cells: usize) -> ExplicitSpace {
    if num_cells == 0 {
        return ExplicitSpace::new(0, 2);
    }

    let mut space = ExplicitSpace::new(num_cells + 1, 2);
    for k in 0..num_cells {
        space.push_element(&[k, k + 1]);
    }
    space.push_boundary_element(&[0], LEFT_ATTRIBUTE);
    space.push_boundary_element(&[num_cells], RIGHT_ATTRIBUTE);
    for k in 1..num_cells {
        space.push_interior_face(&[k - 1, k, k, k + 1]);
    }
    space.push_boundary_face(&[0, 1], LEFT_ATTRIBUTE);
    space.push_boundary_face(&[num_cells - 1, num_cells], RIGHT_ATTRIBUTE);
    space
}

/// Discontinuous piecewise constant space with one dof per cell.
///
/// Boundary elements (the end points) carry no dofs, so no essential conditions can be
/// imposed on this space through boundary markers.
pub fn line_p0_space(num_cells: usize) -> ExplicitSpace {
    if num_cells == 0 {
        return ExplicitSpace::new(0, 2);
    }

    let mut space = ExplicitSpace::new(num_cells, 2);
    for k in 0..num_cells {
        space.push_element(&[k]);
    }
    space.push_boundary_element(&[], LEFT_ATTRIBUTE);
    space.push_boundary_element(&[], RIGHT_ATTRIBUTE);
    for k in 1..num_cells {
        space.push_interior_face(&[k - 1, k]);
    }
    space.push_boundary_face(&[0], LEFT_ATTRIBUTE);
    space.push_boundary_face(&[num_cells - 1], RIGHT_ATTRIBUTE);
    space
}
