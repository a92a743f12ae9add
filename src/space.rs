//! The field space contract consumed by the assemblers.
use crate::constraints::BoundaryMarker;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

mod explicit;
pub mod procedural;

pub use explicit::*;

/// The kind of mesh entity that a local contribution is evaluated on.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IntegrationDomain {
    /// Mesh elements (cells).
    Domain,
    /// Boundary elements, i.e. the boundary entities themselves with their own dofs.
    Boundary,
    /// Faces shared by two elements. The dofs of an interior face are the dofs of both
    /// adjacent elements.
    InteriorFace,
    /// Faces on the boundary. The dofs of a boundary face are the dofs of its adjacent element.
    BoundaryFace,
}

impl IntegrationDomain {
    pub const ALL: [IntegrationDomain; 4] = [
        IntegrationDomain::Domain,
        IntegrationDomain::Boundary,
        IntegrationDomain::InteriorFace,
        IntegrationDomain::BoundaryFace,
    ];

    /// Whether entities of this kind carry a boundary attribute.
    pub fn has_boundary_attribute(&self) -> bool {
        matches!(self, IntegrationDomain::Boundary | IntegrationDomain::BoundaryFace)
    }
}

impl fmt::Display for IntegrationDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntegrationDomain::Domain => write!(f, "domain"),
            IntegrationDomain::Boundary => write!(f, "boundary"),
            IntegrationDomain::InteriorFace => write!(f, "interior face"),
            IntegrationDomain::BoundaryFace => write!(f, "boundary face"),
        }
    }
}

/// A discrete space of degrees of freedom (dofs) over a mesh.
///
/// The space owns the numbering of dofs and knows, for every mesh entity, which global dofs
/// the entity touches. Basis functions and geometry are *not* part of this contract: a local
/// contribution receives the entity's index in its [`LocalContext`](crate::contribution::LocalContext)
/// and is expected to look up whatever geometric data it needs itself.
///
/// Boundary attributes are zero-based indices in `0 .. num_boundary_attributes()`.
///
/// A space is shared read-only between assemblers, so implementations must not change their
/// numbering through shared references.
pub trait FieldSpace: fmt::Debug {
    /// The size of the global unknown vector.
    fn num_dofs(&self) -> usize;

    /// The size of the *true* (reduced) unknown vector.
    ///
    /// This differs from [`num_dofs`](Self::num_dofs) only for spaces with shared or
    /// conforming-constrained dofs, which are handled outside of this crate.
    fn num_true_dofs(&self) -> usize {
        self.num_dofs()
    }

    fn num_boundary_attributes(&self) -> usize;

    fn num_entities(&self, domain: IntegrationDomain) -> usize;

    fn entity_dof_count(&self, domain: IntegrationDomain, index: usize) -> usize;

    /// Writes the global dof indices of the given entity into `output`.
    ///
    /// `output` has exactly `entity_dof_count(domain, index)` entries. The same dof may appear
    /// more than once, in which case local contributions for that dof are summed.
    fn populate_entity_dofs(&self, domain: IntegrationDomain, index: usize, output: &mut [usize]);

    /// The boundary attribute of the given entity, for boundary elements and boundary faces.
    fn entity_attribute(&self, domain: IntegrationDomain, index: usize) -> Option<usize>;

    /// Resolves a boundary attribute marker into a sorted, duplicate-free list of dofs.
    ///
    /// The default implementation collects the dofs of all boundary elements whose attribute
    /// is selected by the marker.
    fn boundary_dofs(&self, marker: &BoundaryMarker) -> Vec<usize> {
        let mut dofs = BTreeSet::new();
        let mut entity_dofs = Vec::new();
        for index in 0..self.num_entities(IntegrationDomain::Boundary) {
            let selected = self
                .entity_attribute(IntegrationDomain::Boundary, index)
                .map(|attribute| marker.is_selected(attribute))
                .unwrap_or(false);
            if selected {
                entity_dofs.resize(self.entity_dof_count(IntegrationDomain::Boundary, index), usize::MAX);
                self.populate_entity_dofs(IntegrationDomain::Boundary, index, &mut entity_dofs);
                dofs.extend(entity_dofs.iter().copied());
            }
        }
        dofs.into_iter().collect()
    }
}
