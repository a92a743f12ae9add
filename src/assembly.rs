//! Bookkeeping shared by the single-field and block assemblers.
use crate::constraints::BoundaryMarker;
use crate::contribution::LocalContext;
use crate::error::{AssemblyError, SizeOf};
use crate::space::{FieldSpace, IntegrationDomain};

/// A contribution registered with an assembler, tagged with the entities it applies to.
pub(crate) struct Registered<C: ?Sized> {
    pub domain: IntegrationDomain,
    /// Restricts the contribution to entities with a selected boundary attribute.
    pub marker: Option<BoundaryMarker>,
    pub contribution: Box<C>,
}

impl<C: ?Sized> Registered<C> {
    pub fn new(domain: IntegrationDomain, contribution: Box<C>) -> Self {
        Self {
            domain,
            marker: None,
            contribution,
        }
    }

    pub fn with_marker(mut self, marker: BoundaryMarker) -> Self {
        self.marker = Some(marker);
        self
    }

    /// Returns the context of the given entity if this contribution applies to it.
    pub fn context_if_selected(&self, space: &dyn FieldSpace, index: usize) -> Option<LocalContext> {
        let attribute = space.entity_attribute(self.domain, index);
        let selected = match &self.marker {
            Some(marker) => attribute
                .map(|attribute| marker.is_selected(attribute))
                .unwrap_or(false),
            None => true,
        };
        selected.then_some(LocalContext {
            domain: self.domain,
            index,
            attribute,
        })
    }

    /// Contexts of all entities of the space this contribution applies to, in index order.
    pub fn selected_entities<'a>(&'a self, space: &'a dyn FieldSpace) -> impl 'a + Iterator<Item = LocalContext> {
        (0..space.num_entities(self.domain)).filter_map(move |index| self.context_if_selected(space, index))
    }
}

pub(crate) fn check_marker(space: &dyn FieldSpace, marker: &BoundaryMarker) -> Result<(), AssemblyError> {
    AssemblyError::check_size(SizeOf::Marker, space.num_boundary_attributes(), marker.len())
}

/// Resizes `output` to the dof count of the entity and fills it with the entity's dofs.
pub(crate) fn populate_entity_dofs(
    space: &dyn FieldSpace,
    domain: IntegrationDomain,
    index: usize,
    output: &mut Vec<usize>,
) {
    output.resize(space.entity_dof_count(domain, index), usize::MAX);
    space.populate_entity_dofs(domain, index, output);
}

pub(crate) fn contribution_error(context: &LocalContext, source: eyre::Report) -> AssemblyError {
    AssemblyError::Contribution {
        domain: context.domain,
        entity: context.index,
        source,
    }
}
