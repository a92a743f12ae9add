use crate::error::InvalidDataError;
use crate::space::{FieldSpace, IntegrationDomain};
use fenris_nested_vec::NestedVec;
use serde::{Deserialize, Serialize};

/// A field space given by explicit dof lists for every mesh entity.
///
/// This is the simplest possible [`FieldSpace`]: it stores, for each kind of entity, the
/// global dofs of every entity plus the boundary attribute of boundary entities. It is useful
/// for tests, for small hand-built problems and as an adapter for dof maps computed elsewhere.
///
/// ```
/// use fenris_nonlinear::space::{ExplicitSpace, FieldSpace, IntegrationDomain};
///
/// // Two linear segments 0 - 1 - 2, boundary vertices with attributes 0 and 1
/// let mut space = ExplicitSpace::new(3, 2);
/// space.push_element(&[0, 1]);
/// space.push_element(&[1, 2]);
/// space.push_boundary_element(&[0], 0);
/// space.push_boundary_element(&[2], 1);
/// assert_eq!(space.num_entities(IntegrationDomain::Domain), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ExplicitSpaceData")]
pub struct ExplicitSpace {
    num_dofs: usize,
    num_boundary_attributes: usize,
    elements: NestedVec<usize>,
    boundary_elements: NestedVec<usize>,
    boundary_element_attributes: Vec<usize>,
    interior_faces: NestedVec<usize>,
    boundary_faces: NestedVec<usize>,
    boundary_face_attributes: Vec<usize>,
}

#[derive(Deserialize)]
struct ExplicitSpaceData {
    num_dofs: usize,
    num_boundary_attributes: usize,
    elements: NestedVec<usize>,
    boundary_elements: NestedVec<usize>,
    boundary_element_attributes: Vec<usize>,
    interior_faces: NestedVec<usize>,
    boundary_faces: NestedVec<usize>,
    boundary_face_attributes: Vec<usize>,
}

impl TryFrom<ExplicitSpaceData> for ExplicitSpace {
    type Error = InvalidDataError;

    fn try_from(data: ExplicitSpaceData) -> Result<Self, Self::Error> {
        let invalid = |reason: String| InvalidDataError::new("explicit space", reason);

        let dof_lists = [
            (IntegrationDomain::Domain, &data.elements),
            (IntegrationDomain::Boundary, &data.boundary_elements),
            (IntegrationDomain::InteriorFace, &data.interior_faces),
            (IntegrationDomain::BoundaryFace, &data.boundary_faces),
        ];
        for (domain, entities) in dof_lists {
            if let Some(dof) = entities
                .iter_array_elements()
                .find(|&&dof| dof >= data.num_dofs)
            {
                return Err(invalid(format!(
                    "{} dof {} out of bounds for space with {} dofs",
                    domain, dof, data.num_dofs
                )));
            }
        }

        let attribute_lists = [
            (IntegrationDomain::Boundary, &data.boundary_elements, &data.boundary_element_attributes),
            (IntegrationDomain::BoundaryFace, &data.boundary_faces, &data.boundary_face_attributes),
        ];
        for (domain, entities, attributes) in attribute_lists {
            if entities.len() != attributes.len() {
                return Err(invalid(format!(
                    "{} {} entities but {} attributes",
                    entities.len(),
                    domain,
                    attributes.len()
                )));
            }
            if let Some(attribute) = attributes
                .iter()
                .find(|&&attribute| attribute >= data.num_boundary_attributes)
            {
                return Err(invalid(format!(
                    "{} attribute {} out of bounds ({} attributes)",
                    domain, attribute, data.num_boundary_attributes
                )));
            }
        }

        Ok(Self {
            num_dofs: data.num_dofs,
            num_boundary_attributes: data.num_boundary_attributes,
            elements: data.elements,
            boundary_elements: data.boundary_elements,
            boundary_element_attributes: data.boundary_element_attributes,
            interior_faces: data.interior_faces,
            boundary_faces: data.boundary_faces,
            boundary_face_attributes: data.boundary_face_attributes,
        })
    }
}

impl ExplicitSpace {
    pub fn new(num_dofs: usize, num_boundary_attributes: usize) -> Self {
        Self {
            num_dofs,
            num_boundary_attributes,
            elements: NestedVec::new(),
            boundary_elements: NestedVec::new(),
            boundary_element_attributes: Vec::new(),
            interior_faces: NestedVec::new(),
            boundary_faces: NestedVec::new(),
            boundary_face_attributes: Vec::new(),
        }
    }

    /// Creates a space with the given elements and no boundary or face entities.
    pub fn from_elements(num_dofs: usize, elements: &[Vec<usize>]) -> Self {
        let mut space = Self::new(num_dofs, 0);
        for element in elements {
            space.push_element(element);
        }
        space
    }

    /// # Panics
    ///
    /// Panics if a dof is out of bounds.
    pub fn push_element(&mut self, dofs: &[usize]) {
        self.check_dofs(dofs);
        self.elements.push(dofs);
    }

    /// # Panics
    ///
    /// Panics if a dof or the attribute is out of bounds.
    pub fn push_boundary_element(&mut self, dofs: &[usize], attribute: usize) {
        self.check_dofs(dofs);
        self.check_attribute(attribute);
        self.boundary_elements.push(dofs);
        self.boundary_element_attributes.push(attribute);
    }

    /// # Panics
    ///
    /// Panics if a dof is out of bounds.
    pub fn push_interior_face(&mut self, dofs: &[usize]) {
        self.check_dofs(dofs);
        self.interior_faces.push(dofs);
    }

    /// # Panics
    ///
    /// Panics if a dof or the attribute is out of bounds.
    pub fn push_boundary_face(&mut self, dofs: &[usize], attribute: usize) {
        self.check_dofs(dofs);
        self.check_attribute(attribute);
        self.boundary_faces.push(dofs);
        self.boundary_face_attributes.push(attribute);
    }

    fn check_dofs(&self, dofs: &[usize]) {
        for &dof in dofs {
            assert!(
                dof < self.num_dofs,
                "Dof {} out of bounds for space with {} dofs",
                dof,
                self.num_dofs
            );
        }
    }

    fn check_attribute(&self, attribute: usize) {
        assert!(
            attribute < self.num_boundary_attributes,
            "Boundary attribute {} out of bounds ({} attributes)",
            attribute,
            self.num_boundary_attributes
        );
    }

    fn entities(&self, domain: IntegrationDomain) -> &NestedVec<usize> {
        match domain {
            IntegrationDomain::Domain => &self.elements,
            IntegrationDomain::Boundary => &self.boundary_elements,
            IntegrationDomain::InteriorFace => &self.interior_faces,
            IntegrationDomain::BoundaryFace => &self.boundary_faces,
        }
    }

    fn entity(&self, domain: IntegrationDomain, index: usize) -> &[usize] {
        self.entities(domain)
            .get(index)
            .unwrap_or_else(|| panic!("{} entity index {} out of bounds", domain, index))
    }
}

impl FieldSpace for ExplicitSpace {
    fn num_dofs(&self) -> usize {
        self.num_dofs
    }

    fn num_boundary_attributes(&self) -> usize {
        self.num_boundary_attributes
    }

    fn num_entities(&self, domain: IntegrationDomain) -> usize {
        self.entities(domain).len()
    }

    fn entity_dof_count(&self, domain: IntegrationDomain, index: usize) -> usize {
        self.entity(domain, index).len()
    }

    fn populate_entity_dofs(&self, domain: IntegrationDomain, index: usize, output: &mut [usize]) {
        output.copy_from_slice(self.entity(domain, index));
    }

    fn entity_attribute(&self, domain: IntegrationDomain, index: usize) -> Option<usize> {
        match domain {
            IntegrationDomain::Boundary => self.boundary_element_attributes.get(index).copied(),
            IntegrationDomain::BoundaryFace => self.boundary_face_attributes.get(index).copied(),
            IntegrationDomain::Domain | IntegrationDomain::InteriorFace => None,
        }
    }
}
