//! Errors reported by the assemblers.
use crate::space::IntegrationDomain;
use std::fmt;

/// The quantity whose size did not match what the assembler expected.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SizeOf {
    /// The trial vector passed to `apply`, `linearization` or `energy`.
    Input,
    /// The output vector passed to `apply`.
    Output,
    /// A boundary attribute marker.
    Marker,
    /// The list of per-field markers (or right-hand sides, or dof lists) given to a block form.
    FieldList,
    /// A right-hand side vector or a vector of prescribed values.
    Rhs,
    /// The number of mesh entities of a field space, compared against the first field space.
    MeshEntities(IntegrationDomain),
}

impl fmt::Display for SizeOf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SizeOf::Input => write!(f, "input vector"),
            SizeOf::Output => write!(f, "output vector"),
            SizeOf::Marker => write!(f, "boundary attribute marker"),
            SizeOf::FieldList => write!(f, "per-field list"),
            SizeOf::Rhs => write!(f, "right-hand side"),
            SizeOf::MeshEntities(domain) => write!(f, "number of {} entities", domain),
        }
    }
}

/// An operation that a local contribution may or may not support.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Capability {
    Jacobian,
    Energy,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Jacobian => write!(f, "Jacobian"),
            Capability::Energy => write!(f, "energy"),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum AssemblyError {
    /// A vector, marker or list does not have the size dictated by the field space(s).
    ///
    /// Reported before any accumulation takes place.
    #[error("dimension mismatch for {what}: expected {expected}, got {actual}")]
    DimensionMismatch { what: SizeOf, expected: usize, actual: usize },
    /// A registered contribution does not implement the requested operation.
    #[error("{domain} contribution #{contribution} does not support {operation} evaluation")]
    UnsupportedOperation {
        operation: Capability,
        domain: IntegrationDomain,
        contribution: usize,
    },
    /// A local contribution failed on a specific entity. The contribution's error is
    /// carried as the source, unmodified.
    #[error("{domain} contribution failed on entity {entity}")]
    Contribution {
        domain: IntegrationDomain,
        entity: usize,
        #[source]
        source: eyre::Report,
    },
}

impl AssemblyError {
    pub(crate) fn check_size(what: SizeOf, expected: usize, actual: usize) -> Result<(), Self> {
        if expected == actual {
            Ok(())
        } else {
            Err(AssemblyError::DimensionMismatch { what, expected, actual })
        }
    }
}

/// Deserialized data that violates an invariant the type's constructors enforce.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid {what}: {reason}")]
pub struct InvalidDataError {
    pub what: &'static str,
    pub reason: String,
}

impl InvalidDataError {
    pub(crate) fn new(what: &'static str, reason: impl Into<String>) -> Self {
        Self {
            what,
            reason: reason.into(),
        }
    }
}
