//! Knowledge-base data structures for the Strix description-logic reasoner.
//!
//! This crate holds everything the tableau engine reads but never mutates
//! during a satisfiability check:
//! - the hash-consed constraint graph of concept expressions (`graph`),
//! - the role hierarchy with its characteristics and closures (`roles`),
//! - dependency sets used for backjumping (`deps`),
//! - the automorphism labeler used to strengthen cache keys (`label`).

pub mod absorb;
pub mod concept;
pub mod deps;
pub mod graph;
pub mod label;
pub mod roles;

pub use concept::{ConceptRef, ConstraintNode, NodeKind};
pub use deps::DependencySet;
pub use graph::{ConceptExpr, ConstraintGraph, KnowledgeBase};
pub use label::AutomorphismLabeler;
pub use roles::{RoleHierarchy, RoleId};

use thiserror::Error;

/// Errors raised while building the knowledge base. Once construction
/// succeeds the graph and role hierarchy are read-only and infallible.
#[derive(Error, Debug)]
pub enum StrixCoreError {
    #[error("unknown role: {0}")]
    UnknownRole(String),

    #[error("role id {0} out of range")]
    InvalidRoleId(u32),

    #[error("undefined concept reference")]
    UndefinedConcept,

    #[error("malformed expression: {0}")]
    MalformedExpression(String),

    #[error("concept {0} already has a definition")]
    DuplicateDefinition(String),

    #[error("role hierarchy already finalized")]
    HierarchyFrozen,
}
