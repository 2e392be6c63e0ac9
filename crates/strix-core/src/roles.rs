//! Role hierarchy (RBox) bookkeeping.
//!
//! Read-only collaborator of the tableau engine: for each role it answers
//! domain/range, characteristic flags, the super/sub closure, inverse and
//! disjoint role sets. Populated during knowledge-base load and frozen by
//! `finalize()` before any check runs.

use crate::concept::ConceptRef;
use crate::StrixCoreError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Index handle into the role arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RoleId(pub u32);

impl RoleId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// One role record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub name: String,
    pub functional: bool,
    pub inverse_functional: bool,
    pub transitive: bool,
    pub symmetric: bool,
    /// Concept every edge source must satisfy. `UNDEF` when unconstrained.
    pub domain: ConceptRef,
    /// Concept every edge target must satisfy. `UNDEF` when unconstrained.
    pub range: ConceptRef,
    /// Directly declared super-roles.
    pub supers: Vec<RoleId>,
    pub inverse: Option<RoleId>,
    pub disjoint: Vec<RoleId>,
    /// Reflexive-transitive closure of `supers`, computed by `finalize()`.
    ancestors: Vec<RoleId>,
    /// Reflexive-transitive closure of the sub-role relation.
    descendants: Vec<RoleId>,
}

impl Role {
    fn new(name: String) -> Self {
        Self {
            name,
            functional: false,
            inverse_functional: false,
            transitive: false,
            symmetric: false,
            domain: ConceptRef::UNDEF,
            range: ConceptRef::UNDEF,
            supers: Vec::new(),
            inverse: None,
            disjoint: Vec::new(),
            ancestors: Vec::new(),
            descendants: Vec::new(),
        }
    }
}

/// The RBox: a role arena plus name lookup and closure tables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoleHierarchy {
    roles: Vec<Role>,
    by_name: HashMap<String, RoleId>,
    finalized: bool,
}

impl RoleHierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare (or look up) a role by name.
    pub fn declare(&mut self, name: &str) -> Result<RoleId, StrixCoreError> {
        if let Some(&id) = self.by_name.get(name) {
            return Ok(id);
        }
        if self.finalized {
            return Err(StrixCoreError::HierarchyFrozen);
        }
        let id = RoleId(self.roles.len() as u32);
        self.roles.push(Role::new(name.to_string()));
        self.by_name.insert(name.to_string(), id);
        Ok(id)
    }

    pub fn lookup(&self, name: &str) -> Option<RoleId> {
        self.by_name.get(name).copied()
    }

    pub fn role(&self, id: RoleId) -> &Role {
        &self.roles[id.index()]
    }

    fn role_mut(&mut self, id: RoleId) -> Result<&mut Role, StrixCoreError> {
        if self.finalized {
            return Err(StrixCoreError::HierarchyFrozen);
        }
        self.roles
            .get_mut(id.index())
            .ok_or(StrixCoreError::InvalidRoleId(id.0))
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    pub fn set_functional(&mut self, id: RoleId) -> Result<(), StrixCoreError> {
        self.role_mut(id)?.functional = true;
        Ok(())
    }

    pub fn set_inverse_functional(&mut self, id: RoleId) -> Result<(), StrixCoreError> {
        self.role_mut(id)?.inverse_functional = true;
        Ok(())
    }

    pub fn set_transitive(&mut self, id: RoleId) -> Result<(), StrixCoreError> {
        self.role_mut(id)?.transitive = true;
        Ok(())
    }

    pub fn set_symmetric(&mut self, id: RoleId) -> Result<(), StrixCoreError> {
        self.role_mut(id)?.symmetric = true;
        Ok(())
    }

    pub fn set_domain(&mut self, id: RoleId, domain: ConceptRef) -> Result<(), StrixCoreError> {
        self.role_mut(id)?.domain = domain;
        Ok(())
    }

    pub fn set_range(&mut self, id: RoleId, range: ConceptRef) -> Result<(), StrixCoreError> {
        self.role_mut(id)?.range = range;
        Ok(())
    }

    /// Declare `sub ⊑ sup`.
    pub fn add_sub_role(&mut self, sub: RoleId, sup: RoleId) -> Result<(), StrixCoreError> {
        let role = self.role_mut(sub)?;
        if !role.supers.contains(&sup) {
            role.supers.push(sup);
        }
        Ok(())
    }

    pub fn set_inverse(&mut self, a: RoleId, b: RoleId) -> Result<(), StrixCoreError> {
        self.role_mut(a)?.inverse = Some(b);
        self.role_mut(b)?.inverse = Some(a);
        Ok(())
    }

    pub fn add_disjoint(&mut self, a: RoleId, b: RoleId) -> Result<(), StrixCoreError> {
        let ra = self.role_mut(a)?;
        if !ra.disjoint.contains(&b) {
            ra.disjoint.push(b);
        }
        let rb = self.role_mut(b)?;
        if !rb.disjoint.contains(&a) {
            rb.disjoint.push(a);
        }
        Ok(())
    }

    /// Compute the super/sub closures and freeze the hierarchy. Idempotent
    /// fixpoint over the declared edges.
    pub fn finalize(&mut self) {
        let n = self.roles.len();
        // ancestors starts as {self} ∪ declared supers
        let mut ancestors: Vec<Vec<RoleId>> = (0..n)
            .map(|i| {
                let mut a = vec![RoleId(i as u32)];
                for &s in &self.roles[i].supers {
                    if !a.contains(&s) {
                        a.push(s);
                    }
                }
                a
            })
            .collect();

        let mut changed = true;
        while changed {
            changed = false;
            for i in 0..n {
                let current = ancestors[i].clone();
                for sup in current {
                    let inherited = ancestors[sup.index()].clone();
                    for anc in inherited {
                        if !ancestors[i].contains(&anc) {
                            ancestors[i].push(anc);
                            changed = true;
                        }
                    }
                }
            }
        }

        let mut descendants: Vec<Vec<RoleId>> = vec![Vec::new(); n];
        for (i, ancs) in ancestors.iter().enumerate() {
            for anc in ancs {
                descendants[anc.index()].push(RoleId(i as u32));
            }
        }
        for (i, role) in self.roles.iter_mut().enumerate() {
            let mut a = std::mem::take(&mut ancestors[i]);
            a.sort_unstable();
            role.ancestors = a;
            let mut d = std::mem::take(&mut descendants[i]);
            d.sort_unstable();
            role.descendants = d;
        }
        self.finalized = true;
    }

    /// `sub ⊑ sup` in the reflexive-transitive closure.
    pub fn is_subrole_of(&self, sub: RoleId, sup: RoleId) -> bool {
        self.roles[sub.index()].ancestors.binary_search(&sup).is_ok()
    }

    /// All roles `r` with `r ⊑ id`, including `id` itself.
    pub fn sub_roles(&self, id: RoleId) -> &[RoleId] {
        &self.roles[id.index()].descendants
    }

    /// All roles `r` with `id ⊑ r`, including `id` itself.
    pub fn super_roles(&self, id: RoleId) -> &[RoleId] {
        &self.roles[id.index()].ancestors
    }

    pub fn are_disjoint(&self, a: RoleId, b: RoleId) -> bool {
        self.roles[a.index()].disjoint.contains(&b)
    }

    /// A transitive role `t` with `sub ⊑ t ⊑ sup`, if any. Drives the
    /// re-derivation of universal restrictions along transitive chains.
    pub fn transitive_between(&self, sub: RoleId, sup: RoleId) -> Option<RoleId> {
        self.roles[sub.index()]
            .ancestors
            .iter()
            .copied()
            .find(|&t| self.roles[t.index()].transitive && self.is_subrole_of(t, sup))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closure_is_reflexive_and_transitive() {
        let mut h = RoleHierarchy::new();
        let a = h.declare("a").unwrap();
        let b = h.declare("b").unwrap();
        let c = h.declare("c").unwrap();
        h.add_sub_role(a, b).unwrap();
        h.add_sub_role(b, c).unwrap();
        h.finalize();

        assert!(h.is_subrole_of(a, a));
        assert!(h.is_subrole_of(a, b));
        assert!(h.is_subrole_of(a, c));
        assert!(!h.is_subrole_of(c, a));
        assert_eq!(h.sub_roles(c).len(), 3);
    }

    #[test]
    fn declare_is_idempotent_by_name() {
        let mut h = RoleHierarchy::new();
        let r1 = h.declare("hasChild").unwrap();
        let r2 = h.declare("hasChild").unwrap();
        assert_eq!(r1, r2);
        assert_eq!(h.len(), 1);
    }

    #[test]
    fn transitive_between_finds_intermediate() {
        let mut h = RoleHierarchy::new();
        let sub = h.declare("hasParent").unwrap();
        let anc = h.declare("hasAncestor").unwrap();
        let rel = h.declare("relatedTo").unwrap();
        h.add_sub_role(sub, anc).unwrap();
        h.add_sub_role(anc, rel).unwrap();
        h.set_transitive(anc).unwrap();
        h.finalize();

        assert_eq!(h.transitive_between(sub, rel), Some(anc));
        assert_eq!(h.transitive_between(rel, rel), None);
    }

    #[test]
    fn declarations_rejected_after_finalize() {
        let mut h = RoleHierarchy::new();
        h.declare("r").unwrap();
        h.finalize();
        assert!(matches!(
            h.declare("s"),
            Err(StrixCoreError::HierarchyFrozen)
        ));
    }
}
