//! Canonical class instantiations.
//!
//! `Stack(Point)` written twice in the source yields one `InstanceId`, so
//! comparing instantiations is comparing ids.

use std::collections::HashMap;

use thiserror::Error;

use crate::{ClassId, InstanceId, ParamId};

/// What an instantiation refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstanceTarget {
    Class(ClassId),
    Param(ParamId),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Instance {
    pub target: InstanceTarget,
    pub params: Vec<InstanceId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InstanceError {
    #[error("class parameters cannot take parameters")]
    ParameterizedParam,
}

#[derive(Debug, Default)]
pub struct InstanceTable {
    items: Vec<Instance>,
    index: HashMap<Instance, InstanceId>,
}

impl InstanceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canonical id for `instance`; order of parameters matters
    pub fn intern(&mut self, instance: Instance) -> Result<InstanceId, InstanceError> {
        if matches!(instance.target, InstanceTarget::Param(_)) && !instance.params.is_empty() {
            return Err(InstanceError::ParameterizedParam);
        }
        Ok(self.intern_unchecked(instance))
    }

    pub(crate) fn intern_unchecked(&mut self, instance: Instance) -> InstanceId {
        if let Some(id) = self.index.get(&instance) {
            return *id;
        }
        let id = InstanceId::new(self.items.len());
        self.items.push(instance.clone());
        self.index.insert(instance, id);
        id
    }

    /// Unparameterized reference to a class or parameter
    pub fn plain(&mut self, target: InstanceTarget) -> InstanceId {
        self.intern_unchecked(Instance {
            target,
            params: Vec::new(),
        })
    }

    pub fn get(&self, id: InstanceId) -> &Instance {
        &self.items[id.index()]
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_intern_idempotent() {
        let mut table = InstanceTable::new();
        let a = table.plain(InstanceTarget::Class(ClassId(0)));
        let b = table.plain(InstanceTarget::Class(ClassId(1)));
        let pair = |t: &mut InstanceTable, p: Vec<InstanceId>| {
            t.intern(Instance { target: InstanceTarget::Class(ClassId(2)), params: p })
                .unwrap()
        };
        let ab = pair(&mut table, vec![a, b]);
        let ab_again = pair(&mut table, vec![a, b]);
        let ba = pair(&mut table, vec![b, a]);
        assert_eq!(ab, ab_again);
        assert_ne!(ab, ba);
        assert_eq!(table.len(), 4);
    }

    #[test]
    fn test_different_targets_never_collide() {
        let mut table = InstanceTable::new();
        let a = table.plain(InstanceTarget::Class(ClassId(0)));
        let x = table
            .intern(Instance { target: InstanceTarget::Class(ClassId(1)), params: vec![a] })
            .unwrap();
        let y = table
            .intern(Instance { target: InstanceTarget::Class(ClassId(2)), params: vec![a] })
            .unwrap();
        assert_ne!(x, y);
    }

    #[test]
    fn test_parameterized_param_rejected() {
        let mut table = InstanceTable::new();
        let a = table.plain(InstanceTarget::Class(ClassId(0)));
        let err = table
            .intern(Instance { target: InstanceTarget::Param(ParamId(0)), params: vec![a] })
            .unwrap_err();
        assert_eq!(err, InstanceError::ParameterizedParam);
    }
}
