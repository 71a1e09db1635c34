//! Interned types and the shared cold-lambda placeholders

use std::collections::HashMap;

use crate::{ColdId, InstanceId, LambdaId, TypeId};

/// The type of a value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Int64,
    Double,
    Void,
    Atom,
    /// Type of expressions that never complete, such as `break`
    NoReturn,
    /// `depth` counts nested optionals; `bool` is `Optional(Void, 1)`
    Optional { wrapped: TypeId, depth: u32 },
    /// Reference to a free function
    Function { params: Vec<TypeId>, result: TypeId },
    Lambda { params: Vec<TypeId>, result: TypeId },
    /// Lambda whose signature is fixed by its first application
    ColdLambda(ColdId),
    /// A class used as a type expression
    Class(InstanceId),
    /// Owning pointer
    Own(InstanceId),
    /// Borrowed, non-null reference
    Pin(InstanceId),
    /// Non-owning nullable reference
    Weak(InstanceId),
    Array(TypeId),
}

/// Ownership qualifier of a class reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    Own,
    Pin,
    Weak,
}

/// Per-node type state: written at most once
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TypeSlot {
    #[default]
    Empty,
    /// Being computed; re-entry is a cycle
    InProgress,
    Fixed(TypeId),
}

impl TypeSlot {
    pub fn fixed(self) -> Option<TypeId> {
        match self {
            TypeSlot::Fixed(ty) => Some(ty),
            _ => None,
        }
    }
}

/// Canonical storage for types: equal structure maps to one `TypeId`
#[derive(Debug)]
pub struct TypeTable {
    types: Vec<Type>,
    index: HashMap<Type, TypeId>,
}

impl Default for TypeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeTable {
    pub const INT64: TypeId = TypeId(0);
    pub const DOUBLE: TypeId = TypeId(1);
    pub const VOID: TypeId = TypeId(2);
    pub const ATOM: TypeId = TypeId(3);
    pub const NO_RETURN: TypeId = TypeId(4);
    pub const BOOL: TypeId = TypeId(5);

    pub fn new() -> Self {
        let mut table = Self {
            types: Vec::new(),
            index: HashMap::new(),
        };
        table.intern(Type::Int64);
        table.intern(Type::Double);
        table.intern(Type::Void);
        table.intern(Type::Atom);
        table.intern(Type::NoReturn);
        table.intern(Type::Optional {
            wrapped: Self::VOID,
            depth: 1,
        });
        table
    }

    pub fn intern(&mut self, ty: Type) -> TypeId {
        if let Some(id) = self.index.get(&ty) {
            return *id;
        }
        let id = TypeId::new(self.types.len());
        self.types.push(ty.clone());
        self.index.insert(ty, id);
        id
    }

    pub fn get(&self, id: TypeId) -> &Type {
        &self.types[id.index()]
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Wrap into one more level of optional
    pub fn optional(&mut self, ty: TypeId) -> TypeId {
        match *self.get(ty) {
            Type::Optional { wrapped, depth } => self.intern(Type::Optional {
                wrapped,
                depth: depth + 1,
            }),
            _ => self.intern(Type::Optional {
                wrapped: ty,
                depth: 1,
            }),
        }
    }

    /// Remove one level of optional, `None` if `ty` is not optional
    pub fn unwrap_optional(&mut self, ty: TypeId) -> Option<TypeId> {
        match *self.get(ty) {
            Type::Optional { wrapped, depth: 1 } => Some(wrapped),
            Type::Optional { wrapped, depth } => Some(self.intern(Type::Optional {
                wrapped,
                depth: depth - 1,
            })),
            _ => None,
        }
    }

    pub fn own(&mut self, inst: InstanceId) -> TypeId {
        self.intern(Type::Own(inst))
    }

    pub fn pin(&mut self, inst: InstanceId) -> TypeId {
        self.intern(Type::Pin(inst))
    }

    pub fn weak(&mut self, inst: InstanceId) -> TypeId {
        self.intern(Type::Weak(inst))
    }

    pub fn class(&mut self, inst: InstanceId) -> TypeId {
        self.intern(Type::Class(inst))
    }

    pub fn array(&mut self, element: TypeId) -> TypeId {
        self.intern(Type::Array(element))
    }

    pub fn lambda(&mut self, params: Vec<TypeId>, result: TypeId) -> TypeId {
        self.intern(Type::Lambda { params, result })
    }

    pub fn function(&mut self, params: Vec<TypeId>, result: TypeId) -> TypeId {
        self.intern(Type::Function { params, result })
    }

    pub fn cold(&mut self, cold: ColdId) -> TypeId {
        self.intern(Type::ColdLambda(cold))
    }

    pub fn reference(&mut self, kind: RefKind, inst: InstanceId) -> TypeId {
        match kind {
            RefKind::Own => self.own(inst),
            RefKind::Pin => self.pin(inst),
            RefKind::Weak => self.weak(inst),
        }
    }

    /// Ownership qualifier and target of a class reference type
    pub fn class_ref(&self, ty: TypeId) -> Option<(RefKind, InstanceId)> {
        match *self.get(ty) {
            Type::Own(i) => Some((RefKind::Own, i)),
            Type::Pin(i) => Some((RefKind::Pin, i)),
            Type::Weak(i) => Some((RefKind::Weak, i)),
            _ => None,
        }
    }

    pub fn is_optional(&self, ty: TypeId) -> bool {
        matches!(self.get(ty), Type::Optional { .. })
    }

    pub fn is_numeric(&self, ty: TypeId) -> bool {
        ty == Self::INT64 || ty == Self::DOUBLE
    }
}

/// A cold placeholder shared by every lambda literal that flows into the same slot
#[derive(Debug, Clone, Default)]
pub struct ColdLambda {
    pub sites: Vec<LambdaId>,
    /// Concrete `Lambda` type once fixed
    pub signature: Option<TypeId>,
    /// Set when merged into another placeholder
    pub forward: Option<ColdId>,
    /// Bodies are being typed
    pub fixing: bool,
}

#[derive(Debug, Default)]
pub struct ColdTable {
    items: Vec<ColdLambda>,
}

impl ColdTable {
    pub fn create(&mut self, site: LambdaId) -> ColdId {
        let id = ColdId::new(self.items.len());
        self.items.push(ColdLambda {
            sites: vec![site],
            ..ColdLambda::default()
        });
        id
    }

    /// Representative placeholder after merges
    pub fn find(&self, mut id: ColdId) -> ColdId {
        while let Some(next) = self.items[id.index()].forward {
            id = next;
        }
        id
    }

    pub fn get(&self, id: ColdId) -> &ColdLambda {
        &self.items[self.find(id).index()]
    }

    pub fn get_mut(&mut self, id: ColdId) -> &mut ColdLambda {
        let id = self.find(id);
        &mut self.items[id.index()]
    }

    /// Move all sites of `from` into `into`; both must still be unfixed
    pub fn merge(&mut self, into: ColdId, from: ColdId) -> ColdId {
        let into = self.find(into);
        let from = self.find(from);
        if into == from {
            return into;
        }
        let sites = std::mem::take(&mut self.items[from.index()].sites);
        self.items[into.index()].sites.extend(sites);
        self.items[from.index()].forward = Some(into);
        into
    }

    pub fn ids(&self) -> impl Iterator<Item = ColdId> + use<> {
        (0..self.items.len()).map(ColdId::new)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_primitives_preinterned() {
        let mut types = TypeTable::new();
        assert_eq!(types.intern(Type::Int64), TypeTable::INT64);
        assert_eq!(
            types.intern(Type::Optional { wrapped: TypeTable::VOID, depth: 1 }),
            TypeTable::BOOL
        );
    }

    #[test]
    fn test_structural_types_share_identity() {
        let mut types = TypeTable::new();
        let a = types.lambda(vec![TypeTable::INT64, TypeTable::DOUBLE], TypeTable::VOID);
        let b = types.lambda(vec![TypeTable::INT64, TypeTable::DOUBLE], TypeTable::VOID);
        let swapped = types.lambda(vec![TypeTable::DOUBLE, TypeTable::INT64], TypeTable::VOID);
        let func = types.function(vec![TypeTable::INT64, TypeTable::DOUBLE], TypeTable::VOID);
        assert_eq!(a, b);
        assert_ne!(a, swapped);
        assert_ne!(a, func);
    }

    #[test]
    fn test_optional_depth() {
        let mut types = TypeTable::new();
        let opt = types.optional(TypeTable::INT64);
        let opt2 = types.optional(opt);
        assert_eq!(*types.get(opt2), Type::Optional { wrapped: TypeTable::INT64, depth: 2 });
        assert_eq!(types.unwrap_optional(opt2), Some(opt));
        assert_eq!(types.unwrap_optional(opt), Some(TypeTable::INT64));
        assert_eq!(types.unwrap_optional(TypeTable::BOOL), Some(TypeTable::VOID));
        assert_eq!(types.unwrap_optional(TypeTable::INT64), None);
    }

    #[test]
    fn test_cold_merge_follows_forward() {
        let mut colds = ColdTable::default();
        let a = colds.create(LambdaId(0));
        let b = colds.create(LambdaId(1));
        let root = colds.merge(a, b);
        assert_eq!(root, a);
        assert_eq!(colds.find(b), a);
        assert_eq!(colds.get(b).sites, vec![LambdaId(0), LambdaId(1)]);
    }
}
