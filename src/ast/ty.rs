use hashbrown::{HashMap, HashSet};
use serde::{Deserialize, Serialize};

use super::{NodeId, SymbolId, TypeId, primitive::PrimitiveClass};
use crate::{error::InternalError, index::IndexVec, intern::InternedSymbol};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Type {
    pub kind: TypeKind,
    /// The type symbol naming this type, if it has been declared
    pub symbol: Option<SymbolId>,
    pub flags: HashSet<TypeFlag>,
    /// Generic instantiation slots, in declaration order. Data classes keep
    /// their element type in the first slot.
    pub substitutions: Vec<Substitution>,
    /// Set once a pass has eliminated the type. Retired types keep their slot
    /// but must not be selected again.
    pub retired: bool,
}

impl Type {
    pub fn new(kind: TypeKind) -> Self {
        Self {
            kind,
            symbol: None,
            flags: HashSet::new(),
            substitutions: Vec::new(),
            retired: false,
        }
    }

    pub fn has_flag(&self, flag: TypeFlag) -> bool {
        self.flags.contains(&flag)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeKind {
    /// bool, int(64), real(32), complex(128), ...
    Primitive { class: PrimitiveClass, width: u16 },
    /// The address-of shadow of some value type. The value type is not stored
    /// here; see [`ReferenceShadows`].
    Reference,
    /// A class (heap allocated, passed by pointer) or a record (passed by
    /// value). Fields are declaration nodes in fixed order.
    Aggregate {
        kind: AggregateKind,
        fields: Vec<NodeId>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregateKind {
    Class,
    Record,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeFlag {
    /// Class-like type that does not point into the collected heap
    NoObject,
    /// Generic container parameterized by its element type (arrays, domains)
    DataClass,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Substitution {
    pub name: InternedSymbol,
    /// The type symbol bound to this slot. `None` means "no type".
    pub value: Option<SymbolId>,
}

/// Bidirectional association between value types and their reference shadow
/// types. Both directions are only ever updated together.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReferenceShadows {
    value_to_reference: HashMap<TypeId, TypeId>,
    reference_to_value: HashMap<TypeId, TypeId>,
}

impl ReferenceShadows {
    pub fn reference_of(&self, value: TypeId) -> Option<TypeId> {
        self.value_to_reference.get(&value).copied()
    }

    pub fn value_of(&self, reference: TypeId) -> Option<TypeId> {
        self.reference_to_value.get(&reference).copied()
    }

    pub fn pair(&mut self, value: TypeId, reference: TypeId) -> Result<(), InternalError> {
        if self.value_to_reference.contains_key(&value)
            || self.reference_to_value.contains_key(&reference)
        {
            return Err(InternalError::ShadowConflict { value });
        }

        self.value_to_reference.insert(value, reference);
        self.reference_to_value.insert(reference, value);

        Ok(())
    }

    /// Moves the shadow of `from` over to `to`, leaving `from` without one.
    /// Returns the reference type that moved, if `from` had one.
    pub fn transfer(&mut self, from: TypeId, to: TypeId) -> Result<Option<TypeId>, InternalError> {
        if self.value_to_reference.contains_key(&to) {
            return Err(InternalError::ShadowConflict { value: to });
        }

        let Some(reference) = self.value_to_reference.remove(&from) else {
            return Ok(None);
        };

        self.value_to_reference.insert(to, reference);
        self.reference_to_value.insert(reference, to);

        Ok(Some(reference))
    }

    /// Drops any pairing `ty` takes part in, whichever side it is on
    pub fn release(&mut self, ty: TypeId) {
        if let Some(reference) = self.value_to_reference.remove(&ty) {
            self.reference_to_value.remove(&reference);
        }

        if let Some(value) = self.reference_to_value.remove(&ty) {
            self.value_to_reference.remove(&value);
        }
    }

    /// Every `(value, reference)` pairing
    pub fn pairs(&self) -> impl Iterator<Item = (TypeId, TypeId)> + '_ {
        self.value_to_reference
            .iter()
            .map(|(value, reference)| (*value, *reference))
    }

    pub fn len(&self) -> usize {
        self.value_to_reference.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value_to_reference.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TypeUniverse {
    pub types: IndexVec<TypeId, Type>,
    pub shadows: ReferenceShadows,
}

impl TypeUniverse {
    pub fn insert(&mut self, ty: Type) -> TypeId {
        self.types.push(ty)
    }

    pub fn get(&self, id: TypeId) -> &Type {
        &self.types[id]
    }

    pub fn get_mut(&mut self, id: TypeId) -> &mut Type {
        &mut self.types[id]
    }

    pub fn is_complex(&self, id: TypeId) -> bool {
        matches!(
            self.types[id].kind,
            TypeKind::Primitive {
                class: PrimitiveClass::Complex,
                ..
            }
        )
    }

    pub fn is_reference(&self, id: TypeId) -> bool {
        matches!(self.types[id].kind, TypeKind::Reference)
    }

    pub fn is_record(&self, id: TypeId) -> bool {
        matches!(
            self.types[id].kind,
            TypeKind::Aggregate {
                kind: AggregateKind::Record,
                ..
            }
        )
    }

    /// A class whose values are pointers into the collected heap. References
    /// are never classes, and classes flagged `NoObject` do not count.
    pub fn is_pointer_class(&self, id: TypeId) -> bool {
        let ty = &self.types[id];

        matches!(
            ty.kind,
            TypeKind::Aggregate {
                kind: AggregateKind::Class,
                ..
            }
        ) && !ty.has_flag(TypeFlag::NoObject)
    }

    /// Field declaration nodes of an aggregate, empty for anything else
    pub fn fields(&self, id: TypeId) -> &[NodeId] {
        match &self.types[id].kind {
            TypeKind::Aggregate { fields, .. } => fields,
            TypeKind::Primitive { .. } | TypeKind::Reference => &[],
        }
    }

    /// Follows a reference type to its value type; other types are returned
    /// as-is
    pub fn dereference(&self, id: TypeId) -> TypeId {
        if self.is_reference(id) {
            self.shadows.value_of(id).unwrap_or(id)
        } else {
            id
        }
    }

    /// Pairs `value` with a reference shadow. The shadow must be a
    /// [`TypeKind::Reference`].
    pub fn pair_reference(&mut self, value: TypeId, reference: TypeId) -> Result<(), InternalError> {
        if !self.is_reference(reference) {
            return Err(InternalError::ShadowConflict { value });
        }

        self.shadows.pair(value, reference)
    }

    /// Marks a type as eliminated and nulls out its reference shadow
    pub fn retire(&mut self, id: TypeId) {
        self.shadows.release(id);
        self.types[id].retired = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn universe() -> (TypeUniverse, TypeId, TypeId, TypeId) {
        let mut universe = TypeUniverse::default();
        let complex = universe.insert(Type::new(TypeKind::Primitive {
            class: PrimitiveClass::Complex,
            width: 64,
        }));
        let reference = universe.insert(Type::new(TypeKind::Reference));
        let record = universe.insert(Type::new(TypeKind::Aggregate {
            kind: AggregateKind::Record,
            fields: Vec::new(),
        }));

        universe.pair_reference(complex, reference).unwrap();

        (universe, complex, reference, record)
    }

    #[test]
    fn transfer_moves_both_directions() {
        let (mut universe, complex, reference, record) = universe();

        let moved = universe.shadows.transfer(complex, record).unwrap();

        assert_eq!(moved, Some(reference));
        assert_eq!(universe.shadows.reference_of(record), Some(reference));
        assert_eq!(universe.shadows.reference_of(complex), None);
        assert_eq!(universe.dereference(reference), record);
        assert_eq!(universe.shadows.len(), 1);
    }

    #[test]
    fn retire_nulls_the_shadow() {
        let (mut universe, complex, reference, _) = universe();

        universe.retire(complex);

        assert!(universe.get(complex).retired);
        assert!(universe.shadows.is_empty());
        assert_eq!(universe.shadows.value_of(reference), None);
    }

    #[test]
    fn pairing_twice_is_a_conflict() {
        let (mut universe, complex, _, _) = universe();
        let other = universe.insert(Type::new(TypeKind::Reference));

        assert_eq!(
            universe.pair_reference(complex, other),
            Err(InternalError::ShadowConflict { value: complex })
        );
    }

    #[test]
    fn transfer_onto_a_shadowed_type_is_a_conflict() {
        let (mut universe, complex, _, record) = universe();
        let other = universe.insert(Type::new(TypeKind::Reference));
        universe.pair_reference(record, other).unwrap();

        assert!(universe.shadows.transfer(complex, record).is_err());
    }

    #[test]
    fn no_object_classes_are_not_pointer_classes() {
        let mut universe = TypeUniverse::default();
        let mut ty = Type::new(TypeKind::Aggregate {
            kind: AggregateKind::Class,
            fields: Vec::new(),
        });
        let heap = universe.insert(ty.clone());
        ty.flags.insert(TypeFlag::NoObject);
        let handle = universe.insert(ty);

        assert!(universe.is_pointer_class(heap));
        assert!(!universe.is_pointer_class(handle));
    }
}
