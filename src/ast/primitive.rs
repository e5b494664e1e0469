use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

/// The family a primitive type belongs to. Together with a bit width this
/// identifies a primitive type (e.g. `real(32)`, `complex(128)`).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[strum(serialize_all = "lowercase")]
pub enum PrimitiveClass {
    Bool,
    Int,
    UInt,
    Real,
    Complex,
}

/// The closed set of compiler-defined operations. These are not user callable
/// and each has a fixed arity.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PrimitiveOp {
    /// Real component of a complex value
    GetReal,
    /// Imaginary component of a complex value
    GetImag,
    /// `get_member(base, field)`: address of a field
    GetMember,
    /// `get_member_value(base, field)`: value of a field
    GetMemberValue,
    /// `set_member(base, field, value)`
    SetMember,
    /// `move(destination, source)`
    Move,
    /// Register a stack location as a collector root
    GcAddRoot,
    /// Register a global as a root; the slot is cleared when it is
    /// deregistered
    GcAddNullRoot,
    /// `gc_delete_root(count)`: drop the most recent `count` roots
    GcDeleteRoot,
    /// `gc_cc_init(bytes)`: set up the collector's memory region
    GcCcInit,
    GcCleanup,
}

impl PrimitiveOp {
    pub fn arity(self) -> usize {
        match self {
            PrimitiveOp::GcCleanup => 0,
            PrimitiveOp::GetReal
            | PrimitiveOp::GetImag
            | PrimitiveOp::GcAddRoot
            | PrimitiveOp::GcAddNullRoot
            | PrimitiveOp::GcDeleteRoot
            | PrimitiveOp::GcCcInit => 1,
            PrimitiveOp::GetMember | PrimitiveOp::GetMemberValue | PrimitiveOp::Move => 2,
            PrimitiveOp::SetMember => 3,
        }
    }

    /// Member operations name the accessed field in their second argument
    pub fn is_member_access(self) -> bool {
        matches!(
            self,
            PrimitiveOp::GetMember | PrimitiveOp::GetMemberValue | PrimitiveOp::SetMember
        )
    }

    pub fn is_complex_specific(self) -> bool {
        matches!(self, PrimitiveOp::GetReal | PrimitiveOp::GetImag)
    }

    pub fn name(self) -> &'static str {
        self.into()
    }
}

/// A compile-time constant value carried by a constant symbol
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Immediate {
    Bool(bool),
    Int(i64),
    Real(f64),
    Complex { re: f64, im: f64 },
}

impl Immediate {
    /// Key used to deduplicate constants; floats are compared bitwise so that
    /// `0.0` and `-0.0` stay distinct constants.
    pub(crate) fn key(&self) -> ImmediateKey {
        match *self {
            Immediate::Bool(value) => ImmediateKey::Bool(value),
            Immediate::Int(value) => ImmediateKey::Int(value),
            Immediate::Real(value) => ImmediateKey::Real(value.to_bits()),
            Immediate::Complex { re, im } => ImmediateKey::Complex(re.to_bits(), im.to_bits()),
        }
    }
}

impl core::fmt::Display for Immediate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Immediate::Bool(value) => write!(f, "{value}"),
            Immediate::Int(value) => write!(f, "{value}"),
            Immediate::Real(value) => write!(f, "{value:?}"),
            Immediate::Complex { re, im } => write!(f, "({re:?}, {im:?}i)"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum ImmediateKey {
    Bool(bool),
    Int(i64),
    Real(u64),
    Complex(u64, u64),
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn names_are_snake_case() {
        assert_eq!(PrimitiveOp::GetMemberValue.name(), "get_member_value");
        assert_eq!(PrimitiveOp::GcAddNullRoot.to_string(), "gc_add_null_root");
        assert_eq!(PrimitiveOp::from_str("gc_cc_init"), Ok(PrimitiveOp::GcCcInit));
    }

    #[test]
    fn only_member_ops_take_a_field() {
        let member_ops = PrimitiveOp::iter()
            .filter(|op| op.is_member_access())
            .collect::<Vec<_>>();

        assert_eq!(
            member_ops,
            [
                PrimitiveOp::GetMember,
                PrimitiveOp::GetMemberValue,
                PrimitiveOp::SetMember
            ]
        );
        assert!(member_ops.iter().all(|op| op.arity() >= 2));
    }

    #[test]
    fn signed_zero_constants_do_not_collide() {
        assert_ne!(Immediate::Real(0.0).key(), Immediate::Real(-0.0).key());
        assert_eq!(
            Immediate::Complex { re: 1.0, im: 2.0 }.key(),
            Immediate::Complex { re: 1.0, im: 2.0 }.key()
        );
    }

    #[test]
    fn reals_always_print_a_fraction() {
        assert_eq!(Immediate::Real(0.0).to_string(), "0.0");
        assert_eq!(Immediate::Complex { re: 1.5, im: -2.0 }.to_string(), "(1.5, -2.0i)");
    }
}
