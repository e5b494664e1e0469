use crate::index::simple_index;

simple_index! {
    /// Identifies a node (declaration, use, call, block, conditional or
    /// return) in the program arena. Node IDs are never reused: removing a
    /// node from the tree orphans it but keeps its slot.
    pub struct NodeId;
}

impl NodeId {
    /// Used to denote that an ID does not actually identify a node in the tree
    /// and points to garbage. For example, the parent ID of a module block uses
    /// this value to signal that it does not have a parent
    pub const INVALID: Self = Self(u32::MAX);

    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }
}

simple_index! {
    /// Identifies a named storage location, function, type name or module
    pub struct SymbolId;
}

simple_index! {
    /// Identifies an entry in the type universe
    pub struct TypeId;
}
