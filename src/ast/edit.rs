//! In-place editing of the program tree. Statements can only be inserted into
//! or removed from blocks; everything else is rewritten by replacing the
//! content of a node's slot.

use super::{Node, NodeId, ParentedNode, Program};
use crate::error::InternalError;

impl Program {
    /// Allocates a detached node and makes it the parent of its children
    pub fn new_node(&mut self, node: Node) -> NodeId {
        let id = self.nodes.push(ParentedNode {
            parent: NodeId::INVALID,
            node,
        });
        self.adopt_children(id);

        id
    }

    fn adopt_children(&mut self, id: NodeId) {
        for child in self.children(id) {
            self.nodes[child].parent = id;
        }
    }

    /// Swaps the content of a node's slot, returning the old content. Every
    /// holder of `id` observes the new node.
    pub fn replace(&mut self, id: NodeId, node: Node) -> Node {
        let old = std::mem::replace(&mut self.nodes[id].node, node);
        self.adopt_children(id);

        old
    }

    /// Re-reads the type of the symbol a use refers to into the use's cache.
    /// Returns whether the cached type changed.
    pub fn refresh_use_type(&mut self, id: NodeId) -> bool {
        let Node::Use { symbol, .. } = self.nodes[id].node else {
            return false;
        };
        let current = self.symbols[symbol].ty;

        match &mut self.nodes[id].node {
            Node::Use { ty, .. } if *ty != current => {
                *ty = current;
                true
            }
            _ => false,
        }
    }

    fn block_body_mut(&mut self, block: NodeId) -> Result<&mut Vec<NodeId>, InternalError> {
        match &mut self.nodes[block].node {
            Node::Block { body, .. } => Ok(body),
            _ => Err(InternalError::NotInBlock { node: block }),
        }
    }

    /// The block holding a statement and the statement's position in it
    fn position_in_block(&self, statement: NodeId) -> Result<(NodeId, usize), InternalError> {
        let block = self.nodes[statement].parent;

        if !block.is_valid() {
            return Err(InternalError::DetachedNode { node: statement });
        }

        match &self.nodes[block].node {
            Node::Block { body, .. } => body
                .iter()
                .position(|id| *id == statement)
                .map(|position| (block, position))
                .ok_or(InternalError::NotInBlock { node: statement }),
            _ => Err(InternalError::NotInBlock { node: statement }),
        }
    }

    fn insert_at(&mut self, block: NodeId, position: usize, node: NodeId) -> Result<(), InternalError> {
        self.block_body_mut(block)?.insert(position, node);
        self.nodes[node].parent = block;

        Ok(())
    }

    pub fn insert_at_head(&mut self, block: NodeId, node: NodeId) -> Result<(), InternalError> {
        self.insert_at(block, 0, node)
    }

    pub fn insert_at_tail(&mut self, block: NodeId, node: NodeId) -> Result<(), InternalError> {
        let position = self.block_body_mut(block)?.len();
        self.insert_at(block, position, node)
    }

    /// Inserts `nodes` at the head of `block`, keeping their relative order
    pub fn insert_all_at_head(
        &mut self,
        block: NodeId,
        nodes: impl IntoIterator<Item = NodeId>,
    ) -> Result<(), InternalError> {
        let nodes = nodes.into_iter().collect::<Vec<_>>();

        self.block_body_mut(block)?.splice(0..0, nodes.iter().copied());
        for node in nodes {
            self.nodes[node].parent = block;
        }

        Ok(())
    }

    /// Inserts `node` right before `anchor` in the block holding `anchor`
    pub fn insert_before(&mut self, anchor: NodeId, node: NodeId) -> Result<(), InternalError> {
        let (block, position) = self.position_in_block(anchor)?;
        self.insert_at(block, position, node)
    }

    /// Detaches a statement from its block. The node keeps its slot in the
    /// arena but is no longer reachable from any module.
    pub fn remove(&mut self, statement: NodeId) -> Result<(), InternalError> {
        let (block, position) = self.position_in_block(statement)?;

        self.block_body_mut(block)?.remove(position);
        self.nodes[statement].parent = NodeId::INVALID;

        Ok(())
    }

    /// Appends a statement to a block. If the block ends in a return, the
    /// statement goes right before it.
    pub fn push_statement(&mut self, block: NodeId, node: NodeId) -> Result<NodeId, InternalError> {
        let last = self.block_body_mut(block)?.last().copied();

        match last {
            Some(last) if matches!(self.nodes[last].node, Node::Return(_)) => {
                self.insert_before(last, node)?
            }
            _ => self.insert_at_tail(block, node)?,
        }

        Ok(node)
    }
}
