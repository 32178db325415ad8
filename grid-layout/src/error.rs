//! Errors raised by tree mutations and the column engine.

use thiserror::Error;

use crate::dom::NodeId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LayoutError {
    #[error("node {0} does not exist in the document")]
    MissingNode(NodeId),

    #[error("node {0} is not an element")]
    NotAnElement(NodeId),

    #[error("cannot insert node {child} into node {parent}: it would create a cycle")]
    Hierarchy { parent: NodeId, child: NodeId },

    #[error("the document root cannot be moved or removed")]
    RootImmutable,

    #[error("container {container} holds no column groups to flatten")]
    NoColumns { container: NodeId },

    #[error("column count must be at least 1")]
    ZeroColumns,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectorError {
    #[error("empty selector")]
    Empty,

    #[error("unexpected character {found:?} at offset {offset} in selector {selector:?}")]
    Unexpected {
        selector: String,
        offset: usize,
        found: char,
    },

    #[error("selector {0:?} ends with a dangling combinator")]
    DanglingCombinator(String),

    #[error("unterminated attribute selector in {0:?}")]
    UnterminatedAttribute(String),
}
