pub mod dom;
pub mod selector;
pub mod columns;
pub mod error;

pub use dom::{Document, DocumentLock, Node, NodeData, NodeId, SharedDocument};
pub use selector::Selector;
pub use columns::{
    distribute_into_columns, extract_items, flatten_columns, materialized_columns,
    ColumnClasses, COLUMNS_KEY, POSITION_KEY,
};
pub use error::{LayoutError, SelectorError};
