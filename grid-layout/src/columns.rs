//! Splits a flat list of items into column groups and folds them back.
//!
//! Item `p` (0-based source position) lands in column `p % k`, so column 0
//! receives the first item and the earliest columns absorb the remainder when
//! `k` does not divide the item count. `flatten_columns` reads rows back across
//! the columns, which makes it the exact inverse of `distribute_into_columns`.

use serde::{Deserialize, Serialize};

use crate::dom::{Document, NodeId};
use crate::error::LayoutError;

/// Dataset key on the grid container holding the materialized column count.
pub const COLUMNS_KEY: &str = "columns";
/// Dataset key on filtered items holding their original index.
pub const POSITION_KEY: &str = "position";

/// Class tokens applied to every generated column group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnClasses {
    List(Vec<String>),
    Joined(String),
}

impl ColumnClasses {
    pub fn default_for(columns: usize) -> Self {
        ColumnClasses::List(vec!["column".to_string(), format!("size-1of{columns}")])
    }

    pub fn joined(&self) -> String {
        match self {
            ColumnClasses::List(tokens) => tokens.join(" "),
            ColumnClasses::Joined(joined) => joined.clone(),
        }
    }
}

/// Moves every child of `container` into a new detached holder tagged with
/// `columns=0` and returns the holder.
pub fn extract_items(doc: &mut Document, container: NodeId) -> Result<NodeId, LayoutError> {
    if !doc.is_element(container) {
        return Err(LayoutError::NotAnElement(container));
    }
    let holder = doc.create_element("div");
    doc.set_data(holder, COLUMNS_KEY, 0)?;
    for child in doc.take_children(container)? {
        doc.append_child(holder, child)?;
    }
    Ok(holder)
}

/// Lays the element children of `items` out into `columns` groups appended to
/// `container`. `items` is left empty; non-element children are freed with it
/// by the caller. Returns the column groups in DOM order.
pub fn distribute_into_columns(
    doc: &mut Document,
    container: NodeId,
    items: NodeId,
    columns: usize,
    classes: &ColumnClasses,
) -> Result<Vec<NodeId>, LayoutError> {
    if columns == 0 {
        return Err(LayoutError::ZeroColumns);
    }
    if !doc.is_element(container) {
        return Err(LayoutError::NotAnElement(container));
    }
    if !doc.contains(items) {
        return Err(LayoutError::MissingNode(items));
    }

    doc.set_data(container, COLUMNS_KEY, 0)?;

    let class_name = classes.joined();
    let groups: Vec<NodeId> = (0..columns)
        .map(|_| {
            let group = doc.create_element("div");
            doc.set_class(group, &class_name).map(|_| group)
        })
        .collect::<Result<_, _>>()?;

    for (position, item) in doc.element_children(items).into_iter().enumerate() {
        doc.append_child(groups[position % columns], item)?;
    }

    for &group in &groups {
        doc.append_child(container, group)?;
    }
    doc.set_data(container, COLUMNS_KEY, columns)?;

    tracing::trace!(container, columns, "distributed items into columns");
    Ok(groups)
}

/// Removes the column groups from `container` and returns a new detached
/// holder with the items back in source order. The holder and the container
/// are both tagged `columns=0`.
pub fn flatten_columns(doc: &mut Document, container: NodeId) -> Result<NodeId, LayoutError> {
    let groups = doc.element_children(container);
    if groups.is_empty() {
        return Err(LayoutError::NoColumns { container });
    }

    let count = groups.len();
    let rows = groups
        .iter()
        .map(|&group| doc.element_children(group).len())
        .max()
        .unwrap_or(0);

    let mut slots: Vec<Option<NodeId>> = vec![None; rows * count];
    for (column, &group) in groups.iter().enumerate() {
        for (row, item) in doc.element_children(group).into_iter().enumerate() {
            slots[row * count + column] = Some(item);
        }
    }

    let holder = doc.create_element("div");
    doc.set_data(holder, COLUMNS_KEY, 0)?;
    for item in slots.into_iter().flatten() {
        doc.append_child(holder, item)?;
    }

    for child in doc.take_children(container)? {
        doc.remove_subtree(child)?;
    }
    doc.set_data(container, COLUMNS_KEY, 0)?;

    tracing::trace!(container, columns = count, "flattened columns");
    Ok(holder)
}

/// Number of columns currently materialized in `container`, read back from
/// its `columns` tag.
pub fn materialized_columns(doc: &Document, container: NodeId) -> Option<usize> {
    doc.data(container, COLUMNS_KEY)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_with_items(count: usize) -> (Document, NodeId, Vec<NodeId>) {
        let mut doc = Document::new();
        let grid = doc.create_element("div");
        let root = doc.root();
        doc.append_child(root, grid).unwrap();
        let items = (0..count)
            .map(|i| {
                let item = doc.create_element("article");
                doc.set_attribute(item, "id", format!("item-{i}")).unwrap();
                doc.append_child(grid, item).unwrap();
                item
            })
            .collect();
        (doc, grid, items)
    }

    fn layout(doc: &mut Document, grid: NodeId, columns: usize) -> Vec<NodeId> {
        let holder = extract_items(doc, grid).unwrap();
        let groups =
            distribute_into_columns(doc, grid, holder, columns, &ColumnClasses::default_for(columns))
                .unwrap();
        doc.remove_subtree(holder).unwrap();
        groups
    }

    #[test]
    fn test_seven_items_three_columns() {
        let (mut doc, grid, items) = grid_with_items(7);

        let groups = layout(&mut doc, grid, 3);

        assert_eq!(doc.children(grid), groups.as_slice());
        assert_eq!(doc.children(groups[0]), &[items[0], items[3], items[6]]);
        assert_eq!(doc.children(groups[1]), &[items[1], items[4]]);
        assert_eq!(doc.children(groups[2]), &[items[2], items[5]]);
        assert_eq!(materialized_columns(&doc, grid), Some(3));
        assert_eq!(doc.attribute(groups[0], "class"), Some("column size-1of3"));

        let flat = flatten_columns(&mut doc, grid).unwrap();
        assert_eq!(doc.children(flat), items.as_slice());
        assert_eq!(materialized_columns(&doc, flat), Some(0));
        assert_eq!(materialized_columns(&doc, grid), Some(0));
        assert!(doc.children(grid).is_empty());
    }

    #[test]
    fn test_flatten_inverts_every_split() {
        for count in 0..=13 {
            for columns in 1..=6 {
                let (mut doc, grid, items) = grid_with_items(count);
                let groups = layout(&mut doc, grid, columns);

                let sizes: Vec<usize> = groups.iter().map(|&g| doc.children(g).len()).collect();
                let (min, max) = (sizes.iter().min().unwrap(), sizes.iter().max().unwrap());
                assert!(max - min <= 1, "uneven split {sizes:?}");

                let flat = flatten_columns(&mut doc, grid).unwrap();
                assert_eq!(doc.children(flat), items.as_slice(), "n={count} k={columns}");
            }
        }
    }

    #[test]
    fn test_zero_items_yield_empty_groups() {
        let (mut doc, grid, _) = grid_with_items(0);
        let groups = layout(&mut doc, grid, 4);

        assert_eq!(groups.len(), 4);
        assert!(groups.iter().all(|&g| doc.children(g).is_empty()));
    }

    #[test]
    fn test_joined_classes_are_applied_verbatim() {
        let (mut doc, grid, _) = grid_with_items(2);
        let holder = extract_items(&mut doc, grid).unwrap();
        let classes = ColumnClasses::Joined("col col--half".to_string());

        let groups = distribute_into_columns(&mut doc, grid, holder, 2, &classes).unwrap();
        assert!(doc.has_class(groups[1], "col--half"));
    }

    #[test]
    fn test_column_groups_are_freed() {
        let (mut doc, grid, _) = grid_with_items(5);
        let before = doc.len();
        layout(&mut doc, grid, 2);

        let flat = flatten_columns(&mut doc, grid).unwrap();
        doc.remove_subtree(flat).unwrap();
        // the five items went with the holder
        assert_eq!(doc.len(), before - 5);
    }

    #[test]
    fn test_preconditions() {
        let (mut doc, grid, _) = grid_with_items(0);
        assert_eq!(
            flatten_columns(&mut doc, grid).unwrap_err(),
            LayoutError::NoColumns { container: grid }
        );

        let (mut doc, grid, _) = grid_with_items(3);
        let holder = extract_items(&mut doc, grid).unwrap();
        let classes = ColumnClasses::default_for(1);
        assert_eq!(
            distribute_into_columns(&mut doc, grid, holder, 0, &classes).unwrap_err(),
            LayoutError::ZeroColumns
        );
    }

    #[test]
    fn test_column_classes_from_json() {
        let list: ColumnClasses = serde_json::from_str(r#"["a", "b"]"#).unwrap();
        let joined: ColumnClasses = serde_json::from_str(r#""a b""#).unwrap();
        assert_eq!(list.joined(), joined.joined());
    }
}
