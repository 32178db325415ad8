use std::fmt;
use std::sync::Arc;

use grid_layout::{ColumnClasses, Document, NodeId, Selector, SelectorError};
use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer};

use crate::error::GridError;
use crate::media_query::MediaQueryList;

/// Whether `setup` leaves containers that are not rendered untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VisibilityPolicy {
    #[default]
    SkipHidden,
    IgnoreHidden,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GridSettings {
    pub visibility: VisibilityPolicy,
    pub event_capacity: usize,
    pub target_fps: u32,
}

impl Default for GridSettings {
    fn default() -> Self {
        Self {
            visibility: VisibilityPolicy::SkipHidden,
            event_capacity: 256,
            target_fps: 60,
        }
    }
}

impl GridSettings {
    pub fn from_json(json: &str) -> Result<Self, GridError> {
        Ok(serde_json::from_str(json)?)
    }
}

pub type FilterFn = Arc<dyn Fn(&Document, NodeId) -> bool + Send + Sync>;

/// Picks the items that stay out of the columns.
#[derive(Clone)]
pub enum ItemFilter {
    Selector(Selector),
    Predicate(FilterFn),
}

impl ItemFilter {
    pub fn selector(selector: &str) -> Result<Self, SelectorError> {
        Selector::parse(selector).map(ItemFilter::Selector)
    }

    pub fn predicate<F>(predicate: F) -> Self
    where
        F: Fn(&Document, NodeId) -> bool + Send + Sync + 'static,
    {
        ItemFilter::Predicate(Arc::new(predicate))
    }

    pub fn matches(&self, doc: &Document, id: NodeId) -> bool {
        match self {
            ItemFilter::Selector(selector) => selector.matches(doc, id),
            ItemFilter::Predicate(predicate) => predicate(doc, id),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            ItemFilter::Selector(selector) => selector.to_string(),
            ItemFilter::Predicate(_) => "<predicate>".to_string(),
        }
    }
}

impl fmt::Debug for ItemFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemFilter::Selector(selector) => f.debug_tuple("Selector").field(&selector.as_str()).finish(),
            ItemFilter::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

impl PartialEq for ItemFilter {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ItemFilter::Selector(a), ItemFilter::Selector(b)) => a == b,
            (ItemFilter::Predicate(a), ItemFilter::Predicate(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl<'de> Deserialize<'de> for ItemFilter {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let source = String::deserialize(deserializer)?;
        ItemFilter::selector(&source).map_err(de::Error::custom)
    }
}

/// Column configuration applied while a breakpoint matches.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridOptions {
    pub columns: usize,
    #[serde(default)]
    pub column_classes: Option<ColumnClasses>,
    #[serde(default)]
    pub filter: Option<ItemFilter>,
}

impl GridOptions {
    pub fn new(columns: usize) -> Self {
        Self {
            columns,
            column_classes: None,
            filter: None,
        }
    }

    pub fn with_column_classes(mut self, classes: ColumnClasses) -> Self {
        self.column_classes = Some(classes);
        self
    }

    pub fn with_filter(mut self, filter: ItemFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// The classes to put on column groups: the configured ones or `column size-1of<N>`.
    pub fn resolved_classes(&self) -> ColumnClasses {
        self.column_classes
            .clone()
            .unwrap_or_else(|| ColumnClasses::default_for(self.columns))
    }

    pub fn validate(&self) -> Result<(), GridError> {
        if self.columns == 0 {
            return Err(GridError::InvalidArgument(
                "column count must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Media query string to column configuration. Keys are unique and keep
/// their insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BreakpointMap {
    entries: Vec<(String, GridOptions)>,
}

impl BreakpointMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the configuration for `query`.
    pub fn insert(&mut self, query: impl Into<String>, options: GridOptions) {
        let query = query.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == query) {
            Some((_, slot)) => *slot = options,
            None => self.entries.push((query, options)),
        }
    }

    pub fn with(mut self, query: impl Into<String>, options: GridOptions) -> Self {
        self.insert(query, options);
        self
    }

    pub fn get(&self, query: &str) -> Option<&GridOptions> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == query)
            .map(|(_, options)| options)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &GridOptions)> {
        self.entries.iter().map(|(query, options)| (query.as_str(), options))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Checks every query parses and every column count is usable.
    pub fn validate(&self) -> Result<(), GridError> {
        for (query, options) in &self.entries {
            MediaQueryList::parse(query)
                .map_err(|err| GridError::InvalidArgument(format!("{query:?}: {err}")))?;
            options
                .validate()
                .map_err(|err| GridError::InvalidArgument(format!("{query:?}: {err}")))?;
        }
        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self, GridError> {
        Ok(serde_json::from_str(json)?)
    }
}

impl<'de> Deserialize<'de> for BreakpointMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct BreakpointVisitor;

        impl<'de> Visitor<'de> for BreakpointVisitor {
            type Value = BreakpointMap;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an object mapping media queries to column options")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut map = BreakpointMap::new();
                while let Some((query, options)) = access.next_entry::<String, GridOptions>()? {
                    map.insert(query, options);
                }
                Ok(map)
            }
        }

        deserializer.deserialize_map(BreakpointVisitor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsertMethod {
    #[default]
    Append,
    Prepend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct AddItemsOptions {
    pub method: InsertMethod,
    pub clone: bool,
}

impl AddItemsOptions {
    pub fn prepend() -> Self {
        Self {
            method: InsertMethod::Prepend,
            ..Self::default()
        }
    }

    pub fn cloned(mut self) -> Self {
        self.clone = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_breakpoints_keep_document_order() {
        let map = BreakpointMap::from_json(
            r#"{
                "(min-width: 1024px)": { "columns": 4 },
                "(max-width: 767px)": { "columns": 1, "filter": ".promo" },
                "(min-width: 768px) and (max-width: 1023px)": {
                    "columns": 2,
                    "columnClasses": ["col", "col--half"]
                }
            }"#,
        )
        .unwrap();

        let queries: Vec<&str> = map.iter().map(|(query, _)| query).collect();
        assert_eq!(
            queries,
            vec!["(min-width: 1024px)", "(max-width: 767px)", "(min-width: 768px) and (max-width: 1023px)"]
        );
        assert_eq!(map.get("(max-width: 767px)").unwrap().filter.as_ref().unwrap().describe(), ".promo");
        assert_eq!(
            map.get("(min-width: 768px) and (max-width: 1023px)").unwrap().resolved_classes().joined(),
            "col col--half"
        );
        assert!(map.validate().is_ok());
    }

    #[test]
    fn test_insert_replaces_existing_key() {
        let map = BreakpointMap::new()
            .with("(min-width: 1px)", GridOptions::new(2))
            .with("(min-width: 1px)", GridOptions::new(3));
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("(min-width: 1px)").unwrap().columns, 3);
    }

    #[test]
    fn test_validation_rejects_bad_entries() {
        let zero = BreakpointMap::new().with("(min-width: 1px)", GridOptions::new(0));
        assert!(matches!(zero.validate(), Err(GridError::InvalidArgument(_))));

        let bad_query = BreakpointMap::new().with("(colour)", GridOptions::new(2));
        assert!(matches!(bad_query.validate(), Err(GridError::InvalidArgument(_))));
    }

    #[test]
    fn test_invalid_json_is_a_config_error() {
        assert!(matches!(
            BreakpointMap::from_json(r#"["(min-width: 1px)"]"#),
            Err(GridError::Config(_))
        ));
        assert!(BreakpointMap::from_json(r#"{"(min-width: 1px)": {"columns": 2, "filter": "div >"}}"#).is_err());
    }

    #[test]
    fn test_default_resolved_classes() {
        assert_eq!(GridOptions::new(3).resolved_classes().joined(), "column size-1of3");
    }

    #[test]
    fn test_add_items_options_tokens() {
        let options: AddItemsOptions = serde_json::from_str(r#"{"method": "prepend"}"#).unwrap();
        assert_eq!(options, AddItemsOptions::prepend());
        assert!(serde_json::from_str::<AddItemsOptions>(r#"{"method": "after"}"#).is_err());
        assert_eq!(AddItemsOptions::default().method, InsertMethod::Append);
    }

    #[test]
    fn test_settings_defaults_and_overrides() {
        let settings = GridSettings::from_json(r#"{"visibility": "ignore-hidden"}"#).unwrap();
        assert_eq!(settings.visibility, VisibilityPolicy::IgnoreHidden);
        assert_eq!(settings.event_capacity, 256);
    }

    #[test]
    fn test_predicate_filters_compare_by_identity() {
        let filter = ItemFilter::predicate(|doc, id| doc.has_class(id, "x"));
        let same = filter.clone();
        let other = ItemFilter::predicate(|doc, id| doc.has_class(id, "x"));
        assert_eq!(filter, same);
        assert_ne!(filter, other);
        assert_eq!(ItemFilter::selector(".a").unwrap(), ItemFilter::selector(".a").unwrap());
    }
}
