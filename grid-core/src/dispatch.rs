//! The registry every grid on a page is created and torn down through.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use grid_layout::{DocumentLock, NodeId, Selector, SharedDocument};
use grid_reactive::{completion, Completion, FanIn, FrameScheduler};
use tokio::sync::broadcast;

use crate::config::{AddItemsOptions, BreakpointMap, GridSettings};
use crate::error::GridError;
use crate::event::GridEvent;
use crate::grid::GridContext;
use crate::handler::GridHandler;
use crate::media_query::MediaQueries;

type HandlerMap = BTreeMap<String, Arc<Mutex<GridHandler>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// The elements handed to [`GridDispatch::add_items`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemSource {
    Selector(String),
    Node(NodeId),
    Nodes(Vec<NodeId>),
}

impl From<&str> for ItemSource {
    fn from(selector: &str) -> Self {
        ItemSource::Selector(selector.to_string())
    }
}

impl From<String> for ItemSource {
    fn from(selector: String) -> Self {
        ItemSource::Selector(selector)
    }
}

impl From<NodeId> for ItemSource {
    fn from(node: NodeId) -> Self {
        ItemSource::Node(node)
    }
}

impl From<Vec<NodeId>> for ItemSource {
    fn from(nodes: Vec<NodeId>) -> Self {
        ItemSource::Nodes(nodes)
    }
}

impl From<&[NodeId]> for ItemSource {
    fn from(nodes: &[NodeId]) -> Self {
        ItemSource::Nodes(nodes.to_vec())
    }
}

/// Maps selectors to their [`GridHandler`]s.
pub struct GridDispatch {
    context: Arc<GridContext>,
    media: MediaQueries,
    grids: Arc<Mutex<HandlerMap>>,
}

impl fmt::Debug for GridDispatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GridDispatch")
            .field("selectors", &self.selectors())
            .field("viewport", &self.media.viewport())
            .finish_non_exhaustive()
    }
}

impl GridDispatch {
    pub fn new(document: SharedDocument, media: MediaQueries, settings: GridSettings) -> Self {
        Self {
            context: GridContext::new(document, settings),
            media,
            grids: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    pub fn context(&self) -> &Arc<GridContext> {
        &self.context
    }

    pub fn document(&self) -> &SharedDocument {
        &self.context.document
    }

    pub fn scheduler(&self) -> &Arc<FrameScheduler> {
        &self.context.scheduler
    }

    pub fn media(&self) -> &MediaQueries {
        &self.media
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GridEvent> {
        self.context.events.subscribe()
    }

    /// Registered selectors, ready or not.
    pub fn selectors(&self) -> Vec<String> {
        lock(&self.grids).keys().cloned().collect()
    }

    pub fn handler(&self, selector: &str) -> Option<Arc<Mutex<GridHandler>>> {
        lock(&self.grids).get(selector).cloned()
    }

    /// Registers a handler for `selector`. Calling it again for a selector that
    /// is already registered does nothing, and so does a selector that matches
    /// no element.
    pub fn init(&self, selector: &str, breakpoints: BreakpointMap) -> Result<&Self, GridError> {
        if selector.trim().is_empty() {
            return Err(GridError::InvalidArgument("selector must not be empty".to_string()));
        }
        let parsed = Selector::parse(selector)
            .map_err(|err| GridError::InvalidArgument(format!("{selector:?}: {err}")))?;
        breakpoints.validate()?;

        let mut grids = lock(&self.grids);
        if grids.contains_key(selector) {
            tracing::debug!(selector, "grid already initialized");
            return Ok(self);
        }

        let matched = self.context.document.read_doc().query_selector_all(&parsed).len();
        if matched == 0 {
            tracing::debug!(selector, "no elements match, skipping registration");
            return Ok(self);
        }

        let mut handler = GridHandler::new(selector, breakpoints);
        handler.register(&self.context, &self.media)?;
        grids.insert(selector.to_string(), Arc::new(Mutex::new(handler)));
        drop(grids);

        tracing::debug!(selector, matched, "grid initialized");
        self.context.events.emit(GridEvent::Init {
            selectors: vec![selector.to_string()],
        });
        Ok(self)
    }

    /// Tears down the handlers for `selectors`, or every handler when the
    /// slice is empty. Each handler leaves the registry once its grids are
    /// restored; `grid:destroy` fires once after the last one.
    pub fn destroy(&self, selectors: &[&str]) -> Completion<Vec<String>> {
        let (completer, done) = completion();
        self.destroy_with(selectors, move |destroyed| completer.complete(destroyed));
        done
    }

    pub fn destroy_with<F>(&self, selectors: &[&str], on_done: F)
    where
        F: FnOnce(Vec<String>) + Send + 'static,
    {
        let targets: Vec<(String, Arc<Mutex<GridHandler>>)> = {
            let grids = lock(&self.grids);
            if selectors.is_empty() {
                grids
                    .iter()
                    .map(|(selector, handler)| (selector.clone(), Arc::clone(handler)))
                    .collect()
            } else {
                selectors
                    .iter()
                    .filter_map(|&selector| {
                        grids
                            .get(selector)
                            .map(|handler| (selector.to_string(), Arc::clone(handler)))
                    })
                    .collect()
            }
        };

        if targets.is_empty() {
            tracing::debug!(?selectors, "nothing to destroy");
            on_done(Vec::new());
            return;
        }

        let destroyed: Vec<String> = targets.iter().map(|(selector, _)| selector.clone()).collect();
        let context = Arc::clone(&self.context);
        let fan_in = FanIn::new(targets.len(), move || {
            tracing::debug!(selectors = ?destroyed, "grids destroyed");
            context.events.emit(GridEvent::Destroy {
                selectors: destroyed.clone(),
            });
            on_done(destroyed);
        });

        for (selector, handler) in targets {
            let grids = Arc::clone(&self.grids);
            let fan_in = fan_in.clone();
            lock(&handler).unregister_with(&self.media, move || {
                lock(&grids).remove(&selector);
                fan_in.arrive();
            });
        }
    }

    /// Selectors whose handler is ready.
    pub fn ready(&self) -> Vec<String> {
        let handlers: Vec<(String, Arc<Mutex<GridHandler>>)> = lock(&self.grids)
            .iter()
            .map(|(selector, handler)| (selector.clone(), Arc::clone(handler)))
            .collect();
        handlers
            .into_iter()
            .filter(|(_, handler)| lock(handler).is_ready())
            .map(|(selector, _)| selector)
            .collect()
    }

    /// Readiness of one selector's handler, `None` when it is not registered.
    pub fn is_ready(&self, selector: &str) -> Option<bool> {
        let handler = self.handler(selector)?;
        let ready = lock(&handler).is_ready();
        Some(ready)
    }

    /// Inserts `items` into every grid registered under `selector`. Every item
    /// is validated before any grid is touched. The completion resolves with
    /// the number of grids that took the items.
    pub fn add_items(
        &self,
        selector: &str,
        items: impl Into<ItemSource>,
        options: AddItemsOptions,
    ) -> Result<Completion<usize>, GridError> {
        let handler = self.handler(selector).ok_or_else(|| GridError::NotFound {
            selector: selector.to_string(),
        })?;
        let items = self.resolve_items(items.into())?;
        let grids = lock(&handler).grids().to_vec();

        let (completer, done) = completion();
        let added = Arc::new(AtomicUsize::new(0));
        let total = Arc::clone(&added);
        let fan_in = FanIn::new(grids.len(), move || {
            completer.complete(total.load(Ordering::SeqCst));
        });

        tracing::debug!(selector, items = items.len(), grids = grids.len(), ?options, "adding items");
        for grid in grids {
            let added = Arc::clone(&added);
            let fan_in = fan_in.clone();
            grid.add_items_with(items.clone(), options, move |ok| {
                if ok {
                    added.fetch_add(1, Ordering::SeqCst);
                }
                fan_in.arrive();
            });
        }
        Ok(done)
    }

    fn resolve_items(&self, source: ItemSource) -> Result<Vec<NodeId>, GridError> {
        let doc = self.context.document.read_doc();
        let items = match source {
            ItemSource::Selector(selector) => {
                let parsed = Selector::parse(&selector)
                    .map_err(|err| GridError::TypeMismatch(format!("{selector:?}: {err}")))?;
                doc.query_selector_all(&parsed)
            }
            ItemSource::Node(node) => vec![node],
            ItemSource::Nodes(nodes) => nodes,
        };

        if items.is_empty() {
            return Err(GridError::TypeMismatch("no elements to add".to_string()));
        }
        if let Some(&invalid) = items.iter().find(|&&item| !doc.is_element(item)) {
            return Err(GridError::TypeMismatch(format!("node {invalid} is not an element")));
        }
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GridOptions;
    use crate::media_query::ViewportSize;
    use grid_layout::Document;
    use grid_reactive::drain;

    struct Page {
        dispatch: GridDispatch,
        grids: Vec<NodeId>,
        loose: NodeId,
    }

    /// Two `.grid` containers (`#a`, `#b`) with four items each and a loose
    /// `.extra` element outside both.
    fn page() -> Page {
        let mut doc = Document::new();
        let root = doc.root();
        let grids = ["a", "b"]
            .into_iter()
            .map(|id| {
                let grid = doc.create_element("section");
                doc.set_attribute(grid, "id", id).unwrap();
                doc.set_class(grid, "grid").unwrap();
                doc.append_child(root, grid).unwrap();
                for _ in 0..4 {
                    let item = doc.create_element("div");
                    doc.set_class(item, "box").unwrap();
                    doc.append_child(grid, item).unwrap();
                }
                grid
            })
            .collect();
        let loose = doc.create_element("div");
        doc.set_class(loose, "extra").unwrap();
        doc.append_child(root, loose).unwrap();

        let media = MediaQueries::new(ViewportSize::new(1280.0, 800.0));
        Page {
            dispatch: GridDispatch::new(doc.into_shared(), media, GridSettings::default()),
            grids,
            loose,
        }
    }

    fn two_columns() -> BreakpointMap {
        BreakpointMap::new().with("(min-width: 1px)", GridOptions::new(2))
    }

    #[test]
    fn test_init_registers_and_sets_up() {
        let page = page();
        let mut events = page.dispatch.subscribe();

        page.dispatch.init(".grid", two_columns()).unwrap();
        assert_eq!(page.dispatch.selectors(), vec![".grid".to_string()]);
        assert_eq!(page.dispatch.ready(), vec![".grid".to_string()]);
        assert_eq!(page.dispatch.is_ready(".grid"), Some(true));

        page.dispatch.scheduler().run_frame();
        let doc = page.dispatch.document().read_doc();
        assert!(page.grids.iter().all(|&grid| doc.element_children(grid).len() == 2));
        drop(doc);

        let names: Vec<&str> = drain(&mut events).iter().map(GridEvent::name).collect();
        assert_eq!(names[0], "grid:init");
        assert_eq!(names.iter().filter(|&&name| name == "grid:setup").count(), 2);
    }

    #[test]
    fn test_init_is_idempotent() {
        let page = page();
        page.dispatch.init("#a", two_columns()).unwrap();
        let first = page.dispatch.handler("#a").unwrap();
        let mut events = page.dispatch.subscribe();

        page.dispatch
            .init("#a", BreakpointMap::new().with("(min-width: 1px)", GridOptions::new(3)))
            .unwrap();

        assert!(Arc::ptr_eq(&first, &page.dispatch.handler("#a").unwrap()));
        assert!(drain(&mut events).is_empty());
        assert_eq!(page.dispatch.media().subscription_count(), 1);
    }

    #[test]
    fn test_init_without_matching_elements_skips() {
        let page = page();
        let mut events = page.dispatch.subscribe();

        page.dispatch
            .init("#g", BreakpointMap::new().with("(max-width:1px)", GridOptions::new(2)))
            .unwrap();

        assert!(page.dispatch.handler("#g").is_none());
        assert!(page.dispatch.selectors().is_empty());
        assert!(drain(&mut events).is_empty());
    }

    #[test]
    fn test_init_rejects_bad_arguments() {
        let page = page();
        assert!(page.dispatch.init("", two_columns()).unwrap_err().is_invalid_argument());
        assert!(page.dispatch.init("  ", two_columns()).unwrap_err().is_invalid_argument());
        assert!(page.dispatch.init("div >", two_columns()).unwrap_err().is_invalid_argument());

        let zero = BreakpointMap::new().with("(min-width: 1px)", GridOptions::new(0));
        assert!(page.dispatch.init(".grid", zero).unwrap_err().is_invalid_argument());
        assert!(page.dispatch.selectors().is_empty());
    }

    #[test]
    fn test_ready_sentinels() {
        let page = page();
        assert!(page.dispatch.ready().is_empty());
        assert_eq!(page.dispatch.is_ready("#a"), None);
    }

    #[test]
    fn test_debug_lists_selectors() {
        let page = page();
        page.dispatch.init("#b", two_columns()).unwrap();

        let printed = format!("{:?}", page.dispatch);
        assert!(printed.starts_with("GridDispatch"));
        assert!(printed.contains("\"#b\""));
    }

    #[test]
    fn test_destroy_fires_once_after_every_handler() {
        let page = page();
        page.dispatch.init("#a", two_columns()).unwrap();
        page.dispatch.init("#b", two_columns()).unwrap();
        page.dispatch.scheduler().run_frame();
        let mut events = page.dispatch.subscribe();

        let mut done = page.dispatch.destroy(&[]);
        assert_eq!(done.try_take(), None);
        assert_eq!(page.dispatch.selectors().len(), 2);

        page.dispatch.scheduler().run_frame();
        let mut destroyed = done.try_take().unwrap();
        destroyed.sort();
        assert_eq!(destroyed, vec!["#a".to_string(), "#b".to_string()]);
        assert!(page.dispatch.selectors().is_empty());

        let received = drain(&mut events);
        let destroys: Vec<&GridEvent> =
            received.iter().filter(|event| event.name() == "grid:destroy").collect();
        assert_eq!(destroys.len(), 1);
        assert_eq!(received.last().map(GridEvent::name), Some("grid:destroy"));
        assert_eq!(received.iter().filter(|event| event.name() == "grid:restore").count(), 2);

        let doc = page.dispatch.document().read_doc();
        assert!(page.grids.iter().all(|&grid| doc.element_children(grid).len() == 4));
    }

    #[test]
    fn test_destroy_named_selectors_only() {
        let page = page();
        page.dispatch.init("#a", two_columns()).unwrap();
        page.dispatch.init("#b", two_columns()).unwrap();
        page.dispatch.scheduler().run_frame();

        let mut done = page.dispatch.destroy(&["#b", "#unknown"]);
        page.dispatch.scheduler().run_frame();

        assert_eq!(done.try_take(), Some(vec!["#b".to_string()]));
        assert_eq!(page.dispatch.selectors(), vec!["#a".to_string()]);
        assert_eq!(page.dispatch.media().subscription_count(), 1);
    }

    #[test]
    fn test_destroy_with_nothing_registered() {
        let page = page();
        let mut events = page.dispatch.subscribe();

        let mut done = page.dispatch.destroy(&[]);
        assert_eq!(done.try_take(), Some(Vec::new()));
        assert!(drain(&mut events).is_empty());
    }

    #[test]
    fn test_add_items_to_missing_grid() {
        let page = page();
        let html = |page: &Page| {
            let doc = page.dispatch.document().read_doc();
            doc.to_html(doc.root())
        };
        let before = html(&page);

        let err = page
            .dispatch
            .add_items("#missing", page.loose, AddItemsOptions::default())
            .unwrap_err();

        assert!(matches!(err, GridError::NotFound { ref selector } if selector == "#missing"));
        assert_eq!(html(&page), before);
    }

    #[test]
    fn test_add_items_rejects_non_elements() {
        let page = page();
        page.dispatch.init("#a", two_columns()).unwrap();
        page.dispatch.scheduler().run_frame();
        let text = page.dispatch.document().write_doc().create_text("loose text");

        let options = AddItemsOptions::default();
        for source in [
            ItemSource::Nodes(vec![page.loose, text]),
            ItemSource::Node(9_999),
            ItemSource::Nodes(Vec::new()),
            ItemSource::from(".nothing-here"),
        ] {
            let err = page.dispatch.add_items("#a", source, options).unwrap_err();
            assert!(matches!(err, GridError::TypeMismatch(_)));
        }
        assert_eq!(page.dispatch.scheduler().pending(), 0);
    }

    #[test]
    fn test_add_items_by_selector() {
        let page = page();
        page.dispatch.init("#a", two_columns()).unwrap();
        page.dispatch.scheduler().run_frame();
        let mut events = page.dispatch.subscribe();

        let mut done = page
            .dispatch
            .add_items("#a", ".extra", AddItemsOptions::prepend())
            .unwrap();
        page.dispatch.scheduler().run_frame();
        assert_eq!(done.try_take(), Some(1));
        assert_eq!(drain(&mut events).len(), 1);

        let mut destroyed = page.dispatch.destroy(&["#a"]);
        page.dispatch.scheduler().run_frame();
        assert!(destroyed.try_take().is_some());

        let doc = page.dispatch.document().read_doc();
        let children = doc.element_children(page.grids[0]);
        assert_eq!(children.len(), 5);
        assert_eq!(children[0], page.loose);
    }

    #[tokio::test]
    async fn test_add_items_fans_out_to_every_grid() {
        let page = page();
        page.dispatch.init(".grid", two_columns()).unwrap();
        page.dispatch.scheduler().run_frame();

        let done = page
            .dispatch
            .add_items(".grid", page.loose, AddItemsOptions::default().cloned())
            .unwrap();
        page.dispatch.scheduler().run_frame();

        assert_eq!(done.await, Ok(2));
        let doc = page.dispatch.document().read_doc();
        assert_eq!(doc.parent(page.loose), Some(doc.root()));
        let selector = Selector::parse(".grid .extra").unwrap();
        assert_eq!(doc.query_selector_all(&selector).len(), 2);
    }
}
