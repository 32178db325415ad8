//! One grid container and its lifecycle.
//!
//! A [`Grid`] is uninitialized until its first successful `setup`, active
//! while its items sit in column groups, and uninitialized again once
//! `restore` has put the items back. Every mutation is deferred to the next
//! frame of the shared [`FrameScheduler`]; the returned [`Completion`]
//! resolves after the DOM has been updated.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use grid_layout::{
    distribute_into_columns, extract_items, flatten_columns, ColumnClasses, Document,
    DocumentLock, LayoutError, NodeId, SharedDocument, COLUMNS_KEY, POSITION_KEY,
};
use grid_reactive::{completion, Completion, EventBus, FrameScheduler};

use crate::config::{AddItemsOptions, GridOptions, GridSettings, InsertMethod, ItemFilter, VisibilityPolicy};
use crate::event::GridEvent;

/// Everything the grids of one registry share.
pub struct GridContext {
    pub document: SharedDocument,
    pub scheduler: Arc<FrameScheduler>,
    pub events: EventBus<GridEvent>,
    pub settings: GridSettings,
}

impl GridContext {
    pub fn new(document: SharedDocument, settings: GridSettings) -> Arc<Self> {
        Arc::new(Self {
            document,
            scheduler: Arc::new(FrameScheduler::new(settings.target_fps)),
            events: EventBus::new(settings.event_capacity),
            settings,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridStatus {
    Uninitialized,
    Active,
}

/// Point-in-time view of a grid, attached to `grid:addItems`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridSnapshot {
    pub element: NodeId,
    pub columns: Option<usize>,
    pub status: GridStatus,
    pub filtered_items: usize,
}

/// Column counts on either side of a redraw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Redrawn {
    pub from: Option<usize>,
    pub to: usize,
    /// False when the layout already matched and was left alone.
    pub relaid: bool,
}

struct GridState {
    columns: Option<usize>,
    status: GridStatus,
    column_classes: Option<ColumnClasses>,
    filter: Option<ItemFilter>,
    filtered_items: Vec<NodeId>,
    setup_pending: bool,
}

#[derive(Clone)]
pub struct Grid {
    element: NodeId,
    state: Arc<Mutex<GridState>>,
    context: Arc<GridContext>,
}

impl fmt::Debug for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Grid")
            .field("element", &self.element)
            .field("columns", &self.columns())
            .field("status", &self.status())
            .finish()
    }
}

impl Grid {
    pub fn new(element: NodeId, context: Arc<GridContext>) -> Self {
        Self {
            element,
            state: Arc::new(Mutex::new(GridState {
                columns: None,
                status: GridStatus::Uninitialized,
                column_classes: None,
                filter: None,
                filtered_items: Vec::new(),
                setup_pending: false,
            })),
            context,
        }
    }

    fn state(&self) -> MutexGuard<'_, GridState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn element(&self) -> NodeId {
        self.element
    }

    pub fn context(&self) -> &Arc<GridContext> {
        &self.context
    }

    pub fn columns(&self) -> Option<usize> {
        self.state().columns
    }

    pub fn status(&self) -> GridStatus {
        self.state().status
    }

    pub fn is_active(&self) -> bool {
        self.status() == GridStatus::Active
    }

    pub fn column_classes(&self) -> Option<ColumnClasses> {
        self.state().column_classes.clone()
    }

    /// Items currently held out of the columns, in the order they were filtered.
    pub fn filtered_items(&self) -> Vec<NodeId> {
        self.state().filtered_items.clone()
    }

    pub fn snapshot(&self) -> GridSnapshot {
        let state = self.state();
        GridSnapshot {
            element: self.element,
            columns: state.columns,
            status: state.status,
            filtered_items: state.filtered_items.len(),
        }
    }

    /// Lays the container out into columns. Resolves to `false` without
    /// touching anything if the options are invalid, if the grid is already
    /// set up (or about to be), or if the container is hidden and the settings
    /// skip hidden containers.
    pub fn setup(&self, options: GridOptions) -> Completion<bool> {
        let (completer, done) = completion();
        self.setup_with(options, move |applied| completer.complete(applied));
        done
    }

    pub fn setup_with<F>(&self, options: GridOptions, on_done: F)
    where
        F: FnOnce(bool) + Send + 'static,
    {
        if let Err(err) = options.validate() {
            tracing::warn!(element = self.element, error = %err, "grid setup rejected");
            on_done(false);
            return;
        }
        {
            let mut state = self.state();
            if state.status == GridStatus::Active || state.setup_pending {
                tracing::debug!(element = self.element, "grid already set up");
                drop(state);
                on_done(false);
                return;
            }
            if self.context.settings.visibility == VisibilityPolicy::SkipHidden
                && !self.context.document.read_doc().is_rendered(self.element)
            {
                tracing::debug!(element = self.element, "skipping setup of hidden grid");
                drop(state);
                on_done(false);
                return;
            }
            state.setup_pending = true;
        }

        let grid = self.clone();
        self.context.scheduler.schedule_for_next_frame(move || {
            let result = {
                let mut guard = grid.state();
                let state = &mut *guard;
                state.setup_pending = false;
                if state.status == GridStatus::Active {
                    None
                } else {
                    let mut doc = grid.context.document.write_doc();
                    Some(grid.apply_setup(&mut doc, state, &options))
                }
            };

            match result {
                Some(Ok(())) => {
                    tracing::debug!(element = grid.element, columns = options.columns, "grid set up");
                    grid.context.events.emit(GridEvent::Setup {
                        element: grid.element,
                        columns: options.columns,
                        filter: options.filter.as_ref().map(ItemFilter::describe),
                    });
                    on_done(true);
                }
                Some(Err(err)) => {
                    tracing::warn!(element = grid.element, error = %err, "grid setup failed");
                    on_done(false);
                }
                None => on_done(false),
            }
        });
    }

    fn apply_setup(
        &self,
        doc: &mut Document,
        state: &mut GridState,
        options: &GridOptions,
    ) -> Result<(), LayoutError> {
        let items = extract_items(doc, self.element)?;
        self.lay_out_or_abandon(doc, state, items, options)?;
        state.status = GridStatus::Active;
        Ok(())
    }

    /// Filters `items` and distributes the rest, then frees the holder and
    /// records the layout in `state`.
    fn lay_out(
        &self,
        doc: &mut Document,
        state: &mut GridState,
        items: NodeId,
        options: &GridOptions,
    ) -> Result<(), LayoutError> {
        if options.columns == 0 {
            return Err(LayoutError::ZeroColumns);
        }
        filter_items(doc, items, options.filter.as_ref(), &mut state.filtered_items)?;
        let classes = options.resolved_classes();
        distribute_into_columns(doc, self.element, items, options.columns, &classes)?;
        doc.remove_subtree(items)?;

        state.columns = Some(options.columns);
        state.column_classes = Some(classes);
        state.filter = options.filter.clone();
        Ok(())
    }

    fn lay_out_or_abandon(
        &self,
        doc: &mut Document,
        state: &mut GridState,
        items: NodeId,
        options: &GridOptions,
    ) -> Result<(), LayoutError> {
        if let Err(err) = self.lay_out(doc, state, items, options) {
            self.abandon(doc, state, items);
            return Err(err);
        }
        Ok(())
    }

    /// Puts every item of `holder`, filtered ones included, back under the
    /// container in source order and drops the grid to uninitialized. Used
    /// when a layout fails after the items were taken out of the container.
    fn abandon(&self, doc: &mut Document, state: &mut GridState, holder: NodeId) {
        let returned = restore_filtered(doc, holder, &mut state.filtered_items).and_then(|_| {
            for child in doc.take_children(holder)? {
                doc.append_child(self.element, child)?;
            }
            doc.remove_subtree(holder)
        });
        if let Err(err) = returned {
            tracing::error!(element = self.element, error = %err, "could not return items to grid");
        }
        doc.remove_data(self.element, COLUMNS_KEY);

        state.status = GridStatus::Uninitialized;
        state.columns = None;
        state.column_classes = None;
        state.filter = None;
        tracing::warn!(element = self.element, "grid reset after failed layout");
    }

    /// Takes the columns apart and returns a holder with every item,
    /// filtered ones included, back in source order.
    fn gather(&self, doc: &mut Document, state: &mut GridState) -> Result<NodeId, LayoutError> {
        let items = flatten_columns(doc, self.element)?;
        restore_filtered(doc, items, &mut state.filtered_items)?;
        Ok(items)
    }

    /// Re-lays the grid out for `options`. The layout is only rebuilt when the
    /// column count, column classes or filter differ from the current ones; a
    /// `grid:redraw` event fires either way. Resolves to `None` when the grid
    /// is not active or the options are invalid.
    pub fn redraw(&self, options: GridOptions) -> Completion<Option<Redrawn>> {
        let (completer, done) = completion();
        self.redraw_with(options, move |redrawn| completer.complete(redrawn));
        done
    }

    pub fn redraw_with<F>(&self, options: GridOptions, on_done: F)
    where
        F: FnOnce(Option<Redrawn>) + Send + 'static,
    {
        if let Err(err) = options.validate() {
            tracing::warn!(element = self.element, error = %err, "grid redraw rejected");
            on_done(None);
            return;
        }

        let grid = self.clone();
        self.context.scheduler.schedule_for_next_frame(move || {
            let result = {
                let mut guard = grid.state();
                let state = &mut *guard;
                if state.status != GridStatus::Active {
                    None
                } else {
                    let mut doc = grid.context.document.write_doc();
                    Some(grid.apply_redraw(&mut doc, state, &options))
                }
            };

            match result {
                Some(Ok(redrawn)) => {
                    if redrawn.relaid {
                        tracing::debug!(element = grid.element, from = ?redrawn.from, to = redrawn.to, "grid redrawn");
                    } else {
                        tracing::debug!(element = grid.element, columns = redrawn.to, "redraw skipped, layout unchanged");
                    }
                    grid.context.events.emit(GridEvent::Redraw {
                        element: grid.element,
                        from: redrawn.from,
                        to: redrawn.to,
                        filter: options.filter.as_ref().map(ItemFilter::describe),
                    });
                    on_done(Some(redrawn));
                }
                Some(Err(err)) => {
                    tracing::warn!(element = grid.element, error = %err, "grid redraw failed");
                    on_done(None);
                }
                None => {
                    tracing::debug!(element = grid.element, "redraw ignored, grid not set up");
                    on_done(None);
                }
            }
        });
    }

    fn apply_redraw(
        &self,
        doc: &mut Document,
        state: &mut GridState,
        options: &GridOptions,
    ) -> Result<Redrawn, LayoutError> {
        let from = state.columns;
        let unchanged = from == Some(options.columns)
            && state.column_classes.as_ref() == Some(&options.resolved_classes())
            && state.filter == options.filter;
        if unchanged {
            return Ok(Redrawn { from, to: options.columns, relaid: false });
        }

        let items = self.gather(doc, state)?;
        self.lay_out_or_abandon(doc, state, items, options)?;
        Ok(Redrawn { from, to: options.columns, relaid: true })
    }

    /// Puts every item back as a direct child of the container in its
    /// original order and strips the `columns` tag. Resolves to `false` when
    /// the grid is not active.
    pub fn restore(&self) -> Completion<bool> {
        let (completer, done) = completion();
        self.restore_with(move |restored| completer.complete(restored));
        done
    }

    pub fn restore_with<F>(&self, on_done: F)
    where
        F: FnOnce(bool) + Send + 'static,
    {
        let grid = self.clone();
        self.context.scheduler.schedule_for_next_frame(move || {
            let result = {
                let mut guard = grid.state();
                let state = &mut *guard;
                if state.status != GridStatus::Active {
                    None
                } else {
                    let from = state.columns;
                    let mut doc = grid.context.document.write_doc();
                    let restored = grid.gather(&mut doc, state).and_then(|items| {
                        for child in doc.take_children(items)? {
                            doc.append_child(grid.element, child)?;
                        }
                        doc.remove_subtree(items)?;
                        doc.remove_data(grid.element, COLUMNS_KEY);
                        Ok(from)
                    });
                    if restored.is_ok() {
                        state.status = GridStatus::Uninitialized;
                        state.columns = None;
                        state.column_classes = None;
                        state.filter = None;
                    }
                    Some(restored)
                }
            };

            match result {
                Some(Ok(from)) => {
                    tracing::debug!(element = grid.element, "grid restored");
                    grid.context.events.emit(GridEvent::Restore {
                        element: grid.element,
                        from,
                    });
                    on_done(true);
                }
                Some(Err(err)) => {
                    tracing::warn!(element = grid.element, error = %err, "grid restore failed");
                    on_done(false);
                }
                None => on_done(false),
            }
        });
    }

    /// Inserts `items` at the front or back of the source order and lays the
    /// grid out again with its current options. Resolves to `false` when the
    /// grid is not active.
    pub fn add_items(&self, items: Vec<NodeId>, options: AddItemsOptions) -> Completion<bool> {
        let (completer, done) = completion();
        self.add_items_with(items, options, move |added| completer.complete(added));
        done
    }

    pub fn add_items_with<F>(&self, items: Vec<NodeId>, options: AddItemsOptions, on_done: F)
    where
        F: FnOnce(bool) + Send + 'static,
    {
        let grid = self.clone();
        self.context.scheduler.schedule_for_next_frame(move || {
            let result = {
                let mut guard = grid.state();
                let state = &mut *guard;
                match (state.status, state.columns) {
                    (GridStatus::Active, Some(columns)) => {
                        let current = GridOptions {
                            columns,
                            column_classes: state.column_classes.clone(),
                            filter: state.filter.clone(),
                        };
                        let mut doc = grid.context.document.write_doc();
                        Some(
                            check_insertable(&doc, grid.element, &items)
                                .and_then(|_| grid.gather(&mut doc, state))
                                .and_then(|holder| {
                                    if let Err(err) = insert_items(&mut doc, holder, &items, options) {
                                        grid.abandon(&mut doc, state, holder);
                                        return Err(err);
                                    }
                                    grid.lay_out_or_abandon(&mut doc, state, holder, &current)
                                }),
                        )
                    }
                    _ => None,
                }
            };

            match result {
                Some(Ok(())) => {
                    tracing::debug!(element = grid.element, added = items.len(), "items added to grid");
                    grid.context.events.emit(GridEvent::AddItems {
                        element: grid.element,
                        grid: grid.snapshot(),
                    });
                    on_done(true);
                }
                Some(Err(err)) => {
                    tracing::warn!(element = grid.element, error = %err, "adding items failed");
                    on_done(false);
                }
                None => on_done(false),
            }
        });
    }
}

/// Moves the items of `holder` matching `filter` into `filtered`, tagging each
/// with its index in `holder` so it can go back to the same place.
pub fn filter_items(
    doc: &mut Document,
    holder: NodeId,
    filter: Option<&ItemFilter>,
    filtered: &mut Vec<NodeId>,
) -> Result<(), LayoutError> {
    let Some(filter) = filter else {
        return Ok(());
    };

    for (index, item) in doc.element_children(holder).into_iter().enumerate() {
        if filter.matches(doc, item) {
            doc.set_data(item, POSITION_KEY, index)?;
            doc.detach(item)?;
            filtered.push(item);
            tracing::trace!(item, index, "item filtered out of columns");
        }
    }
    Ok(())
}

/// Reinserts every filtered item into `container` at its recorded index,
/// draining `filtered`.
pub fn restore_filtered(
    doc: &mut Document,
    container: NodeId,
    filtered: &mut Vec<NodeId>,
) -> Result<(), LayoutError> {
    for item in filtered.drain(..) {
        let index = doc
            .remove_data(item, POSITION_KEY)
            .and_then(|position| position.parse().ok())
            .unwrap_or(usize::MAX);
        doc.insert_child_at(container, index, item)?;
    }
    Ok(())
}

/// Rejects items that are gone, are not elements, or contain the grid itself,
/// before any column is taken apart.
fn check_insertable(doc: &Document, element: NodeId, items: &[NodeId]) -> Result<(), LayoutError> {
    for &item in items {
        if !doc.contains(item) {
            return Err(LayoutError::MissingNode(item));
        }
        if !doc.is_element(item) {
            return Err(LayoutError::NotAnElement(item));
        }
        if doc.is_inclusive_ancestor(item, element) {
            return Err(LayoutError::Hierarchy { parent: element, child: item });
        }
    }
    Ok(())
}

fn insert_items(
    doc: &mut Document,
    holder: NodeId,
    items: &[NodeId],
    options: AddItemsOptions,
) -> Result<(), LayoutError> {
    for (offset, &item) in items.iter().enumerate() {
        let item = if options.clone { doc.deep_clone(item)? } else { item };
        match options.method {
            InsertMethod::Append => doc.append_child(holder, item)?,
            InsertMethod::Prepend => doc.insert_child_at(holder, offset, item)?,
        }
    }
    Ok(())
}
