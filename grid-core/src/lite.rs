//! A single grid with a fixed column count and no breakpoints.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use grid_layout::{DocumentLock, Selector};
use grid_reactive::{completion, Completion};

use crate::config::{GridOptions, VisibilityPolicy};
use crate::error::GridError;
use crate::event::GridEvent;
use crate::grid::{Grid, GridContext};

/// Lays out the first element matching a selector once, without media
/// queries, and restores it on `destroy`.
pub struct LiteGridHandler {
    selector: String,
    options: GridOptions,
    grid: Grid,
    ready: Arc<AtomicBool>,
}

impl LiteGridHandler {
    /// Sets up the first element matching `selector` on the next frame and
    /// fires `lite:init` once the columns are in place.
    ///
    /// Returns `Ok(None)` when the element is hidden and the settings skip
    /// hidden containers. An empty or unparsable selector and a zero column
    /// count are rejected before anything is scheduled.
    pub fn init(
        context: &Arc<GridContext>,
        selector: &str,
        options: GridOptions,
    ) -> Result<Option<Self>, GridError> {
        if selector.trim().is_empty() {
            return Err(GridError::InvalidArgument("selector must not be empty".to_string()));
        }
        let parsed = Selector::parse(selector)
            .map_err(|err| GridError::InvalidArgument(format!("{selector:?}: {err}")))?;
        options.validate()?;

        let element = {
            let doc = context.document.read_doc();
            let element = doc
                .query_selector_all(&parsed)
                .into_iter()
                .next()
                .ok_or_else(|| GridError::NotFound { selector: selector.to_string() })?;
            if context.settings.visibility == VisibilityPolicy::SkipHidden && !doc.is_rendered(element) {
                tracing::debug!(selector, element, "lite grid hidden, not initialized");
                return Ok(None);
            }
            element
        };

        let grid = Grid::new(element, Arc::clone(context));
        let shared = Arc::clone(context);
        let columns = options.columns;
        grid.setup_with(options.clone(), move |applied| {
            if applied {
                shared.events.emit(GridEvent::LiteInit { element, columns });
            }
        });

        tracing::debug!(selector, element, columns, "lite grid initialized");
        Ok(Some(Self {
            selector: selector.to_string(),
            options,
            grid,
            ready: Arc::new(AtomicBool::new(true)),
        }))
    }

    pub fn selector(&self) -> &str {
        &self.selector
    }

    pub fn options(&self) -> &GridOptions {
        &self.options
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Restores the grid. `on_done` receives whether there was a layout to
    /// take apart; the handler is no longer ready either way.
    pub fn destroy_with<F>(&self, on_done: F)
    where
        F: FnOnce(bool) + Send + 'static,
    {
        let ready = Arc::clone(&self.ready);
        let selector = self.selector.clone();
        self.grid.restore_with(move |restored| {
            ready.store(false, Ordering::SeqCst);
            tracing::debug!(selector = %selector, restored, "lite grid destroyed");
            on_done(restored);
        });
    }

    pub fn destroy(&self) -> Completion<bool> {
        let (completer, done) = completion();
        self.destroy_with(move |restored| completer.complete(restored));
        done
    }
}
