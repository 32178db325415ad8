use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use grid_layout::{DocumentLock, Selector};
use grid_reactive::{completion, Completion, FanIn};

use crate::config::{BreakpointMap, GridOptions};
use crate::error::GridError;
use crate::event::GridEvent;
use crate::grid::{Grid, GridContext};
use crate::media_query::{MediaQueries, QueryHandler, SubscriptionId};

/// Ties the grids matched by one selector to a set of breakpoints.
pub struct GridHandler {
    selector: String,
    breakpoints: BreakpointMap,
    grids: Vec<Grid>,
    subscriptions: Vec<SubscriptionId>,
    ready: Arc<AtomicBool>,
}

impl GridHandler {
    pub fn new(selector: impl Into<String>, breakpoints: BreakpointMap) -> Self {
        Self {
            selector: selector.into(),
            breakpoints,
            grids: Vec::new(),
            subscriptions: Vec::new(),
            ready: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn selector(&self) -> &str {
        &self.selector
    }

    pub fn breakpoints(&self) -> &BreakpointMap {
        &self.breakpoints
    }

    pub fn grids(&self) -> &[Grid] {
        &self.grids
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Creates a grid per matching element and subscribes every breakpoint.
    /// Setup is deferred until a breakpoint first matches.
    pub fn register(
        &mut self,
        context: &Arc<GridContext>,
        media: &MediaQueries,
    ) -> Result<&mut Self, GridError> {
        let selector = Selector::parse(&self.selector)?;
        let elements = context.document.read_doc().query_selector_all(&selector);
        self.grids = elements
            .into_iter()
            .map(|element| Grid::new(element, Arc::clone(context)))
            .collect();

        let handlers: Vec<(String, QueryHandler)> = self
            .breakpoints
            .iter()
            .map(|(query, options)| (query.to_string(), self.construct_handler(query, options)))
            .collect();

        for (query, handler) in handlers {
            let id = media.register(&query, handler)?;
            self.subscriptions.push(id);
        }

        self.ready.store(true, Ordering::SeqCst);
        tracing::debug!(
            selector = %self.selector,
            grids = self.grids.len(),
            breakpoints = self.subscriptions.len(),
            "grid handler registered"
        );
        Ok(self)
    }

    fn construct_handler(&self, query: &str, options: &GridOptions) -> QueryHandler {
        let setup_grids = self.grids.clone();
        let setup_options = options.clone();

        let match_grids = self.grids.clone();
        let match_options = options.clone();
        let query = query.to_string();

        QueryHandler::new()
            .deferred_setup(move || {
                for grid in &setup_grids {
                    grid.setup_with(setup_options.clone(), |_| {});
                }
            })
            .on_match(move || {
                for grid in &match_grids {
                    let context = Arc::clone(grid.context());
                    let element = grid.element();
                    let query = query.clone();
                    grid.redraw_with(match_options.clone(), move |redrawn| {
                        if let Some(redrawn) = redrawn {
                            context.events.emit(GridEvent::Match {
                                element,
                                from: redrawn.from,
                                to: redrawn.to,
                                query,
                            });
                        }
                    });
                }
            })
    }

    /// Unsubscribes every breakpoint and restores every grid. `on_done` runs
    /// once, after the last grid has been restored.
    pub fn unregister_with<F>(&mut self, media: &MediaQueries, on_done: F)
    where
        F: FnOnce() + Send + 'static,
    {
        for id in self.subscriptions.drain(..) {
            media.unregister(id);
        }

        let grids = std::mem::take(&mut self.grids);
        let ready = Arc::clone(&self.ready);
        let selector = self.selector.clone();
        let fan_in = FanIn::new(grids.len(), move || {
            ready.store(false, Ordering::SeqCst);
            tracing::debug!(selector = %selector, "grid handler unregistered");
            on_done();
        });

        for grid in grids {
            let fan_in = fan_in.clone();
            grid.restore_with(move |_| fan_in.arrive());
        }
    }

    pub fn unregister(&mut self, media: &MediaQueries) -> Completion<()> {
        let (completer, done) = completion();
        self.unregister_with(media, move || completer.complete(()));
        done
    }
}
