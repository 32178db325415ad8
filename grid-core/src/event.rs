use grid_layout::NodeId;

use crate::grid::GridSnapshot;

/// Notifications fired on the registry's event bus.
#[derive(Debug, Clone, PartialEq)]
pub enum GridEvent {
    Init {
        selectors: Vec<String>,
    },
    Setup {
        element: NodeId,
        columns: usize,
        filter: Option<String>,
    },
    Match {
        element: NodeId,
        from: Option<usize>,
        to: usize,
        query: String,
    },
    Redraw {
        element: NodeId,
        from: Option<usize>,
        to: usize,
        filter: Option<String>,
    },
    Restore {
        element: NodeId,
        from: Option<usize>,
    },
    Destroy {
        selectors: Vec<String>,
    },
    AddItems {
        element: NodeId,
        grid: GridSnapshot,
    },
    /// A lite grid finished its one-off setup.
    LiteInit {
        element: NodeId,
        columns: usize,
    },
}

impl GridEvent {
    pub fn name(&self) -> &'static str {
        match self {
            GridEvent::Init { .. } => "grid:init",
            GridEvent::Setup { .. } => "grid:setup",
            GridEvent::Match { .. } => "grid:match",
            GridEvent::Redraw { .. } => "grid:redraw",
            GridEvent::Restore { .. } => "grid:restore",
            GridEvent::Destroy { .. } => "grid:destroy",
            GridEvent::AddItems { .. } => "grid:addItems",
            GridEvent::LiteInit { .. } => "lite:init",
        }
    }

    /// The grid container the event concerns, if it is about a single grid.
    pub fn element(&self) -> Option<NodeId> {
        match self {
            GridEvent::Setup { element, .. }
            | GridEvent::Match { element, .. }
            | GridEvent::Redraw { element, .. }
            | GridEvent::Restore { element, .. }
            | GridEvent::AddItems { element, .. }
            | GridEvent::LiteInit { element, .. } => Some(*element),
            GridEvent::Init { .. } | GridEvent::Destroy { .. } => None,
        }
    }
}
