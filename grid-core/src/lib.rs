pub mod config;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod grid;
pub mod handler;
pub mod lite;
pub mod media_query;

pub use config::{
    AddItemsOptions, BreakpointMap, FilterFn, GridOptions, GridSettings, InsertMethod, ItemFilter,
    VisibilityPolicy,
};
pub use dispatch::{GridDispatch, ItemSource};
pub use error::GridError;
pub use event::GridEvent;
pub use grid::{filter_items, restore_filtered, Grid, GridContext, GridSnapshot, GridStatus, Redrawn};
pub use handler::GridHandler;
pub use lite::LiteGridHandler;
pub use media_query::{
    desktop, mobile, tablet, MediaQueries, MediaQuery, MediaQueryError, MediaQueryList,
    MediaQueryManager, MediaType, QueryHandler, SubscriptionId, ViewportSize,
};
