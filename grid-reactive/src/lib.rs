pub mod frame_sync;
pub mod completion;
pub mod events;

pub use frame_sync::{FrameContext, FrameScheduler};
pub use completion::{completion, Canceled, Completer, Completion, FanIn};
pub use events::{drain, EventBus};
