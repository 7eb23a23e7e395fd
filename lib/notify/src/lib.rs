mod context;
mod dispatch;
mod functions;
mod templating;

pub use context::{NotificationContext, RunStats, StorageStats};
pub use dispatch::{NotificationLevel, dispatch};
pub use templating::render;
