pub mod cache;
pub mod email;
mod mode;
pub mod pipeline;
mod reload;
pub mod scripts;
pub mod styles;
mod watch;

pub use cache::{CacheHandle, CacheStore};
pub use mode::BuildMode;
pub use reload::LiveReload;
pub use watch::{FileWatcher, WatchController, WatchRule};
