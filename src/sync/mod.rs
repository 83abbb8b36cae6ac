//! Order list synchronization: paging, search, filtering and polling
pub mod collection;
pub mod debounce;
pub mod scheduler;
pub mod synchronizer;

pub use collection::{OrderCollection, OrderFilter};
pub use debounce::Debouncer;
pub use scheduler::{IntervalScheduler, ManualScheduler, Scheduler, Tick};
pub use synchronizer::{FetchOutcome, FocusGuard, OrderSynchronizer, PollOutcome, SyncConfig};
