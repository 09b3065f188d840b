//! # Controller
//!
//! The reconciliation core and its boundaries.
//!
//! ## Sub-modules
//!
//! - `key` - Queue keys
//! - `store` - `ResourceStore` and `Lister` boundary traits
//! - `queue` - Deduplicating work queue
//! - `dispatcher` - Watch events to queue keys, with owner fan-out
//! - `reconciler` - The per-key control loop
//! - `backoff` - Fibonacci backoff for requeues
//! - `events` - Kubernetes event recording
//! - `server` - Metrics and probe endpoints

pub mod backoff;
pub mod dispatcher;
pub mod events;
pub mod key;
pub mod queue;
pub mod reconciler;
pub mod server;
pub mod store;

pub use dispatcher::{Dispatcher, OwnerFilter};
pub use events::{EventRecorder, EventSeverity, KubeEventRecorder};
pub use key::ObjectKey;
pub use queue::WorkQueue;
pub use store::{Lister, ResourceStore, StoreError, WatchEvent, WatchFilter};
