//! # Constants
//!
//! Defaults and well-known names shared across the controller.

/// Name the controller reports as the source of Kubernetes events
pub const CONTROLLER_NAME: &str = "cloud-run-events-pubsub-source-controller";

/// Field manager used for writes to dependent resources
pub const FIELD_MANAGER: &str = "pubsub-source-controller";

/// Default number of workers draining the work queue
pub const DEFAULT_WORKER_COUNT: usize = 2;

/// Default bound on status update attempts (first attempt included)
pub const DEFAULT_STATUS_UPDATE_MAX_ATTEMPTS: u32 = 5;

/// Default pause between status update attempts after a conflict (milliseconds)
pub const DEFAULT_STATUS_UPDATE_RETRY_DELAY_MS: u64 = 10;

/// Default minimum requeue delay after a failed reconciliation (seconds)
pub const DEFAULT_ERROR_BACKOFF_MIN_SECS: u64 = 1;

/// Default maximum requeue delay after a failed reconciliation (seconds)
pub const DEFAULT_ERROR_BACKOFF_MAX_SECS: u64 = 300;

/// Default period between full resyncs of every cached resource (seconds)
pub const DEFAULT_RESYNC_PERIOD_SECS: u64 = 10 * 60 * 60;

/// Default HTTP port for metrics and probes
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Default time to wait for the HTTP server to bind (seconds)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Default interval between HTTP server readiness polls (milliseconds)
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Reason used for conditions set during initialization
pub const REASON_INITIALIZING: &str = "Initializing";

/// Reason used when the resource spec fails validation
pub const REASON_INVALID_SPEC: &str = "InvalidSpec";
