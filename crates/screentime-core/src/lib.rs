//! # Screentime Core Library
//!
//! Daily per-app time budgets, enforced from two execution domains that
//! never talk to each other directly: a foreground controller driven by the
//! user, and a background monitor woken by the platform's activity service.
//! The only channel between them is a shared key-value container.
//!
//! ## Architecture
//!
//! - **Model**: limit sets, usage records, unlock suppressions and the event
//!   map, keyed by canonical [`AppId`]s
//! - **Storage**: a versioned record envelope over a [`SharedStore`]
//!   (SQLite for the real container, in-memory for tests) plus TOML
//!   configuration
//! - **Controller**: policy-gated limit edits, usage accounting, unlocks and
//!   enforcement recomputation
//! - **Monitoring**: threshold registration and the background callbacks that
//!   act on them
//!
//! ## Key Components
//!
//! - [`DailyLimitsController`]: foreground state machine
//! - [`MonitoringScheduler`]: turns limits into threshold registrations
//! - [`ActivityMonitor`]: background interval and threshold handlers
//! - [`Context`]: the capabilities each side is built from

pub mod clock;
pub mod context;
pub mod controller;
pub mod enforcement;
pub mod error;
pub mod model;
pub mod monitor;
pub mod monitoring;
pub mod policy;
pub mod rollover;
pub mod storage;
pub mod unlock;

pub use clock::{Clock, ManualClock, SystemClock};
pub use context::Context;
pub use controller::{run_day_boundary_checks, DailyLimitsController, RemainingTime};
pub use enforcement::{EnforcementStore, MemoryEnforcement, StoreBackedEnforcement};
pub use error::{ConfigError, CoreError, DatabaseError, ValidationError};
pub use model::{AppId, DaySummary, EventTokenMap, LimitSet, Seconds, SuppressionSet, UsageRecord};
pub use monitor::{run_monitor, ActivityMonitor, MonitorEvent, Resolution};
pub use monitoring::{
    ActivityCenter, MonitoringScheduler, RecordingActivityCenter, RefreshOutcome, ScheduleName,
    StoreBackedActivityCenter,
};
pub use policy::{ApplyNow, ChangeMode};
pub use rollover::RolloverOutcome;
pub use storage::{Config, MemoryStore, SharedState, SharedStore, SqliteStore};
pub use unlock::{UnlockGrant, UnlockKind, UnlockSource};
