//! Data access for the operations console.
//!
//! Collections of business records live in a remote document store and are
//! mirrored into a local cache so the console keeps working offline. The
//! [`facade::Console`] type is the usual entry point.

pub mod cache;
pub mod config;
pub mod facade;
pub mod model;
pub mod remote;
pub mod sync;

pub use config::Config;
pub use facade::Console;
pub use sync::{FetchOptions, Subscription, SyncLayer};
