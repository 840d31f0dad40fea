//! # Trellis Store
//!
//! The stateful layer of the Trellis engine: the editing-time
//! [`BuilderStore`] and the fill-time [`InterpreterStore`], built on three
//! shared primitives — a subscription manager, a snapshot-based data manager
//! and a last-caller-wins debounce manager.
//!
//! Both stores work against a validated [`trellis_schema::Schema`]: the
//! builder store mutates it through integrity-checked operations and runs
//! debounced attribute validation; the interpreter store keeps runtime values
//! and errors for a fixed schema and runs eligibility-pruned value
//! validation. Every operation notifies subscribers once, with the new state
//! snapshot and the ordered events that produced it.

mod builder;
mod data;
mod debounce;
mod error;
mod events;
mod interpreter;
mod subscription;

pub use builder::{BuilderStore, BuilderStoreData, ClonedEntity, NewEntity};
pub use data::DataManager;
pub use debounce::DebounceManager;
pub use error::{codes, StoreError};
pub use events::{BuilderStoreEvent, InterpreterStoreEvent};
pub use interpreter::{
    EntitiesValidationResult, InterpreterStore, InterpreterStoreData, InterpreterStoreOptions,
};
pub use subscription::{Listener, SubscriptionId, SubscriptionManager};

/// Returns a version string for the Trellis store crate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
