/// Tab Grouper - Chrome Extension that clusters tabs into named, colored groups
/// Built with Rust + WASM
///
/// Tabs are grouped by user rules first, then by an AI classifier, then by
/// shared domain. The result is reconciled against the live tab groups.

pub mod ai;
pub mod color;
pub mod domain;
pub mod error;
pub mod grouping;
pub mod reconcile;
pub mod rules;
pub mod scheduler;
pub mod service;
pub mod storage;
pub mod store;
pub mod tab_data;

#[cfg(target_arch = "wasm32")]
mod extension;

#[cfg(test)]
mod testing;

pub use grouping::{generate_groups, RunMode};
pub use reconcile::Reconciler;
pub use service::{Clock, Command, CommandResponse, GroupingService};
pub use tab_data::{CandidateGroup, LiveGroup, Tab};
