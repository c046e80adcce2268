//! `chronicle-migrations` — schema evolution.
//!
//! Rewrites historical events of one layout into a new layout while
//! preserving their causal provenance, and keeps a durable ledger of layout
//! introductions and replacements.

pub mod events;
pub mod migration;

pub use events::{EntityLayoutIntroduced, EntityLayoutReplaced, register};
pub use migration::{LayoutMigration, MIGRATION_TYPE_NAME, migration_descriptor};
