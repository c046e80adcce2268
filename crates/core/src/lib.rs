//! `chronicle-core` — engine foundation building blocks.
//!
//! This crate contains the **pure data model** of the engine (identities,
//! timestamps, durable records, schema layouts, the codec boundary). No
//! storage or pipeline concerns live here.

pub mod codec;
pub mod error;
pub mod frame;
pub mod id;
pub mod layout;
pub mod record;
pub mod timestamp;

pub use codec::{EntityCodec, JsonCodec};
pub use error::{CoreError, CoreResult};
pub use id::EntityId;
pub use layout::{EntityLayout, FieldDescriptor, Fingerprint};
pub use record::{EntityKind, EntityRecord};
pub use timestamp::HybridTimestamp;
