//! Prompt specs: declarative, per-output-type step lists.
//!
//! - [`types`] - [`PromptSpec`], [`Step`], [`SpecOverrides`] and the additive
//!   [`merge_spec`].
//! - [`registry`] - the immutable [`PromptSpecRegistry`] and its builder,
//!   which validates every merged spec.
//! - [`builtin`] - the shared base spec and the built-in output types.

pub mod builtin;
pub mod registry;
pub mod types;

pub use builtin::{base_spec, builtin_builder, builtin_registry};
pub use registry::{PromptSpecRegistry, RegistryBuilder};
pub use types::{Channel, MetadataOverrides, PromptSpec, SpecMetadata, SpecOverrides, Step, merge_spec};
