//! Context lookup, condition evaluation and `{{dot.path}}` rendering.
//!
//! All three layers operate on the same context object, a
//! `serde_json::Value` tree built once per cell by the
//! [`assembler`](crate::assembler). Nothing in here allocates beyond the
//! output string, performs I/O, or evaluates code.
//!
//! - [`context`] - dot-path resolution with "absent" semantics.
//! - [`condition`] - [`Condition`] predicates (`exists`, `==`, `!=`).
//! - [`render`] - the closed-form token renderer.

pub mod condition;
pub mod context;
pub mod render;

pub use condition::{Condition, Operator, all_hold};
pub use context::{display_value, is_present, is_valid_path, resolve};
pub use render::{render, scan_tokens};
