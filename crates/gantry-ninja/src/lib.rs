// Allow unwrap in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Ninja manifest primitives.
//!
//! This crate holds everything the orchestrator needs to talk about a
//! manifest without owning the build graph: parsed `$variable` references
//! ([`NinjaString`]), rule/pool/edge parameter structs, scope-qualified
//! declaration identities with deterministic name mangling, and the
//! low-level [`Writer`] that serializes statements with 80-column
//! wrapping.

mod ids;
mod params;
mod string;
mod writer;

pub use ids::{Owner, PoolRef, RuleRef, VarRef};
pub use params::{BuildParams, Deps, PoolParams, RuleParams};
pub use string::{escape, EscapeContext, NinjaString, NinjaStringError};
pub use writer::Writer;
