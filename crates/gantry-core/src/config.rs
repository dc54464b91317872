//! Opaque host configuration.
//!
//! The core never inspects the host's config; it threads a type-erased
//! reference through every context and variable function, one downcast
//! away for the host.

use std::any::Any;

/// A borrowed, type-erased host config. `Send + Sync` so generation can
/// fan out across the worker pool.
pub type ConfigRef<'a> = &'a (dyn Any + Send + Sync);
