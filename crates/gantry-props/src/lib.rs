// Allow unwrap in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Typed property containers and the unpacker that fills them from
//! evaluated build-file property trees.
//!
//! Hosts describe each property struct once, through the [`PropertyStruct`]
//! trait: an ordered list of [`FieldSpec`]s plus typed [`FieldSlot`] access
//! by index. [`unpack_properties`] consumes that descriptor surface and
//! nothing else, so the unpacker stays independent of every host container
//! type.
//!
//! Name matching is case- and underscore-insensitive (`foo_bar`, `FooBar`
//! and `Foo_bar` address the same field). Unknown and duplicate
//! properties, mutated-field writes, and kind mismatches are reported with
//! positions and dotted paths; unpacking continues past every recoverable
//! error.

mod slot;
mod unpack;

pub use slot::{filter_tag, normalize_name, FieldSlot, FieldSpec, LazyStruct, PropertyStruct};
pub use unpack::{unpack_properties, UnpackError};
