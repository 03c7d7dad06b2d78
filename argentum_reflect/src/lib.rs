//! Runtime introspection of opaque in-memory values.
//!
//! A compiler that wants its values to be inspectable at runtime embeds
//! compact field descriptors in the binaries it emits.
//! This crate decodes those descriptors directly and performs raw value
//! copies according to them, without going through a slower
//! general-purpose reflection interface.
//! The result of inspecting a value is a [`Mirror`]:
//! an ordered, labeled snapshot of the value's children,
//! each an independent copy of the corresponding field.
//!
//! The crate is organised leaves first:
//!
//! - [`descriptor`] decodes the binary records
//!   (self-relative pointers, field descriptors, field records).
//! - [`metadata`] is the runtime representation of one concrete type,
//!   together with the process-wide type catalog.
//! - [`value`] owns independent copies of extracted values.
//! - [`mirror`] orchestrates field extraction,
//!   including the destructive-then-restorative tagged-union protocol.
//!
//! The host runtime stays in charge of value semantics:
//! copying, destroying, tag access and heap boxes are all performed
//! through operation tables the host supplies when registering a type.

#![warn(missing_docs)]

pub mod descriptor;
pub mod metadata;
pub mod mirror;
pub mod value;

pub use self::metadata::catalog::register_type;
pub use self::metadata::catalog::resolve_type;
pub use self::metadata::TypeMetadata;
pub use self::mirror::reflect_instance;
pub use self::mirror::Mirror;

#[cfg(test)]
pub (crate) mod testutil;
