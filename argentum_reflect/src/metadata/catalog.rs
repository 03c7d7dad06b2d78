//! Process-wide catalog mapping type-name encodings to metadata.
//!
//! The catalog stands in for the running program's symbol table:
//! the host runtime registers every type it wants reflectable,
//! and field extraction resolves type-name encodings through it.
//! Entries are written once and live for the process lifetime,
//! matching the lifetime of the descriptors they interpret.
//!
//! A failed lookup is a normal outcome, not an error.
//! Locally scoped or stripped types reference names the catalog has
//! never heard of; callers skip the affected field and move on.

use super::TypeMetadata;

use once_cell::sync::Lazy;
use write_once_map::WriteOnceMap;

static TYPES: Lazy<WriteOnceMap<Vec<u8>, TypeMetadata>> =
    Lazy::new(WriteOnceMap::new);

/// Register metadata for the given type-name encoding.
///
/// The first registration under a name wins and is returned;
/// a repeated registration returns the original metadata unchanged.
/// The returned reference is valid for the rest of the process.
pub fn register_type(name: &[u8], metadata: TypeMetadata)
    -> &'static TypeMetadata
{
    TYPES.get_or_insert_with(name.to_vec(), || metadata)
}

/// Resolve a type-name encoding to live metadata.
///
/// Returns [`None`] for names the catalog cannot resolve.
pub fn resolve_type(name: &[u8]) -> Option<&'static TypeMetadata>
{
    TYPES.get(name)
}
