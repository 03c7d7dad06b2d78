//! Runtime representation of one concrete type.
//!
//! Where [`descriptor`][`crate::descriptor`] is a view of what the
//! compiler wrote down, this module is the live, in-process side:
//! which kind a type is, where its fields sit,
//! and the operation tables the host runtime bound to it.
//! Extraction strategies dispatch on [`TypeMetadata`] exhaustively;
//! there is no open-ended downcasting.

pub use self::ops::*;

use crate::descriptor::FieldDescriptor;
use crate::descriptor::ReferenceStorageKind;

use core::ffi::CStr;

pub mod catalog;
pub mod ops;

/// Runtime metadata for one concrete type.
///
/// The set of kinds is closed:
/// anything the engine cannot interpret further is [`Other`],
/// which still carries value operations so instances can be copied
/// and destroyed, but exposes no children.
///
/// [`Other`]: `TypeMetadata::Other`
pub enum TypeMetadata
{
    /// Struct-like type; fields inline at fixed offsets.
    Aggregate(AggregateMetadata),

    /// Class-like type; an instance is a pointer to the object,
    /// fields sit at fixed offsets behind that one indirection.
    Reference(ReferenceMetadata),

    /// Tagged union with host-supplied tag and projection operations.
    TaggedUnion(UnionMetadata),

    /// Tuple; elements described by an explicit (offset, type) list.
    Tuple(TupleMetadata),

    /// Any type without an interpretable structure.
    Other(OtherMetadata),
}

/// Payload of [`TypeMetadata::Aggregate`].
pub struct AggregateMetadata
{
    /// The compiler-emitted field descriptor.
    ///
    /// [`None`] when the information was stripped or the type opted
    /// out of reflection; such a type exposes no children.
    pub descriptor: Option<FieldDescriptor>,

    /// Byte offset of each field, in record order.
    pub field_offsets: Vec<usize>,

    /// Value operations for whole instances.
    pub ops: ValueOps,
}

/// Payload of [`TypeMetadata::Reference`].
pub struct ReferenceMetadata
{
    /// The compiler-emitted field descriptor, if not stripped.
    pub descriptor: Option<FieldDescriptor>,

    /// Byte offset of each field within the pointed-to object,
    /// in record order.
    pub field_offsets: Vec<usize>,

    /// Value operations for instances,
    /// which are pointer-sized references to the object.
    pub ops: ValueOps,
}

/// Payload of [`TypeMetadata::TaggedUnion`].
pub struct UnionMetadata
{
    /// The compiler-emitted field descriptor, if not stripped.
    /// Each record describes one case.
    pub descriptor: Option<FieldDescriptor>,

    /// Value operations for whole instances.
    pub ops: ValueOps,

    /// Tag access and destructive projection, supplied by the host.
    pub union_ops: UnionOps,

    /// Heap-box primitives, required only when a case is indirect.
    pub box_ops: Option<BoxOps>,
}

/// Payload of [`TypeMetadata::Tuple`].
pub struct TupleMetadata
{
    /// The elements in declaration order.
    pub elements: Vec<TupleElement>,

    /// Value operations for whole instances.
    pub ops: ValueOps,
}

/// One element of a tuple type.
pub struct TupleElement
{
    /// Byte offset of the element within the tuple.
    pub offset: usize,

    /// Metadata of the element's type.
    pub ty: &'static TypeMetadata,
}

/// Payload of [`TypeMetadata::Other`].
pub struct OtherMetadata
{
    /// Value operations for whole instances.
    pub ops: ValueOps,
}

impl TypeMetadata
{
    /// The value-operations table bound to this type.
    pub fn ops(&self) -> &ValueOps
    {
        match self {
            Self::Aggregate(m) => &m.ops,
            Self::Reference(m) => &m.ops,
            Self::TaggedUnion(m) => &m.ops,
            Self::Tuple(m) => &m.ops,
            Self::Other(m) => &m.ops,
        }
    }

    /// The field descriptor behind this type, if it kept one.
    pub fn descriptor(&self) -> Option<FieldDescriptor>
    {
        match self {
            Self::Aggregate(m) => m.descriptor,
            Self::Reference(m) => m.descriptor,
            Self::TaggedUnion(m) => m.descriptor,
            Self::Tuple(_) | Self::Other(_) => None,
        }
    }

    /// Byte offsets of declared fields, in record order.
    ///
    /// Empty for kinds without an offset table.
    pub fn field_offsets(&self) -> &[usize]
    {
        match self {
            Self::Aggregate(m) => &m.field_offsets,
            Self::Reference(m) => &m.field_offsets,
            _ => &[],
        }
    }

    /// Resolve a field's type-name encoding to live metadata.
    ///
    /// A reference-storage suffix on the name is stripped first;
    /// the bare name is then looked up in the process-wide catalog.
    /// Returns [`None`] for names the catalog cannot resolve,
    /// which is a normal outcome — the caller skips that field.
    pub fn type_of(&self, encoding: &CStr) -> Option<&'static TypeMetadata>
    {
        let (bare, _storage) = ReferenceStorageKind::split(encoding.to_bytes());
        catalog::resolve_type(bare)
    }
}
