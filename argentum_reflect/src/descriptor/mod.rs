//! Decoding of the field descriptors a compiler embeds in its output.
//!
//! A field descriptor is an immutable, process-wide binary record:
//! a fixed header followed by a trailing array of field records.
//! It is mapped together with the rest of the binary and never freed,
//! which is why the views in this module hand out `'static` data.
//! All cross-references inside a descriptor are self-relative offsets,
//! see [`RelativeOffset`].

pub use self::record::*;
pub use self::relative::*;

use core::ffi::CStr;
use core::ffi::c_char;
use core::mem::size_of;
use core::ptr::NonNull;

pub mod relative;

mod record;

/// Header of a field descriptor as emitted by the compiler.
#[repr(C)]
struct RawFieldDescriptor
{
    type_name: RelativeOffset,
    superclass: RelativeOffset,
    kind: u16,
    record_size: u16,
    num_fields: u32,
}

/// Interpretation of a descriptor's kind tag.
///
/// The tag is an open set from the decoder's point of view:
/// compilers newer than this crate may emit values it does not know.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DescriptorKind
{
    /// Struct-like type with inline fields at fixed offsets.
    Aggregate,

    /// Class-like type whose fields sit behind one header indirection.
    Reference,

    /// Tagged union; each record describes one case.
    TaggedUnion,
}

impl DescriptorKind
{
    /// Decode a raw kind tag.
    ///
    /// Unrecognized tags yield [`None`];
    /// callers degrade to an empty result rather than abort.
    pub fn from_raw(raw: u16) -> Option<Self>
    {
        match raw {
            0 => Some(Self::Aggregate),
            1 => Some(Self::Reference),
            2 | 3 => Some(Self::TaggedUnion),
            _ => None,
        }
    }
}

/// Typed, read-only view of one field descriptor.
///
/// This is a pointer-sized handle; nothing is copied or decoded until
/// an accessor asks for it.
#[derive(Clone, Copy)]
pub struct FieldDescriptor
{
    ptr: NonNull<u8>,
}

impl FieldDescriptor
{
    /// Create a view of the descriptor at the given address.
    ///
    /// # Safety
    ///
    /// The address must hold a well-formed field descriptor that stays
    /// mapped, unmodified, for the rest of the process lifetime.
    /// The trailing array must hold as many records as the header
    /// declares, each `record_size` bytes apart.
    pub unsafe fn from_raw(ptr: NonNull<u8>) -> Self
    {
        Self{ptr}
    }

    /// The address this view decodes.
    pub fn as_ptr(&self) -> *const u8
    {
        self.ptr.as_ptr()
    }

    fn raw(&self) -> &RawFieldDescriptor
    {
        // SAFETY: from_raw promised a live, process-lifetime header.
        unsafe { &*(self.ptr.as_ptr() as *const RawFieldDescriptor) }
    }

    fn resolve_name(&self, slot: &RelativeOffset) -> Option<&'static CStr>
    {
        // SAFETY: The header is live and its name references,
        // if present, point at nul-terminated text in the same binary.
        unsafe {
            let target = RelativeOffset::resolve(slot, Indirection::Direct)?;
            Some(CStr::from_ptr(target.as_ptr() as *const c_char))
        }
    }

    /// Whether the descriptor carries a type-name encoding.
    pub fn has_type_name(&self) -> bool
    {
        !self.raw().type_name.is_absent()
    }

    /// The encoded name of the described type, if present.
    pub fn type_name(&self) -> Option<&'static CStr>
    {
        self.resolve_name(&self.raw().type_name)
    }

    /// The encoded name of the superclass, if the type has one.
    ///
    /// Only reference-kind descriptors ever carry this.
    pub fn superclass_name(&self) -> Option<&'static CStr>
    {
        self.resolve_name(&self.raw().superclass)
    }

    /// The raw kind tag, for diagnostics.
    pub fn raw_kind(&self) -> u16
    {
        self.raw().kind
    }

    /// The decoded kind tag, or [`None`] if this decoder does not
    /// understand it.
    pub fn kind(&self) -> Option<DescriptorKind>
    {
        DescriptorKind::from_raw(self.raw().kind)
    }

    /// Byte stride of the trailing record array.
    ///
    /// This comes from the header, not from a compiled-in constant:
    /// the record shape may vary between descriptor versions.
    pub fn record_size(&self) -> usize
    {
        self.raw().record_size as usize
    }

    /// The number of fields the described type declares.
    pub fn num_fields(&self) -> usize
    {
        self.raw().num_fields as usize
    }

    fn trailing(&self) -> *const u8
    {
        // SAFETY: The trailing array starts right after the header.
        unsafe { self.ptr.as_ptr().add(size_of::<RawFieldDescriptor>()) }
    }

    /// The record at the given index.
    ///
    /// # Panics
    ///
    /// Panics if the index is out of range.
    /// Descriptors come from a binary this crate did not emit,
    /// so an unchecked read past the trailing array could land
    /// anywhere; the bound is enforced unconditionally.
    pub fn record(&self, index: usize) -> FieldRecord
    {
        let num_fields = self.num_fields();
        if index >= num_fields {
            panic!(
                "field descriptor at {:p}: record index {} out of range \
                 (descriptor declares {} fields)",
                self.ptr.as_ptr(), index, num_fields,
            );
        }

        // SAFETY: from_raw promised num_fields records of record_size
        // bytes each, and the index was just checked.
        unsafe {
            let address = self.trailing().add(index * self.record_size());
            FieldRecord{ptr: NonNull::new_unchecked(address as *mut u8)}
        }
    }

    /// Iterate over the trailing records in declaration order.
    ///
    /// Records are materialized lazily, one view at a time.
    pub fn records(&self) -> Records
    {
        Records{descriptor: *self, next: 0}
    }
}

// SAFETY: Descriptors are immutable for the process lifetime,
// so concurrent readers need no synchronization.
unsafe impl Send for FieldDescriptor {}
unsafe impl Sync for FieldDescriptor {}

/// Iterator over the records of a [`FieldDescriptor`].
pub struct Records
{
    descriptor: FieldDescriptor,
    next: usize,
}

impl Iterator for Records
{
    type Item = FieldRecord;

    fn next(&mut self) -> Option<FieldRecord>
    {
        if self.next >= self.descriptor.num_fields() {
            return None;
        }
        let record = self.descriptor.record(self.next);
        self.next += 1;
        Some(record)
    }

    fn size_hint(&self) -> (usize, Option<usize>)
    {
        let remaining = self.descriptor.num_fields() - self.next;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Records
{
}
