//! Test fixtures: hand-assembled descriptors and a few catalog types.
//!
//! Descriptors are normally emitted by a compiler and mapped with the
//! binary.
//! Tests assemble equivalent records at runtime instead:
//! the builder lays out the header, the trailing record array and the
//! name strings in one aligned buffer, computes each self-relative
//! offset from its own slot address, and leaks the buffer so that the
//! process-lifetime contract of [`FieldDescriptor`] holds.

use crate::descriptor::DescriptorKind;
use crate::descriptor::FieldDescriptor;
use crate::descriptor::FieldFlags;
use crate::metadata::OtherMetadata;
use crate::metadata::TypeMetadata;
use crate::metadata::ValueOps;
use crate::metadata::catalog;

use core::ptr::NonNull;
use std::alloc::Layout;
use std::alloc::alloc;
use std::alloc::handle_alloc_error;

const HEADER_SIZE: usize = 16;
const RECORD_PREFIX_SIZE: usize = 12;

struct FieldSpec
{
    name: Vec<u8>,
    type_name: Option<Vec<u8>>,
    flags: FieldFlags,
}

/// Builder for one leaked, process-lifetime field descriptor.
pub (crate) struct DescriptorBuilder
{
    kind: u16,
    type_name: Option<Vec<u8>>,
    superclass: Option<Vec<u8>>,
    record_padding: usize,
    fields: Vec<FieldSpec>,
}

impl DescriptorBuilder
{
    pub fn new(kind: DescriptorKind) -> Self
    {
        let raw = match kind {
            DescriptorKind::Aggregate => 0,
            DescriptorKind::Reference => 1,
            DescriptorKind::TaggedUnion => 2,
        };
        Self::raw_kind(raw)
    }

    pub fn raw_kind(kind: u16) -> Self
    {
        Self{
            kind,
            type_name: None,
            superclass: None,
            record_padding: 0,
            fields: Vec::new(),
        }
    }

    pub fn type_name(mut self, name: &[u8]) -> Self
    {
        self.type_name = Some(name.to_vec());
        self
    }

    pub fn superclass(mut self, name: &[u8]) -> Self
    {
        self.superclass = Some(name.to_vec());
        self
    }

    /// Grow each record past the prefix this crate knows about,
    /// as a newer descriptor version would.
    pub fn record_padding(mut self, extra: usize) -> Self
    {
        self.record_padding = extra;
        self
    }

    pub fn field(
        mut self,
        name: &[u8],
        type_name: Option<&[u8]>,
        flags: FieldFlags,
    ) -> Self
    {
        self.fields.push(FieldSpec{
            name: name.to_vec(),
            type_name: type_name.map(<[u8]>::to_vec),
            flags,
        });
        self
    }

    pub fn build(self) -> FieldDescriptor
    {
        let record_size = RECORD_PREFIX_SIZE + self.record_padding;
        let records_end = HEADER_SIZE + self.fields.len() * record_size;

        let mut bytes = vec![0u8; records_end];

        if let Some(name) = &self.type_name {
            let at = append_string(&mut bytes, name);
            patch_i32(&mut bytes, 0, at as i32);
        }
        if let Some(name) = &self.superclass {
            let at = append_string(&mut bytes, name);
            patch_i32(&mut bytes, 4, (at - 4) as i32);
        }
        patch_u16(&mut bytes, 8, self.kind);
        patch_u16(&mut bytes, 10, record_size as u16);
        patch_u32(&mut bytes, 12, self.fields.len() as u32);

        for (index, field) in self.fields.iter().enumerate() {
            let record = HEADER_SIZE + index * record_size;
            patch_u32(&mut bytes, record, field.flags.bits());
            if let Some(type_name) = &field.type_name {
                let slot = record + 4;
                let at = append_string(&mut bytes, type_name);
                patch_i32(&mut bytes, slot, (at - slot) as i32);
            }
            let slot = record + 8;
            let at = append_string(&mut bytes, &field.name);
            patch_i32(&mut bytes, slot, (at - slot) as i32);
        }

        // Descriptors hold 4-byte fields; the buffer must be at least
        // that aligned, which Vec<u8> does not promise.
        let leaked = leak_aligned(&bytes);

        // SAFETY: The buffer is well formed by construction and never
        // freed.
        unsafe { FieldDescriptor::from_raw(leaked) }
    }
}

/// Append a nul-terminated string, returning its start position.
fn append_string(bytes: &mut Vec<u8>, s: &[u8]) -> usize
{
    let at = bytes.len();
    bytes.extend_from_slice(s);
    bytes.push(0);
    at
}

fn patch_i32(bytes: &mut [u8], at: usize, value: i32)
{
    bytes[at..at + 4].copy_from_slice(&value.to_ne_bytes());
}

fn patch_u32(bytes: &mut [u8], at: usize, value: u32)
{
    bytes[at..at + 4].copy_from_slice(&value.to_ne_bytes());
}

fn patch_u16(bytes: &mut [u8], at: usize, value: u16)
{
    bytes[at..at + 2].copy_from_slice(&value.to_ne_bytes());
}

fn leak_aligned(bytes: &[u8]) -> NonNull<u8>
{
    let layout = Layout::from_size_align(bytes.len(), 8).unwrap();
    unsafe {
        let pointer = match NonNull::new(alloc(layout)) {
            Some(pointer) => pointer,
            None => handle_alloc_error(layout),
        };
        pointer.as_ptr().copy_from_nonoverlapping(bytes.as_ptr(), bytes.len());
        pointer
    }
}

/// Leak a metadata value to get the `'static` reference the engine
/// works with.
pub (crate) fn leak(metadata: TypeMetadata) -> &'static TypeMetadata
{
    Box::leak(Box::new(metadata))
}

/// Register the `i64` primitive in the catalog and return it.
pub (crate) fn register_i64() -> &'static TypeMetadata
{
    catalog::register_type(
        b"i64",
        TypeMetadata::Other(OtherMetadata{ops: ValueOps::for_type::<i64>()}),
    )
}

/// Register the `text` primitive (native `String`) in the catalog.
pub (crate) fn register_text() -> &'static TypeMetadata
{
    catalog::register_type(
        b"text",
        TypeMetadata::Other(OtherMetadata{ops: ValueOps::for_type::<String>()}),
    )
}
