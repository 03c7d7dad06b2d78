use super::RelativeOffset;
use super::relative::Indirection;

use bitflags::bitflags;
use core::ffi::CStr;
use core::ffi::c_char;
use core::ptr::NonNull;

/// Fixed prefix of a field record as emitted by the compiler.
///
/// A record may be larger than this prefix;
/// the true stride comes from the descriptor header.
#[repr(C)]
pub (super) struct RawFieldRecord
{
    pub (super) flags: u32,
    pub (super) type_name: RelativeOffset,
    pub (super) field_name: RelativeOffset,
}

bitflags!
{
    /// Flags word at the start of each field record.
    pub struct FieldFlags: u32
    {
        /// The record describes a tagged-union case whose payload
        /// lives in an extra heap allocation.
        const INDIRECT_CASE = 1 << 0;

        /// The field was declared mutable.
        const MUTABLE = 1 << 1;
    }
}

/// Ownership modifier a field applies to its referent.
///
/// Encoded as a two-character suffix on the field's type name.
/// An unrecognized or missing suffix means ordinary strong storage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReferenceStorageKind
{
    /// Ordinary strong storage, including non-reference fields.
    Strong,

    /// The field does not keep its referent alive (`Xw`).
    Weak,

    /// Non-owning reference that the program asserts outlives the
    /// field (`Xo`).
    Unowned,

    /// Raw, completely unmanaged reference (`Xu`).
    Unmanaged,
}

impl ReferenceStorageKind
{
    fn from_suffix(suffix: &[u8]) -> Option<Self>
    {
        match suffix {
            b"Xw" => Some(Self::Weak),
            b"Xo" => Some(Self::Unowned),
            b"Xu" => Some(Self::Unmanaged),
            _ => None,
        }
    }

    /// Split a type name into the bare name and its storage kind.
    pub fn split(type_name: &[u8]) -> (&[u8], Self)
    {
        if type_name.len() >= 2 {
            let (bare, suffix) = type_name.split_at(type_name.len() - 2);
            if let Some(kind) = Self::from_suffix(suffix) {
                return (bare, kind);
            }
        }
        (type_name, Self::Strong)
    }
}

/// Thin, non-copying view of one field record.
///
/// Describes a single stored field or a single tagged-union case.
#[derive(Clone, Copy)]
pub struct FieldRecord
{
    pub (super) ptr: NonNull<u8>,
}

impl FieldRecord
{
    fn raw(&self) -> &RawFieldRecord
    {
        // SAFETY: Construction (via FieldDescriptor::records) promised
        // a live, process-lifetime record at this address.
        unsafe { &*(self.ptr.as_ptr() as *const RawFieldRecord) }
    }

    /// The flags word of this record.
    ///
    /// Unknown bits are preserved but carry no meaning here.
    pub fn flags(&self) -> FieldFlags
    {
        FieldFlags::from_bits_truncate(self.raw().flags)
    }

    /// Whether the record carries a type-name encoding for its field.
    pub fn has_type_name(&self) -> bool
    {
        !self.raw().type_name.is_absent()
    }

    /// The encoded name of the field's type, if the record has one.
    ///
    /// Tagged-union cases without a payload have no type name.
    pub fn type_name(&self) -> Option<&'static CStr>
    {
        let slot = &self.raw().type_name as *const RelativeOffset;
        // SAFETY: The record is live for the process lifetime
        // and the encoding, if present, is nul-terminated text.
        unsafe {
            let target = RelativeOffset::resolve(slot, Indirection::Direct)?;
            Some(CStr::from_ptr(target.as_ptr() as *const c_char))
        }
    }

    /// The declared name of the field.
    ///
    /// # Panics
    ///
    /// Every record must name its field.
    /// A record without one means the descriptor and this decoder have
    /// diverged, so this method panics rather than fabricate a name.
    pub fn name(&self) -> &'static CStr
    {
        let slot = &self.raw().field_name as *const RelativeOffset;
        // SAFETY: As for type_name.
        let target = unsafe {
            RelativeOffset::resolve(slot, Indirection::Direct)
        };
        match target {
            Some(target) => unsafe {
                CStr::from_ptr(target.as_ptr() as *const c_char)
            },
            None => panic!(
                "field record at {:p} has no field name",
                self.ptr.as_ptr(),
            ),
        }
    }

    /// The ownership modifier encoded in the field's type name.
    pub fn reference_storage(&self) -> ReferenceStorageKind
    {
        match self.type_name() {
            Some(name) => ReferenceStorageKind::split(name.to_bytes()).1,
            None => ReferenceStorageKind::Strong,
        }
    }
}

// SAFETY: Records are immutable for the process lifetime,
// so concurrent readers need no synchronization.
unsafe impl Send for FieldRecord {}
unsafe impl Sync for FieldRecord {}

#[cfg(test)]
mod tests
{
    use super::*;

    use core::mem::size_of;

    #[test]
    fn raw_record_prefix_size()
    {
        assert_eq!(size_of::<RawFieldRecord>(), 12);
    }

    #[test]
    fn storage_suffixes()
    {
        let cases: &[(&[u8], &[u8], ReferenceStorageKind)] = &[
            (b"8MyModule3FooXw", b"8MyModule3Foo", ReferenceStorageKind::Weak),
            (b"3BarXo", b"3Bar", ReferenceStorageKind::Unowned),
            (b"3BarXu", b"3Bar", ReferenceStorageKind::Unmanaged),
            (b"3Bar", b"3Bar", ReferenceStorageKind::Strong),
            (b"Xz", b"Xz", ReferenceStorageKind::Strong),
            (b"", b"", ReferenceStorageKind::Strong),
        ];
        for &(name, bare, kind) in cases {
            assert_eq!(ReferenceStorageKind::split(name), (bare, kind));
        }
    }

    #[test]
    fn unknown_flag_bits_are_dropped()
    {
        let flags = FieldFlags::from_bits_truncate(0xFFFF_FFFF);
        assert_eq!(flags, FieldFlags::INDIRECT_CASE | FieldFlags::MUTABLE);
    }
}
