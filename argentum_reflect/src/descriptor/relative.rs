use core::ptr::NonNull;

/// How many pointer dereferences follow the offset addition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Indirection
{
    /// The resolved address is the target itself.
    Direct,

    /// The resolved address holds a pointer to the target,
    /// which is followed exactly once.
    Indirect,
}

/// A reference encoded as a signed offset from its own storage address.
///
/// The compiler emits these instead of absolute addresses so that the
/// containing binary stays position independent.
/// A resolved address is therefore only meaningful within the process
/// that performed the resolution:
/// the same binary maps at a different base address in the next one.
/// Resolved addresses must never be cached across runs.
///
/// An offset of zero encodes an absent reference.
#[repr(transparent)]
#[derive(Clone, Copy)]
pub struct RelativeOffset
{
    offset: i32,
}

impl RelativeOffset
{
    /// An offset that resolves to nothing.
    pub const ABSENT: Self = Self{offset: 0};

    /// Create an offset, for building descriptors by hand.
    pub fn new(offset: i32) -> Self
    {
        Self{offset}
    }

    /// Whether this offset encodes an absent reference.
    pub fn is_absent(self) -> bool
    {
        self.offset == 0
    }

    /// Resolve the offset stored at `at` into an absolute address.
    ///
    /// Returns [`None`] for an absent reference.
    /// There is no other failure path;
    /// callers must check for absence before dereferencing.
    ///
    /// # Safety
    ///
    /// `at` must point to a live `RelativeOffset` whose target,
    /// if present, lies within the same mapped binary.
    /// For [`Indirection::Indirect`],
    /// the target must hold a valid pointer.
    pub unsafe fn resolve(at: *const Self, indirection: Indirection)
        -> Option<NonNull<u8>>
    {
        let offset = (*at).offset;
        if offset == 0 {
            return None;
        }

        let resolved = (at as *const u8).offset(offset as isize);
        let resolved = match indirection {
            Indirection::Direct => resolved,
            Indirection::Indirect => *(resolved as *const *const u8),
        };

        NonNull::new(resolved as *mut u8)
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[repr(C)]
    struct Carrier
    {
        target: u8,
        offset: RelativeOffset,
    }

    #[test]
    fn absent_offset_resolves_to_none()
    {
        let carrier = Carrier{target: 0, offset: RelativeOffset::ABSENT};
        let resolved = unsafe {
            RelativeOffset::resolve(&carrier.offset, Indirection::Direct)
        };
        assert!(carrier.offset.is_absent());
        assert!(resolved.is_none());
    }

    #[test]
    fn direct_offset_resolves_backwards()
    {
        // The offset is stored behind its own target,
        // so resolution walks backwards.
        let mut carrier = Carrier{target: 7, offset: RelativeOffset::ABSENT};
        let base = &carrier.offset as *const RelativeOffset as isize;
        let target = &carrier.target as *const u8 as isize;
        carrier.offset = RelativeOffset::new((target - base) as i32);

        let resolved = unsafe {
            RelativeOffset::resolve(&carrier.offset, Indirection::Direct)
        };
        assert_eq!(resolved.map(NonNull::as_ptr), Some(&mut carrier.target as *mut u8));
    }

    #[test]
    fn indirect_offset_follows_one_pointer()
    {
        let target: u8 = 9;
        let pointer: *const u8 = &target;

        #[repr(C)]
        struct Indirected
        {
            offset: RelativeOffset,
            padding: [u8; 4],
            pointer: *const u8,
        }

        let mut indirected = Indirected{
            offset: RelativeOffset::ABSENT,
            padding: [0; 4],
            pointer,
        };
        let base = &indirected.offset as *const RelativeOffset as isize;
        let slot = &indirected.pointer as *const *const u8 as isize;
        indirected.offset = RelativeOffset::new((slot - base) as i32);

        let resolved = unsafe {
            RelativeOffset::resolve(&indirected.offset, Indirection::Indirect)
        };
        assert_eq!(
            resolved.map(NonNull::as_ptr),
            Some(&target as *const u8 as *mut u8),
        );
    }
}
