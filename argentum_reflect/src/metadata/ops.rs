use core::mem::align_of;
use core::mem::size_of;
use core::ptr;

/// Generic value operations bound to a runtime type.
///
/// The engine never interprets the bytes of a value itself;
/// everything it does to one goes through this table,
/// which the host runtime supplies when registering the type.
#[derive(Clone, Copy)]
pub struct ValueOps
{
    /// Size in bytes of one value of the type.
    pub size: usize,

    /// Required alignment of a value of the type.
    pub align: usize,

    /// Initialize the destination with a copy of the source value.
    ///
    /// Both pointers refer to `size` bytes with `align` alignment;
    /// the destination is uninitialized, the source is live and stays
    /// live afterwards.
    pub copy_init: unsafe fn(dst: *mut u8, src: *const u8),

    /// Destroy the value in place, without freeing its storage.
    pub destroy: unsafe fn(value: *mut u8),
}

impl ValueOps
{
    /// Operations for a type with a native Rust representation.
    ///
    /// Convenient for hosts whose runtime values are ordinary Rust
    /// values: copying clones, destroying drops in place.
    pub fn for_type<T: Clone>() -> Self
    {
        unsafe fn copy_init<T: Clone>(dst: *mut u8, src: *const u8)
        {
            let cloned = (*(src as *const T)).clone();
            ptr::write(dst as *mut T, cloned);
        }

        unsafe fn destroy<T>(value: *mut u8)
        {
            ptr::drop_in_place(value as *mut T);
        }

        Self{
            size: size_of::<T>(),
            align: align_of::<T>(),
            copy_init: copy_init::<T>,
            destroy: destroy::<T>,
        }
    }
}

/// Tagged-union operations bound to a runtime type.
///
/// The active-variant tag may be bit-packed into the payload rather
/// than stored as a separate discriminant.
/// That packing belongs to the host: this crate treats the three
/// operations as opaque capabilities and never decodes tag bits itself.
#[derive(Clone, Copy)]
pub struct UnionOps
{
    /// Read the index of the active variant from a live value.
    pub active_tag: unsafe fn(value: *const u8) -> u32,

    /// Move the payload bits into canonical position in place.
    ///
    /// Afterwards the value is in a transient, invalid state and must
    /// not be used as a value of the union type until
    /// [`inject_tag`][`Self::inject_tag`] runs.
    pub project_payload: unsafe fn(value: *mut u8),

    /// Restore a projected value to a well-defined state that reports
    /// the given variant as active.
    pub inject_tag: unsafe fn(value: *mut u8, tag: u32),
}

/// Host heap-box primitives for boxed ("indirect") union payloads.
///
/// A boxed payload lives in an extra heap allocation owned by the host
/// runtime, typically to bound the size of recursively shaped
/// variants.
/// This crate calls these primitives; it never implements them.
#[derive(Clone, Copy)]
pub struct BoxOps
{
    /// Take an additional strong reference to the box.
    pub retain: unsafe fn(object: *mut u8),

    /// The address of the payload bytes inside the box.
    pub project: unsafe fn(object: *mut u8) -> *mut u8,

    /// Give up one strong reference to the box.
    pub release: unsafe fn(object: *mut u8),
}
