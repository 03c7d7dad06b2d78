//! Owned storage for extracted values.
//!
//! A mirror must not alias the instance it was taken from:
//! the instance may be destroyed before the mirror is consumed.
//! [`OpaqueBox`] therefore owns an independent copy of each child,
//! made and later destroyed through the child type's own
//! value-operations table.

use crate::metadata::TypeMetadata;

use core::fmt;
use core::mem::MaybeUninit;
use core::mem::align_of;
use core::mem::size_of;
use core::ptr::NonNull;
use core::slice;
use std::alloc::Layout;
use std::alloc::alloc;
use std::alloc::dealloc;
use std::alloc::handle_alloc_error;

/// Small values are stored inline rather than behind an allocation.
type InlineBuf = MaybeUninit<[usize; 3]>;

enum Storage
{
    Inline(InlineBuf),
    Heap(NonNull<u8>),
}

/// A uniquely owned copy of one opaque value.
///
/// Storage is chosen per the target type's layout:
/// values of up to three machine words live inline,
/// larger or overaligned values get their own heap allocation.
/// Dropping the box destroys the value through its operations table
/// and then frees the storage.
///
/// The bytes are raw value representation;
/// the box may be moved freely, as opaque values carry no interior
/// pointers into their own storage.
pub struct OpaqueBox
{
    meta: &'static TypeMetadata,
    storage: Storage,
}

impl OpaqueBox
{
    fn layout(meta: &'static TypeMetadata) -> Layout
    {
        let ops = meta.ops();
        match Layout::from_size_align(ops.size, ops.align) {
            Ok(layout) => layout,
            Err(_) => panic!(
                "value-operations table declares impossible layout \
                 (size {}, align {})",
                ops.size, ops.align,
            ),
        }
    }

    fn allocate(meta: &'static TypeMetadata) -> Self
    {
        let layout = Self::layout(meta);

        let fits_inline = layout.size() <= size_of::<InlineBuf>()
            && layout.align() <= align_of::<InlineBuf>();

        let storage = if fits_inline {
            Storage::Inline(MaybeUninit::uninit())
        } else {
            // SAFETY: The layout has non-zero size,
            // as zero-sized values always fit inline.
            let pointer = unsafe { alloc(layout) };
            match NonNull::new(pointer) {
                Some(pointer) => Storage::Heap(pointer),
                None => handle_alloc_error(layout),
            }
        };

        Self{meta, storage}
    }

    /// Copy the value at `source` into fresh, uniquely owned storage.
    ///
    /// # Safety
    ///
    /// `source` must point to a live value of the type `meta`
    /// describes, and must stay live for the duration of the call.
    pub unsafe fn copy_from(meta: &'static TypeMetadata, source: *const u8)
        -> Self
    {
        let mut this = Self::allocate(meta);
        (meta.ops().copy_init)(this.as_mut_ptr(), source);
        this
    }

    /// Metadata of the contained value's type.
    pub fn metadata(&self) -> &'static TypeMetadata
    {
        self.meta
    }

    fn as_ptr(&self) -> *const u8
    {
        match &self.storage {
            Storage::Inline(buffer) => buffer.as_ptr() as *const u8,
            Storage::Heap(pointer) => pointer.as_ptr(),
        }
    }

    fn as_mut_ptr(&mut self) -> *mut u8
    {
        match &mut self.storage {
            Storage::Inline(buffer) => buffer.as_mut_ptr() as *mut u8,
            Storage::Heap(pointer) => pointer.as_ptr(),
        }
    }

    /// The raw bytes of the contained value.
    pub fn bytes(&self) -> &[u8]
    {
        // SAFETY: The storage holds an initialized value of the
        // declared size.
        unsafe { slice::from_raw_parts(self.as_ptr(), self.meta.ops().size) }
    }

    /// Borrow the contained value as a `T`.
    ///
    /// # Panics
    ///
    /// Panics if `T`'s layout does not match the declared one.
    ///
    /// # Safety
    ///
    /// `T` must be the native representation of the contained value.
    pub unsafe fn downcast_ref<T>(&self) -> &T
    {
        let ops = self.meta.ops();
        assert!(
            size_of::<T>() == ops.size && align_of::<T>() == ops.align,
            "downcast layout mismatch: asked for size {} align {}, \
             value has size {} align {}",
            size_of::<T>(), align_of::<T>(), ops.size, ops.align,
        );
        &*(self.as_ptr() as *const T)
    }
}

impl Drop for OpaqueBox
{
    fn drop(&mut self)
    {
        // SAFETY: The box holds an initialized value;
        // after destroy the bytes are dead and only freed.
        unsafe { (self.meta.ops().destroy)(self.as_mut_ptr()) };

        if let Storage::Heap(pointer) = &self.storage {
            let layout = Self::layout(self.meta);
            // SAFETY: Allocated in allocate() with the same layout.
            unsafe { dealloc(pointer.as_ptr(), layout) };
        }
    }
}

impl fmt::Debug for OpaqueBox
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        f.debug_struct("OpaqueBox")
            .field("size", &self.meta.ops().size)
            .field("inline", &matches!(self.storage, Storage::Inline(_)))
            .finish()
    }
}
