//! Payload extraction for tagged-union values.
//!
//! The active-variant tag may share bits with the payload instead of
//! occupying a discriminant byte of its own.
//! Reading the payload therefore goes through the host's destructive
//! projection: the payload bits are moved into canonical position in
//! place, which leaves the source value invalid until the tag is
//! injected back.
//! Everything in this module is built around making that restoration
//! unconditional — a caller must never observe the invalid state,
//! whatever path extraction takes out of the projection window.

use super::Child;
use crate::descriptor::FieldFlags;
use crate::descriptor::ReferenceStorageKind;
use crate::metadata::TypeMetadata;
use crate::metadata::UnionMetadata;
use crate::value::OpaqueBox;

use scopeguard::defer;
use scopeguard::guard;

/// Extract the active variant of a tagged-union value.
///
/// Yields at most one child: the active variant's name, paired with an
/// independent copy of its payload (or no value for payload-less and
/// unresolvable payloads).
/// Non-reflectable unions yield no children.
///
/// On return the source instance reports the same active variant as
/// before the call, on every path, including unwinding ones.
pub (super) unsafe fn extract(
    subject: &'static TypeMetadata,
    union: &UnionMetadata,
    instance: *mut u8,
) -> Vec<Child>
{
    let descriptor = match super::reflectable(union.descriptor) {
        Some((descriptor, _kind)) => descriptor,
        None => return Vec::new(),
    };

    // The tag's bit-packing is the host's business;
    // all we require is that it indexes the record array.
    let tag = (union.union_ops.active_tag)(instance);
    if tag as usize >= descriptor.num_fields() {
        panic!(
            "field descriptor at {:p}: active tag {} out of range \
             (descriptor declares {} cases)",
            descriptor.as_ptr(), tag, descriptor.num_fields(),
        );
    }

    let record = descriptor.record(tag as usize);
    let label = record.name().to_string_lossy().into_owned();
    let indirect = record.flags().contains(FieldFlags::INDIRECT_CASE);
    let payload_ty = record.type_name().and_then(|n| subject.type_of(n));

    let value = if indirect {
        extract_boxed(union, instance, tag, payload_ty)
    } else {
        match payload_ty {
            // Payload-less case, or a payload type the catalog cannot
            // resolve: without a resolved type the holder cannot even
            // be sized, so the source is left untouched.
            None => None,
            Some(ty) => Some(extract_inline(union, instance, tag, ty)),
        }
    };

    vec![Child{label, value, storage: ReferenceStorageKind::Strong}]
}

/// Copy an inline payload out of the projection window.
unsafe fn extract_inline(
    union: &UnionMetadata,
    instance: *mut u8,
    tag: u32,
    payload_ty: &'static TypeMetadata,
) -> OpaqueBox
{
    (union.union_ops.project_payload)(instance);

    // From here until the end of the function the source is invalid.
    // The deferred injection restores it on both the success path and
    // the unwinding one (a panicking copy_init must not leave the
    // caller's value broken).
    defer! { (union.union_ops.inject_tag)(instance, tag); }

    OpaqueBox::copy_from(payload_ty, instance)
}

/// Copy a boxed ("indirect") payload.
///
/// The projected bits are a reference to a host heap box.
/// The box is retained for the duration of the copy and released once
/// the payload bytes have been copied out,
/// so the extracted value never aliases the box.
unsafe fn extract_boxed(
    union: &UnionMetadata,
    instance: *mut u8,
    tag: u32,
    payload_ty: Option<&'static TypeMetadata>,
) -> Option<OpaqueBox>
{
    let box_ops = match &union.box_ops {
        Some(box_ops) => box_ops,
        // The descriptor promises an indirect case,
        // but the host registered no box primitives.
        // Proceeding would misread a heap reference as payload bytes.
        None => panic!(
            "tagged union with an indirect case was registered \
             without box operations",
        ),
    };

    let object = {
        (union.union_ops.project_payload)(instance);
        defer! { (union.union_ops.inject_tag)(instance, tag); }

        // The projected bits are the box reference.
        // Retaining it inside the window keeps the box alive even
        // though injection hands the instance its reference back.
        let object = *(instance as *const *mut u8);
        (box_ops.retain)(object);
        object
    };

    // Source restored; the retained box is ours to release.
    let object = guard(object, |object| (box_ops.release)(object));

    let payload = (box_ops.project)(*object);
    payload_ty.map(|ty| OpaqueBox::copy_from(ty, payload))
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::descriptor::DescriptorKind;
    use crate::metadata::ValueOps;
    use crate::mirror::DisplayStyle;
    use crate::mirror::reflect_instance;
    use crate::testutil::DescriptorBuilder;
    use crate::testutil;

    use proptest::proptest;

    // A union with a separate discriminant word.
    // Projection still poisons the discriminant so that tests observe
    // whether restoration really ran.
    #[repr(C)]
    #[derive(Clone)]
    struct MaybeI64
    {
        payload: i64,
        tag: u32,
    }

    const POISON: u32 = 0xDEAD_BEEF;

    unsafe fn maybe_tag(value: *const u8) -> u32
    {
        (*(value as *const MaybeI64)).tag
    }

    unsafe fn maybe_project(value: *mut u8)
    {
        (*(value as *mut MaybeI64)).tag = POISON;
    }

    unsafe fn maybe_inject(value: *mut u8, tag: u32)
    {
        (*(value as *mut MaybeI64)).tag = tag;
    }

    fn maybe_metadata() -> &'static TypeMetadata
    {
        testutil::register_i64();
        let descriptor = DescriptorBuilder::new(DescriptorKind::TaggedUnion)
            .type_name(b"5Maybe")
            .field(b"none", None, FieldFlags::empty())
            .field(b"some", Some(b"i64"), FieldFlags::empty())
            .build();
        testutil::leak(TypeMetadata::TaggedUnion(crate::metadata::UnionMetadata{
            descriptor: Some(descriptor),
            ops: ValueOps::for_type::<MaybeI64>(),
            union_ops: crate::metadata::UnionOps{
                active_tag: maybe_tag,
                project_payload: maybe_project,
                inject_tag: maybe_inject,
            },
            box_ops: None,
        }))
    }

    #[test]
    fn scenario_b_some_payload_extracts_and_restores()
    {
        let metadata = maybe_metadata();
        let mut instance = MaybeI64{payload: 7, tag: 1};
        let ptr = &mut instance as *mut MaybeI64 as *mut u8;

        let mirror = unsafe { reflect_instance(metadata, ptr) };
        assert_eq!(mirror.display(), Some(DisplayStyle::TaggedUnion));
        let children = mirror.children();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].label, "some");
        assert_eq!(
            unsafe { *children[0].value.as_ref().unwrap().downcast_ref::<i64>() },
            7,
        );

        // Re-reflecting still reports the same variant and payload.
        assert_eq!(instance.tag, 1);
        let again = unsafe { reflect_instance(metadata, ptr) };
        assert_eq!(again.children()[0].label, "some");
        assert_eq!(
            unsafe { *again.children()[0].value.as_ref().unwrap().downcast_ref::<i64>() },
            7,
        );
    }

    #[test]
    fn payload_less_variant_leaves_the_source_untouched()
    {
        let metadata = maybe_metadata();
        let mut instance = MaybeI64{payload: 0x55AA, tag: 0};
        let ptr = &mut instance as *mut MaybeI64 as *mut u8;

        let mirror = unsafe { reflect_instance(metadata, ptr) };
        let children = mirror.children();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].label, "none");
        assert!(children[0].value.is_none());

        // No projection happened, so nothing was poisoned.
        assert_eq!(instance.tag, 0);
        assert_eq!(instance.payload, 0x55AA);
    }

    #[test]
    fn stripped_union_descriptor_yields_no_children()
    {
        let metadata = testutil::leak(TypeMetadata::TaggedUnion(
            crate::metadata::UnionMetadata{
                descriptor: None,
                ops: ValueOps::for_type::<MaybeI64>(),
                union_ops: crate::metadata::UnionOps{
                    active_tag: maybe_tag,
                    project_payload: maybe_project,
                    inject_tag: maybe_inject,
                },
                box_ops: None,
            },
        ));
        let mut instance = MaybeI64{payload: 3, tag: 1};
        let mirror = unsafe {
            reflect_instance(metadata, &mut instance as *mut MaybeI64 as *mut u8)
        };
        assert!(mirror.children().is_empty());
    }

    #[test]
    #[should_panic(expected = "active tag 9 out of range")]
    fn tag_past_the_record_array_is_fatal()
    {
        let metadata = maybe_metadata();
        let mut instance = MaybeI64{payload: 0, tag: 9};
        unsafe {
            reflect_instance(metadata, &mut instance as *mut MaybeI64 as *mut u8)
        };
    }

    proptest!
    {
        #[test]
        fn tag_restore_invariant(payload: i64, some: bool)
        {
            let metadata = maybe_metadata();
            let tag = some as u32;
            let mut instance = MaybeI64{payload, tag};
            let ptr = &mut instance as *mut MaybeI64 as *mut u8;

            let before = unsafe { maybe_tag(ptr) };
            let mirror = unsafe { reflect_instance(metadata, ptr) };
            let after = unsafe { maybe_tag(ptr) };

            assert_eq!(before, after);
            assert_eq!(instance.payload, payload);
            assert_eq!(mirror.children().len(), 1);
        }
    }

    mod boxed
    {
        use super::*;

        use std::cell::Cell;

        // Host heap box: refcount header followed by the payload.
        #[repr(C)]
        struct HostBox
        {
            refcount: Cell<usize>,
            payload: i64,
        }

        #[repr(C)]
        #[derive(Clone)]
        struct TreeVal
        {
            object: *mut HostBox,
            tag: u32,
        }

        unsafe fn tree_tag(value: *const u8) -> u32
        {
            (*(value as *const TreeVal)).tag
        }

        unsafe fn tree_project(value: *mut u8)
        {
            (*(value as *mut TreeVal)).tag = POISON;
        }

        unsafe fn tree_inject(value: *mut u8, tag: u32)
        {
            (*(value as *mut TreeVal)).tag = tag;
        }

        unsafe fn box_retain(object: *mut u8)
        {
            let object = &*(object as *const HostBox);
            object.refcount.set(object.refcount.get() + 1);
        }

        unsafe fn box_project(object: *mut u8) -> *mut u8
        {
            &mut (*(object as *mut HostBox)).payload as *mut i64 as *mut u8
        }

        unsafe fn box_release(object: *mut u8)
        {
            let remaining = {
                let shared = &*(object as *const HostBox);
                shared.refcount.set(shared.refcount.get() - 1);
                shared.refcount.get()
            };
            if remaining == 0 {
                drop(Box::from_raw(object as *mut HostBox));
            }
        }

        fn tree_metadata() -> &'static TypeMetadata
        {
            testutil::register_i64();
            let descriptor = DescriptorBuilder::new(DescriptorKind::TaggedUnion)
                .type_name(b"4Tree")
                .field(b"leaf", None, FieldFlags::empty())
                .field(b"node", Some(b"i64"), FieldFlags::INDIRECT_CASE)
                .build();
            testutil::leak(TypeMetadata::TaggedUnion(
                crate::metadata::UnionMetadata{
                    descriptor: Some(descriptor),
                    ops: ValueOps::for_type::<TreeVal>(),
                    union_ops: crate::metadata::UnionOps{
                        active_tag: tree_tag,
                        project_payload: tree_project,
                        inject_tag: tree_inject,
                    },
                    box_ops: Some(crate::metadata::BoxOps{
                        retain: box_retain,
                        project: box_project,
                        release: box_release,
                    }),
                },
            ))
        }

        #[test]
        fn boxed_payload_is_copied_out_of_the_box()
        {
            let metadata = tree_metadata();
            let object = Box::into_raw(Box::new(HostBox{
                refcount: Cell::new(1),
                payload: 712,
            }));
            let mut instance = TreeVal{object, tag: 1};
            let ptr = &mut instance as *mut TreeVal as *mut u8;

            let mirror = unsafe { reflect_instance(metadata, ptr) };
            let children = mirror.children();
            assert_eq!(children.len(), 1);
            assert_eq!(children[0].label, "node");
            assert_eq!(
                unsafe { *children[0].value.as_ref().unwrap().downcast_ref::<i64>() },
                712,
            );

            // Tag restored, and the temporary retain was released.
            assert_eq!(instance.tag, 1);
            unsafe {
                assert_eq!((*object).refcount.get(), 1);
                box_release(object as *mut u8);
            }
        }

        #[test]
        fn boxed_extraction_restores_tag_before_returning()
        {
            let metadata = tree_metadata();
            let object = Box::into_raw(Box::new(HostBox{
                refcount: Cell::new(1),
                payload: -1,
            }));
            let mut instance = TreeVal{object, tag: 1};
            let ptr = &mut instance as *mut TreeVal as *mut u8;

            let before = unsafe { tree_tag(ptr) };
            let _mirror = unsafe { reflect_instance(metadata, ptr) };
            assert_eq!(unsafe { tree_tag(ptr) }, before);
            unsafe { box_release(object as *mut u8) };
        }

        #[test]
        #[should_panic(expected = "without box operations")]
        fn indirect_case_without_box_ops_is_fatal()
        {
            testutil::register_i64();
            let descriptor =
                DescriptorBuilder::new(DescriptorKind::TaggedUnion)
                    .field(b"node", Some(b"i64"), FieldFlags::INDIRECT_CASE)
                    .build();
            let metadata = testutil::leak(TypeMetadata::TaggedUnion(
                crate::metadata::UnionMetadata{
                    descriptor: Some(descriptor),
                    ops: ValueOps::for_type::<TreeVal>(),
                    union_ops: crate::metadata::UnionOps{
                        active_tag: tree_tag,
                        project_payload: tree_project,
                        inject_tag: tree_inject,
                    },
                    box_ops: None,
                },
            ));
            let mut instance = TreeVal{object: core::ptr::null_mut(), tag: 0};
            unsafe {
                reflect_instance(
                    metadata,
                    &mut instance as *mut TreeVal as *mut u8,
                )
            };
        }
    }
}
