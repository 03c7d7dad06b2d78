//! Field extraction into ordered, labeled child lists.
//!
//! [`reflect_instance`] is the single entry point:
//! given live metadata and a raw instance, it produces a [`Mirror`]
//! whose children are independent copies of the instance's fields,
//! in declaration order.
//! Aggregates and reference types share one fixed-offset strategy,
//! tuples walk their explicit element list,
//! and tagged unions go through the extractor in [`union`],
//! the only path that (transiently) mutates the source.

use crate::descriptor::DescriptorKind;
use crate::descriptor::FieldDescriptor;
use crate::descriptor::ReferenceStorageKind;
use crate::metadata::TupleMetadata;
use crate::metadata::TypeMetadata;
use crate::value::OpaqueBox;

mod union;

/// Classification of a reflected value for display purposes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisplayStyle
{
    /// Struct-like value.
    Aggregate,

    /// Reference-type instance.
    Reference,

    /// Tagged-union value.
    TaggedUnion,

    /// Tuple value.
    Tuple,
}

/// One extracted child of a reflected value.
#[derive(Debug)]
pub struct Child
{
    /// The declared field name, or `.N` for tuple elements.
    ///
    /// Labels need not be unique within a mirror.
    pub label: String,

    /// Independent copy of the field's value.
    ///
    /// Absent for payload-less tagged-union cases,
    /// and for fields whose value the engine declines to copy
    /// (non-strong storage).
    pub value: Option<OpaqueBox>,

    /// The ownership modifier the field applies to its referent.
    ///
    /// Non-strong fields are surfaced with this kind and no copied
    /// value; applying strong-copy semantics to them would be wrong,
    /// and the caller is better placed to decide what to do.
    pub storage: ReferenceStorageKind,
}

/// Ordered, labeled snapshot of one value's children.
///
/// The mirror owns its children outright:
/// the source instance may be destroyed before the mirror is read.
pub struct Mirror
{
    subject: &'static TypeMetadata,
    children: Vec<Child>,
    display: Option<DisplayStyle>,
}

impl Mirror
{
    /// Metadata of the reflected value's type.
    pub fn subject(&self) -> &'static TypeMetadata
    {
        self.subject
    }

    /// The extracted children, in field declaration order.
    pub fn children(&self) -> &[Child]
    {
        &self.children
    }

    /// Consume the mirror, keeping the children.
    pub fn into_children(self) -> Vec<Child>
    {
        self.children
    }

    /// Display classification of the subject, if it has one.
    pub fn display(&self) -> Option<DisplayStyle>
    {
        self.display
    }
}

impl core::fmt::Debug for Mirror
{
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result
    {
        f.debug_struct("Mirror")
            .field("children", &self.children)
            .field("display", &self.display)
            .finish_non_exhaustive()
    }
}

/// Reflect one instance into a [`Mirror`].
///
/// Types that are not reflectable — descriptor stripped, reflection
/// opted out, or a kind tag this decoder does not understand — yield
/// an empty child list.
/// That is a designed outcome, not an error.
/// A field whose type the catalog cannot resolve is silently omitted;
/// the remaining fields are still extracted in order.
///
/// # Safety
///
/// `instance` must point to a live, properly aligned value of the
/// type `metadata` describes, and the caller must guarantee exclusive
/// access to it for the duration of the call:
/// tagged-union extraction moves the value through a transient,
/// invalid intermediate state before restoring it.
pub unsafe fn reflect_instance(
    metadata: &'static TypeMetadata,
    instance: *mut u8,
) -> Mirror
{
    let (children, display) = match metadata {
        TypeMetadata::Aggregate(m) => (
            inline_children(metadata, m.descriptor, &m.field_offsets,
                            Some(m.ops.size), instance),
            Some(DisplayStyle::Aggregate),
        ),
        TypeMetadata::Reference(m) => (
            object_children(metadata, m.descriptor, &m.field_offsets,
                            instance),
            Some(DisplayStyle::Reference),
        ),
        TypeMetadata::TaggedUnion(m) => (
            union::extract(metadata, m, instance),
            Some(DisplayStyle::TaggedUnion),
        ),
        TypeMetadata::Tuple(m) => (
            tuple_children(m, instance),
            Some(DisplayStyle::Tuple),
        ),
        TypeMetadata::Other(_) => (Vec::new(), None),
    };

    Mirror{subject: metadata, children, display}
}

/// Whether the descriptor allows field extraction at all.
fn reflectable(descriptor: Option<FieldDescriptor>)
    -> Option<(FieldDescriptor, DescriptorKind)>
{
    let descriptor = descriptor?;
    let kind = descriptor.kind()?;
    Some((descriptor, kind))
}

/// Fixed-offset extraction over an inline byte blob.
unsafe fn inline_children(
    subject: &'static TypeMetadata,
    descriptor: Option<FieldDescriptor>,
    field_offsets: &[usize],
    subject_size: Option<usize>,
    base: *const u8,
) -> Vec<Child>
{
    let (descriptor, _kind) = match reflectable(descriptor) {
        Some(found) => found,
        None => return Vec::new(),
    };

    if field_offsets.len() != descriptor.num_fields() {
        panic!(
            "field descriptor at {:p} declares {} fields \
             but the offset table has {} entries",
            descriptor.as_ptr(), descriptor.num_fields(),
            field_offsets.len(),
        );
    }

    let mut children = Vec::with_capacity(field_offsets.len());

    for (record, &offset) in descriptor.records().zip(field_offsets) {
        let label = record.name().to_string_lossy().into_owned();

        let storage = record.reference_storage();
        if storage != ReferenceStorageKind::Strong {
            children.push(Child{label, value: None, storage});
            continue;
        }

        let ty = match record.type_name().and_then(|n| subject.type_of(n)) {
            Some(ty) => ty,
            // Locally scoped or stripped field type; skip the field
            // and keep going.
            None => continue,
        };

        if let Some(subject_size) = subject_size {
            let end = offset.checked_add(ty.ops().size);
            if end.map_or(true, |end| end > subject_size) {
                panic!(
                    "field descriptor at {:p}: field {:?} at offset {} \
                     with size {} lies outside its {}-byte subject",
                    descriptor.as_ptr(), label, offset, ty.ops().size,
                    subject_size,
                );
            }
        }

        let value = OpaqueBox::copy_from(ty, base.add(offset));
        children.push(Child{label, value: Some(value), storage});
    }

    children
}

/// Fixed-offset extraction for reference types.
///
/// The instance itself is a pointer;
/// fields live behind that one header indirection.
unsafe fn object_children(
    subject: &'static TypeMetadata,
    descriptor: Option<FieldDescriptor>,
    field_offsets: &[usize],
    instance: *const u8,
) -> Vec<Child>
{
    let object = *(instance as *const *const u8);
    if object.is_null() {
        panic!(
            "reference-type instance at {:p} holds a null object pointer",
            instance,
        );
    }

    // The object's total extent is not recorded in the descriptor,
    // so no subject-size bound applies here.
    inline_children(subject, descriptor, field_offsets, None, object)
}

/// Per-element extraction over the explicit tuple element list.
unsafe fn tuple_children(
    tuple: &TupleMetadata,
    base: *const u8,
) -> Vec<Child>
{
    let mut children = Vec::with_capacity(tuple.elements.len());

    for (index, element) in tuple.elements.iter().enumerate() {
        let end = element.offset + element.ty.ops().size;
        if end > tuple.ops.size {
            panic!(
                "tuple element {} spans {}..{} outside its \
                 {}-byte subject",
                index, element.offset, end, tuple.ops.size,
            );
        }

        let value = OpaqueBox::copy_from(element.ty, base.add(element.offset));
        children.push(Child{
            label: format!(".{}", index),
            value: Some(value),
            storage: ReferenceStorageKind::Strong,
        });
    }

    children
}
