//! Translation of raw mutation notifications into semantic changes.
//!
//! One translation pass turns a batch of [`MutationRecord`]s into an
//! ordered list of block-level [`ChangeDescriptor`]s. Delivery order is
//! preserved and no deduplication is performed: several notifications
//! mapping to the same block yield several descriptors, and the applier
//! tolerates the redundancy.

use crate::mutation::{MutationKind, MutationRecord, NodeRef};
use crate::surface::RenderSurface;
use crate::types::{ChangeDescriptor, ChangeType};

/// Translate one batch of mutation notifications.
///
/// Classification is by presence: added nodes make a change an `Add`,
/// otherwise removed nodes make it a `Remove`, otherwise it is an
/// `Update`. Mutations that resolve to no block wrapper happened outside
/// the editing region and are dropped silently. Attribute mutations on a
/// block wrapper itself are functional bookkeeping and never forwarded;
/// attribute mutations deeper in a block are forwarded like content
/// mutations.
pub fn translate(surface: &dyn RenderSurface, batch: &[MutationRecord]) -> Vec<ChangeDescriptor> {
    let mut changed = Vec::new();

    for record in batch {
        match record.kind {
            MutationKind::ChildList | MutationKind::CharacterData => {
                // Wrappers leaving the region can no longer be located by
                // resolution; position them by their reported next sibling.
                let removed_wrappers: Vec<&NodeRef> = record
                    .removed
                    .iter()
                    .filter(|node| surface.is_block_wrapper(node))
                    .collect();
                if !removed_wrappers.is_empty() {
                    let index = removal_index(surface, record);
                    for wrapper in removed_wrappers {
                        changed.push(ChangeDescriptor {
                            change_type: ChangeType::Remove,
                            index,
                            element: *wrapper,
                        });
                    }
                    continue;
                }

                if let Some(descriptor) = classify_content(surface, record) {
                    changed.push(descriptor);
                }
            }
            MutationKind::Attributes => {
                // Attribute changes on the wrapper element itself are
                // internal bookkeeping.
                if surface.is_block_wrapper(&record.target) {
                    continue;
                }
                if let Some(descriptor) = classify_content(surface, record) {
                    changed.push(descriptor);
                }
            }
        }
    }

    changed
}

/// Resolve a content mutation to its enclosing block and current index.
fn classify_content(
    surface: &dyn RenderSurface,
    record: &MutationRecord,
) -> Option<ChangeDescriptor> {
    let wrapper = surface.resolve_block_element(&record.target)?;
    let index = surface
        .block_elements()
        .iter()
        .position(|element| *element == wrapper)?;

    let change_type = if !record.added.is_empty() {
        ChangeType::Add
    } else if !record.removed.is_empty() {
        ChangeType::Remove
    } else {
        ChangeType::Update
    };

    Some(ChangeDescriptor {
        change_type,
        index,
        element: wrapper,
    })
}

/// The display slot a removed wrapper occupied: the current position of
/// its next sibling, or the end of the region when it was last.
fn removal_index(surface: &dyn RenderSurface, record: &MutationRecord) -> usize {
    let elements = surface.block_elements();
    record
        .next_sibling
        .as_ref()
        .and_then(|node| surface.resolve_block_element(node))
        .and_then(|wrapper| elements.iter().position(|element| *element == wrapper))
        .unwrap_or(elements.len())
}
