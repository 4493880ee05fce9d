//! Conflict resolution
//!
//! A sync pass reports every divergent cell as a [`ConflictEntry`]. A resolver
//! picks the value that should win for each cell; the picks are then folded
//! back into the buffered changes so the next pass can apply them.

use std::collections::BTreeMap;

use crate::db::Value;

use super::types::{ConflictEntry, ConflictStatus, PendingChange, PendingKind};

/// Ready-made resolution strategies
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// Persist the locally buffered value
    #[default]
    KeepLocal,
    /// Keep whatever the source holds
    KeepSource,
}

impl ConflictPolicy {
    pub fn resolve(&self, conflict: &ConflictEntry) -> Value {
        match self {
            ConflictPolicy::KeepLocal => conflict.local.clone(),
            ConflictPolicy::KeepSource => conflict.source.clone(),
        }
    }

    /// The policy as a resolver closure
    pub fn resolver(self) -> impl FnMut(&ConflictEntry) -> Value {
        move |conflict| self.resolve(conflict)
    }
}

/// Extract the key column values of a full row
pub(crate) fn key_of(values: &[Value], key_indexes: &[usize]) -> Vec<Value> {
    key_indexes.iter().map(|&i| values[i].clone()).collect()
}

/// Fold resolved values into the pending changes
///
/// Returns the number of cells resolved.
pub(crate) fn apply_resolutions<F>(
    pending: &mut Vec<PendingChange>,
    key_indexes: &[usize],
    conflicts: &[ConflictEntry],
    resolver: &mut F,
) -> usize
where
    F: FnMut(&ConflictEntry) -> Value,
{
    // Group cells by row, keeping report order
    let mut groups: Vec<(ConflictStatus, &[Value], Vec<(&ConflictEntry, Value)>)> = Vec::new();
    for conflict in conflicts {
        let resolved = resolver(conflict);
        match groups
            .iter_mut()
            .find(|(status, key, _)| *status == conflict.status && *key == conflict.row_key.as_slice())
        {
            Some((_, _, cells)) => cells.push((conflict, resolved)),
            None => groups.push((
                conflict.status,
                conflict.row_key.as_slice(),
                vec![(conflict, resolved)],
            )),
        }
    }

    let mut resolved_cells = 0;
    for (status, row_key, cells) in groups {
        let Some(position) = find_pending(pending, key_indexes, status, row_key) else {
            tracing::warn!(?status, key = ?row_key, "No buffered change matches conflict");
            continue;
        };
        resolved_cells += cells.len();

        // A vanished row nobody wants back is simply forgotten
        if status == ConflictStatus::Delete && cells.iter().all(|(_, value)| value.is_null()) {
            pending.remove(position);
            continue;
        }

        let change = &mut pending[position];
        match (status, &mut change.kind) {
            (ConflictStatus::Update, PendingKind::Update { original, changed, .. }) => {
                for (conflict, value) in cells {
                    original[conflict.column_index] = conflict.source.clone();
                    changed.insert(conflict.column_index, value);
                }
            }
            (ConflictStatus::Insert, PendingKind::Insert { values, page }) => {
                // The existing source row becomes the baseline of an update
                let mut original = values.clone();
                let mut wanted = values.clone();
                for (conflict, value) in cells {
                    original[conflict.column_index] = conflict.source.clone();
                    wanted[conflict.column_index] = value;
                }
                change.kind = PendingKind::Update {
                    key: row_key.to_vec(),
                    original,
                    changed: wanted.into_iter().enumerate().collect::<BTreeMap<_, _>>(),
                    page: *page,
                };
            }
            (ConflictStatus::Delete, PendingKind::Update { original, changed, page, .. }) => {
                let mut values = original.clone();
                for (index, value) in changed.iter() {
                    values[*index] = value.clone();
                }
                for (conflict, value) in cells {
                    values[conflict.column_index] = value;
                }
                change.kind = PendingKind::Insert { values, page: *page };
            }
            _ => unreachable!("find_pending matches status to change kind"),
        }
    }
    resolved_cells
}

fn find_pending(
    pending: &[PendingChange],
    key_indexes: &[usize],
    status: ConflictStatus,
    row_key: &[Value],
) -> Option<usize> {
    pending.iter().position(|change| match (&change.kind, status) {
        (PendingKind::Update { key, .. }, ConflictStatus::Update | ConflictStatus::Delete) => {
            key.as_slice() == row_key
        }
        (PendingKind::Insert { values, .. }, ConflictStatus::Insert) => {
            key_of(values, key_indexes) == row_key
        }
        _ => false,
    })
}
