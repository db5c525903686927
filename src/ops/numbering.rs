use std::collections::HashMap;

use crate::model::row::MatrixRow;

/// One step of a row's sort path: code, then `sort_order` and `id` as
/// tie-breaks among siblings
type PathStep = (String, i64, String);

fn path_step(row: &MatrixRow) -> PathStep {
    (row.node.code.clone(), row.node.sort_order, row.node.id.clone())
}

/// Sort key for one row: a step per row from its top-most present ancestor
/// down to itself. Siblings with the same code still own distinct prefixes,
/// so every subtree stays contiguous.
///
/// Only rows in the set count as ancestors. A row whose parent is not in the
/// set is treated as root-level.
fn sort_keys(rows: &[MatrixRow]) -> Vec<Vec<PathStep>> {
    let by_id: HashMap<&str, &MatrixRow> = rows.iter().map(|r| (r.id(), r)).collect();
    rows.iter()
        .map(|row| {
            let mut path = vec![path_step(row)];
            let mut cursor = row.parent_id();
            // Bounded walk guards against a cyclic row set
            let mut hops = 0;
            while let Some(parent) = cursor.and_then(|p| by_id.get(p)) {
                if hops >= rows.len() {
                    break;
                }
                path.push(path_step(parent));
                cursor = parent.parent_id();
                hops += 1;
            }
            path.reverse();
            path
        })
        .collect()
}

/// Reorder rows so that every child follows its parent and siblings sort by
/// code.
pub fn order_rows(rows: &mut Vec<MatrixRow>) {
    let keys = sort_keys(rows);
    let mut keyed: Vec<_> = keys.into_iter().zip(rows.drain(..)).collect();
    keyed.sort_by(|a, b| a.0.cmp(&b.0));
    rows.extend(keyed.into_iter().map(|(_, row)| row));
}

/// Assign dotted numbers in the current row order.
///
/// Root-level rows count `1`, `2`, ...; a child takes its parent's number
/// plus its position among the parent's children seen so far. Expects rows in
/// `order_rows` order.
pub fn assign_numbers(rows: &mut [MatrixRow]) {
    let mut root_counter = 0usize;
    let mut numbers: HashMap<String, String> = HashMap::with_capacity(rows.len());
    let mut child_counters: HashMap<String, usize> = HashMap::new();

    for row in rows.iter_mut() {
        let parent_number = row
            .parent_id()
            .and_then(|p| numbers.get(p).map(|n| (p.to_string(), n.clone())));
        let number = match parent_number {
            Some((parent_id, parent_number)) => {
                let counter = child_counters.entry(parent_id).or_insert(0);
                *counter += 1;
                format!("{}.{}", parent_number, counter)
            }
            None => {
                root_counter += 1;
                root_counter.to_string()
            }
        };
        child_counters.insert(row.node.id.clone(), 0);
        numbers.insert(row.node.id.clone(), number.clone());
        row.number = number;
    }
}

/// Order then number. Running it again on the same rows changes nothing.
pub fn number_rows(rows: &mut Vec<MatrixRow>) {
    order_rows(rows);
    assign_numbers(rows);
}
