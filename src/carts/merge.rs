use std::collections::HashMap;

use crate::carts::CartItem;

/// Fold `source` lines into `target`.
///
/// Lines sharing a product id have their quantities summed on the target line;
/// other source lines are appended unchanged, keeping their id, `added_at` and
/// metadata. Target order is preserved and appended lines follow source order.
///
/// Returns the offending product id if a summed quantity would overflow.
pub fn merge_items(target: &mut Vec<CartItem>, source: &[CartItem]) -> Result<(), String> {
    let mut positions: HashMap<String, usize> = target
        .iter()
        .enumerate()
        .map(|(index, item)| (item.product_id.clone(), index))
        .collect();

    for item in source {
        match positions.get(&item.product_id) {
            Some(&index) => {
                let line = &mut target[index];
                line.quantity = line
                    .quantity
                    .checked_add(item.quantity)
                    .ok_or_else(|| item.product_id.clone())?;
            }
            None => {
                positions.insert(item.product_id.clone(), target.len());
                target.push(item.clone());
            }
        }
    }

    Ok(())
}
