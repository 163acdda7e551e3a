use std::cmp::Ordering;

/// Returns the rightmost index `i` with `keys[i] <= target`, or -1 when the
/// target is smaller than every key.
///
/// Callers derive both the child to descend into and the insertion point for
/// a new key as `separator_index(..) + 1`, so the right pointer covers all
/// values greater than or equal to the target. Equal keys resolve to their
/// own index, which routes them to the right child.
pub fn separator_index<K: Ord>(keys: &[K], target: &K) -> isize {
    locate(keys, target, 0, keys.len() as isize - 1)
}

/// Binary search that decides from the midpoint and its immediate neighbor
/// instead of narrowing to an exact match.
fn locate<K: Ord>(keys: &[K], target: &K, left: isize, right: isize) -> isize {
    if right < 0 {
        return -1;
    }
    let mid = (left + right) / 2;
    match keys[mid as usize].cmp(target) {
        Ordering::Equal => mid,
        Ordering::Less => {
            // Everything up to mid is <= target; check whether the run of
            // smaller keys ends here.
            if mid + 1 > right {
                return right;
            }
            match keys[(mid + 1) as usize].cmp(target) {
                Ordering::Equal => mid + 1,
                Ordering::Greater => mid,
                Ordering::Less => locate(keys, target, mid + 1, right),
            }
        }
        Ordering::Greater => {
            if mid - 1 < left {
                return -1;
            }
            match keys[(mid - 1) as usize].cmp(target) {
                Ordering::Equal => mid - 1,
                Ordering::Less => mid - 1,
                Ordering::Greater => locate(keys, target, left, mid - 1),
            }
        }
    }
}
