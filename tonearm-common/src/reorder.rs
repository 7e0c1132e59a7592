//! Ordered-list reordering
//!
//! Position reassignment shared by the per-perspective queue and the playlist
//! track lists. Every operation takes the list in position order, applies the
//! change and renumbers the non-ignored items to `1..n` in stable order.
//!
//! The functions are pure: persisting the renumbered list (and the removed
//! item, if any) is the caller's job and must happen inside one transaction.

/// A row that owns a 1-based position in an ordered list
///
/// `ignored` is a transient soft-delete marker: ignored items keep their slot
/// in the vector but take no part in numbering.
pub trait Positionable {
    fn position(&self) -> i64;
    fn set_position(&mut self, position: i64);
    fn is_ignored(&self) -> bool;
    fn set_ignored(&mut self, ignored: bool);
}

/// Renumber non-ignored items to `1..n`, keeping their order
fn renumber<T: Positionable>(list: &mut [T]) {
    let mut next = 1;
    for item in list.iter_mut().filter(|item| !item.is_ignored()) {
        item.set_position(next);
        next += 1;
    }
}

fn live_len<T: Positionable>(list: &[T]) -> i64 {
    list.iter().filter(|item| !item.is_ignored()).count() as i64
}

fn index_of<T: Positionable>(list: &[T], position: i64) -> Option<usize> {
    list.iter()
        .position(|item| !item.is_ignored() && item.position() == position)
}

/// Append `items` to the end of `list`
pub fn append_to<T, I>(mut list: Vec<T>, items: I) -> Vec<T>
where
    T: Positionable,
    I: IntoIterator<Item = T>,
{
    list.extend(items);
    renumber(&mut list);
    list
}

/// Insert `items` so the first of them lands at `pos`
///
/// `pos <= 1` prepends, a `pos` past the end degrades to an append.
pub fn insert_into<T, I>(mut list: Vec<T>, pos: i64, items: I) -> Vec<T>
where
    T: Positionable,
    I: IntoIterator<Item = T>,
{
    let index = if pos <= 1 {
        0
    } else if pos <= live_len(&list) {
        index_of(&list, pos).unwrap_or(list.len())
    } else {
        list.len()
    };

    list.splice(index..index, items);
    renumber(&mut list);
    list
}

/// Remove the item at `pos`
///
/// The removed item comes back with its ignore marker set. When nothing
/// occupies `pos` the list is returned untouched together with `None`.
pub fn delete_at<T: Positionable>(mut list: Vec<T>, pos: i64) -> (Vec<T>, Option<T>) {
    let Some(index) = index_of(&list, pos) else {
        return (list, None);
    };

    let mut removed = list.remove(index);
    removed.set_ignored(true);
    renumber(&mut list);
    (list, Some(removed))
}

/// Move the item at `from` so it ends up at `to`
///
/// No-op when `to == from`, when `from < 1`, or when nothing occupies `from`.
/// All other items keep their relative order.
pub fn move_to<T: Positionable>(mut list: Vec<T>, to: i64, from: i64) -> Vec<T> {
    if to == from || from < 1 {
        return list;
    }
    let Some(index) = index_of(&list, from) else {
        return list;
    };

    let moved = list.remove(index);
    let forward = from < to;
    let (mut before, after): (Vec<T>, Vec<T>) = list
        .into_iter()
        .partition(|item| item.position() < to || (forward && item.position() == to));

    before.push(moved);
    before.extend(after);
    renumber(&mut before);
    before
}

/// Take the head of the list (position 1)
pub fn pop<T: Positionable>(list: Vec<T>) -> (Vec<T>, Option<T>) {
    delete_at(list, 1)
}
