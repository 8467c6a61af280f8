/// Merges two sequences that are each sorted by `lt` into one sorted sequence.
///
/// This is the merge step of merge sort with one change: before a candidate
/// is appended, the element placed just before it is popped if
/// `replaces(last, candidate)` holds. Duplicates therefore collapse to the
/// later-positioned element, provided they sort next to each other under `lt`.
///
/// When `lt` reports neither element as smaller, the incoming element is
/// placed first.
pub fn uniquely_merged<T, L, R>(
    existing: impl IntoIterator<Item = T>,
    incoming: impl IntoIterator<Item = T>,
    mut lt: L,
    mut replaces: R,
) -> Vec<T>
where
    L: FnMut(&T, &T) -> bool,
    R: FnMut(&T, &T) -> bool,
{
    let mut existing = existing.into_iter().peekable();
    let mut incoming = incoming.into_iter().peekable();
    let mut merged = Vec::with_capacity(existing.size_hint().0 + incoming.size_hint().0);

    loop {
        let take_existing = match (existing.peek(), incoming.peek()) {
            (Some(current), Some(new)) => lt(current, new),
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (None, None) => break,
        };
        let next = if take_existing {
            existing.next()
        } else {
            incoming.next()
        };
        let Some(candidate) = next else { break };

        if merged.last().is_some_and(|last| replaces(last, &candidate)) {
            merged.pop();
        }
        merged.push(candidate);
    }

    merged
}
