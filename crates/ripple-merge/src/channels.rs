//! Channel lists, ordered by a caller-supplied multi-key sort and keyed by cid.

use std::cmp::Ordering;
use std::collections::HashSet;

use ripple_types::ChatChannel;
use ripple_types::query::{ChannelSortKey, Sorting};

use crate::{ListChange, dedup_last_wins, partition_changes, uniquely_merged};

/// Total order over channels: the sort keys in turn, then cid.
///
/// The final cid comparison keeps the order total so equal sort values never
/// depend on input order.
pub fn compare(a: &ChatChannel, b: &ChatChannel, sorting: &[Sorting<ChannelSortKey>]) -> Ordering {
    sorting
        .iter()
        .map(|sort| {
            let ordering = compare_key(a, b, sort.key);
            if sort.ascending {
                ordering
            } else {
                ordering.reverse()
            }
        })
        .find(|ordering| ordering.is_ne())
        .unwrap_or_else(|| a.cid.cmp(&b.cid))
}

fn compare_key(a: &ChatChannel, b: &ChatChannel, key: ChannelSortKey) -> Ordering {
    match key {
        ChannelSortKey::LastMessageAt => a
            .last_message_at
            .unwrap_or(a.created_at)
            .cmp(&b.last_message_at.unwrap_or(b.created_at)),
        ChannelSortKey::CreatedAt => a.created_at.cmp(&b.created_at),
        ChannelSortKey::UpdatedAt => a.updated_at.cmp(&b.updated_at),
        ChannelSortKey::MemberCount => a.member_count.cmp(&b.member_count),
        ChannelSortKey::UnreadCount => a.unread_count.cmp(&b.unread_count),
        ChannelSortKey::Cid => a.cid.cmp(&b.cid),
    }
}

pub fn sort(channels: &mut [ChatChannel], sorting: &[Sorting<ChannelSortKey>]) {
    channels.sort_by(|a, b| compare(a, b, sorting));
}

/// Applies a batch of incremental changes to a sorted channel list.
pub fn apply_changes(
    current: &[ChatChannel],
    changes: Vec<ListChange<ChatChannel>>,
    sorting: &[Sorting<ChannelSortKey>],
) -> Vec<ChatChannel> {
    debug_assert!(validate_unique(current));
    debug_assert!(validate_sorted(current, sorting));

    let (removed, mut upserts) = partition_changes(changes, |c| c.cid.clone());
    sort(&mut upserts, sorting);

    let upserted: HashSet<_> = upserts.iter().map(|c| &c.cid).collect();
    let retained: Vec<ChatChannel> = current
        .iter()
        .filter(|c| !removed.contains(&c.cid) && !upserted.contains(&c.cid))
        .cloned()
        .collect();

    let result = uniquely_merged(
        retained,
        upserts,
        |a, b| compare(a, b, sorting).is_lt(),
        |existing, incoming| removed.contains(&existing.cid) || existing.cid == incoming.cid,
    );

    debug_assert!(validate_unique(&result));
    debug_assert!(validate_sorted(&result, sorting));
    result
}

/// Folds a freshly fetched page of channels into the list.
pub fn merged(
    current: &[ChatChannel],
    page: Vec<ChatChannel>,
    sorting: &[Sorting<ChannelSortKey>],
) -> Vec<ChatChannel> {
    debug_assert!(validate_unique(current));
    debug_assert!(validate_sorted(current, sorting));

    let mut page = dedup_last_wins(page, |c| c.cid.clone());
    sort(&mut page, sorting);

    let fetched: HashSet<_> = page.iter().map(|c| &c.cid).collect();
    let retained: Vec<ChatChannel> = current
        .iter()
        .filter(|c| !fetched.contains(&c.cid))
        .cloned()
        .collect();

    let result = uniquely_merged(
        retained,
        page,
        |a, b| compare(a, b, sorting).is_lt(),
        |existing, incoming| existing.cid == incoming.cid,
    );

    debug_assert!(validate_unique(&result));
    debug_assert!(validate_sorted(&result, sorting));
    result
}

/// No two channels share a cid.
pub fn validate_unique(channels: &[ChatChannel]) -> bool {
    let mut seen = HashSet::with_capacity(channels.len());
    channels.iter().all(|c| seen.insert(&c.cid))
}

/// Re-sorting with the same comparator yields the same order.
pub fn validate_sorted(channels: &[ChatChannel], sorting: &[Sorting<ChannelSortKey>]) -> bool {
    channels
        .windows(2)
        .all(|w| compare(&w[0], &w[1], sorting).is_le())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use proptest::prelude::*;
    use ripple_types::ChannelId;
    use ripple_types::payloads::ChannelConfig;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn channel(id: &str, last_message: i64, unread: u32) -> ChatChannel {
        ChatChannel {
            cid: ChannelId::new("messaging", id),
            name: Some(id.to_string()),
            created_at: at(0),
            updated_at: at(0),
            deleted_at: None,
            truncated_at: None,
            last_message_at: Some(at(last_message)),
            member_count: 2,
            is_frozen: false,
            config: ChannelConfig::default(),
            preview_message_id: None,
            unread_count: unread,
            extra_data: Default::default(),
        }
    }

    fn by_activity() -> Vec<Sorting<ChannelSortKey>> {
        vec![
            Sorting::descending(ChannelSortKey::LastMessageAt),
            Sorting::descending(ChannelSortKey::UnreadCount),
        ]
    }

    fn ids(channels: &[ChatChannel]) -> Vec<&str> {
        channels.iter().map(|c| c.cid.id()).collect()
    }

    #[test]
    fn multi_key_ordering_with_cid_tiebreak() {
        let mut channels = vec![
            channel("c", 5, 0),
            channel("b", 5, 3),
            channel("a", 9, 0),
            channel("d", 5, 3),
        ];
        sort(&mut channels, &by_activity());
        assert_eq!(ids(&channels), ["a", "b", "d", "c"]);
        assert!(validate_sorted(&channels, &by_activity()));
    }

    #[test]
    fn channel_with_new_activity_moves_to_the_top() {
        let sorting = by_activity();
        let current = vec![channel("a", 9, 0), channel("b", 5, 0), channel("c", 1, 0)];

        let result = apply_changes(&current, vec![ListChange::Upsert(channel("c", 20, 1))], &sorting);

        assert_eq!(ids(&result), ["c", "a", "b"]);
        assert!(validate_unique(&result));
    }

    #[test]
    fn removal_of_trailing_channel() {
        let sorting = by_activity();
        let current = vec![channel("a", 9, 0), channel("b", 5, 0)];
        let result = apply_changes(&current, vec![ListChange::Remove(channel("b", 5, 0))], &sorting);
        assert_eq!(ids(&result), ["a"]);
    }

    #[test]
    fn channel_removed_then_upserted_in_one_batch_is_kept() {
        let sorting = by_activity();
        let result = apply_changes(
            &[],
            vec![
                ListChange::Remove(channel("a", 9, 0)),
                ListChange::Upsert(channel("a", 9, 0)),
                ListChange::Upsert(channel("x", 5, 0)),
            ],
            &sorting,
        );
        assert_eq!(ids(&result), ["a", "x"]);
    }

    #[test]
    fn merged_page_replaces_stale_entries() {
        let sorting = by_activity();
        let current = vec![channel("a", 9, 0), channel("b", 5, 0)];
        let page = vec![channel("b", 12, 0), channel("e", 7, 0)];

        let result = merged(&current, page, &sorting);
        assert_eq!(ids(&result), ["b", "a", "e"]);
    }

    #[test]
    fn empty_sort_orders_by_cid() {
        let mut channels = vec![channel("z", 1, 0), channel("m", 2, 0)];
        sort(&mut channels, &[]);
        assert_eq!(ids(&channels), ["m", "z"]);
    }

    fn change_strategy() -> impl Strategy<Value = ListChange<ChatChannel>> {
        (0u8..10, 0i64..8, 0u32..3, any::<bool>()).prop_map(|(id, last, unread, remove)| {
            let c = channel(&format!("c{id}"), last, unread);
            if remove {
                ListChange::Remove(c)
            } else {
                ListChange::Upsert(c)
            }
        })
    }

    proptest! {
        #[test]
        fn changes_keep_list_unique_sorted_and_idempotent(
            seed in proptest::collection::vec(change_strategy(), 0..20),
            batch in proptest::collection::vec(change_strategy(), 0..20),
        ) {
            let sorting = by_activity();
            let current = apply_changes(&[], seed, &sorting);
            let once = apply_changes(&current, batch.clone(), &sorting);
            let twice = apply_changes(&once, batch, &sorting);

            prop_assert!(validate_unique(&once));
            prop_assert!(validate_sorted(&once, &sorting));

            let mut resorted = once.clone();
            sort(&mut resorted, &sorting);
            prop_assert_eq!(ids(&resorted), ids(&once));
            prop_assert_eq!(ids(&once), ids(&twice));
        }

        #[test]
        fn changes_match_a_keyed_fold(
            seed in proptest::collection::vec(change_strategy(), 0..20),
            batch in proptest::collection::vec(change_strategy(), 0..20),
        ) {
            let sorting = by_activity();
            let current = apply_changes(&[], seed, &sorting);

            let mut expected: BTreeMap<String, (Option<DateTime<Utc>>, u32)> = current
                .iter()
                .map(|c| (c.cid.to_string(), (c.last_message_at, c.unread_count)))
                .collect();
            for change in &batch {
                let c = change.item();
                if change.is_remove() {
                    expected.remove(&c.cid.to_string());
                } else {
                    expected.insert(c.cid.to_string(), (c.last_message_at, c.unread_count));
                }
            }

            let result = apply_changes(&current, batch, &sorting);
            let actual: BTreeMap<String, (Option<DateTime<Utc>>, u32)> = result
                .iter()
                .map(|c| (c.cid.to_string(), (c.last_message_at, c.unread_count)))
                .collect();
            prop_assert_eq!(result.len(), actual.len());
            prop_assert_eq!(actual, expected);
        }

        #[test]
        fn merging_a_page_keeps_invariants(
            seed in proptest::collection::vec(change_strategy(), 0..20),
            page in proptest::collection::vec(change_strategy(), 0..20),
        ) {
            let sorting = by_activity();
            let current = apply_changes(&[], seed, &sorting);
            let page: Vec<ChatChannel> = page.into_iter().map(|c| c.item().clone()).collect();
            let result = merged(&current, page, &sorting);

            prop_assert!(validate_unique(&result));
            prop_assert!(validate_sorted(&result, &sorting));
        }
    }
}
