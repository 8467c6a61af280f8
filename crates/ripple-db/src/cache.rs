use std::collections::HashSet;

/// Ids already written (or known to exist) during the current unit of work.
///
/// Saving a page of messages touches the same authors and channel over and
/// over; the cache lets the session skip those repeated upserts. A cache must
/// not outlive the session it was filled in.
#[derive(Debug, Default)]
pub struct PreWarmedCache {
    users: HashSet<String>,
    channels: HashSet<String>,
    messages: HashSet<String>,
    reactions: HashSet<String>,
}

impl PreWarmedCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the message set, e.g. with ids loaded for the current page.
    pub fn prewarm_messages<I, S>(&mut self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.messages.extend(ids.into_iter().map(Into::into));
    }

    pub fn has_user(&self, id: &str) -> bool {
        self.users.contains(id)
    }

    pub fn has_channel(&self, cid: &str) -> bool {
        self.channels.contains(cid)
    }

    pub fn has_message(&self, id: &str) -> bool {
        self.messages.contains(id)
    }

    pub fn has_reaction(&self, id: &str) -> bool {
        self.reactions.contains(id)
    }

    pub(crate) fn insert_user(&mut self, id: &str) {
        self.users.insert(id.to_string());
    }

    pub(crate) fn insert_channel(&mut self, cid: &str) {
        self.channels.insert(cid.to_string());
    }

    pub(crate) fn insert_message(&mut self, id: &str) {
        self.messages.insert(id.to_string());
    }

    pub(crate) fn insert_reaction(&mut self, id: &str) {
        self.reactions.insert(id.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prewarm_marks_messages_known() {
        let mut cache = PreWarmedCache::new();
        cache.prewarm_messages(["m1", "m2"]);
        assert!(cache.has_message("m1"));
        assert!(!cache.has_message("m3"));
        assert!(!cache.has_user("m1"));
    }
}
