//! Transient multi-line accumulation state.
//!
//! Some replies span several lines: member listings, the two halves of a
//! queried topic, and the welcome banner. Each buffer is created by the first
//! partial line, flushed by its terminator and then removed, so state never
//! leaks between unrelated keys.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::role::Role;

/// Which reply family a member listing belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum ListingKind {
    Names,
    Who,
}

/// A member entry collected from a listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Member {
    pub(crate) nick: String,
    pub(crate) role: Role,
}

/// First half of a queried topic, waiting for its "set by" line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct PendingTopic {
    pub(crate) room: String,
    pub(crate) content: String,
}

/// Completed queried topic.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct FlushedTopic {
    pub(crate) content: String,
    pub(crate) set_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
pub(crate) struct ParserBuffers {
    listings: HashMap<(ListingKind, String), Vec<Member>>,
    pending_topic: Option<PendingTopic>,
    banner: Option<Vec<String>>,
}

impl ParserBuffers {
    pub(crate) fn push_member(&mut self, kind: ListingKind, room: &str, member: Member) {
        self.listings
            .entry((kind, room.to_owned()))
            .or_default()
            .push(member);
    }

    /// Remove and return the listing for `room`; empty when none was started.
    pub(crate) fn take_listing(&mut self, kind: ListingKind, room: &str) -> Vec<Member> {
        self.listings
            .remove(&(kind, room.to_owned()))
            .unwrap_or_default()
    }

    pub(crate) fn set_pending_topic(&mut self, room: &str, content: &str) {
        self.pending_topic = Some(PendingTopic {
            room: room.to_owned(),
            content: content.to_owned(),
        });
    }

    /// Complete the pending topic for `room`.
    ///
    /// Returns `None` when no first half is pending or it belongs to another
    /// room; in both cases the pending state is discarded.
    pub(crate) fn take_topic(
        &mut self,
        room: &str,
        set_at: Option<DateTime<Utc>>,
    ) -> Option<FlushedTopic> {
        let pending = self.pending_topic.take()?;
        (pending.room == room).then(|| FlushedTopic {
            content: pending.content,
            set_at,
        })
    }

    /// Begin a banner, discarding any unterminated one.
    pub(crate) fn start_banner(&mut self) { self.banner = Some(Vec::new()); }

    pub(crate) fn push_banner_line(&mut self, line: &str) {
        self.banner.get_or_insert_with(Vec::new).push(line.to_owned());
    }

    /// Finish the banner, joining its fragments with single spaces.
    pub(crate) fn take_banner(&mut self) -> Option<String> {
        self.banner.take().map(|lines| lines.join(" "))
    }

    /// Whether any buffer currently holds state.
    pub(crate) fn is_empty(&self) -> bool {
        self.listings.is_empty() && self.pending_topic.is_none() && self.banner.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listings_are_keyed_by_kind_and_room() {
        let mut buffers = ParserBuffers::default();
        let member = Member {
            nick: "alice".to_owned(),
            role: Role::Owner,
        };
        buffers.push_member(ListingKind::Names, "#a", member.clone());
        buffers.push_member(ListingKind::Who, "#a", member.clone());

        assert_eq!(buffers.take_listing(ListingKind::Names, "#a"), vec![member]);
        assert!(buffers.take_listing(ListingKind::Names, "#b").is_empty());
        assert!(!buffers.is_empty());
        buffers.take_listing(ListingKind::Who, "#a");
        assert!(buffers.is_empty());
    }

    #[test]
    fn topic_for_other_room_is_discarded() {
        let mut buffers = ParserBuffers::default();
        buffers.set_pending_topic("#a", "hello");
        assert!(buffers.take_topic("#b", None).is_none());
        assert!(buffers.take_topic("#a", None).is_none());
    }

    #[test]
    fn banner_joins_fragments() {
        let mut buffers = ParserBuffers::default();
        buffers.start_banner();
        buffers.push_banner_line("one");
        buffers.push_banner_line("two");
        assert_eq!(buffers.take_banner().as_deref(), Some("one two"));
        assert_eq!(buffers.take_banner(), None);
    }
}
