//! Room roles and their protocol encodings.
//!
//! Names listings prefix each member with a status character and `MODE`
//! changes use a mode letter. Both map onto the fixed [`Role`] vocabulary;
//! anything unknown is a plain member.

use serde::{Deserialize, Serialize};

/// Member role within a room.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Channel operator or founder.
    Owner,
    /// Half-operator or protected member.
    Admin,
    /// Voiced member.
    Participant,
    /// Regular member.
    #[default]
    Member,
}

impl Role {
    /// Role for a names-listing status prefix.
    #[must_use]
    pub const fn from_prefix(prefix: char) -> Self {
        match prefix {
            '~' | '@' => Self::Owner,
            '&' | '%' => Self::Admin,
            '+' => Self::Participant,
            _ => Self::Member,
        }
    }

    /// Role granted by a channel mode letter, if the letter is a role mode.
    #[must_use]
    pub const fn from_mode(mode: char) -> Option<Self> {
        match mode {
            'q' | 'o' => Some(Self::Owner),
            'a' | 'h' => Some(Self::Admin),
            'v' => Some(Self::Participant),
            _ => None,
        }
    }

    /// Split a names entry into its role and bare nick.
    ///
    /// Servers with multi-prefix support may send several status characters;
    /// the first one is the highest and decides the role.
    #[must_use]
    pub fn split_entry(entry: &str) -> (Self, &str) {
        let nick = entry.trim_start_matches(['~', '@', '&', '%', '+']);
        let role = entry.chars().next().map_or(Self::Member, Self::from_prefix);
        (role, nick)
    }

    /// Role implied by WHO reply flags such as `H@` or `G+`.
    #[must_use]
    pub fn from_who_flags(flags: &str) -> Self {
        flags
            .chars()
            .map(Self::from_prefix)
            .find(|role| *role != Self::Member)
            .unwrap_or_default()
    }
}
