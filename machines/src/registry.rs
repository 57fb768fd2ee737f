//! Board registry for automatic front-end discovery.
//!
//! Each board self-registers via [`inventory::submit!`] with a
//! [`BoardEntry`] containing its CLI name, a one-line description and a
//! function producing its [`BoardProfile`]. The front-end discovers
//! available boards at runtime without any central list.

use crate::profile::BoardProfile;

/// Describes a registered board.
pub struct BoardEntry {
    /// CLI name used to select this board (e.g., "gauntlet").
    pub name: &'static str,
    pub description: &'static str,
    /// Build the board's profile.
    pub profile: fn() -> BoardProfile,
}

impl BoardEntry {
    pub const fn new(
        name: &'static str,
        description: &'static str,
        profile: fn() -> BoardProfile,
    ) -> Self {
        Self {
            name,
            description,
            profile,
        }
    }
}

inventory::collect!(BoardEntry);

/// Return all registered boards, sorted by name.
pub fn all() -> Vec<&'static BoardEntry> {
    let mut entries: Vec<_> = inventory::iter::<BoardEntry>.into_iter().collect();
    entries.sort_by_key(|e| e.name);
    entries
}

/// Look up a board by its CLI name.
pub fn find(name: &str) -> Option<&'static BoardEntry> {
    inventory::iter::<BoardEntry>
        .into_iter()
        .find(|e| e.name == name)
}
