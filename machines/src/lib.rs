pub mod board;
pub mod gauntlet;
pub mod profile;
pub mod registry;
pub mod xybots;

pub use board::{Board, BoardError};
pub use profile::BoardProfile;
pub use registry::BoardEntry;
