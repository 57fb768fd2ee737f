pub mod address_map;
pub mod bus;
pub mod error;
pub mod gfx;
pub mod storage;

pub use address_map::{AddressMap, Binding, Substitution};
pub use bus::{Bus, BusMaster, InterruptState};
pub use error::{ConfigError, StorageError};
pub use gfx::{GfxBackend, Rect, Surface};
pub use storage::{MemoryStorage, NvramStorage};
