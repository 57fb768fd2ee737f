pub mod core;
pub mod cpu;
pub mod device;

pub mod prelude {
    pub use crate::core::address_map::{AddressMap, Binding, Substitution};
    pub use crate::core::gfx::{GfxBackend, Rect, Surface, TileBlit, Transparency};
    pub use crate::core::storage::{MemoryStorage, NvramStorage};
    pub use crate::core::{Bus, BusMaster, ConfigError, InterruptState, StorageError};
    pub use crate::cpu::{CpuCore, LineState};
}
