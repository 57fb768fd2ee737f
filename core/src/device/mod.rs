pub mod interrupt;
pub mod motion_object;
pub mod nvram;
pub mod palette;
pub mod playfield;
pub mod scanline;
pub mod slapstic;
pub mod sound_bridge;
pub mod video_control;

pub use interrupt::{InterruptArbiter, InterruptSource, PriorityEntry};
pub use motion_object::{LinkField, MotionObjectDescriptor, MotionObjectEngine, TraversalOrder};
pub use nvram::{NvramStore, RleDefault, RleLayout, WriteGate};
pub use palette::{PaletteReducer, Rgb};
pub use playfield::{DirtyCache, PlayfieldDescriptor, PlayfieldEngine, PlayfieldSpan, PlayfieldState};
pub use scanline::{ScanlineHandler, ScanlineScheduler};
pub use slapstic::{FetchRedirect, SlapsticProtection};
pub use sound_bridge::{AckRule, SoundBridge, SoundBridgeConfig, SpeedupRule};
pub use video_control::{VideoControlEvent, VideoController};
