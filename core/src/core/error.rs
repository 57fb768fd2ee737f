use thiserror::Error;

/// Errors raised while configuring an engine at machine start.
///
/// Steady-state operations never fail; only construction validates the
/// per-machine tables it is handed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("motion object descriptor: {0}")]
    MotionObject(&'static str),

    #[error("playfield descriptor: {0}")]
    Playfield(&'static str),

    #[error("interrupt priority table: {0}")]
    Priority(String),

    #[error("address map: binding {start:#08x}-{end:#08x} {reason}")]
    AddressMap {
        start: u32,
        end: u32,
        reason: &'static str,
    },

    #[error("unknown slapstic chip 137412-{0}")]
    UnknownSlapstic(u16),

    #[error("slapstic window: {0}")]
    SlapsticWindow(&'static str),

    #[error("palette: {0}")]
    Palette(&'static str),

    #[error("nvram: {0}")]
    Nvram(String),

    #[error("scanline scheduler: {0}")]
    Scheduler(&'static str),

    #[error("sound bridge: {0}")]
    SoundBridge(&'static str),

    #[error("speed-up rule `{0}` has not been verified for this board")]
    UnverifiedSpeedup(String),
}

/// Errors crossing the persistent-storage boundary.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid storage key `{0}`")]
    InvalidKey(String),
}
