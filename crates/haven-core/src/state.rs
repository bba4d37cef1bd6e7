//! Shared cross-platform state types.

/// Global sync indicator, distinct from per-record [`crate::SyncStatus`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SyncState {
    #[default]
    Idle,
    Uploading,
    Downloading,
    Synced,
    Failed,
}

impl SyncState {
    /// Whether a sync pass is currently in flight.
    pub const fn is_busy(self) -> bool {
        matches!(self, Self::Uploading | Self::Downloading)
    }
}
