/// Coordinator lifecycle.
///
/// State transitions:
/// ```text
/// uninitialized → initialized → running → shutdown
///                                  ↑          │
///                                  └──────────┘ (initialize again)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    Uninitialized,
    Initialized,
    Running,
    Shutdown,
}

impl CoordinatorState {
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// Whether `initialize` may build a fresh runtime from this state.
    pub fn can_initialize(&self) -> bool {
        matches!(self, Self::Uninitialized | Self::Shutdown)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Initialized => "initialized",
            Self::Running => "running",
            Self::Shutdown => "shutdown",
        }
    }
}
