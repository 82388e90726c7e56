use std::fmt;

/// Lifecycle of the supervised backend process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendState {
    Starting,
    Running,
    ExitedUnexpectedly,
    Stopping,
    Stopped,
}

impl BackendState {
    pub fn accepts_requests(self) -> bool {
        self == BackendState::Running
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, BackendState::Stopping | BackendState::Stopped)
    }

    /// Apply an event. `None` means the event is meaningless in this state
    /// and the state is left unchanged.
    pub fn on(self, event: SupervisorEvent) -> Option<BackendState> {
        use BackendState::*;
        use SupervisorEvent::*;

        match (self, event) {
            // Shutdown wins from every live state
            (Starting | Running | ExitedUnexpectedly, ShutdownRequested) => Some(Stopping),
            (Starting, Ready) => Some(Running),
            (Starting | Running, ChildExited) => Some(ExitedUnexpectedly),
            (ExitedUnexpectedly, Restart) => Some(Starting),
            (Stopping, ChildExited) => Some(Stopped),
            _ => None,
        }
    }
}

impl fmt::Display for BackendState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendState::Starting => "starting",
            BackendState::Running => "running",
            BackendState::ExitedUnexpectedly => "exited-unexpectedly",
            BackendState::Stopping => "stopping",
            BackendState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorEvent {
    /// Readiness probe answered 200
    Ready,
    /// The supervised child terminated
    ChildExited,
    /// Restart delay elapsed after an unexpected exit
    Restart,
    /// SIGINT/SIGTERM or an explicit stop
    ShutdownRequested,
}

/// Published on the supervisor's watch channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendStatus {
    pub state: BackendState,
    pub pid: Option<u32>,
    pub restarts: u64,
}

impl BackendStatus {
    pub fn starting() -> Self {
        Self {
            state: BackendState::Starting,
            pid: None,
            restarts: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::BackendState::*;
    use super::SupervisorEvent::*;
    use super::*;

    #[test]
    fn test_normal_startup_and_crash_cycle() {
        let state = Starting.on(Ready).unwrap();
        assert_eq!(state, Running);

        let state = state.on(ChildExited).unwrap();
        assert_eq!(state, ExitedUnexpectedly);

        let state = state.on(Restart).unwrap();
        assert_eq!(state, Starting);
    }

    #[test]
    fn test_crash_during_startup_counts_as_unexpected() {
        assert_eq!(Starting.on(ChildExited), Some(ExitedUnexpectedly));
    }

    #[test]
    fn test_shutdown_reachable_from_every_live_state() {
        for state in [Starting, Running, ExitedUnexpectedly] {
            assert_eq!(state.on(ShutdownRequested), Some(Stopping));
        }
        assert_eq!(Stopping.on(ChildExited), Some(Stopped));
    }

    #[test]
    fn test_stopping_never_restarts() {
        assert_eq!(Stopping.on(Restart), None);
        assert_eq!(Stopping.on(Ready), None);
        assert_eq!(Stopped.on(ChildExited), None);
        assert_eq!(Stopped.on(ShutdownRequested), None);
    }

    #[test]
    fn test_ready_only_meaningful_while_starting() {
        assert_eq!(Running.on(Ready), None);
        assert_eq!(ExitedUnexpectedly.on(Ready), None);
    }

    #[test]
    fn test_only_running_accepts_requests() {
        assert!(Running.accepts_requests());
        assert!(!Starting.accepts_requests());
        assert!(!ExitedUnexpectedly.accepts_requests());
        assert!(Stopped.is_terminal());
        assert!(!Running.is_terminal());
    }
}
