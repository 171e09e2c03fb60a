//! Session connection state machine

use opcbridge_core::{OpcError, OpcResult};

/// Session connection state
///
/// Tracks the current state of a session to ensure operations are only
/// performed when the connection is in the correct state.
///
/// # State Transitions
/// ```text
/// Disconnected -> Connecting (on connect())
/// Connecting -> Connected (secure channel open, session not active)
/// Connected -> Active (session activated)
/// Active -> Disconnected (on close or fatal error)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No connection (initial state)
    ///
    /// In this state:
    /// - No service calls can be submitted
    /// - Items show their values as failed, not frozen
    Disconnected,
    /// Transport-level connect submitted, security being negotiated
    Connecting,
    /// Secure channel open, session not yet activated
    Connected,
    /// Session activated, services available
    Active,
}

impl SessionState {
    /// Check if the session is ready for service calls
    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Active)
    }

    /// Check if a connect may be submitted
    pub fn can_connect(&self) -> bool {
        matches!(self, SessionState::Disconnected)
    }

    /// Validate state transition
    ///
    /// # Valid Transitions
    /// - `Disconnected` -> `Connecting` (on connect)
    /// - `Connecting` -> `Connected` (security negotiated)
    /// - `Connecting` -> `Disconnected` (on error/timeout)
    /// - `Connected` -> `Active` (session activated)
    /// - `Connected` -> `Disconnected` (on error)
    /// - `Active` -> `Disconnected` (on close or fatal error)
    pub fn validate_transition(&self, new_state: SessionState) -> OpcResult<()> {
        let valid = match (*self, new_state) {
            (SessionState::Disconnected, SessionState::Connecting) => true,
            (SessionState::Connecting, SessionState::Connected) => true,
            (SessionState::Connecting, SessionState::Disconnected) => true,
            (SessionState::Connected, SessionState::Active) => true,
            (SessionState::Connected, SessionState::Disconnected) => true,
            (SessionState::Active, SessionState::Disconnected) => true,
            // Drivers may re-activate after an internal reconnect
            (SessionState::Active, SessionState::Active) => true,
            (SessionState::Disconnected, SessionState::Disconnected) => true,
            _ => false,
        };

        if valid {
            Ok(())
        } else {
            Err(OpcError::Protocol(format!(
                "invalid state transition: {:?} -> {:?}",
                self, new_state
            )))
        }
    }

    /// Get human-readable state name
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Disconnected => "Disconnected",
            SessionState::Connecting => "Connecting",
            SessionState::Connected => "Connected",
            SessionState::Active => "Active",
        }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        SessionState::Disconnected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions() {
        assert!(SessionState::Disconnected
            .validate_transition(SessionState::Connecting)
            .is_ok());
        assert!(SessionState::Connecting
            .validate_transition(SessionState::Connected)
            .is_ok());
        assert!(SessionState::Connected
            .validate_transition(SessionState::Active)
            .is_ok());
        assert!(SessionState::Active
            .validate_transition(SessionState::Disconnected)
            .is_ok());
        assert!(SessionState::Disconnected
            .validate_transition(SessionState::Active)
            .is_err());
    }

    #[test]
    fn test_helpers() {
        assert!(SessionState::Active.is_active());
        assert!(!SessionState::Connected.is_active());
        assert!(SessionState::Disconnected.can_connect());
    }
}
