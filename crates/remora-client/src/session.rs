//! Session lifecycle state machine.
//!
//! Every `begin_connect` opens a new epoch. Responses carry the epoch they
//! were issued under and are dropped when it is no longer current, so a
//! reply from an old connection can never touch the new one.

use serde::Serialize;
use serde_json::{Map, Value};

/// Consecutive poll failures that force a disconnect.
pub const MAX_POLL_FAILURES: u8 = 3;

/// Connection generation counter.
pub type Epoch = u64;

/// Connection lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No session.
    #[default]
    Disconnected,
    /// `session-get` in flight.
    Connecting,
    /// Session established; polling.
    Connected,
}

/// What a poll failure did to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// The failure belonged to an old epoch and was ignored.
    Stale,
    /// Still connected; `attempt` failures so far.
    Retry {
        /// Consecutive failures including this one.
        attempt: u8,
    },
    /// The failure limit was reached and the session was torn down.
    Disconnect,
}

/// Logical connection to one daemon.
#[derive(Debug, Default)]
pub struct Session {
    state: ConnectionState,
    server_settings: Option<Map<String, Value>>,
    fail_count: u8,
    update_serial: u64,
    epoch: Epoch,
}

impl Session {
    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Consecutive failed polls.
    #[must_use]
    pub const fn fail_count(&self) -> u8 {
        self.fail_count
    }

    /// Successful reconciliations so far.
    #[must_use]
    pub const fn update_serial(&self) -> u64 {
        self.update_serial
    }

    /// Current epoch.
    #[must_use]
    pub const fn epoch(&self) -> Epoch {
        self.epoch
    }

    /// Settings returned by the last `session-get`.
    #[must_use]
    pub const fn server_settings(&self) -> Option<&Map<String, Value>> {
        self.server_settings.as_ref()
    }

    /// Daemon version string from the stored settings.
    #[must_use]
    pub fn version(&self) -> Option<&str> {
        self.server_settings
            .as_ref()
            .and_then(|settings| settings.get("version"))
            .and_then(Value::as_str)
    }

    /// `epoch` is current and the session is connected.
    #[must_use]
    pub fn accepts(&self, epoch: Epoch) -> bool {
        self.epoch == epoch && self.state == ConnectionState::Connected
    }

    /// Start a connection attempt and return its epoch.
    pub fn begin_connect(&mut self) -> Epoch {
        self.epoch += 1;
        self.state = ConnectionState::Connecting;
        self.server_settings = None;
        self.epoch
    }

    /// Apply the `session-get` reply of the attempt opened under `epoch`.
    ///
    /// Returns `false` if the attempt is stale.
    pub fn complete_connect(&mut self, epoch: Epoch, settings: Map<String, Value>) -> bool {
        if self.epoch != epoch || self.state != ConnectionState::Connecting {
            return false;
        }
        self.state = ConnectionState::Connected;
        self.server_settings = Some(settings);
        self.fail_count = 0;
        true
    }

    /// Abandon the attempt opened under `epoch`.
    ///
    /// Returns `false` if the attempt is stale.
    pub fn abort_connect(&mut self, epoch: Epoch) -> bool {
        if self.epoch != epoch || self.state != ConnectionState::Connecting {
            return false;
        }
        self.state = ConnectionState::Disconnected;
        self.epoch += 1;
        true
    }

    /// Tear the session down. Returns `false` when already disconnected.
    pub fn disconnect(&mut self) -> bool {
        if self.state == ConnectionState::Disconnected {
            return false;
        }
        self.state = ConnectionState::Disconnected;
        self.server_settings = None;
        self.epoch += 1;
        true
    }

    /// Replace the stored settings wholesale.
    pub fn replace_settings(&mut self, epoch: Epoch, settings: Map<String, Value>) -> bool {
        if !self.accepts(epoch) {
            return false;
        }
        self.server_settings = Some(settings);
        true
    }

    /// Record a reconciled snapshot: clears the failure streak and bumps the serial.
    pub fn record_snapshot(&mut self, epoch: Epoch) -> Option<u64> {
        if !self.accepts(epoch) {
            return None;
        }
        self.fail_count = 0;
        self.update_serial += 1;
        Some(self.update_serial)
    }

    /// Record a failed poll, disconnecting on the last allowed failure.
    pub fn record_poll_failure(&mut self, epoch: Epoch) -> FailureOutcome {
        if !self.accepts(epoch) {
            return FailureOutcome::Stale;
        }
        self.fail_count = (self.fail_count + 1).min(MAX_POLL_FAILURES);
        if self.fail_count >= MAX_POLL_FAILURES {
            self.disconnect();
            FailureOutcome::Disconnect
        } else {
            FailureOutcome::Retry {
                attempt: self.fail_count,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connected() -> (Session, Epoch) {
        let mut session = Session::default();
        let epoch = session.begin_connect();
        assert!(session.complete_connect(epoch, Map::new()));
        (session, epoch)
    }

    #[test]
    fn connect_moves_through_connecting() {
        let mut session = Session::default();
        assert_eq!(session.state(), ConnectionState::Disconnected);
        let epoch = session.begin_connect();
        assert_eq!(session.state(), ConnectionState::Connecting);
        let mut settings = Map::new();
        settings.insert("version".into(), Value::from("4.0.5"));
        assert!(session.complete_connect(epoch, settings));
        assert_eq!(session.state(), ConnectionState::Connected);
        assert_eq!(session.version(), Some("4.0.5"));
    }

    #[test]
    fn fewer_than_three_failures_stay_connected() {
        for failures in 0..3_u8 {
            let (mut session, epoch) = connected();
            for _ in 0..failures {
                assert!(matches!(
                    session.record_poll_failure(epoch),
                    FailureOutcome::Retry { .. }
                ));
            }
            assert_eq!(session.state(), ConnectionState::Connected);
            assert_eq!(session.fail_count(), failures);
        }
    }

    #[test]
    fn third_failure_disconnects_and_reconnect_resets() {
        let (mut session, epoch) = connected();
        session.record_poll_failure(epoch);
        session.record_poll_failure(epoch);
        assert_eq!(
            session.record_poll_failure(epoch),
            FailureOutcome::Disconnect
        );
        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert!(session.server_settings().is_none());

        let next = session.begin_connect();
        assert!(session.complete_connect(next, Map::new()));
        assert_eq!(session.fail_count(), 0);
    }

    #[test]
    fn success_clears_failure_streak() {
        let (mut session, epoch) = connected();
        session.record_poll_failure(epoch);
        session.record_poll_failure(epoch);
        assert_eq!(session.record_snapshot(epoch), Some(1));
        assert_eq!(session.fail_count(), 0);
    }

    #[test]
    fn stale_epoch_cannot_mutate() {
        let (mut session, old) = connected();
        assert!(session.disconnect());
        assert_eq!(session.record_snapshot(old), None);
        assert_eq!(session.record_poll_failure(old), FailureOutcome::Stale);
        assert_eq!(session.update_serial(), 0);

        let current = session.begin_connect();
        assert!(!session.complete_connect(old, Map::new()));
        assert!(session.complete_connect(current, Map::new()));
    }

    #[test]
    fn disconnect_is_idempotent() {
        let mut session = Session::default();
        assert!(!session.disconnect());
        let epoch = session.epoch();
        assert!(!session.disconnect());
        assert_eq!(session.epoch(), epoch);
    }
}
