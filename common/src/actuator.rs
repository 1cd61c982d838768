use crate::types::ActuatorState;

/// Owner of the single relay output's logical state.
///
/// Holds the only copy of [`ActuatorState`]; the I/O layer translates
/// `line_level` into a pin write. Relay boards commonly energize the coil on
/// a low line, so the logical/physical mapping is kept here rather than at
/// every call site.
#[derive(Debug, Clone)]
pub struct ActuatorController {
    state: ActuatorState,
    active_low: bool,
}

impl ActuatorController {
    pub fn new(active_low: bool) -> Self {
        Self {
            state: ActuatorState::Off,
            active_low,
        }
    }

    pub fn state(&self) -> ActuatorState {
        self.state
    }

    /// Applies a command and returns the level to drive on the output pin.
    pub fn apply(&mut self, state: ActuatorState) -> bool {
        self.state = state;
        self.line_level()
    }

    /// Physical line level for the current logical state: high is `true`.
    pub fn line_level(&self) -> bool {
        self.state.is_on() != self.active_low
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn starts_off_with_idle_line() {
        let actuator = ActuatorController::new(true);
        assert_eq!(actuator.state(), ActuatorState::Off);
        // Active-low wiring idles high.
        assert!(actuator.line_level());
    }

    #[test]
    fn active_low_inverts_the_line() {
        let mut actuator = ActuatorController::new(true);
        assert!(!actuator.apply(ActuatorState::On));
        assert!(actuator.apply(ActuatorState::Off));
    }

    #[test]
    fn active_high_drives_the_line_directly() {
        let mut actuator = ActuatorController::new(false);
        assert!(actuator.apply(ActuatorState::On));
        assert!(!actuator.apply(ActuatorState::Off));
    }

    #[test]
    fn reapplying_a_state_is_idempotent() {
        let mut actuator = ActuatorController::new(true);
        let first = actuator.apply(ActuatorState::On);
        let second = actuator.apply(ActuatorState::On);
        assert_eq!(first, second);
        assert_eq!(actuator.state(), ActuatorState::On);
    }
}
