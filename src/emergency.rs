//! Platform-wide admission breaker
//!
//! The pipeline only reads the state through `EmergencyMonitor`; transitions
//! belong to an operator (the admin route) or an external monitor.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmergencyState {
    #[default]
    Normal,
    Warning,
    EmergencyStop,
    Recovery,
}

impl EmergencyState {
    fn to_u8(self) -> u8 {
        match self {
            EmergencyState::Normal => 0,
            EmergencyState::Warning => 1,
            EmergencyState::EmergencyStop => 2,
            EmergencyState::Recovery => 3,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            1 => EmergencyState::Warning,
            2 => EmergencyState::EmergencyStop,
            3 => EmergencyState::Recovery,
            _ => EmergencyState::Normal,
        }
    }

    /// Only `emergency_stop` blocks admission
    pub fn blocks_admission(&self) -> bool {
        *self == EmergencyState::EmergencyStop
    }
}

/// Read-only view of the breaker
pub trait EmergencyMonitor: Send + Sync {
    fn state(&self) -> EmergencyState;
}

/// In-process breaker shared by every pipeline
#[derive(Debug, Default)]
pub struct EmergencySwitch {
    state: AtomicU8,
}

impl EmergencySwitch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Returns the previous state
    pub fn set(&self, state: EmergencyState) -> EmergencyState {
        EmergencyState::from_u8(self.state.swap(state.to_u8(), Ordering::SeqCst))
    }
}

impl EmergencyMonitor for EmergencySwitch {
    fn state(&self) -> EmergencyState {
        EmergencyState::from_u8(self.state.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_switch_transitions() {
        let switch = EmergencySwitch::new();
        assert_eq!(switch.state(), EmergencyState::Normal);
        assert_eq!(switch.set(EmergencyState::EmergencyStop), EmergencyState::Normal);
        assert!(switch.state().blocks_admission());
        switch.set(EmergencyState::Recovery);
        assert!(!switch.state().blocks_admission());
    }

    #[test]
    fn test_state_wire_names() {
        assert_eq!(
            serde_json::to_value(EmergencyState::EmergencyStop).unwrap(),
            serde_json::json!("emergency_stop")
        );
    }
}
