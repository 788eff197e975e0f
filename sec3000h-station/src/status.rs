//! Elevator status derived from the frames a session accepts
//!
//! Every mutator returns the semantic events it caused, so the caller can
//! log and publish changes instead of raw frames.

use crate::error::{SecError, SecResult};
use crate::events::SessionEvent;
use sec3000h_core::{DoorCommand, Floor};
use serde::{Deserialize, Serialize};
use std::fmt;

/// When a target-floor report counts as arrival
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ArrivalPolicy {
    /// Only a target cleared to "none" after a target was set
    TargetCleared,
    /// Also a new target equal to the current floor
    #[default]
    TargetClearedOrSameFloor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DoorStatus {
    #[default]
    Unknown,
    Opening,
    Closing,
    Stopped,
}

impl DoorStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            DoorStatus::Unknown => "unknown",
            DoorStatus::Opening => "opening",
            DoorStatus::Closing => "closing",
            DoorStatus::Stopped => "stopped",
        }
    }
}

impl From<DoorCommand> for DoorStatus {
    fn from(cmd: DoorCommand) -> Self {
        match cmd {
            DoorCommand::Open => DoorStatus::Opening,
            DoorCommand::Close => DoorStatus::Closing,
            DoorCommand::Stop => DoorStatus::Stopped,
        }
    }
}

impl fmt::Display for DoorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Elevator status as known to one session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElevatorStatus {
    pub current_floor: Floor,
    pub target_floor: Option<Floor>,
    /// Load in kilograms
    pub load_weight: u16,
    pub moving: bool,
    pub door: DoorStatus,
    /// Arrival for the current target was already reported
    pub arrival_detected: bool,
}

impl Default for ElevatorStatus {
    fn default() -> Self {
        Self {
            current_floor: Floor::GROUND,
            target_floor: None,
            load_weight: 0,
            moving: false,
            door: DoorStatus::Unknown,
            arrival_detected: false,
        }
    }
}

impl ElevatorStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a current-floor report
    pub fn apply_current_floor(&mut self, floor: Floor) -> Vec<SessionEvent> {
        if floor == self.current_floor {
            return Vec::new();
        }
        let previous = std::mem::replace(&mut self.current_floor, floor);
        vec![SessionEvent::CurrentFloorChanged {
            previous,
            current: floor,
        }]
    }

    /// Apply a target-floor report (raw wire value, 0x0000 = no target)
    ///
    /// Clearing a previously set target is an arrival at that target: the
    /// current floor becomes the old target and movement stops. Under
    /// [`ArrivalPolicy::TargetClearedOrSameFloor`] a target equal to the
    /// current floor is an immediate arrival, and the clear that follows it
    /// is not reported a second time.
    pub fn apply_target_value(&mut self, value: u16, policy: ArrivalPolicy) -> Vec<SessionEvent> {
        let mut events = Vec::new();

        match Floor::target_from_value(value) {
            None => {
                let Some(reached) = self.target_floor.take() else {
                    return events;
                };
                events.push(SessionEvent::TargetFloorChanged {
                    previous: Some(reached),
                    target: None,
                });
                self.moving = false;
                if !self.arrival_detected {
                    events.extend(self.apply_current_floor(reached));
                    events.push(SessionEvent::Arrived { floor: reached });
                }
                self.arrival_detected = false;
            }
            Some(target) => {
                if self.target_floor == Some(target) {
                    return events;
                }
                let previous = self.target_floor.replace(target);
                self.arrival_detected = false;
                events.push(SessionEvent::TargetFloorChanged {
                    previous,
                    target: Some(target),
                });

                if self.current_floor != target {
                    if !self.moving {
                        events.push(SessionEvent::MovementStarted {
                            from: self.current_floor,
                            to: target,
                        });
                    }
                    self.moving = true;
                } else {
                    self.moving = false;
                    if policy == ArrivalPolicy::TargetClearedOrSameFloor {
                        self.arrival_detected = true;
                        events.push(SessionEvent::Arrived { floor: target });
                    }
                }
            }
        }

        events
    }

    /// Apply a load-weight report
    pub fn apply_load(&mut self, load: u16) -> Vec<SessionEvent> {
        if load == self.load_weight {
            return Vec::new();
        }
        let previous = std::mem::replace(&mut self.load_weight, load);
        vec![SessionEvent::LoadChanged {
            previous,
            current: load,
        }]
    }

    /// Apply a door command received by the data source
    ///
    /// Opening the door while moving completes the trip.
    pub fn apply_door(&mut self, command: DoorCommand) -> Vec<SessionEvent> {
        let mut events = Vec::new();

        if command == DoorCommand::Open && self.moving {
            if let Some(reached) = self.target_floor.take() {
                events.push(SessionEvent::TargetFloorChanged {
                    previous: Some(reached),
                    target: None,
                });
                events.extend(self.apply_current_floor(reached));
                events.push(SessionEvent::Arrived { floor: reached });
            }
            self.moving = false;
            self.arrival_detected = false;
        }

        let door = DoorStatus::from(command);
        if door != self.door {
            self.door = door;
            events.push(SessionEvent::DoorChanged { door });
        }
        events
    }

    /// Packed STATUS_RSP payload: current floor in the high byte, load in the low byte
    ///
    /// # Errors
    ///
    /// `InvalidData` if the current floor has no one-byte form (level 255 and up).
    pub fn status_response_value(&self) -> SecResult<u16> {
        let floor = self.current_floor.status_byte().ok_or_else(|| {
            SecError::InvalidData(format!(
                "Floor {} does not fit a STATUS_RSP payload",
                self.current_floor
            ))
        })?;
        Ok((u16::from(floor) << 8) | (self.load_weight & 0xFF))
    }

    /// Apply a STATUS_RSP payload; a high byte of 0xFF is the basement
    pub fn apply_status_response(&mut self, value: u16) -> Vec<SessionEvent> {
        let floor = match value >> 8 {
            0xFF => Floor::Basement,
            n => Floor::Level(n),
        };
        let mut events = self.apply_current_floor(floor);
        events.extend(self.apply_load(value & 0xFF));
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arrivals(events: &[SessionEvent]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, SessionEvent::Arrived { .. }))
            .count()
    }

    #[test]
    fn test_target_then_clear_is_one_arrival() {
        let mut status = ElevatorStatus::new();
        let policy = ArrivalPolicy::default();
        let mut events = Vec::new();

        events.extend(status.apply_target_value(0x0000, policy));
        assert!(events.is_empty());

        events.extend(status.apply_target_value(0x0003, policy));
        assert!(status.moving);
        assert!(events.contains(&SessionEvent::MovementStarted {
            from: Floor::Level(1),
            to: Floor::Level(3)
        }));

        events.extend(status.apply_target_value(0x0000, policy));
        assert_eq!(arrivals(&events), 1);
        assert_eq!(status.current_floor, Floor::Level(3));
        assert_eq!(status.target_floor, None);
        assert!(!status.moving);
    }

    #[test]
    fn test_same_floor_target_arrives_once() {
        let mut status = ElevatorStatus::new();
        status.apply_current_floor(Floor::Level(5));
        let policy = ArrivalPolicy::TargetClearedOrSameFloor;

        let first = status.apply_target_value(0x0005, policy);
        assert_eq!(arrivals(&first), 1);
        assert!(!status.moving);

        let second = status.apply_target_value(0x0000, policy);
        assert_eq!(arrivals(&second), 0);
        assert_eq!(status.target_floor, None);
    }

    #[test]
    fn test_target_cleared_policy_waits_for_clear() {
        let mut status = ElevatorStatus::new();
        let policy = ArrivalPolicy::TargetCleared;

        assert_eq!(arrivals(&status.apply_target_value(0x0001, policy)), 0);
        assert_eq!(arrivals(&status.apply_target_value(0x0000, policy)), 1);
    }

    #[test]
    fn test_retarget_while_moving() {
        let mut status = ElevatorStatus::new();
        let policy = ArrivalPolicy::default();
        status.apply_target_value(0x0004, policy);
        let events = status.apply_target_value(0xFFFF, policy);
        assert_eq!(status.target_floor, Some(Floor::Basement));
        assert!(
            !events
                .iter()
                .any(|e| matches!(e, SessionEvent::MovementStarted { .. }))
        );
        assert!(status.apply_target_value(0xFFFF, policy).is_empty());
    }

    #[test]
    fn test_door_open_while_moving_completes_trip() {
        let mut status = ElevatorStatus::new();
        status.apply_target_value(0x0007, ArrivalPolicy::default());
        let events = status.apply_door(DoorCommand::Open);
        assert_eq!(arrivals(&events), 1);
        assert_eq!(status.current_floor, Floor::Level(7));
        assert_eq!(status.door, DoorStatus::Opening);
        assert!(!status.moving);

        let events = status.apply_door(DoorCommand::Close);
        assert_eq!(events, vec![SessionEvent::DoorChanged { door: DoorStatus::Closing }]);
    }

    #[test]
    fn test_status_response_packing() {
        let mut status = ElevatorStatus::new();
        status.apply_current_floor(Floor::Level(3));
        status.apply_load(0x50);
        assert_eq!(status.status_response_value().ok(), Some(0x0350));

        let mut remote = ElevatorStatus::new();
        remote.apply_status_response(0x0350);
        assert_eq!(remote.current_floor, Floor::Level(3));
        assert_eq!(remote.load_weight, 0x50);

        remote.apply_status_response(0xFF00);
        assert_eq!(remote.current_floor, Floor::Basement);
        assert_eq!(remote.status_response_value().ok(), Some(0xFF00));
    }

    #[test]
    fn test_status_response_rejects_high_levels() {
        let mut status = ElevatorStatus::new();
        status.apply_current_floor(Floor::Level(254));
        assert_eq!(status.status_response_value().ok(), Some(0xFE00));
        status.apply_current_floor(Floor::Level(255));
        assert!(matches!(
            status.status_response_value(),
            Err(SecError::InvalidData(_))
        ));
    }

    #[test]
    fn test_unchanged_reports_are_silent() {
        let mut status = ElevatorStatus::new();
        assert!(status.apply_current_floor(Floor::Level(1)).is_empty());
        assert!(status.apply_load(0).is_empty());
    }
}
