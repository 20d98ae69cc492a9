use serde_json::{Map, Value};

use crate::entity::Entity;
use crate::enums::{FanMode, HoldMode, OperatingMode, OperatingState};
use vivint_api::models::ThermostatData;

pub struct Thermostat {
    pub(crate) entity: Entity<ThermostatData>,
}

impl Thermostat {
    pub fn new(data: Map<String, Value>) -> Self {
        Self {
            entity: Entity::new(data),
        }
    }

    fn model(&self) -> Option<&ThermostatData> {
        self.entity.model()
    }

    pub fn temperature(&self) -> Option<f64> {
        self.model().and_then(|m| m.current_temperature)
    }

    pub fn cool_set_point(&self) -> Option<f64> {
        self.model().and_then(|m| m.cool_set_point)
    }

    pub fn heat_set_point(&self) -> Option<f64> {
        self.model().and_then(|m| m.heat_set_point)
    }

    pub fn humidity(&self) -> Option<i64> {
        self.model().and_then(|m| m.humidity)
    }

    pub fn minimum_temperature(&self) -> Option<f64> {
        self.model().and_then(|m| m.minimum_temperature)
    }

    pub fn maximum_temperature(&self) -> Option<f64> {
        self.model().and_then(|m| m.maximum_temperature)
    }

    pub fn operating_mode(&self) -> OperatingMode {
        self.model()
            .and_then(|m| m.operating_mode)
            .map_or(OperatingMode::Unknown, OperatingMode::from_i64)
    }

    pub fn operating_state(&self) -> OperatingState {
        self.model()
            .and_then(|m| m.operating_state)
            .map_or(OperatingState::Unknown, OperatingState::from_i64)
    }

    pub fn fan_mode(&self) -> FanMode {
        self.model()
            .and_then(|m| m.fan_mode)
            .map_or(FanMode::Unknown, FanMode::from_i64)
    }

    pub fn hold_mode(&self) -> HoldMode {
        self.model()
            .and_then(|m| m.hold_mode)
            .map_or(HoldMode::Unknown, HoldMode::from_i64)
    }

    pub fn is_fan_on(&self) -> bool {
        self.model().and_then(|m| m.fan_state) == Some(1)
    }

    pub fn is_on(&self) -> bool {
        self.operating_state() != OperatingState::Idle
    }

    pub fn celsius_to_fahrenheit(celsius: f64) -> i64 {
        (celsius * 1.8 + 32.0).round() as i64
    }
}
