// ── Closed wire enums ──
//
// Every enum carries an `Unknown` fallback and decodes infallibly:
// unrecognized wire values are logged at debug and mapped to `Unknown`
// so a firmware update upstream can never crash the graph.

use serde_json::Value;
use tracing::debug;

/// Generate an int-backed enum with an `Unknown` fallback.
macro_rules! int_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $($variant:ident = $value:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant,)+
            Unknown,
        }

        impl $name {
            pub fn from_i64(value: i64) -> Self {
                match value {
                    $($value => Self::$variant,)+
                    other => {
                        debug!("unknown {} value: {}", stringify!($name), other);
                        Self::Unknown
                    }
                }
            }

            pub fn value(self) -> i64 {
                match self {
                    $(Self::$variant => $value,)+
                    Self::Unknown => -1,
                }
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self::from_i64(value)
            }
        }
    };
}

int_enum! {
    /// Alarm posture of a panel partition.
    ArmedState {
        Disarmed = 0,
        ArmingAwayInExitDelay = 1,
        ArmingStayInExitDelay = 2,
        ArmedStay = 3,
        ArmedAway = 4,
        ArmedStayInEntryDelay = 5,
        ArmedAwayInEntryDelay = 6,
        Alarm = 7,
        AlarmFire = 8,
        Disabled = 11,
        WalkTest = 12,
    }
}

impl ArmedState {
    /// Decode from whatever shape the wire sends: int, numeric string,
    /// or uppercase textual label. Never fails.
    pub fn decode(value: Option<&Value>) -> Self {
        match value {
            Some(Value::Number(n)) => n.as_i64().map_or(Self::Unknown, Self::from_i64),
            Some(Value::String(s)) => {
                if let Ok(n) = s.parse::<i64>() {
                    return Self::from_i64(n);
                }
                Self::from_label(s)
            }
            _ => Self::Unknown,
        }
    }

    fn from_label(label: &str) -> Self {
        match label.to_ascii_uppercase().as_str() {
            "DISARMED" => Self::Disarmed,
            "ARMING_AWAY_IN_EXIT_DELAY" => Self::ArmingAwayInExitDelay,
            "ARMING_STAY_IN_EXIT_DELAY" => Self::ArmingStayInExitDelay,
            "ARMED_STAY" => Self::ArmedStay,
            "ARMED_AWAY" => Self::ArmedAway,
            "ARMED_STAY_IN_ENTRY_DELAY" => Self::ArmedStayInEntryDelay,
            "ARMED_AWAY_IN_ENTRY_DELAY" => Self::ArmedAwayInEntryDelay,
            "ALARM" => Self::Alarm,
            "ALARM_FIRE" => Self::AlarmFire,
            "DISABLED" => Self::Disabled,
            "WALK_TEST" => Self::WalkTest,
            other => {
                debug!("unknown ArmedState label: {other}");
                Self::Unknown
            }
        }
    }
}

int_enum! {
    GarageDoorState {
        Opening = 4,
        Opened = 5,
        Closing = 2,
        Closed = 1,
        Stopped = 3,
        NoState = 0,
    }
}

int_enum! {
    EmergencyType {
        Fire = 0,
        Medical = 1,
        Police = 2,
    }
}

int_enum! {
    ZoneBypass {
        Unbypassed = 0,
        ForceBypassed = 1,
        ManuallyBypassed = 2,
    }
}

int_enum! {
    EquipmentType {
        Contact = 1,
        Motion = 2,
        Freeze = 6,
        Water = 8,
        Temperature = 10,
        Emergency = 11,
    }
}

int_enum! {
    SensorType {
        Unused = 0,
        ExitEntry1 = 1,
        ExitEntry2 = 2,
        Perimeter = 3,
        InteriorFollower = 4,
        DayZone = 5,
        SilentAlarm = 6,
        AudibleAlarm = 7,
        AuxiliaryAlarm = 8,
        Fire = 9,
        InteriorWithDelay = 10,
        CarbonMonoxide = 14,
        FireWithVerification = 16,
        NoResponse = 23,
        SilentBurglary = 24,
        Repeater = 25,
    }
}

int_enum! {
    EquipmentCode {
        Other = 0,
        HwRDw5818Mnl = 470,
        ExistingGlassBreak = 475,
        HwPanicPendant5802Mn2 = 491,
        HwGlassBreak5853 = 519,
        HwPir5894Pi = 530,
        HwPir5890 = 533,
        ExistingFloodTemp = 556,
        HwHeatSensor5809 = 557,
        ExistingKeyFobRemote = 577,
        HwSmoke5808W3 = 589,
        ExistingMotionDetector = 609,
        ExistingSmoke = 616,
        HwFloodSensor5821 = 624,
        ExistingDoorWindowContact = 655,
        HwDw5816 = 673,
        ExistingCo = 692,
        ExistingHeat = 708,
        Co1CoCanada = 859,
        Co1Co = 860,
        Dw10ThinDoorWindow = 862,
        Dw20RecessedDoor = 863,
        Gb1GlassBreak = 864,
        Key1FourButtonKeyFobRemote = 866,
        Pad1WirelessKeypad = 867,
        Panic1 = 868,
        Pir1Motion = 869,
        Smke1SmokeCanada = 871,
        Smke1Smoke = 872,
        TakeTakeover = 873,
        Smkt2GeSmokeHeat = 895,
        Re224GtGeTranslator = 941,
        Co32GigCo = 1026,
        Smkt32Gig = 1058,
        Garage01ResolutionTilt = 1061,
        Dbell12GigDoorbell = 1063,
        Smkt62Gig = 1066,
        Re219FloodSensor = 1128,
        Re220T2GigRepeater = 1144,
        Re224DtDscTranslator = 1208,
        Gb2GlassBreak = 1248,
        Pir2Motion = 1249,
        SecureKey345Mhz = 1250,
        Dw11ThinDoorWindow = 1251,
        Dw21RRecessedDoor = 1252,
        Panic2 = 1253,
        CarbonMonoxideDetector345Mhz = 1254,
        FirefighterAudioDetector = 1269,
        SwS1SmartWaterSensor = 1264,
        VsCo3Detector = 1266,
        VsSmktSmokeDetector = 1267,
        Repeater345Mhz = 2081,
        Re524XWirelessTakeover = 2830,
        TiltSensor2Gig345 = 2831,
        Re508XRepeater = 2832,
        Dw12ThinDoorWindow = 4000,
        Pir3Motion = 4020,
        Gb3GlassBreak = 4030,
        ApolloComboSmoke = 4040,
        ApolloComboCo = 4050,
        Panic3 = 4130,
    }
}

int_enum! {
    OperatingMode {
        Off = 0,
        Heat = 1,
        Cool = 2,
        Auto = 3,
        EmergencyHeat = 4,
        Resume = 5,
        FanOnly = 6,
        Furnace = 7,
        DryAir = 8,
        MoistAir = 9,
        AutoChangeover = 10,
        EnergySaveHeat = 11,
        EnergySaveCool = 12,
        Away = 13,
        Eco = 100,
    }
}

int_enum! {
    OperatingState {
        Idle = 0,
        Heating = 1,
        Cooling = 2,
    }
}

int_enum! {
    FanMode {
        AutoLow = 0,
        OnLow = 1,
        AutoHigh = 2,
        OnHigh = 3,
        Timer15 = 99,
        Timer30 = 100,
        Timer60 = 101,
        Timer45 = 102,
        Timer120 = 103,
        Timer240 = 104,
        Timer480 = 105,
        Timer960 = 106,
        Timer720 = 107,
    }
}

int_enum! {
    HoldMode {
        BySchedule = 0,
        UntilNext = 1,
        TwoHours = 2,
        Permanent = 3,
    }
}

// ── Device type ─────────────────────────────────────────────────────

/// Device type tags as they appear on the wire (`t` key).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceType {
    BinarySwitch,
    Camera,
    DoorLock,
    GarageDoor,
    MultiLevelSwitch,
    Thermostat,
    Panel,
    WirelessSensor,
    WiredSensor,
    KeyFob,
    KeyPad,
    HueBridge,
    AirTower,
    DisplayDevice,
    EnergyService,
    GroupDevice,
    IotService,
    NestThermostat,
    NetworkHostsService,
    PanelDiagnosticsService,
    SchedulerService,
    SecurityService,
    SensorGroup,
    SlimLine,
    SmartThermostat,
    SpaceMonkey,
    YofiDevice,
    ZwaveKeyPad,
    Unknown,
}

impl DeviceType {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "binary_switch_device" => Self::BinarySwitch,
            "camera_device" => Self::Camera,
            "door_lock_device" => Self::DoorLock,
            "garage_door_device" => Self::GarageDoor,
            "multilevel_switch_device" => Self::MultiLevelSwitch,
            "thermostat_device" => Self::Thermostat,
            "primary_touch_link_device" => Self::Panel,
            "wireless_sensor" => Self::WirelessSensor,
            "wired_sensor" => Self::WiredSensor,
            "keyfob_device" => Self::KeyFob,
            "keypad_device" => Self::KeyPad,
            "phillips_hue_bridge_device" => Self::HueBridge,
            "airtower_device" => Self::AirTower,
            "display_device" => Self::DisplayDevice,
            "energy_service" => Self::EnergyService,
            "group_device" => Self::GroupDevice,
            "iot_service" => Self::IotService,
            "nest_thermostat_device" => Self::NestThermostat,
            "network_hosts_service" => Self::NetworkHostsService,
            "panel_diagnostics_service" => Self::PanelDiagnosticsService,
            "scheduler_service" => Self::SchedulerService,
            "security_service" => Self::SecurityService,
            "sensor_group" => Self::SensorGroup,
            "slim_line_device" => Self::SlimLine,
            "ct200_thermostat_device" => Self::SmartThermostat,
            "space_monkey_service" => Self::SpaceMonkey,
            "yofi_device" => Self::YofiDevice,
            "keypad_entry_device" => Self::ZwaveKeyPad,
            other => {
                debug!("unknown device type tag: {other}");
                Self::Unknown
            }
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            Self::BinarySwitch => "binary_switch_device",
            Self::Camera => "camera_device",
            Self::DoorLock => "door_lock_device",
            Self::GarageDoor => "garage_door_device",
            Self::MultiLevelSwitch => "multilevel_switch_device",
            Self::Thermostat => "thermostat_device",
            Self::Panel => "primary_touch_link_device",
            Self::WirelessSensor => "wireless_sensor",
            Self::WiredSensor => "wired_sensor",
            Self::KeyFob => "keyfob_device",
            Self::KeyPad => "keypad_device",
            Self::HueBridge => "phillips_hue_bridge_device",
            Self::AirTower => "airtower_device",
            Self::DisplayDevice => "display_device",
            Self::EnergyService => "energy_service",
            Self::GroupDevice => "group_device",
            Self::IotService => "iot_service",
            Self::NestThermostat => "nest_thermostat_device",
            Self::NetworkHostsService => "network_hosts_service",
            Self::PanelDiagnosticsService => "panel_diagnostics_service",
            Self::SchedulerService => "scheduler_service",
            Self::SecurityService => "security_service",
            Self::SensorGroup => "sensor_group",
            Self::SlimLine => "slim_line_device",
            Self::SmartThermostat => "ct200_thermostat_device",
            Self::SpaceMonkey => "space_monkey_service",
            Self::YofiDevice => "yofi_device",
            Self::ZwaveKeyPad => "keypad_entry_device",
            Self::Unknown => "unknown",
        }
    }

    /// Human-readable label, used to synthesize device names.
    pub fn label(self) -> &'static str {
        match self {
            Self::BinarySwitch => "Binary Switch",
            Self::Camera => "Camera",
            Self::DoorLock => "Door Lock",
            Self::GarageDoor => "Garage Door",
            Self::MultiLevelSwitch => "Multilevel Switch",
            Self::Thermostat => "Thermostat",
            Self::Panel => "Panel",
            Self::WirelessSensor => "Wireless Sensor",
            Self::WiredSensor => "Wired Sensor",
            _ => "Device",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn armed_state_decodes_from_int() {
        assert_eq!(ArmedState::decode(Some(&json!(4))), ArmedState::ArmedAway);
        assert_eq!(ArmedState::decode(Some(&json!(0))), ArmedState::Disarmed);
    }

    #[test]
    fn armed_state_decodes_from_numeric_string_and_label() {
        assert_eq!(ArmedState::decode(Some(&json!("4"))), ArmedState::ArmedAway);
        assert_eq!(
            ArmedState::decode(Some(&json!("DISARMED"))),
            ArmedState::Disarmed
        );
        assert_eq!(
            ArmedState::decode(Some(&json!("armed_stay"))),
            ArmedState::ArmedStay
        );
    }

    #[test]
    fn armed_state_int_and_label_agree() {
        for (value, label) in [
            (0, "DISARMED"),
            (3, "ARMED_STAY"),
            (4, "ARMED_AWAY"),
            (7, "ALARM"),
        ] {
            assert_eq!(
                ArmedState::decode(Some(&json!(value))),
                ArmedState::decode(Some(&json!(label))),
            );
        }
    }

    #[test]
    fn armed_state_garbage_is_unknown() {
        assert_eq!(ArmedState::decode(Some(&json!("purple"))), ArmedState::Unknown);
        assert_eq!(ArmedState::decode(Some(&json!(null))), ArmedState::Unknown);
        assert_eq!(ArmedState::decode(Some(&json!(99))), ArmedState::Unknown);
        assert_eq!(ArmedState::decode(None), ArmedState::Unknown);
    }

    #[test]
    fn device_type_round_trips_tags() {
        for tag in ["camera_device", "door_lock_device", "wireless_sensor"] {
            assert_eq!(DeviceType::from_tag(tag).tag(), tag);
        }
        assert_eq!(DeviceType::from_tag("hologram_projector"), DeviceType::Unknown);
    }

    #[test]
    fn int_enum_fallback_is_unknown() {
        assert_eq!(EquipmentCode::from_i64(123456), EquipmentCode::Unknown);
        assert_eq!(SensorType::from_i64(-5), SensorType::Unknown);
        assert_eq!(GarageDoorState::from_i64(1), GarageDoorState::Closed);
    }
}
