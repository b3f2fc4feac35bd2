//! Device identity announced to the coordinator.
//!
//! The identity is fixed at process start and sent verbatim in the
//! `initializeDevice` message each time the coordinator link comes up.

use serde_json::{Value, json};
use std::fmt;
use strum::EnumString;

/// Role of this node in the game.
///
/// Roles other than the known ones are kept verbatim so the coordinator can
/// still identify them; they route like armor pieces.
#[derive(Debug, Clone, PartialEq, Eq, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum DeviceRole {
    #[strum(serialize = "gun")]
    Gun,
    #[strum(serialize = "sword")]
    Sword,
    #[strum(serialize = "armor", serialize = "armor-piece")]
    Armor,
    #[strum(default)]
    Other(String),
}

impl DeviceRole {
    pub fn as_str(&self) -> &str {
        match self {
            DeviceRole::Gun => "gun",
            DeviceRole::Sword => "sword",
            DeviceRole::Armor => "armor",
            DeviceRole::Other(name) => name,
        }
    }

    /// Whether the role carries hit/trigger buttons wired to GPIO.
    pub fn has_hit_inputs(&self) -> bool {
        !matches!(self, DeviceRole::Sword)
    }
}

impl fmt::Display for DeviceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub role: DeviceRole,
    pub display_name: Option<String>,
    pub device_number: String,
}

impl DeviceIdentity {
    pub fn new(
        role: DeviceRole,
        display_name: Option<String>,
        device_number: impl Into<String>,
    ) -> Self {
        Self {
            role,
            display_name,
            device_number: device_number.into(),
        }
    }

    /// Payload of the `initializeDevice` announcement.
    pub fn announcement_payload(&self) -> Value {
        json!({
            "device_type": self.role.as_str(),
            "sword_name": self.display_name,
            "device_number": self.device_number,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parsing() {
        assert_eq!("gun".parse::<DeviceRole>().unwrap(), DeviceRole::Gun);
        assert_eq!("Sword".parse::<DeviceRole>().unwrap(), DeviceRole::Sword);
        assert_eq!(
            "armor-piece".parse::<DeviceRole>().unwrap(),
            DeviceRole::Armor
        );
        assert_eq!(
            "shield".parse::<DeviceRole>().unwrap(),
            DeviceRole::Other("shield".to_string())
        );
    }

    #[test]
    fn test_only_sword_lacks_hit_inputs() {
        assert!(DeviceRole::Gun.has_hit_inputs());
        assert!(DeviceRole::Armor.has_hit_inputs());
        assert!(!DeviceRole::Sword.has_hit_inputs());
    }

    #[test]
    fn test_announcement_payload() {
        let identity = DeviceIdentity::new(DeviceRole::Sword, Some("Excalibur".into()), "7");
        assert_eq!(
            identity.announcement_payload(),
            json!({"device_type": "sword", "sword_name": "Excalibur", "device_number": "7"})
        );

        let identity = DeviceIdentity::new(DeviceRole::Gun, None, "3");
        assert_eq!(identity.announcement_payload()["sword_name"], Value::Null);
    }
}
