//! User preferences

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Flat user preferences. Every key defaults independently, so a stored
/// record with missing keys still loads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Discard the saved active conversation on startup
    pub start_new_chat_on_reopen: bool,
    pub theme: String,
    pub font_size: String,
    pub high_contrast: bool,
    /// Also disables the typing effect
    pub reduce_motion: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            start_new_chat_on_reopen: true,
            theme: "light".to_string(),
            font_size: "default".to_string(),
            high_contrast: false,
            reduce_motion: false,
        }
    }
}

impl Settings {
    /// Merge a partial update, returning the new settings
    pub fn merged(&self, patch: &SettingsPatch) -> Settings {
        Settings {
            start_new_chat_on_reopen: patch
                .start_new_chat_on_reopen
                .unwrap_or(self.start_new_chat_on_reopen),
            theme: patch.theme.clone().unwrap_or_else(|| self.theme.clone()),
            font_size: patch
                .font_size
                .clone()
                .unwrap_or_else(|| self.font_size.clone()),
            high_contrast: patch.high_contrast.unwrap_or(self.high_contrast),
            reduce_motion: patch.reduce_motion.unwrap_or(self.reduce_motion),
        }
    }

    /// `(key, value)` pairs using the stored key names
    pub fn entries(&self) -> Vec<(&'static str, String)> {
        vec![
            (
                "startNewChatOnReopen",
                self.start_new_chat_on_reopen.to_string(),
            ),
            ("theme", self.theme.clone()),
            ("fontSize", self.font_size.clone()),
            ("highContrast", self.high_contrast.to_string()),
            ("reduceMotion", self.reduce_motion.to_string()),
        ]
    }
}

/// A partial settings update; `None` fields keep their current value
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_new_chat_on_reopen: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub high_contrast: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reduce_motion: Option<bool>,
}

impl SettingsPatch {
    /// Parse a single `key value` assignment. Keys accept the stored
    /// camelCase names and their snake_case spellings.
    pub fn from_key_value(key: &str, value: &str) -> Result<Self> {
        let value = value.trim();
        let flag = || -> Result<bool> {
            match value.to_lowercase().as_str() {
                "true" | "on" | "yes" | "1" => Ok(true),
                "false" | "off" | "no" | "0" => Ok(false),
                _ => Err(Error::InvalidSettingValue {
                    key: key.to_string(),
                    value: value.to_string(),
                }),
            }
        };

        let mut patch = Self::default();
        match key.replace('_', "").to_lowercase().as_str() {
            "startnewchatonreopen" => patch.start_new_chat_on_reopen = Some(flag()?),
            "highcontrast" => patch.high_contrast = Some(flag()?),
            "reducemotion" => patch.reduce_motion = Some(flag()?),
            "theme" if !value.is_empty() => patch.theme = Some(value.to_string()),
            "fontsize" if !value.is_empty() => patch.font_size = Some(value.to_string()),
            "theme" | "fontsize" => {
                return Err(Error::InvalidSettingValue {
                    key: key.to_string(),
                    value: value.to_string(),
                });
            }
            _ => return Err(Error::UnknownSetting(key.to_string())),
        }
        Ok(patch)
    }
}
