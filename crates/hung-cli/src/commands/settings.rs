//! /settings command - show and change preferences

use super::CommandResult;
use hung_chat::{Settings, SettingsPatch};

pub struct SettingsCommand;

impl SettingsCommand {
    pub fn execute(args: &str, current: &Settings) -> CommandResult {
        if args.is_empty() {
            return CommandResult::Message(show_settings(current));
        }

        let mut parts = args.splitn(2, char::is_whitespace);
        let key = parts.next().unwrap_or("");
        let value = parts.next().unwrap_or("").trim();
        if value.is_empty() {
            return CommandResult::Message(format!("Usage: /settings {} <value>", key));
        }

        match SettingsPatch::from_key_value(key, value) {
            Ok(patch) => CommandResult::UpdateSettings(patch),
            Err(e) => CommandResult::Message(e.to_string()),
        }
    }
}

fn show_settings(settings: &Settings) -> String {
    let mut output = String::from("Settings:\n\n");
    for (key, value) in settings.entries() {
        output.push_str(&format!("  {:<22} {}\n", key, value));
    }
    output.push_str("\nChange with: /settings <key> <value>");
    output
}
