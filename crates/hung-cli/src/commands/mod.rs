//! Slash commands for interactive mode

mod history;
mod settings;

pub use history::{HistoryCommand, list_text as history_text};
pub use settings::SettingsCommand;

use hung_chat::{ConversationId, ConversationManager, SettingsPatch};

/// Result of executing a slash command
#[derive(Debug, PartialEq)]
pub enum CommandResult {
    /// Archive the conversation, then clear it
    Clear,
    /// Remove every saved record and reset settings
    ClearAllData,
    /// Make an archived conversation active
    Load(ConversationId),
    /// Apply a settings change
    UpdateSettings(SettingsPatch),
    /// Show a message to the user (not sent to the model)
    Message(String),
    /// Exit the application
    Exit,
    /// Unknown command
    Unknown(String),
}

/// Parse and execute a slash command
pub fn execute_command(input: &str, manager: &ConversationManager) -> Option<CommandResult> {
    let input = input.trim();

    let rest = input.strip_prefix('/')?;
    let parts: Vec<&str> = rest.splitn(2, ' ').collect();
    let command = parts[0].to_lowercase();
    let args = parts.get(1).map(|s| s.trim()).unwrap_or("");

    Some(match command.as_str() {
        "help" | "h" | "?" => CommandResult::Message(help_message()),

        "clear" | "c" => CommandResult::Clear,

        "reset" => CommandResult::ClearAllData,

        "quit" | "exit" | "q" => CommandResult::Exit,

        "history" => HistoryCommand::list(&manager.chat_history()),

        "load" | "l" => HistoryCommand::load(args),

        "settings" | "s" => SettingsCommand::execute(args, &manager.settings()),

        "usage" | "u" => {
            let store = manager.store();
            CommandResult::Message(format!(
                "Storage used: {} KB ({} bytes)",
                store.usage_kb(),
                store.usage_bytes()
            ))
        }

        _ => CommandResult::Unknown(command),
    })
}

fn help_message() -> String {
    r#"Available commands:
  /help, /h, /?          Show this help message
  /clear, /c             Save the conversation to history and start fresh
  /reset                 Delete all saved data and restore default settings
  /history               List saved conversations
  /load, /l <id>         Continue a saved conversation
  /settings, /s          Show settings
  /settings <key> <val>  Change a setting (e.g. /settings reduceMotion on)
  /usage, /u             Show storage usage
  /quit, /exit, /q       Exit hung"#
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hung_chat::{MemoryStorage, NewMessage, PersistentStore};
    use std::sync::Arc;

    fn manager() -> ConversationManager {
        ConversationManager::new(PersistentStore::new(Arc::new(MemoryStorage::new())))
    }

    #[test]
    fn test_plain_text_is_not_a_command() {
        assert_eq!(execute_command("hello", &manager()), None);
    }

    #[test]
    fn test_aliases() {
        let m = manager();
        assert_eq!(execute_command("/q", &m), Some(CommandResult::Exit));
        assert_eq!(execute_command("  /CLEAR ", &m), Some(CommandResult::Clear));
        assert!(matches!(
            execute_command("/help", &m),
            Some(CommandResult::Message(_))
        ));
    }

    #[test]
    fn test_reset_command() {
        let m = manager();
        assert_eq!(execute_command("/reset", &m), Some(CommandResult::ClearAllData));
        // Arguments are ignored
        assert_eq!(execute_command("/RESET all", &m), Some(CommandResult::ClearAllData));
    }

    #[test]
    fn test_unknown_command() {
        assert_eq!(
            execute_command("/frobnicate now", &manager()),
            Some(CommandResult::Unknown("frobnicate".into()))
        );
    }

    #[test]
    fn test_usage_reports_kilobytes() {
        let m = manager();
        m.add_message(NewMessage::user("x".repeat(3000)));
        let Some(CommandResult::Message(text)) = execute_command("/usage", &m) else {
            panic!("expected a message");
        };
        assert!(text.starts_with("Storage used: 3 KB"), "{}", text);
    }
}
