//! /history and /load commands - browse and reopen saved conversations

use super::CommandResult;
use crate::utils::truncate_chars;
use hung_chat::{ArchivedConversation, ConversationId};

pub struct HistoryCommand;

impl HistoryCommand {
    pub fn list(history: &[ArchivedConversation]) -> CommandResult {
        CommandResult::Message(list_text(history))
    }

    pub fn load(args: &str) -> CommandResult {
        if args.is_empty() {
            return CommandResult::Message(
                "Usage: /load <id>\nSee /history for saved conversation ids.".into(),
            );
        }
        CommandResult::Load(ConversationId::from(args))
    }
}

/// One line per saved conversation, newest first
pub fn list_text(history: &[ArchivedConversation]) -> String {
    if history.is_empty() {
        return "No saved conversations.".to_string();
    }

    let mut output = String::from("Saved conversations:\n\n");
    for conversation in history {
        output.push_str(&format!(
            "  {}  {}  {:>3} msgs  {}\n",
            conversation.id,
            conversation.created_at_display(),
            conversation.message_count,
            truncate_chars(&conversation.title.replace('\n', " "), 40),
        ));
    }
    output.push_str("\nContinue one with: /load <id>");
    output
}
