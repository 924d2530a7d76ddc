/// Opaque identifier of a conversation, e.g. a Telegram chat id or `"terminal"`.
pub type ConversationKey = String;

/// Identifier the model attaches to each tool call.
pub type ToolCallId = String;

/// Identifier of a git commit produced by the mutation guard.
pub type CommitId = String;
