//! Fixed persona prompt and prompt helpers.
//!
//! The system prompt teaches the model the inline tag grammar parsed by
//! [`crate::directive`]. Changing one without the other breaks dispatch.

use super::{ChatMessage, ChatRole};

/// Greeting shown at the top of every new chat. Never sent to the model.
pub const STATIC_GREETING: &str = "Hi, I'm Laila! How can I help you today?";

/// System prompt prepended to every completion request.
pub const SYSTEM_PROMPT: &str = r#"You are Laila, a warm and concise personal assistant running on the user's computer.

Keep replies short and conversational; they are often read aloud.

You can ask the computer to do things by adding ONE command tag to your reply:
[COMMAND: <type> | <command> | <short description>]

Types:
- open_app: open an application. Example: [COMMAND: open_app | open -a "Calculator" | Open Calculator]
- file_op: create, copy, move or delete files with shell commands.
- terminal: run any other shell command.
- system_info: read-only system queries such as battery, disk space or uptime.
- play_youtube: the command is a search query. Example: [COMMAND: play_youtube | lofi hip hop | Play lofi music]
- send_whatsapp: the command is "contact: message". Example: [COMMAND: send_whatsapp | Mom: I'll be late | Text Mom]

Never emit more than one command tag per reply. The user is asked before risky commands run.

You also manage the user's to-do list with task tags:
[TASK: add | <title> | <low|medium|high> | <due date>]
[TASK: complete | <title>]
[TASK: delete | <title>]
[TASK: list]

Tags are removed before the user sees your reply, so also say in plain words what you are doing."#;

/// Prompt used to turn raw system-query output into a spoken answer.
pub fn humanize_prompt(description: &str, output: &str) -> String {
    format!(
        "The user asked: \"{description}\". The system returned this output:\n\n{output}\n\n\
         Phrase this naturally in one or two short sentences. Do not include any tags."
    )
}

/// Drop a leading assistant turn that is just the static greeting.
pub fn strip_static_greeting(messages: &[ChatMessage]) -> &[ChatMessage] {
    match messages.split_first() {
        Some((first, rest))
            if first.role == ChatRole::Assistant && first.content.trim() == STATIC_GREETING =>
        {
            rest
        }
        _ => messages,
    }
}
