//! Messaging automation through AppleScript.
//!
//! The script activates the messaging app, clears overlays, finds the chat
//! search field (three increasingly broad lookups, then a ⌘F fallback),
//! pastes the contact through the clipboard, opens the first match and
//! optionally pastes and sends the message.
//!
//! Contact and message text are embedded as AppleScript string literals, so
//! both pass through [`escape_applescript`] first. The finished script is
//! single-quoted for `/bin/sh` by [`shell_command`].

use super::{ExecFailure, ExecResult};

/// Shown when the OS blocks UI scripting.
pub const ACCESSIBILITY_HELP: &str = "I need Accessibility permission to send messages. \
Open System Settings > Privacy & Security > Accessibility, enable the app running Laila, then try again.";

const ACCESSIBILITY_MARKERS: &[&str] = &[
    "assistive access",
    "not allowed to send keystrokes",
    "-1719",
    "-25211",
];

/// A parsed `send_whatsapp` command: `contact[: message]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhatsappRequest {
    pub contact: String,
    pub message: Option<String>,
}

impl WhatsappRequest {
    /// Split on the first colon. `None` when the contact is blank.
    pub fn parse(command: &str) -> Option<Self> {
        let (contact, message) = match command.split_once(':') {
            Some((c, m)) => (c.trim(), Some(m.trim())),
            None => (command.trim(), None),
        };
        if contact.is_empty() {
            return None;
        }
        Some(Self {
            contact: contact.to_owned(),
            message: message.filter(|m| !m.is_empty()).map(str::to_owned),
        })
    }
}

/// Escape text for an AppleScript double-quoted literal.
///
/// Control characters are dropped, then backslashes and double quotes are
/// escaped in that order.
pub fn escape_applescript(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_control())
        .collect::<String>()
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
}

/// Wrap a script as an `osascript` invocation for `/bin/sh -c`.
pub fn shell_command(script: &str) -> String {
    format!("osascript -e '{}'", script.replace('\'', "'\\''"))
}

/// Build the automation script for `request` against `app`.
pub fn build_script(app: &str, request: &WhatsappRequest) -> String {
    let app = escape_applescript(app);
    let contact = escape_applescript(&request.contact);

    let mut script = format!(
        r#"tell application "{app}" to activate
delay 1.5
tell application "System Events"
    tell process "{app}"
        set frontmost to true
        key code 53
        delay 0.3
        set searchField to missing value
        try
            set searchField to first text field of window 1 whose value of attribute "AXPlaceholderValue" contains "search"
        end try
        if searchField is missing value then
            try
                set searchField to first text field of group 1 of window 1 whose value of attribute "AXPlaceholderValue" contains "search"
            end try
        end if
        if searchField is missing value then
            try
                set searchField to first UI element of (entire contents of window 1) whose role is "AXTextField" and value of attribute "AXPlaceholderValue" contains "search"
            end try
        end if
        if searchField is not missing value then
            click searchField
        else
            keystroke "f" using command down
        end if
        delay 0.5
        set the clipboard to "{contact}"
        keystroke "a" using command down
        keystroke "v" using command down
        delay 1.5
        key code 125
        delay 0.3
        key code 36
        delay 1.0
"#
    );

    if let Some(message) = &request.message {
        let message = escape_applescript(message);
        script.push_str(&format!(
            r#"        try
            set composeField to last text area of window 1
            click composeField
        end try
        set the clipboard to "{message}"
        keystroke "v" using command down
        delay 0.3
        key code 36
"#
        ));
    }

    script.push_str("    end tell\nend tell\n");
    script
}

/// Whether failure text indicates the OS denied UI scripting.
pub fn is_accessibility_denial(text: &str) -> bool {
    let lower = text.to_lowercase();
    ACCESSIBILITY_MARKERS.iter().any(|m| lower.contains(m))
}

/// Refine a failed script result, spotting accessibility denials.
pub fn classify_failure(result: &ExecResult) -> ExecFailure {
    let failure = result
        .error
        .clone()
        .unwrap_or_else(|| ExecFailure::Other("unknown error".into()));
    let detail = format!("{} {}", result.output, failure);
    if is_accessibility_denial(&detail) {
        ExecFailure::Permission(result.output.trim().to_owned())
    } else {
        failure
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn parse_contact_and_message() {
        let req = WhatsappRequest::parse("Mom: running late, see you at 7: ok?").unwrap();
        assert_eq!(req.contact, "Mom");
        assert_eq!(req.message.as_deref(), Some("running late, see you at 7: ok?"));
    }

    #[test]
    fn parse_contact_only() {
        let req = WhatsappRequest::parse("  Dad ").unwrap();
        assert_eq!(req.contact, "Dad");
        assert!(req.message.is_none());

        let req = WhatsappRequest::parse("Dad:   ").unwrap();
        assert!(req.message.is_none());
    }

    #[test]
    fn parse_rejects_blank_contact() {
        assert!(WhatsappRequest::parse(": hello").is_none());
        assert!(WhatsappRequest::parse("   ").is_none());
    }

    #[test]
    fn escape_handles_backslash_before_quote() {
        assert_eq!(escape_applescript(r#"say "hi" \o/"#), r#"say \"hi\" \\o/"#);
    }

    #[test]
    fn escape_strips_control_characters() {
        assert_eq!(escape_applescript("line1\nline2\t\u{7}end"), "line1line2end");
    }

    #[test]
    fn shell_command_escapes_single_quotes() {
        let cmd = shell_command(r#"set the clipboard to "it's""#);
        assert_eq!(cmd, r#"osascript -e 'set the clipboard to "it'\''s"'"#);
    }

    #[test]
    fn script_embeds_escaped_values() {
        let req = WhatsappRequest {
            contact: "Ann \"Boss\"".into(),
            message: Some("back\\slash".into()),
        };
        let script = build_script("WhatsApp", &req);
        assert!(script.contains(r#"set the clipboard to "Ann \"Boss\"""#));
        assert!(script.contains(r#"set the clipboard to "back\\slash""#));
        assert!(script.contains("keystroke \"f\" using command down"));
        assert!(script.trim_end().ends_with("end tell"));
    }

    #[test]
    fn script_without_message_does_not_send() {
        let req = WhatsappRequest::parse("Dad").unwrap();
        let script = build_script("WhatsApp", &req);
        assert_eq!(script.matches("set the clipboard to").count(), 1);
    }

    #[test]
    fn accessibility_markers_detected() {
        assert!(is_accessibility_denial("osascript is not allowed assistive access"));
        assert!(is_accessibility_denial("System Events got an error: (-25211)"));
        assert!(is_accessibility_denial("Not allowed to send keystrokes"));
        assert!(!is_accessibility_denial("WhatsApp got an error: window 1 doesn't exist"));
    }

    #[test]
    fn classify_failure_promotes_permission() {
        let result = ExecResult::failed_with_output(
            ExecFailure::Failed { code: 1 },
            "execution error (-1719)",
        );
        assert!(matches!(classify_failure(&result), ExecFailure::Permission(_)));

        let result = ExecResult::failed(ExecFailure::Timeout(30));
        assert_eq!(classify_failure(&result), ExecFailure::Timeout(30));
    }
}
