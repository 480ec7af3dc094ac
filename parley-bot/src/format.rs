//! Discord-flavoured text formatting for bot notices.
//!
//! Discord renders `> ` as a quote bar and single backticks as inline code;
//! command acknowledgments use both so they stand apart from model output.

/// Format a command acknowledgment as a quoted inline-code line.
///
/// Backticks inside `text` would close the code span early, so they are
/// replaced with single quotes.
pub fn acknowledgment(text: &str) -> String {
    format!("> `{}`", text.replace('`', "'"))
}

/// Reminder sent every few exchanges naming the active model.
pub fn milestone_notice(model: &str) -> String {
    format!(
        "> *Hello! You are currently using the `{model}` model. \
         To start a new conversation, use the `/clear` command; \
         a fresh history keeps answers focused on the current topic. \
         Type `/help` for the full list of commands.*"
    )
}

/// Create a Discord embed-like block (text-based fallback).
pub fn format_as_embed(title: &str, description: &str, fields: &[(&str, &str)]) -> String {
    let mut result = String::new();

    if !title.is_empty() {
        result.push_str(&format!("**__{}__**\n", title));
    }

    if !description.is_empty() {
        result.push_str(description);
        result.push('\n');
    }

    if !fields.is_empty() {
        result.push('\n');
        for (name, value) in fields {
            result.push_str(&format!("**{}**\n{}\n", name, value));
        }
    }

    result.trim_end().to_string()
}
