//! Output formatting
//!
//! Text for humans, or the `{ "success": bool, "data" | "error" }` envelope
//! for scripts.

use serde::Serialize;

use crate::cli::commands::CommandError;
use crate::types::OutputFormat;

#[derive(Serialize)]
struct Envelope<'a, T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<&'a T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Print a command result
///
/// In JSON mode `data` is wrapped in a success envelope; in text mode
/// `text` prints the human-readable form.
pub fn emit<T, F>(format: OutputFormat, data: &T, text: F) -> Result<(), CommandError>
where
    T: Serialize,
    F: FnOnce(&T),
{
    match format {
        OutputFormat::Json => {
            let envelope = Envelope {
                success: true,
                data: Some(data),
                error: None,
            };
            println!("{}", serde_json::to_string_pretty(&envelope)?);
        }
        OutputFormat::Text => text(data),
    }
    Ok(())
}

/// Render a failed command as a JSON error envelope
pub fn error_envelope(message: &str) -> String {
    let envelope: Envelope<'_, ()> = Envelope {
        success: false,
        data: None,
        error: Some(message.to_string()),
    };
    serde_json::to_string_pretty(&envelope)
        .unwrap_or_else(|_| format!("{{\"success\":false,\"error\":{:?}}}", message))
}
