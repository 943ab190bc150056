//! Manual tool picker.
//!
//! Lists the available tools, lets the user choose a tool by number, prompts for each
//! required argument and prints the result. Bad input never reaches a
//! provider: an invalid selection re-prompts and an argument that does not
//! coerce to its declared type abandons the attempt.

use std::io::Write;

use tokio::io::AsyncBufRead;

use crate::mcp_client::{McpClient, ToolDescriptor};

use super::errors::AgentError;
use super::input::{is_exit_command, prompt_line};

const SELECT_PROMPT: &str = "\nSelect a tool by number (or 'quit' to quit): ";

/// Interactive, human-directed front-end.
pub struct ManualPicker<'a> {
    client: &'a McpClient,
}

impl<'a> ManualPicker<'a> {
    pub fn new(client: &'a McpClient) -> Self {
        Self { client }
    }

    /// Run until the user quits or input ends.
    pub async fn run<R, W>(&self, input: &mut R, out: &mut W) -> Result<(), AgentError>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        let mut tools = self.client.available_tools();
        if tools.is_empty() {
            writeln!(out, "No tools available.")?;
            return Ok(());
        }
        print_tools(&tools, out)?;

        loop {
            let Some(choice) = prompt_line(input, out, SELECT_PROMPT).await? else {
                return Ok(());
            };
            if is_exit_command(&choice) {
                writeln!(out, "Exiting...")?;
                return Ok(());
            }

            let Some(tool) = choice
                .trim()
                .parse::<usize>()
                .ok()
                .and_then(|n| n.checked_sub(1))
                .and_then(|i| tools.get(i).copied())
            else {
                writeln!(out, "Please enter a valid number.")?;
                continue;
            };

            let Some(arguments) = prompt_for_args(tool, input, out).await? else {
                writeln!(out, "Invalid input. Please try again.")?;
                continue;
            };

            writeln!(out, "Calling tool {} with args: {arguments}", tool.qualified_name)?;
            match self.client.dispatch(&tool.qualified_name, arguments).await {
                Ok(result) if result.is_error => {
                    writeln!(out, "Tool reported an error: {}", result.display_text)?;
                }
                Ok(result) => writeln!(out, "Tool call result: {}", result.display_text)?,
                Err(e) => {
                    tracing::warn!(tool = %tool.qualified_name, error = %e, "manual tool call failed");
                    writeln!(out, "Error calling tool {}: {e}", tool.qualified_name)?;
                }
            }

            // A provider that died during the call takes its tools with it.
            let still_available = self.client.available_tools();
            if still_available.len() != tools.len() {
                tools = still_available;
                if tools.is_empty() {
                    writeln!(out, "No tools available.")?;
                    return Ok(());
                }
                writeln!(out, "\nSome tools are no longer available.")?;
                print_tools(&tools, out)?;
            }
        }
    }
}

fn print_tools<W: Write>(tools: &[&ToolDescriptor], out: &mut W) -> Result<(), AgentError> {
    writeln!(out, "Available Tools:\n")?;
    for (i, tool) in tools.iter().enumerate() {
        writeln!(
            out,
            "{}. [{}] {} - {}",
            i + 1,
            tool.provider_id,
            tool.original_name,
            tool.description
        )?;
    }
    Ok(())
}

/// Prompt once per required property, coercing each answer.
///
/// Returns `None` if an answer does not coerce or input ends; nothing
/// collected so far is kept.
async fn prompt_for_args<R, W>(
    tool: &ToolDescriptor,
    input: &mut R,
    out: &mut W,
) -> Result<Option<serde_json::Value>, AgentError>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut arguments = serde_json::Map::new();

    for key in tool.required_properties() {
        let Some(raw) = prompt_line(input, out, &format!("Enter value for {key}: ")).await? else {
            return Ok(None);
        };
        match coerce_value(tool.property_type(key), &raw) {
            Ok(value) => {
                arguments.insert(key.to_string(), value);
            }
            Err(expected) => {
                writeln!(out, "Invalid input for {key}. Expected {expected}.")?;
                return Ok(None);
            }
        }
    }

    Ok(Some(serde_json::Value::Object(arguments)))
}

/// Convert a typed-in answer to the declared primitive type.
///
/// On failure returns a description of what was expected.
pub fn coerce_value(declared: Option<&str>, raw: &str) -> Result<serde_json::Value, &'static str> {
    let trimmed = raw.trim();
    match declared {
        Some("number") => {
            if let Ok(n) = trimmed.parse::<i64>() {
                return Ok(n.into());
            }
            trimmed
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(serde_json::Value::Number)
                .ok_or("a number")
        }
        Some("integer") => trimmed.parse::<i64>().map(Into::into).map_err(|_| "an integer"),
        Some("boolean") => match trimmed.to_ascii_lowercase().as_str() {
            "true" | "yes" | "y" | "1" => Ok(true.into()),
            "false" | "no" | "n" | "0" => Ok(false.into()),
            _ => Err("a boolean"),
        },
        Some("array") => serde_json::from_str::<serde_json::Value>(trimmed)
            .ok()
            .filter(|v| v.is_array())
            .ok_or("a JSON array"),
        Some("object") => serde_json::from_str::<serde_json::Value>(trimmed)
            .ok()
            .filter(|v| v.is_object())
            .ok_or("a JSON object"),
        _ => Ok(serde_json::Value::String(raw.to_string())),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
