//! Tool input schemas (§6): declared once here, independent of any LLM
//! provider's wire format. A tool host translates a [`ToolDefinition`]
//! into whatever shape its provider expects (OpenAI-style function
//! tools, Anthropic-style tool specs, MCP tool listings, ...); this
//! crate itself never talks to a provider.

use std::collections::BTreeMap;

use serde::Serialize;

/// A JSON-Schema subset sufficient to describe every tool's input in this
/// crate's fixed tool surface: scalars, arrays, and objects with required
/// fields, nothing recursive-by-reference and no `oneOf`/`anyOf`.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum JsonSchema {
    String {
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
        allowed: Option<Vec<String>>,
    },
    Integer {
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    Boolean {
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    Array {
        items: Box<JsonSchema>,
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    Object {
        properties: BTreeMap<String, JsonSchema>,
        #[serde(skip_serializing_if = "Option::is_none")]
        required: Option<Vec<String>>,
        #[serde(rename = "additionalProperties")]
        additional_properties: bool,
    },
}

fn string(description: &str) -> JsonSchema {
    JsonSchema::String {
        description: Some(description.to_string()),
        allowed: None,
    }
}

fn string_enum(description: &str, allowed: &[&str]) -> JsonSchema {
    JsonSchema::String {
        description: Some(description.to_string()),
        allowed: Some(allowed.iter().map(|s| s.to_string()).collect()),
    }
}

fn integer(description: &str) -> JsonSchema {
    JsonSchema::Integer {
        description: Some(description.to_string()),
    }
}

fn boolean(description: &str) -> JsonSchema {
    JsonSchema::Boolean {
        description: Some(description.to_string()),
    }
}

fn object(fields: &[(&str, JsonSchema)], required: &[&str]) -> JsonSchema {
    JsonSchema::Object {
        properties: fields.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
        required: Some(required.iter().map(|s| s.to_string()).collect()),
        additional_properties: false,
    }
}

/// A single entry in the fixed tool surface (§6 table).
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: JsonSchema,
}

/// Every tool this crate exposes, in the order listed in §6. A tool host
/// calls this once at startup and translates the result for whichever
/// provider it is talking to; this crate does not know or care which
/// provider that is.
pub fn tool_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "bash",
            description: "Runs a shell script inside the workspace and returns its output, \
                subject to timeout and output-size limits.",
            parameters: object(
                &[
                    ("script", string("The shell script to run via `bash -c`.")),
                    (
                        "timeout_secs",
                        integer("Maximum wall-clock time in seconds before the command is killed. \
                            Defaults to 3."),
                    ),
                ],
                &["script"],
            ),
        },
        ToolDefinition {
            name: "file_read",
            description: "Reads a file in the workspace, optionally windowed by a 1-based \
                line offset and limit.",
            parameters: object(
                &[
                    ("file_path", string("Path to the file, relative to the workspace root.")),
                    ("offset", integer("1-based line number to start reading from.")),
                    ("limit", integer("Maximum number of lines to return.")),
                ],
                &["file_path"],
            ),
        },
        ToolDefinition {
            name: "file_edit_replace_string",
            description: "Replaces one or more occurrences of a literal string in a file and \
                returns a unified diff.",
            parameters: object(
                &[
                    ("file_path", string("Path to the file, relative to the workspace root.")),
                    ("old_string", string("Exact text to find.")),
                    ("new_string", string("Text to replace it with.")),
                    (
                        "replace_count",
                        integer("Number of occurrences to replace; -1 replaces all. Defaults to 1."),
                    ),
                ],
                &["file_path", "old_string", "new_string"],
            ),
        },
        ToolDefinition {
            name: "file_edit_replace_lines",
            description: "Replaces an inclusive line range in a file with new content and \
                returns a unified diff.",
            parameters: object(
                &[
                    ("file_path", string("Path to the file, relative to the workspace root.")),
                    ("start_line", integer("1-based first line of the range to replace.")),
                    ("end_line", integer("1-based last line of the range to replace.")),
                    (
                        "new_lines",
                        JsonSchema::Array {
                            items: Box::new(string("One replacement line.")),
                            description: Some(
                                "Lines to put in place of the range; empty deletes it.".to_string(),
                            ),
                        },
                    ),
                    (
                        "expected_lines",
                        JsonSchema::Array {
                            items: Box::new(string("One expected existing line.")),
                            description: Some(
                                "Optional pre-image check: reject the edit if the file's current \
                                 content at this range doesn't match."
                                    .to_string(),
                            ),
                        },
                    ),
                ],
                &["file_path", "start_line", "end_line", "new_lines"],
            ),
        },
        ToolDefinition {
            name: "file_edit_insert",
            description: "Inserts content after a given line (0 inserts at the top of the \
                file) and returns a unified diff.",
            parameters: object(
                &[
                    ("file_path", string("Path to the file, relative to the workspace root.")),
                    ("line_offset", integer("0 inserts at the top; N inserts after line N.")),
                    ("content", string("Text to insert.")),
                    ("create", boolean("Create the file with empty content first if missing.")),
                ],
                &["file_path", "line_offset", "content"],
            ),
        },
        ToolDefinition {
            name: "file_search",
            description: "Searches a file for an exact, case-sensitive substring and returns \
                matches with surrounding context.",
            parameters: object(
                &[
                    ("file_path", string("Path to the file, relative to the workspace root.")),
                    ("pattern", string("Literal substring to search for.")),
                    ("context_lines", integer("Lines of context before/after each match. Defaults to 3.")),
                    ("max_results", integer("Maximum number of matches to return. Defaults to 100.")),
                ],
                &["file_path", "pattern"],
            ),
        },
        ToolDefinition {
            name: "file_list",
            description: "Lists a directory's entries, gitignore-aware, directories before \
                files.",
            parameters: object(
                &[
                    ("path", string("Directory to list, relative to the workspace root.")),
                    ("max_depth", integer("How many levels deep to recurse. Defaults to 1, capped at 10.")),
                    ("pattern", string("Only include entries whose name contains this substring.")),
                    ("gitignore", boolean("Filter entries using the workspace's .gitignore. Defaults to true.")),
                    ("max_entries", integer("Fail instead of truncating past this many entries. Defaults to 64.")),
                ],
                &["path"],
            ),
        },
        ToolDefinition {
            name: "todo_read",
            description: "Returns the current persisted TODO list.",
            parameters: object(&[], &[]),
        },
        ToolDefinition {
            name: "todo_write",
            description: "Replaces the persisted TODO list. Must satisfy the ordering \
                invariants: completed items first, at most one in_progress, pending last.",
            parameters: object(
                &[(
                    "todos",
                    JsonSchema::Array {
                        items: Box::new(object(
                            &[
                                ("content", string("What the TODO item is.")),
                                (
                                    "status",
                                    string_enum(
                                        "Current status.",
                                        &["pending", "in_progress", "completed"],
                                    ),
                                ),
                            ],
                            &["content", "status"],
                        )),
                        description: Some("The full TODO list, in display order.".to_string()),
                    },
                )],
                &["todos"],
            ),
        },
        ToolDefinition {
            name: "status_set",
            description: "Posts a single-emoji status ping alongside a short message.",
            parameters: object(
                &[
                    ("emoji", string("Exactly one emoji grapheme cluster.")),
                    ("message", string("Status text, at most 40 characters.")),
                ],
                &["emoji", "message"],
            ),
        },
        ToolDefinition {
            name: "propose_plan",
            description: "Proposes a structured, steppable plan for the work ahead.",
            parameters: object(
                &[
                    ("explanation", string("Optional rationale for the plan.")),
                    (
                        "plan",
                        JsonSchema::Array {
                            items: Box::new(object(
                                &[
                                    ("step", string("What this step does.")),
                                    (
                                        "status",
                                        string_enum(
                                            "Current status.",
                                            &["pending", "in_progress", "completed"],
                                        ),
                                    ),
                                ],
                                &["step", "status"],
                            )),
                            description: Some("Ordered plan steps.".to_string()),
                        },
                    ),
                ],
                &["plan"],
            ),
        },
        ToolDefinition {
            name: "compact_summary",
            description: "Records a summary of the conversation so far, for use after \
                context compaction.",
            parameters: object(&[("summary", string("The summary text."))], &["summary"]),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_fixed_tool_is_declared_exactly_once() {
        let defs = tool_definitions();
        let expected = [
            "bash",
            "file_read",
            "file_edit_replace_string",
            "file_edit_replace_lines",
            "file_edit_insert",
            "file_search",
            "file_list",
            "todo_read",
            "todo_write",
            "status_set",
            "propose_plan",
            "compact_summary",
        ];
        assert_eq!(defs.len(), expected.len());
        for name in expected {
            assert!(defs.iter().any(|d| d.name == name), "missing tool `{name}`");
        }
    }

    #[test]
    fn bash_script_is_required() {
        let defs = tool_definitions();
        let Some(bash) = defs.iter().find(|d| d.name == "bash") else {
            panic!("bash tool definition is missing");
        };
        let JsonSchema::Object { required, .. } = &bash.parameters else {
            panic!("bash parameters must be an object schema");
        };
        assert_eq!(required.as_deref(), Some(["script".to_string()].as_slice()));
    }
}
