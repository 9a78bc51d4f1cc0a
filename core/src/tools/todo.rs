//! Todo store (C7, §4.2, §4.7).
//!
//! A per-workspace JSON array persisted at `<runtimeTempDir>/todos.json`.
//! This tool never touches the init gate (§5, "Init gate") — it has
//! nothing to do with workspace readiness, only with `runtime.read_file` /
//! `write_file` / `remove_file` against a path this crate itself owns.

use serde::Deserialize;
use serde::Serialize;

use crate::config::ToolConfiguration;

pub const MAX_TODOS: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    Pending,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TodoItem {
    pub content: String,
    pub status: TodoStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct TodoReadResult {
    pub success: bool,
    pub todos: Vec<TodoItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TodoWriteResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TodoWriteResult {
    fn rejected(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }

    fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }
}

pub async fn todo_read(config: &ToolConfiguration) -> TodoReadResult {
    match config.runtime.read_file(&config.todos_path()).await {
        Ok(bytes) => match serde_json::from_slice::<Vec<TodoItem>>(&bytes) {
            Ok(todos) => TodoReadResult {
                success: true,
                todos,
            },
            Err(_) => TodoReadResult {
                success: true,
                todos: Vec::new(),
            },
        },
        Err(_) => TodoReadResult {
            success: true,
            todos: Vec::new(),
        },
    }
}

pub async fn todo_write(config: &ToolConfiguration, todos: Vec<TodoItem>) -> TodoWriteResult {
    if let Err(reason) = validate(&todos) {
        return TodoWriteResult::rejected(reason);
    }

    let body = match serde_json::to_string_pretty(&todos) {
        Ok(body) => body,
        Err(e) => return TodoWriteResult::rejected(e.to_string()),
    };

    match config
        .runtime
        .write_file(&config.todos_path(), body.into_bytes())
        .await
    {
        Ok(()) => TodoWriteResult::ok(),
        Err(e) => TodoWriteResult::rejected(e.to_string()),
    }
}

pub async fn todo_clear(config: &ToolConfiguration) -> TodoWriteResult {
    match config.runtime.remove_file(&config.todos_path()).await {
        Ok(()) => TodoWriteResult::ok(),
        Err(e) => TodoWriteResult::rejected(e.to_string()),
    }
}

/// Checks invariants in the order the caller should see them fail in:
/// phase order, then the single-`in_progress` rule, then the count cap.
/// A failure here must leave the previously persisted file untouched,
/// which is why validation always runs before any write.
fn validate(todos: &[TodoItem]) -> Result<(), String> {
    // The only legal shape is `completed* · in_progress? · pending*`: phase
    // never moves backwards.
    let phase = |status: TodoStatus| -> u8 {
        match status {
            TodoStatus::Completed => 0,
            TodoStatus::InProgress => 1,
            TodoStatus::Pending => 2,
        }
    };

    let mut current_phase = 0u8;
    let mut in_progress_count = 0usize;
    for todo in todos {
        let item_phase = phase(todo.status);
        if item_phase < current_phase {
            return Err(
                "Invalid TODO order: completed items must precede any in_progress or pending \
                 item, and in_progress must precede pending; expected order is `completed*, \
                 in_progress?, pending*`."
                    .to_string(),
            );
        }
        current_phase = item_phase;
        if todo.status == TodoStatus::InProgress {
            in_progress_count += 1;
        }
    }

    if in_progress_count > 1 {
        return Err("Invalid TODO list: at most one item may be `in_progress`.".to_string());
    }

    if todos.len() > MAX_TODOS {
        return Err(format!(
            "Too many TODOs ({}/{MAX_TODOS}). Keep high precision at the center of attention — \
             collapse finished or distant steps instead of tracking every one.",
            todos.len()
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(content: &str, status: TodoStatus) -> TodoItem {
        TodoItem {
            content: content.to_string(),
            status,
        }
    }

    #[test]
    fn accepts_canonical_phase_order() {
        let todos = vec![
            item("a", TodoStatus::Completed),
            item("b", TodoStatus::InProgress),
            item("c", TodoStatus::Pending),
        ];
        assert!(validate(&todos).is_ok());
    }

    #[test]
    fn rejects_completed_after_in_progress() {
        let todos = vec![
            item("a", TodoStatus::InProgress),
            item("b", TodoStatus::Completed),
        ];
        let err = validate(&todos).unwrap_err();
        assert!(err.contains("must precede"));
    }

    #[test]
    fn rejects_two_in_progress() {
        let todos = vec![
            item("a", TodoStatus::InProgress),
            item("b", TodoStatus::InProgress),
        ];
        let err = validate(&todos).unwrap_err();
        assert!(err.contains("at most one"));
    }

    #[test]
    fn rejects_over_max_todos() {
        let todos: Vec<_> = (0..MAX_TODOS + 1)
            .map(|i| item(&format!("t{i}"), TodoStatus::Pending))
            .collect();
        let err = validate(&todos).unwrap_err();
        assert!(err.contains("Too many TODOs"));
    }

    #[test]
    fn rejects_pending_before_in_progress() {
        let todos = vec![
            item("a", TodoStatus::Pending),
            item("b", TodoStatus::InProgress),
        ];
        let err = validate(&todos).unwrap_err();
        assert!(err.contains("Invalid TODO order"));
    }

    #[test]
    fn s7_scenario_completed_after_in_progress_is_rejected() {
        let todos = vec![
            item("x", TodoStatus::InProgress),
            item("y", TodoStatus::Completed),
        ];
        assert!(validate(&todos).is_err());
    }
}
