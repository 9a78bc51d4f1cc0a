//! Output accountant (C2, §4.2).
//!
//! A line-buffered consumer of interleaved stdout/stderr bytes that enforces
//! per-line, total-display, and total-preservation byte caps, and drives the
//! two-stage (display / file) truncation decision the process supervisor
//! acts on. `ingest_line` never splits a line: a line that would push past
//! the file cap is rejected as a whole unit, so the preserved output never
//! ends in a partial line.

/// Display cap: lines collected before display truncation kicks in, under
/// the `tmpfile` policy.
pub const BASH_HARD_MAX_LINES: usize = 300;
/// A single line longer than this is treated as corruption, not content.
pub const BASH_MAX_LINE_BYTES: usize = 1024;
/// Display cap, in total bytes collected, under the `tmpfile` policy.
pub const BASH_MAX_TOTAL_BYTES: usize = 16 * 1024;
/// Hard preservation cap under the `tmpfile` policy: once exceeded,
/// collection stops and the process group is killed.
pub const BASH_MAX_FILE_BYTES: usize = 100 * 1024;

/// Cap used for IPC (`truncate`-policy) callers instead of agent callers.
pub const TRUNCATE_POLICY_MAX_TOTAL_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone, Copy)]
pub struct AccountingLimits {
    pub max_line_bytes: Option<usize>,
    pub max_total_bytes: usize,
    pub max_lines: Option<usize>,
    pub max_file_bytes: usize,
}

impl AccountingLimits {
    /// Caps applied to `tmpfile`-policy (agent) bash calls.
    pub fn tmpfile_policy() -> Self {
        Self {
            max_line_bytes: Some(BASH_MAX_LINE_BYTES),
            max_total_bytes: BASH_MAX_TOTAL_BYTES,
            max_lines: Some(BASH_HARD_MAX_LINES),
            max_file_bytes: BASH_MAX_FILE_BYTES,
        }
    }

    /// Caps applied to `truncate`-policy (IPC) bash calls: no per-line or
    /// line-count cap, and a single, larger total-bytes cap.
    pub fn truncate_policy() -> Self {
        Self {
            max_line_bytes: None,
            max_total_bytes: TRUNCATE_POLICY_MAX_TOTAL_BYTES,
            max_lines: None,
            max_file_bytes: TRUNCATE_POLICY_MAX_TOTAL_BYTES,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TruncationKind {
    /// Soft cap: collection continues, but only up to the file cap.
    Display,
    /// Hard cap: collection stops and the caller must kill the process
    /// group.
    File,
}

#[derive(Debug, Clone)]
pub struct Truncation {
    pub kind: TruncationKind,
    pub reason: String,
}

/// Accumulated state for one bash call's output, across both streams.
pub struct Accountant {
    limits: AccountingLimits,
    lines: Vec<String>,
    total_bytes: usize,
    display_truncation: Option<Truncation>,
    file_truncation: Option<Truncation>,
}

impl Accountant {
    pub fn new(limits: AccountingLimits) -> Self {
        Self {
            limits,
            lines: Vec::new(),
            total_bytes: 0,
            display_truncation: None,
            file_truncation: None,
        }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    pub fn is_file_truncated(&self) -> bool {
        self.file_truncation.is_some()
    }

    pub fn is_display_truncated(&self) -> bool {
        self.display_truncation.is_some()
    }

    pub fn file_truncation(&self) -> Option<&Truncation> {
        self.file_truncation.as_ref()
    }

    pub fn display_truncation(&self) -> Option<&Truncation> {
        self.display_truncation.as_ref()
    }

    /// Joins the collected lines with `\n`, matching how they arrived.
    pub fn collected_output(&self) -> String {
        self.lines.join("\n")
    }

    /// Ingests one line (without its trailing newline). Returns `true` if
    /// this call caused a *new* file truncation — the signal the process
    /// supervisor uses to decide whether to kill the process group right
    /// now.
    pub fn ingest_line(&mut self, line: &str) -> bool {
        // Step 1.
        if self.is_file_truncated() {
            return false;
        }

        let line_number = self.lines.len() + 1;
        let byte_len = line.len();

        // Step 2.
        if let Some(max_line_bytes) = self.limits.max_line_bytes {
            if byte_len > max_line_bytes {
                let reason = format!("line {line_number} exceeded per-line limit");
                tracing::trace!(kind = ?TruncationKind::File, reason, "output accountant: truncating");
                self.file_truncation = Some(Truncation {
                    kind: TruncationKind::File,
                    reason,
                });
                return true;
            }
        }

        // Step 3.
        let next_total = self.total_bytes + byte_len + 1;
        if next_total > self.limits.max_file_bytes {
            let reason = "would exceed file preservation limit";
            tracing::trace!(kind = ?TruncationKind::File, reason, "output accountant: truncating");
            self.file_truncation = Some(Truncation {
                kind: TruncationKind::File,
                reason: reason.to_string(),
            });
            return true;
        }

        // Step 4.
        self.lines.push(line.to_string());
        self.total_bytes = next_total;

        // Step 5.
        if self.display_truncation.is_none() {
            if self.total_bytes > self.limits.max_total_bytes {
                let reason = "exceeded display limit";
                tracing::trace!(kind = ?TruncationKind::Display, reason, "output accountant: truncating");
                self.display_truncation = Some(Truncation {
                    kind: TruncationKind::Display,
                    reason: reason.to_string(),
                });
            } else if let Some(max_lines) = self.limits.max_lines {
                if self.lines.len() >= max_lines {
                    let reason = "exceeded line count";
                    tracing::trace!(kind = ?TruncationKind::Display, reason, "output accountant: truncating");
                    self.display_truncation = Some(Truncation {
                        kind: TruncationKind::Display,
                        reason: reason.to_string(),
                    });
                }
            }
        }

        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_limits() -> AccountingLimits {
        AccountingLimits {
            max_line_bytes: Some(8),
            max_total_bytes: 20,
            max_lines: Some(3),
            max_file_bytes: 40,
        }
    }

    #[test]
    fn ordinary_lines_accumulate_untruncated() {
        let mut acc = Accountant::new(tiny_limits());
        assert!(!acc.ingest_line("ab"));
        assert!(!acc.ingest_line("cd"));
        assert_eq!(acc.lines(), ["ab", "cd"]);
        assert_eq!(acc.total_bytes(), 2 + 1 + 2 + 1);
        assert!(!acc.is_display_truncated());
        assert!(!acc.is_file_truncated());
    }

    #[test]
    fn overlong_line_triggers_file_truncation_and_is_dropped() {
        let mut acc = Accountant::new(tiny_limits());
        let triggered = acc.ingest_line("this line is too long");
        assert!(triggered);
        assert!(acc.is_file_truncated());
        assert!(acc.lines().is_empty());
        assert!(acc.file_truncation().is_some_and(|t| t.reason.contains("per-line limit")));
    }

    #[test]
    fn exceeding_total_bytes_sets_display_truncation_without_killing() {
        let mut acc = Accountant::new(tiny_limits());
        acc.ingest_line("abcdefg");
        let triggered = acc.ingest_line("hijklmn");
        assert!(!triggered);
        assert!(acc.is_display_truncated());
        assert!(!acc.is_file_truncated());
    }

    #[test]
    fn exceeding_line_count_sets_display_truncation() {
        let mut acc = Accountant::new(tiny_limits());
        acc.ingest_line("a");
        acc.ingest_line("b");
        acc.ingest_line("c");
        assert!(acc.is_display_truncated());
        assert!(acc.display_truncation().is_some_and(|t| t.reason.contains("line count")));
    }

    #[test]
    fn display_truncation_does_not_stop_collection_until_file_cap() {
        let mut acc = Accountant::new(AccountingLimits {
            max_line_bytes: Some(100),
            max_total_bytes: 4,
            max_lines: None,
            max_file_bytes: 40,
        });
        acc.ingest_line("hello");
        assert!(acc.is_display_truncated());
        acc.ingest_line("world");
        assert!(!acc.is_file_truncated());
        assert_eq!(acc.lines(), ["hello", "world"]);
    }

    #[test]
    fn once_file_truncated_later_lines_are_dropped_and_state_stays_put() {
        let mut acc = Accountant::new(tiny_limits());
        acc.ingest_line("this line is too long");
        let total_before = acc.total_bytes();
        assert!(!acc.ingest_line("short"));
        assert_eq!(acc.total_bytes(), total_before);
    }

    #[test]
    fn line_that_would_exceed_file_cap_is_rejected_as_a_whole_unit() {
        let mut acc = Accountant::new(AccountingLimits {
            max_line_bytes: Some(100),
            max_total_bytes: 1000,
            max_lines: None,
            max_file_bytes: 10,
        });
        assert!(!acc.ingest_line("12345"));
        let triggered = acc.ingest_line("1234567890");
        assert!(triggered);
        assert_eq!(acc.lines(), ["12345"]);
    }
}
