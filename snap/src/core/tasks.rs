//! Task file identity and selection.
//!
//! A task is a file named `TASK<n>.md` (strict uppercase). Its id is `TASK<n>`
//! with `<n>` exactly as written, so `TASK01.md` and `TASK1.md` both claim
//! number 1 and conflict.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use anyhow::{Result, anyhow};
use regex::Regex;

static TASK_FILE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^TASK(\d+)\.md$").expect("task file regex"));

static TASK_FILE_LOOSE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^task[-_ ]?0*(\d+)\.md$").expect("loose task regex"));

static PRD_TASK_HEADER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^##\s+TASK\d+:").expect("prd header regex"));

/// A discovered task file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    /// `TASK<n>` as written in the filename.
    pub id: String,
    /// Numeric value of `<n>`; canonical ordering key.
    pub number: u64,
    /// Bare filename (`TASK<n>.md`).
    pub filename: String,
}

/// Parse a strict task filename. Returns `None` for anything else.
pub fn parse_task_filename(name: &str) -> Option<Task> {
    let caps = TASK_FILE_RE.captures(name)?;
    let digits = caps.get(1)?.as_str();
    let number = digits.parse::<u64>().ok()?;
    Some(Task {
        id: format!("TASK{digits}"),
        number,
        filename: name.to_string(),
    })
}

/// Build the ordered task list from candidate filenames.
///
/// Non-matching names are ignored. Two filenames claiming the same number
/// are an error.
pub fn collect_tasks<'a>(names: impl IntoIterator<Item = &'a str>) -> Result<Vec<Task>> {
    let mut by_number: BTreeMap<u64, Task> = BTreeMap::new();
    for name in names {
        let Some(task) = parse_task_filename(name) else {
            continue;
        };
        if let Some(existing) = by_number.get(&task.number) {
            let (a, b) = if existing.filename <= task.filename {
                (existing.filename.as_str(), task.filename.as_str())
            } else {
                (task.filename.as_str(), existing.filename.as_str())
            };
            return Err(anyhow!(
                "conflicting task files {a} and {b} both claim task number {}",
                task.number
            ));
        }
        by_number.insert(task.number, task);
    }
    Ok(by_number.into_values().collect())
}

/// First task whose id is not in `completed`.
pub fn select_next_task<'a>(tasks: &'a [Task], completed: &[String]) -> Option<&'a Task> {
    tasks
        .iter()
        .find(|task| !completed.iter().any(|done| done == &task.id))
}

/// Find a task by id.
pub fn find_task<'a>(tasks: &'a [Task], id: &str) -> Option<&'a Task> {
    tasks.iter().find(|task| task.id == id)
}

/// Canonical filename for a near-miss like `task1.md` or `Task_02.md`.
///
/// Returns `None` for strict names and for names that do not look like tasks.
pub fn suggest_canonical_name(name: &str) -> Option<String> {
    if TASK_FILE_RE.is_match(name) {
        return None;
    }
    let caps = TASK_FILE_LOOSE_RE.captures(name)?;
    let number = caps.get(1)?.as_str().parse::<u64>().ok()?;
    Some(format!("TASK{number}.md"))
}

/// True if PRD text embeds task sections (`## TASK<n>:` headers).
pub fn prd_has_task_headers(prd: &str) -> bool {
    PRD_TASK_HEADER_RE.is_match(prd)
}
