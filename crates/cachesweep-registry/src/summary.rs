use cachesweep_core::QueueItem;
use std::fmt::Write as _;
use time::macros::format_description;
use time::OffsetDateTime;

pub const EMPTY_QUEUE: &str = "No tasks in queue.";

/// Markdown digest of the queue, one section per item.
pub fn render_summary(items: &[QueueItem]) -> String {
    if items.is_empty() {
        return EMPTY_QUEUE.to_string();
    }

    let mut out = String::from("# Current Tasks in Queue\n\n");
    for item in items {
        let _ = writeln!(out, "## [{}] {}", item.priority_label(), item.title);
        let _ = writeln!(out, "- **Stage:** {}", item.stage);
        if let Some(repo) = non_empty(&item.repo_path) {
            let _ = writeln!(out, "- **Repository:** {repo}");
        }
        if let Some(file) = non_empty(&item.file_path) {
            let _ = writeln!(out, "- **File:** {file}");
        }
        if let Some(desc) = non_empty(&item.description) {
            let _ = writeln!(out, "- **Description:** {desc}");
        }
        out.push('\n');
    }
    out
}

/// Numbered plain-text listing for the terminal.
pub fn render_queue(items: &[QueueItem]) -> String {
    if items.is_empty() {
        return "Queue is empty\n".to_string();
    }
    let mut out = format!("Task Queue ({} items)\n\n", items.len());
    for (idx, item) in items.iter().enumerate() {
        let _ = writeln!(out, "{}. [{}] {}", idx + 1, item.priority_label(), item.title);
        if let Some(file) = non_empty(&item.file_path) {
            let _ = writeln!(out, "   📁 {file}");
        }
    }
    out
}

/// `task_summary_YYYYMMDD_HHMMSS.md`
pub fn summary_file_name(now: OffsetDateTime) -> String {
    let stamp = now
        .format(format_description!(
            "[year][month][day]_[hour][minute][second]"
        ))
        .unwrap_or_else(|_| now.unix_timestamp().to_string());
    format!("task_summary_{stamp}.md")
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn item(title: &str, priority: i64) -> QueueItem {
        QueueItem {
            id: title.into(),
            title: title.into(),
            description: None,
            priority,
            stage: "inbox".into(),
            repo_path: None,
            file_path: None,
            created_at: datetime!(2026-01-01 0:00 UTC),
        }
    }

    #[test]
    fn empty_queue() {
        assert_eq!(render_summary(&[]), "No tasks in queue.");
        assert_eq!(render_queue(&[]), "Queue is empty\n");
    }

    #[test]
    fn summary_sections() {
        let mut a = item("Fix unwrap in parser", 1);
        a.repo_path = Some("/home/u/fks".into());
        a.file_path = Some("src/parser.rs".into());
        a.description = Some("panics on empty input".into());
        let b = item("Tidy imports", 7);

        let md = render_summary(&[a, b]);
        assert!(md.starts_with("# Current Tasks in Queue\n\n"));
        assert!(md.contains("## [CRITICAL] Fix unwrap in parser\n- **Stage:** inbox\n"));
        assert!(md.contains("- **Repository:** /home/u/fks\n"));
        assert!(md.contains("- **File:** src/parser.rs\n"));
        assert!(md.contains("- **Description:** panics on empty input\n"));
        assert!(md.contains("## [LOW] Tidy imports\n- **Stage:** inbox\n\n"));
    }

    #[test]
    fn queue_listing_is_numbered() {
        let mut a = item("first", 2);
        a.file_path = Some("src/a.rs".into());
        let text = render_queue(&[a, item("second", 0)]);
        assert!(text.starts_with("Task Queue (2 items)"));
        assert!(text.contains("1. [HIGH] first\n   📁 src/a.rs\n"));
        assert!(text.contains("2. [UNKNOWN] second\n"));
    }

    #[test]
    fn file_name_stamp() {
        assert_eq!(
            summary_file_name(datetime!(2026-03-04 05:06:07 UTC)),
            "task_summary_20260304_050607.md"
        );
    }
}
