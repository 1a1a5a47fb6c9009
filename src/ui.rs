use colored::Colorize;
use declarative::{Action, Change, ExecuteSummary, Plan, PlanSummary};
use serde_json::Value;

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

// ============================================================================
// Plans
// ============================================================================

/// `» Plan: 1 to add, 2 to change, 0 to destroy.`
pub fn summary_line(summary: &PlanSummary) -> String {
    format!(
        "» Plan: {} to add, {} to change, {} to destroy.",
        summary.additions,
        summary.changes + summary.transfers,
        summary.removals
    )
}

fn symbol(action: Action) -> &'static str {
    match action {
        Action::Add => "+",
        Action::Change | Action::Transfer => "~",
        Action::Remove => "-",
    }
}

/// Attribute value as shown in plans
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::String(s) => format!("\"{}\"", s),
        other => other.to_string(),
    }
}

/// `(key, shown value)` rows of a change
fn rows(change: &Change) -> Vec<(String, String)> {
    match change.action {
        Action::Add => change
            .delta
            .iter()
            .map(|(k, v)| (k.clone(), format_value(v)))
            .collect(),
        Action::Remove => change
            .before
            .iter()
            .flatten()
            .map(|(k, v)| (k.clone(), format_value(v)))
            .collect(),
        Action::Change | Action::Transfer => change
            .delta
            .iter()
            .map(|(k, v)| {
                let old = change
                    .before
                    .as_ref()
                    .and_then(|b| b.get(k))
                    .unwrap_or(&Value::Null);
                (k.clone(), format!("{} → {}", format_value(old), format_value(v)))
            })
            .collect(),
    }
}

/// Print a plan with one colored block per change
pub fn print_plan(plan: &Plan) {
    println!();
    println!("{}", summary_line(&plan.summary()).bold());

    for change in plan.changes() {
        let title = match change.action {
            Action::Transfer => format!("{} {} (transfer)", symbol(change.action), change.urn),
            action => format!("{} {}", symbol(action), change.urn),
        };
        println!();
        match change.action {
            Action::Add => println!("{}", title.green()),
            Action::Remove => println!("{}", title.red()),
            Action::Change | Action::Transfer => println!("{}", title.yellow()),
        }

        let rows = rows(change);
        let width = rows.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
        for (key, value) in rows {
            println!("    {:width$} = {}", key.dimmed(), value, width = width);
        }
    }
    println!();
}

/// Print compiled statements
pub fn print_statements(statements: &[String]) {
    for statement in statements {
        println!("{};", statement);
    }
}

/// Print the outcome of an apply or destroy run
pub fn print_summary(summary: &ExecuteSummary) {
    if summary.dry_run > 0 {
        info(&format!("Dry run: {} statements not sent", summary.dry_run));
    }
    if summary.executed > 0 {
        success(&format!("{} statements executed", summary.executed));
    }
    if summary.skipped > 0 {
        warn(&format!("{} statements skipped", summary.skipped));
    }
    if summary.is_empty() {
        info("Nothing to do");
    }
}
