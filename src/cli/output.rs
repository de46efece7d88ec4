//! Output formatting for CLI commands.
//!
//! This module renders plans, pass results and state either as colored
//! text with tables or as pretty-printed JSON.

use colored::Colorize;
use serde::Serialize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::config::{ConfigHasher, Manifest, ValidationResult};
use crate::reconciler::{DriftReport, PlannedAction, ReconciliationResult};
use crate::resource::Condition;
use crate::state::{LockInfo, ProviderState, ResourceRecord};

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Resource row for status tables.
#[derive(Tabled)]
struct ResourceRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Region")]
    region: String,
    #[tabled(rename = "Condition")]
    condition: String,
    #[tabled(rename = "Identity")]
    identity: String,
    #[tabled(rename = "Updated")]
    updated: String,
}

/// Plan row for drift tables.
#[derive(Tabled)]
struct PlanRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Reason")]
    reason: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Returns true if output is JSON.
    #[must_use]
    pub const fn is_json(&self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }

    /// Formats a drift report as a plan.
    #[must_use]
    pub fn format_plan(&self, report: &DriftReport, detailed: bool) -> String {
        match self.format {
            OutputFormat::Json => to_json(report),
            OutputFormat::Text => Self::format_plan_text(report, detailed),
        }
    }

    fn format_plan_text(report: &DriftReport, detailed: bool) -> String {
        let mut output = String::new();

        if report.is_converged() {
            let _ = writeln!(
                output,
                "{} No changes required - resources match the manifest.",
                "✓".green()
            );
        }

        let rows: Vec<PlanRow> = report
            .resources
            .iter()
            .filter(|r| detailed || r.has_drift())
            .enumerate()
            .map(|(i, r)| PlanRow {
                index: i + 1,
                action: format_action(r.action),
                resource: r.name.clone(),
                kind: r.kind.to_string(),
                reason: truncate(r.reason.as_deref().unwrap_or("-"), 50),
            })
            .collect();

        if !rows.is_empty() {
            let _ = write!(output, "\nPlan\n");
            output.push_str(&Table::new(rows).to_string());
            output.push('\n');
        }

        let count = |action: PlannedAction| {
            report
                .resources
                .iter()
                .filter(|r| r.action == action)
                .count()
        };
        if report.has_drift {
            let _ = write!(
                output,
                "\nPlan: {} to create, {} to update, {} to delete\n",
                count(PlannedAction::Create).to_string().green(),
                count(PlannedAction::Update).to_string().yellow(),
                count(PlannedAction::Delete).to_string().red()
            );
        }

        if !report.errors.is_empty() {
            let _ = write!(output, "\n{} Could not observe:\n", "⚠".yellow());
            for error in &report.errors {
                let _ = writeln!(output, "   - {error}");
            }
        }

        output
    }

    /// Formats a reconciliation result.
    #[must_use]
    pub fn format_reconciliation(&self, result: &ReconciliationResult) -> String {
        match self.format {
            OutputFormat::Json => to_json(result),
            OutputFormat::Text => {
                let status = if result.success {
                    format!("{} Reconciliation successful", "✓".green())
                } else {
                    format!("{} Reconciliation failed", "✗".red())
                };

                let mut output = format!("{status}\n\n");
                let _ = writeln!(output, "   Created: {}", result.created);
                let _ = writeln!(output, "   Updated: {}", result.updated);
                let _ = writeln!(output, "   Deleted: {}", result.deleted);
                let _ = writeln!(output, "   Unchanged: {}", result.unchanged);

                if !result.errors.is_empty() {
                    let _ = write!(output, "\n{} Errors:\n", "⚠".yellow());
                    for error in &result.errors {
                        let _ = writeln!(output, "   - {error}");
                    }
                }

                output
            }
        }
    }

    /// Formats the recorded status of every resource.
    #[must_use]
    pub fn format_status(&self, state: &ProviderState, lock: Option<&LockInfo>) -> String {
        match self.format {
            OutputFormat::Json => to_json(&StatusJson::new(state, lock)),
            OutputFormat::Text => {
                let mut output = format!("\nProject: {}\n\n", state.project);

                if state.resources.is_empty() {
                    output.push_str("   No resources recorded.\n");
                } else {
                    let rows: Vec<ResourceRow> =
                        state.resources.values().map(resource_row).collect();
                    output.push_str(&Table::new(rows).to_string());
                    output.push('\n');
                }

                let drifted: Vec<&ResourceRecord> = state
                    .resources
                    .values()
                    .filter(|r| r.diff_reason.is_some())
                    .collect();
                if !drifted.is_empty() {
                    output.push_str("\nOut of date:\n");
                    for record in drifted {
                        let _ = writeln!(
                            output,
                            "   {}: {}",
                            record.name,
                            record.diff_reason.as_deref().unwrap_or_default()
                        );
                    }
                }

                if let Some(lock) = lock {
                    let _ = write!(
                        output,
                        "\n{} Locked by {} ({}s left)\n",
                        "⚠".yellow(),
                        lock.holder,
                        lock.remaining_secs()
                    );
                }

                output
            }
        }
    }

    /// Formats the full state, history included.
    #[must_use]
    pub fn format_state(&self, state: &ProviderState) -> String {
        match self.format {
            OutputFormat::Json => to_json(state),
            OutputFormat::Text => {
                let mut output = format!("\nState: {}\n\n", state.project);

                let _ = writeln!(output, "   Version: {}", state.version);
                let _ = writeln!(output, "   Last updated: {}", state.last_updated);
                let _ = writeln!(output, "   Resources: {}", state.resources.len());

                for record in state.resources.values() {
                    let _ = writeln!(
                        output,
                        "     {} ({}) spec {}",
                        record.name,
                        record.kind(),
                        ConfigHasher::new().short_hash(&record.spec_hash)
                    );
                    if !record.connection_keys.is_empty() {
                        let _ = writeln!(
                            output,
                            "       connection: {}",
                            record.connection_keys.join(", ")
                        );
                    }
                }

                if !state.history.is_empty() {
                    let _ = writeln!(output, "\n   Recent history ({}):", state.history.len());
                    for entry in state.history.iter().rev().take(10) {
                        let status = if entry.success { "✓" } else { "✗" };
                        let _ = write!(
                            output,
                            "     {status} {} - {} {} ({})",
                            entry.timestamp.format("%Y-%m-%d %H:%M"),
                            entry.operation,
                            entry.resource,
                            entry.kind
                        );
                        if let Some(error) = &entry.error {
                            let _ = write!(output, ": {error}");
                        }
                        output.push('\n');
                    }
                }

                output
            }
        }
    }

    /// Formats a validation result.
    #[must_use]
    pub fn format_validation(
        &self,
        manifest: &Manifest,
        result: &ValidationResult,
        show_warnings: bool,
    ) -> String {
        match self.format {
            OutputFormat::Json => to_json(&ValidationJson {
                project: &manifest.project.name,
                resources: manifest.resources.len(),
                valid: result.is_valid(),
                errors: result
                    .errors
                    .iter()
                    .map(|e| format!("{}: {}", e.field, e.message))
                    .collect(),
                warnings: &result.warnings,
            }),
            OutputFormat::Text => {
                let mut output = String::new();
                if result.is_valid() {
                    let _ = writeln!(output, "{} Manifest is valid", "✓".green());
                } else {
                    let _ = writeln!(
                        output,
                        "{} Manifest is invalid ({} errors, {} warnings):",
                        "✗".red(),
                        result.error_count(),
                        result.warning_count()
                    );
                    for error in &result.errors {
                        let _ = writeln!(output, "   - {}: {}", error.field, error.message);
                    }
                }

                if show_warnings && !result.warnings.is_empty() {
                    let _ = write!(output, "\n{} Warnings:\n", "⚠".yellow());
                    for warning in &result.warnings {
                        let _ = writeln!(output, "   - {warning}");
                    }
                }

                let _ = write!(output, "\nManifest summary:\n");
                let _ = writeln!(output, "   Project: {}", manifest.project.name);
                let _ = writeln!(output, "   Resources: {}", manifest.resources.len());
                for resource in &manifest.resources {
                    let _ = writeln!(output, "     {} ({})", resource.name, resource.spec.kind());
                }
                output
            }
        }
    }
}

fn resource_row(record: &ResourceRecord) -> ResourceRow {
    ResourceRow {
        name: record.name.clone(),
        kind: record.kind().to_string(),
        region: record.spec.region().unwrap_or("-").to_string(),
        condition: record.condition.map_or_else(|| "-".dimmed().to_string(), format_condition),
        identity: record
            .identity
            .as_ref()
            .map_or_else(|| String::from("-"), |i| truncate(i.as_str(), 36)),
        updated: record.updated_at.format("%Y-%m-%d %H:%M").to_string(),
    }
}

fn format_action(action: PlannedAction) -> String {
    match action {
        PlannedAction::Create => "+create".green().to_string(),
        PlannedAction::Update => "~update".yellow().to_string(),
        PlannedAction::Delete => "-delete".red().to_string(),
        PlannedAction::None => "none".dimmed().to_string(),
    }
}

fn format_condition(condition: Condition) -> String {
    let text = condition.to_string();
    match condition {
        Condition::Available => text.green().to_string(),
        Condition::Creating | Condition::Deleting => text.yellow().to_string(),
        Condition::Unavailable => text.red().to_string(),
    }
}

/// Truncates a string to at most `max_len` characters.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_default()
}

// JSON serialization helpers

#[derive(Serialize)]
struct StatusJson<'a> {
    project: &'a str,
    locked_by: Option<&'a str>,
    resources: Vec<ResourceJson<'a>>,
}

#[derive(Serialize)]
struct ResourceJson<'a> {
    name: &'a str,
    kind: String,
    condition: Option<Condition>,
    identity: Option<&'a str>,
    diff_reason: Option<&'a str>,
}

impl<'a> StatusJson<'a> {
    fn new(state: &'a ProviderState, lock: Option<&'a LockInfo>) -> Self {
        Self {
            project: &state.project,
            locked_by: lock.map(|l| l.holder.as_str()),
            resources: state
                .resources
                .values()
                .map(|r| ResourceJson {
                    name: &r.name,
                    kind: r.kind().to_string(),
                    condition: r.condition,
                    identity: r.identity.as_ref().map(|i| i.as_str()),
                    diff_reason: r.diff_reason.as_deref(),
                })
                .collect(),
        }
    }
}

#[derive(Serialize)]
struct ValidationJson<'a> {
    project: &'a str,
    resources: usize,
    valid: bool,
    errors: Vec<String>,
    warnings: &'a [String],
}
