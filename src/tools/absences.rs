use async_trait::async_trait;
use serde_json::{json, Value};

use crate::absences::{Absence, AbsencePatch, AbsenceStore};
use crate::dates::{format_date, normalize_date};
use crate::error::Result;
use crate::interfaces::tools::{Tool, ToolContext};
use crate::tools::booking::{optional_str, required_id, required_str};

pub const NO_UPCOMING_ABSENCES: &str = "No upcoming absences recorded.";

pub struct ReportAbsenceTool {
    store: AbsenceStore,
}

impl ReportAbsenceTool {
    pub fn new(store: AbsenceStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for ReportAbsenceTool {
    fn name(&self) -> &str {
        "report_absence"
    }

    fn description(&self) -> &str {
        "Record that a learner will be absent on a date."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": { "type": "string", "description": "Learner name; defaults to the requester" },
                "date": { "type": "string", "description": "Date of the absence, free text accepted" }
            },
            "required": ["date"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<String> {
        let raw_date = required_str(&args, "date")?;
        let date = match normalize_date(raw_date, ctx.now.date()) {
            Ok(date) => format_date(date),
            Err(err) => return Ok(format!("Could not understand the date: {err}")),
        };
        let name = optional_str(&args, "name").unwrap_or(ctx.author.as_str());
        self.store.create(name, &date).await?;
        Ok("done".to_string())
    }
}

pub struct ListAbsencesTool {
    store: AbsenceStore,
}

impl ListAbsencesTool {
    pub fn new(store: AbsenceStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for ListAbsencesTool {
    fn name(&self) -> &str {
        "list_absences"
    }

    fn description(&self) -> &str {
        "List absences from today onwards."
    }

    fn parameters(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _args: Value, ctx: &ToolContext) -> Result<String> {
        let items = self.store.list_upcoming(ctx.now.date()).await?;
        Ok(render_absences(&items))
    }
}

pub struct UpdateAbsenceTool {
    store: AbsenceStore,
}

impl UpdateAbsenceTool {
    pub fn new(store: AbsenceStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for UpdateAbsenceTool {
    fn name(&self) -> &str {
        "update_absence"
    }

    fn description(&self) -> &str {
        "Change the name or date of a recorded absence."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "abs_id": { "type": "integer" },
                "name": { "type": "string" },
                "date": { "type": "string" }
            },
            "required": ["abs_id"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<String> {
        let id = required_id(&args, "abs_id")?;
        let date = optional_str(&args, "date")
            .map(|d| normalize_date(d, ctx.now.date()).map(format_date))
            .transpose()?;
        let patch = AbsencePatch {
            name: optional_str(&args, "name").map(str::to_string),
            date,
        };
        self.store.update(id, patch).await?;
        Ok("Absence updated".to_string())
    }
}

pub fn render_absences(items: &[Absence]) -> String {
    if items.is_empty() {
        return NO_UPCOMING_ABSENCES.to_string();
    }
    items
        .iter()
        .map(|a| format!("{} - {}", a.name, a.date))
        .collect::<Vec<_>>()
        .join("\n")
}
