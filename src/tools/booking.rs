use async_trait::async_trait;
use serde_json::{json, Value};

use crate::dates::{format_date, hour_of, normalize_date};
use crate::error::{BoxdeskError, Result};
use crate::interfaces::tools::{Tool, ToolContext};
use crate::reservations::{Reservation, ReservationPatch, ReservationStore};

pub const NO_UPCOMING_RESERVATIONS: &str = "No upcoming reservations.";

pub struct BookBoxTool {
    store: ReservationStore,
}

impl BookBoxTool {
    pub fn new(store: ReservationStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for BookBoxTool {
    fn name(&self) -> &str {
        "book_box"
    }

    fn description(&self) -> &str {
        "Book the box for a date and hour."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "date": { "type": "string", "description": "Date of the booking, e.g. 2025-06-12 or 'demain'" },
                "hour": { "type": "string", "description": "Start hour, HH:MM" },
                "reserved_by": { "type": "string", "description": "Who books; defaults to the requester" }
            },
            "required": ["date", "hour"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<String> {
        let date = required_str(&args, "date")?;
        let hour = required_str(&args, "hour")?;
        let date = format_date(normalize_date(date, ctx.now.date())?);
        let reserved_by = optional_str(&args, "reserved_by").unwrap_or(ctx.author.as_str());
        self.store.create(&date, hour, reserved_by).await?;
        Ok("done".to_string())
    }
}

pub struct ListReservationsTool {
    store: ReservationStore,
}

impl ListReservationsTool {
    pub fn new(store: ReservationStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for ListReservationsTool {
    fn name(&self) -> &str {
        "list_reservations"
    }

    fn description(&self) -> &str {
        "List upcoming box reservations."
    }

    fn parameters(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _args: Value, ctx: &ToolContext) -> Result<String> {
        let items = self
            .store
            .list_upcoming(ctx.now.date(), &hour_of(ctx.now))
            .await?;
        Ok(render_reservations(&items))
    }
}

pub struct UpdateReservationTool {
    store: ReservationStore,
}

impl UpdateReservationTool {
    pub fn new(store: ReservationStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for UpdateReservationTool {
    fn name(&self) -> &str {
        "update_reservation"
    }

    fn description(&self) -> &str {
        "Change the date, hour or owner of an existing reservation."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "res_id": { "type": "integer" },
                "date": { "type": "string" },
                "hour": { "type": "string" },
                "reserved_by": { "type": "string" }
            },
            "required": ["res_id"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<String> {
        let id = required_id(&args, "res_id")?;
        let date = optional_str(&args, "date")
            .filter(|d| !d.trim().is_empty())
            .map(|d| normalize_date(d, ctx.now.date()).map(format_date))
            .transpose()?;
        let patch = ReservationPatch {
            date,
            hour: optional_str(&args, "hour").map(str::to_string),
            reserved_by: optional_str(&args, "reserved_by").map(str::to_string),
        };
        self.store.update(id, patch).await?;
        Ok("Reservation updated".to_string())
    }
}

pub fn render_reservations(items: &[Reservation]) -> String {
    if items.is_empty() {
        return NO_UPCOMING_RESERVATIONS.to_string();
    }
    items
        .iter()
        .map(|r| format!("{} at {} reserved by {}", r.date, r.hour, r.reserved_by))
        .collect::<Vec<_>>()
        .join("\n")
}

pub(crate) fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str> {
    args.get(key)
        .and_then(|v| v.as_str())
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| BoxdeskError::InvalidInput(format!("missing {key}")))
}

pub(crate) fn optional_str<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key)
        .and_then(|v| v.as_str())
        .filter(|v| !v.trim().is_empty())
}

/// Ids arrive as numbers or numeric strings depending on the model.
pub(crate) fn required_id(args: &Value, key: &str) -> Result<i32> {
    let value = args
        .get(key)
        .ok_or_else(|| BoxdeskError::InvalidInput(format!("missing {key}")))?;
    let id = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    id.and_then(|id| i32::try_from(id).ok())
        .ok_or_else(|| BoxdeskError::InvalidInput(format!("invalid {key}: {value}")))
}
