use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use time::macros::datetime;

use boxdesk::absences::AbsenceStore;
use boxdesk::db::Database;
use boxdesk::error::{BoxdeskError, Result};
use boxdesk::interfaces::assistant::{
    AssistantBackend, NewThreadMessage, RunState, ThreadMessage, ToolOutput,
};
use boxdesk::interfaces::tools::ToolContext;
use boxdesk::reservations::ReservationStore;
use boxdesk::tools::absences::NO_UPCOMING_ABSENCES;
use boxdesk::tools::booking::NO_UPCOMING_RESERVATIONS;
use boxdesk::tools::{default_registry, ToolRegistry};

/// Only image generation is reachable from tools.
struct ImageOnly {
    fail: bool,
}

#[async_trait]
impl AssistantBackend for ImageOnly {
    async fn create_thread(&self, _metadata: Value) -> Result<String> {
        unimplemented!()
    }
    async fn add_message(&self, _thread_id: &str, _message: NewThreadMessage) -> Result<()> {
        unimplemented!()
    }
    async fn list_runs(&self, _thread_id: &str) -> Result<Vec<RunState>> {
        unimplemented!()
    }
    async fn cancel_run(&self, _thread_id: &str, _run_id: &str) -> Result<()> {
        unimplemented!()
    }
    async fn create_run(&self, _t: &str, _a: &str, _m: Value) -> Result<RunState> {
        unimplemented!()
    }
    async fn retrieve_run(&self, _thread_id: &str, _run_id: &str) -> Result<RunState> {
        unimplemented!()
    }
    async fn submit_tool_outputs(
        &self,
        _thread_id: &str,
        _run_id: &str,
        _outputs: Vec<ToolOutput>,
    ) -> Result<RunState> {
        unimplemented!()
    }
    async fn latest_message(&self, _thread_id: &str) -> Result<ThreadMessage> {
        unimplemented!()
    }
    async fn generate_image(&self, prompt: &str) -> Result<String> {
        if self.fail {
            return Err(BoxdeskError::Upstream("quota".to_string()));
        }
        Ok(format!("https://img.example/{}.png", prompt.len()))
    }
    async fn upload_to_vector_store(&self, _v: &str, _f: &str, _b: Vec<u8>) -> Result<String> {
        unimplemented!()
    }
}

struct Fixture {
    _dir: tempfile::TempDir,
    reservations: ReservationStore,
    absences: AbsenceStore,
    registry: ToolRegistry,
}

async fn fixture(fail_images: bool) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(dir.path().join("tools.db").to_str().unwrap())
        .await
        .unwrap();
    let reservations = ReservationStore::new(db.clone());
    let absences = AbsenceStore::new(db);
    let registry = default_registry(
        reservations.clone(),
        absences.clone(),
        Arc::new(ImageOnly { fail: fail_images }),
    )
    .await;
    Fixture {
        _dir: dir,
        reservations,
        absences,
        registry,
    }
}

fn ctx() -> ToolContext {
    ToolContext::new("42", "Ana").at(datetime!(2025-06-10 09:00 UTC))
}

#[tokio::test]
async fn registry_exposes_every_assistant_function() {
    let fx = fixture(false).await;
    assert_eq!(
        fx.registry.list_all_tools().await,
        vec![
            "book_box",
            "generate_image",
            "list_absences",
            "list_reservations",
            "report_absence",
            "update_absence",
            "update_reservation"
        ]
    );
    let defs = fx.registry.definitions().await;
    assert_eq!(defs.len(), 7);
    assert_eq!(defs[0]["type"], "function");
    assert_eq!(defs[0]["function"]["name"], "book_box");
    assert_eq!(defs[0]["function"]["parameters"]["required"], json!(["date", "hour"]));
}

#[tokio::test]
async fn booking_resolves_relative_dates_and_defaults_author() {
    let fx = fixture(false).await;
    let out = fx
        .registry
        .dispatch("book_box", r#"{"date":"demain","hour":"14h"}"#, &ctx())
        .await;
    assert_eq!(out, "done");

    let rows = fx.reservations.list_all().await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].date, "2025-06-11");
    assert_eq!(rows[0].hour, "14:00");
    assert_eq!(rows[0].reserved_by, "Ana");

    let listed = fx.registry.dispatch("list_reservations", "", &ctx()).await;
    assert_eq!(listed, "2025-06-11 at 14:00 reserved by Ana");
}

#[tokio::test]
async fn listing_an_empty_schedule_says_so() {
    let fx = fixture(false).await;
    assert_eq!(
        fx.registry.dispatch("list_reservations", "{}", &ctx()).await,
        NO_UPCOMING_RESERVATIONS
    );
    assert_eq!(
        fx.registry.dispatch("list_absences", "{}", &ctx()).await,
        NO_UPCOMING_ABSENCES
    );
}

#[tokio::test]
async fn updates_accept_string_ids() {
    let fx = fixture(false).await;
    let created = fx
        .reservations
        .create("2025-06-12", "10:00", "Ana")
        .await
        .unwrap();
    let args = json!({ "res_id": created.id.to_string(), "hour": "16:30" }).to_string();
    assert_eq!(
        fx.registry.dispatch("update_reservation", &args, &ctx()).await,
        "Reservation updated"
    );
    assert_eq!(fx.reservations.get(created.id).await.unwrap().hour, "16:30");

    let absence = fx.absences.create("Bo", "2025-06-12").await.unwrap();
    let args = json!({ "abs_id": absence.id, "date": "14/06" }).to_string();
    assert_eq!(
        fx.registry.dispatch("update_absence", &args, &ctx()).await,
        "Absence updated"
    );
    assert_eq!(fx.absences.get(absence.id).await.unwrap().date, "2025-06-14");
}

#[tokio::test]
async fn absences_default_to_the_requester() {
    let fx = fixture(false).await;
    let out = fx
        .registry
        .dispatch("report_absence", r#"{"date":"après-demain"}"#, &ctx())
        .await;
    assert_eq!(out, "done");
    let listed = fx.registry.dispatch("list_absences", "{}", &ctx()).await;
    assert_eq!(listed, "Ana - 2025-06-12");

    let out = fx
        .registry
        .dispatch("report_absence", r#"{"date":"whenever"}"#, &ctx())
        .await;
    assert!(out.starts_with("Could not understand the date"));
    assert_eq!(fx.absences.list_all().await.unwrap().len(), 1);
}

#[tokio::test]
async fn failures_become_tool_output_text() {
    let fx = fixture(true).await;
    assert_eq!(
        fx.registry.dispatch("no_such_tool", "{}", &ctx()).await,
        "Unknown tool: no_such_tool"
    );
    assert!(fx
        .registry
        .dispatch("book_box", "{not json", &ctx())
        .await
        .starts_with("Invalid arguments for book_box"));
    assert!(fx
        .registry
        .dispatch("book_box", r#"{"date":"demain"}"#, &ctx())
        .await
        .starts_with("Error: invalid input: missing hour"));
    assert!(fx
        .registry
        .dispatch("update_reservation", r#"{"res_id":7,"hour":"10:00"}"#, &ctx())
        .await
        .starts_with("Error: not found"));
    assert!(fx
        .registry
        .dispatch("generate_image", r#"{"prompt":"a red box"}"#, &ctx())
        .await
        .starts_with("Image generation error"));
}

#[tokio::test]
async fn image_tool_returns_the_url() {
    let fx = fixture(false).await;
    assert_eq!(
        fx.registry
            .dispatch("generate_image", r#"{"prompt":"box"}"#, &ctx())
            .await,
        "https://img.example/3.png"
    );
}
