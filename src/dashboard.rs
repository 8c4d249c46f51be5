//! Operator dashboard: booking and absence forms plus the current tables,
//! rendered server side from the API's data.

use std::fmt::Write as _;
use std::future::Future;

use axum::{
    extract::{Form, Query, State},
    response::{Html, IntoResponse, Redirect},
    routing::{get, post},
    Router,
};
use serde::Deserialize;

use crate::client::ApiClient;
use crate::error::{BoxdeskError, Result};
use crate::reservations::DEFAULT_RESERVED_BY;

#[derive(Clone)]
pub struct DashboardState {
    pub api: ApiClient,
}

#[derive(Debug, Default, Deserialize)]
pub struct Flash {
    #[serde(default)]
    notice: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReservationForm {
    date: String,
    hour: String,
    #[serde(default)]
    reserved_by: String,
}

#[derive(Debug, Deserialize)]
pub struct AbsenceForm {
    name: String,
    date: String,
}

pub fn build_router(state: DashboardState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/reservations", post(add_reservation))
        .route("/absences", post(add_absence))
        .with_state(state)
}

pub fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn table(headers: &[&str], rows: &[Vec<String>], empty: &str) -> String {
    if rows.is_empty() {
        return format!("<p class=\"info\">{}</p>", escape(empty));
    }
    let mut html = String::from("<table><thead><tr>");
    for header in headers {
        let _ = write!(html, "<th>{}</th>", escape(header));
    }
    html.push_str("</tr></thead><tbody>");
    for row in rows {
        html.push_str("<tr>");
        for cell in row {
            let _ = write!(html, "<td>{}</td>", escape(cell));
        }
        html.push_str("</tr>");
    }
    html.push_str("</tbody></table>");
    html
}

fn error_banner(err: &BoxdeskError, what: &str) -> String {
    tracing::warn!(error = %err, what, "dashboard could not load data");
    format!(
        "<p class=\"error\">Could not load {}: {}</p>",
        escape(what),
        escape(&err.to_string())
    )
}

async fn index(State(state): State<DashboardState>, Query(flash): Query<Flash>) -> Html<String> {
    let reservations = match state.api.reservations().await {
        Ok(items) => {
            let rows: Vec<Vec<String>> = items
                .into_iter()
                .map(|r| vec![r.id.to_string(), r.date, r.hour, r.reserved_by])
                .collect();
            table(
                &["Id", "Date", "Hour", "Reserved by"],
                &rows,
                "No reservations yet.",
            )
        }
        Err(err) => error_banner(&err, "reservations"),
    };
    let absences = match state.api.absences().await {
        Ok(mut items) => {
            items.sort_by(|a, b| (&a.date, &a.name).cmp(&(&b.date, &b.name)));
            let rows: Vec<Vec<String>> = items
                .into_iter()
                .map(|a| vec![a.id.to_string(), a.name, a.date])
                .collect();
            table(&["Id", "Name", "Date"], &rows, "No absences recorded yet.")
        }
        Err(err) => error_banner(&err, "absences"),
    };

    let mut banner = String::new();
    if let Some(notice) = flash.notice {
        let _ = write!(banner, "<p class=\"notice\">{}</p>", escape(&notice));
    }
    if let Some(error) = flash.error {
        let _ = write!(banner, "<p class=\"error\">{}</p>", escape(&error));
    }

    Html(format!(
        r#"<!doctype html>
<html>
<head>
<meta charset="utf-8">
<title>Box reservations</title>
<style>
body {{ font-family: sans-serif; max-width: 56rem; margin: 2rem auto; }}
table {{ border-collapse: collapse; width: 100%; }}
td, th {{ border: 1px solid #ccc; padding: .3rem .6rem; text-align: left; }}
.error {{ color: #a00; }} .notice {{ color: #070; }} .info {{ color: #555; }}
</style>
</head>
<body>
<h1>Reservations and absences</h1>
{banner}
<h2>Add a reservation</h2>
<form method="post" action="/reservations">
<label>Date <input type="date" name="date" required></label>
<label>Hour <input type="time" name="hour" required></label>
<label>Reserved by <input type="text" name="reserved_by" placeholder="{default_by}"></label>
<button type="submit">Book</button>
</form>
<h2>Current reservations</h2>
{reservations}
<h2>Report an absence</h2>
<form method="post" action="/absences">
<label>Learner name <input type="text" name="name" required></label>
<label>Date <input type="date" name="date" required></label>
<button type="submit">Save absence</button>
</form>
<h2>Recorded absences</h2>
{absences}
</body>
</html>"#,
        default_by = DEFAULT_RESERVED_BY,
    ))
}

fn flash_redirect(result: Result<()>, success: &str) -> Redirect {
    match result {
        Ok(()) => Redirect::to(&format!("/?notice={}", urlencoding::encode(success))),
        Err(err) => Redirect::to(&format!(
            "/?error={}",
            urlencoding::encode(&err.to_string())
        )),
    }
}

async fn add_reservation(
    State(state): State<DashboardState>,
    Form(form): Form<ReservationForm>,
) -> impl IntoResponse {
    let reserved_by = match form.reserved_by.trim() {
        "" => DEFAULT_RESERVED_BY,
        name => name,
    };
    let result = state.api.book_box(&form.date, &form.hour, reserved_by).await;
    flash_redirect(result, "Reservation added.")
}

async fn add_absence(
    State(state): State<DashboardState>,
    Form(form): Form<AbsenceForm>,
) -> impl IntoResponse {
    let result = state.api.report_absence(&form.name, &form.date).await;
    flash_redirect(result, "Absence recorded.")
}

pub async fn run_with_shutdown<F>(api: ApiClient, host: &str, port: u16, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = build_router(DashboardState { api });
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| BoxdeskError::Runtime(e.to_string()))?;
    tracing::info!(%addr, "dashboard listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| BoxdeskError::Runtime(e.to_string()))
}
