use axum::{extract::rejection::FormRejection, extract::State, http::StatusCode, Form};
use eta_pipeline::{CategoricalField, EncodingTables, RawTicket};
use maud::{html, Markup, DOCTYPE};
use serde::Deserialize;
use serde_json::json;
use shared_logging::LogLevel;

use crate::{error::ApiError, SharedState};

/// Fields posted by the HTML form.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct FormTicket {
    /// Optional informational id.
    #[serde(default)]
    pub ticket_id: String,
    /// Selected priority.
    #[serde(default)]
    pub priority: String,
    /// Selected category.
    #[serde(default)]
    pub category: String,
    /// Selected department.
    #[serde(default)]
    pub department: String,
    /// `datetime-local` value.
    #[serde(default)]
    pub created_time: String,
    /// Free text.
    #[serde(default)]
    pub description: String,
}

impl FormTicket {
    fn selected(&self, field: CategoricalField) -> &str {
        match field {
            CategoricalField::Priority => &self.priority,
            CategoricalField::Category => &self.category,
            CategoricalField::Department => &self.department,
        }
    }

    fn to_ticket(&self) -> RawTicket {
        let present = |value: &str| (!value.trim().is_empty()).then(|| value.to_string());
        RawTicket {
            ticket_id: present(&self.ticket_id),
            priority: present(&self.priority),
            category: present(&self.category),
            department: present(&self.department),
            created_time: present(&self.created_time),
            description: Some(self.description.clone()),
            ..RawTicket::default()
        }
    }
}

const fn form_key(field: CategoricalField) -> &'static str {
    match field {
        CategoricalField::Priority => "priority",
        CategoricalField::Category => "category",
        CategoricalField::Department => "department",
    }
}

pub(crate) async fn show_form(State(state): State<SharedState>) -> Markup {
    page(&state.predictor.schema().encoding, &FormTicket::default(), None)
}

pub(crate) async fn submit_form(
    State(state): State<SharedState>,
    form: Result<Form<FormTicket>, FormRejection>,
) -> (StatusCode, Markup) {
    let tables = &state.predictor.schema().encoding;
    let ticket = match form {
        Ok(Form(ticket)) => ticket,
        Err(rejection) => {
            let err = ApiError::from(rejection);
            let markup = page(tables, &FormTicket::default(), Some(Err(err.message())));
            return (err.status(), markup);
        }
    };
    let raw = ticket.to_ticket();
    match state.predictor.predict(&raw) {
        Ok(prediction) => {
            state.telemetry.record(
                LogLevel::Info,
                "form.predicted",
                json!({
                    "ticket": raw.ticket_id,
                    "hours": prediction.hours,
                    "unknown_fields": prediction.unknown_fields,
                }),
            );
            (StatusCode::OK, page(tables, &ticket, Some(Ok(prediction.hours))))
        }
        Err(err) => {
            let err = ApiError::from(err);
            state.telemetry.record(
                LogLevel::Warn,
                "form.failed",
                json!({ "ticket": raw.ticket_id, "kind": err.body().kind, "error": err.message() }),
            );
            (err.status(), page(tables, &ticket, Some(Err(err.message()))))
        }
    }
}

fn page(tables: &EncodingTables, ticket: &FormTicket, outcome: Option<Result<f64, &str>>) -> Markup {
    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="utf-8";
                title { "Ticket resolution-time estimate" }
            }
            body {
                h1 { "Ticket resolution-time estimate" }
                form method="post" action="/" {
                    p {
                        label for="ticket_id" { "Ticket ID (optional)" }
                        input id="ticket_id" type="text" name="ticket_id" value=(ticket.ticket_id);
                    }
                    @for field in CategoricalField::ALL {
                        p {
                            label for=(form_key(field)) { (field.source_name()) }
                            select id=(form_key(field)) name=(form_key(field)) {
                                @for value in tables.table(field).values() {
                                    option value=(value) selected[value == ticket.selected(field)] { (value) }
                                }
                            }
                        }
                    }
                    p {
                        label for="created_time" { "Created Time" }
                        input id="created_time" type="datetime-local" name="created_time" value=(ticket.created_time);
                    }
                    p {
                        label for="description" { "Description" }
                        textarea id="description" name="description" rows="4" cols="60" { (ticket.description) }
                    }
                    button type="submit" { "Estimate" }
                }
                @match outcome {
                    Some(Ok(hours)) => {
                        p.result { "Estimated resolution time: " (format!("{hours:.2}")) " hours" }
                    }
                    Some(Err(message)) => {
                        p.error { "Could not estimate: " (message) }
                    }
                    None => {}
                }
            }
        }
    }
}
