//! JSON shapes exchanged with the booking backend and the push channel, and their
//! validation into domain types. Nothing untyped crosses this boundary.

use crate::domain::models::{
    Appointment, AppointmentStatus, AppointmentUpdate, Category, ServiceLine, StaffOption,
};
use crate::infrastructure::error::EngineError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum WireId {
    Text(String),
    Number(i64),
}

impl WireId {
    fn into_string(self) -> String {
        match self {
            Self::Text(value) => value.trim().to_string(),
            Self::Number(value) => value.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRecord {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentRecord {
    pub id: WireId,
    pub category: String,
    pub starts_at: String,
    pub ends_at: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub staff_id: Option<WireId>,
    #[serde(default)]
    pub customer_full_name: Option<String>,
    #[serde(default)]
    pub customer_phone: Option<String>,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub services: Vec<ServiceRecord>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffRecord {
    pub id: WireId,
    pub full_name: String,
    pub category: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentUpdateRecord {
    pub staff_id: Option<String>,
    pub starts_at: String,
    pub ends_at: String,
    pub customer_full_name: String,
    pub customer_phone: Option<String>,
    pub customer_email: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PushEvent {
    NewAppointment {
        #[serde(default, rename = "customerName")]
        customer_name: Option<String>,
        #[serde(default)]
        time: Option<String>,
    },
    UpdateAppointment {},
}

impl PushEvent {
    /// Toast text for the user, when the payload carries enough to build one.
    pub fn summary(&self) -> Option<String> {
        match self {
            Self::NewAppointment {
                customer_name,
                time,
            } => {
                let name = non_empty(customer_name.as_deref());
                let time = non_empty(time.as_deref());
                match (name, time) {
                    (Some(name), Some(time)) => Some(format!("New appointment: {name} at {time}")),
                    (Some(name), None) => Some(format!("New appointment: {name}")),
                    (None, Some(time)) => Some(format!("New appointment at {time}")),
                    (None, None) => None,
                }
            }
            Self::UpdateAppointment {} => None,
        }
    }
}

pub fn decode_appointment(record: AppointmentRecord) -> Result<Appointment, EngineError> {
    let id = record.id.into_string();
    if id.is_empty() {
        return Err(EngineError::MalformedResponse(
            "appointment id must not be empty".to_string(),
        ));
    }
    let starts_at = parse_rfc3339_utc(&record.starts_at, "startsAt")?;
    let ends_at = parse_rfc3339_utc(&record.ends_at, "endsAt")?;

    let appointment = Appointment {
        id,
        category: parse_category(&record.category)?,
        starts_at,
        ends_at,
        status: record
            .status
            .as_deref()
            .map(parse_status)
            .transpose()?
            .unwrap_or(AppointmentStatus::Booked),
        staff_id: record
            .staff_id
            .map(WireId::into_string)
            .filter(|value| !value.is_empty()),
        customer_full_name: record
            .customer_full_name
            .map(|value| value.trim().to_string())
            .unwrap_or_default(),
        customer_phone: trimmed(record.customer_phone),
        customer_email: trimmed(record.customer_email),
        notes: trimmed(record.notes),
        services: record
            .services
            .into_iter()
            .map(|service| ServiceLine {
                name: service.name.trim().to_string(),
            })
            .collect(),
    };
    appointment
        .validate()
        .map_err(EngineError::MalformedResponse)?;
    Ok(appointment)
}

pub fn decode_staff(record: StaffRecord) -> Result<StaffOption, EngineError> {
    let id = record.id.into_string();
    if id.is_empty() {
        return Err(EngineError::MalformedResponse(
            "staff id must not be empty".to_string(),
        ));
    }
    Ok(StaffOption {
        id,
        full_name: record.full_name.trim().to_string(),
        category: parse_category(&record.category)?,
    })
}

/// A body that is not a JSON array decodes to an empty list; invalid items are dropped.
pub fn decode_appointment_list(body: &str) -> Vec<Appointment> {
    decode_list(body, "appointments", |item| {
        let record: AppointmentRecord = serde_json::from_value(item)?;
        decode_appointment(record)
    })
}

pub fn decode_staff_list(body: &str) -> Vec<StaffOption> {
    decode_list(body, "staff", |item| {
        let record: StaffRecord = serde_json::from_value(item)?;
        decode_staff(record)
    })
}

pub fn decode_push_payload(raw: &str) -> Result<PushEvent, EngineError> {
    serde_json::from_str(raw)
        .map_err(|error| EngineError::MalformedResponse(format!("invalid push payload: {error}")))
}

pub fn encode_update(update: &AppointmentUpdate) -> AppointmentUpdateRecord {
    AppointmentUpdateRecord {
        staff_id: update.staff_id.clone(),
        starts_at: update.starts_at.to_rfc3339(),
        ends_at: update.ends_at.to_rfc3339(),
        customer_full_name: update.customer_full_name.trim().to_string(),
        customer_phone: trimmed(update.customer_phone.clone()),
        customer_email: trimmed(update.customer_email.clone()),
        notes: trimmed(update.notes.clone()),
    }
}

/// Message carried by an error response body (`{"error": ..}` or `{"message": ..}`), else the raw text.
pub fn decode_error_message(body: &str) -> Option<String> {
    let from_json = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            ["error", "message"].iter().find_map(|key| {
                value
                    .get(*key)
                    .and_then(serde_json::Value::as_str)
                    .map(str::trim)
                    .filter(|message| !message.is_empty())
                    .map(ToOwned::to_owned)
            })
        });
    from_json.or_else(|| non_empty(Some(body)).map(ToOwned::to_owned))
}

fn decode_list<T, F>(body: &str, what: &str, decode: F) -> Vec<T>
where
    F: Fn(serde_json::Value) -> Result<T, EngineError>,
{
    let items = match serde_json::from_str::<serde_json::Value>(body) {
        Ok(serde_json::Value::Array(items)) => items,
        Ok(_) => {
            warn!(what, "expected a JSON array; treating as empty");
            return Vec::new();
        }
        Err(error) => {
            warn!(what, %error, "unparseable list body; treating as empty");
            return Vec::new();
        }
    };

    items
        .into_iter()
        .enumerate()
        .filter_map(|(index, item)| match decode(item) {
            Ok(value) => Some(value),
            Err(error) => {
                warn!(what, index, %error, "dropping malformed item");
                None
            }
        })
        .collect()
}

fn parse_rfc3339_utc(value: &str, field_name: &str) -> Result<DateTime<Utc>, EngineError> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| {
            EngineError::MalformedResponse(format!("invalid {field_name} '{value}': {error}"))
        })
}

fn parse_category(value: &str) -> Result<Category, EngineError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "men" => Ok(Category::Men),
        "women" => Ok(Category::Women),
        other => Err(EngineError::MalformedResponse(format!(
            "invalid category value: {other}"
        ))),
    }
}

fn parse_status(value: &str) -> Result<AppointmentStatus, EngineError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "booked" => Ok(AppointmentStatus::Booked),
        "completed" => Ok(AppointmentStatus::Completed),
        "cancelled" | "canceled" => Ok(AppointmentStatus::Cancelled),
        "no_show" | "no-show" => Ok(AppointmentStatus::NoShow),
        other => Err(EngineError::MalformedResponse(format!(
            "invalid status value: {other}"
        ))),
    }
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}
