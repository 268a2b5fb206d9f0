use crate::domain::models::{
    Appointment, AppointmentUpdate, CancelRequest, Category, FetchOptions, StaffOption,
};
use crate::infrastructure::error::EngineError;
use crate::infrastructure::wire::{
    decode_appointment_list, decode_error_message, decode_staff_list, encode_update,
};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, StatusCode};
use url::Url;

/// Booking backend operations the engine depends on.
#[async_trait]
pub trait BookingClient: Send + Sync {
    /// Appointments starting in `[start, end)`.
    async fn fetch_appointments(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        options: &FetchOptions,
    ) -> Result<Vec<Appointment>, EngineError>;

    async fn fetch_staff(&self, category: Category) -> Result<Vec<StaffOption>, EngineError>;

    /// Fails with `EngineError::Conflict` when the new slot collides with another booking.
    async fn update_appointment(
        &self,
        appointment_id: &str,
        update: &AppointmentUpdate,
    ) -> Result<(), EngineError>;

    async fn cancel_appointment(
        &self,
        appointment_id: &str,
        request: &CancelRequest,
    ) -> Result<(), EngineError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestBookingClient {
    client: Client,
    base_url: Url,
}

impl ReqwestBookingClient {
    pub fn new(base_url: Url) -> Self {
        Self {
            client: Client::new(),
            base_url,
        }
    }

    fn ensure_non_empty(value: &str, field: &str) -> Result<(), EngineError> {
        if value.trim().is_empty() {
            return Err(EngineError::Validation(format!("{field} must not be empty")));
        }
        Ok(())
    }

    fn http_error(status: StatusCode, body: &str) -> EngineError {
        if status == StatusCode::CONFLICT {
            return EngineError::Conflict(
                decode_error_message(body)
                    .unwrap_or_else(|| "The appointment conflicts with an existing booking".to_string()),
            );
        }
        match decode_error_message(body) {
            Some(message) => EngineError::Network(format!(
                "booking api error: http {}; {message}",
                status.as_u16()
            )),
            None => EngineError::Network(format!("booking api error: http {}", status.as_u16())),
        }
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, EngineError> {
        let mut url = self.base_url.clone();
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                EngineError::InvalidConfig("booking api base URL cannot be a base".to_string())
            })?;
            path.pop_if_empty();
            path.extend(segments);
        }
        Ok(url)
    }

    async fn read_body(response: reqwest::Response, action: &str) -> Result<String, EngineError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| EngineError::Network(format!("failed reading {action} response: {error}")))?;
        if !status.is_success() {
            return Err(Self::http_error(status, &body));
        }
        Ok(body)
    }
}

#[async_trait]
impl BookingClient for ReqwestBookingClient {
    async fn fetch_appointments(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        options: &FetchOptions,
    ) -> Result<Vec<Appointment>, EngineError> {
        let mut request = self
            .client
            .get(self.endpoint(&["appointments"])?)
            .query(&[
                ("start", start.to_rfc3339_opts(SecondsFormat::Millis, true)),
                ("end", end.to_rfc3339_opts(SecondsFormat::Millis, true)),
                ("includePast", options.include_past.to_string()),
            ]);
        if let Some(category) = options.category {
            request = request.query(&[("category", category.as_str())]);
        }
        if let Some(staff_id) = options.staff_id.as_deref().map(str::trim).filter(|id| !id.is_empty()) {
            request = request.query(&[("staffId", staff_id)]);
        }

        let response = request.send().await.map_err(|error| {
            EngineError::Network(format!("network error while listing appointments: {error}"))
        })?;
        let body = Self::read_body(response, "appointments list").await?;
        Ok(decode_appointment_list(&body))
    }

    async fn fetch_staff(&self, category: Category) -> Result<Vec<StaffOption>, EngineError> {
        let response = self
            .client
            .get(self.endpoint(&["staff"])?)
            .query(&[("category", category.as_str())])
            .send()
            .await
            .map_err(|error| EngineError::Network(format!("network error while listing staff: {error}")))?;
        let body = Self::read_body(response, "staff list").await?;
        Ok(decode_staff_list(&body))
    }

    async fn update_appointment(
        &self,
        appointment_id: &str,
        update: &AppointmentUpdate,
    ) -> Result<(), EngineError> {
        Self::ensure_non_empty(appointment_id, "appointment id")?;

        let response = self
            .client
            .patch(self.endpoint(&["appointments", appointment_id.trim()])?)
            .json(&encode_update(update))
            .send()
            .await
            .map_err(|error| {
                EngineError::Network(format!("network error while updating appointment: {error}"))
            })?;
        Self::read_body(response, "appointment update").await?;
        Ok(())
    }

    async fn cancel_appointment(
        &self,
        appointment_id: &str,
        request: &CancelRequest,
    ) -> Result<(), EngineError> {
        Self::ensure_non_empty(appointment_id, "appointment id")?;

        let reason = request
            .reason
            .as_deref()
            .map(str::trim)
            .filter(|reason| !reason.is_empty());
        let response = self
            .client
            .post(self.endpoint(&["appointments", appointment_id.trim(), "cancel"])?)
            .json(&serde_json::json!({ "reason": reason }))
            .send()
            .await
            .map_err(|error| {
                EngineError::Network(format!("network error while cancelling appointment: {error}"))
            })?;
        Self::read_body(response, "appointment cancel").await?;
        Ok(())
    }
}
