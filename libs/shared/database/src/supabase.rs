use async_trait::async_trait;
use reqwest::{
    Client,
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Method, StatusCode,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error, warn};

use shared_config::AppConfig;
use shared_models::{
    Appointment, AppointmentPatch, EntityId, NewAppointment, NewPayment, Payment, Provider,
    ProviderServiceLink, Service, StoreError,
};

use crate::collaborators::{AppointmentStore, CatalogStore, PaymentStore};

const APPOINTMENTS_SELECT: &str =
    "select=*,provider:providers(*),service:services(*),payment:payments(*)";

pub struct SupabaseClient {
    client: Client,
    base_url: String,
    anon_key: String,
    access_token: Option<String>,
}

impl SupabaseClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.supabase_url.trim_end_matches('/').to_string(),
            anon_key: config.supabase_anon_key.clone(),
            access_token: None,
        }
    }

    /// Use a staff session token instead of the anonymous key for row-level access.
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    fn get_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();

        if let Ok(value) = HeaderValue::from_str(&self.anon_key) {
            headers.insert("apikey", value);
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let bearer = self.access_token.as_deref().unwrap_or(&self.anon_key);
        if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", bearer)) {
            headers.insert(AUTHORIZATION, value);
        }

        headers
    }

    pub async fn request<T>(&self, method: Method, path: &str, body: Option<Value>) -> Result<T, StoreError>
    where
        T: DeserializeOwned,
    {
        self.request_with_headers(method, path, body, None).await
    }

    pub async fn request_with_headers<T>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        extra_headers: Option<HeaderMap>,
    ) -> Result<T, StoreError>
    where
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!("Making request to {}", url);

        let mut headers = self.get_headers();
        if let Some(extra) = extra_headers {
            headers.extend(extra);
        }

        let mut req = self.client.request(method, &url).headers(headers);

        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        let response = req
            .send()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("API error ({}): {}", status, error_text);
            return Err(classify_status(status, error_text));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| StoreError::Network(format!("Malformed response: {}", e)))
    }

    /// POST/PATCH returning the affected row, as PostgREST does with `return=representation`.
    async fn write_single<T>(&self, method: Method, path: &str, body: Value) -> Result<T, StoreError>
    where
        T: DeserializeOwned,
    {
        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));

        let mut rows: Vec<T> = self
            .request_with_headers(method, path, Some(body), Some(headers))
            .await?;

        if rows.is_empty() {
            return Err(StoreError::NotFound(format!("No row returned for {}", path)));
        }
        Ok(rows.swap_remove(0))
    }

    pub fn get_base_url(&self) -> &str {
        &self.base_url
    }
}

fn classify_status(status: StatusCode, body: String) -> StoreError {
    match status.as_u16() {
        401 | 403 => StoreError::Unauthorized(body),
        404 => StoreError::NotFound(body),
        409 => StoreError::Conflict(body),
        400 | 422 => StoreError::Validation(body),
        _ => StoreError::Network(format!("API error ({}): {}", status, body)),
    }
}

/// Decode rows one by one so a single malformed record never hides the rest.
fn decode_rows<T: DeserializeOwned>(rows: Vec<Value>, entity: &str) -> Vec<T> {
    rows.into_iter()
        .filter_map(|row| match serde_json::from_value::<T>(row) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("Skipping malformed {} row: {}", entity, e);
                None
            }
        })
        .collect()
}

fn to_body<T: serde::Serialize>(payload: &T) -> Result<Value, StoreError> {
    serde_json::to_value(payload).map_err(|e| StoreError::Validation(e.to_string()))
}

#[async_trait]
impl AppointmentStore for SupabaseClient {
    async fn list_appointments(&self) -> Result<Vec<Appointment>, StoreError> {
        let path = format!(
            "/rest/v1/appointments?{}&deleted_at=is.null&order=scheduled_at.asc",
            APPOINTMENTS_SELECT
        );
        let rows: Vec<Value> = self.request(Method::GET, &path, None).await?;
        Ok(decode_rows(rows, "appointment"))
    }

    async fn get_appointment(&self, id: EntityId) -> Result<Appointment, StoreError> {
        let path = format!("/rest/v1/appointments?id=eq.{}&{}", id, APPOINTMENTS_SELECT);
        let rows: Vec<Value> = self.request(Method::GET, &path, None).await?;
        decode_rows(rows, "appointment")
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::NotFound(format!("Appointment {} not found", id)))
    }

    async fn create_appointment(&self, payload: &NewAppointment) -> Result<Appointment, StoreError> {
        let path = format!("/rest/v1/appointments?{}", APPOINTMENTS_SELECT);
        self.write_single(Method::POST, &path, to_body(payload)?).await
    }

    async fn update_appointment(
        &self,
        id: EntityId,
        patch: &AppointmentPatch,
    ) -> Result<Appointment, StoreError> {
        let path = format!("/rest/v1/appointments?id=eq.{}&{}", id, APPOINTMENTS_SELECT);
        self.write_single(Method::PATCH, &path, to_body(patch)?).await
    }
}

#[async_trait]
impl PaymentStore for SupabaseClient {
    async fn create_payment(&self, payload: &NewPayment) -> Result<Payment, StoreError> {
        self.write_single(Method::POST, "/rest/v1/payments", to_body(payload)?)
            .await
    }
}

#[async_trait]
impl CatalogStore for SupabaseClient {
    async fn list_services(&self) -> Result<Vec<Service>, StoreError> {
        let rows: Vec<Value> = self
            .request(Method::GET, "/rest/v1/services?order=name.asc", None)
            .await?;
        Ok(decode_rows(rows, "service"))
    }

    async fn list_providers(&self) -> Result<Vec<Provider>, StoreError> {
        let rows: Vec<Value> = self
            .request(Method::GET, "/rest/v1/providers?deleted_at=is.null&order=name.asc", None)
            .await?;
        Ok(decode_rows(rows, "provider"))
    }

    async fn list_provider_service_links(&self) -> Result<Vec<ProviderServiceLink>, StoreError> {
        let rows: Vec<Value> = self
            .request(Method::GET, "/rest/v1/provider_services?select=*", None)
            .await?;
        Ok(decode_rows(rows, "provider/service link"))
    }
}
