use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

pub type EntityId = i64;

// ==============================================================================
// RELATIONS
// ==============================================================================

/// A reference to another record that the backend may send either populated or as a
/// bare identity (`3` or `{"id": 3}`).
#[derive(Debug, Clone, PartialEq)]
pub enum Relation<T> {
    Stub(EntityId),
    Full(Box<T>),
}

/// Records that can sit behind a [`Relation`].
pub trait Identified {
    fn id(&self) -> EntityId;
}

impl<T: Identified> Relation<T> {
    pub fn id(&self) -> EntityId {
        match self {
            Relation::Stub(id) => *id,
            Relation::Full(record) => record.id(),
        }
    }

    /// Narrow to the populated record, if the backend sent one.
    pub fn as_full(&self) -> Option<&T> {
        match self {
            Relation::Full(record) => Some(record),
            Relation::Stub(_) => None,
        }
    }

    pub fn is_full(&self) -> bool {
        matches!(self, Relation::Full(_))
    }
}

impl<T> From<T> for Relation<T> {
    fn from(record: T) -> Self {
        Relation::Full(Box::new(record))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RelationRepr<T> {
    Id(EntityId),
    Full(T),
    IdOnly { id: EntityId },
}

impl<'de, T> Deserialize<'de> for Relation<T>
where
    T: Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match RelationRepr::deserialize(deserializer)? {
            RelationRepr::Id(id) | RelationRepr::IdOnly { id } => Relation::Stub(id),
            RelationRepr::Full(record) => Relation::Full(Box::new(record)),
        })
    }
}

impl<T> Serialize for Relation<T>
where
    T: Serialize,
{
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Relation::Stub(id) => serializer.serialize_i64(*id),
            Relation::Full(record) => record.serialize(serializer),
        }
    }
}

// ==============================================================================
// APPOINTMENTS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AppointmentStatus {
    #[serde(rename = "Pendiente", alias = "pending", alias = "Pending")]
    Pending,
    #[serde(rename = "Pagada", alias = "paid", alias = "Paid")]
    Paid,
    #[serde(rename = "Completada", alias = "completed", alias = "Completed")]
    Completed,
    #[serde(rename = "Cancelada", alias = "cancelled", alias = "Cancelled")]
    Cancelled,
}

impl AppointmentStatus {
    /// Completed and Cancelled appointments only accept audit notes.
    pub fn is_terminal(&self) -> bool {
        matches!(self, AppointmentStatus::Completed | AppointmentStatus::Cancelled)
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Pending => write!(f, "pending"),
            AppointmentStatus::Paid => write!(f, "paid"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    pub id: EntityId,
    pub scheduled_at: NaiveDateTime,
    pub client_name: String,
    pub client_email: String,
    #[serde(default)]
    pub client_phone: Option<String>,
    pub status: AppointmentStatus,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub provider: Option<Relation<Provider>>,
    #[serde(default)]
    pub service: Option<Relation<Service>>,
    #[serde(default)]
    pub payment: Option<Relation<Payment>>,
}

impl Appointment {
    pub fn date(&self) -> NaiveDate {
        self.scheduled_at.date()
    }

    pub fn time(&self) -> NaiveTime {
        self.scheduled_at.time()
    }

    pub fn provider_id(&self) -> Option<EntityId> {
        self.provider.as_ref().map(Relation::id)
    }

    pub fn service_id(&self) -> Option<EntityId> {
        self.service.as_ref().map(Relation::id)
    }

    /// Whether this appointment still holds its slot.
    pub fn occupies_slot(&self) -> bool {
        self.status != AppointmentStatus::Cancelled && self.deleted_at.is_none()
    }
}

impl Identified for Appointment {
    fn id(&self) -> EntityId {
        self.id
    }
}

// ==============================================================================
// CATALOG
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkingHours {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl WorkingHours {
    pub fn contains(&self, time: NaiveTime) -> bool {
        time >= self.start && time <= self.end
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Provider {
    pub id: EntityId,
    pub name: String,
    #[serde(default)]
    pub working_hours: Option<WorkingHours>,
    /// Day names as entered by staff ("Monday", "mon", "lunes").
    #[serde(default)]
    pub days_off: Vec<String>,
    #[serde(default)]
    pub services: Vec<EntityId>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Provider {
    pub fn is_day_off(&self, date: NaiveDate) -> bool {
        let weekday = date.weekday();
        self.days_off
            .iter()
            .filter_map(|name| parse_weekday(name))
            .any(|day| day == weekday)
    }
}

impl Identified for Provider {
    fn id(&self) -> EntityId {
        self.id
    }
}

fn parse_weekday(name: &str) -> Option<Weekday> {
    let name = name.trim().to_lowercase();
    match name.as_str() {
        "lunes" => Some(Weekday::Mon),
        "martes" => Some(Weekday::Tue),
        "miercoles" | "miércoles" => Some(Weekday::Wed),
        "jueves" => Some(Weekday::Thu),
        "viernes" => Some(Weekday::Fri),
        "sabado" | "sábado" => Some(Weekday::Sat),
        "domingo" => Some(Weekday::Sun),
        other => other.parse().ok(),
    }
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Service {
    pub id: EntityId,
    pub name: String,
    pub price: f64,
    pub duration_minutes: u32,
    #[serde(default = "default_active")]
    pub active: bool,
}

impl Identified for Service {
    fn id(&self) -> EntityId {
        self.id
    }
}

/// Explicit provider/service association; soft-deleted links no longer grant eligibility.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderServiceLink {
    pub id: EntityId,
    pub provider: Relation<Provider>,
    pub service: Relation<Service>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl ProviderServiceLink {
    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }
}

// ==============================================================================
// PAYMENTS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PaymentStatus {
    #[serde(rename = "Pendiente", alias = "pending", alias = "Pending")]
    Pending,
    #[serde(rename = "Completado", alias = "completed", alias = "Completed")]
    Completed,
    #[serde(rename = "Fallido", alias = "failed", alias = "Failed")]
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Payment {
    pub id: EntityId,
    pub amount: f64,
    pub method: String,
    pub status: PaymentStatus,
    pub transaction_ref: String,
    #[serde(default)]
    pub paid_at: Option<DateTime<Utc>>,
    pub appointment: Relation<Appointment>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Identified for Payment {
    fn id(&self) -> EntityId {
        self.id
    }
}

// ==============================================================================
// WRITE PAYLOADS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewAppointment {
    pub scheduled_at: NaiveDateTime,
    pub client_name: String,
    pub client_email: String,
    pub client_phone: Option<String>,
    pub notes: Option<String>,
    pub provider: Option<EntityId>,
    pub service: EntityId,
    pub status: AppointmentStatus,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppointmentPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<AppointmentStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment: Option<EntityId>,
}

impl AppointmentPatch {
    pub fn status(status: AppointmentStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewPayment {
    pub amount: f64,
    pub method: String,
    pub status: PaymentStatus,
    pub transaction_ref: String,
    pub paid_at: Option<DateTime<Utc>>,
    pub appointment: EntityId,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_relation_accepts_bare_id_object_and_record() {
        let bare: Relation<Service> = serde_json::from_value(json!(4)).unwrap();
        assert_eq!(bare, Relation::Stub(4));

        let id_only: Relation<Service> = serde_json::from_value(json!({"id": 5})).unwrap();
        assert_eq!(id_only, Relation::Stub(5));

        let full: Relation<Service> = serde_json::from_value(json!({
            "id": 6, "name": "Corte", "price": 12.5, "duration_minutes": 30
        }))
        .unwrap();
        assert_eq!(full.id(), 6);
        assert!(full.as_full().map(|s| s.active).unwrap_or(false));
    }

    #[test]
    fn test_status_uses_backend_labels() {
        let status: AppointmentStatus = serde_json::from_value(json!("Pagada")).unwrap();
        assert_eq!(status, AppointmentStatus::Paid);
        let aliased: AppointmentStatus = serde_json::from_value(json!("cancelled")).unwrap();
        assert_eq!(aliased, AppointmentStatus::Cancelled);
        assert_eq!(serde_json::to_value(AppointmentStatus::Completed).unwrap(), json!("Completada"));
    }

    #[test]
    fn test_provider_days_off_accept_spanish_and_english() {
        let provider = Provider {
            id: 1,
            name: "Leo".into(),
            working_hours: None,
            days_off: vec!["lunes".into(), "Sunday".into(), "???".into()],
            services: vec![],
            deleted_at: None,
        };
        // 2025-01-13 is a Monday, 2025-01-19 a Sunday
        assert!(provider.is_day_off(NaiveDate::from_ymd_opt(2025, 1, 13).unwrap()));
        assert!(provider.is_day_off(NaiveDate::from_ymd_opt(2025, 1, 19).unwrap()));
        assert!(!provider.is_day_off(NaiveDate::from_ymd_opt(2025, 1, 15).unwrap()));
    }

    #[test]
    fn test_patch_serializes_only_set_fields() {
        let patch = AppointmentPatch::status(AppointmentStatus::Paid);
        assert_eq!(serde_json::to_value(&patch).unwrap(), json!({"status": "Pagada"}));
    }
}
