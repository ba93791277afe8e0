//! Typed dashboard endpoints layered on [`AuthenticatedFetch`].
//!
//! Every operation reads the live credential from the session store and
//! returns a [`NormalizedResult`]; nothing here returns `Err`.

use std::path::{Component, Path};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::auth_fetch::AuthenticatedFetch;
use super::request::RequestDescriptor;
use super::result::{ErrorInfo, NormalizedResult};
use super::session::{ADMIN_ROLE, UserId};

/// Filename used when the export response names none.
pub const DEFAULT_EXPORT_FILENAME: &str = "charging_sessions.csv";

const ME_PATH: &str = "/me";
const SUBSCRIPTION_STATUS_PATH: &str = "/api/user/subscription-status";
const ADMIN_USERS_PATH: &str = "/api/admin/users";
const CHARGING_EXPORT_PATH: &str = "/api/charging/sessions/export/csv";

/// Subscription tier.
///
/// The backend stores the tier as free text. Missing, null and unrecognised
/// values read as [`Tier::Free`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// No paid plan.
    #[default]
    Free,
    /// Entry paid plan.
    Basic,
    /// Full paid plan.
    Pro,
    /// Multi-vehicle business plan.
    Fleet,
}

impl<'de> Deserialize<'de> for Tier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(match raw.as_deref().map(str::trim) {
            Some(tier) if tier.eq_ignore_ascii_case("basic") => Self::Basic,
            Some(tier) if tier.eq_ignore_ascii_case("pro") => Self::Pro,
            Some(tier) if tier.eq_ignore_ascii_case("fleet") => Self::Fleet,
            _ => Self::Free,
        })
    }
}

/// Read a nullable column as the type's default.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Vehicle connectivity indicator shown next to the user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnlineStatus {
    /// All vehicles reporting.
    Green,
    /// Some vehicles stale.
    Yellow,
    /// Vehicles offline.
    Red,
    /// Unknown.
    #[default]
    Grey,
}

/// Backend profile of the signed-in user (`GET /me`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserDetails {
    /// User id.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Email address.
    #[serde(default)]
    pub email: Option<String>,
    /// Whether an administrator approved the account.
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_approved: bool,
    /// Terms acceptance; `None` until asked.
    #[serde(default)]
    pub accepted_terms: Option<bool>,
    /// Whether offline notifications are enabled.
    #[serde(default, deserialize_with = "null_as_default")]
    pub notify_offline: bool,
    /// Newsletter subscription.
    #[serde(default)]
    pub is_subscribed: Option<bool>,
    /// Role string, `admin` for administrators.
    #[serde(default)]
    pub role: Option<String>,
    /// Account creation time.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Subscription tier.
    #[serde(default)]
    pub tier: Tier,
    /// Payment provider customer id.
    #[serde(default)]
    pub stripe_customer_id: Option<String>,
    /// Remaining SMS credits.
    #[serde(default)]
    pub sms_credits: Option<i64>,
    /// Vehicle connectivity indicator.
    #[serde(default, deserialize_with = "null_as_default")]
    pub online_status: OnlineStatus,
}

impl UserDetails {
    /// Whether the role grants administration.
    pub fn is_admin(&self) -> bool {
        self.role.as_deref() == Some(ADMIN_ROLE)
    }

    /// Whether the account is approved.
    pub fn is_approved(&self) -> bool {
        self.is_approved
    }

    /// Whether the terms were explicitly accepted.
    pub fn has_accepted_terms(&self) -> bool {
        self.accepted_terms == Some(true)
    }
}

/// `GET /api/user/subscription-status` payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionStatus {
    /// Tier; `free` when the backend omits it.
    #[serde(default)]
    pub tier: Tier,
    /// Payment provider status string.
    #[serde(default)]
    pub status: Option<String>,
}

/// Active subscription of a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    /// Provider subscription id.
    pub subscription_id: String,
    /// Plan display name.
    pub plan_name: String,
    /// Provider price id.
    #[serde(default)]
    pub price_id: Option<String>,
    /// Provider status (`active`, `past_due`, ...).
    pub status: String,
    /// Next charge date.
    #[serde(default)]
    pub next_billing_date: Option<String>,
    /// Start of the current period.
    #[serde(default)]
    pub current_period_start: Option<String>,
    /// End of the current period.
    #[serde(default)]
    pub current_period_end: Option<String>,
    /// Amount per period.
    #[serde(default)]
    pub amount: Option<f64>,
    /// ISO currency code.
    #[serde(default)]
    pub currency: Option<String>,
    /// Fields not modelled above.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One invoice of a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    /// Provider invoice id.
    pub invoice_id: String,
    /// Receipt number.
    #[serde(default)]
    pub receipt_number: Option<String>,
    /// Creation timestamp as sent by the backend.
    pub created_at: String,
    /// Amount due.
    pub amount_due: f64,
    /// ISO currency code.
    pub currency: String,
    /// Provider status.
    pub status: String,
    /// PDF download link.
    #[serde(default)]
    pub pdf_url: Option<String>,
    /// Hosted invoice page.
    #[serde(default)]
    pub hosted_invoice_url: Option<String>,
    /// Fields not modelled above.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Customer record managed by administrators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    /// User id.
    pub id: String,
    /// Email address; nullable in the backend.
    #[serde(default)]
    pub email: Option<String>,
    /// Creation time.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Role string.
    #[serde(default)]
    pub role: Option<String>,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Approval flag.
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_approved: bool,
    /// Terms acceptance.
    #[serde(default)]
    pub accepted_terms: Option<bool>,
    /// Offline notifications flag.
    #[serde(default, deserialize_with = "null_as_default")]
    pub notify_offline: bool,
    /// Newsletter flag.
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_subscribed: bool,
    /// Subscription tier.
    #[serde(default)]
    pub tier: Tier,
    /// Number of linked vehicles.
    #[serde(default, deserialize_with = "null_as_default")]
    pub linked_vehicle_count: u32,
    /// Payment provider customer id.
    #[serde(default)]
    pub stripe_customer_id: Option<String>,
    /// Payment provider status.
    #[serde(default)]
    pub subscription_status: Option<String>,
    /// Remaining SMS credits.
    #[serde(default, deserialize_with = "null_as_default")]
    pub sms_credits: i64,
}

/// Partial customer update; `None` fields are left out of the request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UpdateCustomerPayload {
    /// New email.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// New name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// New role.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// New approval flag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_approved: Option<bool>,
    /// New offline notification flag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notify_offline: Option<bool>,
    /// New newsletter flag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_subscribed: Option<bool>,
    /// New tier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<Tier>,
    /// New SMS credit balance.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sms_credits: Option<i64>,
}

/// New customer; only `email` is required.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CreateCustomerPayload {
    /// Email address.
    pub email: String,
    /// Display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Role.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Terms acceptance.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accepted_terms: Option<bool>,
    /// Offline notifications flag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notify_offline: Option<bool>,
    /// Newsletter flag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_subscribed: Option<bool>,
    /// Tier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<Tier>,
    /// SMS credits.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sms_credits: Option<i64>,
}

/// Downloaded charging-session export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvExport {
    /// Suggested filename.
    pub filename: String,
    /// CSV bytes.
    pub bytes: Vec<u8>,
}

/// Filename from a `Content-Disposition` header, quotes stripped.
///
/// Only a bare file name is accepted. Values with directory parts, parent
/// references or absolute paths fall back to [`DEFAULT_EXPORT_FILENAME`].
///
/// # Examples
/// ```
/// use evlink_client::domain::dashboard::export_filename;
///
/// assert_eq!(
///     export_filename(Some(r#"attachment; filename="sessions_2024.csv""#)),
///     "sessions_2024.csv"
/// );
/// assert_eq!(export_filename(None), "charging_sessions.csv");
/// ```
pub fn export_filename(content_disposition: Option<&str>) -> String {
    content_disposition
        .and_then(|header| header.split_once("filename="))
        .map(|(_, rest)| rest.split(';').next().unwrap_or_default().replace('"', ""))
        .map(|name| name.trim().to_owned())
        .filter(|name| is_bare_file_name(name))
        .unwrap_or_else(|| DEFAULT_EXPORT_FILENAME.to_owned())
}

fn is_bare_file_name(name: &str) -> bool {
    if name.is_empty() || name.contains(['/', '\\']) {
        return false;
    }
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// Typed consumer facade over the backend.
#[derive(Clone)]
pub struct DashboardApi {
    fetch: AuthenticatedFetch,
}

impl DashboardApi {
    /// Facade over an authenticated executor.
    pub fn new(fetch: AuthenticatedFetch) -> Self {
        Self { fetch }
    }

    /// Arbitrary authenticated JSON call.
    pub async fn request(&self, request: &RequestDescriptor) -> NormalizedResult<Value> {
        self.fetch.execute_current(request).await
    }

    /// Profile of the signed-in user.
    pub async fn current_user(&self) -> NormalizedResult<UserDetails> {
        self.fetch
            .execute_current(&RequestDescriptor::get(ME_PATH))
            .await
    }

    /// Tier of the signed-in user.
    pub async fn subscription_status(&self) -> NormalizedResult<SubscriptionStatus> {
        self.fetch
            .execute_current(&RequestDescriptor::get(SUBSCRIPTION_STATUS_PATH))
            .await
    }

    /// Active subscription of `user_id`.
    pub async fn subscription(&self, user_id: &UserId) -> NormalizedResult<Subscription> {
        self.fetch
            .execute_current(&RequestDescriptor::get(format!("/user/{user_id}/subscription")))
            .await
    }

    /// Invoices of `user_id`.
    pub async fn invoices(&self, user_id: &UserId) -> NormalizedResult<Vec<Invoice>> {
        self.fetch
            .execute_current(&RequestDescriptor::get(format!("/user/{user_id}/invoices")))
            .await
    }

    /// All customers (administrators only).
    pub async fn list_customers(&self) -> NormalizedResult<Vec<Customer>> {
        self.fetch
            .execute_current(&RequestDescriptor::get(ADMIN_USERS_PATH))
            .await
    }

    /// One customer by id.
    pub async fn get_customer(&self, id: &str) -> NormalizedResult<Customer> {
        self.fetch
            .execute_current(&RequestDescriptor::get(format!("{ADMIN_USERS_PATH}/{id}")))
            .await
    }

    /// Apply a partial update to a customer.
    pub async fn update_customer(
        &self,
        id: &str,
        payload: &UpdateCustomerPayload,
    ) -> NormalizedResult<Customer> {
        match RequestDescriptor::patch(format!("{ADMIN_USERS_PATH}/{id}")).with_json(payload) {
            Ok(request) => self.fetch.execute_current(&request).await,
            Err(error) => NormalizedResult::failure(encode_error(&error)),
        }
    }

    /// Create a customer.
    pub async fn create_customer(
        &self,
        payload: &CreateCustomerPayload,
    ) -> NormalizedResult<Customer> {
        match RequestDescriptor::post(ADMIN_USERS_PATH).with_json(payload) {
            Ok(request) => self.fetch.execute_current(&request).await,
            Err(error) => NormalizedResult::failure(encode_error(&error)),
        }
    }

    /// Download charging sessions as CSV, optionally for one vehicle.
    pub async fn export_charging_sessions(
        &self,
        vehicle_id: Option<&str>,
    ) -> NormalizedResult<CsvExport> {
        let mut request = RequestDescriptor::get(CHARGING_EXPORT_PATH);
        if let Some(vehicle_id) = vehicle_id {
            request = request.with_query("vehicle_id", vehicle_id);
        }
        self.fetch
            .execute_current_raw(&request)
            .await
            .map(|payload| CsvExport {
                filename: export_filename(payload.header("content-disposition")),
                bytes: payload.body,
            })
    }
}

fn encode_error(error: &serde_json::Error) -> ErrorInfo {
    ErrorInfo::local(format!("request body could not be encoded: {error}"))
}
