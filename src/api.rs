//! Client for the remote booking API.
//!
//! Every response is decoded once, here, into typed records. List endpoints
//! have historically answered with a bare array, `{ "data": [...] }` or a
//! keyed object such as `{ "bookings": [...] }`; [`decode_list`] accepts
//! exactly those shapes and fails on anything else.

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::config::TutorlyConfig;
use crate::error::{Result, TutorlyError};
use crate::models::{
    Booking, BookingStatus, Category, NewBooking, NewCategory, NewTutorProfile, StudentProfile,
    StudentProfileUpdate, TutorProfile, TutorQuery, User, UserStatus,
};
use crate::session::SessionToken;

/// Longest upstream error body kept in [`TutorlyError::Upstream`].
const MAX_ERROR_BODY: usize = 512;

/// Decode a list response in any accepted envelope.
pub fn decode_list<T: DeserializeOwned>(value: Value, key: &str) -> Result<Vec<T>> {
    let items = match value {
        Value::Array(items) => Value::Array(items),
        Value::Object(mut map) => {
            if matches!(map.get("data"), Some(Value::Array(_))) {
                map.remove("data").unwrap_or(Value::Null)
            } else if matches!(map.get(key), Some(Value::Array(_))) {
                map.remove(key).unwrap_or(Value::Null)
            } else {
                let keys: Vec<&String> = map.keys().collect();
                return Err(TutorlyError::Decode(format!(
                    "expected array, data[] or {}[]; got object with keys {:?}",
                    key, keys
                )));
            }
        }
        other => {
            return Err(TutorlyError::Decode(format!(
                "expected list of {}, got {}",
                key,
                json_kind(&other)
            )))
        }
    };

    serde_json::from_value(items)
        .map_err(|e| TutorlyError::Decode(format!("invalid {} entry: {}", key, e)))
}

/// Decode a single-record response, bare or wrapped in `data`.
pub fn decode_one<T: DeserializeOwned>(value: Value) -> Result<T> {
    let inner = match value {
        Value::Object(mut map) if matches!(map.get("data"), Some(Value::Object(_))) => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    };

    serde_json::from_value(inner).map_err(|e| TutorlyError::Decode(e.to_string()))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Remote API client. Cheap to clone.
#[derive(Clone)]
pub struct RemoteApi {
    client: Client,
    base_url: String,
    cookie_name: String,
}

impl RemoteApi {
    /// Create a client for `base_url`; each call is bounded by `timeout`.
    pub fn new(
        base_url: impl Into<String>,
        cookie_name: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TutorlyError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            cookie_name: cookie_name.into(),
        })
    }

    pub fn from_config(config: &TutorlyConfig) -> Result<Self> {
        Self::new(
            config.api_url.clone(),
            config.session_cookie.clone(),
            config.api_timeout,
        )
    }

    fn request(&self, method: Method, path: &str, token: Option<&SessionToken>) -> RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        match token {
            Some(token) => builder.header(
                reqwest::header::COOKIE,
                format!("{}={}", self.cookie_name, token.expose()),
            ),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Value> {
        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let mut body = body;
            if body.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
            }
            return Err(TutorlyError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body)?)
    }

    async fn get(&self, path: &str, token: Option<&SessionToken>) -> Result<Value> {
        self.send(self.request(Method::GET, path, token)).await
    }

    async fn send_json<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        token: Option<&SessionToken>,
        body: &B,
    ) -> Result<Value> {
        self.send(self.request(method, path, token).json(body)).await
    }

    // ---- bookings ----

    /// Every booking on the platform (admin).
    pub async fn list_all_bookings(&self, token: &SessionToken) -> Result<Vec<Booking>> {
        let value = self.get("/api/all/bookings", Some(token)).await?;
        decode_list(value, "bookings")
    }

    /// The calling student's bookings.
    pub async fn list_my_bookings(&self, token: &SessionToken) -> Result<Vec<Booking>> {
        let value = self.get("/api/my/bookings", Some(token)).await?;
        decode_list(value, "bookings")
    }

    /// Bookings made with the calling tutor.
    pub async fn list_tutor_bookings(&self, token: &SessionToken) -> Result<Vec<Booking>> {
        let value = self.get("/api/my/bookings/tutor", Some(token)).await?;
        decode_list(value, "bookings")
    }

    pub async fn create_booking(
        &self,
        token: &SessionToken,
        booking: &NewBooking,
    ) -> Result<Booking> {
        let value = self
            .send_json(Method::POST, "/api/bookings", Some(token), booking)
            .await?;
        decode_one(value)
    }

    pub async fn update_booking_status(
        &self,
        token: &SessionToken,
        booking_id: &str,
        status: BookingStatus,
    ) -> Result<Booking> {
        let path = format!("/api/bookings/{}", urlencoding::encode(booking_id));
        let value = self
            .send_json(
                Method::PATCH,
                &path,
                Some(token),
                &serde_json::json!({ "status": status }),
            )
            .await?;
        decode_one(value)
    }

    pub async fn cancel_booking(&self, token: &SessionToken, booking_id: &str) -> Result<Booking> {
        self.update_booking_status(token, booking_id, BookingStatus::Cancelled)
            .await
    }

    pub async fn complete_booking(
        &self,
        token: &SessionToken,
        booking_id: &str,
    ) -> Result<Booking> {
        self.update_booking_status(token, booking_id, BookingStatus::Completed)
            .await
    }

    // ---- users ----

    pub async fn list_users(&self, token: &SessionToken) -> Result<Vec<User>> {
        let value = self.get("/api/admin/users", Some(token)).await?;
        decode_list(value, "users")
    }

    pub async fn update_user_status(
        &self,
        token: &SessionToken,
        user_id: &str,
        status: UserStatus,
    ) -> Result<User> {
        let path = format!("/api/admin/users/{}", urlencoding::encode(user_id));
        let value = self
            .send_json(
                Method::PATCH,
                &path,
                Some(token),
                &serde_json::json!({ "status": status }),
            )
            .await?;
        decode_one(value)
    }

    // ---- categories ----

    pub async fn list_categories(&self) -> Result<Vec<Category>> {
        let value = self.get("/api/categories", None).await?;
        decode_list(value, "categories")
    }

    pub async fn create_categories(
        &self,
        token: &SessionToken,
        categories: &[NewCategory],
    ) -> Result<Vec<Category>> {
        if categories.is_empty() {
            return Err(TutorlyError::InvalidInput(
                "at least one category is required".to_string(),
            ));
        }
        let value = self
            .send_json(
                Method::POST,
                "/api/categories",
                Some(token),
                &serde_json::json!({ "categories": categories }),
            )
            .await?;
        decode_list(value, "categories")
    }

    // ---- tutors ----

    pub async fn list_tutors(&self, query: &TutorQuery) -> Result<Vec<TutorProfile>> {
        let builder = self
            .request(Method::GET, "/api/tutor/profile", None)
            .query(&query.to_pairs());
        let value = self.send(builder).await?;
        decode_list(value, "tutors")
    }

    pub async fn get_tutor(&self, tutor_id: &str) -> Result<TutorProfile> {
        let path = format!("/api/tutor/profile/{}", urlencoding::encode(tutor_id));
        let value = self.get(&path, None).await?;
        if value.is_null() || matches!(&value, Value::Object(m) if m.get("data") == Some(&Value::Null))
        {
            return Err(TutorlyError::NotFound(format!("tutor {}", tutor_id)));
        }
        decode_one(value)
    }

    /// Publish the calling tutor's marketplace profile.
    pub async fn create_tutor_profile(
        &self,
        token: &SessionToken,
        profile: &NewTutorProfile,
    ) -> Result<TutorProfile> {
        let profile = profile.trimmed();
        if profile.bio.is_empty() || profile.category_id.is_empty() {
            return Err(TutorlyError::InvalidInput(
                "bio and categoryId are required".to_string(),
            ));
        }
        if !profile.price.is_finite() || profile.price <= 0.0 {
            return Err(TutorlyError::InvalidInput(
                "price must be a positive number".to_string(),
            ));
        }
        let value = self
            .send_json(Method::POST, "/api/tutor/profile", Some(token), &profile)
            .await?;
        decode_one(value)
    }

    // ---- student profile ----

    /// The calling student's profile, or `None` if they have not created one.
    pub async fn get_student_profile(
        &self,
        token: &SessionToken,
    ) -> Result<Option<StudentProfile>> {
        let value = match self.get("/api/student/profile", Some(token)).await {
            Ok(value) => value,
            Err(TutorlyError::Upstream { status: 404, .. }) => return Ok(None),
            Err(e) => return Err(e),
        };
        match value {
            Value::Null => Ok(None),
            Value::Object(ref map) if map.get("data") == Some(&Value::Null) => Ok(None),
            other => decode_one(other).map(Some),
        }
    }

    pub async fn create_student_profile(
        &self,
        token: &SessionToken,
        grade: &str,
        interests: &str,
    ) -> Result<StudentProfile> {
        let value = self
            .send_json(
                Method::POST,
                "/api/student/profile",
                Some(token),
                &serde_json::json!({ "grade": grade, "interests": interests }),
            )
            .await?;
        decode_one(value)
    }

    pub async fn update_student_profile(
        &self,
        token: &SessionToken,
        update: &StudentProfileUpdate,
    ) -> Result<StudentProfile> {
        if update.is_empty() {
            return Err(TutorlyError::InvalidInput(
                "nothing to update".to_string(),
            ));
        }
        let value = self
            .send_json(Method::PUT, "/api/student/profile", Some(token), update)
            .await?;
        decode_one(value)
    }
}
