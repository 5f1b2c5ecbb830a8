//! Role-scoped dashboard views.
//!
//! Every handler here sits behind the access gate and receives the caller's
//! [`CurrentSession`] as an explicit request extension. Views are composed
//! for that role only; a handler asked by another role answers 403 even if
//! routing let the request through.

use std::collections::BTreeMap;

use axum::{
    extract::{Path, State},
    routing::{get, patch, post},
    Extension, Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TutorlyError};
use crate::models::{
    Booking, BookingStatus, Category, NewCategory, NewTutorProfile, StudentProfile,
    StudentProfileUpdate, TutorProfile, User, UserStatus,
};
use crate::optimistic::StatusBoard;
use crate::role::{NavGroup, Role};
use crate::session::CurrentSession;
use crate::web::{handle_error, ApiError, AppState, RequestId};

/// Identity block shown in every dashboard header.
#[derive(Debug, Clone, Serialize)]
pub struct Viewer {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
}

/// A dashboard page: who is looking, their menu, and the page content.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardView<T> {
    pub viewer: Viewer,
    pub nav: Vec<NavGroup>,
    pub content: T,
}

impl<T> DashboardView<T> {
    pub fn new(current: &CurrentSession, content: T) -> Self {
        Self {
            viewer: Viewer {
                id: current.user.id.clone(),
                name: current.user.name.clone(),
                email: current.user.email.clone(),
                role: current.role,
            },
            nav: current.role.navigation(),
            content,
        }
    }
}

type ViewResult<T> = std::result::Result<Json<DashboardView<T>>, ApiError>;

fn failure(
    operation: &'static str,
    current: &CurrentSession,
    request_id: &RequestId,
) -> impl FnOnce(TutorlyError) -> ApiError {
    let context = request_id
        .context(operation)
        .with_user_id(current.user.id.clone());
    move |e| handle_error(e, context)
}

/// Routes for all three dashboards.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/student-dashboard", get(student_home))
        .route("/student-dashboard/", get(student_home))
        .route("/student-dashboard/MyBookings", get(student_bookings))
        .route(
            "/student-dashboard/MyBookings/{id}/cancel",
            post(cancel_booking),
        )
        .route(
            "/student-dashboard/StudentProfileEdit",
            get(get_profile).post(create_profile).put(update_profile),
        )
        .route("/tutor-dashboard", get(tutor_home))
        .route("/tutor-dashboard/", get(tutor_home))
        .route("/tutor-dashboard/CreateProfile", post(create_tutor_profile))
        .route("/tutor-dashboard/MyBooking", get(tutor_bookings))
        .route(
            "/tutor-dashboard/MyBooking/{id}/complete",
            post(complete_booking),
        )
        .route("/admin-dashboard", get(admin_statistics))
        .route("/admin-dashboard/", get(admin_statistics))
        .route("/admin-dashboard/users", get(admin_users))
        .route("/admin-dashboard/users/{id}/status", patch(update_user_status))
        .route("/admin-dashboard/bookings", get(admin_bookings))
        .route(
            "/admin-dashboard/bookings/{id}/status",
            patch(update_booking_status),
        )
        .route(
            "/admin-dashboard/categories",
            get(admin_categories).post(create_categories),
        )
}

// ========== Student ==========

#[derive(Debug, Clone, Serialize)]
pub struct StudentHome {
    pub profile: Option<StudentProfile>,
    pub total_bookings: usize,
    pub upcoming: Vec<Booking>,
}

async fn student_home(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
    request_id: RequestId,
) -> ViewResult<StudentHome> {
    let fail = failure("student_home", &current, &request_id);
    let result: Result<_> = async {
        current.require(Role::Student)?;
        let token = current.credential()?;
        let (profile, bookings) = futures::try_join!(
            state.api.get_student_profile(token),
            state.api.list_my_bookings(token)
        )?;

        let now = Utc::now();
        let total_bookings = bookings.len();
        let mut upcoming: Vec<Booking> = bookings
            .into_iter()
            .filter(|b| b.status == BookingStatus::Confirmed && b.date_time >= now)
            .collect();
        upcoming.sort_by_key(|b| b.date_time);

        Ok(StudentHome {
            profile,
            total_bookings,
            upcoming,
        })
    }
    .await;

    result
        .map(|home| Json(DashboardView::new(&current, home)))
        .map_err(fail)
}

async fn student_bookings(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
    request_id: RequestId,
) -> ViewResult<Vec<Booking>> {
    let fail = failure("student_bookings", &current, &request_id);
    let result: Result<_> = async {
        current.require(Role::Student)?;
        state.api.list_my_bookings(current.credential()?).await
    }
    .await;

    result
        .map(|bookings| Json(DashboardView::new(&current, bookings)))
        .map_err(fail)
}

async fn cancel_booking(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
    request_id: RequestId,
    Path(booking_id): Path<String>,
) -> ViewResult<StatusBoard<Booking>> {
    let fail = failure("cancel_booking", &current, &request_id);
    let result: Result<_> = async {
        current.require(Role::Student)?;
        let token = current.credential()?;
        let mut board = StatusBoard::new(state.api.list_my_bookings(token).await?);

        let existing = board
            .get(&booking_id)
            .ok_or_else(|| TutorlyError::NotFound(format!("booking {}", booking_id)))?;
        if existing.status.is_final() {
            return Err(TutorlyError::InvalidInput(format!(
                "booking is already {}",
                existing.status.as_str()
            )));
        }

        board
            .transition(&booking_id, BookingStatus::Cancelled, || {
                state.api.cancel_booking(token, &booking_id)
            })
            .await?;
        tracing::info!(booking_id = %booking_id, user_id = %current.user.id, "Booking cancelled");
        Ok(board)
    }
    .await;

    result
        .map(|board| Json(DashboardView::new(&current, board)))
        .map_err(fail)
}

async fn get_profile(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
    request_id: RequestId,
) -> ViewResult<Option<StudentProfile>> {
    let fail = failure("get_profile", &current, &request_id);
    let result: Result<_> = async {
        current.require(Role::Student)?;
        state.api.get_student_profile(current.credential()?).await
    }
    .await;

    result
        .map(|profile| Json(DashboardView::new(&current, profile)))
        .map_err(fail)
}

#[derive(Debug, Deserialize)]
pub struct CreateProfileRequest {
    pub grade: String,
    pub interests: String,
}

async fn create_profile(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
    request_id: RequestId,
    Json(request): Json<CreateProfileRequest>,
) -> ViewResult<StudentProfile> {
    let fail = failure("create_profile", &current, &request_id);
    let result: Result<_> = async {
        current.require(Role::Student)?;
        let grade = request.grade.trim();
        let interests = request.interests.trim();
        if grade.is_empty() {
            return Err(TutorlyError::InvalidInput("grade is required".to_string()));
        }
        state
            .api
            .create_student_profile(current.credential()?, grade, interests)
            .await
    }
    .await;

    result
        .map(|profile| Json(DashboardView::new(&current, profile)))
        .map_err(fail)
}

async fn update_profile(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
    request_id: RequestId,
    Json(update): Json<StudentProfileUpdate>,
) -> ViewResult<StudentProfile> {
    let fail = failure("update_profile", &current, &request_id);
    let result: Result<_> = async {
        current.require(Role::Student)?;
        state
            .api
            .update_student_profile(current.credential()?, &update)
            .await
    }
    .await;

    result
        .map(|profile| Json(DashboardView::new(&current, profile)))
        .map_err(fail)
}

// ========== Tutor ==========

#[derive(Debug, Clone, Serialize)]
pub struct TutorHome {
    pub total_bookings: usize,
    pub by_status: BTreeMap<&'static str, usize>,
    pub next_session: Option<Booking>,
}

fn count_by_status(bookings: &[Booking]) -> BTreeMap<&'static str, usize> {
    let mut counts: BTreeMap<&'static str, usize> = BookingStatus::ALL
        .iter()
        .map(|s| (s.as_str(), 0))
        .collect();
    for booking in bookings {
        *counts.entry(booking.status.as_str()).or_default() += 1;
    }
    counts
}

async fn tutor_home(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
    request_id: RequestId,
) -> ViewResult<TutorHome> {
    let fail = failure("tutor_home", &current, &request_id);
    let result: Result<_> = async {
        current.require(Role::Tutor)?;
        let bookings = state.api.list_tutor_bookings(current.credential()?).await?;
        let now = Utc::now();
        let next_session = bookings
            .iter()
            .filter(|b| b.status == BookingStatus::Confirmed && b.date_time >= now)
            .min_by_key(|b| b.date_time)
            .cloned();

        Ok(TutorHome {
            total_bookings: bookings.len(),
            by_status: count_by_status(&bookings),
            next_session,
        })
    }
    .await;

    result
        .map(|home| Json(DashboardView::new(&current, home)))
        .map_err(fail)
}

async fn create_tutor_profile(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
    request_id: RequestId,
    Json(profile): Json<NewTutorProfile>,
) -> ViewResult<TutorProfile> {
    let fail = failure("create_tutor_profile", &current, &request_id);
    let result: Result<_> = async {
        current.require(Role::Tutor)?;
        let created = state
            .api
            .create_tutor_profile(current.credential()?, &profile)
            .await?;
        tracing::info!(profile_id = %created.id, user_id = %current.user.id, "Tutor profile created");
        Ok(created)
    }
    .await;

    result
        .map(|created| Json(DashboardView::new(&current, created)))
        .map_err(fail)
}

async fn tutor_bookings(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
    request_id: RequestId,
) -> ViewResult<Vec<Booking>> {
    let fail = failure("tutor_bookings", &current, &request_id);
    let result: Result<_> = async {
        current.require(Role::Tutor)?;
        state.api.list_tutor_bookings(current.credential()?).await
    }
    .await;

    result
        .map(|bookings| Json(DashboardView::new(&current, bookings)))
        .map_err(fail)
}

async fn complete_booking(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
    request_id: RequestId,
    Path(booking_id): Path<String>,
) -> ViewResult<StatusBoard<Booking>> {
    let fail = failure("complete_booking", &current, &request_id);
    let result: Result<_> = async {
        current.require(Role::Tutor)?;
        let token = current.credential()?;
        let mut board = StatusBoard::new(state.api.list_tutor_bookings(token).await?);

        let existing = board
            .get(&booking_id)
            .ok_or_else(|| TutorlyError::NotFound(format!("booking {}", booking_id)))?;
        if existing.status != BookingStatus::Confirmed {
            return Err(TutorlyError::InvalidInput(format!(
                "only confirmed bookings can be completed, this one is {}",
                existing.status.as_str()
            )));
        }

        board
            .transition(&booking_id, BookingStatus::Completed, || {
                state.api.complete_booking(token, &booking_id)
            })
            .await?;
        tracing::info!(booking_id = %booking_id, user_id = %current.user.id, "Booking completed");
        Ok(board)
    }
    .await;

    result
        .map(|board| Json(DashboardView::new(&current, board)))
        .map_err(fail)
}

// ========== Admin ==========

#[derive(Debug, Clone, Serialize)]
pub struct Statistics {
    pub total_users: usize,
    pub users_by_role: BTreeMap<String, usize>,
    pub total_bookings: usize,
    pub bookings_by_status: BTreeMap<&'static str, usize>,
    pub total_categories: usize,
}

impl Statistics {
    pub fn compute(users: &[User], bookings: &[Booking], categories: &[Category]) -> Self {
        let mut users_by_role = BTreeMap::new();
        for user in users {
            *users_by_role.entry(user.role.clone()).or_default() += 1;
        }

        Self {
            total_users: users.len(),
            users_by_role,
            total_bookings: bookings.len(),
            bookings_by_status: count_by_status(bookings),
            total_categories: categories.len(),
        }
    }
}

async fn admin_statistics(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
    request_id: RequestId,
) -> ViewResult<Statistics> {
    let fail = failure("admin_statistics", &current, &request_id);
    let result: Result<_> = async {
        current.require(Role::Admin)?;
        let token = current.credential()?;
        let (users, bookings, categories) = futures::try_join!(
            state.api.list_users(token),
            state.api.list_all_bookings(token),
            state.api.list_categories()
        )?;
        Ok(Statistics::compute(&users, &bookings, &categories))
    }
    .await;

    result
        .map(|stats| Json(DashboardView::new(&current, stats)))
        .map_err(fail)
}

async fn admin_users(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
    request_id: RequestId,
) -> ViewResult<Vec<User>> {
    let fail = failure("admin_users", &current, &request_id);
    let result: Result<_> = async {
        current.require(Role::Admin)?;
        state.api.list_users(current.credential()?).await
    }
    .await;

    result
        .map(|users| Json(DashboardView::new(&current, users)))
        .map_err(fail)
}

#[derive(Debug, Deserialize)]
pub struct UserStatusRequest {
    pub status: UserStatus,
}

async fn update_user_status(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
    request_id: RequestId,
    Path(user_id): Path<String>,
    Json(request): Json<UserStatusRequest>,
) -> ViewResult<StatusBoard<User>> {
    let fail = failure("update_user_status", &current, &request_id);
    let result: Result<_> = async {
        current.require(Role::Admin)?;
        let token = current.credential()?;
        let mut board = StatusBoard::new(state.api.list_users(token).await?);
        board
            .transition(&user_id, request.status, || {
                state.api.update_user_status(token, &user_id, request.status)
            })
            .await?;
        tracing::info!(
            user_id = %user_id,
            status = request.status.as_str(),
            admin_id = %current.user.id,
            "User status updated"
        );
        Ok(board)
    }
    .await;

    result
        .map(|board| Json(DashboardView::new(&current, board)))
        .map_err(fail)
}

async fn admin_bookings(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
    request_id: RequestId,
) -> ViewResult<Vec<Booking>> {
    let fail = failure("admin_bookings", &current, &request_id);
    let result: Result<_> = async {
        current.require(Role::Admin)?;
        state.api.list_all_bookings(current.credential()?).await
    }
    .await;

    result
        .map(|bookings| Json(DashboardView::new(&current, bookings)))
        .map_err(fail)
}

#[derive(Debug, Deserialize)]
pub struct BookingStatusRequest {
    pub status: BookingStatus,
}

async fn update_booking_status(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
    request_id: RequestId,
    Path(booking_id): Path<String>,
    Json(request): Json<BookingStatusRequest>,
) -> ViewResult<StatusBoard<Booking>> {
    let fail = failure("update_booking_status", &current, &request_id);
    let result: Result<_> = async {
        current.require(Role::Admin)?;
        let token = current.credential()?;
        let mut board = StatusBoard::new(state.api.list_all_bookings(token).await?);
        board
            .transition(&booking_id, request.status, || {
                state
                    .api
                    .update_booking_status(token, &booking_id, request.status)
            })
            .await?;
        tracing::info!(
            booking_id = %booking_id,
            status = request.status.as_str(),
            admin_id = %current.user.id,
            "Booking status updated"
        );
        Ok(board)
    }
    .await;

    result
        .map(|board| Json(DashboardView::new(&current, board)))
        .map_err(fail)
}

async fn admin_categories(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
    request_id: RequestId,
) -> ViewResult<Vec<Category>> {
    let fail = failure("admin_categories", &current, &request_id);
    let result: Result<_> = async {
        current.require(Role::Admin)?;
        state.api.list_categories().await
    }
    .await;

    result
        .map(|categories| Json(DashboardView::new(&current, categories)))
        .map_err(fail)
}

#[derive(Debug, Deserialize)]
pub struct CreateCategoriesRequest {
    pub categories: Vec<NewCategory>,
}

impl CreateCategoriesRequest {
    /// Trimmed, non-empty, de-duplicated names in input order.
    fn normalized(self) -> Vec<NewCategory> {
        let mut seen = std::collections::HashSet::new();
        self.categories
            .into_iter()
            .map(|c| c.name.trim().to_string())
            .filter(|name| !name.is_empty())
            .filter(|name| seen.insert(name.to_lowercase()))
            .map(|name| NewCategory { name })
            .collect()
    }
}

async fn create_categories(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentSession>,
    request_id: RequestId,
    Json(request): Json<CreateCategoriesRequest>,
) -> ViewResult<Vec<Category>> {
    let fail = failure("create_categories", &current, &request_id);
    let result: Result<_> = async {
        current.require(Role::Admin)?;
        let categories = request.normalized();
        let created = state
            .api
            .create_categories(current.credential()?, &categories)
            .await?;
        tracing::info!(count = created.len(), admin_id = %current.user.id, "Categories created");
        Ok(created)
    }
    .await;

    result
        .map(|created| Json(DashboardView::new(&current, created)))
        .map_err(fail)
}
