use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use axum_extra::extract::cookie::CookieJar;
use chrono::Utc;

use crate::middleware::PolicySnapshot;
use crate::response::ApiResponse;
use crate::state::AppState;

use super::common::{FormContext, SubmissionSummary};

/// GET /api/attendance/form
///
/// Session-bound context for the attendance form. Creates the session on
/// first contact and issues the CSRF token the form must echo back.
pub async fn form_context(
    State(state): State<AppState>,
    Extension(PolicySnapshot(doc)): Extension<PolicySnapshot>,
    jar: CookieJar,
) -> impl IntoResponse {
    let (session_id, jar) = state.sessions.attach(jar, state.cookie_secure);

    let user = state.sessions.get(&session_id).and_then(|s| s.user);
    let csrf = state.sessions.issue_csrf(&session_id);

    // Day badge without leading zeros, e.g. "5-1-2026".
    let today = Utc::now().with_timezone(&state.tz).format("%-d-%-m-%Y").to_string();

    (
        jar,
        Json(ApiResponse::success(
            FormContext {
                user,
                csrf,
                accepting_responses: doc.accepting_responses,
                course_codes: doc.course_codes.clone(),
                sections: doc.sections.clone(),
                today,
            },
            "Form context",
        )),
    )
}

/// GET /api/attendance/success
///
/// The summary stored by the last successful submission in this session.
pub async fn success_summary(State(state): State<AppState>, jar: CookieJar) -> impl IntoResponse {
    let (session_id, jar) = state.sessions.attach(jar, state.cookie_secure);

    match state
        .sessions
        .get(&session_id)
        .and_then(|s| s.last_submission)
    {
        Some(record) => (
            jar,
            (
                StatusCode::OK,
                Json(ApiResponse::success(
                    SubmissionSummary::from(record),
                    "Attendance recorded",
                )),
            ),
        ),
        None => (
            jar,
            (
                StatusCode::NOT_FOUND,
                Json(ApiResponse::<SubmissionSummary>::error(
                    "No submission recorded in this session",
                )),
            ),
        ),
    }
}
