use axum::{
    Extension, Form,
    extract::State,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Deserialize;

use services::submission::{self, SubmissionDeps, SubmissionInput};

use crate::middleware::{ClientIp, PolicySnapshot};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SubmitForm {
    #[serde(default)]
    pub course_code: String,
    #[serde(default)]
    pub section: String,
    #[serde(default)]
    pub student_id: String,
    #[serde(default)]
    pub csrf: String,
}

fn error_redirect(message: &str) -> Redirect {
    let encoded = utf8_percent_encode(message, NON_ALPHANUMERIC).to_string();
    Redirect::to(&format!("/?status=error&msg={encoded}"))
}

/// POST /api/attendance/submit
///
/// Form-encoded submission endpoint. Delegates to the submission pipeline
/// and answers with a redirect: `/success` with the summary stored in the
/// session, or `/` carrying a human-readable error message.
pub async fn submit_attendance(
    State(state): State<AppState>,
    Extension(ClientIp(ip)): Extension<ClientIp>,
    Extension(PolicySnapshot(doc)): Extension<PolicySnapshot>,
    jar: CookieJar,
    Form(form): Form<SubmitForm>,
) -> Response {
    let (session_id, jar) = state.sessions.attach(jar, state.cookie_secure);

    if !doc.accepting_responses {
        return (jar, Redirect::to("/access-denied")).into_response();
    }

    let session = state.sessions.get(&session_id).unwrap_or_default();
    let input = SubmissionInput {
        course_code: form.course_code,
        section: form.section,
        student_id: form.student_id,
        csrf: form.csrf,
    };
    let deps = SubmissionDeps {
        lookup: state.lookup.as_ref(),
        tokens: state.tokens.as_ref(),
        table: state.table.as_ref(),
        tz: state.tz,
    };

    match submission::submit(
        &deps,
        &doc,
        session.user.as_ref(),
        session.csrf.as_deref(),
        &ip,
        &input,
    )
    .await
    {
        Ok(record) => {
            // Summary lives in the session, not the URL.
            state
                .sessions
                .with(&session_id, |s| s.last_submission = Some(record));
            (jar, Redirect::to("/success")).into_response()
        }
        Err(err) => {
            if err.is_transient() {
                tracing::error!(error = %err, ip = %ip, "submission failed on an external call");
            }
            (jar, error_redirect(&err.to_string())).into_response()
        }
    }
}
