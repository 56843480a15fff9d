//! The attendance submission pipeline.
//!
//! Preconditions run in a fixed order, each a hard stop: responses open,
//! identity present, CSRF, network policy, email policy, field validation,
//! course/section allowlists. Only then do we touch the network: exchange a
//! credential, check for a same-day row, append.

use chrono::{FixedOffset, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::access::{self, AsnLookup};
use crate::error::SubmissionError;
use crate::identity::Identity;
use crate::policy::PolicyDocument;
use crate::sheets::AttendanceTable;
use crate::token::TokenProvider;

lazy_static! {
    static ref STUDENT_ID_REGEX: Regex = Regex::new("^[0-9]{8,}$").unwrap();
}

/// One appended row, in column order A..G.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub course: String,
    pub section: String,
    pub name: String,
    pub student_id: String,
    pub email: String,
    pub timestamp_local: String,
    pub client_ip: String,
}

impl AttendanceRecord {
    pub fn as_row(&self) -> Vec<String> {
        vec![
            self.course.clone(),
            self.section.clone(),
            self.name.clone(),
            self.student_id.clone(),
            self.email.clone(),
            self.timestamp_local.clone(),
            self.client_ip.clone(),
        ]
    }

    /// `YYYY-MM-DD`, the uniqueness date component.
    pub fn date(&self) -> &str {
        &self.timestamp_local[..10]
    }
}

/// Raw form fields as posted by the client.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmissionInput {
    pub course_code: String,
    pub section: String,
    pub student_id: String,
    pub csrf: String,
}

/// External collaborators of the pipeline, injected so tests can count and
/// stub the outbound calls.
pub struct SubmissionDeps<'a> {
    pub lookup: &'a dyn AsnLookup,
    pub tokens: &'a dyn TokenProvider,
    pub table: &'a dyn AttendanceTable,
    pub tz: FixedOffset,
}

/// Run the full pipeline for one submission.
///
/// `user` and `session_csrf` come from the caller's session handle; `doc` is
/// an immutable policy snapshot taken for this request.
pub async fn submit(
    deps: &SubmissionDeps<'_>,
    doc: &PolicyDocument,
    user: Option<&Identity>,
    session_csrf: Option<&str>,
    client_ip: &str,
    input: &SubmissionInput,
) -> Result<AttendanceRecord, SubmissionError> {
    if !doc.accepting_responses {
        return Err(SubmissionError::NotAccepting);
    }

    let user = user.ok_or(SubmissionError::NotAuthenticated)?;

    let Some(expected_csrf) = session_csrf else {
        return Err(SubmissionError::CsrfMismatch);
    };
    if input.csrf.is_empty() || !access::constant_time_eq(expected_csrf, &input.csrf) {
        return Err(SubmissionError::CsrfMismatch);
    }

    if user.email.is_empty() {
        return Err(SubmissionError::MissingEmail);
    }

    if !access::network_is_allowed(client_ip, doc, deps.lookup).await {
        return Err(SubmissionError::NetworkRejected);
    }
    if !access::email_is_allowed(&user.email, doc) {
        return Err(SubmissionError::EmailRejected);
    }

    let course = input.course_code.trim();
    let section = input.section.trim();
    let student_id = input.student_id.trim();
    if course.is_empty() || section.is_empty() || student_id.is_empty() {
        return Err(SubmissionError::MissingFields);
    }
    if !STUDENT_ID_REGEX.is_match(student_id) {
        return Err(SubmissionError::InvalidStudentId);
    }
    if !access::form_value_allowed(course, &doc.course_codes) {
        return Err(SubmissionError::InvalidCourse);
    }
    if !access::form_value_allowed(section, &doc.sections) {
        return Err(SubmissionError::InvalidSection);
    }

    let now = Utc::now().with_timezone(&deps.tz);
    let record = AttendanceRecord {
        course: course.to_string(),
        section: section.to_string(),
        name: user.name.clone(),
        student_id: student_id.to_string(),
        email: user.email.trim().to_lowercase(),
        timestamp_local: now.format("%Y-%m-%d %H:%M:%S").to_string(),
        client_ip: client_ip.to_string(),
    };
    let date = record.date().to_string();

    let credential = deps.tokens.access_token().await?;

    // Read-then-append: two submissions from the same identity in the same
    // instant can both pass this check before either row lands. Known
    // limitation, kept as-is (see DESIGN.md).
    if deps
        .table
        .has_submitted(&credential.access_token, &record.email, &date)
        .await?
    {
        return Err(SubmissionError::AlreadySubmitted);
    }

    deps.table
        .append(&credential.access_token, &record.as_row())
        .await?;

    tracing::info!(
        email = %record.email,
        course = %record.course,
        section = %record.section,
        ip = %record.client_ip,
        "attendance recorded"
    );

    Ok(record)
}
