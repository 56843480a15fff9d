use serde::Serialize;

use services::identity::Identity;
use services::submission::AttendanceRecord;

/// Everything the form page needs to render: who is signed in, the CSRF
/// token to echo back, and the configured dropdown options.
#[derive(Debug, Serialize, Default)]
pub struct FormContext {
    pub user: Option<Identity>,
    pub csrf: Option<String>,
    pub accepting_responses: bool,
    pub course_codes: Vec<String>,
    pub sections: Vec<String>,
    pub today: String,
}

/// The stored summary shown on the success view. The client IP is kept out
/// of it on purpose; it only belongs in the appended row.
#[derive(Debug, Serialize, Default)]
pub struct SubmissionSummary {
    pub name: String,
    pub student_id: String,
    pub course: String,
    pub section: String,
    pub email: String,
    pub timestamp: String,
}

impl From<AttendanceRecord> for SubmissionSummary {
    fn from(record: AttendanceRecord) -> Self {
        Self {
            name: record.name,
            student_id: record.student_id,
            course: record.course,
            section: record.section,
            email: record.email,
            timestamp: record.timestamp_local,
        }
    }
}
