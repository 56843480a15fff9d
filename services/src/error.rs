//! Error types shared across the service layer.
//!
//! Every outbound call and storage operation reports failure through one of
//! these enums; handlers decide the HTTP shape at the boundary.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("failed to serialize policy document: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write policy document to {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum IdentityError {
    /// Transport failure, non-2xx response or an unparsable body from the
    /// identity broker. Reported to the client as a generic invalid token.
    #[error("Invalid token")]
    Invalid,

    #[error("Client ID mismatch (audience mismatch)")]
    AudienceMismatch,

    #[error("No email found in Google token")]
    MissingEmail,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("service account key not found: {0}")]
    MissingKeyFile(String),

    #[error("invalid service account key: {0}")]
    InvalidKey(String),

    #[error("failed to sign assertion: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),

    #[error("token endpoint request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("token endpoint returned HTTP {status}: {body}")]
    Endpoint { status: u16, body: String },

    #[error("token endpoint response missing access_token")]
    MissingAccessToken,
}

#[derive(Debug, Error)]
pub enum TableError {
    #[error("table {op} request failed: {source}")]
    Transport {
        op: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("table {op} returned HTTP {status}: {body}")]
    Api {
        op: &'static str,
        status: u16,
        body: String,
    },
}

/// Outcome taxonomy of the submission pipeline. The display strings are the
/// user-facing messages carried on the error redirect, matching the portal's
/// established wording.
#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("Responses are currently closed.")]
    NotAccepting,

    #[error("Not logged in.")]
    NotAuthenticated,

    #[error("Security check failed (CSRF).")]
    CsrfMismatch,

    #[error("Session email missing.")]
    MissingEmail,

    #[error("Access denied: network not allowed.")]
    NetworkRejected,

    #[error("Access denied: email not allowed.")]
    EmailRejected,

    #[error("Please fill all required fields.")]
    MissingFields,

    #[error("Student ID must be at least 8 digits.")]
    InvalidStudentId,

    #[error("Invalid course code.")]
    InvalidCourse,

    #[error("Invalid section.")]
    InvalidSection,

    #[error("You have already submitted attendance.")]
    AlreadySubmitted,

    #[error("Could not authorize against the attendance sheet: {0}")]
    Credential(#[from] TokenError),

    #[error("Attendance sheet error: {0}")]
    External(#[from] TableError),
}

impl SubmissionError {
    /// Policy rejections and input problems are final; credential and table
    /// failures are transient and worth retrying by the user.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SubmissionError::Credential(_) | SubmissionError::External(_)
        )
    }
}
