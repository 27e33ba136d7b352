use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::MigrationError;

pub const DEFAULT_SECTION: &str = "None";
const COURSE_ID_MAX_LEN: usize = 40;
const EMAIL_MAX_LEN: usize = 254;

/// A row of the legacy `students` table. Keyed by (course_id, email).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyStudent {
    pub course_id: String,
    pub email: String,
    pub name: String,
    pub last_name: String,
    pub comments: String,
    pub team_name: String,
    pub section_name: String,
    pub google_id: String,
    pub registration_key: String,
    /// `None` when the stored text is not a valid timestamp.
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// A row of the `course_students` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigratedStudent {
    pub id: String,
    pub course_id: String,
    pub email: String,
    pub name: String,
    pub last_name: String,
    pub comments: String,
    pub team_name: String,
    pub section_name: String,
    pub google_id: String,
    pub registration_key: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LegacyStudent {
    pub fn identification(&self) -> String {
        identification(&self.course_id, &self.email)
    }
}

impl MigratedStudent {
    pub fn identification(&self) -> String {
        identification(&self.course_id, &self.email)
    }
}

pub fn identification(course_id: &str, email: &str) -> String {
    format!("{}/{}", course_id, email)
}

pub fn course_student_id(email: &str, course_id: &str) -> String {
    format!("{}%{}", email, course_id)
}

/// Builds the new-schema row. The registration key is carried over as-is.
pub fn to_course_student(s: &LegacyStudent) -> Result<MigratedStudent, MigrationError> {
    validate(s)?;
    let created_at = s
        .created_at
        .ok_or_else(|| MigrationError::Record("creation timestamp is not readable".into()))?;

    let last_name = if s.last_name.trim().is_empty() {
        derive_last_name(&s.name)
    } else {
        s.last_name.trim().to_string()
    };
    let section_name = if s.section_name.trim().is_empty() {
        DEFAULT_SECTION.to_string()
    } else {
        s.section_name.clone()
    };

    Ok(MigratedStudent {
        id: course_student_id(&s.email, &s.course_id),
        course_id: s.course_id.clone(),
        email: s.email.clone(),
        name: s.name.trim().to_string(),
        last_name,
        comments: s.comments.clone(),
        team_name: s.team_name.clone(),
        section_name,
        google_id: s.google_id.clone(),
        registration_key: s.registration_key.clone(),
        created_at,
        updated_at: s.updated_at.unwrap_or(created_at),
    })
}

fn derive_last_name(name: &str) -> String {
    name.split_whitespace().last().unwrap_or_default().to_string()
}

fn validate(s: &LegacyStudent) -> Result<(), MigrationError> {
    validate_course_id(&s.course_id)?;
    validate_email(&s.email)?;
    if s.name.trim().is_empty() {
        return Err(MigrationError::Record("student name is empty".into()));
    }
    Ok(())
}

fn validate_course_id(course_id: &str) -> Result<(), MigrationError> {
    if course_id.trim().is_empty() {
        return Err(MigrationError::Record("course id is empty".into()));
    }
    if course_id.chars().count() > COURSE_ID_MAX_LEN {
        return Err(MigrationError::Record(format!(
            "course id {:?} is longer than {} characters",
            course_id, COURSE_ID_MAX_LEN
        )));
    }
    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '$' | '-');
    if !course_id.chars().all(allowed) {
        return Err(MigrationError::Record(format!(
            "course id {:?} contains invalid characters",
            course_id
        )));
    }
    Ok(())
}

fn validate_email(email: &str) -> Result<(), MigrationError> {
    if email.trim().is_empty() {
        return Err(MigrationError::Record("email is empty".into()));
    }
    if email.chars().count() > EMAIL_MAX_LEN {
        return Err(MigrationError::Record(format!(
            "email is longer than {} characters",
            EMAIL_MAX_LEN
        )));
    }
    let mut parts = email.split('@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(MigrationError::Record(format!(
            "email {:?} is not a valid address",
            email
        )));
    };
    if local.is_empty() || domain.is_empty() || email.chars().any(char::is_whitespace) {
        return Err(MigrationError::Record(format!(
            "email {:?} is not a valid address",
            email
        )));
    }
    Ok(())
}

/// Storage form: RFC 3339 in UTC with millisecond precision.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}
