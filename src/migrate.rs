use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use std::io::Write;
use uuid::Uuid;

use crate::config::{RunConfig, SelectionMode};
use crate::error::{MigrationError, Result};
use crate::store::{RecordStore, RemoteSession};
use crate::student::{identification, to_course_student, LegacyStudent, MigratedStudent};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFailure {
    pub identification: String,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct MigrationReport {
    pub run_id: Uuid,
    pub preview: bool,
    pub selected: usize,
    pub previewed: usize,
    pub written: usize,
    /// Existing CourseStudent rows that differed from the fresh copy.
    pub replaced: usize,
    pub failures: Vec<RecordFailure>,
}

impl MigrationReport {
    fn new(preview: bool) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            preview,
            selected: 0,
            previewed: 0,
            written: 0,
            replaced: 0,
            failures: Vec::new(),
        }
    }
}

pub fn select_records<S: RecordStore>(
    store: &S,
    mode: &SelectionMode,
    now: DateTime<Utc>,
) -> Result<Vec<LegacyStudent>> {
    match mode {
        SelectionMode::ByTime(num_days) => {
            // Windows reaching past the representable range select everything.
            let since = Duration::try_days(i64::from(*num_days))
                .and_then(|d| now.checked_sub_signed(d))
                .unwrap_or(DateTime::<Utc>::MIN_UTC);
            debug!("selecting legacy students created since {}", since);
            store.query_by_time_since(since)
        }
        SelectionMode::ByCourse(course_id) => store.query_by_course(course_id),
        SelectionMode::All => store.query_all(),
    }
}

pub fn run<R: RemoteSession>(
    session: &mut R,
    config: &RunConfig,
    out: &mut impl Write,
) -> Result<MigrationReport> {
    run_at(session, config, Utc::now(), out)
}

/// One pass over the selected legacy students. Only connection and selection
/// errors are returned; per-record failures land in the report.
pub fn run_at<R: RemoteSession>(
    session: &mut R,
    config: &RunConfig,
    now: DateTime<Utc>,
    out: &mut impl Write,
) -> Result<MigrationReport> {
    let mut store = session.connect()?;
    let mut report = MigrationReport::new(config.preview);
    info!(
        "run {}: mode {:?}, preview {}",
        report.run_id, config.mode, config.preview
    );

    let students = select_records(&store, &config.mode, now)?;
    report.selected = students.len();
    info!("run {}: {} legacy students selected", report.run_id, students.len());

    let mut console = Console::new(out, report.run_id);
    console.line(format_args!("Creating a CourseStudent copy of students ..."));

    for student in &students {
        let ident = student.identification();
        match copy_one(&mut store, student, config.preview) {
            Ok(copy) => {
                if copy.replaces_different {
                    report.replaced += 1;
                    warn!(
                        "run {}: existing CourseStudent {} differs from its legacy record{}",
                        report.run_id,
                        ident,
                        if config.preview { "" } else { "; replaced" }
                    );
                }
                if config.preview {
                    report.previewed += 1;
                    console.line(format_args!(
                        "Preview: will copy {}",
                        copy.student.identification()
                    ));
                } else {
                    report.written += 1;
                    console.line(format_args!(
                        "Created CourseStudent for {}",
                        copy.student.identification()
                    ));
                }
            }
            Err(e) => {
                warn!("run {}: failed to copy {}: {}", report.run_id, ident, e);
                console.line(format_args!("Failed to copy {}: {}", ident, e));
                report.failures.push(RecordFailure {
                    identification: ident,
                    reason: e.to_string(),
                });
            }
        }
    }
    console.flush();

    Ok(report)
}

/// Operator-facing progress lines. Output failures never stop the run; the
/// first one is logged.
struct Console<'a, W: Write> {
    out: &'a mut W,
    run_id: Uuid,
    failed: bool,
}

impl<'a, W: Write> Console<'a, W> {
    fn new(out: &'a mut W, run_id: Uuid) -> Self {
        Self {
            out,
            run_id,
            failed: false,
        }
    }

    fn line(&mut self, args: std::fmt::Arguments<'_>) {
        let res = writeln!(self.out, "{}", args);
        self.note(res);
    }

    fn flush(&mut self) {
        let res = self.out.flush();
        self.note(res);
    }

    fn note(&mut self, res: std::io::Result<()>) {
        if let Err(e) = res {
            if !self.failed {
                warn!("run {}: console output failed: {}", self.run_id, e);
                self.failed = true;
            }
        }
    }
}

struct Copied {
    student: MigratedStudent,
    replaces_different: bool,
}

fn copy_one<S: RecordStore>(
    store: &mut S,
    selected: &LegacyStudent,
    preview: bool,
) -> Result<Copied> {
    // Copy from the current stored row, not the snapshot taken at selection.
    let current = store
        .get_legacy(&selected.course_id, &selected.email)?
        .ok_or_else(|| {
            MigrationError::Record(format!(
                "legacy student {} no longer exists",
                identification(&selected.course_id, &selected.email)
            ))
        })?;
    let student = to_course_student(&current)?;
    // Reporting only. An unreadable existing row is overwritten like any other.
    let replaces_different = match store.get_migrated(&student.course_id, &student.email) {
        Ok(existing) => existing.is_some_and(|existing| existing != student),
        Err(e) => {
            warn!(
                "existing CourseStudent {} could not be read: {}",
                student.identification(),
                e
            );
            true
        }
    };
    if !preview {
        store.upsert(&student)?;
    }
    Ok(Copied {
        student,
        replaces_different,
    })
}
