use chrono::Utc;
use shared::{BulkVaccinateOutcome, Student, VaccinationStatus};
use thiserror::Error;
use tracing::info;

use crate::db::DbConnection;
use crate::error::ApiError;
use crate::store::drives::DriveStore;
use crate::store::students::StudentStore;

/// Precondition failures of the vaccination transaction, checked in this
/// order: student, drive, prior vaccination, remaining doses.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum VaccinationError {
    #[error("Student not found")]
    StudentNotFound,
    #[error("Vaccination drive not found")]
    DriveNotFound,
    #[error("Student is already vaccinated for {0}")]
    AlreadyVaccinated(String),
    #[error("No doses available for this vaccination drive")]
    NoDosesAvailable,
}

/// Service that records vaccinations. The dose decrement and the history
/// append commit together or not at all.
#[derive(Clone)]
pub struct VaccinationService {
    db: DbConnection,
    students: StudentStore,
    drives: DriveStore,
}

impl VaccinationService {
    pub fn new(db: DbConnection, students: StudentStore, drives: DriveStore) -> Self {
        Self { db, students, drives }
    }

    /// Vaccinate one student against one drive, returning the updated student.
    ///
    /// The dose is taken with a conditional decrement inside a transaction, so
    /// two concurrent requests can never oversubscribe a drive; the losing
    /// request observes `NoDosesAvailable`. A duplicate that slips past the
    /// in-memory check is caught by the unique index on Completed records.
    pub async fn mark_vaccinated(
        &self,
        student_id: &str,
        drive_id: &str,
    ) -> Result<Student, ApiError> {
        info!("Vaccinating student {student_id} against drive {drive_id}");

        let student =
            self.students.get(student_id).await?.ok_or(VaccinationError::StudentNotFound)?;
        let drive = self.drives.get(drive_id).await?.ok_or(VaccinationError::DriveNotFound)?;

        if student.has_completed(&drive.vaccine_name) {
            return Err(VaccinationError::AlreadyVaccinated(drive.vaccine_name).into());
        }

        let mut tx = self.db.pool().begin().await.map_err(anyhow::Error::from)?;

        let decremented = sqlx::query(
            "UPDATE vaccination_drives
             SET available_doses = available_doses - 1, updated_at = ?
             WHERE id = ? AND available_doses > 0",
        )
        .bind(Utc::now())
        .bind(drive_id)
        .execute(&mut *tx)
        .await
        .map_err(anyhow::Error::from)?;

        if decremented.rows_affected() == 0 {
            tx.rollback().await.map_err(anyhow::Error::from)?;
            return Err(VaccinationError::NoDosesAvailable.into());
        }

        let inserted = sqlx::query(
            "INSERT INTO vaccinations (student_id, drive_id, vaccine_name, date_administered, status)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&student.id)
        .bind(drive_id)
        .bind(&drive.vaccine_name)
        .bind(Utc::now())
        .bind(VaccinationStatus::Completed.as_str())
        .execute(&mut *tx)
        .await;

        if let Err(e) = inserted {
            tx.rollback().await.map_err(anyhow::Error::from)?;
            if is_unique_violation(&e) {
                return Err(VaccinationError::AlreadyVaccinated(drive.vaccine_name).into());
            }
            return Err(anyhow::Error::from(e).into());
        }

        tx.commit().await.map_err(anyhow::Error::from)?;

        info!("Recorded {} vaccination for student {student_id}", drive.vaccine_name);
        self.students
            .get(student_id)
            .await?
            .ok_or(ApiError::Vaccination(VaccinationError::StudentNotFound))
    }

    /// Vaccinate a selection of students against one drive, in selection
    /// order.
    ///
    /// Successes are capped at the dose count read once at batch start;
    /// students past the cap are reported as failures without being
    /// attempted. Per-student failures within the cap are collected and the
    /// rest of the batch continues.
    pub async fn mark_vaccinated_bulk(
        &self,
        drive_id: &str,
        student_ids: &[String],
    ) -> Result<BulkVaccinateOutcome, ApiError> {
        info!("Bulk vaccinating {} students against drive {drive_id}", student_ids.len());

        if student_ids.is_empty() {
            return Err(ApiError::Validation("No students selected".to_string()));
        }

        let drive = self.drives.get(drive_id).await?.ok_or(VaccinationError::DriveNotFound)?;
        let dose_cap = drive.available_doses as usize;

        let mut outcome = BulkVaccinateOutcome { vaccinated_count: 0, errors: Vec::new() };
        for student_id in student_ids {
            if outcome.vaccinated_count >= dose_cap {
                outcome
                    .errors
                    .push(format!("{student_id}: {}", VaccinationError::NoDosesAvailable));
                continue;
            }
            match self.mark_vaccinated(student_id, drive_id).await {
                Ok(_) => outcome.vaccinated_count += 1,
                Err(e) => outcome.errors.push(format!("{student_id}: {e}")),
            }
        }

        info!(
            "Bulk vaccination done: {} vaccinated, {} errors",
            outcome.vaccinated_count,
            outcome.errors.len()
        );
        Ok(outcome)
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(
        e,
        sqlx::Error::Database(db)
            if matches!(db.kind(), sqlx::error::ErrorKind::UniqueViolation)
    )
}
