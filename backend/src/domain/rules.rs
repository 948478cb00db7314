//! Pure scheduling and eligibility rules for vaccination drives.
//!
//! Everything here is side-effect free: callers pass the current date and the
//! relevant records, which keeps the rules testable without a database.

use chrono::NaiveDate;
use shared::{Student, VaccinationDrive};
use thiserror::Error;

/// Drives must be scheduled at least this many days ahead of creation.
pub const MIN_ADVANCE_DAYS: i64 = 15;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriveRuleViolation {
    #[error("Vaccination drives must be scheduled at least 15 days in advance")]
    TooSoon,

    #[error("A drive for {0} is already scheduled on this date")]
    DuplicateVaccineDate(String),

    #[error("At least one applicable class is required")]
    NoApplicableClasses,

    #[error("Cannot modify past vaccination drives")]
    PastDrive,

    #[error("Cannot delete drive as {0} students are already vaccinated")]
    HasVaccinatedStudents(i64),
}

/// Which completed vaccinations exclude a student from a drive.
///
/// Schools differ on whether a completed dose from one drive should bar a
/// later drive for the same vaccine, so the policy is explicit and set in
/// configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EligibilityPolicy {
    /// A completed vaccination for the same vaccine name excludes the
    /// student from any drive administering that vaccine.
    #[default]
    ByVaccineName,
    /// Only a completed vaccination from this exact drive excludes the
    /// student; another drive for the same vaccine does not.
    ByDriveId,
}

impl std::str::FromStr for EligibilityPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vaccine-name" => Ok(EligibilityPolicy::ByVaccineName),
            "drive-id" => Ok(EligibilityPolicy::ByDriveId),
            other => Err(format!(
                "unknown eligibility policy: {other} (expected \"vaccine-name\" or \"drive-id\")"
            )),
        }
    }
}

/// Whether a new drive may be created.
///
/// `existing` only needs to contain drives that could collide, i.e. drives on
/// the candidate's calendar day; passing more is harmless. Accepts a drive
/// exactly 15 days out.
pub fn can_create_drive(
    vaccine_name: &str,
    drive_date: NaiveDate,
    applicable_classes: &[String],
    existing: &[VaccinationDrive],
    today: NaiveDate,
) -> Result<(), DriveRuleViolation> {
    if (drive_date - today).num_days() < MIN_ADVANCE_DAYS {
        return Err(DriveRuleViolation::TooSoon);
    }

    if existing
        .iter()
        .any(|d| d.vaccine_name == vaccine_name && d.drive_date == drive_date)
    {
        return Err(DriveRuleViolation::DuplicateVaccineDate(vaccine_name.to_string()));
    }

    if applicable_classes.is_empty() {
        return Err(DriveRuleViolation::NoApplicableClasses);
    }

    Ok(())
}

/// Whether a drive may be edited. Past drives are frozen; a new date must
/// itself satisfy the advance-notice rule against today.
pub fn can_modify_drive(
    drive: &VaccinationDrive,
    new_date: Option<NaiveDate>,
    today: NaiveDate,
) -> Result<(), DriveRuleViolation> {
    if drive.drive_date < today {
        return Err(DriveRuleViolation::PastDrive);
    }

    if let Some(date) = new_date {
        if (date - today).num_days() < MIN_ADVANCE_DAYS {
            return Err(DriveRuleViolation::TooSoon);
        }
    }

    Ok(())
}

/// Whether a drive may be deleted. The past check takes precedence when both
/// conditions hold.
pub fn can_delete_drive(
    drive: &VaccinationDrive,
    vaccinated_count: i64,
    today: NaiveDate,
) -> Result<(), DriveRuleViolation> {
    if drive.drive_date < today {
        return Err(DriveRuleViolation::PastDrive);
    }

    if vaccinated_count > 0 {
        return Err(DriveRuleViolation::HasVaccinatedStudents(vaccinated_count));
    }

    Ok(())
}

/// Whether a student is eligible for a drive under the given policy.
pub fn is_eligible(student: &Student, drive: &VaccinationDrive, policy: EligibilityPolicy) -> bool {
    if !drive.applicable_classes.contains(&student.class_name) {
        return false;
    }

    match policy {
        EligibilityPolicy::ByVaccineName => !student.has_completed(&drive.vaccine_name),
        EligibilityPolicy::ByDriveId => !student.has_completed_for_drive(&drive.id),
    }
}

/// Students eligible for the drive, in the same relative order as the input.
pub fn eligible_students<'a>(
    drive: &VaccinationDrive,
    students: &'a [Student],
    policy: EligibilityPolicy,
) -> Vec<&'a Student> {
    students
        .iter()
        .filter(|s| is_eligible(s, drive, policy))
        .collect()
}

/// Students holding a Completed record created by this exact drive.
///
/// Matching is always by stored drive id; two drives for the same vaccine are
/// distinct here.
pub fn vaccinated_for_drive<'a>(
    drive: &VaccinationDrive,
    students: &'a [Student],
) -> Vec<&'a Student> {
    students
        .iter()
        .filter(|s| s.has_completed_for_drive(&drive.id))
        .collect()
}
