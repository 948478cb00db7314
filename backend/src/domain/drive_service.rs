use chrono::{Duration, NaiveDate, Utc};
use shared::{DriveStatus, NewDrive, Student, UpdateDrive, VaccinationDrive};
use tracing::info;
use uuid::Uuid;

use crate::domain::rules::{self, EligibilityPolicy};
use crate::error::ApiError;
use crate::store::drives::{DriveListFilter, DriveStore};
use crate::store::students::StudentStore;

/// Drives in the next 30 days count as "upcoming".
pub const UPCOMING_WINDOW_DAYS: i64 = 30;

/// Service for managing vaccination drives, guarded by the scheduling rules.
#[derive(Clone)]
pub struct DriveService {
    drives: DriveStore,
    students: StudentStore,
    policy: EligibilityPolicy,
}

impl DriveService {
    pub fn new(drives: DriveStore, students: StudentStore, policy: EligibilityPolicy) -> Self {
        Self { drives, students, policy }
    }

    pub async fn create(&self, new: NewDrive) -> Result<VaccinationDrive, ApiError> {
        info!("Creating drive: {} on {}", new.vaccine_name, new.drive_date);

        let vaccine_name = new.vaccine_name.trim().to_string();
        if vaccine_name.is_empty() {
            return Err(ApiError::Validation("Vaccine name is required".to_string()));
        }
        if new.available_doses == 0 {
            return Err(ApiError::Validation("Available doses must be at least 1".to_string()));
        }

        let applicable_classes: Vec<String> = new
            .applicable_classes
            .iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();

        let same_day = self.drives.on_same_day(new.drive_date).await?;
        rules::can_create_drive(
            &vaccine_name,
            new.drive_date,
            &applicable_classes,
            &same_day,
            today(),
        )?;

        let now = Utc::now();
        let drive = VaccinationDrive {
            id: Uuid::new_v4().to_string(),
            vaccine_name,
            drive_date: new.drive_date,
            available_doses: new.available_doses,
            applicable_classes,
            status: new.status.unwrap_or(DriveStatus::Scheduled),
            description: new.description.map(|d| d.trim().to_string()).filter(|d| !d.is_empty()),
            created_at: now,
            updated_at: now,
        };
        self.drives.insert(&drive).await?;

        info!("Created drive {} for {}", drive.id, drive.vaccine_name);
        Ok(drive)
    }

    pub async fn get(&self, id: &str) -> Result<VaccinationDrive, ApiError> {
        self.drives.get(id).await?.ok_or(ApiError::NotFound("Vaccination drive"))
    }

    /// Apply a partial update. Past drives are frozen and a moved date must
    /// satisfy the advance-notice rule again.
    pub async fn update(&self, id: &str, update: UpdateDrive) -> Result<VaccinationDrive, ApiError> {
        info!("Updating drive: {id}");

        let mut drive =
            self.drives.get(id).await?.ok_or(ApiError::NotFound("Vaccination drive"))?;

        rules::can_modify_drive(&drive, update.drive_date, today())?;

        if let Some(vaccine_name) = update.vaccine_name {
            let trimmed = vaccine_name.trim().to_string();
            if trimmed.is_empty() {
                return Err(ApiError::Validation("Vaccine name is required".to_string()));
            }
            drive.vaccine_name = trimmed;
        }
        if let Some(date) = update.drive_date {
            drive.drive_date = date;
        }
        if let Some(doses) = update.available_doses {
            if doses == 0 {
                return Err(ApiError::Validation("Available doses must be at least 1".to_string()));
            }
            drive.available_doses = doses;
        }
        if let Some(classes) = update.applicable_classes {
            let classes: Vec<String> = classes
                .iter()
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect();
            if classes.is_empty() {
                return Err(rules::DriveRuleViolation::NoApplicableClasses.into());
            }
            drive.applicable_classes = classes;
        }
        if let Some(status) = update.status {
            drive.status = status;
        }
        if let Some(description) = update.description {
            let trimmed = description.trim().to_string();
            drive.description = (!trimmed.is_empty()).then_some(trimmed);
        }

        drive.updated_at = Utc::now();
        self.drives.update(&drive).await?;

        Ok(drive)
    }

    /// Delete a future drive that nobody has been vaccinated against.
    pub async fn delete(&self, id: &str) -> Result<(), ApiError> {
        info!("Deleting drive: {id}");

        let drive = self.drives.get(id).await?.ok_or(ApiError::NotFound("Vaccination drive"))?;
        let vaccinated_count = self.students.count_vaccinated_for_drive(id).await?;
        rules::can_delete_drive(&drive, vaccinated_count, today())?;

        self.drives.delete(id).await?;
        Ok(())
    }

    /// Filtered listing. `upcoming` forces Scheduled drives within the next
    /// 30 days regardless of the status filter.
    pub async fn list(
        &self,
        status: Option<DriveStatus>,
        vaccine_name: Option<String>,
        upcoming: bool,
        page: u32,
        page_size: u32,
    ) -> Result<(Vec<VaccinationDrive>, i64), ApiError> {
        let mut filter = DriveListFilter { status, vaccine_name, date_range: None };
        if upcoming {
            let from = today();
            filter.status = Some(DriveStatus::Scheduled);
            filter.date_range = Some((from, from + Duration::days(UPCOMING_WINDOW_DAYS)));
        }

        let (drives, total) = self.drives.list(&filter, page, page_size).await?;
        Ok((drives, total))
    }

    /// Students whose class the drive targets and whom the configured policy
    /// does not exclude, in roster order.
    pub async fn eligible_students(&self, drive_id: &str) -> Result<Vec<Student>, ApiError> {
        let drive =
            self.drives.get(drive_id).await?.ok_or(ApiError::NotFound("Vaccination drive"))?;
        let students = self.students.all().await?;

        Ok(rules::eligible_students(&drive, &students, self.policy)
            .into_iter()
            .cloned()
            .collect())
    }

    /// Students vaccinated by this exact drive.
    pub async fn vaccinated_students(&self, drive_id: &str) -> Result<Vec<Student>, ApiError> {
        let drive =
            self.drives.get(drive_id).await?.ok_or(ApiError::NotFound("Vaccination drive"))?;
        let students = self.students.all().await?;

        Ok(rules::vaccinated_for_drive(&drive, &students).into_iter().cloned().collect())
    }
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DbConnection;
    use crate::domain::rules::DriveRuleViolation;
    use shared::{Gender, VaccinationRecord, VaccinationStatus};

    async fn setup_test() -> (DriveService, DriveStore, StudentStore) {
        let db = DbConnection::init_test().await.expect("Failed to create test database");
        let drives = DriveStore::new(db.clone());
        let students = StudentStore::new(db);
        let service =
            DriveService::new(drives.clone(), students.clone(), EligibilityPolicy::ByVaccineName);
        (service, drives, students)
    }

    fn new_drive(vaccine: &str, days_out: i64) -> NewDrive {
        NewDrive {
            vaccine_name: vaccine.to_string(),
            drive_date: today() + Duration::days(days_out),
            available_doses: 2,
            applicable_classes: vec!["Grade 5".to_string()],
            status: None,
            description: None,
        }
    }

    fn stored_drive(id: &str, vaccine: &str, date: NaiveDate) -> VaccinationDrive {
        let now = Utc::now();
        VaccinationDrive {
            id: id.to_string(),
            vaccine_name: vaccine.to_string(),
            drive_date: date,
            available_doses: 5,
            applicable_classes: vec!["Grade 5".to_string()],
            status: DriveStatus::Scheduled,
            description: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn student(id: &str, class: &str, vaccinations: Vec<VaccinationRecord>) -> Student {
        let now = Utc::now();
        Student {
            id: id.to_string(),
            student_id: format!("STU-{id}"),
            name: format!("Student {id}"),
            class_name: class.to_string(),
            grade_section: "A".to_string(),
            age: 10,
            gender: Gender::Other,
            parent_name: "Parent".to_string(),
            contact_number: "555-0100".to_string(),
            vaccinations,
            created_at: now,
            updated_at: now,
        }
    }

    fn completed(drive_id: &str, vaccine: &str) -> VaccinationRecord {
        VaccinationRecord {
            drive_id: drive_id.to_string(),
            vaccine_name: vaccine.to_string(),
            date_administered: Utc::now(),
            status: VaccinationStatus::Completed,
        }
    }

    #[tokio::test]
    async fn test_create_succeeds_20_days_out() {
        let (service, _, _) = setup_test().await;
        let drive = service.create(new_drive("Polio", 20)).await.unwrap();

        assert_eq!(drive.status, DriveStatus::Scheduled);
        assert_eq!(drive.available_doses, 2);
    }

    #[tokio::test]
    async fn test_create_advance_rule_boundary() {
        let (service, _, _) = setup_test().await;

        let err = service.create(new_drive("Polio", 14)).await.unwrap_err();
        assert!(matches!(err, ApiError::Rule(DriveRuleViolation::TooSoon)));

        service.create(new_drive("Polio", 15)).await.unwrap();
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_vaccine_and_date() {
        let (service, _, _) = setup_test().await;
        service.create(new_drive("Polio", 20)).await.unwrap();

        let err = service.create(new_drive("Polio", 20)).await.unwrap_err();
        assert!(matches!(err, ApiError::Rule(DriveRuleViolation::DuplicateVaccineDate(_))));

        // Same day with a different vaccine is fine.
        service.create(new_drive("Measles", 20)).await.unwrap();
    }

    #[tokio::test]
    async fn test_create_validation() {
        let (service, _, _) = setup_test().await;

        let blank = NewDrive { vaccine_name: " ".to_string(), ..new_drive("Polio", 20) };
        assert!(matches!(service.create(blank).await, Err(ApiError::Validation(_))));

        let no_doses = NewDrive { available_doses: 0, ..new_drive("Polio", 20) };
        assert!(matches!(service.create(no_doses).await, Err(ApiError::Validation(_))));

        let no_classes = NewDrive { applicable_classes: vec![], ..new_drive("Polio", 20) };
        assert!(matches!(
            service.create(no_classes).await,
            Err(ApiError::Rule(DriveRuleViolation::NoApplicableClasses))
        ));
    }

    #[tokio::test]
    async fn test_update_rejects_past_drive() {
        let (service, drives, _) = setup_test().await;
        drives
            .insert(&stored_drive("d1", "Polio", today() - Duration::days(1)))
            .await
            .unwrap();

        let update = UpdateDrive { available_doses: Some(9), ..Default::default() };
        let err = service.update("d1", update).await.unwrap_err();
        assert!(matches!(err, ApiError::Rule(DriveRuleViolation::PastDrive)));
    }

    #[tokio::test]
    async fn test_update_revalidates_moved_date() {
        let (service, drives, _) = setup_test().await;
        drives
            .insert(&stored_drive("d1", "Polio", today() + Duration::days(20)))
            .await
            .unwrap();

        let too_soon = UpdateDrive {
            drive_date: Some(today() + Duration::days(5)),
            ..Default::default()
        };
        let err = service.update("d1", too_soon).await.unwrap_err();
        assert!(matches!(err, ApiError::Rule(DriveRuleViolation::TooSoon)));

        let fine = UpdateDrive {
            drive_date: Some(today() + Duration::days(16)),
            available_doses: Some(9),
            ..Default::default()
        };
        let updated = service.update("d1", fine).await.unwrap();
        assert_eq!(updated.drive_date, today() + Duration::days(16));
        assert_eq!(updated.available_doses, 9);
    }

    #[tokio::test]
    async fn test_delete_rules() {
        let (service, drives, students) = setup_test().await;

        // Past drive: frozen.
        drives
            .insert(&stored_drive("past", "Polio", today() - Duration::days(2)))
            .await
            .unwrap();
        assert!(matches!(
            service.delete("past").await,
            Err(ApiError::Rule(DriveRuleViolation::PastDrive))
        ));

        // Future drive with a vaccinated student: blocked.
        drives
            .insert(&stored_drive("used", "Measles", today() + Duration::days(20)))
            .await
            .unwrap();
        students
            .insert(&student("s1", "Grade 5", vec![completed("used", "Measles")]))
            .await
            .unwrap();
        assert!(matches!(
            service.delete("used").await,
            Err(ApiError::Rule(DriveRuleViolation::HasVaccinatedStudents(1)))
        ));

        // Untouched future drive: deletable.
        drives
            .insert(&stored_drive("free", "Typhoid", today() + Duration::days(20)))
            .await
            .unwrap();
        service.delete("free").await.unwrap();
        assert!(matches!(
            service.get("free").await,
            Err(ApiError::NotFound("Vaccination drive"))
        ));
    }

    #[tokio::test]
    async fn test_list_upcoming_forces_window_and_status() {
        let (service, drives, _) = setup_test().await;
        drives
            .insert(&stored_drive("in", "Polio", today() + Duration::days(10)))
            .await
            .unwrap();
        drives
            .insert(&stored_drive("out", "Measles", today() + Duration::days(45)))
            .await
            .unwrap();
        let mut cancelled = stored_drive("cancelled", "Typhoid", today() + Duration::days(12));
        cancelled.status = DriveStatus::Cancelled;
        drives.insert(&cancelled).await.unwrap();

        let (upcoming, total) = service.list(None, None, true, 1, 10).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(upcoming[0].id, "in");
    }

    #[tokio::test]
    async fn test_eligible_students_respects_policy() {
        let (service, drives, students) = setup_test().await;
        let drive = stored_drive("d2", "Polio", today() + Duration::days(20));
        drives.insert(&drive).await.unwrap();

        students.insert(&student("s1", "Grade 5", vec![])).await.unwrap();
        // Completed Polio from an earlier drive.
        students
            .insert(&student("s2", "Grade 5", vec![completed("d1", "Polio")]))
            .await
            .unwrap();
        students.insert(&student("s3", "Grade 6", vec![])).await.unwrap();

        let eligible = service.eligible_students("d2").await.unwrap();
        let ids: Vec<&str> = eligible.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["s1"]);

        // Under the by-drive-id policy the earlier Polio drive is no bar.
        let by_drive = DriveService::new(
            service.drives.clone(),
            service.students.clone(),
            EligibilityPolicy::ByDriveId,
        );
        let eligible = by_drive.eligible_students("d2").await.unwrap();
        let ids: Vec<&str> = eligible.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["s1", "s2"]);
    }

    #[tokio::test]
    async fn test_vaccinated_students_matches_drive_id_only() {
        let (service, drives, students) = setup_test().await;
        drives
            .insert(&stored_drive("d1", "Polio", today() + Duration::days(20)))
            .await
            .unwrap();
        students
            .insert(&student("s1", "Grade 5", vec![completed("d1", "Polio")]))
            .await
            .unwrap();
        students
            .insert(&student("s2", "Grade 5", vec![completed("d9", "Polio")]))
            .await
            .unwrap();

        let vaccinated = service.vaccinated_students("d1").await.unwrap();
        let ids: Vec<&str> = vaccinated.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["s1"]);
    }
}
