use anyhow::anyhow;
use chrono::{Duration, Months, NaiveDate, NaiveTime, Utc};
use shared::{
    ClassVaccinationStats, DashboardOverview, MonthlyTrend, ReportRow, VaccinationStatus,
};

use crate::domain::drive_service::UPCOMING_WINDOW_DAYS;
use crate::error::ApiError;
use crate::store::drives::DriveStore;
use crate::store::students::{ReportFilter, StudentStore};

/// Dashboard shows at most this many upcoming drives.
const DASHBOARD_DRIVE_LIMIT: u32 = 5;

/// Monthly trends look back this far.
const TREND_MONTHS: u32 = 6;

/// Report filters as they arrive from the query string. Dates are calendar
/// days; both bounds are inclusive.
#[derive(Debug, Clone, Default)]
pub struct ReportParams {
    pub vaccine_name: Option<String>,
    pub status: Option<VaccinationStatus>,
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
}

/// Service for the vaccination report and the dashboard aggregates.
#[derive(Clone)]
pub struct ReportService {
    students: StudentStore,
    drives: DriveStore,
}

impl ReportService {
    pub fn new(students: StudentStore, drives: DriveStore) -> Self {
        Self { students, drives }
    }

    /// Students with at least one record matching every supplied filter.
    /// Each row carries only the matching records.
    pub async fn generate(
        &self,
        params: &ReportParams,
        page: u32,
        page_size: u32,
    ) -> Result<(Vec<ReportRow>, i64), ApiError> {
        let filter = ReportFilter {
            vaccine_name: params.vaccine_name.clone(),
            status: params.status,
            from: params.from_date.map(|d| d.and_time(NaiveTime::MIN).and_utc()),
            // Exclusive upper bound one day past `to`, so the whole day counts.
            until: params.to_date.map(|d| (d + Duration::days(1)).and_time(NaiveTime::MIN).and_utc()),
        };

        let (students, total) = self.students.report(&filter, page, page_size).await?;

        let rows = students
            .into_iter()
            .map(|s| ReportRow {
                id: s.id,
                name: s.name,
                student_id: s.student_id,
                class_name: s.class_name,
                grade_section: s.grade_section,
                vaccinations: s
                    .vaccinations
                    .into_iter()
                    .filter(|record| filter.matches(record))
                    .collect(),
            })
            .collect();

        Ok((rows, total))
    }

    pub async fn dashboard_overview(&self) -> Result<DashboardOverview, ApiError> {
        let total_students = self.students.count().await?;
        let vaccinated_students = self.students.count_vaccinated().await?;
        let vaccination_percentage = if total_students == 0 {
            0
        } else {
            (vaccinated_students as f64 * 100.0 / total_students as f64).round() as u32
        };

        let from = Utc::now().date_naive();
        let to = from + Duration::days(UPCOMING_WINDOW_DAYS);
        let upcoming_drives =
            self.drives.upcoming(from, to, Some(DASHBOARD_DRIVE_LIMIT)).await?;
        let available_doses = self.drives.upcoming_available_doses(from, to).await?;

        let vaccinations_by_type = self.students.vaccine_type_counts().await?;

        Ok(DashboardOverview {
            total_students,
            vaccinated_students,
            vaccination_percentage,
            available_doses,
            upcoming_drives,
            vaccinations_by_type,
        })
    }

    pub async fn class_stats(&self) -> Result<Vec<ClassVaccinationStats>, ApiError> {
        let stats = self.students.class_stats().await?;
        Ok(stats)
    }

    /// Completed vaccinations per month and vaccine over the last 6 months.
    pub async fn monthly_trends(&self) -> Result<Vec<MonthlyTrend>, ApiError> {
        let since = Utc::now()
            .checked_sub_months(Months::new(TREND_MONTHS))
            .ok_or_else(|| anyhow!("trend window out of range"))?;

        let trends = self.students.monthly_trends(since).await?;
        Ok(trends)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DbConnection;
    use chrono::DateTime;
    use shared::{DriveStatus, Gender, Student, VaccinationDrive, VaccinationRecord};

    async fn setup_test() -> (ReportService, StudentStore, DriveStore) {
        let db = DbConnection::init_test().await.expect("Failed to create test database");
        let students = StudentStore::new(db.clone());
        let drives = DriveStore::new(db);
        (ReportService::new(students.clone(), drives.clone()), students, drives)
    }

    fn student(id: &str, name: &str, vaccinations: Vec<VaccinationRecord>) -> Student {
        let now = Utc::now();
        Student {
            id: id.to_string(),
            student_id: format!("STU-{id}"),
            name: name.to_string(),
            class_name: "Grade 5".to_string(),
            grade_section: "A".to_string(),
            age: 10,
            gender: Gender::Female,
            parent_name: "Parent".to_string(),
            contact_number: "555-0100".to_string(),
            vaccinations,
            created_at: now,
            updated_at: now,
        }
    }

    fn record(vaccine: &str, administered: &str, status: VaccinationStatus) -> VaccinationRecord {
        VaccinationRecord {
            drive_id: "d1".to_string(),
            vaccine_name: vaccine.to_string(),
            date_administered: DateTime::parse_from_rfc3339(administered)
                .unwrap()
                .with_timezone(&Utc),
            status,
        }
    }

    fn drive(id: &str, vaccine: &str, days_out: i64, doses: u32) -> VaccinationDrive {
        let now = Utc::now();
        VaccinationDrive {
            id: id.to_string(),
            vaccine_name: vaccine.to_string(),
            drive_date: Utc::now().date_naive() + Duration::days(days_out),
            available_doses: doses,
            applicable_classes: vec!["Grade 5".to_string()],
            status: DriveStatus::Scheduled,
            description: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_report_rows_carry_only_matching_records() {
        let (service, students, _) = setup_test().await;
        students
            .insert(&student(
                "s1",
                "Asha Rao",
                vec![
                    record("Polio", "2025-03-01T09:00:00Z", VaccinationStatus::Completed),
                    record("Measles", "2025-04-01T09:00:00Z", VaccinationStatus::Completed),
                ],
            ))
            .await
            .unwrap();

        let params = ReportParams {
            vaccine_name: Some("Polio".to_string()),
            ..Default::default()
        };
        let (rows, total) = service.generate(&params, 1, 10).await.unwrap();

        assert_eq!(total, 1);
        assert_eq!(rows[0].vaccinations.len(), 1);
        assert_eq!(rows[0].vaccinations[0].vaccine_name, "Polio");
    }

    #[tokio::test]
    async fn test_report_date_bounds_are_inclusive_whole_days() {
        let (service, students, _) = setup_test().await;
        students
            .insert(&student(
                "s1",
                "Asha Rao",
                vec![record("Polio", "2025-03-31T23:30:00Z", VaccinationStatus::Completed)],
            ))
            .await
            .unwrap();
        students
            .insert(&student(
                "s2",
                "Birju Mehta",
                vec![record("Polio", "2025-04-01T00:30:00Z", VaccinationStatus::Completed)],
            ))
            .await
            .unwrap();

        // A late-evening record on the `to` day itself still counts.
        let params = ReportParams {
            from_date: NaiveDate::from_ymd_opt(2025, 3, 1),
            to_date: NaiveDate::from_ymd_opt(2025, 3, 31),
            ..Default::default()
        };
        let (rows, total) = service.generate(&params, 1, 10).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(rows[0].name, "Asha Rao");

        // The bounds work independently of each other.
        let params = ReportParams {
            from_date: NaiveDate::from_ymd_opt(2025, 4, 1),
            ..Default::default()
        };
        let (rows, total) = service.generate(&params, 1, 10).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(rows[0].name, "Birju Mehta");
    }

    #[tokio::test]
    async fn test_dashboard_overview_with_no_students() {
        let (service, _, _) = setup_test().await;

        let overview = service.dashboard_overview().await.unwrap();
        assert_eq!(overview.total_students, 0);
        assert_eq!(overview.vaccinated_students, 0);
        assert_eq!(overview.vaccination_percentage, 0);
        assert_eq!(overview.available_doses, 0);
        assert!(overview.upcoming_drives.is_empty());
        assert!(overview.vaccinations_by_type.is_empty());
    }

    #[tokio::test]
    async fn test_dashboard_overview_rounds_percentage() {
        let (service, students, drives) = setup_test().await;
        students
            .insert(&student(
                "s1",
                "Asha Rao",
                vec![record("Polio", "2025-03-01T09:00:00Z", VaccinationStatus::Completed)],
            ))
            .await
            .unwrap();
        students.insert(&student("s2", "Birju Mehta", vec![])).await.unwrap();
        students.insert(&student("s3", "Chitra Iyer", vec![])).await.unwrap();

        drives.insert(&drive("d1", "Polio", 10, 4)).await.unwrap();
        drives.insert(&drive("d2", "Measles", 45, 9)).await.unwrap();

        let overview = service.dashboard_overview().await.unwrap();
        assert_eq!(overview.total_students, 3);
        assert_eq!(overview.vaccinated_students, 1);
        // 1/3 rounds to 33.
        assert_eq!(overview.vaccination_percentage, 33);
        // Only the drive inside the 30-day window counts.
        assert_eq!(overview.available_doses, 4);
        assert_eq!(overview.upcoming_drives.len(), 1);
        assert_eq!(overview.upcoming_drives[0].id, "d1");
        assert_eq!(overview.vaccinations_by_type.len(), 1);
        assert_eq!(overview.vaccinations_by_type[0].vaccine_name, "Polio");
    }

    #[tokio::test]
    async fn test_monthly_trends_window() {
        let (service, students, _) = setup_test().await;
        let recent = Utc::now() - Duration::days(30);
        let ancient = Utc::now() - Duration::days(300);

        let mut fresh = record("Polio", "2025-03-01T09:00:00Z", VaccinationStatus::Completed);
        fresh.date_administered = recent;
        let mut stale = record("Polio", "2025-03-01T09:00:00Z", VaccinationStatus::Completed);
        stale.date_administered = ancient;

        students.insert(&student("s1", "Asha Rao", vec![fresh])).await.unwrap();
        students.insert(&student("s2", "Birju Mehta", vec![stale])).await.unwrap();

        let trends = service.monthly_trends().await.unwrap();
        assert_eq!(trends.len(), 1);
        assert_eq!(trends[0].vaccine, "Polio");
        assert_eq!(trends[0].count, 1);
        let expected_month =
            format!("{}/{}", recent.format("%-m"), recent.format("%Y"));
        assert_eq!(trends[0].month, expected_month);
    }
}
