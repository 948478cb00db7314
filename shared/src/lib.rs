use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A student enrolled at the school, with their vaccination history.
///
/// `student_id` is the externally assigned identifier (unique, immutable after
/// creation); `id` is the system-generated record id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub student_id: String,
    pub name: String,
    #[serde(rename = "class")]
    pub class_name: String,
    pub grade_section: String,
    pub age: u32,
    pub gender: Gender,
    pub parent_name: String,
    pub contact_number: String,
    /// Vaccination records in administration order.
    #[serde(default)]
    pub vaccinations: Vec<VaccinationRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Student {
    /// Whether this student holds a Completed record for the given vaccine.
    pub fn has_completed(&self, vaccine_name: &str) -> bool {
        self.vaccinations
            .iter()
            .any(|v| v.vaccine_name == vaccine_name && v.status == VaccinationStatus::Completed)
    }

    /// Whether this student holds a Completed record created by the given drive.
    pub fn has_completed_for_drive(&self, drive_id: &str) -> bool {
        self.vaccinations
            .iter()
            .any(|v| v.drive_id == drive_id && v.status == VaccinationStatus::Completed)
    }
}

/// One administered (or scheduled) vaccination on a student's record.
///
/// `vaccine_name` is a snapshot taken at administration time, not a live join
/// against the drive; `drive_id` is a non-owning back-reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaccinationRecord {
    pub drive_id: String,
    pub vaccine_name: String,
    pub date_administered: DateTime<Utc>,
    pub status: VaccinationStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VaccinationStatus {
    Pending,
    Completed,
    Missed,
}

impl VaccinationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VaccinationStatus::Pending => "Pending",
            VaccinationStatus::Completed => "Completed",
            VaccinationStatus::Missed => "Missed",
        }
    }
}

impl std::str::FromStr for VaccinationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(VaccinationStatus::Pending),
            "Completed" => Ok(VaccinationStatus::Completed),
            "Missed" => Ok(VaccinationStatus::Missed),
            other => Err(format!("unknown vaccination status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "Male",
            Gender::Female => "Female",
            Gender::Other => "Other",
        }
    }
}

impl std::str::FromStr for Gender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Male" => Ok(Gender::Male),
            "Female" => Ok(Gender::Female),
            "Other" => Ok(Gender::Other),
            other => Err(format!("unknown gender: {other}")),
        }
    }
}

/// A scheduled event at which one vaccine is administered to eligible classes.
///
/// The drive is the sole authority over `available_doses`; the count is only
/// ever decremented by the vaccination transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaccinationDrive {
    pub id: String,
    pub vaccine_name: String,
    pub drive_date: NaiveDate,
    pub available_doses: u32,
    pub applicable_classes: Vec<String>,
    pub status: DriveStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DriveStatus {
    Scheduled,
    Completed,
    Cancelled,
}

impl DriveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriveStatus::Scheduled => "Scheduled",
            DriveStatus::Completed => "Completed",
            DriveStatus::Cancelled => "Cancelled",
        }
    }
}

impl std::str::FromStr for DriveStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Scheduled" => Ok(DriveStatus::Scheduled),
            "Completed" => Ok(DriveStatus::Completed),
            "Cancelled" => Ok(DriveStatus::Cancelled),
            other => Err(format!("unknown drive status: {other}")),
        }
    }
}

/// Body for creating a student (also the shape of one bulk-import row).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewStudent {
    pub student_id: String,
    pub name: String,
    #[serde(rename = "class")]
    pub class_name: String,
    pub grade_section: String,
    pub age: u32,
    pub gender: Gender,
    pub parent_name: String,
    pub contact_number: String,
    #[serde(default)]
    pub vaccinations: Vec<VaccinationRecord>,
}

/// Partial update for a student; absent fields are left unchanged.
/// The vaccination list is never writable through this type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStudent {
    pub name: Option<String>,
    #[serde(rename = "class")]
    pub class_name: Option<String>,
    pub grade_section: Option<String>,
    pub age: Option<u32>,
    pub gender: Option<Gender>,
    pub parent_name: Option<String>,
    pub contact_number: Option<String>,
}

/// Body for creating a vaccination drive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDrive {
    pub vaccine_name: String,
    pub drive_date: NaiveDate,
    pub available_doses: u32,
    pub applicable_classes: Vec<String>,
    #[serde(default)]
    pub status: Option<DriveStatus>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Partial update for a drive; absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDrive {
    pub vaccine_name: Option<String>,
    pub drive_date: Option<NaiveDate>,
    pub available_doses: Option<u32>,
    pub applicable_classes: Option<Vec<String>>,
    pub status: Option<DriveStatus>,
    pub description: Option<String>,
}

/// Selection of students to vaccinate against one drive, in selection order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkVaccinateRequest {
    pub student_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkVaccinateOutcome {
    pub vaccinated_count: usize,
    pub errors: Vec<String>,
}

/// Standard mutation envelope: `{success, message, data?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self { success: true, message: None, data: Some(data) }
    }

    pub fn ok_with_message(data: T, message: impl Into<String>) -> Self {
        Self { success: true, message: Some(message.into()), data: Some(data) }
    }

    pub fn message_only(message: impl Into<String>) -> Self {
        Self { success: true, message: Some(message.into()), data: None }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self { success: false, message: Some(message.into()), data: None }
    }
}

/// List envelope: `{success, data, pagination}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListResponse<T> {
    pub success: bool,
    pub data: Vec<T>,
    pub pagination: Pagination,
}

impl<T> ListResponse<T> {
    pub fn new(data: Vec<T>, total: i64, page: u32, page_size: u32) -> Self {
        Self {
            success: true,
            data,
            pagination: Pagination::new(total, page, page_size),
        }
    }
}

/// 1-indexed pagination metadata.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pagination {
    pub total: i64,
    pub page: u32,
    pub pages: u32,
}

impl Pagination {
    pub fn new(total: i64, page: u32, page_size: u32) -> Self {
        let pages = if page_size == 0 {
            0
        } else {
            ((total as u32) + page_size - 1) / page_size
        };
        Self { total, page, pages }
    }
}

/// Outcome of a bulk import: row failures are data, not errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
}

/// One row of the vaccination report: the student summary plus only the
/// vaccination records that matched the report filters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRow {
    pub id: String,
    pub name: String,
    pub student_id: String,
    #[serde(rename = "class")]
    pub class_name: String,
    pub grade_section: String,
    pub vaccinations: Vec<VaccinationRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardOverview {
    pub total_students: i64,
    pub vaccinated_students: i64,
    /// `round(100 * vaccinated / total)`, 0 when there are no students.
    pub vaccination_percentage: u32,
    /// Doses remaining across Scheduled drives in the next 30 days.
    pub available_doses: i64,
    /// Next 30 days, soonest first, at most 5.
    pub upcoming_drives: Vec<VaccinationDrive>,
    pub vaccinations_by_type: Vec<VaccineTypeCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaccineTypeCount {
    pub vaccine_name: String,
    pub count: i64,
}

/// Per-class vaccination coverage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassVaccinationStats {
    #[serde(rename = "class")]
    pub class_name: String,
    pub total_students: i64,
    pub vaccinated_students: i64,
    pub vaccination_percentage: f64,
}

/// Completed vaccinations per (month, vaccine) over the trailing window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyTrend {
    /// "M/YYYY"
    pub month: String,
    pub vaccine: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginUser {
    pub id: String,
    pub username: String,
    pub name: String,
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<LoginUser>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_student() -> Student {
        Student {
            id: "s-1".to_string(),
            student_id: "STU001".to_string(),
            name: "Asha Rao".to_string(),
            class_name: "Grade 5".to_string(),
            grade_section: "5A".to_string(),
            age: 10,
            gender: Gender::Female,
            parent_name: "Meera Rao".to_string(),
            contact_number: "555-0100".to_string(),
            vaccinations: vec![VaccinationRecord {
                drive_id: "d-1".to_string(),
                vaccine_name: "Polio".to_string(),
                date_administered: Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap(),
                status: VaccinationStatus::Completed,
            }],
            created_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            updated_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn student_serializes_with_wire_names() {
        let json = serde_json::to_value(sample_student()).unwrap();
        assert_eq!(json["studentId"], "STU001");
        assert_eq!(json["class"], "Grade 5");
        assert_eq!(json["gradeSection"], "5A");
        assert_eq!(json["parentName"], "Meera Rao");
        assert_eq!(json["vaccinations"][0]["vaccineName"], "Polio");
        assert_eq!(json["vaccinations"][0]["status"], "Completed");
    }

    #[test]
    fn has_completed_matches_vaccine_name_and_status() {
        let mut student = sample_student();
        assert!(student.has_completed("Polio"));
        assert!(!student.has_completed("Measles"));

        student.vaccinations[0].status = VaccinationStatus::Pending;
        assert!(!student.has_completed("Polio"));
    }

    #[test]
    fn has_completed_for_drive_matches_by_id() {
        let student = sample_student();
        assert!(student.has_completed_for_drive("d-1"));
        assert!(!student.has_completed_for_drive("d-2"));
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            VaccinationStatus::Pending,
            VaccinationStatus::Completed,
            VaccinationStatus::Missed,
        ] {
            assert_eq!(status.as_str().parse::<VaccinationStatus>().unwrap(), status);
        }
        assert!("Done".parse::<VaccinationStatus>().is_err());
    }

    #[test]
    fn pagination_rounds_up() {
        assert_eq!(Pagination::new(25, 1, 10).pages, 3);
        assert_eq!(Pagination::new(30, 2, 10).pages, 3);
        assert_eq!(Pagination::new(0, 1, 10).pages, 0);
    }
}
