use serde::Deserialize;
use shared::{Gender, NewStudent, VaccinationRecord};
use std::collections::HashSet;
use tracing::info;

use crate::domain::student_service::{student_from_new, validate_new_student};
use crate::error::ApiError;
use crate::store::students::StudentStore;

/// One CSV row, headers matching the JSON wire names. The `vaccinations`
/// column is optional and holds a JSON array when present.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImportRow {
    student_id: String,
    name: String,
    #[serde(rename = "class")]
    class_name: String,
    grade_section: String,
    age: String,
    gender: String,
    parent_name: String,
    contact_number: String,
    #[serde(default)]
    vaccinations: Option<String>,
}

/// Result of a bulk import: rows that made it in, and one message per row
/// that did not.
#[derive(Debug)]
pub struct ImportOutcome {
    pub imported: usize,
    pub errors: Vec<String>,
}

/// Service for the CSV bulk import of students.
#[derive(Clone)]
pub struct ImportService {
    students: StudentStore,
}

impl ImportService {
    pub fn new(students: StudentStore) -> Self {
        Self { students }
    }

    /// Import students from CSV bytes. Each bad row is skipped and reported;
    /// the remaining rows still import.
    pub async fn import_csv(&self, bytes: &[u8]) -> Result<ImportOutcome, ApiError> {
        let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(bytes);

        let mut outcome = ImportOutcome { imported: 0, errors: Vec::new() };
        let mut seen_ids: HashSet<String> = HashSet::new();

        // Row 1 is the header.
        for (index, record) in reader.deserialize::<ImportRow>().enumerate() {
            let row = index + 2;

            let parsed = match record {
                Ok(parsed) => parsed,
                Err(_) => {
                    outcome.errors.push(format!("Row {row}: Invalid row format"));
                    continue;
                }
            };

            if self.import_row(parsed, row, &mut seen_ids, &mut outcome.errors).await? {
                outcome.imported += 1;
            }
        }

        info!("CSV import: {} imported, {} errors", outcome.imported, outcome.errors.len());
        Ok(outcome)
    }

    /// Returns whether the row was imported. Validation failures land in
    /// `errors`; storage failures abort the import.
    async fn import_row(
        &self,
        row: ImportRow,
        row_number: usize,
        seen_ids: &mut HashSet<String>,
        errors: &mut Vec<String>,
    ) -> Result<bool, ApiError> {
        let student_id = row.student_id.trim().to_string();

        if !seen_ids.insert(student_id.clone())
            || self.students.find_by_student_id(&student_id).await?.is_some()
        {
            errors.push(format!("Row {row_number}: Student with ID {student_id} already exists"));
            return Ok(false);
        }

        let age = match row.age.trim().parse::<u32>() {
            Ok(age) => age,
            Err(_) => {
                errors.push(format!("Row {row_number}: Invalid age"));
                return Ok(false);
            }
        };

        let gender = match row.gender.trim().parse::<Gender>() {
            Ok(gender) => gender,
            Err(e) => {
                errors.push(format!("Row {row_number}: {e}"));
                return Ok(false);
            }
        };

        // A malformed vaccinations column is reported but does not block the
        // student; they import with an empty history.
        let vaccinations = match row.vaccinations.as_deref().map(str::trim) {
            None | Some("") => Vec::new(),
            Some(json) => match serde_json::from_str::<Vec<VaccinationRecord>>(json) {
                Ok(records) => records,
                Err(_) => {
                    errors.push(format!("Row {row_number}: Invalid vaccinations data"));
                    Vec::new()
                }
            },
        };

        let new = NewStudent {
            student_id,
            name: row.name,
            class_name: row.class_name,
            grade_section: row.grade_section,
            age,
            gender,
            parent_name: row.parent_name,
            contact_number: row.contact_number,
            vaccinations,
        };

        if let Err(msg) = validate_new_student(&new) {
            errors.push(format!("Row {row_number}: {msg}"));
            return Ok(false);
        }

        let student = student_from_new(new, chrono::Utc::now());
        self.students.insert(&student).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DbConnection;
    use shared::VaccinationStatus;

    const HEADER: &str =
        "studentId,name,class,gradeSection,age,gender,parentName,contactNumber,vaccinations";

    async fn setup_test() -> (ImportService, StudentStore) {
        let db = DbConnection::init_test().await.expect("Failed to create test database");
        let students = StudentStore::new(db);
        (ImportService::new(students.clone()), students)
    }

    #[tokio::test]
    async fn test_import_skips_bad_rows_and_keeps_good_ones() {
        let (service, students) = setup_test().await;

        let csv = format!(
            "{HEADER}\n\
             STU001,Asha Rao,Grade 5,A,10,Female,Prema Rao,555-0101,\n\
             STU001,Birju Mehta,Grade 5,A,11,Male,Kiran Mehta,555-0102,\n\
             STU003,Chitra Iyer,Grade 6,B,11,Female,Devi Iyer,555-0103,\n"
        );

        let outcome = service.import_csv(csv.as_bytes()).await.unwrap();

        assert_eq!(outcome.imported, 2);
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.errors[0].starts_with("Row 3:"));
        assert!(outcome.errors[0].contains("STU001"));

        assert!(students.find_by_student_id("STU001").await.unwrap().is_some());
        assert!(students.find_by_student_id("STU003").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_import_rejects_existing_student_id() {
        let (service, students) = setup_test().await;

        let first = format!("{HEADER}\nSTU001,Asha Rao,Grade 5,A,10,Female,Prema Rao,555-0101,\n");
        service.import_csv(first.as_bytes()).await.unwrap();

        let again = format!("{HEADER}\nSTU001,Asha Rao,Grade 5,A,10,Female,Prema Rao,555-0101,\n");
        let outcome = service.import_csv(again.as_bytes()).await.unwrap();

        assert_eq!(outcome.imported, 0);
        assert_eq!(outcome.errors, vec!["Row 2: Student with ID STU001 already exists"]);
        let (_, total) = students.list(&Default::default(), 1, 10).await.unwrap();
        assert_eq!(total, 1);
    }

    #[tokio::test]
    async fn test_import_parses_quoted_vaccinations_json() {
        let (service, students) = setup_test().await;

        let csv = format!(
            "{HEADER}\n\
             STU001,Asha Rao,Grade 5,A,10,Female,Prema Rao,555-0101,\
             \"[{{\"\"driveId\"\":\"\"d1\"\",\"\"vaccineName\"\":\"\"Polio\"\",\
             \"\"dateAdministered\"\":\"\"2025-03-01T09:00:00Z\"\",\"\"status\"\":\"\"Completed\"\"}}]\"\n"
        );

        let outcome = service.import_csv(csv.as_bytes()).await.unwrap();
        assert_eq!(outcome.imported, 1);
        assert!(outcome.errors.is_empty());

        let student = students.find_by_student_id("STU001").await.unwrap().unwrap();
        assert_eq!(student.vaccinations.len(), 1);
        assert_eq!(student.vaccinations[0].vaccine_name, "Polio");
        assert_eq!(student.vaccinations[0].status, VaccinationStatus::Completed);
    }

    #[tokio::test]
    async fn test_invalid_vaccinations_json_still_imports_the_student() {
        let (service, students) = setup_test().await;

        let csv = format!(
            "{HEADER}\nSTU001,Asha Rao,Grade 5,A,10,Female,Prema Rao,555-0101,not-json\n"
        );

        let outcome = service.import_csv(csv.as_bytes()).await.unwrap();
        assert_eq!(outcome.imported, 1);
        assert_eq!(outcome.errors, vec!["Row 2: Invalid vaccinations data"]);

        let student = students.find_by_student_id("STU001").await.unwrap().unwrap();
        assert!(student.vaccinations.is_empty());
    }

    #[tokio::test]
    async fn test_import_validates_age_and_gender() {
        let (service, _) = setup_test().await;

        let csv = format!(
            "{HEADER}\n\
             STU001,Asha Rao,Grade 5,A,ten,Female,Prema Rao,555-0101,\n\
             STU002,Birju Mehta,Grade 5,A,11,Robot,Kiran Mehta,555-0102,\n\
             STU003,,Grade 6,B,11,Female,Devi Iyer,555-0103,\n"
        );

        let outcome = service.import_csv(csv.as_bytes()).await.unwrap();
        assert_eq!(outcome.imported, 0);
        assert_eq!(outcome.errors.len(), 3);
        assert_eq!(outcome.errors[0], "Row 2: Invalid age");
        assert!(outcome.errors[1].starts_with("Row 3:"));
        assert_eq!(outcome.errors[2], "Row 4: Name is required");
    }

    #[tokio::test]
    async fn test_empty_file_imports_nothing() {
        let (service, _) = setup_test().await;

        let outcome = service.import_csv(format!("{HEADER}\n").as_bytes()).await.unwrap();
        assert_eq!(outcome.imported, 0);
        assert!(outcome.errors.is_empty());
    }
}
