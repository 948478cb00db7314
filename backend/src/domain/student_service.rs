use chrono::{DateTime, Utc};
use shared::{NewStudent, Student, UpdateStudent};
use tracing::info;
use uuid::Uuid;

use crate::error::ApiError;
use crate::store::students::{StudentListFilter, StudentStore};

/// Service for managing student records.
#[derive(Clone)]
pub struct StudentService {
    students: StudentStore,
}

impl StudentService {
    pub fn new(students: StudentStore) -> Self {
        Self { students }
    }

    /// Create a new student. The external student id must be unused.
    pub async fn create(&self, new: NewStudent) -> Result<Student, ApiError> {
        info!("Creating student: {}", new.student_id);

        validate_new_student(&new).map_err(ApiError::Validation)?;

        let student_id = new.student_id.trim();
        if self.students.find_by_student_id(student_id).await?.is_some() {
            return Err(ApiError::Validation(format!(
                "Student with ID {student_id} already exists"
            )));
        }

        let student = student_from_new(new, Utc::now());
        self.students.insert(&student).await?;

        info!("Created student {} with id {}", student.student_id, student.id);
        Ok(student)
    }

    pub async fn get(&self, id: &str) -> Result<Student, ApiError> {
        self.students.get(id).await?.ok_or(ApiError::NotFound("Student"))
    }

    /// Apply a partial update to the descriptive fields. `student_id` and the
    /// vaccination history are immutable here.
    pub async fn update(&self, id: &str, update: UpdateStudent) -> Result<Student, ApiError> {
        info!("Updating student: {id}");

        let mut student = self.students.get(id).await?.ok_or(ApiError::NotFound("Student"))?;

        if let Some(name) = update.name {
            student.name = require_field(name, "Name")?;
        }
        if let Some(class_name) = update.class_name {
            student.class_name = require_field(class_name, "Class")?;
        }
        if let Some(grade_section) = update.grade_section {
            student.grade_section = require_field(grade_section, "Grade/section")?;
        }
        if let Some(age) = update.age {
            validate_age(age).map_err(ApiError::Validation)?;
            student.age = age;
        }
        if let Some(gender) = update.gender {
            student.gender = gender;
        }
        if let Some(parent_name) = update.parent_name {
            student.parent_name = require_field(parent_name, "Parent name")?;
        }
        if let Some(contact_number) = update.contact_number {
            student.contact_number = require_field(contact_number, "Contact number")?;
        }

        student.updated_at = Utc::now();
        self.students.update(&student).await?;

        Ok(student)
    }

    /// Hard delete; there is no archival.
    pub async fn delete(&self, id: &str) -> Result<(), ApiError> {
        info!("Deleting student: {id}");

        if !self.students.delete(id).await? {
            return Err(ApiError::NotFound("Student"));
        }
        Ok(())
    }

    pub async fn list(
        &self,
        filter: &StudentListFilter,
        page: u32,
        page_size: u32,
    ) -> Result<(Vec<Student>, i64), ApiError> {
        let (students, total) = self.students.list(filter, page, page_size).await?;
        Ok((students, total))
    }
}

/// Build the stored record from a validated creation request.
pub(crate) fn student_from_new(new: NewStudent, now: DateTime<Utc>) -> Student {
    Student {
        id: Uuid::new_v4().to_string(),
        student_id: new.student_id.trim().to_string(),
        name: new.name.trim().to_string(),
        class_name: new.class_name.trim().to_string(),
        grade_section: new.grade_section.trim().to_string(),
        age: new.age,
        gender: new.gender,
        parent_name: new.parent_name.trim().to_string(),
        contact_number: new.contact_number.trim().to_string(),
        vaccinations: new.vaccinations,
        created_at: now,
        updated_at: now,
    }
}

/// Field-level validation shared by the create endpoint and the bulk import.
pub(crate) fn validate_new_student(new: &NewStudent) -> Result<(), String> {
    if new.student_id.trim().is_empty() {
        return Err("Student ID is required".to_string());
    }
    if new.name.trim().is_empty() {
        return Err("Name is required".to_string());
    }
    if new.class_name.trim().is_empty() {
        return Err("Class is required".to_string());
    }
    if new.grade_section.trim().is_empty() {
        return Err("Grade/section is required".to_string());
    }
    if new.parent_name.trim().is_empty() {
        return Err("Parent name is required".to_string());
    }
    if new.contact_number.trim().is_empty() {
        return Err("Contact number is required".to_string());
    }
    validate_age(new.age)
}

fn validate_age(age: u32) -> Result<(), String> {
    if !(1..=120).contains(&age) {
        return Err("Age must be between 1 and 120".to_string());
    }
    Ok(())
}

fn require_field(value: String, label: &str) -> Result<String, ApiError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ApiError::Validation(format!("{label} is required")));
    }
    Ok(trimmed.to_string())
}
