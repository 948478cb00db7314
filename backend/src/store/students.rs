use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use shared::{
    ClassVaccinationStats, MonthlyTrend, Student, VaccinationRecord, VaccinationStatus,
    VaccineTypeCount,
};
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, Sqlite};

use crate::db::DbConnection;

/// Filters for the student listing.
#[derive(Debug, Clone, Default)]
pub struct StudentListFilter {
    /// Case-insensitive substring match.
    pub name: Option<String>,
    /// Case-insensitive substring match.
    pub student_id: Option<String>,
    /// Exact match.
    pub class_name: Option<String>,
    /// "vaccinated" (has a Completed record) or "not-vaccinated"; other
    /// values are ignored.
    pub vaccination_status: Option<String>,
}

/// Filters for the vaccination report. A student is included when at least
/// one record matches every supplied filter; `until` is an exclusive upper
/// bound so a whole calendar day can be included.
#[derive(Debug, Clone, Default)]
pub struct ReportFilter {
    /// Exact vaccine name.
    pub vaccine_name: Option<String>,
    pub status: Option<VaccinationStatus>,
    pub from: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl ReportFilter {
    /// Whether a single record matches every supplied filter.
    pub fn matches(&self, record: &VaccinationRecord) -> bool {
        if let Some(name) = &self.vaccine_name {
            if &record.vaccine_name != name {
                return false;
            }
        }
        if let Some(status) = self.status {
            if record.status != status {
                return false;
            }
        }
        if let Some(from) = self.from {
            if record.date_administered < from {
                return false;
            }
        }
        if let Some(until) = self.until {
            if record.date_administered >= until {
                return false;
            }
        }
        true
    }
}

#[derive(Clone)]
pub struct StudentStore {
    db: DbConnection,
}

impl StudentStore {
    pub fn new(db: DbConnection) -> Self {
        Self { db }
    }

    /// Insert a student together with any embedded vaccination records
    /// (bulk import rows may carry a history).
    pub async fn insert(&self, student: &Student) -> Result<()> {
        let mut tx = self.db.pool().begin().await?;

        sqlx::query(
            "INSERT INTO students
             (id, student_id, name, class, grade_section, age, gender, parent_name, contact_number, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&student.id)
        .bind(&student.student_id)
        .bind(&student.name)
        .bind(&student.class_name)
        .bind(&student.grade_section)
        .bind(student.age as i64)
        .bind(student.gender.as_str())
        .bind(&student.parent_name)
        .bind(&student.contact_number)
        .bind(student.created_at)
        .bind(student.updated_at)
        .execute(&mut *tx)
        .await?;

        for record in &student.vaccinations {
            sqlx::query(
                "INSERT INTO vaccinations (student_id, drive_id, vaccine_name, date_administered, status)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&student.id)
            .bind(&record.drive_id)
            .bind(&record.vaccine_name)
            .bind(record.date_administered)
            .bind(record.status.as_str())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Option<Student>> {
        let row = sqlx::query("SELECT * FROM students WHERE id = ?")
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;

        match row {
            Some(row) => {
                let mut student = row_to_student(&row)?;
                student.vaccinations = self.vaccinations_of(&student.id).await?;
                Ok(Some(student))
            }
            None => Ok(None),
        }
    }

    /// Exact lookup by the externally assigned student id.
    pub async fn find_by_student_id(&self, student_id: &str) -> Result<Option<Student>> {
        let row = sqlx::query("SELECT * FROM students WHERE student_id = ?")
            .bind(student_id)
            .fetch_optional(self.db.pool())
            .await?;

        match row {
            Some(row) => {
                let mut student = row_to_student(&row)?;
                student.vaccinations = self.vaccinations_of(&student.id).await?;
                Ok(Some(student))
            }
            None => Ok(None),
        }
    }

    /// Update scalar fields. Vaccination records are only ever written by
    /// `insert` (import) and the vaccination transaction.
    pub async fn update(&self, student: &Student) -> Result<()> {
        sqlx::query(
            "UPDATE students
             SET name = ?, class = ?, grade_section = ?, age = ?, gender = ?,
                 parent_name = ?, contact_number = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&student.name)
        .bind(&student.class_name)
        .bind(&student.grade_section)
        .bind(student.age as i64)
        .bind(student.gender.as_str())
        .bind(&student.parent_name)
        .bind(&student.contact_number)
        .bind(student.updated_at)
        .bind(&student.id)
        .execute(self.db.pool())
        .await?;

        Ok(())
    }

    /// Hard delete, history included.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let mut tx = self.db.pool().begin().await?;

        sqlx::query("DELETE FROM vaccinations WHERE student_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM students WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    /// Filtered listing, by student id ascending, 1-indexed pagination.
    pub async fn list(
        &self,
        filter: &StudentListFilter,
        page: u32,
        page_size: u32,
    ) -> Result<(Vec<Student>, i64)> {
        let offset = (page.saturating_sub(1) as i64) * page_size as i64;

        let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM students WHERE 1=1");
        apply_filters(&mut qb, filter);
        qb.push(" ORDER BY student_id ASC LIMIT ")
            .push_bind(page_size as i64)
            .push(" OFFSET ")
            .push_bind(offset);

        let rows = qb.build().fetch_all(self.db.pool()).await?;
        let mut students = rows.iter().map(row_to_student).collect::<Result<Vec<_>>>()?;
        for student in &mut students {
            student.vaccinations = self.vaccinations_of(&student.id).await?;
        }

        let mut count_qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM students WHERE 1=1");
        apply_filters(&mut count_qb, filter);
        let total: i64 = count_qb.build_query_scalar().fetch_one(self.db.pool()).await?;

        Ok((students, total))
    }

    /// Every student with their history, by student id ascending. Used by the
    /// eligibility listings, which are pure filters over the full roster.
    pub async fn all(&self) -> Result<Vec<Student>> {
        let rows = sqlx::query("SELECT * FROM students ORDER BY student_id ASC")
            .fetch_all(self.db.pool())
            .await?;

        let mut students = rows.iter().map(row_to_student).collect::<Result<Vec<_>>>()?;
        for student in &mut students {
            student.vaccinations = self.vaccinations_of(&student.id).await?;
        }

        Ok(students)
    }

    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM students")
            .fetch_one(self.db.pool())
            .await?;
        Ok(count)
    }

    /// Students with at least one Completed record.
    pub async fn count_vaccinated(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM students s
             WHERE EXISTS (SELECT 1 FROM vaccinations v
                           WHERE v.student_id = s.id AND v.status = 'Completed')",
        )
        .fetch_one(self.db.pool())
        .await?;
        Ok(count)
    }

    /// Distinct students vaccinated by this exact drive.
    pub async fn count_vaccinated_for_drive(&self, drive_id: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(DISTINCT student_id) FROM vaccinations
             WHERE drive_id = ? AND status = 'Completed'",
        )
        .bind(drive_id)
        .fetch_one(self.db.pool())
        .await?;
        Ok(count)
    }

    /// Completed vaccinations grouped by vaccine name, most frequent first.
    pub async fn vaccine_type_counts(&self) -> Result<Vec<VaccineTypeCount>> {
        let rows = sqlx::query(
            "SELECT vaccine_name, COUNT(*) AS count FROM vaccinations
             WHERE status = 'Completed'
             GROUP BY vaccine_name
             ORDER BY count DESC",
        )
        .fetch_all(self.db.pool())
        .await?;

        rows.iter()
            .map(|row| {
                Ok(VaccineTypeCount {
                    vaccine_name: row.try_get("vaccine_name")?,
                    count: row.try_get("count")?,
                })
            })
            .collect()
    }

    /// Coverage per class, sorted by class label.
    pub async fn class_stats(&self) -> Result<Vec<ClassVaccinationStats>> {
        let rows = sqlx::query(
            "SELECT class,
                    COUNT(*) AS total_students,
                    SUM(CASE WHEN EXISTS (SELECT 1 FROM vaccinations v
                                          WHERE v.student_id = students.id
                                            AND v.status = 'Completed')
                        THEN 1 ELSE 0 END) AS vaccinated_students
             FROM students
             GROUP BY class
             ORDER BY class ASC",
        )
        .fetch_all(self.db.pool())
        .await?;

        rows.iter()
            .map(|row| {
                let total: i64 = row.try_get("total_students")?;
                let vaccinated: i64 = row.try_get("vaccinated_students")?;
                Ok(ClassVaccinationStats {
                    class_name: row.try_get("class")?,
                    total_students: total,
                    vaccinated_students: vaccinated,
                    vaccination_percentage: vaccinated as f64 * 100.0 / total as f64,
                })
            })
            .collect()
    }

    /// Completed vaccinations since the given instant, grouped by calendar
    /// month and vaccine, chronological.
    pub async fn monthly_trends(&self, since: DateTime<Utc>) -> Result<Vec<MonthlyTrend>> {
        let rows = sqlx::query(
            "SELECT strftime('%Y', date_administered) AS year,
                    CAST(strftime('%m', date_administered) AS INTEGER) AS month,
                    vaccine_name,
                    COUNT(*) AS count
             FROM vaccinations
             WHERE status = 'Completed' AND date_administered >= ?
             GROUP BY year, month, vaccine_name
             ORDER BY year ASC, month ASC",
        )
        .bind(since)
        .fetch_all(self.db.pool())
        .await?;

        rows.iter()
            .map(|row| {
                let year: String = row.try_get("year")?;
                let month: i64 = row.try_get("month")?;
                Ok(MonthlyTrend {
                    month: format!("{month}/{year}"),
                    vaccine: row.try_get("vaccine_name")?,
                    count: row.try_get("count")?,
                })
            })
            .collect()
    }

    /// Students with at least one record matching every supplied report
    /// filter, by name ascending. Histories come back unfiltered; the caller
    /// trims them to the matching records.
    pub async fn report(
        &self,
        filter: &ReportFilter,
        page: u32,
        page_size: u32,
    ) -> Result<(Vec<Student>, i64)> {
        let offset = (page.saturating_sub(1) as i64) * page_size as i64;

        let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM students WHERE ");
        push_report_exists(&mut qb, filter);
        qb.push(" ORDER BY name ASC LIMIT ")
            .push_bind(page_size as i64)
            .push(" OFFSET ")
            .push_bind(offset);

        let rows = qb.build().fetch_all(self.db.pool()).await?;
        let mut students = rows.iter().map(row_to_student).collect::<Result<Vec<_>>>()?;
        for student in &mut students {
            student.vaccinations = self.vaccinations_of(&student.id).await?;
        }

        let mut count_qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM students WHERE ");
        push_report_exists(&mut count_qb, filter);
        let total: i64 = count_qb.build_query_scalar().fetch_one(self.db.pool()).await?;

        Ok((students, total))
    }

    /// A student's records in administration (insertion) order.
    async fn vaccinations_of(&self, student_id: &str) -> Result<Vec<VaccinationRecord>> {
        let rows = sqlx::query(
            "SELECT drive_id, vaccine_name, date_administered, status
             FROM vaccinations WHERE student_id = ? ORDER BY id ASC",
        )
        .bind(student_id)
        .fetch_all(self.db.pool())
        .await?;

        rows.iter()
            .map(|row| {
                let status: String = row.try_get("status")?;
                Ok(VaccinationRecord {
                    drive_id: row.try_get("drive_id")?,
                    vaccine_name: row.try_get("vaccine_name")?,
                    date_administered: row.try_get("date_administered")?,
                    status: status.parse().map_err(|e: String| anyhow!(e))?,
                })
            })
            .collect()
    }
}

fn apply_filters(qb: &mut QueryBuilder<'_, Sqlite>, filter: &StudentListFilter) {
    if let Some(name) = &filter.name {
        qb.push(" AND LOWER(name) LIKE ")
            .push_bind(format!("%{}%", name.to_lowercase()));
    }
    if let Some(student_id) = &filter.student_id {
        qb.push(" AND LOWER(student_id) LIKE ")
            .push_bind(format!("%{}%", student_id.to_lowercase()));
    }
    if let Some(class_name) = &filter.class_name {
        qb.push(" AND class = ").push_bind(class_name.clone());
    }
    match filter.vaccination_status.as_deref() {
        Some("vaccinated") => {
            qb.push(
                " AND EXISTS (SELECT 1 FROM vaccinations v
                              WHERE v.student_id = students.id AND v.status = 'Completed')",
            );
        }
        Some("not-vaccinated") => {
            qb.push(
                " AND NOT EXISTS (SELECT 1 FROM vaccinations v
                                  WHERE v.student_id = students.id AND v.status = 'Completed')",
            );
        }
        _ => {}
    }
}

fn push_report_exists(qb: &mut QueryBuilder<'_, Sqlite>, filter: &ReportFilter) {
    qb.push("EXISTS (SELECT 1 FROM vaccinations v WHERE v.student_id = students.id");
    if let Some(name) = &filter.vaccine_name {
        qb.push(" AND v.vaccine_name = ").push_bind(name.clone());
    }
    if let Some(status) = filter.status {
        qb.push(" AND v.status = ").push_bind(status.as_str());
    }
    if let Some(from) = filter.from {
        qb.push(" AND v.date_administered >= ").push_bind(from);
    }
    if let Some(until) = filter.until {
        qb.push(" AND v.date_administered < ").push_bind(until);
    }
    qb.push(")");
}

fn row_to_student(row: &SqliteRow) -> Result<Student> {
    let gender: String = row.try_get("gender")?;

    Ok(Student {
        id: row.try_get("id")?,
        student_id: row.try_get("student_id")?,
        name: row.try_get("name")?,
        class_name: row.try_get("class")?,
        grade_section: row.try_get("grade_section")?,
        age: row.try_get::<i64, _>("age")? as u32,
        gender: gender.parse().map_err(|e: String| anyhow!(e))?,
        parent_name: row.try_get("parent_name")?,
        contact_number: row.try_get("contact_number")?,
        vaccinations: Vec::new(),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
