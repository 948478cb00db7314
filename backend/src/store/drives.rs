use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use shared::{DriveStatus, VaccinationDrive};
use sqlx::{sqlite::SqliteRow, QueryBuilder, Row, Sqlite};

use crate::db::DbConnection;

/// Filters for the drive listing. The `upcoming` query flag is resolved into
/// `status` + `date_range` by the service before it reaches the store.
#[derive(Debug, Clone, Default)]
pub struct DriveListFilter {
    pub status: Option<DriveStatus>,
    /// Case-insensitive substring match.
    pub vaccine_name: Option<String>,
    /// Inclusive calendar-date window.
    pub date_range: Option<(NaiveDate, NaiveDate)>,
}

#[derive(Clone)]
pub struct DriveStore {
    db: DbConnection,
}

impl DriveStore {
    pub fn new(db: DbConnection) -> Self {
        Self { db }
    }

    pub async fn insert(&self, drive: &VaccinationDrive) -> Result<()> {
        sqlx::query(
            "INSERT INTO vaccination_drives
             (id, vaccine_name, drive_date, available_doses, applicable_classes, status, description, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&drive.id)
        .bind(&drive.vaccine_name)
        .bind(drive.drive_date)
        .bind(drive.available_doses as i64)
        .bind(serde_json::to_string(&drive.applicable_classes)?)
        .bind(drive.status.as_str())
        .bind(&drive.description)
        .bind(drive.created_at)
        .bind(drive.updated_at)
        .execute(self.db.pool())
        .await?;

        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Option<VaccinationDrive>> {
        let row = sqlx::query("SELECT * FROM vaccination_drives WHERE id = ?")
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;

        row.as_ref().map(row_to_drive).transpose()
    }

    pub async fn update(&self, drive: &VaccinationDrive) -> Result<()> {
        sqlx::query(
            "UPDATE vaccination_drives
             SET vaccine_name = ?, drive_date = ?, available_doses = ?, applicable_classes = ?,
                 status = ?, description = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&drive.vaccine_name)
        .bind(drive.drive_date)
        .bind(drive.available_doses as i64)
        .bind(serde_json::to_string(&drive.applicable_classes)?)
        .bind(drive.status.as_str())
        .bind(&drive.description)
        .bind(drive.updated_at)
        .bind(&drive.id)
        .execute(self.db.pool())
        .await?;

        Ok(())
    }

    pub async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM vaccination_drives WHERE id = ?")
            .bind(id)
            .execute(self.db.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// All drives on the given calendar day, any vaccine. Used by the
    /// duplicate-drive rule.
    pub async fn on_same_day(&self, date: NaiveDate) -> Result<Vec<VaccinationDrive>> {
        let rows = sqlx::query("SELECT * FROM vaccination_drives WHERE drive_date = ?")
            .bind(date)
            .fetch_all(self.db.pool())
            .await?;

        rows.iter().map(row_to_drive).collect()
    }

    /// Filtered listing, by drive date ascending, 1-indexed pagination.
    pub async fn list(
        &self,
        filter: &DriveListFilter,
        page: u32,
        page_size: u32,
    ) -> Result<(Vec<VaccinationDrive>, i64)> {
        let offset = (page.saturating_sub(1) as i64) * page_size as i64;

        let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM vaccination_drives WHERE 1=1");
        apply_filters(&mut qb, filter);
        qb.push(" ORDER BY drive_date ASC LIMIT ")
            .push_bind(page_size as i64)
            .push(" OFFSET ")
            .push_bind(offset);

        let rows = qb.build().fetch_all(self.db.pool()).await?;
        let drives = rows.iter().map(row_to_drive).collect::<Result<Vec<_>>>()?;

        let mut count_qb =
            QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM vaccination_drives WHERE 1=1");
        apply_filters(&mut count_qb, filter);
        let total: i64 = count_qb.build_query_scalar().fetch_one(self.db.pool()).await?;

        Ok((drives, total))
    }

    /// Scheduled drives inside the window, soonest first.
    pub async fn upcoming(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        limit: Option<u32>,
    ) -> Result<Vec<VaccinationDrive>> {
        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT * FROM vaccination_drives WHERE status = 'Scheduled' AND drive_date >= ",
        );
        qb.push_bind(from).push(" AND drive_date <= ").push_bind(to);
        qb.push(" ORDER BY drive_date ASC");
        if let Some(limit) = limit {
            qb.push(" LIMIT ").push_bind(limit as i64);
        }

        let rows = qb.build().fetch_all(self.db.pool()).await?;
        rows.iter().map(row_to_drive).collect()
    }

    /// Doses still available across Scheduled drives inside the window.
    pub async fn upcoming_available_doses(&self, from: NaiveDate, to: NaiveDate) -> Result<i64> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(available_doses), 0) FROM vaccination_drives
             WHERE status = 'Scheduled' AND available_doses > 0
               AND drive_date >= ? AND drive_date <= ?",
        )
        .bind(from)
        .bind(to)
        .fetch_one(self.db.pool())
        .await?;

        Ok(total)
    }
}

fn apply_filters(qb: &mut QueryBuilder<'_, Sqlite>, filter: &DriveListFilter) {
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(name) = &filter.vaccine_name {
        qb.push(" AND LOWER(vaccine_name) LIKE ")
            .push_bind(format!("%{}%", name.to_lowercase()));
    }
    if let Some((from, to)) = filter.date_range {
        qb.push(" AND drive_date >= ")
            .push_bind(from)
            .push(" AND drive_date <= ")
            .push_bind(to);
    }
}

fn row_to_drive(row: &SqliteRow) -> Result<VaccinationDrive> {
    let status: String = row.try_get("status")?;
    let classes: String = row.try_get("applicable_classes")?;

    Ok(VaccinationDrive {
        id: row.try_get("id")?,
        vaccine_name: row.try_get("vaccine_name")?,
        drive_date: row.try_get("drive_date")?,
        available_doses: row.try_get::<i64, _>("available_doses")? as u32,
        applicable_classes: serde_json::from_str(&classes)?,
        status: status.parse().map_err(|e: String| anyhow!(e))?,
        description: row.try_get("description")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
