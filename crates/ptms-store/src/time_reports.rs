use chrono::NaiveDate;
use rusqlite::{params, Connection};

use ptms_shared::types::UserId;

use crate::database::Database;
use crate::error::Result;
use crate::models::TimeReport;

const DATE_FORMAT: &str = "%Y-%m-%d";

impl Database {
    /// Insert or overwrite a single submitted time report.
    pub fn insert_time_report(&self, report: &TimeReport) -> Result<()> {
        write_report(self.conn(), report)?;
        Ok(())
    }

    /// Replace every cached report of `owner_id` with `reports`.
    pub fn replace_time_reports(&mut self, owner_id: UserId, reports: &[TimeReport]) -> Result<usize> {
        let tx = self.conn_mut().transaction()?;
        tx.execute(
            "DELETE FROM time_reports WHERE owner_id = ?1",
            params![owner_id.0],
        )?;
        for report in reports {
            write_report(&tx, report)?;
        }
        tx.commit()?;

        tracing::debug!(owner = %owner_id, count = reports.len(), "replaced time reports");
        Ok(reports.len())
    }

    /// Reports of one owner, newest work date first.
    pub fn list_time_reports(&self, owner_id: UserId) -> Result<Vec<TimeReport>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, owner_id, project_id, work_type_id, work_date, hours, description
             FROM time_reports
             WHERE owner_id = ?1
             ORDER BY work_date DESC, id DESC",
        )?;

        let rows = stmt.query_map(params![owner_id.0], row_to_report)?;

        let mut reports = Vec::new();
        for row in rows {
            reports.push(row?);
        }
        Ok(reports)
    }

    /// Total hours booked by `owner_id`; zero when nothing is cached.
    pub fn sum_hours(&self, owner_id: UserId) -> Result<f64> {
        let total: f64 = self.conn().query_row(
            "SELECT COALESCE(SUM(hours), 0.0) FROM time_reports WHERE owner_id = ?1",
            params![owner_id.0],
            |row| row.get(0),
        )?;
        Ok(total)
    }
}

fn write_report(conn: &Connection, report: &TimeReport) -> rusqlite::Result<usize> {
    conn.execute(
        "INSERT OR REPLACE INTO time_reports
             (id, owner_id, project_id, work_type_id, work_date, hours, description)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            report.id,
            report.owner_id.0,
            report.project_id,
            report.work_type_id,
            report.work_date.format(DATE_FORMAT).to_string(),
            report.hours,
            report.description,
        ],
    )
}

fn row_to_report(row: &rusqlite::Row<'_>) -> rusqlite::Result<TimeReport> {
    let date_str: String = row.get(4)?;
    let work_date = NaiveDate::parse_from_str(&date_str, DATE_FORMAT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(TimeReport {
        id: row.get(0)?,
        owner_id: UserId(row.get(1)?),
        project_id: row.get(2)?,
        work_type_id: row.get(3)?,
        work_date,
        hours: row.get(5)?,
        description: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(id: i64, owner: i64, day: u32, hours: f64) -> TimeReport {
        TimeReport {
            id,
            owner_id: UserId(owner),
            project_id: 1,
            work_type_id: 2,
            work_date: NaiveDate::from_ymd_opt(2024, 3, day).unwrap(),
            hours,
            description: Some(format!("entry {id}")),
        }
    }

    #[test]
    fn sum_hours_is_per_owner() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("t.db")).unwrap();

        db.insert_time_report(&report(1, 7, 1, 7.5)).unwrap();
        db.insert_time_report(&report(2, 7, 2, 0.5)).unwrap();
        db.insert_time_report(&report(3, 8, 2, 4.0)).unwrap();

        assert_eq!(db.sum_hours(UserId(7)).unwrap(), 8.0);
        assert_eq!(db.sum_hours(UserId(8)).unwrap(), 4.0);
        assert_eq!(db.sum_hours(UserId(99)).unwrap(), 0.0);
    }

    #[test]
    fn replace_only_touches_the_owner() {
        let dir = tempfile::tempdir().unwrap();
        let mut db = Database::open_at(&dir.path().join("t.db")).unwrap();

        db.insert_time_report(&report(1, 7, 1, 2.0)).unwrap();
        db.insert_time_report(&report(2, 8, 1, 3.0)).unwrap();

        db.replace_time_reports(UserId(7), &[report(10, 7, 4, 1.0), report(11, 7, 5, 1.5)])
            .unwrap();

        let mine = db.list_time_reports(UserId(7)).unwrap();
        assert_eq!(mine.iter().map(|r| r.id).collect::<Vec<_>>(), vec![11, 10]);
        assert_eq!(db.list_time_reports(UserId(8)).unwrap().len(), 1);
    }

    #[test]
    fn negative_hours_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("t.db")).unwrap();

        assert!(db.insert_time_report(&report(1, 7, 1, -1.0)).is_err());
    }
}
