use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use crate::auth::{hash_password, Role};
use crate::models::{PerformanceRecord, Semester, StudentProfile};

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: i64,
    pub roll_number: String,
    pub password_hash: String,
    pub role: String,
}

pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// In-memory SQLite store. A single connection keeps the database shared
    /// and alive for the process lifetime; each connection to
    /// `sqlite::memory:` would otherwise see its own empty database.
    pub async fn connect() -> Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        let store = Store { pool };
        store.create_schema().await?;
        Ok(store)
    }

    async fn create_schema(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                roll_number TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                role TEXT NOT NULL CHECK(role IN ('admin','teacher','student'))
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS students (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES users(id),
                name TEXT NOT NULL,
                department TEXT NOT NULL,
                section TEXT NOT NULL,
                batch TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS semesters (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                academic_year TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS enrollments (
                student_id INTEGER NOT NULL REFERENCES students(id),
                semester_id INTEGER NOT NULL REFERENCES semesters(id),
                UNIQUE(student_id, semester_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS performance (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                student_id TEXT NOT NULL,
                subject TEXT NOT NULL,
                semester TEXT NOT NULL,
                marks REAL NOT NULL,
                attendance REAL NOT NULL,
                recorded_at TEXT NOT NULL,
                UNIQUE(student_id, subject, semester)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Default accounts plus a small realistic spread of performance rows so
    /// the analytics views have something to show before the first upload.
    pub async fn seed(&self) -> Result<(), sqlx::Error> {
        let users = [
            ("admin", "admin123", Role::Admin),
            ("teacher1", "teach123", Role::Teacher),
        ];
        for (roll, password, role) in users {
            sqlx::query(
                "INSERT OR IGNORE INTO users (roll_number, password_hash, role) VALUES (?, ?, ?)",
            )
            .bind(roll)
            .bind(hash_password(password))
            .bind(role.as_str())
            .execute(&self.pool)
            .await?;
        }

        let rows: [(&str, &str, &str, f64, f64); 9] = [
            ("STU001", "Maths", "1", 82.0, 91.0),
            ("STU001", "Physics", "1", 74.0, 88.0),
            ("STU001", "Maths", "2", 86.0, 93.0),
            ("STU002", "Maths", "1", 36.0, 72.0),
            ("STU002", "Physics", "1", 41.0, 69.0),
            ("STU002", "Maths", "2", 33.0, 66.0),
            ("STU003", "Maths", "1", 58.0, 81.0),
            ("STU003", "Physics", "1", 61.0, 84.0),
            ("STU003", "Maths", "2", 64.0, 86.0),
        ];
        for (roll, subject, semester, marks, attendance) in rows {
            self.get_or_create_student(roll).await?;
            self.upsert_performance(&PerformanceRecord {
                student_id: roll.to_string(),
                subject: subject.to_string(),
                semester: semester.to_string(),
                marks,
                attendance,
                recorded_at: Utc::now(),
            })
            .await?;
        }

        Ok(())
    }

    pub async fn find_user(&self, roll_number: &str) -> Result<Option<UserRow>, sqlx::Error> {
        let row = sqlx::query(
            "SELECT id, roll_number, password_hash, role FROM users WHERE roll_number = ?",
        )
        .bind(roll_number)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| UserRow {
            id: row.get("id"),
            roll_number: row.get("roll_number"),
            password_hash: row.get("password_hash"),
            role: row.get("role"),
        }))
    }

    /// Looks up the student account for a roll number, creating the user and
    /// profile with placeholder details when a CSV mentions an unknown
    /// student.
    pub async fn get_or_create_student(&self, roll_number: &str) -> Result<i64, sqlx::Error> {
        let user_id = match self.find_user(roll_number).await? {
            Some(user) => user.id,
            None => {
                sqlx::query("INSERT INTO users (roll_number, password_hash, role) VALUES (?, ?, 'student')")
                    .bind(roll_number)
                    .bind(hash_password("changeme"))
                    .execute(&self.pool)
                    .await?
                    .last_insert_rowid()
            }
        };

        let existing = sqlx::query("SELECT id FROM students WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        if let Some(row) = existing {
            return Ok(row.get("id"));
        }

        let id = sqlx::query(
            "INSERT INTO students (user_id, name, department, section, batch) VALUES (?, ?, 'GENERAL', 'A', '2024')",
        )
        .bind(user_id)
        .bind(roll_number)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();
        Ok(id)
    }

    /// Creates a full student account from an admin roster row. Returns None
    /// when the roll number is already taken.
    pub async fn create_student_account(
        &self,
        roll_number: &str,
        name: &str,
        department: &str,
        section: &str,
        batch: &str,
        password_hash: &str,
    ) -> Result<Option<i64>, sqlx::Error> {
        if self.find_user(roll_number).await?.is_some() {
            return Ok(None);
        }

        let user_id = sqlx::query(
            "INSERT INTO users (roll_number, password_hash, role) VALUES (?, ?, 'student')",
        )
        .bind(roll_number)
        .bind(password_hash)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        let student_id = sqlx::query(
            "INSERT INTO students (user_id, name, department, section, batch) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(name)
        .bind(department)
        .bind(section)
        .bind(batch)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        Ok(Some(student_id))
    }

    /// Insert-or-update keyed on (student, subject, semester), mirroring the
    /// upload semantics: re-uploading a sheet refreshes marks in place.
    /// Returns true when a new row was inserted.
    pub async fn upsert_performance(&self, record: &PerformanceRecord) -> Result<bool, sqlx::Error> {
        let existing = sqlx::query(
            "SELECT id FROM performance WHERE student_id = ? AND subject = ? AND semester = ?",
        )
        .bind(&record.student_id)
        .bind(&record.subject)
        .bind(&record.semester)
        .fetch_optional(&self.pool)
        .await?;

        match existing {
            Some(row) => {
                let id: i64 = row.get("id");
                sqlx::query("UPDATE performance SET marks = ?, attendance = ?, recorded_at = ? WHERE id = ?")
                    .bind(record.marks)
                    .bind(record.attendance)
                    .bind(record.recorded_at)
                    .bind(id)
                    .execute(&self.pool)
                    .await?;
                Ok(false)
            }
            None => {
                sqlx::query(
                    r#"
                    INSERT INTO performance (student_id, subject, semester, marks, attendance, recorded_at)
                    VALUES (?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(&record.student_id)
                .bind(&record.subject)
                .bind(&record.semester)
                .bind(record.marks)
                .bind(record.attendance)
                .bind(record.recorded_at)
                .execute(&self.pool)
                .await?;
                Ok(true)
            }
        }
    }

    pub async fn all_performance(&self) -> Result<Vec<PerformanceRecord>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT student_id, subject, semester, marks, attendance, recorded_at FROM performance ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(record_from_row).collect())
    }

    pub async fn performance_for_student(
        &self,
        roll_number: &str,
    ) -> Result<Vec<PerformanceRecord>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT student_id, subject, semester, marks, attendance, recorded_at
            FROM performance WHERE student_id = ? ORDER BY semester, recorded_at
            "#,
        )
        .bind(roll_number)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(record_from_row).collect())
    }

    pub async fn create_semester(&self, name: &str, academic_year: &str) -> Result<i64, sqlx::Error> {
        let id = sqlx::query("INSERT INTO semesters (name, academic_year) VALUES (?, ?)")
            .bind(name)
            .bind(academic_year)
            .execute(&self.pool)
            .await?
            .last_insert_rowid();
        Ok(id)
    }

    pub async fn list_semesters(&self) -> Result<Vec<Semester>, sqlx::Error> {
        let rows = sqlx::query("SELECT id, name, academic_year FROM semesters ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| Semester {
                id: row.get("id"),
                name: row.get("name"),
                academic_year: row.get("academic_year"),
            })
            .collect())
    }

    pub async fn list_students(&self) -> Result<Vec<StudentProfile>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT s.id, u.roll_number, s.name, s.department, s.section, s.batch
            FROM students s JOIN users u ON s.user_id = u.id
            ORDER BY s.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| StudentProfile {
                id: row.get("id"),
                roll_number: row.get("roll_number"),
                name: row.get("name"),
                department: row.get("department"),
                section: row.get("section"),
                batch: row.get("batch"),
            })
            .collect())
    }

    pub async fn enroll(&self, student_id: i64, semester_id: i64) -> Result<(), sqlx::Error> {
        sqlx::query("INSERT OR IGNORE INTO enrollments (student_id, semester_id) VALUES (?, ?)")
            .bind(student_id)
            .bind(semester_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn record_from_row(row: sqlx::sqlite::SqliteRow) -> PerformanceRecord {
    PerformanceRecord {
        student_id: row.get("student_id"),
        subject: row.get("subject"),
        semester: row.get("semester"),
        marks: row.get("marks"),
        attendance: row.get("attendance"),
        recorded_at: row.get::<DateTime<Utc>, _>("recorded_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn seed_populates_accounts_and_rows() {
        let store = Store::connect().await.unwrap();
        store.seed().await.unwrap();

        let teacher = store.find_user("teacher1").await.unwrap().unwrap();
        assert_eq!(teacher.role, "teacher");

        let records = store.all_performance().await.unwrap();
        assert_eq!(records.len(), 9);

        // seeded CSV students get placeholder accounts
        let stu = store.find_user("STU001").await.unwrap().unwrap();
        assert_eq!(stu.role, "student");
    }

    #[tokio::test]
    async fn upsert_updates_in_place() {
        let store = Store::connect().await.unwrap();
        let mut record = PerformanceRecord {
            student_id: "STU900".to_string(),
            subject: "Maths".to_string(),
            semester: "1".to_string(),
            marks: 50.0,
            attendance: 80.0,
            recorded_at: Utc::now(),
        };

        assert!(store.upsert_performance(&record).await.unwrap());
        record.marks = 65.0;
        assert!(!store.upsert_performance(&record).await.unwrap());

        let rows = store.performance_for_student("STU900").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].marks, 65.0);
    }

    #[tokio::test]
    async fn duplicate_roster_rows_are_rejected() {
        let store = Store::connect().await.unwrap();
        let first = store
            .create_student_account("STU800", "Asha", "CSE", "A", "2024", "hash")
            .await
            .unwrap();
        assert!(first.is_some());
        let second = store
            .create_student_account("STU800", "Asha", "CSE", "A", "2024", "hash")
            .await
            .unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn semesters_round_trip() {
        let store = Store::connect().await.unwrap();
        let id = store.create_semester("Fall", "2025-26").await.unwrap();
        let semesters = store.list_semesters().await.unwrap();
        assert_eq!(semesters.len(), 1);
        assert_eq!(semesters[0].id, id);
        assert_eq!(semesters[0].academic_year, "2025-26");
    }
}
