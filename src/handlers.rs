use std::collections::HashMap;

use actix_multipart::Multipart;
use actix_web::http::header;
use actix_web::{web, HttpResponse};
use chrono::Utc;
use futures_util::StreamExt as _;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::aggregate::{aggregate_by, by_student};
use crate::auth::{self, AuthUser, Role};
use crate::config::AppConfig;
use crate::db::Store;
use crate::error::ApiError;
use crate::export;
use crate::ingest;
use crate::insights;
use crate::model::PassModel;
use crate::models::{Grade, PerformanceRecord, RiskLevel};
use crate::risk::class_rollup;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub roll_number: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub role: Role,
}

#[derive(Debug, Serialize)]
pub struct PerformanceListResponse {
    pub count: usize,
    pub data: Vec<PerformanceRecord>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: String,
    pub records_processed: usize,
    pub records_updated: usize,
    pub rows_skipped: usize,
}

#[derive(Debug, Serialize)]
pub struct GradedRecord {
    #[serde(flatten)]
    pub record: PerformanceRecord,
    pub grade: Grade,
}

#[derive(Debug, Serialize)]
pub struct AtRiskStudent {
    pub student_id: String,
    pub subject_count: usize,
    pub average_marks: f64,
    pub average_attendance: f64,
    pub risk_score: f64,
    pub risk_level: RiskLevel,
}

#[derive(Debug, Deserialize)]
pub struct SemesterRequest {
    pub name: String,
    pub academic_year: String,
}

#[derive(Debug, Deserialize)]
pub struct InsightQuery {
    pub student_id: Option<String>,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().body("Academic Insights API is running")
}

async fn login(
    request: web::Json<LoginRequest>,
    store: web::Data<Store>,
    config: web::Data<AppConfig>,
) -> Result<HttpResponse, ApiError> {
    let user = store
        .find_user(&request.roll_number)
        .await?
        .ok_or(ApiError::InvalidCredentials)?;

    if !auth::verify_password(&request.password, &user.password_hash) {
        return Err(ApiError::InvalidCredentials);
    }

    let role = Role::parse(&user.role)
        .ok_or_else(|| ApiError::Internal(format!("unknown role {}", user.role)))?;
    let access_token = auth::issue_token(
        &user.roll_number,
        role,
        &config.jwt_secret,
        config.token_ttl_minutes,
    )?;

    tracing::info!(roll_number = %user.roll_number, role = role.as_str(), "login");
    Ok(HttpResponse::Ok().json(LoginResponse { access_token, role }))
}

async fn performance(user: AuthUser, store: web::Data<Store>) -> Result<HttpResponse, ApiError> {
    user.require_any(&[Role::Teacher, Role::Admin])?;
    let data = store.all_performance().await?;
    Ok(HttpResponse::Ok().json(PerformanceListResponse {
        count: data.len(),
        data,
    }))
}

async fn student_performance(
    user: AuthUser,
    store: web::Data<Store>,
    config: web::Data<AppConfig>,
) -> Result<HttpResponse, ApiError> {
    user.require_role(Role::Student)?;
    let data = store.performance_for_student(&user.claims.sub).await?;
    let rows: Vec<GradedRecord> = data
        .into_iter()
        .map(|record| GradedRecord {
            grade: config.grading.grade(record.marks),
            record,
        })
        .collect();
    Ok(HttpResponse::Ok().json(rows))
}

async fn average_marks(
    user: AuthUser,
    store: web::Data<Store>,
    config: web::Data<AppConfig>,
) -> Result<HttpResponse, ApiError> {
    user.require_any(&[Role::Teacher, Role::Admin])?;
    let records = store.all_performance().await?;
    let rollup = class_rollup(&records, config.pass_mark);
    Ok(HttpResponse::Ok().json(json!({ "average_marks": round2(rollup.average_marks) })))
}

async fn average_attendance(
    user: AuthUser,
    store: web::Data<Store>,
    config: web::Data<AppConfig>,
) -> Result<HttpResponse, ApiError> {
    user.require_any(&[Role::Teacher, Role::Admin])?;
    let records = store.all_performance().await?;
    let rollup = class_rollup(&records, config.pass_mark);
    Ok(HttpResponse::Ok().json(json!({ "average_attendance": round2(rollup.average_attendance) })))
}

async fn pass_fail(
    user: AuthUser,
    store: web::Data<Store>,
    config: web::Data<AppConfig>,
) -> Result<HttpResponse, ApiError> {
    user.require_any(&[Role::Teacher, Role::Admin])?;
    let records = store.all_performance().await?;
    let passed = records.iter().filter(|r| r.marks >= config.pass_mark).count();
    Ok(HttpResponse::Ok().json(json!({
        "pass": passed,
        "fail": records.len() - passed,
    })))
}

async fn at_risk(
    user: AuthUser,
    store: web::Data<Store>,
    config: web::Data<AppConfig>,
) -> Result<HttpResponse, ApiError> {
    user.require_any(&[Role::Teacher, Role::Admin])?;
    let records = store.all_performance().await?;

    let flagged: Vec<AtRiskStudent> = aggregate_by(&records, by_student)
        .iter()
        .map(|stat| (stat, config.risk.assess(stat)))
        .filter(|(_, assessment)| assessment.risk_level != RiskLevel::Low)
        .map(|(stat, assessment)| AtRiskStudent {
            student_id: stat.key.clone(),
            subject_count: stat.count,
            average_marks: round2(stat.average_marks),
            average_attendance: round2(stat.average_attendance),
            risk_score: round2(assessment.risk_score),
            risk_level: assessment.risk_level,
        })
        .collect();

    Ok(HttpResponse::Ok().json(flagged))
}

/// Drains every multipart field into memory, keyed by field name.
async fn read_multipart(mut payload: Multipart) -> Result<HashMap<String, Vec<u8>>, ApiError> {
    let mut parts = HashMap::new();

    while let Some(item) = payload.next().await {
        let mut field = item.map_err(|e| ApiError::Upload(e.to_string()))?;
        let name = field
            .content_disposition()
            .get_name()
            .unwrap_or_default()
            .to_string();

        let mut buffer = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk.map_err(|e| ApiError::Upload(e.to_string()))?;
            buffer.extend_from_slice(&chunk);
        }
        parts.insert(name, buffer);
    }

    Ok(parts)
}

fn text_part(parts: &HashMap<String, Vec<u8>>, name: &str) -> Option<String> {
    parts
        .get(name)
        .map(|bytes| String::from_utf8_lossy(bytes).trim().to_string())
        .filter(|text| !text.is_empty())
}

async fn upload_csv(
    user: AuthUser,
    payload: Multipart,
    store: web::Data<Store>,
) -> Result<HttpResponse, ApiError> {
    user.require_role(Role::Teacher)?;

    let parts = read_multipart(payload).await?;
    let file = parts
        .get("file")
        .ok_or_else(|| ApiError::BadRequest("No file uploaded".to_string()))?;
    // optional override; rows keep their own semester column otherwise
    let semester_override = text_part(&parts, "semester");

    let report = ingest::parse_performance_csv(file)?;

    let mut inserted = 0usize;
    let mut updated = 0usize;
    for row in &report.rows {
        store.get_or_create_student(&row.student_id).await?;
        let record = PerformanceRecord {
            student_id: row.student_id.clone(),
            subject: row.subject.clone(),
            semester: semester_override.clone().unwrap_or_else(|| row.semester.clone()),
            marks: row.marks,
            attendance: row.attendance,
            recorded_at: Utc::now(),
        };
        if store.upsert_performance(&record).await? {
            inserted += 1;
        } else {
            updated += 1;
        }
    }

    tracing::info!(inserted, updated, skipped = report.skipped, "csv upload processed");
    Ok(HttpResponse::Ok().json(UploadResponse {
        message: "Upload successful".to_string(),
        records_processed: inserted,
        records_updated: updated,
        rows_skipped: report.skipped,
    }))
}

async fn student_insight(
    user: AuthUser,
    query: web::Query<InsightQuery>,
    store: web::Data<Store>,
    config: web::Data<AppConfig>,
    pass_model: web::Data<PassModel>,
) -> Result<HttpResponse, ApiError> {
    let student_id = match user.claims.role {
        // students only ever see their own insight
        Role::Student => user.claims.sub.clone(),
        Role::Teacher | Role::Admin => query
            .student_id
            .clone()
            .ok_or_else(|| ApiError::BadRequest("student_id query parameter required".to_string()))?,
    };

    let records = store.all_performance().await?;
    let insight = insights::student_insight(
        &student_id,
        &records,
        config.pass_mark,
        Some(pass_model.get_ref()),
    )
    .ok_or_else(|| ApiError::NotFound(format!("Student {student_id}")))?;

    Ok(HttpResponse::Ok().json(insight))
}

async fn top_risk(
    user: AuthUser,
    store: web::Data<Store>,
    config: web::Data<AppConfig>,
) -> Result<HttpResponse, ApiError> {
    user.require_any(&[Role::Teacher, Role::Admin])?;
    let records = store.all_performance().await?;
    Ok(HttpResponse::Ok().json(insights::top_risk_students(&records, config.pass_mark, 10)))
}

async fn subject_difficulty(
    user: AuthUser,
    store: web::Data<Store>,
    config: web::Data<AppConfig>,
) -> Result<HttpResponse, ApiError> {
    user.require_any(&[Role::Teacher, Role::Admin])?;
    let records = store.all_performance().await?;
    Ok(HttpResponse::Ok().json(insights::subject_difficulty(&records, config.pass_mark)))
}

async fn class_health(
    user: AuthUser,
    store: web::Data<Store>,
    config: web::Data<AppConfig>,
) -> Result<HttpResponse, ApiError> {
    user.require_any(&[Role::Teacher, Role::Admin])?;
    let records = store.all_performance().await?;
    Ok(HttpResponse::Ok().json(insights::class_health(&records, config.pass_mark)))
}

async fn model_info(user: AuthUser, pass_model: web::Data<PassModel>) -> Result<HttpResponse, ApiError> {
    user.require_any(&[Role::Teacher, Role::Admin])?;
    Ok(HttpResponse::Ok().json(json!({ "accuracy": pass_model.accuracy })))
}

async fn create_semester(
    user: AuthUser,
    request: web::Json<SemesterRequest>,
    store: web::Data<Store>,
) -> Result<HttpResponse, ApiError> {
    user.require_role(Role::Admin)?;
    if request.name.trim().is_empty() || request.academic_year.trim().is_empty() {
        return Err(ApiError::BadRequest("Missing fields".to_string()));
    }

    let id = store
        .create_semester(request.name.trim(), request.academic_year.trim())
        .await?;
    Ok(HttpResponse::Ok().json(json!({
        "message": "Semester created successfully",
        "id": id,
    })))
}

async fn list_semesters(user: AuthUser, store: web::Data<Store>) -> Result<HttpResponse, ApiError> {
    user.require_role(Role::Admin)?;
    Ok(HttpResponse::Ok().json(store.list_semesters().await?))
}

async fn list_students(user: AuthUser, store: web::Data<Store>) -> Result<HttpResponse, ApiError> {
    user.require_role(Role::Admin)?;
    Ok(HttpResponse::Ok().json(store.list_students().await?))
}

async fn bulk_students(
    user: AuthUser,
    payload: Multipart,
    store: web::Data<Store>,
) -> Result<HttpResponse, ApiError> {
    user.require_role(Role::Admin)?;

    let parts = read_multipart(payload).await?;
    let file = parts
        .get("file")
        .ok_or_else(|| ApiError::BadRequest("CSV file required".to_string()))?;
    let semester_id = match text_part(&parts, "semester_id") {
        Some(raw) => Some(
            raw.parse::<i64>()
                .map_err(|_| ApiError::BadRequest("Invalid semester_id".to_string()))?,
        ),
        None => None,
    };

    let rows = ingest::parse_bulk_students_csv(file)?;
    let mut created = 0usize;
    let mut skipped = 0usize;

    for row in rows {
        let student_id = store
            .create_student_account(
                &row.roll_number,
                &row.name,
                &row.department,
                &row.section,
                &row.batch,
                &auth::hash_password(&row.password),
            )
            .await?;
        match student_id {
            Some(student_id) => {
                if let Some(semester_id) = semester_id {
                    store.enroll(student_id, semester_id).await?;
                }
                created += 1;
            }
            None => skipped += 1,
        }
    }

    Ok(HttpResponse::Ok().json(json!({
        "message": "Students uploaded successfully",
        "students_created": created,
        "students_skipped": skipped,
    })))
}

async fn export_performance(
    user: AuthUser,
    store: web::Data<Store>,
    config: web::Data<AppConfig>,
) -> Result<HttpResponse, ApiError> {
    user.require_any(&[Role::Teacher, Role::Admin])?;
    let records = store.all_performance().await?;
    let stats = aggregate_by(&records, by_student);
    let body = export::aggregates_to_csv(&stats, &config.risk)?;

    Ok(HttpResponse::Ok()
        .content_type("text/csv; charset=utf-8")
        .insert_header((
            header::CONTENT_DISPOSITION,
            "attachment; filename=\"performance.csv\"",
        ))
        .body(body))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health)).service(
        web::scope("/api")
            .route("/login", web::post().to(login))
            .route("/performance", web::get().to(performance))
            .route("/student/performance", web::get().to(student_performance))
            .service(
                web::scope("/analytics")
                    .route("/average-marks", web::get().to(average_marks))
                    .route("/average-attendance", web::get().to(average_attendance))
                    .route("/pass-fail", web::get().to(pass_fail))
                    .route("/at-risk", web::get().to(at_risk)),
            )
            .route("/upload/csv", web::post().to(upload_csv))
            .service(
                web::scope("/ml")
                    .route("/student-insight", web::get().to(student_insight))
                    .route("/top-risk", web::get().to(top_risk))
                    .route("/subject-difficulty", web::get().to(subject_difficulty))
                    .route("/class-health", web::get().to(class_health))
                    .route("/model-info", web::get().to(model_info)),
            )
            .service(
                web::scope("/admin")
                    .route("/semester", web::post().to(create_semester))
                    .route("/semesters", web::get().to(list_semesters))
                    .route("/students", web::get().to(list_students))
                    .route("/bulk-students", web::post().to(bulk_students)),
            )
            .route(
                "/reports/performance.csv",
                web::get().to(export_performance),
            ),
    );
}
