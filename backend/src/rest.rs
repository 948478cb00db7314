use axum::{
    body::Bytes,
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use chrono::NaiveDate;
use serde::Deserialize;
use shared::{
    ApiResponse, BulkVaccinateRequest, DriveStatus, ImportResponse, ListResponse, LoginRequest,
    LoginResponse, NewDrive, NewStudent, UpdateDrive, UpdateStudent, VaccinationStatus,
};
use std::{fmt::Display, str::FromStr};

use crate::domain::auth::CredentialPolicy;
use crate::domain::drive_service::DriveService;
use crate::domain::import_service::ImportService;
use crate::domain::report_service::{ReportParams, ReportService};
use crate::domain::student_service::StudentService;
use crate::domain::vaccination_service::VaccinationService;
use crate::error::ApiError;
use crate::store::students::StudentListFilter;

const DEFAULT_PAGE_SIZE: u32 = 10;
const MAX_PAGE_SIZE: u32 = 100;

#[derive(Clone)]
pub struct AppState {
    pub students: StudentService,
    pub drives: DriveService,
    pub vaccination: VaccinationService,
    pub import: ImportService,
    pub reports: ReportService,
    pub auth: CredentialPolicy,
}

pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/auth/login", post(login))
        .route("/students", get(list_students).post(create_student))
        .route("/students/import", post(import_students))
        .route(
            "/students/:id",
            get(get_student).put(update_student).delete(delete_student),
        )
        .route("/students/:id/vaccinate/:drive_id", put(vaccinate_student))
        .route("/vaccination-drives", get(list_drives).post(create_drive))
        .route("/vaccination-drives/reports/generate", get(generate_report))
        .route(
            "/vaccination-drives/:id",
            get(get_drive).put(update_drive).delete(delete_drive),
        )
        .route("/vaccination-drives/:id/eligible-students", get(eligible_students))
        .route("/vaccination-drives/:id/vaccinated-students", get(vaccinated_students))
        .route("/vaccination-drives/:id/vaccinate-bulk", post(vaccinate_bulk))
        .route("/dashboard/overview", get(dashboard_overview))
        .route("/dashboard/stats/class", get(class_stats))
        .route("/dashboard/trends/monthly", get(monthly_trends))
        .with_state(state)
}

async fn login(State(state): State<AppState>, Json(request): Json<LoginRequest>) -> impl IntoResponse {
    match state.auth.authenticate(&request) {
        Some(user) => (
            StatusCode::OK,
            Json(LoginResponse {
                success: true,
                message: format!("Welcome {}!", user.username),
                user: Some(user),
            }),
        ),
        None => (
            StatusCode::UNAUTHORIZED,
            Json(LoginResponse {
                success: false,
                message: "Invalid credentials".to_string(),
                user: None,
            }),
        ),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StudentListQuery {
    page: Option<u32>,
    limit: Option<u32>,
    name: Option<String>,
    student_id: Option<String>,
    #[serde(rename = "class")]
    class_name: Option<String>,
    vaccination_status: Option<String>,
}

async fn list_students(
    State(state): State<AppState>,
    Query(query): Query<StudentListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let filter = StudentListFilter {
        name: non_empty(query.name),
        student_id: non_empty(query.student_id),
        class_name: non_empty(query.class_name),
        vaccination_status: non_empty(query.vaccination_status),
    };
    let (page, page_size) = paging(query.page, query.limit);

    let (students, total) = state.students.list(&filter, page, page_size).await?;
    Ok(Json(ListResponse::new(students, total, page, page_size)))
}

async fn create_student(
    State(state): State<AppState>,
    Json(new): Json<NewStudent>,
) -> Result<impl IntoResponse, ApiError> {
    let student = state.students.create(new).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok_with_message(student, "Student created successfully")),
    ))
}

async fn get_student(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let student = state.students.get(&id).await?;
    Ok(Json(ApiResponse::ok(student)))
}

async fn update_student(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(update): Json<UpdateStudent>,
) -> Result<impl IntoResponse, ApiError> {
    let student = state.students.update(&id, update).await?;
    Ok(Json(ApiResponse::ok_with_message(student, "Student updated successfully")))
}

async fn delete_student(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.students.delete(&id).await?;
    Ok(Json(ApiResponse::<()>::message_only("Student deleted successfully")))
}

async fn import_students(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut file: Option<Bytes> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| ApiError::Validation("Invalid multipart payload".to_string()))?
    {
        if field.name() == Some("file") {
            file = Some(
                field
                    .bytes()
                    .await
                    .map_err(|_| ApiError::Validation("Failed to read uploaded file".to_string()))?,
            );
        }
    }

    let bytes = file.ok_or_else(|| ApiError::Validation("No file uploaded".to_string()))?;
    let outcome = state.import.import_csv(&bytes).await?;

    Ok(Json(ImportResponse {
        success: true,
        message: format!("{} students imported successfully", outcome.imported),
        errors: (!outcome.errors.is_empty()).then_some(outcome.errors),
    }))
}

async fn vaccinate_student(
    State(state): State<AppState>,
    Path((id, drive_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let student = state.vaccination.mark_vaccinated(&id, &drive_id).await?;
    Ok(Json(ApiResponse::ok_with_message(student, "Student vaccinated successfully")))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveListQuery {
    page: Option<u32>,
    limit: Option<u32>,
    status: Option<String>,
    vaccine_name: Option<String>,
    upcoming: Option<String>,
}

async fn list_drives(
    State(state): State<AppState>,
    Query(query): Query<DriveListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let status = parse_param::<DriveStatus>(query.status, "status")?;
    let upcoming = matches!(query.upcoming.as_deref(), Some("true") | Some("1"));
    let (page, page_size) = paging(query.page, query.limit);

    let (drives, total) = state
        .drives
        .list(status, non_empty(query.vaccine_name), upcoming, page, page_size)
        .await?;
    Ok(Json(ListResponse::new(drives, total, page, page_size)))
}

async fn create_drive(
    State(state): State<AppState>,
    Json(new): Json<NewDrive>,
) -> Result<impl IntoResponse, ApiError> {
    let drive = state.drives.create(new).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok_with_message(drive, "Vaccination drive created successfully")),
    ))
}

async fn get_drive(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let drive = state.drives.get(&id).await?;
    Ok(Json(ApiResponse::ok(drive)))
}

async fn update_drive(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(update): Json<UpdateDrive>,
) -> Result<impl IntoResponse, ApiError> {
    let drive = state.drives.update(&id, update).await?;
    Ok(Json(ApiResponse::ok_with_message(drive, "Vaccination drive updated successfully")))
}

async fn delete_drive(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.drives.delete(&id).await?;
    Ok(Json(ApiResponse::<()>::message_only("Vaccination drive deleted successfully")))
}

async fn eligible_students(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let students = state.drives.eligible_students(&id).await?;
    Ok(Json(ApiResponse::ok(students)))
}

async fn vaccinated_students(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let students = state.drives.vaccinated_students(&id).await?;
    Ok(Json(ApiResponse::ok(students)))
}

async fn vaccinate_bulk(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<BulkVaccinateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state.vaccination.mark_vaccinated_bulk(&id, &request.student_ids).await?;
    let message = format!("{} students vaccinated successfully", outcome.vaccinated_count);
    Ok(Json(ApiResponse::ok_with_message(outcome, message)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReportQuery {
    page: Option<u32>,
    limit: Option<u32>,
    vaccine_name: Option<String>,
    status: Option<String>,
    from_date: Option<String>,
    to_date: Option<String>,
}

async fn generate_report(
    State(state): State<AppState>,
    Query(query): Query<ReportQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let params = ReportParams {
        vaccine_name: non_empty(query.vaccine_name),
        status: parse_param::<VaccinationStatus>(query.status, "status")?,
        from_date: parse_date(query.from_date, "fromDate")?,
        to_date: parse_date(query.to_date, "toDate")?,
    };
    let (page, page_size) = paging(query.page, query.limit);

    let (rows, total) = state.reports.generate(&params, page, page_size).await?;
    Ok(Json(ListResponse::new(rows, total, page, page_size)))
}

async fn dashboard_overview(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let overview = state.reports.dashboard_overview().await?;
    Ok(Json(ApiResponse::ok(overview)))
}

async fn class_stats(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let stats = state.reports.class_stats().await?;
    Ok(Json(ApiResponse::ok(stats)))
}

async fn monthly_trends(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let trends = state.reports.monthly_trends().await?;
    Ok(Json(ApiResponse::ok(trends)))
}

fn paging(page: Option<u32>, limit: Option<u32>) -> (u32, u32) {
    (
        page.unwrap_or(1).max(1),
        limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
    )
}

/// Blank query parameters are treated as absent, the way HTML forms send them.
fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn parse_param<T: FromStr>(value: Option<String>, label: &str) -> Result<Option<T>, ApiError>
where
    T::Err: Display,
{
    match non_empty(value) {
        None => Ok(None),
        Some(s) => s
            .parse()
            .map(Some)
            .map_err(|e| ApiError::Validation(format!("Invalid {label}: {e}"))),
    }
}

fn parse_date(value: Option<String>, label: &str) -> Result<Option<NaiveDate>, ApiError> {
    match non_empty(value) {
        None => Ok(None),
        Some(s) => s
            .parse::<NaiveDate>()
            .map(Some)
            .map_err(|_| ApiError::Validation(format!("Invalid {label}: expected YYYY-MM-DD"))),
    }
}
