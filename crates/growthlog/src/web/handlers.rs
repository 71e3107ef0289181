//! Request handlers.

use axum::body::Bytes;
use axum::extract::{Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum_extra::extract::cookie::SignedCookieJar;
use tracing::{debug, error, info, warn};

use crate::entry::{PlantEntry, PlantEntryDraft};
use crate::error::{Error, Result};
use crate::series::build_series;
use crate::uploads::StoredFileRef;

use super::notice::{self, Notice};
use super::{render, AppState};

/// Notice shown after a successful submission.
const ADDED_MESSAGE: &str = "Plant entry added successfully!";

/// An [`Error`] on its way out as an HTTP response.
#[derive(Debug)]
pub struct AppError(pub Error);

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.0.is_not_found() {
            debug!("{}", self.0);
            return (StatusCode::NOT_FOUND, "Not Found").into_response();
        }
        if self.0.is_validation() {
            return (StatusCode::BAD_REQUEST, self.0.to_string()).into_response();
        }
        error!("Request failed: {}", self.0);
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
    }
}

/// `GET /`
pub async fn index(
    State(state): State<AppState>,
    jar: SignedCookieJar,
) -> std::result::Result<(SignedCookieJar, Html<String>), AppError> {
    let (jar, pending) = notice::take(jar);
    let entries = state.with_storage(|s| s.list_all_ordered_by_date()).await?;
    let series = build_series(&entries);
    let page = render::index_page(&entries, &series, pending.as_ref())?;
    Ok((jar, Html(page)))
}

/// `POST /add`
///
/// Always redirects back to the index; the outcome travels as a notice.
/// Only storage failures surface as an error response.
pub async fn add_entry(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    multipart: Multipart,
) -> std::result::Result<Response, AppError> {
    let jar = match submit(&state, multipart).await {
        Ok(entry) => {
            debug!("Entry {} recorded for '{}'", entry.id, entry.name);
            notice::push(jar, &Notice::success(ADDED_MESSAGE))
        }
        Err(e) if e.is_validation() => {
            info!("Rejected submission: {}", e);
            notice::push(jar, &Notice::error(e.to_string()))
        }
        Err(e) => return Err(e.into()),
    };
    Ok((StatusCode::FOUND, jar, [(header::LOCATION, "/")]).into_response())
}

/// `GET /uploads/:name`
pub async fn serve_upload(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> std::result::Result<Response, AppError> {
    let path = state.uploads().resolve(&name)?;
    let bytes = tokio::fs::read(&path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::not_found(format!("upload '{name}'"))
        } else {
            Error::Io(e)
        }
    })?;
    let mime = mime_guess::from_path(&path).first_or_octet_stream();

    Ok((
        [
            (header::CONTENT_TYPE, mime.essence_str().to_string()),
            (header::X_CONTENT_TYPE_OPTIONS, "nosniff".to_string()),
        ],
        bytes,
    )
        .into_response())
}

#[derive(Debug)]
struct UploadedPhoto {
    file_name: String,
    content: Bytes,
}

#[derive(Debug, Default)]
struct SubmittedForm {
    name: Option<String>,
    date: Option<String>,
    height: Option<String>,
    notes: Option<String>,
    photo: Option<UploadedPhoto>,
}

/// Validate a submission, store its photo and record the entry.
///
/// The photo is written only once the text fields have validated, and a
/// freshly written photo is removed again if the entry cannot be recorded.
async fn submit(state: &AppState, multipart: Multipart) -> Result<PlantEntry> {
    let form = read_form(multipart).await?;
    let mut draft = PlantEntryDraft::parse(
        form.name.as_deref().unwrap_or_default(),
        form.date.as_deref().unwrap_or_default(),
        form.height.as_deref().unwrap_or_default(),
        form.notes.as_deref(),
    )?;

    let mut stored = None;
    if let Some(photo) = form.photo {
        let uploads = state.uploads().clone();
        let store = move || uploads.store(&photo.file_name, &photo.content);
        let file = tokio::task::spawn_blocking(store)
            .await
            .map_err(|e| Error::internal(format!("upload task failed: {e}")))??;
        draft = draft.with_photo(file.name());
        stored = Some(file);
    }

    let inserted = state.with_storage(move |s| s.insert(&draft)).await;
    if let (Err(_), Some(file)) = (&inserted, stored) {
        discard_upload(state, file).await;
    }
    inserted
}

async fn discard_upload(state: &AppState, file: StoredFileRef) {
    let uploads = state.uploads().clone();
    match tokio::task::spawn_blocking(move || uploads.discard(&file)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("Could not remove unreferenced upload: {}", e),
        Err(e) => warn!("Upload cleanup task failed: {}", e),
    }
}

fn malformed(e: &axum::extract::multipart::MultipartError) -> Error {
    Error::validation("form", format!("malformed submission: {e}"))
}

async fn read_form(mut multipart: Multipart) -> Result<SubmittedForm> {
    let mut form = SubmittedForm::default();

    while let Some(field) = multipart.next_field().await.map_err(|e| malformed(&e))? {
        let Some(field_name) = field.name().map(ToString::to_string) else {
            continue;
        };
        match field_name.as_str() {
            "photo" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let content = field.bytes().await.map_err(|e| malformed(&e))?;
                // Browsers send an empty part when no file was chosen.
                if !file_name.is_empty() {
                    form.photo = Some(UploadedPhoto { file_name, content });
                }
            }
            "name" => form.name = Some(field.text().await.map_err(|e| malformed(&e))?),
            "date" => form.date = Some(field.text().await.map_err(|e| malformed(&e))?),
            "height" => form.height = Some(field.text().await.map_err(|e| malformed(&e))?),
            "notes" => form.notes = Some(field.text().await.map_err(|e| malformed(&e))?),
            other => debug!("Ignoring unexpected form field '{}'", other),
        }
    }

    Ok(form)
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{HeaderValue, Request};
    use tempfile::TempDir;
    use tower::ServiceExt;

    use crate::config::Config;
    use crate::web::router;

    use super::*;

    const BOUNDARY: &str = "growthlog-test-boundary";

    struct TestApp {
        _dir: TempDir,
        state: AppState,
    }

    fn test_app() -> TestApp {
        test_app_with_uploads("uploads")
    }

    /// An app whose upload directory is `uploads` inside its temp dir.
    fn test_app_with_uploads(uploads: &str) -> TestApp {
        crate::logging::init_test_logging();
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage.database_path = Some(dir.path().join("plants.db"));
        config.uploads.directory = Some(dir.path().join(uploads));
        let state = AppState::new(&config).unwrap();
        TestApp { _dir: dir, state }
    }

    fn multipart_body(fields: &[(&str, &str)], photo: Option<(&str, &[u8])>) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
        if let Some((file_name, content)) = photo {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"photo\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(content);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn post_add(fields: &[(&str, &str)], photo: Option<(&str, &[u8])>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/add")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(fields, photo)))
            .unwrap()
    }

    fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
        let mut request = Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            request = request.header(header::COOKIE, HeaderValue::from_str(cookie).unwrap());
        }
        request.body(Body::empty()).unwrap()
    }

    async fn send(app: &TestApp, request: Request<Body>) -> Response {
        router(app.state.clone()).oneshot(request).await.unwrap()
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    async fn body_text(response: Response) -> String {
        String::from_utf8(body_bytes(response).await).unwrap()
    }

    /// The `name=value` pair of the first `Set-Cookie` header.
    fn cookie_pair(response: &Response) -> String {
        let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
        set_cookie.split(';').next().unwrap().to_string()
    }

    async fn count(app: &TestApp) -> i64 {
        app.state.with_storage(|s| s.count()).await.unwrap()
    }

    /// Submit an entry and return the page rendered right after the redirect.
    async fn submit_and_follow(
        app: &TestApp,
        fields: &[(&str, &str)],
        photo: Option<(&str, &[u8])>,
    ) -> String {
        let response = send(app, post_add(fields, photo)).await;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[header::LOCATION], "/");
        let cookie = cookie_pair(&response);
        body_text(send(app, get("/", Some(&cookie))).await).await
    }

    fn chart_x(page: &str) -> Vec<String> {
        let start = page.find(r#"id="growth-data">"#).unwrap() + r#"id="growth-data">"#.len();
        let end = start + page[start..].find("</script>").unwrap();
        let traces: serde_json::Value = serde_json::from_str(&page[start..end]).unwrap();
        traces[0]["x"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_health() {
        let app = test_app();
        let response = send(&app, get("/health", None)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "OK");
    }

    #[tokio::test]
    async fn test_empty_index() {
        let app = test_app();
        let response = send(&app, get("/", None)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let page = body_text(response).await;
        assert!(page.contains(r#"id="growth-data">[]</script>"#));
        assert!(!page.contains("list-group-item"));
    }

    #[tokio::test]
    async fn test_valid_submission_is_recorded_with_notice() {
        let app = test_app();
        let page = submit_and_follow(
            &app,
            &[
                ("name", "Basil"),
                ("date", "2024-03-01"),
                ("height", "5"),
                ("notes", "first true leaves"),
            ],
            None,
        )
        .await;

        assert_eq!(count(&app).await, 1);
        assert!(page.contains("Plant entry added successfully!"));
        assert!(page.contains("alert-success"));
        assert!(page.contains("<strong>Basil</strong> (2024-03-01): Height: 5.0 cm"));
        assert!(page.contains("Notes: first true leaves"));
        assert!(!page.contains("<img"));
    }

    #[tokio::test]
    async fn test_notice_is_shown_once() {
        let app = test_app();
        let response = send(
            &app,
            post_add(
                &[("name", "Basil"), ("date", "2024-03-01"), ("height", "5")],
                None,
            ),
        )
        .await;
        let cookie = cookie_pair(&response);

        let first = body_text(send(&app, get("/", Some(&cookie))).await).await;
        let second = body_text(send(&app, get("/", None)).await).await;

        assert!(first.contains("Plant entry added successfully!"));
        assert!(!second.contains("Plant entry added successfully!"));
    }

    #[tokio::test]
    async fn test_non_numeric_height_is_rejected() {
        let app = test_app();
        let page = submit_and_follow(
            &app,
            &[("name", "Basil"), ("date", "2024-03-01"), ("height", "tall")],
            Some(("basil.jpg", b"jpeg bytes")),
        )
        .await;

        assert_eq!(count(&app).await, 0);
        assert!(page.contains("alert-danger"));
        assert!(page.contains("invalid height"));
        assert!(!app.state.uploads().dir().join("basil.jpg").exists());
    }

    #[tokio::test]
    async fn test_missing_fields_are_rejected() {
        let app = test_app();
        let page = submit_and_follow(&app, &[("height", "3")], None).await;

        assert_eq!(count(&app).await, 0);
        assert!(page.contains("invalid name"));
    }

    #[tokio::test]
    async fn test_zero_height_is_accepted() {
        let app = test_app();
        let page = submit_and_follow(
            &app,
            &[("name", "Seedling"), ("date", "2024-03-01"), ("height", "0")],
            None,
        )
        .await;

        assert_eq!(count(&app).await, 1);
        assert!(page.contains("Height: 0.0 cm"));
    }

    #[tokio::test]
    async fn test_empty_file_part_means_no_photo() {
        let app = test_app();
        let page = submit_and_follow(
            &app,
            &[("name", "Basil"), ("date", "2024-03-01"), ("height", "1")],
            Some(("", b"")),
        )
        .await;

        assert_eq!(count(&app).await, 1);
        assert!(!page.contains("<img"));
    }

    #[tokio::test]
    async fn test_traversal_upload_is_contained_and_served() {
        let app = test_app();
        let photo: &[u8] = b"\xff\xd8\xff not really a jpeg";
        let page = submit_and_follow(
            &app,
            &[("name", "Fern"), ("date", "2024-03-01"), ("height", "12.5")],
            Some(("../../etc/passwd.jpg", photo)),
        )
        .await;

        assert!(page.contains(r#"<img src="/uploads/etc_passwd.jpg""#));
        let stored = app.state.uploads().dir().join("etc_passwd.jpg");
        assert_eq!(std::fs::read(stored).unwrap(), photo);

        let response = send(&app, get("/uploads/etc_passwd.jpg", None)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/jpeg");
        assert_eq!(
            response.headers()[header::X_CONTENT_TYPE_OPTIONS],
            "nosniff"
        );
        assert_eq!(body_bytes(response).await, photo);
    }

    #[tokio::test]
    async fn test_missing_and_unsafe_uploads_are_not_found() {
        let app = test_app();
        let response = send(&app, get("/uploads/nope.jpg", None)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = send(&app, get("/uploads/..%2Fplants.db", None)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_index_is_idempotent() {
        let app = test_app();
        send(
            &app,
            post_add(
                &[("name", "Basil"), ("date", "2024-03-01"), ("height", "5")],
                None,
            ),
        )
        .await;

        let first = body_text(send(&app, get("/", None)).await).await;
        let second = body_text(send(&app, get("/", None)).await).await;
        assert_eq!(first, second);
        assert_eq!(count(&app).await, 1);
    }

    #[tokio::test]
    async fn test_chart_is_ordered_by_date() {
        let app = test_app();
        for (date, height) in [("2024-03-01", "5"), ("2024-02-01", "3"), ("2024-04-01", "8")] {
            send(
                &app,
                post_add(
                    &[("name", "Basil"), ("date", date), ("height", height)],
                    None,
                ),
            )
            .await;
        }

        let page = body_text(send(&app, get("/", None)).await).await;
        assert_eq!(chart_x(&page), ["2024-02-01", "2024-03-01", "2024-04-01"]);

        let feb = page.find("(2024-02-01)").unwrap();
        let mar = page.find("(2024-03-01)").unwrap();
        let apr = page.find("(2024-04-01)").unwrap();
        assert!(feb < mar && mar < apr);
    }

    #[tokio::test]
    async fn test_unwritable_upload_dir_is_server_error() {
        let app = test_app_with_uploads("blocker/uploads");
        let blocker = app.state.uploads().dir().parent().unwrap();
        std::fs::write(blocker, b"a file where a directory belongs").unwrap();

        let response = send(
            &app,
            post_add(
                &[("name", "Fern"), ("date", "2024-03-01"), ("height", "4")],
                Some(("fern.jpg", b"fronds")),
            ),
        )
        .await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.headers().get(header::SET_COOKIE).is_none());
        assert_eq!(count(&app).await, 0);
    }

    #[tokio::test]
    async fn test_failed_insert_removes_fresh_photo() {
        let app = test_app();
        let conn = rusqlite::Connection::open(app.state.database_path()).unwrap();
        conn.execute_batch(
            "CREATE TRIGGER reject_entries BEFORE INSERT ON plant_entries
             BEGIN SELECT RAISE(ABORT, 'database is full'); END;",
        )
        .unwrap();

        let response = send(
            &app,
            post_add(
                &[("name", "Fern"), ("date", "2024-03-01"), ("height", "4")],
                Some(("fern.jpg", b"fronds")),
            ),
        )
        .await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(count(&app).await, 0);
        assert!(!app.state.uploads().dir().join("fern.jpg").exists());
    }

    #[tokio::test]
    async fn test_failed_insert_keeps_reused_photo() {
        let app = test_app();
        let page = submit_and_follow(
            &app,
            &[("name", "Fern"), ("date", "2024-03-01"), ("height", "4")],
            Some(("fern.jpg", b"fronds")),
        )
        .await;
        assert!(page.contains(r#"<img src="/uploads/fern.jpg""#));

        let conn = rusqlite::Connection::open(app.state.database_path()).unwrap();
        conn.execute_batch(
            "CREATE TRIGGER reject_entries BEFORE INSERT ON plant_entries
             BEGIN SELECT RAISE(ABORT, 'database is full'); END;",
        )
        .unwrap();

        let response = send(
            &app,
            post_add(
                &[("name", "Fern"), ("date", "2024-03-08"), ("height", "5")],
                Some(("fern.jpg", b"fronds")),
            ),
        )
        .await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(count(&app).await, 1);
        assert!(app.state.uploads().dir().join("fern.jpg").exists());
    }

    #[test]
    fn test_app_error_status_codes() {
        let status = |e: Error| AppError(e).into_response().status();
        assert_eq!(status(Error::not_found("x")), StatusCode::NOT_FOUND);
        assert_eq!(
            status(Error::validation("height", "bad")),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status(Error::internal("bug")),
            StatusCode::INTERNAL_SERVER_ERROR
        );

        let write_failed = Error::FileWrite {
            path: "uploads/rose.jpg".into(),
            source: std::io::Error::other("disk full"),
        };
        assert_eq!(status(write_failed), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
