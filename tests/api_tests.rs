use lesson_portal::{
    AppConfig, AppState, create_router,
    browse::BrowseQuery,
    client::{ClientError, Credentials, LessonClient, LessonForm},
    models::{LessonPayload, LessonQuery, LinkInput},
    repository::{InMemoryRepository, RepositoryState},
    storage::MockStorageService,
};
use std::sync::Arc;
use tokio::net::TcpListener;

pub struct TestApp {
    pub address: String,
    pub repo: Arc<InMemoryRepository>,
}

async fn spawn_app() -> TestApp {
    let repo = Arc::new(InMemoryRepository::new());
    let state = AppState {
        repo: repo.clone() as RepositoryState,
        storage: Arc::new(MockStorageService::new()),
        config: AppConfig::default(),
    };
    let router = create_router(state);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    TestApp { address, repo }
}

fn admin(app: &TestApp) -> LessonClient {
    LessonClient::new(&app.address)
        .unwrap()
        .with_credentials(Credentials::DevUser("user_admin".to_string()))
}

fn visitor(app: &TestApp) -> LessonClient {
    LessonClient::new(&app.address).unwrap()
}

fn kinematics(published: bool) -> LessonPayload {
    LessonPayload {
        title: "Kinematics".to_string(),
        subject: "Physics".to_string(),
        grade: Some("Grade 10".to_string()),
        published: Some(published),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_health_check() {
    let app = spawn_app().await;
    let response = reqwest::get(format!("{}/health", app.address))
        .await
        .expect("req fail");
    assert!(response.status().is_success());
}

#[tokio::test]
async fn test_lesson_lifecycle_through_client() {
    let app = spawn_app().await;
    let admin = admin(&app);
    let visitor = visitor(&app);

    let mut payload = kinematics(true);
    payload.links = Some(vec![LinkInput {
        title: "Khan Academy".to_string(),
        url: "https://khanacademy.org".to_string(),
    }]);
    let created = admin.create(&payload).await.unwrap();
    assert_eq!(created.created_by, "user_admin");

    let fetched = visitor.get(created.id).await.unwrap();
    assert_eq!(fetched, created);

    let listed = visitor
        .list(&LessonQuery {
            grade: Some("Grade 10".to_string()),
            published: Some(true),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].links[0].title, "Khan Academy");

    payload.links = Some(vec![LinkInput {
        title: "New".to_string(),
        url: "https://example.com".to_string(),
    }]);
    let updated = admin.update(created.id, &payload).await.unwrap();
    assert_eq!(updated.links.len(), 1);
    assert_eq!(updated.links[0].title, "New");

    let deleted = admin.request_delete(created.id).confirm().await.unwrap();
    assert!(deleted.success);

    let err = admin.get(created.id).await.unwrap_err();
    assert_eq!(err.status(), Some(404));
    assert_eq!(app.repo.link_row_count(created.id).await, 0);
}

#[tokio::test]
async fn test_anonymous_client_cannot_write() {
    let app = spawn_app().await;

    let err = visitor(&app).create(&kinematics(true)).await.unwrap_err();
    match err {
        ClientError::Api { status, message } => {
            assert_eq!(status, 401);
            assert_eq!(message, "Unauthorized");
        }
        other => panic!("expected api error, got {other:?}"),
    }
    assert_eq!(app.repo.lesson_count().await, 0);
}

#[tokio::test]
async fn test_validation_error_message_reaches_client() {
    let app = spawn_app().await;
    let mut payload = kinematics(true);
    payload.grade = None;

    let err = admin(&app).create(&payload).await.unwrap_err();
    assert_eq!(err.status(), Some(400));
    assert!(err.to_string().contains("grade is required"));
}

#[tokio::test]
async fn test_cancelled_delete_sends_nothing() {
    let app = spawn_app().await;
    let admin = admin(&app);
    let created = admin.create(&kinematics(true)).await.unwrap();

    let pending = admin.request_delete(created.id);
    assert_eq!(pending.id(), created.id);
    pending.cancel();

    assert!(admin.get(created.id).await.is_ok());
    assert_eq!(app.repo.lesson_count().await, 1);
}

#[tokio::test]
async fn test_form_create_then_edit_clears_links() {
    let app = spawn_app().await;
    let admin = admin(&app);

    let mut form = LessonForm::new();
    form.payload = kinematics(false);

    // Half-filled links are not added.
    form.pending_link.title = "Khan Academy".to_string();
    assert!(!form.add_link());
    form.pending_link.url = "https://khanacademy.org".to_string();
    assert!(form.add_link());
    assert_eq!(form.links().len(), 1);
    assert_eq!(form.pending_link, LinkInput::default());

    let lessons = form.submit(&admin).await.unwrap();
    assert_eq!(lessons.len(), 1);
    assert_eq!(lessons[0].links.len(), 1);
    assert!(form.editing().is_none(), "form resets after a successful submit");
    assert!(form.links().is_empty());

    let mut form = LessonForm::edit(&lessons[0]);
    assert_eq!(form.editing(), Some(lessons[0].id));
    assert_eq!(form.payload.title, "Kinematics");
    assert!(form.remove_link(0).is_some());
    assert!(form.remove_link(0).is_none());

    let lessons = form.submit(&admin).await.unwrap();
    assert_eq!(lessons.len(), 1);
    assert!(lessons[0].links.is_empty(), "removing every link clears them");
    assert_eq!(app.repo.link_row_count(lessons[0].id).await, 0);
}

#[tokio::test]
async fn test_failed_submit_keeps_form_state() {
    let app = spawn_app().await;
    let mut form = LessonForm::new();
    form.payload = kinematics(true);

    let err = form.submit(&visitor(&app)).await.unwrap_err();
    assert_eq!(err.status(), Some(401));
    assert_eq!(form.payload.title, "Kinematics");
}

#[tokio::test]
async fn test_browse_through_client() {
    let app = spawn_app().await;
    let admin = admin(&app);

    for (title, year, published) in [
        ("Forces", "1ère", true),
        ("Ondes", "Terminale", true),
        ("Brouillon", "1ère", false),
    ] {
        admin
            .create(&LessonPayload {
                title: title.to_string(),
                subject: "Physique".to_string(),
                level: Some("Lycée".to_string()),
                year: Some(year.to_string()),
                published: Some(published),
                ..Default::default()
            })
            .await
            .unwrap();
    }

    let sections = visitor(&app)
        .browse(&BrowseQuery::default())
        .await
        .unwrap();
    let keys: Vec<&str> = sections.iter().map(|s| s.key.as_str()).collect();
    assert_eq!(keys, vec!["Lycée - 1ère", "Lycée - Terminale"]);

    let lessons = &sections[0].subjects[0].chapters[0].lessons;
    assert_eq!(lessons.len(), 1);
    assert_eq!(lessons[0].title, "Forces");
}
