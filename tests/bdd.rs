use std::{collections::HashMap, fmt, fs::File, net::SocketAddr, time::Duration};

use anyhow::Context;
use cucumber::{given, then, when, World as _};
use serde_json::{json, Value};
use tempfile::TempDir;
use tripboard::{
    auth::{self, AuthenticatedUser, CurrentUser},
    config::AppConfig,
    db::init_pool,
    error::AppError,
    models::trip::Trip,
    services::planner::{self, TripView},
    state::AppState,
};

const TEST_PASSWORD: &str = "paris-in-spring-9";

#[derive(Debug, cucumber::World, Default)]
struct AppWorld {
    state: Option<TestState>,
    users: HashMap<String, AuthenticatedUser>,
    current: CurrentUser,
    trips: HashMap<String, Trip>,
    snapshots: HashMap<String, Value>,
    last_view: Option<TripView>,
    last_error: Option<AppError>,
}

impl AppWorld {
    fn app_state(&self) -> &AppState {
        self.state
            .as_ref()
            .expect("state must be initialised first")
            .app()
    }

    fn trip(&self, name: &str) -> &Trip {
        self.trips
            .get(name)
            .unwrap_or_else(|| panic!("no trip named {name:?} was saved in this scenario"))
    }

    fn snapshot(&self, label: &str) -> &Value {
        self.snapshots
            .get(label)
            .unwrap_or_else(|| panic!("no snapshot labelled {label:?} was created"))
    }

    fn take_error(&mut self) -> AppError {
        self.last_error
            .take()
            .expect("the previous step was expected to fail")
    }
}

struct TestState {
    app: AppState,
    _root: TempDir,
}

impl fmt::Debug for TestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestState").finish()
    }
}

impl TestState {
    async fn new() -> anyhow::Result<Self> {
        let root = TempDir::new().context("create temp dir for bdd world")?;

        let db_path = root.path().join("bdd.sqlite");
        File::create(&db_path)?;
        let database_url = format!("sqlite://{}", db_path.to_string_lossy());

        let config = AppConfig {
            database_url: database_url.clone(),
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            cookie_secret: "bdd-cookie-secret".into(),
        };

        let db = init_pool(&config.database_url).await?;
        sqlx::migrate!("./migrations").run(&db).await?;

        let app = AppState::new(config, db);
        Ok(Self { app, _root: root })
    }

    fn app(&self) -> &AppState {
        &self.app
    }
}

fn make_snapshot(label: &str) -> Value {
    json!({
        "label": label,
        "shapes": [{ "kind": "note", "text": label }],
        "camera": { "x": 0.0, "y": 0.0, "zoom": 1.0 },
    })
}

// Store timestamps must strictly advance between consecutive writes.
async fn tick() {
    tokio::time::sleep(Duration::from_millis(5)).await;
}

#[given("a fresh application state")]
async fn given_fresh_state(world: &mut AppWorld) {
    world.state = Some(TestState::new().await.expect("state"));
    world.users.clear();
    world.current = CurrentUser(None);
    world.trips.clear();
    world.snapshots.clear();
    world.last_view = None;
    world.last_error = None;
}

#[given("nobody is signed in")]
async fn given_anonymous(world: &mut AppWorld) {
    world.current = CurrentUser(None);
}

#[given(regex = r#"^a registered account "([^"]+)" with password "([^"]+)"$"#)]
#[when(regex = r#"^I register an account "([^"]+)" with password "([^"]+)"$"#)]
async fn register_account(world: &mut AppWorld, email: String, password: String) {
    let app = world.app_state().clone();
    let created = auth::register_user(&app, &email, &password)
        .await
        .expect("register user");
    world.users.insert(email, created);
}

#[when(regex = r#"^I try to register an account "([^"]+)" with password "([^"]+)"$"#)]
async fn try_register_account(world: &mut AppWorld, email: String, password: String) {
    let app = world.app_state().clone();
    world.last_error = auth::register_user(&app, &email, &password).await.err();
}

#[then(regex = r#"^I can authenticate as "([^"]+)" using password "([^"]+)"$"#)]
async fn then_can_authenticate(world: &mut AppWorld, email: String, password: String) {
    let authed = auth::authenticate_user(world.app_state(), &email, &password)
        .await
        .expect("authentication");
    assert_eq!(authed.email, email);
}

#[then(regex = r#"^authenticating as "([^"]+)" with password "([^"]+)" fails$"#)]
async fn then_authentication_fails(world: &mut AppWorld, email: String, password: String) {
    let result = auth::authenticate_user(world.app_state(), &email, &password).await;
    assert!(
        matches!(result, Err(AppError::Unauthorized)),
        "expected Unauthorized, got {result:?}"
    );
}

#[given(regex = r#"^a signed-in user "([^"]+)"$"#)]
#[when(regex = r#"^I switch to a signed-in user "([^"]+)"$"#)]
async fn sign_in_as(world: &mut AppWorld, email: String) {
    let app = world.app_state().clone();
    if !world.users.contains_key(&email) {
        let created = auth::register_user(&app, &email, TEST_PASSWORD)
            .await
            .expect("register user");
        world.users.insert(email.clone(), created);
    }
    let authed = auth::authenticate_user(&app, &email, TEST_PASSWORD)
        .await
        .expect("authenticate user");
    world.current = CurrentUser(Some(authed));
}

#[given(regex = r#"^a saved trip named "([^"]+)"$"#)]
#[when(regex = r#"^I save a new trip named "([^"]+)"$"#)]
async fn save_new_trip(world: &mut AppWorld, name: String) {
    tick().await;
    let app = world.app_state().clone();
    let saved = planner::create_and_save(&app, &world.current, &name, None)
        .await
        .expect("create trip");
    world.trips.insert(name, saved.trip);
}

#[when(regex = r#"^I save a new trip named "([^"]+)" with a snapshot labelled "([^"]+)"$"#)]
async fn save_new_trip_with_snapshot(world: &mut AppWorld, name: String, label: String) {
    tick().await;
    let app = world.app_state().clone();
    let snapshot = make_snapshot(&label);
    world.snapshots.insert(label, snapshot.clone());
    let saved = planner::create_and_save(&app, &world.current, &name, Some(snapshot))
        .await
        .expect("create trip with snapshot");
    assert!(saved.version.is_some(), "a version should have been written");
    world.trips.insert(name, saved.trip);
}

#[when(regex = r#"^I try to save a new trip named "([^"]+)"$"#)]
async fn try_save_new_trip(world: &mut AppWorld, name: String) {
    let app = world.app_state().clone();
    world.last_error = planner::create_and_save(&app, &world.current, &name, None)
        .await
        .err();
}

#[when(regex = r#"^I rename the trip "([^"]+)" to "([^"]+)"$"#)]
async fn rename_trip(world: &mut AppWorld, name: String, new_name: String) {
    tick().await;
    let app = world.app_state().clone();
    let trip_id = world.trip(&name).id.clone();
    let saved = planner::update_and_save(&app, &world.current, &trip_id, Some(&new_name), None)
        .await
        .expect("rename trip");
    world.trips.remove(&name);
    world.trips.insert(new_name, saved.trip);
}

#[when(regex = r#"^I try to rename the trip "([^"]+)" to "([^"]+)"$"#)]
async fn try_rename_trip(world: &mut AppWorld, name: String, new_name: String) {
    let app = world.app_state().clone();
    let trip_id = world.trip(&name).id.clone();
    world.last_error =
        planner::update_and_save(&app, &world.current, &trip_id, Some(&new_name), None)
            .await
            .err();
}

#[when(regex = r#"^I append a snapshot labelled "([^"]+)" to the trip "([^"]+)"$"#)]
async fn append_snapshot(world: &mut AppWorld, label: String, name: String) {
    tick().await;
    let app = world.app_state().clone();
    let trip_id = world.trip(&name).id.clone();
    let snapshot = make_snapshot(&label);
    world.snapshots.insert(label, snapshot.clone());
    let saved = planner::update_and_save(&app, &world.current, &trip_id, None, Some(snapshot))
        .await
        .expect("append snapshot");
    assert!(saved.version.is_some(), "a version should have been written");
    world.trips.insert(name, saved.trip);
}

#[when(regex = r#"^I delete the trip "([^"]+)"$"#)]
async fn delete_trip(world: &mut AppWorld, name: String) {
    let app = world.app_state().clone();
    let trip_id = world.trip(&name).id.clone();
    planner::delete(&app, &world.current, &trip_id)
        .await
        .expect("delete trip");
    // The handle stays in the map so later steps can probe the deleted trip.
}

#[when(regex = r#"^I try to delete the trip "([^"]+)"$"#)]
async fn try_delete_trip(world: &mut AppWorld, name: String) {
    let app = world.app_state().clone();
    let trip_id = world.trip(&name).id.clone();
    world.last_error = planner::delete(&app, &world.current, &trip_id).await.err();
}

#[then(regex = r"^my trip list contains exactly (\d+) trips?$")]
async fn then_list_len(world: &mut AppWorld, expected: usize) {
    let trips = planner::list(world.app_state(), &world.current)
        .await
        .expect("list trips");
    assert_eq!(trips.len(), expected);
}

#[then(regex = r#"^the trip at position (\d+) in my list is named "([^"]+)"$"#)]
async fn then_list_position(world: &mut AppWorld, position: usize, name: String) {
    let trips = planner::list(world.app_state(), &world.current)
        .await
        .expect("list trips");
    let trip = trips
        .get(position - 1)
        .unwrap_or_else(|| panic!("list has only {} trips", trips.len()));
    assert_eq!(trip.name, name);
}

#[then(regex = r#"^loading the trip "([^"]+)" succeeds$"#)]
async fn then_load_succeeds(world: &mut AppWorld, name: String) {
    let app = world.app_state().clone();
    let trip_id = world.trip(&name).id.clone();
    let view = planner::load(&app, &world.current, &trip_id)
        .await
        .expect("load trip");
    assert_eq!(view.trip.name, name);
    world.last_view = Some(view);
}

#[then(regex = r#"^loading the trip "([^"]+)" fails as not found$"#)]
async fn then_load_not_found(world: &mut AppWorld, name: String) {
    let app = world.app_state().clone();
    let trip_id = world.trip(&name).id.clone();
    let result = planner::load(&app, &world.current, &trip_id).await;
    assert!(
        matches!(result, Err(AppError::NotFound)),
        "expected NotFound, got {result:?}"
    );
}

#[then(regex = r#"^loading the trip "([^"]+)" returns no snapshot$"#)]
async fn then_load_blank(world: &mut AppWorld, name: String) {
    let app = world.app_state().clone();
    let trip_id = world.trip(&name).id.clone();
    let view = planner::load(&app, &world.current, &trip_id)
        .await
        .expect("load trip");
    assert!(view.snapshot.is_none(), "expected a blank canvas");
}

#[then("the loaded trip was updated strictly after it was created")]
async fn then_updated_after_created(world: &mut AppWorld) {
    let view = world.last_view.as_ref().expect("a trip was loaded");
    assert!(
        view.trip.updated_at > view.trip.created_at,
        "updated_at {} should be after created_at {}",
        view.trip.updated_at,
        view.trip.created_at
    );
}

#[then(regex = r#"^the latest snapshot for the trip "([^"]+)" is the one labelled "([^"]+)"$"#)]
async fn then_latest_snapshot(world: &mut AppWorld, name: String, label: String) {
    let app = world.app_state().clone();
    let trip_id = world.trip(&name).id.clone();
    let view = planner::load(&app, &world.current, &trip_id)
        .await
        .expect("load trip");
    let snapshot = view.snapshot.expect("a snapshot should have been saved");
    assert_eq!(&snapshot, world.snapshot(&label));
}

#[then(regex = r#"^the trip "([^"]+)" has (\d+) whiteboard versions$"#)]
async fn then_version_count(world: &mut AppWorld, name: String, expected: usize) {
    let app = world.app_state().clone();
    let trip_id = world.trip(&name).id.clone();
    let versions = planner::history(&app, &world.current, &trip_id)
        .await
        .expect("load history");
    assert_eq!(versions.len(), expected);
}

#[then(regex = r#"^the trip "([^"]+)" has no whiteboard versions left$"#)]
async fn then_versions_gone(world: &mut AppWorld, name: String) {
    // Probe the store directly with the stale trip handle: even a caller
    // still holding the deleted trip must see an empty history.
    let app = world.app_state().clone();
    let trip = world.trip(&name).clone();
    let latest = app.whiteboards.latest(&trip).await.expect("query latest");
    assert!(latest.is_none(), "latest should be gone after cascade");
    let history = app.whiteboards.history(&trip).await.expect("query history");
    assert!(history.is_empty(), "history should be gone after cascade");
}

#[then("the attempt is rejected as a duplicate account")]
async fn then_duplicate_rejected(world: &mut AppWorld) {
    let err = world.take_error();
    assert!(
        matches!(err, AppError::Conflict(_)),
        "expected Conflict, got {err:?}"
    );
}

#[then("the attempt fails because no one is signed in")]
async fn then_unauthenticated(world: &mut AppWorld) {
    let err = world.take_error();
    assert!(
        matches!(err, AppError::Unauthorized),
        "expected Unauthorized, got {err:?}"
    );
}

#[then("the attempt fails as not found")]
async fn then_attempt_not_found(world: &mut AppWorld) {
    let err = world.take_error();
    assert!(
        matches!(err, AppError::NotFound),
        "expected NotFound, got {err:?}"
    );
}

#[then("no trip rows exist at all")]
async fn then_no_trip_rows(world: &mut AppWorld) {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM trips")
        .fetch_one(&world.app_state().db)
        .await
        .expect("count trips");
    assert_eq!(count, 0);
}

#[tokio::main]
async fn main() {
    AppWorld::cucumber()
        .fail_on_skipped()
        .with_default_cli()
        .run("tests/features")
        .await;
}
