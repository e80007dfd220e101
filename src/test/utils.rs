#[cfg(test)]
pub mod test_utils {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex, Once};

    use rocket::http::{ContentType, Status};
    use rocket::local::asynchronous::Client;
    use serde_json::{Value, json};
    use tempfile::TempDir;

    use crate::api::LoginResponse;
    use crate::auth::{Credential, Identity};
    use crate::config::PortalConfig;
    use crate::error::AppError;
    use crate::init_rocket;
    use crate::models::{Coach, Material, Request, RequestStatus, School, User};
    use crate::seed::default_materials;
    use crate::storage::{Collection, JsonStore};
    use crate::sync::RemoteTable;

    static INIT: Once = Once::new();
    pub static STANDARD_PASSWORD: &str = "password123";

    pub fn init_test_logging() {
        INIT.call_once(|| {
            let _ = tracing_subscriber::fmt()
                .with_env_filter("debug")
                .with_test_writer()
                .try_init();
        });
    }

    pub fn admin_identity(ps_number: &str) -> Identity {
        Identity {
            ps_number: ps_number.to_string(),
            credential: Credential::Admin,
            name: "Admin User".to_string(),
        }
    }

    pub fn coach_identity(ps_number: &str) -> Identity {
        Identity {
            ps_number: ps_number.to_string(),
            credential: Credential::Coach,
            name: format!("Coach {}", ps_number),
        }
    }

    pub fn school(id: &str, coaches: &[&str]) -> School {
        School {
            id: id.to_string(),
            name: format!("School {}", id),
            city: "Lisbon".to_string(),
            coaches: coaches.iter().map(|c| c.to_string()).collect(),
        }
    }

    pub fn request(id: &str, owner: &str, status: RequestStatus) -> Request {
        Request {
            id: id.to_string(),
            school_id: "S1".to_string(),
            category: "Uniforms".to_string(),
            material: "Kimono A1".to_string(),
            quantity: 1,
            date: "2025-11-09T10:00:00Z".to_string(),
            ps_number: owner.to_string(),
            status,
            extra: Default::default(),
        }
    }

    #[derive(Default)]
    pub struct TestPortalBuilder {
        users: Vec<User>,
        coaches: Vec<Coach>,
        schools: Vec<School>,
        materials: Option<Vec<Material>>,
        requests: Vec<Request>,
    }

    impl TestPortalBuilder {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn admin(mut self, ps_number: &str, name: &str) -> Self {
            self.users.push(User {
                ps_number: ps_number.to_string(),
                password: STANDARD_PASSWORD.to_string(),
                credential: Credential::Admin,
                name: name.to_string(),
            });
            self
        }

        pub fn user_with_password(
            mut self,
            ps_number: &str,
            password: &str,
            credential: Credential,
        ) -> Self {
            self.users.push(User {
                ps_number: ps_number.to_string(),
                password: password.to_string(),
                credential,
                name: format!("User {}", ps_number),
            });
            self
        }

        pub fn roster_coach(mut self, ps_number: &str, name: &str) -> Self {
            self.coaches.push(Coach {
                ps_number: ps_number.to_string(),
                name: name.to_string(),
            });
            self
        }

        pub fn school(mut self, id: &str, coaches: &[&str]) -> Self {
            self.schools.push(school(id, coaches));
            self
        }

        pub fn material(mut self, category: &str, subcategory: &str, item: &str) -> Self {
            self.materials.get_or_insert_with(Vec::new).push(Material {
                category: category.to_string(),
                subcategory: subcategory.to_string(),
                item: item.to_string(),
            });
            self
        }

        pub fn request(mut self, id: &str, owner: &str, status: RequestStatus) -> Self {
            self.requests.push(request(id, owner, status));
            self
        }

        pub async fn build(self) -> Result<TestPortal, AppError> {
            init_test_logging();

            let dir = TempDir::new()?;
            let store = JsonStore::new(dir.path());

            store.save(Collection::Users, &self.users).await?;
            store.save(Collection::Coaches, &self.coaches).await?;
            store.save(Collection::Schools, &self.schools).await?;
            store
                .save(
                    Collection::Materials,
                    &self.materials.unwrap_or_else(default_materials),
                )
                .await?;
            store.save(Collection::Requests, &self.requests).await?;

            Ok(TestPortal { dir, store })
        }
    }

    pub struct TestPortal {
        pub dir: TempDir,
        pub store: JsonStore,
    }

    impl TestPortal {
        pub fn config(&self) -> PortalConfig {
            PortalConfig {
                data_dir: self.dir.path().to_path_buf(),
                ..PortalConfig::default()
            }
        }

        pub async fn requests(&self) -> Vec<Request> {
            self.store.load(Collection::Requests).await
        }

        pub async fn request(&self, id: &str) -> Option<Request> {
            self.requests().await.into_iter().find(|r| r.id == id)
        }
    }

    /// Admin `PS0`, coaches `PS1` (users file) and `PS2` (roster only),
    /// schools `S1` (PS1) and `S2` (PS2), one Pending and one Delivered
    /// request owned by PS1.
    pub async fn create_standard_test_portal() -> TestPortal {
        TestPortalBuilder::new()
            .admin("PS0", "Admin User")
            .user_with_password("PS1", "p", Credential::Coach)
            .roster_coach("PS2", "Roster Coach")
            .school("S1", &["PS1"])
            .school("S2", &["PS2"])
            .request("REQ-PENDING", "PS1", RequestStatus::Pending)
            .request("REQ-DELIVERED", "PS1", RequestStatus::Delivered)
            .build()
            .await
            .expect("Failed to build test portal")
    }

    pub async fn setup_test_client(
        portal: &TestPortal,
        remote: Option<Arc<dyn RemoteTable>>,
    ) -> Client {
        let rocket = init_rocket(portal.config(), remote)
            .await
            .expect("Failed to initialise rocket");

        Client::tracked(rocket)
            .await
            .expect("Failed to create test client")
    }

    pub async fn login_test_user(client: &Client, ps_number: &str, password: &str) -> LoginResponse {
        let response = client
            .post("/api/login")
            .header(ContentType::JSON)
            .body(json!({ "ps_number": ps_number, "password": password }).to_string())
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Ok);
        response
            .into_json::<LoginResponse>()
            .await
            .expect("Login response was not JSON")
    }

    /// In-memory stand-in for the remote table.
    #[derive(Default)]
    pub struct FakeRemote {
        pub rows: Mutex<Vec<Request>>,
        pub insert_calls: AtomicUsize,
        pub fail_on_insert: Option<usize>,
        pub unreachable: bool,
    }

    impl FakeRemote {
        pub fn failing_on_insert(call: usize) -> Self {
            Self {
                fail_on_insert: Some(call),
                ..Self::default()
            }
        }

        pub fn unreachable() -> Self {
            Self {
                unreachable: true,
                ..Self::default()
            }
        }

        pub fn row_ids(&self) -> Vec<String> {
            self.rows
                .lock()
                .unwrap()
                .iter()
                .map(|r| r.id.clone())
                .collect()
        }

        pub fn inserts(&self) -> usize {
            self.insert_calls.load(Ordering::SeqCst)
        }
    }

    #[rocket::async_trait]
    impl RemoteTable for FakeRemote {
        async fn select_ids(&self) -> Result<HashSet<String>, AppError> {
            if self.unreachable {
                return Err(AppError::ExternalService("connection refused".to_string()));
            }
            Ok(self.row_ids().into_iter().collect())
        }

        async fn insert(&self, record: &Request) -> Result<(), AppError> {
            let call = self.insert_calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_on_insert == Some(call) {
                return Err(AppError::ExternalService("insert rejected".to_string()));
            }
            self.rows.lock().unwrap().push(record.clone());
            Ok(())
        }

        async fn sample(&self, limit: usize) -> Result<Vec<Value>, AppError> {
            if self.unreachable {
                return Err(AppError::ExternalService("connection refused".to_string()));
            }
            Ok(self
                .rows
                .lock()
                .unwrap()
                .iter()
                .take(limit)
                .map(|r| serde_json::to_value(r).unwrap())
                .collect())
        }

        fn key_hint(&self) -> String {
            crate::sync::key_hint("fake-remote-key-0123456789")
        }
    }
}
