#[cfg(test)]
pub mod test_db {
    use crate::auth::Role;
    use crate::db::consultation::create_consultation;
    use crate::db::facility::create_facility;
    use crate::db::users::{NewUser, create_staff};
    use crate::error::AppError;
    use crate::models::consultation::{ConsultationInput, ConsultationStatus};
    use crate::models::facility::{FacilityInput, FacilityType};
    use chrono::NaiveDate;
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
    use sqlx::{Pool, Sqlite};
    use std::collections::HashMap;
    use std::str::FromStr;
    use std::sync::Once;

    static INIT: Once = Once::new();
    pub static STANDARD_PASSWORD: &str = "password123";

    #[derive(Default)]
    pub struct TestDbBuilder {
        facilities: Vec<TestFacility>,
        users: Vec<TestUser>,
        consultations: Vec<TestConsultation>,
    }

    pub struct TestFacility {
        pub name: String,
        pub facility_type: FacilityType,
    }

    pub struct TestUser {
        pub name: String,
        pub email: String,
        pub role: Role,
        pub password: String,
        pub facilities: Vec<String>,
    }

    pub struct TestConsultation {
        pub facility: String,
        pub applicant_name: String,
        pub status: ConsultationStatus,
    }

    impl TestDbBuilder {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn facility(mut self, name: &str, facility_type: FacilityType) -> Self {
            self.facilities.push(TestFacility {
                name: name.to_string(),
                facility_type,
            });
            self
        }

        pub fn user(mut self, email: &str, role: Role, facilities: &[&str]) -> Self {
            self.users.push(TestUser {
                name: email.split('@').next().unwrap_or(email).to_string(),
                email: email.to_string(),
                role,
                password: STANDARD_PASSWORD.to_string(),
                facilities: facilities.iter().map(|f| f.to_string()).collect(),
            });
            self
        }

        pub fn admin(self, email: &str) -> Self {
            self.user(email, Role::Admin, &[])
        }

        pub fn manager(self, email: &str, facilities: &[&str]) -> Self {
            self.user(email, Role::Manager, facilities)
        }

        pub fn staff(self, email: &str, facilities: &[&str]) -> Self {
            self.user(email, Role::Staff, facilities)
        }

        pub fn consultation(
            mut self,
            facility: &str,
            applicant_name: &str,
            status: ConsultationStatus,
        ) -> Self {
            self.consultations.push(TestConsultation {
                facility: facility.to_string(),
                applicant_name: applicant_name.to_string(),
                status,
            });
            self
        }

        pub async fn build(self) -> Result<TestDb, AppError> {
            INIT.call_once(|| {
                let _ = tracing_subscriber::fmt()
                    .with_env_filter("warn")
                    .with_test_writer()
                    .try_init();
            });

            let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
            let pool = SqlitePoolOptions::new()
                .max_connections(1)
                .connect_with(options)
                .await?;

            sqlx::migrate!("./migrations").run(&pool).await?;

            let mut facility_id_map: HashMap<String, i64> = HashMap::new();
            let mut user_id_map: HashMap<String, i64> = HashMap::new();
            let mut consultation_id_map: HashMap<String, i64> = HashMap::new();

            for facility in &self.facilities {
                let input = FacilityInput {
                    name: facility.name.clone(),
                    facility_type: facility.facility_type,
                    postal_code: None,
                    address: None,
                    phone: None,
                    capacity: Some(10),
                };
                let id = create_facility(&pool, &input).await?;
                facility_id_map.insert(facility.name.clone(), id);
            }

            for user in &self.users {
                let facility_ids: Vec<i64> = user
                    .facilities
                    .iter()
                    .filter_map(|name| facility_id_map.get(name).copied())
                    .collect();

                let new_user = NewUser {
                    name: user.name.clone(),
                    email: user.email.clone(),
                    password: user.password.clone(),
                    role: user.role,
                };
                let id = create_staff(&pool, &new_user, &facility_ids).await?;
                user_id_map.insert(user.email.clone(), id);
            }

            for consultation in &self.consultations {
                let Some(facility_id) = facility_id_map.get(&consultation.facility).copied()
                else {
                    continue;
                };

                let input = ConsultationInput {
                    facility_id,
                    consultation_date: NaiveDate::from_ymd_opt(2025, 4, 1).unwrap_or_default(),
                    applicant_name: consultation.applicant_name.clone(),
                    applicant_phone: None,
                    route: None,
                    content: Some("入居の相談".to_string()),
                    staff_id: None,
                    note: None,
                    family_members: Vec::new(),
                };
                let id = create_consultation(&pool, &input).await?;

                sqlx::query("UPDATE consultations SET status = ? WHERE id = ?")
                    .bind(consultation.status)
                    .bind(id)
                    .execute(&pool)
                    .await?;

                consultation_id_map.insert(consultation.applicant_name.clone(), id);
            }

            Ok(TestDb {
                pool,
                facility_id_map,
                user_id_map,
                consultation_id_map,
            })
        }
    }

    pub struct TestDb {
        pub pool: Pool<Sqlite>,
        pub facility_id_map: HashMap<String, i64>,
        pub user_id_map: HashMap<String, i64>,
        pub consultation_id_map: HashMap<String, i64>,
    }

    impl TestDb {
        pub fn facility_id(&self, name: &str) -> i64 {
            self.facility_id_map[name]
        }

        pub fn user_id(&self, email: &str) -> i64 {
            self.user_id_map[email]
        }

        pub fn consultation_id(&self, applicant_name: &str) -> i64 {
            self.consultation_id_map[applicant_name]
        }
    }
}

#[cfg(test)]
pub mod test_utils {
    use std::sync::{Arc, Mutex};

    use rocket::http::{ContentType, Header, Status};
    use rocket::local::asynchronous::{Client, LocalResponse};
    use serde::de::DeserializeOwned;
    use serde_json::{Value, json};

    use super::test_db::{STANDARD_PASSWORD, TestDb, TestDbBuilder};
    use crate::api::{Envelope, auth::LoginResponse};
    use crate::auth::{PasswordResetMailer, SharedMailer};
    use crate::error::AppError;
    use crate::init_rocket;
    use crate::models::consultation::ConsultationStatus;
    use crate::models::facility::FacilityType;

    pub const TEST_SECRET: &str = "test-secret-0123456789abcdef";

    pub const HOME: &str = "ひまわりホーム";
    pub const DAY: &str = "さくらデイサービス";

    pub const ADMIN: &str = "admin@example.com";
    pub const MANAGER: &str = "manager@example.com";
    pub const STAFF: &str = "staff@example.com";
    pub const OTHER_STAFF: &str = "other@example.com";

    pub const ACCEPTED: &str = "山田 太郎";
    pub const PENDING: &str = "佐藤 花子";
    pub const OTHER_ACCEPTED: &str = "鈴木 一郎";

    /// Keeps every reset token handed to it.
    #[derive(Default)]
    pub struct CapturingMailer {
        pub sent: Mutex<Vec<(String, String)>>,
    }

    impl CapturingMailer {
        pub fn last_token_for(&self, email: &str) -> Option<String> {
            self.sent.lock().ok().and_then(|sent| {
                sent.iter()
                    .rev()
                    .find(|(to, _)| to == email)
                    .map(|(_, token)| token.clone())
            })
        }
    }

    impl PasswordResetMailer for CapturingMailer {
        fn send_reset_token(&self, email: &str, token: &str) -> Result<(), AppError> {
            if let Ok(mut sent) = self.sent.lock() {
                sent.push((email.to_string(), token.to_string()));
            }
            Ok(())
        }
    }

    pub struct TestApp {
        pub client: Client,
        pub mailer: Arc<CapturingMailer>,
    }

    pub async fn create_standard_test_db() -> TestDb {
        TestDbBuilder::new()
            .facility(HOME, FacilityType::GroupHome)
            .facility(DAY, FacilityType::DayService)
            .admin(ADMIN)
            .manager(MANAGER, &[HOME])
            .staff(STAFF, &[HOME])
            .staff(OTHER_STAFF, &[DAY])
            .consultation(HOME, ACCEPTED, ConsultationStatus::Accepted)
            .consultation(HOME, PENDING, ConsultationStatus::Pending)
            .consultation(DAY, OTHER_ACCEPTED, ConsultationStatus::Accepted)
            .build()
            .await
            .expect("Failed to build standard test database")
    }

    pub async fn setup_test_client(test_db: TestDb) -> (TestApp, TestDb) {
        let media_root =
            std::env::temp_dir().join(format!("welfare-ops-test-{}", uuid::Uuid::new_v4()));

        let figment = rocket::Config::figment()
            .merge(("jwt_secret", TEST_SECRET))
            .merge(("media_root", media_root))
            .merge(("log_level", "off"));

        let mailer = Arc::new(CapturingMailer::default());
        let shared: SharedMailer = mailer.clone();

        let rocket = init_rocket(test_db.pool.clone(), figment, shared)
            .expect("Failed to build rocket instance");
        let client = Client::tracked(rocket)
            .await
            .expect("Failed to create test client");

        (TestApp { client, mailer }, test_db)
    }

    pub fn bearer(token: &str) -> Header<'static> {
        Header::new("Authorization", format!("Bearer {}", token))
    }

    pub async fn read_envelope<T: DeserializeOwned>(response: LocalResponse<'_>) -> Envelope<T> {
        let body = response
            .into_string()
            .await
            .expect("Response body missing");
        serde_json::from_str(&body).unwrap_or_else(|e| panic!("Unexpected body {}: {}", body, e))
    }

    pub async fn login(client: &Client, email: &str, password: &str) -> LoginResponse {
        let response = client
            .post("/api/auth/login")
            .header(ContentType::JSON)
            .body(json!({ "email": email, "password": password }).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok, "login failed for {}", email);

        read_envelope::<LoginResponse>(response)
            .await
            .data
            .expect("Login response without data")
    }

    /// Access token for a seeded user.
    pub async fn login_test_user(client: &Client, email: &str) -> String {
        login(client, email, STANDARD_PASSWORD).await.tokens.access_token
    }

    pub async fn get_json(client: &Client, token: &str, uri: &str) -> (Status, Value) {
        let response = client.get(uri.to_string()).header(bearer(token)).dispatch().await;
        let status = response.status();
        (status, read_envelope::<Value>(response).await.data.unwrap_or(Value::Null))
    }

    pub async fn send_json(
        client: &Client,
        token: &str,
        method: rocket::http::Method,
        uri: &str,
        body: Value,
    ) -> (Status, Envelope<Value>) {
        let response = client
            .req(method, uri.to_string())
            .header(ContentType::JSON)
            .header(bearer(token))
            .body(body.to_string())
            .dispatch()
            .await;
        let status = response.status();
        (status, read_envelope::<Value>(response).await)
    }
}
