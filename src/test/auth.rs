#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rocket::http::{ContentType, Method, Status};
    use serde_json::{Value, json};

    use crate::api::Envelope;
    use crate::api::auth::LoginResponse;
    use crate::auth::{User, hash_token};
    use crate::db::users::clean_expired_tokens;
    use crate::test::test_db::STANDARD_PASSWORD;
    use crate::test::test_utils::{
        ADMIN, HOME, MANAGER, STAFF, bearer, create_standard_test_db, get_json, login,
        login_test_user, read_envelope, send_json, setup_test_client,
    };

    #[rocket::async_test]
    async fn test_login_api() {
        let test_db = create_standard_test_db().await;
        let (app, test_db) = setup_test_client(test_db).await;

        let login_response = login(&app.client, STAFF, STANDARD_PASSWORD).await;
        assert_eq!(login_response.user.email, STAFF);
        assert_eq!(login_response.tokens.token_type, "Bearer");
        assert!(login_response.tokens.expires_in > 0);
        assert_eq!(
            login_response.user.facility_ids,
            vec![test_db.facility_id(crate::test::test_utils::HOME)]
        );

        let response = app
            .client
            .post("/api/auth/login")
            .header(ContentType::JSON)
            .body(json!({ "email": STAFF, "password": "wrong_password" }).to_string())
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Unauthorized);
        let envelope: Envelope<Value> = read_envelope(response).await;
        assert!(!envelope.success);
        assert!(envelope.data.is_none());
    }

    #[rocket::async_test]
    async fn test_login_validation_errors() {
        let test_db = create_standard_test_db().await;
        let (app, _) = setup_test_client(test_db).await;

        let response = app
            .client
            .post("/api/auth/login")
            .header(ContentType::JSON)
            .body(json!({ "email": "not-an-email", "password": "" }).to_string())
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::UnprocessableEntity);
        let envelope: Envelope<Value> = read_envelope(response).await;
        let errors = envelope.errors.expect("field errors expected");
        assert!(errors.contains_key("email"));
        assert!(errors.contains_key("password"));
    }

    #[rocket::async_test]
    async fn test_inactive_user_cannot_login() {
        let test_db = create_standard_test_db().await;
        sqlx::query("UPDATE users SET is_active = 0 WHERE email = ?")
            .bind(STAFF)
            .execute(&test_db.pool)
            .await
            .unwrap();
        let (app, _) = setup_test_client(test_db).await;

        let response = app
            .client
            .post("/api/auth/login")
            .header(ContentType::JSON)
            .body(json!({ "email": STAFF, "password": STANDARD_PASSWORD }).to_string())
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Unauthorized);
    }

    #[rocket::async_test]
    async fn test_me_requires_token() {
        let test_db = create_standard_test_db().await;
        let (app, _) = setup_test_client(test_db).await;

        let response = app.client.get("/api/auth/me").dispatch().await;
        assert_eq!(response.status(), Status::Unauthorized);
        let envelope: Envelope<Value> = read_envelope(response).await;
        assert!(!envelope.success);

        let response = app
            .client
            .get("/api/auth/me")
            .header(bearer("not.a.token"))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Unauthorized);

        let token = login_test_user(&app.client, MANAGER).await;
        let response = app
            .client
            .get("/api/auth/me")
            .header(bearer(&token))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);

        let envelope: Envelope<User> = read_envelope(response).await;
        let user = envelope.data.unwrap();
        assert_eq!(user.email, MANAGER);
        assert_eq!(user.role.as_str(), "manager");
    }

    #[rocket::async_test]
    async fn test_refresh_token_rotation() {
        let test_db = create_standard_test_db().await;
        let (app, _) = setup_test_client(test_db).await;

        let first = login(&app.client, STAFF, STANDARD_PASSWORD).await;

        let response = app
            .client
            .post("/api/auth/refresh-token")
            .header(ContentType::JSON)
            .body(json!({ "refresh_token": first.tokens.refresh_token }).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);

        let rotated: Envelope<LoginResponse> = read_envelope(response).await;
        let rotated = rotated.data.unwrap();
        assert_ne!(rotated.tokens.refresh_token, first.tokens.refresh_token);

        // A consumed refresh token cannot be replayed.
        let response = app
            .client
            .post("/api/auth/refresh-token")
            .header(ContentType::JSON)
            .body(json!({ "refresh_token": first.tokens.refresh_token }).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Unauthorized);

        let response = app
            .client
            .post("/api/auth/refresh-token")
            .header(ContentType::JSON)
            .body(json!({ "refresh_token": rotated.tokens.refresh_token }).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
    }

    #[rocket::async_test]
    async fn test_logout_revokes_refresh_token() {
        let test_db = create_standard_test_db().await;
        let (app, _) = setup_test_client(test_db).await;

        let session = login(&app.client, STAFF, STANDARD_PASSWORD).await;

        let response = app
            .client
            .post("/api/auth/logout")
            .header(ContentType::JSON)
            .header(bearer(&session.tokens.access_token))
            .body(json!({ "refresh_token": session.tokens.refresh_token }).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);

        let response = app
            .client
            .post("/api/auth/refresh-token")
            .header(ContentType::JSON)
            .body(json!({ "refresh_token": session.tokens.refresh_token }).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Unauthorized);
    }

    #[rocket::async_test]
    async fn test_password_reset_flow() {
        let test_db = create_standard_test_db().await;
        let (app, test_db) = setup_test_client(test_db).await;

        let response = app
            .client
            .post("/api/auth/forgot-password")
            .header(ContentType::JSON)
            .body(json!({ "email": STAFF }).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);

        // Unknown addresses get the same answer and no mail.
        let response = app
            .client
            .post("/api/auth/forgot-password")
            .header(ContentType::JSON)
            .body(json!({ "email": "nobody@example.com" }).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        assert!(app.mailer.last_token_for("nobody@example.com").is_none());

        let token = app.mailer.last_token_for(STAFF).expect("reset token sent");

        let stored: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM password_resets WHERE token_hash = ?")
                .bind(hash_token(&token))
                .fetch_one(&test_db.pool)
                .await
                .unwrap();
        assert_eq!(stored, 1);

        let response = app
            .client
            .post("/api/auth/reset-password")
            .header(ContentType::JSON)
            .body(
                json!({
                    "email": STAFF,
                    "token": "wrong-token",
                    "password": "new-password-1",
                    "password_confirmation": "new-password-1"
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::UnprocessableEntity);

        let response = app
            .client
            .post("/api/auth/reset-password")
            .header(ContentType::JSON)
            .body(
                json!({
                    "email": STAFF,
                    "token": token,
                    "password": "new-password-1",
                    "password_confirmation": "new-password-1"
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);

        let response = app
            .client
            .post("/api/auth/login")
            .header(ContentType::JSON)
            .body(json!({ "email": STAFF, "password": STANDARD_PASSWORD }).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Unauthorized);

        let session = login(&app.client, STAFF, "new-password-1").await;
        assert_eq!(session.user.email, STAFF);
    }

    #[rocket::async_test]
    async fn test_profile_get_and_update() {
        let test_db = create_standard_test_db().await;
        let (app, _) = setup_test_client(test_db).await;
        let token = login_test_user(&app.client, STAFF).await;

        let (status, body) = get_json(&app.client, &token, "/api/profile").await;
        assert_eq!(status, Status::Ok);
        assert_eq!(body["user"]["email"], STAFF);
        assert!(body["profile"].is_null());

        let (status, envelope) = send_json(
            &app.client,
            &token,
            Method::Put,
            "/api/profile",
            json!({ "postal_code": "12-345", "gender": "unknown" }),
        )
        .await;
        assert_eq!(status, Status::UnprocessableEntity);
        let errors = envelope.errors.unwrap();
        assert!(errors.contains_key("postal_code"));
        assert!(errors.contains_key("gender"));

        let (status, envelope) = send_json(
            &app.client,
            &token,
            Method::Put,
            "/api/profile",
            json!({
                "full_name": "職員 一郎",
                "gender": "male",
                "postal_code": "150-0001",
                "phone": "03-1234-5678"
            }),
        )
        .await;
        assert_eq!(status, Status::Ok, "{:?}", envelope.errors);

        let (_, body) = get_json(&app.client, &token, "/api/profile").await;
        assert_eq!(body["profile"]["full_name"], "職員 一郎");
        assert_eq!(body["profile"]["user_type"], "user");
        assert_eq!(body["profile"]["postal_code"], "150-0001");
    }

    #[rocket::async_test]
    async fn test_password_change_signs_out_sessions() {
        let test_db = create_standard_test_db().await;
        let (app, test_db) = setup_test_client(test_db).await;
        let session = login(&app.client, STAFF, STANDARD_PASSWORD).await;
        let token = session.tokens.access_token.clone();

        let (status, envelope) = send_json(
            &app.client,
            &token,
            Method::Put,
            "/api/profile/password",
            json!({
                "current_password": "not-my-password",
                "password": "changed-password",
                "password_confirmation": "changed-password"
            }),
        )
        .await;
        assert_eq!(status, Status::UnprocessableEntity);
        assert!(envelope.errors.unwrap().contains_key("current_password"));

        let (status, _) = send_json(
            &app.client,
            &token,
            Method::Put,
            "/api/profile/password",
            json!({
                "current_password": STANDARD_PASSWORD,
                "password": "changed-password",
                "password_confirmation": "changed-password"
            }),
        )
        .await;
        assert_eq!(status, Status::Ok);

        let remaining: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM refresh_tokens WHERE user_id = ?")
                .bind(test_db.user_id(STAFF))
                .fetch_one(&test_db.pool)
                .await
                .unwrap();
        assert_eq!(remaining, 0);

        let response = app
            .client
            .post("/api/auth/refresh-token")
            .header(ContentType::JSON)
            .body(json!({ "refresh_token": session.tokens.refresh_token }).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Unauthorized);

        let response = app
            .client
            .post("/api/auth/login")
            .header(ContentType::JSON)
            .body(json!({ "email": STAFF, "password": STANDARD_PASSWORD }).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Unauthorized);

        let session = login(&app.client, STAFF, "changed-password").await;
        assert_eq!(session.user.email, STAFF);
    }

    #[rocket::async_test]
    async fn test_deleted_user_leaves_no_profile() {
        let test_db = create_standard_test_db().await;
        let (app, test_db) = setup_test_client(test_db).await;
        let admin = login_test_user(&app.client, ADMIN).await;

        let staff_body = |email: &str| {
            json!({
                "name": "臨時 職員",
                "email": email,
                "password": STANDARD_PASSWORD,
                "role": "staff",
                "facility_ids": [test_db.facility_id(HOME)]
            })
        };

        let (status, envelope) = send_json(
            &app.client,
            &admin,
            Method::Post,
            "/api/manager",
            staff_body("temp-1@example.com"),
        )
        .await;
        assert_eq!(status, Status::Created, "{:?}", envelope.errors);
        let first_id = envelope.data.unwrap()["id"].as_i64().unwrap();

        let token = login_test_user(&app.client, "temp-1@example.com").await;
        let (status, _) = send_json(
            &app.client,
            &token,
            Method::Put,
            "/api/profile",
            json!({ "full_name": "臨時 職員", "note": "退職予定" }),
        )
        .await;
        assert_eq!(status, Status::Ok);

        let (status, _) = send_json(
            &app.client,
            &admin,
            Method::Delete,
            &format!("/api/manager/{}", first_id),
            json!({}),
        )
        .await;
        assert_eq!(status, Status::Ok);

        let leftover: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM profiles WHERE user_id = ? AND user_type = 'user'",
        )
        .bind(first_id)
        .fetch_one(&test_db.pool)
        .await
        .unwrap();
        assert_eq!(leftover, 0);

        let (status, envelope) = send_json(
            &app.client,
            &admin,
            Method::Post,
            "/api/manager",
            staff_body("temp-2@example.com"),
        )
        .await;
        assert_eq!(status, Status::Created, "{:?}", envelope.errors);
        let second_id = envelope.data.unwrap()["id"].as_i64().unwrap();
        assert_ne!(second_id, first_id);

        let token = login_test_user(&app.client, "temp-2@example.com").await;
        let (status, body) = get_json(&app.client, &token, "/api/profile").await;
        assert_eq!(status, Status::Ok);
        assert!(body["profile"].is_null());
    }

    #[rocket::async_test]
    async fn test_clean_expired_tokens() {
        let test_db = create_standard_test_db().await;
        let (app, test_db) = setup_test_client(test_db).await;
        let session = login(&app.client, STAFF, STANDARD_PASSWORD).await;

        let past = Utc::now().naive_utc() - Duration::hours(1);
        let future = Utc::now().naive_utc() + Duration::hours(1);

        sqlx::query("INSERT INTO refresh_tokens (user_id, token_hash, expires_at) VALUES (?, ?, ?)")
            .bind(test_db.user_id(STAFF))
            .bind(hash_token("expired-refresh"))
            .bind(past)
            .execute(&test_db.pool)
            .await
            .unwrap();
        for (token, expires_at) in [("expired-reset", past), ("live-reset", future)] {
            sqlx::query("INSERT INTO password_resets (email, token_hash, expires_at) VALUES (?, ?, ?)")
                .bind(STAFF)
                .bind(hash_token(token))
                .bind(expires_at)
                .execute(&test_db.pool)
                .await
                .unwrap();
        }

        let removed = clean_expired_tokens(&test_db.pool).await.unwrap();
        assert_eq!(removed, 2);

        let resets: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM password_resets")
            .fetch_one(&test_db.pool)
            .await
            .unwrap();
        assert_eq!(resets, 1);

        // The login's own refresh token survives the sweep.
        let response = app
            .client
            .post("/api/auth/refresh-token")
            .header(ContentType::JSON)
            .body(json!({ "refresh_token": session.tokens.refresh_token }).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);

        assert_eq!(clean_expired_tokens(&test_db.pool).await.unwrap(), 0);
    }
}
