#[cfg(test)]
mod tests {
    use rocket::http::{ContentType, Method, Status};
    use serde_json::{Value, json};

    use crate::api::Envelope;
    use crate::test::test_utils::{
        ADMIN, DAY, HOME, MANAGER, OTHER_STAFF, PENDING, STAFF, create_standard_test_db,
        get_json, login_test_user, read_envelope, send_json, setup_test_client,
    };

    #[rocket::async_test]
    async fn test_health_is_public() {
        let test_db = create_standard_test_db().await;
        let (app, _) = setup_test_client(test_db).await;

        let response = app.client.get("/api/health").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        assert_eq!(response.into_string().await.unwrap(), "OK");
    }

    #[rocket::async_test]
    async fn test_protected_routes_require_authentication() {
        let test_db = create_standard_test_db().await;
        let (app, _) = setup_test_client(test_db).await;

        for uri in [
            "/api/consultation",
            "/api/service-user",
            "/api/daily-report",
            "/api/incident",
            "/api/support-plan",
            "/api/manager",
        ] {
            let response = app.client.get(uri).dispatch().await;
            assert_eq!(response.status(), Status::Unauthorized, "{}", uri);

            let envelope: Envelope<Value> = read_envelope(response).await;
            assert!(!envelope.success);
        }

        let response = app
            .client
            .post("/api/consultation")
            .header(ContentType::JSON)
            .body(json!({}).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Unauthorized);
    }

    #[rocket::async_test]
    async fn test_staff_cannot_delete() {
        let test_db = create_standard_test_db().await;
        let (app, test_db) = setup_test_client(test_db).await;
        let uri = format!("/api/consultation/{}", test_db.consultation_id(PENDING));

        let token = login_test_user(&app.client, STAFF).await;
        let (status, envelope) =
            send_json(&app.client, &token, Method::Delete, &uri, json!({})).await;
        assert_eq!(status, Status::Forbidden);
        assert!(!envelope.success);

        let token = login_test_user(&app.client, MANAGER).await;
        let (status, _) = send_json(&app.client, &token, Method::Delete, &uri, json!({})).await;
        assert_eq!(status, Status::Ok);

        let (status, _) = get_json(&app.client, &token, &uri).await;
        assert_eq!(status, Status::NotFound);
    }

    #[rocket::async_test]
    async fn test_other_facility_is_forbidden() {
        let test_db = create_standard_test_db().await;
        let (app, test_db) = setup_test_client(test_db).await;
        let token = login_test_user(&app.client, OTHER_STAFF).await;

        let (status, _) = get_json(
            &app.client,
            &token,
            &format!("/api/consultation/{}", test_db.consultation_id(PENDING)),
        )
        .await;
        assert_eq!(status, Status::Forbidden);

        let (status, _) = send_json(
            &app.client,
            &token,
            Method::Post,
            "/api/daily-report",
            json!({
                "facility_id": test_db.facility_id(HOME),
                "report_date": "2025-06-01"
            }),
        )
        .await;
        assert_eq!(status, Status::Forbidden);

        let (status, _) = send_json(
            &app.client,
            &token,
            Method::Post,
            "/api/daily-report",
            json!({
                "facility_id": test_db.facility_id(DAY),
                "report_date": "2025-06-01"
            }),
        )
        .await;
        assert_eq!(status, Status::Created);

        // Lists only return rows from assigned facilities.
        let (status, page) = get_json(&app.client, &token, "/api/consultation").await;
        assert_eq!(status, Status::Ok);
        assert_eq!(page["total"], 1);
        assert_eq!(page["data"][0]["facility_id"], test_db.facility_id(DAY));
    }

    #[rocket::async_test]
    async fn test_manager_cannot_create_admin() {
        let test_db = create_standard_test_db().await;
        let (app, test_db) = setup_test_client(test_db).await;
        let body = json!({
            "name": "新しい管理者",
            "email": "new-admin@example.com",
            "password": "password123",
            "role": "admin",
            "facility_ids": [test_db.facility_id(HOME)]
        });

        let token = login_test_user(&app.client, MANAGER).await;
        let (status, _) =
            send_json(&app.client, &token, Method::Post, "/api/manager", body.clone()).await;
        assert_eq!(status, Status::Forbidden);

        let token = login_test_user(&app.client, ADMIN).await;
        let (status, envelope) =
            send_json(&app.client, &token, Method::Post, "/api/manager", body.clone()).await;
        assert_eq!(status, Status::Created, "{:?}", envelope.errors);

        let (status, _) = send_json(&app.client, &token, Method::Post, "/api/manager", body).await;
        assert_eq!(status, Status::Conflict);
    }

    #[rocket::async_test]
    async fn test_pagination_envelope() {
        let test_db = create_standard_test_db().await;
        let (app, test_db) = setup_test_client(test_db).await;
        let token = login_test_user(&app.client, STAFF).await;

        for day in 1..=5 {
            let (status, _) = send_json(
                &app.client,
                &token,
                Method::Post,
                "/api/daily-report",
                json!({
                    "facility_id": test_db.facility_id(HOME),
                    "report_date": format!("2025-07-{:02}", day),
                    "summary": format!("{}日目", day)
                }),
            )
            .await;
            assert_eq!(status, Status::Created);
        }

        let response = app
            .client
            .get("/api/daily-report?per_page=2&page=2&sortBy=report_date&sortDirection=asc")
            .header(crate::test::test_utils::bearer(&token))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);

        let envelope: Envelope<Value> = read_envelope(response).await;
        assert!(envelope.success);
        let page = envelope.data.unwrap();
        assert_eq!(page["total"], 5);
        assert_eq!(page["per_page"], 2);
        assert_eq!(page["current_page"], 2);
        assert_eq!(page["last_page"], 3);
        assert_eq!(page["from"], 3);
        assert_eq!(page["to"], 4);
        assert_eq!(page["data"][0]["report_date"], "2025-07-03");

        let (_, page) = get_json(
            &app.client,
            &token,
            "/api/daily-report?search=5%E6%97%A5%E7%9B%AE",
        )
        .await;
        assert_eq!(page["total"], 1);

        // Unknown sort columns fall back to the default order.
        let (status, page) =
            get_json(&app.client, &token, "/api/daily-report?sortBy=password").await;
        assert_eq!(status, Status::Ok);
        assert_eq!(page["total"], 5);
    }
}
