#[cfg(test)]
mod tests {
    use rocket::http::{Method, Status};
    use serde_json::json;

    use crate::test::test_utils::{
        ADMIN, DAY, HOME, MANAGER, OTHER_STAFF, STAFF, create_standard_test_db, get_json,
        login_test_user, send_json, setup_test_client,
    };

    #[rocket::async_test]
    async fn test_admin_manages_facilities() {
        let test_db = create_standard_test_db().await;
        let (app, _) = setup_test_client(test_db).await;
        let token = login_test_user(&app.client, ADMIN).await;

        let (status, envelope) = send_json(
            &app.client,
            &token,
            Method::Post,
            "/api/facility",
            json!({
                "name": "あおぞらショートステイ",
                "facility_type": "short_stay",
                "postal_code": "100-0001",
                "capacity": 8
            }),
        )
        .await;
        assert_eq!(status, Status::Created);
        assert!(envelope.success);
        let facility = envelope.data.unwrap();
        let id = facility["id"].as_i64().unwrap();
        assert_eq!(facility["facility_type"], "short_stay");

        let (status, envelope) = send_json(
            &app.client,
            &token,
            Method::Put,
            &format!("/api/facility/{}", id),
            json!({
                "name": "あおぞらショートステイ",
                "facility_type": "short_stay",
                "capacity": 12
            }),
        )
        .await;
        assert_eq!(status, Status::Ok);
        assert_eq!(envelope.data.unwrap()["capacity"], 12);

        let (status, page) = get_json(&app.client, &token, "/api/facility").await;
        assert_eq!(status, Status::Ok);
        assert_eq!(page["total"], 3);

        let (status, page) =
            get_json(&app.client, &token, "/api/facility?facility_type=day_service").await;
        assert_eq!(status, Status::Ok);
        assert_eq!(page["total"], 1);
        assert_eq!(page["data"][0]["name"], DAY);

        let (status, _) = send_json(
            &app.client,
            &token,
            Method::Delete,
            &format!("/api/facility/{}", id),
            json!({}),
        )
        .await;
        assert_eq!(status, Status::Ok);

        let (status, _) = get_json(&app.client, &token, &format!("/api/facility/{}", id)).await;
        assert_eq!(status, Status::NotFound);
    }

    #[rocket::async_test]
    async fn test_facility_validation() {
        let test_db = create_standard_test_db().await;
        let (app, _) = setup_test_client(test_db).await;
        let token = login_test_user(&app.client, ADMIN).await;

        let (status, envelope) = send_json(
            &app.client,
            &token,
            Method::Post,
            "/api/facility",
            json!({ "name": "", "facility_type": "group_home" }),
        )
        .await;
        assert_eq!(status, Status::UnprocessableEntity);
        assert!(!envelope.success);
        assert!(envelope.errors.unwrap().contains_key("name"));
    }

    #[rocket::async_test]
    async fn test_only_admin_writes_facilities() {
        let test_db = create_standard_test_db().await;
        let (app, test_db) = setup_test_client(test_db).await;
        let token = login_test_user(&app.client, MANAGER).await;

        let (status, envelope) = send_json(
            &app.client,
            &token,
            Method::Post,
            "/api/facility",
            json!({ "name": "新施設", "facility_type": "group_home" }),
        )
        .await;
        assert_eq!(status, Status::Forbidden);
        assert!(!envelope.success);

        let (status, _) = send_json(
            &app.client,
            &token,
            Method::Delete,
            &format!("/api/facility/{}", test_db.facility_id(HOME)),
            json!({}),
        )
        .await;
        assert_eq!(status, Status::Forbidden);
    }

    #[rocket::async_test]
    async fn test_facility_list_is_scoped() {
        let test_db = create_standard_test_db().await;
        let (app, test_db) = setup_test_client(test_db).await;

        let token = login_test_user(&app.client, STAFF).await;
        let (status, page) = get_json(&app.client, &token, "/api/facility").await;
        assert_eq!(status, Status::Ok);
        assert_eq!(page["total"], 1);
        assert_eq!(page["data"][0]["name"], HOME);

        let (status, _) = get_json(
            &app.client,
            &token,
            &format!("/api/facility/{}", test_db.facility_id(DAY)),
        )
        .await;
        assert_eq!(status, Status::Forbidden);

        let token = login_test_user(&app.client, OTHER_STAFF).await;
        let (status, page) = get_json(&app.client, &token, "/api/facility").await;
        assert_eq!(status, Status::Ok);
        assert_eq!(page["data"][0]["name"], DAY);
    }

    #[rocket::async_test]
    async fn test_facility_members() {
        let test_db = create_standard_test_db().await;
        let (app, test_db) = setup_test_client(test_db).await;
        let token = login_test_user(&app.client, ADMIN).await;
        let home = test_db.facility_id(HOME);

        let (status, members) =
            get_json(&app.client, &token, &format!("/api/facility/{}/users", home)).await;
        assert_eq!(status, Status::Ok);
        assert_eq!(members.as_array().unwrap().len(), 2);

        let other = test_db.user_id(OTHER_STAFF);
        let (status, _) = send_json(
            &app.client,
            &token,
            Method::Post,
            &format!("/api/facility/{}/users", home),
            json!({ "user_id": other, "role": "staff" }),
        )
        .await;
        assert_eq!(status, Status::Ok);

        let (_, members) =
            get_json(&app.client, &token, &format!("/api/facility/{}/users", home)).await;
        assert_eq!(members.as_array().unwrap().len(), 3);

        let (status, _) = send_json(
            &app.client,
            &token,
            Method::Delete,
            &format!("/api/facility/{}/users/{}", home, other),
            json!({}),
        )
        .await;
        assert_eq!(status, Status::Ok);

        let (_, members) =
            get_json(&app.client, &token, &format!("/api/facility/{}/users", home)).await;
        assert_eq!(members.as_array().unwrap().len(), 2);
    }
}
