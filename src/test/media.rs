#[cfg(test)]
mod tests {
    use rocket::http::{ContentType, Method, Status};
    use rocket::local::asynchronous::Client;
    use serde_json::{Value, json};

    use crate::api::Envelope;
    use crate::test::test_utils::{
        MANAGER, STAFF, bearer, create_standard_test_db, get_json, login_test_user,
        read_envelope, send_json, setup_test_client,
    };

    const BOUNDARY: &str = "X-WELFARE-OPS-BOUNDARY";

    fn multipart_body(file_name: &str, mime: &str, contents: &[u8]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
                file_name
            )
            .as_bytes(),
        );
        body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", mime).as_bytes());
        body.extend_from_slice(contents);
        body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
        body
    }

    async fn upload(client: &Client, token: &str, body: Vec<u8>) -> (Status, Envelope<Value>) {
        let content_type = ContentType::new("multipart", "form-data")
            .with_params(("boundary", BOUNDARY));
        let response = client
            .post("/api/media")
            .header(content_type)
            .header(bearer(token))
            .body(body)
            .dispatch()
            .await;
        let status = response.status();
        (status, read_envelope(response).await)
    }

    #[rocket::async_test]
    async fn test_media_upload_and_download() {
        let test_db = create_standard_test_db().await;
        let (app, _) = setup_test_client(test_db).await;
        let token = login_test_user(&app.client, STAFF).await;

        let contents = b"signature image bytes";
        let (status, envelope) = upload(
            &app.client,
            &token,
            multipart_body("sign.png", "image/png", contents),
        )
        .await;
        assert_eq!(status, Status::Created, "{}", envelope.message);

        let media = envelope.data.unwrap();
        let id = media["id"].as_i64().unwrap();
        assert_eq!(media["original_name"], "sign.png");
        assert_eq!(media["mime_type"], "image/png");
        assert_eq!(media["size"], contents.len());
        assert!(media["stored_name"].as_str().unwrap().ends_with(".png"));

        let (status, fetched) = get_json(&app.client, &token, &format!("/api/media/{}", id)).await;
        assert_eq!(status, Status::Ok);
        assert_eq!(fetched["id"], id);

        let response = app
            .client
            .get(format!("/api/media/{}/download", id))
            .header(bearer(&token))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        assert_eq!(response.content_type(), Some(ContentType::PNG));
        let disposition = response.headers().get_one("Content-Disposition").unwrap();
        assert!(disposition.contains("filename=\"sign.png\""), "{}", disposition);
        assert!(disposition.contains("filename*=UTF-8''sign.png"), "{}", disposition);
        assert_eq!(response.into_bytes().await.unwrap(), contents.to_vec());

        let (status, _) = send_json(
            &app.client,
            &token,
            Method::Delete,
            &format!("/api/media/{}", id),
            json!({}),
        )
        .await;
        assert_eq!(status, Status::Forbidden);

        let manager = login_test_user(&app.client, MANAGER).await;
        let (status, _) = send_json(
            &app.client,
            &manager,
            Method::Delete,
            &format!("/api/media/{}", id),
            json!({}),
        )
        .await;
        assert_eq!(status, Status::Ok);

        let response = app
            .client
            .get(format!("/api/media/{}/download", id))
            .header(bearer(&token))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::NotFound);
    }

    #[rocket::async_test]
    async fn test_empty_upload_is_rejected() {
        let test_db = create_standard_test_db().await;
        let (app, _) = setup_test_client(test_db).await;
        let token = login_test_user(&app.client, STAFF).await;

        let (status, envelope) =
            upload(&app.client, &token, multipart_body("empty.txt", "text/plain", b"")).await;
        assert_eq!(status, Status::UnprocessableEntity);
        assert!(!envelope.success);
        assert!(envelope.data.is_none());
    }
}
