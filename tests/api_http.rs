use actix_web::dev::{Service, ServiceResponse};
use actix_web::http::{header, StatusCode};
use actix_web::test::TestRequest;
use actix_web::{test, web, App, Error};
use httpmock::MockServer;
use serde_json::{json, Value};

use wordgate::api;
use wordgate::api::auth::issue_token;

mod support;

use support::{build_multipart_body, mock_gateway_ok, principal, Harness, JWT_SECRET};

const BOUNDARY: &str = "----wordgate-boundary";

fn bearer(user_id: i32) -> String {
    let token = issue_token(JWT_SECRET, &principal(user_id), chrono::Duration::hours(1))
        .expect("token");
    format!("Bearer {token}")
}

fn status_of<B>(result: &Result<ServiceResponse<B>, Error>) -> StatusCode {
    match result {
        Ok(resp) => resp.status(),
        Err(e) => e.as_response_error().status_code(),
    }
}

fn upload_request(user_id: i32, filename: &str, data: &[u8]) -> TestRequest {
    TestRequest::post()
        .uri("/api/upload")
        .insert_header((header::AUTHORIZATION, bearer(user_id)))
        .insert_header((
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        ))
        .set_payload(build_multipart_body(
            BOUNDARY,
            "file",
            filename,
            "text/plain",
            data,
        ))
}

#[actix_web::test]
async fn pay_upload_count_download_delete() {
    let server = MockServer::start_async().await;
    let gateway = mock_gateway_ok(
        &server,
        json!({"result": "true", "payment_url": "https://sandbox.pay.test/p/1"}),
    );

    let h = Harness::new(&server.base_url());
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(h.state.clone()))
            .configure(api::configure),
    )
    .await;

    // Initiate
    let req = TestRequest::post()
        .uri("/api/initiate-payment")
        .insert_header((header::AUTHORIZATION, bearer(1)))
        .set_json(json!({"payment_method": "VISA"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["redirect_url"], "https://sandbox.pay.test/p/1");
    let tran_id = body["transaction_ref"].as_str().expect("ref").to_string();
    gateway.assert();

    // Gateway posts the success form back
    let req = TestRequest::post()
        .uri("/payment/success")
        .insert_header((header::CONTENT_TYPE, "application/x-www-form-urlencoded"))
        .set_payload(format!("tran_id={tran_id}&pay_status=Successful&amount=100"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(
        resp.headers().get(header::LOCATION).expect("location"),
        format!("/dashboard/?payment=success&tran_id={tran_id}").as_str()
    );

    // Upload
    let req = upload_request(1, "hello.txt", b"the quick brown fox").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "File uploaded and processing started.");
    assert_eq!(body["file"]["status"], "processing");
    assert!(body["file"].get("stored_path").is_none());
    let file_id = body["file"]["id"].as_i64().expect("file id");

    h.queue.drain(&h.worker).await;

    // List
    let req = TestRequest::get()
        .uri("/api/files")
        .insert_header((header::AUTHORIZATION, bearer(1)))
        .to_request();
    let files: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(files[0]["status"], "completed");
    assert_eq!(files[0]["word_count"], 4);

    // Download
    let req = TestRequest::get()
        .uri(&format!("/api/files/{file_id}/download"))
        .insert_header((header::AUTHORIZATION, bearer(1)))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let disposition = resp
        .headers()
        .get(header::CONTENT_DISPOSITION)
        .expect("disposition")
        .to_str()
        .expect("ascii")
        .to_string();
    assert!(disposition.starts_with("attachment"));
    assert!(disposition.contains("hello.txt"));
    let bytes = test::read_body(resp).await;
    assert_eq!(&bytes[..], b"the quick brown fox");

    // Someone else cannot see it
    let req = TestRequest::get()
        .uri(&format!("/api/files/{file_id}/download"))
        .insert_header((header::AUTHORIZATION, bearer(2)))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    // Dashboard
    let req = TestRequest::get()
        .uri("/api/dashboard")
        .insert_header((header::AUTHORIZATION, bearer(1)))
        .to_request();
    let dashboard: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(dashboard["has_payment"], true);
    assert_eq!(dashboard["files"].as_array().map(Vec::len), Some(1));
    assert_eq!(dashboard["transactions"][0]["status"], "success");
    let actions: Vec<&str> = dashboard["activities"]
        .as_array()
        .expect("activities")
        .iter()
        .filter_map(|e| e["action"].as_str())
        .collect();
    assert_eq!(
        actions,
        vec![
            "file_downloaded",
            "file_processed",
            "file_uploaded",
            "payment_success",
            "payment_initiated"
        ]
    );

    // Delete
    let req = TestRequest::delete()
        .uri(&format!("/api/files/{file_id}"))
        .insert_header((header::AUTHORIZATION, bearer(1)))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["message"], "File deleted successfully");

    let req = TestRequest::get()
        .uri("/api/transactions")
        .insert_header((header::AUTHORIZATION, bearer(1)))
        .to_request();
    let transactions: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(transactions[0]["transaction_ref"], tran_id.as_str());
}

#[actix_web::test]
async fn api_requires_a_valid_bearer_token() {
    let h = Harness::new("http://127.0.0.1:9");
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(h.state.clone()))
            .configure(api::configure),
    )
    .await;

    let req = TestRequest::get().uri("/api/files").to_request();
    assert_eq!(status_of(&app.call(req).await), StatusCode::UNAUTHORIZED);

    let req = TestRequest::get()
        .uri("/api/files")
        .insert_header((header::AUTHORIZATION, "Bearer not-a-jwt"))
        .to_request();
    assert_eq!(status_of(&app.call(req).await), StatusCode::UNAUTHORIZED);

    let forged = issue_token("other-secret", &principal(1), chrono::Duration::hours(1))
        .expect("token");
    let req = TestRequest::get()
        .uri("/api/files")
        .insert_header((header::AUTHORIZATION, format!("Bearer {forged}")))
        .to_request();
    assert_eq!(status_of(&app.call(req).await), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn upload_errors_map_to_status_codes() {
    let h = Harness::new("http://127.0.0.1:9");
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(h.state.clone()))
            .configure(api::configure),
    )
    .await;

    let req = upload_request(5, "a.txt", b"hello").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::PAYMENT_REQUIRED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "payment_required");

    h.grant_payment(5).await;

    let req = upload_request(5, "malware.exe", b"MZ").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "unsupported_type");

    let big = vec![b'a'; wordgate::files::MAX_UPLOAD_BYTES + 1];
    let req = upload_request(5, "big.txt", &big).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);

    assert_eq!(h.store.file_count().expect("count"), 0);
    assert!(h.queue.pending().is_empty());
}

#[actix_web::test]
async fn upload_without_file_part() {
    let h = Harness::new("http://127.0.0.1:9");
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(h.state.clone()))
            .configure(api::configure),
    )
    .await;

    let empty_form = || {
        TestRequest::post()
            .uri("/api/upload")
            .insert_header((header::AUTHORIZATION, bearer(6)))
            .insert_header((
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            ))
            .set_payload(format!("--{BOUNDARY}--\r\n"))
            .to_request()
    };

    let resp = test::call_service(&app, empty_form()).await;
    assert_eq!(resp.status(), StatusCode::PAYMENT_REQUIRED);

    h.grant_payment(6).await;
    let resp = test::call_service(&app, empty_form()).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn callbacks_redirect_or_report_errors() {
    let h = Harness::new("http://127.0.0.1:9");
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(h.state.clone()))
            .configure(api::configure),
    )
    .await;

    let req = TestRequest::post()
        .uri("/payment/success")
        .insert_header((header::CONTENT_TYPE, "application/x-www-form-urlencoded"))
        .set_payload("tran_id=never-issued")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let req = TestRequest::post().uri("/payment/success").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let req = TestRequest::post()
        .uri("/payment/fail")
        .set_json(json!({"tran_id": "never-issued"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(
        resp.headers().get(header::LOCATION).expect("location"),
        "/dashboard/?payment=failed"
    );

    let tran_id = support::seed_transaction(&h.store, 7).await;
    let req = TestRequest::get()
        .uri(&format!("/payment/cancel?tran_id={tran_id}"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(
        resp.headers().get(header::LOCATION).expect("location"),
        "/dashboard/?payment=cancelled"
    );
    assert_eq!(
        h.transaction_status(&tran_id).await,
        wordgate::models::TransactionStatus::Failed
    );
    assert_eq!(h.ledger_actions(), vec!["payment_cancelled"]);
}
