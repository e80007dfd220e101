#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rocket::http::{ContentType, Cookie, Status};
    use rocket::local::asynchronous::Client;
    use serde_json::json;

    use crate::api::SubmitResponse;
    use crate::auth::{Credential, Identity};
    use crate::models::{Material, Request, RequestStatus, School};
    use crate::storage::Collection;
    use crate::sync::{RemoteProbe, RemoteTable, SyncReport, SyncStatus};
    use crate::test::test_utils::{
        FakeRemote, STANDARD_PASSWORD, create_standard_test_portal, login_test_user,
        setup_test_client,
    };
    use crate::workflow::DeleteSummary;

    async fn add_kimono(client: &Client, school_id: &str, quantity: u32) -> Status {
        client
            .post("/api/batch")
            .header(ContentType::JSON)
            .body(
                json!({
                    "school_id": school_id,
                    "category": "Uniforms",
                    "material": "Kimono A1",
                    "quantity": quantity
                })
                .to_string(),
            )
            .dispatch()
            .await
            .status()
    }

    #[rocket::async_test]
    async fn test_login_api() {
        let portal = create_standard_test_portal().await;
        let client = setup_test_client(&portal, None).await;

        let login = login_test_user(&client, "PS1", "p").await;
        assert!(login.success);
        let identity = login.identity.expect("Identity missing");
        assert_eq!(identity.ps_number, "PS1");
        assert_eq!(identity.credential, Credential::Coach);

        let login = login_test_user(&client, "PS1", "wrong").await;
        assert!(!login.success);
        assert!(login.identity.is_none());
        assert_eq!(
            login.error.as_deref(),
            Some("Invalid PS number or password")
        );

        let roster = login_test_user(&client, "PS2", "PS2").await;
        assert!(roster.success);

        let admin = login_test_user(&client, "PS0", STANDARD_PASSWORD).await;
        assert_eq!(
            admin.identity.map(|i| i.credential),
            Some(Credential::Admin)
        );
    }

    #[rocket::async_test]
    async fn test_login_requires_ps_number() {
        let portal = create_standard_test_portal().await;
        let client = setup_test_client(&portal, None).await;

        let response = client
            .post("/api/login")
            .header(ContentType::JSON)
            .body(json!({ "ps_number": "", "password": "x" }).to_string())
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::UnprocessableEntity);
    }

    #[rocket::async_test]
    async fn test_auth_required_apis() {
        let portal = create_standard_test_portal().await;
        let client = setup_test_client(&portal, None).await;

        let endpoints = vec![
            "/api/me",
            "/api/schools",
            "/api/materials",
            "/api/materials/categories",
            "/api/batch",
            "/api/requests",
            "/api/admin/schools",
            "/api/admin/sync/status",
        ];

        for endpoint in endpoints {
            let response = client.get(endpoint).dispatch().await;
            assert_eq!(
                response.status(),
                Status::Unauthorized,
                "Endpoint {} did not require authentication",
                endpoint
            );
        }

        let health = client.get("/api/health").dispatch().await;
        assert_eq!(health.status(), Status::Ok);
    }

    #[rocket::async_test]
    async fn test_forged_session_is_rejected() {
        let portal = create_standard_test_portal().await;
        let client = setup_test_client(&portal, None).await;

        let response = client
            .get("/api/me")
            .private_cookie(Cookie::new("session_token", "fake_token"))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Unauthorized);

        login_test_user(&client, "PS1", "p").await;
        let response = client.get("/api/me").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        let me: Identity = response.into_json().await.expect("Invalid JSON");
        assert_eq!(me.ps_number, "PS1");
    }

    #[rocket::async_test]
    async fn test_logout_ends_session() {
        let portal = create_standard_test_portal().await;
        let client = setup_test_client(&portal, None).await;

        login_test_user(&client, "PS1", "p").await;
        let response = client.post("/api/logout").dispatch().await;
        assert_eq!(response.status(), Status::Ok);

        let response = client.get("/api/me").dispatch().await;
        assert_eq!(response.status(), Status::Unauthorized);
    }

    #[rocket::async_test]
    async fn test_coach_sees_only_assigned_schools() {
        let portal = create_standard_test_portal().await;
        let client = setup_test_client(&portal, None).await;

        login_test_user(&client, "PS1", "p").await;
        let schools: Vec<School> = client
            .get("/api/schools")
            .dispatch()
            .await
            .into_json()
            .await
            .expect("Invalid JSON");
        let ids: Vec<&str> = schools.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["S1"]);

        login_test_user(&client, "PS0", STANDARD_PASSWORD).await;
        let schools: Vec<School> = client
            .get("/api/schools")
            .dispatch()
            .await
            .into_json()
            .await
            .expect("Invalid JSON");
        assert_eq!(schools.len(), 2);
    }

    #[rocket::async_test]
    async fn test_material_catalog_endpoints() {
        let portal = create_standard_test_portal().await;
        let client = setup_test_client(&portal, None).await;
        login_test_user(&client, "PS1", "p").await;

        let categories: Vec<String> = client
            .get("/api/materials/categories")
            .dispatch()
            .await
            .into_json()
            .await
            .expect("Invalid JSON");
        assert_eq!(categories, vec!["Sports Equipment", "Uniforms", "Stationery"]);

        let uniforms: Vec<Material> = client
            .get("/api/materials?category=Uniforms")
            .dispatch()
            .await
            .into_json()
            .await
            .expect("Invalid JSON");
        assert_eq!(uniforms.len(), 3);
        assert!(uniforms.iter().all(|m| m.category == "Uniforms"));
    }

    #[rocket::async_test]
    async fn test_batch_flow_submits_pending_requests() {
        let portal = create_standard_test_portal().await;
        let client = setup_test_client(&portal, None).await;
        login_test_user(&client, "PS1", "p").await;

        assert_eq!(add_kimono(&client, "S1", 3).await, Status::Created);
        assert_eq!(add_kimono(&client, "S1", 1).await, Status::Created);

        let batch: Vec<Request> = client
            .get("/api/batch")
            .dispatch()
            .await
            .into_json()
            .await
            .expect("Invalid JSON");
        assert_eq!(batch.len(), 2);

        let response = client
            .delete(format!("/api/batch/{}", batch[1].id))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::NoContent);

        let response = client.delete("/api/batch/not-there").dispatch().await;
        assert_eq!(response.status(), Status::NotFound);

        let response = client.post("/api/batch/submit").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        let submitted: SubmitResponse = response.into_json().await.expect("Invalid JSON");
        assert_eq!(submitted.submitted, 1);

        let batch: Vec<Request> = client
            .get("/api/batch")
            .dispatch()
            .await
            .into_json()
            .await
            .expect("Invalid JSON");
        assert!(batch.is_empty());

        let stored = portal.requests().await;
        assert_eq!(stored.len(), 3);
        let new = stored.last().expect("No requests stored");
        assert_eq!(new.ps_number, "PS1");
        assert_eq!(new.quantity, 3);
        assert_eq!(new.status, RequestStatus::Pending);

        let response = client.post("/api/batch/submit").dispatch().await;
        assert_eq!(response.status(), Status::BadRequest, "Empty batch must not submit");
    }

    #[rocket::async_test]
    async fn test_batch_rejects_invalid_items() {
        let portal = create_standard_test_portal().await;
        let client = setup_test_client(&portal, None).await;
        login_test_user(&client, "PS1", "p").await;

        assert_eq!(add_kimono(&client, "S1", 0).await, Status::UnprocessableEntity);
        assert_eq!(add_kimono(&client, "", 1).await, Status::UnprocessableEntity);
        assert_eq!(add_kimono(&client, "S2", 1).await, Status::Forbidden);

        let response = client.delete("/api/batch").dispatch().await;
        assert_eq!(response.status(), Status::NoContent);
        assert_eq!(portal.requests().await.len(), 2);
    }

    #[rocket::async_test]
    async fn test_request_listing_is_scoped() {
        let portal = create_standard_test_portal().await;
        let client = setup_test_client(&portal, None).await;

        login_test_user(&client, "PS2", "PS2").await;
        let requests: Vec<Request> = client
            .get("/api/requests")
            .dispatch()
            .await
            .into_json()
            .await
            .expect("Invalid JSON");
        assert!(requests.is_empty());

        login_test_user(&client, "PS1", "p").await;
        let requests: Vec<Request> = client
            .get("/api/requests")
            .dispatch()
            .await
            .into_json()
            .await
            .expect("Invalid JSON");
        assert_eq!(requests.len(), 2);
    }

    #[rocket::async_test]
    async fn test_edit_request_over_http() {
        let portal = create_standard_test_portal().await;
        let client = setup_test_client(&portal, None).await;
        login_test_user(&client, "PS1", "p").await;

        let response = client
            .put("/api/requests/REQ-PENDING")
            .header(ContentType::JSON)
            .body(json!({ "quantity": 4 }).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let updated: Request = response.into_json().await.expect("Invalid JSON");
        assert_eq!(updated.quantity, 4);

        let response = client
            .put("/api/requests/REQ-DELIVERED")
            .header(ContentType::JSON)
            .body(json!({ "quantity": 4 }).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Forbidden);

        let response = client
            .put("/api/requests/REQ-PENDING")
            .header(ContentType::JSON)
            .body(json!({ "ps_number": "PS2" }).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::UnprocessableEntity);

        let response = client
            .put("/api/requests/missing")
            .header(ContentType::JSON)
            .body(json!({ "quantity": 2 }).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::NotFound);

        login_test_user(&client, "PS0", STANDARD_PASSWORD).await;
        let response = client
            .put("/api/requests/REQ-DELIVERED")
            .header(ContentType::JSON)
            .body(json!({ "status": "Approved" }).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);

        let stored = portal.request("REQ-DELIVERED").await.expect("Missing");
        assert_eq!(stored.status, RequestStatus::Approved);
        assert_eq!(stored.ps_number, "PS1");
    }

    #[rocket::async_test]
    async fn test_delete_requests_over_http() {
        let portal = create_standard_test_portal().await;
        let client = setup_test_client(&portal, None).await;
        login_test_user(&client, "PS1", "p").await;

        let response = client
            .post("/api/requests/delete")
            .header(ContentType::JSON)
            .body(json!({ "ids": ["REQ-PENDING", "REQ-DELIVERED", "ghost"] }).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);

        let summary: DeleteSummary = response.into_json().await.expect("Invalid JSON");
        assert_eq!(summary.deleted, vec!["REQ-PENDING"]);
        assert_eq!(summary.retained, vec!["REQ-DELIVERED"]);
        assert_eq!(summary.missing, vec!["ghost"]);

        let remaining: Vec<String> = portal.requests().await.into_iter().map(|r| r.id).collect();
        assert_eq!(remaining, vec!["REQ-DELIVERED"]);
    }

    #[rocket::async_test]
    async fn test_admin_routes_forbid_coaches() {
        let portal = create_standard_test_portal().await;
        let client = setup_test_client(&portal, None).await;
        login_test_user(&client, "PS1", "p").await;

        for endpoint in ["/api/admin/schools", "/api/admin/coaches", "/api/admin/sync/status"] {
            let response = client.get(endpoint).dispatch().await;
            assert_eq!(
                response.status(),
                Status::Forbidden,
                "Coach reached {}",
                endpoint
            );
        }

        let response = client
            .put("/api/admin/schools")
            .header(ContentType::JSON)
            .body(json!([]).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Forbidden);

        let response = client.post("/api/admin/sync").dispatch().await;
        assert_eq!(response.status(), Status::Forbidden);
    }

    #[rocket::async_test]
    async fn test_admin_replaces_schools_with_text_coaches() {
        let portal = create_standard_test_portal().await;
        let client = setup_test_client(&portal, None).await;
        login_test_user(&client, "PS0", STANDARD_PASSWORD).await;

        let response = client
            .put("/api/admin/schools")
            .header(ContentType::JSON)
            .body(
                json!([
                    { "id": "S1", "name": "North", "city": "Porto", "coaches": "PS1, PS2" },
                    { "id": "S3", "name": "East", "city": "Braga", "coaches": [] }
                ])
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);

        let schools: Vec<School> = client
            .get("/api/admin/schools")
            .dispatch()
            .await
            .into_json()
            .await
            .expect("Invalid JSON");
        assert_eq!(schools.len(), 2);
        assert_eq!(schools[0].coaches, vec!["PS1", "PS2"]);

        login_test_user(&client, "PS2", "PS2").await;
        let visible: Vec<School> = client
            .get("/api/schools")
            .dispatch()
            .await
            .into_json()
            .await
            .expect("Invalid JSON");
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id, "S1");
    }

    #[rocket::async_test]
    async fn test_admin_sync_with_remote() {
        let portal = create_standard_test_portal().await;
        let remote = Arc::new(FakeRemote::default());
        let client =
            setup_test_client(&portal, Some(remote.clone() as Arc<dyn RemoteTable>)).await;
        login_test_user(&client, "PS0", STANDARD_PASSWORD).await;

        let response = client.post("/api/admin/sync").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        let report: SyncReport = response.into_json().await.expect("Invalid JSON");
        assert_eq!(report.status, SyncStatus::Completed);
        assert_eq!(report.inserted, 2);
        assert_eq!(remote.row_ids(), vec!["REQ-PENDING", "REQ-DELIVERED"]);

        let again: SyncReport = client
            .post("/api/admin/sync")
            .dispatch()
            .await
            .into_json()
            .await
            .expect("Invalid JSON");
        assert_eq!(again.inserted, 0);
        assert_eq!(remote.inserts(), 2);

        let status: RemoteProbe = client
            .get("/api/admin/sync/status")
            .dispatch()
            .await
            .into_json()
            .await
            .expect("Invalid JSON");
        assert!(status.reachable);
        assert_eq!(status.sample.len(), 2);
        assert_eq!(status.key_hint.as_deref(), Some("fake-remot..."));
    }

    #[rocket::async_test]
    async fn test_admin_sync_without_remote_is_skipped() {
        let portal = create_standard_test_portal().await;
        let client = setup_test_client(&portal, None).await;
        login_test_user(&client, "PS0", STANDARD_PASSWORD).await;

        let report: SyncReport = client
            .post("/api/admin/sync")
            .dispatch()
            .await
            .into_json()
            .await
            .expect("Invalid JSON");
        assert_eq!(report.status, SyncStatus::Skipped);

        let status: RemoteProbe = client
            .get("/api/admin/sync/status")
            .dispatch()
            .await
            .into_json()
            .await
            .expect("Invalid JSON");
        assert!(!status.configured);
    }

    #[rocket::async_test]
    async fn test_unreachable_remote_reports_service_error() {
        let portal = create_standard_test_portal().await;
        let remote: Arc<dyn RemoteTable> = Arc::new(FakeRemote::unreachable());
        let client = setup_test_client(&portal, Some(remote)).await;
        login_test_user(&client, "PS0", STANDARD_PASSWORD).await;

        let response = client.post("/api/admin/sync").dispatch().await;
        assert_eq!(response.status(), Status::ServiceUnavailable);
    }

    #[rocket::async_test]
    async fn test_unreadable_request_blocks_submit_but_not_listing() {
        let portal = create_standard_test_portal().await;

        let mut records: Vec<serde_json::Value> = portal
            .requests()
            .await
            .iter()
            .map(|r| serde_json::to_value(r).expect("Failed to encode"))
            .collect();
        records.push(json!({
            "id": "REQ-BROKEN",
            "school_id": "S1",
            "category": "Uniforms",
            "material": "Kimono A1",
            "quantity": 2.5,
            "ps_number": "PS1",
            "status": "pending"
        }));
        let raw = serde_json::to_string(&records).expect("Failed to encode");
        let path = portal.store.path_for(Collection::Requests);
        std::fs::write(&path, &raw).expect("Failed to write requests file");

        let client = setup_test_client(&portal, None).await;
        login_test_user(&client, "PS1", "p").await;

        let listed: Vec<Request> = client
            .get("/api/requests")
            .dispatch()
            .await
            .into_json()
            .await
            .expect("Invalid JSON");
        assert_eq!(listed.len(), 2);

        assert_eq!(add_kimono(&client, "S1", 1).await, Status::Created);
        let response = client.post("/api/batch/submit").dispatch().await;
        assert_eq!(response.status(), Status::Conflict);

        let on_disk = std::fs::read_to_string(&path).expect("Failed to read requests file");
        assert_eq!(on_disk, raw, "Requests file must not be overwritten");

        let batch: Vec<Request> = client
            .get("/api/batch")
            .dispatch()
            .await
            .into_json()
            .await
            .expect("Invalid JSON");
        assert_eq!(batch.len(), 1, "Batch is kept for a later retry");
    }
}
