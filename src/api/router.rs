//! API router.
//!
//! Returns a composable `Router` that can be mounted on any axum
//! server. Routes are nested under `/api/`. Session issue,
//! registration and the health check are open; everything else sits
//! behind the bearer-token middleware.

use axum::http::Method;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api::endpoints;
use crate::api::middleware;
use crate::api::types::ApiContext;

/// Build the API router.
///
/// Middleware uses `Extension<ApiContext>` (injected as the outermost
/// layer of each group). Endpoint handlers use `State<ApiContext>`.
///
/// NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7).
pub fn api_router(ctx: ApiContext) -> Router {
    let protected = Router::new()
        .route("/auth/me", get(endpoints::auth::me))
        .route("/consent/request", post(endpoints::consent::request_code))
        .route("/consent/verify", post(endpoints::consent::verify_code))
        .route(
            "/records",
            post(endpoints::records::create).get(endpoints::records::list),
        )
        .route(
            "/records/:id",
            get(endpoints::records::detail)
                .patch(endpoints::records::edit)
                .delete(endpoints::records::remove),
        )
        .route("/records/:id/verify", post(endpoints::records::verify))
        .route("/records/:id/reject", post(endpoints::records::reject))
        .route(
            "/records/:id/corrections",
            post(endpoints::corrections::file),
        )
        .route("/corrections", get(endpoints::corrections::list))
        .route(
            "/corrections/:id/resolve",
            post(endpoints::corrections::resolve),
        )
        .route("/notifications", get(endpoints::notifications::list))
        .route(
            "/notifications/unread-count",
            get(endpoints::notifications::unread_count),
        )
        .route(
            "/notifications/:id/read",
            post(endpoints::notifications::mark_read),
        )
        .route(
            "/notifications/read-all",
            post(endpoints::notifications::mark_all_read),
        )
        .route("/accounts", get(endpoints::accounts::list))
        .route("/accounts/:id/status", post(endpoints::accounts::set_status))
        .with_state(ctx.clone())
        .layer(axum::middleware::from_fn(middleware::auth::require_auth))
        // Extension must be outermost so the middleware can extract ApiContext
        .layer(axum::Extension(ctx.clone()));

    // Open routes. Session revocation lives here too: holding the
    // token is the only credential revocation needs.
    let open = Router::new()
        .route("/health", get(endpoints::health::check))
        .route(
            "/auth/session",
            post(endpoints::auth::issue_session).delete(endpoints::auth::revoke_session),
        )
        .route("/accounts/register", post(endpoints::accounts::register))
        .with_state(ctx.clone())
        .layer(axum::Extension(ctx));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    Router::new()
        .nest("/api", protected)
        .nest("/api", open)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::consent::ConsentService;
    use crate::engine::testutil::{draft_between, seed_principal};
    use crate::engine::{Dispatcher, Engine};
    use crate::models::{Principal, Role};
    use crate::notify::LogNotifier;
    use crate::store::{collections, DocumentStore, Filter, MemoryStore};

    fn test_ctx() -> (ApiContext, Arc<dyn DocumentStore>) {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let engine = Arc::new(Engine::new(store.clone()));
        let consent = Arc::new(ConsentService::new(store.clone()));
        (ApiContext::new(engine, consent), store)
    }

    fn token_for(ctx: &ApiContext, principal: &Principal) -> String {
        ctx.sessions.lock().unwrap().issue(principal.id)
    }

    fn request(
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(t) = token {
            builder = builder.header("Authorization", format!("Bearer {t}"));
        }
        match body {
            Some(json) => builder
                .header("Content-Type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    /// Pull the 6-digit code out of the consent notification staged
    /// for this patient.
    fn staged_consent_code(store: &Arc<dyn DocumentStore>, patient: &Principal) -> String {
        let outbox = store
            .query(
                collections::OUTBOX,
                &Filter::new()
                    .eq("kind", "consent_code")
                    .eq("recipient_id", patient.id),
            )
            .unwrap();
        let message = outbox.last().unwrap().body["message"].as_str().unwrap();
        let at = message.find("code ").unwrap() + "code ".len();
        message[at..at + 6].to_string()
    }

    #[tokio::test]
    async fn health_is_open() {
        let (ctx, _) = test_ctx();
        let app = api_router(ctx);

        let (status, json) = send(&app, request("GET", "/api/health", None, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn protected_routes_require_a_token() {
        let (ctx, _) = test_ctx();
        let app = api_router(ctx);

        let (status, json) = send(&app, request("GET", "/api/records", None, None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["error"]["code"], "AUTH_REQUIRED");

        let (status, _) =
            send(&app, request("GET", "/api/records", Some("bogus"), None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let (ctx, _) = test_ctx();
        let app = api_router(ctx);

        let (status, _) = send(&app, request("GET", "/api/nope", None, None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn session_flow_issues_and_revokes() {
        let (ctx, _) = test_ctx();
        let patient = seed_principal(&ctx.engine, Role::Patient);
        let app = api_router(ctx);

        let (status, json) = send(
            &app,
            request(
                "POST",
                "/api/auth/session",
                None,
                Some(json!({"email": patient.email})),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let token = json["token"].as_str().unwrap().to_string();
        assert_eq!(json["principal"]["id"], patient.id.to_string());

        let (status, json) = send(&app, request("GET", "/api/auth/me", Some(&token), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["email"], patient.email);

        let (status, _) = send(
            &app,
            request("DELETE", "/api/auth/session", Some(&token), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(&app, request("GET", "/api/auth/me", Some(&token), None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn unapproved_accounts_cannot_sign_in() {
        let (ctx, _) = test_ctx();
        let app = api_router(ctx.clone());

        // Fresh registrations are pending
        let (status, json) = send(
            &app,
            request(
                "POST",
                "/api/accounts/register",
                None,
                Some(json!({"name": "Ama Boateng", "email": "ama@example.com", "role": "patient"})),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "pending");

        let (status, json) = send(
            &app,
            request(
                "POST",
                "/api/auth/session",
                None,
                Some(json!({"email": "ama@example.com"})),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(json["error"]["code"], "FORBIDDEN");

        // Unknown emails are refused without detail
        let (status, _) = send(
            &app,
            request(
                "POST",
                "/api/auth/session",
                None,
                Some(json!({"email": "nobody@example.com"})),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn suspension_cuts_off_live_sessions() {
        let (ctx, _) = test_ctx();
        let admin = seed_principal(&ctx.engine, Role::Admin);
        let doctor = seed_principal(&ctx.engine, Role::Doctor);
        let token = token_for(&ctx, &doctor);
        let app = api_router(ctx.clone());

        let (status, _) = send(&app, request("GET", "/api/auth/me", Some(&token), None)).await;
        assert_eq!(status, StatusCode::OK);

        ctx.engine
            .set_account_status(&admin, doctor.id, crate::models::AccountStatus::Suspended)
            .unwrap();

        // The still-live token no longer passes the middleware
        let (status, _) = send(&app, request("GET", "/api/auth/me", Some(&token), None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn record_creation_requires_a_consent_grant() {
        let (ctx, store) = test_ctx();
        let operator = seed_principal(&ctx.engine, Role::Management);
        let patient = seed_principal(&ctx.engine, Role::Patient);
        let doctor = seed_principal(&ctx.engine, Role::Doctor);
        let token = token_for(&ctx, &operator);
        let app = api_router(ctx.clone());

        let draft = serde_json::to_value(draft_between(&patient, &doctor)).unwrap();

        // No grant yet
        let (status, json) = send(
            &app,
            request("POST", "/api/records", Some(&token), Some(draft.clone())),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(json["error"]["code"], "CONSENT_REQUIRED");

        // Request and verify the code the patient received
        let (status, _) = send(
            &app,
            request(
                "POST",
                "/api/consent/request",
                Some(&token),
                Some(json!({"patient_id": patient.id})),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let code = staged_consent_code(&store, &patient);
        let (status, json) = send(
            &app,
            request(
                "POST",
                "/api/consent/verify",
                Some(&token),
                Some(json!({"patient_id": patient.id, "code": code})),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["granted"], true);

        // The grant admits exactly one record creation
        let (status, json) = send(
            &app,
            request("POST", "/api/records", Some(&token), Some(draft.clone())),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["state"], "pending_verification");

        let (status, json) = send(
            &app,
            request("POST", "/api/records", Some(&token), Some(draft)),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(json["error"]["code"], "CONSENT_REQUIRED");
    }

    #[tokio::test]
    async fn verification_is_for_the_assigned_doctor_only() {
        let (ctx, _) = test_ctx();
        let author = seed_principal(&ctx.engine, Role::Management);
        let patient = seed_principal(&ctx.engine, Role::Patient);
        let doctor = seed_principal(&ctx.engine, Role::Doctor);
        let other_doctor = seed_principal(&ctx.engine, Role::Doctor);
        let record = ctx
            .engine
            .create_record(&author, draft_between(&patient, &doctor))
            .unwrap();
        let app = api_router(ctx.clone());

        let uri = format!("/api/records/{}/verify", record.id);

        // The wrong doctor is told no, not told nothing
        let other_token = token_for(&ctx, &other_doctor);
        let (status, json) = send(&app, request("POST", &uri, Some(&other_token), None)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(json["error"]["code"], "FORBIDDEN");

        let token = token_for(&ctx, &doctor);
        let (status, json) = send(&app, request("POST", &uri, Some(&token), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["state"], "verified");

        // Verifying twice is an invalid state, not a conflict
        let (status, json) = send(&app, request("POST", &uri, Some(&token), None)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(json["error"]["code"], "INVALID_STATE");
    }

    #[tokio::test]
    async fn correction_flow_over_http() {
        let (ctx, _) = test_ctx();
        let author = seed_principal(&ctx.engine, Role::Management);
        let patient = seed_principal(&ctx.engine, Role::Patient);
        let doctor = seed_principal(&ctx.engine, Role::Doctor);
        let record = ctx
            .engine
            .create_record(&author, draft_between(&patient, &doctor))
            .unwrap();
        ctx.engine.verify_record(&doctor, record.id).unwrap();
        let app = api_router(ctx.clone());

        let patient_token = token_for(&ctx, &patient);
        let file_uri = format!("/api/records/{}/corrections", record.id);
        let (status, json) = send(
            &app,
            request(
                "POST",
                &file_uri,
                Some(&patient_token),
                Some(json!({"reason": "The dosage is twice what we agreed", "priority": "high"})),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["state"], "pending");
        let request_id = json["id"].as_str().unwrap().to_string();

        // One pending request per record
        let (status, json) = send(
            &app,
            request(
                "POST",
                &file_uri,
                Some(&patient_token),
                Some(json!({"reason": "Wrong again"})),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(json["error"]["code"], "CONFLICT");

        let doctor_token = token_for(&ctx, &doctor);
        let (status, json) = send(
            &app,
            request(
                "POST",
                &format!("/api/corrections/{request_id}/resolve"),
                Some(&doctor_token),
                Some(json!({"resolution": "approve", "response": "Corrected, thank you"})),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["state"], "approved");

        let (status, json) = send(
            &app,
            request("GET", "/api/corrections", Some(&patient_token), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["total"], 1);
        assert_eq!(json["corrections"][0]["state"], "approved");
    }

    #[tokio::test]
    async fn notifications_flow_over_http() {
        let (ctx, store) = test_ctx();
        let author = seed_principal(&ctx.engine, Role::Management);
        let patient = seed_principal(&ctx.engine, Role::Patient);
        let doctor = seed_principal(&ctx.engine, Role::Doctor);
        ctx.engine
            .create_record(&author, draft_between(&patient, &doctor))
            .unwrap();
        Dispatcher::new(store, Arc::new(LogNotifier))
            .dispatch_pending()
            .unwrap();
        let app = api_router(ctx.clone());

        let token = token_for(&ctx, &patient);
        let (status, json) = send(
            &app,
            request("GET", "/api/notifications?unread_only=true", Some(&token), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["total"], 1);
        assert_eq!(json["notifications"][0]["kind"], "record_added");
        let notification_id = json["notifications"][0]["id"].as_str().unwrap().to_string();

        let (status, json) = send(
            &app,
            request("GET", "/api/notifications/unread-count", Some(&token), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["unread"], 1);

        let (status, json) = send(
            &app,
            request(
                "POST",
                &format!("/api/notifications/{notification_id}/read"),
                Some(&token),
                None,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["read"], true);

        let (status, json) = send(
            &app,
            request("POST", "/api/notifications/read-all", Some(&token), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["marked"], 0);
    }

    #[tokio::test]
    async fn account_administration_over_http() {
        let (ctx, _) = test_ctx();
        let admin = seed_principal(&ctx.engine, Role::Admin);
        let app = api_router(ctx.clone());

        let (_, json) = send(
            &app,
            request(
                "POST",
                "/api/accounts/register",
                None,
                Some(json!({"name": "Kem Adjei", "email": "kem@example.com", "role": "doctor"})),
            ),
        )
        .await;
        let account_id = json["id"].as_str().unwrap().to_string();

        let admin_token = token_for(&ctx, &admin);
        let (status, json) = send(
            &app,
            request(
                "GET",
                "/api/accounts?status=pending",
                Some(&admin_token),
                None,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["total"], 1);

        let (status, json) = send(
            &app,
            request(
                "POST",
                &format!("/api/accounts/{account_id}/status"),
                Some(&admin_token),
                Some(json!({"status": "approved"})),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "approved");

        // Listing is admin-only
        let doctor = ctx.engine.find_by_email("kem@example.com").unwrap().unwrap();
        let doctor_token = token_for(&ctx, &doctor);
        let (status, json) = send(
            &app,
            request("GET", "/api/accounts", Some(&doctor_token), None),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(json["error"]["code"], "FORBIDDEN");
    }

    #[tokio::test]
    async fn malformed_ids_are_rejected() {
        let (ctx, _) = test_ctx();
        let patient = seed_principal(&ctx.engine, Role::Patient);
        let token = token_for(&ctx, &patient);
        let app = api_router(ctx);

        let (status, json) = send(
            &app,
            request("GET", "/api/records/not-a-uuid", Some(&token), None),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["code"], "VALIDATION");
    }
}
