use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::{Value, json};

use tradeflow_api::app::{router, services::AppServices};
use tradeflow_auth::{JwtClaims, Role};
use tradeflow_core::{TenantId, UserId};
use tradeflow_infra::AppConfig;
use tradeflow_infra::event_store::InMemoryEventStore;

const JWT_SECRET: &str = "test-secret";

struct TestServer {
    base_url: String,
    client: reqwest::Client,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod over an in-memory store, on an ephemeral port.
        let config = AppConfig {
            jwt_secret: JWT_SECRET.to_string(),
            ..AppConfig::default()
        };
        let services = AppServices::with_store(Arc::new(InMemoryEventStore::new()), &config)
            .expect("failed to wire services");
        let app = router(&config, Arc::new(services));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{addr}"),
            client: reqwest::Client::new(),
            handle,
        }
    }

    async fn send(&self, method: reqwest::Method, path: &str, token: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut req = self
            .client
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(token);
        if let Some(body) = body {
            req = req.json(&body);
        }
        let res = req.send().await.unwrap();
        let status = res.status();
        let text = res.text().await.unwrap_or_default();
        let body = if text.is_empty() { Value::Null } else { serde_json::from_str(&text).unwrap_or(Value::String(text)) };
        (status, body)
    }

    async fn get(&self, path: &str, token: &str) -> (StatusCode, Value) {
        self.send(reqwest::Method::GET, path, token, None).await
    }

    async fn post(&self, path: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.send(reqwest::Method::POST, path, token, Some(body)).await
    }

    async fn put(&self, path: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.send(reqwest::Method::PUT, path, token, Some(body)).await
    }

    /// POST that must succeed; panics with the response body otherwise.
    async fn command(&self, path: &str, token: &str, body: Value) -> Value {
        let (status, body) = self.post(path, token, body).await;
        if !status.is_success() {
            panic!("POST {path} failed with {status}: {body}");
        }
        body
    }

    /// Read models catch up asynchronously; poll until `ready` accepts the body.
    async fn eventually(&self, path: &str, token: &str, ready: impl Fn(&Value) -> bool) -> Value {
        for _ in 0..50 {
            let (status, body) = self.get(path, token).await;
            if status == StatusCode::OK && ready(&body) {
                return body;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("GET {path} did not reach the expected state within timeout");
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn mint_jwt_for(user_id: UserId, tenant_id: TenantId, roles: &[&'static str]) -> String {
    let claims = JwtClaims::new(
        user_id,
        tenant_id,
        roles.iter().copied().map(Role::from).collect(),
        Utc::now(),
        ChronoDuration::minutes(10),
    );

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("failed to encode jwt")
}

fn mint_jwt(tenant_id: TenantId, roles: &[&'static str]) -> String {
    mint_jwt_for(UserId::new(), tenant_id, roles)
}

fn id_of(body: &Value) -> String {
    body["id"].as_str().expect("response carries an id").to_string()
}

/// Unit, item, warehouse and one party of each kind.
struct MasterData {
    item: String,
    warehouse: String,
    customer: String,
    supplier: String,
}

async fn seed_master_data(srv: &TestServer, token: &str) -> MasterData {
    let unit = srv.command("/units", token, json!({ "code": "PCS", "name": "Pieces" })).await;
    let item = srv
        .command(
            "/items",
            token,
            json!({ "code": "W-100", "name": "Widget", "unit_id": id_of(&unit), "standard_price": 1500 }),
        )
        .await;
    let warehouse = srv
        .command("/warehouses", token, json!({ "code": "MAIN", "name": "Main warehouse" }))
        .await;
    let customer = srv
        .command("/customers", token, json!({ "code": "C-1", "name": "Acme", "payment_terms_days": 30 }))
        .await;
    let supplier = srv
        .command("/suppliers", token, json!({ "code": "S-1", "name": "Parts Ltd" }))
        .await;

    MasterData {
        item: id_of(&item),
        warehouse: id_of(&warehouse),
        customer: id_of(&customer),
        supplier: id_of(&supplier),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn health_is_public_and_everything_else_requires_a_token() {
    let srv = TestServer::spawn().await;

    let res = srv.client.get(format!("{}/health", srv.base_url)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = srv.client.get(format!("{}/whoami", srv.base_url)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"]["code"], "unauthenticated");

    let (status, _) = srv.get("/customers", "not-a-jwt").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test(flavor = "multi_thread")]
async fn tenant_context_is_derived_from_token() {
    let srv = TestServer::spawn().await;
    let tenant_id = TenantId::new();
    let user_id = UserId::new();
    let token = mint_jwt_for(user_id, tenant_id, &["manager"]);

    let (status, body) = srv.get("/whoami", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tenant_id"].as_str().unwrap(), tenant_id.to_string());
    assert_eq!(body["user_id"].as_str().unwrap(), user_id.to_string());
    assert!(body["roles"].as_array().unwrap().iter().any(|r| r == "manager"));
    assert!(!body["permissions"].as_array().unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn validation_errors_use_the_nested_error_shape() {
    let srv = TestServer::spawn().await;
    let token = mint_jwt(TenantId::new(), &["admin"]);

    let (status, body) = srv.post("/customers", &token, json!({ "code": " ", "name": "Nobody" })).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "validation_error");
    assert!(body["error"]["message"].is_string());

    let (status, _) = srv.get("/customers/not-an-id", &token).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, body) = srv
        .post(
            "/customer-orders",
            &token,
            json!({ "customer_id": uuid::Uuid::now_v7(), "lines": [] }),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"]["message"].as_str().unwrap().contains("unknown customer"));
}

#[tokio::test(flavor = "multi_thread")]
async fn party_master_data_lifecycle() {
    let srv = TestServer::spawn().await;
    let token = mint_jwt(TenantId::new(), &["manager"]);

    let created = srv
        .command("/customers", &token, json!({ "code": "C-9", "name": "Globex", "payment_terms_days": 14 }))
        .await;
    let id = id_of(&created);
    assert_eq!(created["status"], "active");

    let (status, updated) = srv
        .send(
            reqwest::Method::PATCH,
            &format!("/customers/{id}"),
            &token,
            Some(json!({ "name": "Globex Corp" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["name"], "Globex Corp");

    // A customer is not a supplier.
    let (status, _) = srv.get(&format!("/suppliers/{id}"), &token).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let suspended = srv.command(&format!("/customers/{id}/suspend"), &token, json!({})).await;
    assert_eq!(suspended["status"], "suspended");

    let (status, body) = srv
        .post("/customer-orders", &token, json!({ "customer_id": id, "lines": [] }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");
    assert_eq!(body["error"]["code"], "invariant_violation");
    assert!(body["error"]["message"].as_str().unwrap().contains("suspended"));

    srv.command(&format!("/customers/{id}/reactivate"), &token, json!({})).await;
    let listed = srv
        .eventually("/customers", &token, |b| b["items"][0]["status"] == "active" && b["items"][0]["name"] == "Globex Corp")
        .await;
    assert_eq!(listed["items"].as_array().unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn customer_order_goes_through_a_role_route() {
    let srv = TestServer::spawn().await;
    let tenant_id = TenantId::new();
    let admin = mint_jwt(tenant_id, &["admin"]);
    let sales = mint_jwt(tenant_id, &["salesperson"]);
    let manager = mint_jwt(tenant_id, &["manager"]);
    let data = seed_master_data(&srv, &admin).await;

    let (status, definition) = srv
        .put("/workflows/customer_order", &admin, json!({ "roles": ["manager"] }))
        .await;
    assert_eq!(status, StatusCode::OK, "{definition}");
    assert_eq!(definition["route"]["steps"].as_array().unwrap().len(), 1);

    let order = srv
        .command(
            "/customer-orders",
            &sales,
            json!({
                "customer_id": data.customer,
                "customer_reference": "PO-4711",
                "lines": [{ "item_id": data.item, "quantity": 2, "unit_price": 1500 }],
            }),
        )
        .await;
    let id = id_of(&order);
    assert_eq!(order["status"], "draft");
    assert_eq!(order["total"], 3000);
    assert!(order["number"].as_str().unwrap().starts_with("CO-"));

    let submitted = srv.command(&format!("/customer-orders/{id}/submit"), &sales, json!({})).await;
    assert_eq!(submitted["status"], "pending_approval");

    // Submitting again is not a legal transition.
    let (status, body) = srv.post(&format!("/customer-orders/{id}/submit"), &sales, json!({})).await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");

    // Salespeople cannot approve.
    let (status, _) = srv.post(&format!("/customer-orders/{id}/approve"), &sales, json!({})).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // The manager role is told about the pending step.
    let inbox = srv
        .eventually("/notifications", &manager, |b| !b["items"].as_array().unwrap().is_empty())
        .await;
    assert_eq!(inbox["items"][0]["document_id"], id.as_str());
    assert_eq!(inbox["items"][0]["read"], false);

    let approved = srv
        .command(&format!("/customer-orders/{id}/approve"), &manager, json!({ "comment": "ok" }))
        .await;
    assert_eq!(approved["status"], "approved");
    assert_eq!(approved["approval"]["history"].as_array().unwrap().len(), 1);

    let listed = srv
        .eventually("/customer-orders?status=approved", &sales, |b| b["items"].as_array().unwrap().len() == 1)
        .await;
    assert_eq!(listed["items"][0]["id"], id.as_str());

    // The submitter hears back about the decision.
    let decided = srv
        .eventually("/notifications", &sales, |b| !b["items"].as_array().unwrap().is_empty())
        .await;
    assert_eq!(decided["items"][0]["document_number"], order["number"]);

    srv.eventually("/notifications/unread-count", &manager, |b| b["unread"].as_u64() == Some(1))
        .await;
    let marked = srv.command("/notifications/read-all", &manager, json!({})).await;
    assert_eq!(marked["marked"], 1);
    srv.eventually("/notifications/unread-count", &manager, |b| b["unread"] == 0).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn rejection_requires_a_reason_and_can_be_resubmitted() {
    let srv = TestServer::spawn().await;
    let tenant_id = TenantId::new();
    let admin = mint_jwt(tenant_id, &["admin"]);
    let approver = mint_jwt(tenant_id, &["admin"]);
    let data = seed_master_data(&srv, &admin).await;

    srv.put("/workflows/customer_order", &admin, json!({ "roles": ["admin"] })).await;
    let order = srv
        .command(
            "/customer-orders",
            &admin,
            json!({
                "customer_id": data.customer,
                "lines": [{ "item_id": data.item, "quantity": 1, "unit_price": 900 }],
            }),
        )
        .await;
    let id = id_of(&order);
    srv.command(&format!("/customer-orders/{id}/submit"), &admin, json!({})).await;

    // Holding the route's role is not enough to decide on your own document.
    let (status, _) = srv
        .post(&format!("/customer-orders/{id}/reject"), &admin, json!({ "reason": "mine" }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = srv.post(&format!("/customer-orders/{id}/reject"), &approver, json!({})).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let rejected = srv
        .command(&format!("/customer-orders/{id}/reject"), &approver, json!({ "reason": "wrong price" }))
        .await;
    assert_eq!(rejected["status"], "rejected");

    let (status, line) = srv
        .send(
            reqwest::Method::PATCH,
            &format!("/customer-orders/{id}/lines/1"),
            &admin,
            Some(json!({ "unit_price": 1000 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{line}");
    assert_eq!(line["total"], 1000);

    let resubmitted = srv.command(&format!("/customer-orders/{id}/submit"), &admin, json!({})).await;
    assert_eq!(resubmitted["status"], "pending_approval");
}

#[tokio::test(flavor = "multi_thread")]
async fn procure_to_invoice() {
    let srv = TestServer::spawn().await;
    let tenant_id = TenantId::new();
    let admin = mint_jwt(tenant_id, &["admin"]);
    let data = seed_master_data(&srv, &admin).await;

    // No routes configured: documents approve on submit.
    let request = srv
        .command(
            "/purchase-requests",
            &admin,
            json!({
                "department": "Operations",
                "lines": [{ "item_id": data.item, "quantity": 10, "warehouse_id": data.warehouse }],
            }),
        )
        .await;
    let pr = id_of(&request);
    let submitted = srv.command(&format!("/purchase-requests/{pr}/submit"), &admin, json!({})).await;
    assert_eq!(submitted["status"], "approved");

    let order = srv
        .command(
            &format!("/purchase-requests/{pr}/convert"),
            &admin,
            json!({ "supplier_id": data.supplier, "lines": [{ "line_no": 1, "unit_price": 1000 }] }),
        )
        .await;
    let po = id_of(&order);
    assert_eq!(order["source_request"], pr.as_str());
    assert_eq!(order["lines"][0]["quantity"], 10);

    srv.command(&format!("/purchase-orders/{po}/submit"), &admin, json!({})).await;
    let received = srv
        .command(
            &format!("/purchase-orders/{po}/receipts"),
            &admin,
            json!({ "lines": [{ "line_no": 1, "quantity": 10 }] }),
        )
        .await;
    assert_eq!(received["fully_received"], true);

    // Over-receipt is refused.
    let (status, _) = srv
        .post(
            &format!("/purchase-orders/{po}/receipts"),
            &admin,
            json!({ "lines": [{ "line_no": 1, "quantity": 1 }] }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    srv.eventually(&format!("/items/{}/stock", data.item), &admin, |b| {
        b["items"][0]["on_hand"] == 10
    })
    .await;

    let customer_order = srv
        .command(
            "/customer-orders",
            &admin,
            json!({
                "customer_id": data.customer,
                "lines": [{ "item_id": data.item, "quantity": 4, "unit_price": 1500 }],
            }),
        )
        .await;
    let co = id_of(&customer_order);
    srv.command(&format!("/customer-orders/{co}/submit"), &admin, json!({})).await;

    let delivery = srv
        .command(
            &format!("/customer-orders/{co}/deliveries"),
            &admin,
            json!({ "warehouse_id": data.warehouse, "lines": [{ "line_no": 1, "quantity": 4 }] }),
        )
        .await;
    let dn = id_of(&delivery);
    assert_eq!(delivery["customer_order_id"], co.as_str());
    srv.command(&format!("/delivery-orders/{dn}/submit"), &admin, json!({})).await;

    let invoice = srv
        .command(&format!("/delivery-orders/{dn}/invoice"), &admin, json!({ "tax_rate_bps": 1000 }))
        .await;
    assert_eq!(invoice["subtotal"], 6000);
    assert_eq!(invoice["tax"], 600);
    assert_eq!(invoice["total"], 6600);
    assert_eq!(invoice["status"], "draft");

    // A fully invoiced delivery cannot be invoiced twice.
    let (status, _) = srv.post(&format!("/delivery-orders/{dn}/invoice"), &admin, json!({})).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, pdf) = {
        let res = srv
            .client
            .get(format!("{}/reports/documents/sales_invoice/{}", srv.base_url, id_of(&invoice)))
            .bearer_auth(&admin)
            .send()
            .await
            .unwrap();
        (res.status(), res.bytes().await.unwrap())
    };
    assert_eq!(status, StatusCode::OK);
    assert!(pdf.starts_with(b"%PDF"));
}

#[tokio::test(flavor = "multi_thread")]
async fn registers_download_as_attachments() {
    let srv = TestServer::spawn().await;
    let token = mint_jwt(TenantId::new(), &["accountant"]);

    let (status, listed) = srv.get("/reports", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed["items"].as_array().unwrap().len(), 4);

    let res = srv
        .client
        .get(format!("{}/reports/registers/stock-on-hand?format=xlsx", srv.base_url))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let disposition = res.headers()[reqwest::header::CONTENT_DISPOSITION].to_str().unwrap().to_string();
    assert!(disposition.starts_with("attachment;"));
    assert!(disposition.contains(".xlsx"));
    let bytes = res.bytes().await.unwrap();
    assert!(bytes.starts_with(b"PK"));

    let (status, _) = srv.get("/reports/registers/general-ledger", &token).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_permissions_are_forbidden() {
    let srv = TestServer::spawn().await;
    let tenant_id = TenantId::new();
    let viewer = mint_jwt(tenant_id, &["viewer"]);
    let user = mint_jwt(tenant_id, &["user"]);

    let (status, body) = srv.post("/units", &viewer, json!({ "code": "KG", "name": "Kilogram" })).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "forbidden");

    // Plain users read master data but cannot change it or configure routes.
    let (status, _) = srv.get("/units", &user).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = srv.post("/units", &user, json!({ "code": "KG", "name": "Kilogram" })).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = srv.put("/workflows/purchase_order", &user, json!({ "roles": ["manager"] })).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = srv.get("/users", &user).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test(flavor = "multi_thread")]
async fn tenant_isolation_blocks_cross_tenant_reads_and_writes() {
    let srv = TestServer::spawn().await;
    let token1 = mint_jwt(TenantId::new(), &["admin"]);
    let token2 = mint_jwt(TenantId::new(), &["admin"]);

    let created = srv.command("/suppliers", &token1, json!({ "code": "S-1", "name": "Parts Ltd" })).await;
    let id = id_of(&created);
    srv.eventually(&format!("/suppliers/{id}"), &token1, |_| true).await;

    let (status, _) = srv.get(&format!("/suppliers/{id}"), &token2).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = srv.post(&format!("/suppliers/{id}/suspend"), &token2, json!({})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, listed) = srv.get("/suppliers", &token2).await;
    assert_eq!(status, StatusCode::OK);
    assert!(listed["items"].as_array().unwrap().is_empty());

    // Numbering is per tenant as well.
    let pr1 = srv.command("/purchase-requests", &token1, json!({})).await;
    let pr2 = srv.command("/purchase-requests", &token2, json!({})).await;
    assert_eq!(pr1["number"], pr2["number"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn suspended_users_are_locked_out() {
    let srv = TestServer::spawn().await;
    let tenant_id = TenantId::new();
    let admin = mint_jwt(tenant_id, &["admin"]);
    let clerk_id = UserId::new();
    let clerk = mint_jwt_for(clerk_id, tenant_id, &["user"]);

    let created = srv
        .command(
            "/users",
            &admin,
            json!({ "user_id": clerk_id, "email": "clerk@example.com", "display_name": "Clerk", "roles": ["user"] }),
        )
        .await;
    assert_eq!(created["status"], "active");

    let who = srv.eventually("/whoami", &clerk, |b| b["display_name"] == "Clerk").await;
    assert_eq!(who["user_id"], clerk_id.to_string());

    let assigned = srv
        .command(&format!("/users/{clerk_id}/roles"), &admin, json!({ "role": "purchaser" }))
        .await;
    assert!(assigned["roles"].as_array().unwrap().iter().any(|r| r == "purchaser"));

    srv.command(&format!("/users/{clerk_id}/suspend"), &admin, json!({ "reason": "left" })).await;
    let mut locked_out = false;
    for _ in 0..50 {
        let (status, body) = srv.get("/whoami", &clerk).await;
        if status == StatusCode::FORBIDDEN {
            assert_eq!(body["error"]["code"], "user_suspended");
            locked_out = true;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert!(locked_out, "suspended user kept access");

    srv.command(&format!("/users/{clerk_id}/activate"), &admin, json!({})).await;
    srv.eventually("/whoami", &clerk, |_| true).await;
}
