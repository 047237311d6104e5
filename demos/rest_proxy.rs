//! REST service with an XML-RPC face
//!
//! Serves three REST routes and mounts a proxy on `/rpc` that exposes them
//! as the actions `getAll`, `getUsers` and `getUserId`, forwarding to this
//! same server.
//!
//! ```text
//! curl -s -H 'Content-Type: text/xml' --data \
//!   '<methodCall><methodName>getUserId</methodName><params><param><value><struct>
//!    <member><name>id</name><value><int>7</int></value></member>
//!    </struct></value></param></params></methodCall>' \
//!   http://127.0.0.1:3000/rpc
//! ```
//!
//! Run with: cargo run --example rest_proxy

use axum::extract::Path;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value as JsonValue};
use xrpc::core::ObservabilityConfig;
use xrpc::proxy::{ProxyConfig, ProxyRoute, XmlRpcProxy};

fn user_card(id: u32) -> JsonValue {
    json!({
        "id": id,
        "name": format!("User {}", id),
        "email": format!("user{}@example.com", id),
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    xrpc::core::init_observability(ObservabilityConfig::local("rest-proxy"))?;

    let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let addr = format!("{}:{}", host, port);

    let app = Router::new()
        .route(
            "/",
            get(|| async { Json(json!({ "success": true, "message": "Womp womp.." })) }),
        )
        .route(
            "/users",
            get(|| async {
                let users: Vec<JsonValue> = (1..=4).map(user_card).collect();
                Json(json!({ "success": true, "users": users }))
            }),
        )
        .route(
            "/user/:id",
            get(|Path(id): Path<u32>| async move {
                Json(json!({ "success": true, "user": user_card(id) }))
            }),
        );

    let proxy = XmlRpcProxy::new(
        ProxyConfig::new(&format!("http://{}", addr))?,
        vec![
            ProxyRoute::get("/user/:id"),
            ProxyRoute::get("/users"),
            ProxyRoute::get("/"),
        ],
    )?;
    let app = proxy.mount(app)?;

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "Listening for REST and XML-RPC calls");
    axum::serve(listener, app).await?;

    xrpc::core::shutdown_observability();
    Ok(())
}
