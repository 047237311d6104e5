//! Standalone XML-RPC server
//!
//! Serves a few methods on `/RPC2`. Try it with:
//!
//! ```text
//! curl -s -H 'Content-Type: text/xml' --data \
//!   '<methodCall><methodName>math.add</methodName><params><param><value><struct>
//!    <member><name>a</name><value><int>2</int></value></member>
//!    <member><name>b</name><value><int>3</int></value></member>
//!    </struct></value></param></params></methodCall>' \
//!   http://127.0.0.1:3000/RPC2
//! ```
//!
//! Run with: cargo run --example echo_server

use serde::{Deserialize, Serialize};
use xrpc::core::{Fault, ObservabilityConfig, Value};
use xrpc::server::{
    from_async_fn, from_context_fn, from_fn, from_typed_fn, Engine, RegistryBuilder,
};
use xrpc::XmlRpcServer;

#[derive(Deserialize)]
struct AddParams {
    a: i32,
    b: i32,
}

#[derive(Serialize)]
struct Blog {
    #[serde(rename = "blogid")]
    blog_id: String,
    url: String,
    #[serde(rename = "blogName")]
    blog_name: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());

    let blogger = RegistryBuilder::new()
        .handler(
            "getUsersBlogs",
            from_typed_fn(|_params: Vec<String>| async move {
                Ok(vec![Blog {
                    blog_id: "1".to_string(),
                    url: "http://example.com/".to_string(),
                    blog_name: "Example".to_string(),
                }])
            }),
        )
        .handler(
            "whoami",
            from_context_fn(|ctx, _params, reply| {
                let agent = ctx.header("user-agent").unwrap_or("unknown").to_string();
                reply.ok(agent);
                Ok(())
            }),
        );

    let engine = Engine::builder()
        .with_observability(ObservabilityConfig::local("echo-server"))
        .path("/RPC2")
        .handler(
            "echo",
            from_fn(|params, reply| {
                tracing::info!(kind = params.kind(), "Echoing");
                reply.ok(params);
                Ok(())
            }),
        )
        .handler(
            "math.add",
            from_typed_fn(|p: AddParams| async move {
                p.a.checked_add(p.b)
                    .ok_or_else(|| Fault::new(1, "integer overflow"))
            }),
        )
        .handler(
            "time.now",
            from_async_fn(|_params| async {
                Ok(Value::from_datetime(chrono::Utc::now().naive_utc()))
            }),
        )
        .namespace("blogger", blogger)
        .build()?;

    tracing::info!(methods = ?engine.registry().methods(), "Registered methods");

    let server = XmlRpcServer::bind(format!("{}:{}", host, port), engine).await?;
    tracing::info!(addr = %server.local_addr()?, "Listening for XML-RPC calls");

    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    xrpc::core::shutdown_observability();
    Ok(())
}
