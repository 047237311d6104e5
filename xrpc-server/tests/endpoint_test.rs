//! End-to-end tests for the XML-RPC endpoint

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::{middleware, routing::post, Extension, Router};
use serde::Deserialize;
use std::sync::{Arc, Mutex};
use tower::ServiceExt;
use xrpc_core::Value;
use xrpc_server::{
    from_async_fn, from_context_fn, from_fn, from_typed_fn, router, xml_rpc, Engine,
    InvocationFailure, RegistryBuilder, XmlRpcBody,
};

#[derive(Deserialize)]
struct AddParams {
    a: i32,
    b: i32,
}

fn engine() -> Engine {
    Engine::builder()
        .handler(
            "echo",
            from_fn(|params, reply| {
                reply.ok(params);
                Ok(())
            }),
        )
        .namespace(
            "a",
            RegistryBuilder::new().handler(
                "b",
                from_fn(|_, reply| {
                    reply.ok("a.b");
                    Ok(())
                }),
            ),
        )
        .handler(
            "agent",
            from_context_fn(|ctx, _, reply| {
                reply.ok(ctx.header("user-agent").unwrap_or("none").to_string());
                Ok(())
            }),
        )
        .handler(
            "later",
            from_async_fn(|_| async {
                tokio::task::yield_now().await;
                Ok(Value::from("eventually"))
            }),
        )
        .handler(
            "math.add",
            from_typed_fn(|p: AddParams| async move { Ok(p.a + p.b) }),
        )
        .handler("raise", from_fn(|_, _reply| Err("boom".into())))
        .build()
        .unwrap()
}

fn call_xml(method: &str, params: &str) -> String {
    format!(
        "<?xml version=\"1.0\"?><methodCall><methodName>{}</methodName><params>{}</params></methodCall>",
        method, params
    )
}

fn xml_request(uri: &str, body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "text/xml")
        .body(body.into())
        .unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), 1 << 20)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn post_xml(app: Router, body: String) -> String {
    let response = app.oneshot(xml_request("/", body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "text/xml"
    );
    body_text(response).await
}

fn fault_code(xml: &str) -> Option<i32> {
    let marker = "<name>faultCode</name><value><int>";
    let start = xml.find(marker)? + marker.len();
    let end = start + xml[start..].find('<')?;
    xml[start..end].parse().ok()
}

#[tokio::test]
async fn test_echo_round_trip() {
    let xml = post_xml(
        router(engine()),
        call_xml("echo", "<param><value><int>42</int></value></param>"),
    )
    .await;

    assert_eq!(
        xml,
        "<?xml version=\"1.0\"?><methodResponse><params><param><value><int>42</int></value></param></params></methodResponse>"
    );
}

#[tokio::test]
async fn test_echo_struct_param() {
    let xml = post_xml(
        router(engine()),
        call_xml(
            "echo",
            "<param><value><struct><member><name>test</name><value><int>999</int></value></member></struct></value></param>",
        ),
    )
    .await;

    assert!(xml.contains(
        "<param><value><struct><member><name>test</name><value><int>999</int></value></member></struct></value></param>"
    ));
}

#[tokio::test]
async fn test_method_not_found() {
    let xml = post_xml(router(engine()), call_xml("nope", "")).await;
    assert_eq!(fault_code(&xml), Some(-32601));
    assert!(xml.contains("requested method nope not found"));
}

#[tokio::test]
async fn test_malformed_body_is_parse_fault() {
    let xml = post_xml(
        router(engine()),
        call_xml("echo", "<param><value><int>abc</int></value></param>"),
    )
    .await;
    assert_eq!(fault_code(&xml), Some(-32700));
    assert!(xml.contains("Parse Error. Request data not well formed."));
}

#[tokio::test]
async fn test_truncated_body_is_parse_fault() {
    let xml = post_xml(
        router(engine()),
        "<methodCall><methodName>echo</methodName><params>".to_string(),
    )
    .await;
    assert_eq!(fault_code(&xml), Some(-32700));
}

#[tokio::test]
async fn test_bracket_and_dotted_paths() {
    let xml = post_xml(router(engine()), call_xml("a[b]", "")).await;
    assert!(xml.contains("<string>a.b</string>"));

    let xml = post_xml(router(engine()), call_xml("a.b", "")).await;
    assert!(xml.contains("<string>a.b</string>"));

    let xml = post_xml(router(engine()), call_xml("a.c", "")).await;
    assert_eq!(fault_code(&xml), Some(-32601));
}

#[tokio::test]
async fn test_headers_reach_handler() {
    let request = Request::builder()
        .method("POST")
        .uri("/")
        .header(header::CONTENT_TYPE, "text/xml; charset=utf-8")
        .header(header::USER_AGENT, "xmlrpc-test/1.0")
        .body(Body::from(call_xml("agent", "")))
        .unwrap();

    let response = router(engine()).oneshot(request).await.unwrap();
    let xml = body_text(response).await;
    assert!(xml.contains("<string>xmlrpc-test/1.0</string>"));
}

#[tokio::test]
async fn test_async_and_typed_handlers() {
    let xml = post_xml(router(engine()), call_xml("later", "")).await;
    assert!(xml.contains("<string>eventually</string>"));

    let params = "<param><value><struct>\
        <member><name>a</name><value><int>2</int></value></member>\
        <member><name>b</name><value><int>3</int></value></member>\
        </struct></value></param>";
    let xml = post_xml(router(engine()), call_xml("math.add", params)).await;
    assert!(xml.contains("<int>5</int>"));

    let xml = post_xml(
        router(engine()),
        call_xml("math.add", "<param><value><string>x</string></value></param>"),
    )
    .await;
    assert_eq!(fault_code(&xml), Some(-32602));
}

#[tokio::test]
async fn test_handler_error_is_reported() {
    let reported = Arc::new(Mutex::new(Vec::new()));
    let hook = Arc::clone(&reported);
    let engine = Engine::builder()
        .handler("raise", from_fn(|_, _reply| Err("boom".into())))
        .on_invocation_error(move |failure| hook.lock().unwrap().push(failure.clone()))
        .build()
        .unwrap();

    let response = router(engine)
        .oneshot(xml_request("/", call_xml("raise", "")))
        .await
        .unwrap();

    let failure = InvocationFailure::new("raise", "boom");
    assert_eq!(
        response.extensions().get::<InvocationFailure>(),
        Some(&failure)
    );

    let xml = body_text(response).await;
    assert_eq!(fault_code(&xml), Some(-32500));
    assert!(xml.contains("Unexpected exception boom"));
    assert_eq!(*reported.lock().unwrap(), vec![failure]);
}

#[tokio::test]
async fn test_body_split_across_chunks() {
    // Split inside a tag and inside a multi-byte character
    let document = call_xml("echo", "<param><value><string>naïve ✓</string></value></param>");
    let bytes = document.into_bytes();
    let chunks: Vec<Result<Vec<u8>, std::io::Error>> = bytes
        .chunks(3)
        .map(|chunk| Ok(chunk.to_vec()))
        .collect();

    let request = xml_request("/", Body::from_stream(futures::stream::iter(chunks)));
    let response = router(engine()).oneshot(request).await.unwrap();
    let xml = body_text(response).await;
    assert!(xml.contains("<string>naïve ✓</string>"));
}

#[tokio::test]
async fn test_broken_body_stream_is_bad_request() {
    let chunks: Vec<Result<Vec<u8>, std::io::Error>> = vec![
        Ok(b"<methodCall><methodName>echo".to_vec()),
        Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
    ];

    let request = xml_request("/", Body::from_stream(futures::stream::iter(chunks)));
    let response = router(engine()).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_invalid_utf8_is_parse_fault() {
    let mut body = b"<methodCall><methodName>echo</methodName><params><param><value><string>".to_vec();
    body.extend_from_slice(&[0xff, 0xfe]);
    body.extend_from_slice(b"</string></value></param></params></methodCall>");

    let response = router(engine())
        .oneshot(xml_request("/", body))
        .await
        .unwrap();
    let xml = body_text(response).await;
    assert_eq!(fault_code(&xml), Some(-32700));
}

#[tokio::test]
async fn test_body_size_limit() {
    let engine = Engine::builder().max_body_bytes(64).build().unwrap();
    let big = "x".repeat(200);
    let xml = post_xml(
        router(engine),
        call_xml("echo", &format!("<param><value>{}</value></param>", big)),
    )
    .await;
    assert_eq!(fault_code(&xml), Some(-32700));
}

#[tokio::test]
async fn test_nesting_limit() {
    let engine = Engine::builder()
        .max_depth(2)
        .handler(
            "echo",
            from_fn(|params, reply| {
                reply.ok(params);
                Ok(())
            }),
        )
        .build()
        .unwrap();

    let nested = "<param><value><array><data><value><array><data><value><array><data>\
        </data></array></value></data></array></value></data></array></value></param>";
    let xml = post_xml(router(engine.clone()), call_xml("echo", nested)).await;
    assert_eq!(fault_code(&xml), Some(-32700));

    let shallow = "<param><value><array><data><value><array><data>\
        </data></array></value></data></array></value></param>";
    let xml = post_xml(router(engine), call_xml("echo", shallow)).await;
    assert!(xml.contains("<array><data><value><array><data></data></array></value></data></array>"));
}

#[tokio::test]
async fn test_custom_mount_path() {
    let engine = Engine::builder()
        .path("RPC2")
        .handler(
            "echo",
            from_fn(|params, reply| {
                reply.ok(params);
                Ok(())
            }),
        )
        .build()
        .unwrap();
    let app = router(engine);

    let response = app
        .clone()
        .oneshot(xml_request("/RPC2", call_xml("echo", "")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(xml_request("/", call_xml("echo", "")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_non_xml_request_to_endpoint_is_parse_fault() {
    let request = Request::builder()
        .method("POST")
        .uri("/")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))
        .unwrap();

    let response = router(engine()).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(fault_code(&body_text(response).await), Some(-32700));
}

fn passthrough_app() -> Router {
    Router::new()
        .route("/upload", post(|body: String| async move { body }))
        .route(
            "/inspect",
            post(
                |Extension(parsed): Extension<XmlRpcBody>, body: String| async move {
                    match parsed.call() {
                        Ok(call) => format!("{}|{}", call.method_name, body.len()),
                        Err(_) => format!("error|{}", body.len()),
                    }
                },
            ),
        )
        .layer(middleware::from_fn_with_state(engine(), xml_rpc))
}

#[tokio::test]
async fn test_other_content_types_pass_through() {
    let request = Request::builder()
        .method("POST")
        .uri("/upload")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"untouched":true}"#))
        .unwrap();

    let response = passthrough_app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, r#"{"untouched":true}"#);
}

#[tokio::test]
async fn test_raw_body_is_reattached() {
    let document = call_xml("echo", "<param><value><int>1</int></value></param>");
    let expected = format!("echo|{}", document.len());

    let response = passthrough_app()
        .oneshot(xml_request("/inspect", document))
        .await
        .unwrap();
    assert_eq!(body_text(response).await, expected);

    let response = passthrough_app()
        .oneshot(xml_request("/inspect", "<methodCall>"))
        .await
        .unwrap();
    assert_eq!(body_text(response).await, "error|12");
}
