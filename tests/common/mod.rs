//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};

use contract_host::config::CorsConfig;
use contract_host::routing::{
    Call, Fault, Operation, PatternError, Record, RecordShape, Reply, ServiceBinding, ValueType,
};
use contract_host::sample::SampleService;
use contract_host::site::{MemoryFileSystem, SiteBinding};
use contract_host::Server;

pub const ALLOWED_ORIGIN: &str = "http://allowed.test";

#[derive(Debug, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Record for Point {
    fn shape() -> RecordShape {
        RecordShape::structure("Point")
            .field("x", ValueType::Int)
            .field("y", ValueType::Int)
    }
}

/// Operations the sample service does not cover.
#[derive(Debug, Default)]
pub struct TestService;

pub fn test_binding() -> Result<ServiceBinding<TestService>, PatternError> {
    ServiceBinding::singleton(TestService)
        .at("test")
        .operation(
            Operation::get("chunks").returns_stream("text/plain"),
            |_: Arc<TestService>, _: Call| async move {
                let chunks = ["one,", "two,", "three"].map(|chunk| Ok(Bytes::from_static(chunk.as_bytes())));
                Ok(Reply::stream(stream::iter(chunks).boxed()))
            },
        )?
        .operation(
            Operation::post("upload")
                .param("data", ValueType::Bytes)
                .returns(ValueType::Int),
            |_: Arc<TestService>, mut call: Call| async move {
                let data = call.args.take_bytes(0)?;
                Reply::json(&data.len())
            },
        )?
        .operation(Operation::get("ping"), |_: Arc<TestService>, _: Call| async move {
            Ok(Reply::text("ignored"))
        })?
        .operation(
            Operation::get("slow").param("ms", ValueType::Long).returns(ValueType::Long),
            |_: Arc<TestService>, call: Call| async move {
                let ms: u64 = call.args.get(0)?;
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Reply::json(&ms)
            },
        )?
        .operation(
            Operation::get("point")
                .template("point/{x}/{y}")
                .record::<Point>("p")
                .returns(ValueType::Object),
            |_: Arc<TestService>, call: Call| async move {
                let point: Point = call.args.get(0)?;
                Reply::json(&Point { x: point.y, y: point.x })
            },
        )?
        .operation(
            Operation::get("boom").returns(ValueType::String),
            |_: Arc<TestService>, _: Call| async move { Err::<Reply, Fault>(explode()) },
        )
}

fn explode() -> Fault {
    panic!("handler exploded")
}

pub fn test_site() -> SiteBinding {
    let fs = MemoryFileSystem::new()
        .with_file("www/index.html", "<h1>home</h1>")
        .with_file("www/404.html", "<h1>missing</h1>")
        .with_file("www/css/site.css", "body{}")
        .with_file("www/files/a.txt", "a");
    SiteBinding::new(Arc::new(fs), "www").at("docs")
}

/// A started server on an ephemeral port with every test binding registered.
pub async fn start_server(fan_out: usize) -> (Server, String) {
    start_configured(fan_out, |_| {}).await
}

/// Like [`start_server`], with `configure` applied before the server starts.
pub async fn start_configured(fan_out: usize, configure: impl FnOnce(&mut Server)) -> (Server, String) {
    let mut server = Server::new(["http://127.0.0.1:0/"]);
    server
        .add_service(SampleService::new().binding().unwrap())
        .add_service(test_binding().unwrap())
        .add_site(test_site())
        .set_cors(CorsConfig {
            allow_origin: Some(ALLOWED_ORIGIN.into()),
            max_age_secs: Some(600),
            ..CorsConfig::default()
        })
        .set_max_concurrent_requests(fan_out)
        .set_expose_error_details(true);
    configure(&mut server);
    server.start().await.unwrap();

    let addr = server.local_addrs()[0];
    (server, format!("http://{addr}"))
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}

/// Wait until `condition` holds, polling every 10 ms for at most 5 s.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}
