#![allow(dead_code)]

use cprval::{Fields, Value};
use rand::{rngs::StdRng, Rng, SeedableRng};

pub const TRACE_DEFINITION: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/data/trace.json");

const SERVICES: &[&str] = &["checkout", "cart", "payment"];
const SPAN_NAMES: &[&str] = &[
    "GET /api/cart",
    "POST /api/checkout",
    "SELECT orders",
    "redis GET",
    "charge card",
];
const SCHEMA_URL: &str = "https://opentelemetry.io/schemas/1.21.0";

/// Object builder that leaves out fields a nullable node would collapse anyway.
struct Obj(Fields);

impl Obj {
    fn new() -> Self {
        Obj(Fields::new())
    }

    fn set(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), Some(value.into()));
        self
    }

    fn opt(self, key: &str, value: impl Into<Value>) -> Self {
        let value = value.into();
        if value.is_null_equivalent() {
            self
        } else {
            self.set(key, value)
        }
    }

    fn done(self) -> Value {
        Value::Object(self.0)
    }
}

fn id(rng: &mut StdRng, len: usize) -> Vec<u8> {
    (0..len).map(|_| rng.gen()).collect()
}

fn resource(rng: &mut StdRng, index: usize) -> Value {
    let attributes = Obj::new()
        .set("service.name", SERVICES[index % SERVICES.len()])
        .set("host.name", format!("node-{}", index % 2))
        .set("process.pid", 4000 + (index % 2) as i64)
        .set("telemetry.sdk.language", "rust")
        .done();
    Obj::new()
        .set("attributes", attributes)
        .opt("droppedAttributesCount", rng.gen_range(0..2i64))
        .done()
}

fn span(rng: &mut StdRng, trace_id: &[u8], parent: Option<&[u8]>, start: i64) -> (Value, Vec<u8>) {
    let span_id = id(rng, 8);
    let end = start + rng.gen_range(1_000..5_000_000i64);
    let status_code = if rng.gen_bool(0.1) { 2 } else { 0 };

    let mut attributes = Obj::new()
        .set("http.method", if rng.gen_bool(0.5) { "GET" } else { "POST" })
        .set("http.status_code", if status_code == 2 { 500 } else { 200 })
        .set("net.peer.port", rng.gen_range(1024..1030i64));
    if rng.gen_bool(0.3) {
        attributes = attributes.set("retry", true).set("backoff.ratio", 1.5);
    }
    if rng.gen_bool(0.2) {
        let mut missing = Fields::new();
        missing.insert("user.id".into(), None);
        missing.insert(
            "tags".into(),
            Some(Value::Array(vec![Value::from("a"), Value::from(7)])),
        );
        attributes = attributes.set("extra", missing);
    }

    let mut events = Vec::new();
    for e in 0..rng.gen_range(0..3) {
        events.push(
            Obj::new()
                .opt("timeUnixNano", start + 100 * (e + 1))
                .set("name", if e == 0 { "cache miss" } else { "retry" })
                .opt("droppedAttributesCount", rng.gen_range(0..2i64))
                .done(),
        );
    }

    let mut links = Vec::new();
    if rng.gen_bool(0.25) {
        links.push(
            Obj::new()
                .set("traceId", trace_id.to_vec())
                .set("spanId", id(rng, 8))
                .opt("traceState", if rng.gen_bool(0.5) { "vendor=1" } else { "" })
                .done(),
        );
    }

    let mut status = Obj::new().set("code", status_code);
    if status_code == 2 {
        status = status.set("message", "upstream failed");
    }

    let span = Obj::new()
        .set("traceId", trace_id.to_vec())
        .set("spanId", span_id.clone())
        .opt("parentSpanId", parent.map(|p| p.to_vec()).unwrap_or_default())
        .set("name", SPAN_NAMES[rng.gen_range(0..SPAN_NAMES.len())])
        .opt("kind", rng.gen_range(0..4i64))
        .set("startTimeUnixNano", start)
        .set("endTimeUnixNano", end)
        .set("attributes", attributes.done())
        .opt("events", events)
        .opt("links", links)
        .set("status", status.done())
        .done();
    (span, span_id)
}

/// Generate a trace export request shaped like the trace definition's data, with a fixed seed.
pub fn trace_request(seed: u64, resources: usize, spans_per_scope: usize) -> Value {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut time = 1_700_000_000_000_000_000i64;
    let mut resource_spans = Vec::with_capacity(resources);
    for r in 0..resources {
        let trace_id = id(&mut rng, 16);
        let mut spans = Vec::with_capacity(spans_per_scope);
        let mut parent: Option<Vec<u8>> = None;
        for _ in 0..spans_per_scope {
            time += rng.gen_range(-50_000..2_000_000i64);
            let (span, span_id) = span(&mut rng, &trace_id, parent.as_deref(), time);
            spans.push(span);
            if rng.gen_bool(0.7) {
                parent = Some(span_id);
            }
        }
        let scope = Obj::new()
            .set("name", "io.opentelemetry.http")
            .set("version", "1.2.0")
            .done();
        let scope_spans = Obj::new()
            .set("scope", scope)
            .opt("spans", spans)
            .set("schemaUrl", SCHEMA_URL)
            .done();
        resource_spans.push(
            Obj::new()
                .set("resource", resource(&mut rng, r))
                .set("scopeSpans", vec![scope_spans])
                .set("schemaUrl", SCHEMA_URL)
                .done(),
        );
    }
    Obj::new().opt("resourceSpans", resource_spans).done()
}
