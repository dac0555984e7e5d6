//! Resolution benchmarks.
//!
//! Measures building, resolving, trait merging and validating AsyncAPI
//! documents with a growing number of channels. Every channel message and
//! operation goes through a `$ref`, and every operation applies a trait.
//!
//! Run with: cargo bench -p asyncref --bench resolution

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use asyncref::{process, resolve, Document, EngineConfig};

/// Generate an AsyncAPI 3.0 document with N channels and N operations.
fn generate_document(channel_count: usize) -> String {
    let mut channels = String::from("channels:\n");
    let mut operations = String::from("operations:\n");
    let mut messages = String::from("  messages:\n");

    for i in 0..channel_count {
        channels.push_str(&format!(
            r##"  orders{i}:
    address: "tenant/{{tenantId}}/orders{i}"
    parameters:
      tenantId:
        $ref: "#/components/parameters/tenantId"
    messages:
      created:
        $ref: "#/components/messages/Order{i}"
"##,
            i = i,
        ));
        operations.push_str(&format!(
            r##"  publishOrder{i}:
    action: send
    channel:
      $ref: "#/channels/orders{i}"
    messages:
      - $ref: "#/channels/orders{i}/messages/created"
    traits:
      - $ref: "#/components/operationTraits/kafka"
"##,
            i = i,
        ));
        messages.push_str(&format!(
            r##"    Order{i}:
      name: Order{i}
      payload:
        type: object
        properties:
          id:
            type: string
      traits:
        - $ref: "#/components/messageTraits/json"
"##,
            i = i,
        ));
    }

    format!(
        r##"asyncapi: "3.0.0"
info:
  title: Benchmark API
  version: "1.0.0"
{channels}{operations}components:
{messages}  parameters:
    tenantId:
      location: "$message.header#/tenant"
  operationTraits:
    kafka:
      bindings:
        kafka:
          clientId: bench
  messageTraits:
    json:
      contentType: application/json
"##,
        channels = channels,
        operations = operations,
        messages = messages,
    )
}

fn bench_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolution");
    let config = EngineConfig::default();

    for channel_count in [10, 100, 500] {
        let yaml = generate_document(channel_count);
        let tree = asyncref_tree::from_yaml_str(&yaml).unwrap();
        let doc = Document::build(tree.clone()).unwrap();

        group.bench_with_input(
            BenchmarkId::new("resolve", format!("{}_channels", channel_count)),
            &doc,
            |b, doc| {
                b.iter(|| black_box(resolve(black_box(doc))));
            },
        );

        group.bench_with_input(
            BenchmarkId::new("process", format!("{}_channels", channel_count)),
            &tree,
            |b, tree| {
                b.iter(|| {
                    let out = process(black_box(tree), &config).unwrap();
                    assert!(!out.has_fatal());
                    black_box(out);
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_resolution);
criterion_main!(benches);
