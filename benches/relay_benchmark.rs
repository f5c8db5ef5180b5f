use criterion::{criterion_group, criterion_main, Criterion};
use penpal_api::services::relay::{LineBuffer, StreamFormat};
use std::hint::black_box;

/// A few hundred tokens of upstream body in each wire format.
fn bodies() -> Vec<(&'static str, StreamFormat, String)> {
    let words: Vec<String> = (0..400).map(|i| format!("word{i} ")).collect();

    let openai: String = words
        .iter()
        .map(|w| {
            format!("data: {{\"choices\":[{{\"index\":0,\"delta\":{{\"content\":\"{w}\"}},\"finish_reason\":null}}]}}\n\n")
        })
        .chain(std::iter::once("data: [DONE]\n\n".to_string()))
        .collect();

    let anthropic: String = words
        .iter()
        .map(|w| {
            format!("event: content_block_delta\ndata: {{\"type\":\"content_block_delta\",\"index\":0,\"delta\":{{\"type\":\"text_delta\",\"text\":\"{w}\"}}}}\n\n")
        })
        .chain(std::iter::once(
            "event: message_stop\ndata: {\"type\":\"message_stop\"}\n\n".to_string(),
        ))
        .collect();

    let ollama: String = words
        .iter()
        .map(|w| format!("{{\"message\":{{\"role\":\"assistant\",\"content\":\"{w}\"}},\"done\":false}}\n"))
        .chain(std::iter::once(
            "{\"message\":{\"role\":\"assistant\",\"content\":\"\"},\"done\":true}\n".to_string(),
        ))
        .collect();

    vec![
        ("openai_sse", StreamFormat::OpenAiSse, openai),
        ("anthropic_sse", StreamFormat::AnthropicSse, anthropic),
        ("ollama_ndjson", StreamFormat::OllamaNdjson, ollama),
    ]
}

/// Split into network-sized chunks and decode every line.
fn decode(format: StreamFormat, body: &[u8], chunk_size: usize) -> usize {
    let mut buffer = LineBuffer::default();
    let mut content = 0;
    for chunk in body.chunks(chunk_size) {
        for line in buffer.push(chunk).unwrap_or_default() {
            if let Some(text) = format.decode_line(&line).content {
                content += text.len();
            }
        }
    }
    content
}

fn benchmark_decode_stream(c: &mut Criterion) {
    let mut group = c.benchmark_group("relay_decode");

    for (name, format, body) in bodies() {
        group.bench_function(format!("{name}_1k_chunks"), |b| {
            b.iter(|| decode(format, black_box(body.as_bytes()), 1024))
        });
        group.bench_function(format!("{name}_7b_chunks"), |b| {
            b.iter(|| decode(format, black_box(body.as_bytes()), 7))
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_decode_stream);
criterion_main!(benches);
