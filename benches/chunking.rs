use criterion::{Criterion, criterion_group, criterion_main};
use rag_eval::documents::SourceDocument;
use rag_eval::embeddings::chunking::{ChunkingConfig, TextSplitter, chunk_documents};
use std::hint::black_box;

fn lease_page(page: usize) -> String {
    let mut text = format!("ARTICLE {}. GENERAL PROVISIONS\n\n", page + 1);
    for clause in 1..=12 {
        text.push_str(&format!(
            "{}.{} The Tenant shall pay the Rent monthly in advance on the first day of each \
             month. Either party may terminate this Agreement by giving not less than thirty \
             (30) days written notice to the other party.\n",
            page + 1,
            clause
        ));
        if clause % 4 == 0 {
            text.push('\n');
        }
    }
    text
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let config = ChunkingConfig::default();
    let page = lease_page(0);
    let documents: Vec<SourceDocument> = (0..50)
        .map(|i| SourceDocument {
            source: "source_documents/lease.pdf".to_string(),
            page: i,
            text: lease_page(i),
        })
        .collect();

    let splitter = TextSplitter::from_config(&config).expect("default config is valid");
    c.bench_function("split_page", |b| {
        b.iter(|| splitter.split_text(black_box(&page)))
    });
    c.bench_function("chunk_documents", |b| {
        b.iter(|| chunk_documents(black_box(&documents), black_box(&config)))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
