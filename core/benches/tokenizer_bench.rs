use criterion::{criterion_group, criterion_main, Criterion};
use kbase_core::tokenizer::tokenize;
use kbase_core::{Config, KnowledgeBase, SearchOptions};

const SAMPLE: &str = "Senior programme manager with twelve years delivering digital transformation \
across healthcare providers. Led PMO functions, built automation pipelines, and coached \
delivery teams on agile portfolio governance, vendor management and clinical data platforms.";

fn bench_tokenize(c: &mut Criterion) {
    c.bench_function("tokenize_cv_paragraph", |b| b.iter(|| tokenize(SAMPLE)));
}

fn bench_search(c: &mut Criterion) {
    let dir = tempfile::tempdir().expect("tempdir");
    let kb = KnowledgeBase::open(Config::with_data_dir(dir.path())).expect("open");
    for i in 0..200 {
        kb.ingest_note(&format!("{SAMPLE} variant {i}"), &format!("Note {i}"), ["bench"]).expect("ingest");
    }
    let opts = SearchOptions::default();
    c.bench_function("search_200_docs", |b| b.iter(|| kb.search("healthcare automation governance", &opts)));
}

criterion_group!(benches, bench_tokenize, bench_search);
criterion_main!(benches);
