use criterion::{black_box, criterion_group, criterion_main, Criterion};
use gathr_gbdt::{GbdtParams, GbdtTrainer, Model};

fn trained_model() -> (Model, Vec<Vec<f64>>) {
    let mut features = Vec::new();
    let mut labels = Vec::new();
    for hour in 0..24u32 {
        for day in 0..7u32 {
            features.push(vec![f64::from(hour), f64::from(day)]);
            labels.push(u8::from(hour >= 18));
        }
    }
    let model = GbdtTrainer::new(GbdtParams::default())
        .fit(&features, &labels)
        .expect("synthetic data trains");
    (model, features)
}

fn bench_predict_proba(c: &mut Criterion) {
    let (model, rows) = trained_model();

    c.bench_function("gbdt_predict_proba_168_rows", |b| {
        b.iter(|| {
            let scores = model.predict_proba_batch(black_box(&rows));
            black_box(scores);
        });
    });
}

fn bench_fit(c: &mut Criterion) {
    let (_, rows) = trained_model();
    let labels: Vec<u8> = rows.iter().map(|r| u8::from(r[0] >= 18.0)).collect();
    let trainer = GbdtTrainer::new(GbdtParams {
        num_trees: 20,
        ..GbdtParams::default()
    });

    c.bench_function("gbdt_fit_20_trees", |b| {
        b.iter(|| black_box(trainer.fit(black_box(&rows), black_box(&labels))))
    });
}

criterion_group!(gbdt_benches, bench_predict_proba, bench_fit);
criterion_main!(gbdt_benches);
