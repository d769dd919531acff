use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ndarray::{Array1, Array2};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use runboard::orchestrator::{
    OrchestratorConfig, StepEvaluator, StepOutcome, StrategyKind, TrainerState, TrainingStrategy,
};
use runboard::preprocessing::Split;
use runboard::registry::{Hyperparams, ModelKind};

fn create_split(n_rows: usize, n_features: usize, n_classes: usize) -> Split {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let mut make = |n: usize| {
        let y: Array1<f64> = (0..n).map(|_| rng.gen_range(0..n_classes) as f64).collect();
        let x = Array2::from_shape_fn((n, n_features), |(i, j)| {
            y[i] * (1.0 + j as f64 * 0.1) + rng.gen::<f64>()
        });
        (x, y)
    };
    let (x_train, y_train) = make(n_rows);
    let (x_val, y_val) = make(n_rows / 5);
    let (x_test, y_test) = make(n_rows / 5);
    Split {
        x_train,
        x_val,
        x_test,
        y_train,
        y_val,
        y_test,
        feature_names: (0..n_features).map(|j| format!("feature_{}", j)).collect(),
        class_labels: (0..n_classes).map(|c| c.to_string()).collect(),
    }
}

/// One step of each strategy, starting from a fresh state
fn bench_strategy_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("strategy_step");
    group.sample_size(10);

    let split = create_split(2000, 10, 3);
    let config = OrchestratorConfig::immediate();

    for kind in [ModelKind::Mlp, ModelKind::RandomForest, ModelKind::LogisticRegression] {
        let user = Hyperparams::new();
        let merged = kind.resolve_params(&user);
        let model = kind.build(&merged).unwrap();
        let strategy = StrategyKind::for_model(kind)
            .build(kind, &user, &merged, &model, &config)
            .unwrap();

        group.bench_with_input(BenchmarkId::new("step", kind.id()), &split, |b, split| {
            b.iter(|| {
                let state = TrainerState::new(model.clone());
                strategy.step(state, black_box(10), split).unwrap()
            })
        });
    }

    group.finish();
}

fn bench_evaluation(c: &mut Criterion) {
    let mut group = c.benchmark_group("evaluation");

    let split = create_split(5000, 10, 3);
    let kind = ModelKind::NaiveBayes;
    let mut model = kind.build(&kind.default_params()).unwrap();
    model.fit(&split.x_train, &split.y_train).unwrap();
    let evaluator = StepEvaluator::new(true);

    group.bench_function("metric_bundle", |b| {
        b.iter(|| {
            evaluator
                .evaluate_split(black_box(&model), 1, &split, split.x_train.nrows())
                .unwrap()
        })
    });

    group.finish();
}

fn bench_learning_curve_prefix(c: &mut Criterion) {
    let mut group = c.benchmark_group("learning_curve");
    group.sample_size(10);

    let split = create_split(3000, 8, 4);
    let kind = ModelKind::DecisionTree;
    let user = Hyperparams::new();
    let merged = kind.resolve_params(&user);
    let model = kind.build(&merged).unwrap();
    let strategy = StrategyKind::LearningCurve
        .build(kind, &user, &merged, &model, &OrchestratorConfig::immediate())
        .unwrap();

    for step in [1usize, 10, 20] {
        group.bench_with_input(BenchmarkId::new("step", step), &step, |b, &step| {
            b.iter(|| match strategy.step(TrainerState::default(), step, &split).unwrap() {
                StepOutcome::Trained { reference_rows, .. } => reference_rows,
                StepOutcome::Skipped { .. } => 0,
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_strategy_step, bench_evaluation, bench_learning_curve_prefix);
criterion_main!(benches);
