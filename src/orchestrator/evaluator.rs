//! Per-step metric bundle

use crate::error::Result;
use crate::preprocessing::Split;
use crate::tracking::{MetricPoint, MetricSink, RunId};
use crate::training::{accuracy, log_loss, weighted_scores, Estimator};
use ndarray::{s, Array1, Array2};
use std::borrow::Cow;
use tracing::warn;

pub const TEST_ACCURACY: &str = "test_accuracy";
pub const TRAIN_ACCURACY: &str = "train_accuracy";
pub const F1_SCORE: &str = "f1_score";
pub const PRECISION: &str = "precision";
pub const RECALL: &str = "recall";
pub const TEST_LOSS: &str = "test_loss";
pub const TRAIN_LOSS: &str = "train_loss";

/// A metric value, or the reason it could not be produced
#[derive(Debug, Clone, PartialEq)]
pub enum MetricOutcome {
    Computed(f64),
    Unavailable(String),
}

impl MetricOutcome {
    pub fn value(&self) -> Option<f64> {
        match self {
            MetricOutcome::Computed(v) => Some(*v),
            MetricOutcome::Unavailable(_) => None,
        }
    }
}

impl<E: std::fmt::Display> From<std::result::Result<f64, E>> for MetricOutcome {
    fn from(result: std::result::Result<f64, E>) -> Self {
        match result {
            Ok(v) => MetricOutcome::Computed(v),
            Err(e) => MetricOutcome::Unavailable(e.to_string()),
        }
    }
}

/// Metrics of one step, in emission order
#[derive(Debug, Clone)]
pub struct MetricBundle {
    pub step: u64,
    pub entries: Vec<(&'static str, MetricOutcome)>,
}

impl MetricBundle {
    pub fn get(&self, name: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|(n, _)| *n == name)
            .and_then(|(_, outcome)| outcome.value())
    }

    /// Points for every computed metric; unavailable ones are omitted
    pub fn points(&self, run_id: RunId) -> Vec<MetricPoint> {
        self.entries
            .iter()
            .filter_map(|(name, outcome)| {
                outcome
                    .value()
                    .map(|v| MetricPoint::new(run_id, self.step, *name, v))
            })
            .collect()
    }

    pub fn omitted(&self) -> impl Iterator<Item = (&'static str, &str)> + '_ {
        self.entries.iter().filter_map(|(name, outcome)| match outcome {
            MetricOutcome::Unavailable(reason) => Some((*name, reason.as_str())),
            MetricOutcome::Computed(_) => None,
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StepEvaluator {
    supports_proba: bool,
}

impl StepEvaluator {
    pub fn new(supports_proba: bool) -> Self {
        Self { supports_proba }
    }

    /// Score `model` on `(x_eval, y_eval)` and on the reference pair.
    ///
    /// Accuracy and the weighted scores are required; log-loss is only
    /// attempted when the model kind supports probabilities, and any
    /// failure there becomes [`MetricOutcome::Unavailable`].
    pub fn evaluate(
        &self,
        model: &Estimator,
        step: u64,
        x_eval: &Array2<f64>,
        y_eval: &Array1<f64>,
        x_ref: &Array2<f64>,
        y_ref: &Array1<f64>,
    ) -> Result<MetricBundle> {
        let eval_pred = model.predict(x_eval)?;
        let ref_pred = model.predict(x_ref)?;
        let scores = weighted_scores(y_eval, &eval_pred);

        let mut entries = vec![
            (TEST_ACCURACY, MetricOutcome::Computed(accuracy(y_eval, &eval_pred))),
            (TRAIN_ACCURACY, MetricOutcome::Computed(accuracy(y_ref, &ref_pred))),
            (F1_SCORE, MetricOutcome::Computed(scores.f1)),
            (PRECISION, MetricOutcome::Computed(scores.precision)),
            (RECALL, MetricOutcome::Computed(scores.recall)),
        ];

        if self.supports_proba {
            entries.push((TEST_LOSS, loss(model, x_eval, y_eval)));
            entries.push((TRAIN_LOSS, loss(model, x_ref, y_ref)));
        }

        Ok(MetricBundle { step, entries })
    }

    /// Evaluate against the validation partition, using the first
    /// `reference_rows` training rows as reference
    pub fn evaluate_split(
        &self,
        model: &Estimator,
        step: u64,
        split: &Split,
        reference_rows: usize,
    ) -> Result<MetricBundle> {
        let (x_ref, y_ref) = if reference_rows >= split.x_train.nrows() {
            (Cow::Borrowed(&split.x_train), Cow::Borrowed(&split.y_train))
        } else {
            (
                Cow::Owned(split.x_train.slice(s![..reference_rows, ..]).to_owned()),
                Cow::Owned(split.y_train.slice(s![..reference_rows]).to_owned()),
            )
        };
        self.evaluate(model, step, &split.x_val, &split.y_val, &x_ref, &y_ref)
    }

    /// Persist a bundle as a single batch
    pub fn emit(&self, bundle: &MetricBundle, run_id: RunId, sink: &dyn MetricSink) -> Result<()> {
        for (name, reason) in bundle.omitted() {
            warn!(run_id, step = bundle.step, metric = name, reason, "Optional metric omitted");
        }
        sink.append_batch(bundle.points(run_id))
    }
}

fn loss(model: &Estimator, x: &Array2<f64>, y: &Array1<f64>) -> MetricOutcome {
    model
        .predict_proba(x)
        .and_then(|proba| log_loss(y, &proba, model.classes()))
        .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::{GaussianNaiveBayes, SGDClassifier, SGDConfig};
    use ndarray::array;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::layer::{Context, SubscriberExt};
    use tracing_subscriber::Layer;

    /// Counts warn-level events
    struct Warnings(Arc<AtomicUsize>);

    impl<S: tracing::Subscriber> Layer<S> for Warnings {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
            if *event.metadata().level() == tracing::Level::WARN {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[derive(Default)]
    struct VecSink(Mutex<Vec<Vec<MetricPoint>>>);

    impl MetricSink for VecSink {
        fn append(&self, point: MetricPoint) -> Result<()> {
            self.0.lock().unwrap().push(vec![point]);
            Ok(())
        }

        fn append_batch(&self, points: Vec<MetricPoint>) -> Result<()> {
            self.0.lock().unwrap().push(points);
            Ok(())
        }
    }

    fn data() -> (Array2<f64>, Array1<f64>) {
        let x = array![[0.0, 0.1], [0.2, 0.0], [0.1, 0.3], [3.0, 3.1], [3.2, 2.9], [2.8, 3.0]];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        (x, y)
    }

    #[test]
    fn test_bundle_with_loss() {
        let (x, y) = data();
        let mut model = Estimator::NaiveBayes(GaussianNaiveBayes::new());
        model.fit(&x, &y).unwrap();

        let bundle = StepEvaluator::new(true).evaluate(&model, 3, &x, &y, &x, &y).unwrap();
        assert_eq!(bundle.get(TEST_ACCURACY), Some(1.0));
        assert!(bundle.get(TEST_LOSS).is_some());
        assert_eq!(bundle.points(7).len(), 7);
        assert!(bundle.points(7).iter().all(|p| p.step == 3 && p.run_id == 7));
    }

    #[test]
    fn test_unavailable_loss_is_omitted() {
        let (x, y) = data();
        let mut model = Estimator::Sgd(SGDClassifier::new(SGDConfig {
            random_state: Some(1),
            ..Default::default()
        }));
        model.fit(&x, &y).unwrap();

        let evaluator = StepEvaluator::new(true);
        let bundle = evaluator.evaluate(&model, 1, &x, &y, &x, &y).unwrap();
        assert_eq!(bundle.omitted().count(), 2);

        let sink = VecSink::default();
        let warnings = Arc::new(AtomicUsize::new(0));
        let subscriber = tracing_subscriber::registry().with(Warnings(Arc::clone(&warnings)));
        tracing::subscriber::with_default(subscriber, || evaluator.emit(&bundle, 1, &sink)).unwrap();
        assert_eq!(warnings.load(Ordering::SeqCst), 2, "one warning per omitted metric");

        let batches = sink.0.lock().unwrap();
        assert_eq!(batches.len(), 1);
        let names: Vec<&str> = batches[0].iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec![TEST_ACCURACY, TRAIN_ACCURACY, F1_SCORE, PRECISION, RECALL]);
    }

    #[test]
    fn test_unseen_label_drops_loss_only() {
        let (x, y) = data();
        let mut model = Estimator::NaiveBayes(GaussianNaiveBayes::new());
        model.fit(&x, &y).unwrap();

        let y_eval = array![0.0, 0.0, 0.0, 1.0, 1.0, 2.0];
        let bundle = StepEvaluator::new(true).evaluate(&model, 1, &x, &y_eval, &x, &y).unwrap();
        assert!(bundle.get(TEST_LOSS).is_none());
        assert!(bundle.get(TRAIN_LOSS).is_some());
        assert!(bundle.get(PRECISION).is_some());
    }
}
