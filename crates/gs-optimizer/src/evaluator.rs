//! Scoring of individual configurations.
//!
//! An [`Evaluator`] binds a pluggable [`Scorer`] to an injected dataset and a
//! fixed seed, so evaluating the same configuration twice gives the same
//! score. [`CrossValidation`] is the stock scorer: k-fold splits scored in
//! parallel and averaged.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use gs_types::{Configuration, EvaluationError};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

/// Seed used when none is configured.
pub const DEFAULT_SEED: u64 = 42;

/// A scoring function `(configuration, dataset, seed) -> score`.
pub trait Scorer<D>: Send + Sync {
    fn score(&self, configuration: &Configuration, dataset: &D, seed: u64)
        -> Result<f64, EvaluationError>;
}

impl<D, F> Scorer<D> for F
where
    F: Fn(&Configuration, &D, u64) -> Result<f64, EvaluationError> + Send + Sync,
{
    fn score(
        &self,
        configuration: &Configuration,
        dataset: &D,
        seed: u64,
    ) -> Result<f64, EvaluationError> {
        self(configuration, dataset, seed)
    }
}

/// Anything that can be split into folds by sample index.
pub trait Dataset: Send + Sync {
    fn n_samples(&self) -> usize;
}

impl<T: Send + Sync> Dataset for Vec<T> {
    fn n_samples(&self) -> usize {
        self.len()
    }
}

/// Binds a scorer to a dataset, a seed and an optional time limit.
pub struct Evaluator<D> {
    scorer: Arc<dyn Scorer<D>>,
    dataset: Arc<D>,
    seed: u64,
    timeout: Option<Duration>,
}

impl<D> Clone for Evaluator<D> {
    fn clone(&self) -> Self {
        Self {
            scorer: Arc::clone(&self.scorer),
            dataset: Arc::clone(&self.dataset),
            seed: self.seed,
            timeout: self.timeout,
        }
    }
}

impl<D> fmt::Debug for Evaluator<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Evaluator")
            .field("seed", &self.seed)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl<D: Send + Sync + 'static> Evaluator<D> {
    pub fn new(scorer: impl Scorer<D> + 'static, dataset: D) -> Self {
        Self::shared(Arc::new(scorer), Arc::new(dataset))
    }

    /// Like [`Evaluator::new`] for plain closures; the `Fn` bound lets the
    /// closure's argument and return types be inferred.
    pub fn from_fn<F>(score: F, dataset: D) -> Self
    where
        F: Fn(&Configuration, &D, u64) -> Result<f64, EvaluationError> + Send + Sync + 'static,
    {
        Self::new(score, dataset)
    }

    pub fn shared(scorer: Arc<dyn Scorer<D>>, dataset: Arc<D>) -> Self {
        Self {
            scorer,
            dataset,
            seed: DEFAULT_SEED,
            timeout: None,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Score one configuration on the calling thread. Non-finite scores are
    /// rejected so they can never be recorded.
    pub fn evaluate(&self, configuration: &Configuration) -> Result<f64, EvaluationError> {
        let score = self
            .scorer
            .score(configuration, self.dataset.as_ref(), self.seed)?;
        if !score.is_finite() {
            return Err(EvaluationError::NonFiniteScore { score });
        }
        Ok(score)
    }

    /// Score one configuration on the blocking pool, subject to the timeout.
    ///
    /// A timed-out scorer keeps running in the background; its result is
    /// discarded. A panicking scorer is reported as `Panicked`.
    pub async fn evaluate_bounded(
        &self,
        configuration: Configuration,
    ) -> Result<f64, EvaluationError> {
        let evaluator = self.clone();
        let handle = tokio::task::spawn_blocking(move || evaluator.evaluate(&configuration));

        let joined = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, handle).await.map_err(|_| {
                EvaluationError::Timeout {
                    timeout_ms: limit.as_millis() as u64,
                }
            })?,
            None => handle.await,
        };

        joined.map_err(|e| EvaluationError::Panicked {
            message: e.to_string(),
        })?
    }
}

// ---------------------------------------------------------------------------
// Cross-validation
// ---------------------------------------------------------------------------

/// One train/test split, as sample indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fold {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// K-fold splitter. Without shuffling, folds are contiguous; the first
/// `n_samples % n_splits` folds get one extra sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KFold {
    pub n_splits: usize,
    pub shuffle: bool,
}

impl KFold {
    pub fn new(n_splits: usize) -> Self {
        Self {
            n_splits,
            shuffle: false,
        }
    }

    pub fn shuffled(mut self) -> Self {
        self.shuffle = true;
        self
    }

    pub fn split(&self, n_samples: usize, seed: u64) -> Result<Vec<Fold>, EvaluationError> {
        if self.n_splits < 2 {
            return Err(EvaluationError::InvalidSplit {
                message: format!("n_splits must be at least 2, got {}", self.n_splits),
            });
        }
        if self.n_splits > n_samples {
            return Err(EvaluationError::InvalidSplit {
                message: format!(
                    "cannot make {} folds from {} samples",
                    self.n_splits, n_samples
                ),
            });
        }

        let mut indices: Vec<usize> = (0..n_samples).collect();
        if self.shuffle {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            indices.shuffle(&mut rng);
        }

        let base = n_samples / self.n_splits;
        let extra = n_samples % self.n_splits;
        let mut folds = Vec::with_capacity(self.n_splits);
        let mut start = 0;
        for k in 0..self.n_splits {
            let size = base + usize::from(k < extra);
            let end = start + size;
            let test = indices[start..end].to_vec();
            let train = indices[..start]
                .iter()
                .chain(&indices[end..])
                .copied()
                .collect();
            folds.push(Fold { train, test });
            start = end;
        }
        Ok(folds)
    }
}

impl Default for KFold {
    fn default() -> Self {
        Self::new(3)
    }
}

/// Scores a configuration as the mean of per-fold scores.
///
/// `fit_and_score` fits on `fold.train` and scores on `fold.test`. Folds run
/// in parallel; the first failing fold fails the whole evaluation.
#[derive(Debug, Clone)]
pub struct CrossValidation<F> {
    folds: KFold,
    fit_and_score: F,
}

impl<F> CrossValidation<F> {
    pub fn new<D>(folds: KFold, fit_and_score: F) -> Self
    where
        D: Dataset,
        F: Fn(&Configuration, &D, &Fold, u64) -> Result<f64, EvaluationError> + Send + Sync,
    {
        Self {
            folds,
            fit_and_score,
        }
    }
}

impl<D, F> Scorer<D> for CrossValidation<F>
where
    D: Dataset,
    F: Fn(&Configuration, &D, &Fold, u64) -> Result<f64, EvaluationError> + Send + Sync,
{
    fn score(
        &self,
        configuration: &Configuration,
        dataset: &D,
        seed: u64,
    ) -> Result<f64, EvaluationError> {
        let folds = self.folds.split(dataset.n_samples(), seed)?;
        let scores = folds
            .par_iter()
            .map(|fold| (self.fit_and_score)(configuration, dataset, fold, seed))
            .collect::<Result<Vec<f64>, EvaluationError>>()?;

        Ok(scores.iter().sum::<f64>() / scores.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gs_types::ParameterValue;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn c_value(configuration: &Configuration) -> Result<f64, EvaluationError> {
        match configuration.get("C") {
            Some(ParameterValue::Float(v)) => Ok(*v),
            other => Err(EvaluationError::InvalidConfiguration {
                message: format!("expected float C, got {other:?}"),
            }),
        }
    }

    #[test]
    fn evaluate_passes_dataset_and_seed() {
        let evaluator = Evaluator::from_fn(
            |c, data: &Vec<f64>, seed| Ok(c_value(c)? * data.len() as f64 + seed as f64),
            vec![1.0, 2.0, 3.0],
        )
        .with_seed(7);

        let score = evaluator
            .evaluate(&Configuration::new().with("C", 2.0))
            .unwrap();
        assert_eq!(score, 13.0);
    }

    #[test]
    fn non_finite_scores_are_errors() {
        let evaluator = Evaluator::from_fn(|_, _, _| Ok(f64::NAN), ());
        let err = evaluator.evaluate(&Configuration::new()).unwrap_err();
        assert!(matches!(err, EvaluationError::NonFiniteScore { .. }));
    }

    #[test]
    fn scorer_errors_propagate() {
        let evaluator =
            Evaluator::from_fn(|_, _, _| Err(EvaluationError::scoring("singular matrix")), ());
        let err = evaluator.evaluate(&Configuration::new()).unwrap_err();
        assert_eq!(err, EvaluationError::scoring("singular matrix"));
    }

    #[tokio::test]
    async fn bounded_evaluation_times_out() {
        let evaluator = Evaluator::from_fn(
            |_, _, _| {
                std::thread::sleep(Duration::from_millis(500));
                Ok(1.0)
            },
            (),
        )
        .with_timeout(Some(Duration::from_millis(20)));

        let err = evaluator
            .evaluate_bounded(Configuration::new())
            .await
            .unwrap_err();
        assert_eq!(err, EvaluationError::Timeout { timeout_ms: 20 });
    }

    #[tokio::test]
    async fn bounded_evaluation_reports_panics() {
        let evaluator = Evaluator::from_fn(|_, _, _| panic!("model exploded"), ());
        let err = evaluator
            .evaluate_bounded(Configuration::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EvaluationError::Panicked { .. }));
    }

    #[tokio::test]
    async fn bounded_evaluation_returns_score() {
        let evaluator = Evaluator::from_fn(|c, _, _| c_value(c), ())
            .with_timeout(Some(Duration::from_secs(5)));
        let score = evaluator
            .evaluate_bounded(Configuration::new().with("C", 0.5))
            .await
            .unwrap();
        assert_eq!(score, 0.5);
    }

    #[test]
    fn kfold_sizes_and_coverage() {
        let folds = KFold::new(3).split(10, 0).unwrap();
        let sizes: Vec<usize> = folds.iter().map(|f| f.test.len()).collect();
        assert_eq!(sizes, vec![4, 3, 3]);
        assert_eq!(folds[0].test, vec![0, 1, 2, 3]);

        let mut seen: Vec<usize> = folds.iter().flat_map(|f| f.test.clone()).collect();
        seen.sort();
        assert_eq!(seen, (0..10).collect::<Vec<_>>());

        for fold in &folds {
            assert_eq!(fold.train.len() + fold.test.len(), 10);
            assert!(fold.test.iter().all(|i| !fold.train.contains(i)));
        }
    }

    #[test]
    fn shuffled_kfold_is_reproducible_per_seed() {
        let kfold = KFold::new(5).shuffled();
        let a = kfold.split(50, 42).unwrap();
        let b = kfold.split(50, 42).unwrap();
        assert_eq!(a, b);

        let c = kfold.split(50, 43).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn kfold_rejects_bad_setups() {
        assert!(KFold::new(1).split(10, 0).is_err());
        assert!(KFold::new(5).split(3, 0).is_err());
    }

    #[test]
    fn cross_validation_averages_fold_scores() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let cv = CrossValidation::new(
            KFold::new(3),
            move |_: &Configuration, data: &Vec<f64>, fold: &Fold, _: u64| {
                counter.fetch_add(1, Ordering::SeqCst);
                // Mean of the held-out values.
                let sum: f64 = fold.test.iter().map(|&i| data[i]).sum();
                Ok(sum / fold.test.len() as f64)
            },
        );

        // Folds: [0,1] -> 0.5, [2,3] -> 2.5, [4,5] -> 4.5
        let data: Vec<f64> = (0..6).map(f64::from).collect();
        let score = cv.score(&Configuration::new(), &data, 0).unwrap();
        assert!((score - 2.5).abs() < 1e-12);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn cross_validation_fails_when_a_fold_fails() {
        let cv = CrossValidation::new(
            KFold::new(2),
            |_: &Configuration, _: &Vec<u8>, fold: &Fold, _: u64| {
                if fold.test.contains(&0) {
                    Err(EvaluationError::scoring("did not converge"))
                } else {
                    Ok(1.0)
                }
            },
        );
        let err = cv.score(&Configuration::new(), &vec![0u8; 4], 0).unwrap_err();
        assert_eq!(err, EvaluationError::scoring("did not converge"));
    }
}
