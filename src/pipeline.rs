//! Training and prediction stages.
//!
//! ```text
//! prefetch:  corpus ─tfidf─▶ vectors ─centroids─▶ top-k_train labels ─▶ cache
//! train:     cache ─▶ label → proposed docs ─▶ one reranker per label ─▶ store
//! predict:   test vectors ─centroids─▶ top-k_predict ─rerankers─▶ labels
//! ```
//!
//! Each stage persists its output so later stages can be rerun on their own.
//! Document ids are positions in the corpus the stage was handed; the
//! validation split is reproducible from `seed`, so the prefetch and train
//! stages see the same ids when both hold out.

use crate::binary::{BinaryClassifier, RerankerParams};
use crate::cache::RetrievalCache;
use crate::centroid::CentroidClassifier;
use crate::config::PipelineConfig;
use crate::corpus::{self, CategoryIndex, Corpus, LabelSet};
use crate::error::{LexirankError, Result};
use crate::evaluation::{Evaluation, Scores};
use crate::knn_vote::KnnVoteClassifier;
use crate::rerank::rank_candidates;
use crate::sparse::SparseVector;
use crate::store::ClassifierStore;
use crate::tfidf::TfidfVectorizer;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Anything that proposes candidate labels for a document.
pub trait CandidateGenerator: Sync {
    /// Up to `k` candidate label ids, best first.
    fn candidates(&self, query: &SparseVector, k: usize) -> Vec<u32>;
}

/// Label id → documents that had the label proposed.
pub type TrainingSets = BTreeMap<u32, Vec<u32>>;

/// Per-document predictions, ascending by document id.
pub type Predictions = Vec<(u32, Vec<u32>)>;

struct Progress {
    stage: &'static str,
    every: usize,
    total: usize,
    done: AtomicUsize,
}

impl Progress {
    fn new(stage: &'static str, every: usize, total: usize) -> Self {
        Self {
            stage,
            every,
            total,
            done: AtomicUsize::new(0),
        }
    }

    fn tick(&self) {
        let done = self.done.fetch_add(1, Ordering::Relaxed) + 1;
        if self.every > 0 && done % self.every == 0 {
            info!(stage = self.stage, done, total = self.total, "progress");
        }
    }
}

/// Rayon pool sized by `config.threads`.
pub fn build_thread_pool(config: &PipelineConfig) -> Result<rayon::ThreadPool> {
    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(threads) = config.threads {
        builder = builder.num_threads(threads);
    }
    builder
        .build()
        .map_err(|e| LexirankError::Config(format!("thread pool: {e}")))
}

/// Run `stage` on a pool of `config.threads` workers, or on the global pool
/// when unset.
pub fn with_thread_pool<T, F>(config: &PipelineConfig, stage: F) -> Result<T>
where
    T: Send,
    F: FnOnce() -> Result<T> + Send,
{
    match config.threads {
        Some(_) => build_thread_pool(config)?.install(stage),
        None => stage(),
    }
}

/// Cache the top-`k` candidates of every document.
pub fn prefetch<G: CandidateGenerator + ?Sized>(
    documents: &[SparseVector],
    generator: &G,
    k: usize,
    progress_every: usize,
) -> RetrievalCache {
    let cache = RetrievalCache::new();
    let progress = Progress::new("prefetch", progress_every, documents.len());
    documents.par_iter().enumerate().for_each(|(doc, query)| {
        cache.put(doc as u32, &generator.candidates(query, k));
        progress.tick();
    });
    info!(documents = cache.len(), k, "prefetch finished");
    cache
}

/// Invert the cache: for each proposed label, the documents it was proposed for.
///
/// Only the first `k_train` candidates of each document count. Document ids
/// within a set are ascending.
pub fn training_sets(cache: &RetrievalCache, k_train: usize) -> TrainingSets {
    let mut sets = TrainingSets::new();
    for doc in cache.documents() {
        let Some(candidates) = cache.get(doc) else {
            continue;
        };
        for &label in candidates.iter().take(k_train) {
            sets.entry(label).or_default().push(doc);
        }
    }
    sets
}

/// Seed of the per-label SGD stream.
fn label_seed(seed: u64, label: u32) -> u64 {
    seed ^ u64::from(label).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

/// Train one reranker per label in `categories`.
///
/// A label's examples are the documents it was proposed for: positives carry
/// the label, negatives do not. Each label draws from its own seeded stream,
/// so the result does not depend on scheduling.
pub fn train_rerankers(
    documents: &[SparseVector],
    labels: &[LabelSet],
    categories: &CategoryIndex,
    sets: &TrainingSets,
    params: &RerankerParams,
    seed: u64,
    progress_every: usize,
) -> ClassifierStore {
    let store = ClassifierStore::new();
    let progress = Progress::new("train", progress_every, categories.len());
    let degenerate = AtomicUsize::new(0);
    let targets: Vec<u32> = categories.keys().copied().collect();

    targets.par_iter().for_each(|&label| {
        let proposed = sets.get(&label).map(Vec::as_slice).unwrap_or(&[]);
        let (mut positives, mut negatives) = (Vec::new(), Vec::new());
        for &doc in proposed {
            let (Some(vector), Some(doc_labels)) =
                (documents.get(doc as usize), labels.get(doc as usize))
            else {
                continue;
            };
            if doc_labels.contains(&label) {
                positives.push(vector);
            } else {
                negatives.push(vector);
            }
        }
        if positives.is_empty() || negatives.is_empty() {
            degenerate.fetch_add(1, Ordering::Relaxed);
        }

        let mut rng = StdRng::seed_from_u64(label_seed(seed, label));
        let model = BinaryClassifier::train(&positives, &negatives, params, &mut rng);
        store.set(label, model);
        progress.tick();
    });

    let degenerate = degenerate.into_inner();
    if degenerate > 0 {
        warn!(
            degenerate,
            labels = targets.len(),
            "labels trained without one of the classes"
        );
    }
    info!(
        models = store.len(),
        nonzero_weights = store.total_nonzero_weights(),
        "reranker training finished"
    );
    store
}

/// Retrieve `k_predict` candidates per document and rerank them.
pub fn predict<G: CandidateGenerator + ?Sized>(
    documents: &[SparseVector],
    generator: &G,
    store: &ClassifierStore,
    k_predict: usize,
    progress_every: usize,
) -> Predictions {
    let progress = Progress::new("predict", progress_every, documents.len());
    documents
        .par_iter()
        .enumerate()
        .map(|(doc, query)| {
            let candidates = generator.candidates(query, k_predict);
            let labels = rank_candidates(query, &candidates, store);
            progress.tick();
            (doc as u32, labels)
        })
        .collect()
}

/// Predict held-out documents and score them against their labels.
pub fn validate<G: CandidateGenerator + ?Sized>(
    documents: &[SparseVector],
    labels: &[LabelSet],
    generator: &G,
    store: &ClassifierStore,
    k_predict: usize,
    progress_every: usize,
) -> Scores {
    let mut evaluation = Evaluation::new();
    for (doc, predicted) in predict(documents, generator, store, k_predict, progress_every) {
        if let Some(actual) = labels.get(doc as usize) {
            evaluation.update(&predicted, actual);
        }
    }
    let scores = evaluation.score();
    info!(
        documents = evaluation.examples(),
        macro_f1 = scores.macro_f1,
        macro_precision = scores.macro_precision,
        macro_recall = scores.macro_recall,
        top1_accuracy = scores.top1_accuracy,
        "validation finished"
    );
    scores
}

/// `Id,Predicted` CSV with 1-based document ids and space-separated labels.
pub fn write_submission<W: Write>(mut writer: W, predictions: &[(u32, Vec<u32>)]) -> Result<()> {
    writeln!(writer, "Id,Predicted")?;
    for (doc, labels) in predictions {
        write!(writer, "{},", u64::from(*doc) + 1)?;
        for (i, label) in labels.iter().enumerate() {
            if i > 0 {
                writer.write_all(b" ")?;
            }
            write!(writer, "{label}")?;
        }
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

fn training_split(
    config: &PipelineConfig,
    corpus: Corpus,
    hold_out: bool,
) -> Result<(Corpus, Corpus)> {
    if corpus.is_empty() {
        return Err(LexirankError::EmptyCorpus);
    }
    if !hold_out {
        return Ok((corpus, Corpus::default()));
    }
    let mut rng = StdRng::seed_from_u64(config.seed);
    let (train, held_out) = corpus::split(corpus, config.validation_ratio, &mut rng);
    info!(train = train.len(), held_out = held_out.len(), "split corpus");
    if train.is_empty() {
        return Err(LexirankError::EmptyCorpus);
    }
    Ok((train, held_out))
}

/// Fit the vectorizer and centroids, then cache `k_train` candidates per
/// training document. Writes the weights, centroid and cache artifacts.
pub fn run_prefetch(config: &PipelineConfig, corpus: Corpus, hold_out: bool) -> Result<()> {
    config.validate()?;
    let (mut train, _) = training_split(config, corpus, hold_out)?;

    with_thread_pool(config, move || {
        let vectorizer = TfidfVectorizer::train(&train.vectors);
        vectorizer.transform_all(&mut train.vectors);
        let centroids = CentroidClassifier::train(&train.category_index(), &train.vectors);
        info!(labels = centroids.len(), documents = train.len(), "centroids built");

        let cache = prefetch(
            &train.vectors,
            &centroids,
            config.k_train,
            config.progress_every,
        );

        vectorizer.save(&config.artifacts.weights)?;
        centroids.save(&config.artifacts.centroid)?;
        cache.save(&config.artifacts.cache)?;
        Ok(())
    })
}

/// Train the rerankers from a cached prefetch. Writes the model artifact.
///
/// `hold_out` must match the prefetch run so document ids line up.
pub fn run_train(
    config: &PipelineConfig,
    corpus: Corpus,
    hold_out: bool,
) -> Result<ClassifierStore> {
    config.validate()?;
    let (mut train, _) = training_split(config, corpus, hold_out)?;

    let vectorizer = TfidfVectorizer::load(&config.artifacts.weights)?;
    let cache = RetrievalCache::load(&config.artifacts.cache)?;
    with_thread_pool(config, move || {
        vectorizer.transform_all(&mut train.vectors);
        let sets = training_sets(&cache, config.k_train);
        let store = train_rerankers(
            &train.vectors,
            &train.labels,
            &train.category_index(),
            &sets,
            &config.reranker,
            config.seed,
            config.progress_every,
        );
        store.save(&config.artifacts.model)?;
        Ok(store)
    })
}

/// Score the held-out split of `corpus` with the saved artifacts.
pub fn run_validation(config: &PipelineConfig, corpus: Corpus) -> Result<Scores> {
    config.validate()?;
    let (_, mut held_out) = training_split(config, corpus, true)?;
    if held_out.is_empty() {
        return Err(LexirankError::EmptyCorpus);
    }

    let vectorizer = TfidfVectorizer::load(&config.artifacts.weights)?;
    let centroids = CentroidClassifier::load(&config.artifacts.centroid)?;
    let store = ClassifierStore::load(&config.artifacts.model)?;
    with_thread_pool(config, move || {
        vectorizer.transform_all(&mut held_out.vectors);
        Ok(validate(
            &held_out.vectors,
            &held_out.labels,
            &centroids,
            &store,
            config.k_predict,
            config.progress_every,
        ))
    })
}

/// Predict the test corpus with the saved artifacts and write the submission file.
pub fn run_predict(config: &PipelineConfig, test: Corpus) -> Result<Predictions> {
    config.validate()?;
    let centroids = CentroidClassifier::load(&config.artifacts.centroid)?;
    run_predict_with(config, test, &centroids)
}

/// Like [`run_predict`], with candidates proposed by `generator` instead of
/// the saved centroids.
pub fn run_predict_with<G: CandidateGenerator + ?Sized>(
    config: &PipelineConfig,
    mut test: Corpus,
    generator: &G,
) -> Result<Predictions> {
    config.validate()?;
    let vectorizer = TfidfVectorizer::load(&config.artifacts.weights)?;
    let store = ClassifierStore::load(&config.artifacts.model)?;

    let predictions = with_thread_pool(config, move || {
        vectorizer.transform_all(&mut test.vectors);
        let k = config.k_predict;
        Ok(predict(&test.vectors, generator, &store, k, config.progress_every))
    })?;
    write_submission(
        BufWriter::new(File::create(&config.artifacts.submission)?),
        &predictions,
    )?;
    info!(
        path = %config.artifacts.submission.display(),
        documents = predictions.len(),
        "submission written"
    );
    Ok(predictions)
}

/// Label the test corpus by neighbour voting alone and write the submission file.
pub fn run_knn_vote(
    config: &PipelineConfig,
    mut train: Corpus,
    mut test: Corpus,
) -> Result<Predictions> {
    config.validate()?;
    if train.is_empty() {
        return Err(LexirankError::EmptyCorpus);
    }

    let predictions = with_thread_pool(config, move || {
        let vectorizer = TfidfVectorizer::train(&train.vectors);
        vectorizer.transform_all(&mut train.vectors);
        vectorizer.transform_all(&mut test.vectors);

        let documents = Arc::from(train.vectors);
        let classifier = KnnVoteClassifier::new(documents, train.labels, config.knn_vote)?;
        let progress = Progress::new("knn vote", config.progress_every, test.len());
        Ok(test
            .vectors
            .par_iter()
            .enumerate()
            .map(|(doc, query)| {
                let labels = classifier.predict(query);
                progress.tick();
                (doc as u32, labels)
            })
            .collect::<Predictions>())
    })?;

    write_submission(
        BufWriter::new(File::create(&config.artifacts.submission)?),
        &predictions,
    )?;
    Ok(predictions)
}
