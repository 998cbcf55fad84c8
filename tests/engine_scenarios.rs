mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use prequel::data::domain::ChunkId;
use prequel::evaluation::retention::RetentionPolicy;
use prequel::store::domain::{ProjectState, Store, Transaction};
use prequel::store::repo_mem::MemStore;
use prequel::training::domain::LearnerKind;
use prequel::{Engine, PrequelError, PrequelResult};

use common::{labelled, numeric_schema, point, threshold_chunk, Lcg};

fn majority(policy: RetentionPolicy) -> Engine {
    Engine::in_memory(numeric_schema(), LearnerKind::Majority, policy).unwrap()
}

#[test]
fn chunk_accuracy_is_prequential() {
    let mut engine = majority(RetentionPolicy::disabled());

    let first = engine.insert_chunk(labelled(&["a", "a", "b"])).unwrap();
    engine.update().unwrap();
    let second = engine.insert_chunk(labelled(&["a", "b", "a"])).unwrap();
    engine.update().unwrap();

    let diag = engine.diagnostics();
    // chunk 1 saw an empty model; chunk 2 saw the model as of chunk 1 only
    assert_eq!(diag.chunk(first).unwrap().initial_correct_count, 0);
    assert_eq!(diag.chunk(second).unwrap().initial_correct_count, 2);
    assert_eq!(diag.initial_accuracies(), vec![0.0, 2.0 / 3.0]);

    let g = diag.global();
    assert_eq!((g.instance_count, g.updated_instance_count, g.instance_correct_count), (6, 6, 2));
    assert_eq!(g.instance_accuracy(), 2.0 / 6.0);
    diag.verify().unwrap();
}

#[test]
fn one_update_scores_all_pending_chunks_against_the_same_model() {
    let mut engine = majority(RetentionPolicy::disabled());
    engine.insert_chunk(labelled(&["a", "a"])).unwrap();
    engine.insert_chunk(labelled(&["a", "a"])).unwrap();
    let summary = engine.update().unwrap();

    assert_eq!(summary.updated_chunks, vec![ChunkId(1), ChunkId(2)]);
    assert_eq!(summary.correct_count, 0);
    assert_eq!(engine.diagnostics().pending_instance_count(), 0);
}

#[test]
fn post_hoc_recount_differs_from_prequential_count() {
    let mut engine = majority(RetentionPolicy::disabled());
    engine.insert_chunk(labelled(&["a", "a", "b", "a"])).unwrap();
    engine.update().unwrap();

    let diag = engine.diagnostics();
    assert_eq!(diag.global().instance_correct_count, 0);
    assert_eq!(diag.recount_with_current_model(), 3);
}

#[test]
fn update_with_nothing_pending_fails() {
    let mut engine = majority(RetentionPolicy::disabled());
    assert!(matches!(engine.update(), Err(PrequelError::State(_))));

    engine.insert_chunk(labelled(&["a"])).unwrap();
    engine.update().unwrap();
    assert!(matches!(engine.update(), Err(PrequelError::State(_))));
    assert!(matches!(engine.rebuild(), Ok(_)));
}

#[test]
fn rebuild_with_nothing_retained_fails() {
    let mut engine = majority(RetentionPolicy::disabled());
    assert!(matches!(engine.rebuild(), Err(PrequelError::State(_))));
}

#[test]
fn schema_mismatch_rejects_whole_chunk() {
    let mut engine = majority(RetentionPolicy::disabled());
    let mut batch = labelled(&["a", "b"]);
    batch[1].features.remove("x");
    assert!(matches!(engine.insert_chunk(batch), Err(PrequelError::Schema(_))));

    let mut batch = labelled(&["a"]);
    batch[0].features.insert("colour".into(), prequel::data::domain::Value::Text("red".into()));
    assert!(matches!(engine.insert_chunk(batch), Err(PrequelError::Schema(_))));

    assert_eq!(engine.global().instance_count, 0);
    assert_eq!(engine.diagnostics().last_chunk_id(), None);
}

#[test]
fn retention_settles_at_the_floor() {
    let mut engine = majority(RetentionPolicy::window(300, 600).unwrap());
    for _ in 0..6 {
        engine.insert_chunk(labelled(&["a"; 100])).unwrap();
        let summary = engine.update().unwrap();
        assert!(summary.evicted_chunks.is_empty());
    }
    assert_eq!(engine.global().instance_count, 600);

    engine.insert_chunk(labelled(&["a"; 100])).unwrap();
    let summary = engine.update().unwrap();

    assert_eq!(summary.evicted_chunks, vec![ChunkId(1), ChunkId(2), ChunkId(3), ChunkId(4)]);
    let diag = engine.diagnostics();
    assert_eq!(diag.global().instance_count, 300);
    assert_eq!(diag.global().updated_instance_count, 300);
    assert_eq!(diag.chunk_ids(), vec![ChunkId(5), ChunkId(6), ChunkId(7)]);
    diag.verify().unwrap();
}

#[test]
fn chunk_ids_stay_monotonic_across_eviction() {
    let mut engine = majority(RetentionPolicy::window(100, 150).unwrap());
    let mut issued = Vec::new();
    for _ in 0..5 {
        issued.push(engine.insert_chunk(labelled(&["a"; 100])).unwrap());
        engine.update().unwrap();
    }
    assert_eq!(issued, (1..=5).map(ChunkId).collect::<Vec<_>>());
    assert_eq!(engine.diagnostics().chunk_ids(), vec![ChunkId(5)]);
    assert_eq!(engine.diagnostics().last_chunk_id(), Some(ChunkId(5)));
    assert_eq!(engine.insert_chunk(labelled(&["a"])).unwrap(), ChunkId(6));
}

#[test]
fn rebuild_preserves_volume_and_first_pass_records() {
    let mut engine = Engine::in_memory(numeric_schema(), LearnerKind::NaiveBayes, RetentionPolicy::disabled()).unwrap();
    let mut rng = Lcg::new(7);
    for _ in 0..3 {
        engine.insert_chunk(threshold_chunk(&mut rng, 50, false)).unwrap();
        engine.update().unwrap();
    }
    let pending = engine.insert_chunk(threshold_chunk(&mut rng, 10, false)).unwrap();

    let before_volume = engine.global().instance_count;
    let before_initial = engine.diagnostics().initial_accuracies();
    let generation = engine.rebuild().unwrap();

    let diag = engine.diagnostics();
    assert_eq!(diag.global().instance_count, before_volume);
    assert_eq!(generation.instance_count, 150);
    assert_eq!(diag.global().updated_instance_count, 150);
    assert_eq!(diag.initial_accuracies(), before_initial);
    assert!(!diag.chunk(pending).unwrap().processed);
    diag.verify().unwrap();
}

#[test]
fn rebuild_recovers_from_concept_drift() {
    let policy = RetentionPolicy::window(600, 1000).unwrap();
    let mut engine = Engine::in_memory(numeric_schema(), LearnerKind::NaiveBayes, policy).unwrap();
    let mut rng = Lcg::new(42);

    for _ in 0..3 {
        engine.insert_chunk(threshold_chunk(&mut rng, 200, false)).unwrap();
        engine.update().unwrap();
    }
    let initial = engine.diagnostics().initial_accuracies();
    assert_eq!(initial[0], 0.0);
    assert!(initial[2] > 0.9, "steady accuracy {}", initial[2]);

    let mut evicted = Vec::new();
    for _ in 0..3 {
        engine.insert_chunk(threshold_chunk(&mut rng, 200, true)).unwrap();
        evicted.extend(engine.update().unwrap().evicted_chunks);
    }
    // the window dropped every pre-drift chunk
    assert_eq!(evicted, vec![ChunkId(1), ChunkId(2), ChunkId(3)]);
    let drifted = engine.diagnostics().global().instance_accuracy();
    assert!(drifted < 0.5, "drifted accuracy {drifted}");
    let stale_hits = engine.diagnostics().recount_with_current_model();

    let generation = engine.rebuild().unwrap();
    assert_eq!(generation.before_instance_accuracy, drifted);
    assert!(generation.after_instance_accuracy > 0.9, "rebuilt accuracy {}", generation.after_instance_accuracy);
    assert!(engine.diagnostics().recount_with_current_model() > stale_hits);

    let p = engine.predict(&point(0.9));
    assert_eq!(p.label.map(|l| l.0).as_deref(), Some("lo"));
    engine.diagnostics().verify().unwrap();
}

/// MemStore whose commits can be made to fail.
struct FlakyStore {
    inner: MemStore,
    fail: Arc<AtomicBool>,
}

impl Store for FlakyStore {
    fn state(&self) -> &ProjectState {
        self.inner.state()
    }

    fn commit(&mut self, tx: Transaction) -> PrequelResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PrequelError::store("disk unplugged"));
        }
        self.inner.commit(tx)
    }
}

#[test]
fn failed_commit_leaves_no_trace() {
    let fail = Arc::new(AtomicBool::new(false));
    let store = FlakyStore {
        inner: MemStore::new(),
        fail: fail.clone(),
    };
    let mut engine = Engine::new(
        numeric_schema(),
        Box::new(store),
        LearnerKind::Majority,
        RetentionPolicy::disabled(),
    )
    .unwrap();

    engine.insert_chunk(labelled(&["a", "b", "b"])).unwrap();
    fail.store(true, Ordering::SeqCst);
    assert!(matches!(engine.update(), Err(PrequelError::Store(_))));

    let diag = engine.diagnostics();
    assert_eq!(diag.global().updated_instance_count, 0);
    assert_eq!(diag.pending_instance_count(), 3);
    assert!(engine.predict(&point(0.1)).is_error());

    fail.store(false, Ordering::SeqCst);
    engine.update().unwrap();
    assert_eq!(engine.predict(&point(0.1)).label.map(|l| l.0).as_deref(), Some("b"));
}

#[test]
fn reports_are_idempotent() {
    let mut engine = majority(RetentionPolicy::disabled());
    engine.insert_chunk(labelled(&["a", "b"])).unwrap();
    engine.update().unwrap();
    engine.rebuild().unwrap();

    let a = engine.report_json("").unwrap();
    let b = engine.report_json("").unwrap();
    assert_eq!(a, b);
    let plot_a = engine.report_plot(&a, r#"{"terminal":"pngcairo"}"#).unwrap();
    let plot_b = engine.report_plot(&b, r#"{"terminal":"pngcairo"}"#).unwrap();
    assert_eq!(plot_a, plot_b);
    assert!(plot_a.starts_with("set terminal pngcairo\n"));

    assert!(matches!(engine.report_json(r#"{"categories":["nope"]}"#), Err(PrequelError::Report(_))));
}
