//! Per-project engine: one store, one live learner, one retention policy.
//!
//! Every mutating call plans against committed state, commits one
//! transaction, and only then swaps the live learner. A failed call leaves
//! both the store and the learner as they were.

use std::path::Path;

use crate::common::error::{PrequelError, PrequelResult};
use crate::common::time;
use crate::data::domain::{ChunkId, FeatureMap, Instance, Schema};
use crate::data::service::{self as data_service, RawRow};
use crate::evaluation::domain::{GenerationRecord, GlobalStats};
use crate::evaluation::retention::RetentionPolicy;
use crate::evaluation::service::Diagnostics;
use crate::inference::domain::Prediction;
use crate::inference::service as inference_service;
use crate::report::domain::{PlotOptions, ReportOptions};
use crate::report::service as report_service;
use crate::store::domain::{ChunkRecord, Store, Transaction};
use crate::store::repo_mem::MemStore;
use crate::training::domain::{Learner, LearnerKind};
use crate::training::service as training_service;

/// Summary of a committed update.
#[derive(Clone, Debug, PartialEq)]
pub struct UpdateSummary {
    pub updated_chunks: Vec<ChunkId>,
    pub instance_count: u64,
    pub correct_count: u64,
    pub evicted_chunks: Vec<ChunkId>,
}

pub struct Engine {
    schema: Schema,
    store: Box<dyn Store>,
    learner: Box<dyn Learner>,
    kind: LearnerKind,
    policy: RetentionPolicy,
}

impl Engine {
    /// Bind an engine to `store`, restoring the committed learner if any.
    ///
    /// `kind` is used when nothing was committed yet and for every rebuild.
    pub fn new(
        schema: Schema,
        store: Box<dyn Store>,
        kind: LearnerKind,
        policy: RetentionPolicy,
    ) -> PrequelResult<Self> {
        schema.validate()?;
        policy.validate()?;
        let learner = match store.learner() {
            Some(snapshot) => {
                let mut learner = snapshot.kind.build();
                learner.restore(snapshot)?;
                learner
            }
            None => kind.build(),
        };
        tracing::debug!(
            learner = %learner.kind(),
            trained = learner.trained_count(),
            revision = store.global().revision,
            "engine ready"
        );
        Ok(Self {
            schema,
            store,
            learner,
            kind,
            policy,
        })
    }

    /// Engine over a fresh [`MemStore`].
    pub fn in_memory(schema: Schema, kind: LearnerKind, policy: RetentionPolicy) -> PrequelResult<Self> {
        Self::new(schema, Box::new(MemStore::new()), kind, policy)
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn learner_kind(&self) -> LearnerKind {
        self.kind
    }

    /// Learner used from the next rebuild on.
    pub fn set_learner_kind(&mut self, kind: LearnerKind) {
        self.kind = kind;
    }

    pub fn retention_policy(&self) -> RetentionPolicy {
        self.policy
    }

    pub fn set_retention_policy(&mut self, policy: RetentionPolicy) -> PrequelResult<()> {
        policy.validate()?;
        tracing::info!(
            enabled = policy.enabled,
            lower_bound = policy.lower_bound,
            upper_bound = policy.upper_bound,
            "retention policy set"
        );
        self.policy = policy;
        Ok(())
    }

    pub fn global(&self) -> &GlobalStats {
        &self.store.global().stats
    }

    /// Accept a batch as one pending chunk.
    pub fn insert_chunk(&mut self, instances: Vec<Instance>) -> PrequelResult<ChunkId> {
        let span = tracing::info_span!("insert_chunk", instances = instances.len());
        let _guard = span.enter();

        if instances.is_empty() {
            return Err(PrequelError::schema("chunk has no instances"));
        }
        for (row, instance) in instances.iter().enumerate() {
            self.schema
                .check_instance(instance)
                .map_err(|e| PrequelError::schema(format!("instance {row}: {e}")))?;
        }

        let global = self.store.global();
        let id = global.next_chunk_id;
        let mut tx = Transaction::begin(global);
        tx.global.next_chunk_id = id.next();
        tx.global.stats.instance_count += instances.len() as u64;
        tx.put_chunks.push(ChunkRecord::pending(id, time::now_ms(), instances));
        self.store.commit(tx)?;

        tracing::info!(chunk_id = %id, "chunk added");
        Ok(id)
    }

    /// Parse in-memory string rows by the schema, then insert them.
    pub fn insert_chunk_rows(&mut self, rows: &[RawRow]) -> PrequelResult<ChunkId> {
        let instances = data_service::rows_to_instances(&self.schema, rows)?;
        self.insert_chunk(instances)
    }

    /// Read a headered CSV file, then insert its rows as one chunk.
    pub fn insert_chunk_csv(&mut self, path: &Path) -> PrequelResult<ChunkId> {
        let instances = data_service::read_csv(&self.schema, path)?;
        self.insert_chunk(instances)
    }

    /// Score then train every pending instance, then apply the retention window.
    pub fn update(&mut self) -> PrequelResult<UpdateSummary> {
        let span = tracing::info_span!("update");
        let _guard = span.enter();

        let plan = training_service::plan_update(self.store.state(), self.learner.as_ref(), &self.policy)?;
        self.store.commit(plan.tx)?;
        self.learner = plan.learner;

        let summary = UpdateSummary {
            updated_chunks: plan.updated_chunks,
            instance_count: plan.instance_count,
            correct_count: plan.correct_count,
            evicted_chunks: plan.evicted_chunks,
        };
        let stats = self.global();
        tracing::info!(
            chunks = summary.updated_chunks.len(),
            instances = summary.instance_count,
            evicted = summary.evicted_chunks.len(),
            instance_accuracy = stats.instance_accuracy(),
            "update completed"
        );
        Ok(summary)
    }

    /// Retrain from scratch over the retained window.
    pub fn rebuild(&mut self) -> PrequelResult<GenerationRecord> {
        let span = tracing::info_span!("rebuild", learner = %self.kind);
        let _guard = span.enter();

        let plan = training_service::plan_rebuild(self.store.state(), self.kind)?;
        self.store.commit(plan.tx)?;
        self.learner = plan.learner;

        tracing::info!(
            generation = plan.generation.id,
            before_instance_accuracy = plan.generation.before_instance_accuracy,
            after_instance_accuracy = plan.generation.after_instance_accuracy,
            "rebuild completed"
        );
        Ok(plan.generation)
    }

    pub fn predict(&self, features: &FeatureMap) -> Prediction {
        inference_service::predict(&self.schema, self.learner.as_ref(), features)
    }

    pub fn predict_batch(&self, inputs: &[FeatureMap]) -> Vec<Prediction> {
        inference_service::predict_batch(&self.schema, self.learner.as_ref(), inputs)
    }

    pub fn predict_json(&self, input: &str) -> Prediction {
        inference_service::predict_json(&self.schema, self.learner.as_ref(), input)
    }

    pub fn report_json(&self, options: &str) -> PrequelResult<String> {
        report_service::report_json(self.store.state(), options)
    }

    /// Parsed-options variant of [`Engine::report_json`].
    pub fn report(&self, options: &ReportOptions) -> PrequelResult<String> {
        Ok(serde_json::to_string(&report_service::build(self.store.state(), options))?)
    }

    pub fn report_plot(&self, json: &str, options: &str) -> PrequelResult<String> {
        report_service::report_plot(json, &PlotOptions::parse(options)?)
    }

    /// Read-only view for verification code.
    pub fn diagnostics(&self) -> Diagnostics<'_> {
        Diagnostics::new(self.store.state(), self.learner.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::data::domain::{FieldType, Value};

    fn schema() -> Schema {
        let mut fields = BTreeMap::new();
        fields.insert("f".to_string(), FieldType::Integer);
        fields.insert("y".to_string(), FieldType::TextId);
        Schema {
            revision: 0,
            fields,
            x: vec!["f".into()],
            y: Some("y".into()),
        }
    }

    fn batch(labels: &[&str]) -> Vec<Instance> {
        labels
            .iter()
            .map(|l| {
                let mut f = FeatureMap::new();
                f.insert("f".into(), Value::Int(1));
                Instance::new(f, *l)
            })
            .collect()
    }

    fn engine() -> Engine {
        Engine::in_memory(schema(), LearnerKind::Majority, RetentionPolicy::disabled()).unwrap()
    }

    #[test]
    fn empty_chunk_is_rejected() {
        let mut e = engine();
        assert!(matches!(e.insert_chunk(Vec::new()), Err(PrequelError::Schema(_))));
        assert_eq!(e.diagnostics().last_chunk_id(), None);
    }

    #[test]
    fn failed_update_keeps_learner() {
        let mut e = engine();
        assert!(matches!(e.update(), Err(PrequelError::State(_))));
        assert!(e.predict(&batch(&["a"])[0].features).is_error());
    }

    #[test]
    fn update_then_predict() {
        let mut e = engine();
        e.insert_chunk(batch(&["a", "a", "b"])).unwrap();
        let summary = e.update().unwrap();
        assert_eq!(summary.instance_count, 3);
        assert_eq!(e.global().updated_instance_count, 3);
        let p = e.predict(&batch(&["?"])[0].features);
        assert_eq!(p.label.map(|l| l.0), Some("a".to_string()));
        e.diagnostics().verify().unwrap();
    }

    #[test]
    fn placeholder_like_label_keeps_counters_consistent() {
        let mut e = engine();
        e.insert_chunk(batch(&["(none)", "a"])).unwrap();
        e.update().unwrap();
        e.insert_chunk(batch(&["(none)", "(none)"])).unwrap();
        e.update().unwrap();

        let stats = e.global();
        assert_eq!(stats.instance_correct_count, 2);
        assert_eq!(stats.confusion.correct(), 2);
        e.diagnostics().verify().unwrap();
    }

    #[test]
    fn label_must_match_declared_type() {
        let mut s = schema();
        s.fields.insert("y".into(), FieldType::Integer);
        let mut e = Engine::in_memory(s, LearnerKind::Majority, RetentionPolicy::disabled()).unwrap();
        assert!(matches!(e.insert_chunk(batch(&["not-an-int"])), Err(PrequelError::Schema(_))));
        assert_eq!(e.global().instance_count, 0);
        assert_eq!(e.insert_chunk(batch(&["7"])).unwrap(), ChunkId(1));
    }

    #[test]
    fn invalid_policy_is_refused() {
        let mut e = engine();
        let bad = RetentionPolicy {
            enabled: true,
            lower_bound: 5,
            upper_bound: 1,
        };
        assert!(matches!(e.set_retention_policy(bad), Err(PrequelError::Config(_))));
        assert_eq!(e.retention_policy(), RetentionPolicy::disabled());
    }
}
