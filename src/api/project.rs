//! Thread-safe project facade.
//!
//! Mutating calls return `bool`; the reason of the last failure is kept
//! for [`Project::errmsg`]. Writers hold the engine exclusively, readers
//! share it, so a reader always sees a learner and statistics from the
//! same commit.

use std::path::{Path, PathBuf};
use std::time::Instant;

use parking_lot::{Mutex, RwLock};

use crate::common::config::Properties;
use crate::common::error::{ErrorCode, PrequelError, PrequelResult};
use crate::common::log::log_outcome;
use crate::data::domain::{ChunkId, FeatureMap, FieldType, Instance, Schema};
use crate::data::repo_fs::FsSchemaRepo;
use crate::engine::{Engine, UpdateSummary};
use crate::evaluation::domain::{GenerationRecord, GlobalStats};
use crate::evaluation::retention::{self, RetentionPolicy};
use crate::evaluation::service::Diagnostics;
use crate::inference::domain::Prediction;
use crate::report::domain::PlotOptions;
use crate::report::service as report_service;
use crate::store::repo_fs::FsStore;
use crate::training::domain::LearnerKind;

pub const PROPERTY_FILE: &str = "property.txt";
pub const KEY_VER: &str = "ver";
pub const KEY_LEARNER: &str = "learner.kind";
const MODULE: &str = "api";

fn conf_dir(base_dir: &Path) -> PathBuf {
    base_dir.join("conf")
}

fn property_path(base_dir: &Path) -> PathBuf {
    conf_dir(base_dir).join(PROPERTY_FILE)
}

fn learner_kind(props: &Properties) -> PrequelResult<LearnerKind> {
    props.get_str(KEY_LEARNER, LearnerKind::default().as_str()).parse()
}

pub struct Project {
    base_dir: PathBuf,
    engine: RwLock<Engine>,
    properties: Mutex<Properties>,
    last_error: Mutex<Option<(ErrorCode, String)>>,
}

impl Project {
    /// Lay out an empty project: default properties and a schema template.
    pub fn create(base_dir: impl AsRef<Path>) -> PrequelResult<()> {
        let base_dir = base_dir.as_ref();
        let started = Instant::now();
        let result = (|| -> PrequelResult<()> {
            let conf = conf_dir(base_dir);
            std::fs::create_dir_all(&conf)?;
            let path = property_path(base_dir);
            let mut props = if path.exists() {
                Properties::load(&path)?
            } else {
                Properties::new(&path)
            };
            props.set_default(KEY_VER, env!("CARGO_PKG_VERSION"), "project layout version");
            props.set_default(KEY_LEARNER, LearnerKind::default().as_str(), "naive_bayes | majority");
            props.set_default(retention::KEY_USE, "false", "evict oldest chunks past the upper bound");
            props.set_default(
                retention::KEY_UPPER,
                &retention::DEFAULT_UPPER.to_string(),
                "eviction starts above this many instances",
            );
            props.set_default(
                retention::KEY_LOWER,
                &retention::DEFAULT_LOWER.to_string(),
                "eviction stops at or below this many instances",
            );
            props.save()?;
            FsSchemaRepo::new(&conf).create_template_if_missing()
        })();
        tracing::info!(base_dir = %base_dir.display(), ok = result.is_ok(), "project create");
        log_outcome(MODULE, "create", started, &result);
        result
    }

    /// Declare or retype a field in `attributes.json`.
    pub fn add_field(base_dir: impl AsRef<Path>, name: &str, field_type: FieldType) -> PrequelResult<()> {
        edit_schema(base_dir.as_ref(), |schema| {
            schema.fields.insert(name.to_string(), field_type);
        })
    }

    /// Append feature names to `x`.
    pub fn add_x(base_dir: impl AsRef<Path>, names: &[&str]) -> PrequelResult<()> {
        edit_schema(base_dir.as_ref(), |schema| {
            schema.x.extend(names.iter().map(|n| n.to_string()));
        })
    }

    /// Set the label field.
    pub fn set_y(base_dir: impl AsRef<Path>, name: &str) -> PrequelResult<()> {
        edit_schema(base_dir.as_ref(), |schema| schema.y = Some(name.to_string()))
    }

    /// Open a created project. The schema must be complete.
    pub fn open(base_dir: impl AsRef<Path>) -> PrequelResult<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        let started = Instant::now();
        let result = (|| -> PrequelResult<Self> {
            let props = Properties::load(property_path(&base_dir))?;
            let schema = FsSchemaRepo::new(&conf_dir(&base_dir)).get()?;
            let policy = RetentionPolicy::from_properties(&props)?;
            let kind = learner_kind(&props)?;
            let store = FsStore::open(base_dir.join("db"))?;
            let engine = Engine::new(schema, Box::new(store), kind, policy)?;
            Ok(Self {
                base_dir: base_dir.clone(),
                engine: RwLock::new(engine),
                properties: Mutex::new(props),
                last_error: Mutex::new(None),
            })
        })();
        tracing::info!(base_dir = %base_dir.display(), ok = result.is_ok(), "project open");
        log_outcome(MODULE, "open", started, &result);
        result
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn track<T>(&self, event: &str, f: impl FnOnce() -> PrequelResult<T>) -> PrequelResult<T> {
        let started = Instant::now();
        let result = f();
        log_outcome(MODULE, event, started, &result);
        *self.last_error.lock() = result.as_ref().err().map(|e| (e.code(), e.to_string()));
        result
    }

    /// Record `err` as the outcome of `event` without running anything.
    pub(crate) fn reject(&self, event: &str, err: PrequelError) {
        let _ = self.track(event, || Err::<(), _>(err));
    }

    /// Text of the previous call's failure, empty after a success.
    pub fn errmsg(&self) -> String {
        self.last_error
            .lock()
            .as_ref()
            .map(|(_, msg)| msg.clone())
            .unwrap_or_default()
    }

    pub fn last_error_code(&self) -> ErrorCode {
        self.last_error
            .lock()
            .as_ref()
            .map_or(ErrorCode::Ok, |(code, _)| *code)
    }

    pub fn insert_chunk(&self, instances: Vec<Instance>) -> bool {
        self.insert_chunk_id(instances).is_some()
    }

    /// Like [`Project::insert_chunk`], returning the new id.
    pub fn insert_chunk_id(&self, instances: Vec<Instance>) -> Option<ChunkId> {
        self.track("insert_chunk", || self.engine.write().insert_chunk(instances))
            .ok()
    }

    pub fn insert_chunk_csv(&self, path: impl AsRef<Path>) -> bool {
        self.track("insert_chunk_csv", || {
            self.engine.write().insert_chunk_csv(path.as_ref())
        })
        .is_ok()
    }

    pub fn update(&self) -> bool {
        self.update_summary().is_some()
    }

    pub fn update_summary(&self) -> Option<UpdateSummary> {
        self.track("update", || self.engine.write().update()).ok()
    }

    pub fn rebuild(&self) -> bool {
        self.rebuild_generation().is_some()
    }

    pub fn rebuild_generation(&self) -> Option<GenerationRecord> {
        self.track("rebuild", || self.engine.write().rebuild()).ok()
    }

    pub fn predict(&self, features: &FeatureMap) -> Prediction {
        self.engine.read().predict(features)
    }

    pub fn predict_batch(&self, inputs: &[FeatureMap]) -> Vec<Prediction> {
        self.engine.read().predict_batch(inputs)
    }

    pub fn predict_json(&self, input: &str) -> Prediction {
        self.engine.read().predict_json(input)
    }

    pub fn report_json(&self, options: &str) -> PrequelResult<String> {
        self.track("report_json", || self.engine.read().report_json(options))
    }

    /// Render a plot script; also written to `plt_filepath` when set.
    pub fn report_plot(&self, json: &str, options: &str) -> PrequelResult<String> {
        self.track("report_plot", || {
            let options = PlotOptions::parse(options)?;
            let script = report_service::report_plot(json, &options)?;
            if let Some(path) = &options.plt_filepath {
                std::fs::write(path, &script)?;
            }
            Ok(script)
        })
    }

    pub fn global(&self) -> GlobalStats {
        self.engine.read().global().clone()
    }

    /// Run `f` over a consistent read-only view.
    pub fn with_diagnostics<R>(&self, f: impl FnOnce(Diagnostics<'_>) -> R) -> R {
        let engine = self.engine.read();
        f(engine.diagnostics())
    }

    /// Set a property in memory. `limit.chunk.*` and `learner.kind` take effect at once.
    pub fn set_property(&self, key: &str, value: &str) -> bool {
        self.track("set_property", || {
            let mut props = self.properties.lock();
            let mut candidate = props.clone();
            candidate.set(key, value);
            self.apply_properties(&candidate)?;
            *props = candidate;
            Ok(())
        })
        .is_ok()
    }

    pub fn get_property(&self, key: &str) -> Option<String> {
        self.properties.lock().get(key)
    }

    pub fn save_property(&self) -> bool {
        self.track("save_property", || self.properties.lock().save())
            .is_ok()
    }

    /// Drop unsaved changes and re-read `property.txt`.
    pub fn reload_property(&self) -> bool {
        self.track("reload_property", || {
            let mut props = self.properties.lock();
            let mut candidate = props.clone();
            candidate.reload()?;
            self.apply_properties(&candidate)?;
            *props = candidate;
            Ok(())
        })
        .is_ok()
    }

    fn apply_properties(&self, props: &Properties) -> PrequelResult<()> {
        let policy = RetentionPolicy::from_properties(props)?;
        let kind = learner_kind(props)?;
        let mut engine = self.engine.write();
        engine.set_retention_policy(policy)?;
        engine.set_learner_kind(kind);
        Ok(())
    }
}

fn edit_schema(base_dir: &Path, edit: impl FnOnce(&mut Schema)) -> PrequelResult<()> {
    let repo = FsSchemaRepo::new(&conf_dir(base_dir));
    let text = std::fs::read_to_string(repo.path())?;
    let mut schema: Schema = serde_json::from_str(&text)?;
    edit(&mut schema);
    repo.put(&schema)
}
