//! Filesystem store rooted at `<base_dir>/db`.
//!
//! ```text
//! db/head.json              global record, learner, generations, chunk metadata
//! db/chunks/<id>.<rev>.json instances of one chunk, written by commit <rev>
//! ```
//!
//! Instance files are written once, when a chunk first appears, and never
//! rewritten in place. A commit writes the instance files of new chunks,
//! then replaces `head.json` through a temp file and a rename. The rename
//! is the commit point: a crash before it leaves the old head, whose files
//! are all still there. Files no head refers to are removed after the
//! rename and swept again on open.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::common::error::{PrequelError, PrequelResult};
use crate::data::domain::{ChunkId, Instance};
use crate::evaluation::domain::{GenerationRecord, Tally};
use crate::training::domain::LearnerSnapshot;

use super::domain::{ChunkRecord, GlobalRecord, ProjectState, Store, Transaction};

const HEAD_FILE: &str = "head.json";
const CHUNK_DIR: &str = "chunks";

/// Chunk record without its instances.
#[derive(Serialize, Deserialize)]
struct ChunkHead {
    id: ChunkId,
    datetime_ms: u64,
    processed: bool,
    initial_correct_count: u64,
    initial_accuracy: f64,
    contribution: Tally,
    /// Commit that wrote the instance file.
    data_revision: u64,
}

#[derive(Serialize, Deserialize)]
struct Head {
    global: GlobalRecord,
    learner: Option<LearnerSnapshot>,
    generations: Vec<GenerationRecord>,
    chunks: Vec<ChunkHead>,
}

#[derive(Debug)]
pub struct FsStore {
    root: PathBuf,
    state: ProjectState,
    /// Chunk id -> revision suffix of its instance file.
    data_revisions: BTreeMap<ChunkId, u64>,
}

fn read_json<T: DeserializeOwned>(path: &Path) -> PrequelResult<T> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

/// Write `value` next to `path`, sync it, then rename it over `path`.
fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> PrequelResult<()> {
    let mut name = path
        .file_name()
        .ok_or_else(|| PrequelError::store(format!("not a file path: {}", path.display())))?
        .to_os_string();
    name.push(".tmp");
    let tmp = path.with_file_name(name);
    {
        let mut writer = BufWriter::new(File::create(&tmp)?);
        serde_json::to_writer(&mut writer, value)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

/// `<id>.<rev>.json` -> `(id, rev)`.
fn parse_chunk_file(name: &str) -> Option<(ChunkId, u64)> {
    let (id, rev) = name.strip_suffix(".json")?.split_once('.')?;
    Some((ChunkId(id.parse().ok()?), rev.parse().ok()?))
}

impl FsStore {
    /// Open the store in `root`, starting empty when no head exists.
    pub fn open(root: impl Into<PathBuf>) -> PrequelResult<Self> {
        let root = root.into();
        fs::create_dir_all(root.join(CHUNK_DIR))?;

        let mut state = ProjectState::default();
        let mut data_revisions = BTreeMap::new();
        let head_path = root.join(HEAD_FILE);
        if head_path.exists() {
            let head: Head = read_json(&head_path)?;
            for chunk in head.chunks {
                let instances: Vec<Instance> =
                    read_json(&chunk_path(&root, chunk.id, chunk.data_revision))?;
                data_revisions.insert(chunk.id, chunk.data_revision);
                state.chunks.insert(
                    chunk.id,
                    ChunkRecord {
                        id: chunk.id,
                        datetime_ms: chunk.datetime_ms,
                        instances,
                        processed: chunk.processed,
                        initial_correct_count: chunk.initial_correct_count,
                        initial_accuracy: chunk.initial_accuracy,
                        contribution: chunk.contribution,
                    },
                );
            }
            state.global = head.global;
            state.learner = head.learner;
            state.generations = head.generations;
        }

        let store = Self {
            root,
            state,
            data_revisions,
        };
        store.sweep();
        tracing::debug!(
            root = %store.root.display(),
            revision = store.state.global.revision,
            chunks = store.state.chunks.len(),
            "fs store opened"
        );
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Remove chunk files and temp files the head does not refer to.
    fn sweep(&self) {
        let Ok(entries) = fs::read_dir(self.root.join(CHUNK_DIR)) else {
            return;
        };
        for entry in entries.flatten() {
            let name = entry.file_name();
            let live = name
                .to_str()
                .and_then(parse_chunk_file)
                .is_some_and(|(id, rev)| self.data_revisions.get(&id) == Some(&rev));
            if !live {
                remove_quietly(&entry.path());
            }
        }
    }

    fn head(&self, revisions: &BTreeMap<ChunkId, u64>) -> PrequelResult<Head> {
        let mut chunks = Vec::with_capacity(self.state.chunks.len());
        for chunk in self.state.chunks.values() {
            let data_revision = *revisions
                .get(&chunk.id)
                .ok_or_else(|| PrequelError::store(format!("chunk {} has no instance file", chunk.id)))?;
            chunks.push(ChunkHead {
                id: chunk.id,
                datetime_ms: chunk.datetime_ms,
                processed: chunk.processed,
                initial_correct_count: chunk.initial_correct_count,
                initial_accuracy: chunk.initial_accuracy,
                contribution: chunk.contribution.clone(),
                data_revision,
            });
        }
        Ok(Head {
            global: self.state.global.clone(),
            learner: self.state.learner.clone(),
            generations: self.state.generations.clone(),
            chunks,
        })
    }

    /// Write instance files for `dirty`, then the head. Returns the new file map.
    fn persist(&self, dirty: &[ChunkId], revision: u64) -> PrequelResult<BTreeMap<ChunkId, u64>> {
        let mut revisions = self.data_revisions.clone();
        revisions.retain(|id, _| self.state.chunks.contains_key(id));
        for id in dirty {
            // put then deleted within the same transaction
            let Some(chunk) = self.state.chunks.get(id) else {
                continue;
            };
            write_json_atomic(&chunk_path(&self.root, *id, revision), &chunk.instances)?;
            revisions.insert(*id, revision);
        }
        write_json_atomic(&self.root.join(HEAD_FILE), &self.head(&revisions)?)?;
        Ok(revisions)
    }
}

fn chunk_path(root: &Path, id: ChunkId, revision: u64) -> PathBuf {
    root.join(CHUNK_DIR).join(format!("{}.{revision}.json", id.raw()))
}

fn remove_quietly(path: &Path) {
    if let Err(err) = fs::remove_file(path) {
        tracing::warn!(path = %path.display(), error = %err, "stale store file not removed");
    }
}

impl Store for FsStore {
    fn state(&self) -> &ProjectState {
        &self.state
    }

    fn commit(&mut self, tx: Transaction) -> PrequelResult<()> {
        // only chunks that are new or whose instances changed get a file
        let dirty: Vec<ChunkId> = tx
            .put_chunks
            .iter()
            .filter(|c| {
                self.state
                    .chunks
                    .get(&c.id)
                    .map_or(true, |old| old.instances != c.instances)
            })
            .map(|c| c.id)
            .collect();

        let undo = self.state.apply(tx)?;
        let revision = self.state.global.revision;
        match self.persist(&dirty, revision) {
            Ok(revisions) => {
                let old = std::mem::replace(&mut self.data_revisions, revisions);
                for (id, rev) in old {
                    if self.data_revisions.get(&id) != Some(&rev) {
                        remove_quietly(&chunk_path(&self.root, id, rev));
                    }
                }
                tracing::debug!(revision, written = dirty.len(), "fs store committed");
                Ok(())
            }
            Err(err) => {
                self.state.revert(undo);
                for id in &dirty {
                    let path = chunk_path(&self.root, *id, revision);
                    if path.exists() {
                        remove_quietly(&path);
                    }
                }
                Err(err)
            }
        }
    }
}
