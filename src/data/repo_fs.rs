//! Filesystem-backed repository for the attribute schema (`attributes.json`).

use std::fs;
use std::path::{Path, PathBuf};

use crate::common::error::PrequelResult;

use super::domain::Schema;

/// Attribute schema file bound to a project's `conf` directory.
pub struct FsSchemaRepo {
    path: PathBuf,
}

impl FsSchemaRepo {
    pub fn new(conf_dir: &Path) -> Self {
        Self {
            path: conf_dir.join("attributes.json"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Write an empty template so the operator can fill in fields, x and y.
    pub fn create_template_if_missing(&self) -> PrequelResult<()> {
        if self.exists() {
            return Ok(());
        }
        self.put(&Schema::default())
    }

    pub fn put(&self, schema: &Schema) -> PrequelResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(schema)?;
        fs::write(&self.path, text)?;
        Ok(())
    }

    /// Read and validate the schema.
    pub fn get(&self) -> PrequelResult<Schema> {
        let text = fs::read_to_string(&self.path)?;
        let schema: Schema = serde_json::from_str(&text)?;
        schema.validate()?;
        Ok(schema)
    }
}
