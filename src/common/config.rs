//! Runtime configuration loaded from a key-value property file with
//! environment overrides.
//!
//! A property file is a list of `key=value` lines. Lines starting with
//! `#` are comments and are kept right above the key they describe when
//! the file is saved again. Environment variables named `PREQUEL_` plus
//! the upper-cased key (dots become underscores) win over file values.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use super::error::{PrequelError, PrequelResult};

/// Prefix of environment variables that override property file values.
pub const ENV_PREFIX: &str = "PREQUEL_";

#[derive(Clone, Debug, PartialEq)]
struct Entry {
    key: String,
    value: String,
    comment: Option<String>,
}

/// Ordered property set bound to a file on disk.
#[derive(Clone, Debug)]
pub struct Properties {
    path: PathBuf,
    entries: Vec<Entry>,
}

impl Properties {
    /// Empty property set that will be saved to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: Vec::new(),
        }
    }

    /// Read the property file at `path`.
    pub fn load(path: impl Into<PathBuf>) -> PrequelResult<Self> {
        let mut props = Self::new(path);
        props.reload()?;
        Ok(props)
    }

    /// Parse property text without binding it to a file.
    pub fn parse(text: &str) -> PrequelResult<Vec<(String, String)>> {
        let mut out = Vec::new();
        for (number, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = line.split_once('=').ok_or_else(|| {
                PrequelError::config(format!("line {}: expected key=value", number + 1))
            })?;
            let key = key.trim();
            if key.is_empty() {
                return Err(PrequelError::config(format!("line {}: empty key", number + 1)));
            }
            out.push((key.to_string(), value.trim().to_string()));
        }
        Ok(out)
    }

    /// Re-read the bound file, dropping unsaved changes.
    pub fn reload(&mut self) -> PrequelResult<()> {
        let text = fs::read_to_string(&self.path)?;
        let mut entries: Vec<Entry> = Vec::new();
        let mut pending_comment: Option<String> = None;
        for raw in text.lines() {
            let line = raw.trim();
            if let Some(comment) = line.strip_prefix('#') {
                pending_comment = Some(comment.trim().to_string());
                continue;
            }
            if line.is_empty() {
                continue;
            }
            for (key, value) in Self::parse(line)? {
                entries.retain(|e| e.key != key);
                entries.push(Entry {
                    key,
                    value,
                    comment: pending_comment.take(),
                });
            }
        }
        self.entries = entries;
        Ok(())
    }

    /// Write all entries back to the bound file.
    pub fn save(&self) -> PrequelResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut text = String::new();
        for entry in &self.entries {
            if let Some(comment) = &entry.comment {
                text.push_str("# ");
                text.push_str(comment);
                text.push('\n');
            }
            text.push_str(&entry.key);
            text.push('=');
            text.push_str(&entry.value);
            text.push_str("\n\n");
        }
        fs::write(&self.path, text)?;
        Ok(())
    }

    /// Path of the bound file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Set a value, keeping an existing comment.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.entries.iter_mut().find(|e| e.key == key) {
            Some(entry) => entry.value = value,
            None => self.entries.push(Entry {
                key: key.to_string(),
                value,
                comment: None,
            }),
        }
    }

    /// Set a value only if the key is absent, attaching a comment.
    pub fn set_default(&mut self, key: &str, value: &str, comment: &str) {
        if self.entries.iter().any(|e| e.key == key) {
            return;
        }
        self.entries.push(Entry {
            key: key.to_string(),
            value: value.to_string(),
            comment: Some(comment.to_string()),
        });
    }

    /// Raw value with environment override applied.
    pub fn get(&self, key: &str) -> Option<String> {
        if let Ok(value) = env::var(env_key(key)) {
            return Some(value);
        }
        self.entries
            .iter()
            .find(|e| e.key == key)
            .map(|e| e.value.clone())
    }

    pub fn get_str(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    pub fn get_bool(&self, key: &str, default: bool) -> PrequelResult<bool> {
        match self.get(key) {
            None => Ok(default),
            Some(v) => match v.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Ok(true),
                "false" | "0" | "no" | "off" => Ok(false),
                _ => Err(PrequelError::config(format!("{key}: `{v}` is not a boolean"))),
            },
        }
    }

    pub fn get_u64(&self, key: &str, default: u64) -> PrequelResult<u64> {
        match self.get(key) {
            None => Ok(default),
            Some(v) => v
                .parse()
                .map_err(|_| PrequelError::config(format!("{key}: `{v}` is not an unsigned integer"))),
        }
    }
}

/// Environment variable that overrides `key`.
pub fn env_key(key: &str) -> String {
    let mut out = String::from(ENV_PREFIX);
    for ch in key.chars() {
        match ch {
            '.' | '-' => out.push('_'),
            other => out.push(other.to_ascii_uppercase()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_skips_comments_and_blank_lines() {
        let parsed = Properties::parse("# note\n\nlimit.chunk.use = true\nver=1").unwrap();
        assert_eq!(
            parsed,
            vec![
                ("limit.chunk.use".to_string(), "true".to_string()),
                ("ver".to_string(), "1".to_string())
            ]
        );
    }

    #[test]
    fn parse_rejects_lines_without_separator() {
        assert!(Properties::parse("oops").is_err());
    }

    #[test]
    fn env_key_is_upper_snake() {
        assert_eq!(
            env_key("limit.chunk.instance_upper_bound"),
            "PREQUEL_LIMIT_CHUNK_INSTANCE_UPPER_BOUND"
        );
    }

    #[test]
    fn save_and_reload_keeps_comments_and_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("property.txt");
        let mut props = Properties::new(&path);
        props.set_default("test.config.alpha", "5", "alpha comment");
        props.set_default("test.config.alpha", "7", "ignored");
        props.set("test.config.beta", "false");
        props.save().unwrap();

        let loaded = Properties::load(&path).unwrap();
        assert_eq!(loaded.get_u64("test.config.alpha", 0).unwrap(), 5);
        assert!(!loaded.get_bool("test.config.beta", true).unwrap());
        assert_eq!(loaded.get_str("test.config.missing", "d"), "d");
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("# alpha comment\ntest.config.alpha=5"));
    }

    #[test]
    fn environment_wins_over_file_value() {
        // key used by no other test, so the variable cannot leak into them
        let key = "test.config.env_override";
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("property.txt");
        std::fs::write(&path, format!("{key}=10\n")).unwrap();
        let props = Properties::load(&path).unwrap();
        assert_eq!(props.get_u64(key, 0).unwrap(), 10);

        env::set_var(env_key(key), "42");
        assert_eq!(props.get(key).as_deref(), Some("42"));
        assert_eq!(props.get_u64(key, 0).unwrap(), 42);
        assert_eq!(props.get_str(key, "d"), "42");

        env::set_var(env_key(key), "not-a-number");
        assert!(props.get_u64(key, 0).is_err());

        env::remove_var(env_key(key));
        assert_eq!(props.get_u64(key, 0).unwrap(), 10);
    }

    #[test]
    fn typed_getters_reject_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let mut props = Properties::new(dir.path().join("p.txt"));
        props.set("test.config.flag", "maybe");
        props.set("test.config.count", "-3");
        assert!(props.get_bool("test.config.flag", false).is_err());
        assert!(props.get_u64("test.config.count", 0).is_err());
    }
}
