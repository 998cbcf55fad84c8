//! Service layer turning tabular rows into schema-checked instances.
//!
//! Only the glue lives here: delimited files are read with the `csv`
//! crate and each cell is parsed by its declared field type.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::common::error::{PrequelError, PrequelResult};

use super::domain::{FeatureMap, Instance, Label, Schema};

/// One raw row keyed by header name.
pub type RawRow = BTreeMap<String, String>;

/// Build an instance from a raw row. Columns outside the schema are ignored.
pub fn instance_from_row(schema: &Schema, row: &RawRow) -> PrequelResult<Instance> {
    let y = schema.label_field()?;
    let mut features = FeatureMap::new();
    for name in &schema.x {
        let raw = row
            .get(name)
            .ok_or_else(|| PrequelError::schema(format!("missing field: {name}")))?;
        features.insert(name.clone(), schema.parse_cell(name, raw)?);
    }
    let raw_label = row
        .get(y)
        .ok_or_else(|| PrequelError::schema(format!("missing label field: {y}")))?;
    let label = Label::from(&schema.parse_cell(y, raw_label)?);
    Ok(Instance { features, label })
}

/// Parse unlabeled feature cells for prediction.
pub fn features_from_row(schema: &Schema, row: &RawRow) -> PrequelResult<FeatureMap> {
    let mut features = FeatureMap::new();
    for name in &schema.x {
        let raw = row
            .get(name)
            .ok_or_else(|| PrequelError::schema(format!("missing field: {name}")))?;
        features.insert(name.clone(), schema.parse_cell(name, raw)?);
    }
    Ok(features)
}

pub fn rows_to_instances(schema: &Schema, rows: &[RawRow]) -> PrequelResult<Vec<Instance>> {
    rows.iter().map(|row| instance_from_row(schema, row)).collect()
}

/// Read a headered, comma separated file into instances.
pub fn read_csv(schema: &Schema, path: &Path) -> PrequelResult<Vec<Instance>> {
    let file = File::open(path)?;
    let mut reader = csv::Reader::from_reader(BufReader::new(file));
    let headers = reader.headers()?.clone();

    // resolve column positions once instead of building a map per row
    let mut wanted: Vec<(usize, &str)> = Vec::new();
    let y = schema.label_field()?;
    for name in schema.x.iter().map(String::as_str).chain(std::iter::once(y)) {
        let index = headers
            .iter()
            .position(|h| h.trim() == name)
            .ok_or_else(|| PrequelError::schema(format!("column not found: {name}")))?;
        wanted.push((index, name));
    }

    let mut out = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record?;
        let mut row = RawRow::new();
        for &(index, name) in &wanted {
            let cell = record.get(index).ok_or_else(|| {
                PrequelError::schema(format!("row {}: missing column `{name}`", line + 1))
            })?;
            row.insert(name.to_string(), cell.to_string());
        }
        out.push(instance_from_row(schema, &row)?);
    }
    tracing::debug!(path = %path.display(), rows = out.len(), "csv read");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::domain::{FieldType, Value};
    use std::io::Write;

    fn schema() -> Schema {
        let mut fields = BTreeMap::new();
        fields.insert("x1".to_string(), FieldType::Real);
        fields.insert("color".to_string(), FieldType::Text);
        fields.insert("class".to_string(), FieldType::Integer);
        Schema {
            revision: 0,
            fields,
            x: vec!["x1".into(), "color".into()],
            y: Some("class".into()),
        }
    }

    fn row(pairs: &[(&str, &str)]) -> RawRow {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn row_becomes_typed_instance() {
        let inst = instance_from_row(
            &schema(),
            &row(&[("x1", "0.25"), ("color", "red"), ("class", "1"), ("unused", "z")]),
        )
        .unwrap();
        assert_eq!(inst.features["x1"], Value::Real(0.25));
        assert_eq!(inst.features["color"], Value::Text("red".into()));
        assert_eq!(inst.label.as_str(), "1");
        assert_eq!(inst.features.len(), 2);
    }

    #[test]
    fn row_missing_label_is_schema_error() {
        let err = instance_from_row(&schema(), &row(&[("x1", "1"), ("color", "red")])).unwrap_err();
        assert!(matches!(err, PrequelError::Schema(_)));
    }

    #[test]
    fn csv_file_is_mapped_by_header() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "class,color,x1").unwrap();
        writeln!(file, "0,blue,0.5").unwrap();
        writeln!(file, "1,red,1.5").unwrap();
        file.flush().unwrap();

        let instances = read_csv(&schema(), file.path()).unwrap();
        assert_eq!(instances.len(), 2);
        assert_eq!(instances[1].features["x1"], Value::Real(1.5));
        assert_eq!(instances[1].label.as_str(), "1");
    }

    #[test]
    fn csv_without_declared_column_fails() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "class,x1").unwrap();
        writeln!(file, "0,0.5").unwrap();
        file.flush().unwrap();
        let err = read_csv(&schema(), file.path()).unwrap_err();
        assert!(err.to_string().contains("color"));
    }
}
