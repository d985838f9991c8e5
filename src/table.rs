use csv::{ReaderBuilder, StringRecord, Trim, WriterBuilder};
use log::{info, warn};
use std::fs::File;
use std::io;
use std::path::Path;

use crate::descriptor::describe_layout;
use crate::*;

/// Feature table rows: `identifier,v0,v1,...` with no header. Values follow the
/// extractor's field order, each field row-major.
pub struct FeatureTable;

impl FeatureTable {
    /// Read a feature table whose rows must match `layout`.
    ///
    /// Rows with the wrong number of values or unparsable numbers are logged and skipped.
    /// Duplicate identifiers abort the load.
    pub fn read<P: AsRef<Path>>(path: P, layout: &[FieldSpec]) -> HbowResult<DatasetStore> {
        let file = File::open(path.as_ref())?;
        let store = Self::read_from(file, layout)?;
        info!(target: "hbow::table", "Loaded {} entries from {}", store.len(), path.as_ref().display());
        Ok(store)
    }

    pub fn read_from<R: io::Read>(reader: R, layout: &[FieldSpec]) -> HbowResult<DatasetStore> {
        let expected: usize = layout.iter().map(|s| s.shape.len()).sum();
        let mut store = DatasetStore::new();
        for_each_row(reader, |line, record| {
            let (identifier, values) = parse_row(line, &record)?;
            if values.len() != expected {
                return Err(HbowErr::MalformedRow {
                    line,
                    reason: format!(
                        "expected {} values for {}, found {}",
                        expected,
                        describe_layout(layout),
                        values.len()
                    ),
                });
            }
            let descriptor = Descriptor::from_flat(layout, &values)?;
            Ok(Some(DatasetEntry::new(identifier, descriptor)))
        }, &mut store)?;
        Ok(store)
    }

    /// Read an embedding table. Every entry gets a single `embedding` field of
    /// `dimension` values.
    ///
    /// With `dimension` unset it is inferred from the first well-formed row. A truncated
    /// first row then fixes the wrong dimension and the correct rows after it are skipped
    /// as malformed; pass the dimension when it is known.
    pub fn read_embeddings<P: AsRef<Path>>(path: P, dimension: Option<usize>) -> HbowResult<DatasetStore> {
        let file = File::open(path.as_ref())?;
        let store = Self::read_embeddings_from(file, dimension)?;
        info!(target: "hbow::table", "Loaded {} embeddings from {}", store.len(), path.as_ref().display());
        Ok(store)
    }

    pub fn read_embeddings_from<R: io::Read>(reader: R, dimension: Option<usize>) -> HbowResult<DatasetStore> {
        if dimension == Some(0) {
            return Err(HbowErr::InvalidParameter("embedding dimension must be positive".into()));
        }
        let embedding = |n: usize| vec![FieldSpec::new("embedding", FieldTag::Embedding, Shape::d1(n))];
        let mut layout: Option<Vec<FieldSpec>> = dimension.map(embedding);
        let mut store = DatasetStore::new();
        for_each_row(reader, |line, record| {
            let (identifier, values) = parse_row(line, &record)?;
            if values.is_empty() {
                return Err(HbowErr::MalformedRow {
                    line,
                    reason: "no embedding values".into(),
                });
            }
            let layout = layout.get_or_insert_with(|| {
                info!(target: "hbow::table", "inferred embedding dimension {} from line {}", values.len(), line);
                embedding(values.len())
            });
            let expected = layout[0].shape.len();
            if values.len() != expected {
                return Err(HbowErr::MalformedRow {
                    line,
                    reason: format!("expected {} embedding values, found {}", expected, values.len()),
                });
            }
            Ok(Some(DatasetEntry::new(identifier, Descriptor::from_flat(layout, &values)?)))
        }, &mut store)?;
        Ok(store)
    }

    /// Write every entry of `store` as one row.
    pub fn write<P: AsRef<Path>>(path: P, store: &DatasetStore) -> HbowResult<()> {
        let file = File::create(path.as_ref())?;
        Self::write_to(file, store)?;
        info!(target: "hbow::table", "Wrote {} entries to {}", store.len(), path.as_ref().display());
        Ok(())
    }

    pub fn write_to<W: io::Write>(writer: W, store: &DatasetStore) -> HbowResult<()> {
        let mut wtr = WriterBuilder::new().has_headers(false).flexible(true).from_writer(writer);
        for entry in store {
            let row = std::iter::once(entry.identifier.clone())
                .chain(entry.descriptor.flat_values().map(|v| v.to_string()));
            wtr.write_record(row)?;
        }
        wtr.flush()?;
        Ok(())
    }
}

/// Drive `parse` over every record. `MalformedRow`/`ShapeMismatch`/csv errors are logged and
/// the row skipped; anything else (duplicates) aborts.
fn for_each_row<R, F>(reader: R, mut parse: F, store: &mut DatasetStore) -> HbowResult<()>
where
    R: io::Read,
    F: FnMut(usize, StringRecord) -> HbowResult<Option<DatasetEntry>>,
{
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(reader);

    for (row, result) in rdr.records().enumerate() {
        let line = row + 1;
        let parsed = result
            .map_err(|e| HbowErr::MalformedRow {
                line,
                reason: format!("CSV error: {}", e),
            })
            .and_then(|record| parse(line, record));
        match parsed {
            Ok(Some(entry)) => store.insert(entry)?,
            Ok(None) => {}
            Err(e @ HbowErr::MalformedRow { .. }) | Err(e @ HbowErr::ShapeMismatch { .. }) => {
                warn!(target: "hbow::table", "skipping row: {}", e);
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Split a record into its canonical identifier and numeric values.
fn parse_row(line: usize, record: &StringRecord) -> HbowResult<(String, Vec<f64>)> {
    let raw_id = record.get(0).unwrap_or("");
    if raw_id.is_empty() {
        return Err(HbowErr::MalformedRow {
            line,
            reason: "missing identifier".into(),
        });
    }
    let identifier = canonical_identifier(raw_id);
    let values = record
        .iter()
        .skip(1)
        .enumerate()
        .map(|(i, v)| {
            v.parse::<f64>().map_err(|e| HbowErr::MalformedRow {
                line,
                reason: format!("value {} ({:?}): {}", i, v, e),
            })
        })
        .collect::<HbowResult<Vec<f64>>>()?;
    Ok((identifier, values))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn two_bin_layout() -> Vec<FieldSpec> {
        vec![FieldSpec::new("color", FieldTag::Color, Shape::d1(2))]
    }

    #[test]
    fn reads_rows_and_canonicalizes_identifiers() {
        let csv = "images/pic.0001.jpg,0.5,0.5\n/abs/dir/pic.0002.jpg,1,0\n";
        let store = FeatureTable::read_from(csv.as_bytes(), &two_bin_layout()).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.get("pic.0002.jpg").unwrap().fields()[0].values(), &[1., 0.]);
    }

    #[test]
    fn malformed_rows_are_skipped() {
        let csv = "a.jpg,0.5,0.5\nshort.jpg,1\nbad.jpg,0.5,x\nlong.jpg,0.2,0.3,0.5\n,0.5,0.5\nb.jpg,0,1\n";
        let store = FeatureTable::read_from(csv.as_bytes(), &two_bin_layout()).unwrap();
        let ids: Vec<&str> = store.iter().map(|e| e.identifier.as_str()).collect();
        assert_eq!(ids, vec!["a.jpg", "b.jpg"]);
    }

    #[test]
    fn duplicate_rows_abort() {
        let csv = "dir1/a.jpg,0.5,0.5\ndir2/a.jpg,1,0\n";
        assert!(matches!(
            FeatureTable::read_from(csv.as_bytes(), &two_bin_layout()),
            Err(HbowErr::DuplicateIdentifier(_))
        ));
    }

    #[test]
    fn multi_field_rows_split_in_order() {
        let layout = ExtractorKind::ColorTexture { bins: 1 }.layout();
        let store = FeatureTable::read_from("a.jpg,1,1\n".as_bytes(), &layout).unwrap();
        let d = store.require("a.jpg").unwrap();
        assert_eq!(d.fields()[0].tag(), FieldTag::Color);
        assert_eq!(d.fields()[1].tag(), FieldTag::Texture);
    }

    #[test]
    fn embeddings_infer_dimension() {
        let csv = "a.jpg,0.1,0.2,0.3\nb.jpg,0.4,0.5\nc.jpg,0.7,0.8,0.9\n";
        let store = FeatureTable::read_embeddings_from(csv.as_bytes(), None).unwrap();
        assert_eq!(store.len(), 2);
        assert!(!store.contains("b.jpg"));
        assert_eq!(store.require("c.jpg").unwrap().fields()[0].tag(), FieldTag::Embedding);
    }

    #[test]
    fn declared_dimension_survives_truncated_first_row() {
        let csv = "a.jpg,0.1,0.2\nb.jpg,0.4,0.5,0.6\nc.jpg,0.7,0.8,0.9\n";
        let inferred = FeatureTable::read_embeddings_from(csv.as_bytes(), None).unwrap();
        assert_eq!(inferred.len(), 1);
        assert!(inferred.contains("a.jpg"));

        let declared = FeatureTable::read_embeddings_from(csv.as_bytes(), Some(3)).unwrap();
        let ids: Vec<&str> = declared.iter().map(|e| e.identifier.as_str()).collect();
        assert_eq!(ids, vec!["b.jpg", "c.jpg"]);

        assert!(matches!(
            FeatureTable::read_embeddings_from(csv.as_bytes(), Some(0)),
            Err(HbowErr::InvalidParameter(_))
        ));
    }

    #[test]
    fn write_then_read_file() {
        let store = DatasetStore::from_entries(vec![
            DatasetEntry::new("a.jpg", Descriptor::from_flat(&two_bin_layout(), &[0.25, 0.75]).unwrap()),
            DatasetEntry::new("b.jpg", Descriptor::from_flat(&two_bin_layout(), &[1., 0.]).unwrap()),
        ])
        .unwrap();
        let file = NamedTempFile::new().unwrap();
        FeatureTable::write(file.path(), &store).unwrap();
        let text = std::fs::read_to_string(file.path()).unwrap();
        assert_eq!(text, "a.jpg,0.25,0.75\nb.jpg,1,0\n");
        assert_eq!(FeatureTable::read(file.path(), &two_bin_layout()).unwrap(), store);
    }

    #[test]
    fn read_from_file_with_blank_padding() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "a.jpg, 0.5 , 0.5").unwrap();
        file.flush().unwrap();
        let store = FeatureTable::read(file.path(), &two_bin_layout()).unwrap();
        assert_eq!(store.require("a.jpg").unwrap().fields()[0].values(), &[0.5, 0.5]);
    }
}
