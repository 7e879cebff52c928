//! CSV export of documents
//!
//! Columns are the public paths of the schema (`_id`, every non-private
//! field in declaration order, then the timestamps). Nested values are
//! written as compact JSON; a populated reference is written as its id.

use crate::collection::Collection;
use crate::filter::QueryFilter;
use crate::options::SortKey;
use crate::path::document_id;
use crate::plan::FindQuery;
use crate::schema::{EntitySchema, ID_FIELD};
use crate::Result;
use serde_json::Value as JsonValue;
use std::io::Write;

/// Documents fetched per round trip by `export_collection`.
pub const EXPORT_BATCH_SIZE: u64 = 1000;

pub fn headers(schema: &EntitySchema) -> Vec<&'static str> {
    schema.public_paths()
}

/// Write `docs` as CSV, header row first.
pub fn write_documents<W: Write>(
    schema: &EntitySchema,
    docs: &[JsonValue],
    writer: W,
) -> Result<()> {
    let mut out = CsvSink::new(schema, writer)?;
    for doc in docs {
        out.write(doc)?;
    }
    out.finish()
}

/// Write every document of `collection` matching `filter`, fetched in
/// batches of `EXPORT_BATCH_SIZE` ordered by id. Returns the number of rows
/// written.
pub async fn export_collection<C, W>(collection: &C, filter: QueryFilter, writer: W) -> Result<u64>
where
    C: Collection + ?Sized,
    W: Write,
{
    let schema = collection.schema();
    let mut out = CsvSink::new(schema, writer)?;
    let mut query = FindQuery::all(filter);
    query.sort = vec![SortKey::asc(ID_FIELD)];
    query.limit = Some(EXPORT_BATCH_SIZE);

    let mut written = 0u64;
    loop {
        let batch = collection.find(&query).await?;
        let fetched = batch.len() as u64;
        for doc in &batch {
            out.write(doc)?;
        }
        written += fetched;
        tracing::trace!(
            collection = schema.collection,
            batch = fetched,
            written,
            "Exported CSV batch"
        );
        if fetched < EXPORT_BATCH_SIZE {
            break;
        }
        query.skip += EXPORT_BATCH_SIZE;
    }
    out.finish()?;
    Ok(written)
}

struct CsvSink<W: Write> {
    columns: Vec<&'static str>,
    writer: csv::Writer<W>,
}

impl<W: Write> CsvSink<W> {
    fn new(schema: &EntitySchema, writer: W) -> Result<Self> {
        let columns = headers(schema);
        let mut writer = csv::Writer::from_writer(writer);
        writer.write_record(&columns)?;
        Ok(Self { columns, writer })
    }

    fn write(&mut self, doc: &JsonValue) -> Result<()> {
        let record: Vec<String> = self
            .columns
            .iter()
            .map(|column| cell(doc.get(*column)))
            .collect();
        self.writer.write_record(&record)?;
        Ok(())
    }

    fn finish(mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

fn cell(value: Option<&JsonValue>) -> String {
    match value {
        None | Some(JsonValue::Null) => String::new(),
        Some(JsonValue::String(s)) => s.clone(),
        Some(JsonValue::Number(n)) => n.to_string(),
        Some(JsonValue::Bool(b)) => b.to_string(),
        Some(object @ JsonValue::Object(_)) => {
            document_id(object).unwrap_or_else(|| object.to_string())
        }
        Some(array) => array.to_string(),
    }
}
