//! LanceDB-backed `VectorStoreBackend`.
//!
//! Adapted from the teacher's `storage/lance_store.rs`: same connect /
//! ensure-table-with-seed-record / arrow `RecordBatch` round trip, trimmed
//! down to the (id, vector) shape this trait needs — chunk text and metadata
//! live in the `repository` component's own backend, not here.

use std::sync::Arc;

use arrow_array::{Array, FixedSizeListArray, RecordBatch, RecordBatchIterator, StringArray};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{connect, Connection, Table};
use uuid::Uuid;

use crate::adapters::VectorStoreBackend;

const TABLE_NAME: &str = "ragcore_vectors";

pub struct LanceVectorBackend {
    connection: Connection,
    dimension: usize,
}

impl LanceVectorBackend {
    pub async fn open(uri: &str, dimension: usize) -> anyhow::Result<Self> {
        let connection = connect(uri).execute().await?;
        let backend = Self { connection, dimension };
        backend.ensure_table().await?;
        Ok(backend)
    }

    fn schema(&self) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    self.dimension as i32,
                ),
                false,
            ),
        ]))
    }

    /// LanceDB infers schema from the first write, so an empty table needs a
    /// throwaway seed record that is immediately deleted — same trick as the
    /// teacher's `ensure_table`.
    async fn ensure_table(&self) -> anyhow::Result<Table> {
        let names = self.connection.table_names().execute().await?;
        if names.iter().any(|n| n == TABLE_NAME) {
            return Ok(self.connection.open_table(TABLE_NAME).execute().await?);
        }

        let seed_id = Uuid::new_v4();
        let batch = self.build_batch(vec![(seed_id, vec![0.0; self.dimension])])?;
        let schema = self.schema();
        let reader = RecordBatchIterator::new(vec![Ok(batch)], schema);
        let table = self.connection.create_table(TABLE_NAME, Box::new(reader)).execute().await?;
        table.delete(&format!("id = '{seed_id}'")).await?;
        Ok(table)
    }

    async fn table(&self) -> anyhow::Result<Table> {
        Ok(self.connection.open_table(TABLE_NAME).execute().await?)
    }

    fn build_batch(&self, records: Vec<(Uuid, Vec<f32>)>) -> anyhow::Result<RecordBatch> {
        let ids: Vec<String> = records.iter().map(|(id, _)| id.to_string()).collect();
        let flat: Vec<Option<f32>> =
            records.iter().flat_map(|(_, v)| v.iter().map(|x| Some(*x))).collect();
        let vector_array = FixedSizeListArray::new(
            Arc::new(Field::new("item", DataType::Float32, true)),
            self.dimension as i32,
            Arc::new(arrow_array::Float32Array::from(flat)),
            None,
        );
        Ok(RecordBatch::try_new(
            self.schema(),
            vec![Arc::new(StringArray::from(ids)), Arc::new(vector_array)],
        )?)
    }
}

#[async_trait]
impl VectorStoreBackend for LanceVectorBackend {
    async fn put_batch(&self, records: Vec<(Uuid, Vec<f32>)>) -> anyhow::Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let table = self.table().await?;
        // overwrite semantics: drop any existing rows for these ids before
        // re-adding, since lancedb has no native upsert-by-key primitive here.
        let predicate = records
            .iter()
            .map(|(id, _)| format!("id = '{id}'"))
            .collect::<Vec<_>>()
            .join(" OR ");
        table.delete(&predicate).await.ok();

        let batch = self.build_batch(records)?;
        let schema = self.schema();
        let reader = RecordBatchIterator::new(vec![Ok(batch)], schema);
        table.add(Box::new(reader)).execute().await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> anyhow::Result<Option<Vec<f32>>> {
        let table = self.table().await?;
        let mut stream = table
            .query()
            .only_if(format!("id = '{id}'"))
            .limit(1)
            .execute()
            .await?;
        let batches: Vec<RecordBatch> = stream.try_collect().await?;
        Ok(extract_single_vector(&batches, self.dimension))
    }

    async fn delete(&self, id: Uuid) -> anyhow::Result<()> {
        let table = self.table().await?;
        table.delete(&format!("id = '{id}'")).await?;
        Ok(())
    }

    async fn delete_by_document(&self, _document_id: Uuid) -> anyhow::Result<u64> {
        // This backend only stores (id, vector) — document ownership is
        // tracked by the `repository` component. Callers that need
        // document-scoped deletion resolve chunk ids there first and call
        // `delete` per id; this is a no-op count here.
        Ok(0)
    }

    async fn scan_all(&self) -> anyhow::Result<Vec<(Uuid, Vec<f32>)>> {
        let table = self.table().await?;
        let mut stream = table.query().execute().await?;
        let batches: Vec<RecordBatch> = stream.try_collect().await?;
        Ok(extract_all_vectors(&batches, self.dimension))
    }

    async fn count(&self) -> anyhow::Result<u64> {
        let table = self.table().await?;
        Ok(table.count_rows(None).await? as u64)
    }
}

fn extract_all_vectors(batches: &[RecordBatch], dimension: usize) -> Vec<(Uuid, Vec<f32>)> {
    let mut out = Vec::new();
    for batch in batches {
        let Some(id_col) = batch.column_by_name("id").and_then(|c| c.as_any().downcast_ref::<StringArray>())
        else {
            continue;
        };
        let Some(vec_col) = batch
            .column_by_name("vector")
            .and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>())
        else {
            continue;
        };
        for row in 0..batch.num_rows() {
            let Ok(id) = Uuid::parse_str(id_col.value(row)) else { continue };
            let values = vec_col.value(row);
            let floats = values.as_any().downcast_ref::<arrow_array::Float32Array>();
            if let Some(floats) = floats {
                let vector: Vec<f32> = (0..dimension.min(floats.len())).map(|i| floats.value(i)).collect();
                out.push((id, vector));
            }
        }
    }
    out
}

fn extract_single_vector(batches: &[RecordBatch], dimension: usize) -> Option<Vec<f32>> {
    extract_all_vectors(batches, dimension).into_iter().next().map(|(_, v)| v)
}
