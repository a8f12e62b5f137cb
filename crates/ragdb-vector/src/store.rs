//! LanceDB-backed vector store: one `chunks` table per collection directory.

use anyhow::{anyhow, Result};
use arrow_array::cast::AsArray;
use arrow_array::types::Float32Type;
use arrow_array::{Array, FixedSizeListArray, Float32Array, Int32Array, RecordBatch, RecordBatchIterator, StringArray};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::{connect, DistanceType, Table};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use ragdb_core::traits::{VectorStore, VectorStoreProvider};
use ragdb_core::types::{ChunkId, SearchHit, SourceKind, VectorEntry};

use crate::schema::{chunk_schema, vector_dim, CHUNKS_TABLE};

/// Ids per `IN (...)` predicate.
const PREDICATE_BATCH: usize = 256;

pub struct LanceVectorStore {
    table: Table,
    dim: usize,
}

impl LanceVectorStore {
    pub async fn open(dir: &Path, dim: usize) -> Result<Self> {
        let dim_i32 = i32::try_from(dim).map_err(|_| anyhow!("vector dimension {dim} is too large"))?;
        let conn = connect(dir.to_string_lossy().as_ref()).execute().await?;
        let names = conn.table_names().execute().await?;
        let table = if names.iter().any(|n| n == CHUNKS_TABLE) {
            let table = conn.open_table(CHUNKS_TABLE).execute().await?;
            let schema = table.schema().await?;
            let stored = vector_dim(&schema);
            if stored != Some(dim) {
                return Err(anyhow!(
                    "vector store at {} holds dimension {:?}, embedder produces {dim}",
                    dir.display(),
                    stored
                ));
            }
            table
        } else {
            tracing::debug!(dir = %dir.display(), dim, "creating chunks table");
            conn.create_empty_table(CHUNKS_TABLE, chunk_schema(dim_i32)).execute().await?
        };
        Ok(Self { table, dim })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    fn to_batch(&self, entries: &[VectorEntry]) -> Result<RecordBatch> {
        let dim = i32::try_from(self.dim)?;
        let mut ids = Vec::with_capacity(entries.len());
        let mut docs = Vec::with_capacity(entries.len());
        let mut ordinals = Vec::with_capacity(entries.len());
        let mut contents = Vec::with_capacity(entries.len());
        let mut vectors: Vec<Option<Vec<Option<f32>>>> = Vec::with_capacity(entries.len());
        for e in entries {
            if e.vector.len() != self.dim {
                return Err(anyhow!("vector for {} has dimension {}, expected {}", e.id, e.vector.len(), self.dim));
            }
            ids.push(e.id.clone());
            docs.push(e.document_id.clone());
            ordinals.push(i32::try_from(e.ordinal)?);
            contents.push(e.text.clone());
            vectors.push(Some(e.vector.iter().map(|&x| Some(x)).collect()));
        }
        Ok(RecordBatch::try_new(
            chunk_schema(dim),
            vec![
                Arc::new(StringArray::from(ids)),
                Arc::new(StringArray::from(docs)),
                Arc::new(Int32Array::from(ordinals)),
                Arc::new(StringArray::from(contents)),
                Arc::new(FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(vectors, dim)),
            ],
        )?)
    }
}

fn id_predicate(ids: &[ChunkId]) -> String {
    let list = ids.iter().map(|id| format!("'{}'", id.replace('\'', "''"))).collect::<Vec<_>>().join(",");
    format!("id IN ({list})")
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| anyhow!("missing {name} column"))
}

fn read_entries(batch: &RecordBatch) -> Result<Vec<VectorEntry>> {
    let ids = string_column(batch, "id")?;
    let docs = string_column(batch, "document_id")?;
    let contents = string_column(batch, "content")?;
    let ordinals = batch
        .column_by_name("ordinal")
        .and_then(|c| c.as_any().downcast_ref::<Int32Array>())
        .ok_or_else(|| anyhow!("missing ordinal column"))?;
    let vectors = batch
        .column_by_name("vector")
        .and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>())
        .ok_or_else(|| anyhow!("missing vector column"))?;
    let mut out = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        if !vectors.is_valid(i) {
            continue;
        }
        out.push(VectorEntry {
            id: ids.value(i).to_string(),
            document_id: docs.value(i).to_string(),
            ordinal: usize::try_from(ordinals.value(i))?,
            text: contents.value(i).to_string(),
            vector: vectors.value(i).as_primitive::<Float32Type>().values().to_vec(),
        });
    }
    Ok(out)
}

#[async_trait]
impl VectorStore for LanceVectorStore {
    async fn add(&self, entries: &[VectorEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let batch = self.to_batch(entries)?;
        let schema = batch.schema();
        let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
        self.table.add(reader).execute().await?;
        Ok(())
    }

    async fn remove(&self, ids: &[ChunkId]) -> Result<()> {
        for group in ids.chunks(PREDICATE_BATCH) {
            self.table.delete(&id_predicate(group)).await?;
        }
        Ok(())
    }

    async fn fetch(&self, ids: &[ChunkId]) -> Result<Vec<VectorEntry>> {
        let mut out = Vec::with_capacity(ids.len());
        for group in ids.chunks(PREDICATE_BATCH) {
            let mut stream = self.table.query().only_if(id_predicate(group)).execute().await?;
            while let Some(batch) = stream.try_next().await? {
                out.extend(read_entries(&batch)?);
            }
        }
        Ok(out)
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        if k == 0 || self.table.count_rows(None).await? == 0 {
            return Ok(Vec::new());
        }
        if query.len() != self.dim {
            return Err(anyhow!("query has dimension {}, expected {}", query.len(), self.dim));
        }
        let mut stream = self
            .table
            .vector_search(query.to_vec())?
            .distance_type(DistanceType::Cosine)
            .select(Select::columns(&["id"]))
            .limit(k)
            .execute()
            .await?;
        let mut hits = Vec::with_capacity(k);
        while let Some(batch) = stream.try_next().await? {
            let ids = string_column(&batch, "id")?;
            let distances = batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
                .ok_or_else(|| anyhow!("missing _distance column"))?;
            for i in 0..batch.num_rows() {
                hits.push(SearchHit {
                    id: ids.value(i).to_string(),
                    score: 1.0 - distances.value(i),
                    source: SourceKind::Vector,
                });
            }
        }
        hits.truncate(k);
        Ok(hits)
    }

    async fn ids(&self) -> Result<HashSet<ChunkId>> {
        let mut out = HashSet::new();
        let mut stream = self.table.query().select(Select::columns(&["id"])).execute().await?;
        while let Some(batch) = stream.try_next().await? {
            let ids = string_column(&batch, "id")?;
            out.extend((0..batch.num_rows()).map(|i| ids.value(i).to_string()));
        }
        Ok(out)
    }
}

/// Opens a [`LanceVectorStore`] in each collection's `vectors/` directory.
#[derive(Debug, Default, Clone, Copy)]
pub struct LanceProvider;

#[async_trait]
impl VectorStoreProvider for LanceProvider {
    async fn open(&self, dir: &Path, dim: usize) -> Result<Arc<dyn VectorStore>> {
        Ok(Arc::new(LanceVectorStore::open(dir, dim).await?))
    }
}
