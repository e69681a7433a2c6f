use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use di_core::Metric;
use ordered_float::OrderedFloat;
use std::collections::{BinaryHeap, HashMap};
use std::io::{self, Write};

use crate::distance::{self, cosine_distance_with_norms};
use crate::error::{Result, StoreError};

/// Brute-force (flat) vector index.
/// Exact nearest-neighbor search by scanning all vectors.
///
/// Vectors are kept as given so they can be handed back verbatim; cosine
/// uses cached norms instead of normalising on insert.
#[derive(Debug, Clone)]
pub struct FlatIndex {
    dimension: usize,
    metric: Metric,
    labels: Vec<u64>,
    vectors: Vec<Vec<f32>>,
    norms: Vec<f32>,
    label_to_idx: HashMap<u64, usize>,
}

impl FlatIndex {
    pub fn new(dimension: usize, metric: Metric) -> Self {
        Self::with_capacity(dimension, metric, 0)
    }

    /// Create with pre-allocated capacity.
    pub fn with_capacity(dimension: usize, metric: Metric, capacity: usize) -> Self {
        Self {
            dimension,
            metric,
            labels: Vec::with_capacity(capacity),
            vectors: Vec::with_capacity(capacity),
            norms: Vec::with_capacity(capacity),
            label_to_idx: HashMap::with_capacity(capacity),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Insert or overwrite the vector stored under `label`.
    pub fn insert(&mut self, label: u64, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimension,
                got: vector.len(),
            });
        }
        let n = distance::norm(vector);
        if let Some(&idx) = self.label_to_idx.get(&label) {
            self.vectors[idx] = vector.to_vec();
            self.norms[idx] = n;
        } else {
            self.label_to_idx.insert(label, self.labels.len());
            self.labels.push(label);
            self.vectors.push(vector.to_vec());
            self.norms.push(n);
        }
        Ok(())
    }

    pub fn labels(&self) -> &[u64] {
        &self.labels
    }

    pub fn get(&self, label: u64) -> Option<&[f32]> {
        self.label_to_idx.get(&label).map(|&idx| self.vectors[idx].as_slice())
    }

    pub fn remove(&mut self, label: u64) -> bool {
        let Some(idx) = self.label_to_idx.remove(&label) else {
            return false;
        };
        // Swap-remove for O(1) deletion
        let last = self.labels.len() - 1;
        if idx != last {
            let moved_label = self.labels[last];
            self.labels.swap(idx, last);
            self.vectors.swap(idx, last);
            self.norms.swap(idx, last);
            self.label_to_idx.insert(moved_label, idx);
        }
        self.labels.pop();
        self.vectors.pop();
        self.norms.pop();
        true
    }

    pub fn clear(&mut self) {
        self.labels.clear();
        self.vectors.clear();
        self.norms.clear();
        self.label_to_idx.clear();
    }

    /// The `top_k` closest labels accepted by `accept`, as
    /// `(label, raw distance)` ascending. Ties break on label so repeated
    /// searches over the same state agree.
    pub fn search<F>(&self, query: &[f32], top_k: Option<usize>, accept: F) -> Result<Vec<(u64, f32)>>
    where
        F: Fn(u64) -> bool,
    {
        if query.len() != self.dimension {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimension,
                got: query.len(),
            });
        }
        if top_k == Some(0) || self.labels.is_empty() {
            return Ok(Vec::new());
        }
        let query_norm = distance::norm(query);

        let candidates = (0..self.labels.len())
            .filter(|&i| accept(self.labels[i]))
            .map(|i| (OrderedFloat(self.distance_at(i, query, query_norm)), self.labels[i]));

        let mut scored: Vec<(OrderedFloat<f32>, u64)> = match top_k {
            Some(k) => {
                // Max-heap of the k best so far; the worst sits on top.
                let mut heap = BinaryHeap::with_capacity(k.min(self.labels.len()) + 1);
                for c in candidates {
                    heap.push(c);
                    if heap.len() > k {
                        heap.pop();
                    }
                }
                heap.into_vec()
            }
            None => candidates.collect(),
        };
        scored.sort();
        Ok(scored.into_iter().map(|(d, label)| (label, d.into_inner())).collect())
    }

    fn distance_at(&self, i: usize, query: &[f32], query_norm: f32) -> f32 {
        let v = &self.vectors[i];
        match self.metric {
            Metric::Cosine => cosine_distance_with_norms(query, query_norm, v, self.norms[i]),
            Metric::L2Norm => distance::l2_squared(query, v).sqrt(),
            Metric::DotProduct => -distance::inner_product(query, v),
        }
    }

    /// Format: dim(u32) | count(u64) | [label(u64) | vector(f32 * dim)] ...
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u32::<LittleEndian>(self.dimension as u32)?;
        w.write_u64::<LittleEndian>(self.labels.len() as u64)?;
        for (label, vector) in self.labels.iter().zip(self.vectors.iter()) {
            w.write_u64::<LittleEndian>(*label)?;
            for &val in vector {
                w.write_f32::<LittleEndian>(val)?;
            }
        }
        Ok(())
    }

    /// Decode the [`FlatIndex::write_to`] format. The declared count is
    /// checked against the bytes present before anything is allocated.
    pub fn from_bytes(bytes: &[u8], metric: Metric) -> Result<Self> {
        let mut r = bytes;
        let dim = r.read_u32::<LittleEndian>()? as usize;
        let count = r.read_u64::<LittleEndian>()?;
        if count == 0 {
            return Ok(Self::new(dim, metric));
        }
        let record = dim
            .checked_mul(4)
            .and_then(|n| n.checked_add(8))
            .ok_or_else(|| StoreError::Storage(format!("vector dimension {dim} out of range")))?;
        let available = (r.len() / record) as u64;
        if count > available {
            return Err(StoreError::Storage(format!(
                "header declares {count} vectors but only {available} are present"
            )));
        }
        let count = count as usize;
        let mut index = Self::with_capacity(dim, metric, count);
        let mut vector = vec![0f32; dim];
        for _ in 0..count {
            let label = r.read_u64::<LittleEndian>()?;
            r.read_f32_into::<LittleEndian>(&mut vector)?;
            index.insert(label, &vector)?;
        }
        Ok(index)
    }
}
