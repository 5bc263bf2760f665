//! The crate's one concrete [`Store`]: an ordered, embedded, crash-safe KV
//! engine. Each logical sub-store (`values`, `freshness`, `inputs`,
//! `revdeps`) is realized as its own `sled::Tree`, named
//! `"<substore>:<schema-hash>"` so different schemas never share a
//! keyspace. A [`Batch`] commits across all four trees in one `sled`
//! transaction — `sled`'s multi-tree transactions give the atomicity a
//! batch commit needs.

use std::path::Path;

use async_trait::async_trait;
use sled::transaction::{ConflictableTransactionError, TransactionError, Transactional};
use sled::{Db, Tree};

use super::{Batch, Freshness, Op, Store, StoreError};

/// Byte separating the two halves of a composite revdep key
/// (`input<SEP>dependent`). The ASCII unit separator can't appear in a
/// canonical expression, whose alphabet is `[A-Za-z0-9_(),]`.
const REVDEP_SEP: char = '\u{1f}';

pub struct SledStore {
    db: Db,
}

impl SledStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        Ok(SledStore { db })
    }

    /// A throwaway, non-durable store for tests and benchmarks.
    pub fn temporary() -> Result<Self, StoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(SledStore { db })
    }

    fn values_tree(&self, ns: &str) -> Result<Tree, StoreError> {
        Ok(self.db.open_tree(format!("values:{ns}"))?)
    }

    fn freshness_tree(&self, ns: &str) -> Result<Tree, StoreError> {
        Ok(self.db.open_tree(format!("freshness:{ns}"))?)
    }

    fn inputs_tree(&self, ns: &str) -> Result<Tree, StoreError> {
        Ok(self.db.open_tree(format!("inputs:{ns}"))?)
    }

    fn revdeps_tree(&self, ns: &str) -> Result<Tree, StoreError> {
        Ok(self.db.open_tree(format!("revdeps:{ns}"))?)
    }
}

#[async_trait]
impl Store for SledStore {
    async fn get_value(&self, ns: &str, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let tree = self.values_tree(ns)?;
        Ok(tree.get(key.as_bytes())?.map(|v| v.to_vec()))
    }

    async fn get_freshness(&self, ns: &str, key: &str) -> Result<Option<Freshness>, StoreError> {
        let tree = self.freshness_tree(ns)?;
        Ok(tree
            .get(key.as_bytes())?
            .and_then(|v| v.first().copied())
            .and_then(Freshness::from_byte))
    }

    async fn get_inputs(&self, ns: &str, key: &str) -> Result<Option<Vec<String>>, StoreError> {
        let tree = self.inputs_tree(ns)?;
        match tree.get(key.as_bytes())? {
            Some(bytes) => {
                let inputs: Vec<String> = bincode::deserialize(&bytes)
                    .map_err(|e| StoreError::Backend(format!("inputs record corrupt: {e}")))?;
                Ok(Some(inputs))
            }
            None => Ok(None),
        }
    }

    async fn list_dependents(&self, ns: &str, input: &str) -> Result<Vec<String>, StoreError> {
        let tree = self.revdeps_tree(ns)?;
        let prefix = format!("{input}{REVDEP_SEP}");
        let mut out = Vec::new();
        for entry in tree.scan_prefix(prefix.as_bytes()) {
            let (key, _) = entry?;
            let key_str = String::from_utf8_lossy(&key).into_owned();
            if let Some(dependent) = key_str.strip_prefix(prefix.as_str()) {
                out.push(dependent.to_string());
            }
        }
        Ok(out)
    }

    async fn list_materialized(&self, ns: &str) -> Result<Vec<String>, StoreError> {
        let tree = self.values_tree(ns)?;
        let mut out = Vec::new();
        for entry in tree.iter() {
            let (key, _) = entry?;
            out.push(String::from_utf8_lossy(&key).into_owned());
        }
        Ok(out)
    }

    async fn commit(&self, ns: &str, batch: Batch) -> Result<(), StoreError> {
        let values = self.values_tree(ns)?;
        let freshness = self.freshness_tree(ns)?;
        let inputs = self.inputs_tree(ns)?;
        let revdeps = self.revdeps_tree(ns)?;

        let result = (&values, &freshness, &inputs, &revdeps).transaction(
            |(values, freshness, inputs, revdeps)| {
                for op in &batch.ops {
                    match op {
                        Op::PutValue { key, value } => {
                            values.insert(key.as_bytes(), value.clone())?;
                        }
                        Op::PutFreshness { key, freshness: f } => {
                            freshness.insert(key.as_bytes(), &[f.to_byte()][..])?;
                        }
                        Op::PutInputs { key, inputs: list } => {
                            let encoded = bincode::serialize(list).map_err(|e| {
                                ConflictableTransactionError::Abort(StoreError::Backend(format!(
                                    "inputs record encode failed: {e}"
                                )))
                            })?;
                            inputs.insert(key.as_bytes(), encoded)?;
                        }
                        Op::PutRevDep { input, dependent } => {
                            let composite = format!("{input}{REVDEP_SEP}{dependent}");
                            revdeps.insert(composite.as_bytes(), &b"1"[..])?;
                        }
                    }
                }
                Ok(())
            },
        );

        result.map_err(|e: TransactionError<StoreError>| match e {
            TransactionError::Abort(err) => err,
            TransactionError::Storage(err) => StoreError::from(err),
        })
    }
}
