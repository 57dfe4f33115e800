//! # In-Memory Store
//!
//! Purpose: Hold every kind of server-side state: objects, plain counters,
//! bucket and bucket-type properties, and data-type values with their
//! contexts.
//!
//! ## Design Principles
//! 1. **One Lock Per Table**: Each table sits behind its own `RwLock`, so
//!    object traffic never waits on data-type traffic.
//! 2. **Typed Namespaces**: Objects and data types are addressed by
//!    `(bucket type, bucket, key)`; untyped requests use the `default` type.
//! 3. **Versioned Contexts**: A data-type context is the big-endian version of
//!    the stored value, bumped on every update.
//!
//! ## Structure Overview
//!
//! ```text
//! Store
//!   ├── objects:      RwLock<HashMap<Location, StoredObject>>
//!   ├── counters:     RwLock<HashMap<(bucket, key), i64>>
//!   ├── bucket_props: RwLock<HashMap<(type, bucket), RpbBucketProps>>
//!   ├── type_props:   RwLock<HashMap<type, RpbBucketProps>>
//!   ├── datatypes:    RwLock<HashMap<Location, StoredDt>>
//!   └── contexts:     Mutex<Vec<Option<Vec<u8>>>>   (contexts seen on updates)
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use ahash::RandomState;
use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};

use pbkv_common::messages::{
    DataType, DtFetchReq, DtFetchResp, DtUpdateReq, DtUpdateResp, IndexQueryType, RpbBucketProps,
    RpbContent, RpbDelReq, RpbGetReq, RpbGetResp, RpbIndexReq, RpbPair, RpbPutReq, RpbPutResp,
    RpbSearchDoc, RpbSearchQueryReq, RpbSearchQueryResp,
};

use crate::datatypes::DtState;

/// Bucket type used when a request names none.
pub const DEFAULT_TYPE: &[u8] = b"default";

/// Address of an object or data-type value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Location {
    pub bucket_type: Vec<u8>,
    pub bucket: Vec<u8>,
    pub key: Vec<u8>,
}

impl Location {
    pub fn new(bucket_type: Option<&[u8]>, bucket: &[u8], key: &[u8]) -> Self {
        Location {
            bucket_type: bucket_type.unwrap_or(DEFAULT_TYPE).to_vec(),
            bucket: bucket.to_vec(),
            key: key.to_vec(),
        }
    }
}

#[derive(Debug, Clone)]
struct StoredObject {
    content: RpbContent,
    vclock: Vec<u8>,
}

#[derive(Debug, Clone)]
struct StoredDt {
    state: DtState,
    version: u64,
}

/// Error returned to the client as an error reply.
pub type StoreResult<T> = Result<T, String>;

/// Server state tables.
pub struct Store {
    objects: RwLock<HashMap<Location, StoredObject, RandomState>>,
    counters: RwLock<HashMap<(Vec<u8>, Vec<u8>), i64, RandomState>>,
    bucket_props: RwLock<HashMap<(Vec<u8>, Vec<u8>), RpbBucketProps, RandomState>>,
    type_props: RwLock<HashMap<Vec<u8>, RpbBucketProps, RandomState>>,
    datatypes: RwLock<HashMap<Location, StoredDt, RandomState>>,
    contexts: Mutex<Vec<Option<Vec<u8>>>>,
    sequence: AtomicU64,
}

impl Default for Store {
    fn default() -> Self {
        Store::new()
    }
}

impl Store {
    pub fn new() -> Self {
        let hash_state = RandomState::new();
        Store {
            objects: RwLock::new(HashMap::with_hasher(hash_state.clone())),
            counters: RwLock::new(HashMap::with_hasher(hash_state.clone())),
            bucket_props: RwLock::new(HashMap::with_hasher(hash_state.clone())),
            type_props: RwLock::new(HashMap::with_hasher(hash_state.clone())),
            datatypes: RwLock::new(HashMap::with_hasher(hash_state)),
            contexts: Mutex::new(Vec::new()),
            sequence: AtomicU64::new(1),
        }
    }

    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }

    // ------------------------------------------------------------------
    // Objects
    // ------------------------------------------------------------------

    pub fn get(&self, req: &RpbGetReq) -> RpbGetResp {
        let loc = Location::new(req.r#type.as_deref(), &req.bucket, &req.key);
        match self.objects.read().get(&loc) {
            Some(stored) => {
                let mut content = stored.content.clone();
                if req.head.unwrap_or(false) {
                    content.value.clear();
                }
                RpbGetResp {
                    content: vec![content],
                    vclock: Some(stored.vclock.clone()),
                    unchanged: None,
                }
            }
            None => RpbGetResp::default(),
        }
    }

    pub fn put(&self, req: &RpbPutReq) -> StoreResult<RpbPutResp> {
        let mut content = req
            .content
            .clone()
            .ok_or_else(|| "put request carries no content".to_string())?;
        let seq = self.next_sequence();
        let (key, generated) = match &req.key {
            Some(key) if !key.is_empty() => (key.clone(), false),
            _ => (format!("k{seq:016x}").into_bytes(), true),
        };
        let loc = Location::new(req.r#type.as_deref(), &req.bucket, &key);

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        content.last_mod = Some(now.as_secs() as u32);
        content.last_mod_usecs = Some(now.subsec_micros());
        content.vtag = Some(format!("{seq:x}").into_bytes());
        let vclock = seq.to_be_bytes().to_vec();

        let mut objects = self.objects.write();
        if req.if_none_match.unwrap_or(false) && objects.contains_key(&loc) {
            return Err("match_found".to_string());
        }
        objects.insert(
            loc,
            StoredObject {
                content: content.clone(),
                vclock: vclock.clone(),
            },
        );

        let return_body = req.return_body.unwrap_or(false) || req.return_head.unwrap_or(false);
        Ok(RpbPutResp {
            content: if return_body { vec![content] } else { Vec::new() },
            vclock: Some(vclock),
            key: generated.then_some(key),
        })
    }

    /// Deletes the object and any data-type value stored under the same key.
    pub fn delete(&self, req: &RpbDelReq) {
        let loc = Location::new(req.r#type.as_deref(), &req.bucket, &req.key);
        self.objects.write().remove(&loc);
        self.datatypes.write().remove(&loc);
    }

    /// Keys of objects and data-type values in one bucket, sorted.
    pub fn list_keys(&self, bucket_type: Option<&[u8]>, bucket: &[u8]) -> Vec<Vec<u8>> {
        let bucket_type = bucket_type.unwrap_or(DEFAULT_TYPE);
        let matches = |loc: &Location| loc.bucket_type == bucket_type && loc.bucket == bucket;
        let mut keys: Vec<Vec<u8>> = self
            .objects
            .read()
            .keys()
            .filter(|loc| matches(*loc))
            .map(|loc| loc.key.clone())
            .collect();
        keys.extend(
            self.datatypes
                .read()
                .keys()
                .filter(|loc| matches(*loc))
                .map(|loc| loc.key.clone()),
        );
        keys.sort();
        keys.dedup();
        keys
    }

    pub fn list_buckets(&self, bucket_type: Option<&[u8]>) -> Vec<Vec<u8>> {
        let bucket_type = bucket_type.unwrap_or(DEFAULT_TYPE);
        let mut buckets: Vec<Vec<u8>> = self
            .objects
            .read()
            .keys()
            .chain(self.datatypes.read().keys())
            .filter(|loc| loc.bucket_type == bucket_type)
            .map(|loc| loc.bucket.clone())
            .collect();
        buckets.sort();
        buckets.dedup();
        buckets
    }

    /// Secondary-index scan. Returns `(index term, key)` pairs sorted by term.
    pub fn index(&self, req: &RpbIndexReq) -> StoreResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let qtype = IndexQueryType::try_from(req.qtype)
            .map_err(|_| format!("unknown index query type {}", req.qtype))?;
        let in_range = |term: &[u8]| match qtype {
            IndexQueryType::Eq => Some(term) == req.key.as_deref(),
            IndexQueryType::Range => {
                let min = req.range_min.as_deref().unwrap_or_default();
                let above = term >= min;
                let below = req.range_max.as_deref().map_or(true, |max| term <= max);
                above && below
            }
        };

        let bucket_type = req.r#type.as_deref().unwrap_or(DEFAULT_TYPE);
        let mut hits: Vec<(Vec<u8>, Vec<u8>)> = Vec::new();
        for (loc, stored) in self.objects.read().iter() {
            if loc.bucket_type != bucket_type || loc.bucket != req.bucket {
                continue;
            }
            for pair in &stored.content.indexes {
                let term = pair.value.as_deref().unwrap_or_default();
                if pair.key == req.index && in_range(term) {
                    hits.push((term.to_vec(), loc.key.clone()));
                }
            }
        }
        hits.sort();
        if let Some(max) = req.max_results {
            hits.truncate(max as usize);
        }
        Ok(hits)
    }

    /// Naive search: the index names a bucket of the default type, and a
    /// document matches when its value contains the query text. `*:*` matches
    /// everything.
    pub fn search(&self, req: &RpbSearchQueryReq) -> RpbSearchQueryResp {
        let everything = req.q == b"*:*";
        let mut docs: Vec<(Vec<u8>, RpbSearchDoc)> = self
            .objects
            .read()
            .iter()
            .filter(|(loc, _)| loc.bucket_type == DEFAULT_TYPE && loc.bucket == req.index)
            .filter(|(_, stored)| everything || contains(&stored.content.value, &req.q))
            .map(|(loc, stored)| {
                let doc = RpbSearchDoc {
                    fields: vec![
                        pair(b"_yz_rk", &loc.key),
                        pair(b"value", &stored.content.value),
                    ],
                };
                (loc.key.clone(), doc)
            })
            .collect();
        docs.sort_by(|a, b| a.0.cmp(&b.0));
        let num_found = docs.len() as u32;

        let start = req.start.unwrap_or(0) as usize;
        let rows = req.rows.map_or(usize::MAX, |rows| rows as usize);
        RpbSearchQueryResp {
            docs: docs.into_iter().skip(start).take(rows).map(|(_, doc)| doc).collect(),
            max_score: Some(if num_found > 0 { 1.0 } else { 0.0 }),
            num_found: Some(num_found),
        }
    }

    // ------------------------------------------------------------------
    // Plain counters
    // ------------------------------------------------------------------

    pub fn counter_update(&self, bucket: &[u8], key: &[u8], amount: i64) -> i64 {
        let mut counters = self.counters.write();
        let value = counters.entry((bucket.to_vec(), key.to_vec())).or_insert(0);
        *value = value.wrapping_add(amount);
        *value
    }

    pub fn counter_get(&self, bucket: &[u8], key: &[u8]) -> Option<i64> {
        self.counters
            .read()
            .get(&(bucket.to_vec(), key.to_vec()))
            .copied()
    }

    // ------------------------------------------------------------------
    // Properties
    // ------------------------------------------------------------------

    /// Effective properties of a bucket: defaults, then its type, then its own.
    pub fn bucket_props(&self, bucket_type: Option<&[u8]>, bucket: &[u8]) -> RpbBucketProps {
        let bucket_type = bucket_type.unwrap_or(DEFAULT_TYPE);
        let mut props = self.type_props(Some(bucket_type));
        if let Some(own) = self
            .bucket_props
            .read()
            .get(&(bucket_type.to_vec(), bucket.to_vec()))
        {
            props.merge_from(own);
        }
        props
    }

    pub fn set_bucket_props(&self, bucket_type: Option<&[u8]>, bucket: &[u8], props: &RpbBucketProps) {
        let bucket_type = bucket_type.unwrap_or(DEFAULT_TYPE);
        self.bucket_props
            .write()
            .entry((bucket_type.to_vec(), bucket.to_vec()))
            .or_default()
            .merge_from(props);
    }

    pub fn reset_bucket_props(&self, bucket_type: Option<&[u8]>, bucket: &[u8]) {
        let bucket_type = bucket_type.unwrap_or(DEFAULT_TYPE);
        self.bucket_props
            .write()
            .remove(&(bucket_type.to_vec(), bucket.to_vec()));
    }

    pub fn type_props(&self, bucket_type: Option<&[u8]>) -> RpbBucketProps {
        let bucket_type = bucket_type.unwrap_or(DEFAULT_TYPE);
        let mut props = default_props();
        if let Some(own) = self.type_props.read().get(bucket_type) {
            props.merge_from(own);
        }
        props
    }

    pub fn set_type_props(&self, bucket_type: &[u8], props: &RpbBucketProps) {
        self.type_props
            .write()
            .entry(bucket_type.to_vec())
            .or_default()
            .merge_from(props);
    }

    pub fn reset_type_props(&self, bucket_type: &[u8]) {
        self.type_props.write().remove(bucket_type);
    }

    // ------------------------------------------------------------------
    // Data types
    // ------------------------------------------------------------------

    /// Fetches a data-type value. A missing key is answered with the type
    /// declared by the bucket type and no value.
    pub fn dt_fetch(&self, req: &DtFetchReq) -> StoreResult<DtFetchResp> {
        let loc = Location::new(req.r#type.as_deref(), &req.bucket, &req.key);
        let include_context = req.include_context();
        match self.datatypes.read().get(&loc) {
            Some(stored) => Ok(DtFetchResp {
                context: include_context.then(|| stored.version.to_be_bytes().to_vec()),
                r#type: stored.state.kind() as i32,
                value: Some(stored.state.to_value()),
            }),
            None => {
                let kind = self.declared_type(&loc.bucket_type).ok_or_else(|| {
                    format!(
                        "bucket type {} has no datatype",
                        String::from_utf8_lossy(&loc.bucket_type)
                    )
                })?;
                Ok(DtFetchResp {
                    context: None,
                    r#type: kind as i32,
                    value: None,
                })
            }
        }
    }

    /// Applies a data-type update, creating the value on first write.
    pub fn dt_update(&self, req: &DtUpdateReq) -> StoreResult<DtUpdateResp> {
        let op = req
            .op
            .as_ref()
            .ok_or_else(|| "update request carries no operation".to_string())?;
        let kind = DtState::op_kind(op)
            .ok_or_else(|| "operation must target exactly one data type".to_string())?;
        let bucket = req
            .bucket
            .as_deref()
            .ok_or_else(|| "update request carries no bucket".to_string())?;
        let generated;
        let key = match req.key.as_deref() {
            Some(key) if !key.is_empty() => key,
            _ => {
                generated = format!("k{:016x}", self.next_sequence()).into_bytes();
                &generated[..]
            }
        };
        let loc = Location::new(req.r#type.as_deref(), bucket, key);
        if let Some(declared) = self.declared_type(&loc.bucket_type) {
            if declared != kind {
                return Err(format!(
                    "bucket type declares {:?}, operation targets {:?}",
                    declared, kind
                ));
            }
        }

        self.contexts.lock().push(req.context.clone());
        let mut datatypes = self.datatypes.write();
        let stored = datatypes.entry(loc.clone()).or_insert_with(|| StoredDt {
            state: DtState::empty(kind),
            version: 0,
        });
        stored.state.apply(op)?;
        stored.version += 1;

        let mut resp = DtUpdateResp {
            key: (req.key.as_deref() != Some(key)).then(|| key.to_vec()),
            ..Default::default()
        };
        if req.include_context() {
            resp.context = Some(stored.version.to_be_bytes().to_vec());
        }
        if req.return_body.unwrap_or(false) {
            let value = stored.state.to_value();
            resp.counter_value = value.counter_value;
            resp.set_value = value.set_value;
            resp.map_value = value.map_value;
        }
        Ok(resp)
    }

    /// Contexts carried by data-type updates, in arrival order.
    pub fn update_contexts(&self) -> Vec<Option<Vec<u8>>> {
        self.contexts.lock().clone()
    }

    fn declared_type(&self, bucket_type: &[u8]) -> Option<DataType> {
        let props = self.type_props(Some(bucket_type));
        match props.datatype.as_deref()? {
            b"counter" => Some(DataType::Counter),
            b"set" => Some(DataType::Set),
            b"map" => Some(DataType::Map),
            _ => None,
        }
    }
}

fn default_props() -> RpbBucketProps {
    RpbBucketProps {
        n_val: Some(3),
        allow_mult: Some(false),
        last_write_wins: Some(false),
        r: Some(2),
        w: Some(2),
        dw: Some(2),
        rw: Some(2),
        basic_quorum: Some(false),
        notfound_ok: Some(true),
        ..Default::default()
    }
}

fn pair(key: &[u8], value: &[u8]) -> RpbPair {
    RpbPair {
        key: key.to_vec(),
        value: Some(value.to_vec()),
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty() || haystack.windows(needle.len()).any(|window| window == needle)
}
