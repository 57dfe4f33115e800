//! # Protocol Messages
//!
//! Purpose: Declare the protobuf payloads carried inside envelopes.
//!
//! ## Design Principles
//! 1. **Derive, Don't Generate**: Messages use `prost` derives directly, so the
//!    workspace needs no `protoc` or build script.
//! 2. **Optional Means Unset**: Fields a caller may leave for defaults are
//!    `Option`, which lets request builders fill only what an override left
//!    empty.
//! 3. **Stable Tags**: Tag numbers are part of the wire contract and never move.
//!
//! ## Layout
//!
//! ```text
//! key/value     RpbGetReq/Resp, RpbPutReq/Resp, RpbDelReq, RpbContent
//! buckets       RpbListBuckets*, RpbListKeys*, RpbGetBucket*, RpbSetBucketReq,
//!               RpbResetBucketReq, RpbBucketProps, bucket-type requests
//! queries       RpbMapRed*, RpbIndex*, RpbSearchQuery*
//! counters      RpbCounterUpdate*, RpbCounterGet*
//! data types    DtFetch*, DtUpdate*, DtOp, CounterOp, SetOp, MapOp,
//!               MapUpdate, MapField, MapEntry
//! ```

/// Server error reply (op code 0).
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RpbErrorResp {
    #[prost(bytes = "vec", required, tag = "1")]
    pub errmsg: Vec<u8>,
    #[prost(uint32, required, tag = "2")]
    pub errcode: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RpbGetClientIdResp {
    #[prost(bytes = "vec", required, tag = "1")]
    pub client_id: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RpbSetClientIdReq {
    #[prost(bytes = "vec", required, tag = "1")]
    pub client_id: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RpbGetServerInfoResp {
    #[prost(bytes = "vec", optional, tag = "1")]
    pub node: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "2")]
    pub server_version: Option<Vec<u8>>,
}

/// Key/value pair used for user metadata, indexes and search fields.
#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct RpbPair {
    #[prost(bytes = "vec", required, tag = "1")]
    pub key: Vec<u8>,
    #[prost(bytes = "vec", optional, tag = "2")]
    pub value: Option<Vec<u8>>,
}

#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct RpbLink {
    #[prost(bytes = "vec", optional, tag = "1")]
    pub bucket: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "2")]
    pub key: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "3")]
    pub tag: Option<Vec<u8>>,
}

/// One stored value (a sibling) plus its metadata.
#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct RpbContent {
    #[prost(bytes = "vec", required, tag = "1")]
    pub value: Vec<u8>,
    #[prost(bytes = "vec", optional, tag = "2")]
    pub content_type: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "3")]
    pub charset: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "4")]
    pub content_encoding: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "5")]
    pub vtag: Option<Vec<u8>>,
    #[prost(message, repeated, tag = "6")]
    pub links: Vec<RpbLink>,
    #[prost(uint32, optional, tag = "7")]
    pub last_mod: Option<u32>,
    #[prost(uint32, optional, tag = "8")]
    pub last_mod_usecs: Option<u32>,
    #[prost(message, repeated, tag = "9")]
    pub usermeta: Vec<RpbPair>,
    #[prost(message, repeated, tag = "10")]
    pub indexes: Vec<RpbPair>,
    #[prost(bool, optional, tag = "11")]
    pub deleted: Option<bool>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RpbGetReq {
    #[prost(bytes = "vec", required, tag = "1")]
    pub bucket: Vec<u8>,
    #[prost(bytes = "vec", required, tag = "2")]
    pub key: Vec<u8>,
    #[prost(uint32, optional, tag = "3")]
    pub r: Option<u32>,
    #[prost(uint32, optional, tag = "4")]
    pub pr: Option<u32>,
    #[prost(bool, optional, tag = "5")]
    pub basic_quorum: Option<bool>,
    #[prost(bool, optional, tag = "6")]
    pub notfound_ok: Option<bool>,
    #[prost(bytes = "vec", optional, tag = "7")]
    pub if_modified: Option<Vec<u8>>,
    #[prost(bool, optional, tag = "8")]
    pub head: Option<bool>,
    #[prost(bool, optional, tag = "9")]
    pub deletedvclock: Option<bool>,
    #[prost(uint32, optional, tag = "10")]
    pub timeout: Option<u32>,
    #[prost(bytes = "vec", optional, tag = "13")]
    pub r#type: Option<Vec<u8>>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RpbGetResp {
    #[prost(message, repeated, tag = "1")]
    pub content: Vec<RpbContent>,
    #[prost(bytes = "vec", optional, tag = "2")]
    pub vclock: Option<Vec<u8>>,
    #[prost(bool, optional, tag = "3")]
    pub unchanged: Option<bool>,
}

impl RpbGetResp {
    /// A fetch of a missing key returns no content and no vclock.
    pub fn is_not_found(&self) -> bool {
        self.content.is_empty()
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RpbPutReq {
    #[prost(bytes = "vec", required, tag = "1")]
    pub bucket: Vec<u8>,
    #[prost(bytes = "vec", optional, tag = "2")]
    pub key: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "3")]
    pub vclock: Option<Vec<u8>>,
    #[prost(message, optional, tag = "4")]
    pub content: Option<RpbContent>,
    #[prost(uint32, optional, tag = "5")]
    pub w: Option<u32>,
    #[prost(uint32, optional, tag = "6")]
    pub dw: Option<u32>,
    #[prost(bool, optional, tag = "7")]
    pub return_body: Option<bool>,
    #[prost(uint32, optional, tag = "8")]
    pub pw: Option<u32>,
    #[prost(bool, optional, tag = "9")]
    pub if_not_modified: Option<bool>,
    #[prost(bool, optional, tag = "10")]
    pub if_none_match: Option<bool>,
    #[prost(bool, optional, tag = "11")]
    pub return_head: Option<bool>,
    #[prost(uint32, optional, tag = "12")]
    pub timeout: Option<u32>,
    #[prost(bytes = "vec", optional, tag = "16")]
    pub r#type: Option<Vec<u8>>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RpbPutResp {
    #[prost(message, repeated, tag = "1")]
    pub content: Vec<RpbContent>,
    #[prost(bytes = "vec", optional, tag = "2")]
    pub vclock: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "3")]
    pub key: Option<Vec<u8>>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RpbDelReq {
    #[prost(bytes = "vec", required, tag = "1")]
    pub bucket: Vec<u8>,
    #[prost(bytes = "vec", required, tag = "2")]
    pub key: Vec<u8>,
    #[prost(uint32, optional, tag = "3")]
    pub rw: Option<u32>,
    #[prost(bytes = "vec", optional, tag = "4")]
    pub vclock: Option<Vec<u8>>,
    #[prost(uint32, optional, tag = "5")]
    pub r: Option<u32>,
    #[prost(uint32, optional, tag = "6")]
    pub w: Option<u32>,
    #[prost(uint32, optional, tag = "7")]
    pub pr: Option<u32>,
    #[prost(uint32, optional, tag = "8")]
    pub pw: Option<u32>,
    #[prost(uint32, optional, tag = "9")]
    pub dw: Option<u32>,
    #[prost(uint32, optional, tag = "10")]
    pub timeout: Option<u32>,
    #[prost(bytes = "vec", optional, tag = "13")]
    pub r#type: Option<Vec<u8>>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RpbListBucketsReq {
    #[prost(uint32, optional, tag = "1")]
    pub timeout: Option<u32>,
    #[prost(bool, optional, tag = "2")]
    pub stream: Option<bool>,
    #[prost(bytes = "vec", optional, tag = "3")]
    pub r#type: Option<Vec<u8>>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RpbListBucketsResp {
    #[prost(bytes = "vec", repeated, tag = "1")]
    pub buckets: Vec<Vec<u8>>,
    #[prost(bool, optional, tag = "2")]
    pub done: Option<bool>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RpbListKeysReq {
    #[prost(bytes = "vec", required, tag = "1")]
    pub bucket: Vec<u8>,
    #[prost(uint32, optional, tag = "2")]
    pub timeout: Option<u32>,
    #[prost(bytes = "vec", optional, tag = "3")]
    pub r#type: Option<Vec<u8>>,
}

/// One partial frame of a key listing.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RpbListKeysResp {
    #[prost(bytes = "vec", repeated, tag = "1")]
    pub keys: Vec<Vec<u8>>,
    #[prost(bool, optional, tag = "2")]
    pub done: Option<bool>,
}

/// Bucket (or bucket-type) properties. Only set fields are applied.
#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct RpbBucketProps {
    #[prost(uint32, optional, tag = "1")]
    pub n_val: Option<u32>,
    #[prost(bool, optional, tag = "2")]
    pub allow_mult: Option<bool>,
    #[prost(bool, optional, tag = "3")]
    pub last_write_wins: Option<bool>,
    #[prost(uint32, optional, tag = "11")]
    pub pr: Option<u32>,
    #[prost(uint32, optional, tag = "12")]
    pub r: Option<u32>,
    #[prost(uint32, optional, tag = "13")]
    pub w: Option<u32>,
    #[prost(uint32, optional, tag = "14")]
    pub pw: Option<u32>,
    #[prost(uint32, optional, tag = "15")]
    pub dw: Option<u32>,
    #[prost(uint32, optional, tag = "16")]
    pub rw: Option<u32>,
    #[prost(bool, optional, tag = "17")]
    pub basic_quorum: Option<bool>,
    #[prost(bool, optional, tag = "18")]
    pub notfound_ok: Option<bool>,
    #[prost(bytes = "vec", optional, tag = "19")]
    pub backend: Option<Vec<u8>>,
    #[prost(bool, optional, tag = "20")]
    pub search: Option<bool>,
    #[prost(bytes = "vec", optional, tag = "24")]
    pub search_index: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "26")]
    pub datatype: Option<Vec<u8>>,
    #[prost(bool, optional, tag = "27")]
    pub consistent: Option<bool>,
}

impl RpbBucketProps {
    /// Overwrites every field that is set in `other`.
    pub fn merge_from(&mut self, other: &RpbBucketProps) {
        macro_rules! take {
            ($($field:ident),*) => {
                $(if other.$field.is_some() {
                    self.$field = other.$field.clone();
                })*
            };
        }
        take!(
            n_val,
            allow_mult,
            last_write_wins,
            pr,
            r,
            w,
            pw,
            dw,
            rw,
            basic_quorum,
            notfound_ok,
            backend,
            search,
            search_index,
            datatype,
            consistent
        );
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RpbGetBucketReq {
    #[prost(bytes = "vec", required, tag = "1")]
    pub bucket: Vec<u8>,
    #[prost(bytes = "vec", optional, tag = "2")]
    pub r#type: Option<Vec<u8>>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RpbGetBucketResp {
    #[prost(message, optional, tag = "1")]
    pub props: Option<RpbBucketProps>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RpbSetBucketReq {
    #[prost(bytes = "vec", required, tag = "1")]
    pub bucket: Vec<u8>,
    #[prost(message, optional, tag = "2")]
    pub props: Option<RpbBucketProps>,
    #[prost(bytes = "vec", optional, tag = "3")]
    pub r#type: Option<Vec<u8>>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RpbResetBucketReq {
    #[prost(bytes = "vec", required, tag = "1")]
    pub bucket: Vec<u8>,
    #[prost(bytes = "vec", optional, tag = "2")]
    pub r#type: Option<Vec<u8>>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RpbGetBucketTypeReq {
    #[prost(bytes = "vec", required, tag = "1")]
    pub r#type: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RpbSetBucketTypeReq {
    #[prost(bytes = "vec", required, tag = "1")]
    pub r#type: Vec<u8>,
    #[prost(message, optional, tag = "2")]
    pub props: Option<RpbBucketProps>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RpbResetBucketTypeReq {
    #[prost(bytes = "vec", required, tag = "1")]
    pub r#type: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RpbMapRedReq {
    #[prost(bytes = "vec", required, tag = "1")]
    pub request: Vec<u8>,
    #[prost(bytes = "vec", required, tag = "2")]
    pub content_type: Vec<u8>,
}

/// One partial frame of a map-reduce job.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RpbMapRedResp {
    #[prost(uint32, optional, tag = "1")]
    pub phase: Option<u32>,
    #[prost(bytes = "vec", optional, tag = "2")]
    pub response: Option<Vec<u8>>,
    #[prost(bool, optional, tag = "3")]
    pub done: Option<bool>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum IndexQueryType {
    Eq = 0,
    Range = 1,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RpbIndexReq {
    #[prost(bytes = "vec", required, tag = "1")]
    pub bucket: Vec<u8>,
    #[prost(bytes = "vec", required, tag = "2")]
    pub index: Vec<u8>,
    #[prost(enumeration = "IndexQueryType", required, tag = "3")]
    pub qtype: i32,
    #[prost(bytes = "vec", optional, tag = "4")]
    pub key: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "5")]
    pub range_min: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "6")]
    pub range_max: Option<Vec<u8>>,
    #[prost(bool, optional, tag = "7")]
    pub return_terms: Option<bool>,
    #[prost(bool, optional, tag = "8")]
    pub stream: Option<bool>,
    #[prost(uint32, optional, tag = "9")]
    pub max_results: Option<u32>,
    #[prost(bytes = "vec", optional, tag = "10")]
    pub continuation: Option<Vec<u8>>,
    #[prost(uint32, optional, tag = "11")]
    pub timeout: Option<u32>,
    #[prost(bytes = "vec", optional, tag = "12")]
    pub r#type: Option<Vec<u8>>,
}

impl RpbIndexReq {
    /// Exact-match query on one index term.
    pub fn exact(bucket: &str, index: &str, key: &[u8]) -> Self {
        RpbIndexReq {
            bucket: bucket.as_bytes().to_vec(),
            index: index.as_bytes().to_vec(),
            qtype: IndexQueryType::Eq as i32,
            key: Some(key.to_vec()),
            ..Default::default()
        }
    }

    /// Inclusive range query over index terms.
    pub fn range(bucket: &str, index: &str, min: &[u8], max: &[u8]) -> Self {
        RpbIndexReq {
            bucket: bucket.as_bytes().to_vec(),
            index: index.as_bytes().to_vec(),
            qtype: IndexQueryType::Range as i32,
            range_min: Some(min.to_vec()),
            range_max: Some(max.to_vec()),
            ..Default::default()
        }
    }

    /// Whether the server should answer with a stream of partial frames.
    pub fn is_streaming(&self) -> bool {
        self.stream.unwrap_or(false)
    }
}

/// One frame of a secondary-index result.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RpbIndexResp {
    #[prost(bytes = "vec", repeated, tag = "1")]
    pub keys: Vec<Vec<u8>>,
    #[prost(message, repeated, tag = "2")]
    pub results: Vec<RpbPair>,
    #[prost(bytes = "vec", optional, tag = "3")]
    pub continuation: Option<Vec<u8>>,
    #[prost(bool, optional, tag = "4")]
    pub done: Option<bool>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RpbSearchQueryReq {
    #[prost(bytes = "vec", required, tag = "1")]
    pub q: Vec<u8>,
    #[prost(bytes = "vec", required, tag = "2")]
    pub index: Vec<u8>,
    #[prost(uint32, optional, tag = "3")]
    pub rows: Option<u32>,
    #[prost(uint32, optional, tag = "4")]
    pub start: Option<u32>,
    #[prost(bytes = "vec", optional, tag = "5")]
    pub sort: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "6")]
    pub filter: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "7")]
    pub df: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "8")]
    pub op: Option<Vec<u8>>,
    #[prost(bytes = "vec", repeated, tag = "9")]
    pub fl: Vec<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "10")]
    pub presort: Option<Vec<u8>>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RpbSearchDoc {
    #[prost(message, repeated, tag = "1")]
    pub fields: Vec<RpbPair>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RpbSearchQueryResp {
    #[prost(message, repeated, tag = "1")]
    pub docs: Vec<RpbSearchDoc>,
    #[prost(float, optional, tag = "2")]
    pub max_score: Option<f32>,
    #[prost(uint32, optional, tag = "3")]
    pub num_found: Option<u32>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RpbCounterUpdateReq {
    #[prost(bytes = "vec", required, tag = "1")]
    pub bucket: Vec<u8>,
    #[prost(bytes = "vec", required, tag = "2")]
    pub key: Vec<u8>,
    #[prost(sint64, required, tag = "3")]
    pub amount: i64,
    #[prost(uint32, optional, tag = "4")]
    pub w: Option<u32>,
    #[prost(uint32, optional, tag = "5")]
    pub dw: Option<u32>,
    #[prost(uint32, optional, tag = "6")]
    pub pw: Option<u32>,
    #[prost(bool, optional, tag = "7")]
    pub returnvalue: Option<bool>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RpbCounterUpdateResp {
    #[prost(sint64, optional, tag = "1")]
    pub value: Option<i64>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RpbCounterGetReq {
    #[prost(bytes = "vec", required, tag = "1")]
    pub bucket: Vec<u8>,
    #[prost(bytes = "vec", required, tag = "2")]
    pub key: Vec<u8>,
    #[prost(uint32, optional, tag = "3")]
    pub r: Option<u32>,
    #[prost(uint32, optional, tag = "4")]
    pub pr: Option<u32>,
    #[prost(bool, optional, tag = "5")]
    pub basic_quorum: Option<bool>,
    #[prost(bool, optional, tag = "6")]
    pub notfound_ok: Option<bool>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RpbCounterGetResp {
    #[prost(sint64, optional, tag = "1")]
    pub value: Option<i64>,
}

// ---------------------------------------------------------------------------
// Replicated data types
// ---------------------------------------------------------------------------

/// Kind of a named map field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum MapFieldType {
    Counter = 1,
    Set = 2,
    Register = 3,
    Flag = 4,
    Map = 5,
}

/// Top-level data type reported by a fetch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum DataType {
    Counter = 1,
    Set = 2,
    Map = 3,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum FlagOp {
    Enable = 1,
    Disable = 2,
}

#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Message)]
pub struct MapField {
    #[prost(bytes = "vec", required, tag = "1")]
    pub name: Vec<u8>,
    #[prost(enumeration = "MapFieldType", required, tag = "2")]
    pub r#type: i32,
}

impl MapField {
    pub fn new(name: &str, kind: MapFieldType) -> Self {
        MapField {
            name: name.as_bytes().to_vec(),
            r#type: kind as i32,
        }
    }

    /// Field kind, or `None` for a value outside the enum.
    pub fn kind(&self) -> Option<MapFieldType> {
        MapFieldType::try_from(self.r#type).ok()
    }
}

/// Materialized value of one map field.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MapEntry {
    #[prost(message, optional, tag = "1")]
    pub field: Option<MapField>,
    #[prost(sint64, optional, tag = "2")]
    pub counter_value: Option<i64>,
    #[prost(bytes = "vec", repeated, tag = "3")]
    pub set_value: Vec<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "4")]
    pub register_value: Option<Vec<u8>>,
    #[prost(bool, optional, tag = "5")]
    pub flag_value: Option<bool>,
    #[prost(message, repeated, tag = "6")]
    pub map_value: Vec<MapEntry>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DtFetchReq {
    #[prost(bytes = "vec", required, tag = "1")]
    pub bucket: Vec<u8>,
    #[prost(bytes = "vec", required, tag = "2")]
    pub key: Vec<u8>,
    #[prost(bytes = "vec", optional, tag = "3")]
    pub r#type: Option<Vec<u8>>,
    #[prost(uint32, optional, tag = "4")]
    pub r: Option<u32>,
    #[prost(uint32, optional, tag = "5")]
    pub pr: Option<u32>,
    #[prost(bool, optional, tag = "6")]
    pub basic_quorum: Option<bool>,
    #[prost(bool, optional, tag = "7")]
    pub notfound_ok: Option<bool>,
    #[prost(uint32, optional, tag = "8")]
    pub timeout: Option<u32>,
    #[prost(bool, optional, tag = "11", default = "true")]
    pub include_context: Option<bool>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DtValue {
    #[prost(sint64, optional, tag = "1")]
    pub counter_value: Option<i64>,
    #[prost(bytes = "vec", repeated, tag = "2")]
    pub set_value: Vec<Vec<u8>>,
    #[prost(message, repeated, tag = "3")]
    pub map_value: Vec<MapEntry>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DtFetchResp {
    #[prost(bytes = "vec", optional, tag = "1")]
    pub context: Option<Vec<u8>>,
    #[prost(enumeration = "DataType", required, tag = "2")]
    pub r#type: i32,
    #[prost(message, optional, tag = "3")]
    pub value: Option<DtValue>,
}

impl DtFetchResp {
    /// Data type reported by the server, or `None` for a value outside the enum.
    pub fn data_type(&self) -> Option<DataType> {
        DataType::try_from(self.r#type).ok()
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CounterOp {
    #[prost(sint64, optional, tag = "1")]
    pub increment: Option<i64>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SetOp {
    #[prost(bytes = "vec", repeated, tag = "1")]
    pub adds: Vec<Vec<u8>>,
    #[prost(bytes = "vec", repeated, tag = "2")]
    pub removes: Vec<Vec<u8>>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MapUpdate {
    #[prost(message, optional, tag = "1")]
    pub field: Option<MapField>,
    #[prost(message, optional, tag = "2")]
    pub counter_op: Option<CounterOp>,
    #[prost(message, optional, tag = "3")]
    pub set_op: Option<SetOp>,
    #[prost(bytes = "vec", optional, tag = "4")]
    pub register_op: Option<Vec<u8>>,
    #[prost(enumeration = "FlagOp", optional, tag = "5")]
    pub flag_op: Option<i32>,
    #[prost(message, optional, tag = "6")]
    pub map_op: Option<MapOp>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MapOp {
    #[prost(message, repeated, tag = "1")]
    pub removes: Vec<MapField>,
    #[prost(message, repeated, tag = "2")]
    pub updates: Vec<MapUpdate>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DtOp {
    #[prost(message, optional, tag = "1")]
    pub counter_op: Option<CounterOp>,
    #[prost(message, optional, tag = "2")]
    pub set_op: Option<SetOp>,
    #[prost(message, optional, tag = "3")]
    pub map_op: Option<MapOp>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DtUpdateReq {
    #[prost(bytes = "vec", optional, tag = "1")]
    pub bucket: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "2")]
    pub key: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "3")]
    pub r#type: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "4")]
    pub context: Option<Vec<u8>>,
    #[prost(message, optional, tag = "5")]
    pub op: Option<DtOp>,
    #[prost(uint32, optional, tag = "6")]
    pub w: Option<u32>,
    #[prost(uint32, optional, tag = "7")]
    pub dw: Option<u32>,
    #[prost(uint32, optional, tag = "8")]
    pub pw: Option<u32>,
    #[prost(bool, optional, tag = "9")]
    pub return_body: Option<bool>,
    #[prost(uint32, optional, tag = "10")]
    pub timeout: Option<u32>,
    #[prost(bool, optional, tag = "13", default = "true")]
    pub include_context: Option<bool>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DtUpdateResp {
    #[prost(bytes = "vec", optional, tag = "1")]
    pub key: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "2")]
    pub context: Option<Vec<u8>>,
    #[prost(sint64, optional, tag = "3")]
    pub counter_value: Option<i64>,
    #[prost(bytes = "vec", repeated, tag = "4")]
    pub set_value: Vec<Vec<u8>>,
    #[prost(message, repeated, tag = "5")]
    pub map_value: Vec<MapEntry>,
}
