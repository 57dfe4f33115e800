// opcode.rs - message codes for the pbkv wire protocol
//
// Every envelope carries one byte that names the protobuf message that
// follows. Requests use odd codes in the low range and the server answers
// with the next code up; the exceptions are listed below.
//
// ============================================================================
// CODE LAYOUT
// ============================================================================
//
//   0        error reply (any request may be answered with it)
//   1 - 30   core key/value protocol, request/response pairs
//   31 - 33  bucket-type administration (requests only; answered by 20/22/30)
//   50 - 53  plain counters
//   80 - 83  replicated data types (counter / set / map)
//
// Boolean-ack responses (ping, set client id, delete, set/reset bucket) carry
// no payload at all; the code alone is the answer.
//
// The table below is the single source of truth for the mapping. It is a
// plain `match`, so both directions are resolved at compile time and there is
// no mutable global to initialize.

/// Op code identifying a request or response kind.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCode {
    ErrorResp = 0,
    PingReq = 1,
    PingResp = 2,
    GetClientIdReq = 3,
    GetClientIdResp = 4,
    SetClientIdReq = 5,
    SetClientIdResp = 6,
    GetServerInfoReq = 7,
    GetServerInfoResp = 8,
    GetReq = 9,
    GetResp = 10,
    PutReq = 11,
    PutResp = 12,
    DelReq = 13,
    DelResp = 14,
    ListBucketsReq = 15,
    ListBucketsResp = 16,
    ListKeysReq = 17,
    ListKeysResp = 18,
    GetBucketReq = 19,
    GetBucketResp = 20,
    SetBucketReq = 21,
    SetBucketResp = 22,
    MapRedReq = 23,
    MapRedResp = 24,
    IndexReq = 25,
    IndexResp = 26,
    SearchQueryReq = 27,
    SearchQueryResp = 28,
    ResetBucketReq = 29,
    ResetBucketResp = 30,
    GetBucketTypeReq = 31,
    SetBucketTypeReq = 32,
    ResetBucketTypeReq = 33,
    CounterUpdateReq = 50,
    CounterUpdateResp = 51,
    CounterGetReq = 52,
    CounterGetResp = 53,
    DtFetchReq = 80,
    DtFetchResp = 81,
    DtUpdateReq = 82,
    DtUpdateResp = 83,
}

impl OpCode {
    /// Every code in the table, in wire order.
    pub const ALL: [OpCode; 42] = [
        Self::ErrorResp,
        Self::PingReq,
        Self::PingResp,
        Self::GetClientIdReq,
        Self::GetClientIdResp,
        Self::SetClientIdReq,
        Self::SetClientIdResp,
        Self::GetServerInfoReq,
        Self::GetServerInfoResp,
        Self::GetReq,
        Self::GetResp,
        Self::PutReq,
        Self::PutResp,
        Self::DelReq,
        Self::DelResp,
        Self::ListBucketsReq,
        Self::ListBucketsResp,
        Self::ListKeysReq,
        Self::ListKeysResp,
        Self::GetBucketReq,
        Self::GetBucketResp,
        Self::SetBucketReq,
        Self::SetBucketResp,
        Self::MapRedReq,
        Self::MapRedResp,
        Self::IndexReq,
        Self::IndexResp,
        Self::SearchQueryReq,
        Self::SearchQueryResp,
        Self::ResetBucketReq,
        Self::ResetBucketResp,
        Self::GetBucketTypeReq,
        Self::SetBucketTypeReq,
        Self::ResetBucketTypeReq,
        Self::CounterUpdateReq,
        Self::CounterUpdateResp,
        Self::CounterGetReq,
        Self::CounterGetResp,
        Self::DtFetchReq,
        Self::DtFetchResp,
        Self::DtUpdateReq,
        Self::DtUpdateResp,
    ];

    /// Convert op code to its wire byte
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Try to resolve a wire byte into an op code
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::ErrorResp),
            1 => Some(Self::PingReq),
            2 => Some(Self::PingResp),
            3 => Some(Self::GetClientIdReq),
            4 => Some(Self::GetClientIdResp),
            5 => Some(Self::SetClientIdReq),
            6 => Some(Self::SetClientIdResp),
            7 => Some(Self::GetServerInfoReq),
            8 => Some(Self::GetServerInfoResp),
            9 => Some(Self::GetReq),
            10 => Some(Self::GetResp),
            11 => Some(Self::PutReq),
            12 => Some(Self::PutResp),
            13 => Some(Self::DelReq),
            14 => Some(Self::DelResp),
            15 => Some(Self::ListBucketsReq),
            16 => Some(Self::ListBucketsResp),
            17 => Some(Self::ListKeysReq),
            18 => Some(Self::ListKeysResp),
            19 => Some(Self::GetBucketReq),
            20 => Some(Self::GetBucketResp),
            21 => Some(Self::SetBucketReq),
            22 => Some(Self::SetBucketResp),
            23 => Some(Self::MapRedReq),
            24 => Some(Self::MapRedResp),
            25 => Some(Self::IndexReq),
            26 => Some(Self::IndexResp),
            27 => Some(Self::SearchQueryReq),
            28 => Some(Self::SearchQueryResp),
            29 => Some(Self::ResetBucketReq),
            30 => Some(Self::ResetBucketResp),
            31 => Some(Self::GetBucketTypeReq),
            32 => Some(Self::SetBucketTypeReq),
            33 => Some(Self::ResetBucketTypeReq),
            50 => Some(Self::CounterUpdateReq),
            51 => Some(Self::CounterUpdateResp),
            52 => Some(Self::CounterGetReq),
            53 => Some(Self::CounterGetResp),
            80 => Some(Self::DtFetchReq),
            81 => Some(Self::DtFetchResp),
            82 => Some(Self::DtUpdateReq),
            83 => Some(Self::DtUpdateResp),
            _ => None,
        }
    }

    /// Get human-readable message name
    pub const fn name(self) -> &'static str {
        match self {
            Self::ErrorResp => "ErrorResp",
            Self::PingReq => "PingReq",
            Self::PingResp => "PingResp",
            Self::GetClientIdReq => "GetClientIdReq",
            Self::GetClientIdResp => "GetClientIdResp",
            Self::SetClientIdReq => "SetClientIdReq",
            Self::SetClientIdResp => "SetClientIdResp",
            Self::GetServerInfoReq => "GetServerInfoReq",
            Self::GetServerInfoResp => "GetServerInfoResp",
            Self::GetReq => "GetReq",
            Self::GetResp => "GetResp",
            Self::PutReq => "PutReq",
            Self::PutResp => "PutResp",
            Self::DelReq => "DelReq",
            Self::DelResp => "DelResp",
            Self::ListBucketsReq => "ListBucketsReq",
            Self::ListBucketsResp => "ListBucketsResp",
            Self::ListKeysReq => "ListKeysReq",
            Self::ListKeysResp => "ListKeysResp",
            Self::GetBucketReq => "GetBucketReq",
            Self::GetBucketResp => "GetBucketResp",
            Self::SetBucketReq => "SetBucketReq",
            Self::SetBucketResp => "SetBucketResp",
            Self::MapRedReq => "MapRedReq",
            Self::MapRedResp => "MapRedResp",
            Self::IndexReq => "IndexReq",
            Self::IndexResp => "IndexResp",
            Self::SearchQueryReq => "SearchQueryReq",
            Self::SearchQueryResp => "SearchQueryResp",
            Self::ResetBucketReq => "ResetBucketReq",
            Self::ResetBucketResp => "ResetBucketResp",
            Self::GetBucketTypeReq => "GetBucketTypeReq",
            Self::SetBucketTypeReq => "SetBucketTypeReq",
            Self::ResetBucketTypeReq => "ResetBucketTypeReq",
            Self::CounterUpdateReq => "CounterUpdateReq",
            Self::CounterUpdateResp => "CounterUpdateResp",
            Self::CounterGetReq => "CounterGetReq",
            Self::CounterGetResp => "CounterGetResp",
            Self::DtFetchReq => "DtFetchReq",
            Self::DtFetchResp => "DtFetchResp",
            Self::DtUpdateReq => "DtUpdateReq",
            Self::DtUpdateResp => "DtUpdateResp",
        }
    }

    /// Whether the code is sent by clients.
    pub const fn is_request(self) -> bool {
        matches!(
            self,
            Self::PingReq
                | Self::GetClientIdReq
                | Self::SetClientIdReq
                | Self::GetServerInfoReq
                | Self::GetReq
                | Self::PutReq
                | Self::DelReq
                | Self::ListBucketsReq
                | Self::ListKeysReq
                | Self::GetBucketReq
                | Self::SetBucketReq
                | Self::MapRedReq
                | Self::IndexReq
                | Self::SearchQueryReq
                | Self::ResetBucketReq
                | Self::GetBucketTypeReq
                | Self::SetBucketTypeReq
                | Self::ResetBucketTypeReq
                | Self::CounterUpdateReq
                | Self::CounterGetReq
                | Self::DtFetchReq
                | Self::DtUpdateReq
        )
    }
}

impl From<OpCode> for u8 {
    fn from(code: OpCode) -> Self {
        code.as_u8()
    }
}
