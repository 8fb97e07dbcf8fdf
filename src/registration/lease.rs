use crate::store::LeaseId;

/// One successful claim of a registration key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationLease {
    pub key: String,
    pub payload: Vec<u8>,
    pub ttl_secs: i64,
    pub lease_id: LeaseId,
    /// Creation revision observed when the claim succeeded; never changes.
    pub create_revision: i64,
}
