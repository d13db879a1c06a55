//! Identifier generation

use crate::error::WorkflowError;
use bech32::Bech32m;
use uuid7::uuid7;

// construct a unique uuid7 then encode it with bech32 under the given prefix
pub fn new_uuid_to_bech32(hrp: &str) -> anyhow::Result<String> {
    let hrp = bech32::Hrp::parse(hrp)?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())?;
    Ok(encode)
}

/// Externally visible business id for a new record of the given collection.
pub fn new_business_id(hrp: &str) -> Result<String, WorkflowError> {
    new_uuid_to_bech32(hrp).map_err(WorkflowError::codec)
}
