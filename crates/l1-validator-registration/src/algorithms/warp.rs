//! # Warp Message Codec
//!
//! Binary layouts exchanged between the L1, the aggregator and the P-Chain.
//! All integers are big-endian and every structure starts with codec
//! version 0.
//!
//! ```text
//! UnsignedMessage     = codec u16 | networkID u32 | sourceChainID [32] | payload bytes
//! AddressedCall       = codec u16 | typeID u32 = 1 | sourceAddress bytes | payload bytes
//! L1ValidatorRegistration
//!                     = codec u16 | typeID u32 = 2 | validationID [32] | registered u8
//! RegisterL1Validator = codec u16 | typeID u32 = 1 | subnetID [32] | nodeID bytes
//!                       | blsPublicKey [48] | expiry u64 | owner | disableOwner | weight u64
//! SignedMessage       = UnsignedMessage | typeID u32 = 0 | signers bytes | signature [96]
//! ```
//!
//! `bytes` is a u32 length prefix followed by the data.

use crate::domain::{
    AccessList, AccessListItem, BlockchainId, Bytes32, EvmAddress, InitiateRegistrationRequest,
    PChainOwner, RegistrationError, SignedWarpMessage, SubnetId, UnsignedWarpMessage,
    ValidationId,
};

/// Codec version prefix.
pub const CODEC_VERSION: u16 = 0;

/// AddressedCall payload type id.
pub const ADDRESSED_CALL_TYPE_ID: u32 = 1;

/// RegisterL1ValidatorMessage type id.
pub const REGISTER_L1_VALIDATOR_TYPE_ID: u32 = 1;

/// L1ValidatorRegistrationMessage type id.
pub const L1_VALIDATOR_REGISTRATION_TYPE_ID: u32 = 2;

/// BitSetSignature type id.
pub const BIT_SET_SIGNATURE_TYPE_ID: u32 = 0;

/// Aggregated BLS signature length.
pub const BLS_SIGNATURE_LEN: usize = 96;

/// Warp precompile address `0x0200000000000000000000000000000000000005`.
pub const WARP_PRECOMPILE_ADDRESS: EvmAddress = [
    0x02, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x05,
];

/// Predicate end delimiter.
pub const PREDICATE_DELIMITER: u8 = 0xff;

// =============================================================================
// Packing
// =============================================================================

fn put_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn put_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn put_u64(out: &mut Vec<u8>, v: u64) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn put_bytes(out: &mut Vec<u8>, data: &[u8]) {
    put_u32(out, data.len() as u32);
    out.extend_from_slice(data);
}

fn put_owner(out: &mut Vec<u8>, owner: &PChainOwner) {
    put_u32(out, owner.threshold);
    put_u32(out, owner.addresses.len() as u32);
    for address in &owner.addresses {
        out.extend_from_slice(address);
    }
}

/// Pack an UnsignedMessage envelope.
pub fn pack_unsigned_message(
    network_id: u32,
    source_chain_id: &BlockchainId,
    payload: &[u8],
) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 + 4 + 32 + 4 + payload.len());
    put_u16(&mut out, CODEC_VERSION);
    put_u32(&mut out, network_id);
    out.extend_from_slice(source_chain_id.as_bytes());
    put_bytes(&mut out, payload);
    out
}

/// Pack an AddressedCall payload.
pub fn pack_addressed_call(source_address: &[u8], payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 + 4 + 4 + source_address.len() + 4 + payload.len());
    put_u16(&mut out, CODEC_VERSION);
    put_u32(&mut out, ADDRESSED_CALL_TYPE_ID);
    put_bytes(&mut out, source_address);
    put_bytes(&mut out, payload);
    out
}

/// Pack the L1ValidatorRegistrationMessage body.
pub fn pack_l1_validator_registration_payload(
    validation_id: &ValidationId,
    registered: bool,
) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 + 4 + 32 + 1);
    put_u16(&mut out, CODEC_VERSION);
    put_u32(&mut out, L1_VALIDATOR_REGISTRATION_TYPE_ID);
    out.extend_from_slice(validation_id.as_bytes());
    out.push(registered as u8);
    out
}

/// Build the unsigned P-Chain validation-status message for `validation_id`.
///
/// `source_chain_id` is the P-Chain blockchain id of the active network.
/// Deterministic: identical inputs give identical bytes.
pub fn pack_l1_validator_registration(
    validation_id: &ValidationId,
    is_registration: bool,
    network_id: u32,
    source_chain_id: &BlockchainId,
) -> Result<UnsignedWarpMessage, RegistrationError> {
    let body = pack_l1_validator_registration_payload(validation_id, is_registration);
    let call = pack_addressed_call(&[], &body);
    UnsignedWarpMessage::new(pack_unsigned_message(network_id, source_chain_id, &call))
}

/// Pack the RegisterL1ValidatorMessage body the Validator Manager emits.
pub fn pack_register_l1_validator_payload(
    subnet_id: &SubnetId,
    request: &InitiateRegistrationRequest,
) -> Vec<u8> {
    let mut out = Vec::with_capacity(256);
    put_u16(&mut out, CODEC_VERSION);
    put_u32(&mut out, REGISTER_L1_VALIDATOR_TYPE_ID);
    out.extend_from_slice(subnet_id.as_bytes());
    put_bytes(&mut out, request.node_id.as_bytes());
    out.extend_from_slice(&request.bls_public_key);
    put_u64(&mut out, request.expiry);
    put_owner(&mut out, &request.remaining_balance_owner);
    put_owner(&mut out, &request.disable_owner);
    put_u64(&mut out, request.weight);
    out
}

/// Append a BitSetSignature to an unsigned message.
pub fn pack_signed_message(
    unsigned: &UnsignedWarpMessage,
    signers: &[u8],
    signature: &[u8; BLS_SIGNATURE_LEN],
) -> Result<SignedWarpMessage, RegistrationError> {
    let mut out = Vec::with_capacity(unsigned.as_bytes().len() + 8 + signers.len() + 96);
    out.extend_from_slice(unsigned.as_bytes());
    put_u32(&mut out, BIT_SET_SIGNATURE_TYPE_ID);
    put_bytes(&mut out, signers);
    out.extend_from_slice(signature);
    SignedWarpMessage::new(out)
}

/// Wrap a signed warp message as a predicate in an EIP-2930 access list.
pub fn pack_warp_into_access_list(signed: &SignedWarpMessage) -> AccessList {
    let mut predicate = signed.as_bytes().to_vec();
    predicate.push(PREDICATE_DELIMITER);
    let padded = predicate.len().div_ceil(32) * 32;
    predicate.resize(padded, 0);

    let storage_keys = predicate
        .chunks_exact(32)
        .map(|chunk| {
            let mut key: Bytes32 = [0u8; 32];
            key.copy_from_slice(chunk);
            key
        })
        .collect();

    vec![AccessListItem {
        address: WARP_PRECOMPILE_ADDRESS,
        storage_keys,
    }]
}

// =============================================================================
// Unpacking
// =============================================================================

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], RegistrationError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| {
                RegistrationError::Codec(format!(
                    "truncated: need {} bytes at offset {}, have {}",
                    n,
                    self.pos,
                    self.bytes.len()
                ))
            })?;
        let out = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn fixed<const N: usize>(&mut self) -> Result<[u8; N], RegistrationError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u16(&mut self) -> Result<u16, RegistrationError> {
        Ok(u16::from_be_bytes(self.fixed()?))
    }

    fn u32(&mut self) -> Result<u32, RegistrationError> {
        Ok(u32::from_be_bytes(self.fixed()?))
    }

    fn u8(&mut self) -> Result<u8, RegistrationError> {
        Ok(self.take(1)?[0])
    }

    fn bytes(&mut self) -> Result<&'a [u8], RegistrationError> {
        let len = self.u32()? as usize;
        self.take(len)
    }

    fn codec(&mut self) -> Result<(), RegistrationError> {
        let version = self.u16()?;
        if version != CODEC_VERSION {
            return Err(RegistrationError::Codec(format!(
                "unsupported codec version {}",
                version
            )));
        }
        Ok(())
    }

    fn type_id(&mut self, expected: u32) -> Result<(), RegistrationError> {
        let got = self.u32()?;
        if got != expected {
            return Err(RegistrationError::Codec(format!(
                "unexpected type id {}, want {}",
                got, expected
            )));
        }
        Ok(())
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }
}

/// Decoded UnsignedMessage envelope.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnpackedMessage {
    /// Network id.
    pub network_id: u32,
    /// Source chain.
    pub source_chain_id: BlockchainId,
    /// Inner payload.
    pub payload: Vec<u8>,
}

/// Decode the UnsignedMessage prefix of `bytes`.
///
/// Returns the message and the number of bytes consumed, so a signed
/// message can be split into its unsigned part and signature.
pub fn unpack_unsigned_message(bytes: &[u8]) -> Result<(UnpackedMessage, usize), RegistrationError> {
    let mut r = Reader::new(bytes);
    r.codec()?;
    let network_id = r.u32()?;
    let source_chain_id = BlockchainId::new(r.fixed()?);
    let payload = r.bytes()?.to_vec();
    Ok((
        UnpackedMessage {
            network_id,
            source_chain_id,
            payload,
        },
        r.pos,
    ))
}

/// Decode an AddressedCall into `(source_address, payload)`.
pub fn unpack_addressed_call(bytes: &[u8]) -> Result<(Vec<u8>, Vec<u8>), RegistrationError> {
    let mut r = Reader::new(bytes);
    r.codec()?;
    r.type_id(ADDRESSED_CALL_TYPE_ID)?;
    let source = r.bytes()?.to_vec();
    let payload = r.bytes()?.to_vec();
    Ok((source, payload))
}

/// Decode an L1ValidatorRegistrationMessage body.
pub fn unpack_l1_validator_registration_payload(
    bytes: &[u8],
) -> Result<(ValidationId, bool), RegistrationError> {
    let mut r = Reader::new(bytes);
    r.codec()?;
    r.type_id(L1_VALIDATOR_REGISTRATION_TYPE_ID)?;
    let validation_id = ValidationId::new(r.fixed()?);
    let registered = match r.u8()? {
        0 => false,
        1 => true,
        other => {
            return Err(RegistrationError::Codec(format!(
                "invalid registered flag {}",
                other
            )))
        }
    };
    if r.remaining() != 0 {
        return Err(RegistrationError::Codec("trailing bytes".to_string()));
    }
    Ok((validation_id, registered))
}

/// Split a signed message into its unsigned envelope and signature bytes.
pub fn unpack_signed_message(
    signed: &SignedWarpMessage,
) -> Result<(UnpackedMessage, [u8; BLS_SIGNATURE_LEN]), RegistrationError> {
    let (message, consumed) = unpack_unsigned_message(signed.as_bytes())?;
    let mut r = Reader::new(&signed.as_bytes()[consumed..]);
    r.type_id(BIT_SET_SIGNATURE_TYPE_ID)?;
    r.bytes()?;
    let signature = r.fixed::<BLS_SIGNATURE_LEN>()?;
    Ok((message, signature))
}

/// Recover the predicate bytes from an access list built by
/// [`pack_warp_into_access_list`].
pub fn unpack_access_list_predicate(list: &AccessList) -> Result<Vec<u8>, RegistrationError> {
    let item = list
        .iter()
        .find(|item| item.address == WARP_PRECOMPILE_ADDRESS)
        .ok_or_else(|| RegistrationError::Codec("no warp predicate in access list".to_string()))?;

    let mut predicate: Vec<u8> = item.storage_keys.iter().flatten().copied().collect();
    let end = predicate
        .iter()
        .rposition(|b| *b != 0)
        .ok_or_else(|| RegistrationError::Codec("empty predicate".to_string()))?;
    if predicate[end] != PREDICATE_DELIMITER {
        return Err(RegistrationError::Codec("missing predicate delimiter".to_string()));
    }
    predicate.truncate(end);
    Ok(predicate)
}
