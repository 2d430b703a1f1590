//! Transfer construction, canonical encoding and signing
//!
//! Transfers are encoded as canonical msgpack: map keys sorted, zero and
//! empty fields omitted. The transaction id is the unpadded base32 of
//! SHA-512/256 over `"TX" || encoded`, and the signature covers the same bytes.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use data_encoding::BASE32_NOPAD;
use serde::{Serialize, Serializer};
use sha2::{Digest, Sha512_256};

use super::keys::{decode_address, KeyPair};
use super::{LedgerError, SuggestedParams};

const TX_DOMAIN_PREFIX: &[u8] = b"TX";

/// What a transfer moves
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferKind {
    /// Native asset payment, optionally closing the sender account
    Payment {
        receiver: String,
        amount: u64,
        close_remainder_to: Option<String>,
    },
    /// Secondary asset transfer; a zero transfer to self opts the sender in
    AssetTransfer {
        receiver: String,
        amount: u64,
        asset_id: u64,
    },
}

/// Unsigned transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerTransfer {
    pub sender: String,
    pub kind: TransferKind,
    /// Flat fee (micro-units)
    pub fee: u64,
    pub first_valid: u64,
    pub last_valid: u64,
    pub genesis_id: String,
    pub genesis_hash: String,
    pub note: Vec<u8>,
}

/// Signed transfer ready to broadcast
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransfer {
    pub tx_id: String,
    /// Encoded signed transaction
    pub bytes: Vec<u8>,
    pub transfer: LedgerTransfer,
}

impl LedgerTransfer {
    fn with_params(sender: &str, kind: TransferKind, params: &SuggestedParams) -> Self {
        Self {
            sender: sender.to_string(),
            kind,
            fee: params.min_fee,
            first_valid: params.first_valid,
            last_valid: params.last_valid,
            genesis_id: params.genesis_id.clone(),
            genesis_hash: params.genesis_hash.clone(),
            note: Vec::new(),
        }
    }

    /// Native payment of `amount` micro-units
    pub fn payment(sender: &str, receiver: &str, amount: u64, params: &SuggestedParams) -> Self {
        Self::with_params(
            sender,
            TransferKind::Payment {
                receiver: receiver.to_string(),
                amount,
                close_remainder_to: None,
            },
            params,
        )
    }

    /// Native payment that also closes the sender, sending the remainder to `close_to`
    pub fn closing_payment(
        sender: &str,
        receiver: &str,
        amount: u64,
        close_to: &str,
        params: &SuggestedParams,
    ) -> Self {
        Self::with_params(
            sender,
            TransferKind::Payment {
                receiver: receiver.to_string(),
                amount,
                close_remainder_to: Some(close_to.to_string()),
            },
            params,
        )
    }

    /// Secondary asset transfer of `amount` micro-units
    pub fn asset_transfer(
        sender: &str,
        receiver: &str,
        amount: u64,
        asset_id: u64,
        params: &SuggestedParams,
    ) -> Self {
        Self::with_params(
            sender,
            TransferKind::AssetTransfer {
                receiver: receiver.to_string(),
                amount,
                asset_id,
            },
            params,
        )
    }

    /// Zero transfer of `asset_id` to self, making the sender able to hold it
    pub fn opt_in(sender: &str, asset_id: u64, params: &SuggestedParams) -> Self {
        Self::asset_transfer(sender, sender, 0, asset_id, params)
    }

    pub fn with_note(mut self, note: impl Into<Vec<u8>>) -> Self {
        self.note = note.into();
        self
    }

    /// Receiver of the transfer
    pub fn receiver(&self) -> &str {
        match &self.kind {
            TransferKind::Payment { receiver, .. } => receiver,
            TransferKind::AssetTransfer { receiver, .. } => receiver,
        }
    }

    /// Moved amount in micro-units
    pub fn amount(&self) -> u64 {
        match &self.kind {
            TransferKind::Payment { amount, .. } => *amount,
            TransferKind::AssetTransfer { amount, .. } => *amount,
        }
    }

    fn to_wire(&self) -> Result<WireTransaction, LedgerError> {
        let address = |a: &str| {
            decode_address(a)
                .map(|pk| RawBytes(pk.to_vec()))
                .map_err(|e| LedgerError::Encoding(e.to_string()))
        };

        let genesis_hash = STANDARD
            .decode(&self.genesis_hash)
            .map_err(|e| LedgerError::Encoding(format!("genesis hash: {}", e)))?;

        let mut wire = WireTransaction {
            aamt: 0,
            amt: 0,
            arcv: None,
            close: None,
            fee: self.fee,
            fv: self.first_valid,
            gen: self.genesis_id.clone(),
            gh: RawBytes(genesis_hash),
            lv: self.last_valid,
            note: (!self.note.is_empty()).then(|| RawBytes(self.note.clone())),
            rcv: None,
            snd: address(&self.sender)?,
            tx_type: "pay",
            xaid: 0,
        };

        match &self.kind {
            TransferKind::Payment {
                receiver,
                amount,
                close_remainder_to,
            } => {
                wire.amt = *amount;
                wire.rcv = Some(address(receiver)?);
                wire.close = close_remainder_to.as_deref().map(address).transpose()?;
            }
            TransferKind::AssetTransfer {
                receiver,
                amount,
                asset_id,
            } => {
                wire.tx_type = "axfer";
                wire.aamt = *amount;
                wire.arcv = Some(address(receiver)?);
                wire.xaid = *asset_id;
            }
        }

        Ok(wire)
    }

    /// Canonical msgpack encoding of the unsigned transfer
    pub fn encode(&self) -> Result<Vec<u8>, LedgerError> {
        rmp_serde::to_vec_named(&self.to_wire()?).map_err(|e| LedgerError::Encoding(e.to_string()))
    }

    /// Transaction id the ledger will assign to this transfer
    pub fn tx_id(&self) -> Result<String, LedgerError> {
        Ok(compute_tx_id(&self.encode()?))
    }

    /// Sign with the sender's keys
    pub fn sign(self, keys: &KeyPair) -> Result<SignedTransfer, LedgerError> {
        if keys.address() != self.sender {
            return Err(LedgerError::Encoding(format!(
                "signing key {} does not match sender {}",
                keys.address(),
                self.sender
            )));
        }

        let encoded = self.encode()?;
        let signature = keys.sign(&domain_bytes(&encoded));

        let signed = WireSignedTransaction {
            sig: RawBytes(signature.to_vec()),
            txn: self.to_wire()?,
        };
        let bytes =
            rmp_serde::to_vec_named(&signed).map_err(|e| LedgerError::Encoding(e.to_string()))?;

        Ok(SignedTransfer {
            tx_id: compute_tx_id(&encoded),
            bytes,
            transfer: self,
        })
    }
}

fn domain_bytes(encoded: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(TX_DOMAIN_PREFIX.len() + encoded.len());
    bytes.extend_from_slice(TX_DOMAIN_PREFIX);
    bytes.extend_from_slice(encoded);
    bytes
}

fn compute_tx_id(encoded: &[u8]) -> String {
    BASE32_NOPAD.encode(&Sha512_256::digest(domain_bytes(encoded)))
}

/// Byte string serialized as msgpack `bin`
#[derive(Debug)]
struct RawBytes(Vec<u8>);

impl Serialize for RawBytes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.0)
    }
}

fn is_zero(v: &u64) -> bool {
    *v == 0
}

// Field order is the canonical (sorted) key order.
#[derive(Debug, Serialize)]
struct WireTransaction {
    #[serde(skip_serializing_if = "is_zero")]
    aamt: u64,
    #[serde(skip_serializing_if = "is_zero")]
    amt: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    arcv: Option<RawBytes>,
    #[serde(skip_serializing_if = "Option::is_none")]
    close: Option<RawBytes>,
    #[serde(skip_serializing_if = "is_zero")]
    fee: u64,
    #[serde(skip_serializing_if = "is_zero")]
    fv: u64,
    #[serde(skip_serializing_if = "String::is_empty")]
    gen: String,
    gh: RawBytes,
    #[serde(skip_serializing_if = "is_zero")]
    lv: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    note: Option<RawBytes>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rcv: Option<RawBytes>,
    snd: RawBytes,
    #[serde(rename = "type")]
    tx_type: &'static str,
    #[serde(skip_serializing_if = "is_zero")]
    xaid: u64,
}

#[derive(Debug, Serialize)]
struct WireSignedTransaction {
    sig: RawBytes,
    txn: WireTransaction,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> SuggestedParams {
        SuggestedParams {
            fee: 0,
            min_fee: 1000,
            first_valid: 100,
            last_valid: 1100,
            genesis_id: "testnet-v1.0".to_string(),
            genesis_hash: "SGO1GKSzyE7IEPItTxCByw9x8FmnrCDexi9/cOUJOiI=".to_string(),
        }
    }

    #[test]
    fn test_payment_uses_flat_min_fee() {
        let sender = KeyPair::generate();
        let receiver = KeyPair::generate();
        let transfer = LedgerTransfer::payment(sender.address(), receiver.address(), 5, &params());

        assert_eq!(transfer.fee, 1000);
        assert_eq!(transfer.amount(), 5);
        assert_eq!(transfer.receiver(), receiver.address());
    }

    #[test]
    fn test_signed_id_matches_unsigned_id() {
        let sender = KeyPair::generate();
        let receiver = KeyPair::generate();
        let transfer =
            LedgerTransfer::asset_transfer(sender.address(), receiver.address(), 42, 31566704, &params());

        let expected = transfer.tx_id().unwrap();
        let signed = transfer.sign(&sender).unwrap();

        assert_eq!(signed.tx_id, expected);
        assert_eq!(signed.tx_id.len(), 52);
        assert!(!signed.bytes.is_empty());
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let sender = KeyPair::generate();
        let a = LedgerTransfer::opt_in(sender.address(), 7, &params());
        let b = LedgerTransfer::opt_in(sender.address(), 7, &params());
        assert_eq!(a.encode().unwrap(), b.encode().unwrap());

        let with_note = a.clone().with_note("hello");
        assert_ne!(with_note.encode().unwrap(), a.encode().unwrap());
    }

    #[test]
    fn test_encoding_starts_with_sorted_keys() {
        let sender = KeyPair::generate();
        let encoded = LedgerTransfer::opt_in(sender.address(), 7, &params())
            .encode()
            .unwrap();

        // fixmap header, then "arcv" is the first key (aamt is zero and omitted)
        assert_eq!(encoded[0] & 0xf0, 0x80);
        assert_eq!(&encoded[1..6], b"\xa4arcv");
    }

    #[test]
    fn test_sign_rejects_foreign_key() {
        let sender = KeyPair::generate();
        let other = KeyPair::generate();
        let transfer = LedgerTransfer::payment(sender.address(), other.address(), 1, &params());

        assert!(matches!(
            transfer.sign(&other),
            Err(LedgerError::Encoding(_))
        ));
    }

    #[test]
    fn test_invalid_receiver_fails_encoding() {
        let sender = KeyPair::generate();
        let transfer = LedgerTransfer::payment(sender.address(), "bogus", 1, &params());
        assert!(transfer.encode().is_err());
    }
}
