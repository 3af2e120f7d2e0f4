//! Participation key fingerprints and key-registration short links.
//!
//! The fingerprint is SHA-512/256 over a fixed byte layout, truncated to
//! 8 bytes and base32 encoded without padding. Two machines holding the same
//! key material always print the same 13 characters, so an operator can
//! compare keys by eye without sending them anywhere.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine as _;
use data_encoding::{BASE32, BASE32_NOPAD};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512_256};
use tracing::debug;

use crate::error::{NodeError, Result};
use crate::http::HttpFetch;

/// Length of the canonical encoding hashed by [`integrity_hash`].
pub const CANONICAL_LEN: usize = 184;

const PUBLIC_KEY_LEN: usize = 32;
const CHECKSUM_LEN: usize = 4;
const FINGERPRINT_BYTES: usize = 8;

mod b64 {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Vec<u8>, D::Error> {
        let text = String::deserialize(d)?;
        STANDARD.decode(text).map_err(serde::de::Error::custom)
    }

    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(
            bytes: &Option<Vec<u8>>,
            s: S,
        ) -> std::result::Result<S::Ok, S::Error> {
            match bytes {
                Some(b) => s.serialize_some(&STANDARD.encode(b)),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            d: D,
        ) -> std::result::Result<Option<Vec<u8>>, D::Error> {
            Option::<String>::deserialize(d)?
                .map(|text| STANDARD.decode(text).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}

/// Key material of a participation key, as served by the management API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AccountParticipation {
    #[serde(with = "b64")]
    pub selection_participation_key: Vec<u8>,
    #[serde(with = "b64")]
    pub vote_participation_key: Vec<u8>,
    #[serde(with = "b64::option", default, skip_serializing_if = "Option::is_none")]
    pub state_proof_key: Option<Vec<u8>>,
    pub vote_first_valid: u64,
    pub vote_last_valid: u64,
    pub vote_key_dilution: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ParticipationKey {
    pub id: String,
    pub address: String,
    pub key: AccountParticipation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective_first_valid: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective_last_valid: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_vote: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_block_proposal: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_state_proof: Option<u64>,
}

/// Decodes a 58-character account address into its 32-byte public key,
/// verifying the trailing checksum.
pub fn decode_address(address: &str) -> Result<[u8; PUBLIC_KEY_LEN]> {
    let raw = BASE32_NOPAD
        .decode(address.as_bytes())
        .map_err(|e| NodeError::validation(format!("malformed address '{address}': {e}")))?;
    if raw.len() != PUBLIC_KEY_LEN + CHECKSUM_LEN {
        return Err(NodeError::validation(format!(
            "address '{address}' decodes to {} bytes, expected {}",
            raw.len(),
            PUBLIC_KEY_LEN + CHECKSUM_LEN
        )));
    }

    let (public_key, checksum) = raw.split_at(PUBLIC_KEY_LEN);
    let digest = Sha512_256::digest(public_key);
    if digest[digest.len() - CHECKSUM_LEN..] != *checksum {
        return Err(NodeError::validation(format!(
            "address '{address}' has a bad checksum"
        )));
    }

    let mut key = [0u8; PUBLIC_KEY_LEN];
    key.copy_from_slice(public_key);
    Ok(key)
}

fn fingerprint(raw: &[u8]) -> String {
    let digest = Sha512_256::digest(raw);
    BASE32
        .encode(&digest[..FINGERPRINT_BYTES])
        .trim_end_matches('=')
        .to_string()
}

/// address ‖ selection ‖ vote ‖ state proof ‖ first ‖ last ‖ dilution,
/// integers as 8-byte big endian.
pub fn canonical_bytes(key: &ParticipationKey) -> Result<Vec<u8>> {
    let address = decode_address(&key.address)?;
    let part = &key.key;
    let state_proof = part.state_proof_key.as_deref().unwrap_or_default();

    let raw: Vec<u8> = [
        address.as_slice(),
        part.selection_participation_key.as_slice(),
        part.vote_participation_key.as_slice(),
        state_proof,
        part.vote_first_valid.to_be_bytes().as_slice(),
        part.vote_last_valid.to_be_bytes().as_slice(),
        part.vote_key_dilution.to_be_bytes().as_slice(),
    ]
    .concat();

    if raw.len() != CANONICAL_LEN {
        return Err(NodeError::validation(format!(
            "invalid raw data length: {} bytes, expected {CANONICAL_LEN}",
            raw.len()
        )));
    }
    Ok(raw)
}

/// Fingerprint of an online key.
pub fn integrity_hash(key: &ParticipationKey) -> Result<String> {
    let hash = fingerprint(&canonical_bytes(key)?);
    debug!(id = %key.id, %hash, "Computed integrity hash");
    Ok(hash)
}

/// Fingerprint for taking `address` offline on `network`.
pub fn offline_hash(address: &str, network: &str) -> Result<String> {
    let public_key = decode_address(address)?;
    Ok(fingerprint(
        &[public_key.as_slice(), network.as_bytes()].concat(),
    ))
}

/// `keys` without the entry whose id is `id`, order preserved.
pub fn remove_by_id(keys: &[ParticipationKey], id: &str) -> Vec<ParticipationKey> {
    keys.iter().filter(|k| k.id != id).cloned().collect()
}

/// Network name the key-registration site understands for a daemon label
/// such as `mainnet-v1.0`.
pub fn short_link_network(label: &str) -> String {
    let name = label.replacen("-v1.0", "", 1).replacen("-v1", "", 1);
    match name.as_str() {
        "dockernet" | "tuinet" => "localnet".to_string(),
        _ => name,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OnlineShortLinkBody {
    pub account: String,
    pub vote_key_b64: String,
    pub selection_key_b64: String,
    pub state_proof_key_b64: String,
    pub vote_first_valid: u64,
    pub vote_last_valid: u64,
    pub key_dilution: u64,
    pub network: String,
}

impl OnlineShortLinkBody {
    pub fn new(key: &ParticipationKey, network_label: &str) -> Self {
        let part = &key.key;
        Self {
            account: key.address.clone(),
            vote_key_b64: URL_SAFE_NO_PAD.encode(&part.vote_participation_key),
            selection_key_b64: URL_SAFE_NO_PAD.encode(&part.selection_participation_key),
            state_proof_key_b64: URL_SAFE_NO_PAD
                .encode(part.state_proof_key.as_deref().unwrap_or_default()),
            vote_first_valid: part.vote_first_valid,
            vote_last_valid: part.vote_last_valid,
            key_dilution: part.vote_key_dilution,
            network: short_link_network(network_label),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OfflineShortLinkBody {
    pub account: String,
    pub network: String,
}

impl OfflineShortLinkBody {
    pub fn new(address: &str, network_label: &str) -> Self {
        Self {
            account: address.to_string(),
            network: short_link_network(network_label),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ShortLink {
    pub id: String,
}

async fn post_short_link<T: Serialize>(http: &dyn HttpFetch, kind: &str, body: &T) -> Result<ShortLink> {
    let url = format!("{}/{kind}", crate::clienv::shortener_url());
    let response = http.post_json(&url, &serde_json::to_value(body)?).await?;
    Ok(serde_json::from_slice(&response)?)
}

/// Registers a key-registration link for bringing `key` online.
pub async fn create_online_short_link(
    http: &dyn HttpFetch,
    key: &ParticipationKey,
    network_label: &str,
) -> Result<ShortLink> {
    post_short_link(http, "online", &OnlineShortLinkBody::new(key, network_label)).await
}

/// Registers a key-registration link for taking `address` offline.
pub async fn create_offline_short_link(
    http: &dyn HttpFetch,
    address: &str,
    network_label: &str,
) -> Result<ShortLink> {
    post_short_link(http, "offline", &OfflineShortLinkBody::new(address, network_label)).await
}
