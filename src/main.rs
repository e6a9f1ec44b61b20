//! Demo driver: builds an overlay, writes random records, reads some back.
//!
//! # Usage
//!
//! ```bash
//! RUST_LOG=xor_dht=debug cargo run -- [config.json]
//! ```
//!
//! The optional argument is a JSON [`DhtConfig`]; missing fields take their
//! defaults. Unless the file says otherwise the demo checks keys against the
//! hash of their value, since the default self-digest check rejects every
//! randomly generated key.

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::info;
use tracing_subscriber::EnvFilter;

use xor_dht::{
    derive_node_id, hash_content, node_id_to_hex, Contact, DhtConfig, KeyCheck, NodeId, Overlay,
    OverlayError,
};

/// Number of peers in the overlay.
const PEERS: usize = 100;
/// Contacts each peer learns at formation time.
const CONTACTS_PER_PEER: usize = 24;
/// Records written.
const WRITES: usize = 200;
/// Records read back.
const READS: usize = 100;
const SEED: u64 = 0x5eed_0f_d47a;

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

fn random_string(rng: &mut StdRng) -> String {
    let len = rng.gen_range(5..=10);
    (0..len)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

fn load_config() -> Result<DhtConfig> {
    match std::env::args().nth(1) {
        Some(path) => {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading config file {path}"))?;
            Ok(DhtConfig::from_json_str(&text)?)
        }
        None => Ok(DhtConfig::default().with_key_check(KeyCheck::ValueDigest)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = load_config()?;
    info!(key_check = ?config.key_check, fanout = config.fanout, "starting overlay");

    let mut rng = StdRng::seed_from_u64(SEED);
    let overlay = Overlay::new();

    let mut ids: Vec<NodeId> = Vec::with_capacity(PEERS);
    for index in 0..PEERS {
        let id = derive_node_id(format!("peer-{index}").as_bytes());
        overlay
            .spawn_peer(Contact::new(id, format!("peer-{index}")), config.clone())
            .await?;
        ids.push(id);
    }

    for id in &ids {
        let neighbours: Vec<&NodeId> = ids
            .choose_multiple(&mut rng, CONTACTS_PER_PEER + 1)
            .filter(|other| *other != id)
            .take(CONTACTS_PER_PEER)
            .collect();
        for other in neighbours {
            overlay.link(id, other).await?;
        }
    }

    let mut keys = Vec::with_capacity(WRITES);
    let mut rejected = 0usize;
    for _ in 0..WRITES {
        let value = random_string(&mut rng).into_bytes();
        let key = hash_content(&value);
        let origin = ids[rng.gen_range(0..ids.len())];
        let Some(peer) = overlay.peer(&origin).await else {
            continue;
        };
        match peer.store(key, value).await {
            Ok(_) => keys.push(key),
            Err(OverlayError::Store(err)) => {
                rejected += 1;
                info!("store rejected: {err}");
            }
            Err(err) => return Err(err.into()),
        }
    }
    info!(stored = keys.len(), rejected, "writes finished");

    let mut found = 0usize;
    for key in keys.choose_multiple(&mut rng, READS) {
        let origin = ids[rng.gen_range(0..ids.len())];
        let Some(peer) = overlay.peer(&origin).await else {
            continue;
        };
        let value = peer.retrieve(*key).await?;
        if value.is_some() {
            found += 1;
        }
        println!(
            "Key: {}, Value: {}",
            node_id_to_hex(key),
            value
                .map(|v| String::from_utf8_lossy(&v).into_owned())
                .unwrap_or_default()
        );
    }
    info!(found, reads = READS.min(keys.len()), "reads finished");

    overlay.shutdown().await;
    Ok(())
}
