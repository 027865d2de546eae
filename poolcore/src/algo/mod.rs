//! Proof-of-work algorithm registry.
//!
//! Maps an algorithm identifier to a digest kernel plus the difficulty
//! multiplier used when reporting network difficulty for coins whose
//! difficulty-1 target differs from the Bitcoin baseline by a power of two.
//!
//! The registry is built once at process startup and injected into whatever
//! needs it; after that it is read-only and safe for unsynchronized concurrent
//! lookups. Hashing itself is CPU-bound, so a [`PowHasher`] dispatches its
//! kernel to the blocking thread pool and hands the caller a future: share
//! verification for one connection never stalls the async dispatcher serving
//! the others.

mod kernels;

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use bitcoin::pow::Target;
use serde::Deserialize;
use thiserror::Error;
use tokio::task;

use crate::difficulty::Difficulty;

/// Fixed-length digest produced by every kernel.
pub type Digest32 = [u8; 32];

#[derive(Debug, Error)]
pub enum AlgoError {
    #[error("unknown hash algorithm: {0}")]
    Unknown(String),
}

/// Failures surfaced through a hashing future, never thrown synchronously.
#[derive(Debug, Clone, Error)]
pub enum HashError {
    #[error("hash primitive failed: {0}")]
    Primitive(String),

    #[error("hash worker did not complete: {0}")]
    Worker(String),
}

/// Per-coin tunables for algorithms that take parameters.
///
/// Field names follow the pool coin-configuration convention (`nValue`,
/// `rValue`, `normalHashing`).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CoinTunables {
    /// scrypt cost parameter N; must be a power of two.
    pub n_value: Option<u32>,

    /// scrypt block-size parameter r.
    pub r_value: Option<u32>,

    /// keccak variant that mixes the block time into the input.
    pub normal_hashing: bool,
}

pub(crate) type KernelFn = dyn Fn(&[u8], u32) -> Result<Digest32, HashError> + Send + Sync;

/// A ready-to-use hash function for one coin configuration.
///
/// Cheap to clone and safe to invoke concurrently; kernels hold no mutable
/// state. The `ntime` argument is ignored by every kernel except the keccak
/// normal-hashing variant.
#[derive(Clone)]
pub struct PowHasher {
    kernel: Arc<KernelFn>,
}

impl PowHasher {
    pub(crate) fn new(kernel: Arc<KernelFn>) -> Self {
        Self { kernel }
    }

    /// Compute the digest on the blocking thread pool.
    ///
    /// Parameter errors, primitive failures and worker panics all resolve the
    /// future to `Err`; nothing escapes as an unwind.
    pub async fn hash(&self, data: Vec<u8>, ntime: u32) -> Result<Digest32, HashError> {
        let kernel = Arc::clone(&self.kernel);
        task::spawn_blocking(move || kernel(&data, ntime))
            .await
            .map_err(|e| HashError::Worker(e.to_string()))?
    }
}

impl fmt::Debug for PowHasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PowHasher").finish_non_exhaustive()
    }
}

type HasherFactory = Arc<dyn Fn(&CoinTunables) -> PowHasher + Send + Sync>;

/// One registered proof-of-work algorithm.
///
/// Immutable once registered. The factory closes over algorithm defaults and
/// resolves coin tunables when a hasher is requested; tunable validation
/// errors surface from the returned hasher's future, not from the factory.
#[derive(Clone)]
pub struct AlgorithmDescriptor {
    id: Cow<'static, str>,
    multiplier: u64,
    diff_override: Option<Target>,
    factory: HasherFactory,
}

impl AlgorithmDescriptor {
    pub fn new(
        id: impl Into<Cow<'static, str>>,
        multiplier: u64,
        factory: HasherFactory,
    ) -> Self {
        Self {
            id: id.into(),
            multiplier,
            diff_override: None,
            factory,
        }
    }

    /// Pin a fixed share target, overriding the derived one.
    pub fn with_diff_override(mut self, target: Target) -> Self {
        self.diff_override = Some(target);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Power-of-two scaling between this algorithm's difficulty-1 target and
    /// the Bitcoin baseline. 1 for most algorithms.
    pub fn multiplier(&self) -> u64 {
        self.multiplier
    }

    pub fn diff_override(&self) -> Option<Target> {
        self.diff_override
    }

    /// Build a hasher for the given coin configuration.
    pub fn hasher(&self, coin: &CoinTunables) -> PowHasher {
        (self.factory)(coin)
    }

    /// Network difficulty as reported externally: the base difficulty divided
    /// by this algorithm's multiplier.
    pub fn network_difficulty(&self, difficulty: Difficulty) -> f64 {
        difficulty.as_f64() / self.multiplier as f64
    }
}

impl fmt::Debug for AlgorithmDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlgorithmDescriptor")
            .field("id", &self.id)
            .field("multiplier", &self.multiplier)
            .field("diff_override", &self.diff_override)
            .finish_non_exhaustive()
    }
}

const SCRYPT_MULTIPLIER: u64 = 1 << 16;
const GROESTL_MULTIPLIER: u64 = 1 << 8;

/// Registry of proof-of-work algorithms, keyed by identifier.
pub struct AlgoRegistry {
    algos: HashMap<String, AlgorithmDescriptor>,
}

impl AlgoRegistry {
    /// Registry with the built-in algorithm set.
    pub fn builtin() -> Self {
        let mut registry = Self {
            algos: HashMap::new(),
        };

        registry.register(AlgorithmDescriptor::new(
            "sha256",
            1,
            Arc::new(|_| kernels::sha256d_hasher()),
        ));
        registry.register(AlgorithmDescriptor::new(
            "scrypt",
            SCRYPT_MULTIPLIER,
            Arc::new(|coin: &CoinTunables| {
                kernels::scrypt_hasher(coin.n_value.unwrap_or(1024), coin.r_value.unwrap_or(1))
            }),
        ));
        registry.register(AlgorithmDescriptor::new(
            "scrypt-og",
            SCRYPT_MULTIPLIER,
            Arc::new(|coin: &CoinTunables| {
                kernels::scrypt_hasher(coin.n_value.unwrap_or(64), coin.r_value.unwrap_or(1))
            }),
        ));
        registry.register(AlgorithmDescriptor::new(
            "keccak",
            1,
            Arc::new(|coin: &CoinTunables| kernels::keccak_hasher(coin.normal_hashing)),
        ));
        registry.register(AlgorithmDescriptor::new(
            "skein",
            1,
            Arc::new(|_| kernels::skein_hasher()),
        ));
        registry.register(AlgorithmDescriptor::new(
            "groestl",
            GROESTL_MULTIPLIER,
            Arc::new(|_| kernels::groestl_hasher()),
        ));

        registry
    }

    /// Add or replace a descriptor. Intended for startup wiring only; the
    /// registry is shared read-only afterwards.
    pub fn register(&mut self, descriptor: AlgorithmDescriptor) {
        self.algos
            .insert(descriptor.id().to_string(), descriptor);
    }

    pub fn get(&self, id: &str) -> Result<&AlgorithmDescriptor, AlgoError> {
        self.algos
            .get(id)
            .ok_or_else(|| AlgoError::Unknown(id.to_string()))
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.algos.keys().map(String::as_str)
    }
}

impl Default for AlgoRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
