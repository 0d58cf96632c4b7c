//! # Secure Memory
//!
//! Wipe-on-use ownership wrappers for transient key material.
//!
//! ## Lifecycle
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      SECURE OPERATION SCOPE                             │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  SecureOperation::new("decrypt_provider_key")                          │
//! │        │                                                                │
//! │        ├── register(raw DEK bytes)      ──► SecureBuffer #0             │
//! │        ├── register(plaintext bytes)    ──► SecureBuffer #1             │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  Ok(..) / Err(..) / early `?` return                                   │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  cleanup() or Drop ──► every buffer wiped exactly once                 │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A wipe overwrites with OS randomness and then zeros, for
//! [`WIPE_PASSES`] rounds. The final zeroing goes through `zeroize`,
//! which uses volatile writes the optimizer cannot elide.
//!
//! Every `SecureBuffer` is exclusively owned; there is no shared or aliased
//! access to its bytes.

use rand::{rngs::OsRng, RngCore};
use zeroize::Zeroize;

use crate::error::{Error, Result};

/// Number of random-then-zero overwrite rounds per wipe
pub const WIPE_PASSES: usize = 3;

/// Overwrite `bytes` with random data and then zeros, [`WIPE_PASSES`] times
///
/// The slice is all-zero when this returns.
pub fn secure_memory_wipe(bytes: &mut [u8]) {
    for _ in 0..WIPE_PASSES {
        OsRng.fill_bytes(bytes);
        bytes.zeroize();
    }
}

/// Wipe a string's contents and spare capacity, leaving it empty
pub fn secure_string_wipe(value: &mut String) {
    let mut bytes = std::mem::take(value).into_bytes();
    secure_memory_wipe(&mut bytes);
    bytes.zeroize();
}

/// An owned byte buffer that is wiped exactly once
///
/// After [`wipe`](Self::wipe), every accessor fails with `BufferWiped`.
/// Dropping a buffer wipes it if that has not happened yet.
pub struct SecureBuffer {
    data: Vec<u8>,
    wiped: bool,
}

impl SecureBuffer {
    /// Take ownership of `data`
    pub fn new(data: Vec<u8>) -> Self {
        Self { data, wiped: false }
    }

    /// Take ownership of a string's bytes
    pub fn from_string(value: String) -> Self {
        Self::new(value.into_bytes())
    }

    /// Borrow the contents
    pub fn get(&self) -> Result<&[u8]> {
        if self.wiped {
            return Err(Error::BufferWiped);
        }
        Ok(&self.data)
    }

    /// Borrow the contents as UTF-8
    pub fn as_str(&self) -> Result<&str> {
        std::str::from_utf8(self.get()?)
            .map_err(|_| Error::InvalidEncoding("secure buffer is not valid UTF-8".into()))
    }

    /// Length of the buffer in bytes (retained after wipe)
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the buffer holds zero bytes
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Whether [`wipe`](Self::wipe) has run
    pub fn is_wiped(&self) -> bool {
        self.wiped
    }

    /// Wipe the contents. Idempotent; returns `true` only on the first call.
    pub fn wipe(&mut self) -> bool {
        if self.wiped {
            return false;
        }
        secure_memory_wipe(&mut self.data);
        self.wiped = true;
        true
    }
}

impl Drop for SecureBuffer {
    fn drop(&mut self) {
        self.wipe();
        self.data.zeroize();
    }
}

impl std::fmt::Debug for SecureBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureBuffer")
            .field("len", &self.data.len())
            .field("wiped", &self.wiped)
            .finish()
    }
}

/// Index of a buffer registered with a [`SecureOperation`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferHandle(usize);

/// Scope object owning every sensitive buffer created during one
/// cryptographic call
///
/// All registered material is wiped by [`cleanup`](Self::cleanup) or, at the
/// latest, when the operation is dropped. That covers success, error and
/// early-return paths alike.
pub struct SecureOperation {
    name: &'static str,
    buffers: Vec<SecureBuffer>,
}

impl SecureOperation {
    /// Start a new scope
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            buffers: Vec::new(),
        }
    }

    /// Operation name (for diagnostics)
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Take ownership of sensitive bytes
    pub fn register(&mut self, bytes: Vec<u8>) -> BufferHandle {
        self.register_buffer(SecureBuffer::new(bytes))
    }

    /// Take ownership of a sensitive string
    pub fn register_string(&mut self, value: String) -> BufferHandle {
        self.register_buffer(SecureBuffer::from_string(value))
    }

    /// Take ownership of an existing buffer
    pub fn register_buffer(&mut self, buffer: SecureBuffer) -> BufferHandle {
        self.buffers.push(buffer);
        BufferHandle(self.buffers.len() - 1)
    }

    /// Borrow a registered buffer's bytes
    pub fn get(&self, handle: &BufferHandle) -> Result<&[u8]> {
        self.buffer(handle)?.get()
    }

    /// Borrow a registered buffer as UTF-8
    pub fn get_str(&self, handle: &BufferHandle) -> Result<&str> {
        self.buffer(handle)?.as_str()
    }

    /// Number of registered buffers
    pub fn registered(&self) -> usize {
        self.buffers.len()
    }

    /// Wipe every registered buffer that has not been wiped yet
    ///
    /// Returns how many buffers this call wiped; a second call returns 0.
    pub fn cleanup(&mut self) -> usize {
        let wiped = self
            .buffers
            .iter_mut()
            .map(|buffer| buffer.wipe())
            .filter(|wiped| *wiped)
            .count();

        if wiped > 0 {
            tracing::trace!(operation = self.name, buffers = wiped, "Wiped secure buffers");
        }
        wiped
    }

    fn buffer(&self, handle: &BufferHandle) -> Result<&SecureBuffer> {
        self.buffers.get(handle.0).ok_or_else(|| {
            Error::InvalidInput(format!(
                "buffer handle {} is not registered with {}",
                handle.0, self.name
            ))
        })
    }
}

impl Drop for SecureOperation {
    fn drop(&mut self) {
        self.cleanup();
    }
}

// ============================================================================
// TESTS
// ============================================================================
