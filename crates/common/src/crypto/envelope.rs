//! Chunked file envelopes
//!
//! A file is stored as a single blob made of length-prefixed frames:
//!
//! ```text
//! frame    := length_header (8 ASCII decimal digits, zero padded) || ciphertext
//! header   := len(ciphertext) + 8
//! envelope := metadata_frame || content_frame*
//! ```
//!
//! The metadata frame decrypts to a JSON [`FileMeta`]; each content frame
//! decrypts to the next chunk of the file body, at most
//! [`EnvelopeConfig::chunk_size`] bytes long.
//!
//! # Frame nonces
//!
//! Older clients encrypt every frame of a file under the same key *and* iv,
//! which reuses a GCM nonce. [`FrameNonces::Derived`] (the default) gives
//! frame `i` the iv `iv ^ be64(i)` over its trailing 8 bytes instead; the
//! metadata frame still uses the iv unchanged and the byte layout is
//! identical. [`FrameNonces::Shared`] reads and writes legacy envelopes.

use std::ops::Range;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::hash::hash_and_hex;

use super::entropy::{Entropy, OsEntropy};
use super::secret::{crypt, CipherError, CipherMode, Iv, KeyMaterial, Secret, TAG_SIZE};

/// Width of a frame's length header in bytes
pub const HEADER_LEN: usize = 8;
/// Largest value an 8 digit decimal header can hold
pub const MAX_FRAME_LEN: usize = 99_999_999;
/// Default plaintext chunk size: 32 MiB
pub const DEFAULT_CHUNK_SIZE: usize = 32 * 1024 * 1024;
/// Extension appended to network file names
pub const DEFAULT_EXTENSION: &str = ".jkl";

#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("envelope error: {0}")]
    Default(#[from] anyhow::Error),
    #[error("invalid envelope config: {0}")]
    InvalidConfig(String),
    #[error("truncated length header at offset {offset}")]
    TruncatedHeader { offset: usize },
    #[error("non-numeric length header at offset {offset}")]
    InvalidHeader { offset: usize },
    #[error("frame at offset {offset} declares {declared} bytes, below the minimum frame size")]
    FrameTooShort { offset: usize, declared: usize },
    #[error("frame at offset {offset} declares {declared} bytes but only {remaining} remain")]
    TruncatedFrame {
        offset: usize,
        declared: usize,
        remaining: usize,
    },
    #[error("frame of {0} bytes does not fit an 8 digit length header")]
    FrameTooLarge(usize),
    #[error("envelope has no metadata frame")]
    MissingMetadata,
    #[error("metadata frame is not valid file metadata: {0}")]
    Metadata(#[from] serde_json::Error),
    #[error("metadata declares {expected} bytes but the frames hold {actual}")]
    SizeMismatch { expected: u64, actual: u64 },
    #[error("frame {index} failed: {source}")]
    Frame {
        index: usize,
        #[source]
        source: CipherError,
    },
    #[error("cipher error: {0}")]
    Cipher(#[from] CipherError),
}

/// How frame nonces are chosen within one envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameNonces {
    /// Frame `i` uses `iv.for_frame(i)`
    #[default]
    Derived,
    /// Every frame uses the same iv, as legacy clients do
    Shared,
}

/// Codec configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvelopeConfig {
    /// Plaintext bytes per content frame
    pub chunk_size: usize,
    /// Appended to the hashed network name of every encoded file
    pub extension: String,
    pub frame_nonces: FrameNonces,
}

impl Default for EnvelopeConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            extension: DEFAULT_EXTENSION.to_string(),
            frame_nonces: FrameNonces::default(),
        }
    }
}

impl EnvelopeConfig {
    pub fn validate(&self) -> Result<(), EnvelopeError> {
        if self.chunk_size == 0 {
            return Err(EnvelopeError::InvalidConfig(
                "chunk size must be non-zero".to_string(),
            ));
        }
        if self.chunk_size + TAG_SIZE + HEADER_LEN > MAX_FRAME_LEN {
            return Err(EnvelopeError::InvalidConfig(format!(
                "chunk size {} overflows the frame length header",
                self.chunk_size
            )));
        }
        Ok(())
    }
}

/// Metadata carried in an envelope's first frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMeta {
    pub name: String,
    /// Milliseconds since the unix epoch
    pub last_modified: u64,
    /// MIME type, empty when unknown
    #[serde(rename = "type")]
    pub mime: String,
    pub size: u64,
}

/// A file in the clear: its metadata and body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlainFile {
    pub meta: FileMeta,
    pub content: Vec<u8>,
}

impl PlainFile {
    pub fn new(
        name: impl Into<String>,
        mime: impl Into<String>,
        last_modified: u64,
        content: Vec<u8>,
    ) -> Self {
        Self {
            meta: FileMeta {
                name: name.into(),
                last_modified,
                mime: mime.into(),
                size: content.len() as u64,
            },
            content,
        }
    }
}

/// The output of [`EnvelopeCodec::encode_file`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFile {
    /// Hashed network name, `H(name || timestamp) + extension`
    pub name: String,
    pub envelope: Vec<u8>,
    /// Number of frames written, metadata included
    pub frames: usize,
}

/// Milliseconds since the unix epoch
pub fn now_millis() -> u64 {
    (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as u64
}

/// Walk an envelope's length headers and return the ciphertext span of
///  every frame, in order.
///
/// Every byte must belong to exactly one frame.
pub fn frame_spans(envelope: &[u8]) -> Result<Vec<Range<usize>>, EnvelopeError> {
    let mut spans = Vec::new();
    let mut offset = 0;

    while offset < envelope.len() {
        let remaining = envelope.len() - offset;
        if remaining < HEADER_LEN {
            return Err(EnvelopeError::TruncatedHeader { offset });
        }

        let header = &envelope[offset..offset + HEADER_LEN];
        if !header.iter().all(u8::is_ascii_digit) {
            return Err(EnvelopeError::InvalidHeader { offset });
        }
        // all digits, so this is valid ascii
        let declared: usize = std::str::from_utf8(header)
            .map_err(|_| EnvelopeError::InvalidHeader { offset })?
            .parse()
            .map_err(|_| EnvelopeError::InvalidHeader { offset })?;

        if declared < HEADER_LEN + TAG_SIZE {
            return Err(EnvelopeError::FrameTooShort { offset, declared });
        }
        if declared > remaining {
            return Err(EnvelopeError::TruncatedFrame {
                offset,
                declared,
                remaining,
            });
        }

        spans.push(offset + HEADER_LEN..offset + declared);
        offset += declared;
    }

    Ok(spans)
}

fn push_frame(out: &mut Vec<u8>, ciphertext: &[u8]) -> Result<(), EnvelopeError> {
    let len = ciphertext.len() + HEADER_LEN;
    if len > MAX_FRAME_LEN {
        return Err(EnvelopeError::FrameTooLarge(len));
    }
    out.extend_from_slice(format!("{:0width$}", len, width = HEADER_LEN).as_bytes());
    out.extend_from_slice(ciphertext);
    Ok(())
}

/// Encrypts buffers, strings and whole files under caller supplied
///  key material
///
/// The codec holds no per-file state; one instance can encode many files
///  concurrently.
#[derive(Debug, Clone)]
pub struct EnvelopeCodec {
    config: EnvelopeConfig,
    entropy: Arc<dyn Entropy>,
}

impl Default for EnvelopeCodec {
    fn default() -> Self {
        Self {
            config: EnvelopeConfig::default(),
            entropy: Arc::new(OsEntropy),
        }
    }
}

impl EnvelopeCodec {
    pub fn new(config: EnvelopeConfig) -> Result<Self, EnvelopeError> {
        config.validate()?;
        Ok(Self {
            config,
            entropy: Arc::new(OsEntropy),
        })
    }

    /// Replace the randomness source used for key and iv generation
    pub fn with_entropy(mut self, entropy: Arc<dyn Entropy>) -> Self {
        self.entropy = entropy;
        self
    }

    pub fn config(&self) -> &EnvelopeConfig {
        &self.config
    }

    pub fn generate_key(&self) -> Result<Secret, CipherError> {
        Secret::generate(self.entropy.as_ref())
    }

    pub fn generate_iv(&self) -> Result<Iv, CipherError> {
        Iv::generate(self.entropy.as_ref())
    }

    pub fn generate_material(&self) -> Result<KeyMaterial, CipherError> {
        KeyMaterial::generate(self.entropy.as_ref())
    }

    /// See [`crypt`]
    pub fn crypt(
        &self,
        data: &[u8],
        key: &Secret,
        iv: &Iv,
        mode: CipherMode,
    ) -> Result<Vec<u8>, CipherError> {
        crypt(data, key, iv, mode)
    }

    /// Encrypt a UTF-8 string to base64, or decrypt base64 back to a string
    pub fn crypt_text(
        &self,
        text: &str,
        material: &KeyMaterial,
        mode: CipherMode,
    ) -> Result<String, CipherError> {
        match mode {
            CipherMode::Encrypt => {
                let encrypted = crypt(text.as_bytes(), &material.key, &material.iv, mode)?;
                Ok(STANDARD.encode(encrypted))
            }
            CipherMode::Decrypt => {
                let encrypted = STANDARD.decode(text)?;
                let decrypted = crypt(&encrypted, &material.key, &material.iv, mode)?;
                Ok(String::from_utf8(decrypted)?)
            }
        }
    }

    /// The network name for a file: hash of its name and a timestamp,
    ///  plus the configured extension
    pub fn network_name(&self, name: &str, timestamp_ms: u64) -> String {
        format!(
            "{}{}",
            hash_and_hex(&format!("{}{}", name, timestamp_ms)),
            self.config.extension
        )
    }

    fn frame_iv(&self, iv: &Iv, index: usize) -> Iv {
        match self.config.frame_nonces {
            FrameNonces::Derived => iv.for_frame(index as u64),
            FrameNonces::Shared => *iv,
        }
    }

    /// Encode a file into an envelope, naming it with the current time
    pub fn encode_file(
        &self,
        file: &PlainFile,
        material: &KeyMaterial,
    ) -> Result<EncodedFile, EnvelopeError> {
        self.encode_file_at(file, material, now_millis())
    }

    /// Encode a file into an envelope, naming it with `timestamp_ms`
    pub fn encode_file_at(
        &self,
        file: &PlainFile,
        material: &KeyMaterial,
        timestamp_ms: u64,
    ) -> Result<EncodedFile, EnvelopeError> {
        let chunk_size = self.config.chunk_size;
        let content_frames = file.content.len().div_ceil(chunk_size);
        let mut envelope = Vec::with_capacity(
            file.content.len() + (content_frames + 1) * (HEADER_LEN + TAG_SIZE) + 256,
        );

        let mut meta = file.meta.clone();
        meta.size = file.content.len() as u64;
        let meta_json = serde_json::to_vec(&meta)?;
        let encrypted = crypt(
            &meta_json,
            &material.key,
            &self.frame_iv(&material.iv, 0),
            CipherMode::Encrypt,
        )
        .map_err(|source| EnvelopeError::Frame { index: 0, source })?;
        push_frame(&mut envelope, &encrypted)?;

        for (i, chunk) in file.content.chunks(chunk_size).enumerate() {
            let index = i + 1;
            let encrypted = crypt(
                chunk,
                &material.key,
                &self.frame_iv(&material.iv, index),
                CipherMode::Encrypt,
            )
            .map_err(|source| EnvelopeError::Frame { index, source })?;
            push_frame(&mut envelope, &encrypted)?;
        }

        let frames = content_frames + 1;
        tracing::debug!(
            "encoded {} ({} bytes) into {} frames",
            meta.name,
            meta.size,
            frames
        );

        Ok(EncodedFile {
            name: self.network_name(&meta.name, timestamp_ms),
            envelope,
            frames,
        })
    }

    /// Decode an envelope back into the file it was built from
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - a length header is non-numeric, too small, or overruns the buffer
    /// - there is no metadata frame, or it is not valid metadata JSON
    /// - any frame fails authentication
    /// - the decrypted body length differs from the metadata `size`
    pub fn decode_file(
        &self,
        envelope: &[u8],
        material: &KeyMaterial,
    ) -> Result<PlainFile, EnvelopeError> {
        let spans = frame_spans(envelope)?;
        let (meta_span, content_spans) = spans
            .split_first()
            .ok_or(EnvelopeError::MissingMetadata)?;

        let meta_json = crypt(
            &envelope[meta_span.clone()],
            &material.key,
            &self.frame_iv(&material.iv, 0),
            CipherMode::Decrypt,
        )
        .map_err(|source| EnvelopeError::Frame { index: 0, source })?;
        let meta: FileMeta = serde_json::from_slice(&meta_json)?;

        // sized from the frames present; `meta.size` is only trusted once checked
        let plaintext_len: usize = content_spans
            .iter()
            .map(|span| span.len().saturating_sub(TAG_SIZE))
            .sum();
        let mut content = Vec::with_capacity(plaintext_len);
        for (i, span) in content_spans.iter().enumerate() {
            let index = i + 1;
            let chunk = crypt(
                &envelope[span.clone()],
                &material.key,
                &self.frame_iv(&material.iv, index),
                CipherMode::Decrypt,
            )
            .map_err(|source| EnvelopeError::Frame { index, source })?;
            content.extend_from_slice(&chunk);
        }

        if content.len() as u64 != meta.size {
            tracing::warn!(
                "envelope for {} declares {} bytes, decoded {}",
                meta.name,
                meta.size,
                content.len()
            );
            return Err(EnvelopeError::SizeMismatch {
                expected: meta.size,
                actual: content.len() as u64,
            });
        }

        tracing::debug!("decoded {} from {} frames", meta.name, spans.len());
        Ok(PlainFile { meta, content })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn small_codec(chunk_size: usize) -> EnvelopeCodec {
        EnvelopeCodec::new(EnvelopeConfig {
            chunk_size,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_header_is_zero_padded_and_counts_itself() {
        let codec = small_codec(16);
        let material = codec.generate_material().unwrap();
        let file = PlainFile::new("a.txt", "text/plain", 1, b"0123456789".to_vec());

        let encoded = codec.encode_file_at(&file, &material, 42).unwrap();
        let spans = frame_spans(&encoded.envelope).unwrap();
        assert_eq!(spans.len(), 2);

        let content = &spans[1];
        let header = &encoded.envelope[content.start - HEADER_LEN..content.start];
        // 10 bytes of plaintext + 16 byte tag + 8 byte header
        assert_eq!(header, b"00000034");
        assert_eq!(content.len(), 10 + TAG_SIZE);
    }

    #[test]
    fn test_network_name() {
        let codec = EnvelopeCodec::default();
        let name = codec.network_name("report.pdf", 1700000000000);
        assert_eq!(
            name,
            format!("{}.jkl", hash_and_hex("report.pdf1700000000000"))
        );
        assert_ne!(name, codec.network_name("report.pdf", 1700000000001));
    }

    #[test]
    fn test_frame_spans_rejects_bad_headers() {
        assert!(matches!(
            frame_spans(b"0000"),
            Err(EnvelopeError::TruncatedHeader { offset: 0 })
        ));
        assert!(matches!(
            frame_spans(b"00x00040"),
            Err(EnvelopeError::InvalidHeader { offset: 0 })
        ));
        assert!(matches!(
            frame_spans(b"00000008"),
            Err(EnvelopeError::FrameTooShort { .. })
        ));

        let mut truncated = b"00000040".to_vec();
        truncated.extend_from_slice(&[0u8; 20]);
        assert!(matches!(
            frame_spans(&truncated),
            Err(EnvelopeError::TruncatedFrame {
                declared: 40,
                remaining: 28,
                ..
            })
        ));
    }

    #[test]
    fn test_empty_envelope_has_no_metadata() {
        let codec = EnvelopeCodec::default();
        let material = codec.generate_material().unwrap();
        assert!(matches!(
            codec.decode_file(b"", &material),
            Err(EnvelopeError::MissingMetadata)
        ));
    }

    #[test]
    fn test_shared_nonces_match_across_frames() {
        let codec = EnvelopeCodec::new(EnvelopeConfig {
            chunk_size: 4,
            frame_nonces: FrameNonces::Shared,
            ..Default::default()
        })
        .unwrap();
        let material = codec.generate_material().unwrap();
        let file = PlainFile::new("same.bin", "", 0, b"abcdabcd".to_vec());

        let encoded = codec.encode_file_at(&file, &material, 0).unwrap();
        let spans = frame_spans(&encoded.envelope).unwrap();
        // identical chunks under an identical nonce give identical ciphertext
        assert_eq!(
            &encoded.envelope[spans[1].clone()],
            &encoded.envelope[spans[2].clone()]
        );
        assert_eq!(codec.decode_file(&encoded.envelope, &material).unwrap(), file);
    }

    #[test]
    fn test_derived_nonces_differ_across_frames() {
        let codec = small_codec(4);
        let material = codec.generate_material().unwrap();
        let file = PlainFile::new("same.bin", "", 0, b"abcdabcd".to_vec());

        let encoded = codec.encode_file_at(&file, &material, 0).unwrap();
        let spans = frame_spans(&encoded.envelope).unwrap();
        assert_ne!(
            &encoded.envelope[spans[1].clone()],
            &encoded.envelope[spans[2].clone()]
        );
    }

    #[test]
    fn test_nonce_mode_mismatch_fails_on_content() {
        let derived = small_codec(4);
        let shared = EnvelopeCodec::new(EnvelopeConfig {
            chunk_size: 4,
            frame_nonces: FrameNonces::Shared,
            ..Default::default()
        })
        .unwrap();
        let material = derived.generate_material().unwrap();
        let file = PlainFile::new("x", "", 0, b"abcdefgh".to_vec());

        let encoded = derived.encode_file_at(&file, &material, 0).unwrap();
        // metadata frame shares the base iv in both modes, content frames do not
        assert!(matches!(
            shared.decode_file(&encoded.envelope, &material),
            Err(EnvelopeError::Frame { index: 1, .. })
        ));
    }

    #[test]
    fn test_oversized_metadata_size_is_rejected() {
        let codec = small_codec(16);
        let material = codec.generate_material().unwrap();
        let meta = br#"{"name":"x","lastModified":0,"type":"","size":18446744073709551615}"#;
        let encrypted = crypt(meta, &material.key, &material.iv, CipherMode::Encrypt).unwrap();
        let mut envelope = Vec::new();
        push_frame(&mut envelope, &encrypted).unwrap();

        assert!(matches!(
            codec.decode_file(&envelope, &material),
            Err(EnvelopeError::SizeMismatch {
                expected: u64::MAX,
                actual: 0
            })
        ));
    }

    #[test]
    fn test_config_validation() {
        assert!(EnvelopeConfig::default().validate().is_ok());
        assert!(EnvelopeCodec::new(EnvelopeConfig {
            chunk_size: 0,
            ..Default::default()
        })
        .is_err());
        assert!(EnvelopeCodec::new(EnvelopeConfig {
            chunk_size: MAX_FRAME_LEN,
            ..Default::default()
        })
        .is_err());
    }

    #[test]
    fn test_config_deserialize_defaults() {
        let config: EnvelopeConfig = serde_json::from_str(r#"{"chunk_size": 1024}"#).unwrap();
        assert_eq!(config.chunk_size, 1024);
        assert_eq!(config.extension, DEFAULT_EXTENSION);
        assert_eq!(config.frame_nonces, FrameNonces::Derived);

        let config: EnvelopeConfig =
            serde_json::from_str(r#"{"frame_nonces": "shared"}"#).unwrap();
        assert_eq!(config.frame_nonces, FrameNonces::Shared);
        assert_eq!(config.chunk_size, DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn test_crypt_text_roundtrip() {
        let codec = EnvelopeCodec::default();
        let material = codec.generate_material().unwrap();
        let text = r#"{"whoAmI":"docs","emoji":"📁"}"#;

        let encrypted = codec.crypt_text(text, &material, CipherMode::Encrypt).unwrap();
        assert!(STANDARD.decode(&encrypted).is_ok());
        let decrypted = codec
            .crypt_text(&encrypted, &material, CipherMode::Decrypt)
            .unwrap();
        assert_eq!(decrypted, text);
    }

    #[test]
    fn test_crypt_text_rejects_bad_base64() {
        let codec = EnvelopeCodec::default();
        let material = codec.generate_material().unwrap();
        assert!(matches!(
            codec.crypt_text("not base64!!", &material, CipherMode::Decrypt),
            Err(CipherError::Base64(_))
        ));
    }

    #[test]
    fn test_metadata_json_shape() {
        let meta = FileMeta {
            name: "a.txt".to_string(),
            last_modified: 5,
            mime: "text/plain".to_string(),
            size: 3,
        };
        let json: serde_json::Value = serde_json::to_value(&meta).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"name": "a.txt", "lastModified": 5, "type": "text/plain", "size": 3})
        );
    }
}
