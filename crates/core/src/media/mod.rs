//! Encrypted media: key derivation, decryption, download, and the pipeline
//! composing them.

pub mod cipher;
pub mod download;
pub mod pipeline;

pub use cipher::{CipherProgress, ExpandedKeySchedule, MediaCipher, StreamDecryptor, reconcile_padding};
pub use download::{BodyStream, DownloadSink, Downloader, FileSink, HttpMediaSource, MediaResponse, MediaSource, media_user_agent};
pub use pipeline::{MediaPipeline, encrypted_path};
