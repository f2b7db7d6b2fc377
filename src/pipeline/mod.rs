//! Pipeline stages for image-to-areas analysis.
//!
//! Each submodule implements exactly one transformation step, so each is
//! independently testable.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ segment ──▶ encode ──▶ classify ──▶ parse ──▶ normalize
//! (bytes)   (blocks)    (JPEG)     (model)      (JSON)    (areas)
//! ```
//!
//! 1. [`input`]     — resolve a path or URL to validated PNG/JPEG bytes and
//!    optionally prepare them (max 1200 px wide, JPEG)
//! 2. [`segment`]   — split the image into horizontal `flat`/`slice` blocks;
//!    runs in `spawn_blocking`
//! 3. [`encode`]    — crop a band to base64 JPEG for the vision request
//! 4. [`classify`]  — one model call per flat block with timeout, retry and
//!    spacer fallback; the only stage with network I/O
//! 5. [`parse`]     — tolerant extraction of JSON from model answers
//! 6. [`normalize`] — clamp, default styles, merge adjacent text

pub mod classify;
pub mod encode;
pub mod input;
pub mod normalize;
pub mod parse;
pub mod segment;
