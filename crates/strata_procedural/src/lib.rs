//! # STRATA Procedural Generation
//!
//! Deterministic terrain for a voxel world.
//!
//! ## Design Principles
//!
//! 1. **Deterministic**: the same seed and address always produce the same blocks
//! 2. **Chunked**: terrain is generated one chunk at a time
//! 3. **Off-thread**: generation runs behind [`GenerationChannel`], never on
//!    the tick thread
//!
//! ## Example
//!
//! ```rust,ignore
//! use strata_procedural::{GenerationChannel, GenerationWorker, WorkerRequest};
//!
//! let mut worker = GenerationWorker::spawn()?;
//! worker.send(WorkerRequest::Init { generator, seed, world_guid })?;
//! worker.send(WorkerRequest::Generate(addr))?;
//! // later, once per tick
//! while let Some(response) = worker.try_recv() { /* ... */ }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod generator;
pub mod noise;
pub mod worker;

pub use generator::{ChunkBlocks, GeneratorConfig, TerrainGenerator};
pub use noise::{SimplexNoise, WorldSeed};
pub use worker::{
    GenerationChannel, GenerationWorker, InlineGeneration, WorkerError, WorkerRequest,
    WorkerResponse,
};
