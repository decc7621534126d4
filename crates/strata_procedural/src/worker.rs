//! # Generation Worker
//!
//! Background terrain generation reached only through message passing.
//!
//! ## Protocol
//!
//! ```text
//! tick thread                     worker thread
//!   Init { generator, seed }  ->    builds the generator
//!                             <-    Inited { world_guid }
//!   Generate(addr)            ->    generator.generate(addr)
//!                             <-    BlocksGenerated { addr, blocks }
//!   Shutdown                  ->    exits
//! ```
//!
//! The tick thread never blocks on a response; it drains completions with
//! [`GenerationChannel::try_recv`] at the start of its chunk phase.

use std::collections::VecDeque;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use strata_shared::ChunkAddr;
use thiserror::Error;

use crate::generator::{ChunkBlocks, GeneratorConfig, TerrainGenerator};
use crate::noise::WorldSeed;

/// Request sent to the worker.
#[derive(Clone, Debug)]
pub enum WorkerRequest {
    /// Configure the generator. Must precede any `Generate`.
    Init {
        /// Generator selection
        generator: GeneratorConfig,
        /// World seed phrase
        seed: String,
        /// World the worker now serves
        world_guid: String,
    },
    /// Generate one chunk.
    Generate(ChunkAddr),
    /// Stop the worker thread.
    Shutdown,
}

/// Response from the worker.
#[derive(Clone, Debug)]
pub enum WorkerResponse {
    /// The generator is ready.
    Inited {
        /// World the worker now serves
        world_guid: String,
    },
    /// Terrain of one chunk.
    BlocksGenerated {
        /// Requested address
        addr: ChunkAddr,
        /// Generated voxels
        blocks: ChunkBlocks,
    },
}

/// Worker failures.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The worker thread is gone.
    #[error("generation worker disconnected")]
    Disconnected,

    /// The worker thread could not be started.
    #[error("failed to spawn generation worker: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Request/response link to a terrain generator.
pub trait GenerationChannel: Send {
    /// Sends a request without waiting for the answer.
    ///
    /// # Errors
    ///
    /// Fails when the generator side is gone.
    fn send(&mut self, request: WorkerRequest) -> Result<(), WorkerError>;

    /// Next completed response, if any.
    fn try_recv(&mut self) -> Option<WorkerResponse>;
}

/// Handles one request; shared by the thread and the inline channel.
fn serve_request(
    generator: &mut Option<Box<dyn TerrainGenerator>>,
    request: WorkerRequest,
) -> Option<WorkerResponse> {
    match request {
        WorkerRequest::Init {
            generator: config,
            seed,
            world_guid,
        } => {
            let built = config.build(WorldSeed::from_phrase(&seed));
            tracing::info!("generation worker ready: {} for world {}", built.name(), world_guid);
            *generator = Some(built);
            Some(WorkerResponse::Inited { world_guid })
        }
        WorkerRequest::Generate(addr) => match generator {
            Some(g) => Some(WorkerResponse::BlocksGenerated {
                addr,
                blocks: g.generate(addr),
            }),
            None => {
                tracing::warn!("generate {} before init, ignored", addr);
                None
            }
        },
        WorkerRequest::Shutdown => None,
    }
}

/// Terrain generation on a dedicated thread.
pub struct GenerationWorker {
    request_tx: Sender<WorkerRequest>,
    result_rx: Receiver<WorkerResponse>,
    handle: Option<JoinHandle<()>>,
}

impl GenerationWorker {
    /// Starts the worker thread.
    ///
    /// # Errors
    ///
    /// Fails when the OS refuses to create the thread.
    pub fn spawn() -> Result<Self, WorkerError> {
        let (request_tx, request_rx) = unbounded::<WorkerRequest>();
        let (result_tx, result_rx) = unbounded::<WorkerResponse>();

        let handle = thread::Builder::new()
            .name("chunk-gen".to_string())
            .spawn(move || {
                let mut generator: Option<Box<dyn TerrainGenerator>> = None;
                while let Ok(request) = request_rx.recv() {
                    if matches!(request, WorkerRequest::Shutdown) {
                        break;
                    }
                    if let Some(response) = serve_request(&mut generator, request) {
                        if result_tx.send(response).is_err() {
                            // Tick side has gone away.
                            break;
                        }
                    }
                }
                tracing::debug!("generation worker stopped");
            })?;

        Ok(Self {
            request_tx,
            result_rx,
            handle: Some(handle),
        })
    }
}

impl GenerationChannel for GenerationWorker {
    fn send(&mut self, request: WorkerRequest) -> Result<(), WorkerError> {
        self.request_tx
            .send(request)
            .map_err(|_| WorkerError::Disconnected)
    }

    fn try_recv(&mut self) -> Option<WorkerResponse> {
        match self.result_rx.try_recv() {
            Ok(response) => Some(response),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                tracing::warn!("generation worker result channel closed");
                None
            }
        }
    }
}

impl Drop for GenerationWorker {
    fn drop(&mut self) {
        let _ = self.request_tx.send(WorkerRequest::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Generates on the calling thread; responses become visible on the next
/// `try_recv`, in request order.
#[derive(Default)]
pub struct InlineGeneration {
    generator: Option<Box<dyn TerrainGenerator>>,
    ready: VecDeque<WorkerResponse>,
    /// Requests received, for inspection.
    pub requests: Vec<ChunkAddr>,
    /// When set, `Generate` requests are recorded but never answered.
    pub stalled: bool,
}

impl InlineGeneration {
    /// Creates an idle inline generator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl GenerationChannel for InlineGeneration {
    fn send(&mut self, request: WorkerRequest) -> Result<(), WorkerError> {
        if let WorkerRequest::Generate(addr) = request {
            self.requests.push(addr);
            if self.stalled {
                return Ok(());
            }
        }
        if let Some(response) = serve_request(&mut self.generator, request) {
            self.ready.push_back(response);
        }
        Ok(())
    }

    fn try_recv(&mut self) -> Option<WorkerResponse> {
        self.ready.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn init() -> WorkerRequest {
        WorkerRequest::Init {
            generator: GeneratorConfig::Flat { ground_level: 4 },
            seed: "1".to_string(),
            world_guid: "w".to_string(),
        }
    }

    #[test]
    fn test_thread_worker_round_trip() {
        let mut worker = GenerationWorker::spawn().unwrap();
        worker.send(init()).unwrap();
        worker.send(WorkerRequest::Generate(ChunkAddr::new(2, 0, -3))).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut generated = None;
        while generated.is_none() && Instant::now() < deadline {
            match worker.try_recv() {
                Some(WorkerResponse::BlocksGenerated { addr, blocks }) => {
                    generated = Some((addr, blocks));
                }
                Some(WorkerResponse::Inited { world_guid }) => assert_eq!(world_guid, "w"),
                None => std::thread::sleep(Duration::from_millis(1)),
            }
        }
        let (addr, blocks) = generated.expect("worker should answer");
        assert_eq!(addr, ChunkAddr::new(2, 0, -3));
        assert_eq!(blocks.addr, addr);
    }

    #[test]
    fn test_generate_before_init_is_ignored() {
        let mut inline = InlineGeneration::new();
        inline.send(WorkerRequest::Generate(ChunkAddr::new(0, 0, 0))).unwrap();
        assert!(inline.try_recv().is_none());
        assert_eq!(inline.requests.len(), 1);
    }

    #[test]
    fn test_inline_answers_in_order() {
        let mut inline = InlineGeneration::new();
        inline.send(init()).unwrap();
        inline.send(WorkerRequest::Generate(ChunkAddr::new(1, 0, 0))).unwrap();
        inline.send(WorkerRequest::Generate(ChunkAddr::new(2, 0, 0))).unwrap();
        assert!(matches!(inline.try_recv(), Some(WorkerResponse::Inited { .. })));
        let addrs: Vec<_> = std::iter::from_fn(|| inline.try_recv())
            .filter_map(|r| match r {
                WorkerResponse::BlocksGenerated { addr, .. } => Some(addr),
                WorkerResponse::Inited { .. } => None,
            })
            .collect();
        assert_eq!(addrs, vec![ChunkAddr::new(1, 0, 0), ChunkAddr::new(2, 0, 0)]);
    }

    #[test]
    fn test_stalled_inline_never_answers() {
        let mut inline = InlineGeneration::new();
        inline.send(init()).unwrap();
        inline.try_recv();
        inline.stalled = true;
        inline.send(WorkerRequest::Generate(ChunkAddr::new(1, 0, 0))).unwrap();
        assert!(inline.try_recv().is_none());
    }
}
