// THEORY:
// The `EngineWorker` runs one `InspectionPipeline` off the caller's thread. It is
// an actor: the session lives inside a single background task, and every
// operation is a message carrying a `oneshot` reply channel. Requests are handled
// strictly one at a time, in arrival order.
//
// Finalize and segment calls run to completion once started. A caller that wants
// to abandon in-flight work drops (or shuts down) the worker and starts a new one.

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::config::{ColorScheme, ConflictResolution, MergeConfig, ProcessConfig};
use crate::core_modules::buffer_encoder::EncodedBuffers;
use crate::core_modules::grid_finalizer::Finalized;
use crate::core_modules::grid_merger::MasterGrid;
use crate::core_modules::segment::SegmentationResult;
use crate::core_modules::sheet_parser::ParsedSheet;
use crate::error::SessionError;
use crate::pipeline::{InspectionPipeline, InspectionReport, SessionState};

const REQUEST_QUEUE_DEPTH: usize = 16;

/// Compact description of the master grid after init/merge.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridSummary {
    pub width: usize,
    pub height: usize,
    pub nominal_thickness: f64,
    pub plate_count: usize,
}

impl From<&MasterGrid> for GridSummary {
    fn from(master: &MasterGrid) -> Self {
        Self {
            width: master.width,
            height: master.height,
            nominal_thickness: master.nominal_thickness(),
            plate_count: master.plates.len(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("engine worker has stopped")]
    Stopped,
}

type Reply<T> = oneshot::Sender<Result<T, SessionError>>;

/// Message type for the engine actor.
enum EngineRequest {
    Init {
        sheet: Box<ParsedSheet>,
        reply: Reply<GridSummary>,
    },
    Merge {
        sheet: Box<ParsedSheet>,
        merge_config: MergeConfig,
        resolution: Option<ConflictResolution>,
        reply: Reply<GridSummary>,
    },
    Finalize {
        reply: Reply<Finalized>,
    },
    Segment {
        threshold_percent: Option<f64>,
        reply: Reply<SegmentationResult>,
    },
    Encode {
        scheme: Option<ColorScheme>,
        reply: Reply<EncodedBuffers>,
    },
    Report {
        reply: Reply<InspectionReport>,
    },
    State {
        reply: oneshot::Sender<SessionState>,
    },
    Reset {
        reply: oneshot::Sender<()>,
    },
    Shutdown,
}

/// Handle to a background inspection session.
pub struct EngineWorker {
    requests: mpsc::Sender<EngineRequest>,
    task: Option<JoinHandle<()>>,
}

impl EngineWorker {
    /// Spawns the session on the blocking pool of the current tokio runtime.
    pub fn spawn(config: ProcessConfig) -> Self {
        let (requests, mut inbox) = mpsc::channel::<EngineRequest>(REQUEST_QUEUE_DEPTH);

        // The grid passes are CPU-bound, so the actor gets its own blocking thread.
        let task = tokio::task::spawn_blocking(move || {
            let mut pipeline = InspectionPipeline::new(config);
            while let Some(request) = inbox.blocking_recv() {
                if !handle_request(&mut pipeline, request) {
                    break;
                }
            }
            debug!("engine worker stopped");
        });

        Self {
            requests,
            task: Some(task),
        }
    }

    pub async fn init(&self, sheet: ParsedSheet) -> Result<GridSummary, WorkerError> {
        self.call(|reply| EngineRequest::Init {
            sheet: Box::new(sheet),
            reply,
        })
        .await
    }

    pub async fn merge(
        &self,
        sheet: ParsedSheet,
        merge_config: MergeConfig,
        resolution: Option<ConflictResolution>,
    ) -> Result<GridSummary, WorkerError> {
        self.call(|reply| EngineRequest::Merge {
            sheet: Box::new(sheet),
            merge_config,
            resolution,
            reply,
        })
        .await
    }

    pub async fn finalize(&self) -> Result<Finalized, WorkerError> {
        self.call(|reply| EngineRequest::Finalize { reply }).await
    }

    pub async fn segment(&self, threshold_percent: Option<f64>) -> Result<SegmentationResult, WorkerError> {
        self.call(|reply| EngineRequest::Segment {
            threshold_percent,
            reply,
        })
        .await
    }

    pub async fn encode(&self, scheme: Option<ColorScheme>) -> Result<EncodedBuffers, WorkerError> {
        self.call(|reply| EngineRequest::Encode { scheme, reply }).await
    }

    pub async fn report(&self) -> Result<InspectionReport, WorkerError> {
        self.call(|reply| EngineRequest::Report { reply }).await
    }

    pub async fn state(&self) -> Result<SessionState, WorkerError> {
        let (reply, response) = oneshot::channel();
        self.send(EngineRequest::State { reply }).await?;
        response.await.map_err(|_| WorkerError::Stopped)
    }

    pub async fn reset(&self) -> Result<(), WorkerError> {
        let (reply, response) = oneshot::channel();
        self.send(EngineRequest::Reset { reply }).await?;
        response.await.map_err(|_| WorkerError::Stopped)
    }

    /// Stops the actor after the requests already queued and waits for it.
    pub async fn shutdown(mut self) {
        let _ = self.requests.send(EngineRequest::Shutdown).await;
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    async fn call<T>(&self, build: impl FnOnce(Reply<T>) -> EngineRequest) -> Result<T, WorkerError> {
        let (reply, response) = oneshot::channel();
        self.send(build(reply)).await?;
        Ok(response.await.map_err(|_| WorkerError::Stopped)??)
    }

    async fn send(&self, request: EngineRequest) -> Result<(), WorkerError> {
        self.requests.send(request).await.map_err(|_| WorkerError::Stopped)
    }
}

impl Drop for EngineWorker {
    fn drop(&mut self) {
        // Best effort shutdown on drop
        if self.task.is_some() {
            let _ = self.requests.try_send(EngineRequest::Shutdown);
        }
    }
}

/// Runs one request against the session. Returns `false` on shutdown.
fn handle_request(pipeline: &mut InspectionPipeline, request: EngineRequest) -> bool {
    match request {
        EngineRequest::Init { sheet, reply } => {
            let _ = reply.send(pipeline.init(&sheet).map(GridSummary::from));
        }
        EngineRequest::Merge {
            sheet,
            merge_config,
            resolution,
            reply,
        } => {
            let _ = reply.send(pipeline.merge(&sheet, merge_config, resolution).map(GridSummary::from));
        }
        EngineRequest::Finalize { reply } => {
            let _ = reply.send(pipeline.finalize().cloned());
        }
        EngineRequest::Segment {
            threshold_percent,
            reply,
        } => {
            let _ = reply.send(pipeline.segment(threshold_percent).cloned());
        }
        EngineRequest::Encode { scheme, reply } => {
            let _ = reply.send(pipeline.encode(scheme));
        }
        EngineRequest::Report { reply } => {
            let _ = reply.send(pipeline.report());
        }
        EngineRequest::State { reply } => {
            let _ = reply.send(pipeline.state());
        }
        EngineRequest::Reset { reply } => {
            pipeline.reset();
            let _ = reply.send(());
        }
        EngineRequest::Shutdown => return false,
    }
    true
}
