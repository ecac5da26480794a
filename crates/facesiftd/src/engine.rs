use facesift_core::{Backend, FaceMatcher, ReferenceEncoding};
use facesift_net::ImageFetcher;
use facesift_scan::{Candidate, ScanPolicy, ScanReport, Scanner};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("no face detected in reference photo")]
    NoFaceDetected,
    #[error("failed to start engine runtime: {0}")]
    Runtime(#[from] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Messages sent from request handlers to the engine thread.
enum EngineRequest {
    Encode {
        selfie: Vec<u8>,
        reply: oneshot::Sender<Result<ReferenceEncoding, EngineError>>,
    },
    Scan {
        candidates: Vec<Candidate>,
        reference: ReferenceEncoding,
        reply: oneshot::Sender<ScanReport>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
    backend: Backend,
}

impl EngineHandle {
    pub fn backend(&self) -> Backend {
        self.backend
    }

    /// Encode the face in an uploaded reference photo.
    pub async fn encode(&self, selfie: Vec<u8>) -> Result<ReferenceEncoding, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Encode { selfie, reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Scan `candidates` against `reference` under the policy for their count.
    pub async fn scan(
        &self,
        candidates: Vec<Candidate>,
        reference: ReferenceEncoding,
    ) -> Result<ScanReport, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Scan { candidates, reference, reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// The thread owns the matcher and the fetcher and drives scans on its own
/// single-threaded runtime, so requests are served strictly one at a time.
pub fn spawn_engine<F>(
    mut matcher: Box<dyn FaceMatcher + Send>,
    fetcher: F,
) -> Result<EngineHandle, EngineError>
where
    F: ImageFetcher + Send + 'static,
{
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
    let backend = matcher.backend();
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("facesift-engine".into())
        .spawn(move || {
            tracing::info!(%backend, "engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Encode { selfie, reply } => {
                        let result = run_encode(matcher.as_mut(), &selfie);
                        let _ = reply.send(result);
                    }
                    EngineRequest::Scan { candidates, reference, reply } => {
                        let policy = ScanPolicy::for_total(candidates.len());
                        let mut scanner = Scanner::new(&fetcher, matcher.as_mut());
                        let report = runtime.block_on(scanner.scan(&candidates, &reference, &policy));
                        let _ = reply.send(report);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .expect("failed to spawn engine thread");

    Ok(EngineHandle { tx, backend })
}

fn run_encode(
    matcher: &mut (dyn FaceMatcher + Send),
    selfie: &[u8],
) -> Result<ReferenceEncoding, EngineError> {
    // Any failure to encode the reference is reported as "no face" to the uploader.
    let reference = match matcher.encode_reference(selfie) {
        Ok(Some(reference)) => reference,
        Ok(None) => return Err(EngineError::NoFaceDetected),
        Err(e) => {
            tracing::warn!(error = %e, "reference encoding failed");
            return Err(EngineError::NoFaceDetected);
        }
    };
    tracing::info!(model = ?reference.model_version(), "reference face encoded");
    Ok(reference)
}
