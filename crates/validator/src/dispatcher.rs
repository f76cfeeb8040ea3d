//! Bounded fan-out of worker calls

use compass_core::{Keypair, Task, WorkerEndpoint, WorkerId, WorkerResponse, GENERATE_METHOD};
use compass_subnet::WorkerTransport;
use futures::future::join_all;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// One worker paired with the task it should answer
pub type Assignment = (WorkerId, WorkerEndpoint, Task);

/// A task and the worker's answer, if any
pub type Dispatched = (WorkerId, Task, Option<WorkerResponse>);

/// Sends one task to each worker with at most `pool_size` calls in flight
pub struct WorkerDispatcher {
    transport: Arc<dyn WorkerTransport>,
    signer: Arc<Keypair>,
    semaphore: Arc<Semaphore>,
    pool_size: usize,
}

impl WorkerDispatcher {
    pub fn new(
        transport: Arc<dyn WorkerTransport>,
        signer: Arc<Keypair>,
        pool_size: usize,
    ) -> Self {
        let pool_size = pool_size.max(1);
        Self {
            transport,
            signer,
            semaphore: Arc::new(Semaphore::new(pool_size)),
            pool_size,
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Call every worker once and collect the answers in input order.
    ///
    /// Timeouts, transport errors, empty answers and panicked calls all
    /// yield `None` for that worker only.
    pub async fn dispatch_all(
        &self,
        assignments: Vec<Assignment>,
        timeout: Duration,
    ) -> Vec<Dispatched> {
        let mut handles = Vec::with_capacity(assignments.len());

        for (uid, endpoint, task) in assignments {
            let permit = match self.semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    warn!(uid, "Dispatch pool closed");
                    handles.push((uid, task, None));
                    continue;
                }
            };

            let transport = self.transport.clone();
            let signer = self.signer.clone();
            let prompt = task.content.clone();

            let handle = tokio::spawn(async move {
                let response =
                    call_worker(transport.as_ref(), &signer, uid, &endpoint, prompt, timeout)
                        .await;
                drop(permit);
                response
            });
            handles.push((uid, task, Some(handle)));
        }

        join_all(handles.into_iter().map(|(uid, task, handle)| async move {
            let response = match handle {
                Some(handle) => handle.await.unwrap_or_else(|e| {
                    warn!(uid, error = %e, "Worker call task failed");
                    None
                }),
                None => None,
            };
            (uid, task, response)
        }))
        .await
    }
}

async fn call_worker(
    transport: &dyn WorkerTransport,
    signer: &Keypair,
    uid: WorkerId,
    endpoint: &WorkerEndpoint,
    prompt: String,
    timeout: Duration,
) -> Option<WorkerResponse> {
    let params = json!({ "prompt": prompt });
    let call = transport.invoke(endpoint, signer, GENERATE_METHOD, params, timeout);

    match tokio::time::timeout(timeout, call).await {
        Ok(Ok(response)) if response.is_empty() => {
            debug!(uid, address = %endpoint.address, "Worker returned an empty answer");
            None
        }
        Ok(Ok(response)) => Some(response),
        Ok(Err(e)) => {
            warn!(uid, address = %endpoint.address, error = %e, "Worker call failed");
            None
        }
        Err(_) => {
            warn!(
                uid,
                address = %endpoint.address,
                timeout_ms = timeout.as_millis() as u64,
                "Worker call timed out"
            );
            None
        }
    }
}
