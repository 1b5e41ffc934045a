// src/engine/manager.rs

//! Spawn manager (delegated strategy).
//!
//! All fork/exec-style work is confined to one long-lived, single-purpose
//! thread reached only through a request channel: the host's own threads
//! never perform a spawn syscall, so no host lock state can leak into child
//! creation. The thread drives the same drain/finalize loop as a poller
//! worker, on a private current-thread runtime.
//!
//! If the thread or its runtime cannot be created, the engine as a whole is
//! unusable; that failure is fatal and surfaced synchronously from engine
//! construction.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::command::environment::force_locale_override;
use crate::engine::dispatch::CallbackExecutor;
use crate::engine::poller::{PollerRequest, PollerWorker};
use crate::errors::EngineError;

pub(crate) struct SpawnManager {
    tx: mpsc::UnboundedSender<PollerRequest>,
}

impl SpawnManager {
    /// Create the manager thread. Called once per engine.
    pub(crate) fn start(
        executor: Arc<dyn CallbackExecutor>,
        poll_interval: Duration,
    ) -> Result<Self, EngineError> {
        let (tx, rx) = mpsc::unbounded_channel();

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(EngineError::ManagerRuntime)?;

        std::thread::Builder::new()
            .name("spawn-manager".to_string())
            .spawn(move || {
                debug!("spawn manager thread started");
                let worker = PollerWorker::new(0, rx, executor, poll_interval);
                runtime.block_on(worker.run());
                debug!("spawn manager thread finished");
            })
            .map_err(EngineError::ManagerInit)?;

        Ok(Self { tx })
    }

    /// Queue a spawn request for the manager thread. Never blocks.
    ///
    /// The locale override is pinned here, after all caller overrides, so
    /// numeric output parsing stays locale-independent no matter what the
    /// caller put in the environment.
    pub(crate) fn register(&self, mut req: PollerRequest) {
        force_locale_override(&mut req.environment);

        if self.tx.send(req).is_err() {
            error!("spawn manager is gone; dropping request");
        }
    }
}
