//! Where a client runs its synchronous engine calls.

use std::future;
use std::sync::Arc;

use quiver_core::{CommandError, CommandResult, DatabaseCommands, DispatchMode};
use tokio::runtime::Handle;
use tracing::{error, trace};

use crate::contract::CommandFuture;

/// Runs engine calls according to a [`DispatchMode`] and wraps their
/// outcome in a [`CommandFuture`].
///
/// With [`DispatchMode::Inline`] the call completes before `run` returns
/// and the future is already resolved, fault included. With
/// [`DispatchMode::Blocking`] the call is handed to the tokio blocking pool
/// and the future resolves when it finishes.
#[derive(Clone)]
pub struct Dispatcher {
    engine: Arc<dyn DatabaseCommands>,
    mode: DispatchMode,
}

impl Dispatcher {
    pub fn new(engine: Arc<dyn DatabaseCommands>, mode: DispatchMode) -> Self {
        Self { engine, mode }
    }

    pub fn engine(&self) -> &Arc<dyn DatabaseCommands> {
        &self.engine
    }

    pub fn mode(&self) -> DispatchMode {
        self.mode
    }

    /// Same mode, different engine.
    pub fn with_engine(&self, engine: Arc<dyn DatabaseCommands>) -> Self {
        Self::new(engine, self.mode)
    }

    pub fn run<'a, T, F>(&'a self, call: F) -> CommandFuture<'a, T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn DatabaseCommands) -> CommandResult<T> + Send + 'static,
    {
        match self.mode {
            DispatchMode::Inline => resolved(call(self.engine.as_ref())),
            DispatchMode::Blocking => {
                if Handle::try_current().is_err() {
                    return resolved(Err(CommandError::Worker(
                        "blocking dispatch needs a tokio runtime".to_string(),
                    )));
                }
                let engine = Arc::clone(&self.engine);
                let handle = tokio::task::spawn_blocking(move || call(engine.as_ref()));
                Box::pin(async move {
                    match handle.await {
                        Ok(result) => result,
                        Err(err) if err.is_cancelled() => {
                            trace!("blocking engine call canceled");
                            Err(CommandError::Canceled)
                        }
                        Err(err) => {
                            error!(error = %err, "blocking engine call panicked");
                            Err(CommandError::Worker(err.to_string()))
                        }
                    }
                })
            }
        }
    }
}

/// A future that is complete before anyone polls it.
pub fn resolved<'a, T: Send + 'a>(result: CommandResult<T>) -> CommandFuture<'a, T> {
    Box::pin(future::ready(result))
}
