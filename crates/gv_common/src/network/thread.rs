//! The network thread: a dedicated OS thread running a single-threaded Tokio runtime, so
//! connection bookkeeping and transport polling never contend with the engine thread's fixed
//! timestep or the mesh worker pool.

use std::future::Future;
use std::pin::Pin;
use std::thread::JoinHandle;

use futures::FutureExt;
use gv_schemas::GameSide;
use thiserror::Error;
use tokio::task::LocalSet;

use crate::prelude::*;

/// A handle to a running network thread, used to schedule work onto it from other threads.
/// `State` is accessible (via `Rc<RefCell<State>>`, since it never leaves its own thread) from
/// every command scheduled here.
pub struct NetworkThread<State> {
    side: GameSide,
    tokio_thread: JoinHandle<()>,
    channel: AsyncUnboundedSender<NetworkThreadCommand<State>>,
}

/// Implemented by a network thread's state type to define its shutdown sequence.
pub trait NetworkThreadState: 'static {
    /// Performs a clean shutdown of the network subsystem (closing transports, flushing queues).
    fn shutdown(this: Rc<RefCell<Self>>) -> impl Future<Output = ()>;
}

type NetworkThreadFunction<State> = dyn FnOnce(&Rc<RefCell<State>>) + Send + 'static;
type NetworkThreadAsyncFuture<'state, Output = ()> = Pin<Box<dyn Future<Output = Output> + 'state>>;
type NetworkThreadAsyncFunction<State> =
    dyn for<'state> FnOnce(&'state Rc<RefCell<State>>) -> NetworkThreadAsyncFuture<'state> + Send + 'static;

enum NetworkThreadCommand<State> {
    Shutdown(AsyncOneshotSender<()>),
    RunInLocalSet(Box<NetworkThreadFunction<State>>),
    RunAsyncInLocalSet(Box<NetworkThreadAsyncFunction<State>>),
}

/// Errors from scheduling a function to run on the network thread.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Error)]
pub enum NetworkThreadCommandError {
    /// The network thread has already shut down or suffered an irrecoverable error.
    #[error("{0:?} network thread has already terminated")]
    NetworkThreadTerminated(GameSide),
}

impl<State: NetworkThreadState> NetworkThread<State> {
    /// Spawns a new network thread and Tokio runtime for the given side.
    pub fn new(side: GameSide, state: impl (FnOnce() -> State) + Send + 'static) -> Self {
        let (net_tx, net_rx) = async_unbounded_channel();
        let network_rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .thread_name(format!("Glasswing {side:?} Network Worker"))
            .build()
            .expect("could not initialize the tokio runtime for the network thread");
        let tokio_thread = std::thread::Builder::new()
            .name(format!("Glasswing {side:?} Network Thread"))
            .stack_size(8 * 1024 * 1024)
            .spawn(move || Self::thread_main(network_rt, net_rx, state))
            .expect("could not create the network thread");

        Self {
            side,
            tokio_thread,
            channel: net_tx,
        }
    }

    /// The side this thread was created for.
    pub fn side(&self) -> GameSide {
        self.side
    }

    /// Whether the network thread is still alive and accepting commands.
    pub fn is_alive(&self) -> bool {
        (!self.tokio_thread.is_finished()) && !self.channel.is_closed()
    }

    /// Shuts down the network thread and waits for it to cleanly exit. A no-op if already down.
    pub fn sync_shutdown(&self) {
        let (tx, rx) = async_oneshot_channel();
        let _ = self.channel.send(NetworkThreadCommand::Shutdown(tx));
        let _ = rx.blocking_recv();
    }

    /// Runs `function` on the network thread.
    pub fn exec<F: FnOnce(&Rc<RefCell<State>>) + Send + 'static>(
        &self,
        function: F,
    ) -> Result<(), NetworkThreadCommandError> {
        self.exec_boxed(Box::new(function))
    }

    /// Runs the future returned by `function` to completion on the network thread.
    pub fn exec_async<
        F: (for<'state> FnOnce(&'state Rc<RefCell<State>>) -> NetworkThreadAsyncFuture<'state>) + Send + 'static,
    >(
        &self,
        function: F,
    ) -> Result<(), NetworkThreadCommandError> {
        self.exec_async_boxed(Box::new(move |state| function(state)))
    }

    /// Runs the future returned by `function` on the network thread, then returns its result to
    /// the caller's thread.
    pub fn exec_async_await<
        Output: Send + 'static,
        F: (for<'state> FnOnce(&'state Rc<RefCell<State>>) -> NetworkThreadAsyncFuture<'state, Output>) + Send + 'static,
    >(
        &self,
        function: F,
    ) -> Result<Output, NetworkThreadCommandError> {
        let (tx, rx) = async_oneshot_channel();
        self.exec_async_boxed(Box::new(move |state| {
            Box::pin(function(state).then(move |out| async move {
                let _ = tx.send(out);
            }))
        }))?;
        rx.blocking_recv()
            .or(Err(NetworkThreadCommandError::NetworkThreadTerminated(self.side)))
    }

    /// Non-generic implementation of [`Self::exec`].
    pub fn exec_boxed(&self, function: Box<NetworkThreadFunction<State>>) -> Result<(), NetworkThreadCommandError> {
        self.channel
            .send(NetworkThreadCommand::RunInLocalSet(function))
            .or(Err(NetworkThreadCommandError::NetworkThreadTerminated(self.side)))
    }

    /// Non-generic implementation of [`Self::exec_async`].
    pub fn exec_async_boxed(
        &self,
        function: Box<NetworkThreadAsyncFunction<State>>,
    ) -> Result<(), NetworkThreadCommandError> {
        self.channel
            .send(NetworkThreadCommand::RunAsyncInLocalSet(function))
            .or(Err(NetworkThreadCommandError::NetworkThreadTerminated(self.side)))
    }

    fn thread_main(
        network_rt: tokio::runtime::Runtime,
        ctrl_rx: AsyncUnboundedReceiver<NetworkThreadCommand<State>>,
        state: impl FnOnce() -> State,
    ) {
        network_rt.block_on(async move {
            let local_set = LocalSet::new();
            local_set.run_until(Self::thread_localset_main(ctrl_rx, state)).await;
        });
    }

    async fn thread_localset_main(
        mut ctrl_rx: AsyncUnboundedReceiver<NetworkThreadCommand<State>>,
        state: impl FnOnce() -> State,
    ) {
        let state = Rc::new(RefCell::new(state()));
        while let Some(msg) = ctrl_rx.recv().await {
            match msg {
                NetworkThreadCommand::Shutdown(feedback) => {
                    ctrl_rx.close();
                    State::shutdown(state).await;
                    let _ = feedback.send(());
                    return;
                }
                NetworkThreadCommand::RunInLocalSet(lambda) => lambda(&state),
                NetworkThreadCommand::RunAsyncInLocalSet(lambda) => lambda(&state).await,
            }
        }
    }
}
