//! Request/response exchange with a KNXnet/IP server.
//!
//! Every control exchange follows the same shape: build a request, register
//! for the awaited response type, send, wait with a timeout, then
//! unregister. Responses of the awaited type that belong to another
//! exchange are skipped. [`Action`] supplies the parts that differ; [`RequestResponse`]
//! drives the state machine
//!
//! ```text
//! Idle ──start──► AwaitingResponse ──┬──► Succeeded
//!                                    ├──► Failed(code)
//!                                    └──► TimedOut
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::error::{KnxError, Result};
use crate::net::Transport;
use crate::protocol::{ErrorCode, Hpai, KnxIpBody, KnxIpFrame, ServiceType};

/// Default time to wait for the response
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(1);

/// The parts of a control exchange that vary per service.
pub trait Action: Send {
    /// Request kind used in log messages
    const NAME: &'static str;

    /// Service type of the response this action waits for
    const AWAITED_RESPONSE: ServiceType;

    /// Build the request body. `local` is the local endpoint of the
    /// transport.
    fn create_request(&self, local: Hpai) -> Result<KnxIpBody>;

    /// Check whether a response of the awaited type answers this request.
    fn matches_response(&self, _response: &KnxIpBody) -> bool {
        true
    }

    /// Copy session fields out of a successful response.
    fn on_success(&mut self, _response: &KnxIpBody) {}
}

/// State of a [`RequestResponse`] exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActionState {
    /// Not started
    #[default]
    Idle,
    /// Request sent, waiting for the response
    AwaitingResponse,
    /// Response carried `E_NO_ERROR`
    Succeeded,
    /// Response carried another status code
    Failed(ErrorCode),
    /// No response within the timeout
    TimedOut,
}

impl ActionState {
    /// Check whether the exchange reached a final state.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed(_) | Self::TimedOut)
    }
}

/// Runs one [`Action`] over a transport.
#[derive(Debug)]
pub struct RequestResponse<A> {
    transport: Arc<dyn Transport>,
    action: A,
    timeout: Duration,
    state: ActionState,
}

impl<A: Action> RequestResponse<A> {
    /// Create an exchange using the default one second timeout.
    pub fn new(transport: Arc<dyn Transport>, action: A) -> Self {
        Self {
            transport,
            action,
            timeout: DEFAULT_RESPONSE_TIMEOUT,
            state: ActionState::Idle,
        }
    }

    /// Set the response timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Current state
    pub fn state(&self) -> ActionState {
        self.state
    }

    /// Check whether the exchange succeeded.
    pub fn success(&self) -> bool {
        self.state == ActionState::Succeeded
    }

    /// The action, with session fields filled in after success
    pub fn action(&self) -> &A {
        &self.action
    }

    /// Consume the exchange and return the action.
    pub fn into_action(self) -> A {
        self.action
    }

    /// Map the final state to a `Result`.
    ///
    /// # Errors
    ///
    /// `Remote(code)` after a failed exchange, `Timeout` after a timed out
    /// one and `InvalidState` if the exchange has not finished.
    pub fn outcome(&self) -> Result<()> {
        match self.state {
            ActionState::Succeeded => Ok(()),
            ActionState::Failed(code) => Err(KnxError::Remote(code)),
            ActionState::TimedOut => Err(KnxError::Timeout),
            ActionState::Idle | ActionState::AwaitingResponse => Err(KnxError::InvalidState),
        }
    }

    /// Send the request and wait for the response.
    ///
    /// The response callback is unregistered before this returns, whatever
    /// the outcome.
    ///
    /// # Errors
    ///
    /// Only local failures are errors: the request could not be built or
    /// sent. The state then returns to `Idle`. Remote failures and timeouts
    /// are reported through the returned state.
    pub async fn start(&mut self) -> Result<ActionState> {
        let (tx, mut rx) = mpsc::unbounded_channel::<KnxIpFrame>();
        let dispatcher = self.transport.dispatcher();
        let callback_id = dispatcher.register(
            &[A::AWAITED_RESPONSE],
            move |frame, _source| {
                if tx.send(frame.clone()).is_err() {
                    knx_log!(debug, "Late {} dropped", frame.body.name());
                }
            },
        );

        self.state = ActionState::AwaitingResponse;
        if let Err(e) = self.send_request().await {
            dispatcher.unregister(callback_id);
            self.state = ActionState::Idle;
            return Err(e);
        }

        let deadline = Instant::now() + self.timeout;
        let response = loop {
            match tokio::time::timeout_at(deadline, rx.recv()).await {
                Ok(Some(frame)) if self.action.matches_response(&frame.body) => break Some(frame),
                Ok(Some(frame)) => {
                    knx_log!(debug, "Skipping unrelated {}: {:?}", frame.body.name(), frame.body);
                }
                Ok(None) | Err(_) => break None,
            }
        };
        dispatcher.unregister(callback_id);

        match response {
            Some(frame) => {
                self.response_received(&frame);
            }
            None => {
                knx_log!(
                    warn,
                    "KNX bus did not respond in time to request of type '{}'",
                    A::NAME
                );
                self.state = ActionState::TimedOut;
            }
        }
        Ok(self.state)
    }

    async fn send_request(&self) -> Result<()> {
        let local = Hpai::from(self.transport.local_addr()?);
        let frame = KnxIpFrame::new(self.action.create_request(local)?);
        self.transport.send(&frame).await
    }

    /// Evaluate a response frame.
    ///
    /// Returns `false` and leaves the state untouched if the frame is not
    /// the awaited response.
    pub fn response_received(&mut self, frame: &KnxIpFrame) -> bool {
        let status = match frame.body.status_code() {
            Some(status) if frame.body.service_type() == A::AWAITED_RESPONSE => status,
            _ => {
                knx_log!(warn, "Cant understand knxipframe");
                return false;
            }
        };

        if status.is_ok() {
            knx_log!(debug, "Success: received correct answer from KNX bus: {}", status);
            self.action.on_success(&frame.body);
            self.state = ActionState::Succeeded;
        } else {
            knx_log!(
                warn,
                "Error: KNX bus responded to request of type '{}' with error in '{}': {}",
                A::NAME,
                frame.body.name(),
                status
            );
            self.state = ActionState::Failed(status);
        }
        true
    }
}
