//! Middleware composition kernel.
//!
//! Composes an ordered list of layers over a terminal operation with onion
//! semantics: the first layer is outermost, the request flows left to right,
//! the response flows back right to left. A layer may transform the request
//! before calling `next`, transform the result after, short-circuit by
//! returning without calling `next`, or observe and rewrap an error coming
//! back from `next`.
//!
//! Work through the onion is strictly sequential for a single request; the
//! kernel never runs layers in parallel. Cancellation is dropping the
//! returned future, which aborts whatever the innermost await was doing
//! without any partial result escaping.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use veil_types::errors::VeilError;

/// One layer of the onion.
///
/// `handle` receives the request and a [`Next`] continuation for the rest of
/// the pipeline. Calling `next` more than once in a single invocation is a
/// programming error; the kernel fails the second call with
/// [`VeilError::ProtocolMisuse`] before any work happens.
#[async_trait]
pub trait Layer<Req, Res>: Send + Sync
where
    Req: Send + 'static,
    Res: Send + 'static,
{
    /// Process `request`, usually by delegating to `next` and transforming
    /// its result.
    async fn handle(&self, request: Req, next: Next<'_, Req, Res>) -> Result<Res, VeilError>;
}

/// The innermost operation the pipeline wraps, typically a backend call.
#[async_trait]
pub trait Terminal<Req, Res>: Send + Sync
where
    Req: Send + 'static,
    Res: Send + 'static,
{
    /// Perform the terminal operation.
    async fn call(&self, request: Req) -> Result<Res, VeilError>;
}

/// An ordered list of layers composed over a terminal operation.
pub struct Pipeline<Req, Res>
where
    Req: Send + 'static,
    Res: Send + 'static,
{
    layers: Vec<Arc<dyn Layer<Req, Res>>>,
    terminal: Arc<dyn Terminal<Req, Res>>,
}

impl<Req, Res> Pipeline<Req, Res>
where
    Req: Send + 'static,
    Res: Send + 'static,
{
    /// Compose `layers` (first element outermost) over `terminal`.
    pub fn new(
        layers: Vec<Arc<dyn Layer<Req, Res>>>,
        terminal: Arc<dyn Terminal<Req, Res>>,
    ) -> Self {
        Self { layers, terminal }
    }

    /// Run one request through the onion.
    pub async fn run(&self, request: Req) -> Result<Res, VeilError> {
        let next = Next {
            layers: &self.layers,
            terminal: self.terminal.as_ref(),
            invoked: AtomicBool::new(false),
        };
        next.run(request).await
    }
}

/// Continuation handed to each layer: the remaining layers plus the
/// terminal.
pub struct Next<'a, Req, Res>
where
    Req: Send + 'static,
    Res: Send + 'static,
{
    layers: &'a [Arc<dyn Layer<Req, Res>>],
    terminal: &'a dyn Terminal<Req, Res>,
    invoked: AtomicBool,
}

impl<Req, Res> Next<'_, Req, Res>
where
    Req: Send + 'static,
    Res: Send + 'static,
{
    /// Invoke the rest of the onion.
    ///
    /// The first call per layer activation proceeds; any further call fails
    /// deterministically with [`VeilError::ProtocolMisuse`] and performs no
    /// side effects.
    pub async fn run(&self, request: Req) -> Result<Res, VeilError> {
        if self.invoked.swap(true, Ordering::SeqCst) {
            return Err(VeilError::ProtocolMisuse(
                "layer invoked next more than once in a single call".to_string(),
            ));
        }

        match self.layers.split_first() {
            Some((layer, rest)) => {
                let next = Next {
                    layers: rest,
                    terminal: self.terminal,
                    invoked: AtomicBool::new(false),
                };
                layer.handle(request, next).await
            }
            None => self.terminal.call(request).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // The kernel is generic; these tests run it over plain strings.

    /// Records enter/exit events and passes the request through decorated.
    struct RecordingLayer {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Layer<String, String> for RecordingLayer {
        async fn handle(
            &self,
            request: String,
            next: Next<'_, String, String>,
        ) -> Result<String, VeilError> {
            self.log.lock().unwrap().push(format!("{}-enter", self.name));
            let result = next.run(request).await;
            self.log.lock().unwrap().push(format!("{}-exit", self.name));
            result
        }
    }

    /// Terminal that records its call and echoes the request.
    struct EchoTerminal {
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Terminal<String, String> for EchoTerminal {
        async fn call(&self, request: String) -> Result<String, VeilError> {
            self.log.lock().unwrap().push("terminal".to_string());
            Ok(format!("echo:{request}"))
        }
    }

    struct FailingTerminal;

    #[async_trait]
    impl Terminal<String, String> for FailingTerminal {
        async fn call(&self, _request: String) -> Result<String, VeilError> {
            Err(VeilError::Upstream("backend down".to_string()))
        }
    }

    fn recording_pipeline(
        names: &[&'static str],
        terminal: Arc<dyn Terminal<String, String>>,
    ) -> (Pipeline<String, String>, Arc<Mutex<Vec<String>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let layers: Vec<Arc<dyn Layer<String, String>>> = names
            .iter()
            .map(|name| {
                Arc::new(RecordingLayer {
                    name,
                    log: log.clone(),
                }) as Arc<dyn Layer<String, String>>
            })
            .collect();
        (Pipeline::new(layers, terminal), log)
    }

    // ── Onion ordering ────────────────────────────────────────

    #[tokio::test]
    async fn test_onion_order_first_layer_outermost() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let terminal = Arc::new(EchoTerminal { log: log.clone() });
        let layers: Vec<Arc<dyn Layer<String, String>>> = ["l1", "l2", "l3"]
            .iter()
            .map(|name| {
                Arc::new(RecordingLayer {
                    name,
                    log: log.clone(),
                }) as Arc<dyn Layer<String, String>>
            })
            .collect();
        let pipeline = Pipeline::new(layers, terminal);

        let result = pipeline.run("req".to_string()).await.unwrap();
        assert_eq!(result, "echo:req");
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "l1-enter", "l2-enter", "l3-enter", "terminal", "l3-exit", "l2-exit", "l1-exit"
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_pipeline_calls_terminal_directly() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline: Pipeline<String, String> =
            Pipeline::new(Vec::new(), Arc::new(EchoTerminal { log: log.clone() }));
        let result = pipeline.run("x".to_string()).await.unwrap();
        assert_eq!(result, "echo:x");
        assert_eq!(*log.lock().unwrap(), vec!["terminal"]);
    }

    // ── Short-circuit ─────────────────────────────────────────

    struct ShortCircuitLayer;

    #[async_trait]
    impl Layer<String, String> for ShortCircuitLayer {
        async fn handle(
            &self,
            _request: String,
            _next: Next<'_, String, String>,
        ) -> Result<String, VeilError> {
            Ok("short-circuit".to_string())
        }
    }

    #[tokio::test]
    async fn test_layer_can_short_circuit_without_calling_next() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::new(
            vec![Arc::new(ShortCircuitLayer) as Arc<dyn Layer<String, String>>],
            Arc::new(EchoTerminal { log: log.clone() }),
        );
        let result = pipeline.run("x".to_string()).await.unwrap();
        assert_eq!(result, "short-circuit");
        assert!(log.lock().unwrap().is_empty(), "terminal must not run");
    }

    // ── Error propagation ─────────────────────────────────────

    /// Rewraps errors flowing back out so outer layers can observe them.
    struct RewrappingLayer;

    #[async_trait]
    impl Layer<String, String> for RewrappingLayer {
        async fn handle(
            &self,
            request: String,
            next: Next<'_, String, String>,
        ) -> Result<String, VeilError> {
            match next.run(request).await {
                Ok(result) => Ok(result),
                Err(err) => Err(VeilError::Upstream(format!("observed: {err}"))),
            }
        }
    }

    #[tokio::test]
    async fn test_errors_propagate_outward_through_layers() {
        let pipeline = Pipeline::new(
            vec![Arc::new(RewrappingLayer) as Arc<dyn Layer<String, String>>],
            Arc::new(FailingTerminal),
        );
        let err = pipeline.run("x".to_string()).await.unwrap_err();
        assert!(err.to_string().contains("observed"));
        assert!(err.to_string().contains("backend down"));
    }

    #[tokio::test]
    async fn test_layer_exit_runs_even_on_error() {
        let (pipeline, log) = recording_pipeline(&["outer"], Arc::new(FailingTerminal));
        let result = pipeline.run("x".to_string()).await;
        assert!(result.is_err());
        assert_eq!(*log.lock().unwrap(), vec!["outer-enter", "outer-exit"]);
    }

    // ── Double invocation of next ─────────────────────────────

    struct DoubleCallLayer;

    #[async_trait]
    impl Layer<String, String> for DoubleCallLayer {
        async fn handle(
            &self,
            request: String,
            next: Next<'_, String, String>,
        ) -> Result<String, VeilError> {
            let first = next.run(request.clone()).await?;
            // The second call must fail, not reach the terminal again.
            match next.run(request).await {
                Ok(_) => Ok("second call unexpectedly succeeded".to_string()),
                Err(err) => Err(err),
            }
        }
    }

    #[tokio::test]
    async fn test_double_next_invocation_fails_deterministically() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::new(
            vec![Arc::new(DoubleCallLayer) as Arc<dyn Layer<String, String>>],
            Arc::new(EchoTerminal { log: log.clone() }),
        );
        let err = pipeline.run("x".to_string()).await.unwrap_err();
        assert!(matches!(err, VeilError::ProtocolMisuse(_)));
        // The terminal ran exactly once.
        assert_eq!(*log.lock().unwrap(), vec!["terminal"]);
    }

    // ── Request/response transformation ───────────────────────

    struct UppercaseRequestLayer;

    #[async_trait]
    impl Layer<String, String> for UppercaseRequestLayer {
        async fn handle(
            &self,
            request: String,
            next: Next<'_, String, String>,
        ) -> Result<String, VeilError> {
            let result = next.run(request.to_uppercase()).await?;
            Ok(format!("{result}!"))
        }
    }

    #[tokio::test]
    async fn test_layer_transforms_request_and_response() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Pipeline::new(
            vec![Arc::new(UppercaseRequestLayer) as Arc<dyn Layer<String, String>>],
            Arc::new(EchoTerminal { log }),
        );
        let result = pipeline.run("req".to_string()).await.unwrap();
        assert_eq!(result, "echo:REQ!");
    }
}
