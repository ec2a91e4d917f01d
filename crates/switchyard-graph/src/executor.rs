use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{watch, Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use switchyard_actions::ActionRegistry;
use switchyard_core::config::ExecutorConfig;
use switchyard_core::error::{Result, SwitchyardError};
use switchyard_core::types::{ActionConfig, ActionResult, EngineEvent};
use switchyard_core::{EventBus, ExecutionContext};

use crate::compiler::LoadedGraph;
use crate::definition::GraphDefinition;
use crate::mailbox::{Delivery, Mailbox};
use crate::metrics::ExecutionMetrics;

/// Context key under which a node sees the messages queued on its ports.
pub const INPUTS_KEY: &str = "inputs";

/// Lifecycle state of one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    Running,
    Paused,
    Cancelled,
    Completed,
    Failed,
}

impl ExecutionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Completed | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Cancelled => "cancelled",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

/// Per-execution state of one graph node.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInstance {
    pub node_id: String,
    pub component: String,
    pub status: NodeStatus,
    pub inbox: Mailbox,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub invocations: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_duration_ms: Option<u64>,
}

/// One run of a loaded graph.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphExecution {
    pub id: String,
    pub graph_id: String,
    pub state: ExecutionState,
    pub instances: BTreeMap<String, NodeInstance>,
    pub metrics: ExecutionMetrics,
    pub context: ExecutionContext,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl GraphExecution {
    fn skip_pending(&mut self) {
        for instance in self.instances.values_mut() {
            if matches!(instance.status, NodeStatus::Pending | NodeStatus::Running) {
                instance.status = NodeStatus::Skipped;
            }
        }
    }
}

/// What `run_execution` hands back once the walk ends.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionReport {
    pub execution_id: String,
    pub graph_id: String,
    pub state: ExecutionState,
    /// Output of every node that produced one.
    pub outputs: BTreeMap<String, Value>,
    pub context: ExecutionContext,
    pub metrics: ExecutionMetrics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphSummary {
    pub id: String,
    pub name: String,
    pub version: String,
    pub nodes: usize,
    pub loaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionSummary {
    pub id: String,
    pub graph_id: String,
    pub state: ExecutionState,
    pub started_at: DateTime<Utc>,
}

struct ExecutionHandle {
    graph_id: String,
    inner: Mutex<GraphExecution>,
    /// Mirrors `inner.state` so the run loop can wait on pause.
    state: watch::Sender<ExecutionState>,
    cancel: CancellationToken,
    driven: AtomicBool,
}

impl ExecutionHandle {
    fn current(&self) -> ExecutionState {
        *self.state.borrow()
    }

    fn set_state(&self, exec: &mut GraphExecution, state: ExecutionState) {
        exec.state = state;
        self.state.send_replace(state);
    }
}

/// Owns loaded graphs and live executions.
///
/// All operations take `&self`; the tables sit behind `tokio::sync` locks so
/// the executor can be shared in an `Arc` between the run loop and control
/// calls (pause, resume, stop, inject).
pub struct GraphExecutor {
    registry: Arc<ActionRegistry>,
    settings: ExecutorConfig,
    events: Arc<EventBus>,
    graphs: RwLock<HashMap<String, Arc<LoadedGraph>>>,
    executions: RwLock<HashMap<String, Arc<ExecutionHandle>>>,
}

impl GraphExecutor {
    pub fn new(registry: Arc<ActionRegistry>, settings: ExecutorConfig) -> Self {
        Self {
            registry,
            settings,
            events: Arc::new(EventBus::default()),
            graphs: RwLock::new(HashMap::new()),
            executions: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    pub fn events(&self) -> Arc<EventBus> {
        self.events.clone()
    }

    // ── Graphs ──────────────────────────────────────────────────

    /// Compile and admit a graph. Returns its fresh id.
    pub async fn load_graph(&self, definition: GraphDefinition) -> Result<String> {
        let graph = LoadedGraph::new(definition)?;
        let id = graph.id.clone();
        info!(
            graph_id = %id,
            name = %graph.definition.name,
            nodes = graph.topology.sorted.len(),
            "Graph loaded"
        );
        self.events.publish(EngineEvent::GraphLoaded {
            graph_id: id.clone(),
            name: graph.definition.name.clone(),
            nodes: graph.topology.sorted.len(),
        });
        self.graphs.write().await.insert(id.clone(), Arc::new(graph));
        Ok(id)
    }

    /// Cancel and drop every execution of the graph, then discard it.
    /// Returns how many executions were removed.
    pub async fn unload_graph(&self, graph_id: &str) -> Result<usize> {
        if !self.graphs.read().await.contains_key(graph_id) {
            return Err(SwitchyardError::GraphNotFound(graph_id.to_string()));
        }

        let doomed: Vec<(String, Arc<ExecutionHandle>)> = {
            let mut executions = self.executions.write().await;
            let ids: Vec<String> = executions
                .iter()
                .filter(|(_, h)| h.graph_id == graph_id)
                .map(|(id, _)| id.clone())
                .collect();
            ids.into_iter()
                .filter_map(|id| executions.remove(&id).map(|h| (id, h)))
                .collect()
        };

        for (id, handle) in &doomed {
            let mut exec = handle.inner.lock().await;
            if !exec.state.is_terminal() {
                self.cancel_locked(id, handle, &mut exec);
            }
        }

        self.graphs.write().await.remove(graph_id);
        info!(graph_id, executions = doomed.len(), "Graph unloaded");
        self.events.publish(EngineEvent::GraphUnloaded {
            graph_id: graph_id.to_string(),
            cancelled_executions: doomed.len(),
        });
        Ok(doomed.len())
    }

    pub async fn graph(&self, graph_id: &str) -> Result<Arc<LoadedGraph>> {
        self.graphs
            .read()
            .await
            .get(graph_id)
            .cloned()
            .ok_or_else(|| SwitchyardError::GraphNotFound(graph_id.to_string()))
    }

    pub async fn list_graphs(&self) -> Vec<GraphSummary> {
        let mut out: Vec<GraphSummary> = self
            .graphs
            .read()
            .await
            .values()
            .map(|g| GraphSummary {
                id: g.id.clone(),
                name: g.definition.name.clone(),
                version: g.definition.version.clone(),
                nodes: g.topology.sorted.len(),
                loaded_at: g.loaded_at,
            })
            .collect();
        out.sort_by(|a, b| a.loaded_at.cmp(&b.loaded_at).then_with(|| a.id.cmp(&b.id)));
        out
    }

    // ── Execution lifecycle ─────────────────────────────────────

    /// Allocate a running execution of `graph_id`.
    ///
    /// Fails with `ExecutionLimit` when the number of running or paused
    /// executions has reached the configured ceiling.
    pub async fn start_execution(&self, graph_id: &str, context: ExecutionContext) -> Result<String> {
        let graph = self.graph(graph_id).await?;

        let mut executions = self.executions.write().await;
        let active = executions
            .values()
            .filter(|h| !h.current().is_terminal())
            .count();
        if active >= self.settings.max_concurrent_executions {
            warn!(graph_id, active, "Concurrent execution limit reached");
            return Err(SwitchyardError::ExecutionLimit(
                self.settings.max_concurrent_executions,
            ));
        }

        let id = uuid::Uuid::new_v4().to_string();
        let instances = graph
            .topology
            .sorted
            .iter()
            .filter_map(|node_id| graph.node(node_id))
            .map(|node| {
                (
                    node.id.clone(),
                    NodeInstance {
                        node_id: node.id.clone(),
                        component: node.component.clone(),
                        status: NodeStatus::Pending,
                        inbox: Mailbox::new(self.settings.max_queue_depth),
                        output: None,
                        error: None,
                        invocations: 0,
                        last_duration_ms: None,
                    },
                )
            })
            .collect();

        let execution = GraphExecution {
            id: id.clone(),
            graph_id: graph_id.to_string(),
            state: ExecutionState::Running,
            instances,
            metrics: ExecutionMetrics::new(),
            context,
            started_at: Utc::now(),
            completed_at: None,
            error: None,
        };
        let (state, _) = watch::channel(ExecutionState::Running);
        executions.insert(
            id.clone(),
            Arc::new(ExecutionHandle {
                graph_id: graph_id.to_string(),
                inner: Mutex::new(execution),
                state,
                cancel: CancellationToken::new(),
                driven: AtomicBool::new(false),
            }),
        );

        info!(execution_id = %id, graph_id, "Execution started");
        self.events.publish(EngineEvent::ExecutionStarted {
            execution_id: id.clone(),
            graph_id: graph_id.to_string(),
        });
        Ok(id)
    }

    /// Queue a message on a node's input port. Only legal while running.
    pub async fn inject_message(
        &self,
        execution_id: &str,
        node_id: &str,
        port: &str,
        value: Value,
    ) -> Result<()> {
        let handle = self.handle(execution_id).await?;
        let mut exec = handle.inner.lock().await;
        if exec.state != ExecutionState::Running {
            return Err(SwitchyardError::InvalidExecutionState {
                execution_id: execution_id.to_string(),
                current: exec.state.to_string(),
                attempted: "inject a message into",
            });
        }
        self.deliver(&mut exec, node_id, port, value)?;
        debug!(execution_id, node_id, port, "Message injected");
        self.events.publish(EngineEvent::MessageInjected {
            execution_id: execution_id.to_string(),
            node_id: node_id.to_string(),
            port: port.to_string(),
        });
        Ok(())
    }

    pub async fn pause_execution(&self, execution_id: &str) -> Result<()> {
        let handle = self.handle(execution_id).await?;
        let mut exec = handle.inner.lock().await;
        if exec.state != ExecutionState::Running {
            return Err(SwitchyardError::InvalidExecutionState {
                execution_id: execution_id.to_string(),
                current: exec.state.to_string(),
                attempted: "pause",
            });
        }
        handle.set_state(&mut exec, ExecutionState::Paused);
        exec.metrics.touch();
        info!(execution_id, "Execution paused");
        self.events.publish(EngineEvent::ExecutionPaused {
            execution_id: execution_id.to_string(),
        });
        Ok(())
    }

    pub async fn resume_execution(&self, execution_id: &str) -> Result<()> {
        let handle = self.handle(execution_id).await?;
        let mut exec = handle.inner.lock().await;
        if exec.state != ExecutionState::Paused {
            return Err(SwitchyardError::InvalidExecutionState {
                execution_id: execution_id.to_string(),
                current: exec.state.to_string(),
                attempted: "resume",
            });
        }
        handle.set_state(&mut exec, ExecutionState::Running);
        exec.metrics.touch();
        info!(execution_id, "Execution resumed");
        self.events.publish(EngineEvent::ExecutionResumed {
            execution_id: execution_id.to_string(),
        });
        Ok(())
    }

    /// Cancel an execution. Idempotent; completed and failed executions are
    /// left as they are. Returns the state after the call.
    pub async fn stop_execution(&self, execution_id: &str) -> Result<ExecutionState> {
        let handle = self.handle(execution_id).await?;
        let mut exec = handle.inner.lock().await;
        if !exec.state.is_terminal() {
            self.cancel_locked(execution_id, &handle, &mut exec);
        }
        Ok(exec.state)
    }

    fn cancel_locked(&self, execution_id: &str, handle: &ExecutionHandle, exec: &mut GraphExecution) {
        handle.set_state(exec, ExecutionState::Cancelled);
        exec.completed_at = Some(Utc::now());
        exec.metrics.touch();
        handle.cancel.cancel();
        info!(execution_id, "Execution cancelled");
        self.events.publish(EngineEvent::ExecutionCancelled {
            execution_id: execution_id.to_string(),
        });
    }

    /// Drop a finished execution from the live table.
    pub async fn remove_execution(&self, execution_id: &str) -> Result<()> {
        let mut executions = self.executions.write().await;
        let handle = executions
            .get(execution_id)
            .ok_or_else(|| SwitchyardError::ExecutionNotFound(execution_id.to_string()))?;
        let state = handle.current();
        if !state.is_terminal() {
            return Err(SwitchyardError::InvalidExecutionState {
                execution_id: execution_id.to_string(),
                current: state.to_string(),
                attempted: "remove",
            });
        }
        executions.remove(execution_id);
        Ok(())
    }

    /// Snapshot of an execution.
    pub async fn execution(&self, execution_id: &str) -> Result<GraphExecution> {
        let handle = self.handle(execution_id).await?;
        let exec = handle.inner.lock().await;
        Ok(exec.clone())
    }

    pub async fn metrics(&self, execution_id: &str) -> Result<ExecutionMetrics> {
        let handle = self.handle(execution_id).await?;
        let exec = handle.inner.lock().await;
        Ok(exec.metrics.clone())
    }

    pub async fn list_executions(&self) -> Vec<ExecutionSummary> {
        let handles: Vec<Arc<ExecutionHandle>> =
            self.executions.read().await.values().cloned().collect();
        let mut out = Vec::with_capacity(handles.len());
        for handle in handles {
            let exec = handle.inner.lock().await;
            out.push(ExecutionSummary {
                id: exec.id.clone(),
                graph_id: exec.graph_id.clone(),
                state: exec.state,
                started_at: exec.started_at,
            });
        }
        out.sort_by(|a, b| a.started_at.cmp(&b.started_at).then_with(|| a.id.cmp(&b.id)));
        out
    }

    // ── Running ─────────────────────────────────────────────────

    /// Start an execution and drive it to the end.
    pub async fn execute(&self, graph_id: &str, context: ExecutionContext) -> Result<ExecutionReport> {
        let id = self.start_execution(graph_id, context).await?;
        self.run_execution(&id).await
    }

    /// Walk the execution's nodes in topological order.
    ///
    /// Each node's queued messages are exposed as `context.inputs`, its
    /// component is dispatched with the node config as params, and a
    /// successful output is forwarded along outgoing edges. The first failed
    /// node fails the execution and skips the rest. Waits while paused;
    /// `stop_execution` interrupts the node in flight.
    ///
    /// Authentication failures mark the execution failed and come back as
    /// `Err`.
    pub async fn run_execution(&self, execution_id: &str) -> Result<ExecutionReport> {
        let handle = self.handle(execution_id).await?;
        let graph = self.graph(&handle.graph_id).await?;

        {
            let exec = handle.inner.lock().await;
            if exec.state.is_terminal() {
                return Err(SwitchyardError::InvalidExecutionState {
                    execution_id: execution_id.to_string(),
                    current: exec.state.to_string(),
                    attempted: "run",
                });
            }
            if handle.driven.swap(true, Ordering::SeqCst) {
                return Err(SwitchyardError::InvalidExecutionState {
                    execution_id: execution_id.to_string(),
                    current: format!("{} (already being run)", exec.state),
                    attempted: "run",
                });
            }
        }

        let start = Instant::now();
        let node_timeout = Duration::from_millis(self.settings.node_timeout_ms);

        for node_id in &graph.topology.sorted {
            if !self.wait_while_paused(&handle).await {
                break;
            }
            let Some(node) = graph.node(node_id) else {
                continue;
            };

            // Claim the node: drain its inbox into a working copy of the context.
            let mut ctx = {
                let mut exec = handle.inner.lock().await;
                if exec.state != ExecutionState::Running {
                    break;
                }
                let Some(instance) = exec.instances.get_mut(node_id) else {
                    continue;
                };
                instance.status = NodeStatus::Running;
                instance.invocations += 1;
                let drained = instance.inbox.drain();
                let received: usize = drained.values().map(Vec::len).sum();
                exec.metrics.record_processed(received);
                let mut ctx = exec.context.clone();
                ctx.set(INPUTS_KEY, inputs_value(drained));
                ctx
            };

            debug!(execution_id, node_id = %node_id, component = %node.component, "Running node");
            self.events.publish(EngineEvent::NodeStarted {
                execution_id: execution_id.to_string(),
                node_id: node_id.clone(),
                component: node.component.clone(),
            });

            let config = ActionConfig {
                action_type: node.component.clone(),
                id: Some(node.id.clone()),
                params: node.config.clone(),
            };
            let node_start = Instant::now();
            let outcome = tokio::select! {
                biased;
                _ = handle.cancel.cancelled() => None,
                r = tokio::time::timeout(node_timeout, self.registry.dispatch(&config, &mut ctx)) => Some(r),
            };
            let elapsed = node_start.elapsed().as_millis() as u64;

            let Some(outcome) = outcome else {
                debug!(execution_id, node_id = %node_id, "Node interrupted by stop");
                break;
            };

            let result = match outcome {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => {
                    // Authentication failure: fail the execution and surface it.
                    let mut exec = handle.inner.lock().await;
                    exec.metrics.record_invocation(&node.component, elapsed, false);
                    if let Some(instance) = exec.instances.get_mut(node_id) {
                        instance.status = NodeStatus::Failed;
                        instance.error = Some(e.to_string());
                        instance.last_duration_ms = Some(elapsed);
                    }
                    self.fail_locked(&handle, &mut exec, format!("Node '{}' failed: {}", node_id, e));
                    return Err(e);
                }
                Err(_) => ActionResult::failure(
                    node.component.clone(),
                    format!("Node timed out after {}ms", self.settings.node_timeout_ms),
                    elapsed,
                )
                .with_id(Some(node.id.clone())),
            };

            self.events.publish(EngineEvent::NodeFinished {
                execution_id: execution_id.to_string(),
                node_id: node_id.clone(),
                success: result.success,
                duration_ms: elapsed,
            });

            let mut exec = handle.inner.lock().await;
            exec.metrics.record_invocation(&node.component, elapsed, result.success);
            if let Some(instance) = exec.instances.get_mut(node_id) {
                instance.last_duration_ms = Some(elapsed);
                instance.output = result.output.clone();
                instance.error = result.error.clone();
                instance.status = if result.success {
                    NodeStatus::Completed
                } else {
                    NodeStatus::Failed
                };
            }

            if !result.success {
                let message = format!(
                    "Node '{}' failed: {}",
                    node_id,
                    result.error.as_deref().unwrap_or("unknown error")
                );
                warn!(execution_id, node_id = %node_id, error = %message, "Node failed");
                if !exec.state.is_terminal() {
                    self.fail_locked(&handle, &mut exec, message);
                }
                break;
            }

            // Context writes made by the node persist for downstream nodes.
            ctx.remove(INPUTS_KEY);
            exec.context = ctx;

            let output = result.output.unwrap_or(Value::Null);
            for edge in graph.definition.outgoing(node_id) {
                let value = port_value(&output, edge.source_port());
                let target = edge.target.node.clone();
                let port = edge.target_port().to_string();
                self.deliver(&mut exec, &target, &port, value)?;
                exec.metrics.record_emitted();
            }
        }

        // A pause that lands during the last node holds completion until resume.
        self.wait_while_paused(&handle).await;

        let mut exec = handle.inner.lock().await;
        if exec.state == ExecutionState::Running {
            handle.set_state(&mut exec, ExecutionState::Completed);
            exec.completed_at = Some(Utc::now());
            let duration_ms = start.elapsed().as_millis() as u64;
            info!(execution_id, duration_ms, "Execution completed");
            self.events.publish(EngineEvent::ExecutionCompleted {
                execution_id: execution_id.to_string(),
                duration_ms,
            });
        }
        exec.skip_pending();

        Ok(ExecutionReport {
            execution_id: exec.id.clone(),
            graph_id: exec.graph_id.clone(),
            state: exec.state,
            outputs: exec
                .instances
                .iter()
                .filter_map(|(id, i)| i.output.clone().map(|o| (id.clone(), o)))
                .collect(),
            context: exec.context.clone(),
            metrics: exec.metrics.clone(),
            error: exec.error.clone(),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// Block while the execution is paused. Returns `false` once it is no
    /// longer running.
    async fn wait_while_paused(&self, handle: &ExecutionHandle) -> bool {
        let mut rx = handle.state.subscribe();
        let unpaused = async move {
            rx.wait_for(|s| *s != ExecutionState::Paused)
                .await
                .map(|s| *s)
        };
        tokio::select! {
            _ = handle.cancel.cancelled() => false,
            state = unpaused => matches!(state, Ok(ExecutionState::Running)),
        }
    }

    fn fail_locked(&self, handle: &ExecutionHandle, exec: &mut GraphExecution, message: String) {
        error!(execution_id = %exec.id, error = %message, "Execution failed");
        handle.set_state(exec, ExecutionState::Failed);
        exec.completed_at = Some(Utc::now());
        exec.error = Some(message.clone());
        exec.skip_pending();
        self.events.publish(EngineEvent::ExecutionFailed {
            execution_id: exec.id.clone(),
            error: message,
        });
    }

    /// Queue `value` on a node port, counting backpressure.
    fn deliver(&self, exec: &mut GraphExecution, node_id: &str, port: &str, value: Value) -> Result<()> {
        let execution_id = exec.id.clone();
        let instance = exec
            .instances
            .get_mut(node_id)
            .ok_or_else(|| SwitchyardError::NodeNotFound {
                execution_id: execution_id.clone(),
                node: node_id.to_string(),
            })?;
        match instance.inbox.push(port, value) {
            Delivery::Queued { .. } => exec.metrics.touch(),
            Delivery::DroppedOldest { depth } => {
                warn!(execution_id = %execution_id, node_id, port, depth, "Input queue full, dropped oldest message");
                exec.metrics.record_backpressure();
                self.events.publish(EngineEvent::Backpressure {
                    execution_id,
                    node_id: node_id.to_string(),
                    port: port.to_string(),
                    depth,
                });
            }
        }
        Ok(())
    }

    async fn handle(&self, execution_id: &str) -> Result<Arc<ExecutionHandle>> {
        self.executions
            .read()
            .await
            .get(execution_id)
            .cloned()
            .ok_or_else(|| SwitchyardError::ExecutionNotFound(execution_id.to_string()))
    }
}

/// `port -> value`, or `port -> [values]` when several messages were queued.
fn inputs_value(drained: BTreeMap<String, Vec<Value>>) -> Value {
    let map = drained
        .into_iter()
        .map(|(port, mut values)| {
            let value = if values.len() == 1 {
                values.pop().unwrap_or(Value::Null)
            } else {
                Value::Array(values)
            };
            (port, value)
        })
        .collect();
    Value::Object(map)
}

/// The field named after the source port if the output has one, otherwise
/// the whole output.
fn port_value(output: &Value, port: &str) -> Value {
    output
        .as_object()
        .and_then(|o| o.get(port))
        .cloned()
        .unwrap_or_else(|| output.clone())
}
