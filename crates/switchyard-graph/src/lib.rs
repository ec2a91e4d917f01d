//! Action graphs: definitions, compilation, and execution.
//!
//! A graph is a set of nodes, each naming an action `component` with its
//! `config`, connected by port-to-port edges. The compiler validates the
//! definition and orders the nodes topologically (Kahn's algorithm); the
//! executor owns loaded graphs and live executions and walks each execution's
//! nodes in that order, dispatching every node through the action registry
//! and forwarding its output along outgoing edges.

pub mod compiler;
pub mod definition;
pub mod executor;
pub mod mailbox;
pub mod metrics;

pub use compiler::{compile, LoadedGraph, Topology};
pub use definition::{Edge, GraphDefinition, Node, PortRef};
pub use executor::{
    ExecutionReport, ExecutionState, ExecutionSummary, GraphExecution, GraphExecutor,
    GraphSummary, NodeInstance, NodeStatus,
};
pub use mailbox::{Delivery, Mailbox};
pub use metrics::ExecutionMetrics;
