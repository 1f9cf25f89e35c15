// trace — shadow geometry: triangle store, acceleration tree, segment queries

pub mod line;
pub mod store;
pub mod tree;

pub use line::{setup_trace, trace_line, TraceQuery};
pub use store::{TraceInfo, TraceStore, TraceTriangle, TraceVert, TraceWinding};
pub use tree::{TraceNode, TraceTree};
