//! # nerva-core
//!
//! nerva-core is the engine part of the nerva machine learning library.
//! It assembles directed acyclic graphs of primitive operations into
//! composite graphs that can be evaluated forward and differentiated
//! backward, compiling them lazily into an executable network only when
//! the requested output or gradient-root configuration changes.
//! The executable network itself is an opaque collaborator behind
//! [ExecutionBackend](network::ExecutionBackend); nerva-cpu provides a
//! reference implementation.

#![forbid(unsafe_code)]
#![forbid(rustdoc::broken_intra_doc_links)]
#![forbid(rustdoc::private_intra_doc_links)]
#![forbid(missing_docs)]
#![forbid(rustdoc::missing_crate_level_docs)]
#![forbid(rustdoc::private_doc_tests)]
#![forbid(rustdoc::invalid_codeblock_attributes)]
#![forbid(rustdoc::invalid_html_tags)]
#![forbid(rustdoc::invalid_rust_codeblocks)]
#![forbid(rustdoc::bare_urls)]

/// See [Axis](axis::Axis)
pub mod axis;
/// See [Composite](composite::Composite)
pub mod composite;
/// See [Device](device::Device)
pub mod device;
/// See [Dictionary](dict::Dictionary)
pub mod dict;
/// See [DType](dtype::DType)
pub mod dtype;
/// See [NervaError](error::NervaError)
pub mod error;
/// See [Graph](graph::Graph)
pub mod graph;
/// Serialization of composite graphs to and from [Dictionary](dict::Dictionary)
pub mod io;
/// See [NetworkPlan](network::NetworkPlan)
pub mod network;
/// See [Op](node::Op)
pub mod node;
/// See [Scalar](scalar::Scalar)
pub mod scalar;
/// See [Session](session::Session)
pub mod session;
/// See [Shape](shape::Shape)
pub mod shape;
/// See [traverse](traverse::traverse)
pub mod traverse;
/// See [Value](value::Value)
pub mod value;
/// See [Variable](variable::Variable)
pub mod variable;
