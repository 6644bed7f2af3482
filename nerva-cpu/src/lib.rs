//! CPU only, pure rust execution backend for nerva
//!
//! Initialize backend.
//! ```rust
//! let exec = nerva_cpu::executor();
//! ```
//!
//! Pair it with a composite graph through [Session]:
//! ```rust
//! # use nerva_core::{graph::Graph, composite::Composite, node::Op, dtype::DType};
//! # use nerva_cpu::Session;
//! # fn build() -> Result<(), nerva_cpu::NervaError> {
//! let mut g = Graph::new();
//! let x = g.input([2, 2], DType::F32, "x");
//! let y = g.apply(Op::Relu, &[x], "y")?;
//! let owner = g.var(y).owner().ok_or(nerva_cpu::NervaError::UnknownVariable(y))?;
//! let session = Session::new(Composite::new(g, owner)?, nerva_cpu::executor());
//! # let _ = session;
//! # Ok(())
//! # }
//! ```

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
#![forbid(rustdoc::unescaped_backticks)]
#![forbid(rustdoc::redundant_explicit_links)]

mod interpreter;

pub use crate::interpreter::{CpuExecutor, CpuNetwork};
pub use nerva_core::error::NervaError;
pub use nerva_core::session::Session;

/// Create new CPU executor
#[must_use]
pub fn executor() -> CpuExecutor {
    CpuExecutor::new()
}
