//! Screen output and input-line editing.
//!
//! - **renderer**: capability-driven control sequence output
//! - **line_editor**: width-aware editor for the bottom input line
//! - **utf8**: incremental assembly of multi-byte input
//!
//! # Screen Layout
//!
//! ```text
//! row 0          ┐
//! ...            │ log region (scrolls)
//! row lines-2    ┘
//! row lines-1    input line: "input.N> " + glyphs
//! ```

pub mod line_editor;
pub mod renderer;
pub mod utf8;

pub use line_editor::LineEditor;
pub use renderer::Renderer;
