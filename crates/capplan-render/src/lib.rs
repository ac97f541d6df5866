//! # capplan-render
//!
//! Timeline geometry and Gantt rendering for capplan planning screens.
//!
//! This crate provides:
//! - Pure timeline geometry: view ranges, cell widths, header cells, bar
//!   rectangles and the now indicator for day/week/month/year views
//! - Working-hour bar segmentation against a machine calendar
//! - A stateful HTML Gantt grid renderer
//!
//! ## Example
//!
//! ```rust
//! use capplan_render::{GanttGrid, Period};
//! use capplan_core::Task;
//! use chrono::NaiveDate;
//!
//! let mut grid = GanttGrid::new(NaiveDate::from_ymd_opt(2026, 2, 15).unwrap())
//!     .period(Period::Week)
//!     .container_width(1200.0);
//! grid.set_tasks(vec![Task::new("TI-1").in_plan(1)]);
//! let html = grid.render(None);
//! assert!(html.contains("data-task-key=\"TI-1\""));
//! ```

pub mod geometry;
pub mod grid;
pub mod segments;

pub use geometry::{
    bar_geometry, cell_width, header_cells, now_indicator_x, period_label, timeline_width,
    unit_count, view_range, BarGeometry, HeaderCell, Period, RenderError, ViewRange,
};
pub use grid::GanttGrid;
pub use segments::{working_segments, Segment};
