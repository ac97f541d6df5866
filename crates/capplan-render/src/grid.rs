//! HTML Gantt grid renderer.
//!
//! Produces the planning screen's timeline as an HTML fragment: a fixed
//! task-label column next to a scrolling timeline column with header cells,
//! a repeating grid background, working-hours shading, one bar (or bar
//! segment run) per visible task and a now indicator.
//!
//! The grid is stateful: period, anchor date, tasks and calendar arrive via
//! setters and every transition invalidates the previous layout; `render`
//! always reflects the current state. Bars carry `data-task-key` attributes;
//! hosts resolve clicks through [`GanttGrid::task_by_key`] instead of any
//! global handler table.

use capplan_core::{millis_to_datetime, MachineCalendar, Task};
use chrono::{Datelike, Duration, Months, NaiveDate, NaiveDateTime};

use crate::geometry::{
    self, bar_geometry, cell_width, header_cells, now_indicator_x, timeline_width, view_range,
    Period, ViewRange,
};
use crate::segments::{working_segments, Segment};

/// Fixed header height in pixels
const HEADER_HEIGHT_PX: f64 = 60.0;

/// Stateful Gantt grid over the timeline geometry
#[derive(Clone, Debug)]
pub struct GanttGrid {
    period: Period,
    anchor: NaiveDate,
    container_width: f64,
    row_height: f64,
    show_keys_in_bars: bool,
    tasks: Vec<Task>,
    calendar: Option<MachineCalendar>,
}

impl GanttGrid {
    /// Create a grid anchored at the given date, month view, 800px container
    pub fn new(anchor: NaiveDate) -> Self {
        Self {
            period: Period::Month,
            anchor,
            container_width: 800.0,
            row_height: 60.0,
            show_keys_in_bars: true,
            tasks: Vec::new(),
            calendar: None,
        }
    }

    /// Set the initial period (builder)
    pub fn period(mut self, period: Period) -> Self {
        self.period = period;
        self
    }

    /// Set the visible container width used for cell sizing (builder)
    pub fn container_width(mut self, px: f64) -> Self {
        self.container_width = px;
        self
    }

    /// Set the task-row height (builder)
    pub fn row_height(mut self, px: f64) -> Self {
        self.row_height = px;
        self
    }

    /// Render bars without the task key caption (builder)
    pub fn hide_keys_in_bars(mut self) -> Self {
        self.show_keys_in_bars = false;
        self
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    pub fn set_period(&mut self, period: Period) {
        self.period = period;
    }

    /// Step the anchor by whole view periods (±1 day/week/month/year)
    pub fn navigate(&mut self, direction: i32) {
        let anchor = self.anchor;
        self.anchor = match self.period {
            Period::Day => anchor + Duration::days(i64::from(direction)),
            Period::Week => anchor + Duration::days(7 * i64::from(direction)),
            Period::Month => {
                let months = Months::new(direction.unsigned_abs());
                if direction >= 0 {
                    anchor.checked_add_months(months).unwrap_or(anchor)
                } else {
                    anchor.checked_sub_months(months).unwrap_or(anchor)
                }
            }
            Period::Year => anchor
                .with_year(anchor.year() + direction)
                .unwrap_or(anchor),
        };
    }

    pub fn go_to_today(&mut self, today: NaiveDate) {
        self.anchor = today;
    }

    pub fn set_tasks(&mut self, tasks: Vec<Task>) {
        self.tasks = tasks;
    }

    pub fn set_machine_calendar(&mut self, calendar: Option<MachineCalendar>) {
        self.calendar = calendar;
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn current_period(&self) -> Period {
        self.period
    }

    pub fn current_anchor(&self) -> NaiveDate {
        self.anchor
    }

    pub fn view_range(&self) -> ViewRange {
        view_range(self.period, self.anchor)
    }

    pub fn cell_width(&self) -> f64 {
        cell_width(self.period, self.container_width)
    }

    /// The caption for the navigation header
    pub fn period_label(&self) -> String {
        geometry::period_label(self.period, self.anchor)
    }

    /// Resolve a bar's `data-task-key` back to its task
    pub fn task_by_key(&self, key: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.key == key)
    }

    /// Tasks rendered in the current view, sorted by `plan_order` (missing
    /// treated as 0). Tasks without both timestamps stay visible, as they may
    /// be newly added or mid-reorder; scheduled tasks must overlap the view.
    pub fn visible_tasks(&self) -> Vec<&Task> {
        let view = self.view_range();
        let mut visible: Vec<&Task> = self
            .tasks
            .iter()
            .filter(|t| match (t.planned_start_ms, t.planned_end_ms) {
                (Some(start), Some(end)) => view.overlaps(start, end),
                _ => true,
            })
            .collect();
        visible.sort_by_key(|t| t.plan_order.unwrap_or(0));
        visible
    }

    // ========================================================================
    // Rendering
    // ========================================================================

    /// Render the grid as an HTML fragment. `now` drives the current-time
    /// indicator (day/week views, only when inside the view).
    pub fn render(&self, now: Option<NaiveDateTime>) -> String {
        let view = self.view_range();
        let cw = self.cell_width();
        let visible = self.visible_tasks();
        let total_width = timeline_width(self.period, self.anchor, cw);
        let total_height = HEADER_HEIGHT_PX + visible.len() as f64 * self.row_height;

        let labels = if visible.is_empty() {
            r#"<div class="gantt-task-label text-muted">No tasks</div>"#.to_string()
        } else {
            visible.iter().map(|t| self.render_label(t)).collect()
        };

        let bars = if visible.is_empty() {
            r#"<div class="gantt-task-bar-container"><div class="gantt-empty-note">No scheduled tasks</div></div>"#
                .to_string()
        } else {
            visible
                .iter()
                .map(|t| self.render_bar_container(t, &view, cw))
                .collect()
        };

        let now_line = now
            .and_then(|at| self.render_now_line(at, &view, cw))
            .unwrap_or_default();

        format!(
            r#"<div class="gantt-chart-container {period}-view">
  <div class="gantt-fixed-column">
    <div class="gantt-header-label-cell">Task</div>
{labels}
  </div>
  <div class="gantt-scrolling-column">
    <div class="gantt-timeline-content" style="width: {total_width:.0}px; background-size: {cw:.2}px {row_height:.0}px;">
      <div class="gantt-timeline-header">
{header}
      </div>
      <div class="gantt-working-hours-background">
{background}
      </div>
{bars}
{now_line}
    </div>
  </div>
</div>"#,
            period = self.period,
            labels = labels,
            total_width = total_width,
            cw = cw,
            row_height = self.row_height,
            header = self.render_header_cells(cw),
            background = self.render_working_background(&view, cw, total_height),
            bars = bars,
            now_line = now_line,
        )
    }

    /// Render a standalone HTML document around the fragment
    pub fn render_document(&self, title: &str, now: Option<NaiveDateTime>) -> String {
        format!(
            r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<title>{title}</title>
<style>
{css}
</style>
</head>
<body>
<div class="gantt-page">
  <div class="gantt-page-header">
    <h1>{title}</h1>
    <span class="gantt-period-caption">{caption}</span>
  </div>
{fragment}
</div>
</body>
</html>"#,
            title = html_escape(title),
            css = GRID_CSS,
            caption = html_escape(&self.period_label()),
            fragment = self.render(now),
        )
    }

    fn render_label(&self, task: &Task) -> String {
        format!(
            r#"    <div class="gantt-task-label"><div class="gantt-task-key">{key}</div><div class="gantt-task-name">{name}</div></div>
"#,
            key = html_escape(&task.key),
            name = html_escape(&task.name),
        )
    }

    fn render_header_cells(&self, cw: f64) -> String {
        header_cells(self.period, self.anchor, cw)
            .iter()
            .map(|cell| {
                format!(
                    r#"        <div class="gantt-header-cell" style="min-width: {width:.2}px;"><div class="gantt-date">{primary}</div><div class="gantt-month">{secondary}</div></div>
"#,
                    width = cell.width_px,
                    primary = html_escape(&cell.primary),
                    secondary = html_escape(&cell.secondary),
                )
            })
            .collect()
    }

    fn render_bar_container(&self, task: &Task, view: &ViewRange, cw: f64) -> String {
        let inner = match (task.planned_start_ms, task.planned_end_ms) {
            (Some(start_ms), Some(end_ms)) => match &self.calendar {
                Some(calendar) => {
                    let segments = working_segments(
                        millis_to_datetime(start_ms),
                        millis_to_datetime(end_ms),
                        self.period,
                        view,
                        calendar,
                    );
                    segments
                        .iter()
                        .filter_map(|segment| self.render_segment_bar(task, segment, view, cw))
                        .collect::<String>()
                }
                None => self
                    .render_continuous_bar(task, start_ms, end_ms, view, cw)
                    .unwrap_or_default(),
            },
            _ => self.render_undated_bar(task),
        };

        format!("<div class=\"gantt-task-bar-container\">{inner}</div>\n")
    }

    fn render_segment_bar(
        &self,
        task: &Task,
        segment: &Segment,
        view: &ViewRange,
        cw: f64,
    ) -> Option<String> {
        let geometry = bar_geometry(
            capplan_core::datetime_to_millis(segment.start),
            capplan_core::datetime_to_millis(segment.end),
            view,
            self.period,
            cw,
        )?;
        Some(self.render_bar(
            task,
            geometry.left_px,
            geometry.width_px,
            &self.tooltip(task, Some((segment.start, segment.end))),
        ))
    }

    fn render_continuous_bar(
        &self,
        task: &Task,
        start_ms: i64,
        end_ms: i64,
        view: &ViewRange,
        cw: f64,
    ) -> Option<String> {
        let geometry = bar_geometry(start_ms, end_ms, view, self.period, cw)?;
        let bounds = (millis_to_datetime(start_ms), millis_to_datetime(end_ms));
        Some(self.render_bar(
            task,
            geometry.left_px,
            geometry.width_px,
            &self.tooltip(task, Some(bounds)),
        ))
    }

    fn render_undated_bar(&self, task: &Task) -> String {
        let lock_class = if task.plan_locked { "locked" } else { "unlocked" };
        format!(
            r#"<div class="gantt-task-bar {lock_class} no-dates" style="left: 0px; width: 100px; opacity: 0.6;" data-task-key="{key}" title="{title}">{progress}<div class="gantt-task-content">{content}</div></div>"#,
            key = html_escape(&task.key),
            title = html_escape(&self.tooltip(task, None)),
            progress = self.render_progress(task),
            content = self.bar_caption(task),
        )
    }

    fn render_bar(&self, task: &Task, left: f64, width: f64, tooltip: &str) -> String {
        let lock_class = if task.plan_locked { "locked" } else { "unlocked" };
        format!(
            r#"<div class="gantt-task-bar {lock_class}" style="left: {left:.2}px; width: {width:.2}px;" data-task-key="{key}" title="{title}">{progress}<div class="gantt-task-content">{content}</div></div>"#,
            key = html_escape(&task.key),
            title = html_escape(tooltip),
            progress = self.render_progress(task),
            content = self.bar_caption(task),
        )
    }

    fn bar_caption(&self, task: &Task) -> String {
        if self.show_keys_in_bars {
            html_escape(&task.key)
        } else {
            String::new()
        }
    }

    fn render_progress(&self, task: &Task) -> String {
        let Some(percent) = task.progress_percent else {
            return String::new();
        };
        let percent = percent.min(100);
        let state = if percent >= 100 {
            "completed"
        } else {
            "in-progress"
        };
        let label = if percent > 20 {
            format!(r#"<div class="gantt-task-progress-label">{percent}%</div>"#)
        } else {
            String::new()
        };
        format!(
            r#"<div class="gantt-task-progress {state}" style="width: {percent}%;">{label}</div>"#
        )
    }

    fn tooltip(&self, task: &Task, bounds: Option<(NaiveDateTime, NaiveDateTime)>) -> String {
        let Some((start, end)) = bounds else {
            return "No dates assigned".to_string();
        };
        let hours = task
            .remaining_hours
            .or(task.estimated_hours)
            .unwrap_or(0.0);
        let mut tooltip = format!(
            "{hours}h\n{start} - {end}",
            hours = hours,
            start = start.format("%d/%m/%Y %H:%M"),
            end = end.format("%d/%m/%Y %H:%M"),
        );
        if let Some(percent) = task.progress_percent {
            tooltip.push_str(&format!("\nProgress: {percent}%"));
        }
        tooltip
    }

    /// Shaded working/non-working blocks behind the bars. Per-window blocks
    /// in the day view, whole-day blocks in week/month, nothing in the
    /// month-granular year view.
    fn render_working_background(&self, view: &ViewRange, cw: f64, total_height: f64) -> String {
        let Some(calendar) = &self.calendar else {
            return String::new();
        };
        match self.period {
            Period::Year => String::new(),
            Period::Day => self.render_day_background(calendar, view, cw, total_height),
            Period::Week | Period::Month => {
                let day_count = (view.end.date() - view.start.date()).num_days() + 1;
                (0..day_count)
                    .map(|offset| {
                        let date = view.start.date() + Duration::days(offset);
                        let windows = calendar.windows_for_date(date);
                        let left = offset as f64 * cw;
                        if windows.is_empty() {
                            format!(
                                r#"        <div class="gantt-non-working-day-block" style="left: {left:.2}px; width: {cw:.2}px; height: {total_height:.0}px;" title="Non-working day"></div>
"#
                            )
                        } else {
                            let hours = windows
                                .iter()
                                .map(|w| format!("{}-{}", w.start, w.end))
                                .collect::<Vec<_>>()
                                .join(", ");
                            format!(
                                r#"        <div class="gantt-working-day-block" style="left: {left:.2}px; width: {cw:.2}px; height: {total_height:.0}px;" title="Working day: {hours}"></div>
"#
                            )
                        }
                    })
                    .collect()
            }
        }
    }

    fn render_day_background(
        &self,
        calendar: &MachineCalendar,
        view: &ViewRange,
        cw: f64,
        total_height: f64,
    ) -> String {
        let windows = calendar.windows_for_date(view.start.date());
        if windows.is_empty() {
            let width = 24.0 * cw;
            return format!(
                r#"        <div class="gantt-non-working-day-block" style="left: 0px; width: {width:.2}px; height: {total_height:.0}px;" title="Non-working day"></div>
"#
            );
        }

        let mut blocks = String::new();

        for window in windows {
            let start_min = i64::from(window.start.minutes());
            let end_min = window.end_minutes().min(24 * 60);
            let left = start_min as f64 / 60.0 * cw;
            let width = (end_min - start_min) as f64 / 60.0 * cw;
            blocks.push_str(&format!(
                r#"        <div class="gantt-working-hour-block" style="left: {left:.2}px; width: {width:.2}px; height: {total_height:.0}px;" title="Working hours: {start}-{end}"></div>
"#,
                start = window.start,
                end = window.end,
            ));
        }

        // Gaps before, between and after the working spans
        let mut spans: Vec<(i64, i64)> = windows
            .iter()
            .map(|w| (i64::from(w.start.minutes()), w.end_minutes().min(24 * 60)))
            .collect();
        spans.sort_unstable();

        let mut cursor = 0;
        for &(start_min, end_min) in &spans {
            if start_min > cursor {
                blocks.push_str(&non_working_block(cursor, start_min, cw, total_height));
            }
            cursor = cursor.max(end_min);
        }
        if cursor < 24 * 60 {
            blocks.push_str(&non_working_block(cursor, 24 * 60, cw, total_height));
        }

        blocks
    }

    fn render_now_line(&self, now: NaiveDateTime, view: &ViewRange, cw: f64) -> Option<String> {
        let x = now_indicator_x(now, view, self.period, cw)?;
        Some(format!(
            r#"<div class="gantt-current-time" style="left: {x:.2}px;"><div class="gantt-current-time-label">{label}</div></div>
"#,
            label = now.format("%H:%M"),
        ))
    }
}

fn non_working_block(start_min: i64, end_min: i64, cw: f64, total_height: f64) -> String {
    let left = start_min as f64 / 60.0 * cw;
    let width = (end_min - start_min) as f64 / 60.0 * cw;
    format!(
        r#"        <div class="gantt-non-working-hour-block" style="left: {left:.2}px; width: {width:.2}px; height: {total_height:.0}px;" title="Non-working hours: {start}-{end}"></div>
"#,
        start = minutes_label(start_min),
        end = minutes_label(end_min),
    )
}

fn minutes_label(minutes: i64) -> String {
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

fn html_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

const GRID_CSS: &str = r#".gantt-page { font-family: system-ui, -apple-system, sans-serif; margin: 16px; color: #2c3e50; }
.gantt-page-header { display: flex; align-items: baseline; gap: 12px; }
.gantt-page-header h1 { font-size: 18px; margin: 0 0 8px; }
.gantt-period-caption { color: #6c757d; font-size: 13px; }
.gantt-chart-container { display: flex; border: 1px solid #e5e7eb; overflow: hidden; }
.gantt-fixed-column { flex: 0 0 180px; border-right: 1px solid #e5e7eb; background: #f8f9fa; }
.gantt-header-label-cell { height: 60px; line-height: 60px; padding: 0 8px; font-weight: 600; }
.gantt-task-label { height: 60px; padding: 8px; box-sizing: border-box; border-top: 1px solid #e5e7eb; }
.gantt-task-key { font-size: 12px; font-weight: 600; }
.gantt-task-name { font-size: 12px; color: #6c757d; white-space: nowrap; overflow: hidden; text-overflow: ellipsis; }
.gantt-scrolling-column { flex: 1 1 auto; overflow-x: auto; position: relative; }
.gantt-timeline-content { position: relative; background-image: linear-gradient(to right, #e5e7eb 1px, transparent 1px), linear-gradient(to bottom, #e5e7eb 1px, transparent 1px); background-repeat: repeat; }
.gantt-timeline-header { display: flex; height: 60px; }
.gantt-header-cell { box-sizing: border-box; border-right: 1px solid #e5e7eb; text-align: center; padding-top: 8px; }
.gantt-date { font-size: 13px; font-weight: 600; }
.gantt-month { font-size: 11px; color: #6c757d; }
.gantt-working-hours-background { position: absolute; top: 0; left: 0; z-index: 0; }
.gantt-working-hour-block, .gantt-working-day-block { position: absolute; top: 0; background: rgba(25, 135, 84, 0.08); }
.gantt-non-working-hour-block, .gantt-non-working-day-block { position: absolute; top: 0; background: rgba(108, 117, 125, 0.12); }
.gantt-task-bar-container { position: relative; height: 60px; z-index: 1; }
.gantt-task-bar { position: absolute; top: 14px; height: 32px; border-radius: 4px; background: #3498db; color: #fff; overflow: hidden; }
.gantt-task-bar.locked { background: #7f8c8d; }
.gantt-task-bar.no-dates { background: #95a5a6; }
.gantt-task-content { position: relative; font-size: 11px; line-height: 32px; padding: 0 6px; white-space: nowrap; }
.gantt-task-progress { position: absolute; top: 0; bottom: 0; left: 0; background: rgba(255, 255, 255, 0.35); }
.gantt-task-progress.completed { background: rgba(25, 135, 84, 0.45); }
.gantt-task-progress-label { font-size: 10px; line-height: 32px; padding-left: 4px; }
.gantt-current-time { position: absolute; top: 0; bottom: 0; width: 2px; background: #e74c3c; z-index: 2; }
.gantt-current-time-label { position: absolute; top: 2px; left: 4px; font-size: 10px; color: #e74c3c; }
.gantt-empty-note { padding: 20px; color: #6c757d; text-align: center; }
.text-muted { color: #6c757d; }"#;
