// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Viewport math over the root's flattened rows.
//!
//! Rows have a uniform extent, so the row under an offset is a division and
//! the rows to realize for a viewport are a contiguous index range into
//! [`Hierarchy::rows`](crate::Hierarchy::rows).

use core::ops::Range;

/// Alignment mode when scrolling a specific row into view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScrollAlign {
    /// Align the start of the row with the start of the viewport.
    Start,
    /// Center the row within the viewport.
    Center,
    /// Align the end of the row with the end of the viewport.
    End,
    /// Move just enough to make the row fully visible.
    #[default]
    Nearest,
}

/// Uniform-height row geometry for one viewport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RowWindow {
    row_extent: f64,
    viewport_extent: f64,
    overscan: f64,
}

impl RowWindow {
    /// Creates a window of `viewport_extent` over rows of `row_extent`.
    ///
    /// Negative extents are clamped to zero.
    #[must_use]
    pub fn new(row_extent: f64, viewport_extent: f64) -> Self {
        debug_assert!(
            row_extent.is_finite() && viewport_extent.is_finite(),
            "RowWindow extents must be finite; got {row_extent:?} / {viewport_extent:?}"
        );
        Self {
            row_extent: row_extent.max(0.0),
            viewport_extent: viewport_extent.max(0.0),
            overscan: 0.0,
        }
    }

    /// Realizes `overscan` extra units before and after the viewport.
    #[must_use]
    pub fn with_overscan(mut self, overscan: f64) -> Self {
        self.overscan = overscan.max(0.0);
        self
    }

    /// Height of one row.
    #[must_use]
    pub const fn row_extent(&self) -> f64 {
        self.row_extent
    }

    /// Height of the viewport.
    #[must_use]
    pub const fn viewport_extent(&self) -> f64 {
        self.viewport_extent
    }

    /// Total height of `row_count` rows.
    #[must_use]
    pub fn content_extent(&self, row_count: usize) -> f64 {
        self.row_extent * row_count as f64
    }

    /// Clamps `offset` so the viewport stays inside the content.
    #[must_use]
    pub fn clamp_offset(&self, offset: f64, row_count: usize) -> f64 {
        let max = (self.content_extent(row_count) - self.viewport_extent).max(0.0);
        offset.clamp(0.0, max)
    }

    /// Rows intersecting the viewport at `scroll_offset`, overscan included.
    #[must_use]
    pub fn visible_range(&self, scroll_offset: f64, row_count: usize) -> Range<usize> {
        if row_count == 0 || self.row_extent <= 0.0 {
            return 0..0;
        }
        let first = (scroll_offset - self.overscan) / self.row_extent;
        let last = (scroll_offset + self.viewport_extent + self.overscan) / self.row_extent;
        let start = Self::to_index(first.floor(), row_count);
        let end = Self::to_index(last.ceil(), row_count);
        start..end.max(start)
    }

    /// The scroll offset that brings `row` into view with `align`.
    #[must_use]
    pub fn offset_to_reveal(&self, row: usize, current: f64, align: ScrollAlign) -> f64 {
        let start = self.row_extent * row as f64;
        let end = start + self.row_extent;
        let viewport = self.viewport_extent;
        match align {
            ScrollAlign::Start => start,
            ScrollAlign::End => (end - viewport).max(0.0),
            ScrollAlign::Center => ((start + end) / 2.0 - viewport / 2.0).max(0.0),
            ScrollAlign::Nearest => {
                if start >= current && end <= current + viewport {
                    current
                } else if start < current {
                    start
                } else {
                    (end - viewport).max(0.0)
                }
            }
        }
    }

    fn to_index(value: f64, row_count: usize) -> usize {
        if value <= 0.0 {
            return 0;
        }
        #[allow(
            clippy::cast_possible_truncation,
            reason = "Value is non-negative and clamped to the row count right after the cast"
        )]
        let index = value as usize;
        index.min(row_count)
    }
}
