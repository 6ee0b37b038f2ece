use crate::error::AppError;
use serde::{Deserialize, Serialize};

pub const DEFAULT_ITEM_MIN_WIDTH: f64 = 280.0;
pub const DEFAULT_ITEM_HEIGHT: f64 = 160.0;
pub const DEFAULT_GAP: f64 = 24.0;
pub const DEFAULT_BUFFER_ROWS: usize = 2;
pub const MAX_BUFFER_ROWS: usize = 64;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridConfigArgs {
    pub item_min_width: Option<f64>,
    pub item_height: Option<f64>,
    pub gap: Option<f64>,
    pub buffer: Option<usize>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GridConfig {
    pub item_min_width: f64,
    pub item_height: f64,
    pub gap: f64,
    pub buffer: usize,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            item_min_width: DEFAULT_ITEM_MIN_WIDTH,
            item_height: DEFAULT_ITEM_HEIGHT,
            gap: DEFAULT_GAP,
            buffer: DEFAULT_BUFFER_ROWS,
        }
    }
}

impl GridConfigArgs {
    pub fn normalize(self) -> Result<GridConfig, AppError> {
        let item_min_width = self.item_min_width.unwrap_or(DEFAULT_ITEM_MIN_WIDTH);
        if !item_min_width.is_finite() || item_min_width <= 0.0 {
            return Err(AppError::InvalidArgument(
                "itemMinWidth must be a finite positive number".to_string(),
            ));
        }

        let item_height = self.item_height.unwrap_or(DEFAULT_ITEM_HEIGHT);
        if !item_height.is_finite() || item_height <= 0.0 {
            return Err(AppError::InvalidArgument(
                "itemHeight must be a finite positive number".to_string(),
            ));
        }

        let gap = self.gap.unwrap_or(DEFAULT_GAP);
        if !gap.is_finite() || gap < 0.0 {
            return Err(AppError::InvalidArgument(
                "gap must be a finite non-negative number".to_string(),
            ));
        }

        let buffer = self.buffer.unwrap_or(DEFAULT_BUFFER_ROWS);
        if buffer > MAX_BUFFER_ROWS {
            return Err(AppError::InvalidArgument(format!(
                "buffer must be at most {MAX_BUFFER_ROWS} rows"
            )));
        }

        Ok(GridConfig {
            item_min_width,
            item_height,
            gap,
            buffer,
        })
    }
}

/// Container geometry in the same units as [`GridConfig`].
///
/// `scroll_offset` is measured from the scroll origin and `container_offset` is
/// where the container starts along that axis.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Viewport {
    pub container_width: f64,
    pub viewport_height: f64,
    pub scroll_offset: f64,
    pub container_offset: f64,
}

impl Viewport {
    pub fn new(container_width: f64, viewport_height: f64) -> Self {
        Self {
            container_width,
            viewport_height,
            ..Self::default()
        }
    }

    pub fn scrolled_to(self, scroll_offset: f64) -> Self {
        Self {
            scroll_offset,
            ..self
        }
    }

    fn relative_scroll(&self) -> f64 {
        let relative = self.scroll_offset - self.container_offset;
        if relative.is_finite() {
            relative.max(0.0)
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GridCell {
    pub index: usize,
    pub top: f64,
    pub left: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GridLayout {
    pub columns: usize,
    pub rows: usize,
    pub column_width: f64,
    pub total_height: f64,
    pub start_row: usize,
    pub end_row: usize,
    pub cells: Vec<GridCell>,
}

impl GridLayout {
    pub fn visible_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.cells.iter().map(|cell| cell.index)
    }
}

pub fn compute_grid_layout(config: &GridConfig, item_count: usize, viewport: &Viewport) -> GridLayout {
    let width = viewport.container_width;
    if !width.is_finite() || width <= 0.0 {
        return GridLayout::default();
    }

    let gap = config.gap;
    let columns = (((width + gap) / (config.item_min_width + gap)).floor() as usize).max(1);
    let rows = item_count.div_ceil(columns);
    let total_height = if rows == 0 {
        0.0
    } else {
        rows as f64 * config.item_height + (rows - 1) as f64 * gap
    };
    let column_width = (width - (columns - 1) as f64 * gap) / columns as f64;

    let stride = config.item_height + gap;
    let relative = viewport.relative_scroll();
    let viewport_height = if viewport.viewport_height.is_finite() {
        viewport.viewport_height.max(0.0)
    } else {
        0.0
    };

    let first_visible = (relative / stride).floor() as usize;
    let last_visible = ((relative + viewport_height) / stride).ceil() as usize;
    let start_row = first_visible.saturating_sub(config.buffer).min(rows);
    let end_row = last_visible.saturating_add(config.buffer).min(rows);

    let mut cells = Vec::new();
    for row in start_row..end_row {
        for column in 0..columns {
            let index = row * columns + column;
            if index >= item_count {
                break;
            }
            cells.push(GridCell {
                index,
                top: row as f64 * stride,
                left: column as f64 * (column_width + gap),
                width: column_width,
                height: config.item_height,
            });
        }
    }

    GridLayout {
        columns,
        rows,
        column_width,
        total_height,
        start_row,
        end_row,
        cells,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(item_min_width: f64, item_height: f64, gap: f64) -> GridConfig {
        GridConfigArgs {
            item_min_width: Some(item_min_width),
            item_height: Some(item_height),
            gap: Some(gap),
            buffer: None,
        }
        .normalize()
        .expect("config should be valid")
    }

    #[test]
    fn normalizes_defaults_and_rejects_bad_sizes() {
        let defaults = GridConfigArgs::default().normalize().unwrap();
        assert_eq!(defaults, GridConfig::default());
        assert_eq!(defaults.buffer, 2);

        let zero_width = GridConfigArgs {
            item_min_width: Some(0.0),
            ..Default::default()
        };
        assert!(zero_width.normalize().is_err());

        let negative_gap = GridConfigArgs {
            gap: Some(-1.0),
            ..Default::default()
        };
        assert!(negative_gap.normalize().is_err());
    }

    #[test]
    fn two_columns_at_600_wide() {
        let layout = compute_grid_layout(&config(280.0, 100.0, 24.0), 4, &Viewport::new(600.0, 800.0));

        assert_eq!(layout.columns, 2);
        assert_eq!(layout.rows, 2);
        assert_eq!(layout.column_width, 288.0);
        assert_eq!(layout.total_height, 224.0);
        assert_eq!(layout.cells[1].left, 312.0);
        assert_eq!(layout.cells[2].top, 124.0);
        assert_eq!(layout.visible_indices().collect::<Vec<_>>(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn empty_grid_has_no_cells() {
        let layout = compute_grid_layout(&config(280.0, 100.0, 24.0), 0, &Viewport::new(600.0, 800.0));

        assert_eq!(layout.rows, 0);
        assert_eq!(layout.total_height, 0.0);
        assert!(layout.cells.is_empty());
    }

    #[test]
    fn unknown_width_has_no_columns() {
        let layout = compute_grid_layout(&config(280.0, 100.0, 24.0), 50, &Viewport::new(0.0, 800.0));

        assert_eq!(layout.columns, 0);
        assert_eq!(layout.total_height, 0.0);
        assert!(layout.cells.is_empty());
    }

    #[test]
    fn narrow_container_still_has_one_column() {
        let layout = compute_grid_layout(&config(280.0, 100.0, 24.0), 3, &Viewport::new(100.0, 800.0));

        assert_eq!(layout.columns, 1);
        assert_eq!(layout.column_width, 100.0);
        assert_eq!(layout.cells.len(), 3);
    }

    #[test]
    fn windows_rows_around_scroll_position() {
        let grid = config(280.0, 100.0, 0.0);
        let viewport = Viewport::new(300.0, 300.0).scrolled_to(1_000.0);
        let layout = compute_grid_layout(&grid, 100, &viewport);

        assert_eq!(layout.columns, 1);
        assert_eq!(layout.start_row, 8);
        assert_eq!(layout.end_row, 15);
        assert_eq!(layout.cells.first().map(|cell| cell.index), Some(8));
        assert_eq!(layout.cells.last().map(|cell| cell.index), Some(14));
        assert_eq!(layout.total_height, 10_000.0);
    }

    #[test]
    fn scroll_is_relative_to_container_offset() {
        let grid = config(280.0, 100.0, 0.0);
        let viewport = Viewport {
            container_width: 300.0,
            viewport_height: 200.0,
            scroll_offset: 150.0,
            container_offset: 400.0,
        };
        let layout = compute_grid_layout(&grid, 100, &viewport);

        assert_eq!(layout.start_row, 0);
        assert_eq!(layout.end_row, 4);
    }

    #[test]
    fn last_row_omits_missing_items() {
        let layout = compute_grid_layout(&config(280.0, 100.0, 24.0), 5, &Viewport::new(600.0, 800.0));

        assert_eq!(layout.rows, 3);
        assert_eq!(layout.cells.len(), 5);
        assert_eq!(layout.cells[4].left, 0.0);
    }

    #[test]
    fn layout_is_deterministic() {
        let grid = config(200.0, 120.0, 16.0);
        let viewport = Viewport::new(1_024.0, 700.0).scrolled_to(333.0);
        assert_eq!(
            compute_grid_layout(&grid, 77, &viewport),
            compute_grid_layout(&grid, 77, &viewport)
        );
    }
}
