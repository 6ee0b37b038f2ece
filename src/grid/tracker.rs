use crate::grid::layout::{compute_grid_layout, GridConfig, GridLayout, Viewport};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Keeps a [`GridLayout`] current while the viewport or item count changes.
pub struct GridTracker {
    layout: watch::Receiver<GridLayout>,
    cancellation_token: CancellationToken,
    join_handle: JoinHandle<()>,
}

impl GridTracker {
    pub fn spawn(
        config: GridConfig,
        mut viewport: watch::Receiver<Viewport>,
        mut item_count: watch::Receiver<usize>,
    ) -> Self {
        let initial = compute_grid_layout(
            &config,
            *item_count.borrow_and_update(),
            &viewport.borrow_and_update(),
        );
        let (layout_tx, layout) = watch::channel(initial);
        let cancellation_token = CancellationToken::new();
        let task_token = cancellation_token.clone();

        let join_handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = task_token.cancelled() => break,
                    changed = viewport.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    changed = item_count.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }

                let count = *item_count.borrow_and_update();
                let current = *viewport.borrow_and_update();
                let next = compute_grid_layout(&config, count, &current);
                layout_tx.send_if_modified(|layout| {
                    if *layout == next {
                        return false;
                    }
                    trace!(count, start_row = next.start_row, end_row = next.end_row, "grid layout changed");
                    *layout = next;
                    true
                });
            }
        });

        Self {
            layout,
            cancellation_token,
            join_handle,
        }
    }

    pub fn layout(&self) -> GridLayout {
        self.layout.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<GridLayout> {
        self.layout.clone()
    }

    pub async fn stop(self) {
        self.cancellation_token.cancel();
        let _ = self.join_handle.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn recomputes_on_resize_and_count_change() {
        let (viewport_tx, viewport_rx) = watch::channel(Viewport::new(0.0, 600.0));
        let (count_tx, count_rx) = watch::channel(4_usize);
        let tracker = GridTracker::spawn(GridConfig::default(), viewport_rx, count_rx);
        assert_eq!(tracker.layout().columns, 0);

        let mut layout = tracker.watch();
        viewport_tx.send(Viewport::new(600.0, 600.0)).unwrap();
        let resized = timeout(Duration::from_secs(1), layout.wait_for(|layout| layout.columns == 2))
            .await
            .unwrap()
            .unwrap()
            .clone();
        assert_eq!(resized.cells.len(), 4);

        count_tx.send(7).unwrap();
        timeout(Duration::from_secs(1), layout.wait_for(|layout| layout.cells.len() == 7))
            .await
            .unwrap()
            .unwrap();

        tracker.stop().await;
    }

    #[tokio::test]
    async fn stop_ends_observation() {
        let (viewport_tx, viewport_rx) = watch::channel(Viewport::new(600.0, 600.0));
        let (_count_tx, count_rx) = watch::channel(2_usize);
        let tracker = GridTracker::spawn(GridConfig::default(), viewport_rx, count_rx);
        let mut layout = tracker.watch();

        tracker.stop().await;
        let _ = viewport_tx.send(Viewport::new(1_200.0, 600.0));

        assert!(layout.changed().await.is_err());
    }
}
