use crate::error::AppError;
use crate::grid::Viewport;
use serde::Serialize;
use std::io::{BufRead, Write};
use tokio::sync::watch;
use tracing::{debug, warn};

#[derive(Debug, Serialize)]
struct EventLine<'a, T: Serialize> {
    event: &'a str,
    payload: &'a T,
}

/// Writes one `{"event", "payload"}` JSON line.
pub fn write_event<W, T>(writer: &mut W, event: &str, payload: &T) -> Result<(), AppError>
where
    W: Write,
    T: Serialize,
{
    let line = simd_json::serde::to_string(&EventLine { event, payload })?;
    writer.write_all(line.as_bytes())?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

pub fn emit<T: Serialize>(event: &str, payload: &T) -> Result<(), AppError> {
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    write_event(&mut handle, event, payload)
}

/// Decodes one viewport JSON line, e.g.
/// `{"containerWidth":900,"viewportHeight":600,"scrollOffset":320,"containerOffset":0}`.
pub fn parse_viewport(line: &str) -> Result<Viewport, AppError> {
    let mut bytes = line.trim().as_bytes().to_vec();
    let viewport: Viewport = simd_json::serde::from_slice(&mut bytes)?;
    let fields = [
        viewport.container_width,
        viewport.viewport_height,
        viewport.scroll_offset,
        viewport.container_offset,
    ];
    if fields.iter().any(|value| !value.is_finite()) {
        return Err(AppError::InvalidArgument(
            "viewport values must be finite".to_string(),
        ));
    }
    if viewport.container_width < 0.0 || viewport.viewport_height < 0.0 {
        return Err(AppError::InvalidArgument(
            "viewport size must be non-negative".to_string(),
        ));
    }
    Ok(viewport)
}

/// Publishes every viewport line from `reader` until input ends or nobody is
/// watching. Undecodable lines are skipped.
pub fn forward_viewports<R: BufRead>(reader: R, viewport: &watch::Sender<Viewport>) {
    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(error) => {
                warn!(%error, "viewport input closed");
                return;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match parse_viewport(&line) {
            Ok(next) => {
                if viewport.send(next).is_err() {
                    return;
                }
            }
            Err(error) => warn!(%error, "ignoring viewport line"),
        }
    }
    debug!("viewport input ended");
}

/// Feeds stdin viewport lines into `viewport` from a dedicated thread.
pub fn spawn_stdin_viewports(viewport: watch::Sender<Viewport>) -> Result<(), AppError> {
    std::thread::Builder::new()
        .name("viewport-input".into())
        .spawn(move || forward_viewports(std::io::stdin().lock(), &viewport))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::types::ConnectionStatus;
    use crate::market::FEED_STATUS_EVENT;
    use std::io::Cursor;

    #[test]
    fn writes_event_as_json_line() {
        let mut buffer = Vec::new();
        write_event(&mut buffer, FEED_STATUS_EVENT, &ConnectionStatus::Connected)
            .expect("event should encode");

        assert_eq!(
            String::from_utf8(buffer).unwrap(),
            "{\"event\":\"feed_status\",\"payload\":\"connected\"}\n"
        );
    }

    #[test]
    fn parses_viewport_line() {
        let viewport = parse_viewport(
            r#"{"containerWidth":900,"viewportHeight":600,"scrollOffset":320,"containerOffset":40}"#,
        )
        .expect("viewport should decode");
        assert_eq!(
            viewport,
            Viewport {
                container_width: 900.0,
                viewport_height: 600.0,
                scroll_offset: 320.0,
                container_offset: 40.0,
            }
        );

        assert!(parse_viewport(r#"{"containerWidth":900}"#).is_err());
        assert!(parse_viewport(
            r#"{"containerWidth":-1,"viewportHeight":600,"scrollOffset":0,"containerOffset":0}"#
        )
        .is_err());
    }

    #[test]
    fn forwards_viewport_lines_skipping_bad_ones() {
        let input = concat!(
            r#"{"containerWidth":600,"viewportHeight":400,"scrollOffset":0,"containerOffset":0}"#,
            "\nnot json\n\n",
            r#"{"containerWidth":600,"viewportHeight":400,"scrollOffset":920,"containerOffset":0}"#,
            "\n",
        );
        let (sender, mut receiver) = watch::channel(Viewport::default());

        forward_viewports(Cursor::new(input), &sender);

        assert!(receiver.has_changed().unwrap());
        assert_eq!(
            *receiver.borrow_and_update(),
            Viewport::new(600.0, 400.0).scrolled_to(920.0)
        );
    }
}
