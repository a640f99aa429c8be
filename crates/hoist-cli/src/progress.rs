//! Terminal rendering of deployment progress.

use console::{Term, style};
use tokio::sync::mpsc::UnboundedReceiver;

use hoist_core::progress::ProgressEvent;

/// Print every progress message with the running percentage until the
/// sending side is dropped. Returns the final percentage.
pub async fn render(mut events: UnboundedReceiver<ProgressEvent>) -> f64 {
    let term = Term::stderr();
    let mut percent = 0.0;
    while let Some(event) = events.recv().await {
        percent += event.increment;
        if let Some(message) = event.message {
            let line = format_line(percent, &message);
            if term.write_line(&line).is_err() {
                eprintln!("{line}");
            }
        }
    }
    percent
}

fn format_line(percent: f64, message: &str) -> String {
    let shown = percent.clamp(0.0, 100.0).round();
    format!("{} {}", style(format!("[{shown:>3}%]")).dim(), message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hoist_core::progress::{ChannelSink, ProgressSink};

    #[tokio::test]
    async fn render_sums_increments_until_the_sink_is_dropped() {
        let (sink, rx) = ChannelSink::channel();
        sink.report(ProgressEvent {
            increment: 40.0,
            message: Some("Created code repository".to_string()),
        });
        sink.report(ProgressEvent {
            increment: 0.0,
            message: Some("Still waiting".to_string()),
        });
        sink.report(ProgressEvent {
            increment: 60.0,
            message: None,
        });
        drop(sink);

        let total = render(rx).await;
        assert!((total - 100.0).abs() < 1e-9);
    }

    #[test]
    fn line_is_clamped_to_one_hundred() {
        console::set_colors_enabled(false);
        assert_eq!(format_line(100.0000001, "done"), "[100%] done");
        assert_eq!(format_line(7.4, "step"), "[  7%] step");
    }
}
