//! Terminal progress bars.

use std::sync::Arc;
use std::time::Duration;

use burrow_remote::path;
use burrow_transfer::{ProgressSink, ProgressUpdate, SinkFactory};
use indicatif::{HumanBytes, HumanDuration, ProgressBar, ProgressDrawTarget, ProgressStyle};

const TEMPLATE: &str =
    "{prefix:.bold} {bytes}/{total_bytes} [{bar:40.cyan/blue}] {percent}% {msg}";

/// One bar per uploaded file, drawn on stdout.
pub struct BarSink {
    bar: ProgressBar,
}

impl BarSink {
    pub fn new(remote: &str, total: u64) -> Self {
        let bar = ProgressBar::with_draw_target(Some(total), ProgressDrawTarget::stdout());
        bar.set_style(bar_style());
        bar.set_prefix(path::base_name(remote).to_string());
        Self { bar }
    }
}

impl ProgressSink for BarSink {
    fn on_progress(&mut self, update: &ProgressUpdate) {
        self.bar.set_position(update.transferred);
        self.bar.set_message(rate_and_eta(update.bytes_per_second, update.eta));
    }

    fn finish(&mut self) {
        self.bar.finish();
    }
}

/// Hands every transfer its own [`BarSink`].
pub fn bar_factory() -> SinkFactory {
    Arc::new(|remote: &str, total: u64| Box::new(BarSink::new(remote, total)) as Box<dyn ProgressSink>)
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template(TEMPLATE)
        .map(|style| style.progress_chars("=>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
}

fn rate_and_eta(bytes_per_second: f64, eta: Option<Duration>) -> String {
    let rate = format!("{}/s", HumanBytes(bytes_per_second.max(0.0) as u64));
    match eta {
        Some(eta) => format!("{rate} {}", HumanDuration(eta)),
        None => rate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_is_valid() {
        assert!(ProgressStyle::default_bar().template(TEMPLATE).is_ok());
    }

    #[test]
    fn message_without_eta_is_rate_only() {
        assert_eq!(rate_and_eta(2048.0, None), "2.00 KiB/s");
    }

    #[test]
    fn message_includes_eta() {
        let msg = rate_and_eta(1024.0, Some(Duration::from_secs(90)));
        assert!(msg.starts_with("1.00 KiB/s "), "{msg}");
    }

    #[test]
    fn sink_tracks_position() {
        let mut sink = BarSink::new("/srv/data/file.bin", 1000);
        sink.on_progress(&ProgressUpdate {
            transferred: 400,
            total: 1000,
            bytes_per_second: 0.0,
            eta: None,
        });
        assert_eq!(sink.bar.position(), 400);
        assert_eq!(sink.bar.prefix(), "file.bin");
        sink.finish();
        assert!(sink.bar.is_finished());
    }
}
