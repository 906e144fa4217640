use crate::PassIndex;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

const PASS_TEMPLATE: &str =
    "{prefix:>18} [{bar:40.green/white}] {bytes:>10}/{total_bytes:<10} {bytes_per_sec:>12}  ETA {eta}";

/// Hands out one progress bar per pass; all bars of a session share a
/// `MultiProgress` so concurrent workers do not overwrite each other's lines.
#[derive(Clone, Default)]
pub struct ProgressReporter {
    multi: Option<MultiProgress>,
}

impl ProgressReporter {
    /// Bars drawn to stderr
    pub fn terminal() -> Self {
        if cfg!(feature = "progress-bars") {
            Self {
                multi: Some(MultiProgress::with_draw_target(ProgressDrawTarget::stderr())),
            }
        } else {
            Self::hidden()
        }
    }

    /// No output; bars still count bytes
    pub fn hidden() -> Self {
        Self { multi: None }
    }

    pub fn is_visible(&self) -> bool {
        self.multi.is_some()
    }

    pub fn pass_bar(&self, device: &str, pass: PassIndex, total_bytes: u64) -> ProgressBar {
        let Some(multi) = &self.multi else {
            return ProgressBar::hidden();
        };

        let style = ProgressStyle::with_template(PASS_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░");

        let bar = multi.add(ProgressBar::new(total_bytes));
        bar.set_style(style);
        bar.set_prefix(format!("{} {}", device, short_label(pass)));
        bar
    }
}

fn short_label(pass: PassIndex) -> String {
    match pass {
        PassIndex::Random { number, total } => format!("rand {}/{}", number, total),
        PassIndex::Zero => "zero".to_string(),
        PassIndex::HeaderScrub => "header".to_string(),
    }
}

/// Convert a byte count to a readable string
pub fn human_bytes(bytes: f64) -> String {
    let units = ["B", "KB", "MB", "GB", "TB"];
    if bytes <= 0.0 {
        return "0B".to_string();
    }
    let mut val = bytes;
    let mut i = 0usize;
    while val >= 1024.0 && i + 1 < units.len() {
        val /= 1024.0;
        i += 1;
    }
    format!("{:.2}{}", val, units[i])
}
