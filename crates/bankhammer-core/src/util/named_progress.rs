use indicatif::{ProgressBar, ProgressStyle};

/// Width of the name column in front of every bar.
const NAME_WIDTH: usize = 24;

/// Extension trait for creating named progress bars.
pub trait NamedProgress {
    /// Creates a progress bar style with a name label.
    fn named_bar(name: &str) -> Self;
}

impl NamedProgress for ProgressStyle {
    fn named_bar(name: &str) -> Self {
        let fmt = format!(
            "{:<width$} {{wide_bar:40.cyan/blue}} {{pos:>7}}/{{len:<7}} [{{elapsed_precise}} ({{eta}} remaining)] {{msg}}",
            name,
            width = NAME_WIDTH
        );
        ProgressStyle::default_bar()
            .template(&fmt)
            .unwrap_or(ProgressStyle::default_bar())
    }
}

/// Creates a named bar of length `len`, or a hidden one if no progress target is attached.
pub fn named_bar(progress: Option<&indicatif::MultiProgress>, name: &str, len: u64) -> ProgressBar {
    match progress {
        Some(p) => {
            let bar = p.add(ProgressBar::new(len));
            bar.set_style(ProgressStyle::named_bar(name));
            bar
        }
        None => ProgressBar::hidden(),
    }
}
