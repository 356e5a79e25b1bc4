//! Progress indicators with CI fallback

use super::context::UiContext;
use crate::plan::Layer;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

/// A task spinner with CI fallback
pub struct TaskSpinner {
    spinner: Option<cliclack::ProgressBar>,
    interactive: bool,
}

impl TaskSpinner {
    /// Create a new spinner (shows immediately in interactive mode)
    pub fn new(ctx: &UiContext) -> Self {
        Self {
            spinner: None,
            interactive: ctx.use_fancy_output(),
        }
    }

    /// Start the spinner with a message
    pub fn start(&mut self, message: &str) {
        if self.interactive {
            let spinner = cliclack::spinner();
            spinner.start(message);
            self.spinner = Some(spinner);
        } else {
            println!("{} {}", style("...").dim(), message);
        }
    }

    /// Stop with success message
    pub fn stop(&mut self, message: &str) {
        if let Some(spinner) = self.spinner.take() {
            spinner.stop(message);
        } else if self.interactive {
            println!("{} {}", style("✓").green(), message);
        } else {
            println!("{} {}", style("[OK]").green(), message);
        }
    }

    /// Stop with error message
    pub fn stop_error(&mut self, message: &str) {
        if let Some(spinner) = self.spinner.take() {
            spinner.error(message);
        } else if self.interactive {
            println!("{} {}", style("✗").red(), message);
        } else {
            println!("{} {}", style("[FAIL]").red(), message);
        }
    }
}

/// Progress bar for plan assembly.
///
/// Tracks layer materialization, then follows the build tool's
/// `STEP N/M: <instruction>` lines during image finalization. Plain text
/// in CI.
pub struct AssemblyProgress {
    bar: Option<ProgressBar>,
}

impl AssemblyProgress {
    /// Create a progress indicator sized to the plan's layer count
    pub fn new(ctx: &UiContext, layer_count: usize) -> Self {
        let bar = if ctx.use_fancy_output() {
            let bar = ProgressBar::new(layer_count as u64);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("  {spinner:.cyan} Assembling  {bar:20.cyan/dim} {pos}/{len} {msg:.dim}  {elapsed:.dim}")
                    .unwrap()
                    .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
                    .progress_chars("━╸─"),
            );
            bar.enable_steady_tick(std::time::Duration::from_millis(120));
            Some(bar)
        } else {
            println!("Assembling {} layers...", layer_count);
            None
        };
        Self { bar }
    }

    /// Record a completed layer
    pub fn on_layer(&self, layer: &Layer, reused: bool) {
        let verb = if reused { "reused" } else { "materialized" };
        if let Some(ref bar) = self.bar {
            bar.inc(1);
            bar.set_message(format!("{} {} ({})", verb, layer.class, layer.short_digest()));
        } else {
            println!(
                "  layer {} {} {} ({})",
                layer.order_index,
                layer.class,
                verb,
                layer.short_digest()
            );
        }
    }

    /// Process a build tool output line during finalization
    pub fn on_build_line(&self, line: String) {
        if let Some((n, total, instruction)) = parse_step_line(&line) {
            if let Some(ref bar) = self.bar {
                bar.set_message(format!("step {}/{}: {}", n, total, instruction));
            } else {
                println!("  STEP {}/{}: {}", n, total, instruction);
            }
        } else if let Some(ref bar) = self.bar {
            let trimmed = line.trim();
            if !trimmed.is_empty() && !is_build_noise(trimmed) {
                let display = if trimmed.len() > 60 {
                    format!("{}...", &trimmed[..57])
                } else {
                    trimmed.to_string()
                };
                bar.set_message(display);
            }
        }
    }

    /// Finish and clear the progress bar
    pub fn finish(&self) {
        if let Some(ref bar) = self.bar {
            bar.disable_steady_tick();
            bar.finish_and_clear();
        }
    }
}

/// Filter out build tool internals that aren't useful to display
fn is_build_noise(line: &str) -> bool {
    line.starts_with("--->")
        || line.starts_with("-->")
        || line.starts_with("Removing intermediate")
        || line.starts_with("COMMIT")
}

/// Parse a build step line like `STEP N/M: INSTRUCTION args...`
fn parse_step_line(line: &str) -> Option<(u64, u64, &str)> {
    let rest = line.strip_prefix("STEP ")?;
    let slash = rest.find('/')?;
    let colon = rest.find(':')?;
    if colon <= slash {
        return None;
    }
    let n: u64 = rest[..slash].parse().ok()?;
    let total: u64 = rest[slash + 1..colon].parse().ok()?;
    let instruction = rest[colon + 1..].trim();
    Some((n, total, instruction))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::VolatilityClass;

    #[test]
    fn spinner_non_interactive() {
        let ctx = UiContext::non_interactive();
        let mut spinner = TaskSpinner::new(&ctx);
        spinner.start("Testing...");
        spinner.stop("Done");
        // Should not panic
    }

    #[test]
    fn parse_step_line_valid() {
        let (n, m, instr) = parse_step_line("STEP 2/5: COPY layer-00/ /app/").unwrap();
        assert_eq!(n, 2);
        assert_eq!(m, 5);
        assert_eq!(instr, "COPY layer-00/ /app/");
    }

    #[test]
    fn parse_step_line_not_a_step() {
        assert!(parse_step_line("---> abc123def").is_none());
        assert!(parse_step_line("Removing intermediate container").is_none());
        assert!(parse_step_line("").is_none());
    }

    #[test]
    fn assembly_progress_non_interactive() {
        let ctx = UiContext::non_interactive();
        let progress = AssemblyProgress::new(&ctx, 2);
        let layer = Layer {
            order_index: 0,
            class: VolatilityClass::FixedDependency,
            entries: vec![],
            content_digest: "abcdef0123456789".to_string(),
        };
        progress.on_layer(&layer, true);
        progress.on_build_line("STEP 1/3: FROM base:latest".to_string());
        progress.on_build_line("---> abc123".to_string());
        progress.finish();
        // Should not panic
    }

    #[test]
    fn is_build_noise_filters_internals() {
        assert!(is_build_noise("---> abc123def"));
        assert!(is_build_noise("COMMIT stratum-abc123"));
        assert!(!is_build_noise("Copying blob sha256:..."));
    }
}
