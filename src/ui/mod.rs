//! UI module for consistent CLI output
//!
//! Uses `cliclack` for interactive prompts and spinners with automatic
//! fallback to plain output in CI/non-interactive environments.

mod context;
mod output;
mod progress;
mod prompts;

pub use context::UiContext;
pub use output::{
    intro, key_value, outro_success, outro_warn, remark, step_error_detail, step_info, step_ok,
    step_ok_detail, step_warn_hint,
};
pub use progress::{AssemblyProgress, TaskSpinner};
pub use prompts::confirm;
