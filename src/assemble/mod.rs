//! Image assembly
//!
//! Backends turn a build plan into an image: each layer is materialized
//! (or reused from the content-addressed cache) in ascending order, then
//! the image is finalized. The many interchangeable build tools out
//! there sit behind one [`ImageBackend`] trait.

pub mod backend;
mod dockerfile;
mod driver;
mod factory;

pub use backend::{ImageBackend, LayerArtifact};
pub use dockerfile::DockerfileBackend;
pub use driver::{run_assembly, AssemblyOptions, AssemblyReport, PlanState};
pub use factory::{create_backend, KNOWN_BACKENDS};

use tokio::io::{AsyncBufReadExt, BufReader};

/// Max number of output lines to include in assembly error messages.
const BUILD_ERROR_TAIL_LINES: usize = 50;

/// Extract the useful tail of build output for error diagnostics.
pub(crate) fn build_error_output(lines: &[String]) -> String {
    let total = lines.len();
    let tail = if total > BUILD_ERROR_TAIL_LINES {
        &lines[total - BUILD_ERROR_TAIL_LINES..]
    } else {
        lines
    };
    tail.join("\n")
}

/// Stream stdout+stderr from a child process, calling `on_output` for each
/// line.
///
/// Returns all collected output lines for error reporting. This is a
/// standalone async function (not behind `async_trait`) to avoid lifetime
/// issues with the `dyn Fn` callback.
pub(crate) async fn stream_child_output(
    child: &mut tokio::process::Child,
    on_output: &(dyn Fn(String) + Send + Sync),
) -> Vec<String> {
    let stderr = child.stderr.take().expect("stderr piped");
    let stdout = child.stdout.take().expect("stdout piped");

    let mut stderr_reader = BufReader::new(stderr).lines();
    let mut stdout_reader = BufReader::new(stdout).lines();

    let mut all_output = Vec::new();
    let mut stderr_done = false;
    let mut stdout_done = false;

    while !stderr_done || !stdout_done {
        tokio::select! {
            line = stderr_reader.next_line(), if !stderr_done => {
                match line {
                    Ok(Some(line)) => {
                        on_output(line.clone());
                        all_output.push(line);
                    }
                    _ => stderr_done = true,
                }
            }
            line = stdout_reader.next_line(), if !stdout_done => {
                match line {
                    Ok(Some(line)) => {
                        on_output(line.clone());
                        all_output.push(line);
                    }
                    _ => stdout_done = true,
                }
            }
        }
    }

    all_output
}
