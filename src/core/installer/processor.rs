use std::collections::VecDeque;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::error::{LauncherError, LauncherResult};

/// One fully resolved native compile step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Processor {
    /// Display name, usually the processor jar's coordinate.
    pub name: String,
    pub jar: PathBuf,
    pub classpath: Vec<PathBuf>,
    pub main_class: String,
    pub args: Vec<String>,
}

impl Processor {
    /// `-cp <jar:classpath...> <main class> <args...>`
    pub fn java_args(&self) -> Vec<String> {
        let separator = if cfg!(windows) { ";" } else { ":" };
        let classpath = std::iter::once(&self.jar)
            .chain(self.classpath.iter())
            .map(|p| p.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(separator);

        let mut args = vec!["-cp".to_string(), classpath, self.main_class.clone()];
        args.extend(self.args.iter().cloned());
        args
    }

    pub async fn run(
        &self,
        java: &Path,
        working_dir: &Path,
        cancel: &CancellationToken,
    ) -> LauncherResult<()> {
        info!("Running processor {} ({})", self.name, self.main_class);
        run_captured(&self.name, java, &self.java_args(), working_dir, cancel).await
    }
}

/// Stderr lines kept for the error; older ones are only counted.
const STDERR_TAIL_LINES: usize = 200;

/// Run `program` to completion, reading stdout and stderr line by line.
///
/// Anything written to stderr fails the step, whatever the exit code.
pub async fn run_captured(
    label: &str,
    program: &Path,
    args: &[String],
    working_dir: &Path,
    cancel: &CancellationToken,
) -> LauncherResult<()> {
    let mut child = Command::new(program)
        .args(args)
        .current_dir(working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| LauncherError::JavaExecution(format!("{}: {}", program.display(), e)))?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let read_stdout = async {
        if let Some(out) = stdout {
            let mut lines = BufReader::new(out).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!("[{}] {}", label, line);
            }
        }
    };
    let read_stderr = async {
        let mut tail = VecDeque::new();
        let mut omitted = 0usize;
        if let Some(err) = stderr {
            let mut lines = BufReader::new(err).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                warn!("[{}] {}", label, line);
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                    omitted += 1;
                }
                tail.push_back(line);
            }
        }
        (tail, omitted)
    };

    let run = async {
        let ((), captured, status) = tokio::join!(read_stdout, read_stderr, child.wait());
        (captured, status)
    };

    let ((captured, omitted), status) = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(LauncherError::Cancelled),
        done = run => done,
    };
    let status = status.map_err(|e| LauncherError::JavaExecution(e.to_string()))?;

    if !captured.is_empty() || !status.success() {
        return Err(LauncherError::ProcessorFailed {
            processor: label.to_string(),
            exit_code: status.code(),
            stderr: captured.into(),
            omitted_lines: omitted,
        });
    }
    Ok(())
}

/// `Main-Class` attribute of a jar manifest, following continuation lines.
pub fn read_main_class(jar: &Path) -> LauncherResult<String> {
    let file = std::fs::File::open(jar).map_err(|e| LauncherError::io(jar, e))?;
    let mut archive = zip::ZipArchive::new(file)?;
    let mut manifest = archive.by_name("META-INF/MANIFEST.MF")?;
    let mut text = String::new();
    manifest
        .read_to_string(&mut text)
        .map_err(|e| LauncherError::io(jar, e))?;

    main_class_from_manifest(&text).ok_or_else(|| {
        LauncherError::Loader(format!("Main-Class missing in {}", jar.display()))
    })
}

fn main_class_from_manifest(text: &str) -> Option<String> {
    let mut main_class: Option<String> = None;
    let mut in_main_class = false;
    for line in text.lines() {
        if let Some(rest) = line.strip_prefix(' ') {
            if in_main_class {
                if let Some(value) = main_class.as_mut() {
                    value.push_str(rest.trim_end());
                }
            }
            continue;
        }
        in_main_class = false;
        if let Some(value) = line.strip_prefix("Main-Class:") {
            main_class = Some(value.trim().to_string());
            in_main_class = true;
        }
    }
    main_class.filter(|m| !m.is_empty())
}
