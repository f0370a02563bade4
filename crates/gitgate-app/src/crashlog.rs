use std::backtrace::Backtrace;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

static WRITING_CRASH_LOG: AtomicBool = AtomicBool::new(false);

/// Chains a panic hook that appends a report under the state directory.
pub fn install() {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        if let Some(path) = write_panic_log(info) {
            eprintln!("gitgate crashed; report written to {}", path.display());
        }
        previous(info);
    }));
}

fn write_panic_log(info: &std::panic::PanicHookInfo<'_>) -> Option<PathBuf> {
    // A panic while reporting a panic must not recurse.
    if WRITING_CRASH_LOG
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return None;
    }
    let _guard = ResetFlagOnDrop;

    let dir = crash_dir()?;
    std::fs::create_dir_all(&dir).ok()?;
    let path = crash_log_path(&dir);
    let mut file = open_append(&path).ok()?;

    let payload = info
        .payload()
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| info.payload().downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "<non-string panic payload>".to_string());
    let location = info
        .location()
        .map(|l| format!("{}#L{}", l.file(), l.line()));
    let report = CrashReport {
        thread: std::thread::current()
            .name()
            .unwrap_or("<unnamed>")
            .to_string(),
        location,
        message: payload,
        timestamp_ms: unix_time_ms(),
    };

    let _ = write!(file, "{}", report.render());
    let _ = writeln!(file, "backtrace:\n{}", Backtrace::force_capture());
    let _ = writeln!(file);
    let _ = file.flush();
    Some(path)
}

struct CrashReport {
    thread: String,
    location: Option<String>,
    message: String,
    timestamp_ms: u128,
}

impl CrashReport {
    fn render(&self) -> String {
        let mut out = String::from("=== gitgate crash (panic) ===\n");
        out.push_str(&format!("timestamp_unix_ms={}\n", self.timestamp_ms));
        out.push_str(&format!(
            "crate={} version={}\n",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION")
        ));
        out.push_str(&format!("thread={}\n", self.thread));
        if let Some(location) = &self.location {
            out.push_str(&format!("location={location}\n"));
        }
        out.push_str(&format!("message={}\n", self.message));
        out
    }
}

fn crash_dir() -> Option<PathBuf> {
    Some(app_state_dir()?.join("crashes"))
}

fn app_state_dir() -> Option<PathBuf> {
    let non_empty = |key: &str| std::env::var_os(key).filter(|v| !v.is_empty());

    let base = if cfg!(target_os = "linux") {
        non_empty("XDG_STATE_HOME")
            .map(PathBuf::from)
            .or_else(|| non_empty("HOME").map(|home| PathBuf::from(home).join(".local/state")))?
    } else if cfg!(target_os = "macos") {
        PathBuf::from(non_empty("HOME")?).join("Library/Logs")
    } else if cfg!(target_os = "windows") {
        PathBuf::from(non_empty("LOCALAPPDATA").or_else(|| non_empty("APPDATA"))?)
    } else {
        PathBuf::from(non_empty("HOME")?)
    };
    Some(base.join("gitgate"))
}

fn crash_log_path(dir: &Path) -> PathBuf {
    let pid = std::process::id();
    dir.join(format!("panic-{pid}-{}.log", unix_time_ms()))
}

fn open_append(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

fn unix_time_ms() -> u128 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

struct ResetFlagOnDrop;

impl Drop for ResetFlagOnDrop {
    fn drop(&mut self) {
        WRITING_CRASH_LOG.store(false, Ordering::SeqCst);
    }
}
