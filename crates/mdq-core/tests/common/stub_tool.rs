//! Stub downloader for integration tests.
//!
//! A POSIX shell script that mimics the downloader's `--newline` output.
//! Behavior is keyed on the source URL (the first argument):
//!
//! - contains `fail`: prints `ERROR: network unreachable` to stderr, exits 1
//! - contains `hang`: prints one progress line, then waits on a child `sleep 30`
//! - contains `slow`: like the default, with longer pauses between lines
//! - contains `latin1`: destination name with a non-UTF-8 byte, then progress, exit 0
//! - anything else: destination line, progress lines, exit 0
//!
//! Each call appends its arguments to `calls.log` next to the `-o` template.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use tempfile::TempDir;

const SCRIPT: &str = r#"#!/bin/sh
url="$1"
out=""
prev=""
for a in "$@"; do
  if [ "$prev" = "-o" ]; then out="$a"; fi
  prev="$a"
done
dir=$(dirname "$out")
echo "$*" >> "$dir/calls.log"

delay=0.05
case "$url" in
  *fail*)
    echo "[generic] extracting"
    echo "ERROR: network unreachable" >&2
    exit 1
    ;;
  *hang*)
    echo "[download] Destination: $dir/Hanging.mp4"
    echo "[download]   1.0% of   10.00MiB at    1.00MiB/s ETA 00:09"
    sleep 30 &
    wait
    exit 0
    ;;
  *slow*)
    delay=0.2
    ;;
  *latin1*)
    printf '[download] Destination: %s/Caf\351.mp4\n' "$dir"
    for p in 10.0 20.0 30.0 40.0 50.0 60.0 70.0 80.0 90.0 95.0; do
      echo "[download]  $p% of   10.00MiB at    2.00MiB/s ETA 00:01"
    done
    echo "[download] 100% of   10.00MiB in 00:00:01 at 2.00MiB/s"
    exit 0
    ;;
esac

echo "[download] Destination: $dir/Stub Title.mp4"
for p in 25.0 50.0 75.0; do
  echo "[download]  $p% of   10.00MiB at    2.00MiB/s ETA 00:03 (frag 1/4)"
  sleep "$delay"
done
echo "[download] 100% of   10.00MiB in 00:00:01 at 2.00MiB/s"
exit 0
"#;

struct Stub {
    _dir: TempDir,
    path: PathBuf,
}

// Written once, before any test of this binary can spawn a process, so no
// child ever inherits a writable handle to the script.
static STUB: LazyLock<Stub> = LazyLock::new(|| {
    let dir = tempfile::Builder::new()
        .prefix("mdq-stub")
        .tempdir()
        .expect("stub dir");
    let path = dir.path().join("fake-downloader");
    fs::write(&path, SCRIPT).expect("write stub");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod stub");
    Stub { _dir: dir, path }
});

/// Path of the executable stub downloader.
pub fn path() -> &'static Path {
    &STUB.path
}

/// Argument lines recorded by the stub for downloads into `download_dir`.
pub fn calls(download_dir: &Path) -> Vec<String> {
    fs::read_to_string(download_dir.join("calls.log"))
        .map(|s| s.lines().map(str::to_string).collect())
        .unwrap_or_default()
}
