use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread::sleep;
use std::time::{Duration, Instant};

use tempfile::TempDir;

fn fleet_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_fleet"))
}

fn fleet(home: &Path) -> Command {
    let mut cmd = Command::new(fleet_bin());
    cmd.env("HOME", home)
        .env("USERPROFILE", home)
        .env_remove("FLEET_ORG")
        .env_remove("GITHUB_TOKEN")
        .env("RUST_LOG", "warn");
    cmd
}

struct DaemonProcess {
    child: Child,
    home: PathBuf,
}

impl DaemonProcess {
    fn start(home: &Path) -> Self {
        let child = fleet(home)
            .args(["daemon", "start"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn daemon");
        Self {
            child,
            home: home.to_path_buf(),
        }
    }

    fn wait_for_exit(&mut self, timeout: Duration) -> Option<std::process::ExitStatus> {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if let Ok(Some(status)) = self.child.try_wait() {
                return Some(status);
            }
            sleep(Duration::from_millis(50));
        }
        None
    }
}

impl Drop for DaemonProcess {
    fn drop(&mut self) {
        let _ = fleet(&self.home).args(["daemon", "stop"]).status();
        if self.wait_for_exit(Duration::from_secs(2)).is_none() {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

fn daemon_status(home: &Path) -> serde_json::Value {
    let output = fleet(home)
        .args(["daemon", "status"])
        .output()
        .expect("daemon status");
    serde_json::from_slice(&output.stdout).unwrap_or(serde_json::Value::Null)
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(100));
    }
    false
}

fn write_config(home: &Path) {
    let dir = home.join(".fleet");
    fs::create_dir_all(&dir).expect("create .fleet");
    fs::write(
        dir.join("config.yaml"),
        "organization: acme\n\
         api_base_url: http://127.0.0.1:9\n\
         discovery:\n  page_delay_ms: 0\n\
         schedule:\n  interval_secs: 3600\n",
    )
    .expect("write config");
}

#[test]
fn daemon_runs_initial_pass_and_stops_on_request() {
    let home = TempDir::new().expect("home");
    write_config(home.path());

    let mut daemon = DaemonProcess::start(home.path());
    assert!(
        wait_until(Duration::from_secs(10), || {
            let status = daemon_status(home.path());
            status["running"] == true && status["failureCount"] == 1
        }),
        "daemon did not record its initial pass in time",
    );

    let second = fleet(home.path())
        .args(["daemon", "start"])
        .output()
        .expect("second start");
    assert!(!second.status.success(), "second daemon must not start");
    assert!(String::from_utf8_lossy(&second.stderr).contains("already running"));

    let stop = fleet(home.path())
        .args(["daemon", "stop"])
        .output()
        .expect("stop");
    assert!(stop.status.success());

    let exit = daemon
        .wait_for_exit(Duration::from_secs(10))
        .expect("daemon exited");
    assert!(exit.success(), "daemon exit status: {exit}");
    assert!(!home.path().join(".fleet/run/daemon.lock").exists());
    assert_eq!(daemon_status(home.path())["running"], false);
}
